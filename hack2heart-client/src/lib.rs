pub mod api;
pub mod app;
pub mod config;
pub mod realtime;
pub mod screens;
pub mod session;

pub use api::{ApiClient, ApiError, AuthOutcome};
pub use app::{App, GithubIdentity};
pub use config::{ClientConfig, ConfigError};
pub use realtime::{ConnectOptions, RealtimeChannel, RealtimeError};
pub use session::{SessionError, SessionStore};
