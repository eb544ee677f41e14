//! Per-screen controllers.
//!
//! Each controller owns its screen state and an [`ApiClient`](crate::ApiClient)
//! scoped to the session that opened it. Remote failures are returned to the
//! caller except where a screen updates optimistically.

pub mod chat;
pub mod explore;
pub mod mycode;
pub mod upload;

pub use chat::ChatScreen;
pub use explore::ExploreScreen;
pub use mycode::MyCodeScreen;
pub use upload::UploadScreen;
