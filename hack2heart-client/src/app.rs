//! Application shell: session, current view and the host message stream.
//!
//! The host environment (an editor extension, or the CLI) pushes
//! [`InboundMessage`]s in and drains [`OutboundMessage`]s from the receiver
//! returned by [`App::new`].

use hack2heart_core::{
    CoreError, NewProfile, Session, UserProfile,
    host::{InboundMessage, OutboundMessage, decode_inbound},
    view::{View, ViewRouter},
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    api::{ApiClient, ApiError, AuthOutcome},
    config::ClientConfig,
    realtime::{RealtimeChannel, RealtimeError},
    screens::{ChatScreen, ExploreScreen, MyCodeScreen, UploadScreen},
    session::SessionStore,
};

const CHATROOM_OPTION: &str = "chatroom_id";

/// GitHub account details obtained by the host's OAuth flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubIdentity {
    pub id: String,
    pub label: String,
    pub email: Option<String>,
    pub access_token: String,
}

#[derive(Debug)]
pub struct App {
    config: ClientConfig,
    http: reqwest::Client,
    session: SessionStore,
    router: ViewRouter,
    host_tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl App {
    /// Build the shell and ask the host for the current session.
    pub fn new(
        config: ClientConfig,
        session: Option<Session>,
    ) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let app = Self {
            config,
            http: reqwest::Client::new(),
            session: SessionStore::new(session),
            router: ViewRouter::default(),
            host_tx,
        };
        app.emit(OutboundMessage::RequestSessionInfo);
        (app, host_rx)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn router(&self) -> &ViewRouter {
        &self.router
    }

    pub fn current_view(&self) -> View {
        self.router.current()
    }

    /// Room carried by the last `updateContent` for the chat view.
    pub fn chat_room(&self) -> Option<&str> {
        self.router.option_str(CHATROOM_OPTION)
    }

    pub fn handle_host_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::SessionInfo { session } => self.session.update(session),
            InboundMessage::UpdateContent {
                content_type,
                options,
            } => {
                let view = self.router.route(&content_type, options);
                debug!(%content_type, %view, "content updated");
            }
        }
    }

    pub fn handle_host_json(&mut self, raw: &str) -> Result<(), CoreError> {
        let message = decode_inbound(raw)?;
        self.handle_host_message(message);
        Ok(())
    }

    /// Client carrying the current session's service token, if any.
    pub fn api(&self) -> ApiClient {
        ApiClient::with_client(self.http.clone(), self.config.api_url.as_str())
            .with_token(self.session.bearer_token())
    }

    /// Exchange a GitHub identity for a service session.
    ///
    /// Registered accounts land on `Home`; accounts without a profile get an
    /// unregistered session and land on `Profile`. Any other failure leaves
    /// the session and view untouched.
    pub async fn authenticate(&mut self, identity: GithubIdentity) -> Result<AuthOutcome, ApiError> {
        self.emit(OutboundMessage::Alert {
            text: format!("Hello, {}!", identity.label),
        });

        let exchange = ApiClient::with_client(self.http.clone(), self.config.api_url.as_str())
            .exchange_github_token(&identity.access_token)
            .await;
        let outcome = match exchange {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("token exchange failed: {err}");
                self.emit(OutboundMessage::Alert {
                    text: "Failed to send auth info to backend.".to_owned(),
                });
                return Err(err);
            }
        };

        let (service_token, view) = match &outcome {
            AuthOutcome::Registered { service_token } => (Some(service_token.clone()), View::Home),
            AuthOutcome::ProfileRequired => (None, View::Profile),
        };
        info!(github_id = %identity.id, %view, "authenticated");

        self.session.update(Some(Session {
            github_oauth_id: Some(identity.id),
            github_name: Some(identity.label),
            github_email: identity.email,
            access_token: Some(identity.access_token),
            service_token,
        }));
        self.open(view, None);
        Ok(outcome)
    }

    /// Create the profile for a pending GitHub session, or edit the profile of
    /// a registered one.
    ///
    /// Creation authenticates with the GitHub access token, then repeats the
    /// token exchange so the session picks up its service token and the
    /// router lands on `Home`.
    pub async fn complete_profile(&mut self, profile: &NewProfile) -> Result<UserProfile, ApiError> {
        let session = self.session.current().unwrap_or_default();
        if session.is_registered() {
            let user = self.api().update_profile(profile).await?;
            info!(user_id = user.id, "profile updated");
            return Ok(user);
        }

        let github_token = session.access_token.clone();
        let api = ApiClient::with_client(self.http.clone(), self.config.api_url.as_str())
            .with_token(github_token.clone());
        let user = api.create_profile(profile).await?;
        info!(user_id = user.id, "profile created");

        if let Some(github_token) = github_token {
            match api.exchange_github_token(&github_token).await? {
                AuthOutcome::Registered { service_token } => {
                    self.session.update(Some(Session {
                        service_token: Some(service_token),
                        ..session
                    }));
                    self.open(View::Home, None);
                }
                AuthOutcome::ProfileRequired => {
                    warn!(user_id = user.id, "profile created but token exchange still pending");
                }
            }
        }
        Ok(user)
    }

    /// Show `view` locally and ask the host to reveal it.
    pub fn open(&mut self, view: View, options: Option<Value>) {
        self.router.show(view, options);
        self.emit(OutboundMessage::open_view(view));
    }

    pub fn alert(&self, text: impl Into<String>) {
        self.emit(OutboundMessage::Alert { text: text.into() });
    }

    pub async fn connect_realtime(&self) -> Result<RealtimeChannel, RealtimeError> {
        let token = self.session.bearer_token();
        RealtimeChannel::connect(&self.config.ws_url, token.as_deref()).await
    }

    pub fn my_code_screen(&self) -> MyCodeScreen {
        MyCodeScreen::new(self.api())
    }

    pub fn explore_screen(&self) -> ExploreScreen {
        ExploreScreen::new(self.api())
    }

    pub fn upload_screen(&self) -> UploadScreen {
        UploadScreen::new(self.api())
    }

    pub fn chat_screen(&self, room_id: &str) -> ChatScreen {
        ChatScreen::new(self.api(), room_id)
    }

    fn emit(&self, message: OutboundMessage) {
        if self.host_tx.send(message).is_err() {
            debug!("host receiver dropped");
        }
    }
}
