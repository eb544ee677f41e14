//! REST client for the hack2heart backend.
//!
//! Each call is one request and one response: no retry, no caching. Errors
//! reach the caller as-is so every screen can decide how to surface them.

use hack2heart_core::{
    ChatMessage, CodeId, CodeSnippet, NewProfile, ReactionType, Recommendation, Session,
    UserId, UserProfile, pinned::IndexUpdate,
};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network, DNS, TLS or body read failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request(err) => err.status().map(|status| status.as_u16()),
            ApiError::Decode(_) => None,
        }
    }

    /// Missing, expired or rejected token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Result of exchanging a GitHub token for a service token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Registered { service_token: String },
    /// The GitHub account has no profile yet.
    ProfileRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub created: bool,
    pub code: Option<CodeSnippet>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct CodesResponse {
    #[serde(default)]
    codes: Vec<CodeSnippet>,
}

#[derive(Deserialize)]
struct UserCodesResponse {
    #[serde(default, rename = "userCodes")]
    user_codes: Vec<CodeSnippet>,
}

#[derive(Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    users: Vec<Recommendation>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    code: Option<CodeSnippet>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing connection pool.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            client,
            base_url,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_session(self, session: Option<&Session>) -> Self {
        let token = session.and_then(Session::bearer_token).map(str::to_owned);
        self.with_token(token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Send one request and decode the JSON response body.
    ///
    /// An empty success body decodes as `null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let response = self.send(method, path, query, body).await?;
        Self::decode_body(response).await
    }

    pub async fn exchange_github_token(&self, access_token: &str) -> Result<AuthOutcome, ApiError> {
        let body = json!({ "access_token": access_token });
        match self.send(Method::POST, "/auth/github", &[], Some(&body)).await {
            Ok(response) => {
                let token: TokenResponse = Self::decode(response).await?;
                Ok(AuthOutcome::Registered {
                    service_token: token.access_token,
                })
            }
            Err(err) if err.is_not_found() => Ok(AuthOutcome::ProfileRequired),
            Err(err) => Err(err),
        }
    }

    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.get("/users/me", &[]).await
    }

    pub async fn create_profile(&self, profile: &NewProfile) -> Result<UserProfile, ApiError> {
        let body = serde_json::to_value(profile)?;
        let response = self.send(Method::POST, "/users", &[], Some(&body)).await?;
        Self::decode(response).await
    }

    pub async fn update_profile(&self, profile: &NewProfile) -> Result<UserProfile, ApiError> {
        let body = serde_json::to_value(profile)?;
        let response = self.send(Method::PUT, "/users/me", &[], Some(&body)).await?;
        Self::decode(response).await
    }

    /// The caller's snippets, optionally filtered by pinned state.
    pub async fn my_codes(&self, pinned: Option<bool>) -> Result<Vec<CodeSnippet>, ApiError> {
        let query: Vec<(&str, String)> = pinned
            .map(|pinned| vec![("pinned", pinned.to_string())])
            .unwrap_or_default();
        let response: CodesResponse = self.get("/users/me/codes", &query).await?;
        Ok(response.codes)
    }

    pub async fn upload_code(&self, content: &str) -> Result<UploadReceipt, ApiError> {
        let body = json!({ "content": content });
        let response = self
            .send(Method::POST, "/users/me/codes", &[], Some(&body))
            .await?;
        let created = response.status() == StatusCode::CREATED;
        let code = match Self::decode_body(response).await? {
            Value::Null => None,
            value => serde_json::from_value::<UploadResponse>(value)
                .ok()
                .and_then(|upload| upload.code),
        };
        Ok(UploadReceipt { created, code })
    }

    pub async fn delete_code(&self, code_id: CodeId) -> Result<(), ApiError> {
        self.send(Method::DELETE, &format!("/users/me/codes/{code_id}"), &[], None)
            .await?;
        Ok(())
    }

    /// Push the full pinned order in one call.
    pub async fn update_code_indices(&self, update: &IndexUpdate) -> Result<(), ApiError> {
        let body = serde_json::to_value(update)?;
        self.send(Method::PUT, "/users/me/codes/indices", &[], Some(&body))
            .await?;
        Ok(())
    }

    pub async fn analyze_code(&self, content: &str) -> Result<String, ApiError> {
        let body = json!({ "content": content });
        let response = self
            .send(Method::POST, "/codes/analyze", &[], Some(&body))
            .await?;
        let analysis: ContentResponse = Self::decode(response).await?;
        Ok(analysis.content)
    }

    pub async fn recommendations(&self) -> Result<Vec<Recommendation>, ApiError> {
        let response: RecommendationsResponse = self.get("/users/recommendations", &[]).await?;
        Ok(response.users)
    }

    /// Another user's unpinned snippets.
    pub async fn user_codes(&self, user_id: UserId) -> Result<Vec<CodeSnippet>, ApiError> {
        let query = [
            ("user_id", user_id.to_string()),
            ("pinned", false.to_string()),
        ];
        let response: UserCodesResponse =
            self.get(&format!("/users/{user_id}/codes"), &query).await?;
        Ok(response.user_codes)
    }

    pub async fn react(&self, to_user_id: UserId, reaction: ReactionType) -> Result<(), ApiError> {
        let body = json!({
            "to_user_id": to_user_id,
            "reaction_type": reaction,
        });
        self.send(Method::POST, "/create_user_reaction", &[], Some(&body))
            .await?;
        Ok(())
    }

    pub async fn chat_history(&self, chatroom_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let response: MessagesResponse = self
            .get(&format!("/chatrooms/{chatroom_id}/messages"), &[])
            .await?;
        Ok(response.messages)
    }

    pub async fn post_chat_message(&self, chatroom_id: &str, content: &str) -> Result<(), ApiError> {
        let body = json!({ "content": content });
        self.send(
            Method::POST,
            &format!("/chatrooms/{chatroom_id}/messages"),
            &[],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self.send(Method::GET, path, query, None).await?;
        Self::decode(response).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(%method, %url, authenticated = self.token.is_some(), "api request");

        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => format!("failed to read error response body: {err}"),
        };
        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message_for_response(status, &body),
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn decode_body(response: reqwest::Response) -> Result<Value, ApiError> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn error_message_for_response(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_owned();
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value
            .get("detail")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"))
            .and_then(Value::as_str);
        if let Some(message) = message {
            return message.to_owned();
        }
    }

    body.to_owned()
}
