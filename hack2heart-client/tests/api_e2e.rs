use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::NaiveDate;
use hack2heart_client::{ApiClient, ApiError, App, AuthOutcome, ClientConfig, GithubIdentity};
use hack2heart_core::{
    Gender, NewProfile, ReactionType, SnippetKey,
    host::OutboundMessage,
    pinned::{DropTarget, SlotId},
    view::View,
};
use reqwest::Method;
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot};

const SERVICE_TOKEN: &str = "svc-token";

#[derive(Clone, Default)]
struct Backend {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Backend {
    fn record(&self, route: impl Into<String>, body: Value) {
        self.requests
            .lock()
            .expect("requests lock")
            .push((route.into(), body));
    }

    fn requests_to(&self, route: &str) -> Vec<Value> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|(recorded, _)| recorded == route)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {SERVICE_TOKEN}");
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Not authenticated"}))).into_response()
}

fn profile_json(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "gender": "OTHER",
        "birth_date": "1995-06-15",
        "most_preferred_language": "Rust",
        "most_preferred_package": "tokio",
        "looking_for_friend": true,
        "tmis": [{"id": 1, "name": "tabs over spaces"}]
    })
}

fn code_json(id: i64, content: &str, index: Option<u32>) -> Value {
    json!({
        "id": id,
        "content": content,
        "index": index,
        "created_at": "2025-05-01T09:30:00.000123"
    })
}

async fn auth_github(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    let created = !backend.requests_to("create_user").is_empty();
    match body["access_token"].as_str() {
        Some("registered-gh") => Json(json!({"access_token": SERVICE_TOKEN})).into_response(),
        Some("new-gh") if created => Json(json!({"access_token": SERVICE_TOKEN})).into_response(),
        Some("boom") => (StatusCode::INTERNAL_SERVER_ERROR, "db down").into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({"detail": "User not found"}))).into_response(),
    }
}

async fn me(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(profile_json(1, "me")).into_response()
}

async fn update_me(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    backend.record("update_me", body.clone());
    let mut profile = profile_json(1, body["name"].as_str().unwrap_or_default());
    profile["gender"] = body["gender"].clone();
    Json(profile).into_response()
}

async fn create_user(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    backend.record("create_user", json!({"authorization": bearer, "body": body.clone()}));
    let profile = profile_json(5, body["name"].as_str().unwrap_or_default());
    (StatusCode::CREATED, Json(profile)).into_response()
}

async fn my_codes(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "codes": [
            code_json(1, "fn one() {}", None),
            code_json(2, "fn two() {}\nbody", Some(0)),
            code_json(3, "", None),
        ]
    }))
    .into_response()
}

async fn upload_code(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.record("upload", body.clone());
    let content = body["content"].as_str().unwrap_or_default();
    (
        StatusCode::CREATED,
        Json(json!({"code": code_json(40, content, None)})),
    )
        .into_response()
}

async fn update_indices(State(backend): State<Backend>, Json(body): Json<Value>) -> StatusCode {
    backend.record("indices", body);
    StatusCode::NO_CONTENT
}

async fn delete_code(State(backend): State<Backend>, Path(code_id): Path<i64>) -> StatusCode {
    backend.record("delete", json!(code_id));
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn analyze(Json(body): Json<Value>) -> Json<Value> {
    let length = body["content"].as_str().map_or(0, str::len);
    Json(json!({"content": format!("{length} bytes of code")}))
}

async fn recommendations(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut first = profile_json(10, "ada");
    first["previous_reaction_type"] = json!(null);
    let mut second = profile_json(11, "grace");
    second["previous_reaction_type"] = json!("SUPER_LIKE");
    Json(json!({"users": [first, second]})).into_response()
}

async fn user_codes(
    State(backend): State<Backend>,
    Path(user_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    backend.record("user_codes", json!({"user_id": user_id, "query": query}));
    Json(json!({"userCodes": [code_json(100 + user_id, "print('hi')", None)]}))
}

async fn react(State(backend): State<Backend>, Json(body): Json<Value>) -> StatusCode {
    backend.record("react", body);
    StatusCode::BAD_GATEWAY
}

async fn chat_history(Path(room): Path<String>) -> Json<Value> {
    Json(json!({
        "messages": [{
            "chatroom_id": room,
            "user_id": 10,
            "content": "hello",
            "created_at": "2025-05-01T10:00:00"
        }]
    }))
}

async fn post_chat(
    State(backend): State<Backend>,
    Path(room): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    backend.record(format!("chat:{room}"), body);
    StatusCode::CREATED
}

async fn start_backend() -> (String, Backend, oneshot::Sender<()>) {
    let backend = Backend::default();
    let router = Router::new()
        .route("/auth/github", post(auth_github))
        .route("/users", post(create_user))
        .route("/users/me", get(me).put(update_me))
        .route("/users/me/codes", get(my_codes).post(upload_code))
        .route("/users/me/codes/indices", put(update_indices))
        .route("/users/me/codes/{code_id}", delete(delete_code))
        .route("/codes/analyze", post(analyze))
        .route("/users/recommendations", get(recommendations))
        .route("/users/{user_id}/codes", get(user_codes))
        .route("/create_user_reaction", post(react))
        .route("/chatrooms/{room}/messages", get(chat_history).post(post_chat))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral backend socket");
    let address = listener.local_addr().expect("backend local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("http://{address}"), backend, shutdown_tx)
}

fn identity(access_token: &str) -> GithubIdentity {
    GithubIdentity {
        id: "4242".to_owned(),
        label: "octo".to_owned(),
        email: None,
        access_token: access_token.to_owned(),
    }
}

async fn signed_in_app(api_url: &str) -> App {
    let config = ClientConfig {
        api_url: api_url.to_owned(),
        ..ClientConfig::default()
    };
    let (mut app, _host_rx) = App::new(config, None);
    app.authenticate(identity("registered-gh"))
        .await
        .expect("authenticate");
    app
}

#[tokio::test]
async fn unknown_github_account_requires_profile() {
    let (api_url, _backend, shutdown_tx) = start_backend().await;
    let config = ClientConfig {
        api_url,
        ..ClientConfig::default()
    };
    let (mut app, mut host_rx) = App::new(config, None);

    let outcome = app
        .authenticate(identity("new-gh"))
        .await
        .expect("404 is not an error");
    assert_eq!(outcome, AuthOutcome::ProfileRequired);
    assert_eq!(app.current_view(), View::Profile);

    let session = app.session().current().expect("session stored");
    assert_eq!(session.github_oauth_id.as_deref(), Some("4242"));
    assert_eq!(session.access_token.as_deref(), Some("new-gh"));
    assert!(!session.is_registered());
    assert!(!app.api().is_authenticated());

    let mut emitted = Vec::new();
    while let Ok(message) = host_rx.try_recv() {
        emitted.push(message);
    }
    assert_eq!(
        emitted,
        vec![
            OutboundMessage::RequestSessionInfo,
            OutboundMessage::Alert {
                text: "Hello, octo!".to_owned()
            },
            OutboundMessage::open_view(View::Profile),
        ]
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn registered_account_gets_bearer_token_and_home() {
    let (api_url, _backend, shutdown_tx) = start_backend().await;
    let app = signed_in_app(&api_url).await;

    assert_eq!(app.current_view(), View::Home);
    assert_eq!(app.session().bearer_token().as_deref(), Some(SERVICE_TOKEN));

    let me = app.api().me().await.expect("authorized /users/me");
    assert_eq!(me.name, "me");
    assert_eq!(me.tmis.len(), 1);

    let anonymous = hack2heart_client::ApiClient::new(api_url.as_str());
    let err = anonymous.me().await.expect_err("missing bearer is rejected");
    assert!(err.is_auth_failure(), "unexpected error: {err}");
    assert!(err.to_string().contains("Not authenticated"));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn failed_exchange_leaves_session_untouched() {
    let (api_url, _backend, shutdown_tx) = start_backend().await;
    let config = ClientConfig {
        api_url,
        ..ClientConfig::default()
    };
    let (mut app, _host_rx) = App::new(config, None);

    let err = app
        .authenticate(identity("boom"))
        .await
        .expect_err("server error surfaces");
    assert_eq!(err.status(), Some(500));
    assert!(app.session().current().is_none());
    assert_eq!(app.current_view(), View::Welcome);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn pinned_gestures_push_index_updates_only_on_change() {
    let (api_url, backend, shutdown_tx) = start_backend().await;
    let app = signed_in_app(&api_url).await;
    let mut screen = app.my_code_screen();
    screen.load(None).await.expect("load codes");

    let board = screen.board();
    assert_eq!(board.slots().len(), 1);
    assert_eq!(board.slots()[0].assigned, Some(SnippetKey::new(2)));
    assert_eq!(board.pool(), &[SnippetKey::new(1), SnippetKey::new(3)]);
    assert_eq!(
        board.card(SnippetKey::new(3)).expect("card").title,
        "Untitled Code"
    );

    // Already in the pool: nothing to push.
    let changed = screen
        .move_snippet(SnippetKey::new(1), DropTarget::Pool)
        .await
        .expect("no-op move");
    assert!(!changed);
    assert!(backend.requests_to("indices").is_empty());

    // An empty slot changes no index.
    assert!(screen.add_slot());
    assert!(backend.requests_to("indices").is_empty());

    assert!(screen.begin_drag(SnippetKey::new(3)));
    let changed = screen
        .drop_dragged(Some(DropTarget::Slot(SlotId::new(2))))
        .await
        .expect("drop into second slot");
    assert!(changed);
    assert_eq!(
        backend.requests_to("indices"),
        vec![json!({"code_ids": [2, 3], "indices": [0, 1]})]
    );

    // Removing the first slot shifts code-3 to index 0.
    let changed = screen
        .remove_slot(SlotId::new(1))
        .await
        .expect("remove slot");
    assert!(changed);
    assert_eq!(
        backend.requests_to("indices").last(),
        Some(&json!({"code_ids": [3], "indices": [0]}))
    );
    assert!(screen.board().pool().contains(&SnippetKey::new(2)));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn delete_stays_local_when_server_fails() {
    let (api_url, backend, shutdown_tx) = start_backend().await;
    let app = signed_in_app(&api_url).await;
    let mut screen = app.my_code_screen();
    screen.load(None).await.expect("load codes");

    let removed = screen.delete(SnippetKey::new(2)).await;
    assert_eq!(removed.map(|code| code.id), Some(2));
    assert_eq!(backend.requests_to("delete"), vec![json!(2)]);

    let board = screen.board();
    assert_eq!(board.snippet_count(), 2);
    assert_eq!(board.slots().len(), 1);
    assert_eq!(board.slots()[0].assigned, None);
    assert!(screen.delete(SnippetKey::new(2)).await.is_none());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn explore_advances_before_reaction_resolves() {
    let (api_url, backend, shutdown_tx) = start_backend().await;
    let app = signed_in_app(&api_url).await;
    let mut screen = app.explore_screen();

    let first = screen.load().await.expect("load recommendations");
    assert_eq!(first.map(|candidate| candidate.user.id), Some(10));
    assert_eq!(screen.remaining(), 1);

    let codes = screen.candidate_codes().await.expect("candidate codes");
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].id, 110);
    assert_eq!(
        backend.requests_to("user_codes"),
        vec![json!({"user_id": 10, "query": {"user_id": "10", "pinned": "false"}})]
    );

    let reacted = screen.react(ReactionType::Like).await;
    assert_eq!(reacted, Some(10));
    let next = screen.current().expect("second candidate shown");
    assert_eq!(next.user.id, 11);
    assert_eq!(next.previous_reaction_type, Some(ReactionType::SuperLike));
    assert_eq!(
        backend.requests_to("react"),
        vec![json!({"to_user_id": 10, "reaction_type": "LIKE"})]
    );

    assert_eq!(screen.react(ReactionType::Dislike).await, Some(11));
    assert!(screen.current().is_none());
    assert_eq!(screen.react(ReactionType::Like).await, None);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn chat_send_trims_and_appends_local_copy() {
    let (api_url, backend, shutdown_tx) = start_backend().await;
    let app = signed_in_app(&api_url).await;
    let mut screen = app.chat_screen("7");
    screen.load().await.expect("load chat");

    assert_eq!(screen.current_user().map(|user| user.id), Some(1));
    assert_eq!(screen.messages().len(), 1);

    assert!(!screen.send("   ").await.expect("blank draft"));
    assert!(backend.requests_to("chat:7").is_empty());

    assert!(screen.send("  hi there \n").await.expect("send"));
    assert_eq!(
        backend.requests_to("chat:7"),
        vec![json!({"content": "hi there"})]
    );
    let last = screen.messages().last().expect("local copy");
    assert_eq!(last.content, "hi there");
    assert_eq!(last.user_id, 1);
    assert_eq!(last.chatroom_id, "7");

    let other_room = json!({
        "chatroom_id": "8",
        "user_id": 3,
        "content": "wrong room",
        "created_at": "2025-05-01T10:01:00"
    });
    assert!(!screen.receive(other_room));
    assert_eq!(screen.messages().len(), 2);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn upload_clears_draft_on_created() {
    let (api_url, backend, shutdown_tx) = start_backend().await;
    let app = signed_in_app(&api_url).await;
    let mut screen = app.upload_screen();
    screen.set_draft("fn main() {}");

    let analysis = screen.analyze().await.expect("analyze");
    assert_eq!(analysis, "12 bytes of code");
    assert_eq!(screen.analysis(), Some("12 bytes of code"));

    let receipt = screen.upload().await.expect("upload");
    assert!(receipt.created);
    assert_eq!(receipt.code.map(|code| code.id), Some(40));
    assert_eq!(screen.draft(), "");
    assert_eq!(screen.analysis(), None);
    assert_eq!(
        backend.requests_to("upload"),
        vec![json!({"content": "fn main() {}"})]
    );

    let _ = shutdown_tx.send(());
}

fn new_profile(name: &str) -> NewProfile {
    NewProfile {
        name: name.to_owned(),
        gender: Gender::Female,
        birth_date: NaiveDate::from_ymd_opt(1998, 2, 3).expect("valid date"),
        avatar_id: Some(3),
        most_preferred_language: "Rust".to_owned(),
        most_preferred_package: "serde".to_owned(),
        looking_for_love: false,
        looking_for_friend: true,
        looking_for_coworker: true,
        tmis: vec!["owns a mechanical keyboard".to_owned()],
    }
}

fn expected_profile_body(name: &str) -> Value {
    json!({
        "name": name,
        "gender": "FEMALE",
        "birth_date": "1998-02-03",
        "avatar_id": 3,
        "most_preferred_language": "Rust",
        "most_preferred_package": "serde",
        "looking_for_love": false,
        "looking_for_friend": true,
        "looking_for_coworker": true,
        "tmis": ["owns a mechanical keyboard"]
    })
}

#[tokio::test]
async fn profile_creation_registers_and_routes_home() {
    let (api_url, backend, shutdown_tx) = start_backend().await;
    let config = ClientConfig {
        api_url,
        ..ClientConfig::default()
    };
    let (mut app, _host_rx) = App::new(config, None);
    let outcome = app
        .authenticate(identity("new-gh"))
        .await
        .expect("404 is not an error");
    assert_eq!(outcome, AuthOutcome::ProfileRequired);

    let user = app
        .complete_profile(&new_profile("ada"))
        .await
        .expect("create profile");
    assert_eq!(user.id, 5);
    assert_eq!(user.name, "ada");

    assert_eq!(
        backend.requests_to("create_user"),
        vec![json!({
            "authorization": "Bearer new-gh",
            "body": expected_profile_body("ada")
        })]
    );
    assert!(backend.requests_to("update_me").is_empty());

    let session = app.session().current().expect("session kept");
    assert!(session.is_registered());
    assert_eq!(session.bearer_token(), Some(SERVICE_TOKEN));
    assert_eq!(session.github_oauth_id.as_deref(), Some("4242"));
    assert_eq!(app.current_view(), View::Home);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn registered_profile_edit_uses_put() {
    let (api_url, backend, shutdown_tx) = start_backend().await;
    let mut app = signed_in_app(&api_url).await;

    let user = app
        .complete_profile(&new_profile("grace"))
        .await
        .expect("update profile");
    assert_eq!(user.id, 1);
    assert_eq!(user.name, "grace");
    assert_eq!(user.gender, Gender::Female);

    assert_eq!(
        backend.requests_to("update_me"),
        vec![expected_profile_body("grace")]
    );
    assert!(backend.requests_to("create_user").is_empty());
    assert_eq!(app.current_view(), View::Home);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn raw_requests_decode_json_empty_and_error_bodies() {
    let (api_url, backend, shutdown_tx) = start_backend().await;
    let api = ApiClient::new(api_url.as_str()).with_token(Some(SERVICE_TOKEN.to_owned()));

    let me = api
        .request(Method::GET, "/users/me", &[], None)
        .await
        .expect("json body");
    assert_eq!(me["name"], "me");
    assert_eq!(me["tmis"][0]["name"], "tabs over spaces");

    let analysis = api
        .request(
            Method::POST,
            "/codes/analyze",
            &[],
            Some(&json!({"content": "abc"})),
        )
        .await
        .expect("analysis body");
    assert_eq!(analysis, json!({"content": "3 bytes of code"}));

    let indices = json!({"code_ids": [4], "indices": [0]});
    let empty = api
        .request(Method::PUT, "/users/me/codes/indices", &[], Some(&indices))
        .await
        .expect("204 has no body");
    assert_eq!(empty, Value::Null);
    assert_eq!(backend.requests_to("indices"), vec![indices]);

    let err = ApiClient::new(api_url.as_str())
        .request(Method::GET, "/users/me", &[], None)
        .await
        .expect_err("anonymous request is rejected");
    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("Not authenticated"), "unexpected message: {message}");
        }
        other => panic!("expected a status error, got {other}"),
    }

    let _ = shutdown_tx.send(());
}
