use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router, extract::State};
use parley_core::{Error, TransportError};
use parley_providers::{ChatMessage, CompletionBackend, CompletionReply, HttpBackend, OutboundPayload, PromptRequest};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Clone)]
struct ServerState {
    received: Arc<Mutex<Vec<Value>>>,
    status: StatusCode,
    body: String,
}

async fn prompt(State(state): State<ServerState>, Json(body): Json<Value>) -> (StatusCode, String) {
    state.received.lock().unwrap().push(body);
    (state.status, state.body.clone())
}

async fn spawn_server(status: StatusCode, body: &str) -> (String, Arc<Mutex<Vec<Value>>>, oneshot::Sender<()>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = ServerState { received: received.clone(), status, body: body.to_string() };
    let app = Router::new().route("/prompt", post(prompt)).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address: SocketAddr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    (format!("http://{address}"), received, shutdown_tx)
}

fn request(prompt: &str) -> PromptRequest {
    PromptRequest::new(OutboundPayload(vec![
        ChatMessage::system("You are a helpful assistant."),
        ChatMessage::user(prompt),
    ]))
}

#[tokio::test]
async fn test_http_backend_posts_payload_and_reads_reply() {
    let (base_url, received, shutdown) = spawn_server(StatusCode::OK, r#"{"message":"4"}"#).await;
    let backend = HttpBackend::new(&base_url, "/prompt");

    let reply = backend.complete(request("2+2?")).await.unwrap();
    assert_eq!(reply, CompletionReply::text("4"));

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0],
        json!({
            "prompt": "",
            "chat_history": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": "2+2?"}
            ]
        })
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_http_backend_legacy_reply_shape() {
    let (base_url, _received, shutdown) =
        spawn_server(StatusCode::OK, r#"{"instructions":{"message":"legacy"}}"#).await;
    let backend = HttpBackend::new(&base_url, "/prompt");

    let reply = backend.complete(request("hi")).await.unwrap();
    assert_eq!(reply, CompletionReply::text("legacy"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_http_backend_missing_reply_field() {
    let (base_url, _received, shutdown) = spawn_server(StatusCode::OK, r#"{"status":"ok"}"#).await;
    let backend = HttpBackend::new(&base_url, "/prompt");

    let reply = backend.complete(request("hi")).await.unwrap();
    assert_eq!(reply, CompletionReply::empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_http_backend_error_status() {
    let (base_url, _received, shutdown) = spawn_server(StatusCode::INTERNAL_SERVER_ERROR, "model exploded").await;
    let backend = HttpBackend::new(&base_url, "/prompt");

    let err = backend.complete(request("hi")).await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Status { status: 500, .. })));
    assert_eq!(err.to_string(), "Backend error: 500 Internal Server Error — model exploded");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_http_backend_nonstandard_status_has_no_reason() {
    let status = StatusCode::from_u16(599).unwrap();
    let (base_url, _received, shutdown) = spawn_server(status, "gave up").await;
    let backend = HttpBackend::new(&base_url, "/prompt");

    let err = backend.complete(request("hi")).await.unwrap_err();
    assert_eq!(err.to_string(), "Backend error: 599 — gave up");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_http_backend_undecodable_body() {
    let (base_url, _received, shutdown) = spawn_server(StatusCode::OK, "<html>not json</html>").await;
    let backend = HttpBackend::new(&base_url, "/prompt");

    let err = backend.complete(request("hi")).await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Decode(_))));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_http_backend_unknown_path_is_status_error() {
    let (base_url, received, shutdown) = spawn_server(StatusCode::OK, r#"{"message":"4"}"#).await;
    let backend = HttpBackend::new(&base_url, "/elsewhere");

    let err = backend.complete(request("hi")).await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Status { status: 404, .. })));
    assert!(received.lock().unwrap().is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_http_backend_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(&format!("http://{address}"), "/prompt");
    let err = backend.complete(request("hi")).await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Network(_))));
    assert!(err.to_string().starts_with("Network error:"));
}
