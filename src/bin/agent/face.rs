use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use tabpilot::{BackendKind, Backends, CommandProcessor};

/// Events streamed to a connected UI via SSE.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    Thinking { command: String },
    TaskComplete { message: String },
    TaskError { message: String },
}

impl AgentEvent {
    fn to_sse_event(&self) -> Event {
        match self {
            AgentEvent::Thinking { command } => Event::default()
                .event("thinking")
                .data(serde_json::json!({ "command": command }).to_string()),
            AgentEvent::TaskComplete { message } => Event::default()
                .event("task_complete")
                .data(serde_json::json!({ "message": message }).to_string()),
            AgentEvent::TaskError { message } => Event::default()
                .event("task_error")
                .data(serde_json::json!({ "message": message }).to_string()),
        }
    }
}

pub struct AppState {
    pub processor: CommandProcessor,
    pub backends: Backends,
    pub default_backend: BackendKind,
    pub event_tx: broadcast::Sender<AgentEvent>,
}

impl AppState {
    pub fn new(
        processor: CommandProcessor,
        backends: Backends,
        default_backend: BackendKind,
    ) -> Self {
        let (event_tx, _) = broadcast::channel::<AgentEvent>(64);
        Self {
            processor,
            backends,
            default_backend,
            event_tx,
        }
    }
}

#[derive(Deserialize)]
struct CommandPayload {
    command: String,
    #[serde(default)]
    backend: Option<BackendKind>,
}

#[derive(Serialize)]
struct CommandReply {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/command", post(command_handler))
        .route("/events", get(sse_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "command server listening");
    axum::serve(listener, router(Arc::new(state))).await?;
    Ok(())
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CommandPayload>,
) -> (StatusCode, Json<CommandReply>) {
    let kind = payload.backend.unwrap_or(state.default_backend);
    tracing::info!(command = %payload.command, backend = %kind, "POST /command");

    let backend = match state.backends.get(kind) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!(error = %e, "requested backend is not configured");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(CommandReply {
                    ok: false,
                    message: None,
                    error: Some(format!("The {kind} assistant is not configured.")),
                }),
            );
        }
    };

    let _ = state.event_tx.send(AgentEvent::Thinking {
        command: payload.command.clone(),
    });

    match state
        .processor
        .process_command(&payload.command, backend.as_ref())
        .await
    {
        Ok(message) => {
            let _ = state.event_tx.send(AgentEvent::TaskComplete {
                message: message.clone(),
            });
            (
                StatusCode::OK,
                Json(CommandReply {
                    ok: true,
                    message: Some(message),
                    error: None,
                }),
            )
        }
        Err(err) => {
            let message = err.user_message();
            let _ = state.event_tx.send(AgentEvent::TaskError {
                message: message.clone(),
            });
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(CommandReply {
                    ok: false,
                    message: None,
                    error: Some(message),
                }),
            )
        }
    }
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<AgentEvent, _>| match result {
            Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
            Err(_) => None,
        });
    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tabpilot::{
        ActionExecutor, AutomationConfig, BackendError, BrowserHost, HostError, LanguageModel,
        PageAutomation, PageScript, TabHandle,
    };
    use tower::ServiceExt;

    #[derive(Default)]
    struct OpenOnlyHost {
        opened: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BrowserHost for OpenOnlyHost {
        async fn open_tab(&self, url: &str) -> Result<TabHandle, HostError> {
            self.opened.lock().push(url.to_string());
            Ok(TabHandle::new("tab-1"))
        }

        async fn evaluate(
            &self,
            _tab: &TabHandle,
            _script: &PageScript,
        ) -> Result<Value, HostError> {
            Err(HostError::Unavailable("no page in tests".into()))
        }

        async fn close_tab(&self, _tab: &TabHandle) -> Result<(), HostError> {
            Ok(())
        }
    }

    struct Canned(Result<String, BackendError>);

    #[async_trait]
    impl LanguageModel for Canned {
        fn id(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
            self.0.clone()
        }
    }

    fn app_state(
        reply: Option<Result<String, BackendError>>,
    ) -> (Arc<AppState>, Arc<OpenOnlyHost>) {
        let host = Arc::new(OpenOnlyHost::default());
        let browser: Arc<dyn BrowserHost> = host.clone();
        let automation = PageAutomation::new(Arc::clone(&browser), AutomationConfig::default());
        let processor = CommandProcessor::new(ActionExecutor::new(browser, automation));
        let backends = match reply {
            Some(reply) => {
                Backends::default().with(BackendKind::Perplexity, Arc::new(Canned(reply)))
            }
            None => Backends::default(),
        };
        let state = AppState::new(processor, backends, BackendKind::Perplexity);
        (Arc::new(state), host)
    }

    async fn post_command(state: Arc<AppState>, body: Value) -> (StatusCode, Value) {
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/command")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_command_success() {
        let reply = r#"{"type": "web_search", "params": {"query": "react hooks"}}"#;
        let (state, host) = app_state(Some(Ok(reply.to_string())));
        let mut events = state.event_tx.subscribe();

        let (status, body) =
            post_command(state, json!({ "command": "SEARCH FOR REACT HOOKS" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "message": "" }));
        assert_eq!(
            *host.opened.lock(),
            vec!["https://www.google.com/search?q=react%20hooks".to_string()]
        );
        assert!(matches!(events.try_recv(), Ok(AgentEvent::Thinking { .. })));
        assert!(matches!(events.try_recv(), Ok(AgentEvent::TaskComplete { .. })));
    }

    #[tokio::test]
    async fn test_unparseable_command_is_unprocessable() {
        let (state, host) = app_state(Some(Ok("Sure, searching now!".to_string())));
        let mut events = state.event_tx.subscribe();

        let (status, body) = post_command(state, json!({ "command": "SEARCH" })).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body,
            json!({ "ok": false, "error": "Sorry, I could not understand that command." })
        );
        assert!(host.opened.lock().is_empty());
        assert!(matches!(events.try_recv(), Ok(AgentEvent::Thinking { .. })));
        match events.try_recv() {
            Ok(AgentEvent::TaskError { message }) => {
                assert_eq!(message, "Sorry, I could not understand that command.")
            }
            other => panic!("expected task_error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backend_error_details_stay_private() {
        let (state, _host) = app_state(Some(Err(BackendError::Api {
            status: 500,
            message: "upstream failure for key sk-live-1234".into(),
        })));

        let (status, body) = post_command(state, json!({ "command": "SEARCH FOR CATS" })).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["error"],
            "The assistant is unavailable right now. Please try again."
        );
        assert!(!body.to_string().contains("sk-live-1234"));
        assert!(!body.to_string().contains("upstream"));
    }

    #[tokio::test]
    async fn test_unconfigured_backend_is_unavailable() {
        let (state, host) = app_state(None);
        let mut events = state.event_tx.subscribe();

        let (status, body) = post_command(state, json!({ "command": "SEARCH FOR CATS" })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "The perplexity assistant is not configured.");
        assert!(host.opened.lock().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_request_can_pick_another_backend() {
        let reply = r#"{"type": "web_search", "params": {"query": "cats"}}"#;
        let (state, _host) = app_state(Some(Ok(reply.to_string())));

        let (status, body) = post_command(
            state,
            json!({ "command": "SEARCH FOR CATS", "backend": "gemini" }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "The gemini assistant is not configured.");
    }

    #[tokio::test]
    async fn test_health_and_event_stream() {
        let (state, _host) = app_state(None);

        let health = router(Arc::clone(&state))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let events = router(state)
            .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(events.status(), StatusCode::OK);
        assert_eq!(events.headers()["content-type"], "text/event-stream");
    }
}
