//! HTTP front end for KeywordKit.
//!
//! Accepts slash commands, queues batches for background processing,
//! reports results back through a [`Notifier`], and serves rendered reports
//! behind a shared secret. Platform callbacks must carry a valid request
//! signature (see [`verify`]).

pub mod dispatch;
pub mod download;
pub mod notify;
pub mod routes;
pub mod summary;
pub mod verify;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use keywordkit_core::TopicClassifier;
use keywordkit_shared::{KeywordKitError, Result, ServerSettings};
use keywordkit_storage::{BatchStore, InMemoryBatchStore};

pub use dispatch::{Dispatcher, Job, JobOutcome, JobQueue, JobTicket};
pub use notify::{BotNotifier, Destination, FallbackNotifier, Notifier, WebhookNotifier};

/// Upper bound on how often expired batches are swept.
const MAX_EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across handlers.
pub struct AppState {
    pub settings: Arc<ServerSettings>,
    pub store: Arc<dyn BatchStore>,
    pub queue: JobQueue,
}

/// Build the router with all routes and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::slack_routes())
        .merge(routes::download_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C.
pub async fn serve(settings: ServerSettings, classifier: TopicClassifier) -> Result<()> {
    let settings = Arc::new(settings);

    let memory_store = Arc::new(match settings.ttl {
        Some(ttl) => InMemoryBatchStore::with_ttl(ttl),
        None => InMemoryBatchStore::new(),
    });
    if let Some(ttl) = settings.ttl {
        spawn_eviction(Arc::clone(&memory_store), ttl.min(MAX_EVICTION_INTERVAL));
    }
    let store: Arc<dyn BatchStore> = memory_store;

    let dispatcher = Dispatcher {
        classifier: Arc::new(classifier),
        store: Arc::clone(&store),
        notifier: build_notifier(&settings)?,
        settings: Arc::clone(&settings),
    };
    let (queue, dispatch_handle) = dispatcher.spawn(settings.queue_capacity, settings.workers);

    let state = Arc::new(AppState {
        settings: Arc::clone(&settings),
        store,
        queue,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(settings.addr)
        .await
        .map_err(|e| KeywordKitError::Server(format!("failed to bind {}: {e}", settings.addr)))?;
    info!(addr = %settings.addr, base_url = %settings.base_url, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| KeywordKitError::Server(e.to_string()))?;

    // The router held the last queue sender, so the dispatcher now sees a
    // closed queue and finishes the jobs it already took.
    info!("draining job queue");
    dispatch_handle
        .await
        .map_err(|e| KeywordKitError::Server(format!("dispatcher task failed: {e}")))?;

    info!("server stopped");
    Ok(())
}

/// Bot delivery when a bot token is configured, with `response_url` as the
/// fallback. Webhook delivery only otherwise.
fn build_notifier(settings: &ServerSettings) -> Result<Arc<dyn Notifier>> {
    let webhook: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new()?);
    match &settings.bot_token {
        Some(token) => Ok(Arc::new(FallbackNotifier {
            primary: Arc::new(BotNotifier::new(settings.api_url.as_str(), token.clone())?),
            fallback: webhook,
        })),
        None => Ok(webhook),
    }
}

fn spawn_eviction(store: Arc<InMemoryBatchStore>, every: Duration) {
    // A zero period would make `interval` panic.
    let every = every.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = store.evict_expired() {
                warn!(error = %e, "batch eviction failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use serde_json::Value;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use keywordkit_shared::{
        AppConfig, ArtifactHandle, BatchId, BatchRecord, Requester, Secrets,
    };

    use super::*;
    use crate::summary::{ACK_TEXT, USAGE_TEXT};
    use crate::verify::{SIGNATURE_HEADER, TIMESTAMP_HEADER, sign};

    const SIGNING_SECRET: &str = "test-signing";
    const HOOK_URL: &str = "https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1%2F1%2Fx";

    struct ChannelNotifier {
        tx: mpsc::UnboundedSender<(Destination, Value)>,
    }

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn notify(&self, destination: &Destination, message: &Value) -> Result<()> {
            let _ = self.tx.send((destination.clone(), message.clone()));
            Ok(())
        }
    }

    struct Harness {
        app: Router,
        store: Arc<dyn BatchStore>,
        sent: mpsc::UnboundedReceiver<(Destination, Value)>,
        output_dir: std::path::PathBuf,
    }

    fn harness() -> Harness {
        harness_with_token("s3cret")
    }

    fn harness_with_token(download_token: &str) -> Harness {
        let output_dir = std::env::temp_dir().join(format!("kk_router_test_{}", BatchId::new()));
        let mut config = AppConfig::default();
        config.report.output_dir = output_dir.to_string_lossy().into_owned();
        let secrets = Secrets {
            download_token: download_token.into(),
            signing_secret: SIGNING_SECRET.into(),
            bot_token: None,
        };
        let settings = Arc::new(ServerSettings::from_config(&config, secrets).expect("settings"));

        let store: Arc<dyn BatchStore> = Arc::new(InMemoryBatchStore::new());
        let (tx, sent) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            classifier: Arc::new(TopicClassifier::default()),
            store: Arc::clone(&store),
            notifier: Arc::new(ChannelNotifier { tx }),
            settings: Arc::clone(&settings),
        };
        let (queue, _handle) = dispatcher.spawn(8, 2);

        let app = router(Arc::new(AppState {
            settings,
            store: Arc::clone(&store),
            queue,
        }));

        Harness {
            app,
            store,
            sent,
            output_dir,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn signed_request(uri: &str, content_type: &str, body: &str, sent_at: i64) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .header(TIMESTAMP_HEADER, sent_at.to_string())
            .header(SIGNATURE_HEADER, sign(SIGNING_SECRET, sent_at, body.as_bytes()))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn form_request(uri: &str, body: &str) -> Request<Body> {
        signed_request(
            uri,
            "application/x-www-form-urlencoded",
            body,
            Utc::now().timestamp(),
        )
    }

    fn event_request(body: &str) -> Request<Body> {
        signed_request("/slack/events", "application/json", body, Utc::now().timestamp())
    }

    async fn next_notification(h: &mut Harness) -> (Destination, Value) {
        tokio::time::timeout(Duration::from_secs(10), h.sent.recv())
            .await
            .expect("notification in time")
            .expect("notification")
    }

    fn download_uri(message: &Value) -> String {
        let blocks = message["blocks"].as_array().expect("blocks");
        let link = blocks.last().unwrap()["text"]["text"].as_str().unwrap();
        let start = link.find("/download/").expect("download path");
        let end = link.find('|').expect("link end");
        link[start..end].to_string()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn empty_command_gets_usage_hint() {
        let h = harness();
        let response = h
            .app
            .oneshot(form_request(
                "/slack/commands",
                "command=%2Fkeywords&text=+++&user_id=U1",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["text"], USAGE_TEXT);
    }

    #[tokio::test]
    async fn command_is_acknowledged_then_processed() {
        let mut h = harness();
        let body = format!(
            "command=%2Fkeywords&text=marketing+automation%2C+SEO+tips%2C+random\
             &user_id=U1&channel_id=C1&response_url={HOOK_URL}"
        );
        let response = h
            .app
            .clone()
            .oneshot(form_request("/slack/commands", &body))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["text"], ACK_TEXT);

        let (destination, message) = next_notification(&mut h).await;
        assert_eq!(
            destination.response_url.as_deref(),
            Some("https://hooks.slack.com/commands/T1/1/x")
        );
        assert_eq!(destination.channel_id.as_deref(), Some("C1"));
        assert_eq!(message["text"], "Keyword batch processed");
        let blocks = message["blocks"].as_array().expect("blocks");
        assert_eq!(blocks[1]["text"]["text"], "*Cleaned keywords:* 3");

        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(download_uri(&message))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));

        let _ = std::fs::remove_dir_all(&h.output_dir);
    }

    #[tokio::test]
    async fn unsigned_stale_or_forged_commands_are_rejected() {
        let mut h = harness();
        let body = "command=%2Fkeywords&text=crm&channel_id=C1";

        let unsigned = Request::builder()
            .method("POST")
            .uri("/slack/commands")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();

        let stale = signed_request(
            "/slack/commands",
            "application/x-www-form-urlencoded",
            body,
            Utc::now().timestamp() - 600,
        );

        let now = Utc::now().timestamp();
        let forged = Request::builder()
            .method("POST")
            .uri("/slack/commands")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(TIMESTAMP_HEADER, now.to_string())
            .header(SIGNATURE_HEADER, sign("someone-else", now, body.as_bytes()))
            .body(Body::from(body))
            .unwrap();

        for request in [unsigned, stale, forged] {
            let response = h.app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn response_url_off_the_hooks_host_is_dropped() {
        let mut h = harness();
        for url in [
            "http%3A%2F%2F169.254.169.254%2Flatest%2Fmeta-data",
            "https%3A%2F%2Finternal.example%2Fhook",
            "http%3A%2F%2Fhooks.slack.com%2Fcommands%2Fx",
        ] {
            let body = format!("command=%2Fkeywords&text=crm&channel_id=C9&response_url={url}");
            let response = h
                .app
                .clone()
                .oneshot(form_request("/slack/commands", &body))
                .await
                .unwrap();
            assert_eq!(body_json(response).await["text"], ACK_TEXT);

            let (destination, _) = next_notification(&mut h).await;
            assert_eq!(destination.response_url, None, "{url}");
            assert_eq!(destination.channel_id.as_deref(), Some("C9"));
        }
        let _ = std::fs::remove_dir_all(&h.output_dir);
    }

    #[tokio::test]
    async fn event_challenge_is_echoed() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(event_request(
                r#"{"type":"url_verification","challenge":"abc123"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["challenge"], "abc123");

        let response = h
            .app
            .oneshot(event_request(r#"{"type":"event_callback"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn events_require_a_signature() {
        let h = harness();
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/slack/events")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"type":"url_verification","challenge":"abc123"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn download_link_works_with_reserved_characters_in_token() {
        let mut h = harness_with_token("a+b&c=d #e");
        let body = "command=%2Fkeywords&text=crm+tools&channel_id=C1";
        let response = h
            .app
            .clone()
            .oneshot(form_request("/slack/commands", body))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["text"], ACK_TEXT);

        let (_, message) = next_notification(&mut h).await;
        let uri = download_uri(&message);
        assert!(!uri.contains(' ') && !uri.contains('#'), "{uri}");

        let response = h
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let _ = std::fs::remove_dir_all(&h.output_dir);
    }

    #[tokio::test]
    async fn download_distinguishes_unauthorized_and_not_found() {
        let h = harness();
        let unknown = BatchId::new();

        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/download/{unknown}?token=wrong"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/download/{unknown}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/download/{unknown}?token=s3cret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Known batch whose file has been removed
        let id = BatchId::new();
        h.store
            .put(
                id,
                BatchRecord {
                    id,
                    keywords: vec![],
                    groups: vec![],
                    outlines: BTreeMap::new(),
                    post_ideas: BTreeMap::new(),
                    requester: Requester::default(),
                    artifact: ArtifactHandle {
                        batch_id: id,
                        path: h.output_dir.join("gone.pdf"),
                        page_count: 1,
                        sha256: String::new(),
                        size_bytes: 0,
                    },
                    created_at: Utc::now(),
                },
            )
            .expect("put");
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri(format!("/download/{id}?token=s3cret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
