//! Delivery of results back to the requester.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use keywordkit_shared::{KeywordKitError, Result};

const USER_AGENT: &str = concat!("KeywordKit/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(10);

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(TIMEOUT)
        .build()
        .map_err(|e| KeywordKitError::Notify(format!("client build: {e}")))
}

/// Where a batch's outcome should be reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    /// Per-command webhook handed out by the chat platform.
    pub response_url: Option<String>,
    pub channel_id: Option<String>,
}

/// Sends a JSON message to a destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, destination: &Destination, message: &Value) -> Result<()>;
}

/// Posts messages to the destination's `response_url`.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, destination: &Destination, message: &Value) -> Result<()> {
        let url = destination
            .response_url
            .as_deref()
            .ok_or_else(|| KeywordKitError::Notify("destination has no response_url".into()))?;

        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(|e| KeywordKitError::Notify(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeywordKitError::Notify(format!("{url}: HTTP {status}")));
        }

        debug!(%url, "notification delivered");
        Ok(())
    }
}

/// Envelope every Web API method answers with.
#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts messages into the destination channel as the bot, joining the
/// channel once if the bot is not a member yet.
pub struct BotNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl BotNotifier {
    /// `api_url` is the Web API base, e.g. `https://slack.com/api`.
    pub fn new(api_url: &str, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn call(&self, method: &str, payload: &Value) -> Result<ApiReply> {
        let url = format!("{}/{method}", self.api_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| KeywordKitError::Notify(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeywordKitError::Notify(format!("{method}: HTTP {status}")));
        }
        response
            .json::<ApiReply>()
            .await
            .map_err(|e| KeywordKitError::Notify(format!("{method}: bad reply: {e}")))
    }

    async fn post_message(&self, payload: &Value) -> Result<ApiReply> {
        self.call("chat.postMessage", payload).await
    }
}

fn api_error(method: &str, reply: &ApiReply) -> KeywordKitError {
    KeywordKitError::Notify(format!(
        "{method}: {}",
        reply.error.as_deref().unwrap_or("unknown error")
    ))
}

#[async_trait]
impl Notifier for BotNotifier {
    async fn notify(&self, destination: &Destination, message: &Value) -> Result<()> {
        let channel = destination
            .channel_id
            .as_deref()
            .ok_or_else(|| KeywordKitError::Notify("destination has no channel_id".into()))?;

        let mut payload = message.clone();
        if let Some(fields) = payload.as_object_mut() {
            fields.remove("response_type");
            fields.insert("channel".into(), Value::String(channel.to_string()));
        }

        let reply = self.post_message(&payload).await?;
        if reply.ok {
            debug!(channel, "message posted");
            return Ok(());
        }
        if reply.error.as_deref() != Some("not_in_channel") {
            return Err(api_error("chat.postMessage", &reply));
        }

        info!(channel, "bot not in channel, joining");
        let joined = self
            .call("conversations.join", &json!({ "channel": channel }))
            .await?;
        if !joined.ok {
            return Err(api_error("conversations.join", &joined));
        }

        let retry = self.post_message(&payload).await?;
        if retry.ok {
            debug!(channel, "message posted after join");
            Ok(())
        } else {
            Err(api_error("chat.postMessage", &retry))
        }
    }
}

/// Tries `primary`, then `fallback` if the primary fails.
pub struct FallbackNotifier {
    pub primary: Arc<dyn Notifier>,
    pub fallback: Arc<dyn Notifier>,
}

#[async_trait]
impl Notifier for FallbackNotifier {
    async fn notify(&self, destination: &Destination, message: &Value) -> Result<()> {
        match self.primary.notify(destination, message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "primary notifier failed, falling back");
                self.fallback.notify(destination, message).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn destination(server: &wiremock::MockServer) -> Destination {
        Destination {
            response_url: Some(format!("{}/hook", server.uri())),
            channel_id: Some("C1".into()),
        }
    }

    #[tokio::test]
    async fn posts_json_to_response_url() {
        let server = wiremock::MockServer::start().await;
        let message = json!({ "text": "hello" });

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/hook"))
            .and(wiremock::matchers::body_json(&message))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new().expect("client");
        notifier
            .notify(&destination(&server), &message)
            .await
            .expect("notify");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/hook"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new().expect("client");
        let err = notifier
            .notify(&destination(&server), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, KeywordKitError::Notify(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn missing_response_url_fails() {
        let notifier = WebhookNotifier::new().expect("client");
        let err = notifier
            .notify(&Destination::default(), &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("response_url"));
    }

    fn channel_destination() -> Destination {
        Destination {
            response_url: None,
            channel_id: Some("C1".into()),
        }
    }

    fn summary() -> Value {
        json!({
            "response_type": "in_channel",
            "text": "Keyword batch processed",
            "blocks": [{ "type": "divider" }],
        })
    }

    fn posted() -> Value {
        json!({
            "channel": "C1",
            "text": "Keyword batch processed",
            "blocks": [{ "type": "divider" }],
        })
    }

    #[tokio::test]
    async fn bot_posts_to_channel_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_json(posted()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = BotNotifier::new(&format!("{}/api/", server.uri()), "xoxb-test").unwrap();
        notifier
            .notify(&channel_destination(), &summary())
            .await
            .expect("posted");
    }

    #[tokio::test]
    async fn bot_joins_channel_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "not_in_channel" })),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/conversations.join"))
            .and(body_json(json!({ "channel": "C1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = BotNotifier::new(&format!("{}/api", server.uri()), "xoxb-test").unwrap();
        notifier
            .notify(&channel_destination(), &summary())
            .await
            .expect("posted after join");
    }

    #[tokio::test]
    async fn bot_gives_up_when_retry_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "not_in_channel" })),
            )
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/conversations.join"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = BotNotifier::new(&format!("{}/api", server.uri()), "xoxb-test").unwrap();
        let err = notifier
            .notify(&channel_destination(), &summary())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not_in_channel"));
    }

    #[tokio::test]
    async fn bot_reports_other_api_errors_without_joining() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "channel_not_found" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/conversations.join"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = BotNotifier::new(&format!("{}/api", server.uri()), "xoxb-test").unwrap();
        let err = notifier
            .notify(&channel_destination(), &summary())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn fallback_uses_response_url_when_bot_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "invalid_auth" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(summary()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = FallbackNotifier {
            primary: Arc::new(
                BotNotifier::new(&format!("{}/api", server.uri()), "xoxb-bad").unwrap(),
            ),
            fallback: Arc::new(WebhookNotifier::new().unwrap()),
        };
        notifier
            .notify(&destination(&server), &summary())
            .await
            .expect("delivered via response_url");
    }
}
