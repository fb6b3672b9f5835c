use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::models::Message;
use crate::status::Status;

pub const SLACK_API_URL: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rejected by {service}: {reason}")]
    Rejected { service: &'static str, reason: String },
}

/// Delivers alert messages to one external channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, msg: &Message) -> Result<(), NotifyError>;
}

/// Posts messages into a Slack channel through `chat.postMessage`.
pub struct SlackNotifier {
    channel: String,
    token: String,
    api_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SlackReply {
    ok: bool,
    error: Option<String>,
}

impl SlackNotifier {
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            token: token.into(),
            api_url: SLACK_API_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn color(status: Status) -> &'static str {
        match status {
            Status::Ok => "good",
            Status::Alert => "danger",
            _ => "#808080",
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn notify(&self, msg: &Message) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "channel": self.channel,
            "attachments": [{
                "color": Self::color(msg.status),
                "text": msg.text,
            }]
        });

        let reply: SlackReply = self
            .client
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if reply.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                service: "slack",
                reason: reply.error.unwrap_or_else(|| "unknown error".into()),
            })
        }
    }
}

/// Posts an embed to a Discord-style incoming webhook.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }

    fn color(status: Status) -> u32 {
        match status {
            Status::Ok => 0x2ECC71,
            Status::Alert => 0xE74C3C,
            _ => 0x808080,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, msg: &Message) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "username": "heartilly",
            "embeds": [{
                "title": format!("Status changed: {}", msg.status),
                "description": msg.text,
                "color": Self::color(msg.status),
                "timestamp": Utc::now().to_rfc3339(),
            }]
        });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::serve;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn capture(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let reply = if body["channel"] == "#broken" {
            serde_json::json!({ "ok": false, "error": "channel_not_found" })
        } else {
            serde_json::json!({ "ok": true })
        };
        captured.lock().unwrap().push((auth, body));
        Json(reply)
    }

    fn alert() -> Message {
        Message { text: "Alert: api\nhttp://x - 500 Internal Server Error".into(), status: Status::Alert }
    }

    #[test]
    fn slack_colors() {
        assert_eq!(SlackNotifier::color(Status::Ok), "good");
        assert_eq!(SlackNotifier::color(Status::Alert), "danger");
        assert_eq!(SlackNotifier::color(Status::Unknown), "#808080");
        assert_eq!(SlackNotifier::color(Status::Initial), "#808080");
    }

    #[test]
    fn webhook_colors() {
        assert_eq!(WebhookNotifier::color(Status::Ok), 0x2ECC71);
        assert_eq!(WebhookNotifier::color(Status::Alert), 0xE74C3C);
        assert_eq!(WebhookNotifier::color(Status::Unknown), 0x808080);
    }

    #[tokio::test]
    async fn slack_posts_attachment() {
        let captured = Captured::default();
        let addr = serve(
            Router::new()
                .route("/api/chat.postMessage", post(capture))
                .with_state(captured.clone()),
        )
        .await;

        let notifier = SlackNotifier::new("xoxb-token", "#general")
            .with_api_url(format!("http://{}/api", addr));
        notifier.notify(&alert()).await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (auth, body) = &captured[0];
        assert_eq!(auth.as_deref(), Some("Bearer xoxb-token"));
        assert_eq!(body["channel"], "#general");
        assert_eq!(body["attachments"][0]["color"], "danger");
        assert_eq!(body["attachments"][0]["text"], alert().text);
    }

    #[tokio::test]
    async fn slack_not_ok_is_an_error() {
        let captured = Captured::default();
        let addr = serve(
            Router::new()
                .route("/api/chat.postMessage", post(capture))
                .with_state(captured),
        )
        .await;

        let notifier = SlackNotifier::new("xoxb-token", "#broken")
            .with_api_url(format!("http://{}/api", addr));
        let err = notifier.notify(&alert()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { reason, .. } if reason == "channel_not_found"));
    }

    #[tokio::test]
    async fn webhook_posts_embed() {
        let captured = Captured::default();
        let addr = serve(
            Router::new()
                .route("/hook", post(capture))
                .with_state(captured.clone()),
        )
        .await;

        let notifier = WebhookNotifier::new(format!("http://{}/hook", addr));
        notifier.notify(&alert()).await.unwrap();

        let captured = captured.lock().unwrap();
        let (_, body) = &captured[0];
        assert_eq!(body["embeds"][0]["color"], 0xE74C3C);
        assert_eq!(body["embeds"][0]["description"], alert().text);
    }

    #[tokio::test]
    async fn webhook_server_error_is_an_error() {
        let addr = serve(Router::new().route(
            "/hook",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;

        let notifier = WebhookNotifier::new(format!("http://{}/hook", addr));
        assert!(matches!(notifier.notify(&alert()).await, Err(NotifyError::Http(_))));
    }
}
