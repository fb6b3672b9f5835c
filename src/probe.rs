use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::Monitor;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unsupported method {0}")]
    Method(String),

    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),

    #[error("request failed: {0}")]
    Request(reqwest::Error),

    #[error("check cancelled")]
    Cancelled,
}

impl ProbeError {
    /// Reason recorded for a check that ended in this error.
    pub fn reason(&self) -> &'static str {
        "error"
    }
}

/// Classified outcome of a completed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub reason: String,
}

impl ProbeOutcome {
    fn timeout() -> Self {
        Self { healthy: false, reason: "timeout".into() }
    }
}

/// Single HTTP check against one monitor.
pub struct Probe {
    method: Method,
    url: String,
    client: Client,
}

impl Probe {
    pub fn new(monitor: &Monitor, timeout: Duration) -> Result<Self, ProbeError> {
        let method = Method::from_bytes(monitor.method.as_bytes())
            .map_err(|_| ProbeError::Method(monitor.method.clone()))?;
        let redirect = if monitor.follow { Policy::default() } else { Policy::none() };
        let client = Client::builder()
            .redirect(redirect)
            .timeout(timeout)
            .build()
            .map_err(ProbeError::Client)?;

        Ok(Self { method, url: monitor.url.clone(), client })
    }

    pub async fn check(&self, cancel: &CancellationToken) -> Result<ProbeOutcome, ProbeError> {
        let request = self.client.request(self.method.clone(), &self.url).send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            response = request => response,
        };

        match response {
            Ok(resp) => {
                let status = resp.status();
                Ok(ProbeOutcome {
                    healthy: status.as_u16() < 400,
                    reason: status_line(status),
                })
            }
            Err(e) if e.is_timeout() => Ok(ProbeOutcome::timeout()),
            Err(e) => Err(ProbeError::Request(e)),
        }
    }
}

/// `"<code> <reason>"`, or the bare code when the status has no canonical reason.
fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;

    /// Serves `router` on an ephemeral local port for the rest of the test.
    pub(crate) async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    pub(crate) fn monitor(url: String, follow: bool) -> Monitor {
        Monitor { id: 1, name: "test".into(), method: "GET".into(), url, follow }
    }

    fn router() -> Router {
        Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route(
                "/error",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "error") }),
            )
            .route(
                "/moved",
                get(|| async {
                    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/ok")]).into_response()
                }),
            )
            .route(
                "/odd",
                get(|| async { (StatusCode::from_u16(599).unwrap(), "odd") }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
    }

    async fn check(path: &str, follow: bool, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        let addr = serve(router()).await;
        let probe = Probe::new(&monitor(format!("http://{}{}", addr, path), follow), timeout).unwrap();
        probe.check(&CancellationToken::new()).await
    }

    fn outcome(healthy: bool, reason: &str) -> ProbeOutcome {
        ProbeOutcome { healthy, reason: reason.into() }
    }

    #[tokio::test]
    async fn ok_is_healthy() {
        let got = check("/ok", false, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(got, outcome(true, "200 OK"));
    }

    #[tokio::test]
    async fn server_error_is_unhealthy() {
        let got = check("/error", false, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(got, outcome(false, "500 Internal Server Error"));
    }

    #[tokio::test]
    async fn nonstandard_status_uses_bare_code() {
        let got = check("/odd", false, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(got, outcome(false, "599"));
    }

    #[tokio::test]
    async fn redirect_not_followed() {
        let got = check("/moved", false, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(got, outcome(true, "301 Moved Permanently"));
    }

    #[tokio::test]
    async fn redirect_followed() {
        let got = check("/moved", true, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(got, outcome(true, "200 OK"));
    }

    #[tokio::test]
    async fn timeout_is_not_an_error() {
        let got = check("/slow", false, Duration::from_millis(200)).await.unwrap();
        assert_eq!(got, outcome(false, "timeout"));
    }

    #[tokio::test]
    async fn missing_route_is_unhealthy() {
        let got = check("/nope", false, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(got, outcome(false, "404 Not Found"));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        // nothing listens on the port once the listener is dropped
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = Probe::new(&monitor(format!("http://{}/", addr), false), DEFAULT_TIMEOUT).unwrap();
        let err = probe.check(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Request(_)));
        assert_eq!(err.reason(), "error");
    }

    #[tokio::test]
    async fn cancellation_aborts_request() {
        let addr = serve(router()).await;
        let probe = Probe::new(&monitor(format!("http://{}/slow", addr), false), DEFAULT_TIMEOUT).unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = probe.check(&cancel).await.unwrap_err();
        assert!(matches!(err, ProbeError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn invalid_method_rejected() {
        let mut m = monitor("http://127.0.0.1/".into(), false);
        m.method = "BAD METHOD".into();
        assert!(matches!(Probe::new(&m, DEFAULT_TIMEOUT), Err(ProbeError::Method(_))));
    }
}
