//! HTTP surface: the input form and the `/check_ip` endpoint.

use crate::error::{CheckError, CONTENT_TYPE_MESSAGE, INVALID_IP_MESSAGE};
use crate::providers::{LookupRequest, ReputationProvider};
use crate::rate_limit::{self, RateLimiter};
use crate::verdict::{classify, LookupResult};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared, immutable per-process state.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no usable credential was configured at startup.
    pub provider: Option<Arc<dyn ReputationProvider>>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ReputationProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// State that answers every request with 503.
    pub fn unconfigured() -> Self {
        Self { provider: None }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }
}

/// Build the application router.
///
/// Layer order, outermost first: trace, configuration guard, content-type
/// check, rate limiter, handler. Requests rejected by the guard or the
/// content-type check never count against a client's limit.
pub fn create_app(state: AppState, limiter: Option<Arc<RateLimiter>>) -> Router {
    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/check_ip", post(check_ip));

    if let Some(limiter) = limiter {
        router = router.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::limit_by_client,
        ));
    }

    router
        .layer(middleware::from_fn(require_json_body))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ensure_configured,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until Ctrl-C or SIGTERM.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// Reject all traffic while the credential is missing.
async fn ensure_configured(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.is_configured() {
        warn!(path = %request.uri().path(), "Rejecting request: ABUSEIPDB_KEY is not configured");
        return CheckError::Configuration.into_response();
    }
    next.run(request).await
}

/// `POST /check_ip` only accepts JSON bodies.
async fn require_json_body(request: Request, next: Next) -> Response {
    if request.method() == Method::POST
        && request.uri().path() == "/check_ip"
        && !is_json_content_type(request.headers())
    {
        debug!("Rejecting /check_ip request without a JSON content type");
        return CheckError::Validation(CONTENT_TYPE_MESSAGE).into_response();
    }
    next.run(request).await
}

pub async fn check_ip(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LookupResult>, CheckError> {
    let provider = state.provider.as_ref().ok_or(CheckError::Configuration)?;

    let request = lookup_request(&body).ok_or(CheckError::Validation(INVALID_IP_MESSAGE))?;
    let ip = request.ip_address();

    let reputation = provider.check(&request).await.map_err(|e| {
        warn!(ip = %ip, provider = provider.name(), error = %e, "Reputation lookup failed");
        CheckError::from(e)
    })?;

    let result = classify(&reputation);
    info!(
        ip = %ip,
        status = ?result.status,
        score = reputation.score,
        reports = reputation.reports,
        "IP checked"
    );

    Ok(Json(result))
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"))
}

/// The `ip` field of a JSON object body, trimmed and validated. A malformed
/// body or a non-string field counts as missing.
fn lookup_request(body: &[u8]) -> Option<LookupRequest> {
    let payload: serde_json::Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "Request body is not valid JSON");
            return None;
        }
    };

    LookupRequest::parse(payload.get("ip")?.as_str()?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn test_json_content_type() {
        assert!(is_json_content_type(&headers_with("application/json")));
        assert!(is_json_content_type(&headers_with(
            "Application/JSON; charset=utf-8"
        )));
        assert!(!is_json_content_type(&headers_with("text/plain")));
        assert!(!is_json_content_type(&HeaderMap::new()));
    }

    #[test]
    fn test_lookup_request() {
        let request = lookup_request(br#"{"ip": " 8.8.8.8 "}"#).unwrap();
        assert_eq!(request.ip_address(), "8.8.8.8");

        let request = lookup_request(br#"{"ip": "2001:db8:0:0:1:0:0:1"}"#).unwrap();
        assert_eq!(request.ip_address(), "2001:db8:0:0:1:0:0:1");
        assert_eq!(request.ip(), "2001:db8::1:0:0:1".parse::<std::net::IpAddr>().unwrap());
    }

    #[test]
    fn test_lookup_request_rejects_bad_input() {
        let bodies: [&[u8]; 9] = [
            br#"{"ip": ""}"#,
            br#"{"ip": "256.1.1.1"}"#,
            br#"{"ip": "1.2.3"}"#,
            br#"{"ip": "not an ip"}"#,
            br#"{"ip": 12345}"#,
            br#"{"address": "8.8.8.8"}"#,
            br#"["8.8.8.8"]"#,
            b"{not json",
            b"",
        ];
        for body in bodies {
            assert!(lookup_request(body).is_none(), "accepted {:?}", body);
        }
    }

    #[test]
    fn test_unconfigured_state() {
        assert!(!AppState::unconfigured().is_configured());
    }
}
