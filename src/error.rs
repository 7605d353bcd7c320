use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Startup-time configuration failures. Any of these is fatal to the
/// process: the gateway never starts with a partial model registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error("config file is not valid JSON: {0}")]
    Malformed(String),
    #[error("config schema error: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("request body is empty")]
    EmptyBody,
    #[error("request body is not valid UTF-8")]
    InvalidEncoding,
    #[error("{detail}")]
    MalformedBody {
        detail: String,
        position: usize,
        line: usize,
        column: usize,
    },
    #[error("request body has no 'model' field")]
    MissingModelField,
    #[error("model '{model_name}' not found, available models: {available:?}")]
    UnknownModel {
        model_name: String,
        available: Vec<String>,
    },
    #[error("no model configuration for this path")]
    NoModelConfig,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed Authorization header")]
    MissingCredential,
    #[error("token rejected by auth service")]
    Rejected,
    #[error("auth service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
#[error("too many requests from {client}")]
pub struct RateLimitError {
    pub client: String,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("backend returned status {status}")]
    Status { status: u16, body: String },
    #[error("backend request timed out")]
    Timeout,
    #[error("backend unreachable: {0}")]
    Transport(#[source] reqwest::Error),
}

impl UpstreamError {
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transport(err)
        }
    }
}

/// Per-request error taxonomy. Every variant maps to one structured JSON
/// response; nothing crosses the pipeline boundary unconverted.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream(UpstreamError::Status { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(UpstreamError::Transport(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            GatewayError::Validation(ValidationError::EmptyBody) => "Empty request body",
            GatewayError::Validation(ValidationError::InvalidEncoding) => {
                "Invalid request encoding"
            }
            GatewayError::Validation(ValidationError::MalformedBody { .. }) => {
                "Invalid JSON in request body"
            }
            GatewayError::Validation(ValidationError::MissingModelField) => {
                "Model name is required"
            }
            GatewayError::Validation(ValidationError::UnknownModel { .. }) => "Invalid model",
            GatewayError::Validation(ValidationError::NoModelConfig) => {
                "Model configuration not found"
            }
            GatewayError::Auth(_) => "Authentication failed",
            GatewayError::RateLimit(_) => "Rate limit exceeded",
            GatewayError::Upstream(UpstreamError::Timeout) => "Upstream timeout",
            GatewayError::Upstream(_) => "Upstream error",
            GatewayError::Internal(_) => "Internal server error",
        }
    }

    pub fn to_response(&self) -> HttpResponse {
        match self {
            // Backend errors pass through with the exact upstream status and
            // body, never rewrapped.
            GatewayError::Upstream(UpstreamError::Status { status, body }) => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
                HttpResponse::build(status).body(body.clone())
            }
            GatewayError::Validation(ValidationError::MalformedBody {
                detail,
                position,
                line,
                column,
            }) => HttpResponse::build(self.http_status()).json(json!({
                "error": self.label(),
                "detail": detail,
                "position": position,
                "line": line,
                "column": column,
            })),
            other => HttpResponse::build(other.http_status()).json(json!({
                "error": other.label(),
                "detail": other.to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(
            GatewayError::from(ValidationError::EmptyBody).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::from(AuthError::MissingCredential).http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::from(RateLimitError {
                client: "1.2.3.4".to_string()
            })
            .http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::from(UpstreamError::Timeout).http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::Internal("boom".to_string()).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn upstream_status_passes_through_verbatim() {
        let err = GatewayError::from(UpstreamError::Status {
            status: 503,
            body: r#"{"error": "overloaded"}"#.to_string(),
        });
        let resp = err.to_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], &br#"{"error": "overloaded"}"#[..]);
    }

    #[actix_web::test]
    async fn malformed_body_reports_position() {
        let err = GatewayError::from(ValidationError::MalformedBody {
            detail: "expected value".to_string(),
            position: 10,
            line: 1,
            column: 11,
        });
        let resp = err.to_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["position"], 10);
        assert_eq!(json["line"], 1);
        assert_eq!(json["column"], 11);
    }
}
