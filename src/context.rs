use crate::config::{ModelConfig, ServerConfig};
use crate::error::ValidationError;
use actix_web::http::Method;
use actix_web::http::header::HeaderMap;
use actix_web::HttpRequest;
use bytes::Bytes;
use serde_json::Value;
use std::time::Instant;

/// Paths under this prefix carry a model request body and must resolve to a
/// configured backend; everything else has no backend and is rejected
/// before dispatch.
pub const API_PREFIX: &str = "/v1/";

/// Per-request state, exclusively owned by the request's task. Created at
/// pipeline entry and populated stage by stage; later stages read the
/// cached `parsed_body` and `resolved_model` instead of re-reading the raw
/// body.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub raw_body: Bytes,
    pub parsed_body: Option<Value>,
    pub resolved_model: Option<ModelConfig>,
    pub client_identity: String,
    pub start_time: Instant,
    pub is_stream: bool,
}

impl RequestContext {
    pub fn new(req: &HttpRequest, body: Bytes) -> Self {
        let client_identity = req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        RequestContext {
            method: req.method().clone(),
            path: req.path().to_string(),
            headers: req.headers().clone(),
            raw_body: body,
            parsed_body: None,
            resolved_model: None,
            client_identity,
            start_time: Instant::now(),
            is_stream: false,
        }
    }

    pub fn requires_model(&self) -> bool {
        self.path.starts_with(API_PREFIX)
    }

    /// Parses and validates the body, then resolves the model against the
    /// registry. Non-API paths skip everything and keep `resolved_model`
    /// empty; the dispatcher rejects them later since there is no default
    /// backend.
    pub fn resolve_model(&mut self, config: &ServerConfig) -> Result<(), ValidationError> {
        if !self.requires_model() {
            return Ok(());
        }
        if self.raw_body.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let text =
            std::str::from_utf8(&self.raw_body).map_err(|_| ValidationError::InvalidEncoding)?;
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let parsed: Value =
            serde_json::from_str(text).map_err(|e| malformed_body(text, &e))?;
        let model_name = parsed
            .get("model")
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingModelField)?;
        let model = config.resolve(model_name)?.clone();
        self.is_stream = parsed
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.resolved_model = Some(model);
        self.parsed_body = Some(parsed);
        Ok(())
    }
}

fn malformed_body(text: &str, err: &serde_json::Error) -> ValidationError {
    let (line, column) = (err.line(), err.column());
    ValidationError::MalformedBody {
        detail: err.to_string(),
        position: byte_offset(text, line, column),
        line,
        column,
    }
}

/// Converts serde_json's one-based line/column into the byte offset of the
/// offending character, matching the diagnostics callers already consume.
pub(crate) fn byte_offset(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    line_start + column.saturating_sub(1)
}
