use crate::context::RequestContext;
use crate::error::{GatewayError, UpstreamError, ValidationError};
use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use futures::StreamExt;
use serde_json::{Value, json};

/// Terminal pipeline stage: issues the single proxied call to the resolved
/// backend, blocking or streaming depending on the request.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(client: reqwest::Client) -> Self {
        Dispatcher { client }
    }

    pub async fn dispatch(&self, ctx: &RequestContext) -> Result<HttpResponse, GatewayError> {
        let model = ctx
            .resolved_model
            .as_ref()
            .ok_or(ValidationError::NoModelConfig)?;
        let body = ctx.parsed_body.as_ref().ok_or_else(|| {
            GatewayError::Internal("request body missing from context".to_string())
        })?;
        let url = model.backend_url(&ctx.path);
        let method = reqwest::Method::from_bytes(ctx.method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::POST);
        log::info!(
            "dispatching {} {} to {} (stream: {})",
            ctx.method,
            ctx.path,
            url,
            ctx.is_stream
        );
        let response = self
            .client
            .request(method, &url)
            .headers(upstream_headers(ctx, &model.api_key))
            .json(body)
            .send()
            .await
            .map_err(UpstreamError::from_transport)?;
        if ctx.is_stream {
            relay_stream(response).await
        } else {
            collect_blocking(response).await
        }
    }
}

/// Forwards the inbound headers with `Authorization` rewritten to the
/// resolved model's credential. Host and content-length belong to the new
/// connection and are dropped.
fn upstream_headers(ctx: &RequestContext, api_key: &str) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in ctx.headers.iter() {
        let name = name.as_str();
        if name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("authorization")
        {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key)) {
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }
    headers
}

fn upstream_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// Blocking mode: wait for the whole response. A 2xx body that is not JSON
/// is still returned to the caller, wrapped as `{"response": <text>}`; a
/// non-2xx status propagates verbatim with the backend's body.
async fn collect_blocking(response: reqwest::Response) -> Result<HttpResponse, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        }
        .into());
    }
    let text = response.text().await.map_err(UpstreamError::from_transport)?;
    let payload = match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(_) => json!({ "response": text }),
    };
    Ok(HttpResponse::build(upstream_status(status)).json(payload))
}

/// Streaming mode: relay upstream chunks as they arrive, preserving chunk
/// boundaries and content-type, without buffering the body. Dropping the
/// inbound connection drops this stream, which cancels the outbound call.
/// A mid-stream upstream failure ends the relay; headers have already been
/// flushed and are not re-sent.
async fn relay_stream(response: reqwest::Response) -> Result<HttpResponse, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        }
        .into());
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let stream = response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| {
            log::error!("upstream stream failed mid-relay: {}", e);
            actix_web::error::ErrorBadGateway(e)
        })
    });
    Ok(HttpResponse::build(upstream_status(status))
        .content_type(content_type)
        .streaming(stream))
}
