use crate::auth::AuthValidator;
use crate::config::ServerConfig;
use crate::context::{RequestContext, byte_offset};
use crate::pipeline::Pipeline;
use crate::proxy::Dispatcher;
use crate::rate_limit::RateLimiter;
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{HttpRequest, HttpResponse, HttpServer, get, post, web};
use bytes::Bytes;
use serde_json::{Value, json};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const SERVICE_NAME: &str = "model-gateway";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub auth_url: String,
    pub config_path: String,
    pub timeout: u64,
    pub rate_limit_window: u64,
    pub rate_limit_capacity: u32,
}

/// Composition root: the registry, limiter, auth validator and dispatcher
/// are built once here and handed to the pipeline explicitly.
pub struct GatewayState {
    pub pipeline: Pipeline,
    pub dispatcher: Dispatcher,
}

impl GatewayState {
    pub fn new(gateway_config: &GatewayConfig) -> anyhow::Result<Self> {
        let server_config = ServerConfig::load(Path::new(&gateway_config.config_path))?;
        Self::with_registry(gateway_config, server_config)
    }

    pub fn with_registry(
        gateway_config: &GatewayConfig,
        server_config: ServerConfig,
    ) -> anyhow::Result<Self> {
        if server_config.is_empty() {
            log::warn!("model registry is empty, every API request will be rejected");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(gateway_config.timeout))
            .build()?;
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(gateway_config.rate_limit_window),
            gateway_config.rate_limit_capacity,
        ));
        let auth = AuthValidator::new(gateway_config.auth_url.clone(), client.clone());
        let pipeline = Pipeline::new(Arc::new(server_config), limiter, auth);
        Ok(GatewayState {
            pipeline,
            dispatcher: Dispatcher::new(client),
        })
    }
}

#[get("/health")]
pub async fn health(_req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

/// Echoes whether the posted body parses as JSON, with the same positional
/// diagnostics the pipeline produces. Bypasses every pipeline stage.
#[post("/debug/json")]
pub async fn debug_json(body: Bytes) -> HttpResponse {
    if body.is_empty() {
        return HttpResponse::Ok().json(json!({
            "status": "error",
            "message": "Empty request body",
        }));
    }
    let text = match std::str::from_utf8(&body) {
        Ok(text) => text,
        Err(_) => {
            return HttpResponse::Ok().json(json!({
                "status": "error",
                "message": "Request body must be valid UTF-8",
            }));
        }
    };
    match serde_json::from_str::<Value>(text) {
        Ok(parsed) => HttpResponse::Ok().json(json!({
            "status": "success",
            "message": "JSON parsed successfully",
            "parsed_data": parsed,
        })),
        Err(e) => HttpResponse::Ok().json(json!({
            "status": "error",
            "message": "JSON parse error",
            "error": e.to_string(),
            "position": byte_offset(text, e.line(), e.column()),
            "line": e.line(),
            "column": e.column(),
            "body_preview": text.chars().take(200).collect::<String>(),
        })),
    }
}

/// Catch-all entry point: every non-health, non-debug request goes through
/// the full stage chain and then out to the resolved backend. Stage errors
/// become structured responses here; nothing propagates to actix raw.
pub async fn dispatch(
    req: HttpRequest,
    body: Bytes,
    app_state: web::Data<GatewayState>,
) -> HttpResponse {
    let mut ctx = RequestContext::new(&req, body);
    log::info!("request received: {} {}", ctx.method, ctx.path);

    let result = match app_state.pipeline.run(&mut ctx).await {
        Ok(()) => app_state.dispatcher.dispatch(&ctx).await,
        Err(e) => Err(e),
    };
    let mut response = match result {
        Ok(response) => response,
        Err(e) => e.to_response(),
    };

    let elapsed = ctx.start_time.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&format!("{:.3}", elapsed)) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-process-time"), value);
    }
    log::info!(
        "request finished: {} {} - status: {} - elapsed: {:.3}s",
        ctx.method,
        ctx.path,
        response.status(),
        elapsed
    );
    response
}

pub async fn startup(config: GatewayConfig, state: GatewayState) -> std::io::Result<()> {
    let app_state = web::Data::new(state);

    println!("Starting server at {}:{}", config.host, config.port);

    // default level is info
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .init();

    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(app_state.clone())
            .service(health)
            .service(debug_json)
            .default_service(web::route().to(dispatch))
    })
    .bind((config.host.clone(), config.port))?
    .run()
    .await
}
