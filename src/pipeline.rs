use crate::auth::AuthValidator;
use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::error::{AuthError, GatewayError};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use std::sync::Arc;

/// One unit of the ordered validation chain. A stage either advances the
/// context (possibly populating a field on it) or fails, which
/// short-circuits the remaining stages into a structured error response.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &mut RequestContext) -> Result<(), GatewayError>;
}

struct ModelResolutionStage {
    config: Arc<ServerConfig>,
}

#[async_trait]
impl PipelineStage for ModelResolutionStage {
    fn name(&self) -> &'static str {
        "model_resolution"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<(), GatewayError> {
        ctx.resolve_model(&self.config)?;
        Ok(())
    }
}

struct RateLimitStage {
    limiter: Arc<RateLimiter>,
}

#[async_trait]
impl PipelineStage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<(), GatewayError> {
        self.limiter.admit(&ctx.client_identity)?;
        Ok(())
    }
}

struct AuthStage {
    auth: AuthValidator,
}

#[async_trait]
impl PipelineStage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<(), GatewayError> {
        let token = AuthValidator::bearer_token(&ctx.headers)?;
        match self.auth.authenticate(token).await {
            Ok(()) => Ok(()),
            Err(e @ AuthError::Unreachable(_)) => {
                // distinct from a plain rejection, even though both are 401
                log::error!("auth service unreachable: {}", e);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Runs the fixed stage chain in order, stopping at the first failure.
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn new(
        config: Arc<ServerConfig>,
        limiter: Arc<RateLimiter>,
        auth: AuthValidator,
    ) -> Self {
        Self::from_stages(vec![
            Box::new(ModelResolutionStage { config }),
            Box::new(RateLimitStage { limiter }),
            Box::new(AuthStage { auth }),
        ])
    }

    pub fn from_stages(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Pipeline { stages }
    }

    pub async fn run(&self, ctx: &mut RequestContext) -> Result<(), GatewayError> {
        for stage in &self.stages {
            if let Err(e) = stage.run(ctx).await {
                log::warn!(
                    "{} {} rejected at {} stage: {}",
                    ctx.method,
                    ctx.path,
                    stage.name(),
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }
}
