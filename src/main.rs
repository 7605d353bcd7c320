use clap::Parser;
use model_gateway::server::{GatewayConfig, GatewayState, startup};
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "model-gateway", about = "API gateway in front of model-serving backends")]
struct Args {
    /// External auth service endpoint, called as POST <url>?token=<token>.
    #[arg(long)]
    auth_url: String,
    #[arg(long, default_value = "config.json")]
    config_path: String,
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 8000)]
    port: u16,
    /// Upstream request timeout in seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,
    /// Fixed rate-limit window in seconds.
    #[arg(long, default_value_t = 60)]
    rate_limit_window: u64,
    /// Requests admitted per client per window.
    #[arg(long, default_value_t = 100)]
    rate_limit_capacity: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        auth_url: args.auth_url,
        config_path: args.config_path,
        timeout: args.timeout,
        rate_limit_window: args.rate_limit_window,
        rate_limit_capacity: args.rate_limit_capacity,
    };
    // a broken registry is fatal: the gateway never starts partially
    let state = GatewayState::new(&config)?;

    actix_web::rt::System::new().block_on(async move {
        tokio::select! {
            res = startup(config, state) => {
                res.map_err(anyhow::Error::from)
            }
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down");
                Ok(())
            }
        }
    })
}
