pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod rate_limit;
pub mod server;
