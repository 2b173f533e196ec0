mod app;
mod auth;
mod config;
mod error;
mod rate_limit;
mod state;
mod users;

use crate::{config::AppConfig, rate_limit::RateLimiter, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "parcelgate=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    if config.allow_admin_signup {
        tracing::warn!("ALLOW_ADMIN_SIGNUP is on: clients may self-assign the admin role");
    }
    let (host, port) = (config.host.clone(), config.port);

    let limiter = RateLimiter::new(config.rate_limit.clone());
    let app_state = AppState::init(config).await?;

    {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(limiter.window());
            loop {
                tick.tick().await;
                limiter.cleanup();
            }
        });
    }

    let app = app::build_app(app_state, limiter);
    app::serve(app, &host, port).await
}
