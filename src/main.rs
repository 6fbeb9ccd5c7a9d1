// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Registry Control server binary.

use registry_control::{app, AppState, Config};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "registry_control=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr = config.listen_addr.clone();

    let state = Arc::new(AppState::connect(config).await?);
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Registry Control listening on http://{addr}");

    axum::serve(listener, router).await?;
    Ok(())
}
