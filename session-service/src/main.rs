// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::sync::Arc;

use session_service::{
    Engine,
    api::{AppState, build_router},
    config::{EngineSettings, parse_bind_addr},
    notify::BroadcastSink,
    reporter::reporter_for,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "session_service=debug,tower_http=info".to_string()),
        )
        .init();

    let settings = EngineSettings::from_env();
    info!(
        turn_seconds = settings.turn_seconds,
        combat_seconds = settings.combat_seconds,
        transition_seconds = settings.transition_seconds,
        "engine settings loaded"
    );
    let sink = Arc::new(BroadcastSink::default());
    let reporter = reporter_for(settings.stats_report_url.as_deref());
    let engine = Engine::start(settings, sink.clone(), reporter);

    let app = build_router(AppState {
        engine: engine.clone(),
        sink,
    });

    let bind_addr = parse_bind_addr("SESSION_SERVICE_BIND", "0.0.0.0:8085")?;
    info!(%bind_addr, "session-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(error = %error, "failed to listen for shutdown signal");
            }
        })
        .await?;

    engine.shutdown().await;
    Ok(())
}
