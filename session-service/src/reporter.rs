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

use anyhow::Context;
use async_trait::async_trait;
use tactics_common::GameSummary;
use tracing::info;

/// Receives final statistics once a game ends. The engine owns no storage.
#[async_trait]
pub trait StatsReporter: Send + Sync {
    async fn report(&self, summary: &GameSummary) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct HttpStatsReporter {
    client: reqwest::Client,
    url: String,
}

impl HttpStatsReporter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl StatsReporter for HttpStatsReporter {
    async fn report(&self, summary: &GameSummary) -> anyhow::Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(summary)
            .send()
            .await
            .context("failed to post game summary")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_string());
            anyhow::bail!("stats collector returned {status}: {body}");
        }
        Ok(())
    }
}

/// Used when no collector URL is configured.
pub struct LogStatsReporter;

#[async_trait]
impl StatsReporter for LogStatsReporter {
    async fn report(&self, summary: &GameSummary) -> anyhow::Result<()> {
        info!(
            room_id = %summary.room_id,
            winner = ?summary.winner,
            total_turns = summary.total_turns,
            duration_seconds = summary.duration_seconds,
            tile_coverage_percent = summary.tile_coverage_percent,
            door_usage_percent = summary.door_usage_percent,
            "game summary"
        );
        Ok(())
    }
}

pub fn reporter_for(url: Option<&str>) -> Arc<dyn StatsReporter> {
    match url {
        Some(url) => Arc::new(HttpStatsReporter::new(url)),
        None => Arc::new(LogStatsReporter),
    }
}
