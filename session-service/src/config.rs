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

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tactics_common::expand_env_vars;
use tracing::warn;

/// Engine tunables. Counter values are in timer ticks, delays in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub transition_seconds: u32,
    pub turn_seconds: u32,
    pub combat_seconds: u32,
    pub turn_tick_ms: u64,
    pub combat_tick_ms: u64,
    pub move_step_delay_ms: u64,
    pub ai_think_min_ms: u64,
    pub ai_think_max_ms: u64,
    pub post_combat_delay_ms: u64,
    pub rng_seed: Option<u64>,
    pub stats_report_url: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            transition_seconds: 3,
            turn_seconds: 30,
            combat_seconds: 5,
            turn_tick_ms: 1000,
            combat_tick_ms: 1000,
            move_step_delay_ms: 150,
            ai_think_min_ms: 600,
            ai_think_max_ms: 1500,
            post_combat_delay_ms: 500,
            rng_seed: None,
            stats_report_url: None,
        }
    }
}

impl EngineSettings {
    /// YAML file named by `ENGINE_CONFIG_PATH` (if any) first, then individual
    /// environment variables on top.
    pub fn from_env() -> Self {
        let mut settings = load_config_file().unwrap_or_default();
        settings.apply_env();
        settings
    }

    fn apply_env(&mut self) {
        override_from_env("TRANSITION_SECONDS", &mut self.transition_seconds);
        override_from_env("TURN_SECONDS", &mut self.turn_seconds);
        override_from_env("COMBAT_SECONDS", &mut self.combat_seconds);
        override_from_env("TURN_TICK_MS", &mut self.turn_tick_ms);
        override_from_env("COMBAT_TICK_MS", &mut self.combat_tick_ms);
        override_from_env("MOVE_STEP_DELAY_MS", &mut self.move_step_delay_ms);
        override_from_env("AI_THINK_MIN_MS", &mut self.ai_think_min_ms);
        override_from_env("AI_THINK_MAX_MS", &mut self.ai_think_max_ms);
        override_from_env("POST_COMBAT_DELAY_MS", &mut self.post_combat_delay_ms);

        if let Some(seed) = std::env::var("ROOM_RNG_SEED")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
        {
            self.rng_seed = Some(seed);
        }
        if let Some(url) = std::env::var("STATS_REPORT_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            self.stats_report_url = Some(url);
        }

        self.turn_tick_ms = self.turn_tick_ms.max(1);
        self.combat_tick_ms = self.combat_tick_ms.max(1);
        self.ai_think_max_ms = self.ai_think_max_ms.max(self.ai_think_min_ms);
    }

    pub fn move_step_delay(&self) -> Duration {
        Duration::from_millis(self.move_step_delay_ms)
    }

    pub fn post_combat_delay(&self) -> Duration {
        Duration::from_millis(self.post_combat_delay_ms)
    }

    pub fn turn_tick(&self) -> Duration {
        Duration::from_millis(self.turn_tick_ms)
    }

    pub fn combat_tick(&self) -> Duration {
        Duration::from_millis(self.combat_tick_ms)
    }
}

fn override_from_env<T: std::str::FromStr>(var_name: &str, target: &mut T) {
    if let Some(value) = std::env::var(var_name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
    {
        *target = value;
    }
}

fn load_config_file() -> Option<EngineSettings> {
    let path = std::env::var("ENGINE_CONFIG_PATH")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path, error = %error, "failed to read engine config file");
            return None;
        }
    };

    match parse_settings_yaml(&raw) {
        Ok(settings) => Some(settings),
        Err(error) => {
            warn!(path = %path, error = %error, "failed to parse engine config yaml");
            None
        }
    }
}

pub fn parse_settings_yaml(raw: &str) -> anyhow::Result<EngineSettings> {
    let expanded = expand_env_vars(raw);
    if expanded.trim().is_empty() {
        return Ok(EngineSettings::default());
    }
    serde_yaml::from_str::<EngineSettings>(&expanded).context("invalid engine settings yaml")
}

pub fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}
