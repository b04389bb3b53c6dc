use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use client_core::SequencerConfig;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub user_name: Option<String>,
    pub cards_file: Option<PathBuf>,
    pub send_interval_ms: u64,
    pub queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            user_name: None,
            cards_file: None,
            send_interval_ms: 200,
            queue_capacity: 64,
        }
    }
}

impl Settings {
    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            send_interval: Duration::from_millis(self.send_interval_ms),
            queue_capacity: self.queue_capacity.max(1),
        }
    }
}

/// Defaults, then `path` if it exists, then the process environment.
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(error = %err, "ignoring unreadable settings file");
            return;
        }
    };
    if let Some(v) = file_cfg.get("server_url") {
        settings.server_url = v.clone();
    }
    if let Some(v) = file_cfg.get("user_name") {
        settings.user_name = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("cards_file") {
        settings.cards_file = Some(PathBuf::from(v));
    }
    if let Some(v) = file_cfg.get("send_interval_ms").and_then(|v| v.parse().ok()) {
        settings.send_interval_ms = v;
    }
    if let Some(v) = file_cfg.get("queue_capacity").and_then(|v| v.parse().ok()) {
        settings.queue_capacity = v;
    }
}

fn apply_env<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("BINGO_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = lookup("BINGO_USER") {
        settings.user_name = Some(v);
    }

    if let Some(v) = lookup("BINGO_CARDS_FILE") {
        settings.cards_file = Some(PathBuf::from(v));
    }

    if let Some(v) = lookup("APP__SEND_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.send_interval_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__QUEUE_CAPACITY") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.queue_capacity = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
