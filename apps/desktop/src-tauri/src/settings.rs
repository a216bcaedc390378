use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_BASE_URL: &str = "http://127.0.0.1:5000";

/// Target languages the backend understands, by display name.
/// The wire protocol sends the name; the backend owns the name -> code map.
pub const LANGUAGE_OPTIONS: [&str; 3] = ["English", "Hindi", "Marathi"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_base_url: String,
    pub text_language: Option<String>,
    pub audio_language: Option<String>,
    pub autoplay: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_base_url: DEFAULT_SERVER_BASE_URL.to_string(),
            text_language: None,
            audio_language: None,
            autoplay: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub server_base_url: Option<String>,
    pub text_language: Option<Option<String>>,
    pub audio_language: Option<Option<String>>,
    pub autoplay: Option<bool>,
}

pub fn apply_patch(mut cur: Settings, patch: SettingsPatch) -> Settings {
    if let Some(v) = patch.server_base_url {
        let trimmed = v.trim().trim_end_matches('/').to_string();
        if !trimmed.is_empty() {
            cur.server_base_url = trimmed;
        }
    }
    if let Some(v) = patch.text_language {
        cur.text_language = normalize_language(v);
    }
    if let Some(v) = patch.audio_language {
        cur.audio_language = normalize_language(v);
    }
    if let Some(v) = patch.autoplay {
        cur.autoplay = v;
    }
    cur
}

fn normalize_language(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

pub fn load_settings(data_dir: &Path) -> Result<Settings> {
    let p = settings_path(data_dir);
    if !p.exists() {
        return Ok(Settings::default());
    }
    let s = fs::read_to_string(&p).context("read settings.json failed")?;
    let v: Settings = serde_json::from_str(&s).context("parse settings.json failed")?;
    Ok(v)
}

/// Settings must never block a flow: a corrupt file falls back to defaults
/// and the damage is recorded in the trace log.
pub fn load_settings_or_recover(data_dir: &Path) -> Settings {
    match load_settings(data_dir) {
        Ok(s) => s,
        Err(e) => {
            crate::trace::event(
                data_dir,
                None,
                "Settings",
                "SETTINGS.recovered_default",
                "err",
                Some(serde_json::json!({"error": e.to_string()})),
            );
            Settings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(data_dir).ok();
    let p = settings_path(data_dir);
    let s = serde_json::to_string_pretty(settings).context("serialize settings failed")?;
    fs::write(&p, s).context("write settings.json failed")?;
    Ok(())
}
