//! Configuration management (~/.config/wicket/config.toml)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_volume")]
    pub master_volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Base URL or directory the module and its assets are fetched from.
    #[serde(default)]
    pub base: Option<String>,
    /// Override for where cookies are persisted.
    #[serde(default)]
    pub cookie_dir: Option<PathBuf>,
}

fn default_title() -> String { "Wicket".to_string() }
fn default_width() -> u32 { 960 }
fn default_height() -> u32 { 540 }
fn default_volume() -> f32 { 0.8 }

impl Default for Config {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            audio: AudioConfig::default(),
            resources: ResourceConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { master_volume: default_volume() }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self { base: None, cookie_dir: None }
    }
}

pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("run", "wicket", "wicket")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn load() -> Config {
    config_dir()
        .and_then(|dir| std::fs::read_to_string(dir.join("config.toml")).ok())
        .and_then(|content| toml::from_str(&content).ok())
        .unwrap_or_default()
}

pub fn save(config: &Config) -> std::io::Result<()> {
    if let Some(dir) = config_dir() {
        std::fs::create_dir_all(&dir)?;
        let content = toml::to_string_pretty(config).expect("config serializes");
        std::fs::write(dir.join("config.toml"), content)?;
    }
    Ok(())
}
