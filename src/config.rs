use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::annotate::DEFAULT_EMOJI_SIZE;
use crate::refresh::DEFAULT_WORKERS;

const DEFAULT_ENV_PREFIX: &str = "TRWL";
const APP_DIR: &str = "trwl-status";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub emoji: EmojiConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmojiConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for EmojiConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            workers: default_workers(),
        }
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(APP_DIR).join("emoji"))
}

fn default_user_agent() -> String {
    format!("trwl-status/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderConfig {
    #[serde(default = "default_emoji_size")]
    pub emoji_size: u16,
    #[serde(default = "default_mention_color")]
    pub mention_color: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            emoji_size: default_emoji_size(),
            mention_color: default_mention_color(),
        }
    }
}

fn default_emoji_size() -> u16 {
    DEFAULT_EMOJI_SIZE
}

fn default_mention_color() -> String {
    "cyan".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if other.emoji.cache_dir.is_some() {
        base.emoji.cache_dir = other.emoji.cache_dir;
    }
    if !other.emoji.user_agent.trim().is_empty() {
        base.emoji.user_agent = other.emoji.user_agent;
    }
    if !other.emoji.timeout.is_zero() {
        base.emoji.timeout = other.emoji.timeout;
    }
    if other.emoji.workers != 0 {
        base.emoji.workers = other.emoji.workers;
    }

    if other.render.emoji_size != 0 {
        base.render.emoji_size = other.render.emoji_size;
    }
    if !other.render.mention_color.trim().is_empty() {
        base.render.mention_color = other.render.mention_color;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "emoji.cache_dir" => cfg.emoji.cache_dir = Some(PathBuf::from(value)),
        "emoji.user_agent" => cfg.emoji.user_agent = value,
        "emoji.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.emoji.timeout = duration;
            }
        }
        "emoji.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.emoji.workers = parsed;
            }
        }
        "render.emoji_size" => {
            if let Ok(parsed) = value.parse::<u16>() {
                cfg.render.emoji_size = parsed;
            }
        }
        "render.mention_color" => cfg.render.mention_color = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
}
