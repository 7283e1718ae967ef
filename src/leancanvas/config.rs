//! Process configuration.
//!
//! [`LeanCanvasConfig`] is a plain struct: build it by hand, take the defaults, or read the
//! environment with [`LeanCanvasConfig::from_env`].
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `AI_MODEL` | `model` | `"define AI_MODEL"` |
//! | `AI_API_KEY`, then `OPENAI_API_KEY` | `api_key` | none |
//! | `AI_BASE_URL` | `base_url` | none (OpenAI) |
//! | `LEANCANVAS_BIND` | `bind_addr` | `127.0.0.1:3000` |
//! | `LEANCANVAS_DATA_DIR` | `data_dir` | `.leancanvas` |
//! | `LEANCANVAS_MAX_STEPS` | `max_steps` | `3` |
//!
//! ```rust
//! use leancanvas::LeanCanvasConfig;
//!
//! let config = LeanCanvasConfig::from_lookup(|key| match key {
//!     "AI_MODEL" => Some("gpt-4.1-mini".to_string()),
//!     _ => None,
//! });
//! assert_eq!(config.model, "gpt-4.1-mini");
//! assert_eq!(config.max_steps, 3);
//! ```

use crate::leancanvas::canvas_store::DEFAULT_SAVE_DELAY;
use crate::leancanvas::network::DEFAULT_MAX_STEPS;
use std::path::PathBuf;
use std::time::Duration;

/// Model id used when `AI_MODEL` is not set. Requests fail upstream until it is configured.
pub const MODEL_PLACEHOLDER: &str = "define AI_MODEL";

#[derive(Debug, Clone, PartialEq)]
pub struct LeanCanvasConfig {
    pub model: String,
    pub api_key: Option<String>,
    /// OpenAI-compatible endpoint; the OpenAI default when `None`.
    pub base_url: Option<String>,
    pub bind_addr: String,
    /// Holds `canvases.json` and the `threads/` directory.
    pub data_dir: PathBuf,
    pub max_steps: usize,
    pub save_delay: Duration,
}

impl Default for LeanCanvasConfig {
    fn default() -> Self {
        Self {
            model: MODEL_PLACEHOLDER.to_string(),
            api_key: None,
            base_url: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            data_dir: PathBuf::from(".leancanvas"),
            max_steps: DEFAULT_MAX_STEPS,
            save_delay: DEFAULT_SAVE_DELAY,
        }
    }
}

impl LeanCanvasConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_steps = match get("LEANCANVAS_MAX_STEPS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    log::warn!(
                        "config: ignoring LEANCANVAS_MAX_STEPS={:?}, using {}",
                        raw,
                        defaults.max_steps
                    );
                    defaults.max_steps
                }
            },
            None => defaults.max_steps,
        };

        Self {
            model: get("AI_MODEL").unwrap_or(defaults.model),
            api_key: get("AI_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            base_url: get("AI_BASE_URL"),
            bind_addr: get("LEANCANVAS_BIND").unwrap_or(defaults.bind_addr),
            data_dir: get("LEANCANVAS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_steps,
            save_delay: defaults.save_delay,
        }
    }

    pub fn canvas_blob_path(&self) -> PathBuf {
        self.data_dir.join("canvases.json")
    }

    pub fn threads_dir(&self) -> PathBuf {
        self.data_dir.join("threads")
    }
}
