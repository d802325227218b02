//! Typed configuration, loaded from a TOML document grouped into `[murmur]`,
//! `[streaming]`, and `[injector]` tables, with environment-variable overrides
//! applied last.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::errors::DictationError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MurmurConfig {
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_true")]
    pub sound: bool,
    #[serde(default = "default_toggle_debounce_seconds")]
    pub toggle_debounce_seconds: f64,
}

impl Default for MurmurConfig {
    fn default() -> Self {
        Self {
            hotkey: default_hotkey(),
            model: default_model(),
            sound: true,
            toggle_debounce_seconds: default_toggle_debounce_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    #[serde(default = "default_buffer_seconds")]
    pub buffer_seconds: f64,
    #[serde(default = "default_audio_window_seconds")]
    pub audio_window_seconds: f64,
    #[serde(default = "default_inference_interval_seconds")]
    pub inference_interval_seconds: f64,
    #[serde(default = "default_audio_chunk_ms")]
    pub audio_chunk_ms: u32,
    #[serde(default = "default_min_audio_seconds")]
    pub min_audio_seconds: f64,
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,
    #[serde(default = "default_vad_speech_pad_ms")]
    pub vad_speech_pad_ms: u32,
    #[serde(default = "default_stability_count")]
    pub stability_count: u32,
    #[serde(default = "default_silence_commit_ms")]
    pub silence_commit_ms: u32,
    #[serde(default = "default_prompt_max_words")]
    pub prompt_max_words: usize,
    #[serde(default = "default_overlap_max_words")]
    pub overlap_max_words: usize,
    #[serde(default = "default_true")]
    pub use_initial_prompt: bool,
    #[serde(default = "default_true")]
    pub consume_audio_on_commit: bool,
    #[serde(default)]
    pub batch_mode: bool,
    #[serde(default = "default_batch_silence_threshold_ms")]
    pub batch_silence_threshold_ms: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: default_buffer_seconds(),
            audio_window_seconds: default_audio_window_seconds(),
            inference_interval_seconds: default_inference_interval_seconds(),
            audio_chunk_ms: default_audio_chunk_ms(),
            min_audio_seconds: default_min_audio_seconds(),
            vad_threshold: default_vad_threshold(),
            vad_speech_pad_ms: default_vad_speech_pad_ms(),
            stability_count: default_stability_count(),
            silence_commit_ms: default_silence_commit_ms(),
            prompt_max_words: default_prompt_max_words(),
            overlap_max_words: default_overlap_max_words(),
            use_initial_prompt: true,
            consume_audio_on_commit: true,
            batch_mode: false,
            batch_silence_threshold_ms: default_batch_silence_threshold_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InjectorConfig {
    #[serde(default = "default_max_updates_per_sec")]
    pub max_updates_per_sec: u32,
    #[serde(default = "default_max_backspace_chars")]
    pub max_backspace_chars: usize,
    #[serde(default = "default_keystroke_delay_seconds")]
    pub keystroke_delay_seconds: f64,
    #[serde(default = "default_backspace_delay_seconds")]
    pub backspace_delay_seconds: f64,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            max_updates_per_sec: default_max_updates_per_sec(),
            max_backspace_chars: default_max_backspace_chars(),
            keystroke_delay_seconds: default_keystroke_delay_seconds(),
            backspace_delay_seconds: default_backspace_delay_seconds(),
        }
    }
}

/// Top-level configuration, matching the `[murmur]` / `[streaming]` / `[injector]`
/// grouping of the on-disk TOML document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub murmur: MurmurConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub injector: InjectorConfig,
}

impl Config {
    /// Loads configuration by layering each path in [Self::config_paths] over the
    /// defaults (later paths win), then applying `MURMUR_*` environment overrides.
    pub fn load() -> Result<Self, DictationError> {
        let mut config = Self::default();
        for path in Self::config_paths() {
            if let Some(partial) = Self::load_toml(&path)? {
                config = merge(config, partial);
            }
        }
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_toml(path: &Path) -> Result<Option<Config>, DictationError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        let parsed: Config = toml::from_str(&text)
            .map_err(|e| DictationError::Config(format!("{}: {e}", path.display())))?;
        Ok(Some(parsed))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(hotkey) = env::var("MURMUR_HOTKEY") {
            if !hotkey.is_empty() {
                self.murmur.hotkey = normalize_hotkey(&hotkey);
            }
        }
        if let Ok(model) = env::var("MURMUR_MODEL") {
            if !model.is_empty() {
                self.murmur.model = model;
            }
        }
        if let Ok(sound) = env::var("MURMUR_SOUND") {
            self.murmur.sound = !matches!(sound.to_lowercase().as_str(), "false" | "0" | "no");
        }
    }

    /// Search order: repo-root config file, then the XDG-style user config directory.
    /// Earlier entries are overridden by later ones.
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("murmur.toml")];
        if let Some(home) = dirs_home() {
            let config_dir = home.join(".config").join("murmur");
            paths.push(config_dir.join("murmur.toml"));
            paths.push(config_dir.join("config.toml"));
        }
        paths
    }
}

fn dirs_home() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

fn normalize_hotkey(key: &str) -> String {
    match key.to_lowercase().as_str() {
        "right_option" | "right_alt" => "alt_r".to_string(),
        "left_option" | "left_alt" => "alt_l".to_string(),
        other => other.to_string(),
    }
}

/// Each successive config file is parsed as a complete [Config] (missing keys already
/// filled in with defaults by serde), so layering paths reduces to taking the later
/// file wholesale -- there is no partial-table carryover between files, matching this
/// crate's fixed schema rather than the source loader's arbitrary recursive dict-merge.
fn merge(_base: Config, override_: Config) -> Config {
    override_
}

fn default_hotkey() -> String {
    "alt_r".to_string()
}
fn default_model() -> String {
    "small.en".to_string()
}
fn default_true() -> bool {
    true
}
fn default_toggle_debounce_seconds() -> f64 {
    0.2
}
fn default_buffer_seconds() -> f64 {
    12.0
}
fn default_audio_window_seconds() -> f64 {
    10.0
}
fn default_inference_interval_seconds() -> f64 {
    0.5
}
fn default_audio_chunk_ms() -> u32 {
    100
}
fn default_min_audio_seconds() -> f64 {
    0.1
}
fn default_vad_threshold() -> f32 {
    0.01
}
fn default_vad_speech_pad_ms() -> u32 {
    300
}
fn default_stability_count() -> u32 {
    2
}
fn default_silence_commit_ms() -> u32 {
    600
}
fn default_prompt_max_words() -> usize {
    50
}
fn default_overlap_max_words() -> usize {
    20
}
fn default_batch_silence_threshold_ms() -> u32 {
    500
}
fn default_max_updates_per_sec() -> u32 {
    4
}
fn default_max_backspace_chars() -> usize {
    30
}
fn default_keystroke_delay_seconds() -> f64 {
    0.002
}
fn default_backspace_delay_seconds() -> f64 {
    0.001
}
