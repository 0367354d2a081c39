use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// Whether one model handles the whole turn or planning and narration are
/// split across two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    #[default]
    Dual,
    Single,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusChangesFormat {
    #[default]
    Detailed,
    Compact,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBarMode {
    #[default]
    Compact,
    Full,
    ChangesOnly,
}

/// Per-model call parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout_secs: 120,
            max_retries: 2,
            retry_interval_ms: 2000,
        }
    }
}

/// History window sizes for the two prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub planner_messages: usize,
    pub reply_messages: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        ContextSettings {
            planner_messages: 1,
            reply_messages: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusChangesSettings {
    pub enabled: bool,
    pub format: StatusChangesFormat,
}

impl Default for StatusChangesSettings {
    fn default() -> Self {
        StatusChangesSettings {
            enabled: true,
            format: StatusChangesFormat::Detailed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBarPosition {
    Top,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusBarSettings {
    pub enabled: bool,
    pub display_mode: StatusBarMode,
    pub use_progress_bar: bool,
    pub position: StatusBarPosition,
}

impl Default for StatusBarSettings {
    fn default() -> Self {
        StatusBarSettings {
            enabled: true,
            display_mode: StatusBarMode::Compact,
            use_progress_bar: true,
            position: StatusBarPosition::Bottom,
        }
    }
}

/// Image generation endpoint parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiSettings {
    pub base_url: String,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub prompt_suffix: String,
    pub artist_preset: String,
    pub negative_prompt: String,
    pub sampler: String,
    pub steps: u32,
    pub guidance_scale: f64,
    pub cfg: f64,
    pub noise_schedule: String,
    pub nocache: u32,
    pub size: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
    /// Fallback image chance per turn when the model gives no verdict.
    pub trigger_probability: f64,
    pub output_dir: String,
}

impl Default for NaiSettings {
    fn default() -> Self {
        NaiSettings {
            base_url: "https://std.loliyc.com".to_string(),
            endpoint: "/generate".to_string(),
            api_key: String::new(),
            model: "nai-diffusion-4-5-full".to_string(),
            prompt_suffix: "masterpiece, best quality".to_string(),
            artist_preset: String::new(),
            negative_prompt: String::new(),
            sampler: "k_euler_ancestral".to_string(),
            steps: 28,
            guidance_scale: 5.0,
            cfg: 0.0,
            noise_schedule: "karras".to_string(),
            nocache: 1,
            size: "竖图".to_string(),
            timeout_secs: 120,
            max_retries: 2,
            retry_interval_ms: 2000,
            trigger_probability: 0.3,
            output_dir: "./data/generated_images".to_string(),
        }
    }
}

/// Identity of the character the bot plays, injected into every prompt.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BotPersona {
    pub name: String,
    pub personality: String,
    pub reply_style: String,
}

/// Application settings, stored as pretty JSON under ./data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_mode: ModelMode,
    pub planner: LlmSettings,
    pub reply: LlmSettings,
    pub context: ContextSettings,
    pub status_changes: StatusChangesSettings,
    pub status_bar: StatusBarSettings,
    pub nai: NaiSettings,
    pub persona: BotPersona,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> io::Result<Self> {
        Self::load_from_file("./data/settings.json")
    }

    pub fn save(&self) -> io::Result<()> {
        self.save_to_file("./data/settings.json")
    }

    pub fn load_from_file(path: &str) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&data)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &str) -> io::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}
