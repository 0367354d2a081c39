use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::Value;

use crate::error::ImageError;
use crate::settings::NaiSettings;

const MAX_FILES: usize = 80;
const FILE_RETENTION: Duration = Duration::from_secs(30 * 60);

/// Image generation client for the NAI proxy endpoint. Responses arrive
/// either as raw image bytes or as JSON pointing at a download URL.
pub struct NaiClient {
    http: reqwest::Client,
    settings: NaiSettings,
}

impl NaiClient {
    pub fn new(settings: NaiSettings) -> Self {
        NaiClient {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Generates one image and returns the saved file path.
    pub async fn generate_image(&self, prompt: &str) -> Result<PathBuf, ImageError> {
        if self.settings.api_key.is_empty() {
            return Err(ImageError::NotConfigured);
        }

        let full_prompt = if self.settings.prompt_suffix.is_empty() {
            prompt.to_string()
        } else {
            format!("{prompt}, {}", self.settings.prompt_suffix)
        };

        let url = format!(
            "{}{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.endpoint
        );

        let steps = self.settings.steps.to_string();
        let scale = self.settings.guidance_scale.to_string();
        let cfg = self.settings.cfg.to_string();
        let nocache = self.settings.nocache.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("tag", &full_prompt),
            ("model", &self.settings.model),
            ("token", &self.settings.api_key),
            ("negative", &self.settings.negative_prompt),
            ("sampler", &self.settings.sampler),
            ("steps", &steps),
            ("scale", &scale),
            ("cfg", &cfg),
            ("noise_schedule", &self.settings.noise_schedule),
            ("nocache", &nocache),
            ("size", &self.settings.size),
        ];
        if !self.settings.artist_preset.is_empty() {
            query.push(("artist", &self.settings.artist_preset));
        }

        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let max_retries = self.settings.max_retries.max(1);
        let retry_interval = Duration::from_millis(self.settings.retry_interval_ms);

        let mut last_error = ImageError::NoImageData;
        for attempt in 1..=max_retries {
            match self.request_once(&url, &query, timeout).await {
                Ok(bytes) => {
                    let path = self.save_image(&bytes)?;
                    log::info!("[NAI] Image generated: {}", path.display());
                    return Ok(path);
                }
                Err(e) => {
                    log::warn!(
                        "[NAI] Generation failed (attempt {}/{}): {}",
                        attempt,
                        max_retries,
                        e
                    );
                    last_error = e;
                }
            }
            if attempt < max_retries {
                tokio::time::sleep(retry_interval).await;
            }
        }

        Err(last_error)
    }

    async fn request_once(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Vec<u8>, ImageError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Api {
                status: status.as_u16(),
                body: body.chars().take(100).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("application/json") {
            let data: Value = response.json().await?;
            let image_url = ["url", "image_url", "image", "data"]
                .iter()
                .find_map(|key| data.get(*key).and_then(Value::as_str))
                .ok_or(ImageError::NoImageData)?;
            if !image_url.starts_with("http") {
                return Err(ImageError::NoImageData);
            }
            let bytes = self.http.get(image_url).send().await?.bytes().await?;
            Ok(bytes.to_vec())
        } else {
            Ok(response.bytes().await?.to_vec())
        }
    }

    fn save_image(&self, bytes: &[u8]) -> Result<PathBuf, ImageError> {
        let dir = PathBuf::from(&self.settings.output_dir);
        std::fs::create_dir_all(&dir)?;
        cleanup_old_files(&dir);

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let suffix: u32 = rand::rng().random_range(0..0xffffff);
        let file_name = format!("scene_{millis}_{suffix:06x}.{}", sniff_extension(bytes));
        let path = dir.join(file_name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

// Magic-byte sniffing, png unless proven otherwise.
fn sniff_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        "jpg"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else {
        "png"
    }
}

// Generated images are throwaways: expire after 30 minutes, keep at most 80.
fn cleanup_old_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    let now = SystemTime::now();
    let mut files: Vec<(PathBuf, SystemTime)> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("scene_"))
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    files.sort_by_key(|(_, modified)| *modified);

    let mut remaining = files.len();
    for (path, modified) in &files {
        let expired = now
            .duration_since(*modified)
            .map(|age| age > FILE_RETENTION)
            .unwrap_or(false);
        if expired || remaining > MAX_FILES {
            if std::fs::remove_file(path).is_ok() {
                log::debug!("[NAI] Cleaned up image: {}", path.display());
                remaining -= 1;
            }
        }
    }
}
