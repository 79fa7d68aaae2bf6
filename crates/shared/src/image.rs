use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{require, Config};
use crate::error::{ImageError, RemoteError};
use crate::models::{Article, GeneratedImage, GeneratedPost};

const DEFAULT_THEME: &str = "business and technology";
const THEME_MAX_CHARS: usize = 100;
const SLUG_MAX_CHARS: usize = 40;
pub const HISTORY_FILE: &str = "image_generation_history.txt";
const TITLE_MARKERS: [&str; 3] = ["title:", "título:", "titulo:"];

/// Pick the image theme: first line of the post without title markers,
/// else the article title, else a generic theme. At most 100 characters.
pub fn derive_theme(post: Option<&str>, title: &str) -> String {
    let from_post = post
        .and_then(|p| p.lines().map(str::trim).find(|l| !l.is_empty()))
        .map(strip_title_markers)
        .filter(|t| !t.is_empty());

    let theme = from_post
        .or_else(|| Some(title.trim()).filter(|t| !t.is_empty()))
        .unwrap_or(DEFAULT_THEME);

    theme.chars().take(THEME_MAX_CHARS).collect()
}

fn strip_title_markers(line: &str) -> &str {
    let line = line
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_whitespace())
        .trim();
    let line = TITLE_MARKERS
        .iter()
        .find_map(|marker| {
            line.get(..marker.len())
                .filter(|head| head.to_lowercase() == *marker)
                .map(|_| &line[marker.len()..])
        })
        .unwrap_or(line);
    line.trim_matches(|c: char| c == '*' || c.is_whitespace())
}

pub fn build_prompt(theme: &str) -> String {
    format!(
        "Editorial-style conceptual image representing: {}.\n\n\
         No text. No logos. No people. No corporate stock-photo look.\n\n\
         Professional and thought-provoking, designed to stop scrolling and provoke reflection.",
        theme
    )
}

/// Lowercase, alphanumerics only, joined by dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    slug.trim_end_matches('-').to_string()
}

fn extension_of(remote_url: &str) -> &'static str {
    let ext = url::Url::parse(remote_url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
        })
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "png",
        "jpg" | "jpeg" => "jpg",
        "gif" => "gif",
        _ => "webp",
    }
}

fn candidate_path(dir: &Path, stem: &str, ext: &str, n: u32) -> PathBuf {
    if n <= 1 {
        dir.join(format!("{}.{}", stem, ext))
    } else {
        dir.join(format!("{}-{}.{}", stem, n, ext))
    }
}

/// Write `bytes` to a temporary file in `dir`, then move it to the first free
/// `<stem>[-N].<ext>` name. An existing file is never replaced. The temporary
/// file is removed on every failure path.
fn write_unique(dir: &Path, stem: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf, ImageError> {
    let mut file = tempfile::Builder::new()
        .prefix(".image_")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|source| ImageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    file.write_all(bytes).map_err(|source| ImageError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut n = 1;
    loop {
        let path = candidate_path(dir, stem, ext, n);
        match file.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                file = e.file;
                n += 1;
            }
            Err(e) => {
                return Err(ImageError::Io {
                    path,
                    source: e.error,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PredictionStatus::Starting => "starting",
            PredictionStatus::Processing => "processing",
            PredictionStatus::Succeeded => "succeeded",
            PredictionStatus::Failed => "failed",
            PredictionStatus::Canceled => "canceled",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Hosted image model: create a prediction, check on it, fetch the result.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn create_prediction(&self, prompt: &str) -> Result<Prediction, ImageError>;
    async fn get_prediction(&self, id: &str) -> Result<Prediction, ImageError>;
    async fn download(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

#[derive(Serialize)]
struct CreatePrediction<'a> {
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    aspect_ratio: &'static str,
    num_outputs: u32,
    output_format: &'static str,
    output_quality: u32,
    go_fast: bool,
}

#[derive(Deserialize)]
struct PredictionResponse {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl From<PredictionResponse> for Prediction {
    fn from(response: PredictionResponse) -> Self {
        // `output` is a single URL or a list of URLs depending on the model
        let output = match response.output {
            Some(serde_json::Value::String(url)) => Some(url),
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        };
        let error = response
            .error
            .filter(|e| !e.is_null())
            .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()));

        Self {
            id: response.id,
            status: response.status,
            output,
            error,
        }
    }
}

/// Client for the Replicate predictions API.
pub struct ReplicateClient {
    client: Client,
    api_token: Option<String>,
    base_url: String,
    model: String,
}

impl fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("api_token", &self.api_token.as_deref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ReplicateClient {
    pub fn new(config: &Config) -> Result<Self, ImageError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(RemoteError::from_reqwest)?;

        Ok(Self {
            client,
            api_token: config.replicate_api_token.clone(),
            base_url: config.replicate_api_base.clone(),
            model: config.replicate_model.clone(),
        })
    }

    async fn read_prediction(response: reqwest::Response) -> Result<Prediction, ImageError> {
        if !response.status().is_success() {
            return Err(RemoteError::from_response(response).await.into());
        }

        let prediction = response
            .json::<PredictionResponse>()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        Ok(prediction.into())
    }
}

#[async_trait]
impl ImageBackend for ReplicateClient {
    async fn create_prediction(&self, prompt: &str) -> Result<Prediction, ImageError> {
        let token = require(&self.api_token, "REPLICATE_API_TOKEN")?;
        let url = format!("{}/models/{}/predictions", self.base_url, self.model);

        let request = CreatePrediction {
            input: PredictionInput {
                prompt,
                aspect_ratio: "1:1",
                num_outputs: 1,
                output_format: "webp",
                output_quality: 80,
                go_fast: true,
            },
        };

        tracing::debug!("Creating prediction at {}", url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&request)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        Self::read_prediction(response).await
    }

    async fn get_prediction(&self, id: &str) -> Result<Prediction, ImageError> {
        let token = require(&self.api_token, "REPLICATE_API_TOKEN")?;
        let url = format!("{}/predictions/{}", self.base_url, urlencoding::encode(id));

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        Self::read_prediction(response).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        // The output URL is fetched without credentials
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error = match RemoteError::from_response(response).await {
                RemoteError::Unauthorized(message) => RemoteError::Status { status, message },
                RemoteError::RateLimited => RemoteError::Status {
                    status,
                    message: "too many requests".to_string(),
                },
                other => other,
            };
            return Err(error.into());
        }

        let bytes = response.bytes().await.map_err(RemoteError::from_reqwest)?;
        Ok(bytes.to_vec())
    }
}

/// Bounded wait for a prediction to finish.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.image_poll_attempts,
            interval: config.image_poll_interval,
        }
    }
}

pub struct ImageGenerator {
    backend: Arc<dyn ImageBackend>,
    images_dir: PathBuf,
    poll: PollPolicy,
}

impl ImageGenerator {
    pub fn new(backend: Arc<dyn ImageBackend>, images_dir: impl Into<PathBuf>, poll: PollPolicy) -> Self {
        Self {
            backend,
            images_dir: images_dir.into(),
            poll,
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub async fn generate(
        &self,
        article: &Article,
        post: Option<&GeneratedPost>,
    ) -> Result<GeneratedImage, ImageError> {
        let theme = derive_theme(post.map(|p| p.text.as_str()), &article.title);
        let prompt = build_prompt(&theme);

        let prediction = self.backend.create_prediction(&prompt).await?;
        let remote_url = self.wait_for(prediction).await?;
        let bytes = self.backend.download(&remote_url).await?;
        let local_path = self.save(&bytes, &article.title, extension_of(&remote_url))?;
        self.append_history(&remote_url, &local_path, &prompt);

        tracing::info!("Image for {} saved to {}", article.url, local_path.display());
        Ok(GeneratedImage {
            article_url: article.url.clone(),
            local_path,
            remote_url,
            prompt,
        })
    }

    async fn wait_for(&self, mut prediction: Prediction) -> Result<String, ImageError> {
        let mut attempts = 0;
        loop {
            match prediction.status {
                PredictionStatus::Succeeded => {
                    return prediction.output.ok_or(ImageError::NoOutput);
                }
                PredictionStatus::Failed | PredictionStatus::Canceled => {
                    let reason = prediction
                        .error
                        .unwrap_or_else(|| format!("prediction {}", prediction.status));
                    return Err(ImageError::PredictionFailed(reason));
                }
                PredictionStatus::Starting | PredictionStatus::Processing => {}
            }

            if attempts >= self.poll.attempts {
                return Err(ImageError::Timeout { attempts });
            }

            tokio::time::sleep(self.poll.interval).await;
            attempts += 1;
            tracing::debug!(
                "Polling prediction {} ({}/{})",
                prediction.id,
                attempts,
                self.poll.attempts
            );
            prediction = self.backend.get_prediction(&prediction.id).await?;
        }
    }

    fn save(&self, bytes: &[u8], title: &str, ext: &str) -> Result<PathBuf, ImageError> {
        fs::create_dir_all(&self.images_dir).map_err(|source| ImageError::Io {
            path: self.images_dir.clone(),
            source,
        })?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let slug = slugify(title);
        let stem = if slug.is_empty() {
            format!("image_{}", timestamp)
        } else {
            format!("image_{}_{}", timestamp, slug)
        };

        write_unique(&self.images_dir, &stem, ext, bytes)
    }

    fn append_history(&self, remote_url: &str, local_path: &Path, prompt: &str) {
        let history_path = self.images_dir.join(HISTORY_FILE);
        let entry = format!(
            "[{}] URL: {}\nLocal: {}\nPrompt: {}...\n{}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            remote_url,
            local_path.display(),
            prompt.chars().take(100).collect::<String>(),
            "-".repeat(80)
        );

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&history_path)
            .and_then(|mut file| file.write_all(entry.as_bytes()));

        if let Err(e) = result {
            tracing::warn!("Could not write image history {}: {}", history_path.display(), e);
        }
    }
}
