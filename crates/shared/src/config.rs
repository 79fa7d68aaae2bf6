use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Every key the application reads.
pub const KEYS: &[&str] = &[
    "NEWS_API_KEY",
    "NEWS_API_BASE",
    "ZAI_API_KEY",
    "ZAI_API_BASE",
    "ZAI_MODEL",
    "REPLICATE_API_TOKEN",
    "REPLICATE_API_BASE",
    "REPLICATE_MODEL",
    "DEFAULT_LANGUAGE",
    "MAX_NEWS_PER_SOURCE",
    "DEFAULT_CATEGORY",
    "REQUEST_TIMEOUT_SECS",
    "IMAGE_POLL_ATTEMPTS",
    "IMAGE_POLL_INTERVAL_MS",
    "IMAGES_DIR",
];

const APP_DIR: &str = "newsdesk";

/// Every key as seen by `option_env!` when the binary was compiled.
fn embedded_pairs() -> [(&'static str, Option<&'static str>); 15] {
    [
        ("NEWS_API_KEY", option_env!("NEWS_API_KEY")),
        ("NEWS_API_BASE", option_env!("NEWS_API_BASE")),
        ("ZAI_API_KEY", option_env!("ZAI_API_KEY")),
        ("ZAI_API_BASE", option_env!("ZAI_API_BASE")),
        ("ZAI_MODEL", option_env!("ZAI_MODEL")),
        ("REPLICATE_API_TOKEN", option_env!("REPLICATE_API_TOKEN")),
        ("REPLICATE_API_BASE", option_env!("REPLICATE_API_BASE")),
        ("REPLICATE_MODEL", option_env!("REPLICATE_MODEL")),
        ("DEFAULT_LANGUAGE", option_env!("DEFAULT_LANGUAGE")),
        ("MAX_NEWS_PER_SOURCE", option_env!("MAX_NEWS_PER_SOURCE")),
        ("DEFAULT_CATEGORY", option_env!("DEFAULT_CATEGORY")),
        ("REQUEST_TIMEOUT_SECS", option_env!("REQUEST_TIMEOUT_SECS")),
        ("IMAGE_POLL_ATTEMPTS", option_env!("IMAGE_POLL_ATTEMPTS")),
        ("IMAGE_POLL_INTERVAL_MS", option_env!("IMAGE_POLL_INTERVAL_MS")),
        ("IMAGES_DIR", option_env!("IMAGES_DIR")),
    ]
}

/// Values compiled into the binary from the build environment.
fn embedded_values() -> HashMap<String, String> {
    embedded_pairs()
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v.to_string())))
        .collect()
}

/// Ordered stack of key/value sources. Later layers win.
#[derive(Debug, Default, Clone)]
pub struct ConfigLayers {
    layers: Vec<(String, HashMap<String, String>)>,
}

impl ConfigLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, origin: impl Into<String>, values: HashMap<String, String>) {
        self.layers.push((origin.into(), values));
    }

    /// Add a dotenv file as a layer. Returns `false` when the file does not exist.
    pub fn push_file(&mut self, path: &Path) -> Result<bool, ConfigError> {
        if !path.is_file() {
            return Ok(false);
        }

        let file_error = |reason: String| ConfigError::File {
            path: path.to_path_buf(),
            reason,
        };

        let iter = dotenvy::from_path_iter(path).map_err(|e| file_error(e.to_string()))?;
        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| file_error(e.to_string()))?;
            values.insert(key, value);
        }

        tracing::debug!("Loaded {} values from {}", values.len(), path.display());
        self.push(path.display().to_string(), values);
        Ok(true)
    }

    /// Highest-precedence non-empty value for `key`, with the layer it came from.
    pub fn get(&self, key: &str) -> Option<(&str, &str)> {
        self.layers.iter().rev().find_map(|(origin, values)| {
            values
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| (v, origin.as_str()))
        })
    }

    /// The standard lookup: embedded values, user config dir, working directory,
    /// the file next to the executable, an optional explicit file, then the process environment.
    pub fn standard(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut files = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            files.push(config_dir.join(APP_DIR).join(".env"));
        }
        if let Ok(cwd) = env::current_dir() {
            files.push(cwd.join(".env"));
        }
        if let Some(exe_dir) = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            files.push(exe_dir.join(".env"));
        }

        let process: HashMap<String, String> = KEYS
            .iter()
            .filter_map(|key| env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();

        Self::stack(embedded_values(), &files, extra_file, process)
    }

    /// Assemble the layers, lowest precedence first. Missing `files` are skipped,
    /// a missing `extra_file` is an error.
    fn stack(
        embedded: HashMap<String, String>,
        files: &[PathBuf],
        extra_file: Option<&Path>,
        process: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut layers = Self::new();
        layers.push("embedded", embedded);

        for file in files {
            layers.push_file(file)?;
        }

        if let Some(path) = extra_file {
            if !layers.push_file(path)? {
                return Err(ConfigError::File {
                    path: path.to_path_buf(),
                    reason: "file not found".to_string(),
                });
            }
        }

        layers.push("environment", process);
        Ok(layers)
    }
}

#[derive(Clone)]
pub struct Config {
    pub news_api_key: Option<String>,
    pub news_api_base: String,
    pub zai_api_key: Option<String>,
    pub zai_api_base: String,
    pub zai_model: String,
    pub replicate_api_token: Option<String>,
    pub replicate_api_base: String,
    pub replicate_model: String,
    pub default_language: String,
    pub max_news_per_source: u32,
    pub default_category: Option<String>,
    pub request_timeout: Duration,
    pub image_poll_attempts: u32,
    pub image_poll_interval: Duration,
    pub images_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            news_api_key: None,
            news_api_base: "https://newsapi.org/v2".to_string(),
            zai_api_key: None,
            zai_api_base: "https://api.z.ai/api/paas/v4".to_string(),
            zai_model: "glm-4.7".to_string(),
            replicate_api_token: None,
            replicate_api_base: "https://api.replicate.com/v1".to_string(),
            replicate_model: "black-forest-labs/flux-dev".to_string(),
            default_language: "en".to_string(),
            max_news_per_source: 10,
            default_category: Some("technology".to_string()),
            request_timeout: Duration::from_secs(120),
            image_poll_attempts: 60,
            image_poll_interval: Duration::from_millis(2000),
            images_dir: PathBuf::from("images"),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_deref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("news_api_key", &redact(&self.news_api_key))
            .field("news_api_base", &self.news_api_base)
            .field("zai_api_key", &redact(&self.zai_api_key))
            .field("zai_api_base", &self.zai_api_base)
            .field("zai_model", &self.zai_model)
            .field("replicate_api_token", &redact(&self.replicate_api_token))
            .field("replicate_api_base", &self.replicate_api_base)
            .field("replicate_model", &self.replicate_model)
            .field("default_language", &self.default_language)
            .field("max_news_per_source", &self.max_news_per_source)
            .field("default_category", &self.default_category)
            .field("request_timeout", &self.request_timeout)
            .field("image_poll_attempts", &self.image_poll_attempts)
            .field("image_poll_interval", &self.image_poll_interval)
            .field("images_dir", &self.images_dir)
            .finish()
    }
}

impl Config {
    /// Load from the standard layers plus an optional extra dotenv file.
    pub fn load(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let layers = ConfigLayers::standard(extra_file)?;
        Self::from_layers(&layers)
    }

    pub fn from_layers(layers: &ConfigLayers) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str| layers.get(key).map(|(value, _)| value.to_string());

        Ok(Self {
            news_api_key: text("NEWS_API_KEY"),
            news_api_base: base_url(layers, "NEWS_API_BASE", defaults.news_api_base)?,
            zai_api_key: text("ZAI_API_KEY"),
            zai_api_base: base_url(layers, "ZAI_API_BASE", defaults.zai_api_base)?,
            zai_model: text("ZAI_MODEL").unwrap_or(defaults.zai_model),
            replicate_api_token: text("REPLICATE_API_TOKEN"),
            replicate_api_base: base_url(layers, "REPLICATE_API_BASE", defaults.replicate_api_base)?,
            replicate_model: replicate_model(layers, defaults.replicate_model)?,
            default_language: text("DEFAULT_LANGUAGE").unwrap_or(defaults.default_language),
            max_news_per_source: number(layers, "MAX_NEWS_PER_SOURCE", 1..=100)?
                .unwrap_or(defaults.max_news_per_source),
            default_category: text("DEFAULT_CATEGORY").or(defaults.default_category),
            request_timeout: number(layers, "REQUEST_TIMEOUT_SECS", 1..=3600)?
                .map(|secs| Duration::from_secs(secs as u64))
                .unwrap_or(defaults.request_timeout),
            image_poll_attempts: number(layers, "IMAGE_POLL_ATTEMPTS", 1..=10_000)?
                .unwrap_or(defaults.image_poll_attempts),
            image_poll_interval: number(layers, "IMAGE_POLL_INTERVAL_MS", 0..=600_000)?
                .map(|ms| Duration::from_millis(ms as u64))
                .unwrap_or(defaults.image_poll_interval),
            images_dir: text("IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.images_dir),
        })
    }

    /// API keys that are not configured. Actions depending on them fail when attempted.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.news_api_key.is_none() {
            missing.push("NEWS_API_KEY");
        }
        if self.zai_api_key.is_none() {
            missing.push("ZAI_API_KEY");
        }
        if self.replicate_api_token.is_none() {
            missing.push("REPLICATE_API_TOKEN");
        }
        missing
    }
}

/// A key is required at call time, not at startup.
pub(crate) fn require<'a>(
    value: &'a Option<String>,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    value.as_deref().ok_or(ConfigError::MissingKey(key))
}

fn key_name(key: &str) -> &'static str {
    KEYS.iter().copied().find(|k| *k == key).unwrap_or("config")
}

fn base_url(layers: &ConfigLayers, key: &str, default: String) -> Result<String, ConfigError> {
    let Some((value, origin)) = layers.get(key) else {
        return Ok(default);
    };

    let parsed = url::Url::parse(value).map_err(|e| ConfigError::Invalid {
        key: key_name(key),
        reason: format!("{} (from {})", e, origin),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key: key_name(key),
            reason: format!("expected an http(s) URL, got {} (from {})", value, origin),
        });
    }

    Ok(value.trim_end_matches('/').to_string())
}

fn replicate_model(layers: &ConfigLayers, default: String) -> Result<String, ConfigError> {
    let Some((value, origin)) = layers.get("REPLICATE_MODEL") else {
        return Ok(default);
    };

    match value.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(value.to_string())
        }
        _ => Err(ConfigError::Invalid {
            key: "REPLICATE_MODEL",
            reason: format!("expected owner/name, got {} (from {})", value, origin),
        }),
    }
}

fn number(
    layers: &ConfigLayers,
    key: &str,
    range: std::ops::RangeInclusive<u32>,
) -> Result<Option<u32>, ConfigError> {
    let Some((value, origin)) = layers.get(key) else {
        return Ok(None);
    };

    let parsed: u32 = value.parse().map_err(|_| ConfigError::Invalid {
        key: key_name(key),
        reason: format!("{:?} is not a number (from {})", value, origin),
    })?;

    if !range.contains(&parsed) {
        return Err(ConfigError::Invalid {
            key: key_name(key),
            reason: format!(
                "{} is outside {}..={} (from {})",
                parsed,
                range.start(),
                range.end(),
                origin
            ),
        });
    }

    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn layer(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_every_key_can_be_embedded() {
        let embedded: Vec<&str> = embedded_pairs().iter().map(|(key, _)| *key).collect();
        assert_eq!(embedded, KEYS);
    }

    #[test]
    fn test_stack_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            path
        };

        let user = write(
            "user.env",
            "ZAI_MODEL=user\nDEFAULT_LANGUAGE=user\nDEFAULT_CATEGORY=user\nIMAGES_DIR=user\n",
        );
        let cwd = write("cwd.env", "DEFAULT_LANGUAGE=cwd\nDEFAULT_CATEGORY=cwd\nIMAGES_DIR=cwd\n");
        let exe = write("exe.env", "DEFAULT_CATEGORY=exe\nIMAGES_DIR=exe\n");
        let extra = write("extra.env", "IMAGES_DIR=extra\nREQUEST_TIMEOUT_SECS=30\n");
        let absent = dir.path().join("absent.env");

        let layers = ConfigLayers::stack(
            layer(&[("ZAI_MODEL", "embedded"), ("NEWS_API_KEY", "embedded")]),
            &[user, absent, cwd, exe],
            Some(&extra),
            layer(&[("REQUEST_TIMEOUT_SECS", "45")]),
        )
        .unwrap();

        let config = Config::from_layers(&layers).unwrap();
        assert_eq!(config.news_api_key.as_deref(), Some("embedded"));
        assert_eq!(config.zai_model, "user");
        assert_eq!(config.default_language, "cwd");
        assert_eq!(config.default_category.as_deref(), Some("exe"));
        assert_eq!(config.images_dir, PathBuf::from("extra"));
        assert_eq!(config.request_timeout, Duration::from_secs(45));
        assert_eq!(layers.get("REQUEST_TIMEOUT_SECS"), Some(("45", "environment")));
    }

    #[test]
    fn test_stack_requires_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.env");
        let err = ConfigLayers::stack(HashMap::new(), &[], Some(&missing), HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::File { .. }));
    }

    #[test]
    fn test_defaults_without_any_values() {
        let config = Config::from_layers(&ConfigLayers::new()).unwrap();
        assert_eq!(config.news_api_base, "https://newsapi.org/v2");
        assert_eq!(config.zai_model, "glm-4.7");
        assert_eq!(config.max_news_per_source, 10);
        assert_eq!(config.default_category.as_deref(), Some("technology"));
        assert_eq!(
            config.missing_keys(),
            vec!["NEWS_API_KEY", "ZAI_API_KEY", "REPLICATE_API_TOKEN"]
        );
    }

    #[test]
    fn test_external_value_beats_embedded() {
        let mut layers = ConfigLayers::new();
        layers.push("embedded", layer(&[("NEWS_API_KEY", "built-in"), ("ZAI_MODEL", "glm-4.5")]));
        layers.push("external", layer(&[("NEWS_API_KEY", "from-file")]));

        let config = Config::from_layers(&layers).unwrap();
        assert_eq!(config.news_api_key.as_deref(), Some("from-file"));
        // Keys the external layer does not set still come from the embedded one
        assert_eq!(config.zai_model, "glm-4.5");
        assert_eq!(layers.get("NEWS_API_KEY"), Some(("from-file", "external")));
    }

    #[test]
    fn test_empty_value_does_not_shadow_lower_layer() {
        let mut layers = ConfigLayers::new();
        layers.push("embedded", layer(&[("ZAI_API_KEY", "built-in")]));
        layers.push("external", layer(&[("ZAI_API_KEY", "  ")]));

        let config = Config::from_layers(&layers).unwrap();
        assert_eq!(config.zai_api_key.as_deref(), Some("built-in"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut layers = ConfigLayers::new();
        layers.push("file", layer(&[("MAX_NEWS_PER_SOURCE", "lots")]));
        let err = Config::from_layers(&layers).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_NEWS_PER_SOURCE", .. }));

        let mut layers = ConfigLayers::new();
        layers.push("file", layer(&[("MAX_NEWS_PER_SOURCE", "500")]));
        assert!(Config::from_layers(&layers).is_err());

        let mut layers = ConfigLayers::new();
        layers.push("file", layer(&[("NEWS_API_BASE", "not a url")]));
        let err = Config::from_layers(&layers).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "NEWS_API_BASE", .. }));

        let mut layers = ConfigLayers::new();
        layers.push("file", layer(&[("REPLICATE_MODEL", "flux")]));
        assert!(Config::from_layers(&layers).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let mut layers = ConfigLayers::new();
        layers.push("file", layer(&[("ZAI_API_BASE", "http://localhost:8080/v4/")]));
        let config = Config::from_layers(&layers).unwrap();
        assert_eq!(config.zai_api_base, "http://localhost:8080/v4");
    }

    #[test]
    fn test_push_file_reads_dotenv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "NEWS_API_KEY=file-key").unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "IMAGE_POLL_ATTEMPTS=5").unwrap();

        let mut layers = ConfigLayers::new();
        layers.push("embedded", layer(&[("NEWS_API_KEY", "built-in")]));
        assert!(layers.push_file(file.path()).unwrap());

        let config = Config::from_layers(&layers).unwrap();
        assert_eq!(config.news_api_key.as_deref(), Some("file-key"));
        assert_eq!(config.image_poll_attempts, 5);
    }

    #[test]
    fn test_push_missing_file_is_not_an_error() {
        let mut layers = ConfigLayers::new();
        let added = layers
            .push_file(Path::new("/nonexistent/newsdesk/.env"))
            .unwrap();
        assert!(!added);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = Config {
            news_api_key: Some("secret-news".to_string()),
            ..Config::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret-news"));
        assert!(printed.contains("<redacted>"));
    }
}
