use std::path::PathBuf;

use thiserror::Error;

use crate::session::Action;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set. Add it to the .env file next to the executable")]
    MissingKey(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read {}: {reason}", path.display())]
    File { path: PathBuf, reason: String },
}

/// Failure of a single HTTP call to one of the hosted APIs.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("API key rejected: {0}")]
    Unauthorized(String),

    #[error("API rate limit exceeded, try again in a few minutes")]
    RateLimited,

    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

impl RemoteError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Parse(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }

    /// Turn a non-success response into an error, keeping the API's own message when it has one.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("unknown error"));
        let message = extract_message(&body);

        match status {
            401 | 403 => RemoteError::Unauthorized(message),
            429 => RemoteError::RateLimited,
            _ => RemoteError::Status { status, message },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Timeout)
    }
}

fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            value.get("message"),
            value.get("detail"),
            value.get("error").and_then(|e| e.get("message")),
            value.get("error"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                return text.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::from("unknown error");
    }
    trimmed.chars().take(200).collect()
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No search terms given")]
    NoTerms,

    #[error("News search failed: {0}")]
    Remote(#[from] RemoteError),
}

/// Errors from the chat-completion model, shared by classification and post generation.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Language model call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Language model returned an empty response")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Could not read a label from the model response: {0:?}")]
    Unparseable(String),

    #[error("No articles to classify")]
    NoArticles,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Nothing to write a post from")]
    EmptyInput,
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Image API call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Image was not ready after {attempts} status checks, try again later")]
    Timeout { attempts: u32 },

    #[error("Image generation failed: {0}")]
    PredictionFailed(String),

    #[error("Image API finished without returning an image")]
    NoOutput,

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ImageError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ImageError::Timeout { .. } => true,
            ImageError::Remote(remote) => remote.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Article {0} does not exist in the current results")]
    NoSuchArticle(usize),

    #[error("{action} is already running for article {index}")]
    Busy { index: usize, action: Action },

    #[error("A {0} is already running")]
    TaskBusy(&'static str),

    #[error("The result list changed while the request was running; result discarded")]
    Stale,

    #[error("No shortlist yet, run curate first")]
    NoShortlist,
}

/// Everything an action handler of the front end can report.
#[derive(Error, Debug)]
pub enum DeskError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Image(#[from] ImageError),
}
