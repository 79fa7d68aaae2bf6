use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an article was published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: Option<String>,
    pub name: String,
}

/// One news item returned by search. Identity is the url.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub source: Source,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_text: String,
}

impl Article {
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            url: url.into(),
            source: Source {
                id: None,
                name: source.into(),
            },
            author: None,
            published_at: None,
            raw_text: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if self.raw_text.is_empty() {
            self.raw_text = description.clone();
        }
        self.description = Some(description);
        self
    }

    pub fn published_label(&self) -> String {
        self.published_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    #[default]
    Everything,
    TopHeadlines,
    Sources,
}

impl SearchMode {
    pub const ALL: [SearchMode; 3] = [
        SearchMode::Everything,
        SearchMode::TopHeadlines,
        SearchMode::Sources,
    ];

    /// Path segment on the news API
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Everything => "everything",
            SearchMode::TopHeadlines => "top-headlines",
            SearchMode::Sources => "sources",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SearchMode::Everything => "Search all news",
            SearchMode::TopHeadlines => "Top headlines",
            SearchMode::Sources => "News sources",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "everything" | "1" => Ok(SearchMode::Everything),
            "top-headlines" | "top_headlines" | "headlines" | "2" => Ok(SearchMode::TopHeadlines),
            "sources" | "3" => Ok(SearchMode::Sources),
            other => Err(format!(
                "Unknown mode: {}. Use everything, top-headlines or sources",
                other
            )),
        }
    }
}

/// Closed set of labels the classifier may assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Technology,
    Programming,
    Business,
    Economy,
    Politics,
    Geopolitics,
    Management,
    Science,
    Health,
    Irrelevant,
}

impl Label {
    pub const ALL: [Label; 10] = [
        Label::Technology,
        Label::Programming,
        Label::Business,
        Label::Economy,
        Label::Politics,
        Label::Geopolitics,
        Label::Management,
        Label::Science,
        Label::Health,
        Label::Irrelevant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Technology => "Technology",
            Label::Programming => "Programming",
            Label::Business => "Business",
            Label::Economy => "Economy",
            Label::Politics => "Politics",
            Label::Geopolitics => "Geopolitics",
            Label::Management => "Management",
            Label::Science => "Science",
            Label::Health => "Health",
            Label::Irrelevant => "Irrelevant",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Label::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unknown label: {}", wanted))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub article_url: String,
    pub label: Label,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub article_url: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub article_url: String,
    pub local_path: PathBuf,
    pub remote_url: String,
    pub prompt: String,
}
