use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::{require, Config};
use crate::error::{RemoteError, SearchError};
use crate::models::{Article, SearchMode, Source};

/// NewsAPI replaces taken-down articles with this title.
const REMOVED_MARKER: &str = "[Removed]";

/// Split a comma-separated input into trimmed, non-empty terms, keeping order.
pub fn parse_terms(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keep the first article seen for each url.
pub fn dedupe_by_url(articles: impl IntoIterator<Item = Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|article| seen.insert(article.url.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub terms: Vec<String>,
    pub mode: SearchMode,
    pub language: Option<String>,
    pub page_size: u32,
    pub category: Option<String>,
}

impl SearchRequest {
    pub fn new(input: &str, mode: SearchMode) -> Result<Self, SearchError> {
        let terms = parse_terms(input);
        if terms.is_empty() {
            return Err(SearchError::NoTerms);
        }

        Ok(Self {
            terms,
            mode,
            language: None,
            page_size: 10,
            category: None,
        })
    }

    /// Fill language, page size and category from the configured defaults.
    pub fn with_defaults(mut self, config: &Config) -> Self {
        self.language = Some(config.default_language.clone());
        self.page_size = config.max_news_per_source;
        self.category = config.default_category.clone();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 100);
        self
    }
}

/// Anything that can turn a search request into a flat, deduplicated article list.
#[async_trait]
pub trait ArticleSearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Article>, SearchError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<ApiArticle>,
    #[serde(default)]
    sources: Vec<ApiSource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    source: Option<ApiArticleSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiArticleSource {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct ApiSource {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    url: Option<String>,
    category: Option<String>,
    language: Option<String>,
    country: Option<String>,
}

impl ApiArticle {
    fn into_article(self) -> Option<Article> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        let title = self.title.unwrap_or_default();
        if title.trim() == REMOVED_MARKER {
            return None;
        }

        let source = self.source.map_or_else(
            || Source {
                id: None,
                name: "N/A".to_string(),
            },
            |s| Source {
                id: s.id,
                name: s.name.unwrap_or_else(|| "N/A".to_string()),
            },
        );

        let published_at = self
            .published_at
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc));

        let raw_text = plain_text(
            self.content
                .as_deref()
                .or(self.description.as_deref())
                .unwrap_or(""),
        );

        Some(Article {
            title,
            description: self.description,
            url,
            source,
            author: self.author,
            published_at,
            raw_text,
        })
    }
}

impl ApiSource {
    fn into_article(self) -> Option<Article> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        let name = self.name.unwrap_or_else(|| "N/A".to_string());
        let description = self.description;

        let facts: Vec<String> = [
            ("Category", self.category),
            ("Language", self.language),
            ("Country", self.country),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(|v| format!("{}: {}", key, v.trim()))
        })
        .collect();

        let mut raw_text = plain_text(description.as_deref().unwrap_or(""));
        if !facts.is_empty() {
            if !raw_text.is_empty() {
                raw_text.push('\n');
            }
            raw_text.push_str(&facts.join(" | "));
        }

        Some(Article {
            title: name.clone(),
            raw_text,
            description,
            url,
            source: Source { id: self.id, name },
            author: None,
            published_at: None,
        })
    }
}

/// Convert an HTML fragment into plain text and drop NewsAPI's "[+123 chars]" truncation suffix.
fn plain_text(html: &str) -> String {
    let text = html2text::from_read(html.as_bytes(), 100);
    let text = text.trim();
    let text = match text.rfind("[+") {
        Some(idx) if text.ends_with("chars]") => text[..idx].trim_end(),
        _ => text,
    };
    text.to_string()
}

pub struct NewsClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl fmt::Debug for NewsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsClient")
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl NewsClient {
    pub fn new(config: &Config) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(RemoteError::from_reqwest)?;

        Ok(Self {
            client,
            api_key: config.news_api_key.clone(),
            base_url: config.news_api_base.clone(),
        })
    }

    fn term_url(&self, term: &str, request: &SearchRequest) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();

        match request.mode {
            SearchMode::Everything => {
                params.push(("q", term.to_string()));
                if let Some(language) = &request.language {
                    params.push(("language", language.clone()));
                }
                params.push(("pageSize", request.page_size.to_string()));
            }
            SearchMode::TopHeadlines => {
                params.push(("q", term.to_string()));
                if let Some(category) = &request.category {
                    params.push(("category", category.clone()));
                }
                params.push(("pageSize", request.page_size.to_string()));
            }
            SearchMode::Sources => {
                params.push(("category", term.to_string()));
                if let Some(language) = &request.language {
                    params.push(("language", language.clone()));
                }
            }
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}/{}?{}", self.base_url, request.mode.as_str(), query)
    }

    /// Fetch the articles for one term.
    pub async fn search_term(
        &self,
        term: &str,
        request: &SearchRequest,
    ) -> Result<Vec<Article>, SearchError> {
        let api_key = require(&self.api_key, "NEWS_API_KEY")?;
        let url = self.term_url(term, request);
        tracing::debug!("News search: {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", api_key)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(RemoteError::from_response(response).await.into());
        }

        let body = response
            .json::<NewsApiResponse>()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        if body.status != "ok" {
            return Err(RemoteError::Status {
                status: 200,
                message: body.message.unwrap_or_else(|| body.status.clone()),
            }
            .into());
        }

        let articles: Vec<Article> = match request.mode {
            SearchMode::Sources => body
                .sources
                .into_iter()
                .filter_map(ApiSource::into_article)
                .collect(),
            _ => body
                .articles
                .into_iter()
                .filter_map(ApiArticle::into_article)
                .collect(),
        };

        tracing::debug!("Term {:?} returned {} items", term, articles.len());
        Ok(articles)
    }
}

#[async_trait]
impl ArticleSearch for NewsClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Article>, SearchError> {
        if request.terms.is_empty() {
            return Err(SearchError::NoTerms);
        }

        let mut all_articles = Vec::new();
        for term in &request.terms {
            all_articles.extend(self.search_term(term, request).await?);
        }

        let articles = dedupe_by_url(all_articles);
        tracing::info!(
            "Search for {} term(s) in {} mode found {} unique articles",
            request.terms.len(),
            request.mode,
            articles.len()
        );
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> NewsClient {
        let config = Config {
            news_api_key: api_key.map(str::to_string),
            news_api_base: server.uri(),
            ..Config::default()
        };
        NewsClient::new(&config).unwrap()
    }

    fn api_article(title: &str, url: &str) -> serde_json::Value {
        json!({
            "source": { "id": null, "name": "Example News" },
            "author": "Reporter",
            "title": title,
            "description": format!("<p>About {}</p>", title),
            "url": url,
            "publishedAt": "2026-10-01T12:30:00Z",
            "content": format!("Body of {} [+1200 chars]", title)
        })
    }

    #[test]
    fn test_parse_terms() {
        assert_eq!(parse_terms("ai, robotics ,, chips "), vec!["ai", "robotics", "chips"]);
        assert!(parse_terms(" , ,").is_empty());
    }

    #[test]
    fn test_dedupe_keeps_first_seen_order() {
        let articles = vec![
            Article::new("A", "https://x/a", "S"),
            Article::new("B", "https://x/b", "S"),
            Article::new("A again", "https://x/a", "T"),
            Article::new("C", "https://x/c", "S"),
        ];
        let deduped = dedupe_by_url(articles);
        let titles: Vec<_> = deduped.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_search_request_requires_terms() {
        assert!(matches!(
            SearchRequest::new(" , ", SearchMode::Everything),
            Err(SearchError::NoTerms)
        ));
        let request = SearchRequest::new("ai", SearchMode::Everything)
            .unwrap()
            .with_page_size(500);
        assert_eq!(request.page_size, 100);
    }

    #[test]
    fn test_term_url_per_mode() {
        let client = NewsClient {
            client: Client::new(),
            api_key: None,
            base_url: "https://newsapi.org/v2".to_string(),
        };
        let mut request = SearchRequest::new("ai", SearchMode::Everything)
            .unwrap()
            .with_defaults(&Config::default());

        assert_eq!(
            client.term_url("open source", &request),
            "https://newsapi.org/v2/everything?q=open%20source&language=en&pageSize=10"
        );

        request.mode = SearchMode::TopHeadlines;
        assert_eq!(
            client.term_url("ai", &request),
            "https://newsapi.org/v2/top-headlines?q=ai&category=technology&pageSize=10"
        );

        request.mode = SearchMode::Sources;
        assert_eq!(
            client.term_url("business", &request),
            "https://newsapi.org/v2/sources?category=business&language=en"
        );
    }

    #[test]
    fn test_plain_text_strips_html_and_truncation_marker() {
        assert_eq!(plain_text("Body text [+1200 chars]"), "Body text");
        assert_eq!(plain_text("<p>Hello</p>"), "Hello");
    }

    #[tokio::test]
    async fn test_search_merges_terms_and_drops_removed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/everything"))
            .and(query_param("q", "ai"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "totalResults": 3,
                "articles": [
                    api_article("First", "https://news.test/1"),
                    api_article("[Removed]", "https://removed.com"),
                    api_article("Second", "https://news.test/2")
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/everything"))
            .and(query_param("q", "chips"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "totalResults": 2,
                "articles": [
                    api_article("Second elsewhere", "https://news.test/2"),
                    api_article("Third", "https://news.test/3")
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("test-key"));
        let request = SearchRequest::new("ai, chips", SearchMode::Everything).unwrap();
        let articles = client.search(&request).await.unwrap();

        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
        assert_eq!(articles[0].raw_text, "Body of First");
        assert_eq!(articles[0].source.name, "Example News");
        assert_eq!(articles[0].published_label(), "2026-10-01 12:30");
    }

    #[tokio::test]
    async fn test_sources_mode_maps_sources_to_articles() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sources"))
            .and(query_param("category", "technology"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "sources": [{
                    "id": "ars-technica",
                    "name": "Ars Technica",
                    "description": "Tech news",
                    "url": "https://arstechnica.com",
                    "category": "technology",
                    "language": "en",
                    "country": "us"
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("k"));
        let request = SearchRequest::new("technology", SearchMode::Sources).unwrap();
        let articles = client.search(&request).await.unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Ars Technica");
        assert_eq!(articles[0].url, "https://arstechnica.com");
        assert_eq!(articles[0].source.id.as_deref(), Some("ars-technica"));
        assert_eq!(
            articles[0].raw_text,
            "Tech news\nCategory: technology | Language: en | Country: us"
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);
        let request = SearchRequest::new("ai", SearchMode::Everything).unwrap();

        let err = client.search(&request).await.unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_key_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status": "error",
                "code": "apiKeyInvalid",
                "message": "Your API key is invalid or incorrect."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("bad"));
        let request = SearchRequest::new("ai", SearchMode::Everything).unwrap();

        match client.search(&request).await {
            Err(SearchError::Remote(RemoteError::Unauthorized(message))) => {
                assert!(message.contains("invalid"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_status_in_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "code": "parameterInvalid",
                "message": "You cannot mix the sources parameter with country."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("k"));
        let request = SearchRequest::new("ai", SearchMode::TopHeadlines).unwrap();
        let err = client.search(&request).await.unwrap_err();
        assert!(err.to_string().contains("cannot mix"));
    }
}
