use std::sync::Arc;

use crate::error::ClassificationError;
use crate::llm::LanguageModel;
use crate::models::{Article, ClassificationResult, Label};

const CLASSIFY_PROMPT: &str = r#"You are a critical news curator covering technology, programming, business, economy, politics, geopolitics, management and their strategic impact.

You will receive ONE news item with its title, description, source and date.

RULES:
1. Do not invent facts, numbers or quotes.
2. Judge only from the title and the description.
3. Trivial, promotional, entertainment, gossip or low-credibility items are "Irrelevant".
4. Pick exactly ONE label from this list:
{labels}

Format your response as exactly two lines:
Label: <one label from the list>
Rationale: <one sentence on why a professional reader should care>"#;

const CURATE_PROMPT: &str = r#"You are a critical news curator covering technology, programming, business, economy, politics, geopolitics, management and their strategic impact.

You will receive a numbered list of news items with title, description, source and date.

RULES:
1. Do not invent facts, numbers or quotes.
2. Do not assume anything beyond the title and the description.
3. Ignore trivial, promotional, entertainment, gossip or low-credibility items.
4. Prefer items with real strategic impact, room for critical analysis, and credible sources.

TASK:
Select ONLY the 3 most relevant items. If fewer qualify, return only those.
If none qualify, respond exactly: "No relevant news in this batch."

Format each selected item as:

News 1
Title: ...
Source: ...
Why it matters: ...
Critical angle: ...

Do not explain your process. Do not summarize the items. Never return more than 3.
Write as someone preparing professional, critical LinkedIn commentary."#;

/// Render the article block sent to the model.
pub(crate) fn describe_article(article: &Article) -> String {
    format!(
        "Title: {}\nDescription: {}\nSource: {}\nDate: {}\nURL: {}",
        article.title,
        article.description.as_deref().unwrap_or("N/A"),
        article.source.name,
        article.published_label(),
        article.url
    )
}

/// Read a label and optional rationale out of free model text.
///
/// The first line starting with `Label:` is used, or the first non-empty line
/// when there is none. Its text must name a known label exactly, or contain
/// exactly one known label as a whole word.
pub fn parse_label(text: &str) -> Result<(Label, Option<String>), ClassificationError> {
    let lines: Vec<&str> = text
        .lines()
        .map(clean_line)
        .filter(|l| !l.is_empty())
        .collect();

    let label_line = lines
        .iter()
        .find_map(|l| strip_prefix_ci(l, "label:"))
        .or_else(|| lines.first().copied())
        .ok_or_else(|| ClassificationError::Unparseable(text.to_string()))?;

    let candidate = label_line
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == ':' || c == '!')
        .trim();

    let label = match candidate.parse::<Label>() {
        Ok(label) => label,
        Err(_) => {
            let words: Vec<String> = candidate
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(str::to_lowercase)
                .collect();
            let found: Vec<Label> = Label::ALL
                .into_iter()
                .filter(|label| words.iter().any(|w| w == &label.as_str().to_lowercase()))
                .collect();
            match found.as_slice() {
                [label] => *label,
                _ => return Err(ClassificationError::Unparseable(text.to_string())),
            }
        }
    };

    let rationale = lines
        .iter()
        .find_map(|l| strip_prefix_ci(l, "rationale:"))
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    Ok((label, rationale))
}

/// Trim whitespace and markdown emphasis around a line.
fn clean_line(line: &str) -> &str {
    line.trim()
        .trim_matches(|c: char| c == '*' || c == '_' || c == '#' || c == '`' || c.is_whitespace())
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(clean_line(&line[prefix.len()..]))
    } else {
        None
    }
}

pub struct Classifier {
    model: Arc<dyn LanguageModel>,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn classify(
        &self,
        article: &Article,
    ) -> Result<ClassificationResult, ClassificationError> {
        let labels = Label::ALL
            .iter()
            .map(|l| format!("- {}", l))
            .collect::<Vec<_>>()
            .join("\n");
        let system = CLASSIFY_PROMPT.replace("{labels}", &labels);

        let response = self
            .model
            .complete(&system, &describe_article(article))
            .await?;
        let (label, rationale) = parse_label(&response)?;

        tracing::info!("Classified {} as {}", article.url, label);
        Ok(ClassificationResult {
            article_url: article.url.clone(),
            label,
            rationale,
        })
    }

    /// Ask the model to pick the most relevant items of the whole list. Returns its text as is.
    pub async fn curate(&self, articles: &[Article]) -> Result<String, ClassificationError> {
        if articles.is_empty() {
            return Err(ClassificationError::NoArticles);
        }

        let news_data = articles
            .iter()
            .enumerate()
            .map(|(idx, article)| format!("News {}\n{}", idx + 1, describe_article(article)))
            .collect::<Vec<_>>()
            .join("\n\n");

        let shortlist = self.model.complete(CURATE_PROMPT, &news_data).await?;
        tracing::info!("Curated {} articles", articles.len());
        Ok(shortlist)
    }
}
