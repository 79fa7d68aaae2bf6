use std::sync::Arc;

use crate::classifier::describe_article;
use crate::error::GenerationError;
use crate::llm::LanguageModel;
use crate::models::{Article, ClassificationResult, GeneratedPost};

const POST_MAX_WORDS: usize = 150;

const SYSTEM_PROMPT: &str = "You are a critical, firm and analytical writer focused on technology, business, economy, geopolitics and strategic impact. Your voice is direct, questioning and strategic, ready for LinkedIn.";

fn post_rules(language: &str) -> String {
    format!(
        r#"The post must:
- Open with a short, striking headline.
- Explain the real impact of the news critically and analytically.
- Give a strategic point of view connecting it to power, markets, technology or collective behaviour.
- Challenge the angle of the original coverage where it applies.
- End with a provocation or question for the reader.

RULES:
1. Do not invent facts or numbers.
2. Do not soften or merely summarize the news.
3. At most {max_words} words.
4. Put the source and the link at the end.
5. Separate paragraphs with blank lines.
6. Write the final post itself, not an outline, and never use the words "headline" or "question" as labels.
7. Write in this language: {language}."#,
        max_words = POST_MAX_WORDS,
        language = language
    )
}

/// Writes LinkedIn posts with the language model. Output is returned as the model wrote it.
pub struct PostGenerator {
    model: Arc<dyn LanguageModel>,
    language: String,
}

impl PostGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, language: impl Into<String>) -> Self {
        Self {
            model,
            language: language.into(),
        }
    }

    /// Post about one article, using its classification and an optional instruction from the user.
    pub async fn for_article(
        &self,
        article: &Article,
        classification: Option<&ClassificationResult>,
        comment: Option<&str>,
    ) -> Result<GeneratedPost, GenerationError> {
        let mut prompt = format!(
            "Write a LinkedIn post about the news below. Use it raw.\n\n{}\n\nNews:\n{}",
            post_rules(&self.language),
            describe_article(article)
        );

        if let Some(classification) = classification {
            prompt.push_str(&format!("\nCategory: {}", classification.label));
            if let Some(rationale) = &classification.rationale {
                prompt.push_str(&format!("\nWhy it matters: {}", rationale));
            }
        }

        if let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) {
            prompt.push_str(&format!("\n\nAdditional instruction from the author: {}", comment));
        }

        let text = self.model.complete(SYSTEM_PROMPT, &prompt).await?;
        tracing::info!("Generated post for {}", article.url);

        Ok(GeneratedPost {
            article_url: article.url.clone(),
            text,
        })
    }

    /// Post from free text typed by the user.
    pub async fn from_text(&self, text: &str) -> Result<String, GenerationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyInput);
        }

        let prompt = format!(
            "Write a LinkedIn post from the text below.\n\n{}\n\nText:\n{}",
            post_rules(&self.language),
            text
        );
        Ok(self.model.complete(SYSTEM_PROMPT, &prompt).await?)
    }

    /// Post from a curation shortlist: the model picks one item and writes about it.
    pub async fn from_shortlist(&self, shortlist: &str) -> Result<String, GenerationError> {
        let shortlist = shortlist.trim();
        if shortlist.is_empty() {
            return Err(GenerationError::EmptyInput);
        }

        let prompt = format!(
            "Pick ONE of the news items below (you do not need to use all of them) and write a LinkedIn post about it.\n\n{}\n\nNews:\n{}",
            post_rules(&self.language),
            shortlist
        );
        Ok(self.model.complete(SYSTEM_PROMPT, &prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::FixedModel;
    use crate::models::Label;

    const REPLY: &str = "  Chips are the new oil\n\nExport rules...\n\nSource: Wire https://news.test/chips  ";

    fn article() -> Article {
        Article::new("Chip export rules tighten", "https://news.test/chips", "Wire")
            .with_description("New limits on advanced semiconductors")
    }

    #[tokio::test]
    async fn test_post_text_is_returned_unmodified() {
        let generator = PostGenerator::new(FixedModel::new(REPLY), "en");
        let post = generator.for_article(&article(), None, None).await.unwrap();
        assert_eq!(post.text, REPLY);
        assert_eq!(post.article_url, "https://news.test/chips");
    }

    #[tokio::test]
    async fn test_prompt_includes_classification_and_comment() {
        let model = FixedModel::new(REPLY);
        let generator = PostGenerator::new(model.clone(), "pt-BR");
        let classification = ClassificationResult {
            article_url: "https://news.test/chips".to_string(),
            label: Label::Geopolitics,
            rationale: Some("Supply chains move".to_string()),
        };

        generator
            .for_article(&article(), Some(&classification), Some("  focus on Europe "))
            .await
            .unwrap();

        let prompts = model.prompts.lock().unwrap();
        let user = &prompts[0].1;
        assert!(user.contains("Category: Geopolitics"));
        assert!(user.contains("Why it matters: Supply chains move"));
        assert!(user.contains("Additional instruction from the author: focus on Europe"));
        assert!(user.contains("Write in this language: pt-BR."));
        assert!(user.contains("At most 150 words."));
    }

    #[tokio::test]
    async fn test_blank_comment_is_ignored() {
        let model = FixedModel::new(REPLY);
        let generator = PostGenerator::new(model.clone(), "en");
        generator
            .for_article(&article(), None, Some("   "))
            .await
            .unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert!(!prompts[0].1.contains("Additional instruction"));
    }

    #[tokio::test]
    async fn test_free_text_and_shortlist() {
        let model = FixedModel::new(REPLY);
        let generator = PostGenerator::new(model.clone(), "en");

        assert!(matches!(
            generator.from_text("  ").await,
            Err(GenerationError::EmptyInput)
        ));
        assert_eq!(generator.from_text("Remote work is over").await.unwrap(), REPLY);
        assert_eq!(generator.from_shortlist("News 1\nTitle: X").await.unwrap(), REPLY);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].1.ends_with("Text:\nRemote work is over"));
        assert!(prompts[1].1.starts_with("Pick ONE"));
    }
}
