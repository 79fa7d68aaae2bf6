use std::fmt::Write;

use shared::{ArticleEntry, Preview, Stage};

fn marker<T>(stage: &Stage<T>, done: &str) -> String {
    match stage {
        Stage::NotStarted => String::new(),
        Stage::InProgress => " …".to_string(),
        Stage::Done(_) => format!(" {}", done),
        Stage::Failed(_) => " ✗".to_string(),
    }
}

/// Numbered article list with the label and what has been generated so far.
pub fn article_list(entries: &[ArticleEntry]) -> String {
    if entries.is_empty() {
        return "No articles. Use 'search <terms>' first.".to_string();
    }

    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let label = match &entry.classification {
            Stage::Done(c) => format!("[{}] ", c.label),
            Stage::InProgress => "[…] ".to_string(),
            Stage::Failed(_) => "[?] ".to_string(),
            Stage::NotStarted => String::new(),
        };
        let _ = writeln!(
            out,
            "  {:>2}) {}{}{}{}",
            i + 1,
            label,
            entry.article.title,
            marker(&entry.post, "📝"),
            marker(&entry.image, "🖼"),
        );
        let _ = writeln!(
            out,
            "      {} | {} | {}",
            entry.article.source.name,
            entry.article.published_label(),
            entry.article.url
        );
    }
    out.trim_end().to_string()
}

pub fn article_detail(index: usize, entry: &ArticleEntry) -> String {
    let article = &entry.article;
    let mut out = String::new();
    let _ = writeln!(out, "#{} {}", index + 1, article.title);
    let _ = writeln!(out, "Source: {}", article.source.name);
    if let Some(author) = &article.author {
        let _ = writeln!(out, "Author: {}", author);
    }
    let _ = writeln!(out, "Date: {}", article.published_label());
    let _ = writeln!(out, "URL: {}", article.url);
    if let Some(description) = &article.description {
        let _ = writeln!(out, "\n{}", description);
    }
    if !article.raw_text.is_empty() && Some(&article.raw_text) != article.description.as_ref() {
        let _ = writeln!(out, "\n{}", article.raw_text);
    }

    match &entry.classification {
        Stage::Done(c) => {
            let _ = writeln!(out, "\nLabel: {}", c.label);
            if let Some(rationale) = &c.rationale {
                let _ = writeln!(out, "Rationale: {}", rationale);
            }
        }
        Stage::Failed(reason) => {
            let _ = writeln!(out, "\nClassification failed: {}", reason);
        }
        _ => {}
    }
    if let Stage::Failed(reason) = &entry.post {
        let _ = writeln!(out, "Post failed: {}", reason);
    }
    if let Stage::Failed(reason) = &entry.image {
        let _ = writeln!(out, "Image failed: {}", reason);
    }
    out.trim_end().to_string()
}

pub fn preview(preview: &Preview) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", preview.title);
    let _ = writeln!(out, "{}", preview.url);
    let _ = writeln!(
        out,
        "Label: {}",
        preview
            .label
            .map(|l| l.to_string())
            .unwrap_or_else(|| "not classified".to_string())
    );
    let _ = writeln!(out, "{}", "-".repeat(60));
    match &preview.post {
        Some(post) => {
            let _ = writeln!(out, "{}", post.trim());
        }
        None => {
            let _ = writeln!(out, "(no post yet, use 'post <n>')");
        }
    }
    let _ = writeln!(out, "{}", "-".repeat(60));
    match &preview.image_path {
        Some(path) => {
            let _ = writeln!(out, "Image: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "Image: (none yet, use 'image <n>')");
        }
    }
    out.trim_end().to_string()
}
