use std::collections::HashSet;
use std::fmt;

use crate::error::SessionError;
use crate::models::{Article, ClassificationResult, GeneratedImage, GeneratedPost};

/// Per-article operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Classify,
    Post,
    Image,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Action::Classify => "Classification",
            Action::Post => "Post generation",
            Action::Image => "Image generation",
        };
        f.write_str(text)
    }
}

/// Operations over the whole session rather than one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Search,
    Curate,
    Draft,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Search => "search",
            Task::Curate => "curation",
            Task::Draft => "draft",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage<T> {
    NotStarted,
    InProgress,
    Done(T),
    Failed(String),
}

impl<T> Default for Stage<T> {
    fn default() -> Self {
        Stage::NotStarted
    }
}

impl<T> Stage<T> {
    pub fn done(&self) -> Option<&T> {
        match self {
            Stage::Done(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Stage::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleEntry {
    pub article: Article,
    pub classification: Stage<ClassificationResult>,
    pub post: Stage<GeneratedPost>,
    pub image: Stage<GeneratedImage>,
}

impl ArticleEntry {
    fn new(article: Article) -> Self {
        Self {
            article,
            classification: Stage::NotStarted,
            post: Stage::NotStarted,
            image: Stage::NotStarted,
        }
    }

    fn is_running(&self, action: Action) -> bool {
        match action {
            Action::Classify => self.classification.is_in_progress(),
            Action::Post => self.post.is_in_progress(),
            Action::Image => self.image.is_in_progress(),
        }
    }

    fn mark_running(&mut self, action: Action) {
        match action {
            Action::Classify => self.classification = Stage::InProgress,
            Action::Post => self.post = Stage::InProgress,
            Action::Image => self.image = Stage::InProgress,
        }
    }

    fn reset(&mut self, action: Action) {
        match action {
            Action::Classify => self.classification = Stage::NotStarted,
            Action::Post => self.post = Stage::NotStarted,
            Action::Image => self.image = Stage::NotStarted,
        }
    }
}

/// A result that can be attached to an article entry.
pub trait Attachment: Sized {
    const ACTION: Action;

    fn slot(entry: &mut ArticleEntry) -> &mut Stage<Self>;
}

impl Attachment for ClassificationResult {
    const ACTION: Action = Action::Classify;

    fn slot(entry: &mut ArticleEntry) -> &mut Stage<Self> {
        &mut entry.classification
    }
}

impl Attachment for GeneratedPost {
    const ACTION: Action = Action::Post;

    fn slot(entry: &mut ArticleEntry) -> &mut Stage<Self> {
        &mut entry.post
    }
}

impl Attachment for GeneratedImage {
    const ACTION: Action = Action::Image;

    fn slot(entry: &mut ArticleEntry) -> &mut Stage<Self> {
        &mut entry.image
    }
}

/// Proof that an action was started on one article of one result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    index: usize,
    url: String,
    action: Action,
}

impl Ticket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

/// The current result list and everything attached to it.
///
/// Every replacement of the list bumps the epoch. Results that come back for
/// an older epoch, or for an article no longer in the list, are dropped.
#[derive(Debug, Default)]
pub struct Session {
    entries: Vec<ArticleEntry>,
    epoch: u64,
    running: HashSet<Task>,
    shortlist: Option<String>,
    draft: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn entries(&self) -> &[ArticleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Result<&ArticleEntry, SessionError> {
        self.entries
            .get(index)
            .ok_or(SessionError::NoSuchArticle(index))
    }

    pub fn articles(&self) -> Vec<Article> {
        self.entries.iter().map(|e| e.article.clone()).collect()
    }

    pub fn shortlist(&self) -> Option<&str> {
        self.shortlist.as_deref()
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn is_running(&self, task: Task) -> bool {
        self.running.contains(&task)
    }

    /// Swap in a new result list. Attachments and the shortlist of the old list are dropped.
    pub fn replace(&mut self, articles: Vec<Article>) -> u64 {
        self.entries = articles.into_iter().map(ArticleEntry::new).collect();
        self.shortlist = None;
        self.epoch += 1;
        self.epoch
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
        self.draft = None;
    }

    pub fn begin(&mut self, index: usize, action: Action) -> Result<Ticket, SessionError> {
        let epoch = self.epoch;
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(SessionError::NoSuchArticle(index))?;

        if entry.is_running(action) {
            return Err(SessionError::Busy { index, action });
        }

        entry.mark_running(action);
        Ok(Ticket {
            epoch,
            index,
            url: entry.article.url.clone(),
            action,
        })
    }

    /// Store the outcome of a started action. Returns `false` when the result was discarded.
    pub fn finish<T: Attachment>(&mut self, ticket: &Ticket, result: Result<T, String>) -> bool {
        debug_assert_eq!(ticket.action, T::ACTION);

        if ticket.epoch != self.epoch {
            tracing::warn!(
                "Discarding {} for {}: result list changed",
                ticket.action,
                ticket.url
            );
            return false;
        }

        let Some(entry) = self
            .entries
            .get_mut(ticket.index)
            .filter(|e| e.article.url == ticket.url)
        else {
            tracing::warn!("Discarding {} for {}: article is gone", ticket.action, ticket.url);
            return false;
        };

        *T::slot(entry) = match result {
            Ok(value) => Stage::Done(value),
            Err(message) => Stage::Failed(message),
        };
        true
    }

    /// Release a started action that will never report back.
    ///
    /// The slot goes back to `NotStarted` if it still belongs to the ticket.
    pub fn abandon(&mut self, ticket: &Ticket) {
        if ticket.epoch != self.epoch {
            return;
        }
        if let Some(entry) = self
            .entries
            .get_mut(ticket.index)
            .filter(|e| e.article.url == ticket.url && e.is_running(ticket.action))
        {
            tracing::debug!("Abandoned {} for {}", ticket.action, ticket.url);
            entry.reset(ticket.action);
        }
    }

    /// Claim a session-wide task. Returns the epoch it started in.
    pub fn begin_task(&mut self, task: Task) -> Result<u64, SessionError> {
        if !self.running.insert(task) {
            return Err(SessionError::TaskBusy(task.name()));
        }
        Ok(self.epoch)
    }

    pub fn end_task(&mut self, task: Task) {
        self.running.remove(&task);
    }

    /// Store a shortlist computed for `epoch`. Returns `false` when the list changed meanwhile.
    pub fn set_shortlist(&mut self, epoch: u64, shortlist: String) -> bool {
        if epoch != self.epoch {
            tracing::warn!("Discarding shortlist: result list changed");
            return false;
        }
        self.shortlist = Some(shortlist);
        true
    }

    pub fn set_draft(&mut self, draft: String) {
        self.draft = Some(draft);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Label;

    fn articles(urls: &[&str]) -> Vec<Article> {
        urls.iter()
            .map(|url| Article::new(format!("Title {}", url), *url, "Wire"))
            .collect()
    }

    fn classification(url: &str) -> ClassificationResult {
        ClassificationResult {
            article_url: url.to_string(),
            label: Label::Technology,
            rationale: None,
        }
    }

    #[test]
    fn test_replace_bumps_epoch_and_resets_attachments() {
        let mut session = Session::new();
        let first = session.replace(articles(&["a", "b"]));
        let ticket = session.begin(0, Action::Classify).unwrap();
        assert!(session.finish(&ticket, Ok(classification("a"))));
        assert!(session.set_shortlist(first, "News 1".to_string()));

        let second = session.replace(articles(&["a", "c"]));
        assert_eq!(second, first + 1);
        assert_eq!(session.len(), 2);
        assert_eq!(session.entry(0).unwrap().classification, Stage::NotStarted);
        assert_eq!(session.shortlist(), None);
    }

    #[test]
    fn test_begin_refuses_running_pair() {
        let mut session = Session::new();
        session.replace(articles(&["a", "b"]));

        let ticket = session.begin(1, Action::Post).unwrap();
        assert_eq!(
            session.begin(1, Action::Post),
            Err(SessionError::Busy {
                index: 1,
                action: Action::Post
            })
        );
        // Other actions and other articles are independent
        assert!(session.begin(1, Action::Image).is_ok());
        assert!(session.begin(0, Action::Post).is_ok());

        let post = GeneratedPost {
            article_url: "b".to_string(),
            text: "text".to_string(),
        };
        assert!(session.finish(&ticket, Ok(post)));
        assert!(session.begin(1, Action::Post).is_ok());
    }

    #[test]
    fn test_begin_rejects_bad_index() {
        let mut session = Session::new();
        session.replace(articles(&["a"]));
        assert_eq!(
            session.begin(3, Action::Classify),
            Err(SessionError::NoSuchArticle(3))
        );
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let mut session = Session::new();
        session.replace(articles(&["a", "b"]));
        let ticket = session.begin(0, Action::Classify).unwrap();

        session.replace(articles(&["a", "b"]));
        assert!(!session.finish(&ticket, Ok(classification("a"))));
        assert!(session
            .entries()
            .iter()
            .all(|e| e.classification == Stage::NotStarted));
    }

    #[test]
    fn test_failure_is_recorded() {
        let mut session = Session::new();
        session.replace(articles(&["a"]));
        let ticket = session.begin(0, Action::Classify).unwrap();
        assert!(session.finish::<ClassificationResult>(&ticket, Err("boom".to_string())));
        assert_eq!(
            session.entry(0).unwrap().classification,
            Stage::Failed("boom".to_string())
        );
    }

    #[test]
    fn test_abandon_releases_the_slot() {
        let mut session = Session::new();
        session.replace(articles(&["a", "b"]));

        let ticket = session.begin(1, Action::Image).unwrap();
        session.abandon(&ticket);
        assert_eq!(session.entry(1).unwrap().image, Stage::NotStarted);
        assert!(session.begin(1, Action::Image).is_ok());

        // A ticket from an older list leaves the new list alone
        let old = session.begin(0, Action::Classify).unwrap();
        session.replace(articles(&["a", "b"]));
        let current = session.begin(0, Action::Classify).unwrap();
        session.abandon(&old);
        assert_eq!(session.entry(0).unwrap().classification, Stage::InProgress);

        // Finished slots are not touched
        assert!(session.finish(&current, Ok(classification("a"))));
        session.abandon(&current);
        assert!(session.entry(0).unwrap().classification.done().is_some());
    }

    #[test]
    fn test_tasks_are_exclusive() {
        let mut session = Session::new();
        let epoch = session.begin_task(Task::Search).unwrap();
        assert_eq!(epoch, 0);
        assert_eq!(
            session.begin_task(Task::Search),
            Err(SessionError::TaskBusy("search"))
        );
        assert!(session.begin_task(Task::Curate).is_ok());

        session.end_task(Task::Search);
        assert!(session.begin_task(Task::Search).is_ok());
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut session = Session::new();
        session.replace(articles(&["a"]));
        session.set_draft("draft".to_string());
        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.draft(), None);
        assert_eq!(session.epoch(), 2);
    }
}
