use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::{ClassificationError, DeskError, SessionError};
use crate::image::{ImageGenerator, PollPolicy, ReplicateClient};
use crate::llm::{LanguageModel, ZaiClient};
use crate::models::{Article, ClassificationResult, GeneratedImage, GeneratedPost, Label, SearchMode};
use crate::news::{ArticleSearch, NewsClient, SearchRequest};
use crate::post::PostGenerator;
use crate::session::{Action, Attachment, Session, Task, Ticket};

/// Search parameters used when the user does not give them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDefaults {
    pub language: String,
    pub page_size: u32,
    pub category: Option<String>,
}

impl SearchDefaults {
    pub fn from_config(config: &Config) -> Self {
        Self {
            language: config.default_language.clone(),
            page_size: config.max_news_per_source,
            category: config.default_category.clone(),
        }
    }
}

/// What the preview pane shows for one article.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub title: String,
    pub url: String,
    pub label: Option<Label>,
    pub post: Option<String>,
    pub image_path: Option<PathBuf>,
}

/// Releases a session-wide task when the action ends, including when its future is dropped.
struct TaskGuard<'a> {
    desk: &'a Desk,
    task: Task,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.desk.lock().end_task(self.task);
    }
}

/// A started per-article action. Dropping it before `complete` releases the slot.
struct TicketGuard<'a> {
    desk: &'a Desk,
    ticket: Option<Ticket>,
}

impl TicketGuard<'_> {
    fn take(mut self) -> Option<Ticket> {
        self.ticket.take()
    }
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.desk.lock().abandon(&ticket);
        }
    }
}

/// Orchestrates user actions over one session.
///
/// The session lock is never held across an await.
pub struct Desk {
    session: Mutex<Session>,
    search: Arc<dyn ArticleSearch>,
    classifier: Classifier,
    posts: PostGenerator,
    images: ImageGenerator,
    defaults: SearchDefaults,
}

impl Desk {
    pub fn new(
        search: Arc<dyn ArticleSearch>,
        model: Arc<dyn LanguageModel>,
        images: ImageGenerator,
        defaults: SearchDefaults,
    ) -> Self {
        Self {
            session: Mutex::new(Session::new()),
            search,
            classifier: Classifier::new(model.clone()),
            posts: PostGenerator::new(model, defaults.language.clone()),
            images,
            defaults,
        }
    }

    /// Build the desk with the real API clients.
    pub fn from_config(config: &Config) -> Result<Self, DeskError> {
        let search = Arc::new(NewsClient::new(config)?);
        let model = Arc::new(ZaiClient::new(config)?);
        let images = ImageGenerator::new(
            Arc::new(ReplicateClient::new(config)?),
            config.images_dir.clone(),
            PollPolicy::from_config(config),
        );

        Ok(Self::new(search, model, images, SearchDefaults::from_config(config)))
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard(&self, ticket: Ticket) -> TicketGuard<'_> {
        TicketGuard {
            desk: self,
            ticket: Some(ticket),
        }
    }

    fn claim(&self, task: Task) -> Result<(TaskGuard<'_>, u64), SessionError> {
        let epoch = self.lock().begin_task(task)?;
        Ok((TaskGuard { desk: self, task }, epoch))
    }

    /// Read the session state.
    pub fn read<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.lock())
    }

    pub fn defaults(&self) -> &SearchDefaults {
        &self.defaults
    }

    pub fn images_dir(&self) -> &Path {
        self.images.images_dir()
    }

    /// Run a search and replace the result list. Returns the number of articles found.
    ///
    /// On failure the previous list is kept.
    pub async fn search(
        &self,
        input: &str,
        mode: SearchMode,
        page_size: Option<u32>,
    ) -> Result<usize, DeskError> {
        let mut request = SearchRequest::new(input, mode)?
            .with_page_size(page_size.unwrap_or(self.defaults.page_size));
        request.language = Some(self.defaults.language.clone());
        request.category = self.defaults.category.clone();

        let (_guard, _) = self.claim(Task::Search)?;
        let articles = self.search.search(&request).await?;

        let count = articles.len();
        self.lock().replace(articles);
        Ok(count)
    }

    pub async fn classify(&self, index: usize) -> Result<ClassificationResult, DeskError> {
        let (guard, article) = self.begin(index, Action::Classify)?;
        let result = self.classifier.classify(&article).await;
        self.complete(guard, result)
    }

    pub async fn post(
        &self,
        index: usize,
        comment: Option<&str>,
    ) -> Result<GeneratedPost, DeskError> {
        let (guard, article, classification) = {
            let mut session = self.lock();
            let ticket = session.begin(index, Action::Post)?;
            let entry = session.entry(index)?;
            (
                self.guard(ticket),
                entry.article.clone(),
                entry.classification.done().cloned(),
            )
        };

        let result = self
            .posts
            .for_article(&article, classification.as_ref(), comment)
            .await;
        self.complete(guard, result)
    }

    pub async fn image(&self, index: usize) -> Result<GeneratedImage, DeskError> {
        let (guard, article, post) = {
            let mut session = self.lock();
            let ticket = session.begin(index, Action::Image)?;
            let entry = session.entry(index)?;
            (
                self.guard(ticket),
                entry.article.clone(),
                entry.post.done().cloned(),
            )
        };

        let result = self.images.generate(&article, post.as_ref()).await;
        self.complete(guard, result)
    }

    /// Shortlist the most relevant articles of the current list.
    pub async fn curate(&self) -> Result<String, DeskError> {
        let articles = self.read(Session::articles);
        if articles.is_empty() {
            return Err(ClassificationError::NoArticles.into());
        }

        let (_guard, epoch) = self.claim(Task::Curate)?;
        let shortlist = self.classifier.curate(&articles).await?;

        if !self.lock().set_shortlist(epoch, shortlist.clone()) {
            return Err(SessionError::Stale.into());
        }
        Ok(shortlist)
    }

    /// Write a post from free text. The result is kept as the session draft.
    pub async fn draft(&self, text: &str) -> Result<String, DeskError> {
        let (_guard, _) = self.claim(Task::Draft)?;
        let draft = self.posts.from_text(text).await?;
        self.lock().set_draft(draft.clone());
        Ok(draft)
    }

    /// Write a post about one item of the current shortlist. The result is kept as the session draft.
    pub async fn post_from_shortlist(&self) -> Result<String, DeskError> {
        let shortlist = self
            .read(|s| s.shortlist().map(str::to_string))
            .ok_or(SessionError::NoShortlist)?;

        let (_guard, _) = self.claim(Task::Draft)?;
        let draft = self.posts.from_shortlist(&shortlist).await?;
        self.lock().set_draft(draft.clone());
        Ok(draft)
    }

    pub fn preview(&self, index: usize) -> Result<Preview, DeskError> {
        let session = self.lock();
        let entry = session.entry(index)?;

        Ok(Preview {
            title: entry.article.title.clone(),
            url: entry.article.url.clone(),
            label: entry.classification.done().map(|c| c.label),
            post: entry.post.done().map(|p| p.text.clone()),
            image_path: entry.image.done().map(|i| i.local_path.clone()),
        })
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn begin(
        &self,
        index: usize,
        action: Action,
    ) -> Result<(TicketGuard<'_>, Article), SessionError> {
        let mut session = self.lock();
        let ticket = session.begin(index, action)?;
        let article = session.entry(index)?.article.clone();
        Ok((self.guard(ticket), article))
    }

    /// Record the outcome on the session, then hand it back to the caller.
    fn complete<T, E>(&self, guard: TicketGuard<'_>, result: Result<T, E>) -> Result<T, DeskError>
    where
        T: Attachment + Clone,
        E: Display,
        DeskError: From<E>,
    {
        let outcome = match &result {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(e.to_string()),
        };
        let stored = match guard.take() {
            Some(ticket) => self.lock().finish(&ticket, outcome),
            None => false,
        };

        let value = result?;
        if !stored {
            return Err(SessionError::Stale.into());
        }
        Ok(value)
    }
}
