// Public modules
pub mod classifier;
pub mod config;
pub mod desk;
pub mod error;
pub mod image;
pub mod llm;
pub mod models;
pub mod news;
pub mod post;
pub mod session;

// Re-export commonly used types
pub use classifier::Classifier;
pub use config::Config;
pub use desk::{Desk, Preview, SearchDefaults};
pub use error::{
    ClassificationError, ConfigError, DeskError, GenerationError, ImageError, ModelError,
    RemoteError, SearchError, SessionError,
};
pub use image::{ImageBackend, ImageGenerator, PollPolicy, ReplicateClient};
pub use llm::{LanguageModel, ZaiClient};
pub use models::{Article, ClassificationResult, GeneratedImage, GeneratedPost, Label, SearchMode};
pub use news::{ArticleSearch, NewsClient, SearchRequest};
pub use post::PostGenerator;
pub use session::{Action, ArticleEntry, Session, Stage};
