//! `yomibot` - Reddit bot that translates comic images in place
//!
//! # Features
//!
//! - **Work queue**: id-keyed, insertion-ordered, age-limited, refreshed every tick
//! - **Gated pipeline**: host allow-list, view threshold, idempotency check,
//!   size check, translation, compositing, upload, reply
//! - **Shrink-to-fit layout**: greedy word wrap with geometric font shrinking
//! - **Compositing**: opaque rounded bubbles plus fitted text via `imageproc`
//!
//! # Example
//!
//! ```rust,no_run
//! use yomibot::{Bot, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let bot = Bot::from_config(&config)?;
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     bot.run(shutdown).await
//! }
//! ```

pub mod bot;
pub mod collab;
pub mod compositor;
pub mod config;
pub mod http_client;
pub mod layout;
pub mod pipeline;
pub mod queue;

pub use bot::{Bot, Schedule, SeenIds, TickGuard};
pub use collab::{
    CollabError, CommentHistory, ImageFetcher, ImageHost, ItemMetadata, Publisher,
    SubmissionSource, TranslateError, TranslationRegion, Translator,
};
pub use compositor::{load_font, CompositeReport, Compositor, CompositorStyle, RasterCanvas, Surface, Typeface};
pub use config::{Config, ConfigError};
pub use http_client::build_client;
pub use layout::{LaidOutLine, LayoutError, LayoutParams, TextBlock, TextBox, TextLayoutEngine, TextMeasurer};
pub use pipeline::{Collaborators, Pipeline, PipelineSettings, ProcessingOutcome, TickReport};
pub use queue::{QueueItem, SharedQueue, WorkQueue};

/// Version of yomibot
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
