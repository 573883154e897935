//! Per-item processing state machine and the queue tick.
//!
//! Each tick:
//!
//! 1. drops expired items,
//! 2. refreshes live metadata of everything still queued,
//! 3. runs [`Pipeline::process_item`] on each refreshed item in queue order.
//!
//! `process_item` walks a fixed sequence of gates and returns exactly one
//! [`ProcessingOutcome`]. Every failure inside it is converted to an outcome
//! and logged, so one bad item never stops the rest of the tick.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::collab::reddit::reply_body;
use crate::collab::{
    CommentHistory, ImageFetcher, ImageHost, Publisher, SubmissionSource, TranslationRegion,
    Translator,
};
use crate::compositor::{Compositor, CompositorStyle, Typeface};
use crate::config::Config;
use crate::queue::{QueueItem, SharedQueue};

/// What to do with an item after one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Keep it queued and re-evaluate next tick.
    RetryLater,
    /// Done: handled, permanently ineligible, or failed.
    RemoveFromQueue,
}

/// Handles to every external collaborator.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SubmissionSource>,
    pub comments: Arc<dyn CommentHistory>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub translator: Arc<dyn Translator>,
    pub host: Arc<dyn ImageHost>,
    pub publisher: Arc<dyn Publisher>,
}

/// Gate thresholds and timing.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub allowed_hosts: HashSet<String>,
    pub min_view_count: u64,
    pub min_image_dimension: u32,
    pub supported_languages: HashSet<String>,
    pub bot_username: String,
    pub age_limit_secs: i64,
    pub call_timeout: Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        let gates = &config.gates;
        Self {
            allowed_hosts: gates.allowed_hosts.iter().cloned().collect(),
            min_view_count: gates.min_view_count,
            min_image_dimension: gates.min_image_dimension,
            supported_languages: gates.supported_languages.iter().cloned().collect(),
            bot_username: gates.bot_username.clone(),
            age_limit_secs: config.queue.age_limit_secs,
            call_timeout: config.call_timeout(),
        }
    }
}

impl PipelineSettings {
    /// Parse `raw` and check its host against the allow-list.
    #[must_use]
    pub fn eligible_url(&self, raw: &str) -> Option<Url> {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?;
        self.allowed_hosts.contains(host).then_some(url)
    }

    /// Regions to overlay, or `None` if there is nothing (supported) to translate.
    ///
    /// One region in an unsupported language rejects the whole image.
    #[must_use]
    pub fn qualifying_regions(&self, regions: Vec<TranslationRegion>) -> Option<Vec<TranslationRegion>> {
        let all_supported = regions
            .iter()
            .all(|r| self.supported_languages.contains(&r.original_language));
        (!regions.is_empty() && all_supported).then_some(regions)
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub expired: usize,
    pub processed: usize,
    pub retried: usize,
    pub removed: usize,
    /// Stopped early because shutdown was requested
    pub interrupted: bool,
}

pub struct Pipeline {
    settings: PipelineSettings,
    collab: Collaborators,
    compositor: Compositor,
    face: Arc<dyn Typeface>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        collab: Collaborators,
        style: CompositorStyle,
        face: Arc<dyn Typeface>,
    ) -> Self {
        Self {
            settings,
            collab,
            compositor: Compositor::new(style),
            face,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn SubmissionSource> {
        &self.collab.source
    }

    /// Run one tick over `queue` at wall-clock `now`.
    pub async fn tick(&self, queue: &SharedQueue, shutdown: Option<&watch::Receiver<bool>>) -> TickReport {
        self.tick_at(chrono::Utc::now().timestamp(), queue, shutdown).await
    }

    /// Run one tick with an explicit `now` (seconds since the epoch).
    pub async fn tick_at(
        &self,
        now: i64,
        queue: &SharedQueue,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> TickReport {
        let mut report = TickReport::default();

        let expired = queue.clear_expired(now, self.settings.age_limit_secs);
        for item in &expired {
            // Includes items that never reached the view threshold.
            debug!(item = %item.id, views = item.view_count, "Expired without processing");
        }
        report.expired = expired.len();

        // Items added from here on wait for the next tick.
        let refresh = queue
            .refresh_all(self.collab.source.as_ref(), self.settings.call_timeout)
            .await;

        for id in refresh.ids {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                report.interrupted = true;
                break;
            }
            let Some(item) = queue.get(&id) else {
                continue;
            };

            report.processed += 1;
            match self.process_item(&item).await {
                ProcessingOutcome::RetryLater => report.retried += 1,
                ProcessingOutcome::RemoveFromQueue => {
                    queue.remove(&id);
                    report.removed += 1;
                }
            }
        }

        info!(
            expired = report.expired,
            processed = report.processed,
            retried = report.retried,
            removed = report.removed,
            queued = queue.len(),
            "Tick finished"
        );
        report
    }

    /// Evaluate one item through every gate.
    #[instrument(skip(self, item), fields(item = %item.id))]
    pub async fn process_item(&self, item: &QueueItem) -> ProcessingOutcome {
        use ProcessingOutcome::{RemoveFromQueue, RetryLater};

        let Some(url) = self.settings.eligible_url(&item.url) else {
            debug!(url = %item.url, "Unsupported URL");
            return RemoveFromQueue;
        };

        if item.view_count < self.settings.min_view_count {
            debug!(views = item.view_count, "Not enough views yet");
            return RetryLater;
        }

        // Should not happen since handled items leave the queue, but never
        // reply twice.
        let history = self
            .call(
                "comment history",
                self.collab.comments.has_commented(item, &self.settings.bot_username),
            )
            .await;
        match history {
            Some(Ok(false)) => {}
            Some(Ok(true)) => {
                debug!("Already replied");
                return RemoveFromQueue;
            }
            Some(Err(e)) => {
                warn!("Comment history check failed: {e}");
                return RemoveFromQueue;
            }
            None => return RemoveFromQueue,
        }

        let Some(image) = self.call("image fetch", self.collab.fetcher.fetch(&url)).await.flatten() else {
            debug!(%url, "Image unavailable");
            return RemoveFromQueue;
        };

        let min = self.settings.min_image_dimension;
        if image.width() < min || image.height() < min {
            debug!(width = image.width(), height = image.height(), "Image too small");
            return RemoveFromQueue;
        }

        let Some(regions) = self.translate(&image).await else {
            return RemoveFromQueue;
        };

        let Some(translated) = self.render(image, regions).await else {
            return RemoveFromQueue;
        };

        let Some(link) = self.call("upload", self.collab.host.upload(&translated)).await.flatten() else {
            return RemoveFromQueue;
        };

        match self
            .call("reply", self.collab.publisher.reply(item, &reply_body(&link)))
            .await
        {
            Some(Ok(())) => info!(%link, "Posted translation"),
            Some(Err(e)) => warn!("Reply failed: {e}"),
            None => {}
        }
        RemoveFromQueue
    }

    async fn translate(&self, image: &RgbaImage) -> Option<Vec<TranslationRegion>> {
        match self.call("translation", self.collab.translator.translate(image)).await? {
            Ok(regions) => {
                let count = regions.len();
                let qualifying = self.settings.qualifying_regions(regions);
                if qualifying.is_none() {
                    debug!(regions = count, "No supported text to translate");
                }
                qualifying
            }
            Err(e) => {
                error!("Translation failed: {e}");
                None
            }
        }
    }

    /// Composite on the blocking pool; rasterizing large images is CPU-bound.
    async fn render(&self, image: RgbaImage, regions: Vec<TranslationRegion>) -> Option<RgbaImage> {
        let compositor = self.compositor;
        let face = Arc::clone(&self.face);
        let rendered =
            tokio::task::spawn_blocking(move || compositor.render(image, face.as_ref(), &regions)).await;

        match rendered {
            Ok((translated, report)) => {
                debug!(
                    bubbles = report.bubbles,
                    unfitted = report.unfitted,
                    offscreen = report.offscreen,
                    "Overlay rendered"
                );
                Some(translated)
            }
            Err(e) => {
                error!("Rendering failed: {e}");
                None
            }
        }
    }

    /// Await a collaborator call under the configured timeout.
    async fn call<T>(&self, what: &'static str, fut: impl Future<Output = T>) -> Option<T> {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("{what} timed out after {:?}", self.settings.call_timeout);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{CollabError, ItemMetadata, TranslateError};
    use crate::layout::TextMeasurer;
    use async_trait::async_trait;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixed;

    impl TextMeasurer for Fixed {
        fn measure(&self, text: &str, font_px: f32) -> f32 {
            text.chars().count() as f32 * 0.6 * font_px
        }
    }

    impl Typeface for Fixed {
        fn draw(&self, _: &mut RgbaImage, _: f32, _: f32, _: f32, _: &str, _: Rgba<u8>) {}
    }

    /// One fake playing every collaborator role.
    struct Fake {
        views: u64,
        already_replied: bool,
        image_size: Option<(u32, u32)>,
        translation: Mutex<Option<Result<Vec<TranslationRegion>, TranslateError>>>,
        upload: Option<&'static str>,
        fetches: AtomicUsize,
        replies: Mutex<Vec<String>>,
    }

    impl Default for Fake {
        fn default() -> Self {
            Self {
                views: 1000,
                already_replied: false,
                image_size: Some((800, 600)),
                translation: Mutex::new(Some(Ok(vec![region("jp", "HELLO WORLD")]))),
                upload: Some("https://i.imgur.com/out.png"),
                fetches: AtomicUsize::new(0),
                replies: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SubmissionSource for Fake {
        async fn latest(&self) -> crate::collab::Result<Vec<QueueItem>> {
            Ok(Vec::new())
        }

        async fn refresh(&self, _: &QueueItem) -> crate::collab::Result<ItemMetadata> {
            Ok(ItemMetadata {
                view_count: self.views,
            })
        }
    }

    #[async_trait]
    impl CommentHistory for Fake {
        async fn has_commented(&self, _: &QueueItem, _: &str) -> crate::collab::Result<bool> {
            Ok(self.already_replied)
        }
    }

    #[async_trait]
    impl ImageFetcher for Fake {
        async fn fetch(&self, _: &Url) -> Option<RgbaImage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.image_size.map(|(w, h)| RgbaImage::new(w, h))
        }
    }

    #[async_trait]
    impl Translator for Fake {
        async fn translate(&self, _: &RgbaImage) -> Result<Vec<TranslationRegion>, TranslateError> {
            self.translation
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[async_trait]
    impl ImageHost for Fake {
        async fn upload(&self, _: &RgbaImage) -> Option<Url> {
            self.upload.map(|u| Url::parse(u).unwrap())
        }
    }

    #[async_trait]
    impl Publisher for Fake {
        async fn reply(&self, item: &QueueItem, body: &str) -> crate::collab::Result<()> {
            self.replies.lock().unwrap().push(format!("{}:{body}", item.id));
            Ok(())
        }
    }

    fn region(lang: &str, text: &str) -> TranslationRegion {
        TranslationRegion {
            original_language: lang.to_string(),
            translated_text: text.to_string(),
            min_x: 10.0,
            min_y: 10.0,
            max_x: 210.0,
            max_y: 60.0,
        }
    }

    fn item(id: &str, url: &str, views: u64) -> QueueItem {
        QueueItem {
            id: id.to_string(),
            fullname: format!("t3_{id}"),
            created_utc: NOW - 60,
            view_count: views,
            url: url.to_string(),
            permalink: format!("/r/test/comments/{id}/"),
        }
    }

    const NOW: i64 = 1_700_000_000;

    fn pipeline(fake: Arc<Fake>) -> Pipeline {
        let collab = Collaborators {
            source: fake.clone(),
            comments: fake.clone(),
            fetcher: fake.clone(),
            translator: fake.clone(),
            host: fake.clone(),
            publisher: fake,
        };
        Pipeline::new(
            PipelineSettings::from(&Config::default()),
            collab,
            CompositorStyle::default(),
            Arc::new(Fixed),
        )
    }

    #[tokio::test]
    async fn low_views_retry_and_stay_queued() {
        let fake = Arc::new(Fake {
            views: 10,
            ..Fake::default()
        });
        let pipeline = pipeline(fake.clone());
        let queue = SharedQueue::new();
        queue.add(item("a", "https://i.redd.it/a.png", 0));

        let report = pipeline.tick_at(NOW, &queue, None).await;

        assert_eq!(report.retried, 1);
        assert!(queue.get("a").is_some());
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unlisted_host_is_removed() {
        let fake = Arc::new(Fake::default());
        let pipeline = pipeline(fake.clone());
        let queue = SharedQueue::new();
        queue.add(item("a", "https://example.com/a.png", 0));

        let report = pipeline.tick_at(NOW, &queue, None).await;

        assert_eq!(report.removed, 1);
        assert!(queue.is_empty());
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparsable_url_is_removed() {
        let pipeline = pipeline(Arc::new(Fake::default()));
        let outcome = pipeline.process_item(&item("a", "not a url", 1000)).await;
        assert_eq!(outcome, ProcessingOutcome::RemoveFromQueue);
    }

    #[tokio::test]
    async fn small_image_is_removed() {
        let fake = Arc::new(Fake {
            image_size: Some((300, 300)),
            ..Fake::default()
        });
        let pipeline = pipeline(fake.clone());
        let outcome = pipeline
            .process_item(&item("a", "https://i.redd.it/a.png", 1000))
            .await;
        assert_eq!(outcome, ProcessingOutcome::RemoveFromQueue);
        assert!(fake.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_language_is_removed_without_reply() {
        let fake = Arc::new(Fake {
            translation: Mutex::new(Some(Ok(vec![region("fr", "Bonjour")]))),
            ..Fake::default()
        });
        let pipeline = pipeline(fake.clone());
        let outcome = pipeline
            .process_item(&item("a", "https://i.imgur.com/a.png", 1000))
            .await;
        assert_eq!(outcome, ProcessingOutcome::RemoveFromQueue);
        assert!(fake.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn translation_error_is_contained_to_its_item() {
        let fake = Arc::new(Fake {
            translation: Mutex::new(Some(Err(TranslateError::Decode("bad".to_string())))),
            ..Fake::default()
        });
        let pipeline = pipeline(fake.clone());
        let queue = SharedQueue::new();
        queue.add(item("a", "https://i.redd.it/a.png", 0));
        queue.add(item("b", "https://i.redd.it/b.png", 0));

        let report = pipeline.tick_at(NOW, &queue, None).await;

        // "a" hits the error, "b" gets the default (empty) translation.
        assert_eq!(report.processed, 2);
        assert_eq!(report.removed, 2);
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 2);
        assert!(fake.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn already_replied_is_removed_before_fetch() {
        let fake = Arc::new(Fake {
            already_replied: true,
            ..Fake::default()
        });
        let pipeline = pipeline(fake.clone());
        let outcome = pipeline
            .process_item(&item("a", "https://i.redd.it/a.png", 1000))
            .await;
        assert_eq!(outcome, ProcessingOutcome::RemoveFromQueue);
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_upload_removes_without_reply() {
        let fake = Arc::new(Fake {
            upload: None,
            ..Fake::default()
        });
        let pipeline = pipeline(fake.clone());
        let outcome = pipeline
            .process_item(&item("a", "https://i.redd.it/a.png", 1000))
            .await;
        assert_eq!(outcome, ProcessingOutcome::RemoveFromQueue);
        assert!(fake.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_item_replies_once_and_leaves_queue() {
        let fake = Arc::new(Fake::default());
        let pipeline = pipeline(fake.clone());
        let queue = SharedQueue::new();
        queue.add(item("a", "https://preview.redd.it/a.png", 0));

        let report = pipeline.tick_at(NOW, &queue, None).await;

        assert_eq!(report.removed, 1);
        assert!(queue.is_empty());
        assert_eq!(
            *fake.replies.lock().unwrap(),
            vec!["a:[Translated version](https://i.imgur.com/out.png)".to_string()]
        );
    }

    #[tokio::test]
    async fn expired_items_are_dropped_before_processing() {
        let fake = Arc::new(Fake::default());
        let pipeline = pipeline(fake.clone());
        let queue = SharedQueue::new();
        let mut old = item("old", "https://i.redd.it/old.png", 1000);
        old.created_utc = NOW - 2 * 86_400;
        queue.add(old);

        let report = pipeline.tick_at(NOW, &queue, None).await;

        assert_eq!(report.expired, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_between_items() {
        let pipeline = pipeline(Arc::new(Fake::default()));
        let queue = SharedQueue::new();
        queue.add(item("a", "https://i.redd.it/a.png", 0));
        let (tx, rx) = watch::channel(true);

        let report = pipeline.tick_at(NOW, &queue, Some(&rx)).await;

        assert!(report.interrupted);
        assert_eq!(report.processed, 0);
        assert_eq!(queue.len(), 1);
        drop(tx);
    }

    /// Typeface whose rasterizer panics.
    struct BrokenFace;

    impl TextMeasurer for BrokenFace {
        fn measure(&self, text: &str, font_px: f32) -> f32 {
            Fixed.measure(text, font_px)
        }
    }

    impl Typeface for BrokenFace {
        fn draw(&self, _: &mut RgbaImage, _: f32, _: f32, _: f32, _: &str, _: Rgba<u8>) {
            panic!("rasterizer exploded");
        }
    }

    #[tokio::test]
    async fn render_failure_is_contained_to_its_item() {
        let fake = Arc::new(Fake::default());
        let mut pipeline = pipeline(fake.clone());
        pipeline.face = Arc::new(BrokenFace);
        let queue = SharedQueue::new();
        queue.add(item("a", "https://i.redd.it/a.png", 0));
        queue.add(item("b", "https://i.redd.it/b.png", 0));

        let report = pipeline.tick_at(NOW, &queue, None).await;

        // "a" panics while drawing, "b" still runs (and finds no text).
        assert_eq!(report.processed, 2);
        assert_eq!(report.removed, 2);
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 2);
        assert!(fake.replies.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn successful_item_on_multi_thread_runtime_replies() {
        let fake = Arc::new(Fake::default());
        let pipeline = pipeline(fake.clone());
        let outcome = pipeline
            .process_item(&item("a", "https://i.redd.it/a.png", 1000))
            .await;
        assert_eq!(outcome, ProcessingOutcome::RemoveFromQueue);
        assert_eq!(fake.replies.lock().unwrap().len(), 1);
    }

    struct FailingHistory;

    #[async_trait]
    impl CommentHistory for FailingHistory {
        async fn has_commented(&self, _: &QueueItem, _: &str) -> crate::collab::Result<bool> {
            Err(CollabError::MissingCredential("test"))
        }
    }

    #[tokio::test]
    async fn comment_history_failure_is_removed() {
        let fake = Arc::new(Fake::default());
        let mut pipeline = pipeline(fake.clone());
        pipeline.collab.comments = Arc::new(FailingHistory);
        let outcome = pipeline
            .process_item(&item("a", "https://i.redd.it/a.png", 1000))
            .await;
        assert_eq!(outcome, ProcessingOutcome::RemoveFromQueue);
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn qualifying_regions_rejects_empty_and_mixed_languages() {
        let settings = PipelineSettings::from(&Config::default());
        assert!(settings.qualifying_regions(Vec::new()).is_none());
        assert!(settings
            .qualifying_regions(vec![region("jp", "a"), region("fr", "b")])
            .is_none());
        assert_eq!(
            settings
                .qualifying_regions(vec![region("kr", "a"), region("cn", "")])
                .map(|r| r.len()),
            Some(2)
        );
    }

    #[test]
    fn eligible_url_checks_host_exactly() {
        let settings = PipelineSettings::from(&Config::default());
        assert!(settings.eligible_url("https://i.redd.it/x.jpg").is_some());
        assert!(settings.eligible_url("https://i.imgur.com/x.jpg").is_some());
        assert!(settings.eligible_url("https://imgur.com/x").is_none());
        assert!(settings.eligible_url("https://i.redd.it.evil.com/x").is_none());
        assert!(settings.eligible_url("").is_none());
    }
}
