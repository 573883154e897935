//! Long-running bot: ingestion timer, processing timer, shutdown.
//!
//! [`Bot`] owns the queue and the pipeline. Two loops share it:
//!
//! - ingestion polls the submission source and appends unseen items,
//! - the tick timer starts [`Pipeline::tick`] at a fixed cadence, guarded so
//!   that a slow tick is never overlapped by the next one.
//!
//! Shutdown is signalled through a `watch` channel: both timers stop, and an
//! in-flight tick finishes its current item before returning.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::collab::{HttpImageFetcher, ImgurHost, RedditClient, TranslationClient};
use crate::compositor::{load_font, CompositorStyle};
use crate::config::Config;
use crate::http_client::build_client;
use crate::pipeline::{Collaborators, Pipeline, PipelineSettings, TickReport};
use crate::queue::SharedQueue;

/// Single-flight flag for the processing tick.
#[derive(Debug, Clone, Default)]
pub struct TickGuard {
    busy: Arc<AtomicBool>,
}

impl TickGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard; `None` while another tick holds it.
    #[must_use]
    pub fn try_begin(&self) -> Option<TickPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Released on drop.
#[derive(Debug)]
pub struct TickPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Bounded memory of ids already seen on the stream.
#[derive(Debug)]
pub struct SeenIds {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl SeenIds {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`; `true` if it was not seen before.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }
}

/// Timer periods for [`Bot::run`].
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub poll_interval: Duration,
    pub tick_interval: Duration,
}

/// Process-wide context: queue, pipeline and tick guard.
pub struct Bot {
    queue: SharedQueue,
    pipeline: Arc<Pipeline>,
    guard: TickGuard,
    schedule: Schedule,
}

impl Bot {
    pub fn new(pipeline: Pipeline, schedule: Schedule) -> Self {
        Self {
            queue: SharedQueue::new(),
            pipeline: Arc::new(pipeline),
            guard: TickGuard::new(),
            schedule,
        }
    }

    /// Wire up the HTTP collaborators and font described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let services = &config.services;
        let http = build_client(&services.user_agent, config.call_timeout())?;
        let face = load_font(&config.render.font_path)
            .context("render.font_path must point at a TTF/OTF file")?;

        let reddit = Arc::new(
            RedditClient::new(http.clone(), config.stream.subreddit.clone())
                .with_listing_size(config.stream.listing_size)
                .with_comment_scan_limit(config.gates.comment_scan_limit)
                .with_token(services.reddit_token.clone()),
        );
        let collab = Collaborators {
            source: reddit.clone(),
            comments: reddit.clone(),
            fetcher: Arc::new(HttpImageFetcher::new(http.clone())),
            translator: Arc::new(TranslationClient::new(
                http.clone(),
                services.translate_endpoint.clone(),
                services.translate_api_key.clone(),
            )),
            host: Arc::new(ImgurHost::new(http, services.imgur_client_id.clone())),
            publisher: reddit,
        };

        let pipeline = Pipeline::new(
            PipelineSettings::from(config),
            collab,
            CompositorStyle::from(&config.render),
            Arc::new(face),
        );
        Ok(Self::new(
            pipeline,
            Schedule {
                poll_interval: config.poll_interval(),
                tick_interval: config.tick_interval(),
            },
        ))
    }

    #[must_use]
    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }

    /// Poll the source once and queue unseen items. Returns how many were added.
    pub async fn ingest_once(&self, seen: &mut SeenIds) -> Result<usize> {
        let items = self
            .pipeline
            .source()
            .latest()
            .await
            .context("failed to poll submission stream")?;

        let mut added = 0;
        for item in items {
            if seen.insert(&item.id) && self.queue.add(item) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Start a tick unless one is already running.
    ///
    /// Returns `None` if the previous tick still holds the guard.
    pub fn spawn_tick(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<TickReport>> {
        let Some(permit) = self.guard.try_begin() else {
            warn!("Previous tick still running, skipping this one");
            return None;
        };

        let pipeline = Arc::clone(&self.pipeline);
        let queue = self.queue.clone();
        Some(tokio::spawn(async move {
            let _permit = permit;
            pipeline.tick(&queue, Some(&shutdown)).await
        }))
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            poll = ?self.schedule.poll_interval,
            tick = ?self.schedule.tick_interval,
            "Bot started"
        );

        tokio::join!(
            self.ingest_loop(shutdown.clone()),
            self.tick_loop(shutdown),
        );

        info!(queued = self.queue.len(), "Bot stopped");
        Ok(())
    }

    async fn ingest_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut seen = SeenIds::new(1000);
        let mut timer = interval(self.schedule.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.ingest_once(&mut seen).await {
                        Ok(added) => debug!(added, queued = self.queue.len(), "Polled stream"),
                        Err(e) => warn!("{e:#}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Ingestion stopped");
    }

    async fn tick_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.schedule.tick_interval;
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<TickReport>> = None;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Some(handle) = self.spawn_tick(shutdown.clone()) {
                        in_flight = Some(handle);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight.filter(|h| !h.is_finished()) {
            info!("Waiting for the running tick to finish");
            if let Err(e) = handle.await {
                warn!("Tick task failed: {e}");
            }
        }
        debug!("Tick timer stopped");
    }
}
