use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    daemon::{
        intake::messages::{BrowserMessage, COMPLETE_STATUS, TabId, WINDOW_ID_NONE},
        processing::module::EventProcessor,
        storage::{
            accumulator::{Accumulated, AccumulatorStore},
            kv::KeyValueStore,
        },
        upload::LogUploader,
    },
    utils::clock::Clock,
};

use super::{
    event::{EventKind, TrackerEvent},
    host::normalize_host,
    session::ActiveSession,
};

/// Sessions this short or shorter are tab flicks, not activity.
pub const MIN_SESSION_MS: i64 = 5_000;
/// Number of pending hosts that triggers a flush without waiting for the ticker.
pub const MAX_BATCH_HOSTS: usize = 200;

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// A closed session only counts if it lasted strictly longer than this.
    pub min_session_ms: i64,
    /// Used to guess the period start if the store lost it.
    pub flush_interval: Duration,
    /// A batch is sent as soon as this many hosts are pending.
    pub max_batch_hosts: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            min_session_ms: MIN_SESSION_MS,
            flush_interval: Duration::minutes(5),
            max_batch_hosts: MAX_BATCH_HOSTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was accumulated, nothing was sent.
    Empty,
    /// The endpoint accepted the batch and a new period started.
    Delivered { records: usize },
    /// The endpoint didn't accept the batch. Everything stays for the next attempt.
    Retained,
}

/// The session-accumulation state machine.
///
/// Holds the open session in memory and the closed, summed sessions in an [AccumulatorStore].
/// Every switch first folds the open session into the store and only then opens the next one,
/// so time is never counted twice.
pub struct ActivityTracker<S> {
    session: ActiveSession,
    store: AccumulatorStore<S>,
    uploader: Box<dyn LogUploader>,
    settings: TrackerSettings,
    clock: Box<dyn Clock>,
}

impl<S: KeyValueStore> ActivityTracker<S> {
    pub fn new(
        store: S,
        uploader: Box<dyn LogUploader>,
        settings: TrackerSettings,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            session: ActiveSession::Idle,
            store: AccumulatorStore::new(store),
            uploader,
            settings,
            clock,
        }
    }

    pub fn session(&self) -> &ActiveSession {
        &self.session
    }

    pub fn store(&self) -> &AccumulatorStore<S> {
        &self.store
    }

    /// Switches tracking to the host of `url`. Repeated events for the host that is already
    /// tracked are ignored, browsers fire several updates per navigation.
    pub async fn begin_tracking(&mut self, tab_id: TabId, url: &str, now: DateTime<Utc>) {
        let new_host = normalize_host(url);
        if new_host.as_deref() == self.session.host() {
            return;
        }

        self.fold_session(now).await;

        self.session = match new_host {
            Some(host) => {
                info!("Tracking new host {host}");
                ActiveSession::start(tab_id, host, now)
            }
            None => {
                debug!("{url} isn't trackable, going idle");
                ActiveSession::Idle
            }
        };
    }

    /// Folds the time of the open session into the store. The session itself stays open, it's
    /// up to the caller to replace or restart it. Returns `None` if nothing was stored.
    pub async fn close_session(&self, now: DateTime<Utc>) -> Result<Option<Accumulated>> {
        let Some(tracked) = self.session.tracked() else {
            return Ok(None);
        };

        let elapsed_ms = (now - tracked.started_at).num_milliseconds();
        if elapsed_ms <= self.settings.min_session_ms {
            debug!("Discarding {elapsed_ms}ms on {}", tracked.host);
            return Ok(None);
        }

        let accumulated = self.store.add_duration(&tracked.host, elapsed_ms).await?;
        info!(
            "Accumulated {}s for {}. Total {}s",
            elapsed_ms / 1000,
            tracked.host,
            accumulated.host_total_ms / 1000
        );
        Ok(Some(accumulated))
    }

    /// Closes the open session and goes idle. Happens when the browser loses focus.
    pub async fn stop_tracking(&mut self, now: DateTime<Utc>) {
        self.fold_session(now).await;
        self.session = ActiveSession::Idle;
    }

    /// Sends everything accumulated so far as one batch. Only a delivered batch clears the
    /// store, in which case `now` becomes the start of the next period.
    pub async fn flush(&self, now: DateTime<Utc>) -> Result<FlushOutcome> {
        let accumulator = self.store.load().await?;
        if accumulator.durations.is_empty() {
            debug!("Accumulator is empty. Nothing to send");
            return Ok(FlushOutcome::Empty);
        }

        let period_start = accumulator.period_start.unwrap_or_else(|| {
            warn!("Period start is missing, assuming one flush interval ago");
            now - self.settings.flush_interval
        });
        let delivered = accumulator.durations.clone();
        let records = accumulator.into_records(period_start, now);
        let count = records.len();

        info!("Sending {count} accumulated records");
        match self.uploader.upload(records).await {
            Ok(()) => {
                self.store.settle(&delivered, now).await?;
                info!("Delivered {count} records");
                Ok(FlushOutcome::Delivered { records: count })
            }
            Err(e) => {
                warn!("Failed to deliver records, keeping them for the next flush: {e}");
                Ok(FlushOutcome::Retained)
            }
        }
    }

    /// Periodic flush. The open session is cut at `now`: its time goes into this batch and it
    /// keeps running from `now` on.
    pub async fn on_timer_tick(&mut self, now: DateTime<Utc>) -> Result<FlushOutcome> {
        self.close_session_logged(now).await;
        self.session.restart_clock(now);
        self.flush(now).await
    }

    pub async fn handle_event(&mut self, event: TrackerEvent) -> Result<()> {
        let now = event.timestamp;
        match event.kind {
            EventKind::Tick => {
                self.on_timer_tick(now).await?;
            }
            EventKind::Browser(BrowserMessage::TabActivated { tab_id, url }) => match url {
                Some(url) => self.begin_tracking(tab_id, &url, now).await,
                None => debug!("Activated tab {tab_id} has no url yet"),
            },
            EventKind::Browser(BrowserMessage::TabUpdated {
                tab_id,
                status,
                url,
                active,
            }) => {
                let complete = status.as_deref() == Some(COMPLETE_STATUS);
                match url {
                    Some(url) if active && complete => self.begin_tracking(tab_id, &url, now).await,
                    _ => debug!("Ignoring update of tab {tab_id}"),
                }
            }
            EventKind::Browser(BrowserMessage::WindowFocusChanged {
                window_id: None | Some(WINDOW_ID_NONE),
                ..
            }) => {
                info!("Browser lost focus");
                self.stop_tracking(now).await;
            }
            EventKind::Browser(BrowserMessage::WindowFocusChanged {
                window_id: Some(window_id),
                active_tab,
            }) => match active_tab.and_then(|tab| tab.url.map(|url| (tab.tab_id, url))) {
                Some((tab_id, url)) => {
                    info!("Window {window_id} gained focus");
                    self.begin_tracking(tab_id, &url, now).await
                }
                None => debug!("Window {window_id} gained focus without an active tab"),
            },
        }
        Ok(())
    }

    async fn close_session_logged(&self, now: DateTime<Utc>) -> Option<Accumulated> {
        self.close_session(now)
            .await
            .inspect_err(|e| error!("Failed to accumulate session: {e:?}"))
            .ok()
            .flatten()
    }

    /// Closes the session on a switch. Sends the batch early once enough hosts are pending.
    async fn fold_session(&self, now: DateTime<Utc>) {
        let Some(accumulated) = self.close_session_logged(now).await else {
            return;
        };
        if accumulated.hosts < self.settings.max_batch_hosts {
            return;
        }

        info!("{} hosts pending, flushing early", accumulated.hosts);
        if let Err(e) = self.flush(now).await {
            error!("Early flush failed: {e:?}");
        }
    }
}

impl<S: KeyValueStore> EventProcessor for ActivityTracker<S> {
    async fn initialize(&mut self) -> Result<()> {
        if self.store.ensure_period_start(self.clock.time()).await? {
            info!("Started the first accumulation period");
        }
        Ok(())
    }

    async fn process_next(&mut self, event: TrackerEvent) -> Result<()> {
        self.handle_event(event).await
    }

    /// Keeps the time of the open session in the store so that the next run sends it.
    async fn finalize(&mut self) -> Result<()> {
        let now = self.clock.time();
        self.close_session(now).await?;
        self.session = ActiveSession::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::{Map, Value};

    use super::{ActivityTracker, FlushOutcome, TrackerSettings};
    use crate::{
        daemon::{
            intake::messages::{BrowserMessage, TabSnapshot},
            processing::module::EventProcessor,
            storage::{
                accumulator::AccumulatorStore,
                entities::LogRecord,
                kv::{KeyValueStore, MemoryStore},
            },
            tracking::{event::TrackerEvent, session::ActiveSession},
            upload::{LogUploader, MockLogUploader, UploadError},
        },
        utils::clock::ManualClock,
    };

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        start() + Duration::milliseconds(ms)
    }

    fn idle_uploader() -> MockLogUploader {
        let mut uploader = MockLogUploader::new();
        uploader.expect_upload().never();
        uploader
    }

    fn failing_uploader() -> MockLogUploader {
        let mut uploader = MockLogUploader::new();
        uploader.expect_upload().returning(|_| {
            Err(UploadError::Status {
                status: 503,
                body: String::new(),
            })
        });
        uploader
    }

    fn tracker(uploader: MockLogUploader) -> ActivityTracker<Arc<MemoryStore>> {
        ActivityTracker::new(
            Arc::new(MemoryStore::new()),
            Box::new(uploader),
            TrackerSettings::default(),
            Box::new(ManualClock::new(start())),
        )
    }

    async fn durations(
        tracker: &ActivityTracker<Arc<MemoryStore>>,
    ) -> Result<std::collections::BTreeMap<String, i64>> {
        Ok(tracker.store().load().await?.durations)
    }

    #[tokio::test]
    async fn test_same_host_is_idempotent() -> Result<()> {
        let mut tracker = tracker(idle_uploader());

        tracker.begin_tracking(1, "https://a.com/", at(0)).await;
        tracker.begin_tracking(1, "https://a.com/other", at(3_000)).await;
        tracker.begin_tracking(2, "http://a.com/again", at(4_000)).await;

        assert_eq!(tracker.session(), &ActiveSession::start(1, "a.com", at(0)));

        tracker.begin_tracking(3, "https://b.com/", at(6_000)).await;
        assert_eq!(durations(&tracker).await?["a.com"], 6_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_stays_idle_on_untrackable_urls() -> Result<()> {
        let mut tracker = tracker(idle_uploader());

        tracker.begin_tracking(1, "about:blank", at(0)).await;
        tracker.begin_tracking(1, "chrome://newtab", at(10_000)).await;

        assert_eq!(tracker.session(), &ActiveSession::Idle);
        assert!(durations(&tracker).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_short_sessions_are_discarded() -> Result<()> {
        let mut tracker = tracker(idle_uploader());

        tracker.begin_tracking(1, "https://short.com/", at(0)).await;
        tracker.begin_tracking(2, "https://long.com/", at(4_999)).await;
        tracker.begin_tracking(3, "https://exact.com/", at(4_999 + 5_001)).await;
        tracker.begin_tracking(4, "https://next.com/", at(4_999 + 5_001 + 5_000)).await;

        let durations = durations(&tracker).await?;
        assert_eq!(durations.get("short.com"), None);
        assert_eq!(durations.get("long.com"), Some(&5_001));
        // Exactly the threshold doesn't count either.
        assert_eq!(durations.get("exact.com"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_accumulation_is_additive() -> Result<()> {
        let mut tracker = tracker(idle_uploader());

        tracker.begin_tracking(1, "https://example.com/", at(0)).await;
        tracker.begin_tracking(2, "https://other.com/", at(6_000)).await;
        tracker.begin_tracking(1, "https://example.com/b", at(12_000)).await;
        tracker.begin_tracking(2, "https://other.com/", at(19_000)).await;

        let durations = durations(&tracker).await?;
        assert_eq!(durations["example.com"], 13_000);
        assert_eq!(durations["other.com"], 6_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_resets_window() -> Result<()> {
        let t0 = at(0);
        let t1 = at(300_000);
        let expected = vec![LogRecord {
            host: "a.com".into(),
            total_duration_ms: 10_000,
            period_start_time: t0,
            period_end_time: t1,
        }];

        let mut uploader = MockLogUploader::new();
        uploader
            .expect_upload()
            .withf(move |records| records == &expected)
            .times(1)
            .returning(|_| Ok(()));
        let tracker = tracker(uploader);
        tracker.store().ensure_period_start(t0).await?;
        tracker.store().add_duration("a.com", 10_000).await?;

        let outcome = tracker.flush(t1).await?;

        assert_eq!(outcome, FlushOutcome::Delivered { records: 1 });
        let stored = tracker.store().load().await?;
        assert!(stored.durations.is_empty());
        assert_eq!(stored.period_start, Some(t1));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_flush_preserves_state() -> Result<()> {
        let tracker = tracker(failing_uploader());
        tracker.store().ensure_period_start(at(0)).await?;
        tracker.store().add_duration("a.com", 10_000).await?;
        let before = tracker.store().load().await?;

        let outcome = tracker.flush(at(300_000)).await?;

        assert_eq!(outcome, FlushOutcome::Retained);
        assert_eq!(tracker.store().load().await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_flush_sends_nothing() -> Result<()> {
        let tracker = tracker(idle_uploader());
        tracker.store().ensure_period_start(at(0)).await?;

        assert_eq!(tracker.flush(at(300_000)).await?, FlushOutcome::Empty);
        assert_eq!(tracker.store().load().await?.period_start, Some(at(0)));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_period_start_falls_back_to_interval() -> Result<()> {
        let mut uploader = MockLogUploader::new();
        uploader
            .expect_upload()
            .withf(|records| records[0].period_start_time == at(0))
            .times(1)
            .returning(|_| Ok(()));
        let tracker = tracker(uploader);
        tracker.store().add_duration("a.com", 10_000).await?;

        tracker.flush(at(300_000)).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_timer_tick_keeps_session_running() -> Result<()> {
        let mut tracker = tracker(failing_uploader());
        let tick = at(180_000);

        tracker.begin_tracking(5, "https://x.com/", at(0)).await;
        tracker.on_timer_tick(tick).await?;

        assert_eq!(durations(&tracker).await?["x.com"], 180_000);
        assert_eq!(tracker.session(), &ActiveSession::start(5, "x.com", tick));

        // Time before the tick isn't counted again.
        tracker.begin_tracking(6, "https://y.com/", at(240_000)).await;
        assert_eq!(durations(&tracker).await?["x.com"], 240_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_timer_tick_uploads_open_session() -> Result<()> {
        let mut uploader = MockLogUploader::new();
        uploader
            .expect_upload()
            .withf(|records| {
                records.len() == 1
                    && records[0].host == "x.com"
                    && records[0].total_duration_ms == 180_000
                    && records[0].period_end_time == at(180_000)
            })
            .times(1)
            .returning(|_| Ok(()));
        let mut tracker = tracker(uploader);
        tracker.store().ensure_period_start(at(0)).await?;

        tracker.begin_tracking(5, "https://x.com/", at(0)).await;
        let outcome = tracker.on_timer_tick(at(180_000)).await?;

        assert_eq!(outcome, FlushOutcome::Delivered { records: 1 });
        assert!(durations(&tracker).await?.is_empty());
        assert_eq!(tracker.session().host(), Some("x.com"));
        Ok(())
    }

    #[tokio::test]
    async fn test_focus_loss_and_gain() -> Result<()> {
        let mut tracker = tracker(idle_uploader());

        tracker
            .handle_event(TrackerEvent::browser(
                BrowserMessage::TabActivated {
                    tab_id: 1,
                    url: Some("https://a.com/".into()),
                },
                at(0),
            ))
            .await?;
        tracker
            .handle_event(TrackerEvent::browser(
                BrowserMessage::WindowFocusChanged {
                    window_id: None,
                    active_tab: None,
                },
                at(8_000),
            ))
            .await?;

        assert_eq!(tracker.session(), &ActiveSession::Idle);
        assert_eq!(durations(&tracker).await?["a.com"], 8_000);

        tracker
            .handle_event(TrackerEvent::browser(
                BrowserMessage::WindowFocusChanged {
                    window_id: Some(2),
                    active_tab: Some(TabSnapshot {
                        tab_id: 1,
                        url: Some("https://a.com/".into()),
                    }),
                },
                at(60_000),
            ))
            .await?;

        assert_eq!(
            tracker.session(),
            &ActiveSession::start(1, "a.com", at(60_000))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_only_complete_active_updates_switch() -> Result<()> {
        let mut tracker = tracker(idle_uploader());
        tracker.begin_tracking(1, "https://a.com/", at(0)).await;

        let update = |status: &str, active: bool, ms: i64| {
            TrackerEvent::browser(
                BrowserMessage::TabUpdated {
                    tab_id: 1,
                    status: Some(status.into()),
                    url: Some("https://b.com/".into()),
                    active,
                },
                at(ms),
            )
        };

        tracker.handle_event(update("loading", true, 1_000)).await?;
        tracker.handle_event(update("complete", false, 2_000)).await?;
        assert_eq!(tracker.session().host(), Some("a.com"));

        tracker.handle_event(update("complete", true, 9_000)).await?;
        assert_eq!(tracker.session(), &ActiveSession::start(1, "b.com", at(9_000)));
        assert_eq!(durations(&tracker).await?["a.com"], 9_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_tick_event_goes_through_handler() -> Result<()> {
        let mut tracker = tracker(failing_uploader());
        tracker.begin_tracking(1, "https://a.com/", at(0)).await;

        tracker.handle_event(TrackerEvent::tick(at(60_000))).await?;

        assert_eq!(durations(&tracker).await?["a.com"], 60_000);
        assert_eq!(tracker.session(), &ActiveSession::start(1, "a.com", at(60_000)));
        Ok(())
    }

    #[tokio::test]
    async fn test_initialize_and_finalize() -> Result<()> {
        let clock = ManualClock::new(at(0));
        let mut tracker = ActivityTracker::new(
            Arc::new(MemoryStore::new()),
            Box::new(idle_uploader()),
            TrackerSettings::default(),
            Box::new(clock.clone()),
        );

        tracker.initialize().await?;
        assert_eq!(tracker.store().load().await?.period_start, Some(at(0)));

        tracker.begin_tracking(1, "https://a.com/", at(1_000)).await;
        clock.set(at(31_000));
        tracker.finalize().await?;

        assert_eq!(tracker.session(), &ActiveSession::Idle);
        assert_eq!(durations(&tracker).await?["a.com"], 30_000);
        Ok(())
    }

    /// Store that can be read but refuses every write.
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, _keys: &[&str]) -> Result<Map<String, Value>> {
            Ok(Map::new())
        }

        async fn set(&self, _entries: Map<String, Value>) -> Result<()> {
            Err(anyhow!("disk is full"))
        }

        async fn modify<T, F>(&self, _keys: &[&str], _change: F) -> Result<T>
        where
            F: FnOnce(&mut Map<String, Value>) -> T,
        {
            Err(anyhow!("disk is full"))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_still_switches_host() -> Result<()> {
        let mut tracker = ActivityTracker::new(
            ReadOnlyStore,
            Box::new(idle_uploader()),
            TrackerSettings::default(),
            Box::new(ManualClock::new(at(0))),
        );

        tracker.begin_tracking(1, "https://a.com/", at(0)).await;
        assert!(tracker.close_session(at(10_000)).await.is_err());

        tracker.begin_tracking(2, "https://b.com/", at(10_000)).await;
        assert_eq!(tracker.session(), &ActiveSession::start(2, "b.com", at(10_000)));
        Ok(())
    }

    /// Uploader that behaves like a host folding in a session while the batch is in flight.
    struct BusyStoreUploader {
        store: Arc<MemoryStore>,
    }

    #[async_trait]
    impl LogUploader for BusyStoreUploader {
        async fn upload(&self, _records: Vec<LogRecord>) -> Result<(), UploadError> {
            AccumulatorStore::new(self.store.clone())
                .add_duration("b.com", 42_000)
                .await
                .map_err(|e| UploadError::Status {
                    status: 500,
                    body: e.to_string(),
                })?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_flush_keeps_time_accumulated_during_upload() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let tracker = ActivityTracker::new(
            store.clone(),
            Box::new(BusyStoreUploader {
                store: store.clone(),
            }),
            TrackerSettings::default(),
            Box::new(ManualClock::new(at(0))),
        );
        tracker.store().ensure_period_start(at(0)).await?;
        tracker.store().add_duration("a.com", 10_000).await?;
        tracker.store().add_duration("b.com", 7_000).await?;

        let outcome = tracker.flush(at(300_000)).await?;

        assert_eq!(outcome, FlushOutcome::Delivered { records: 2 });
        let stored = tracker.store().load().await?;
        assert_eq!(stored.durations.get("a.com"), None);
        assert_eq!(stored.durations.get("b.com"), Some(&42_000));
        assert_eq!(stored.period_start, Some(at(300_000)));
        Ok(())
    }

    #[tokio::test]
    async fn test_full_batch_is_sent_early() -> Result<()> {
        let mut uploader = MockLogUploader::new();
        uploader
            .expect_upload()
            .withf(|records| records.len() == 3)
            .times(1)
            .returning(|_| Ok(()));
        let mut tracker = ActivityTracker::new(
            Arc::new(MemoryStore::new()),
            Box::new(uploader),
            TrackerSettings {
                max_batch_hosts: 3,
                ..TrackerSettings::default()
            },
            Box::new(ManualClock::new(at(0))),
        );
        tracker.store().ensure_period_start(at(0)).await?;

        tracker.begin_tracking(1, "https://a.com/", at(0)).await;
        tracker.begin_tracking(2, "https://b.com/", at(10_000)).await;
        tracker.begin_tracking(3, "https://c.com/", at(20_000)).await;
        assert_eq!(durations(&tracker).await?.len(), 2);

        tracker.begin_tracking(4, "https://d.com/", at(30_000)).await;

        let stored = tracker.store().load().await?;
        assert!(stored.durations.is_empty());
        assert_eq!(stored.period_start, Some(at(30_000)));
        assert_eq!(tracker.session(), &ActiveSession::start(4, "d.com", at(30_000)));
        Ok(())
    }

    #[tokio::test]
    async fn test_window_id_none_means_focus_lost() -> Result<()> {
        let mut tracker = tracker(idle_uploader());
        tracker.begin_tracking(1, "https://a.com/", at(0)).await;

        let message: BrowserMessage =
            serde_json::from_str(r#"{"type":"windowFocusChanged","windowId":-1}"#)?;
        tracker
            .handle_event(TrackerEvent::browser(message, at(7_000)))
            .await?;

        assert_eq!(tracker.session(), &ActiveSession::Idle);
        assert_eq!(durations(&tracker).await?["a.com"], 7_000);
        Ok(())
    }
}
