use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{daemon::tracking::event::TrackerEvent, utils::clock::Clock};

/// Asks the processing loop for a flush on a fixed schedule. Ticks travel through the same
/// channel as browser events, so a tick is only handled once the previous one is done.
pub struct TickerModule {
    next: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
    first_delay: Duration,
    period: Duration,
    time_provider: Box<dyn Clock>,
}

impl TickerModule {
    pub fn new(
        next: mpsc::Sender<TrackerEvent>,
        shutdown: CancellationToken,
        first_delay: Duration,
        period: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            shutdown,
            first_delay,
            period,
            time_provider,
        }
    }

    /// Executes the ticker loop.
    pub async fn run(self) -> Result<()> {
        let mut tick_point = self.time_provider.instant() + self.first_delay;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(tick_point) => ()
            }

            debug!("Requesting flush");
            self.next
                .send(TrackerEvent::tick(self.time_provider.time()))
                .await
                .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;

            tick_point += self.period;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use tokio::{sync::mpsc, time::Instant};
    use tokio_util::sync::CancellationToken;

    use super::TickerModule;
    use crate::{
        daemon::tracking::event::{EventKind, TrackerEvent},
        utils::clock::DefaultClock,
    };

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_schedule() -> Result<()> {
        let (sender, mut receiver) = mpsc::channel::<TrackerEvent>(10);
        let shutdown = CancellationToken::new();
        let ticker = TickerModule::new(
            sender,
            shutdown.clone(),
            Duration::from_secs(60),
            Duration::from_secs(300),
            Box::new(DefaultClock),
        );
        let started = Instant::now();
        let ticker = tokio::spawn(ticker.run());

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Tick);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(started.elapsed() < Duration::from_secs(61));

        receiver.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(360));
        assert!(started.elapsed() < Duration::from_secs(361));

        shutdown.cancel();
        ticker.await??;
        assert!(receiver.recv().await.is_none());
        Ok(())
    }
}
