use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info_span, Instrument};

use super::tracking::event::TrackerEvent;

pub mod module;

/// Represents the single consumer of tracker events. Because everything that mutates tracking
/// state goes through this loop, events never interleave and a flush can't overlap another one.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<TrackerEvent>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<TrackerEvent>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    /// Processes events until every sender is gone, then finalizes the processor. Failures of a
    /// single event are logged and don't stop the loop.
    pub async fn run(mut self) -> Result<()> {
        if let Err(e) = self.processor.initialize().await {
            error!("Failed to initialize processor: {e:?}");
        }

        while let Some(event) = self.receiver.recv().await {
            debug!("Processing event {:?}", event);
            let span = info_span!("Processing event", at = %event.timestamp);
            if let Err(e) = self
                .processor
                .process_next(event.clone())
                .instrument(span)
                .await
            {
                error!("Error processing event {:?}: {e:?}", event)
            }
        }

        self.receiver.close();
        self.processor.finalize().await
    }
}
