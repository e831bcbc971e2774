use std::time::Duration;

use anyhow::Result;
use intake::native::NativeIntake;
use processing::ProcessingModule;
use storage::{json_file::JsonFileStore, kv::KeyValueStore};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracking::{
    event::TrackerEvent,
    tracker::ActivityTracker,
};
use upload::{http::HttpUploader, LogUploader};
use url::Url;

use crate::utils::clock::{Clock, DefaultClock};

pub mod args;
pub mod config;
pub mod intake;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod ticker;
pub mod tracking;
pub mod upload;

use config::HostConfig;
use ticker::TickerModule;

const EVENT_BUFFER: usize = 64;

/// Represents the starting point for the native messaging host. Runs until the browser closes
/// the pipe or the process is interrupted.
pub async fn start_daemon(config: HostConfig) -> Result<()> {
    info!(
        "Starting host, uploading to {} every {:?}",
        config.backend_url, config.flush_interval
    );
    let (sender, receiver) = mpsc::channel::<TrackerEvent>(EVENT_BUFFER);
    let shutdown_token = CancellationToken::new();

    let intake = create_intake(
        tokio::io::stdin(),
        tokio::io::stdout(),
        sender.clone(),
        &shutdown_token,
        DefaultClock,
        config.backend_url.clone(),
    );
    let ticker = create_ticker(
        sender,
        &shutdown_token,
        config.first_flush_delay,
        config.flush_interval,
        DefaultClock,
    );

    let store = JsonFileStore::new(config.store_path())?;
    let uploader = HttpUploader::new(config.backend_url.clone(), config.request_timeout)?;
    let processor = create_processor(
        receiver,
        store,
        Box::new(uploader),
        &config,
        DefaultClock,
    );

    let (_, intake_result, ticker_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        intake.run(),
        ticker.run(),
        processor.run(),
    );

    if let Err(intake_result) = intake_result {
        error!("Intake module got an error {:?}", intake_result);
    }

    if let Err(ticker_result) = ticker_result {
        error!("Ticker module got an error {:?}", ticker_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    info!("Host stopped");
    Ok(())
}

fn create_intake<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: R,
    output: W,
    sender: mpsc::Sender<TrackerEvent>,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
    backend_url: Url,
) -> NativeIntake<R, W> {
    NativeIntake::new(
        input,
        output,
        sender,
        shutdown_token.clone(),
        Box::new(clock),
        backend_url,
    )
}

fn create_ticker(
    sender: mpsc::Sender<TrackerEvent>,
    shutdown_token: &CancellationToken,
    first_delay: Duration,
    period: Duration,
    clock: impl Clock,
) -> TickerModule {
    TickerModule::new(
        sender,
        shutdown_token.clone(),
        first_delay,
        period,
        Box::new(clock),
    )
}

fn create_processor<S: KeyValueStore>(
    receiver: mpsc::Receiver<TrackerEvent>,
    store: S,
    uploader: Box<dyn LogUploader>,
    config: &HostConfig,
    clock: impl Clock,
) -> ProcessingModule<ActivityTracker<S>> {
    let settings = config.tracker_settings();
    let tracker = ActivityTracker::new(store, uploader, settings, Box::new(clock));
    ProcessingModule::new(receiver, tracker)
}
