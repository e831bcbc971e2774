use std::path::Path;

use anyhow::{Result, bail};
use chrono::Utc;

use crate::{
    daemon::{
        config::{ConfigOverrides, HostConfig},
        storage::json_file::JsonFileStore,
        tracking::tracker::{ActivityTracker, FlushOutcome},
        upload::http::HttpUploader,
    },
    utils::clock::DefaultClock,
};

/// Uploads whatever the host accumulated so far without waiting for the next scheduled flush.
/// The store is locked per operation, so this is safe while a host is running.
pub async fn process_flush_command(app_dir: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = HostConfig::resolve(app_dir.to_owned(), overrides)?;
    let store = JsonFileStore::new(config.store_path())?;
    let uploader = HttpUploader::new(config.backend_url.clone(), config.request_timeout)?;
    let tracker = ActivityTracker::new(
        store,
        Box::new(uploader),
        config.tracker_settings(),
        Box::new(DefaultClock),
    );

    match tracker.flush(Utc::now()).await? {
        FlushOutcome::Empty => println!("Nothing to upload"),
        FlushOutcome::Delivered { records } => {
            println!("Uploaded {records} records to {}", config.backend_url)
        }
        FlushOutcome::Retained => bail!(
            "{} didn't accept the records, they are kept for the next flush",
            config.backend_url
        ),
    }
    Ok(())
}
