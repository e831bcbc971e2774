use anyhow::Result;

/// The host only ever has one browser connection, so a single thread is plenty.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
