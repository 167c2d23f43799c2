use anyhow::Result;

/// Timers, the input poller and the front end each get their own task, so the overlay runs
/// on the multi-threaded scheduler.
pub fn multi_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
