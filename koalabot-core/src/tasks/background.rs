// File: koalabot-core/src/tasks/background.rs

use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::Error;

/// Spawns a durable write that the caller does not wait on. Failures are
/// logged and swallowed. Outside a tokio runtime the write is dropped.
pub fn spawn_fire_and_forget<F>(label: String, fut: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = Result<(), Error>> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn(async move {
            if let Err(e) = fut.await {
                error!("Background write '{}' failed: {:?}", label, e);
            }
        })),
        Err(_) => {
            warn!("No tokio runtime; dropping background write '{}'", label);
            None
        }
    }
}
