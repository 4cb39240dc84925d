//! Process-wide engine state
//!
//! The delivery engine is started at most once per process. `startup` is
//! called lazily by every sink before it listens; `cleanup` pairs with the
//! one successful startup and is normally left to process exit.

use parking_lot::{const_mutex, Mutex};

use crate::error::TransportError;

static STARTED: Mutex<bool> = const_mutex(false);

/// Start the engine, running `init` only if it is not running yet
pub fn startup_with<F>(init: F) -> Result<(), TransportError>
where
    F: FnOnce() -> Result<(), TransportError>,
{
    let mut started = STARTED.lock();
    if *started {
        return Ok(());
    }
    match init() {
        Ok(()) => {
            *started = true;
            tracing::debug!("Transport engine started");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Transport engine startup failed: {}", e);
            Err(e)
        }
    }
}

/// Start the engine with no extra initialization
pub fn startup() -> Result<(), TransportError> {
    startup_with(|| Ok(()))
}

pub fn is_started() -> bool {
    *STARTED.lock()
}

/// Stop the engine; no-op if it was never started
pub fn cleanup() {
    let mut started = STARTED.lock();
    if *started {
        *started = false;
        tracing::debug!("Transport engine stopped");
    }
}
