// SPDX-License-Identifier: Apache-2.0

//! Named stop latch set by the manager's control handler.
//!
//! The control handler runs on a thread chosen by the service manager and has
//! no access to the control loop's state. It finds the latch by name through a
//! process-wide table and sets it; the control loop observes it through
//! [`crate::supervisor::wait_any`]. Once set, a latch stays set.

use std::collections::HashMap;
use std::io;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::error::{Result, StewardError};

type LatchTable = HashMap<String, StopSignal>;

static LATCHES: OnceLock<Mutex<LatchTable>> = OnceLock::new();

fn latches() -> MutexGuard<'static, LatchTable> {
    LATCHES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Latch name for a service.
pub fn stop_signal_name(service: &str) -> String {
    format!("{service}.stop")
}

/// Cloneable handle to a named latch.
#[derive(Clone)]
pub struct StopSignal {
    name: Arc<str>,
    latch: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    /// Creates and publishes the latch called `name`.
    ///
    /// The latch is removed from the table when the returned guard drops.
    /// Fails if a latch with the same name is still alive.
    pub fn create(name: &str) -> Result<StopGuard> {
        let mut table = latches();
        if table.contains_key(name) {
            return Err(StewardError::resource(
                format!("stop signal `{name}` already exists"),
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }

        let (latch, _) = watch::channel(false);
        let signal = StopSignal {
            name: Arc::from(name),
            latch: Arc::new(latch),
        };
        table.insert(name.to_string(), signal.clone());
        debug!(name, "created stop signal");
        Ok(StopGuard { signal })
    }

    /// Looks up a live latch by name.
    pub fn open(name: &str) -> Option<StopSignal> {
        latches().get(name).cloned()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self) {
        self.latch.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.latch.borrow()
    }

    /// Resolves once the latch is set; immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.latch.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|set| *set).await;
    }
}

/// Owner of a published latch; unpublishes it on drop.
pub struct StopGuard {
    signal: StopSignal,
}

impl Deref for StopGuard {
    type Target = StopSignal;

    fn deref(&self) -> &StopSignal {
        &self.signal
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        let mut table = latches();
        if table
            .get(self.signal.name())
            .is_some_and(|live| Arc::ptr_eq(&live.latch, &self.signal.latch))
        {
            table.remove(self.signal.name());
            debug!(name = self.signal.name(), "released stop signal");
        }
    }
}
