//! Per-device update queue.
//!
//! Color writes are merged into a pending map between ticks. A tick swaps the map out under a
//! short lock and hands the snapshot to the device's [`LedWriter`], serialized by a second lock
//! that only flushes and disposal contend on.

use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{trace, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::color::Color;
use crate::error::{Error, Result};
use crate::led::LedKey;
use crate::trigger::{SubscriberId, UpdateSubscriber, UpdateTrigger};

/// Vendor-specific write strategy for one device.
pub trait LedWriter: Send {
    /// Push a merged set of colors to the hardware.
    ///
    /// The snapshot is only borrowed for the duration of the call.
    fn write(&mut self, snapshot: &[(LedKey, Color)]) -> Result<()>;

    /// Release the native handle. Called exactly once, during disposal.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Lock shared by all writers of a vendor session that can only address one device at a time.
#[derive(Clone, Default)]
pub struct SessionLock(Arc<Mutex<()>>);

impl SessionLock {
    /// Block until the session is exclusively held.
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock()
    }
}

/// Coalescing update buffer for a single device.
pub struct UpdateQueue {
    core: Arc<QueueCore>,
    trigger: UpdateTrigger,
    subscription: Option<SubscriberId>,
}

impl UpdateQueue {
    /// Create a queue flushing into `writer` whenever `trigger` ticks.
    pub fn new(name: impl Into<String>, writer: Box<dyn LedWriter>, trigger: &UpdateTrigger) -> Self {
        let core = Arc::new(QueueCore {
            name: name.into(),
            accepting: AtomicBool::new(true),
            pending: Default::default(),
            flush: Mutex::new(FlushState {
                writer: Some(writer),
                snapshot: Default::default(),
                buffer: Default::default(),
            }),
        });

        let subscription = Some(trigger.register(core.clone()));

        Self { core, trigger: trigger.clone(), subscription }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Merge colors into the pending set, replacing earlier colors for the same LED.
    pub fn set_data<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (LedKey, Color)>,
    {
        if !self.core.accepting.load(Ordering::Acquire) {
            return Err(Error::Disposed(self.core.name.clone()));
        }

        self.core.pending.lock().extend(entries);

        Ok(())
    }

    /// Write the pending colors now, waiting for an in-flight flush instead of skipping.
    pub fn flush(&self) -> Result<()> {
        self.core.flush(true)
    }

    /// Number of LEDs waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.core.pending.lock().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.subscription.is_none()
    }

    /// Detach from the trigger and release the writer.
    ///
    /// Waits for an in-flight flush; no flush happens afterwards. Calling this again is a no-op.
    pub fn dispose(&mut self) -> Result<()> {
        let id = match self.subscription.take() {
            Some(id) => id,
            None => return Ok(()),
        };

        self.core.accepting.store(false, Ordering::Release);
        self.trigger.unregister(id);

        let writer = self.core.flush.lock().writer.take();
        self.core.pending.lock().clear();

        match writer {
            Some(mut writer) => writer.release(),
            None => Ok(()),
        }
    }
}

impl Drop for UpdateQueue {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("Unable to release {}: {}", self.core.name, err);
        }
    }
}

struct QueueCore {
    name: String,
    accepting: AtomicBool,
    pending: Mutex<HashMap<LedKey, Color>>,
    flush: Mutex<FlushState>,
}

/// Writer plus buffers reused across flushes.
struct FlushState {
    writer: Option<Box<dyn LedWriter>>,
    snapshot: HashMap<LedKey, Color>,
    buffer: Vec<(LedKey, Color)>,
}

impl QueueCore {
    fn flush(&self, blocking: bool) -> Result<()> {
        let mut state = if blocking {
            self.flush.lock()
        } else {
            match self.flush.try_lock() {
                Some(state) => state,
                None => {
                    trace!("Flush of {} still running, skipping tick", self.name);
                    return Ok(());
                },
            }
        };
        let FlushState { writer, snapshot, buffer } = &mut *state;

        let writer = match writer {
            Some(writer) => writer,
            None => return Ok(()),
        };

        {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return Ok(());
            }
            mem::swap(&mut *pending, snapshot);
        }

        buffer.extend(snapshot.drain());
        let result = panic::catch_unwind(AssertUnwindSafe(|| writer.write(buffer)));
        buffer.clear();

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err @ Error::Flush { .. })) => Err(err),
            Ok(Err(err)) => Err(Error::Flush { device: self.name.clone(), reason: err.to_string() }),
            Err(_) => Err(Error::Flush { device: self.name.clone(), reason: "writer panicked".into() }),
        }
    }
}

impl UpdateSubscriber for QueueCore {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_update(&self) -> Result<()> {
        self.flush(false)
    }
}
