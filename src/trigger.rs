//! Update trigger.
//!
//! The trigger owns the clock that tells every registered update queue it is time to flush. In
//! periodic mode a ticker thread offers one tick per interval to each subscriber's delivery lane;
//! a lane still busy with the previous flush simply misses the tick. In manual mode nothing runs
//! in the background and [`UpdateTrigger::pump`] delivers a tick on the caller's thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};

/// Shortest accepted tick interval.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(1);

/// Updates per second used by [`TriggerConfig::default`].
pub const DEFAULT_UPDATE_RATE: f64 = 30.;

/// Clock driving the trigger.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum TimingSource {
    /// Wall-clock ticks at a fixed interval.
    Periodic(Duration),
    /// Ticks are only delivered through [`UpdateTrigger::pump`].
    Manual,
}

/// Validated trigger configuration.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct TriggerConfig {
    source: TimingSource,
}

impl TriggerConfig {
    /// Tick every `interval`.
    pub fn periodic(interval: Duration) -> Result<Self> {
        if interval < MIN_UPDATE_INTERVAL {
            return Err(Error::InvalidConfig(format!(
                "update interval {:?} is below the minimum of {:?}",
                interval, MIN_UPDATE_INTERVAL
            )));
        }

        Ok(Self { source: TimingSource::Periodic(interval) })
    }

    /// Tick `rate` times per second.
    pub fn update_rate(rate: f64) -> Result<Self> {
        if !rate.is_finite() || rate <= 0. {
            return Err(Error::InvalidConfig(format!("update rate must be positive, got {}", rate)));
        }

        let interval = Duration::try_from_secs_f64(1. / rate).map_err(|_| {
            Error::InvalidConfig(format!("update rate {} is too low to express as an interval", rate))
        })?;

        Self::periodic(interval)
    }

    /// Only tick when pumped.
    pub fn manual() -> Self {
        Self { source: TimingSource::Manual }
    }

    pub fn source(&self) -> TimingSource {
        self.source
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        let interval = Duration::from_secs_f64(1. / DEFAULT_UPDATE_RATE);
        Self { source: TimingSource::Periodic(interval) }
    }
}

/// Receiver of trigger ticks.
pub trait UpdateSubscriber: Send + Sync {
    /// Name used when reporting failures.
    fn name(&self) -> &str;

    /// Flush hook invoked on every tick.
    fn on_update(&self) -> Result<()>;
}

/// Handle identifying a registration.
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct SubscriberId(u64);

/// A flush failure caught by the trigger.
#[derive(Debug)]
pub struct FlushFailure {
    pub subscriber: String,
    pub error: Error,
}

/// Observer for failures that are otherwise only logged.
///
/// Hooks run on the thread delivering the tick and must not panic.
pub type ErrorHook = Arc<dyn Fn(&FlushFailure) + Send + Sync>;

/// Clock notifying all registered subscribers.
///
/// Cloning yields another handle to the same trigger.
#[derive(Clone)]
pub struct UpdateTrigger {
    shared: Arc<Shared>,
}

impl UpdateTrigger {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                source: config.source,
                dispatcher: Default::default(),
                state: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Begin ticking. Does nothing if already running.
    pub fn start(&self) {
        let mut state = self.shared.state.lock();
        if state.is_some() {
            return;
        }

        *state = Some(match self.shared.source {
            TimingSource::Manual => Running::Manual,
            TimingSource::Periodic(interval) => {
                let dispatcher = &self.shared.dispatcher;
                for subscription in dispatcher.subscriptions.lock().iter_mut() {
                    let subscriber = subscription.subscriber.clone();
                    subscription.lane = Some(Lane::spawn(dispatcher.clone(), subscriber));
                }

                let (stop, stop_rx) = bounded(1);
                let dispatcher = dispatcher.clone();
                let handle = thread::spawn(move || tick_loop(&dispatcher, interval, &stop_rx));

                Running::Periodic(Ticker { stop, handle })
            },
        });

        debug!("Update trigger started ({:?})", self.shared.source);
    }

    /// Stop ticking, waiting for in-flight flushes. Does nothing if already stopped.
    pub fn stop(&self) {
        self.shared.halt();
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().is_some()
    }

    pub fn source(&self) -> TimingSource {
        self.shared.source
    }

    /// Add a subscriber; it receives ticks from the next one onwards.
    pub fn register(&self, subscriber: Arc<dyn UpdateSubscriber>) -> SubscriberId {
        let state = self.shared.state.lock();
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));

        let dispatcher = &self.shared.dispatcher;
        let lane = match *state {
            Some(Running::Periodic(_)) => Some(Lane::spawn(dispatcher.clone(), subscriber.clone())),
            _ => None,
        };

        dispatcher.subscriptions.lock().push(Subscription { id, subscriber, lane });

        id
    }

    /// Remove a subscriber, waiting for its in-flight flush.
    ///
    /// Returns `false` if the subscriber was not registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let _state = self.shared.state.lock();

        let removed = {
            let mut subscriptions = self.shared.dispatcher.subscriptions.lock();
            let index = subscriptions.iter().position(|subscription| subscription.id == id);
            index.map(|index| subscriptions.remove(index))
        };

        match removed {
            Some(subscription) => {
                if let Some(lane) = subscription.lane {
                    lane.close();
                }
                true
            },
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.dispatcher.subscriptions.lock().len()
    }

    /// Deliver one tick to every subscriber on the calling thread.
    ///
    /// Returns the number of subscribers notified, which is zero while the trigger is stopped.
    pub fn pump(&self) -> usize {
        if !self.is_running() {
            return 0;
        }

        let dispatcher = &self.shared.dispatcher;
        let subscribers: Vec<_> = dispatcher
            .subscriptions
            .lock()
            .iter()
            .map(|subscription| subscription.subscriber.clone())
            .collect();

        for subscriber in &subscribers {
            dispatcher.deliver(subscriber.as_ref());
        }

        subscribers.len()
    }

    /// Install an observer for flush failures, replacing the previous one.
    pub fn set_error_hook(&self, hook: Option<ErrorHook>) {
        *self.shared.dispatcher.error_hook.write() = hook;
    }
}

impl Default for UpdateTrigger {
    fn default() -> Self {
        Self::new(TriggerConfig::default())
    }
}

struct Shared {
    source: TimingSource,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<Option<Running>>,
    next_id: AtomicU64,
}

impl Shared {
    fn halt(&self) {
        let mut state = self.state.lock();
        let ticker = match state.take() {
            Some(Running::Periodic(ticker)) => ticker,
            Some(Running::Manual) => {
                debug!("Update trigger stopped");
                return;
            },
            None => return,
        };

        let _ = ticker.stop.send(());
        let _ = ticker.handle.join();

        let lanes: Vec<_> = self
            .dispatcher
            .subscriptions
            .lock()
            .iter_mut()
            .filter_map(|subscription| subscription.lane.take())
            .collect();
        for lane in lanes {
            lane.close();
        }

        debug!("Update trigger stopped");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.halt();
    }
}

enum Running {
    Manual,
    Periodic(Ticker),
}

struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

struct Subscription {
    id: SubscriberId,
    subscriber: Arc<dyn UpdateSubscriber>,
    lane: Option<Lane>,
}

/// Worker thread delivering ticks to a single subscriber.
struct Lane {
    sender: Sender<()>,
    handle: JoinHandle<()>,
}

impl Lane {
    fn spawn(dispatcher: Arc<Dispatcher>, subscriber: Arc<dyn UpdateSubscriber>) -> Self {
        // Rendezvous channel: a send only succeeds while the lane is idle.
        let (sender, receiver) = bounded::<()>(0);
        let handle = thread::spawn(move || {
            for () in receiver.iter() {
                dispatcher.deliver(subscriber.as_ref());
            }
        });

        Self { sender, handle }
    }

    fn close(self) {
        drop(self.sender);

        if self.handle.thread().id() != thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

#[derive(Default)]
struct Dispatcher {
    subscriptions: Mutex<Vec<Subscription>>,
    error_hook: RwLock<Option<ErrorHook>>,
}

impl Dispatcher {
    fn offer_tick(&self) {
        for subscription in self.subscriptions.lock().iter() {
            let lane = match &subscription.lane {
                Some(lane) => lane,
                None => continue,
            };

            if let Err(TrySendError::Full(())) = lane.sender.try_send(()) {
                trace!("Skipping tick for busy {}", subscription.subscriber.name());
            }
        }
    }

    fn deliver(&self, subscriber: &dyn UpdateSubscriber) {
        let error = match panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_update())) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => Error::Flush {
                device: subscriber.name().into(),
                reason: format!("update panicked: {}", panic_message(payload.as_ref())),
            },
        };

        debug!("Update of {} failed: {}", subscriber.name(), error);

        let hook = self.error_hook.read().clone();
        if let Some(hook) = hook {
            hook(&FlushFailure { subscriber: subscriber.name().into(), error });
        }
    }
}

fn tick_loop(dispatcher: &Dispatcher, interval: Duration, stop: &Receiver<()>) {
    let mut deadline = Instant::now();

    loop {
        dispatcher.offer_tick();

        // Drop missed ticks instead of bursting to catch up.
        let now = Instant::now();
        deadline = match deadline.checked_add(interval) {
            Some(next) => next.max(now),
            None => {
                debug!("Update interval {:?} exceeds the clock range, no further ticks", interval);
                let _ = stop.recv();
                break;
            },
        };

        match stop.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => (),
            _ => break,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
