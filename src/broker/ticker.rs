//! Periodic callbacks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::Broker;
use crate::config::ContainerConfig;
use crate::context::Context;
use crate::error::{BoxError, DiError};
use crate::storage::Object;

/// Callback run on every tick. Errors are logged, never fatal.
pub type TickFn = Arc<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

/// A named periodic callback.
#[derive(Clone)]
pub struct Tick {
    pub name: String,
    pub interval: Duration,
    /// Run once immediately instead of waiting for the first interval.
    pub on_start: bool,
    pub callback: TickFn,
}

impl Tick {
    pub fn new<F>(name: impl Into<String>, interval: Duration, callback: F) -> Self
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            interval,
            on_start: false,
            callback: Arc::new(callback),
        }
    }

    pub fn run_on_start(mut self) -> Self {
        self.on_start = true;
        self
    }
}

impl fmt::Debug for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tick")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("on_start", &self.on_start)
            .finish()
    }
}

/// An object declaring periodic callbacks.
///
/// ```rust
/// use ferrous_boot::{Tick, Ticker};
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Heartbeat { beats: AtomicU64 }
///
/// impl Ticker for Heartbeat {
///     fn ticks(self: Arc<Self>) -> Vec<Tick> {
///         vec![Tick::new("beat", Duration::from_secs(1), move || {
///             self.beats.fetch_add(1, Ordering::Relaxed);
///             Ok(())
///         })]
///     }
/// }
/// ```
pub trait Ticker: Send + Sync {
    fn ticks(self: Arc<Self>) -> Vec<Tick>;
}

/// Runs the ticks of every [`Ticker`] in one background scheduling loop.
///
/// The loop lives until the start context is cancelled or the broker is
/// stopped. Intervals below the configured minimum are raised to it; a zero
/// interval fails `on_start` with [`DiError::InvalidTick`].
pub struct TickerBroker {
    name: String,
    priority: i32,
    min_interval: Duration,
    ticks: Vec<Tick>,
    stop: Option<Context>,
    task: Option<JoinHandle<()>>,
}

impl TickerBroker {
    pub fn new() -> Self {
        Self::from_config(&ContainerConfig::default())
    }

    pub fn from_config(config: &ContainerConfig) -> Self {
        Self {
            name: "ticker".to_string(),
            priority: config.ticker_priority,
            min_interval: config.ticker.min_interval,
            ticks: Vec::new(),
            stop: None,
            task: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Ticks collected so far.
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn validate(&mut self) -> Result<(), DiError> {
        for tick in &mut self.ticks {
            if tick.interval.is_zero() {
                return Err(DiError::InvalidTick {
                    name: tick.name.clone(),
                    reason: "interval must be greater than zero".to_string(),
                });
            }
            if tick.interval < self.min_interval {
                debug!(tick = %tick.name, interval = ?tick.interval, min = ?self.min_interval, "raising tick interval");
                tick.interval = self.min_interval;
            }
        }
        Ok(())
    }
}

impl Default for TickerBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for TickerBroker {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn apply(&mut self, object: &Object) {
        if let Some(ticker) = object.cast::<dyn Ticker>() {
            self.ticks.extend(ticker.ticks());
        }
    }

    async fn on_start(&mut self, ctx: &Context) -> Result<(), BoxError> {
        self.validate()?;
        if self.ticks.is_empty() {
            return Ok(());
        }
        let stop = ctx.child();
        self.task = Some(tokio::spawn(schedule(self.ticks.clone(), stop.clone())));
        self.stop = Some(stop);
        Ok(())
    }

    async fn on_stop(&mut self) -> Result<(), BoxError> {
        if let Some(stop) = self.stop.take() {
            stop.cancel();
        }
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

/// Single scheduling loop over all ticks.
async fn schedule(ticks: Vec<Tick>, stop: Context) {
    let now = Instant::now();
    let mut due: Vec<Instant> = ticks
        .iter()
        .map(|t| if t.on_start { now } else { now + t.interval })
        .collect();

    loop {
        let Some(next) = due.iter().min().copied() else {
            return;
        };
        tokio::select! {
            _ = stop.cancelled() => {
                debug!("ticker loop stopped");
                return;
            }
            _ = sleep_until(next) => {}
        }

        let now = Instant::now();
        for (tick, at) in ticks.iter().zip(due.iter_mut()) {
            if *at > now {
                continue;
            }
            if let Err(error) = (tick.callback)() {
                warn!(tick = %tick.name, %error, "tick failed");
            }
            while *at <= now {
                *at += tick.interval;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Cast;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        hits: AtomicU32,
        interval: Duration,
        fail: bool,
    }

    impl Ticker for Counter {
        fn ticks(self: Arc<Self>) -> Vec<Tick> {
            let interval = self.interval;
            let tick = Tick::new("count", interval, move || {
                self.hits.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err("tick error".into());
                }
                Ok(())
            });
            vec![tick.run_on_start()]
        }
    }

    fn counter(interval: Duration, fail: bool) -> (Arc<Counter>, Object) {
        let counter = Arc::new(Counter { hits: AtomicU32::new(0), interval, fail });
        let mut object = Object::with_value(
            crate::Address::of::<Counter>(),
            crate::TypeInfo::of::<Counter>(),
            counter.clone(),
        );
        object.bind(Cast::new::<Counter, dyn Ticker>(|c| c));
        (counter, object)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_stopped() {
        let (counter, object) = counter(Duration::from_millis(100), false);
        let mut broker = TickerBroker::new();
        broker.apply(&object);
        assert_eq!(broker.ticks().len(), 1);

        broker.on_start(&Context::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        broker.on_stop().await.unwrap();

        let hits = counter.hits.load(Ordering::SeqCst);
        assert_eq!(hits, 4, "immediate run plus three intervals");
        assert!(!broker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_stop_the_loop() {
        let (counter, object) = counter(Duration::from_millis(10), true);
        let mut broker = TickerBroker::new();
        broker.apply(&object);

        let ctx = Context::new();
        broker.on_start(&ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        ctx.cancel();
        broker.on_stop().await.unwrap();

        assert!(counter.hits.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (_counter, object) = counter(Duration::ZERO, false);
        let mut broker = TickerBroker::new();
        broker.apply(&object);

        let err = broker.on_start(&Context::new()).await.unwrap_err();
        let err = err.downcast::<DiError>().unwrap();
        assert!(matches!(*err, DiError::InvalidTick { .. }));
    }
}
