//! Diagnostic observers for container traceability.
//!
//! Observers receive structured events while producers are registered and
//! built and while brokers are started and stopped. They replace a global
//! debug switch: attach a [`TracingObserver`] to get `tracing` output, or a
//! [`MetricsObserver`] to count and time object construction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::address::Address;

/// Observer trait for container lifecycle events.
///
/// Observer calls are made synchronously on the task running `register`,
/// `start` or `stop`. Keep implementations lightweight.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{Address, Container, Context, DiObserver, Provider};
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Recorder(Mutex<Vec<String>>);
///
/// impl DiObserver for Recorder {
///     fn building(&self, address: &Address) {
///         self.0.lock().unwrap().push(address.to_string());
///     }
///     fn built(&self, _address: &Address, _elapsed: Duration) {}
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let recorder = Arc::new(Recorder::default());
/// let mut container = Container::new();
/// container.add_observer(recorder.clone());
/// container.register(Provider::func(|| 42u32)).unwrap();
/// container.start(&Context::new()).await.unwrap();
///
/// assert_eq!(recorder.0.lock().unwrap().len(), 1);
/// # }
/// ```
pub trait DiObserver: Send + Sync {
    /// Called once per producer accepted by `register`.
    fn registered(&self, address: &Address) {
        let _ = address;
    }

    /// Called before a producer function or component is executed.
    fn building(&self, address: &Address);

    /// Called after a producer finished and its outputs were stored.
    fn built(&self, address: &Address, elapsed: Duration);

    /// Called when a producer returned an error or could not be injected.
    fn failed(&self, address: &Address, error: &str) {
        let _ = (address, error);
    }

    /// Called after a broker's `on_start` hook succeeded.
    fn broker_started(&self, name: &str, elapsed: Duration) {
        let _ = (name, elapsed);
    }

    /// Called after a broker's `on_stop` hook returned, successfully or not.
    fn broker_stopped(&self, name: &str, elapsed: Duration) {
        let _ = (name, elapsed);
    }
}

#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn DiObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn DiObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn registered(&self, address: &Address) {
        for observer in &self.observers {
            observer.registered(address);
        }
    }

    #[inline]
    pub(crate) fn building(&self, address: &Address) {
        for observer in &self.observers {
            observer.building(address);
        }
    }

    #[inline]
    pub(crate) fn built(&self, address: &Address, elapsed: Duration) {
        for observer in &self.observers {
            observer.built(address, elapsed);
        }
    }

    #[inline]
    pub(crate) fn failed(&self, address: &Address, error: &str) {
        for observer in &self.observers {
            observer.failed(address, error);
        }
    }

    #[inline]
    pub(crate) fn broker_started(&self, name: &str, elapsed: Duration) {
        for observer in &self.observers {
            observer.broker_started(name, elapsed);
        }
    }

    #[inline]
    pub(crate) fn broker_stopped(&self, name: &str, elapsed: Duration) {
        for observer in &self.observers {
            observer.broker_stopped(name, elapsed);
        }
    }
}

/// Observer that forwards every event to `tracing`.
///
/// Installed automatically when [`ContainerConfig::verbose`](crate::ContainerConfig)
/// is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl DiObserver for TracingObserver {
    fn registered(&self, address: &Address) {
        tracing::debug!(%address, "producer registered");
    }

    fn building(&self, address: &Address) {
        tracing::debug!(%address, "building");
    }

    fn built(&self, address: &Address, elapsed: Duration) {
        tracing::debug!(%address, ?elapsed, "built");
    }

    fn failed(&self, address: &Address, error: &str) {
        tracing::warn!(%address, error, "producer failed");
    }

    fn broker_started(&self, name: &str, elapsed: Duration) {
        tracing::info!(broker = name, ?elapsed, "broker started");
    }

    fn broker_stopped(&self, name: &str, elapsed: Duration) {
        tracing::info!(broker = name, ?elapsed, "broker stopped");
    }
}

/// Counts and times object construction.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    built_count: AtomicU64,
    failed_count: AtomicU64,
    total_build_nanos: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn built_count(&self) -> u64 {
        self.built_count.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub fn total_build_time(&self) -> Duration {
        Duration::from_nanos(self.total_build_nanos.load(Ordering::Relaxed))
    }

    pub fn average_build_time(&self) -> Option<Duration> {
        let count = self.built_count();
        if count == 0 {
            return None;
        }
        Some(self.total_build_time() / count as u32)
    }
}

impl DiObserver for MetricsObserver {
    fn building(&self, _address: &Address) {}

    fn built(&self, _address: &Address, elapsed: Duration) {
        self.built_count.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_build_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn failed(&self, _address: &Address, _error: &str) {
        self.failed_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observers_fan_out() {
        let first = Arc::new(MetricsObserver::new());
        let second = Arc::new(MetricsObserver::new());
        let mut observers = Observers::default();
        observers.add(first.clone());
        observers.add(second.clone());

        let address = Address::of::<u8>();
        observers.building(&address);
        observers.built(&address, Duration::from_millis(4));
        observers.failed(&address, "boom");

        for m in [&first, &second] {
            assert_eq!(m.built_count(), 1);
            assert_eq!(m.failed_count(), 1);
            assert_eq!(m.average_build_time(), Some(Duration::from_millis(4)));
        }
    }

    #[test]
    fn test_metrics_average_empty() {
        assert_eq!(MetricsObserver::new().average_build_time(), None);
    }
}
