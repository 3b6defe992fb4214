use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{combine, with_rollback, Broker};
use crate::context::Context;
use crate::error::{BoxError, BrokerFailure};
use crate::storage::Object;

type Hook<T> = Box<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>;

/// Service-broker semantics for any trait `T`.
///
/// Collects every object bound to `T` and drives it through the given `up`
/// and `down` hooks: started in build order, unwound in reverse on a failed
/// start, stopped in reverse.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{BoxError, Container, Context, Provider, UniversalBroker};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// trait Plugin: Send + Sync {
///     fn load(&self) -> Result<(), BoxError>;
///     fn unload(&self) -> Result<(), BoxError>;
/// }
///
/// #[derive(Default)]
/// struct Metrics { loaded: AtomicBool }
///
/// impl Plugin for Metrics {
///     fn load(&self) -> Result<(), BoxError> {
///         self.loaded.store(true, Ordering::SeqCst);
///         Ok(())
///     }
///     fn unload(&self) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut container = Container::new();
/// container
///     .register(Provider::func(Metrics::default).implements::<dyn Plugin>(|m| m))
///     .unwrap();
/// container
///     .broker_register(UniversalBroker::<dyn Plugin>::new("plugins", |p| p.load(), |p| p.unload()))
///     .unwrap();
/// container.start(&Context::new()).await.unwrap();
/// assert!(container.get::<Metrics>().unwrap().loaded.load(Ordering::SeqCst));
/// # }
/// ```
pub struct UniversalBroker<T: ?Sized> {
    name: String,
    priority: i32,
    up: Hook<T>,
    down: Hook<T>,
    targets: Vec<(String, Arc<T>)>,
    started: usize,
}

impl<T: ?Sized + Send + Sync + 'static> UniversalBroker<T> {
    pub fn new<U, D>(name: impl Into<String>, up: U, down: D) -> Self
    where
        U: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
        D: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority: 0,
            up: Box::new(up),
            down: Box::new(down),
            targets: Vec::new(),
            started: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn started(&self) -> usize {
        self.started
    }

    fn unwind(&mut self) -> Vec<BrokerFailure> {
        let mut failures = Vec::new();
        while self.started > 0 {
            self.started -= 1;
            let (name, target) = &self.targets[self.started];
            debug!(broker = %self.name, target = %name, "down");
            if let Err(source) = (self.down)(target) {
                warn!(broker = %self.name, target = %name, error = %source, "down failed");
                failures.push(BrokerFailure { name: name.clone(), source });
            }
        }
        failures
    }
}

#[async_trait]
impl<T: ?Sized + Send + Sync + 'static> Broker for UniversalBroker<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn apply(&mut self, object: &Object) {
        if let Some(target) = object.cast::<T>() {
            self.targets.push((object.address().to_string(), target));
        }
    }

    async fn on_start(&mut self, _ctx: &Context) -> Result<(), BoxError> {
        self.started = 0;
        while self.started < self.targets.len() {
            let (name, target) = &self.targets[self.started];
            debug!(broker = %self.name, target = %name, "up");
            if let Err(err) = (self.up)(target) {
                warn!(broker = %self.name, target = %name, error = %err, "up failed, unwinding");
                let failures = self.unwind();
                return Err(with_rollback(err, failures));
            }
            self.started += 1;
        }
        Ok(())
    }

    async fn on_stop(&mut self) -> Result<(), BoxError> {
        combine(self.unwind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiError;
    use crate::storage::Cast;
    use parking_lot::Mutex;

    trait Job: Send + Sync {
        fn id(&self) -> u8;
    }

    struct Numbered(u8);
    impl Job for Numbered {
        fn id(&self) -> u8 {
            self.0
        }
    }

    fn job(n: u8) -> Object {
        let mut object = Object::with_value(
            crate::Address::from_type_name(&format!("job{}", n)),
            crate::TypeInfo::of::<Numbered>(),
            Arc::new(Numbered(n)),
        );
        object.bind(Cast::new::<Numbered, dyn Job>(|j| j));
        object
    }

    #[tokio::test]
    async fn test_stop_accumulates_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let up_log = log.clone();
        let down_log = log.clone();
        let mut broker = UniversalBroker::<dyn Job>::new(
            "jobs",
            move |j| {
                up_log.lock().push(format!("up {}", j.id()));
                Ok(())
            },
            move |j| {
                down_log.lock().push(format!("down {}", j.id()));
                if j.id() % 2 == 1 {
                    return Err(format!("job {} stuck", j.id()).into());
                }
                Ok(())
            },
        );
        for n in 1..=3 {
            broker.apply(&job(n));
        }
        broker.apply(&Object::new(0u8));
        assert_eq!(broker.len(), 3);

        broker.on_start(&Context::new()).await.unwrap();
        let err = broker.on_stop().await.unwrap_err();

        assert_eq!(*log.lock(), vec!["up 1", "up 2", "up 3", "down 3", "down 2", "down 1"]);
        let msg = err.to_string();
        assert!(msg.contains("job 3 stuck"), "{}", msg);
        assert!(msg.contains("job 1 stuck"), "{}", msg);
        assert_eq!(broker.started(), 0);
    }

    #[tokio::test]
    async fn test_failed_up_unwinds() {
        let mut broker = UniversalBroker::<dyn Job>::new(
            "jobs",
            |j| if j.id() == 2 { Err("nope".into()) } else { Ok(()) },
            |_| Ok(()),
        );
        broker.apply(&job(1));
        broker.apply(&job(2));
        let err = broker.on_start(&Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert_eq!(broker.started(), 0);
    }

    #[tokio::test]
    async fn test_failed_up_reports_failed_down() {
        let mut broker = UniversalBroker::<dyn Job>::new(
            "jobs",
            |j| if j.id() == 3 { Err("nope".into()) } else { Ok(()) },
            |j| if j.id() == 1 { Err(format!("job {} stuck", j.id()).into()) } else { Ok(()) },
        );
        for n in 1..=3 {
            broker.apply(&job(n));
        }

        let err = broker.on_start(&Context::new()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("nope; rollback failed: "), "{}", msg);
        assert!(msg.ends_with("job 1 stuck"), "{}", msg);
        match err.downcast_ref::<DiError>() {
            Some(DiError::Rollback { failures, .. }) => assert_eq!(failures.len(), 1),
            other => panic!("expected Rollback, got {:?}", other),
        }
        assert_eq!(broker.started(), 0);
    }
}
