//! Up/down services.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{combine, with_rollback, Broker};
use crate::config::{ContainerConfig, SERVICE_PRIORITY};
use crate::context::{AppContext, Context};
use crate::error::{BoxError, BrokerFailure};
use crate::storage::Object;

/// A service with synchronous start and stop hooks.
pub trait Service: Send + Sync {
    fn up(&self) -> Result<(), BoxError>;

    fn down(&self) -> Result<(), BoxError>;
}

/// A service whose hooks receive the startup context.
#[async_trait]
pub trait ContextService: Send + Sync {
    async fn up(&self, ctx: &Context) -> Result<(), BoxError>;

    async fn down(&self, ctx: &Context) -> Result<(), BoxError>;
}

/// A service whose hooks receive the [`AppContext`], which can request
/// application shutdown.
#[async_trait]
pub trait AppService: Send + Sync {
    async fn up(&self, app: &AppContext) -> Result<(), BoxError>;

    async fn down(&self, app: &AppContext) -> Result<(), BoxError>;
}

enum Contract {
    Plain(Arc<dyn Service>),
    Context(Arc<dyn ContextService>),
    App(Arc<dyn AppService>),
}

struct Entry {
    name: String,
    contract: Contract,
}

impl Entry {
    async fn up(&self, ctx: &Context, app: &AppContext) -> Result<(), BoxError> {
        match &self.contract {
            Contract::Plain(s) => s.up(),
            Contract::Context(s) => s.up(ctx).await,
            Contract::App(s) => s.up(app).await,
        }
    }

    async fn down(&self, ctx: &Context, app: &AppContext) -> Result<(), BoxError> {
        match &self.contract {
            Contract::Plain(s) => s.down(),
            Contract::Context(s) => s.down(ctx).await,
            Contract::App(s) => s.down(app).await,
        }
    }
}

/// Starts every object bound to a service contract, in the order the
/// objects were built.
///
/// The broker records how many services came up. If one fails, only those
/// already started are brought down again, in reverse, before the error is
/// returned. Failures during that rollback come back wrapped in
/// [`DiError::Rollback`](crate::DiError::Rollback). `on_stop` likewise only
/// stops what was started.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{BoxError, Container, Context, Provider, Service, ServiceBroker};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Cache { warm: AtomicBool }
///
/// impl Service for Cache {
///     fn up(&self) -> Result<(), BoxError> {
///         self.warm.store(true, Ordering::SeqCst);
///         Ok(())
///     }
///     fn down(&self) -> Result<(), BoxError> {
///         self.warm.store(false, Ordering::SeqCst);
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut container = Container::new();
/// container
///     .register(Provider::func(Cache::default).implements::<dyn Service>(|c| c))
///     .unwrap();
/// container.broker_register(ServiceBroker::new()).unwrap();
/// container.start(&Context::new()).await.unwrap();
///
/// assert!(container.get::<Cache>().unwrap().warm.load(Ordering::SeqCst));
/// container.stop().await.unwrap();
/// # }
/// ```
pub struct ServiceBroker {
    name: String,
    priority: i32,
    entries: Vec<Entry>,
    started: usize,
    running: Option<(Context, AppContext)>,
}

impl ServiceBroker {
    pub fn new() -> Self {
        Self::with_priority(SERVICE_PRIORITY)
    }

    pub fn with_priority(priority: i32) -> Self {
        Self {
            name: "service".to_string(),
            priority,
            entries: Vec::new(),
            started: 0,
            running: None,
        }
    }

    pub fn from_config(config: &ContainerConfig) -> Self {
        Self::with_priority(config.service_priority)
    }

    /// Renames the broker, so several service brokers can coexist.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of collected services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of services currently up.
    pub fn started(&self) -> usize {
        self.started
    }

    /// Brings down the first `self.started` services in reverse.
    async fn unwind(&mut self) -> Vec<BrokerFailure> {
        let mut failures = Vec::new();
        let Some((ctx, app)) = self.running.as_ref() else {
            return failures;
        };
        while self.started > 0 {
            self.started -= 1;
            let entry = &self.entries[self.started];
            debug!(service = %entry.name, "stopping service");
            if let Err(source) = entry.down(ctx, app).await {
                warn!(service = %entry.name, error = %source, "service failed to stop");
                failures.push(BrokerFailure { name: entry.name.clone(), source });
            }
        }
        failures
    }
}

impl Default for ServiceBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for ServiceBroker {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn apply(&mut self, object: &Object) {
        let contract = if let Some(s) = object.cast::<dyn Service>() {
            Contract::Plain(s)
        } else if let Some(s) = object.cast::<dyn ContextService>() {
            Contract::Context(s)
        } else if let Some(s) = object.cast::<dyn AppService>() {
            Contract::App(s)
        } else {
            return;
        };
        self.entries.push(Entry {
            name: object.address().to_string(),
            contract,
        });
    }

    async fn on_start(&mut self, ctx: &Context) -> Result<(), BoxError> {
        let app = AppContext::new(ctx.clone());
        self.running = Some((ctx.clone(), app.clone()));
        self.started = 0;

        while self.started < self.entries.len() {
            let entry = &self.entries[self.started];
            debug!(service = %entry.name, "starting service");
            if let Err(err) = entry.up(ctx, &app).await {
                warn!(service = %entry.name, error = %err, "service failed to start, unwinding");
                let failures = self.unwind().await;
                return Err(with_rollback(err, failures));
            }
            self.started += 1;
        }
        Ok(())
    }

    async fn on_stop(&mut self) -> Result<(), BoxError> {
        let failures = self.unwind().await;
        self.running = None;
        combine(failures)
    }
}
