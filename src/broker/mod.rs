//! Lifecycle brokers.
//!
//! A broker is offered every built object once startup has finished, then
//! gets ordered start and stop hooks. Brokers are sorted by ascending
//! [`Broker::priority`]; lower priorities start first and stop last.
//!
//! Three reusable brokers ship with the crate:
//!
//! - [`ServiceBroker`] starts and stops objects implementing [`Service`],
//!   [`ContextService`] or [`AppService`]
//! - [`TickerBroker`] runs the periodic callbacks declared by [`Ticker`]s
//! - [`UniversalBroker`] does what the service broker does for any trait

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{BoxError, BrokerFailure, DiError};
use crate::storage::Object;

mod service;
mod ticker;
mod universal;

pub use service::{AppService, ContextService, Service, ServiceBroker};
pub use ticker::{Tick, TickFn, Ticker, TickerBroker};
pub use universal::UniversalBroker;

/// A lifecycle participant.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use ferrous_boot::{BoxError, Broker, Container, Context, Object, Provider};
///
/// #[derive(Default)]
/// struct Counter { seen: usize }
///
/// #[async_trait]
/// impl Broker for Counter {
///     fn name(&self) -> &str { "counter" }
///     fn apply(&mut self, _object: &Object) { self.seen += 1; }
///     async fn on_start(&mut self, _ctx: &Context) -> Result<(), BoxError> {
///         assert_eq!(self.seen, 2);
///         Ok(())
///     }
///     async fn on_stop(&mut self) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut container = Container::new();
/// container.register(Provider::value(1u8)).unwrap();
/// container.register(Provider::value("two".to_string())).unwrap();
/// container.broker_register(Counter::default()).unwrap();
/// container.start(&Context::new()).await.unwrap();
/// container.stop().await.unwrap();
/// # }
/// ```
#[async_trait]
pub trait Broker: Send {
    /// Unique name within a container.
    fn name(&self) -> &str;

    /// Lower values start first and stop last.
    fn priority(&self) -> i32 {
        0
    }

    /// Offered every built object, after the whole object graph is built.
    fn apply(&mut self, object: &Object);

    async fn on_start(&mut self, ctx: &Context) -> Result<(), BoxError>;

    async fn on_stop(&mut self) -> Result<(), BoxError>;
}

/// Folds per-item shutdown failures into one error.
pub(crate) fn combine(failures: Vec<BrokerFailure>) -> Result<(), BoxError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Box::new(DiError::BrokerStop(failures)))
    }
}

/// Start error, carrying any failures from undoing the partial start.
pub(crate) fn with_rollback(source: BoxError, failures: Vec<BrokerFailure>) -> BoxError {
    if failures.is_empty() {
        source
    } else {
        Box::new(DiError::Rollback { source, failures })
    }
}
