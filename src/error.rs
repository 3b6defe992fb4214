//! Error types for the container, its storage and its brokers.

use std::fmt;

use crate::address::Address;

/// Boxed error returned by user code (producers, invoked functions, brokers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single broker, or item inside a broker, that failed to stop.
///
/// Shutdown keeps going after a failure, so several of these can be
/// reported together inside [`DiError::BrokerStop`] or [`DiError::Rollback`].
#[derive(Debug)]
pub struct BrokerFailure {
    /// Name of the broker, as returned by [`Broker::name`](crate::Broker::name),
    /// or of the object it was bringing down.
    pub name: String,
    /// The error returned while stopping it.
    pub source: BoxError,
}

impl fmt::Display for BrokerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.source)
    }
}

/// Dependency injection and lifecycle errors
///
/// Represents the error conditions that can occur during registration,
/// graph building, object construction, invocation and broker hooks.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{Address, Container, DiError, Provider};
///
/// let mut container = Container::new();
/// container.register(Provider::value("x".to_string())).unwrap();
///
/// match container.register(Provider::value("y".to_string())) {
///     Err(DiError::DuplicateType(address)) => {
///         assert_eq!(address, Address::of::<String>());
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DiError {
    /// Operation requires an idle container
    #[error("container is already running")]
    AlreadyRunning,
    /// Operation requires a running container
    #[error("container is not running")]
    NotRunning,
    /// A second producer resolved to an address that already has one
    #[error("duplicate type: {0}")]
    DuplicateType(Address),
    /// Two brokers share a name
    #[error("duplicate broker: {0}")]
    DuplicateBroker(String),
    /// Break point requested on something that is not a function
    #[error("wrong type: {0} is not a function")]
    WrongType(String),
    /// The dependency graph is not a DAG (nodes left on the cycle)
    #[error("dependency cycle detected: {}", join(.0))]
    Cycle(Vec<Address>),
    /// Address was never declared
    #[error("object not found: {0}")]
    NotFound(Address),
    /// Address is declared but holds no value yet
    #[error("unresolved dependency: {0}")]
    Unresolved(Address),
    /// Address already holds an initialized value
    #[error("object already initialized: {0}")]
    Redefined(Address),
    /// Two distinct types produced the same canonical address
    #[error("address collision at {address}: {existing} vs {incoming}")]
    AddressCollision {
        address: Address,
        existing: &'static str,
        incoming: &'static str,
    },
    /// Stored value could not be downcast to the requested type
    #[error("type mismatch at {address}: expected {expected}")]
    TypeMismatch {
        address: Address,
        expected: &'static str,
    },
    /// A producer returned an error
    #[error("producer {address} failed: {source}")]
    Producer {
        address: Address,
        #[source]
        source: BoxError,
    },
    /// An invoked function returned an error
    #[error("invoke failed: {0}")]
    Invoke(#[source] BoxError),
    /// A broker failed to start
    #[error("broker {name} failed to start: {source}")]
    BrokerStart {
        name: String,
        #[source]
        source: BoxError,
    },
    /// One or more brokers failed to stop
    #[error("brokers failed to stop: {}", join(.0))]
    BrokerStop(Vec<BrokerFailure>),
    /// A start hook failed and bringing the started items down failed too
    #[error("{source}; rollback failed: {}", join(.failures))]
    Rollback {
        #[source]
        source: BoxError,
        failures: Vec<BrokerFailure>,
    },
    /// A ticker declared an unusable tick
    #[error("invalid tick {name}: {reason}")]
    InvalidTick { name: String, reason: String },
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for container operations
///
/// A convenience alias for `Result<T, DiError>` used throughout ferrous-boot.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{DiError, DiResult};
///
/// fn ensure_running(running: bool) -> DiResult<()> {
///     if running { Ok(()) } else { Err(DiError::NotRunning) }
/// }
///
/// assert!(ensure_running(true).is_ok());
/// assert!(matches!(ensure_running(false), Err(DiError::NotRunning)));
/// ```
pub type DiResult<T> = Result<T, DiError>;
