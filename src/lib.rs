//! # ferrous-boot
//!
//! Type-driven dependency injection and application lifecycle orchestration
//! for Rust.
//!
//! ## Features
//!
//! - **Compile-time dependency discovery**: producers declare their
//!   dependencies through parameter types, no manual wiring
//! - **Deterministic startup**: objects are built exactly once, in topological
//!   order, with cycle detection naming the nodes involved
//! - **Interface collections**: inject every implementer of a trait with
//!   `All<dyn Trait>`
//! - **Lifecycle brokers**: priority-ordered start/stop hooks fed with every
//!   built object, with ready-made service, ticker and generic brokers
//! - **Thread-safe**: built objects live in an `Arc`-shared storage that
//!   background tasks can keep reading after startup
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_boot::{Container, Context, Dep, Provider};
//!
//! struct Config {
//!     url: String,
//! }
//!
//! struct Database {
//!     url: String,
//! }
//!
//! fn connect(config: Dep<Config>) -> Database {
//!     Database { url: config.url.clone() }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ferrous_boot::DiError> {
//! let mut container = Container::new();
//! container
//!     .register(Provider::value(Config { url: "postgres://localhost".to_string() }))?
//!     .register(Provider::func(connect))?;
//!
//! container.start(&Context::new()).await?;
//!
//! let url = container.invoke(|db: Dep<Database>| db.url.clone())?;
//! assert_eq!(url, "postgres://localhost");
//!
//! container.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Producers
//!
//! - [`Provider::value`]: a constant
//! - [`Provider::func`]: a function publishing its return value
//! - [`Provider::try_func`]: a function returning `Result<T, E>`
//! - [`Provider::multi`]: a function returning `Result<(A, B, ..), E>`
//! - [`Provider::component`]: a struct assembled from its [`Component`] fields
//!
//! Every type is identified by its canonical [`Address`]; two producers of the
//! same address are rejected.
//!
//! ## Brokers
//!
//! ```rust
//! use ferrous_boot::{BoxError, Container, Context, Provider, Service, ServiceBroker, TickerBroker};
//!
//! struct Server;
//!
//! impl Service for Server {
//!     fn up(&self) -> Result<(), BoxError> { Ok(()) }
//!     fn down(&self) -> Result<(), BoxError> { Ok(()) }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ferrous_boot::DiError> {
//! let mut container = Container::new();
//! container.register(Provider::func(|| Server).implements::<dyn Service>(|s| s))?;
//! container
//!     .broker_register(ServiceBroker::new())?
//!     .broker_register(TickerBroker::new())?;
//!
//! let ctx = Context::new();
//! container.start(&ctx).await?;
//! container.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod broker;
pub mod config;
pub mod container;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod graph;
pub mod inject;
pub mod observer;
pub mod producer;
pub mod storage;

#[cfg(feature = "diagnostics")]
mod graph_export;

pub use address::{Address, TypeInfo};
pub use broker::{
    AppService, Broker, ContextService, Service, ServiceBroker, Tick, TickFn, Ticker,
    TickerBroker, UniversalBroker,
};
pub use config::{ContainerConfig, TickerConfig};
pub use container::Container;
pub use context::{AppContext, Context};
pub use descriptors::{ProducerDescriptor, ProducerKind};
pub use error::{BoxError, BrokerFailure, DiError, DiResult};
pub use graph::{BuildOrder, Graph};
pub use inject::{All, Dep, Dependency, Inject, Inputs};
pub use observer::{DiObserver, MetricsObserver, TracingObserver};
pub use producer::{Callable, Component, Outputs, Provider, Registration};
pub use storage::{AnyArc, Cast, Object, Storage};
