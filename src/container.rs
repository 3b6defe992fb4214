//! The container: registration, startup, invocation and shutdown.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::address::Address;
use crate::broker::Broker;
use crate::config::ContainerConfig;
use crate::context::Context;
use crate::descriptors::ProducerDescriptor;
use crate::error::{BoxError, BrokerFailure, DiError, DiResult};
use crate::graph::{BuildOrder, Graph};
use crate::inject::Inputs;
use crate::observer::{DiObserver, Observers, TracingObserver};
use crate::producer::{Callable, Registration};
use crate::storage::Storage;

/// Dependency injection container and lifecycle orchestrator.
///
/// A container moves through two states. While *idle* it accepts producers
/// and brokers. [`start`](Container::start) sorts the dependency graph,
/// builds every object exactly once in dependency order and hands the result
/// to the brokers. While *running* functions can be
/// [`invoke`](Container::invoke)d against the built objects, until
/// [`stop`](Container::stop) shuts the brokers down again.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{BoxError, Container, Context, Dep, Provider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut container = Container::new();
/// container
///     .register(Provider::value(10i32))?
///     .register(Provider::try_func(|n: Dep<i32>| -> Result<String, BoxError> {
///         Ok(n.to_string())
///     }))?;
///
/// container.start(&Context::new()).await?;
/// container.invoke(|s: Dep<String>| assert_eq!(*s, "10"))?;
/// container.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Container {
    config: ContainerConfig,
    storage: Arc<Storage>,
    graph: Graph,
    producers: Vec<Registration>,
    /// Producer node → index into `producers`, for functions and components.
    builders: HashMap<Address, usize>,
    /// Output address → producing registration.
    produced: HashMap<Address, usize>,
    collections: HashSet<Address>,
    pending_breaks: HashSet<TypeId>,
    brokers: Vec<Box<dyn Broker>>,
    activated: Vec<usize>,
    observers: Observers,
    running: bool,
}

impl Container {
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        let mut observers = Observers::default();
        if config.verbose {
            observers.add(Arc::new(TracingObserver::new()));
        }
        Self {
            config,
            storage: Arc::new(Storage::new()),
            graph: Graph::new(),
            producers: Vec::new(),
            builders: HashMap::new(),
            produced: HashMap::new(),
            collections: HashSet::new(),
            pending_breaks: HashSet::new(),
            brokers: Vec::new(),
            activated: Vec::new(),
            observers,
            running: false,
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn add_observer(&mut self, observer: Arc<dyn DiObserver>) -> &mut Self {
        self.observers.add(observer);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Shared handle to the object storage.
    pub fn storage(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    /// Registers a producer.
    ///
    /// Records the producer's edges in the dependency graph and declares a
    /// placeholder for every parameter and output. Constants are stored
    /// right away.
    ///
    /// # Errors
    ///
    /// - [`DiError::AlreadyRunning`] after `start`
    /// - [`DiError::DuplicateType`] when an output already has a producer
    /// - [`DiError::AddressCollision`] when two types share an address
    pub fn register(&mut self, producer: impl Into<Registration>) -> DiResult<&mut Self> {
        if self.running {
            return Err(DiError::AlreadyRunning);
        }
        let registration = producer.into();
        self.check_unique(&registration)?;

        for dep in registration.inputs.iter().filter(|d| !d.collection) {
            self.storage.declare(&dep.address, dep.ty)?;
        }
        for (address, ty) in &registration.outputs {
            match &registration.constant {
                Some(constant) if constant.address() == address => {
                    self.storage.set(constant.clone())?;
                }
                _ => self.storage.declare(address, *ty)?,
            }
        }
        for binding in &registration.bindings {
            self.storage.bind(&binding.address, binding.ty, binding.cast.clone())?;
        }

        self.link(&registration);

        let index = self.producers.len();
        for (address, _) in &registration.outputs {
            self.produced.insert(address.clone(), index);
        }
        if registration.build.is_some() {
            self.builders.insert(registration.address.clone(), index);
        }
        if self.pending_breaks.remove(&registration.producer_type) {
            self.graph.break_point(&registration.address);
        }

        debug!(address = %registration.address, kind = %registration.kind, "registered");
        self.observers.registered(&registration.address);
        self.producers.push(registration);
        Ok(self)
    }

    /// Registers several producers, stopping at the first error.
    pub fn register_all<I, R>(&mut self, producers: I) -> DiResult<&mut Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<Registration>,
    {
        for producer in producers {
            self.register(producer)?;
        }
        Ok(self)
    }

    fn check_unique(&self, registration: &Registration) -> DiResult<()> {
        if self.builders.contains_key(&registration.address) {
            return Err(DiError::DuplicateType(registration.address.clone()));
        }
        let mut seen = HashSet::new();
        for (address, _) in &registration.outputs {
            if self.produced.contains_key(address) || !seen.insert(address) {
                return Err(DiError::DuplicateType(address.clone()));
            }
        }
        Ok(())
    }

    /// Inserts the edges of one producer.
    fn link(&mut self, registration: &Registration) {
        let node = &registration.address;
        if registration.constant.is_some() {
            self.graph.add(&Address::root(), node);
            return;
        }
        if registration.inputs.is_empty() {
            self.graph.add(&Address::root(), node);
        }
        for dep in &registration.inputs {
            if dep.collection {
                self.collections.insert(dep.address.clone());
            }
            self.graph.add(&dep.address, node);
        }
        for (output, _) in &registration.outputs {
            if output != node {
                self.graph.add(node, output);
            }
        }
        for binding in &registration.bindings {
            self.collections.insert(binding.collection.clone());
            self.graph.add(&binding.address, &binding.collection);
        }
    }

    /// Adds edges from stored `Arc<dyn I>` / `Vec<Arc<dyn I>>` values into
    /// the collection of `I`, once every collection node is known.
    fn link_collections(&mut self) {
        let feeders: Vec<(Address, Address)> = self
            .storage
            .addresses()
            .into_iter()
            .filter_map(|address| {
                let collection = address.feeds_collection()?;
                self.collections
                    .contains(&collection)
                    .then_some((address, collection))
            })
            .collect();
        for (from, to) in feeders {
            self.graph.add(&from, &to);
        }
    }

    /// Registers a broker.
    ///
    /// Brokers are kept sorted by ascending priority; equal priorities keep
    /// registration order.
    pub fn broker_register<B: Broker + 'static>(&mut self, broker: B) -> DiResult<&mut Self> {
        self.broker_register_boxed(Box::new(broker))
    }

    pub fn broker_register_boxed(&mut self, broker: Box<dyn Broker>) -> DiResult<&mut Self> {
        if self.running {
            return Err(DiError::AlreadyRunning);
        }
        if self.brokers.iter().any(|b| b.name() == broker.name()) {
            return Err(DiError::DuplicateBroker(broker.name().to_string()));
        }
        let at = self
            .brokers
            .partition_point(|b| b.priority() <= broker.priority());
        debug!(broker = broker.name(), priority = broker.priority(), "broker registered");
        self.brokers.insert(at, broker);
        Ok(self)
    }

    /// Names of the registered brokers, in start order.
    pub fn broker_names(&self) -> Vec<String> {
        self.brokers.iter().map(|b| b.name().to_string()).collect()
    }

    /// Stops `start` at producer `f`.
    ///
    /// `f`'s own dependencies are built, but neither `f` nor anything
    /// downstream of it is. Run it later with [`invoke`](Container::invoke).
    /// May be called before or after `f` is registered.
    pub fn break_point<F: 'static>(&mut self, _f: &F) -> DiResult<&mut Self> {
        if self.running {
            return Err(DiError::AlreadyRunning);
        }
        let ty = TypeId::of::<F>();
        match self.producers.iter().find(|r| r.producer_type == ty) {
            Some(registration) if registration.address.is_function() => {
                let address = registration.address.clone();
                self.graph.break_point(&address);
            }
            Some(registration) => {
                return Err(DiError::WrongType(registration.address.to_string()));
            }
            None => {
                self.pending_breaks.insert(ty);
            }
        }
        Ok(self)
    }

    /// Marks a producer function address as a break point.
    pub fn break_point_at(&mut self, address: &Address) -> DiResult<&mut Self> {
        if self.running {
            return Err(DiError::AlreadyRunning);
        }
        if !address.is_function() {
            return Err(DiError::WrongType(address.to_string()));
        }
        self.graph.break_point(address);
        Ok(self)
    }

    /// Sorts the dependency graph without building anything.
    pub fn build_order(&mut self) -> DiResult<BuildOrder> {
        self.link_collections();
        self.graph.build()
    }

    /// Builds every object and starts the brokers.
    ///
    /// Construction errors abort immediately. When a broker fails to start,
    /// the brokers started before it stay recorded: call
    /// [`stop`](Container::stop) to shut them down.
    pub async fn start(&mut self, ctx: &Context) -> DiResult<()> {
        if self.running {
            return Err(DiError::AlreadyRunning);
        }
        self.running = true;
        self.activated.clear();

        let order = self.build_order()?;
        info!(
            objects = order.order.len(),
            deferred = order.deferred.len(),
            "starting container"
        );
        for address in &order.order {
            self.build_node(address)?;
        }

        self.activate(ctx).await
    }

    fn build_node(&self, address: &Address) -> DiResult<()> {
        if address.is_root() || address.is_error() || self.collections.contains(address) {
            return Ok(());
        }
        if self.graph.is_break_point(address) {
            debug!(%address, "break point, not built");
            return Ok(());
        }
        let Some(&index) = self.builders.get(address) else {
            let object = self
                .storage
                .get(address)
                .map_err(|_| DiError::Unresolved(address.clone()))?;
            if object.is_valid() {
                return Ok(());
            }
            return Err(DiError::Unresolved(address.clone()));
        };

        let registration = &self.producers[index];
        self.observers.building(address);
        let started = Instant::now();
        let built = registration.run(&self.storage).and_then(|objects| {
            objects
                .into_iter()
                .try_for_each(|object| self.storage.set(object))
        });
        match built {
            Ok(()) => {
                self.observers.built(address, started.elapsed());
                Ok(())
            }
            Err(err) => {
                warn!(%address, error = %err, "producer failed");
                self.observers.failed(address, &err.to_string());
                Err(err)
            }
        }
    }

    async fn activate(&mut self, ctx: &Context) -> DiResult<()> {
        let brokers = &mut self.brokers;
        self.storage.yield_objects(|object| {
            for broker in brokers.iter_mut() {
                broker.apply(object);
            }
        });

        for index in 0..self.brokers.len() {
            let broker = &mut self.brokers[index];
            let started = Instant::now();
            if let Err(source) = broker.on_start(ctx).await {
                let name = broker.name().to_string();
                warn!(broker = %name, error = %source, "broker failed to start");
                return Err(DiError::BrokerStart { name, source });
            }
            info!(broker = broker.name(), "broker started");
            self.observers.broker_started(broker.name(), started.elapsed());
            self.activated.push(index);
        }
        Ok(())
    }

    /// Stops the activated brokers in reverse activation order.
    ///
    /// Every broker is stopped even when earlier ones fail; failures are
    /// reported together in [`DiError::BrokerStop`].
    pub async fn stop(&mut self) -> DiResult<()> {
        if !self.running {
            return Err(DiError::NotRunning);
        }
        self.running = false;

        let mut failures = Vec::new();
        while let Some(index) = self.activated.pop() {
            let broker = &mut self.brokers[index];
            let started = Instant::now();
            let result = broker.on_stop().await;
            self.observers.broker_stopped(broker.name(), started.elapsed());
            match result {
                Ok(()) => info!(broker = broker.name(), "broker stopped"),
                Err(source) => {
                    warn!(broker = broker.name(), error = %source, "broker failed to stop");
                    failures.push(BrokerFailure { name: broker.name().to_string(), source });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::BrokerStop(failures))
        }
    }

    /// Calls `f` with its parameters resolved from storage.
    ///
    /// # Errors
    ///
    /// - [`DiError::NotRunning`] before `start`
    /// - [`DiError::Unresolved`] when a parameter was declared but never built
    /// - [`DiError::NotFound`] when a parameter was never declared
    pub fn invoke<F, Args>(&self, f: F) -> DiResult<F::Output>
    where
        F: Callable<Args>,
        Args: Inputs,
    {
        if !self.running {
            return Err(DiError::NotRunning);
        }
        let args = Args::resolve(&self.storage)?;
        Ok(f.call(args))
    }

    /// Like [`invoke`](Container::invoke), for functions returning `Result`.
    ///
    /// ```rust
    /// use ferrous_boot::{Container, Context, Dep, DiError, Provider};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mut container = Container::new();
    /// container.register(Provider::value(0u32)).unwrap();
    /// container.start(&Context::new()).await.unwrap();
    ///
    /// let result = container.try_invoke(|n: Dep<u32>| {
    ///     if *n == 0 { Err("zero") } else { Ok(*n) }
    /// });
    /// assert!(matches!(result, Err(DiError::Invoke(_))));
    /// # }
    /// ```
    pub fn try_invoke<F, Args, T, E>(&self, f: F) -> DiResult<T>
    where
        F: Callable<Args, Output = Result<T, E>>,
        Args: Inputs,
        E: Into<BoxError>,
    {
        self.invoke(f)?.map_err(|err| DiError::Invoke(err.into()))
    }

    /// Typed read of a built object.
    pub fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.storage.resolve::<T>(&Address::of::<T>())
    }

    /// Descriptors of every registered producer, in registration order.
    pub fn descriptors(&self) -> Vec<ProducerDescriptor> {
        self.producers
            .iter()
            .map(|r| r.describe(self.graph.is_break_point(&r.address)))
            .collect()
    }

    /// Edges of the dependency graph, `dependency -> dependent`.
    pub fn edges(&self) -> Vec<(Address, Address)> {
        self.graph.edges()
    }

    /// Graphviz rendering of the dependency graph.
    #[cfg(feature = "diagnostics")]
    pub fn graph_dot(&self) -> String {
        crate::graph_export::to_dot(&self.graph.edges(), &self.descriptors())
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("running", &self.running)
            .field("producers", &self.producers.len())
            .field("objects", &self.storage.len())
            .field("brokers", &self.broker_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::{All, Dep};
    use crate::producer::Provider;

    trait Shape: Send + Sync {
        fn area(&self) -> u32;
    }

    struct Square(u32);
    impl Shape for Square {
        fn area(&self) -> u32 {
            self.0 * self.0
        }
    }

    struct Total(u32);

    fn side() -> u32 {
        3
    }

    #[tokio::test]
    async fn test_collection_consumer_runs_after_implementers() {
        let mut container = Container::new();
        container
            .register(Provider::func(|shapes: All<dyn Shape>| {
                Total(shapes.iter().map(|s| s.area()).sum())
            }))
            .unwrap()
            .register(Provider::func(|n: Dep<u32>| Square(*n)).implements::<dyn Shape>(|s| s))
            .unwrap()
            .register(Provider::func(side))
            .unwrap();

        container.start(&Context::new()).await.unwrap();
        assert_eq!(container.get::<Total>().unwrap().0, 9);
    }

    #[tokio::test]
    async fn test_break_point_registered_later() {
        let stage = |n: Dep<u32>| Square(*n);
        let mut container = Container::new();
        container.break_point(&stage).unwrap();
        container.register(Provider::func(side)).unwrap();
        container.register(Provider::func(stage)).unwrap();

        let descriptors = container.descriptors();
        assert!(descriptors[1].break_point);

        container.start(&Context::new()).await.unwrap();
        assert_eq!(*container.get::<u32>().unwrap(), 3);
        assert!(matches!(container.get::<Square>(), Err(DiError::Unresolved(_))));
        let square = container.invoke(stage).unwrap();
        assert_eq!(square.area(), 9);
    }

    #[test]
    fn test_break_point_on_constant_is_wrong_type() {
        let mut container = Container::new();
        container.register(Provider::value(1u8)).unwrap();
        assert!(matches!(
            container.break_point_at(&Address::of::<u8>()),
            Err(DiError::WrongType(_))
        ));
    }

    #[test]
    fn test_constant_after_placeholder() {
        let mut container = Container::new();
        container.register(Provider::func(|n: Dep<u32>| *n as u64)).unwrap();
        container.register(Provider::value(5u32)).unwrap();
        assert!(matches!(
            container.register(Provider::value(6u32)),
            Err(DiError::DuplicateType(_))
        ));
        assert!(matches!(
            container.register(Provider::func(|| 1u64)),
            Err(DiError::DuplicateType(_))
        ));
    }
}
