//! Producers: what can be registered into a [`Container`](crate::Container).
//!
//! A producer is a constant, a function or a component. Its dependencies are
//! its parameter types ([`Dep`](crate::Dep), [`All`](crate::All)) and its
//! outputs are its return types, both captured at compile time through the
//! [`Callable`] and [`Outputs`] traits.

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::address::{Address, TypeInfo};
use crate::descriptors::{ProducerDescriptor, ProducerKind};
use crate::error::{BoxError, DiError, DiResult};
use crate::inject::{Dependency, Inject, Inputs};
use crate::storage::{Cast, Object, Storage};

/// A function whose parameters can all be injected.
///
/// Implemented for every `Fn(A1, .., An) -> R` with up to eight [`Inject`]
/// parameters; `Args` is the parameter tuple.
pub trait Callable<Args> {
    type Output;

    fn call(&self, args: Args) -> Self::Output;
}

macro_rules! impl_callable {
    ($($param:ident),*) => {
        impl<Func, Ret, $($param,)*> Callable<($($param,)*)> for Func
        where
            Func: Fn($($param),*) -> Ret,
            $($param: Inject,)*
        {
            type Output = Ret;

            #[allow(non_snake_case)]
            fn call(&self, ($($param,)*): ($($param,)*)) -> Ret {
                (self)($($param),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(A1);
impl_callable!(A1, A2);
impl_callable!(A1, A2, A3);
impl_callable!(A1, A2, A3, A4);
impl_callable!(A1, A2, A3, A4, A5);
impl_callable!(A1, A2, A3, A4, A5, A6);
impl_callable!(A1, A2, A3, A4, A5, A6, A7);
impl_callable!(A1, A2, A3, A4, A5, A6, A7, A8);

/// A tuple of values published by a multi-output producer.
pub trait Outputs: Sized {
    fn declared() -> Vec<(Address, TypeInfo)>;

    fn into_objects(self) -> Vec<Object>;
}

macro_rules! impl_outputs {
    ($($param:ident),+) => {
        impl<$($param: Send + Sync + 'static),+> Outputs for ($($param,)+) {
            fn declared() -> Vec<(Address, TypeInfo)> {
                vec![$((Address::of::<$param>(), TypeInfo::of::<$param>())),+]
            }

            #[allow(non_snake_case)]
            fn into_objects(self) -> Vec<Object> {
                let ($($param,)+) = self;
                vec![$(Object::new($param)),+]
            }
        }
    };
}

impl_outputs!(A1);
impl_outputs!(A1, A2);
impl_outputs!(A1, A2, A3);
impl_outputs!(A1, A2, A3, A4);
impl_outputs!(A1, A2, A3, A4, A5);
impl_outputs!(A1, A2, A3, A4, A5, A6);
impl_outputs!(A1, A2, A3, A4, A5, A6, A7);
impl_outputs!(A1, A2, A3, A4, A5, A6, A7, A8);

/// A struct whose fields are dependencies.
///
/// ```rust
/// use ferrous_boot::{All, Component, Dep};
///
/// trait Route: Send + Sync {}
/// struct Config { port: u16 }
///
/// struct Server {
///     config: Dep<Config>,
///     routes: All<dyn Route>,
/// }
///
/// impl Component for Server {
///     type Fields = (Dep<Config>, All<dyn Route>);
///
///     fn assemble((config, routes): Self::Fields) -> Self {
///         Server { config, routes }
///     }
/// }
/// ```
pub trait Component: Sized + Send + Sync + 'static {
    type Fields: Inputs;

    fn assemble(fields: Self::Fields) -> Self;
}

/// Builds a producer's objects; receives the producer's own address for
/// error reporting.
type BuildFn = dyn Fn(&Storage, &Address) -> DiResult<Vec<Object>> + Send + Sync;

/// A capability cast attached to one of a producer's outputs.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) address: Address,
    pub(crate) ty: TypeInfo,
    pub(crate) collection: Address,
    pub(crate) cast: Cast,
}

/// A type-erased producer, ready to be registered.
///
/// Usually obtained from a [`Provider`]; [`Provider::multi`] returns one
/// directly because its outputs have no single type.
pub struct Registration {
    pub(crate) address: Address,
    pub(crate) kind: ProducerKind,
    pub(crate) producer_type: TypeId,
    pub(crate) inputs: Vec<Dependency>,
    pub(crate) outputs: Vec<(Address, TypeInfo)>,
    pub(crate) constant: Option<Object>,
    pub(crate) build: Option<Box<BuildFn>>,
    pub(crate) bindings: Vec<Binding>,
}

impl Registration {
    /// Declares that the output `T` implements `I`.
    pub fn bind<T, I>(mut self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        T: Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
    {
        self.bindings.push(Binding {
            address: Address::of::<T>(),
            ty: TypeInfo::of::<T>(),
            collection: Address::collection_of::<I>(),
            cast: Cast::new(cast),
        });
        self
    }

    /// Graph node of this producer.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn kind(&self) -> ProducerKind {
        self.kind
    }

    pub(crate) fn run(&self, storage: &Storage) -> DiResult<Vec<Object>> {
        match &self.build {
            Some(build) => build(storage, &self.address),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn describe(&self, break_point: bool) -> ProducerDescriptor {
        ProducerDescriptor {
            address: self.address.clone(),
            kind: self.kind,
            inputs: self.inputs.iter().map(|d| d.address.clone()).collect(),
            outputs: self.outputs.iter().map(|(a, _)| a.clone()).collect(),
            implements: self.bindings.iter().map(|b| b.cast.target_name()).collect(),
            break_point,
        }
    }

    fn function<F: 'static>(
        inputs: Vec<Dependency>,
        outputs: Vec<(Address, TypeInfo)>,
        fallible: bool,
        build: Box<BuildFn>,
    ) -> Self {
        let in_addrs: Vec<Address> = inputs.iter().map(|d| d.address.clone()).collect();
        let mut out_addrs: Vec<Address> = outputs.iter().map(|(a, _)| a.clone()).collect();
        if fallible {
            out_addrs.push(Address::error());
        }
        Self {
            address: Address::function::<F>(&in_addrs, &out_addrs),
            kind: ProducerKind::Function,
            producer_type: TypeId::of::<F>(),
            inputs,
            outputs,
            constant: None,
            build: Some(build),
            bindings: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// A producer of `T`.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{All, Container, Context, Dep, Provider};
/// use std::sync::Arc;
///
/// trait Named: Send + Sync { fn name(&self) -> String; }
///
/// struct Db { url: String }
/// impl Named for Db { fn name(&self) -> String { format!("db({})", self.url) } }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut container = Container::new();
/// container
///     .register(Provider::value("postgres://localhost".to_string())).unwrap()
///     .register(
///         Provider::func(|url: Dep<String>| Db { url: url.to_string() })
///             .implements::<dyn Named>(|db| db),
///     ).unwrap();
///
/// container.start(&Context::new()).await.unwrap();
/// let names = container.invoke(|all: All<dyn Named>| {
///     all.iter().map(|n| n.name()).collect::<Vec<_>>()
/// }).unwrap();
/// assert_eq!(names, vec!["db(postgres://localhost)".to_string()]);
/// # }
/// ```
pub struct Provider<T> {
    registration: Registration,
    _marker: PhantomData<fn() -> T>,
}

impl Provider<()> {
    /// A constant, stored as-is.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Provider<T> {
        let object = Object::new(value);
        let address = object.address().clone();
        Provider::wrap(Registration {
            address: address.clone(),
            kind: ProducerKind::Constant,
            producer_type: TypeId::of::<T>(),
            inputs: Vec::new(),
            outputs: vec![(address, TypeInfo::of::<T>())],
            constant: Some(object),
            build: None,
            bindings: Vec::new(),
        })
    }

    /// A function publishing its return value.
    ///
    /// A function returning `()` publishes nothing and runs for its side
    /// effects.
    pub fn func<F, Args, T>(f: F) -> Provider<T>
    where
        F: Callable<Args, Output = T> + Send + Sync + 'static,
        Args: Inputs + 'static,
        T: Send + Sync + 'static,
    {
        let outputs = single_output::<T>();
        let build = move |storage: &Storage, _: &Address| -> DiResult<Vec<Object>> {
            let args = Args::resolve(storage)?;
            Ok(publish(f.call(args)))
        };
        Provider::wrap(Registration::function::<F>(
            Args::dependencies(),
            outputs,
            false,
            Box::new(build),
        ))
    }

    /// A function returning `Result<T, E>`; an error aborts `start`.
    pub fn try_func<F, Args, T, E>(f: F) -> Provider<T>
    where
        F: Callable<Args, Output = Result<T, E>> + Send + Sync + 'static,
        Args: Inputs + 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        Provider::wrap(Registration::function::<F>(
            Args::dependencies(),
            single_output::<T>(),
            true,
            Box::new(fallible(f, publish::<T>)),
        ))
    }

    /// A function returning `Result<(A, B, ..), E>`, publishing every element.
    pub fn multi<F, Args, M, E>(f: F) -> Registration
    where
        F: Callable<Args, Output = Result<M, E>> + Send + Sync + 'static,
        Args: Inputs + 'static,
        M: Outputs + 'static,
        E: Into<BoxError> + 'static,
    {
        Registration::function::<F>(
            Args::dependencies(),
            M::declared(),
            true,
            Box::new(fallible(f, M::into_objects)),
        )
    }

    /// A struct assembled from its injected fields.
    pub fn component<S: Component>() -> Provider<S> {
        let address = Address::of::<S>();
        let build = |storage: &Storage, _: &Address| -> DiResult<Vec<Object>> {
            let fields = S::Fields::resolve(storage)?;
            Ok(vec![Object::new(S::assemble(fields))])
        };
        Provider::wrap(Registration {
            address: address.clone(),
            kind: ProducerKind::Component,
            producer_type: TypeId::of::<S>(),
            inputs: S::Fields::dependencies(),
            outputs: vec![(address, TypeInfo::of::<S>())],
            constant: None,
            build: Some(Box::new(build)),
            bindings: Vec::new(),
        })
    }
}

impl<T: Send + Sync + 'static> Provider<T> {
    fn wrap(registration: Registration) -> Self {
        Self { registration, _marker: PhantomData }
    }

    /// Declares that the produced `T` implements `I`.
    ///
    /// The object then shows up in `All<I>` parameters and is offered to
    /// brokers looking for `I`.
    pub fn implements<I>(self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        Self::wrap(self.registration.bind::<T, I>(cast))
    }

    pub fn address(&self) -> &Address {
        self.registration.address()
    }

    pub fn into_registration(self) -> Registration {
        self.registration
    }
}

impl<T> From<Provider<T>> for Registration {
    fn from(provider: Provider<T>) -> Self {
        provider.registration
    }
}

fn is_unit<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<()>()
}

fn single_output<T: 'static>() -> Vec<(Address, TypeInfo)> {
    if is_unit::<T>() {
        Vec::new()
    } else {
        vec![(Address::of::<T>(), TypeInfo::of::<T>())]
    }
}

fn publish<T: Send + Sync + 'static>(value: T) -> Vec<Object> {
    if is_unit::<T>() {
        Vec::new()
    } else {
        vec![Object::new(value)]
    }
}

/// Build closure for producers returning `Result`.
fn fallible<F, Args, V, E, P>(
    f: F,
    publish: P,
) -> impl Fn(&Storage, &Address) -> DiResult<Vec<Object>>
where
    F: Callable<Args, Output = Result<V, E>>,
    Args: Inputs,
    E: Into<BoxError>,
    P: Fn(V) -> Vec<Object>,
{
    move |storage: &Storage, address: &Address| {
        let args = Args::resolve(storage)?;
        match f.call(args) {
            Ok(value) => Ok(publish(value)),
            Err(err) => Err(DiError::Producer {
                address: address.clone(),
                source: err.into(),
            }),
        }
    }
}
