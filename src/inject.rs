//! Injectable parameters.
//!
//! Producer functions, invoked functions and components declare what they
//! need through their parameter types: [`Dep<T>`] for a single object and
//! [`All<dyn I>`](All) for every object implementing a trait. The parameter
//! types are read at compile time, which is how the container learns the
//! dependency edges without runtime reflection.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::address::{Address, TypeInfo};
use crate::error::DiResult;
use crate::storage::Storage;

/// A single declared dependency of a producer.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub address: Address,
    pub ty: TypeInfo,
    /// True for interface collections, which have no storage slot of their own.
    pub collection: bool,
}

/// A value that can be resolved from [`Storage`] as a parameter.
pub trait Inject: Sized {
    fn dependency() -> Dependency;

    fn resolve(storage: &Storage) -> DiResult<Self>;
}

/// A shared handle to a single dependency of type `T`.
///
/// ```rust
/// use ferrous_boot::{Container, Context, Dep, Provider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut container = Container::new();
/// container.register(Provider::value(10i32)).unwrap();
/// container.start(&Context::new()).await.unwrap();
///
/// let doubled = container.invoke(|n: Dep<i32>| *n * 2).unwrap();
/// assert_eq!(doubled, 20);
/// # }
/// ```
pub struct Dep<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> Dep<T> {
    pub fn into_inner(self) -> Arc<T> {
        self.0
    }
}

impl<T: ?Sized> Deref for Dep<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> Clone for Dep<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Dep<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dep").field(&self.0).finish()
    }
}

impl<T: Send + Sync + 'static> Inject for Dep<T> {
    fn dependency() -> Dependency {
        Dependency {
            address: Address::of::<T>(),
            ty: TypeInfo::of::<T>(),
            collection: false,
        }
    }

    fn resolve(storage: &Storage) -> DiResult<Self> {
        storage.resolve::<T>(&Address::of::<T>()).map(Dep)
    }
}

/// Every built object usable as `Arc<I>`, usually `I = dyn Trait`.
///
/// Implementers are declared with
/// [`Provider::implements`](crate::Provider::implements). Order follows
/// registration but should not be relied upon.
pub struct All<I: ?Sized>(pub Vec<Arc<I>>);

impl<I: ?Sized> All<I> {
    pub fn into_inner(self) -> Vec<Arc<I>> {
        self.0
    }
}

impl<I: ?Sized> Deref for All<I> {
    type Target = [Arc<I>];

    fn deref(&self) -> &[Arc<I>] {
        &self.0
    }
}

impl<I: ?Sized> Clone for All<I> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<I: ?Sized> fmt::Debug for All<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("All")
            .field("type", &std::any::type_name::<I>())
            .field("len", &self.0.len())
            .finish()
    }
}

impl<I: ?Sized + Send + Sync + 'static> Inject for All<I> {
    fn dependency() -> Dependency {
        Dependency {
            address: Address::collection_of::<I>(),
            ty: TypeInfo::of::<Vec<Arc<I>>>(),
            collection: true,
        }
    }

    fn resolve(storage: &Storage) -> DiResult<Self> {
        Ok(All(storage.collection::<I>()))
    }
}

/// A tuple of [`Inject`] parameters.
pub trait Inputs: Sized {
    fn dependencies() -> Vec<Dependency>;

    fn resolve(storage: &Storage) -> DiResult<Self>;
}

impl Inputs for () {
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    fn resolve(_storage: &Storage) -> DiResult<Self> {
        Ok(())
    }
}

macro_rules! impl_inputs {
    ($($param:ident),+) => {
        impl<$($param: Inject),+> Inputs for ($($param,)+) {
            fn dependencies() -> Vec<Dependency> {
                vec![$($param::dependency()),+]
            }

            fn resolve(storage: &Storage) -> DiResult<Self> {
                Ok(($($param::resolve(storage)?,)+))
            }
        }
    };
}

impl_inputs!(A1);
impl_inputs!(A1, A2);
impl_inputs!(A1, A2, A3);
impl_inputs!(A1, A2, A3, A4);
impl_inputs!(A1, A2, A3, A4, A5);
impl_inputs!(A1, A2, A3, A4, A5, A6);
impl_inputs!(A1, A2, A3, A4, A5, A6, A7);
impl_inputs!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiError;
    use crate::storage::{Cast, Object};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_tuple_dependencies_keep_parameter_order() {
        let deps = <(Dep<u8>, All<dyn Greeter>, Dep<String>)>::dependencies();
        let addresses: Vec<_> = deps.iter().map(|d| d.address.clone()).collect();
        assert_eq!(
            addresses,
            vec![
                Address::of::<u8>(),
                Address::collection_of::<dyn Greeter>(),
                Address::of::<String>(),
            ]
        );
        assert!(deps[1].collection);
        assert!(!deps[0].collection);
    }

    #[test]
    fn test_resolve_from_storage() {
        let storage = Storage::new();
        storage.set(Object::new(3u8)).unwrap();
        let mut english = Object::new(English);
        english.bind(Cast::new::<English, dyn Greeter>(|e| e));
        storage.set(english).unwrap();

        let (n, greeters) = <(Dep<u8>, All<dyn Greeter>)>::resolve(&storage).unwrap();
        assert_eq!(*n, 3);
        assert_eq!(greeters.len(), 1);
        assert_eq!(greeters[0].greet(), "hello");
    }

    #[test]
    fn test_missing_dependency() {
        let storage = Storage::new();
        let err = <(Dep<u8>,)>::resolve(&storage).unwrap_err();
        assert!(matches!(err, DiError::NotFound(_)));

        let empty = <(All<dyn Greeter>,)>::resolve(&storage).unwrap();
        assert!(empty.0.is_empty());
    }
}
