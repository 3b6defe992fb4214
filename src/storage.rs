//! Thread-safe object storage keyed by [`Address`].
//!
//! Storage keeps one [`Object`] per address in declaration order. An object is
//! either a placeholder (type known, no value yet) or a fully built value; a
//! built value can never be replaced.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::address::{Address, TypeInfo};
use crate::error::{DiError, DiResult};

/// Type-erased shared value as stored in the container.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

type CastFn = dyn Fn(&AnyArc) -> Option<Box<dyn Any + Send>> + Send + Sync;

/// Capability cast from a stored concrete value to a trait object `Arc<I>`.
///
/// Casts are declared at registration time with
/// [`Provider::implements`](crate::Provider::implements) and are how brokers and
/// collection injection discover which objects implement a trait.
#[derive(Clone)]
pub struct Cast {
    target: TypeId,
    target_name: &'static str,
    apply: Arc<CastFn>,
}

impl Cast {
    /// Builds a cast from `Arc<T>` to `Arc<I>`.
    pub fn new<T, I>(cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        T: Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
    {
        let apply = move |value: &AnyArc| -> Option<Box<dyn Any + Send>> {
            let concrete = value.clone().downcast::<T>().ok()?;
            Some(Box::new(cast(concrete)))
        };
        Self {
            target: TypeId::of::<I>(),
            target_name: std::any::type_name::<I>(),
            apply: Arc::new(apply),
        }
    }

    pub fn target(&self) -> TypeId {
        self.target
    }

    pub fn target_name(&self) -> &'static str {
        self.target_name
    }

    fn apply<I: ?Sized + Send + Sync + 'static>(&self, value: &AnyArc) -> Option<Arc<I>> {
        if self.target != TypeId::of::<I>() {
            return None;
        }
        let boxed = (self.apply)(value)?;
        boxed.downcast::<Arc<I>>().ok().map(|b| *b)
    }
}

impl std::fmt::Debug for Cast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cast").field("target", &self.target_name).finish()
    }
}

/// A stored object: address, type and, once built, its value.
#[derive(Clone)]
pub struct Object {
    address: Address,
    ty: TypeInfo,
    value: Option<AnyArc>,
    casts: Vec<Cast>,
}

impl Object {
    /// A declared dependency that has not been built yet.
    pub fn placeholder(address: Address, ty: TypeInfo) -> Self {
        Self { address, ty, value: None, casts: Vec::new() }
    }

    /// A built object.
    pub fn with_value(address: Address, ty: TypeInfo, value: AnyArc) -> Self {
        Self { address, ty, value: Some(value), casts: Vec::new() }
    }

    /// Convenience constructor deriving address and type from `T`.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::with_value(Address::of::<T>(), TypeInfo::of::<T>(), Arc::new(value))
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn type_info(&self) -> TypeInfo {
        self.ty
    }

    pub fn value(&self) -> Option<&AnyArc> {
        self.value.as_ref()
    }

    /// True when the object holds a built value.
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.is_none()
    }

    /// Downcasts the value to its concrete type.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.as_ref()?.clone().downcast::<T>().ok()
    }

    /// Views the object through trait `I`.
    ///
    /// Succeeds when a cast to `I` was bound for this object's type, or when
    /// the stored value itself is an `Arc<I>`.
    ///
    /// ```rust
    /// use ferrous_boot::storage::{Cast, Object};
    /// use std::sync::Arc;
    ///
    /// trait Named: Send + Sync { fn name(&self) -> &str; }
    /// struct Db;
    /// impl Named for Db { fn name(&self) -> &str { "db" } }
    ///
    /// let mut object = Object::new(Db);
    /// assert!(object.cast::<dyn Named>().is_none());
    ///
    /// object.bind(Cast::new::<Db, dyn Named>(|db| db));
    /// assert_eq!(object.cast::<dyn Named>().unwrap().name(), "db");
    /// ```
    pub fn cast<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        let value = self.value.as_ref()?;
        if let Some(direct) = value.downcast_ref::<Arc<I>>() {
            return Some(direct.clone());
        }
        self.casts.iter().find_map(|cast| cast.apply::<I>(value))
    }

    /// Every `Arc<I>` this object contributes to a collection of `I`.
    fn collect_into<I: ?Sized + Send + Sync + 'static>(&self, out: &mut Vec<Arc<I>>) {
        let Some(value) = self.value.as_ref() else {
            return;
        };
        if let Some(list) = value.downcast_ref::<Vec<Arc<I>>>() {
            out.extend(list.iter().cloned());
            return;
        }
        if let Some(found) = self.cast::<I>() {
            out.push(found);
        }
    }

    /// Attaches a capability cast.
    pub fn bind(&mut self, cast: Cast) {
        if !self.casts.iter().any(|c| c.target == cast.target) {
            self.casts.push(cast);
        }
    }

    pub fn casts(&self) -> &[Cast] {
        &self.casts
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("address", &self.address)
            .field("type", &self.ty.name)
            .field("valid", &self.is_valid())
            .field("casts", &self.casts)
            .finish()
    }
}

#[derive(Default)]
struct Table {
    objects: Vec<Object>,
    index: HashMap<Address, usize>,
}

/// Address → object registry.
///
/// Reads take a shared lock, writes an exclusive one, so `Storage` can be
/// shared as `Arc<Storage>` with broker tasks after startup.
#[derive(Default)]
pub struct Storage {
    table: RwLock<Table>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object.
    ///
    /// - unknown address: inserted as given
    /// - placeholder over placeholder: no-op
    /// - value over placeholder: the placeholder is filled (casts are kept)
    /// - anything over a value: [`DiError::Redefined`]
    ///
    /// A different type at an existing address fails with
    /// [`DiError::AddressCollision`].
    pub fn set(&self, object: Object) -> DiResult<()> {
        let mut table = self.table.write();
        let found = table.index.get(&object.address).copied();
        let Some(slot) = found else {
            let slot = table.objects.len();
            table.index.insert(object.address.clone(), slot);
            table.objects.push(object);
            return Ok(());
        };

        let existing = &mut table.objects[slot];
        if existing.is_valid() {
            return Err(DiError::Redefined(object.address));
        }
        if existing.ty.id != object.ty.id {
            return Err(DiError::AddressCollision {
                address: object.address,
                existing: existing.ty.name,
                incoming: object.ty.name,
            });
        }
        if let Some(value) = object.value {
            existing.value = Some(value);
        }
        for cast in object.casts {
            existing.bind(cast);
        }
        Ok(())
    }

    /// Declares a placeholder for `address` unless it is already known.
    ///
    /// Known addresses are left untouched, built or not, but must carry the
    /// same type.
    pub fn declare(&self, address: &Address, ty: TypeInfo) -> DiResult<()> {
        let mut table = self.table.write();
        match table.index.get(address).copied() {
            Some(slot) => {
                let existing = &table.objects[slot];
                if existing.ty.id != ty.id {
                    return Err(DiError::AddressCollision {
                        address: address.clone(),
                        existing: existing.ty.name,
                        incoming: ty.name,
                    });
                }
                Ok(())
            }
            None => {
                let slot = table.objects.len();
                table.index.insert(address.clone(), slot);
                table.objects.push(Object::placeholder(address.clone(), ty));
                Ok(())
            }
        }
    }

    /// Returns a snapshot of the object at `address`.
    pub fn get(&self, address: &Address) -> DiResult<Object> {
        let table = self.table.read();
        table
            .index
            .get(address)
            .map(|&slot| table.objects[slot].clone())
            .ok_or_else(|| DiError::NotFound(address.clone()))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.table.read().index.contains_key(address)
    }

    /// Typed read of a built value.
    pub fn resolve<T: Send + Sync + 'static>(&self, address: &Address) -> DiResult<Arc<T>> {
        let table = self.table.read();
        let slot = *table
            .index
            .get(address)
            .ok_or_else(|| DiError::NotFound(address.clone()))?;
        let value = table.objects[slot]
            .value
            .clone()
            .ok_or_else(|| DiError::Unresolved(address.clone()))?;
        value.downcast::<T>().map_err(|_| DiError::TypeMismatch {
            address: address.clone(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Attaches a capability cast to `address`, declaring it if needed.
    ///
    /// Binding never touches the value, so casts can be added to objects that
    /// are already built (constants).
    pub fn bind(&self, address: &Address, ty: TypeInfo, cast: Cast) -> DiResult<()> {
        let mut table = self.table.write();
        let found = table.index.get(address).copied();
        let Some(slot) = found else {
            let mut object = Object::placeholder(address.clone(), ty);
            object.bind(cast);
            let slot = table.objects.len();
            table.index.insert(address.clone(), slot);
            table.objects.push(object);
            return Ok(());
        };
        let existing = &mut table.objects[slot];
        if existing.ty.id != ty.id {
            return Err(DiError::AddressCollision {
                address: address.clone(),
                existing: existing.ty.name,
                incoming: ty.name,
            });
        }
        existing.bind(cast);
        Ok(())
    }

    /// Collects every built object usable as `Arc<I>`.
    ///
    /// Includes objects with a bound cast to `I`, values that are themselves
    /// `Arc<I>`, and the elements of stored `Vec<Arc<I>>` values, flattened.
    pub fn collection<I: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<I>> {
        let table = self.table.read();
        let mut out = Vec::new();
        for object in &table.objects {
            object.collect_into(&mut out);
        }
        out
    }

    /// Calls `f` for every object holding a value, in declaration order.
    ///
    /// The table is snapshotted first so `f` may call back into storage.
    pub fn yield_objects<F: FnMut(&Object)>(&self, mut f: F) {
        let snapshot: Vec<Object> = {
            let table = self.table.read();
            table.objects.iter().filter(|o| o.is_valid()).cloned().collect()
        };
        for object in &snapshot {
            f(object);
        }
    }

    /// Addresses in declaration order.
    pub fn addresses(&self) -> Vec<Address> {
        self.table.read().objects.iter().map(|o| o.address.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send + Sync {
        fn sides(&self) -> u32;
    }

    struct Square;
    impl Shape for Square {
        fn sides(&self) -> u32 {
            4
        }
    }

    struct Triangle;
    impl Shape for Triangle {
        fn sides(&self) -> u32 {
            3
        }
    }

    #[test]
    fn test_placeholder_then_value_once() {
        let storage = Storage::new();
        let addr = Address::of::<u32>();
        storage.set(Object::placeholder(addr.clone(), TypeInfo::of::<u32>())).unwrap();
        storage.set(Object::placeholder(addr.clone(), TypeInfo::of::<u32>())).unwrap();
        assert!(matches!(storage.resolve::<u32>(&addr), Err(DiError::Unresolved(_))));

        storage.set(Object::new(7u32)).unwrap();
        assert_eq!(*storage.resolve::<u32>(&addr).unwrap(), 7);

        match storage.set(Object::new(8u32)) {
            Err(DiError::Redefined(a)) => assert_eq!(a, addr),
            other => panic!("expected Redefined, got {:?}", other),
        }
        match storage.set(Object::placeholder(addr.clone(), TypeInfo::of::<u32>())) {
            Err(DiError::Redefined(_)) => {}
            other => panic!("expected Redefined, got {:?}", other),
        }
    }

    #[test]
    fn test_declare_keeps_built_values() {
        let storage = Storage::new();
        storage.set(Object::new(5u32)).unwrap();
        storage.declare(&Address::of::<u32>(), TypeInfo::of::<u32>()).unwrap();
        assert_eq!(*storage.resolve::<u32>(&Address::of::<u32>()).unwrap(), 5);

        let err = storage
            .declare(&Address::of::<u32>(), TypeInfo::of::<i32>())
            .unwrap_err();
        assert!(matches!(err, DiError::AddressCollision { .. }));
    }

    #[test]
    fn test_get_unknown_address() {
        let storage = Storage::new();
        let err = storage.get(&Address::of::<String>()).unwrap_err();
        assert!(matches!(err, DiError::NotFound(_)));
    }

    #[test]
    fn test_type_mismatch_and_collision() {
        let storage = Storage::new();
        storage.set(Object::new(1u8)).unwrap();
        let err = storage.resolve::<u16>(&Address::of::<u8>()).unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch { .. }));

        let addr = Address::of::<u64>();
        storage.set(Object::placeholder(addr.clone(), TypeInfo::of::<u64>())).unwrap();
        let err = storage
            .set(Object::with_value(addr, TypeInfo::of::<i64>(), Arc::new(1i64)))
            .unwrap_err();
        assert!(matches!(err, DiError::AddressCollision { .. }));
    }

    #[test]
    fn test_collection_flattens_casts_and_lists() {
        let storage = Storage::new();
        let square = Address::of::<Square>();
        storage
            .bind(&square, TypeInfo::of::<Square>(), Cast::new::<Square, dyn Shape>(|s| s))
            .unwrap();
        storage.set(Object::new(Square)).unwrap();
        let listed: Vec<Arc<dyn Shape>> = vec![Arc::new(Triangle), Arc::new(Triangle)];
        storage.set(Object::new(listed)).unwrap();
        let direct: Arc<dyn Shape> = Arc::new(Square);
        storage.set(Object::new(direct)).unwrap();

        let shapes = storage.collection::<dyn Shape>();
        assert_eq!(shapes.len(), 4);
        let total: u32 = shapes.iter().map(|s| s.sides()).sum();
        assert_eq!(total, 4 + 3 + 3 + 4);
    }

    #[test]
    fn test_yield_skips_placeholders() {
        let storage = Storage::new();
        storage.set(Object::new(1u8)).unwrap();
        storage
            .set(Object::placeholder(Address::of::<u16>(), TypeInfo::of::<u16>()))
            .unwrap();
        storage.set(Object::new("x".to_string())).unwrap();

        let mut seen = Vec::new();
        storage.yield_objects(|o| seen.push(o.address().clone()));
        assert_eq!(seen, vec![Address::of::<u8>(), Address::of::<String>()]);
        assert_eq!(storage.len(), 3);
    }
}
