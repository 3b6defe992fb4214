//! Producer descriptors for introspection and diagnostics.

use crate::address::Address;

/// How a producer yields its objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducerKind {
    /// A value stored as-is at registration.
    Constant,
    /// A function called once at start, publishing its outputs.
    Function,
    /// A struct assembled from injected fields.
    Component,
}

impl std::fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProducerKind::Constant => "constant",
            ProducerKind::Function => "function",
            ProducerKind::Component => "component",
        };
        f.write_str(name)
    }
}

/// Producer descriptor for introspection and diagnostics
///
/// Contains metadata about a registered producer that can be used for
/// debugging, validation and documentation of the container configuration.
///
/// # Use Cases
///
/// - **Debugging**: Inspect what was registered and what it depends on
/// - **Validation**: Check that every dependency has a producer before `start`
/// - **Documentation**: Render the dependency graph (see `Container::graph_dot`)
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{Address, Container, Dep, Provider, ProducerKind};
///
/// let mut container = Container::new();
/// container.register(Provider::value(10i32)).unwrap();
/// container.register(Provider::func(|n: Dep<i32>| n.to_string())).unwrap();
///
/// let descriptors = container.descriptors();
/// assert_eq!(descriptors.len(), 2);
///
/// let constant = &descriptors[0];
/// assert_eq!(constant.kind, ProducerKind::Constant);
/// assert_eq!(constant.address, Address::of::<i32>());
///
/// let func = &descriptors[1];
/// assert_eq!(func.kind, ProducerKind::Function);
/// assert_eq!(func.inputs, vec![Address::of::<i32>()]);
/// assert_eq!(func.outputs, vec![Address::of::<String>()]);
/// assert!(func.depends_on(&Address::of::<i32>()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerDescriptor {
    /// Graph node of the producer itself
    pub address: Address,
    pub kind: ProducerKind,
    /// Parameter addresses, in parameter order
    pub inputs: Vec<Address>,
    /// Published addresses (error outputs excluded)
    pub outputs: Vec<Address>,
    /// Trait objects the outputs were declared to implement
    pub implements: Vec<&'static str>,
    /// Whether start stops at this producer
    pub break_point: bool,
}

impl ProducerDescriptor {
    pub fn depends_on(&self, address: &Address) -> bool {
        self.inputs.contains(address)
    }

    pub fn produces(&self, address: &Address) -> bool {
        self.outputs.contains(address)
    }
}
