use ferrous_boot::{
    Address, All, BoxError, Component, Container, Dep, ProducerKind, Provider,
};

trait Plugin: Send + Sync {}

struct Audit;
impl Plugin for Audit {}

struct Settings;

struct Host {
    _settings: Dep<Settings>,
    _plugins: All<dyn Plugin>,
}

impl Component for Host {
    type Fields = (Dep<Settings>, All<dyn Plugin>);

    fn assemble((settings, plugins): Self::Fields) -> Self {
        Host { _settings: settings, _plugins: plugins }
    }
}

fn load(_s: Dep<Settings>) -> Result<u32, BoxError> {
    Ok(1)
}

#[test]
fn test_descriptors_follow_registration_order() {
    let mut container = Container::new();
    container
        .register(Provider::value(Settings))
        .unwrap()
        .register(Provider::try_func(load))
        .unwrap()
        .register(Provider::func(|| Audit).implements::<dyn Plugin>(|p| p))
        .unwrap()
        .register(Provider::component::<Host>())
        .unwrap();

    let descriptors = container.descriptors();
    let kinds: Vec<_> = descriptors.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ProducerKind::Constant,
            ProducerKind::Function,
            ProducerKind::Function,
            ProducerKind::Component,
        ]
    );

    let constant = &descriptors[0];
    assert_eq!(constant.address, Address::of::<Settings>());
    assert!(constant.inputs.is_empty());
    assert!(constant.produces(&Address::of::<Settings>()));
}

#[test]
fn test_fallible_function_descriptor() {
    let mut container = Container::new();
    container.register(Provider::try_func(load)).unwrap();

    let descriptor = &container.descriptors()[0];
    assert!(descriptor.address.is_function());
    assert!(descriptor.address.as_str().ends_with("(unit_descriptors.Settings) (u32, error)"));
    assert!(descriptor.depends_on(&Address::of::<Settings>()));
    assert_eq!(descriptor.outputs, vec![Address::of::<u32>()]);
    assert!(!descriptor.produces(&Address::error()));
    assert!(!descriptor.break_point);
}

#[test]
fn test_component_and_implements_descriptors() {
    let mut container = Container::new();
    container
        .register(Provider::func(|| Audit).implements::<dyn Plugin>(|p| p))
        .unwrap()
        .register(Provider::component::<Host>())
        .unwrap();

    let descriptors = container.descriptors();
    assert_eq!(descriptors[0].implements.len(), 1);
    assert!(descriptors[0].implements[0].contains("Plugin"));

    let host = &descriptors[1];
    assert_eq!(host.address, Address::of::<Host>());
    assert_eq!(
        host.inputs,
        vec![Address::of::<Settings>(), Address::collection_of::<dyn Plugin>()]
    );
}

#[test]
fn test_break_point_flag() {
    fn stage(_s: Dep<Settings>) -> u8 {
        0
    }

    let mut container = Container::new();
    container.register(Provider::func(stage)).unwrap();
    container.break_point(&stage).unwrap();
    assert!(container.descriptors()[0].break_point);
}

#[test]
fn test_kind_display() {
    assert_eq!(ProducerKind::Constant.to_string(), "constant");
    assert_eq!(ProducerKind::Function.to_string(), "function");
    assert_eq!(ProducerKind::Component.to_string(), "component");
}
