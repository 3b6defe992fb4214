use ferrous_boot::{All, Component, Container, Context, Dep, Provider, Registration};
use std::sync::Arc;

trait Handler: Send + Sync {
    fn route(&self) -> &'static str;
}

struct Users;
impl Handler for Users {
    fn route(&self) -> &'static str {
        "/users"
    }
}

struct Orders;
impl Handler for Orders {
    fn route(&self) -> &'static str {
        "/orders"
    }
}

struct Health;
impl Handler for Health {
    fn route(&self) -> &'static str {
        "/health"
    }
}

struct Router {
    routes: Vec<&'static str>,
}

#[tokio::test]
async fn test_consumer_receives_every_implementer() {
    let mut container = Container::new();
    // Consumer first: implementers still have to be built before it.
    container
        .register(Provider::func(|handlers: All<dyn Handler>| Router {
            routes: handlers.iter().map(|h| h.route()).collect(),
        }))
        .unwrap()
        .register(Provider::func(|| Users).implements::<dyn Handler>(|h| h))
        .unwrap()
        .register(Provider::func(|| Orders).implements::<dyn Handler>(|h| h))
        .unwrap();

    container.start(&Context::new()).await.unwrap();

    let router = container.get::<Router>().unwrap();
    assert_eq!(router.routes.len(), 2);
    assert!(router.routes.contains(&"/users"));
    assert!(router.routes.contains(&"/orders"));
}

#[tokio::test]
async fn test_empty_collection() {
    let mut container = Container::new();
    container
        .register(Provider::func(|handlers: All<dyn Handler>| handlers.len()))
        .unwrap();
    container.start(&Context::new()).await.unwrap();
    assert_eq!(*container.get::<usize>().unwrap(), 0);
}

#[tokio::test]
async fn test_trait_object_values_join_the_collection() {
    let mut container = Container::new();
    container
        .register(Provider::func(|handlers: All<dyn Handler>| Router {
            routes: handlers.iter().map(|h| h.route()).collect(),
        }))
        .unwrap()
        .register(Provider::func(|| -> Vec<Arc<dyn Handler>> {
            vec![Arc::new(Users), Arc::new(Orders)]
        }))
        .unwrap()
        .register(Provider::func(|| -> Arc<dyn Handler> { Arc::new(Health) }))
        .unwrap();

    container.start(&Context::new()).await.unwrap();
    let mut routes = container.get::<Router>().unwrap().routes.clone();
    routes.sort_unstable();
    assert_eq!(routes, vec!["/health", "/orders", "/users"]);
}

#[tokio::test]
async fn test_component_with_collection_field() {
    struct Prefix(&'static str);

    struct Server {
        prefix: Dep<Prefix>,
        handlers: All<dyn Handler>,
    }

    impl Component for Server {
        type Fields = (Dep<Prefix>, All<dyn Handler>);

        fn assemble((prefix, handlers): Self::Fields) -> Self {
            Server { prefix, handlers }
        }
    }

    let handlers: Registration = Provider::func(|| Health).into();
    let mut container = Container::new();
    container
        .register(Provider::component::<Server>())
        .unwrap()
        .register(Provider::value(Prefix("/api")))
        .unwrap()
        .register(handlers.bind::<Health, dyn Handler>(|h| h))
        .unwrap();

    container.start(&Context::new()).await.unwrap();
    let paths = container
        .invoke(|server: Dep<Server>| {
            server
                .handlers
                .iter()
                .map(|h| format!("{}{}", server.prefix.0, h.route()))
                .collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(paths, vec!["/api/health".to_string()]);
}
