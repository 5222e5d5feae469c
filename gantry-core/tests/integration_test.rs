// End-to-end test: a small application with two modules, DI-constructed
// controllers, an access pipe, a global error-translating pipe, middleware
// ordering and a catch-all route, resolved and driven through a
// recording adapter.

mod common;

use async_trait::async_trait;
use common::RecordingAdapter;
use gantry_core::{
    action, middleware, Application, ControllerDef, ControllerOptions, ControllerSpec, Error,
    HttpContext, HttpModule, HttpRequest, MetadataStore, ModuleDefinition, Next, ParamSpec,
    PipeHandle, PipeRef, ProcessPipe, Provider, ProviderRegistration, RouteSpec, APP_VERSION,
    GLOBAL_PIPE,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

// --- services ---------------------------------------------------------

struct MessagesService;

impl MessagesService {
    fn get_messages(&self) -> Vec<&'static str> {
        vec!["hello", "world"]
    }
}

impl Provider for MessagesService {}

// --- pipes ------------------------------------------------------------

/// Rejects requests without the expected bearer token
struct AccessPipe;

#[async_trait]
impl ProcessPipe for AccessPipe {
    async fn run(&self, ctx: &HttpContext, handle: PipeHandle) -> Result<Option<Value>, Error> {
        let token = ctx
            .request()
            .header("authorization")
            .and_then(|header| header.split(' ').nth(1));

        if token == Some("very-secure-token") {
            handle().await
        } else {
            Err(Error::Unauthorized("unauthorized".into()))
        }
    }
}

/// Application-wide pipe translating errors into JSON payloads
struct ServerPipe;

#[async_trait]
impl ProcessPipe for ServerPipe {
    async fn run(&self, _ctx: &HttpContext, handle: PipeHandle) -> Result<Option<Value>, Error> {
        match handle().await {
            Ok(value) => Ok(value),
            Err(err) => Ok(Some(json!({
                "error": err.to_string(),
                "status": err.status_code(),
            }))),
        }
    }
}

// --- controllers ------------------------------------------------------

struct MessagesController {
    service: Arc<MessagesService>,
}

struct MiscController;

// --- module wiring ----------------------------------------------------

struct MessagesModule;
struct MiscModule;
struct AppModule;

fn register_messages_module(store: &MetadataStore) {
    store.register_controller::<MessagesController>(ControllerSpec::new().url("messages"));
    store.register_pipe::<MessagesController>(PipeRef::new::<AccessPipe, _>(|_c| Ok(AccessPipe)));
    store.register_route::<MessagesController>(
        RouteSpec::new(
            "messages",
            action::<MessagesController, _, _>(|controller, _args| async move {
                Ok(Some(json!(controller.service.get_messages())))
            }),
        )
        .get("/"),
    );

    store.register_module::<MessagesModule>(
        ModuleDefinition::new("MessagesModule")
            .controller(ControllerDef::new(|container| {
                Ok(MessagesController {
                    service: container.resolve::<MessagesService>()?,
                })
            }))
            .provider(ProviderRegistration::class(|_c| MessagesService)),
    );
}

fn register_misc_module(store: &MetadataStore) {
    store.register_controller::<MiscController>(
        ControllerSpec::new().options(ControllerOptions {
            ignore_version: true,
        }),
    );

    store.register_route::<MiscController>(
        RouteSpec::new(
            "auth",
            action::<MiscController, _, _>(|_controller, mut args| async move {
                let creds = args.remove(0).into_value().unwrap_or(Value::Null);
                if creds["login"] == "user" && creds["password"] == "password" {
                    Ok(Some(json!({ "token": "very-secure-token" })))
                } else {
                    Err(Error::Unauthorized("unauthorized".into()))
                }
            }),
        )
        .post("login"),
    );
    store.register_param::<MiscController>("auth", ParamSpec::body(0));

    store.register_route::<MiscController>(
        RouteSpec::new(
            "index",
            action::<MiscController, _, _>(|_controller, _args| async move { Ok(None) }),
        )
        .get("/"),
    );
    store.register_render_template::<MiscController>("index", "app.html");

    store.register_route::<MiscController>(
        RouteSpec::new(
            "status404",
            action::<MiscController, _, _>(|_controller, _args| async move {
                Ok(Some(json!("not-found")))
            }),
        )
        .get("*")
        .status(404),
    );

    store.register_module::<MiscModule>(
        ModuleDefinition::new("MiscModule")
            .controller(ControllerDef::new(|_c| Ok(MiscController))),
    );
}

fn build_app(store: Arc<MetadataStore>) -> Application {
    register_messages_module(&store);
    register_misc_module(&store);

    store.register_module::<AppModule>(
        ModuleDefinition::new("AppModule")
            .import::<MessagesModule>()
            .import::<MiscModule>()
            .provider(ProviderRegistration::value(APP_VERSION, "v1".to_string()))
            .provider(ProviderRegistration::multi(
                GLOBAL_PIPE,
                Arc::new(ServerPipe) as Arc<dyn ProcessPipe>,
            )),
    );

    Application::with_store::<AppModule>(store).unwrap()
}

async fn resolved_adapter() -> Arc<RecordingAdapter> {
    let app = build_app(Arc::new(MetadataStore::new()));
    let adapter = RecordingAdapter::new();
    HttpModule::create(&app, adapter.clone())
        .resolve()
        .await
        .unwrap();
    adapter
}

// --- tests ------------------------------------------------------------

#[tokio::test]
async fn test_authorized_request_reaches_controller() {
    let adapter = resolved_adapter().await;

    let mut request = HttpRequest::new("GET", "/v1/messages");
    request
        .headers
        .insert("authorization".into(), "Bearer very-secure-token".into());

    let outcome = adapter.dispatch(request).await;
    assert!(outcome.error.is_none());
    assert_eq!(outcome.body_json(), json!(["hello", "world"]));
}

#[tokio::test]
async fn test_unauthorized_request_is_translated_by_global_pipe() {
    let adapter = resolved_adapter().await;

    let outcome = adapter.get("/v1/messages").await;
    // The global server pipe turned the rejection into a payload
    assert!(outcome.error.is_none());
    let body = outcome.body_json();
    assert_eq!(body["status"], 401);
    assert!(body["error"].as_str().unwrap().contains("unauthorized"));
}

#[tokio::test]
async fn test_login_round_trip() {
    let adapter = resolved_adapter().await;

    let good = adapter
        .post("/login", json!({ "login": "user", "password": "password" }))
        .await;
    assert_eq!(good.body_json(), json!({ "token": "very-secure-token" }));

    let bad = adapter
        .post("/login", json!({ "login": "user", "password": "wrong" }))
        .await;
    assert_eq!(bad.body_json()["status"], 401);
}

#[tokio::test]
async fn test_catch_all_route_serves_unmatched_paths_with_status() {
    let adapter = resolved_adapter().await;

    let outcome = adapter.get("/v1/definitely/not/here").await;
    assert_eq!(outcome.response.status(), Some(404));
    assert_eq!(outcome.body_text(), "not-found");
}

#[tokio::test]
async fn test_exact_routes_win_over_catch_all() {
    let adapter = resolved_adapter().await;

    // `/login` matches both the exact route and `/*`; the exact route was
    // registered first
    let outcome = adapter
        .post("/login", json!({ "login": "user", "password": "password" }))
        .await;
    assert_eq!(outcome.body_json()["token"], "very-secure-token");
}

#[tokio::test]
async fn test_template_route_renders() {
    let adapter = resolved_adapter().await;

    let outcome = adapter.get("/").await;
    assert_eq!(outcome.body_text(), "<rendered:app.html>");
}

#[tokio::test]
async fn test_class_middleware_runs_before_method_middleware() {
    struct OrderedController;
    struct OrderedModule;

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let tag = |label: &'static str, order: Arc<Mutex<Vec<&'static str>>>| {
        middleware(move |ctx: HttpContext, next: Next| {
            let order = order.clone();
            async move {
                order.lock().unwrap().push(label);
                next(ctx).await
            }
        })
    };

    let store = Arc::new(MetadataStore::new());
    store.register_controller::<OrderedController>(
        ControllerSpec::new()
            .url("ordered")
            .middleware(vec![tag("class", order.clone())]),
    );
    // Attached last, runs first within the method bucket
    store.attach_middleware::<OrderedController>("index", tag("method-early", order.clone()));
    store.attach_middleware::<OrderedController>("index", tag("method-late", order.clone()));

    let handler_order = order.clone();
    store.register_route::<OrderedController>(
        RouteSpec::new(
            "index",
            action::<OrderedController, _, _>(move |_c, _a| {
                let order = handler_order.clone();
                async move {
                    order.lock().unwrap().push("handler");
                    Ok(None)
                }
            }),
        )
        .get("/"),
    );
    store.register_module::<OrderedModule>(
        ModuleDefinition::new("OrderedModule")
            .controller(ControllerDef::new(|_c| Ok(OrderedController))),
    );

    let app = Application::with_store::<OrderedModule>(store).unwrap();
    let adapter = RecordingAdapter::new();
    HttpModule::create(&app, adapter.clone())
        .resolve()
        .await
        .unwrap();

    adapter.get("/ordered").await;

    assert_eq!(
        *order.lock().unwrap(),
        vec!["class", "method-late", "method-early", "handler"]
    );
}

#[tokio::test]
async fn test_middleware_short_circuit_sends_single_response() {
    struct GatedController;
    struct GatedModule;

    let store = Arc::new(MetadataStore::new());
    store.register_controller::<GatedController>(ControllerSpec::new().url("gated"));
    store.attach_middleware::<GatedController>(
        "index",
        middleware(|ctx: HttpContext, _next: Next| async move {
            ctx.response().send_text("ACCESS DENIED");
            Ok(())
        }),
    );
    store.register_route::<GatedController>(
        RouteSpec::new(
            "index",
            action::<GatedController, _, _>(|_c, _a| async move { Ok(Some(json!("secret"))) }),
        )
        .get("/"),
    );
    store.register_module::<GatedModule>(
        ModuleDefinition::new("GatedModule")
            .controller(ControllerDef::new(|_c| Ok(GatedController))),
    );

    let app = Application::with_store::<GatedModule>(store).unwrap();
    let adapter = RecordingAdapter::new();
    HttpModule::create(&app, adapter.clone())
        .resolve()
        .await
        .unwrap();

    let outcome = adapter.get("/gated").await;
    assert_eq!(outcome.body_text(), "ACCESS DENIED");
    // The controller never ran, and only one transmission happened
    assert_eq!(outcome.response.send_count(), 1);
}

#[tokio::test]
async fn test_controller_instance_is_cached_per_scope() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountedController;
    struct CountedModule;

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    let store = Arc::new(MetadataStore::new());
    store.register_controller::<CountedController>(ControllerSpec::new().url("counted"));
    store.register_route::<CountedController>(
        RouteSpec::new(
            "one",
            action::<CountedController, _, _>(|_c, _a| async move { Ok(None) }),
        )
        .get("one"),
    );
    store.register_route::<CountedController>(
        RouteSpec::new(
            "two",
            action::<CountedController, _, _>(|_c, _a| async move { Ok(None) }),
        )
        .get("two"),
    );
    store.register_module::<CountedModule>(
        ModuleDefinition::new("CountedModule").controller(ControllerDef::new(|_c| {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(CountedController)
        })),
    );

    let app = Application::with_store::<CountedModule>(store).unwrap();
    let adapter = RecordingAdapter::new();
    HttpModule::create(&app, adapter.clone())
        .resolve()
        .await
        .unwrap();

    // Two routes, one lazily constructed controller instance
    assert_eq!(adapter.installed().len(), 2);
    assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
}
