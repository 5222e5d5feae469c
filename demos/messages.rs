// Minimal runnable application: one module, one DI-constructed controller,
// served over the hyper adapter.
//
//     cargo run --bin messages-demo
//     curl http://localhost:3000/v1/messages
//     curl http://localhost:3000/v1/messages/1

use gantry::logging::{info, LogConfig, LogFormat, LogLevel};
use gantry::{
    action, register_controller, register_module, register_param, register_route, Application,
    ControllerDef, ControllerSpec, Error, HttpModule, HyperAdapter, ModuleDefinition, ParamSpec,
    Provider, ProviderRegistration, RouteSpec, APP_VERSION,
};
use serde_json::json;
use std::sync::Arc;

struct MessagesService {
    messages: Vec<&'static str>,
}

impl MessagesService {
    fn all(&self) -> &[&'static str] {
        &self.messages
    }

    fn find(&self, index: usize) -> Option<&'static str> {
        self.messages.get(index).copied()
    }
}

impl Provider for MessagesService {}

struct MessagesController {
    service: Arc<MessagesService>,
}

struct AppModule;

fn register() {
    register_controller::<MessagesController>(ControllerSpec::new().url("messages"));

    register_route::<MessagesController>(
        RouteSpec::new(
            "list",
            action::<MessagesController, _, _>(|controller, _args| async move {
                Ok(Some(json!(controller.service.all())))
            }),
        )
        .get("/"),
    );

    register_route::<MessagesController>(
        RouteSpec::new(
            "show",
            action::<MessagesController, _, _>(|controller, mut args| async move {
                let id = args
                    .remove(0)
                    .into_value()
                    .and_then(|v| v.as_str().and_then(|s| s.parse::<usize>().ok()))
                    .ok_or_else(|| Error::BadRequest("id must be a number".into()))?;

                match controller.service.find(id) {
                    Some(message) => Ok(Some(json!({ "id": id, "message": message }))),
                    None => Err(Error::NotFound(format!("no message {id}"))),
                }
            }),
        )
        .get(":id"),
    );
    register_param::<MessagesController>("show", ParamSpec::params(0).named("id"));

    register_module::<AppModule>(
        ModuleDefinition::new("AppModule")
            .controller(ControllerDef::new(|container| {
                Ok(MessagesController {
                    service: container.resolve::<MessagesService>()?,
                })
            }))
            .provider(ProviderRegistration::class(|_c| MessagesService {
                messages: vec!["hello", "world"],
            }))
            .provider(ProviderRegistration::value(APP_VERSION, "v1".to_string())),
    );
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _guard = LogConfig::new()
        .level(LogLevel::Debug)
        .format(LogFormat::Pretty)
        .init();

    register();

    let app = Application::create::<AppModule>()?;
    let adapter = Arc::new(HyperAdapter::new());
    let http = HttpModule::create(&app, adapter.clone());

    let closer = adapter.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            use gantry::HttpApplicationAdapter;
            closer.close().await;
        }
    });

    info!("Serving on http://localhost:3000");
    http.listen(3000).await
}
