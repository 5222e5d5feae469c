//! Derives an OpenAPI document from the controller metadata registry.
//!
//! This is a pure metadata consumer: it reads the same controller, method
//! and parameter records the route resolver reads, and never influences
//! route resolution.

use crate::builder::OpenApiBuilder;
use crate::spec::{MediaType, Operation, Parameter, RequestBody, ResponseSpec, Schema};
use gantry_core::{
    Application, HttpMethod, HttpStatus, MetadataScanner, MetadataStore, MetadataTarget,
    ParameterKind, APP_VERSION,
};
use std::collections::BTreeMap;

/// Storage key for per-method API documentation
pub const API_OPERATION_METADATA: &str = "__openapi__:operation";

/// Documentation attached to one controller method
#[derive(Clone, Debug, Default)]
pub struct ApiOperationMeta {
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Extra documented responses as (status, description)
    pub responses: Vec<(u16, String)>,
}

impl ApiOperationMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn response(mut self, status: u16, description: impl Into<String>) -> Self {
        self.responses.push((status, description.into()));
        self
    }
}

/// Attach API documentation to a controller method (process-wide store)
pub fn register_api_operation<C: 'static>(method_name: &'static str, meta: ApiOperationMeta) {
    register_api_operation_in::<C>(&MetadataStore::global(), method_name, meta);
}

/// Attach API documentation against an explicit store
pub fn register_api_operation_in<C: 'static>(
    store: &MetadataStore,
    method_name: &'static str,
    meta: ApiOperationMeta,
) {
    let slot = store.get_or_init::<ApiOperationMeta>(
        MetadataTarget::method::<C>(method_name),
        API_OPERATION_METADATA,
    );
    *slot.write().unwrap() = meta;
}

/// Build an OpenAPI document for a bootstrapped application.
///
/// Wildcard routes have no OpenAPI rendition and are skipped; everything
/// else maps one route to one operation.
pub fn document_from(app: &Application, builder: OpenApiBuilder) -> crate::spec::OpenApiSpec {
    let version = app
        .container()
        .resolve_token::<String>(APP_VERSION)
        .ok()
        .map(|v| (*v).clone());

    let scanner = MetadataScanner::new(app.reflector().clone());
    let routes = scanner.scan(app.modules(), version.as_deref());

    let mut builder = builder;

    for route in routes {
        if HttpMethod::from_str(&route.verb).is_none() || route.url.contains('*') {
            continue;
        }

        let mut operation = Operation {
            operation_id: Some(route.method_name.to_string()),
            ..Operation::default()
        };

        let documented = app.reflector().get_metadata::<ApiOperationMeta>(
            API_OPERATION_METADATA,
            MetadataTarget::method_id(route.controller.type_id, route.method_name),
        );
        if let Some(meta) = documented {
            operation.summary = meta.summary;
            operation.description = meta.description;
            for (status, description) in meta.responses {
                operation
                    .responses
                    .insert(status.to_string(), ResponseSpec { description });
            }
        }

        for param in &route.params {
            match param.param_type {
                Some(
                    kind @ (ParameterKind::Path
                    | ParameterKind::Query
                    | ParameterKind::Header
                    | ParameterKind::Cookie),
                ) => {
                    // Whole-namespace extractions have no single name to
                    // document
                    if let Some(name) = &param.param_name {
                        operation.parameters.push(Parameter {
                            name: name.clone(),
                            location: kind.as_str().to_string(),
                            required: kind == ParameterKind::Path,
                            schema: Some(Schema::string()),
                        });
                    }
                }
                Some(ParameterKind::Body) => {
                    let mut content = BTreeMap::new();
                    content.insert(
                        "application/json".to_string(),
                        MediaType {
                            schema: Some(Schema::object()),
                        },
                    );
                    operation.request_body = Some(RequestBody {
                        description: None,
                        required: true,
                        content,
                    });
                }
                _ => {}
            }
        }

        let status = route.status.unwrap_or(200);
        operation
            .responses
            .entry(status.to_string())
            .or_insert_with(|| ResponseSpec {
                description: HttpStatus::from_code(status)
                    .map(|s| s.reason().to_string())
                    .unwrap_or_else(|| "Response".to_string()),
            });

        builder = builder.operation(brace_path(&route.url), &route.verb, operation);
    }

    builder.build()
}

/// Convert `:name` path segments into OpenAPI `{name}` templates
fn brace_path(url: &str) -> String {
    url.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{
        action, ControllerDef, ControllerSpec, ModuleDefinition, ParamSpec, RouteSpec,
    };
    use std::sync::Arc;

    #[test]
    fn test_brace_path() {
        assert_eq!(brace_path("/users/:id"), "/users/{id}");
        assert_eq!(brace_path("/plain"), "/plain");
    }

    #[test]
    fn test_document_from_application() {
        struct MessagesModule;
        struct MessagesController;

        let store = Arc::new(MetadataStore::new());
        store.register_controller::<MessagesController>(ControllerSpec::new().url("messages"));
        store.register_route::<MessagesController>(
            RouteSpec::new(
                "show",
                action::<MessagesController, _, _>(|_c, _a| async move { Ok(None) }),
            )
            .get(":id"),
        );
        store.register_param::<MessagesController>("show", ParamSpec::params(0).named("id"));
        store.register_route::<MessagesController>(
            RouteSpec::new(
                "create",
                action::<MessagesController, _, _>(|_c, _a| async move { Ok(None) }),
            )
            .post("/")
            .status(201),
        );
        store.register_param::<MessagesController>("create", ParamSpec::body(0));
        store.register_module::<MessagesModule>(
            ModuleDefinition::new("MessagesModule")
                .controller(ControllerDef::new(|_c| Ok(MessagesController))),
        );
        register_api_operation_in::<MessagesController>(
            &store,
            "create",
            ApiOperationMeta::new().summary("Create a message"),
        );

        let app = Application::with_store::<MessagesModule>(store).unwrap();
        let spec = document_from(&app, OpenApiBuilder::new("Messages API", "1.0.0"));

        let show = spec.paths.get("/messages/{id}").unwrap().get.as_ref().unwrap();
        assert_eq!(show.operation_id.as_deref(), Some("show"));
        assert_eq!(show.parameters[0].name, "id");
        assert_eq!(show.parameters[0].location, "path");

        let create = spec.paths.get("/messages").unwrap().post.as_ref().unwrap();
        assert_eq!(create.summary.as_deref(), Some("Create a message"));
        assert!(create.request_body.is_some());
        assert!(create.responses.contains_key("201"));
    }
}
