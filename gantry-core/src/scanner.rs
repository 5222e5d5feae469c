// Metadata scanner: flattens module → controller → method metadata into
// the route entries the resolver schedules.

use crate::metadata::{keys, MetadataTarget, MethodAction, ParamMetadata};
use crate::middleware::Middleware;
use crate::module::{ControllerDef, ModuleRef};
use crate::pipe::PipeRef;
use crate::reflector::Reflector;

/// Resolution-time route unit: one (verb, url) pair joined with its owning
/// controller, owning module, parameters, pipes and middleware
#[derive(Clone)]
pub struct RouteMetadata {
    pub module: ModuleRef,
    pub controller: ControllerDef,
    pub method_name: &'static str,
    pub verb: String,
    pub url: String,
    pub status: Option<u16>,
    pub params: Vec<ParamMetadata>,
    pub pipes: Vec<PipeRef>,
    /// Class-level middleware first, then the method bucket
    pub middleware: Vec<Middleware>,
    pub action: MethodAction,
}

impl std::fmt::Debug for RouteMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMetadata")
            .field("module", &self.module.type_name)
            .field("controller", &self.controller.type_name)
            .field("method_name", &self.method_name)
            .field("verb", &self.verb)
            .field("url", &self.url)
            .field("status", &self.status)
            .finish()
    }
}

/// Reads every registered module and produces the flat route list
#[derive(Clone, Default)]
pub struct MetadataScanner {
    reflector: Reflector,
}

impl MetadataScanner {
    pub fn new(reflector: Reflector) -> Self {
        Self { reflector }
    }

    /// Flatten all modules into route metadata. `version` prefixes every
    /// url except for controllers that opt out.
    pub fn scan(&self, modules: &[ModuleRef], version: Option<&str>) -> Vec<RouteMetadata> {
        let mut routes = Vec::new();

        for module in modules {
            let Some(definition) = self.reflector.module_metadata_by_id(module.type_id) else {
                continue;
            };

            for controller in &definition.controllers {
                let view = self.reflector.controller_metadata_by_id(controller.type_id);
                let middleware_map = self.reflector.middleware_metadata_by_id(controller.type_id);

                for method in &view.methods {
                    let params = self
                        .reflector
                        .params_metadata_by_id(controller.type_id, method.method_name);

                    let pipes: Vec<PipeRef> = view
                        .pipes
                        .iter()
                        .filter(|pipe| pipe.applies_to(method.method_name))
                        .cloned()
                        .collect();

                    // Class-level middleware runs before the method bucket
                    let mut middleware = view.middleware.clone();
                    if let Some(bucket) = middleware_map.get(method.method_name) {
                        middleware.extend(bucket.iter().cloned());
                    }

                    routes.push(RouteMetadata {
                        module: *module,
                        controller: controller.clone(),
                        method_name: method.method_name,
                        verb: method.verb.clone(),
                        url: build_url(
                            version,
                            view.options.ignore_version,
                            &view.url,
                            &method.url,
                        ),
                        status: method.status,
                        params,
                        pipes,
                        middleware,
                        action: method.action.clone(),
                    });
                }
            }
        }

        routes
    }

    /// Response template declared for a method, if any
    pub fn method_template(
        &self,
        controller: std::any::TypeId,
        method_name: &'static str,
    ) -> Option<String> {
        self.reflector.get_metadata::<String>(
            keys::METHOD_TEMPLATE_METADATA,
            MetadataTarget::method_id(controller, method_name),
        )
    }
}

/// Join version prefix, controller mount path and method url into one
/// normalized path with a leading slash
fn build_url(version: Option<&str>, ignore_version: bool, base: &str, url: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(version) = version {
        if !ignore_version {
            parts.push(version);
        }
    }
    parts.push(base);
    parts.push(url);

    let joined: Vec<&str> = parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect();

    format!("/{}", joined.join("/"))
}
