// Route resolver: the orchestration engine turning accumulated metadata
// into the final route table.
//
// Registration order is the match order of the underlying router, so the
// resolver installs every exact route before any wildcard route, and
// wildcard routes most-specific-first. The whole table is handed to the
// adapter in a single call; a resolution failure for any route fails the
// entire resolve with no partial installation.

use crate::adapter::{AdapterRoute, HttpApplicationAdapter, RouteFn};
use crate::application::APP_VERSION;
use crate::conflict::PathConflictDetector;
use crate::container::ContainerManager;
use crate::logging::{debug, info};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::module::ModuleRef;
use crate::pipe::{ProcessPipe, GLOBAL_PIPE};
use crate::reflector::Reflector;
use crate::route_handler::RouteHandler;
use crate::scanner::{MetadataScanner, RouteMetadata};
use crate::{Error, HttpMethod};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

pub struct RouteResolver {
    adapter: Arc<dyn HttpApplicationAdapter>,
    containers: Arc<ContainerManager>,
    scanner: MetadataScanner,
    route_handler: RouteHandler,
    modules: Vec<ModuleRef>,
    conflicts: Mutex<PathConflictDetector>,
}

impl RouteResolver {
    pub fn new(
        adapter: Arc<dyn HttpApplicationAdapter>,
        containers: Arc<ContainerManager>,
        reflector: Reflector,
        modules: Vec<ModuleRef>,
    ) -> Self {
        Self {
            route_handler: RouteHandler::new(adapter.clone()),
            scanner: MetadataScanner::new(reflector),
            adapter,
            containers,
            modules,
            conflicts: Mutex::new(PathConflictDetector::new()),
        }
    }

    /// Build and install the complete route table. Called once per boot.
    pub async fn resolve(&self) -> Result<(), Error> {
        let version = self
            .containers
            .root()
            .resolve_token::<String>(APP_VERSION)
            .ok()
            .map(|v| (*v).clone());

        let metadatas: Vec<RouteMetadata> = self
            .scanner
            .scan(&self.modules, version.as_deref())
            .into_iter()
            .filter(|meta| HttpMethod::from_str(&meta.verb).is_some())
            .collect();

        let (base_routes, mut wildcard_routes): (Vec<_>, Vec<_>) = metadatas
            .into_iter()
            .partition(|meta| !meta.url.contains('*'));
        wildcard_routes.sort_by(Self::sort_wildcard_routes);

        let global_pipes: Vec<Arc<dyn ProcessPipe>> =
            self.containers.root().resolve_multi(GLOBAL_PIPE);

        let mut routes = Vec::new();

        for metadata in base_routes.into_iter().chain(wildcard_routes) {
            let container = self
                .containers
                .get(metadata.module.type_id, metadata.module.type_name)?;

            let controller = container.get_or_create(&metadata.controller)?;

            let mut pipes = global_pipes.clone();
            for pipe in &metadata.pipes {
                pipes.push((pipe.factory)(&container)?);
            }

            let template = self
                .scanner
                .method_template(metadata.controller.type_id, metadata.method_name);

            let handler = self.route_handler.create_handler(
                controller,
                metadata.action.clone(),
                metadata.params.clone(),
                pipes,
                metadata.status,
                template,
            );
            let handler = wrap_with_middleware(handler, metadata.middleware.clone());

            self.conflicts.lock().unwrap().observe(
                metadata.controller.type_name,
                &metadata.url,
                metadata.middleware.len(),
            );

            // Filtered above; every remaining verb parses
            let method = HttpMethod::from_str(&metadata.verb)
                .ok_or_else(|| Error::Internal(format!("unknown verb: {}", metadata.verb)))?;

            debug!(
                controller = metadata.controller.type_name,
                method = metadata.method_name,
                verb = %metadata.verb,
                url = %metadata.url,
                "Route resolved"
            );

            routes.push(AdapterRoute {
                handler,
                method,
                url: metadata.url,
            });
        }

        info!(route_count = routes.len(), "Installing route table");
        self.adapter.routes(routes);
        Ok(())
    }

    /// More path segments sort first; ties broken by longer literal url
    fn sort_wildcard_routes(a: &RouteMetadata, b: &RouteMetadata) -> Ordering {
        let segments_a = a.url.split('/').count();
        let segments_b = b.url.split('/').count();

        if segments_a == segments_b {
            b.url.len().cmp(&a.url.len())
        } else {
            segments_b.cmp(&segments_a)
        }
    }

    /// Summary of path relationships observed during the last resolve
    pub fn path_analysis(&self) -> crate::conflict::PathAnalysis {
        self.conflicts.lock().unwrap().analysis()
    }
}

/// Compose middleware around a route handler; middleware errors travel the
/// adapter's error-handling path like handler errors do
fn wrap_with_middleware(handler: RouteFn, middleware: Vec<Middleware>) -> RouteFn {
    if middleware.is_empty() {
        return handler;
    }

    let chain = MiddlewareChain::new(middleware);
    Arc::new(move |ctx| {
        let chain = chain.clone();
        let handler = handler.clone();
        Box::pin(async move {
            if let Err(error) = chain.apply(ctx.clone(), handler).await {
                ctx.call_next(Some(error));
            }
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ControllerDef;
    use crate::registry::action;
    use crate::scanner::RouteMetadata;

    struct DummyController;

    fn meta(url: &str) -> RouteMetadata {
        RouteMetadata {
            module: ModuleRef::of::<DummyController>(),
            controller: ControllerDef::new(|_c| Ok(DummyController)),
            method_name: "dummy",
            verb: "get".into(),
            url: url.into(),
            status: None,
            params: vec![],
            pipes: vec![],
            middleware: vec![],
            action: action::<DummyController, _, _>(|_c, _a| async move { Ok(None) }),
        }
    }

    #[test]
    fn test_wildcard_sort_more_segments_first() {
        let mut routes = vec![meta("/*"), meta("/a/b/*"), meta("/a/*")];
        routes.sort_by(RouteResolver::sort_wildcard_routes);

        let urls: Vec<&str> = routes.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["/a/b/*", "/a/*", "/*"]);
    }

    #[test]
    fn test_wildcard_sort_tie_broken_by_length() {
        let mut routes = vec![meta("/ab/*"), meta("/longer/*")];
        routes.sort_by(RouteResolver::sort_wildcard_routes);

        let urls: Vec<&str> = routes.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["/longer/*", "/ab/*"]);
    }

    #[test]
    fn test_base_routes_precede_wildcards() {
        let metadatas = vec![meta("/a/*"), meta("/a/b/c"), meta("/*")];
        let (base, wildcard): (Vec<_>, Vec<_>) = metadatas
            .into_iter()
            .partition(|m| !m.url.contains('*'));

        assert_eq!(base.len(), 1);
        assert_eq!(base[0].url, "/a/b/c");
        assert_eq!(wildcard.len(), 2);
    }
}
