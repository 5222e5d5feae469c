// Development-time path-conflict diagnostics.
//
// A log-only observer fed by the route resolver: it never influences
// resolution or runtime behavior. Two controllers sharing an identical
// full path is only a real problem when middleware is involved; each
// request would then run every attached middleware.

use crate::logging::{info, warn};
use std::collections::HashMap;

#[derive(Clone, Debug)]
struct RegisteredPath {
    controller: String,
    middleware_count: usize,
}

/// Buckets produced by [`PathConflictDetector::analysis`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathAnalysis {
    /// Path pairs with no relationship
    pub safe: Vec<String>,
    /// Identical paths registered more than once
    pub conflicts: Vec<String>,
    /// One path nested under another (usually safe; the router picks the
    /// most specific match)
    pub containments: Vec<String>,
}

#[derive(Default)]
pub struct PathConflictDetector {
    registered: HashMap<String, RegisteredPath>,
    /// Paths seen more than once, in observation order
    duplicates: Vec<String>,
}

impl PathConflictDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one registered route and report anything suspicious
    pub fn observe(&mut self, controller: &str, path: &str, middleware_count: usize) {
        if let Some(existing) = self.registered.get(path) {
            if existing.controller != controller
                && (existing.middleware_count > 0 || middleware_count > 0)
            {
                let total = existing.middleware_count + middleware_count;
                warn!(
                    path = path,
                    first = %existing.controller,
                    second = controller,
                    middleware_total = total,
                    "Identical full path registered by multiple controllers with middleware; \
                     every request will run all attached middleware"
                );
            }
            self.duplicates.push(path.to_string());
        } else {
            self.report_containment(controller, path);
        }

        self.registered.insert(
            path.to_string(),
            RegisteredPath {
                controller: controller.to_string(),
                middleware_count,
            },
        );
    }

    fn report_containment(&self, controller: &str, path: &str) {
        for (existing_path, existing) in &self.registered {
            if is_contained(path, existing_path) {
                info!(
                    existing = %existing_path,
                    existing_controller = %existing.controller,
                    new = path,
                    new_controller = controller,
                    "Path containment; the router resolves to the most specific path"
                );
            }
        }
    }

    /// Classify every observed path pair
    pub fn analysis(&self) -> PathAnalysis {
        let mut paths: Vec<&String> = self.registered.keys().collect();
        paths.sort();

        let mut analysis = PathAnalysis::default();
        for (i, a) in paths.iter().enumerate() {
            for b in paths.iter().skip(i + 1) {
                if is_contained(a, b) {
                    analysis.containments.push(format!("{a} <-> {b}"));
                } else {
                    analysis.safe.push(format!("{a} <-> {b}"));
                }
            }
        }
        analysis.conflicts = self.duplicates.clone();
        analysis
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub fn reset(&mut self) {
        self.registered.clear();
        self.duplicates.clear();
    }
}

fn is_contained(a: &str, b: &str) -> bool {
    a.starts_with(&format!("{b}/")) || b.starts_with(&format!("{a}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_paths_are_safe() {
        let mut detector = PathConflictDetector::new();
        detector.observe("OrdersController", "/orders", 1);
        detector.observe("UsersController", "/users", 2);

        let analysis = detector.analysis();
        assert_eq!(analysis.safe, vec!["/orders <-> /users".to_string()]);
        assert!(analysis.conflicts.is_empty());
        assert!(analysis.containments.is_empty());
    }

    #[test]
    fn test_identical_paths_are_conflicts() {
        let mut detector = PathConflictDetector::new();
        detector.observe("AController", "/api/data", 1);
        detector.observe("BController", "/api/data", 1);

        let analysis = detector.analysis();
        assert_eq!(analysis.conflicts, vec!["/api/data".to_string()]);
    }

    #[test]
    fn test_nested_paths_are_containments() {
        let mut detector = PathConflictDetector::new();
        detector.observe("OrdersController", "/order", 0);
        detector.observe("DetailsController", "/order/extended/details", 0);

        let analysis = detector.analysis();
        assert_eq!(
            analysis.containments,
            vec!["/order <-> /order/extended/details".to_string()]
        );
        assert!(analysis.conflicts.is_empty());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut detector = PathConflictDetector::new();
        detector.observe("AController", "/a", 0);
        assert_eq!(detector.registered_count(), 1);

        detector.reset();
        assert_eq!(detector.registered_count(), 0);
        assert!(detector.analysis().safe.is_empty());
    }
}
