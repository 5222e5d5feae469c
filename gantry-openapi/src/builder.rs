//! Builder for creating OpenAPI specifications programmatically

use crate::spec::*;
use crate::OpenApiError;
use std::collections::BTreeMap;

/// Builder for OpenAPI specifications
#[derive(Debug, Clone)]
pub struct OpenApiBuilder {
    spec: OpenApiSpec,
}

impl OpenApiBuilder {
    /// Create a new OpenAPI builder
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            spec: OpenApiSpec {
                openapi: "3.0.0".to_string(),
                info: Info {
                    title: title.into(),
                    version: version.into(),
                    description: None,
                },
                servers: Vec::new(),
                paths: BTreeMap::new(),
                tags: Vec::new(),
            },
        }
    }

    /// Set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.info.description = Some(description.into());
        self
    }

    /// Add a server
    pub fn server(mut self, url: impl Into<String>, description: Option<String>) -> Self {
        self.spec.servers.push(Server {
            url: url.into(),
            description,
        });
        self
    }

    /// Add a tag
    pub fn tag(mut self, name: impl Into<String>, description: Option<String>) -> Self {
        self.spec.tags.push(Tag {
            name: name.into(),
            description,
        });
        self
    }

    /// Add an operation under a path, merging with existing verbs
    pub fn operation(mut self, path: impl Into<String>, verb: &str, operation: Operation) -> Self {
        self.spec
            .paths
            .entry(path.into())
            .or_default()
            .set_operation(verb, operation);
        self
    }

    /// Build the specification
    pub fn build(self) -> OpenApiSpec {
        self.spec
    }
}

impl OpenApiSpec {
    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, OpenApiError> {
        serde_json::to_string_pretty(self).map_err(|e| OpenApiError::Serialization(e.to_string()))
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String, OpenApiError> {
        serde_yaml::to_string(self).map_err(|e| OpenApiError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_basics() {
        let spec = OpenApiBuilder::new("Messages API", "1.0.0")
            .description("Example app")
            .server("http://localhost:3000", None)
            .tag("messages", Some("Message operations".into()))
            .build();

        assert_eq!(spec.openapi, "3.0.0");
        assert_eq!(spec.info.title, "Messages API");
        assert_eq!(spec.servers.len(), 1);
        assert_eq!(spec.tags.len(), 1);
    }

    #[test]
    fn test_operations_merge_under_one_path() {
        let spec = OpenApiBuilder::new("API", "1.0.0")
            .operation("/messages", "get", Operation::default())
            .operation("/messages", "post", Operation::default())
            .build();

        let item = spec.paths.get("/messages").unwrap();
        assert!(item.get.is_some());
        assert!(item.post.is_some());
    }

    #[test]
    fn test_serialization_round_trip() {
        let spec = OpenApiBuilder::new("API", "1.0.0").build();
        let json = spec.to_json().unwrap();
        assert!(json.contains("\"openapi\": \"3.0.0\""));

        let yaml = spec.to_yaml().unwrap();
        assert!(yaml.contains("openapi: 3.0.0"));
    }
}
