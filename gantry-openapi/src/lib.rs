//! OpenAPI 3.0 document generation for Gantry controllers
//!
//! Builds an OpenAPI specification from the same controller, method and
//! parameter metadata the route resolver consumes. The generated document
//! never influences route resolution.
//!
//! ## Programmatic specs
//!
//! ```
//! use gantry_openapi::OpenApiBuilder;
//!
//! let spec = OpenApiBuilder::new("My API", "1.0.0")
//!     .description("A wonderful API")
//!     .server("http://localhost:3000", None)
//!     .build();
//!
//! assert_eq!(spec.info.title, "My API");
//! assert_eq!(spec.servers.len(), 1);
//! ```
//!
//! ## From a bootstrapped application
//!
//! ```ignore
//! let app = Application::create::<AppModule>()?;
//! let spec = gantry_openapi::document_from(&app, OpenApiBuilder::new("App", "1.0.0"));
//! println!("{}", spec.to_json()?);
//! ```

mod builder;
mod scan;
mod spec;

pub use builder::OpenApiBuilder;
pub use scan::{
    document_from, register_api_operation, register_api_operation_in, ApiOperationMeta,
    API_OPERATION_METADATA,
};
pub use spec::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenApiError {
    #[error("Serialization error: {0}")]
    Serialization(String),
}
