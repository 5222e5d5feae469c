//! Testing utilities for Gantry applications
//!
//! Provides a recording mock adapter and a request driver so resolved
//! route tables can be exercised without opening sockets.
//!
//! ```no_run
//! use gantry_core::{Application, HttpModule};
//! use gantry_testing::MockAdapter;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), gantry_core::Error> {
//! # struct AppModule;
//! let app = Application::create::<AppModule>()?;
//! let adapter = Arc::new(MockAdapter::new());
//! let http = HttpModule::create(&app, adapter.clone());
//! http.resolve().await?;
//!
//! let outcome = adapter.get("/messages").await;
//! assert_eq!(outcome.status(), Some(200));
//! # Ok(())
//! # }
//! ```

mod mock;

pub use mock::{DispatchOutcome, MockAdapter};
