//! HTTP surface of the exporter: an index page, the scrape endpoint and a
//! health check.

#[macro_use]
extern crate tracing;

pub mod error;
pub mod router;

pub use error::AppError;
pub use router::{
    create_router,
    serve,
    AppState,
};
