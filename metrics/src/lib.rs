//! # Teeworlds Exporter Metrics
//!
//! Maps source snapshots onto Prometheus metrics.
//!
//! - **`descriptor`**: names, help texts and label schemas of every exported
//!   metric.
//! - **`aggregator`**: the ordered table of descriptors and the functions
//!   pulling their values out of directory and live snapshots.
//! - **`encode`**: renders observations in the text exposition format.

#[macro_use]
extern crate tracing;

pub mod aggregator;
pub mod descriptor;
pub mod encode;

pub use aggregator::{
    Aggregator,
    Extractor,
    MetricDefinition,
    Observation,
};
pub use descriptor::{
    MetricDescriptor,
    MetricKind,
};
pub use encode::{
    encode_text,
    EncodeError,
    CONTENT_TYPE,
};
