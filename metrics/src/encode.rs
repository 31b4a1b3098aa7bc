use crate::{
    aggregator::Observation,
    descriptor::{
        MetricDescriptor,
        MetricKind,
    },
};
use prometheus::{
    core::Collector,
    CounterVec,
    Encoder as _,
    GaugeVec,
    Opts,
    Registry,
    TextEncoder,
};
use std::{
    collections::HashMap,
    string::FromUtf8Error,
};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("metric {name} is inconsistent: {source}")]
    Metric {
        name: &'static str,
        #[source]
        source: prometheus::Error,
    },
    #[error("could not encode metrics: {0}")]
    Text(#[source] prometheus::Error),
    #[error("encoded metrics are not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

impl Family {
    fn new(descriptor: &MetricDescriptor) -> prometheus::Result<Self> {
        let opts = descriptor
            .const_labels
            .iter()
            .fold(Opts::new(descriptor.name, descriptor.help), |opts, (name, value)| {
                opts.const_label(*name, *value)
            });
        Ok(match descriptor.kind {
            MetricKind::Gauge => Family::Gauge(GaugeVec::new(opts, descriptor.labels)?),
            MetricKind::Counter => Family::Counter(CounterVec::new(opts, descriptor.labels)?),
        })
    }

    fn observe(&self, labels: &[&str], value: f64) -> prometheus::Result<()> {
        match self {
            Family::Gauge(gauges) => gauges.get_metric_with_label_values(labels)?.set(value),
            Family::Counter(counters) => counters.get_metric_with_label_values(labels)?.inc_by(value),
        }
        Ok(())
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Family::Gauge(gauges) => Box::new(gauges.clone()),
            Family::Counter(counters) => Box::new(counters.clone()),
        }
    }
}

/// Renders `observations` in the Prometheus text exposition format.
///
/// Every descriptor gets its own family in a registry that lives for this
/// call only, so nothing of a previous scrape leaks into the next one.
/// Descriptors without observations are left out of the output.
pub fn encode_text(descriptors: &[MetricDescriptor], observations: &[Observation]) -> Result<String, EncodeError> {
    let registry = Registry::new();
    let mut families = HashMap::with_capacity(descriptors.len());

    for descriptor in descriptors {
        if families.contains_key(descriptor) {
            continue;
        }
        let metric_error = |source| EncodeError::Metric {
            name: descriptor.name,
            source,
        };
        let family = Family::new(descriptor).map_err(metric_error)?;
        registry.register(family.collector()).map_err(metric_error)?;
        families.insert(*descriptor, family);
    }

    for observation in observations {
        let descriptor = &observation.descriptor;
        let Some(family) = families.get(descriptor) else {
            return Err(EncodeError::Metric {
                name: descriptor.name,
                source: prometheus::Error::Msg("observation for an unknown descriptor".to_string()),
            });
        };
        let labels = observation.labels.iter().map(String::as_str).collect::<Vec<_>>();
        family
            .observe(&labels, observation.value)
            .map_err(|source| EncodeError::Metric {
                name: descriptor.name,
                source,
            })?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(EncodeError::Text)?;
    Ok(String::from_utf8(buffer)?)
}
