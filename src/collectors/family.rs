//! Generation-swapped gauge state.
//!
//! A poll cycle never mutates the exposed gauge in place. It builds a fresh
//! `GaugeVec` holding the complete result set and publishes it with a single
//! pointer swap, so a concurrent scrape encodes either the whole previous
//! generation or the whole next one.

use arc_swap::ArcSwap;
use prometheus::core::{Collector as PromCollector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use std::collections::HashMap;
use std::sync::Arc;

/// One labeled observation.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub labels: Vec<String>,
    pub value: f64,
}

impl Sample {
    pub fn new<I, S>(labels: I, value: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            value,
        }
    }
}

struct Generation {
    gauge: GaugeVec,
    samples: Vec<Sample>,
}

/// A labeled gauge whose series are replaced wholesale on every publish.
#[derive(Clone)]
pub struct GaugeFamily {
    opts: Opts,
    label_names: Arc<[String]>,
    // Describes the family to the registry; never carries series.
    template: GaugeVec,
    current: Arc<ArcSwap<Generation>>,
}

impl GaugeFamily {
    /// # Errors
    ///
    /// Returns an error if the metric name or a label name is invalid.
    pub fn new(opts: Opts, label_names: &[&str]) -> prometheus::Result<Self> {
        let template = GaugeVec::new(opts.clone(), label_names)?;
        let empty = GaugeVec::new(opts.clone(), label_names)?;

        Ok(Self {
            opts,
            label_names: label_names.iter().map(|l| (*l).to_string()).collect(),
            template,
            current: Arc::new(ArcSwap::from_pointee(Generation {
                gauge: empty,
                samples: Vec::new(),
            })),
        })
    }

    #[must_use]
    pub fn fq_name(&self) -> String {
        self.opts.fq_name()
    }

    /// Replace the exposed series with `samples`.
    ///
    /// Samples sharing a label set collapse into one series holding the last
    /// value, the same way the scrape sees them. Returns the number of
    /// distinct series published. On error the previous generation stays in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns an error if a sample's label count does not match the family.
    pub fn publish(&self, samples: Vec<Sample>) -> prometheus::Result<usize> {
        let labels: Vec<&str> = self.label_names.iter().map(String::as_str).collect();
        let gauge = GaugeVec::new(self.opts.clone(), &labels)?;

        let mut unique: Vec<Sample> = Vec::with_capacity(samples.len());
        let mut positions: HashMap<Vec<String>, usize> = HashMap::with_capacity(samples.len());

        for sample in samples {
            let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
            gauge.get_metric_with_label_values(&values)?.set(sample.value);

            if let Some(existing) = positions
                .get(&sample.labels)
                .and_then(|&i| unique.get_mut(i))
            {
                existing.value = sample.value;
            } else {
                positions.insert(sample.labels.clone(), unique.len());
                unique.push(sample);
            }
        }

        let published = unique.len();
        self.current.store(Arc::new(Generation {
            gauge,
            samples: unique,
        }));
        Ok(published)
    }

    /// Drop every series.
    pub fn clear(&self) {
        let labels: Vec<&str> = self.label_names.iter().map(String::as_str).collect();
        // The options were validated by `new`, so rebuilding cannot fail.
        if let Ok(gauge) = GaugeVec::new(self.opts.clone(), &labels) {
            self.current.store(Arc::new(Generation {
                gauge,
                samples: Vec::new(),
            }));
        }
    }

    /// Samples of the currently exposed generation.
    #[must_use]
    pub fn samples(&self) -> Vec<Sample> {
        self.current.load().samples.clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().samples.is_empty()
    }
}

impl PromCollector for GaugeFamily {
    fn desc(&self) -> Vec<&Desc> {
        self.template.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.current.load().gauge.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[allow(clippy::unwrap_used)]
    fn family() -> GaugeFamily {
        GaugeFamily::new(Opts::new("test_family", "test family"), &["table"]).unwrap()
    }

    fn label_set(registry: &Registry) -> BTreeSet<String> {
        registry
            .gather()
            .iter()
            .flat_map(|mf| mf.get_metric().iter())
            .flat_map(|m| m.get_label().iter())
            .filter(|l| l.name() == "table")
            .map(|l| l.value().to_string())
            .collect()
    }

    #[test]
    fn test_new_family_is_empty() {
        let family = family();
        assert!(family.is_empty());

        let registry = Registry::new();
        assert!(registry.register(Box::new(family)).is_ok());
        assert!(registry.gather().is_empty(), "empty families are not exposed");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_publish_replaces_previous_generation() {
        let family = family();
        family
            .publish(vec![Sample::new(["a"], 1.0), Sample::new(["b"], 2.0)])
            .unwrap();
        assert_eq!(family.samples().len(), 2);

        let published = family.publish(vec![Sample::new(["c"], 3.0)]).unwrap();
        assert_eq!(published, 1);
        assert_eq!(family.samples(), vec![Sample::new(["c"], 3.0)]);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_duplicate_label_sets_collapse_to_last_value() {
        let family = family();
        let registry = Registry::new();
        registry.register(Box::new(family.clone())).unwrap();

        let published = family
            .publish(vec![
                Sample::new(["a"], 1.0),
                Sample::new(["b"], 2.0),
                Sample::new(["a"], 3.0),
            ])
            .unwrap();

        assert_eq!(published, 2);
        assert_eq!(
            family.samples(),
            vec![Sample::new(["a"], 3.0), Sample::new(["b"], 2.0)]
        );

        let exposed: usize = registry
            .gather()
            .iter()
            .map(|mf| mf.get_metric().len())
            .sum();
        assert_eq!(exposed, published);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_bad_sample_keeps_previous_generation() {
        let family = family();
        family.publish(vec![Sample::new(["a"], 1.0)]).unwrap();

        let result = family.publish(vec![Sample::new(["x", "y"], 1.0)]);
        assert!(result.is_err());
        assert_eq!(family.samples(), vec![Sample::new(["a"], 1.0)]);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_clear_removes_all_series() {
        let family = family();
        family.publish(vec![Sample::new(["a"], 1.0)]).unwrap();
        family.clear();
        assert!(family.is_empty());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let family = family();
        let registry = Registry::new();
        assert!(registry.register(Box::new(family.clone())).is_ok());
        assert!(registry.register(Box::new(family)).is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_const_labels_are_exposed() {
        let opts = Opts::new("labeled_family", "help").const_label("testing", "true");
        let family = GaugeFamily::new(opts, &["stat"]).unwrap();
        family.publish(vec![Sample::new(["tup_inserted"], 0.0)]).unwrap();

        let registry = Registry::new();
        registry.register(Box::new(family)).unwrap();
        let gathered = registry.gather();
        let labels = gathered
            .first()
            .and_then(|mf| mf.get_metric().first())
            .map(|m| m.get_label().len());
        assert_eq!(labels, Some(2));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_concurrent_scrapes_never_see_mixed_generations() {
        let family = family();
        let registry = Registry::new();
        registry.register(Box::new(family.clone())).unwrap();

        let first: Vec<Sample> = (0..10).map(|i| Sample::new([format!("a{i}")], 1.0)).collect();
        let second: Vec<Sample> = (0..5).map(|i| Sample::new([format!("b{i}")], 2.0)).collect();
        let first_set: BTreeSet<String> = (0..10).map(|i| format!("a{i}")).collect();
        let second_set: BTreeSet<String> = (0..5).map(|i| format!("b{i}")).collect();

        family.publish(first.clone()).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let family = family.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..2_000 {
                    let next = if i % 2 == 0 { second.clone() } else { first.clone() };
                    family.publish(next).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let done = Arc::clone(&done);
                let first_set = first_set.clone();
                let second_set = second_set.clone();
                thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        let seen = label_set(&registry);
                        assert!(
                            seen == first_set || seen == second_set,
                            "observed a mixed generation: {seen:?}"
                        );
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
