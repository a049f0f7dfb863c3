use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{LabelPair, Metric, MetricFamily, MetricType, Quantile, Summary};
use prometheus::{Error, Opts};

pub const DEFAULT_QUANTILES: [f64; 3] = [0.5, 0.9, 0.99];

/// Observations older than this no longer contribute to quantiles.
pub const MAX_AGE: Duration = Duration::from_secs(600);

/// Per-series cap on retained observations; the oldest are dropped first.
pub const MAX_SAMPLES: usize = 2048;

#[derive(Debug, Default)]
struct SummaryCore {
    count: u64,
    sum: f64,
    samples: VecDeque<(Instant, f64)>,
}

impl SummaryCore {
    fn observe(&mut self, value: f64, now: Instant) {
        self.count += 1;
        self.sum += value;
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back((now, value));
    }

    fn expire(&mut self, now: Instant) {
        while let Some((at, _)) = self.samples.front() {
            if now.saturating_duration_since(*at) <= MAX_AGE {
                break;
            }
            self.samples.pop_front();
        }
    }

    fn quantiles(&self, objectives: &[f64]) -> Vec<(f64, f64)> {
        let mut values: Vec<f64> = self.samples.iter().map(|(_, v)| *v).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        objectives
            .iter()
            .map(|q| {
                if values.is_empty() {
                    return (*q, f64::NAN);
                }
                let rank = (q * values.len() as f64).ceil() as usize;
                let idx = rank.saturating_sub(1).min(values.len() - 1);
                (*q, values[idx])
            })
            .collect()
    }
}

/// One labeled series of a [`SummaryVec`].
#[derive(Debug, Clone)]
pub struct SummaryMetric {
    core: Arc<Mutex<SummaryCore>>,
}

impl SummaryMetric {
    pub fn observe(&self, value: f64) {
        self.core.lock().observe(value, Instant::now());
    }

    pub fn sample_count(&self) -> u64 {
        self.core.lock().count
    }

    pub fn sample_sum(&self) -> f64 {
        self.core.lock().sum
    }
}

struct SummaryVecCore {
    desc: Desc,
    objectives: Vec<f64>,
    children: DashMap<Vec<String>, SummaryMetric>,
}

/// Labeled summary with sliding-window quantiles.
///
/// Quantiles are computed at scrape time over the observations of the
/// last [`MAX_AGE`]; count and sum are cumulative.
#[derive(Clone)]
pub struct SummaryVec {
    inner: Arc<SummaryVecCore>,
}

impl SummaryVec {
    pub fn new(opts: Opts, label_names: &[&str]) -> prometheus::Result<Self> {
        let desc = Desc::new(
            opts.fq_name(),
            opts.help.clone(),
            label_names.iter().map(|l| l.to_string()).collect(),
            opts.const_labels.clone(),
        )?;

        Ok(Self {
            inner: Arc::new(SummaryVecCore {
                desc,
                objectives: DEFAULT_QUANTILES.to_vec(),
                children: DashMap::new(),
            }),
        })
    }

    pub fn get_metric_with_label_values(&self, values: &[&str]) -> prometheus::Result<SummaryMetric> {
        let expect = self.inner.desc.variable_labels.len();
        if values.len() != expect {
            return Err(Error::InconsistentCardinality {
                expect,
                got: values.len(),
            });
        }

        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let child = self
            .inner
            .children
            .entry(key)
            .or_insert_with(|| SummaryMetric {
                core: Arc::new(Mutex::new(SummaryCore::default())),
            });
        Ok(child.value().clone())
    }

    fn label_pairs(&self, values: &[String]) -> Vec<LabelPair> {
        let desc = &self.inner.desc;
        let mut pairs: Vec<LabelPair> = desc
            .variable_labels
            .iter()
            .zip(values)
            .map(|(name, value)| {
                let mut pair = LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                pair
            })
            .collect();
        pairs.extend(desc.const_label_pairs.iter().cloned());
        pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        pairs
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if self.inner.children.is_empty() {
            return Vec::new();
        }

        let now = Instant::now();
        let mut family = MetricFamily::default();
        family.set_name(self.inner.desc.fq_name.clone());
        family.set_help(self.inner.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);

        for entry in self.inner.children.iter() {
            let mut core = entry.value().core.lock();
            core.expire(now);

            let mut summary = Summary::default();
            summary.set_sample_count(core.count);
            summary.set_sample_sum(core.sum);
            for (q, v) in core.quantiles(&self.inner.objectives) {
                let mut quantile = Quantile::default();
                quantile.set_quantile(q);
                quantile.set_value(v);
                summary.mut_quantile().push(quantile);
            }
            drop(core);

            let mut metric = Metric::default();
            for pair in self.label_pairs(entry.key()) {
                metric.mut_label().push(pair);
            }
            metric.set_summary(summary);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}
