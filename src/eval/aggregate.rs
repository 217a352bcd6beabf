//! Per-method aggregation of metric scores.

use indicatif::ProgressBar;

use crate::error::{Error, Result};
use crate::eval::report::{MethodReport, MetricColumn, PerImageTable, ScoreSummary};
use crate::loader::ImageSet;
use crate::metrics::MetricBattery;

/// Score every image pair of a method and aggregate the results.
///
/// Pairs are scored in loader order, all metrics per image, and `progress`
/// advances once per image.
pub fn evaluate_method(
    battery: &MetricBattery,
    name: &str,
    images: &ImageSet,
    progress: &ProgressBar,
) -> Result<MethodReport> {
    let mut columns: Vec<MetricColumn> = battery
        .names()
        .map(|metric| MetricColumn {
            metric: metric.to_string(),
            values: Vec::with_capacity(images.len()),
        })
        .collect();
    let mut filenames = Vec::with_capacity(images.len());

    for (filename, render, ground_truth) in images.pairs() {
        progress.set_message(filename.to_string());
        let record = battery.score(render, ground_truth)?;
        if record.len() != columns.len() {
            return Err(Error::metric(
                "battery",
                format!("{} scores for {} metrics", record.len(), columns.len()),
            ));
        }
        for (column, (_, value)) in columns.iter_mut().zip(record.iter()) {
            column.values.push(value);
        }
        log::debug!("{name}/{filename}: scored");
        filenames.push(filename.to_string());
        progress.inc(1);
    }

    let mut summary = ScoreSummary::default();
    for column in &columns {
        summary.push(column.metric.clone(), mean(&column.values));
    }

    Ok(MethodReport {
        name: name.to_string(),
        summary,
        per_image: PerImageTable::new(filenames, columns),
    })
}

/// Arithmetic mean.
///
/// Finite inputs use compensated (Neumaier) summation. Any infinity or NaN
/// propagates into the result as plain IEEE arithmetic would, and an empty
/// slice gives NaN.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    if values.iter().any(|v| !v.is_finite()) {
        return values.iter().sum::<f64>() / values.len() as f64;
    }

    let mut sum = 0.0f64;
    let mut compensation = 0.0f64;
    for &v in values {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            compensation += (sum - t) + v;
        } else {
            compensation += (v - t) + sum;
        }
        sum = t;
    }
    (sum + compensation) / values.len() as f64
}
