// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

//! Merges tables recorded at different rates onto one master timeline.
//!
//! Each configured group selects tables by keyword and declares the rate its
//! tables were recorded at. Every usable column becomes a channel which is
//! either held (step channels) or linearly interpolated (everything else)
//! at the timestamps of the master timeline, whose rate is the highest of
//! all group rates. Gaps left by the alignment are closed afterwards by
//! `fill_gaps`.

use super::{channel::is_reserved,
            rules,
            source::TableSource,
            Channel,
            ChannelKind,
            ChannelSet,
            Config};
use eyre::Result;
use std::collections::HashSet;
use tracing::{debug, info, warn};


/// Columns with fewer finite samples than this carry no usable signal.
pub const MIN_FINITE_SAMPLES: usize = 5;


/// Builds the timeline `0, dt, 2 dt, ...` up to and including `session_end`,
/// with `dt = 1 / rate`.
pub fn master_timeline(session_end: f64, rate: u32) -> Vec<f64> {
  let rate = f64::from(rate.max(1));
  let session_end = if session_end.is_finite() && session_end > 0.0 {
    session_end
  } else {
    0.0
  };
  let count = (session_end * rate + 1e-9).floor() as usize + 1;
  (0..count).map(|k| k as f64 / rate).collect()
}

/// Timeline of a table recorded at `rate` Hz with `rows` rows.
pub fn table_timeline(rows: usize, rate: u32) -> Vec<f64> {
  let rate = f64::from(rate.max(1));
  (0..rows).map(|j| j as f64 / rate).collect()
}

/// Zero order hold: every target timestamp gets the value of the last source
/// sample at or before it. Targets before the first source sample get the
/// first sample, targets after the last get the last.
pub fn hold(times: &[f64], values: &[f64], targets: &[f64]) -> Vec<f64> {
  let n = times.len().min(values.len());
  if n == 0 {
    return vec![f64::NAN; targets.len()];
  }
  targets.iter()
         .map(|&target| {
           let after = times[..n].partition_point(|&time| time <= target);
           values[after.saturating_sub(1).min(n - 1)]
         })
         .collect()
}

/// Linear interpolation between finite source samples. Targets outside the
/// finite range become `NaN`, nothing is extrapolated.
pub fn interpolate(times: &[f64], values: &[f64], targets: &[f64]) -> Vec<f64> {
  let (xs, ys): (Vec<f64>, Vec<f64>) =
    times.iter()
         .zip(values.iter())
         .filter(|(time, value)| time.is_finite() && value.is_finite())
         .map(|(&time, &value)| (time, value))
         .unzip();
  let n = xs.len();
  if n == 0 {
    return vec![f64::NAN; targets.len()];
  }

  targets.iter()
         .map(|&target| {
           if target < xs[0] || target > xs[n - 1] {
             return f64::NAN;
           }
           let after = xs.partition_point(|&x| x <= target);
           if after >= n {
             return ys[n - 1];
           }
           let (x0, x1) = (xs[after - 1], xs[after]);
           let (y0, y1) = (ys[after - 1], ys[after]);
           y0 + (y1 - y0) * (target - x0) / (x1 - x0)
         })
         .collect()
}

/// Aligns a source series to `targets` using the policy of `kind`.
pub fn align(kind: ChannelKind,
             times: &[f64],
             values: &[f64],
             targets: &[f64])
             -> Vec<f64>
{
  match kind {
    ChannelKind::Step => hold(times, values, targets),
    ChannelKind::Continuous => interpolate(times, values, targets),
  }
}

/// Carries the last finite value forward over `NaN` gaps; leading gaps stay.
pub fn forward_fill(values: &mut [f64]) {
  let mut last = None;
  for value in values.iter_mut() {
    if value.is_nan() {
      if let Some(last) = last {
        *value = last;
      }
    } else {
      last = Some(*value);
    }
  }
}

/// Carries the first finite value backward over leading `NaN`s.
pub fn backward_fill(values: &mut [f64]) {
  let mut next = None;
  for value in values.iter_mut().rev() {
    if value.is_nan() {
      if let Some(next) = next {
        *value = next;
      }
    } else {
      next = Some(*value);
    }
  }
}

/// The gap rule applied to every aligned channel: forward fill, then zero
/// whatever precedes the first observation.
pub fn fill_gaps(values: &mut [f64]) {
  forward_fill(values);
  for value in values.iter_mut().filter(|value| value.is_nan()) {
    *value = 0.0;
  }
}

fn finite_count(values: &[f64]) -> usize {
  values.iter().filter(|value| value.is_finite()).count()
}


/// Turns the tables of a `TableSource` into a `ChannelSet`.
pub struct Resampler<'a> {
  source: &'a dyn TableSource,
  config: &'a Config,
}

impl<'a> Resampler<'a> {
  pub fn new(source: &'a dyn TableSource, config: &'a Config) -> Self {
    Self { source, config }
  }

  /// Tables considered for channels, i.e. all but the excluded ones.
  pub fn tables(&self) -> Result<Vec<String>> {
    Ok(self.source
           .table_names()?
           .into_iter()
           .filter(|table| !self.config.is_excluded(table))
           .collect())
  }

  /// Session length in seconds.
  ///
  /// Prefers the span of the reference series; falls back to the longest
  /// table, assuming it was recorded at the master rate.
  pub fn session_end(&self, tables: &[String]) -> Result<f64> {
    let reference = self.config.reference_table();
    if tables.iter().any(|table| table == reference) {
      match self.source
                .read_series(reference, self.config.reference_column())
      {
        Ok(series) => {
          let mut finite = series.iter().filter(|value| value.is_finite());
          if let (Some(first), Some(last)) = (finite.next(), finite.last()) {
            let span = last - first;
            if span > 0.0 {
              debug!(table = %reference, span, "session length from reference");
              return Ok(span);
            }
          }
          warn!(table = %reference, "reference series spans no time");
        }
        Err(err) => {
          warn!(table = %reference, error = %err, "reference series unreadable")
        }
      }
    }

    let master_rate = f64::from(self.config.rates().master_rate());
    let mut session_end = 0.0f64;
    for table in tables {
      let rows = self.source.row_count(table)?;
      if rows > 1 {
        session_end = session_end.max((rows - 1) as f64 / master_rate);
      }
    }
    debug!(session_end, "session length estimated from row counts");
    Ok(session_end)
  }

  /// Reads, aligns and fills all channels.
  pub fn run(&self) -> Result<ChannelSet> {
    let tables = self.tables()?;
    let master_rate = self.config.rates().master_rate();
    let timeline = master_timeline(self.session_end(&tables)?, master_rate);
    info!(tables = tables.len(),
          master_rate,
          samples = timeline.len(),
          "resampling onto master timeline");

    let mut seen: HashSet<String> = HashSet::new();
    let mut channels = Vec::new();

    for group in self.config.rates().groups() {
      let keywords = match rules::group_keywords(group.name()) {
        Some(keywords) => keywords,
        None => continue,
      };

      for name in tables.iter()
                        .filter(|table| rules::table_matches(table, keywords))
      {
        let table = self.source.read_table(name)?;
        if table.is_empty() {
          debug!(table = %name, "skipping empty table");
          continue;
        }

        let rows = table.row_count();
        let times = table_timeline(rows, group.rate());
        let columns = table.columns().len();

        for column in table.columns() {
          let mut values = column.to_f64();
          values.resize(rows, f64::NAN);

          let finite = finite_count(&values);
          if finite < MIN_FINITE_SAMPLES {
            debug!(table = %name,
                   column = %column.name(),
                   finite,
                   "skipping column with too few finite samples");
            continue;
          }

          let channel = rules::channel_name(name, column.name(), columns);
          if is_reserved(&channel) {
            warn!(channel = %channel, "skipping column with reserved name");
            continue;
          }
          if seen.contains(&channel) {
            debug!(channel = %channel,
                   group = %group.name(),
                   "channel already produced by an earlier match");
            continue;
          }

          let kind = rules::channel_kind(&channel);
          let mut aligned = align(kind, &times, &values, &timeline);
          fill_gaps(&mut aligned);

          seen.insert(channel.clone());
          channels.push(Channel::float(&channel, kind, aligned));
        }
      }
    }

    info!(channels = channels.len(), "resampling done");
    ChannelSet::new(timeline, channels)
  }
}
