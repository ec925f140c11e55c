// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{lap, resample, rules};
use eyre::{ensure, Result};
use getset::{CopyGetters, Getters};
use std::collections::HashSet;


/// Name of the time axis column.
pub const TIME: &str = "Time";
/// Name of the derived beacon (lap start pulse) channel.
pub const BEACON: &str = "Beacon";
/// Name of the derived time-since-lap-start channel.
pub const LAP_TIME: &str = "LapTime";
/// Name of the derived lap index channel.
pub const LAP: &str = "Lap";

/// Channels derived from the others, never aligned like recorded ones.
pub const RESERVED: [&str; 3] = [TIME, BEACON, LAP_TIME];

pub fn is_reserved(name: &str) -> bool {
  RESERVED.contains(&name)
}


/// How a channel behaves between two samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
  /// Linearly interpolated.
  Continuous,
  /// Holds the last value (gear, flags, counters, ...).
  Step,
}


/// Samples of a channel, one per timeline entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Samples {
  Float(Vec<f64>),
  Integer(Vec<i64>),
}

impl Samples {
  pub fn len(&self) -> usize {
    match self {
      Samples::Float(values) => values.len(),
      Samples::Integer(values) => values.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_float(&self) -> bool {
    matches!(self, Samples::Float(_))
  }

  /// Sample `idx` as float, `None` if out of range.
  pub fn get(&self, idx: usize) -> Option<f64> {
    match self {
      Samples::Float(values) => values.get(idx).copied(),
      Samples::Integer(values) => values.get(idx).map(|&value| value as f64),
    }
  }

  pub fn to_f64(&self) -> Vec<f64> {
    match self {
      Samples::Float(values) => values.clone(),
      Samples::Integer(values) => {
        values.iter().map(|&value| value as f64).collect()
      }
    }
  }
}


/// A channel aligned to the master timeline, with its metadata.
#[derive(Clone, Debug, PartialEq, CopyGetters, Getters)]
pub struct Channel {
  #[getset(get = "pub")]
  name:     String,
  #[getset(get = "pub")]
  unit:     String,
  #[getset(get_copy = "pub")]
  decimals: u8,
  #[getset(get_copy = "pub")]
  kind:     ChannelKind,
  #[getset(get = "pub")]
  samples:  Samples,
}

impl Channel {
  pub fn new(name: &str,
             unit: &str,
             decimals: u8,
             kind: ChannelKind,
             samples: Samples)
             -> Self
  {
    Self { name: name.to_string(),
           unit: unit.to_string(),
           decimals,
           kind,
           samples }
  }

  /// Creates a float channel, unit and decimals guessed from the name.
  pub fn float(name: &str, kind: ChannelKind, values: Vec<f64>) -> Self {
    let (unit, decimals) = rules::units_and_decimals(name);
    Self::new(name, unit, decimals, kind, Samples::Float(values))
  }

  /// Creates a unitless integer step channel.
  pub fn integer(name: &str, values: Vec<i64>) -> Self {
    Self::new(name, "", 0, ChannelKind::Step, Samples::Integer(values))
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}


/// A set of channels sharing one timeline.
///
/// Every channel has exactly as many samples as the timeline has entries;
/// `ChannelSet::new` refuses anything else.
#[derive(Clone, Debug, Default, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct ChannelSet {
  timeline: Vec<f64>,
  channels: Vec<Channel>,
}

impl ChannelSet {
  pub fn new(timeline: Vec<f64>, channels: Vec<Channel>) -> Result<Self> {
    for channel in &channels {
      ensure!(channel.len() == timeline.len(),
              "channel '{}' has {} samples, timeline has {}",
              channel.name(),
              channel.len(),
              timeline.len());
    }
    Ok(Self { timeline, channels })
  }

  pub fn channel(&self, name: &str) -> Option<&Channel> {
    self.channels.iter().find(|channel| channel.name() == name)
  }

  pub fn channel_names(&self) -> Vec<String> {
    self.channels
        .iter()
        .map(|channel| channel.name().clone())
        .collect()
  }

  pub fn len(&self) -> usize {
    self.timeline.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timeline.is_empty()
  }

  /// Length of the recording in seconds.
  pub fn duration(&self) -> f64 {
    match (self.timeline.first(), self.timeline.last()) {
      (Some(first), Some(last)) => last - first,
      _ => 0.0,
    }
  }

  /// Sample rate of the timeline in Hz, rounded; `0` below two samples.
  pub fn frequency(&self) -> u32 {
    if self.timeline.len() < 2 {
      return 0;
    }
    let dt = self.timeline[1] - self.timeline[0];
    if dt <= 0.0 {
      return 0;
    }
    (1.0 / dt).round() as u32
  }

  /// Regrids the set to `rate` Hz over its own duration.
  ///
  /// The new set holds `floor(duration * rate)` samples starting at the
  /// first timestamp. Recorded channels are aligned like freshly read ones.
  /// The lap channels are never interpolated: every `Beacon` pulse moves to
  /// the first new sample at or after its time and `LapTime` is recomputed
  /// from the moved pulses, whether or not they are named in `skip`. Other
  /// channels named in `skip` (and a `LapTime` without a `Beacon` to rebuild
  /// it from) are not touched and come back unchanged next to the new set.
  ///
  /// # Returns
  /// the regridded set and the channels left as they were.
  pub fn resample(&self,
                  rate: f64,
                  skip: &HashSet<&str>)
                  -> Result<(Self, Vec<Channel>)>
  {
    ensure!(rate > 0.0 && rate.is_finite(),
            "resample rate must be positive, got {}",
            rate);
    let start = self.timeline.first().copied().unwrap_or(0.0);
    let count = (self.duration() * rate + 1e-9).floor() as usize;
    let timeline: Vec<f64> =
      (0..count).map(|k| start + k as f64 / rate).collect();

    let pulses = self.channel(BEACON).map(|beacon| {
                                       move_pulses(&self.timeline,
                                                   beacon.samples(),
                                                   &timeline)
                                     });

    let mut channels = Vec::with_capacity(self.channels.len());
    let mut untouched = Vec::new();
    for channel in &self.channels {
      let name = channel.name().as_str();
      let values = match (name, &pulses) {
        (TIME, _) => timeline.clone(),
        (BEACON, Some(pulses)) => {
          pulses.iter().map(|&pulse| f64::from(pulse)).collect()
        }
        (LAP_TIME, Some(pulses)) => lap::lap_time(&timeline, pulses),
        _ if is_reserved(name) || skip.contains(name) => {
          untouched.push(channel.clone());
          continue;
        }
        _ => {
          let mut values = resample::align(channel.kind(),
                                           &self.timeline,
                                           &channel.samples().to_f64(),
                                           &timeline);
          resample::fill_gaps(&mut values);
          values
        }
      };
      channels.push(channel.with_values(values));
    }

    Ok((Self::new(timeline, channels)?, untouched))
  }
}

impl Channel {
  /// Same channel with new values, keeping the sample type.
  fn with_values(&self, values: Vec<f64>) -> Self {
    let samples = match self.samples {
      Samples::Float(_) => Samples::Float(values),
      Samples::Integer(_) => {
        Samples::Integer(values.iter().map(|&value| value as i64).collect())
      }
    };
    Self::new(&self.name, &self.unit, self.decimals, self.kind, samples)
  }
}

/// Pulses of `samples` (any non-zero value) taken from `times` onto
/// `targets`, each at the first target at or after its time. Pulses past the
/// last target are dropped.
fn move_pulses(times: &[f64], samples: &Samples, targets: &[f64]) -> Vec<u8> {
  let mut pulses = vec![0u8; targets.len()];
  for (k, &time) in times.iter().enumerate() {
    if samples.get(k).map_or(false, |value| value != 0.0) {
      let idx = targets.partition_point(|&target| target < time - 1e-9);
      if let Some(pulse) = pulses.get_mut(idx) {
        *pulse = 1;
      }
    }
  }
  pulses
}
