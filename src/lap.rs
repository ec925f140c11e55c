// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Jonas Reitemeyer <jonas@bmc-labs.com>
//   Florian Eich <florian@bmc-labs.com>

//! Infers lap structure from whatever lap related channel a recording has.
//!
//! Detectors are tried in order of how much they can be trusted. The first
//! one finding its channel wins; without any, the whole recording is one lap
//! without a beacon.

use super::{resample::{backward_fill, forward_fill},
            Channel,
            ChannelSet};
use getset::{CopyGetters, Getters};
use std::fmt;
use tracing::{debug, info, warn};


/// Position above which a normalized lap position counts as lap end.
const WRAP_HIGH: f64 = 0.95;
/// Position below which a normalized lap position counts as lap start.
const WRAP_LOW: f64 = 0.05;

const NORMALIZED_NAMES: [&str; 9] = ["normalizedlap",
                                     "normalisedlap",
                                     "normalizedcarposition",
                                     "normalizedposition",
                                     "lapposition",
                                     "lappos",
                                     "splineposition",
                                     "lapfraction",
                                     "lapdistpct"];
const DISTANCE_NAMES: [&str; 2] = ["lapdist", "distanceonlap"];
const COUNTER_NAMES: [&str; 6] = ["lapnumber",
                                  "lapcount",
                                  "lapindex",
                                  "lapnum",
                                  "currentlap",
                                  "completedlaps"];


/// The channel a lap detection was derived from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LapSource {
  NormalizedPosition(String),
  Distance(String),
  Counter(String),
}

impl fmt::Display for LapSource {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      LapSource::NormalizedPosition(name) => {
        write!(f, "normalized position '{}'", name)
      }
      LapSource::Distance(name) => write!(f, "lap distance '{}'", name),
      LapSource::Counter(name) => write!(f, "lap counter '{}'", name),
    }
  }
}


/// Beacon pulses and lap indices as found by one of the detectors.
#[derive(Clone, Debug, PartialEq)]
pub struct LapMarks {
  pub beacon: Vec<u8>,
  pub lap:    Vec<i64>,
  pub source: LapSource,
}

/// A detector looks at a channel set and either finds laps or passes.
pub type Detector = fn(&ChannelSet) -> Option<LapMarks>;

/// All detectors, most trustworthy first.
pub const DETECTORS: [Detector; 3] =
  [normalized_position, lap_distance, lap_counter];


/// Number, start and duration of a single lap.
#[derive(Clone, Copy, Debug, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct LapInfo {
  number: i64,
  start:  f64,
  time:   f64,
}

impl LapInfo {
  pub fn new(number: i64, start: f64, time: f64) -> Self {
    Self { number,
           start,
           time }
  }
}


/// Derived lap channels, one sample per timeline entry.
#[derive(Clone, Debug, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct LapDetection {
  beacon:   Vec<u8>,
  lap:      Vec<i64>,
  lap_time: Vec<f64>,
  source:   Option<LapSource>,
}

impl LapDetection {
  /// Runs the detectors over `set` in order, falling back to a single lap.
  pub fn detect(set: &ChannelSet) -> Self {
    Self::detect_with(set, &DETECTORS)
  }

  pub fn detect_with(set: &ChannelSet, detectors: &[Detector]) -> Self {
    let timeline = set.timeline();
    match detectors.iter().find_map(|detector| detector(set)) {
      Some(marks) => {
        info!(source = %marks.source,
              laps = marks.lap.last().copied().unwrap_or(1),
              "laps detected");
        let lap_time = lap_time(timeline, &marks.beacon);
        Self { beacon: marks.beacon,
               lap: marks.lap,
               lap_time,
               source: Some(marks.source) }
      }
      None => {
        warn!("no lap signal found, treating the recording as one lap");
        Self { beacon:   vec![0; timeline.len()],
               lap:      vec![1; timeline.len()],
               lap_time: timeline.clone(),
               source:   None, }
      }
    }
  }

  /// Timestamps of all beacon pulses.
  pub fn beacon_times(&self, timeline: &[f64]) -> Vec<f64> {
    self.beacon
        .iter()
        .zip(timeline.iter())
        .filter(|(beacon, _)| **beacon == 1)
        .map(|(_, &time)| time)
        .collect()
  }

  /// Start and duration of every lap; the last one runs until the end of
  /// the recording.
  pub fn laps(&self, timeline: &[f64]) -> Vec<LapInfo> {
    let end = timeline.last().copied().unwrap_or(0.0);
    let mut laps: Vec<LapInfo> = Vec::new();
    let marks = self.lap.iter().zip(timeline.iter()).enumerate();
    for (k, (&lap, &time)) in marks {
      if k == 0 || self.beacon[k] == 1 {
        if let Some(previous) = laps.last_mut() {
          previous.time = time - previous.start;
        }
        laps.push(LapInfo::new(lap, time, end - time));
      }
    }
    laps
  }

  pub fn len(&self) -> usize {
    self.beacon.len()
  }

  pub fn is_empty(&self) -> bool {
    self.beacon.is_empty()
  }
}


/// Time since the most recent beacon, restarting at zero on every beacon.
pub fn lap_time(timeline: &[f64], beacon: &[u8]) -> Vec<f64> {
  let mut lap_start = timeline.first().copied().unwrap_or(0.0);
  timeline.iter()
          .zip(beacon.iter())
          .map(|(&time, &beacon)| {
            if beacon == 1 {
              lap_start = time;
              0.0
            } else {
              time - lap_start
            }
          })
          .collect()
}

/// Turns per-sample lap boundaries into beacon pulses and lap indices; the
/// first sample always starts lap one.
fn marks_from_wraps(wraps: &[bool], source: LapSource) -> LapMarks {
  let mut beacon = Vec::with_capacity(wraps.len());
  let mut lap = Vec::with_capacity(wraps.len());
  let mut current = 1i64;
  for (k, &wrap) in wraps.iter().enumerate() {
    if k > 0 && wrap {
      current += 1;
    }
    beacon.push(u8::from(k == 0 || wrap));
    lap.push(current);
  }
  LapMarks { beacon,
             lap,
             source }
}

/// Lower case letters and digits only, `Lap_Dist (m)` becomes `lapdistm`.
fn compact(name: &str) -> String {
  name.chars()
      .filter(char::is_ascii_alphanumeric)
      .map(|c| c.to_ascii_lowercase())
      .collect()
}

fn is_normalized(name: &str) -> bool {
  let name = compact(name);
  NORMALIZED_NAMES.iter().any(|key| name.contains(key))
}

fn is_distance(name: &str) -> bool {
  let name = compact(name);
  DISTANCE_NAMES.iter().any(|key| name.contains(key))
  && !name.contains("pct")
  && !name.contains("percent")
}

fn is_counter(name: &str) -> bool {
  let name = compact(name);
  if name.contains("time") || name.contains("dist") || is_normalized(&name) {
    return false;
  }
  name == "lap"
  || name == "laps"
  || COUNTER_NAMES.iter().any(|key| name.contains(key))
}

fn find<'a>(set: &'a ChannelSet,
            matches: fn(&str) -> bool)
            -> Option<&'a Channel> {
  set.channels().iter().find(|channel| matches(channel.name()))
}


/// Detector for a lap fraction in `[0, 1]`: a lap ends where the position
/// jumps from above 0.95 to below 0.05.
pub fn normalized_position(set: &ChannelSet) -> Option<LapMarks> {
  let channel = find(set, is_normalized)?;
  let mut position: Vec<f64> = channel.samples()
                                      .to_f64()
                                      .into_iter()
                                      .map(|value| value.clamp(0.0, 1.0))
                                      .collect();
  forward_fill(&mut position);
  if position.iter().all(|value| value.is_nan()) {
    return None;
  }

  let wraps: Vec<bool> =
    (0..position.len()).map(|k| {
                         k > 0
                         && position[k - 1] > WRAP_HIGH
                         && position[k] < WRAP_LOW
                       })
                       .collect();
  debug!(channel = %channel.name(), "using normalized lap position");
  Some(marks_from_wraps(&wraps,
                        LapSource::NormalizedPosition(channel.name().clone())))
}

/// Detector for a distance-into-lap channel: a lap ends where the distance
/// drops by much more than it ever grows between two samples.
pub fn lap_distance(set: &ChannelSet) -> Option<LapMarks> {
  let channel = find(set, is_distance)?;
  let mut distance = channel.samples().to_f64();
  forward_fill(&mut distance);

  let finite: Vec<f64> =
    distance.iter().copied().filter(|value| value.is_finite()).collect();
  let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
  let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  if finite.len() < 2 || max - min <= 0.0 {
    return None;
  }

  let deltas: Vec<f64> = distance.windows(2).map(|w| w[1] - w[0]).collect();
  let threshold = wrap_threshold(&deltas, max - min);
  debug!(channel = %channel.name(), threshold, "using lap distance");

  let wraps: Vec<bool> =
    (0..distance.len()).map(|k| k > 0 && deltas[k - 1] <= threshold)
                       .collect();
  Some(marks_from_wraps(&wraps, LapSource::Distance(channel.name().clone())))
}

/// The most conservative of the candidate thresholds a distance drop has to
/// undercut to count as a new lap.
pub fn wrap_threshold(deltas: &[f64], range: f64) -> f64 {
  let finite: Vec<f64> =
    deltas.iter().copied().filter(|delta| delta.is_finite()).collect();
  let positive: Vec<f64> =
    finite.iter().copied().filter(|&delta| delta > 0.0).collect();

  let candidates = [Some(-0.5 * range).filter(|value| value.is_finite()),
                    median(&positive).map(|median| -5.0 * median),
                    percentile(&finite, 1.0)];
  let threshold = candidates.iter()
                            .flatten()
                            .copied()
                            .fold(f64::INFINITY, f64::min);
  if threshold.is_finite() {
    return threshold;
  }

  let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
  if min.is_finite() {
    min - 0.1 * min.abs()
  } else {
    f64::NEG_INFINITY
  }
}

/// Detector for an explicit lap counter: the lap is the counter itself and a
/// new lap starts wherever the counter increases.
pub fn lap_counter(set: &ChannelSet) -> Option<LapMarks> {
  let channel = find(set, is_counter)?;
  let mut counter = channel.samples().to_f64();
  forward_fill(&mut counter);
  backward_fill(&mut counter);
  if counter.iter().any(|value| !value.is_finite()) {
    return None;
  }

  let lap: Vec<i64> = counter.iter().map(|&value| value as i64).collect();
  let mut beacon = Vec::with_capacity(lap.len());
  let mut decreasing = false;
  for k in 0..lap.len() {
    if k == 0 {
      beacon.push(1);
      continue;
    }
    decreasing |= lap[k] < lap[k - 1];
    beacon.push(u8::from(lap[k] > lap[k - 1]));
  }
  if decreasing {
    warn!(channel = %channel.name(),
          "lap counter decreases, decreases are not treated as lap starts");
  }
  debug!(channel = %channel.name(), "using lap counter");

  Some(LapMarks { beacon,
                  lap,
                  source: LapSource::Counter(channel.name().clone()) })
}

fn median(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    return None;
  }
  let mut sorted = values.to_vec();
  sorted.sort_by(f64::total_cmp);
  let mid = sorted.len() / 2;
  Some(if sorted.len() % 2 == 0 {
         0.5 * (sorted[mid - 1] + sorted[mid])
       } else {
         sorted[mid]
       })
}

/// Percentile `p` (0 to 100) with linear interpolation between ranks.
fn percentile(values: &[f64], p: f64) -> Option<f64> {
  if values.is_empty() {
    return None;
  }
  let mut sorted = values.to_vec();
  sorted.sort_by(f64::total_cmp);
  let rank = p / 100.0 * (sorted.len() - 1) as f64;
  let (low, high) = (rank.floor() as usize, rank.ceil() as usize);
  Some(sorted[low] + (sorted[high] - sorted[low]) * (rank - low as f64))
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ChannelKind, Samples};
  use pretty_assertions::assert_eq;


  fn set(timeline: Vec<f64>, channels: Vec<(&str, Vec<f64>)>) -> ChannelSet {
    ChannelSet::new(timeline,
                    channels.into_iter()
                            .map(|(name, values)| {
                              Channel::float(name, ChannelKind::Step, values)
                            })
                            .collect()).unwrap()
  }

  fn seconds(count: usize) -> Vec<f64> {
    (0..count).map(|k| k as f64).collect()
  }

  fn assert_invariants(timeline: &[f64], detection: &LapDetection) {
    assert_eq!(1, detection.beacon()[0]);
    for k in 1..detection.len() {
      assert!(detection.lap()[k] >= detection.lap()[k - 1]);
      assert_eq!(detection.beacon()[k] == 1,
                 detection.lap()[k] > detection.lap()[k - 1]);
      if detection.beacon()[k] == 1 {
        assert_eq!(0.0, detection.lap_time()[k]);
      }
    }
    assert_lap_time_steps(timeline, detection);
  }

  /// Between two beacons lap time grows by exactly the time step.
  fn assert_lap_time_steps(timeline: &[f64], detection: &LapDetection) {
    assert_eq!(timeline.len(), detection.lap_time().len());
    for k in 1..detection.len() {
      if detection.beacon()[k] == 0 {
        let dt = timeline[k] - timeline[k - 1];
        let step = detection.lap_time()[k] - detection.lap_time()[k - 1];
        assert!((step - dt).abs() < 1e-9,
                "lap time at {} grows by {}, expected {}",
                k,
                step,
                dt);
      }
    }
  }

  #[test]
  fn normalized_position_test() {
    let set = set(seconds(7),
                  vec![("NormalizedLap",
                        vec![0.0, 0.5, 0.99, 0.02, 0.5, 0.98, 0.01])]);
    let detection = LapDetection::detect(&set);

    assert_eq!(&vec![1, 0, 0, 1, 0, 0, 1], detection.beacon());
    assert_eq!(&vec![1, 1, 1, 2, 2, 2, 3], detection.lap());
    assert_eq!(&vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0], detection.lap_time());
    assert_eq!(&Some(LapSource::NormalizedPosition("NormalizedLap".into())),
               detection.source());
    assert_invariants(set.timeline(), &detection);

    assert_eq!(vec![0.0, 3.0, 6.0], detection.beacon_times(set.timeline()));
    assert_eq!(vec![LapInfo::new(1, 0.0, 3.0),
                    LapInfo::new(2, 3.0, 3.0),
                    LapInfo::new(3, 6.0, 0.0)],
               detection.laps(set.timeline()));
  }

  #[test]
  fn no_lap_signal_test() {
    let set = set(vec![0.0, 0.5, 1.0], vec![("Speed", vec![10.0, 20.0, 30.0])]);
    let detection = LapDetection::detect(&set);

    assert_eq!(&vec![0, 0, 0], detection.beacon());
    assert_eq!(&vec![1, 1, 1], detection.lap());
    assert_eq!(&vec![0.0, 0.5, 1.0], detection.lap_time());
    assert_eq!(&None, detection.source());
    assert!(detection.beacon_times(set.timeline()).is_empty());
    assert_eq!(vec![LapInfo::new(1, 0.0, 1.0)],
               detection.laps(set.timeline()));
    assert_lap_time_steps(set.timeline(), &detection);
  }

  #[test]
  fn normalized_position_clips_test() {
    let set = set(seconds(4),
                  vec![("Lap_Position", vec![0.5, 1.3, -0.2, 0.4])]);
    let detection = LapDetection::detect(&set);
    assert_eq!(&vec![1, 0, 1, 0], detection.beacon());
    assert_invariants(set.timeline(), &detection);
  }

  #[test]
  fn lap_distance_test() {
    // three laps of 100 m driven at 10 m per sample
    let distance: Vec<f64> = (0..30).map(|k| (k % 10) as f64 * 10.0).collect();
    let set = set(seconds(30), vec![("Lap_Distance", distance)]);
    let detection = LapDetection::detect(&set);

    assert_eq!(&Some(LapSource::Distance("Lap_Distance".into())),
               detection.source());
    assert_eq!(vec![0.0, 10.0, 20.0], detection.beacon_times(set.timeline()));
    assert_eq!(3, *detection.lap().last().unwrap());
    assert_eq!(9.0, detection.lap_time()[9]);
    assert_eq!(0.0, detection.lap_time()[10]);
    assert_invariants(set.timeline(), &detection);
  }

  #[test]
  fn lap_distance_ignores_noise_test() {
    let distance = vec![0.0, 10.0, 20.0, 19.5, 30.0, 40.0, 50.0, 60.0, 70.0,
                        80.0, 90.0, 100.0, 0.0, 10.0];
    let set = set(seconds(14), vec![("LapDist", distance)]);
    let detection = LapDetection::detect(&set);
    assert_eq!(vec![0.0, 12.0], detection.beacon_times(set.timeline()));
    assert_eq!(2, *detection.lap().last().unwrap());
    assert_invariants(set.timeline(), &detection);
  }

  #[test]
  fn wrap_threshold_test() {
    // -0.5 * range = -50, -5 * median = -50, 1st percentile of deltas = -87
    let deltas = [10.0, 10.0, -90.0, 10.0];
    assert!((wrap_threshold(&deltas, 100.0) + 87.0).abs() < 1e-9);

    // only the fallback is left
    assert_eq!(f64::NEG_INFINITY, wrap_threshold(&[], f64::NAN));
  }

  #[test]
  fn lap_counter_test() {
    let set = set(seconds(6),
                  vec![("Lap", vec![1.0, 1.0, 2.0, 2.0, 2.0, 3.0]),
                       ("Best_Lap_Time", vec![0.0; 6])]);
    let detection = LapDetection::detect(&set);

    assert_eq!(&Some(LapSource::Counter("Lap".into())), detection.source());
    assert_eq!(&vec![1, 0, 1, 0, 0, 1], detection.beacon());
    assert_eq!(&vec![1, 1, 2, 2, 2, 3], detection.lap());
    assert_eq!(&vec![0.0, 1.0, 0.0, 1.0, 2.0, 0.0], detection.lap_time());
    assert_invariants(set.timeline(), &detection);
  }

  #[test]
  fn lap_counter_decrease_test() {
    let set = set(seconds(4), vec![("Lap_Number", vec![2.0, 3.0, 1.0, 2.0])]);
    let detection = LapDetection::detect(&set);
    assert_eq!(&vec![1, 1, 0, 1], detection.beacon());
    assert_eq!(&vec![2, 3, 1, 2], detection.lap());
    assert_lap_time_steps(set.timeline(), &detection);
  }

  #[test]
  fn counter_name_test() {
    assert!(is_counter("Lap"));
    assert!(is_counter("Current_Lap"));
    assert!(is_counter("LapNumber"));
    assert!(!is_counter("Lap_Time"));
    assert!(!is_counter("Lap_Distance"));
    assert!(!is_counter("NormalizedLap"));
    assert!(!is_counter("Flap"));
    assert!(is_distance("Lap_Dist"));
    assert!(!is_distance("LapDistPct"));
    assert!(is_normalized("LapDistPct"));
    assert!(is_normalized("Normalized_Car_Position"));
  }

  #[test]
  fn detector_priority_test() {
    let set = set(seconds(4),
                  vec![("Lap", vec![1.0, 1.0, 1.0, 1.0]),
                       ("NormalizedLap", vec![0.5, 0.99, 0.01, 0.5])]);
    let detection = LapDetection::detect(&set);
    assert_eq!(&Some(LapSource::NormalizedPosition("NormalizedLap".into())),
               detection.source());

    let detection = LapDetection::detect_with(&set, &[lap_counter as Detector]);
    assert_eq!(&vec![1, 0, 0, 0], detection.beacon());
  }

  #[test]
  fn integer_counter_test() {
    let set = ChannelSet::new(seconds(3),
                              vec![Channel::integer("Lap", vec![4, 5, 5])])
      .unwrap();
    let detection = LapDetection::detect(&set);
    assert_eq!(&vec![1, 1, 0], detection.beacon());
    assert!(matches!(set.channel("Lap").unwrap().samples(),
                     Samples::Integer(_)));
  }
}
