// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{channel::{BEACON, LAP, LAP_TIME},
            export,
            source::TableSource,
            Channel,
            ChannelKind,
            ChannelSet,
            Config,
            LapDetection,
            LapInfo,
            LdDocument,
            Resampler};
use eyre::Result;
use getset::Getters;
use std::path::Path;
use tracing::info;


/// A converted recording: resampled channels plus the derived lap channels.
#[derive(Clone, Debug, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Run {
  config:    Config,
  resampled: ChannelSet,
  detection: LapDetection,
}

impl Run {
  /// Resamples all tables of `source` and detects laps on the result.
  ///
  /// # Arguments
  /// - `source`: the recorded tables
  /// - `config`: rates, reference series and session information
  ///
  /// # Returns
  /// the converted `Run`; any error reading the source is fatal.
  pub fn convert(source: &dyn TableSource, config: &Config) -> Result<Self> {
    let resampled = Resampler::new(source, config).run()?;
    let detection = LapDetection::detect(&resampled);
    info!(samples = resampled.len(),
          channels = resampled.channels().len(),
          laps = detection.laps(resampled.timeline()).len(),
          "run converted");
    Ok(Self { config: config.clone(),
              resampled,
              detection })
  }

  pub fn timeline(&self) -> &[f64] {
    self.resampled.timeline()
  }

  /// Timestamps of all lap beacons.
  pub fn beacon_times(&self) -> Vec<f64> {
    self.detection.beacon_times(self.timeline())
  }

  pub fn info_of_laps(&self) -> Vec<LapInfo> {
    self.detection.laps(self.timeline())
  }

  pub fn number_of_laps(&self) -> usize {
    self.info_of_laps().len()
  }

  /// All output channels: `Beacon`, `LapTime`, `Lap` (unless a recorded
  /// channel already goes by that name), then the resampled channels.
  pub fn channel_set(&self) -> Result<ChannelSet> {
    let detection = &self.detection;
    let mut channels = vec![Channel::integer(BEACON,
                                             detection.beacon()
                                                      .iter()
                                                      .map(|&b| i64::from(b))
                                                      .collect()),
                            Channel::float(LAP_TIME,
                                           ChannelKind::Continuous,
                                           detection.lap_time().clone())];
    if self.resampled.channel(LAP).is_none() {
      channels.push(Channel::integer(LAP, detection.lap().clone()));
    }
    channels.extend(self.resampled.channels().iter().cloned());

    ChannelSet::new(self.timeline().to_vec(), channels)
  }

  /// Writes the CSV export to `path` and its metadata next to it.
  pub fn write_csv(&self, path: &Path) -> Result<()> {
    let set = self.channel_set()?;
    export::write_csv(&set, path)?;
    export::write_meta_csv(&set, &export::meta_path(path))
  }

  /// Writes the LD log to `path`.
  ///
  /// All channels are converted before anything is written; if one of them
  /// cannot be represented, no file is created.
  pub fn write_ld(&self, path: &Path) -> Result<()> {
    let set = self.channel_set()?;
    let config = &self.config;
    let mut document = LdDocument::from_channels(config.session().clone(),
                                                 *config.zero_decimals(),
                                                 set.channels(),
                                                 set.frequency(),
                                                 *config.workers())?;
    document.set_beacon_times(self.beacon_times());
    document.write(path)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{source::{Column, MemorySource, Table},
              LapSource,
              RateConfig,
              Samples};
  use pretty_assertions::assert_eq;
  use std::fs;


  fn source() -> MemorySource {
    let speed: Vec<f64> = (0..21).map(|k| k as f64).collect();
    let position: Vec<f64> = (0..21).map(|k| (k % 10) as f64 / 9.0).collect();
    MemorySource::new().with(Table::new("Speed",
                                        vec![Column::numeric("value",
                                                             &speed)]))
                       .with(Table::new("Car State",
                                        vec![Column::numeric("LapDistPct",
                                                             &position),
                                             Column::numeric("Flags",
                                                             &[0.0; 21])]))
  }

  fn config() -> Config {
    Config::new(RateConfig::parse(&["Dynamics=10", "States=10"]).unwrap())
  }

  #[test]
  fn convert_test() {
    let run = Run::convert(&source(), &config()).unwrap();
    assert_eq!(21, run.timeline().len());
    assert_eq!(Some(&LapSource::NormalizedPosition("Car_State_LapDistPct"
                                                     .to_string())),
               run.detection().source().as_ref());
    assert_eq!(vec![0.0, 1.0, 2.0], run.beacon_times());
    assert_eq!(3, run.number_of_laps());
    assert_eq!(1.0, run.info_of_laps()[0].time());

    let set = run.channel_set().unwrap();
    assert_eq!(vec!["Beacon",
                    "LapTime",
                    "Lap",
                    "Speed",
                    "Car_State_LapDistPct",
                    "Car_State_Flags"],
               set.channel_names());
    assert_eq!(Some(1.0), set.channel(BEACON).unwrap().samples().get(10));
    assert_eq!(Some(0.0), set.channel(LAP_TIME).unwrap().samples().get(10));
    match set.channel(LAP).unwrap().samples() {
      Samples::Integer(lap) => {
        assert_eq!(1, lap[9]);
        assert_eq!(2, lap[10]);
        assert_eq!(3, lap[20]);
      }
      Samples::Float(_) => panic!("lap must be an integer channel"),
    }
  }

  #[test]
  fn recorded_lap_channel_test() {
    let resampled =
      ChannelSet::new(vec![0.0, 1.0, 2.0, 3.0],
                      vec![Channel::integer(LAP, vec![4, 4, 5, 5])]).unwrap();
    let run = Run { config: config(),
                    detection: LapDetection::detect(&resampled),
                    resampled };

    let set = run.channel_set().unwrap();
    assert_eq!(vec!["Beacon", "LapTime", "Lap"], set.channel_names());
    assert_eq!(&Samples::Integer(vec![4, 4, 5, 5]),
               set.channel(LAP).unwrap().samples());
    assert_eq!(vec![0.0, 2.0], run.beacon_times());
  }

  #[test]
  fn no_lap_signal_test() {
    let source =
      MemorySource::new().with(Table::new("Speed",
                                          vec![Column::numeric("value",
                                                               &[1.0; 11])]));
    let run = Run::convert(&source, &config()).unwrap();
    assert_eq!(None, *run.detection().source());
    assert_eq!(Vec::<f64>::new(), run.beacon_times());
    assert_eq!(1, run.number_of_laps());

    let set = run.channel_set().unwrap();
    assert_eq!(set.timeline().to_vec(),
               set.channel(LAP_TIME).unwrap().samples().to_f64());
  }

  #[test]
  fn write_test() {
    let dir = tempfile::tempdir().unwrap();
    let run = Run::convert(&source(), &config()).unwrap();

    let csv = dir.path().join("run.csv");
    run.write_csv(&csv).unwrap();
    let text = fs::read_to_string(&csv).unwrap();
    assert!(text.starts_with("Time,Beacon,LapTime,Lap,Speed,"));
    assert_eq!(22, text.lines().count());
    assert!(dir.path().join("run.meta.csv").exists());

    // identical input, identical bytes
    let first = dir.path().join("first.ld");
    let second = dir.path().join("second.ld");
    run.write_ld(&first).unwrap();
    Run::convert(&source(), &config()).unwrap()
                                      .write_ld(&second)
                                      .unwrap();
    let bytes = fs::read(&first).unwrap();
    assert_eq!(bytes, fs::read(&second).unwrap());
    assert!(bytes.len() > crate::ldlayout::CHANNEL_META_PTR as usize);
  }
}
