// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{channel::{is_reserved, TIME},
            rules,
            ChannelSet,
            Samples};
use eyre::{Result, WrapErr};
use std::path::{Path, PathBuf};
use tracing::info;


/// Path of the metadata companion of the CSV file at `path`, i.e.
/// `<stem>.meta.csv` next to it.
pub fn meta_path(path: &Path) -> PathBuf {
  path.with_extension("meta.csv")
}

fn format_sample(samples: &Samples, idx: usize) -> String {
  match samples {
    Samples::Float(values) => format!("{:.6}", values[idx]),
    Samples::Integer(values) => values[idx].to_string(),
  }
}

/// Writes `set` as CSV: a `Time` column followed by the channels in set
/// order, one row per timeline entry.
///
/// Floats are written with six decimal places, integer channels as plain
/// integers.
pub fn write_csv(set: &ChannelSet, path: &Path) -> Result<()> {
  let mut writer = csv::Writer::from_path(path)
    .wrap_err_with(|| format!("could not create {}", path.display()))?;

  let mut header = vec![TIME.to_string()];
  header.extend(set.channel_names());
  writer.write_record(&header)?;

  for (idx, time) in set.timeline().iter().enumerate() {
    let mut row = Vec::with_capacity(header.len());
    row.push(format!("{:.6}", time));
    for channel in set.channels() {
      row.push(format_sample(channel.samples(), idx));
    }
    writer.write_record(&row)?;
  }
  writer.flush()?;

  info!(path = %path.display(),
        rows = set.len(),
        columns = header.len(),
        "csv written");
  Ok(())
}

/// Writes the `channel, units, decimals` table for every non-reserved
/// channel of `set`, units and decimals guessed from the channel name.
pub fn write_meta_csv(set: &ChannelSet, path: &Path) -> Result<()> {
  let mut writer = csv::Writer::from_path(path)
    .wrap_err_with(|| format!("could not create {}", path.display()))?;
  writer.write_record(&["channel", "units", "decimals"])?;

  for name in set.channel_names() {
    if is_reserved(&name) {
      continue;
    }
    let (unit, decimals) = rules::units_and_decimals(&name);
    let decimals = decimals.to_string();
    writer.write_record(&[name.as_str(), unit, decimals.as_str()])?;
  }
  writer.flush()?;

  info!(path = %path.display(), "csv metadata written");
  Ok(())
}
