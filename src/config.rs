// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::rules;
use chrono::NaiveDateTime;
use eyre::{bail, ensure, eyre, Result, WrapErr};
use getset::{CopyGetters, Getters, Setters};
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::warn;


/// Sample rate requested for one logical group.
#[derive(Clone, Debug, PartialEq, CopyGetters, Getters)]
pub struct GroupRate {
  #[getset(get = "pub")]
  name: String,
  #[getset(get_copy = "pub")]
  rate: u32,
}

/// Unvalidated group entry as it appears in a config file.
#[derive(Debug, Deserialize)]
pub struct RawGroupRate {
  name: String,
  rate: i64,
}


/// Ordered mapping from group name to sample rate in Hz.
///
/// Order matters: when two groups select the same table, the group listed
/// first produces the channel. A `RateConfig` can only be constructed from
/// valid input, so anything holding one may rely on every rate being
/// positive and the list being non-empty.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Vec<RawGroupRate>")]
pub struct RateConfig {
  groups: Vec<GroupRate>,
}

impl RateConfig {
  /// Validates and creates a `RateConfig` from `(group, rate)` pairs.
  pub fn new<S>(groups: impl IntoIterator<Item = (S, i64)>) -> Result<Self>
    where S: Into<String>
  {
    let mut validated: Vec<GroupRate> = Vec::new();
    for (name, rate) in groups {
      let name = name.into();
      ensure!(!name.trim().is_empty(), "group name must not be empty");
      ensure!(rate > 0,
              "sample rate for group '{}' must be positive, got {}",
              name,
              rate);
      let rate = u32::try_from(rate).map_err(|_| {
                   eyre!("sample rate for group '{}' too large ({})",
                         name,
                         rate)
                 })?;
      ensure!(!validated.iter().any(|group| group.name == name),
              "group '{}' configured more than once",
              name);
      if rules::group_keywords(&name).is_none() {
        warn!(group = %name, "unknown group, it will not select any table");
      }
      validated.push(GroupRate { name, rate });
    }
    ensure!(!validated.is_empty(), "no group selected");

    Ok(Self { groups: validated })
  }

  /// Parses `Group=Hz` arguments, e.g. `["Driver=100", "Tyres=20"]`.
  pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
    let mut pairs = Vec::with_capacity(args.len());
    for arg in args {
      let arg = arg.as_ref();
      let (name, rate) = match arg.split_once('=') {
        Some((name, rate)) => (name.trim(), rate.trim()),
        None => bail!("expected 'Group=Hz', got '{}'", arg),
      };
      let rate = rate.parse::<i64>()
                     .wrap_err_with(|| format!("invalid sample rate in '{}'",
                                               arg))?;
      pairs.push((name.to_string(), rate));
    }
    Self::new(pairs)
  }

  /// The master rate, i.e. the highest requested group rate.
  pub fn master_rate(&self) -> u32 {
    self.groups.iter().map(|group| group.rate).max().unwrap_or(1)
  }

  pub fn groups(&self) -> &[GroupRate] {
    &self.groups
  }

  pub fn len(&self) -> usize {
    self.groups.len()
  }

  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }
}

impl Default for RateConfig {
  fn default() -> Self {
    Self { groups: rules::DEFAULT_RATES.iter()
                                       .map(|(name, rate)| {
                                         GroupRate { name: name.to_string(),
                                                     rate: *rate }
                                       })
                                       .collect(), }
  }
}

impl TryFrom<Vec<RawGroupRate>> for RateConfig {
  type Error = eyre::Report;

  fn try_from(raw: Vec<RawGroupRate>) -> Result<Self> {
    Self::new(raw.into_iter().map(|group| (group.name, group.rate)))
  }
}


/// Descriptive information written into the preamble of the LD file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Getters, Setters)]
#[getset(get = "pub", set = "pub")]
#[serde(default)]
pub struct SessionInfo {
  driver:          String,
  vehicle_id:      String,
  vehicle_weight:  u32,
  vehicle_type:    String,
  vehicle_comment: String,
  venue:           String,
  event:           String,
  session:         String,
  long_comment:    String,
  short_comment:   String,
  datetime:        NaiveDateTime,
}


/// Everything a conversion needs besides the data itself.
#[derive(Clone, Debug, Deserialize, PartialEq, Getters, Setters)]
#[getset(get = "pub", set = "pub")]
#[serde(default)]
pub struct Config {
  #[serde(rename = "group")]
  rates:            RateConfig,
  reference_table:  String,
  reference_column: String,
  excluded_tables:  Vec<String>,
  workers:          Option<usize>,
  zero_decimals:    bool,
  session:          SessionInfo,
}

impl Config {
  pub fn new(rates: RateConfig) -> Self {
    Self { rates,
           ..Self::default() }
  }

  /// Reads a TOML configuration file.
  pub fn load(path: &Path) -> Result<Self> {
    let text = fs::read_to_string(path)
      .wrap_err_with(|| format!("could not read config ({})", path.display()))?;
    Self::from_toml(&text)
      .wrap_err_with(|| format!("invalid config ({})", path.display()))
  }

  pub fn from_toml(text: &str) -> Result<Self> {
    let config: Self = toml::from_str(text)?;
    if let Some(workers) = config.workers {
      ensure!(workers > 0, "worker count must be positive");
    }
    Ok(config)
  }

  pub fn is_excluded(&self, table: &str) -> bool {
    self.excluded_tables.iter().any(|excluded| excluded == table)
  }
}

impl Default for Config {
  fn default() -> Self {
    Self { rates:            RateConfig::default(),
           reference_table:  "GPS Time".to_string(),
           reference_column: "value".to_string(),
           excluded_tables:  vec!["channelsList".to_string(),
                                  "eventsList".to_string(),
                                  "metadata".to_string()],
           workers:          None,
           zero_decimals:    true,
           session:          SessionInfo::default(), }
  }
}
