// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

//! Static lookup tables: which tables belong to which group, which channels
//! are discrete states, which units a channel probably carries, and how raw
//! table/column names turn into channel names.

use super::ChannelKind;
use lazy_static::lazy_static;
use regex::Regex;


/// Logical groups and the (lower case) substrings selecting their tables.
/// The order of this table is the order groups are offered in.
pub const GROUPS: [(&str, &[&str]); 7] = [
  ("Driver", &["throttle", "brake", "clutch", "steer", "ffb"]),
  ("Powertrain",
   &["engine", "rpm", "gear", "boost", "turbo", "regen", "energy", "fuel",
     "soc"]),
  ("Dynamics", &["speed", "yaw", "g_", "accel", "acceleration"]),
  ("AeroSusp",
   &["rideheight", "susp", "deflection", "wing", "flap", "downforce",
     "drag"]),
  ("Tyres",
   &["tyre", "tire", "pressure", "rubber", "carcass", "rim", "wear",
     "compound", "temp"]),
  ("Environment",
   &["ambient", "track_temperature", "wind", "wetness", "cloud",
     "track temperature", "ambient temperature"]),
  ("States",
   &["abs", "tc", "tccut", "map", "bias", "flag", "state", "status", "pits",
     "limiter", "headlights"]),
];

/// Default sample rates in Hz, one per entry of `GROUPS`.
pub const DEFAULT_RATES: [(&str, u32); 7] = [("Driver", 100),
                                             ("Powertrain", 100),
                                             ("Dynamics", 100),
                                             ("AeroSusp", 50),
                                             ("Tyres", 20),
                                             ("Environment", 10),
                                             ("States", 20)];

const STEP_KEYWORDS: [&str; 15] = ["gear",
                                   "lap",
                                   "flag",
                                   "state",
                                   "status",
                                   "active",
                                   "activated",
                                   "abs",
                                   "tc",
                                   "tccut",
                                   "map",
                                   "pits",
                                   "limiter",
                                   "headlights",
                                   "finish"];

const WHEEL_SLOTS: [(&str, &str); 4] =
  [("value1", "FL"), ("value2", "FR"), ("value3", "RL"), ("value4", "RR")];


lazy_static! {
  static ref BEAUTIFY: Vec<(Regex, &'static str)> = {
    let rule = |word: &str, abbr: &'static str| {
      let pattern = format!(r"(?i)_(?:{})_", word);
      (Regex::new(&pattern).expect("static pattern"), abbr)
    };
    vec![rule("Centre|Center", "_C_"),
         rule("Left", "_L_"),
         rule("Right", "_R_"),
         rule("Inner", "_I_"),
         rule("Middle", "_M_"),
         rule("Outer", "_O_")]
  };
  static ref UNDERSCORES: Regex = Regex::new(r"_+").expect("static pattern");
  static ref NON_WORD: Regex = Regex::new(r"[^\w]+").expect("static pattern");
}


/// Keywords for group `group`, or `None` for a group nobody knows about.
pub fn group_keywords(group: &str) -> Option<&'static [&'static str]> {
  GROUPS.iter()
        .find(|(name, _)| *name == group)
        .map(|(_, keywords)| *keywords)
}

/// Whether table `table` is selected by any of `keywords`.
pub fn table_matches(table: &str, keywords: &[&str]) -> bool {
  let table = table.to_lowercase();
  keywords.iter().any(|keyword| table.contains(keyword))
}

/// Discrete channels (gear, flags, lap counters, ...) are held, everything
/// else is interpolated.
pub fn channel_kind(name: &str) -> ChannelKind {
  let name = name.to_lowercase();
  if STEP_KEYWORDS.iter().any(|keyword| name.contains(keyword)) {
    ChannelKind::Step
  } else {
    ChannelKind::Continuous
  }
}

/// Maps generic slot column names to wheel positions, leaves others alone.
pub fn wheel_suffix(column: &str) -> String {
  let lower = column.to_lowercase();
  WHEEL_SLOTS.iter()
             .find(|(slot, _)| *slot == lower)
             .map(|(_, wheel)| wheel.to_string())
             .unwrap_or_else(|| column.to_string())
}

/// Produces the canonical channel name for a column of a table.
///
/// Single column tables are named after the table, multi column tables get
/// the (wheel mapped) column name appended.
pub fn channel_name(table: &str, column: &str, columns: usize) -> String {
  let raw = if columns == 1 {
    table.to_string()
  } else {
    format!("{}_{}", table, wheel_suffix(column))
  };
  sanitize(&beautify(&raw))
}

/// Shortens position words (`Left` to `L`, `Centre` to `C` and so on).
///
/// Only words with an underscore on both sides are shortened, so a position
/// word at either end of the name (`Brake_Temp_Left`) is kept as is.
pub fn beautify(raw: &str) -> String {
  let mut name = raw.to_string();
  for (pattern, abbr) in BEAUTIFY.iter() {
    name = pattern.replace_all(&name, *abbr).into_owned();
  }
  UNDERSCORES.replace_all(&name, "_").trim_matches('_').to_string()
}

/// Replaces everything that is not a word character by `_`.
pub fn sanitize(name: &str) -> String {
  let name = NON_WORD.replace_all(name, "_");
  UNDERSCORES.replace_all(&name, "_").trim_matches('_').to_string()
}

/// Guesses unit and displayed decimal places from a channel name.
pub fn units_and_decimals(name: &str) -> (&'static str, u8) {
  let n = name.to_lowercase();
  let has = |keys: &[&str]| keys.iter().any(|key| n.contains(key));

  if has(&["temp"]) {
    ("degC", 1)
  } else if has(&["pressure", "boost", "turbo"]) {
    ("bar", 3)
  } else if has(&["rideheight", "ride_height", "susp", "deflection"])
            || (n.contains("height") && !n.contains("headlights"))
  {
    ("mm", 1)
  } else if has(&["speed"]) {
    ("km/h", 1)
  } else if has(&["rpm"]) {
    ("rpm", 0)
  } else if has(&["angle", "steer"]) {
    ("deg", 1)
  } else if has(&["g_force", "accel", "acceleration"]) {
    ("g", 3)
  } else {
    ("", 2)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;


  #[test]
  fn groups_test() {
    assert_eq!(GROUPS.len(), DEFAULT_RATES.len());
    for ((group, _), (rated, _)) in GROUPS.iter().zip(DEFAULT_RATES.iter()) {
      assert_eq!(group, rated);
    }
    assert!(group_keywords("Tyres").unwrap().contains(&"pressure"));
    assert_eq!(None, group_keywords("Aliens"));

    assert!(table_matches("Tyre Pressure", group_keywords("Tyres").unwrap()));
    assert!(table_matches("THROTTLE", group_keywords("Driver").unwrap()));
    assert!(!table_matches("Speed", group_keywords("Driver").unwrap()));
  }

  #[test]
  fn channel_kind_test() {
    assert_eq!(ChannelKind::Step, channel_kind("Gear"));
    assert_eq!(ChannelKind::Step, channel_kind("Lap"));
    assert_eq!(ChannelKind::Step, channel_kind("ABS_Active"));
    assert_eq!(ChannelKind::Step, channel_kind("Pit_Limiter"));
    assert_eq!(ChannelKind::Continuous, channel_kind("Throttle"));
    assert_eq!(ChannelKind::Continuous, channel_kind("Speed"));
  }

  #[test]
  fn channel_name_test() {
    assert_eq!("Throttle", channel_name("Throttle", "value", 1));
    assert_eq!("Tyre_Pressure_FL", channel_name("Tyre Pressure", "value1", 4));
    assert_eq!("Tyre_Pressure_RR", channel_name("Tyre Pressure", "VALUE4", 4));
    assert_eq!("Tyre_Temp_extra", channel_name("Tyre Temp", "extra", 2));
    assert_eq!("Tyre_Temp_L_Inner",
               channel_name("Tyre_Temp_Left_Inner", "x", 1));
    assert_eq!("Tyre_L_I_Temp", channel_name("Tyre_Left_Inner_Temp", "x", 1));
    assert_eq!("Wing_Centre", channel_name("Wing Centre", "x", 1));
  }

  #[test]
  fn beautify_test() {
    assert_eq!("Brake_Temp_Left", beautify("Brake_Temp_Left"));
    assert_eq!("Brake_L_Temp", beautify("Brake_left_Temp"));
    assert_eq!("Susp_R_Outer", beautify("Susp_Right_Outer"));
    assert_eq!("Susp_R_O_Travel", beautify("Susp_Right_Outer_Travel"));
    assert_eq!("Wing_Centre", beautify("Wing_Centre"));
    assert_eq!("Tyre_M", beautify("__Tyre__Middle__"));
    assert_eq!("Leftover", beautify("Leftover"));
    assert_eq!("G_Force_Lat", sanitize("G Force (Lat)"));
  }

  #[test]
  fn units_and_decimals_test() {
    assert_eq!(("degC", 1), units_and_decimals("Tyre_Temp_FL"));
    assert_eq!(("bar", 3), units_and_decimals("Tyre_Pressure_FL"));
    assert_eq!(("bar", 3), units_and_decimals("Turbo_Boost"));
    assert_eq!(("mm", 1), units_and_decimals("Ride_Height_F"));
    assert_eq!(("", 2), units_and_decimals("Headlights"));
    assert_eq!(("km/h", 1), units_and_decimals("Speed"));
    assert_eq!(("rpm", 0), units_and_decimals("Engine_RPM"));
    assert_eq!(("deg", 1), units_and_decimals("Steering_Angle"));
    assert_eq!(("g", 3), units_and_decimals("Lateral_Acceleration"));
    assert_eq!(("", 2), units_and_decimals("Fuel_Level"));
  }
}
