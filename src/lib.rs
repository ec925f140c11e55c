// Copyright 2020 bmc::labs Gmbh. All rights reserved.
//
// Author: Florian Eich <florian@bmc-labs.com>

//! Converts table-oriented telemetry recordings into a uniformly sampled
//! channel set with detected laps, and writes it as CSV or as an LD log.
//!
//! A conversion is three passes: `Resampler` aligns every table to one master
//! timeline, `LapDetection` derives beacon, lap and lap time channels from
//! it, and `LdDocument` lays the result out in the binary container.

pub mod channel;
mod config;
pub mod export;
pub mod lap;
mod ldfile;
pub mod ldlayout;
pub mod resample;
pub mod rules;
mod run;
pub mod source;

pub use channel::{Channel, ChannelKind, ChannelSet, Samples};
pub use config::{Config, GroupRate, RateConfig, SessionInfo};
pub use eyre::Result;
pub use lap::{LapDetection, LapInfo, LapSource};
pub use ldfile::{prepare_channels, ChannelRecord, LdDocument, LdHeader,
                 TypedArray};
pub use resample::Resampler;
pub use run::Run;
pub use source::{CsvSource, MemorySource, TableSource};
