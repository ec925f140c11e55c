// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{ldlayout::{self as ld, chan, event, head, vehicle, venue},
            Channel,
            Samples,
            SessionInfo};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use eyre::{ensure, eyre, Result, WrapErr};
use getset::{CopyGetters, Getters};
use rayon::prelude::*;
use std::{collections::HashMap, fs, path::Path};
use tracing::{debug, info};


/// Sample values in the fixed-width representation stored on disk.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedArray {
  F32(Vec<f32>),
  I32(Vec<i32>),
}

impl TypedArray {
  /// Narrows the samples of `channel`: floats become `f32`, integers `i32`.
  ///
  /// # Returns
  /// an error if an integer sample does not fit into 32 bits.
  pub fn from_channel(channel: &Channel) -> Result<Self> {
    match channel.samples() {
      Samples::Float(values) => {
        Ok(TypedArray::F32(values.iter().map(|&v| v as f32).collect()))
      }
      Samples::Integer(values) => {
        let values = values.iter()
                           .enumerate()
                           .map(|(idx, &value)| narrow(channel, idx, value))
                           .collect::<Result<Vec<_>>>()?;
        Ok(TypedArray::I32(values))
      }
    }
  }

  pub fn len(&self) -> usize {
    match self {
      TypedArray::F32(values) => values.len(),
      TypedArray::I32(values) => values.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Size of a single sample in bytes.
  pub fn type_size(&self) -> u16 {
    4
  }

  pub fn type_class(&self) -> u16 {
    match self {
      TypedArray::F32(_) => chan::TYPE_CLASS_FLOAT,
      TypedArray::I32(_) => chan::TYPE_CLASS_INT,
    }
  }

  pub fn byte_len(&self) -> usize {
    self.len() * self.type_size() as usize
  }

  fn write_to(&self, out: &mut [u8]) {
    match self {
      TypedArray::F32(values) => LittleEndian::write_f32_into(values, out),
      TypedArray::I32(values) => LittleEndian::write_i32_into(values, out),
    }
  }
}

fn narrow(channel: &Channel, idx: usize, value: i64) -> Result<i32> {
  i32::try_from(value).map_err(|_| {
                        eyre!("sample {} ({}) of channel '{}' does not fit \
                               into i32",
                              idx,
                              value,
                              channel.name())
                      })
}


/// Converts all channels to their on-disk representation.
///
/// The conversions are independent of each other and run on a thread pool of
/// `workers` threads (`None` lets rayon decide). A single channel or
/// `workers == Some(1)` runs on the calling thread. Any failing conversion
/// fails the whole preparation.
///
/// # Returns
/// the converted arrays keyed by channel name.
pub fn prepare_channels(channels: &[Channel],
                        workers: Option<usize>)
                        -> Result<HashMap<String, TypedArray>>
{
  let convert = |channel: &Channel| {
    TypedArray::from_channel(channel).map(|array| {
                                       (channel.name().clone(), array)
                                     })
  };

  if workers == Some(1) || channels.len() <= 1 {
    debug!(channels = channels.len(), "preparing channels sequentially");
    return channels.iter().map(convert).collect();
  }

  let pool = rayon::ThreadPoolBuilder::new().num_threads(workers.unwrap_or(0))
                                            .build()
                                            .wrap_err("could not build worker \
                                                       pool")?;
  debug!(channels = channels.len(),
         workers = pool.current_num_threads(),
         "preparing channels in parallel");
  pool.install(|| channels.par_iter().map(convert).collect())
}


/// Pointers stored in the file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct LdHeader {
  meta_ptr:  u32,
  data_ptr:  u32,
  aux_ptr:   u32,
  event_ptr: u32,
}

impl Default for LdHeader {
  fn default() -> Self {
    Self { meta_ptr:  ld::CHANNEL_META_PTR,
           data_ptr:  ld::CHANNEL_META_PTR,
           aux_ptr:   0,
           event_ptr: ld::EVENT_PTR, }
  }
}


/// A channel metadata record together with its data.
#[derive(Clone, Debug, PartialEq, CopyGetters, Getters)]
pub struct ChannelRecord {
  #[getset(get_copy = "pub")]
  meta_ptr:      u32,
  #[getset(get_copy = "pub")]
  prev_meta_ptr: u32,
  #[getset(get_copy = "pub")]
  next_meta_ptr: u32,
  #[getset(get_copy = "pub")]
  data_ptr:      u32,
  #[getset(get_copy = "pub")]
  frequency:     u16,
  #[getset(get_copy = "pub")]
  decimals:      i16,
  #[getset(get = "pub")]
  name:          String,
  #[getset(get = "pub")]
  unit:          String,
  #[getset(get = "pub")]
  data:          TypedArray,
}

impl ChannelRecord {
  fn data_end(&self) -> Result<u32> {
    u32::try_from(self.data.byte_len())
      .ok()
      .and_then(|len| self.data_ptr.checked_add(len))
      .ok_or_else(|| eyre!("data of channel '{}' exceeds the file size limit",
                           self.name))
  }
}

/// Moves `ptr` forward by one metadata record.
fn advance(ptr: u32) -> Result<u32> {
  ptr.checked_add(ld::CHANNEL_META_SIZE)
     .ok_or_else(|| eyre!("log exceeds the 32 bit pointer range"))
}


/// An LD log under construction.
///
/// Channels are appended one after another; every append moves the data
/// region behind the grown metadata region, so all pointers stay valid for
/// the file as it would be written at any point. `finish` consumes the
/// document, so it is finalized exactly once.
#[derive(Clone, Debug, PartialEq, CopyGetters, Getters)]
pub struct LdDocument {
  #[getset(get = "pub")]
  session:       SessionInfo,
  #[getset(get_copy = "pub")]
  header:        LdHeader,
  #[getset(get = "pub")]
  records:       Vec<ChannelRecord>,
  #[getset(get = "pub")]
  beacon_times:  Vec<f64>,
  #[getset(get_copy = "pub")]
  zero_decimals: bool,
}


// CONSTRUCTION ------------------------------------------------------------ //
impl LdDocument {
  /// Creates an empty document.
  ///
  /// # Arguments
  /// - `session`: descriptive information for the preamble
  /// - `zero_decimals`: record `0` decimal places for every channel
  pub fn new(session: SessionInfo, zero_decimals: bool) -> Self {
    Self { session,
           header: LdHeader::default(),
           records: Vec::new(),
           beacon_times: Vec::new(),
           zero_decimals }
  }

  /// Sets the lap beacon timestamps stored in the auxiliary block.
  pub fn set_beacon_times(&mut self, times: Vec<f64>) {
    self.beacon_times = times;
  }

  /// Appends a channel with its prepared data.
  ///
  /// # Arguments
  /// - `channel`: name, unit and precision of the channel
  /// - `frequency`: sample rate in Hz
  /// - `data`: the samples as prepared by `prepare_channels`
  pub fn append_channel(&mut self,
                        channel: &Channel,
                        frequency: u16,
                        data: TypedArray)
                        -> Result<()>
  {
    ensure!(data.len() == channel.len(),
            "prepared data of channel '{}' has {} samples, expected {}",
            channel.name(),
            data.len(),
            channel.len());

    let (meta_ptr, prev_meta_ptr, data_ptr) = match self.records.last() {
      Some(previous) => {
        (previous.next_meta_ptr, previous.meta_ptr, previous.data_end()?)
      }
      None => (self.header.meta_ptr, 0, self.header.data_ptr),
    };

    // the new metadata record pushes the whole data region back; nothing is
    // committed unless every pointer still fits
    let header_data_ptr = advance(self.header.data_ptr)?;
    let shifted = self.records
                      .iter()
                      .map(|record| advance(record.data_ptr))
                      .collect::<Result<Vec<_>>>()?;
    let next_meta_ptr = advance(meta_ptr)?;
    let data_ptr = advance(data_ptr)?;

    self.header.data_ptr = header_data_ptr;
    for (record, data_ptr) in self.records.iter_mut().zip(shifted) {
      record.data_ptr = data_ptr;
    }

    let decimals = if self.zero_decimals {
      0
    } else {
      i16::from(channel.decimals())
    };

    self.records.push(ChannelRecord { meta_ptr,
                                      prev_meta_ptr,
                                      next_meta_ptr,
                                      data_ptr,
                                      frequency,
                                      decimals,
                                      name: channel.name().clone(),
                                      unit: channel.unit().clone(),
                                      data });
    Ok(())
  }

  /// Builds a document from `channels` in their given order.
  ///
  /// The typed arrays are prepared up front (possibly in parallel), then
  /// appended sequentially.
  pub fn from_channels(session: SessionInfo,
                       zero_decimals: bool,
                       channels: &[Channel],
                       frequency: u32,
                       workers: Option<usize>)
                       -> Result<Self>
  {
    let frequency = u16::try_from(frequency)
      .map_err(|_| eyre!("frequency {} Hz does not fit the format", frequency))?;
    let mut prepared = prepare_channels(channels, workers)?;

    let mut document = Self::new(session, zero_decimals);
    for channel in channels {
      let data = prepared.remove(channel.name()).ok_or_else(|| {
                                                  eyre!("channel '{}' was not \
                                                         prepared",
                                                        channel.name())
                                                })?;
      document.append_channel(channel, frequency, data)?;
    }
    Ok(document)
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}


// SERIALIZATION ----------------------------------------------------------- //
impl LdDocument {
  /// Finalizes the document and renders the complete file.
  ///
  /// The last record's `next_meta_ptr` is zeroed and, if beacon timestamps
  /// are present, the auxiliary block is placed right after the last
  /// channel's data. Without channels only the preamble is rendered.
  pub fn finish(mut self) -> Result<Vec<u8>> {
    let data_end = match self.records.last_mut() {
      Some(last) => {
        last.next_meta_ptr = 0;
        last.data_end()?
      }
      None => ld::preamble_size() as u32,
    };

    let mut aux = Vec::new();
    if !self.records.is_empty() && !self.beacon_times.is_empty() {
      self.header.aux_ptr = data_end;
      aux.write_u32::<LittleEndian>(self.beacon_times.len() as u32)?;
      for &time in &self.beacon_times {
        aux.write_f32::<LittleEndian>(time as f32)?;
      }
    }

    let mut buf = vec![0u8; data_end as usize + aux.len()];
    self.write_preamble(&mut buf);
    for (idx, record) in self.records.iter().enumerate() {
      write_record(&mut buf, idx, record);
    }
    buf[data_end as usize..].copy_from_slice(&aux);

    debug!(bytes = buf.len(), channels = self.records.len(), "ld file built");
    Ok(buf)
  }

  /// Finalizes the document and writes it to `path` in a single call.
  pub fn write(self, path: &Path) -> Result<()> {
    let channels = self.records.len();
    let bytes = self.finish()?;
    fs::write(path, &bytes)
      .wrap_err_with(|| format!("could not write {}", path.display()))?;
    info!(path = %path.display(), channels, bytes = bytes.len(), "ld written");
    Ok(())
  }

  fn write_preamble(&self, buf: &mut [u8]) {
    let session = &self.session;
    let header = &self.header;
    let datetime = session.datetime();

    ld::put_u32(buf, head::MARKER, head::MARKER_VALUE);
    ld::put_u32(buf, head::META_PTR, header.meta_ptr);
    ld::put_u32(buf, head::DATA_PTR, header.data_ptr);
    ld::put_u32(buf, head::AUX_PTR, header.aux_ptr);
    ld::put_u32(buf, head::EVENT_PTR, header.event_ptr);
    for (idx, &constant) in head::CONSTANT_VALUES.iter().enumerate() {
      ld::put_u16(buf, head::CONSTANTS + 2 * idx, constant);
    }
    ld::put_u32(buf, head::DEVICE_SERIAL, head::DEVICE_SERIAL_VALUE);
    ld::put_str(buf,
                head::DEVICE_TYPE,
                head::DEVICE_TYPE_WIDTH,
                head::DEVICE_TYPE_VALUE);
    ld::put_u16(buf, head::DEVICE_VERSION, head::DEVICE_VERSION_VALUE);
    ld::put_u16(buf, head::MAGIC, head::MAGIC_VALUE);
    ld::put_u32(buf, head::CHANNEL_COUNT, self.records.len() as u32);
    ld::put_str(buf,
                head::DATE,
                head::DATETIME_WIDTH,
                &datetime.format("%d/%m/%Y").to_string());
    ld::put_str(buf,
                head::TIME,
                head::DATETIME_WIDTH,
                &datetime.format("%H:%M:%S").to_string());
    ld::put_str(buf, head::DRIVER, head::STRING_WIDTH, session.driver());
    ld::put_str(buf,
                head::VEHICLE_ID,
                head::STRING_WIDTH,
                session.vehicle_id());
    ld::put_str(buf, head::VENUE, head::STRING_WIDTH, session.venue());
    ld::put_u32(buf, head::PRO_LOGGING, head::PRO_LOGGING_VALUE);
    ld::put_str(buf,
                head::SHORT_COMMENT,
                head::STRING_WIDTH,
                session.short_comment());

    let at = ld::VEHICLE_PTR as usize;
    ld::put_str(buf,
                at + vehicle::ID,
                vehicle::ID_WIDTH,
                session.vehicle_id());
    ld::put_u32(buf, at + vehicle::WEIGHT, *session.vehicle_weight());
    ld::put_str(buf,
                at + vehicle::TYPE,
                vehicle::TEXT_WIDTH,
                session.vehicle_type());
    ld::put_str(buf,
                at + vehicle::COMMENT,
                vehicle::TEXT_WIDTH,
                session.vehicle_comment());

    let at = ld::VENUE_PTR as usize;
    ld::put_str(buf, at + venue::NAME, venue::NAME_WIDTH, session.venue());
    ld::put_u16(buf, at + venue::VEHICLE_PTR, ld::VEHICLE_PTR as u16);

    let at = ld::EVENT_PTR as usize;
    ld::put_str(buf, at + event::NAME, event::NAME_WIDTH, session.event());
    ld::put_str(buf,
                at + event::SESSION,
                event::NAME_WIDTH,
                session.session());
    ld::put_str(buf,
                at + event::COMMENT,
                event::COMMENT_WIDTH,
                session.long_comment());
    ld::put_u16(buf, at + event::VENUE_PTR, ld::VENUE_PTR as u16);
  }
}

fn write_record(buf: &mut [u8], idx: usize, record: &ChannelRecord) {
  let at = record.meta_ptr as usize;
  ld::put_u32(buf, at + chan::PREV_META_PTR, record.prev_meta_ptr);
  ld::put_u32(buf, at + chan::NEXT_META_PTR, record.next_meta_ptr);
  ld::put_u32(buf, at + chan::DATA_PTR, record.data_ptr);
  ld::put_u32(buf, at + chan::SAMPLE_COUNT, record.data.len() as u32);
  ld::put_u16(buf,
              at + chan::COUNTER,
              chan::COUNTER_BASE.wrapping_add(idx as u16));
  ld::put_u16(buf, at + chan::TYPE_CLASS, record.data.type_class());
  ld::put_u16(buf, at + chan::TYPE_SIZE, record.data.type_size());
  ld::put_u16(buf, at + chan::FREQUENCY, record.frequency);
  ld::put_i16(buf, at + chan::SHIFT, 0);
  ld::put_i16(buf, at + chan::MULTIPLIER, 1);
  ld::put_i16(buf, at + chan::SCALE, 1);
  ld::put_i16(buf, at + chan::DECIMALS, record.decimals);
  ld::put_str(buf, at + chan::NAME, chan::NAME_WIDTH, &record.name);
  ld::put_str(buf, at + chan::SHORT_NAME, chan::SHORT_NAME_WIDTH, "");
  ld::put_str(buf, at + chan::UNIT, chan::UNIT_WIDTH, &record.unit);

  let start = record.data_ptr as usize;
  record.data
        .write_to(&mut buf[start..start + record.data.byte_len()]);
}
