// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Author: Florian Eich <florian@bmc-labs.com>

//! Byte layout of LD files.
//!
//! The absolute positions of the preamble blocks are fixed by the format as
//! found in files written by the data loggers themselves; nothing in here is
//! computed. All multi-byte fields are little endian.

use byteorder::{ByteOrder, LittleEndian};


/// Vehicle block.
pub const VEHICLE_PTR: u32 = 1762;
/// Venue block, points back at the vehicle block.
pub const VENUE_PTR: u32 = 5078;
/// Event block, points back at the venue block.
pub const EVENT_PTR: u32 = 8180;
/// First channel metadata record.
pub const CHANNEL_META_PTR: u32 = 11336;
/// Size of one channel metadata record.
pub const CHANNEL_META_SIZE: u32 = 124;


/// File header at offset zero.
pub mod head {
  pub const MARKER: usize = 0;
  pub const META_PTR: usize = 8;
  pub const DATA_PTR: usize = 12;
  pub const AUX_PTR: usize = 16;
  pub const EVENT_PTR: usize = 36;
  pub const CONSTANTS: usize = 64;
  pub const DEVICE_SERIAL: usize = 70;
  pub const DEVICE_TYPE: usize = 74;
  pub const DEVICE_VERSION: usize = 82;
  pub const MAGIC: usize = 84;
  pub const CHANNEL_COUNT: usize = 86;
  pub const DATE: usize = 94;
  pub const TIME: usize = 126;
  pub const DRIVER: usize = 158;
  pub const VEHICLE_ID: usize = 222;
  pub const VENUE: usize = 350;
  pub const PRO_LOGGING: usize = 1502;
  pub const SHORT_COMMENT: usize = 1572;
  pub const SIZE: usize = 1636;

  pub const MARKER_VALUE: u32 = 0x40;
  pub const CONSTANT_VALUES: [u16; 3] = [1, 0x4240, 0xf];
  pub const DEVICE_SERIAL_VALUE: u32 = 0x1f44;
  pub const DEVICE_TYPE_VALUE: &str = "ADL";
  pub const DEVICE_VERSION_VALUE: u16 = 420;
  pub const MAGIC_VALUE: u16 = 0xadb0;
  pub const PRO_LOGGING_VALUE: u32 = 0xc81a4;

  pub const STRING_WIDTH: usize = 64;
  pub const DATETIME_WIDTH: usize = 16;
  pub const DEVICE_TYPE_WIDTH: usize = 8;
}

/// Vehicle block, relative to `VEHICLE_PTR`.
pub mod vehicle {
  pub const ID: usize = 0;
  pub const WEIGHT: usize = 192;
  pub const TYPE: usize = 196;
  pub const COMMENT: usize = 228;
  pub const SIZE: usize = 260;

  pub const ID_WIDTH: usize = 64;
  pub const TEXT_WIDTH: usize = 32;
}

/// Venue block, relative to `VENUE_PTR`.
pub mod venue {
  pub const NAME: usize = 0;
  pub const VEHICLE_PTR: usize = 1098;
  pub const SIZE: usize = 1100;

  pub const NAME_WIDTH: usize = 64;
}

/// Event block, relative to `EVENT_PTR`.
pub mod event {
  pub const NAME: usize = 0;
  pub const SESSION: usize = 64;
  pub const COMMENT: usize = 128;
  pub const VENUE_PTR: usize = 1152;
  pub const SIZE: usize = 1154;

  pub const NAME_WIDTH: usize = 64;
  pub const COMMENT_WIDTH: usize = 1024;
}

/// Channel metadata record, relative to its own meta pointer.
pub mod chan {
  pub const PREV_META_PTR: usize = 0;
  pub const NEXT_META_PTR: usize = 4;
  pub const DATA_PTR: usize = 8;
  pub const SAMPLE_COUNT: usize = 12;
  pub const COUNTER: usize = 16;
  pub const TYPE_CLASS: usize = 18;
  pub const TYPE_SIZE: usize = 20;
  pub const FREQUENCY: usize = 22;
  pub const SHIFT: usize = 24;
  pub const MULTIPLIER: usize = 26;
  pub const SCALE: usize = 28;
  pub const DECIMALS: usize = 30;
  pub const NAME: usize = 32;
  pub const SHORT_NAME: usize = 64;
  pub const UNIT: usize = 72;

  pub const NAME_WIDTH: usize = 32;
  pub const SHORT_NAME_WIDTH: usize = 8;
  pub const UNIT_WIDTH: usize = 12;

  pub const COUNTER_BASE: u16 = 0x2ee1;
  pub const TYPE_CLASS_FLOAT: u16 = 7;
  pub const TYPE_CLASS_INT: u16 = 5;
}

/// End of the last preamble block, i.e. the size of a file without channels.
pub fn preamble_size() -> usize {
  EVENT_PTR as usize + event::SIZE
}


pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
  LittleEndian::write_u16(&mut buf[offset..offset + 2], value);
}

pub fn put_i16(buf: &mut [u8], offset: usize, value: i16) {
  LittleEndian::write_i16(&mut buf[offset..offset + 2], value);
}

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
  LittleEndian::write_u32(&mut buf[offset..offset + 4], value);
}

/// Writes `text` into a zero padded field of `width` bytes, cutting off what
/// does not fit.
pub fn put_str(buf: &mut [u8], offset: usize, width: usize, text: &str) {
  let bytes = text.as_bytes();
  let len = bytes.len().min(width);
  buf[offset..offset + len].copy_from_slice(&bytes[..len]);
  for byte in &mut buf[offset + len..offset + width] {
    *byte = 0;
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;


  #[test]
  fn layout_test() {
    // blocks must not overlap each other or the channel records
    assert!(head::SIZE <= VEHICLE_PTR as usize);
    assert!(VEHICLE_PTR as usize + vehicle::SIZE <= VENUE_PTR as usize);
    assert!(VENUE_PTR as usize + venue::SIZE <= EVENT_PTR as usize);
    assert!(preamble_size() <= CHANNEL_META_PTR as usize);
    assert!(chan::UNIT + chan::UNIT_WIDTH <= CHANNEL_META_SIZE as usize);
    assert_eq!(9334, preamble_size());
  }

  #[test]
  fn put_test() {
    let mut buf = vec![0xffu8; 12];
    put_u32(&mut buf, 0, 0x0403_0201);
    put_u16(&mut buf, 4, 0x0605);
    put_i16(&mut buf, 6, -1);
    assert_eq!(&[1, 2, 3, 4, 5, 6, 0xff, 0xff], &buf[..8]);

    put_str(&mut buf, 8, 4, "ab");
    assert_eq!(&[b'a', b'b', 0, 0], &buf[8..]);
    put_str(&mut buf, 8, 4, "warblgarbl");
    assert_eq!(b"warb", &buf[8..]);
  }
}
