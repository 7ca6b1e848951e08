/**************************************************************************
 *                                                                        *
 * Rust extractor/decoder for the EA Layer 3 audio container.             *
 *                                                                        *
 * Copyright (C) 2026, the ealayer3 authors.                              *
 *                                                                        *
 * This program is free software; you can redistribute it and/or modify   *
 * it under the terms of the GNU General Public License as published by   *
 * the Free Software Foundation, either version 3 of the License, or      *
 * (at your option) any later version.                                    *
 *                                                                        *
 * This program is distributed in the hope that it will be useful,        *
 * but WITHOUT ANY WARRANTY; without even the implied warranty of         *
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the           *
 * GNU General Public License for more details.                           *
 *                                                                        *
 * You should have received a copy of the GNU General Public License      *
 * along with this program. If not, see <http://www.gnu.org/licenses/>.   *
 *                                                                        *
 **************************************************************************/

//! The MPEG Layer III data model shared by every stage of the pipeline:
//! the container parser produces it, the frame assembler and the container
//! generator consume it.

use crate::error::{EaError, Result};

/// Worst-case MPEG frame size; anything larger is malformed.
pub const MAX_MPEG_FRAME_SIZE: usize = 2880;

/// The bit reservoir is addressed by a 9-bit byte offset.
pub const MAX_RESERVOIR_SIZE: usize = 511;

/// Sample rates in Hz, indexed by the 2-bit header version field and the
/// 2-bit sample rate index.  Zeros mark reserved encodings.
pub const MPEG_SAMPLE_RATES: [[u32; 4]; 4] = [
  [11025, 12000, 8000, 0],
  [0, 0, 0, 0],
  [22050, 24000, 16000, 0],
  [44100, 48000, 32000, 0],
];

/// Layer III bitrates in kbit/s by bitrate index; index 0 is free-form.
pub const BIT_RATES_MPEG1: [u32; 15] =
  [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
pub const BIT_RATES_MPEG2: [u32; 15] =
  [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
  Mpeg1,
  Mpeg2,
  Mpeg25,
}

impl MpegVersion {
  pub fn from_header_bits(bits: u32) -> Result<Self> {
    match bits {
      3 => Ok(MpegVersion::Mpeg1),
      2 => Ok(MpegVersion::Mpeg2),
      0 => Ok(MpegVersion::Mpeg25),
      _ => Err(EaError::ReservedMpegVersion),
    }
  }

  pub fn header_bits(self) -> u32 {
    match self {
      MpegVersion::Mpeg1 => 3,
      MpegVersion::Mpeg2 => 2,
      MpegVersion::Mpeg25 => 0,
    }
  }

  #[inline(always)]
  pub fn is_mpeg1(self) -> bool {
    self == MpegVersion::Mpeg1
  }

  pub fn samples_per_frame(self) -> u32 {
    if self.is_mpeg1() {
      1152
    } else {
      576
    }
  }

  /// MPEG-1 frames carry two granules, MPEG-2/2.5 frames one.
  pub fn granule_count(self) -> usize {
    if self.is_mpeg1() {
      2
    } else {
      1
    }
  }

  pub fn main_data_begin_bits(self) -> usize {
    if self.is_mpeg1() {
      9
    } else {
      8
    }
  }

  /// Width of the second, opaque per-channel side info word.
  pub fn side_info1_bits(self) -> usize {
    if self.is_mpeg1() {
      15
    } else {
      19
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
  Stereo,
  JointStereo,
  DualChannel,
  Mono,
}

impl ChannelMode {
  pub fn from_header_bits(bits: u32) -> Self {
    match bits & 3 {
      0 => ChannelMode::Stereo,
      1 => ChannelMode::JointStereo,
      2 => ChannelMode::DualChannel,
      _ => ChannelMode::Mono,
    }
  }

  pub fn header_bits(self) -> u32 {
    match self {
      ChannelMode::Stereo => 0,
      ChannelMode::JointStereo => 1,
      ChannelMode::DualChannel => 2,
      ChannelMode::Mono => 3,
    }
  }

  pub fn channels(self) -> usize {
    if self == ChannelMode::Mono {
      1
    } else {
      2
    }
  }
}

/// Frame size in bytes for the given bitrate index, padding excluded.
pub fn frame_size(version: MpegVersion, bitrate_index: usize, sample_rate: u32) -> usize {
  let kbps = if version.is_mpeg1() {
    BIT_RATES_MPEG1[bitrate_index]
  } else {
    BIT_RATES_MPEG2[bitrate_index]
  };
  let factor: u32 = if version.is_mpeg1() { 144 } else { 72 };
  (factor * kbps * 1000 / sample_rate) as usize
}

/// Side info block size in bytes, the scfsi and size fields included.
pub fn side_info_size(version: MpegVersion, channels: usize) -> usize {
  match (version.is_mpeg1(), channels) {
    (true, 1) => 17,
    (true, _) => 32,
    (false, 1) => 9,
    (false, _) => 17,
  }
}

/// Width of the private bit run that follows main_data_begin.
pub fn private_bits(version: MpegVersion, channels: usize) -> usize {
  match (version.is_mpeg1(), channels) {
    (true, 1) => 5,
    (true, _) => 3,
    (false, 1) => 1,
    (false, _) => 2,
  }
}

/// Per-channel side information of one granule.  `side_info` is carried
/// verbatim so that container round trips are bit-exact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelInfo {
  /// Scale factor selection information; only meaningful on the second
  /// granule of an MPEG-1 frame.
  pub scfsi: u8,
  /// Main data length of this channel in bits.
  pub size: u16,
  /// 32 + (15 or 19) opaque side info bits.
  pub side_info: [u32; 2],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Granule {
  pub used: bool,
  pub version: MpegVersion,
  pub sample_rate_index: u8,
  pub sample_rate: u32,
  pub channel_mode: ChannelMode,
  pub mode_extension: u8,
  /// Position within the frame, 0 or 1.
  pub index: u8,
  /// Reservoir offset as declared by the source bitstream.  EALayer3
  /// preserves it for round trips; granules parsed from standard MP3 carry
  /// fully resolved main data and declare 0.
  pub main_data_begin: u16,
  pub channel_info: Vec<ChannelInfo>,
  /// Byte-aligned main data; trailing bits beyond `data_size_bits` are zero.
  pub data: Vec<u8>,
  pub data_size_bits: u32,
}

impl Granule {
  /// A placeholder for an absent granule slot.
  pub fn unused(index: u8) -> Self {
    Granule {
      used: false,
      version: MpegVersion::Mpeg1,
      sample_rate_index: 0,
      sample_rate: 0,
      channel_mode: ChannelMode::Mono,
      mode_extension: 0,
      index,
      main_data_begin: 0,
      channel_info: Vec::new(),
      data: Vec::new(),
      data_size_bits: 0,
    }
  }

  pub fn channels(&self) -> usize {
    self.channel_mode.channels()
  }

  /// Main data length rounded up to whole bytes.
  pub fn data_size(&self) -> usize {
    ((self.data_size_bits + 7) / 8) as usize
  }
}

/// One MPEG Layer III frame, demultiplexed and with its main data resolved
/// out of any reservoir it was spread over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  pub granules: [Granule; 2],
  pub stream_index: usize,
}

impl Frame {
  pub fn empty(stream_index: usize) -> Self {
    Frame {
      granules: [Granule::unused(0), Granule::unused(1)],
      stream_index,
    }
  }

  pub fn first_used(&self) -> Option<&Granule> {
    self.granules.iter().find(|g| g.used)
  }

  pub fn is_empty(&self) -> bool {
    self.first_used().is_none()
  }

  /// PCM sample count this frame decodes to (per channel).
  pub fn samples(&self) -> u32 {
    match self.first_used() {
      Some(g) => g.version.samples_per_frame(),
      None => 0,
    }
  }

  pub fn total_data_bits(&self) -> u32 {
    self.granules.iter().filter(|g| g.used).map(|g| g.data_size_bits).sum()
  }
}


//
//
//            #######
//               #       ######     ####     #####     ####
//               #       #         #           #      #
//               #       #####      ####       #       ####
//               #       #              #      #           #
//               #       #         #    #      #      #    #
//               #       ######     ####       #       ####
//
//

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_version_round_trip() {
    for version in [MpegVersion::Mpeg1, MpegVersion::Mpeg2, MpegVersion::Mpeg25] {
      assert_eq!(version, MpegVersion::from_header_bits(version.header_bits()).unwrap());
    }
    assert!(MpegVersion::from_header_bits(1).is_err());
  }

  #[test]
  fn test_sample_rates() {
    assert_eq!(44100, MPEG_SAMPLE_RATES[MpegVersion::Mpeg1.header_bits() as usize][0]);
    assert_eq!(22050, MPEG_SAMPLE_RATES[MpegVersion::Mpeg2.header_bits() as usize][0]);
    assert_eq!(8000, MPEG_SAMPLE_RATES[MpegVersion::Mpeg25.header_bits() as usize][2]);
  }

  #[test]
  fn test_frame_size() {
    // 128 kbit/s at 44.1 kHz is the classic 417 byte frame.
    assert_eq!(417, frame_size(MpegVersion::Mpeg1, 9, 44100));
    assert_eq!(104, frame_size(MpegVersion::Mpeg1, 1, 44100));
    assert_eq!(1044, frame_size(MpegVersion::Mpeg1, 14, 44100));
    // MPEG-2, 64 kbit/s at 22.05 kHz.
    assert_eq!(208, frame_size(MpegVersion::Mpeg2, 8, 22050));
  }

  #[test]
  fn test_side_info_tables() {
    assert_eq!(17, side_info_size(MpegVersion::Mpeg1, 1));
    assert_eq!(32, side_info_size(MpegVersion::Mpeg1, 2));
    assert_eq!(9, side_info_size(MpegVersion::Mpeg2, 1));
    assert_eq!(17, side_info_size(MpegVersion::Mpeg25, 2));

    assert_eq!(5, private_bits(MpegVersion::Mpeg1, 1));
    assert_eq!(3, private_bits(MpegVersion::Mpeg1, 2));
    assert_eq!(1, private_bits(MpegVersion::Mpeg2, 1));
    assert_eq!(2, private_bits(MpegVersion::Mpeg25, 2));

    // The side info block is self-consistent: header fields plus the
    // per-channel records fill it exactly.
    for version in [MpegVersion::Mpeg1, MpegVersion::Mpeg2] {
      for channels in [1usize, 2] {
        let scfsi = if version.is_mpeg1() { 4 * channels } else { 0 };
        let per_channel = 12 + 32 + version.side_info1_bits();
        let bits = version.main_data_begin_bits()
          + private_bits(version, channels)
          + scfsi
          + version.granule_count() * channels * per_channel;
        assert_eq!(side_info_size(version, channels) * 8, bits);
      }
    }
  }

  #[test]
  fn test_granule_data_size_rounds_up() {
    let mut granule = Granule::unused(0);
    granule.data_size_bits = 20;
    assert_eq!(3, granule.data_size());
    granule.data_size_bits = 24;
    assert_eq!(3, granule.data_size());
    granule.data_size_bits = 0;
    assert_eq!(0, granule.data_size());
  }

  #[test]
  fn test_empty_frame() {
    let frame = Frame::empty(0);
    assert!(frame.is_empty());
    assert_eq!(0, frame.samples());
    assert_eq!(0, frame.total_data_bits());
  }
}
