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

use tracing::debug;

use crate::bitstream::{BitReader, BitWriter};
use crate::blocks::{Block, ParserVersion};
use crate::error::{EaError, Result};
use crate::mpeg::Frame;
use crate::parser::stream_index_bits;

/// The stream count marker is a 4-bit field.
const MAX_GENERATOR_STREAMS: usize = 16;

///
/// The inverse of the parser: collects frames (one `add_frame` call per
/// stream and frame) and serializes them into container blocks.  Granules
/// are written self-contained, each with the `main_data_begin` its source
/// declared; frames parsed from standard MP3 declare 0 and never spill
/// across blocks.
///
pub struct EaGenerator {
  version: u8,
  stream_count: usize,
  pending: Vec<Frame>,
}

impl EaGenerator {
  pub fn new(version: u8, stream_count: usize) -> Result<Self> {
    if !(5..=7).contains(&version) {
      return Err(EaError::UnsupportedVersion(version));
    }
    if stream_count == 0 || stream_count > MAX_GENERATOR_STREAMS {
      return Err(EaError::TooManyStreams(stream_count));
    }
    Ok(EaGenerator {
      version,
      stream_count,
      pending: Vec::new(),
    })
  }

  /// Queue a frame for the next block.
  pub fn add_frame(&mut self, frame: Frame) -> Result<()> {
    if frame.stream_index >= self.stream_count {
      return Err(EaError::StreamIndexOutOfRange(
        frame.stream_index,
        self.stream_count,
      ));
    }
    self.pending.push(frame);
    Ok(())
  }

  pub fn pending_frames(&self) -> usize {
    self.pending.len()
  }

  /// Serialize everything queued so far into one block and clear the queue.
  pub fn generate(&mut self) -> Result<Block> {
    let mut sample_count = 0u32;
    let mut sample_rate = 0u32;
    let mut channels = 0usize;
    let mut capacity = 0usize;
    for frame in &self.pending {
      sample_count += frame.samples();
      if let Some(granule) = frame.first_used() {
        if sample_rate == 0 {
          sample_rate = granule.sample_rate;
          channels = granule.channels();
        }
      }
      capacity += 8 + frame.granules.iter().map(|g| 32 + g.data.len()).sum::<usize>();
    }

    let mut payload = vec![0u8; capacity];
    let mut wr = BitWriter::new(&mut payload);
    for frame in &self.pending {
      self.write_sub_frame(&mut wr, frame);
    }
    let size = wr.byte_len();
    payload.truncate(size);

    debug!(
      frames = self.pending.len(),
      size,
      "generated EALayer3 block"
    );
    self.pending.clear();

    Ok(Block {
      offset: 0,
      size: size as u32,
      sample_count,
      sample_rate,
      channels,
      payload,
    })
  }

  fn write_sub_frame(&self, wr: &mut BitWriter<'_>, frame: &Frame) {
    wr.write_bits(u32::from(self.version), 4);
    wr.write_bits((self.stream_count - 1) as u32, 4);
    wr.write_bits(
      frame.stream_index as u32,
      stream_index_bits(self.stream_count),
    );

    let packing = if self.version == 5 {
      ParserVersion::V5
    } else {
      ParserVersion::V6
    };

    for granule in &frame.granules {
      if !granule.used {
        wr.write_bits(0, 1);
        continue;
      }
      wr.write_bits(1, 1);
      wr.write_bits(granule.version.header_bits(), 2);
      wr.write_bits(u32::from(granule.sample_rate_index), 2);
      wr.write_bits(granule.channel_mode.header_bits(), 2);
      match packing {
        ParserVersion::V5 => {
          wr.write_bits(u32::from(granule.mode_extension), 2);
          wr.write_bits(u32::from(granule.index), 1);
        }
        ParserVersion::V6 => {
          wr.write_bits(u32::from(granule.index), 1);
          wr.write_bits(
            u32::from(granule.main_data_begin),
            granule.version.main_data_begin_bits(),
          );
          wr.write_bits(u32::from(granule.mode_extension), 2);
        }
      }

      for info in &granule.channel_info {
        match packing {
          ParserVersion::V5 => {
            wr.write_bits(u32::from(info.scfsi), 4);
            wr.write_bits(u32::from(info.size), 12);
          }
          ParserVersion::V6 => {
            wr.write_bits(u32::from(info.size), 12);
            wr.write_bits(u32::from(info.scfsi), 4);
          }
        }
        wr.write_bits(info.side_info[0], 32);
        wr.write_bits(info.side_info[1], granule.version.side_info1_bits());
      }

      if packing == ParserVersion::V5 {
        wr.write_bits(
          u32::from(granule.main_data_begin),
          granule.version.main_data_begin_bits(),
        );
      }

      if granule.data_size_bits > 0 {
        let mut rd = BitReader::new(&granule.data);
        let mut left = granule.data_size_bits as usize;
        while left > 0 {
          let take = left.min(32);
          wr.write_bits(rd.read_bits(take), take);
          left -= take;
        }
        wr.write_to_next_byte();
      }
    }

    wr.write_to_next_byte();
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
  use crate::mpeg::tests_support::mono_frame;

  #[test]
  fn test_rejects_bad_version() {
    match EaGenerator::new(4, 1) {
      Err(EaError::UnsupportedVersion(4)) => (),
      other => panic!("expected UnsupportedVersion, got {:?}", other.err()),
    }
  }

  #[test]
  fn test_rejects_stream_count_out_of_marker_range() {
    assert!(EaGenerator::new(5, 0).is_err());
    assert!(EaGenerator::new(5, 17).is_err());
    assert!(EaGenerator::new(5, 16).is_ok());
  }

  #[test]
  fn test_rejects_foreign_stream_index() {
    let mut gen = EaGenerator::new(5, 1).unwrap();
    match gen.add_frame(mono_frame(1, &[0x01], 8)) {
      Err(EaError::StreamIndexOutOfRange(1, 1)) => (),
      other => panic!("expected StreamIndexOutOfRange, got {:?}", other),
    }
  }

  #[test]
  fn test_block_metadata() {
    let mut gen = EaGenerator::new(5, 1).unwrap();
    gen.add_frame(mono_frame(0, &[0x01], 8)).unwrap();
    gen.add_frame(mono_frame(0, &[0x02], 8)).unwrap();
    assert_eq!(2, gen.pending_frames());

    let block = gen.generate().unwrap();
    assert_eq!(2 * 1152, block.sample_count);
    assert_eq!(44100, block.sample_rate);
    assert_eq!(1, block.channels);
    assert_eq!(block.payload.len(), block.size as usize);
    assert_eq!(0, gen.pending_frames());
  }

  #[test]
  fn test_generate_drains_queue() {
    let mut gen = EaGenerator::new(5, 1).unwrap();
    gen.add_frame(mono_frame(0, &[0x01], 8)).unwrap();
    let first = gen.generate().unwrap();
    let second = gen.generate().unwrap();
    assert!(first.size > 0);
    assert_eq!(0, second.size);
    assert_eq!(0, second.sample_count);
  }
}
