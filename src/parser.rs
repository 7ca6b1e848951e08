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
use crate::mpeg::{ChannelInfo, ChannelMode, Frame, Granule, MpegVersion, MPEG_SAMPLE_RATES};

/// A sub-frame needs at least its version nibble, stream count marker and
/// two granule flags; anything shorter is block tail padding.
const MIN_SUB_FRAME_BITS: usize = 16;

/// Bits needed for a stream index among `count` streams.  A single stream
/// needs none.
pub(crate) fn stream_index_bits(count: usize) -> usize {
  if count <= 1 {
    0
  } else {
    (usize::BITS - (count - 1).leading_zeros()) as usize
  }
}

///
/// Decodes the EALayer3 bitstream inside a block payload into `Frame`s.
///
/// One parser instance handles a whole stream of blocks: the stream count
/// declared by the first sub-frame is kept for the parser's lifetime and
/// later sub-frames are validated against it.  The field packing follows
/// each sub-frame's version nibble (5 on one side, 6/7 on the other) unless
/// a packing was forced at construction.
///
pub struct EaParser {
  forced: Option<ParserVersion>,
  stream_count: Option<usize>,
}

impl EaParser {
  pub fn new(forced: Option<ParserVersion>) -> Self {
    EaParser {
      forced,
      stream_count: None,
    }
  }

  /// Streams declared by the bitstream, once a block has been parsed.
  pub fn stream_count(&self) -> Option<usize> {
    self.stream_count
  }

  pub fn parse_block(&mut self, block: &Block) -> Result<Vec<Frame>> {
    let payload_bits = block.payload.len() * 8;
    let mut rd = BitReader::new(&block.payload);
    let mut frames = Vec::new();

    while payload_bits.saturating_sub(rd.tell()) >= MIN_SUB_FRAME_BITS {
      let version = rd.read_bits(4) as u8;
      if version == 0 {
        // Zero padding at the block tail.
        break;
      }
      if !(5..=7).contains(&version) {
        return Err(EaError::UnsupportedVersion(version));
      }
      let packing = self.forced.unwrap_or(if version == 5 {
        ParserVersion::V5
      } else {
        ParserVersion::V6
      });

      let marker = rd.read_bits(4) as usize;
      let count = *self.stream_count.get_or_insert(marker + 1);
      let stream_index = rd.read_bits(stream_index_bits(count)) as usize;
      if stream_index >= count {
        return Err(EaError::StreamIndexOutOfRange(stream_index, count));
      }

      let mut granules = [Granule::unused(0), Granule::unused(1)];
      for slot in 0..2 {
        if rd.read_bit() == 0 {
          continue;
        }
        granules[slot] = read_granule(&mut rd, packing, payload_bits)?;
      }
      rd.seek_to_next_byte();

      frames.push(Frame {
        granules,
        stream_index,
      });
    }

    debug!(
      frames = frames.len(),
      offset = block.offset,
      "parsed EALayer3 block"
    );
    Ok(frames)
  }
}

fn read_granule(rd: &mut BitReader<'_>, packing: ParserVersion, payload_bits: usize) -> Result<Granule> {
  let version = MpegVersion::from_header_bits(rd.read_bits(2))?;
  let sample_rate_index = rd.read_bits(2) as u8;
  if sample_rate_index == 3 {
    return Err(EaError::ReservedSampleRate);
  }
  let channel_mode = ChannelMode::from_header_bits(rd.read_bits(2));

  let (mode_extension, index, v6_main_data_begin) = match packing {
    ParserVersion::V5 => (rd.read_bits(2) as u8, rd.read_bit() as u8, 0u16),
    ParserVersion::V6 => {
      let index = rd.read_bit() as u8;
      let main_data_begin = rd.read_bits(version.main_data_begin_bits()) as u16;
      (rd.read_bits(2) as u8, index, main_data_begin)
    }
  };

  let channels = channel_mode.channels();
  let mut channel_info = Vec::with_capacity(channels);
  for _ in 0..channels {
    let (scfsi, size) = match packing {
      ParserVersion::V5 => {
        let scfsi = rd.read_bits(4) as u8;
        (scfsi, rd.read_bits(12) as u16)
      }
      ParserVersion::V6 => {
        let size = rd.read_bits(12) as u16;
        (rd.read_bits(4) as u8, size)
      }
    };
    let side_info = [rd.read_bits(32), rd.read_bits(version.side_info1_bits())];
    channel_info.push(ChannelInfo {
      scfsi,
      size,
      side_info,
    });
  }

  let main_data_begin = match packing {
    ParserVersion::V5 => rd.read_bits(version.main_data_begin_bits()) as u16,
    ParserVersion::V6 => v6_main_data_begin,
  };

  let data_size_bits: u32 = channel_info.iter().map(|ci| u32::from(ci.size)).sum();
  let mut data = Vec::new();
  if data_size_bits > 0 {
    if rd.tell() + data_size_bits as usize > payload_bits {
      return Err(EaError::TruncatedBlock);
    }
    data = vec![0u8; ((data_size_bits + 7) / 8) as usize];
    let mut wr = BitWriter::new(&mut data);
    let mut left = data_size_bits as usize;
    while left > 0 {
      let take = left.min(32);
      wr.write_bits(rd.read_bits(take), take);
      left -= take;
    }
    wr.write_to_next_byte();
    rd.seek_to_next_byte();
  }

  Ok(Granule {
    used: true,
    version,
    sample_rate_index,
    sample_rate: MPEG_SAMPLE_RATES[version.header_bits() as usize][sample_rate_index as usize],
    channel_mode,
    mode_extension,
    index,
    main_data_begin,
    channel_info,
    data,
    data_size_bits,
  })
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
