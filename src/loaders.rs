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

// externs
use byteorder::{BigEndian, ByteOrder};
use std::io::SeekFrom;
use tracing::debug;

use crate::blocks::{read_exact_or_eof, Block, BlockLoader, ParserVersion, ReadSeek};
use crate::error::{EaError, Result};

const PARSER_NAMES: &[&str] = &["EALayer3 version 5", "EALayer3 versions 6 and 7"];

///
/// The "single block" framing: one 16-byte header followed by the whole
/// payload.  The compression byte picks the parser packing.
///
pub struct SingleBlockLoader {
  compression: u8,
  blocks_read: usize,
}

struct SingleBlockHeader {
  compression: u8,
  channel_value: u8,
  sample_rate: u16,
  total_samples_1: u32,
  block_size: u32,
  total_samples_2: u32,
}

impl SingleBlockLoader {
  pub fn new() -> Self {
    SingleBlockLoader {
      compression: 0,
      blocks_read: 0,
    }
  }

  fn read_header(input: &mut dyn ReadSeek) -> Result<Option<SingleBlockHeader>> {
    let mut raw = [0u8; 16];
    if !read_exact_or_eof(input, &mut raw)? {
      return Ok(None);
    }
    Ok(Some(SingleBlockHeader {
      compression: raw[0],
      channel_value: raw[1],
      sample_rate: BigEndian::read_u16(&raw[2..]),
      total_samples_1: BigEndian::read_u32(&raw[4..]),
      block_size: BigEndian::read_u32(&raw[8..]),
      total_samples_2: BigEndian::read_u32(&raw[12..]),
    }))
  }
}

impl Default for SingleBlockLoader {
  fn default() -> Self {
    Self::new()
  }
}

impl BlockLoader for SingleBlockLoader {
  fn name(&self) -> &'static str {
    "Single Block Header"
  }

  fn initialize(&mut self, input: &mut dyn ReadSeek) -> Result<bool> {
    let start = input.stream_position()?;

    let header = match Self::read_header(input)? {
      Some(header) => header,
      None => return Ok(false),
    };

    if header.compression < 5 || header.compression > 7 {
      debug!("single block loader incorrect because of compression");
      return Ok(false);
    }
    self.compression = header.compression;

    if header.channel_value % 4 != 0 {
      debug!("single block loader incorrect because of channel value");
      return Ok(false);
    }
    if header.total_samples_1 != header.total_samples_2 {
      debug!("single block loader incorrect because total samples don't equal each other");
      return Ok(false);
    }
    let end = input.seek(SeekFrom::End(0))?;
    if u64::from(header.block_size) + 8 > end {
      debug!("single block loader incorrect because of size");
      return Ok(false);
    }

    debug!("single block loader correct");
    input.seek(SeekFrom::Start(start))?;
    Ok(true)
  }

  fn read_next_block(&mut self, input: &mut dyn ReadSeek) -> Result<Option<Block>> {
    if self.blocks_read > 0 {
      return Ok(None);
    }

    let offset = input.stream_position()?;
    let header = match Self::read_header(input)? {
      Some(header) => header,
      None => return Ok(None),
    };
    if header.block_size < 8 {
      return Err(EaError::TruncatedBlock);
    }

    let size = header.block_size - 8;
    let mut payload = vec![0u8; size as usize];
    if !read_exact_or_eof(input, &mut payload)? {
      return Err(EaError::TruncatedBlock);
    }

    self.blocks_read += 1;
    Ok(Some(Block {
      offset,
      size,
      sample_count: header.total_samples_1,
      sample_rate: u32::from(header.sample_rate),
      channels: usize::from(header.channel_value / 4) + 1,
      payload,
    }))
  }

  fn parser_version(&self) -> Option<ParserVersion> {
    match self.compression {
      5 => Some(ParserVersion::V5),
      6 | 7 => Some(ParserVersion::V6),
      _ => None,
    }
  }

  fn supported_parsers(&self) -> &'static [&'static str] {
    PARSER_NAMES
  }
}

///
/// The headerless framing: repeated `{flags, block_size, samples}` prefixed
/// blocks, the last one marked by the 0x8000 flag.  The sub-frame version
/// nibbles pick the parser packing per block.
///
pub struct HeaderlessLoader {
  last_block: bool,
}

const LAST_BLOCK_FLAG: u16 = 0x8000;

impl HeaderlessLoader {
  pub fn new() -> Self {
    HeaderlessLoader { last_block: false }
  }
}

impl Default for HeaderlessLoader {
  fn default() -> Self {
    Self::new()
  }
}

impl BlockLoader for HeaderlessLoader {
  fn name(&self) -> &'static str {
    "Headerless"
  }

  fn initialize(&mut self, input: &mut dyn ReadSeek) -> Result<bool> {
    // Walking the first few block prefixes is the only probe available.
    for i in 0..5 {
      let mut prefix = [0u8; 8];
      if !read_exact_or_eof(input, &mut prefix)? {
        if i == 0 {
          return Ok(false);
        }
        break;
      }

      let flags = BigEndian::read_u16(&prefix[0..]);
      let block_size = BigEndian::read_u16(&prefix[2..]);

      if flags & LAST_BLOCK_FLAG != 0 {
        break;
      }
      if flags & !LAST_BLOCK_FLAG != 0 {
        debug!("headerless loader incorrect because of flags");
        return Ok(false);
      }
      if block_size < 8 {
        debug!("headerless loader incorrect because block size < 8");
        return Ok(false);
      }

      input.seek(SeekFrom::Current(i64::from(block_size) - 8))?;
    }

    debug!("headerless loader correct");
    self.last_block = false;
    Ok(true)
  }

  fn read_next_block(&mut self, input: &mut dyn ReadSeek) -> Result<Option<Block>> {
    if self.last_block {
      return Ok(None);
    }

    let offset = input.stream_position()?;
    let mut prefix = [0u8; 8];
    if !read_exact_or_eof(input, &mut prefix)? {
      return Ok(None);
    }

    let flags = BigEndian::read_u16(&prefix[0..]);
    let block_size = BigEndian::read_u16(&prefix[2..]);
    let samples = BigEndian::read_u32(&prefix[4..]);

    if flags & LAST_BLOCK_FLAG != 0 {
      self.last_block = true;
    }
    if block_size <= 8 {
      return Ok(None);
    }

    let size = u32::from(block_size) - 8;
    let mut payload = vec![0u8; size as usize];
    if !read_exact_or_eof(input, &mut payload)? {
      return Err(EaError::TruncatedBlock);
    }

    Ok(Some(Block {
      offset,
      size,
      sample_count: samples,
      sample_rate: 0,
      channels: 0,
      payload,
    }))
  }

  fn parser_version(&self) -> Option<ParserVersion> {
    None
  }

  fn supported_parsers(&self) -> &'static [&'static str] {
    PARSER_NAMES
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
  use std::io::Cursor;

  use byteorder::{BigEndian, WriteBytesExt};

  use super::*;
  use crate::blocks::BlockLoaderSelector;

  fn single_block_file(compression: u8, channel_value: u8, payload: &[u8]) -> Vec<u8> {
    let mut file = Vec::new();
    file.push(compression);
    file.push(channel_value);
    file.write_u16::<BigEndian>(44100).unwrap();
    file.write_u32::<BigEndian>(1152).unwrap();
    file.write_u32::<BigEndian>(payload.len() as u32 + 8).unwrap();
    file.write_u32::<BigEndian>(1152).unwrap();
    file.extend_from_slice(payload);
    file
  }

  fn headerless_block(flags: u16, samples: u32, payload: &[u8]) -> Vec<u8> {
    let mut block = Vec::new();
    block.write_u16::<BigEndian>(flags).unwrap();
    block.write_u16::<BigEndian>(payload.len() as u16 + 8).unwrap();
    block.write_u32::<BigEndian>(samples).unwrap();
    block.extend_from_slice(payload);
    block
  }

  #[test]
  fn test_single_block_accepts_and_iterates() {
    let payload = [0x50u8, 0x01, 0x02, 0x03];
    let mut input = Cursor::new(single_block_file(5, 0, &payload));

    let mut loader = SingleBlockLoader::new();
    assert!(loader.initialize(&mut input).unwrap());
    assert_eq!(0, input.position());
    assert_eq!(Some(ParserVersion::V5), loader.parser_version());

    let block = loader.read_next_block(&mut input).unwrap().unwrap();
    assert_eq!(0, block.offset);
    assert_eq!(4, block.size);
    assert_eq!(1152, block.sample_count);
    assert_eq!(44100, block.sample_rate);
    assert_eq!(1, block.channels);
    assert_eq!(payload.to_vec(), block.payload);

    // Exactly one block.
    assert!(loader.read_next_block(&mut input).unwrap().is_none());
  }

  #[test]
  fn test_single_block_channel_derivation() {
    let mut input = Cursor::new(single_block_file(6, 4, &[0u8; 4]));
    let mut loader = SingleBlockLoader::new();
    assert!(loader.initialize(&mut input).unwrap());
    assert_eq!(Some(ParserVersion::V6), loader.parser_version());
    let block = loader.read_next_block(&mut input).unwrap().unwrap();
    assert_eq!(2, block.channels);
  }

  #[test]
  fn test_single_block_probe_rejections() {
    let mut loader = SingleBlockLoader::new();

    // Compression byte outside 5..=7.
    let mut input = Cursor::new(single_block_file(4, 0, &[0u8; 4]));
    assert!(!loader.initialize(&mut input).unwrap());

    // Channel value not a multiple of 4.
    let mut input = Cursor::new(single_block_file(5, 3, &[0u8; 4]));
    assert!(!loader.initialize(&mut input).unwrap());

    // Sample counts disagree.
    let mut file = single_block_file(5, 0, &[0u8; 4]);
    file[12..16].copy_from_slice(&[0, 0, 0, 7]);
    let mut input = Cursor::new(file);
    assert!(!loader.initialize(&mut input).unwrap());

    // Declared block size runs past the end of the file.
    let mut file = single_block_file(5, 0, &[0u8; 4]);
    file[8..12].copy_from_slice(&[0, 0, 1, 0]);
    let mut input = Cursor::new(file);
    assert!(!loader.initialize(&mut input).unwrap());
  }

  #[test]
  fn test_headerless_iterates_until_last_flag() {
    let mut file = Vec::new();
    file.extend_from_slice(&headerless_block(0, 1152, &[1u8, 2, 3, 4]));
    file.extend_from_slice(&headerless_block(LAST_BLOCK_FLAG, 1152, &[5u8, 6]));
    // Trailing garbage past the last block must stay untouched.
    file.extend_from_slice(&[0xffu8; 16]);
    let mut input = Cursor::new(file);

    let mut loader = HeaderlessLoader::new();
    assert!(loader.initialize(&mut input).unwrap());
    input.set_position(0);

    let first = loader.read_next_block(&mut input).unwrap().unwrap();
    assert_eq!(0, first.offset);
    assert_eq!(vec![1, 2, 3, 4], first.payload);
    assert_eq!(1152, first.sample_count);

    let last = loader.read_next_block(&mut input).unwrap().unwrap();
    assert_eq!(12, last.offset);
    assert_eq!(vec![5, 6], last.payload);

    assert!(loader.read_next_block(&mut input).unwrap().is_none());
  }

  #[test]
  fn test_headerless_probe_rejects_reserved_flags() {
    let mut loader = HeaderlessLoader::new();

    let mut input = Cursor::new(headerless_block(0x0001, 0, &[0u8; 4]));
    assert!(!loader.initialize(&mut input).unwrap());

    // A block size below the prefix length is impossible.
    let mut bad = headerless_block(0, 0, &[0u8; 4]);
    bad[2..4].copy_from_slice(&[0, 4]);
    let mut input = Cursor::new(bad);
    assert!(!loader.initialize(&mut input).unwrap());
  }

  #[test]
  fn test_headerless_truncated_payload() {
    let mut file = headerless_block(0, 1152, &[1u8, 2, 3, 4]);
    file.truncate(10);
    let mut input = Cursor::new(file);

    let mut loader = HeaderlessLoader::new();
    match loader.read_next_block(&mut input) {
      Err(EaError::TruncatedBlock) => (),
      other => panic!("expected TruncatedBlock, got {:?}", other),
    }
  }

  #[test]
  fn test_selector_picks_single_block() {
    let mut input = Cursor::new(single_block_file(5, 0, &[0x50u8, 0, 0, 0]));
    let mut selector = BlockLoaderSelector::new();
    selector.initialize(&mut input).unwrap();
    assert_eq!(Some("Single Block Header"), selector.name());
    assert_eq!(Some(ParserVersion::V5), selector.parser_version());
    let block = selector.read_next_block(&mut input).unwrap().unwrap();
    assert_eq!(4, block.size);
  }

  #[test]
  fn test_selector_picks_headerless() {
    let mut file = Vec::new();
    file.extend_from_slice(&headerless_block(0, 1152, &[0u8; 8]));
    file.extend_from_slice(&headerless_block(LAST_BLOCK_FLAG, 1152, &[0u8; 8]));
    let mut input = Cursor::new(file);

    let mut selector = BlockLoaderSelector::new();
    selector.initialize(&mut input).unwrap();
    assert_eq!(Some("Headerless"), selector.name());
    assert_eq!(None, selector.parser_version());
  }
}
