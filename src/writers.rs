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

//! Serializers for the two EALayer3 container framings.  The inverse of the
//! loaders: `single_block_write(single_block_read(b)) == b` for any valid
//! input, and likewise for the headerless framing.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

use crate::blocks::Block;
use crate::error::Result;

pub trait BlockWriter {
  fn write_next_block(&mut self, output: &mut dyn Write, block: &Block, last: bool) -> Result<()>;
}

/// Writes the 16-byte single block header followed by the whole payload.
pub struct SingleBlockWriter;

impl SingleBlockWriter {
  pub fn new() -> Self {
    SingleBlockWriter
  }
}

impl Default for SingleBlockWriter {
  fn default() -> Self {
    Self::new()
  }
}

impl BlockWriter for SingleBlockWriter {
  fn write_next_block(&mut self, output: &mut dyn Write, block: &Block, _last: bool) -> Result<()> {
    let channel_value = (block.channels.max(1) * 4 - 4) as u8;

    output.write_u8(5)?; // compression
    output.write_u8(channel_value)?;
    output.write_u16::<BigEndian>(block.sample_rate as u16)?;
    output.write_u32::<BigEndian>(block.sample_count)?;
    output.write_u32::<BigEndian>(block.size + 8)?;
    output.write_u32::<BigEndian>(block.sample_count)?;
    output.write_all(&block.payload)?;
    Ok(())
  }
}

/// Writes bare `{flags, block_size, samples}` prefixed blocks.
pub struct HeaderlessWriter;

impl HeaderlessWriter {
  pub fn new() -> Self {
    HeaderlessWriter
  }
}

impl Default for HeaderlessWriter {
  fn default() -> Self {
    Self::new()
  }
}

impl BlockWriter for HeaderlessWriter {
  fn write_next_block(&mut self, output: &mut dyn Write, block: &Block, last: bool) -> Result<()> {
    let flags: u16 = if last { 0x8000 } else { 0x0000 };

    output.write_u16::<BigEndian>(flags)?;
    output.write_u16::<BigEndian>(block.size as u16 + 8)?;
    output.write_u32::<BigEndian>(block.sample_count)?;
    output.write_all(&block.payload)?;
    Ok(())
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
