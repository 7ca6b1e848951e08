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

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::error::{EaError, Result};
use crate::loaders::{HeaderlessLoader, SingleBlockLoader};

/// The seekable byte inputs the block layer consumes.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Which field packing an EALayer3 bitstream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserVersion {
  /// Version 5.
  V5,
  /// Versions 6 and 7 share a packing.
  V6,
}

/// A container-level unit: one run of EALayer3 sub-frames plus the metadata
/// its framing declared.  Loaders that carry no rate/channel information in
/// their headers leave those fields zero; the parser fills them in from the
/// frames themselves.
#[derive(Debug, Clone)]
pub struct Block {
  /// File position of the block, for diagnostics.
  pub offset: u64,
  /// Payload length in bytes, the container framing excluded.
  pub size: u32,
  /// PCM sample count this block covers, as declared.
  pub sample_count: u32,
  pub sample_rate: u32,
  pub channels: usize,
  pub payload: Vec<u8>,
}

///
/// The capability every container framing implements.  `initialize` probes
/// without consuming: `Ok(false)` means "not my format" (the selector
/// restores the position and tries the next loader), `Ok(true)` claims the
/// input, and `Err` is reserved for real I/O failures.
///
pub trait BlockLoader {
  fn name(&self) -> &'static str;

  fn initialize(&mut self, input: &mut dyn ReadSeek) -> Result<bool>;

  fn read_next_block(&mut self, input: &mut dyn ReadSeek) -> Result<Option<Block>>;

  /// Parser packing implied by the container header, if it names one.
  fn parser_version(&self) -> Option<ParserVersion>;

  fn supported_parsers(&self) -> &'static [&'static str];
}

///
/// Tries each registered loader in order and adopts the first whose probe
/// accepts the input.
///
pub struct BlockLoaderSelector {
  loaders: Vec<Box<dyn BlockLoader>>,
  selected: Option<usize>,
}

impl Default for BlockLoaderSelector {
  fn default() -> Self {
    Self::new()
  }
}

impl BlockLoaderSelector {
  pub fn new() -> Self {
    BlockLoaderSelector {
      loaders: vec![
        Box::new(SingleBlockLoader::new()),
        Box::new(HeaderlessLoader::new()),
      ],
      selected: None,
    }
  }

  /// The registered loaders, for the usage listing.
  pub fn loaders(&self) -> &[Box<dyn BlockLoader>] {
    &self.loaders
  }

  pub fn initialize(&mut self, input: &mut dyn ReadSeek) -> Result<()> {
    let start = input.stream_position()?;
    for (i, loader) in self.loaders.iter_mut().enumerate() {
      input.seek(SeekFrom::Start(start))?;
      if loader.initialize(input)? {
        debug!(loader = loader.name(), "block loader selected");
        input.seek(SeekFrom::Start(start))?;
        self.selected = Some(i);
        return Ok(());
      }
    }
    input.seek(SeekFrom::Start(start))?;
    Err(EaError::UnrecognizedFormat)
  }

  pub fn read_next_block(&mut self, input: &mut dyn ReadSeek) -> Result<Option<Block>> {
    match self.selected {
      Some(i) => self.loaders[i].read_next_block(input),
      None => Ok(None),
    }
  }

  pub fn name(&self) -> Option<&'static str> {
    self.selected.map(|i| self.loaders[i].name())
  }

  pub fn parser_version(&self) -> Option<ParserVersion> {
    self.selected.and_then(|i| self.loaders[i].parser_version())
  }
}

/// Fill `buf` completely, or report a clean end of input as `Ok(false)`.
pub(crate) fn read_exact_or_eof<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> Result<bool> {
  let mut filled = 0;
  while filled < buf.len() {
    let n = input.read(&mut buf[filled..])?;
    if n == 0 {
      return Ok(false);
    }
    filled += n;
  }
  Ok(true)
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
