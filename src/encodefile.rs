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

//! The encode driver: re-encapsulate a standard MP3 bitstream as an
//! EALayer3 single block container.

// std
use std::io::{Read, Seek, Write};

// externs
use tracing::debug;

// this crate
use crate::error::Result;
use crate::generator::EaGenerator;
use crate::mpegparser::MpegParser;
use crate::writers::{BlockWriter, SingleBlockWriter};

pub struct EncodeStats {
  pub frames: u64,
  pub samples: u64,
}

///
/// Parse every audio frame of `input` and write one single block EALayer3
/// container to `output`.  Empty frames only pad the source's bit
/// reservoir and are dropped; their audio bits travel with the frames that
/// declared them.
///
pub fn mp3_to_single_block<R: Read + Seek, W: Write>(
  input: R,
  output: &mut W,
) -> Result<EncodeStats> {
  let mut parser = MpegParser::new(input);
  let mut gen = EaGenerator::new(5, 1)?;
  let mut stats = EncodeStats {
    frames: 0,
    samples: 0,
  };

  while let Some(frame) = parser.next_non_empty_frame()? {
    stats.frames += 1;
    stats.samples += u64::from(frame.samples());
    gen.add_frame(frame)?;
  }

  let block = gen.generate()?;
  debug!(
    frames = stats.frames,
    size = block.size,
    "encoded single block"
  );
  SingleBlockWriter::new().write_next_block(output, &block, true)?;
  Ok(stats)
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

  use super::*;
  use crate::blocks::BlockLoaderSelector;
  use crate::decodefile::write_mp3_stream;
  use crate::mpeg::tests_support::{mono_frame, stereo_frame};
  use crate::mpeg::Frame;
  use crate::mpeggen::{FrameAssembler, MpegGenerator};

  fn assemble(frames: &[Frame]) -> Vec<u8> {
    let mut assembler = FrameAssembler::new();
    let mut out = Vec::new();
    for frame in frames {
      assembler.assemble(frame, &mut out).unwrap();
    }
    out
  }

  #[test]
  fn test_encode_then_extract_is_lossless() {
    let frames = vec![
      stereo_frame(0, &[0x10, 0x32, 0x54, 0x76], 15, 17),
      stereo_frame(0, &[0x98, 0xba, 0xdc, 0xfe], 12, 20),
      stereo_frame(0, &[0x01, 0x23, 0x45, 0x67], 32, 0),
    ];
    let mp3 = assemble(&frames);

    // MP3 -> EALayer3 single block.
    let mut container = Vec::new();
    let stats = mp3_to_single_block(Cursor::new(mp3.clone()), &mut container).unwrap();
    assert_eq!(3, stats.frames);
    assert_eq!(3 * 1152, stats.samples);

    // The container probes back through the single block loader.
    let mut input = Cursor::new(container);
    let mut selector = BlockLoaderSelector::new();
    selector.initialize(&mut input).unwrap();
    assert_eq!(Some("Single Block Header"), selector.name());

    let block = selector.read_next_block(&mut input).unwrap().unwrap();
    assert_eq!(3 * 1152, block.sample_count);
    assert_eq!(44100, block.sample_rate);
    assert_eq!(2, block.channels);

    // EALayer3 -> MP3 reproduces the original bytes.
    let mut gen = MpegGenerator::new(&block, selector.parser_version()).unwrap();
    gen.parse_block(&block).unwrap();
    gen.done_parsing_blocks();
    let mut out = Vec::new();
    write_mp3_stream(&gen, 0, &mut out).unwrap();
    assert_eq!(mp3, out);
  }

  #[test]
  fn test_encode_drops_empty_frames() {
    let frames = vec![
      mono_frame(0, &[], 0),
      mono_frame(0, &[0x42, 0x24], 16),
    ];
    let mp3 = assemble(&frames);

    let mut container = Vec::new();
    let stats = mp3_to_single_block(Cursor::new(mp3), &mut container).unwrap();
    assert_eq!(1, stats.frames);
    assert_eq!(1152, stats.samples);
  }
}
