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

use crate::bitstream::{BitReader, BitWriter};
use crate::blocks::read_exact_or_eof;
use crate::error::{EaError, Result};
use crate::mpeg::{
  frame_size, private_bits, side_info_size, ChannelInfo, ChannelMode, Frame, Granule, MpegVersion,
  MAX_MPEG_FRAME_SIZE, MAX_RESERVOIR_SIZE, MPEG_SAMPLE_RATES,
};

///
/// Reads a standard MPEG-1/2/2.5 Layer III bitstream one frame at a time,
/// resolving each granule's main data out of the bit reservoir so that the
/// resulting `Frame`s are self-contained.
///
/// The reservoir models the decoder side of the format: after every frame
/// the unconsumed trailing bytes of its main data region are appended and
/// the buffer is trimmed to its newest 511 bytes, the furthest back a
/// frame's `main_data_begin` can point.
///
pub struct MpegParser<R: Read + Seek> {
  input: R,
  reservoir: Vec<u8>,
}

impl<R: Read + Seek> MpegParser<R> {
  pub fn new(input: R) -> Self {
    MpegParser {
      input,
      reservoir: Vec::new(),
    }
  }

  pub fn reservoir_len(&self) -> usize {
    self.reservoir.len()
  }

  /// Read the next frame.  `Ok(None)` means the end of the MPEG data: a
  /// clean EOF, a truncated trailing frame, or a byte that is not a sync
  /// prefix (an ID3v1 trailer, typically).
  pub fn read_frame(&mut self) -> Result<Option<Frame>> {
    loop {
      let start = self.input.stream_position()?;
      let mut head = [0u8; 10];
      if !read_exact_or_eof(&mut self.input, &mut head)? {
        return Ok(None);
      }
      self.input.seek(SeekFrom::Start(start))?;

      if &head[0..3] == b"ID3" {
        let size = synchsafe_u32(&head[6..10]);
        debug!(size, "skipping ID3 tag");
        self.input.seek(SeekFrom::Start(start + 10 + u64::from(size)))?;
        continue;
      }
      if head[0] != 0xFF {
        return Ok(None);
      }
      return self.process_frame(start, &head);
    }
  }

  /// Skip empty frames; they carry reservoir fill but no audio.
  pub fn next_non_empty_frame(&mut self) -> Result<Option<Frame>> {
    loop {
      match self.read_frame()? {
        None => return Ok(None),
        Some(frame) if frame.is_empty() => {
          debug!("skipped empty frame");
          continue;
        }
        Some(frame) => return Ok(Some(frame)),
      }
    }
  }

  fn process_frame(&mut self, start: u64, head: &[u8; 10]) -> Result<Option<Frame>> {
    let mut rd = BitReader::new(head);

    if rd.read_bits(11) != 0x7FF {
      return Err(EaError::MpegSyncLost);
    }
    let version = MpegVersion::from_header_bits(rd.read_bits(2))?;
    if rd.read_bits(2) != 0b01 {
      return Err(EaError::NotLayerIII);
    }
    let crc = rd.read_bit() == 0;
    let bitrate_index = rd.read_bits(4) as usize;
    if bitrate_index == 0 || bitrate_index == 15 {
      return Err(EaError::UnsupportedBitrate);
    }
    let sample_rate_index = rd.read_bits(2) as u8;
    if sample_rate_index == 3 {
      return Err(EaError::ReservedSampleRate);
    }
    let padding = rd.read_bit() == 1;
    rd.read_bit(); // private
    let channel_mode = ChannelMode::from_header_bits(rd.read_bits(2));
    let mode_extension = rd.read_bits(2) as u8;
    rd.read_bits(4); // copyright, original, emphasis

    let header_size = 4 + if crc { 2 } else { 0 };
    let sample_rate = MPEG_SAMPLE_RATES[version.header_bits() as usize][sample_rate_index as usize];
    let mut total_size = frame_size(version, bitrate_index, sample_rate);
    if padding {
      total_size += 1;
    }
    let channels = channel_mode.channels();
    let region_size = total_size - header_size;
    if region_size > MAX_MPEG_FRAME_SIZE {
      return Err(EaError::FrameOversized(region_size));
    }

    // Pull the whole frame body, header and CRC excluded, into memory.
    self.input.seek(SeekFrom::Start(start + header_size as u64))?;
    let mut region = vec![0u8; region_size];
    if !read_exact_or_eof(&mut self.input, &mut region)? {
      return Ok(None);
    }

    let side_info = side_info_size(version, channels);
    let granule_count = version.granule_count();
    let mut rd = BitReader::new(&region);

    let main_data_begin = rd.read_bits(version.main_data_begin_bits()) as usize;
    rd.read_bits(private_bits(version, channels));

    let mut granules = [Granule::unused(0), Granule::unused(1)];
    for (slot, granule) in granules.iter_mut().enumerate().take(granule_count) {
      *granule = Granule {
        used: true,
        version,
        sample_rate_index,
        sample_rate,
        channel_mode,
        mode_extension,
        index: slot as u8,
        main_data_begin: 0,
        channel_info: vec![ChannelInfo::default(); channels],
        data: Vec::new(),
        data_size_bits: 0,
      };
    }

    if version.is_mpeg1() {
      for ch in 0..channels {
        granules[1].channel_info[ch].scfsi = rd.read_bits(4) as u8;
      }
    }

    let mut total_bits = 0u32;
    for granule in granules.iter_mut().take(granule_count) {
      for info in granule.channel_info.iter_mut() {
        info.size = rd.read_bits(12) as u16;
        info.side_info[0] = rd.read_bits(32);
        info.side_info[1] = rd.read_bits(version.side_info1_bits());
        total_bits += u32::from(info.size);
      }
    }
    let data_bytes = ((total_bits + 7) / 8) as usize;

    if data_bytes > 0 && main_data_begin > self.reservoir.len() {
      return Err(EaError::ReservoirUnderflow);
    }

    // Build each granule's buffer, drawing reservoir bits first (oldest
    // first, `main_data_begin` bytes back from the newest) and then the
    // bits following the side info in this frame.
    {
      let drawn = main_data_begin.min(self.reservoir.len());
      let mut res_rd = BitReader::new(&self.reservoir[self.reservoir.len() - drawn..]);
      let mut res_bits_left = drawn * 8;

      for granule in granules.iter_mut().take(granule_count) {
        let granule_bits: u32 = granule.channel_info.iter().map(|ci| u32::from(ci.size)).sum();
        granule.data_size_bits = granule_bits;
        if granule_bits == 0 {
          continue;
        }

        let mut data = vec![0u8; ((granule_bits + 7) / 8) as usize];
        let mut wr = BitWriter::new(&mut data);
        let mut left = granule_bits as usize;
        while left > 0 {
          if res_bits_left > 0 {
            let take = 32.min(res_bits_left).min(left);
            wr.write_bits(res_rd.read_bits(take), take);
            res_bits_left -= take;
            left -= take;
          } else {
            let take = 32.min(left);
            wr.write_bits(rd.read_bits(take), take);
            left -= take;
          }
        }
        wr.write_to_next_byte();
        granule.data = data;
      }
    }

    // The trailing bytes of the region feed the reservoir for the frames
    // that follow.
    let consumed_from_frame = data_bytes.saturating_sub(main_data_begin);
    let trailing_start = (side_info + consumed_from_frame).min(region_size);
    self.reservoir.extend_from_slice(&region[trailing_start..]);
    if self.reservoir.len() > MAX_RESERVOIR_SIZE {
      let excess = self.reservoir.len() - MAX_RESERVOIR_SIZE;
      self.reservoir.drain(..excess);
    }

    if total_bits == 0 {
      for granule in granules.iter_mut() {
        granule.used = false;
      }
    }

    Ok(Some(Frame {
      granules,
      stream_index: 0,
    }))
  }
}

/// ID3v2 sizes store 28 significant bits, the top bit of every byte zero.
fn synchsafe_u32(bytes: &[u8]) -> u32 {
  (u32::from(bytes[0] & 0x7f) << 21)
    | (u32::from(bytes[1] & 0x7f) << 14)
    | (u32::from(bytes[2] & 0x7f) << 7)
    | u32::from(bytes[3] & 0x7f)
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
  use crate::mpeg::tests_support::{mono_frame, stereo_frame};
  use crate::mpeggen::FrameAssembler;

  fn assemble(frames: &[Frame]) -> Vec<u8> {
    let mut assembler = FrameAssembler::new();
    let mut out = Vec::new();
    for frame in frames {
      assembler.assemble(frame, &mut out).unwrap();
    }
    out
  }

  #[test]
  fn test_synchsafe() {
    assert_eq!(0, synchsafe_u32(&[0, 0, 0, 0]));
    assert_eq!(10, synchsafe_u32(&[0, 0, 0, 10]));
    assert_eq!(128, synchsafe_u32(&[0, 0, 1, 0]));
    assert_eq!(0x0fff_ffff, synchsafe_u32(&[0xff, 0xff, 0xff, 0xff]));
  }

  #[test]
  fn test_parse_assembled_mono_frame() {
    let frame = mono_frame(0, &[0xde, 0xad, 0xbe], 20);
    let bytes = assemble(std::slice::from_ref(&frame));

    let mut parser = MpegParser::new(Cursor::new(bytes));
    let parsed = parser.read_frame().unwrap().unwrap();
    assert_eq!(frame, parsed);
    assert!(parser.read_frame().unwrap().is_none());
  }

  #[test]
  fn test_parse_assembled_stereo_sequence() {
    let frames = vec![
      stereo_frame(0, &[0x12, 0x34, 0x56, 0x78], 15, 17),
      stereo_frame(0, &[0x9a, 0xbc, 0xde, 0xf0], 9, 23),
    ];
    let bytes = assemble(&frames);

    let mut parser = MpegParser::new(Cursor::new(bytes));
    for expected in &frames {
      let parsed = parser.read_frame().unwrap().unwrap();
      assert_eq!(*expected, parsed);
    }
    assert!(parser.read_frame().unwrap().is_none());
  }

  #[test]
  fn test_round_trip_is_byte_exact() {
    let frames = vec![
      mono_frame(0, &[0x11, 0x22, 0x33], 24),
      mono_frame(0, &[0x44, 0x55], 16),
      mono_frame(0, &[0x66], 5),
    ];
    let first = assemble(&frames);

    let mut parser = MpegParser::new(Cursor::new(first.clone()));
    let mut reparsed = Vec::new();
    while let Some(frame) = parser.read_frame().unwrap() {
      reparsed.push(frame);
    }
    let second = assemble(&reparsed);
    assert_eq!(first, second);
  }

  #[test]
  fn test_id3_tag_is_skipped() {
    let frame = mono_frame(0, &[0xab], 8);
    let audio = assemble(std::slice::from_ref(&frame));

    // A 10 byte ID3v2 header plus 32 bytes of tag data.
    let mut file = vec![b'I', b'D', b'3', 3, 0, 0, 0, 0, 0, 32];
    file.extend_from_slice(&[0u8; 32]);
    file.extend_from_slice(&audio);

    let mut parser = MpegParser::new(Cursor::new(file));
    let parsed = parser.read_frame().unwrap().unwrap();
    assert_eq!(frame, parsed);
  }

  #[test]
  fn test_empty_frames_are_skipped() {
    let empty = mono_frame(0, &[], 0);
    let real = mono_frame(0, &[0x5a], 8);
    let bytes = assemble(&[empty, real.clone()]);

    let mut parser = MpegParser::new(Cursor::new(bytes));
    let parsed = parser.next_non_empty_frame().unwrap().unwrap();
    assert_eq!(real, parsed);
  }

  #[test]
  fn test_empty_frame_draws_nothing() {
    let empty = mono_frame(0, &[], 0);
    let bytes = assemble(std::slice::from_ref(&empty));

    let mut parser = MpegParser::new(Cursor::new(bytes));
    let parsed = parser.read_frame().unwrap().unwrap();
    assert!(parsed.is_empty());
    // The empty frame's region still feeds the reservoir.
    assert!(parser.reservoir_len() > 0);
    assert!(parser.reservoir_len() <= MAX_RESERVOIR_SIZE);
  }

  #[test]
  fn test_sync_loss() {
    // 0xFF first byte but broken sync bits.
    let bytes = vec![0xffu8, 0x00, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];
    let mut parser = MpegParser::new(Cursor::new(bytes));
    match parser.read_frame() {
      Err(EaError::MpegSyncLost) => (),
      other => panic!("expected MpegSyncLost, got {:?}", other),
    }
  }

  #[test]
  fn test_not_layer_iii() {
    // Valid sync and version, layer II (0b10).
    let mut head = vec![0xffu8, 0xf5, 0x10, 0xc0];
    head.extend_from_slice(&[0u8; 8]);
    let mut parser = MpegParser::new(Cursor::new(head));
    match parser.read_frame() {
      Err(EaError::NotLayerIII) => (),
      other => panic!("expected NotLayerIII, got {:?}", other),
    }
  }

  #[test]
  fn test_reservoir_underflow() {
    let frame = mono_frame(0, &[0x77], 8);
    let mut bytes = assemble(std::slice::from_ref(&frame));
    // Patch main_data_begin (the first 9 bits of the side info) to a
    // nonzero value while the parser's reservoir is empty.
    bytes[4] = 0x80;
    let mut parser = MpegParser::new(Cursor::new(bytes));
    match parser.read_frame() {
      Err(EaError::ReservoirUnderflow) => (),
      other => panic!("expected ReservoirUnderflow, got {:?}", other),
    }
  }

  #[test]
  fn test_trailing_garbage_ends_stream() {
    let frame = mono_frame(0, &[0x10, 0x20], 16);
    let mut bytes = assemble(std::slice::from_ref(&frame));
    bytes.extend_from_slice(b"TAG and then some trailer bytes");

    let mut parser = MpegParser::new(Cursor::new(bytes));
    assert!(parser.read_frame().unwrap().is_some());
    assert!(parser.read_frame().unwrap().is_none());
  }
}
