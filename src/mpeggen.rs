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

use std::io::{self, Read};

use minimp3::{Decoder, Error as Mp3Error};
use tracing::{debug, warn};

use crate::bitstream::{BitReader, BitWriter};
use crate::blocks::{Block, ParserVersion};
use crate::error::{EaError, Result};
use crate::mpeg::{
  frame_size, private_bits, side_info_size, ChannelInfo, Frame, MAX_RESERVOIR_SIZE,
};
use crate::parser::EaParser;

//
// #######                                    #
// #       #####    ##   #    # ######       # #    ####   ####  ###### #    #
// #       #    #  #  #  ##  ## #           #   #  #      #      #      ##  ##
// #####   #    # #    # # ## # #####      #     #  ####   ####  #####  # ## #
// #       #####  ###### #    # #          #######      #      # #      #    #
// #       #   #  #    # #    # #          #     # #    # #    # #      #    #
// #       #    # #    # #    # ######     #     #  ####   ####  ###### #    #
//

///
/// Serializes `Frame`s back into standards-compliant MPEG Layer III frames.
///
/// Every frame gets the smallest bitrate index (plus padding byte, when one
/// byte closes the gap) that holds its side info, any carried-over bytes
/// and its main data.  In that regime frames are self-contained and
/// `main_data_begin` is 0.  Only a frame too large even for the top bitrate
/// spills its tail into the reservoir, which is then written ahead of the
/// next frame's main data.
///
pub struct FrameAssembler {
  reservoir: Vec<u8>,
}

impl FrameAssembler {
  pub fn new() -> Self {
    FrameAssembler {
      reservoir: Vec::new(),
    }
  }

  pub fn reservoir_len(&self) -> usize {
    self.reservoir.len()
  }

  /// Append the MPEG frame for `frame` to `out`; returns the bytes written.
  /// Empty frames produce nothing.
  pub fn assemble(&mut self, frame: &Frame, out: &mut Vec<u8>) -> Result<usize> {
    let gr0 = match frame.first_used() {
      Some(granule) => granule,
      None => return Ok(0),
    };
    let version = gr0.version;
    let channels = gr0.channels();
    let granule_count = version.granule_count();
    let side_info = side_info_size(version, channels);

    let total_bits: u32 = frame
      .granules
      .iter()
      .take(granule_count)
      .filter(|g| g.used)
      .map(|g| g.data_size_bits)
      .sum();
    let data_bytes = ((total_bits + 7) / 8) as usize;

    let needed = 4 + side_info + self.reservoir.len() + data_bytes;
    let (bitrate_index, padding, total_size) = select_frame_size(version, gr0.sample_rate, needed);
    let capacity = total_size - 4 - side_info;

    // Main data region: carried-over bytes first, then this frame's
    // granule bits packed back to back.
    let mut payload = self.reservoir.clone();
    if data_bytes > 0 {
      let mut data = vec![0u8; data_bytes];
      let mut wr = BitWriter::new(&mut data);
      for granule in frame.granules.iter().take(granule_count).filter(|g| g.used) {
        let mut rd = BitReader::new(&granule.data);
        let mut left = granule.data_size_bits as usize;
        while left > 0 {
          let take = left.min(32);
          wr.write_bits(rd.read_bits(take), take);
          left -= take;
        }
      }
      payload.extend_from_slice(&data);
    }

    let main_data_begin = self.reservoir.len();
    self.reservoir.clear();
    if payload.len() > capacity {
      let spill = payload.len() - capacity;
      if spill > MAX_RESERVOIR_SIZE {
        return Err(EaError::ReservoirOverflow);
      }
      warn!(spill, "main data exceeds the largest frame; carrying bytes over");
      self.reservoir.extend_from_slice(&payload[capacity..]);
      payload.truncate(capacity);
    } else {
      payload.resize(capacity, 0);
    }

    let mut header = [0u8; 4];
    {
      let mut wr = BitWriter::new(&mut header);
      wr.write_bits(0x7FF, 11);
      wr.write_bits(version.header_bits(), 2);
      wr.write_bits(0b01, 2); // Layer III
      wr.write_bits(1, 1); // no CRC
      wr.write_bits(bitrate_index as u32, 4);
      wr.write_bits(u32::from(gr0.sample_rate_index), 2);
      wr.write_bits(u32::from(padding), 1);
      wr.write_bits(0, 1); // private
      wr.write_bits(gr0.channel_mode.header_bits(), 2);
      wr.write_bits(u32::from(gr0.mode_extension), 2);
      wr.write_bits(0, 4); // copyright, original, emphasis
    }

    let mut side = vec![0u8; side_info];
    {
      let mut wr = BitWriter::new(&mut side);
      wr.write_bits(main_data_begin as u32, version.main_data_begin_bits());
      wr.write_bits(0, private_bits(version, channels));
      if version.is_mpeg1() {
        for ch in 0..channels {
          let scfsi = frame.granules[1].channel_info.get(ch).map_or(0, |ci| ci.scfsi);
          wr.write_bits(u32::from(scfsi), 4);
        }
      }
      for granule in frame.granules.iter().take(granule_count) {
        for ch in 0..channels {
          let info = if granule.used {
            granule.channel_info.get(ch).cloned().unwrap_or_default()
          } else {
            ChannelInfo::default()
          };
          wr.write_bits(u32::from(info.size), 12);
          wr.write_bits(info.side_info[0], 32);
          wr.write_bits(info.side_info[1], version.side_info1_bits());
        }
      }
    }

    out.extend_from_slice(&header);
    out.extend_from_slice(&side);
    out.extend_from_slice(&payload);
    Ok(total_size)
  }
}

impl Default for FrameAssembler {
  fn default() -> Self {
    Self::new()
  }
}

/// Smallest sufficient frame size: the first bitrate index that fits, the
/// padding byte used only when it closes the gap exactly.
fn select_frame_size(
  version: crate::mpeg::MpegVersion,
  sample_rate: u32,
  needed: usize,
) -> (usize, bool, usize) {
  for index in 1..=14 {
    let size = frame_size(version, index, sample_rate);
    if size >= needed {
      return (index, false, size);
    }
    if size + 1 >= needed {
      return (index, true, size + 1);
    }
  }
  let size = frame_size(version, 14, sample_rate) + 1;
  (14, true, size)
}

//
// #     #
// ##   ## #####  ######  ####      ####  ###### #    #
// # # # # #    # #      #    #    #    # #      ##  ##
// #  #  # #    # #####  #         #      #####  # ## #
// #     # #####  #      #  ###    #  ### #      #    #
// #     # #      #      #    #    #    # #      #    #
// #     # #      ######  ####      ####  ###### #    #
//

#[derive(Debug, Clone)]
pub struct StreamInfo {
  pub sample_rate: u32,
  pub channels: usize,
}

///
/// Demultiplexes parsed blocks into per-stream frame queues and hands out
/// the MPEG and PCM output streams over them.
///
pub struct MpegGenerator {
  parser: EaParser,
  streams: Vec<Vec<Frame>>,
  infos: Vec<StreamInfo>,
}

impl MpegGenerator {
  /// Discover the stream layout from the first block.  The block is parsed
  /// with a scratch parser; feed it to `parse_block` afterwards like any
  /// other block.
  pub fn new(first_block: &Block, forced: Option<ParserVersion>) -> Result<Self> {
    let mut probe = EaParser::new(forced);
    let frames = probe.parse_block(first_block)?;
    let count = probe.stream_count().unwrap_or(0);
    if count == 0 || frames.is_empty() {
      return Err(EaError::UnrecognizedFormat);
    }

    let mut infos: Vec<Option<StreamInfo>> = vec![None; count];
    for frame in &frames {
      if let Some(granule) = frame.first_used() {
        let slot = &mut infos[frame.stream_index];
        if slot.is_none() {
          *slot = Some(StreamInfo {
            sample_rate: granule.sample_rate,
            channels: granule.channels(),
          });
        }
      }
    }
    // A stream silent in the first block borrows the first stream's shape.
    let fallback = infos
      .iter()
      .flatten()
      .next()
      .cloned()
      .ok_or(EaError::UnrecognizedFormat)?;
    let infos = infos
      .into_iter()
      .map(|info| info.unwrap_or_else(|| fallback.clone()))
      .collect();

    Ok(MpegGenerator {
      parser: EaParser::new(forced),
      streams: vec![Vec::new(); count],
      infos,
    })
  }

  pub fn parse_block(&mut self, block: &Block) -> Result<()> {
    let frames = self.parser.parse_block(block)?;
    let mut samples = 0u64;
    for frame in frames {
      samples += u64::from(frame.samples());
      let index = frame.stream_index;
      if index >= self.streams.len() {
        return Err(EaError::StreamIndexOutOfRange(index, self.streams.len()));
      }
      self.streams[index].push(frame);
    }
    if block.sample_count != 0 && u64::from(block.sample_count) != samples {
      warn!(
        declared = block.sample_count,
        parsed = samples,
        offset = block.offset,
        "block sample count disagrees with its frames"
      );
    }
    Ok(())
  }

  pub fn done_parsing_blocks(&self) {
    for (index, frames) in self.streams.iter().enumerate() {
      debug!(stream = index, frames = frames.len(), "stream complete");
    }
  }

  pub fn stream_count(&self) -> usize {
    self.streams.len()
  }

  pub fn sample_rate(&self, stream: usize) -> u32 {
    self.infos[stream].sample_rate
  }

  pub fn channels(&self, stream: usize) -> usize {
    self.infos[stream].channels
  }

  /// PCM sample frames the first stream decodes to.
  pub fn uncompressed_sample_frames(&self) -> u64 {
    self
      .streams
      .first()
      .map(|frames| frames.iter().map(|f| u64::from(f.samples())).sum())
      .unwrap_or(0)
  }

  pub fn create_mpeg_stream(&self, stream: usize) -> MpegOutputStream<'_> {
    MpegOutputStream::new(&self.streams[stream])
  }

  pub fn create_pcm_stream(&self, stream: usize) -> PcmOutputStream<'_> {
    PcmOutputStream::new(self.create_mpeg_stream(stream), &self.infos[stream])
  }
}

//
//  #####
// #     # ##### #####  ######   ##   #    #  ####
// #         #   #    # #       #  #  ##  ## #
//  #####    #   #    # #####  #    # # ## #  ####
//       #   #   #####  #      ###### #    #      #
// #     #   #   #   #  #      #    # #    # #    #
//  #####    #   #    # ###### #    # #    #  ####
//

///
/// One stream's frames as a plain MPEG byte stream.
///
pub struct MpegOutputStream<'a> {
  frames: &'a [Frame],
  assembler: FrameAssembler,
  next: usize,
  pending: Vec<u8>,
  pos: usize,
}

impl<'a> MpegOutputStream<'a> {
  fn new(frames: &'a [Frame]) -> Self {
    MpegOutputStream {
      frames,
      assembler: FrameAssembler::new(),
      next: 0,
      pending: Vec::new(),
      pos: 0,
    }
  }

  pub fn eos(&self) -> bool {
    self.next >= self.frames.len() && self.pos >= self.pending.len()
  }

  fn fill(&mut self) -> Result<()> {
    while self.pos >= self.pending.len() && self.next < self.frames.len() {
      self.pending.clear();
      self.pos = 0;
      let frame = &self.frames[self.next];
      self.next += 1;
      self.assembler.assemble(frame, &mut self.pending)?;
    }
    Ok(())
  }
}

impl Read for MpegOutputStream<'_> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    self
      .fill()
      .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let n = buf.len().min(self.pending.len() - self.pos);
    buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
    self.pos += n;
    Ok(n)
  }
}

///
/// One stream's frames decoded to interleaved signed 16-bit samples by the
/// external MP3 decoder.
///
pub struct PcmOutputStream<'a> {
  decoder: Decoder<MpegOutputStream<'a>>,
  channels: usize,
  sample_rate: u32,
  pending: Vec<i16>,
  pos: usize,
  eos: bool,
}

impl<'a> PcmOutputStream<'a> {
  fn new(inner: MpegOutputStream<'a>, info: &StreamInfo) -> Self {
    PcmOutputStream {
      decoder: Decoder::new(inner),
      channels: info.channels,
      sample_rate: info.sample_rate,
      pending: Vec::new(),
      pos: 0,
      eos: false,
    }
  }

  /// One MPEG frame's worth of samples.
  pub fn recommended_buffer_len(channels: usize) -> usize {
    1152 * channels
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn sample_rate(&self) -> u32 {
    self.sample_rate
  }

  pub fn eos(&self) -> bool {
    self.eos && self.pos >= self.pending.len()
  }

  pub fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
    while self.pos >= self.pending.len() && !self.eos {
      match self.decoder.next_frame() {
        Ok(frame) => {
          self.pending = frame.data;
          self.pos = 0;
        }
        Err(Mp3Error::Eof) | Err(Mp3Error::InsufficientData) => self.eos = true,
        Err(Mp3Error::SkippedData) => continue,
        Err(err) => return Err(EaError::Decoder(err)),
      }
    }
    let n = buf.len().min(self.pending.len() - self.pos);
    buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
    self.pos += n;
    Ok(n)
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
  use std::io::Read;

  use super::*;
  use crate::generator::EaGenerator;
  use crate::mpeg::tests_support::{masked_data, mono_frame, stereo_frame};
  use crate::mpeg::MpegVersion;

  #[test]
  fn test_select_frame_size_smallest_fit() {
    // 24 bytes needed fit the 32 kbit/s frame at 44.1 kHz.
    assert_eq!((1, false, 104), select_frame_size(MpegVersion::Mpeg1, 44100, 24));
    // Exactly one byte short of the 128 kbit/s frame flips padding.
    assert_eq!((9, true, 418), select_frame_size(MpegVersion::Mpeg1, 44100, 418));
    assert_eq!((9, false, 417), select_frame_size(MpegVersion::Mpeg1, 44100, 417));
    // Nothing fits: top index with padding.
    assert_eq!((14, true, 1045), select_frame_size(MpegVersion::Mpeg1, 44100, 1200));
  }

  #[test]
  fn test_assembled_header_bytes() {
    let frame = mono_frame(0, &[0xde, 0xad, 0xbe], 20);
    let mut assembler = FrameAssembler::new();
    let mut out = Vec::new();
    let written = assembler.assemble(&frame, &mut out).unwrap();

    // MPEG-1 Layer III, no CRC.
    assert_eq!(0xFF, out[0]);
    assert_eq!(0xFB, out[1]);
    // Bitrate index 1, 44.1 kHz, no padding; mono, no mode extension.
    assert_eq!(0x10, out[2]);
    assert_eq!(0xC0, out[3]);
    // main_data_begin 0 and zero private bits.
    assert_eq!(0x00, out[4]);

    assert_eq!(104, written);
    assert_eq!(104, out.len());
    assert_eq!(0, assembler.reservoir_len());

    // The main data region starts right after header and side info.
    assert_eq!(&masked_data(&[0xde, 0xad, 0xbe], 20)[..2], &out[21..23]);
  }

  #[test]
  fn test_padding_alternation() {
    // 397 main data bytes need 418 in total: one byte over the unpadded
    // 128 kbit/s frame, so the padding bit closes the gap.
    let data = vec![0x55u8; 397];
    let padded = mono_frame(0, &data, 397 * 8 / 2);
    let mut assembler = FrameAssembler::new();
    let mut out = Vec::new();
    assembler.assemble(&padded, &mut out).unwrap();
    assert_eq!(418, out.len());
    // Bitrate index 9, padding bit set.
    assert_eq!(0x92, out[2]);
  }

  #[test]
  fn test_reservoir_spill_and_recovery() {
    // 1100 bytes of main data cannot fit the largest 44.1 kHz frame
    // (1045 bytes with padding); the tail spills into the reservoir.
    let big = vec![0xa5u8; 600];
    let huge = stereo_frame(0, &big, 2200, 2200);
    let small = stereo_frame(0, &[0x01, 0x02], 8, 8);

    let mut assembler = FrameAssembler::new();
    let mut out = Vec::new();
    assembler.assemble(&huge, &mut out).unwrap();
    assert_eq!(1045, out.len());
    let spill = assembler.reservoir_len();
    assert_eq!(91, spill);
    assert!(spill <= MAX_RESERVOIR_SIZE);

    let mark = out.len();
    assembler.assemble(&small, &mut out).unwrap();
    assert_eq!(0, assembler.reservoir_len());
    // The next frame's main_data_begin announces the carried bytes.
    let main_data_begin =
      (u32::from(out[mark + 4]) << 1) | (u32::from(out[mark + 5]) >> 7);
    assert_eq!(spill as u32, main_data_begin);
  }

  #[test]
  fn test_empty_frame_writes_nothing() {
    let mut assembler = FrameAssembler::new();
    let mut out = Vec::new();
    let written = assembler.assemble(&Frame::empty(0), &mut out).unwrap();
    assert_eq!(0, written);
    assert!(out.is_empty());
  }

  fn generator_for(frames: Vec<Frame>, stream_count: usize) -> MpegGenerator {
    let mut ea = EaGenerator::new(5, stream_count).unwrap();
    for frame in frames {
      ea.add_frame(frame).unwrap();
    }
    let block = ea.generate().unwrap();
    let mut gen = MpegGenerator::new(&block, None).unwrap();
    gen.parse_block(&block).unwrap();
    gen.done_parsing_blocks();
    gen
  }

  #[test]
  fn test_generator_stream_layout() {
    let gen = generator_for(
      vec![
        mono_frame(0, &[0x01, 0x02], 16),
        stereo_frame(1, &[0x03, 0x04, 0x05, 0x06], 15, 17),
      ],
      2,
    );
    assert_eq!(2, gen.stream_count());
    assert_eq!(44100, gen.sample_rate(0));
    assert_eq!(1, gen.channels(0));
    assert_eq!(2, gen.channels(1));
    assert_eq!(1152, gen.uncompressed_sample_frames());
  }

  #[test]
  fn test_mpeg_output_stream() {
    let frames = vec![
      mono_frame(0, &[0x11, 0x22], 16),
      mono_frame(0, &[0x33, 0x44, 0x55], 24),
    ];
    let gen = generator_for(frames.clone(), 1);

    let mut stream = gen.create_mpeg_stream(0);
    assert!(!stream.eos());
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).unwrap();
    assert!(stream.eos());

    // The stream equals a direct assembly of the same frames.
    let mut assembler = FrameAssembler::new();
    let mut direct = Vec::new();
    for frame in &frames {
      assembler.assemble(frame, &mut direct).unwrap();
    }
    assert_eq!(direct, bytes);
  }

  #[test]
  fn test_mpeg_output_stream_skips_empty_frames() {
    let mut ea = EaGenerator::new(5, 1).unwrap();
    ea.add_frame(Frame::empty(0)).unwrap();
    ea.add_frame(mono_frame(0, &[0x77], 8)).unwrap();
    let block = ea.generate().unwrap();

    let mut gen = MpegGenerator::new(&block, None).unwrap();
    gen.parse_block(&block).unwrap();

    let mut stream = gen.create_mpeg_stream(0);
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).unwrap();
    assert_eq!(104, bytes.len());
  }
}
