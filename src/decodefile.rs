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

//! Extraction drivers: pull one stream (or all of them) out of a
//! `MpegGenerator` and write MP3 bytes or WAV samples.

// std
use std::io::{Read, Seek, Write};

// externs
use tracing::debug;

// this crate
use crate::error::Result;
use crate::mpeg::MAX_MPEG_FRAME_SIZE;
use crate::mpeggen::{MpegGenerator, PcmOutputStream};

/// Copy one stream's MPEG frames to `output`; returns the bytes written.
pub fn write_mp3_stream<W: Write>(
  gen: &MpegGenerator,
  stream: usize,
  output: &mut W,
) -> Result<u64> {
  let mut mpeg = gen.create_mpeg_stream(stream);
  let mut buf = vec![0u8; MAX_MPEG_FRAME_SIZE];
  let mut written = 0u64;
  while !mpeg.eos() {
    let n = mpeg.read(&mut buf)?;
    if n == 0 {
      break;
    }
    output.write_all(&buf[..n])?;
    written += n as u64;
  }
  debug!(stream, written, "wrote MPEG stream");
  Ok(written)
}

/// Decode one stream to a PCM-16 WAV; returns the samples written.
pub fn write_wav_stream<W: Write + Seek>(
  gen: &MpegGenerator,
  stream: usize,
  output: W,
) -> Result<u64> {
  let channels = gen.channels(stream);
  let spec = hound::WavSpec {
    channels: channels as u16,
    sample_rate: gen.sample_rate(stream),
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
  };
  let mut writer = hound::WavWriter::new(output, spec)?;

  let mut pcm = gen.create_pcm_stream(stream);
  let mut buf = vec![0i16; PcmOutputStream::recommended_buffer_len(channels)];
  let mut written = 0u64;
  while !pcm.eos() {
    let n = pcm.read(&mut buf)?;
    if n == 0 {
      break;
    }
    for &sample in &buf[..n] {
      writer.write_sample(sample)?;
    }
    written += n as u64;
  }
  writer.finalize()?;
  debug!(stream, samples = written, "wrote WAV stream");
  Ok(written)
}

/// Decode every stream into one WAV, channels concatenated in stream index
/// order and interleaved frame by frame.  A stream that runs out before the
/// others keeps its channels, filled with silence.
pub fn write_multi_wav<W: Write + Seek>(gen: &MpegGenerator, output: W) -> Result<u64> {
  let count = gen.stream_count();
  let channel_count: usize = (0..count).map(|i| gen.channels(i)).sum();
  let spec = hound::WavSpec {
    channels: channel_count as u16,
    sample_rate: gen.sample_rate(0),
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
  };
  let mut writer = hound::WavWriter::new(output, spec)?;

  let mut streams: Vec<PcmOutputStream<'_>> = (0..count).map(|i| gen.create_pcm_stream(i)).collect();
  let mut bufs: Vec<Vec<i16>> = (0..count)
    .map(|i| vec![0i16; PcmOutputStream::recommended_buffer_len(gen.channels(i))])
    .collect();

  let mut written = 0u64;
  while streams.iter().any(|s| !s.eos()) {
    let mut reads = vec![0usize; count];
    let mut frames = 0usize;
    for (i, stream) in streams.iter_mut().enumerate() {
      reads[i] = stream.read(&mut bufs[i])?;
      frames = frames.max(reads[i] / gen.channels(i));
    }
    if frames == 0 {
      break;
    }

    for frame in 0..frames {
      for i in 0..count {
        let channels = gen.channels(i);
        for ch in 0..channels {
          let at = frame * channels + ch;
          let sample = if at < reads[i] { bufs[i][at] } else { 0 };
          writer.write_sample(sample)?;
          written += 1;
        }
      }
    }
  }
  writer.finalize()?;
  debug!(streams = count, samples = written, "wrote multichannel WAV");
  Ok(written)
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
  use crate::generator::EaGenerator;
  use crate::mpeg::tests_support::mono_frame;
  use crate::mpeggen::FrameAssembler;

  #[test]
  fn test_write_mp3_stream_matches_assembly() {
    let frames = vec![
      mono_frame(0, &[0x10, 0x20], 16),
      mono_frame(0, &[0x30, 0x40, 0x50], 24),
    ];

    let mut ea = EaGenerator::new(5, 1).unwrap();
    for frame in &frames {
      ea.add_frame(frame.clone()).unwrap();
    }
    let block = ea.generate().unwrap();
    let mut gen = MpegGenerator::new(&block, None).unwrap();
    gen.parse_block(&block).unwrap();

    let mut out = Vec::new();
    let written = write_mp3_stream(&gen, 0, &mut out).unwrap();
    assert_eq!(written as usize, out.len());

    let mut assembler = FrameAssembler::new();
    let mut direct = Vec::new();
    for frame in &frames {
      assembler.assemble(frame, &mut direct).unwrap();
    }
    assert_eq!(direct, out);
  }

  #[test]
  fn test_wav_header_shape() {
    // hound writes the canonical 44-byte PCM prelude; an empty stream
    // leaves exactly that.
    let spec = hound::WavSpec {
      channels: 1,
      sample_rate: 44100,
      bits_per_sample: 16,
      sample_format: hound::SampleFormat::Int,
    };
    let mut sink = Cursor::new(Vec::new());
    let writer = hound::WavWriter::new(&mut sink, spec).unwrap();
    writer.finalize().unwrap();
    let bytes = sink.into_inner();
    assert_eq!(44, bytes.len());
    assert_eq!(b"RIFF", &bytes[0..4]);
    assert_eq!(b"WAVE", &bytes[8..12]);
  }
}
