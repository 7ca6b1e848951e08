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

use std::error;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, EaError>;

#[derive(Debug)]
pub enum EaError {
  Io(io::Error),
  Hound(hound::Error),
  Decoder(minimp3::Error),

  // Container issues
  UnrecognizedFormat,                  // No block loader accepted the input
  TruncatedBlock,                      // A block payload ends before its declared size
  UnsupportedVersion(u8),              // EALayer3 sub-frame version outside 5..=7
  StreamIndexOutOfRange(usize, usize), // (index, declared stream count)
  TooManyStreams(usize),

  // MPEG bitstream issues
  MpegSyncLost,
  NotLayerIII,
  ReservedMpegVersion, // Version field 0b01 is reserved
  ReservedSampleRate,  // Sample rate index 3 is reserved
  UnsupportedBitrate,  // Free-form (0) or invalid (15) bitrate index
  FrameOversized(usize),
  ReservoirUnderflow,
  ReservoirOverflow,
}

impl fmt::Display for EaError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self {
      EaError::Io(ref err) => err.fmt(f),
      EaError::Hound(ref err) => err.fmt(f),
      EaError::Decoder(ref err) => write!(f, "MP3 decoder error: {:?}", err),
      EaError::UnrecognizedFormat => write!(f, "The input is not in a readable file format."),
      EaError::TruncatedBlock => write!(f, "A block payload ends before its declared size."),
      EaError::UnsupportedVersion(version) => {
        write!(f, "Unsupported EALayer3 version {}.", version)
      }
      EaError::StreamIndexOutOfRange(index, count) => write!(
        f,
        "The stream index ({}) exceeds the total number of streams ({}).",
        index, count
      ),
      EaError::TooManyStreams(_) => write!(f, "Too many streams to be decoded."),
      EaError::MpegSyncLost => write!(
        f,
        "MPEG sync bits don't match. Keep in mind that for this program to work the MP3 must be well-formed."
      ),
      EaError::NotLayerIII => write!(f, "File not supported; only MPEG layer 3 is supported."),
      EaError::ReservedMpegVersion => write!(f, "Reserved MPEG version field in frame header."),
      EaError::ReservedSampleRate => write!(f, "Reserved sample rate index in frame header."),
      EaError::UnsupportedBitrate => {
        write!(f, "Free-form or invalid bitrate index in frame header.")
      }
      EaError::FrameOversized(bytes) => {
        write!(f, "MPEG frame of {} bytes exceeds the supported maximum.", bytes)
      }
      EaError::ReservoirUnderflow => write!(f, "Bit reservoir underflow. Invalid MP3 file."),
      EaError::ReservoirOverflow => write!(
        f,
        "Bit reservoir overflow; a frame's main data exceeds the format limit."
      ),
    }
  }
}

impl error::Error for EaError {
  fn source(&self) -> Option<&(dyn error::Error + 'static)> {
    match *self {
      EaError::Io(ref err) => Some(err),
      EaError::Hound(ref err) => Some(err),
      _ => None,
    }
  }
}

impl From<io::Error> for EaError {
  fn from(err: io::Error) -> EaError {
    EaError::Io(err)
  }
}

impl From<hound::Error> for EaError {
  fn from(err: hound::Error) -> EaError {
    EaError::Hound(err)
  }
}

impl From<minimp3::Error> for EaError {
  fn from(err: minimp3::Error) -> EaError {
    EaError::Decoder(err)
  }
}
