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

//! EALayer3 is Electronic Arts' MP3 variant: the per-frame headers and the
//! bit reservoir machinery are stripped and the granules repackaged into an
//! outer block structure carrying one or more interleaved streams.  This
//! crate rebuilds standards-compliant MP3 frames from those blocks, decodes
//! them to PCM through an external decoder, and can re-encapsulate plain
//! MP3 back into the container.

pub mod bitstream;
pub mod blocks;
pub mod decodefile;
pub mod encodefile;
pub mod error;
pub mod generator;
pub mod loaders;
pub mod mpeg;
pub mod mpeggen;
pub mod mpegparser;
pub mod parser;
pub mod writers;
