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

//
// ######
// #     # # #####  ####  ##### #####  ######   ##   #    #
// #     # #   #   #        #   #    # #       #  #  ##  ##
// ######  #   #    ####    #   #    # #####  #    # # ## #
// #     # #   #        #   #   #####  #      ###### #    #
// #     # #   #   #    #   #   #   #  #      #    # #    #
// ######  #   #    ####    #   #    # ###### #    # #    #
//

///
/// BitReader is a cursor over a byte buffer that reads most-significant-bit
/// first, big-endian at both the bit and the byte level.  Reads past the end
/// of the buffer yield zero bits; callers bound their reads by the sizes the
/// enclosing format declares.
///
pub struct BitReader<'a> {
    data: &'a [u8],

    /// Bit position of the cursor
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline(always)]
    pub fn read_bit(&mut self) -> u32 {
        let byte = self.data.get(self.pos >> 3).copied().unwrap_or(0);
        let bit = (byte >> (7 - (self.pos & 7))) & 1;
        self.pos += 1;
        u32::from(bit)
    }

    ///
    /// Read `n` bits (n <= 32).  The first bit read lands in the most
    /// significant of the low `n` bits of the result.
    ///
    #[inline(always)]
    pub fn read_bits(&mut self, n: usize) -> u32 {
        debug_assert!(n <= 32);
        let mut value = 0u32;
        let mut left = n;
        while left > 0 {
            let bit_off = self.pos & 7;
            let take = (8 - bit_off).min(left);
            let byte = self.data.get(self.pos >> 3).copied().unwrap_or(0);
            let chunk = (byte >> (8 - bit_off - take)) & (((1u16 << take) - 1) as u8);
            value = (value << take) | u32::from(chunk);
            self.pos += take;
            left -= take;
        }
        value
    }

    /// Read a byte-aligned big-endian 32-bit integer.
    pub fn read_aligned_u32_be(&mut self) -> u32 {
        debug_assert!(self.pos % 8 == 0);
        self.read_bits(32)
    }

    #[inline(always)]
    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek_absolute(&mut self, bit_pos: usize) {
        self.pos = bit_pos;
    }

    /// Advance to the next byte boundary, discarding any partial byte.
    pub fn seek_to_next_byte(&mut self) {
        if self.pos % 8 != 0 {
            self.pos += 8 - (self.pos % 8);
        }
    }

    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }
}

///
/// BitWriter packs bits MSB-first into a zero-initialized byte buffer of
/// fixed capacity.  Writing past the end of the buffer is a program error.
///
pub struct BitWriter<'a> {
    data: &'a mut [u8],

    /// Bit position of the cursor
    pos: usize,
}

impl<'a> BitWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, pos: 0 }
    }

    ///
    /// Write the low `n` bits of `value` (n <= 32), most significant first.
    ///
    #[inline(always)]
    pub fn write_bits(&mut self, value: u32, n: usize) {
        debug_assert!(n <= 32);
        let mut left = n;
        while left > 0 {
            let bit_off = self.pos & 7;
            let take = (8 - bit_off).min(left);
            let chunk = ((value >> (left - take)) & (((1u64 << take) - 1) as u32)) as u8;
            self.data[self.pos >> 3] |= chunk << (8 - bit_off - take);
            self.pos += take;
            left -= take;
        }
    }

    /// Advance to the next byte boundary; the skipped bits stay zero.
    pub fn write_to_next_byte(&mut self) {
        if self.pos % 8 != 0 {
            self.pos += 8 - (self.pos % 8);
        }
    }

    #[inline(always)]
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Number of bytes touched so far, the partial trailing byte included.
    pub fn byte_len(&self) -> usize {
        (self.pos + 7) / 8
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
