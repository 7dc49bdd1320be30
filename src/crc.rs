// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! CRC-16/XMODEM accumulator (poly 0x1021, init 0, no reflection, no final XOR)

const POLY: u16 = 0x1021;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    register: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Crc16 { register: 0 }
    }

    pub fn reset(&mut self) {
        self.register = 0;
    }

    /// Fold one byte into the register and return the new value
    pub fn update(&mut self, byte: u8) -> u16 {
        self.register ^= (byte as u16) << 8;
        for _ in 0..8 {
            if self.register & 0x8000 != 0 {
                self.register = (self.register << 1) ^ POLY;
            } else {
                self.register <<= 1;
            }
        }
        self.register
    }

    pub fn update_slice(&mut self, bytes: &[u8]) -> u16 {
        for &b in bytes {
            self.update(b);
        }
        self.register
    }

    pub fn value(&self) -> u16 {
        self.register
    }
}
