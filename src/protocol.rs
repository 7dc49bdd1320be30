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

//! XMODEM-CRC protocol constants

/// Start of header - begins a 128-byte data packet
pub const SOH: u8 = 0x01;

/// End of transmission - sender has no more packets
pub const EOT: u8 = 0x04;

/// Acknowledge - receiver accepted the packet (or the EOT)
pub const ACK: u8 = 0x06;

/// Negative acknowledge - receiver rejects the packet
pub const NAK: u8 = 0x15;

/// Cancel - either side aborts the transfer
pub const CAN: u8 = 0x18;

/// Receiver requests a CRC-mode transfer
pub const SYNC: u8 = b'C';

/// Pads the final packet and marks the end of data
pub const EOF_PAD: u8 = 0x1A;

/// Payload bytes carried by every packet
pub const PACKET_LEN: usize = 128;

/// SOH + sequence + complement + payload + 2 CRC bytes
pub const PACKET_SIZE: usize = PACKET_LEN + 5;

/// Printable name of a control byte, for logging
pub fn control_name(byte: u8) -> String {
    match byte {
        SOH => "SOH".to_string(),
        EOT => "EOT".to_string(),
        ACK => "ACK".to_string(),
        NAK => "NAK".to_string(),
        CAN => "CAN".to_string(),
        SYNC => "'C'".to_string(),
        b if b.is_ascii_graphic() => format!("'{}'", b as char),
        b => format!("0x{:02X}", b),
    }
}
