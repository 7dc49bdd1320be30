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

//! Packet framing
//!
//! ```text
//! +-----+-----+------+----------------+--------+--------+
//! | SOH | seq | !seq | payload (128)  | crc_hi | crc_lo |
//! +-----+-----+------+----------------+--------+--------+
//! ```
//!
//! The CRC covers the payload only.

use std::time::Duration;
use crate::channel::ByteChannel;
use crate::crc::Crc16;
use crate::error::{Result, XmodemError};
use crate::protocol::*;

/// A packet that passed sequence and CRC validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u8,
    pub complement: u8,
    pub payload: [u8; PACKET_LEN],
    pub crc: u16,
}

/// What arrived where a packet was expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Packet(Packet),
    /// Any leading byte other than SOH, e.g. EOT or CAN
    Control(u8),
}

/// Build the wire image of one packet.
///
/// `crc` is reset and left holding the payload checksum.
pub fn encode(sequence: u8, payload: &[u8; PACKET_LEN], crc: &mut Crc16) -> [u8; PACKET_SIZE] {
    let mut frame = [0u8; PACKET_SIZE];
    frame[0] = SOH;
    frame[1] = sequence;
    frame[2] = !sequence;

    crc.reset();
    for (dst, &byte) in frame[3..3 + PACKET_LEN].iter_mut().zip(payload.iter()) {
        *dst = byte;
        crc.update(byte);
    }

    frame[PACKET_SIZE - 2..].copy_from_slice(&crc.value().to_be_bytes());
    frame
}

/// Wait up to `lead_timeout` for the leading byte of a packet.
///
/// Returns `Ok(None)` when nothing arrived. A leading SOH is followed by the
/// packet body, read with `byte_timeout` per byte.
pub fn decode(
    channel: &mut dyn ByteChannel,
    crc: &mut Crc16,
    lead_timeout: Duration,
    byte_timeout: Duration,
) -> Result<Option<Inbound>> {
    match channel.read_byte(lead_timeout)? {
        None => Ok(None),
        Some(SOH) => {
            let packet = decode_body(channel, crc, byte_timeout)?;
            Ok(Some(Inbound::Packet(packet)))
        }
        Some(other) => Ok(Some(Inbound::Control(other))),
    }
}

/// Read and validate everything after the SOH
pub fn decode_body(channel: &mut dyn ByteChannel, crc: &mut Crc16, timeout: Duration) -> Result<Packet> {
    let mut received = 1;

    let sequence = read_required(channel, timeout, &mut received)?;
    let complement = read_required(channel, timeout, &mut received)?;
    if sequence ^ complement != 0xFF {
        return Err(XmodemError::SequenceMismatch { sequence, complement });
    }

    crc.reset();
    let mut payload = [0u8; PACKET_LEN];
    for slot in payload.iter_mut() {
        *slot = read_required(channel, timeout, &mut received)?;
        crc.update(*slot);
    }

    let hi = read_required(channel, timeout, &mut received)?;
    let lo = read_required(channel, timeout, &mut received)?;
    let received_crc = u16::from_be_bytes([hi, lo]);
    let calculated = crc.value();

    if received_crc != calculated {
        return Err(XmodemError::CrcMismatch {
            sequence,
            received: received_crc,
            calculated,
        });
    }

    Ok(Packet {
        sequence,
        complement,
        payload,
        crc: received_crc,
    })
}

fn read_required(channel: &mut dyn ByteChannel, timeout: Duration, received: &mut usize) -> Result<u8> {
    match channel.read_byte(timeout)? {
        Some(byte) => {
            *received += 1;
            Ok(byte)
        }
        None => Err(XmodemError::IncompletePacket {
            received: *received,
            expected: PACKET_SIZE,
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
