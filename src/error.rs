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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, XmodemError>;

/// Every way a send or receive session can end other than success
#[derive(Debug, Error)]
pub enum XmodemError {
    /// Peer never asked for a CRC transfer, or never started sending
    #[error("no sync from peer after {attempts} attempts")]
    SyncTimeout { attempts: u32 },

    /// Too many reads without an ACK
    #[error("no ACK after {reads} reads")]
    AckTimeout { reads: u32 },

    #[error("retry limit exhausted after {retries} attempts")]
    RetryExhausted { retries: u32 },

    #[error("NAK received from peer")]
    PeerNak,

    #[error("transfer cancelled by peer")]
    Cancelled,

    /// Sequence byte and its complement disagree
    #[error("invalid packet number: 0x{sequence:02X} / complement 0x{complement:02X}")]
    SequenceMismatch { sequence: u8, complement: u8 },

    #[error("CRC16 mismatch on packet {sequence}: received 0x{received:04X}, calculated 0x{calculated:04X}")]
    CrcMismatch { sequence: u8, received: u16, calculated: u16 },

    /// Timed out inside a packet body
    #[error("packet truncated after {received} of {expected} bytes")]
    IncompletePacket { received: usize, expected: usize },

    #[error("no EOT from peer after {attempts} reads")]
    EotTimeout { attempts: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal signal of the state machine loops, never returned by `send`/`receive`
    #[error("transfer complete")]
    TransferComplete,
}

impl XmodemError {
    /// Failures the peer is told about with a CAN. Sync timeouts and I/O
    /// errors are not announced.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            XmodemError::SyncTimeout { .. } | XmodemError::Io(_) | XmodemError::TransferComplete
        )
    }
}
