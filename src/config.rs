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

use std::time::Duration;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_PACKET_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_SYNC_ATTEMPTS: u32 = 30;
pub const DEFAULT_MAX_RETRY: u32 = 30;
pub const DEFAULT_ACK_READ_LIMIT: u32 = 200;

/// Timeouts and retry ceilings for one transfer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmodemConfig {
    /// Per-byte read timeout while syncing and finishing
    pub handshake_timeout: Duration,
    /// Per-byte read timeout while packets are flowing
    pub packet_timeout: Duration,
    /// Reads (sender) or prompts (receiver) allowed before sync fails;
    /// also bounds EOT transmissions and the receiver's EOT wait
    pub sync_attempts: u32,
    /// Non-ACK reads allowed per packet before `RetryExhausted`;
    /// also bounds the receiver's wait for the next SOH
    pub max_retry: u32,
    /// Non-ACK reads allowed per packet before `AckTimeout`
    pub ack_read_limit: u32,
    /// Send CAN to the peer when the session aborts
    pub cancel_on_abort: bool,
    /// Write "Ready to ..." / "Finished" lines around the transfer
    pub announce: bool,
}

impl Default for XmodemConfig {
    fn default() -> Self {
        XmodemConfig {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            packet_timeout: DEFAULT_PACKET_TIMEOUT,
            sync_attempts: DEFAULT_SYNC_ATTEMPTS,
            max_retry: DEFAULT_MAX_RETRY,
            ack_read_limit: DEFAULT_ACK_READ_LIMIT,
            cancel_on_abort: true,
            announce: false,
        }
    }
}
