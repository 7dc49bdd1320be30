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

use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use crate::channel::ByteChannel;
use crate::config::XmodemConfig;
use crate::crc::Crc16;
use crate::error::{Result, XmodemError};
use crate::packet;
use crate::protocol::*;
use crate::store::BlockStore;

// ============================================================================
// States
// ============================================================================

pub struct Idle;
pub struct WaitSync;
pub struct SendPacket;
pub struct WaitAck;
pub struct SendEot;
pub struct WaitEotAck;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct SenderFsm<'a, State> {
    state: PhantomData<State>,
    channel: &'a mut dyn ByteChannel,
    store: &'a mut dyn BlockStore,
    config: XmodemConfig,
    crc: Crc16,
    packet_num: u32,
    fin: bool,
    attempts: u32,
    eot_sent: u32,
}

// ============================================================================
// Trait
// ============================================================================

pub trait SenderState<'a>: Send {
    fn step(self: Box<Self>) -> Result<NextState<'a>>;
}

pub type NextState<'a> = Box<dyn SenderState<'a> + 'a>;

// ============================================================================
// Helpers shared by all states
// ============================================================================

impl<'a, S> SenderFsm<'a, S> {
    /// Move to another state; the per-state attempt counter starts over
    fn transition<T>(self) -> Box<SenderFsm<'a, T>> {
        Box::new(SenderFsm {
            state: PhantomData,
            channel: self.channel,
            store: self.store,
            config: self.config,
            crc: self.crc,
            packet_num: self.packet_num,
            fin: self.fin,
            attempts: 0,
            eot_sent: self.eot_sent,
        })
    }

    fn io_error(&self, e: std::io::Error) -> XmodemError {
        let type_name = std::any::type_name::<S>();
        let state_name = type_name.split("::").last().unwrap_or(type_name);
        XmodemError::Io(std::io::Error::new(
            e.kind(),
            format!("{} (in state: {})", e, state_name)
        ))
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<u8>> {
        self.channel.read_byte(timeout).map_err(|e| self.io_error(e))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.channel.write_all(bytes).map_err(|e| self.io_error(e))
    }

    fn announce(&mut self, line: &str) -> Result<()> {
        if self.config.announce {
            self.write(line.as_bytes())?;
        }
        Ok(())
    }

    fn sequence(&self) -> u8 {
        self.packet_num as u8
    }

    /// Log a terminal failure and tell the peer about it
    fn abort(&mut self, err: XmodemError) -> XmodemError {
        error!("{}", err);
        if self.config.cancel_on_abort && err.is_fatal() {
            match self.channel.write_all(&[CAN]) {
                Ok(()) => debug!("Sent: CAN"),
                Err(e) => warn!("Could not send CAN: {}", e),
            }
        }
        err
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl<'a> SenderState<'a> for SenderFsm<'a, Idle> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;
        fsm.store.seek_to_start().map_err(|e| fsm.io_error(e))?;
        fsm.announce("Ready to send\r\n")?;
        debug!("Ready to send");

        let next = fsm.transition::<WaitSync>();
        Ok(next as NextState<'a>)
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, WaitSync> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        if fsm.attempts >= fsm.config.sync_attempts {
            let attempts = fsm.attempts;
            return Err(fsm.abort(XmodemError::SyncTimeout { attempts }));
        }
        fsm.attempts += 1;

        match fsm.read(fsm.config.handshake_timeout)? {
            Some(SYNC) => {
                debug!("Received: 'C'");
                let next = fsm.transition::<SendPacket>();
                Ok(next as NextState<'a>)
            }
            Some(other) => {
                debug!("Received {}, waiting for 'C'...", control_name(other));
                Ok(Box::new(fsm) as NextState<'a>)
            }
            None => {
                debug!("Receiver not ready");
                Ok(Box::new(fsm) as NextState<'a>)
            }
        }
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, SendPacket> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        let mut payload = [EOF_PAD; PACKET_LEN];
        let mut data_len = 0;
        for slot in payload.iter_mut() {
            if !fsm.store.has_more().map_err(|e| fsm.io_error(e))? {
                fsm.fin = true;
                break;
            }
            *slot = fsm.store.read_byte().map_err(|e| fsm.io_error(e))?;
            data_len += 1;
        }

        let sequence = fsm.sequence();
        if sequence == 0 {
            warn!("Packet {} wraps the sequence number to 0", fsm.packet_num);
        }

        let frame = packet::encode(sequence, &payload, &mut fsm.crc);
        fsm.write(&frame)?;
        debug!(
            "Sent: packet {} ({} data bytes, CRC16 0x{:04X}{})",
            sequence,
            data_len,
            fsm.crc.value(),
            if fsm.fin { ", final" } else { "" }
        );

        let next = fsm.transition::<WaitAck>();
        Ok(next as NextState<'a>)
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, WaitAck> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        match fsm.read(fsm.config.packet_timeout)? {
            Some(ACK) => {
                debug!("Received: ACK for packet {}", fsm.sequence());
                fsm.packet_num += 1;

                if fsm.fin {
                    let next = fsm.transition::<SendEot>();
                    Ok(next as NextState<'a>)
                } else {
                    let next = fsm.transition::<SendPacket>();
                    Ok(next as NextState<'a>)
                }
            }
            Some(NAK) => {
                debug!("Received: NAK for packet {}", fsm.sequence());
                Err(fsm.abort(XmodemError::PeerNak))
            }
            Some(CAN) => Err(fsm.abort(XmodemError::Cancelled)),
            reply => {
                if let Some(other) = reply {
                    debug!("Received {}, waiting for ACK...", control_name(other));
                }
                fsm.attempts += 1;

                // Both ceilings apply to the same counter
                if fsm.attempts > fsm.config.ack_read_limit {
                    let reads = fsm.attempts;
                    return Err(fsm.abort(XmodemError::AckTimeout { reads }));
                }
                if fsm.attempts > fsm.config.max_retry {
                    let retries = fsm.attempts;
                    return Err(fsm.abort(XmodemError::RetryExhausted { retries }));
                }
                Ok(Box::new(fsm) as NextState<'a>)
            }
        }
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, SendEot> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        if fsm.eot_sent >= fsm.config.sync_attempts {
            let reads = fsm.eot_sent;
            return Err(fsm.abort(XmodemError::AckTimeout { reads }));
        }
        fsm.eot_sent += 1;

        fsm.write(&[EOT])?;
        debug!("Sent: EOT");

        let next = fsm.transition::<WaitEotAck>();
        Ok(next as NextState<'a>)
    }
}

impl<'a> SenderState<'a> for SenderFsm<'a, WaitEotAck> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        match fsm.read(fsm.config.handshake_timeout)? {
            Some(ACK) => {
                debug!("Received: ACK for EOT");
                fsm.announce("Finished\r\n")?;
                info!("Sent {} packets", fsm.packet_num - 1);
                Err(XmodemError::TransferComplete)
            }
            Some(NAK) => {
                debug!("Received: NAK for EOT");
                Err(fsm.abort(XmodemError::PeerNak))
            }
            Some(CAN) => Err(fsm.abort(XmodemError::Cancelled)),
            Some(other) => {
                debug!("Received {}, waiting for ACK...", control_name(other));
                fsm.attempts += 1;
                if fsm.attempts > fsm.config.ack_read_limit {
                    let reads = fsm.attempts;
                    return Err(fsm.abort(XmodemError::AckTimeout { reads }));
                }
                Ok(Box::new(fsm) as NextState<'a>)
            }
            None => {
                debug!("No ACK for EOT, resending");
                let next = fsm.transition::<SendEot>();
                Ok(next as NextState<'a>)
            }
        }
    }
}

// ============================================================================
// Constructor & Runner
// ============================================================================

impl<'a> SenderFsm<'a, Idle> {
    pub fn new(
        channel: &'a mut dyn ByteChannel,
        store: &'a mut dyn BlockStore,
        config: XmodemConfig,
    ) -> NextState<'a> {
        Box::new(SenderFsm {
            state: PhantomData::<Idle>,
            channel,
            store,
            config,
            crc: Crc16::new(),
            packet_num: 1,
            fin: false,
            attempts: 0,
            eot_sent: 0,
        })
    }
}

/// Send the whole contents of `store` to the peer
pub fn send(
    channel: &mut dyn ByteChannel,
    store: &mut dyn BlockStore,
    config: &XmodemConfig,
) -> Result<()> {
    let mut state = SenderFsm::new(channel, store, *config);

    loop {
        match state.step() {
            Ok(next) => state = next,
            Err(XmodemError::TransferComplete) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
