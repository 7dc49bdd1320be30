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
use crate::packet::{self, Inbound, Packet};
use crate::protocol::*;
use crate::store::BlockStore;

// ============================================================================
// States
// ============================================================================

pub struct Idle;
pub struct Syncing;
pub struct WaitPacket;
pub struct WriteBlock;
pub struct WaitEot;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct ReceiverFsm<'a, State> {
    state: PhantomData<State>,
    channel: &'a mut dyn ByteChannel,
    store: &'a mut dyn BlockStore,
    config: XmodemConfig,
    crc: Crc16,
    block: [u8; PACKET_LEN],
    sequence: u8,
    packets: u32,
    attempts: u32,
}

// ============================================================================
// Trait
// ============================================================================

pub trait ReceiverState<'a>: Send {
    fn step(self: Box<Self>) -> Result<NextState<'a>>;
}

pub type NextState<'a> = Box<dyn ReceiverState<'a> + 'a>;

// ============================================================================
// Helpers shared by all states
// ============================================================================

impl<'a, S> ReceiverFsm<'a, S> {
    fn transition<T>(self) -> Box<ReceiverFsm<'a, T>> {
        Box::new(ReceiverFsm {
            state: PhantomData,
            channel: self.channel,
            store: self.store,
            config: self.config,
            crc: self.crc,
            block: self.block,
            sequence: self.sequence,
            packets: self.packets,
            attempts: 0,
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

    /// Wait for the next packet or control byte. Decode failures are terminal.
    fn next_inbound(&mut self, lead_timeout: Duration) -> Result<Option<Inbound>> {
        let byte_timeout = self.config.packet_timeout;
        match packet::decode(self.channel, &mut self.crc, lead_timeout, byte_timeout) {
            Ok(inbound) => Ok(inbound),
            Err(XmodemError::Io(e)) => Err(self.io_error(e)),
            Err(e) => Err(self.abort(e)),
        }
    }

    fn accept(&mut self, packet: Packet) {
        let expected = (self.packets + 1) as u8;
        if packet.sequence != expected {
            warn!("Packet number {} where {} was expected", packet.sequence, expected);
        }
        debug!(
            "Received: packet {} (CRC16 0x{:04X})",
            packet.sequence, packet.crc
        );
        self.sequence = packet.sequence;
        self.block = packet.payload;
    }

    /// Acknowledge the EOT and make the data durable
    fn complete(&mut self) -> Result<()> {
        self.write(&[ACK])?;
        debug!("Sent: ACK for EOT");
        self.store.flush().map_err(|e| self.io_error(e))?;
        self.announce("Finished\r\n")?;
        info!("Received {} packets", self.packets);
        Ok(())
    }

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

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, Idle> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;
        fsm.store.seek_to_start().map_err(|e| fsm.io_error(e))?;
        fsm.announce("Ready to receive\r\n")?;
        debug!("Ready to receive");

        let next = fsm.transition::<Syncing>();
        Ok(next as NextState<'a>)
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, Syncing> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        if fsm.attempts >= fsm.config.sync_attempts {
            let attempts = fsm.attempts;
            return Err(fsm.abort(XmodemError::SyncTimeout { attempts }));
        }
        fsm.attempts += 1;

        fsm.write(&[SYNC])?;
        debug!("Sent: 'C'");

        match fsm.next_inbound(fsm.config.handshake_timeout)? {
            Some(Inbound::Packet(packet)) => {
                fsm.accept(packet);
                let next = fsm.transition::<WriteBlock>();
                Ok(next as NextState<'a>)
            }
            Some(Inbound::Control(CAN)) => Err(fsm.abort(XmodemError::Cancelled)),
            Some(Inbound::Control(other)) => {
                debug!("Received {}, waiting for SOH...", control_name(other));
                Ok(Box::new(fsm) as NextState<'a>)
            }
            None => {
                debug!("Sender not ready");
                Ok(Box::new(fsm) as NextState<'a>)
            }
        }
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, WaitPacket> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        match fsm.next_inbound(fsm.config.packet_timeout)? {
            Some(Inbound::Packet(packet)) => {
                fsm.accept(packet);
                let next = fsm.transition::<WriteBlock>();
                Ok(next as NextState<'a>)
            }
            Some(Inbound::Control(CAN)) => Err(fsm.abort(XmodemError::Cancelled)),
            Some(Inbound::Control(EOT)) => {
                // Last packet did not look like padding; the EOT settles it
                debug!("Received: EOT");
                fsm.complete()?;
                Err(XmodemError::TransferComplete)
            }
            reply => {
                if let Some(Inbound::Control(other)) = reply {
                    debug!("Received {}, waiting for SOH...", control_name(other));
                }
                fsm.attempts += 1;
                if fsm.attempts > fsm.config.max_retry {
                    let attempts = fsm.attempts;
                    return Err(fsm.abort(XmodemError::SyncTimeout { attempts }));
                }
                Ok(Box::new(fsm) as NextState<'a>)
            }
        }
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, WriteBlock> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        fsm.write(&[ACK])?;
        debug!("Sent: ACK for packet {}", fsm.sequence);

        fsm.store.write_block(&fsm.block).map_err(|e| fsm.io_error(e))?;
        fsm.packets += 1;

        if is_eof_block(&fsm.block) {
            debug!("EOF (0x1A) detected in packet {}", fsm.sequence);
            let next = fsm.transition::<WaitEot>();
            Ok(next as NextState<'a>)
        } else {
            let next = fsm.transition::<WaitPacket>();
            Ok(next as NextState<'a>)
        }
    }
}

impl<'a> ReceiverState<'a> for ReceiverFsm<'a, WaitEot> {
    fn step(self: Box<Self>) -> Result<NextState<'a>> {
        let mut fsm = *self;

        if fsm.attempts >= fsm.config.sync_attempts {
            let attempts = fsm.attempts;
            return Err(fsm.abort(XmodemError::EotTimeout { attempts }));
        }
        fsm.attempts += 1;

        match fsm.read(fsm.config.handshake_timeout)? {
            Some(EOT) => {
                debug!("Received: EOT");
                fsm.complete()?;
                Err(XmodemError::TransferComplete)
            }
            Some(CAN) => Err(fsm.abort(XmodemError::Cancelled)),
            Some(other) => {
                debug!("Received {}, waiting for EOT...", control_name(other));
                Ok(Box::new(fsm) as NextState<'a>)
            }
            None => Ok(Box::new(fsm) as NextState<'a>),
        }
    }
}

// ============================================================================
// Constructor & Runner
// ============================================================================

impl<'a> ReceiverFsm<'a, Idle> {
    pub fn new(
        channel: &'a mut dyn ByteChannel,
        store: &'a mut dyn BlockStore,
        config: XmodemConfig,
    ) -> NextState<'a> {
        Box::new(ReceiverFsm {
            state: PhantomData::<Idle>,
            channel,
            store,
            config,
            crc: Crc16::new(),
            block: [0; PACKET_LEN],
            sequence: 0,
            packets: 0,
            attempts: 0,
        })
    }
}

/// Receive one transfer from the peer into `store`.
///
/// Every packet is stored whole, so the final block keeps its 0x1A padding.
pub fn receive(
    channel: &mut dyn ByteChannel,
    store: &mut dyn BlockStore,
    config: &XmodemConfig,
) -> Result<()> {
    let mut state = ReceiverFsm::new(channel, store, *config);

    loop {
        match state.step() {
            Ok(next) => state = next,
            Err(XmodemError::TransferComplete) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// More than two pad bytes, and the packet ends on one
fn is_eof_block(block: &[u8; PACKET_LEN]) -> bool {
    let pads = block.iter().filter(|&&b| b == EOF_PAD).count();
    pads > 2 && block[PACKET_LEN - 1] == EOF_PAD
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use crate::store::MemoryStore;

    fn quick_config() -> XmodemConfig {
        XmodemConfig {
            handshake_timeout: Duration::from_millis(10),
            packet_timeout: Duration::from_millis(10),
            ..XmodemConfig::default()
        }
    }

    fn padded(data: &[u8]) -> [u8; PACKET_LEN] {
        let mut payload = [EOF_PAD; PACKET_LEN];
        payload[..data.len()].copy_from_slice(data);
        payload
    }

    fn frame(sequence: u8, data: &[u8]) -> Vec<Option<u8>> {
        let wire = packet::encode(sequence, &padded(data), &mut Crc16::new());
        MockChannel::bytes(&wire)
    }

    /// Test data that never contains the pad byte
    fn source(len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| match (i % 251) as u8 {
                EOF_PAD => 0,
                b => b,
            })
            .collect()
    }

    #[test]
    fn test_is_eof_block() {
        assert!(is_eof_block(&[EOF_PAD; PACKET_LEN]));
        assert!(is_eof_block(&padded(&source(125))));
        // only two pad bytes
        assert!(!is_eof_block(&padded(&source(126))));
        assert!(!is_eof_block(&padded(&source(128))));

        let mut block = [EOF_PAD; PACKET_LEN];
        block[PACKET_LEN - 1] = 0;
        assert!(!is_eof_block(&block));
    }

    #[test]
    fn test_receive_empty_source() {
        let mut responses = frame(1, &[]);
        responses.push(Some(EOT));

        let expected_writes = vec![SYNC, ACK, ACK];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        receive(&mut channel, &mut store, &quick_config()).expect("Transfer failed");

        assert_eq!(store.bytes(), &[EOF_PAD; PACKET_LEN][..]);
    }

    #[test]
    fn test_receive_exact_block() {
        let data = source(128);

        let mut responses = frame(1, &data);
        responses.extend(frame(2, &[]));
        responses.push(Some(EOT));

        let expected_writes = vec![SYNC, ACK, ACK, ACK];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        receive(&mut channel, &mut store, &quick_config()).expect("Transfer failed");

        assert_eq!(store.bytes().len(), 256);
        assert_eq!(&store.bytes()[..128], &data[..]);
        assert!(store.bytes()[128..].iter().all(|&b| b == EOF_PAD));
    }

    #[test]
    fn test_receive_multiple_packets() {
        let data = source(300);

        let mut responses = frame(1, &data[0..128]);
        responses.extend(frame(2, &data[128..256]));
        responses.extend(frame(3, &data[256..300]));
        responses.push(Some(EOT));

        let expected_writes = vec![SYNC, ACK, ACK, ACK, ACK];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        receive(&mut channel, &mut store, &quick_config()).expect("Transfer failed");

        let content = store.bytes();
        assert_eq!(content.len(), 384, "Three whole packets are stored");
        assert_eq!(&content[..300], &data[..]);
        assert!(content[300..].iter().all(|&b| b == EOF_PAD));
    }

    #[test]
    fn test_sync_prompts_until_soh() {
        let mut responses = vec![None, Some(b'x')];
        responses.extend(frame(1, b"abc"));
        responses.push(Some(EOT));

        // prompting stops once the first SOH arrives
        let expected_writes = vec![SYNC, SYNC, SYNC, ACK, ACK];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        receive(&mut channel, &mut store, &quick_config()).expect("Transfer failed");
        assert_eq!(&store.bytes()[..3], b"abc");
    }

    #[test]
    fn test_sync_timeout() {
        let config = XmodemConfig { sync_attempts: 2, ..quick_config() };

        let mut channel = MockChannel::new(vec![None, None], vec![SYNC, SYNC]);
        let mut store = MemoryStore::empty();

        match receive(&mut channel, &mut store, &config) {
            Err(XmodemError::SyncTimeout { attempts }) => assert_eq!(attempts, 2),
            other => panic!("expected SyncTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_crc_mismatch_is_not_retried() {
        let mut responses = frame(1, b"payload");
        // flip a payload bit
        if let Some(Some(byte)) = responses.get_mut(10) {
            *byte ^= 0x40;
        }

        let expected_writes = vec![SYNC, CAN];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        match receive(&mut channel, &mut store, &quick_config()) {
            Err(XmodemError::CrcMismatch { sequence, .. }) => assert_eq!(sequence, 1),
            other => panic!("expected CrcMismatch, got {:?}", other),
        }
        assert!(store.bytes().is_empty(), "Nothing is written for a bad packet");
    }

    #[test]
    fn test_sequence_mismatch() {
        let responses = vec![Some(SOH), Some(0x01), Some(0x01)];
        let expected_writes = vec![SYNC, CAN];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        assert!(matches!(
            receive(&mut channel, &mut store, &quick_config()),
            Err(XmodemError::SequenceMismatch { sequence: 0x01, complement: 0x01 })
        ));
    }

    #[test]
    fn test_cancel_during_sync() {
        let mut channel = MockChannel::new(vec![None, Some(CAN)], vec![SYNC, SYNC, CAN]);
        let mut store = MemoryStore::empty();

        assert!(matches!(
            receive(&mut channel, &mut store, &quick_config()),
            Err(XmodemError::Cancelled)
        ));
    }

    #[test]
    fn test_cancel_between_packets() {
        let data = source(200);

        let mut responses = frame(1, &data[..128]);
        responses.push(Some(CAN));

        let expected_writes = vec![SYNC, ACK, CAN];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        assert!(matches!(
            receive(&mut channel, &mut store, &quick_config()),
            Err(XmodemError::Cancelled)
        ));
        assert_eq!(store.bytes(), &data[..128]);
    }

    #[test]
    fn test_eot_ends_transfer_without_padding_packet() {
        // 126 data bytes leave only two pad bytes, too few for EOF detection
        let data = source(126);

        let mut responses = frame(1, &data);
        responses.push(None);
        responses.push(Some(EOT));

        let expected_writes = vec![SYNC, ACK, ACK];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        receive(&mut channel, &mut store, &quick_config()).expect("Transfer failed");
        assert_eq!(&store.bytes()[..126], &data[..]);
    }

    #[test]
    fn test_wait_for_next_packet_times_out() {
        let config = XmodemConfig { max_retry: 2, ..quick_config() };

        let mut responses = frame(1, &source(128));
        responses.extend([None, Some(b'?'), None]);

        let mut channel = MockChannel::new(responses, vec![SYNC, ACK]);
        let mut store = MemoryStore::empty();

        match receive(&mut channel, &mut store, &config) {
            Err(XmodemError::SyncTimeout { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected SyncTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_eot_timeout() {
        let config = XmodemConfig { sync_attempts: 2, ..quick_config() };

        let mut responses = frame(1, &[]);
        responses.extend([None, Some(SYNC)]);

        let expected_writes = vec![SYNC, ACK, CAN];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        match receive(&mut channel, &mut store, &config) {
            Err(XmodemError::EotTimeout { attempts }) => assert_eq!(attempts, 2),
            other => panic!("expected EotTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_announce() {
        let config = XmodemConfig { announce: true, ..quick_config() };

        let mut responses = frame(1, b"hi");
        responses.push(Some(EOT));

        let mut expected_writes = b"Ready to receive\r\n".to_vec();
        expected_writes.extend_from_slice(&[SYNC, ACK, ACK]);
        expected_writes.extend_from_slice(b"Finished\r\n");

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        receive(&mut channel, &mut store, &config).expect("Transfer failed");
    }

    #[test]
    fn test_receiver_step_by_step() {
        let mut responses = vec![None];
        responses.extend(frame(1, &[]));

        let expected_writes = vec![SYNC, SYNC, ACK];

        let mut channel = MockChannel::new(responses, expected_writes);
        let mut store = MemoryStore::empty();

        let mut fsm = ReceiverFsm::new(&mut channel, &mut store, quick_config());

        // Idle, Syncing (timeout), Syncing (packet), WriteBlock
        for _ in 0..4 {
            fsm = fsm.step().expect("Should succeed");
        }
    }
}
