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

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use serialport::{SerialPort, DataBits, Parity, StopBits};

// ============================================================================
// ByteChannel Trait
// ============================================================================

/// Byte transport the XMODEM state machines talk over.
///
/// `read_timeout` blocks for at most `timeout` and reports an expired wait as
/// an `ErrorKind::TimedOut` error, the way `serialport` does.
pub trait ByteChannel: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

    /// Read a single byte, `None` if nothing arrived in time
    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read_timeout(&mut buf, timeout) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Serial Port Channel
// ============================================================================

/// Channel over a real serial port
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    byte_delay: Duration,
}

impl SerialChannel {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(SerialChannel { port, byte_delay: Duration::ZERO })
    }

    /// Pause between bytes on write, for receivers with tiny input buffers
    pub fn with_byte_delay(mut self, delay: Duration) -> Self {
        self.byte_delay = delay;
        self
    }
}

impl ByteChannel for SerialChannel {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if self.byte_delay.is_zero() {
            self.port.write_all(buf)?;
        } else {
            for byte in buf {
                self.port.write_all(std::slice::from_ref(byte))?;
                std::thread::sleep(self.byte_delay);
            }
        }
        self.port.flush()
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        self.port.set_timeout(timeout)
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        self.port.read(buf)
    }
}

// ============================================================================
// Mock Channel for Testing
// ============================================================================

#[cfg(test)]
pub struct MockChannel {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    write_log: Vec<u8>,
    expected_writes: Vec<u8>,
}

#[cfg(test)]
impl MockChannel {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockChannel {
            read_buffer: responses,
            read_pos: 0,
            write_log: Vec::new(),
            expected_writes,
        }
    }

    /// Script a run of bytes that all arrive without a timeout
    pub fn bytes(data: &[u8]) -> Vec<Option<u8>> {
        data.iter().copied().map(Some).collect()
    }
}

#[cfg(test)]
impl ByteChannel for MockChannel {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        let timed_out = || std::io::Error::new(ErrorKind::TimedOut, "Mock timeout");

        // Out of responses = timeout
        if self.read_pos >= self.read_buffer.len() {
            return Err(timed_out());
        }

        if self.read_buffer[self.read_pos].is_none() {
            self.read_pos += 1;
            return Err(timed_out());
        }

        let mut bytes_read = 0;
        while bytes_read < buf.len() && self.read_pos < self.read_buffer.len() {
            match self.read_buffer[self.read_pos] {
                Some(byte) => {
                    buf[bytes_read] = byte;
                    bytes_read += 1;
                    self.read_pos += 1;
                }
                None => break,
            }
        }

        Ok(bytes_read)
    }
}

#[cfg(test)]
impl Drop for MockChannel {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockChannel dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockChannel write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_byte_maps_timeouts_to_none() {
        let mut channel = MockChannel::new(vec![Some(0x41), None, Some(0x42)], vec![]);
        let t = Duration::from_millis(10);

        assert_eq!(channel.read_byte(t).unwrap(), Some(0x41));
        assert_eq!(channel.read_byte(t).unwrap(), None);
        assert_eq!(channel.read_byte(t).unwrap(), Some(0x42));
        // exhausted script behaves like a silent line
        assert_eq!(channel.read_byte(t).unwrap(), None);
    }
}
