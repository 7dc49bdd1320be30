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

use std::fs::File;
use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom, Write};

// ============================================================================
// BlockStore Trait
// ============================================================================

/// Sequential storage the sender reads from and the receiver writes to
pub trait BlockStore: Send {
    fn seek_to_start(&mut self) -> std::io::Result<()>;

    fn has_more(&mut self) -> std::io::Result<bool>;

    fn read_byte(&mut self) -> std::io::Result<u8>;

    fn write_byte(&mut self, byte: u8) -> std::io::Result<()>;

    fn flush(&mut self) -> std::io::Result<()>;

    fn write_block(&mut self, block: &[u8]) -> std::io::Result<()> {
        for &byte in block {
            self.write_byte(byte)?;
        }
        Ok(())
    }
}

// ============================================================================
// Stream-backed Store
// ============================================================================

/// Block store over any seekable stream.
///
/// `has_more` needs one byte of lookahead, which is held in `peeked` until the
/// next `read_byte`.
pub struct StreamStore<T> {
    inner: T,
    peeked: Option<u8>,
}

pub type FileStore = StreamStore<File>;
pub type MemoryStore = StreamStore<Cursor<Vec<u8>>>;

impl<T> StreamStore<T> {
    pub fn new(inner: T) -> Self {
        StreamStore { inner, peeked: None }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl MemoryStore {
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        StreamStore::new(Cursor::new(data.into()))
    }

    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    pub fn bytes(&self) -> &[u8] {
        self.inner.get_ref()
    }
}

impl<T: Read + Write + Seek + Send> BlockStore for StreamStore<T> {
    fn seek_to_start(&mut self) -> std::io::Result<()> {
        self.peeked = None;
        self.inner.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn has_more(&mut self) -> std::io::Result<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }

        let mut buf = [0u8; 1];
        let n = self.inner.read(&mut buf)?;
        if n == 0 {
            return Ok(false);
        }
        self.peeked = Some(buf[0]);
        Ok(true)
    }

    fn read_byte(&mut self) -> std::io::Result<u8> {
        if let Some(byte) = self.peeked.take() {
            return Ok(byte);
        }

        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf)? {
            0 => Err(std::io::Error::new(ErrorKind::UnexpectedEof, "block store exhausted")),
            _ => Ok(buf[0]),
        }
    }

    fn write_byte(&mut self, byte: u8) -> std::io::Result<()> {
        // A pending lookahead byte means the stream is one ahead of the caller
        if self.peeked.take().is_some() {
            self.inner.seek(SeekFrom::Current(-1))?;
        }
        self.inner.write_all(&[byte])
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_with_lookahead() {
        let mut store = MemoryStore::from_bytes(b"ab".to_vec());

        assert!(store.has_more().unwrap());
        assert!(store.has_more().unwrap());
        assert_eq!(store.read_byte().unwrap(), b'a');
        assert_eq!(store.read_byte().unwrap(), b'b');
        assert!(!store.has_more().unwrap());
        assert_eq!(store.read_byte().unwrap_err().kind(), ErrorKind::UnexpectedEof);

        store.seek_to_start().unwrap();
        assert_eq!(store.read_byte().unwrap(), b'a');
    }

    #[test]
    fn test_write_after_peek_overwrites_peeked_byte() {
        let mut store = MemoryStore::from_bytes(b"xyz".to_vec());

        assert_eq!(store.read_byte().unwrap(), b'x');
        assert!(store.has_more().unwrap());
        store.write_block(b"YZ").unwrap();
        store.flush().unwrap();

        assert_eq!(store.bytes(), b"xYZ");
    }

    #[test]
    fn test_file_store() {
        let path = std::env::temp_dir().join("xmodem128_store_test.bin");
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();

        let mut store = FileStore::new(file);
        store.seek_to_start().unwrap();
        store.write_block(b"hello").unwrap();
        store.flush().unwrap();

        store.seek_to_start().unwrap();
        let mut read_back = Vec::new();
        while store.has_more().unwrap() {
            read_back.push(store.read_byte().unwrap());
        }
        assert_eq!(read_back, b"hello");

        drop(store);
        std::fs::remove_file(&path).ok();
    }
}
