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

//! XMODEM-CRC with 128-byte packets over any byte channel.
//!
//! [`send`] and [`receive`] each run one complete session against a
//! [`ByteChannel`] and a [`BlockStore`]. Progress is reported through
//! `tracing` events; install a subscriber to see them.

pub mod channel;
pub mod config;
pub mod crc;
pub mod error;
pub mod packet;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod store;

pub use channel::{ByteChannel, SerialChannel};
pub use config::XmodemConfig;
pub use error::{Result, XmodemError};
pub use receiver::receive;
pub use sender::send;
pub use store::{BlockStore, FileStore, MemoryStore, StreamStore};
