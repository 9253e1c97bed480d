//! Packet framing (C1): a 3-byte header (`cmd`, `len`, `chan`) followed by
//! `len - 3` bytes of payload, over an ordered byte stream that can lose
//! synchronization at any time (device reset, garbled line noise on boot).
//!
//! Command codes follow the `FS_*` numbering in the original firmware's
//! `wireformat.h` where a name survives unchanged (`TERM=0`, the `OPEN_*`
//! range, `SYNC=127`); codes the original command set didn't need
//! (`OPEN_DIRECT`, `DATA`/`DATA_EOF` split from `WRITE`/`WRITE_EOF`,
//! `POSITION`, `BLOCK`, `MOVE`, `COPY`, `RESET`, `INFO`, `CHARSET`) are
//! assigned free slots in the same byte space.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::XdError;

/// Offsets within the 3-byte header.
pub const FSP_CMD: usize = 0;
pub const FSP_LEN: usize = 1;
pub const FSP_FD: usize = 2;
pub const HEADER_LEN: usize = 3;

/// Reserved file descriptors that never name a live channel.
pub const FSFD_TERM: u8 = 0xfe;
pub const FSFD_SETOPT: u8 = 0xfd;

/// Closed set of wire commands (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CbmCommand {
    Term = 0,
    OpenRd = 1,
    OpenWr = 2,
    OpenRw = 3,
    OpenOw = 4,
    OpenAp = 5,
    OpenDr = 6,
    OpenDirect = 7,
    Close = 8,
    Read = 9,
    Write = 10,
    WriteEof = 11,
    Data = 12,
    DataEof = 13,
    Chdir = 14,
    Mkdir = 15,
    Rmdir = 16,
    Delete = 17,
    Move = 18,
    Copy = 19,
    Assign = 20,
    Chkdsk = 21,
    Format = 22,
    Position = 23,
    Block = 24,
    Reply = 25,
    Setopt = 26,
    Reset = 27,
    Info = 28,
    Charset = 29,
    Sync = 127,
}

impl CbmCommand {
    pub fn from_u8(v: u8) -> Option<Self> {
        use CbmCommand::*;
        Some(match v {
            0 => Term,
            1 => OpenRd,
            2 => OpenWr,
            3 => OpenRw,
            4 => OpenOw,
            5 => OpenAp,
            6 => OpenDr,
            7 => OpenDirect,
            8 => Close,
            9 => Read,
            10 => Write,
            11 => WriteEof,
            12 => Data,
            13 => DataEof,
            14 => Chdir,
            15 => Mkdir,
            16 => Rmdir,
            17 => Delete,
            18 => Move,
            19 => Copy,
            20 => Assign,
            21 => Chkdsk,
            22 => Format,
            23 => Position,
            24 => Block,
            25 => Reply,
            26 => Setopt,
            27 => Reset,
            28 => Info,
            29 => Charset,
            127 => Sync,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A single framed packet: command, channel/fd, and payload.
///
/// `chan` doubles as a file descriptor (open channel number) or, for
/// out-of-band commands, one of the reserved `FSFD_*` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub cmd: u8,
    pub chan: u8,
    pub data: Bytes,
}

impl Packet {
    pub fn new(cmd: CbmCommand, chan: u8, data: impl Into<Bytes>) -> Self {
        Self {
            cmd: cmd.code(),
            chan,
            data: data.into(),
        }
    }

    /// The `cmd` byte interpreted as a known command, or `None` for a
    /// code this build doesn't recognize (forward-compatible SETOPT
    /// extensions, vendor codes).
    pub fn command(&self) -> Option<CbmCommand> {
        CbmCommand::from_u8(self.cmd)
    }

    /// Total on-wire length, header included.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }
}

/// `tokio_util::codec` framing for the C1 byte stream (§4.1).
///
/// Implements the receiver algorithm literally: a lone `SYNC` byte is
/// echoed and consumed without becoming a packet (boot re-anchoring,
/// S3); a header whose `len` is too small to hold a header is resync
/// garbage and is dropped one byte at a time; otherwise the frame waits
/// for `len` total bytes to arrive before it is cut out as a packet.
#[derive(Debug, Default)]
pub struct PacketCodec {
    /// A `SYNC` byte was just consumed; the caller should echo one byte
    /// back before the next `decode` call produces more data. `decode`
    /// itself only removes the byte from the buffer — the actual echo
    /// is the transport's job (§4.2's boot-sync handshake owns the
    /// socket write half).
    pub pending_sync_echo: bool,
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = XdError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, XdError> {
        loop {
            if src.len() < HEADER_LEN {
                return Ok(None);
            }

            let cmd = src[FSP_CMD];
            let len = src[FSP_LEN] as usize;

            if cmd == CbmCommand::Sync.code() {
                src.advance(1);
                self.pending_sync_echo = true;
                continue;
            }

            if len < HEADER_LEN {
                src.advance(1);
                continue;
            }

            if src.len() < len {
                return Ok(None);
            }

            let chan = src[FSP_FD];
            let frame = src.split_to(len);
            let data = Bytes::copy_from_slice(&frame[HEADER_LEN..len]);
            return Ok(Some(Packet { cmd, chan, data }));
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = XdError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), XdError> {
        // SYNC never frames as a 3-byte header: the decoder (above) treats
        // a lone `SYNC` byte as a one-byte re-anchoring marker, consuming
        // it without ever reading a `len`/`chan` after it. Encoding it as
        // a normal header would make the next byte a bogus `len`, which is
        // exactly the desync the boot flood exists to fix.
        if packet.cmd == CbmCommand::Sync.code() {
            dst.reserve(1);
            dst.put_u8(packet.cmd);
            return Ok(());
        }

        let len = packet.wire_len();
        if len > u8::MAX as usize {
            return Err(XdError::MalformedPacket {
                reason: format!("payload of {} bytes exceeds the 255-byte frame", len),
            });
        }
        dst.reserve(len);
        dst.put_u8(packet.cmd);
        dst.put_u8(len as u8);
        dst.put_u8(packet.chan);
        dst.extend_from_slice(&packet.data);
        Ok(())
    }
}
