//! REL-file proxy (C4), grounded on `relfile.c`/`relfile.h`: a
//! byte-at-a-time `get`/`put` interface that wraps a record-oriented
//! server endpoint, transparently re-opened in place of the original
//! channel once the server reports a REL file (§4.4).

use crate::error::XdError;

pub const RECORD_LEN_CEILING: usize = 254;

/// The server round-trip a REL proxy drives: position to a record, then
/// read or write `reclen` bytes on the underlying channel.
pub trait RelEndpoint {
    fn position(&mut self, channel: u8, record: u32) -> Result<(), XdError>;
    fn read_record(&mut self, channel: u8, reclen: u8) -> Result<Vec<u8>, XdError>;
    fn write_record(&mut self, channel: u8, reclen: u8, data: &[u8]) -> Result<(), XdError>;
}

/// Masks a channel number the way `POSITION` does on the wire: CBM DOS
/// adds `0x60` to the record number, so the channel field only carries
/// its low 5 bits.
pub fn wire_channel(channel: u8) -> u8 {
    channel & 0x1F
}

pub struct RelProxy {
    channel: u8,
    reclen: u8,
    record: u32,
    buffer: Vec<u8>,
    rp: usize,
    wp: usize,
    preload: bool,
    is_read: bool,
}

impl RelProxy {
    pub fn new(channel: u8, reclen: u8) -> Result<Self, XdError> {
        if reclen as usize > RECORD_LEN_CEILING {
            return Err(XdError::RecordTooLong { given: reclen as usize });
        }
        Ok(Self {
            channel,
            reclen,
            record: 0,
            buffer: vec![0u8; reclen as usize],
            rp: 0,
            wp: 0,
            preload: false,
            is_read: false,
        })
    }

    /// `POSITION(channel, record, pos-in-record)`: a bare position with
    /// `pos == 0` surfaces "record not present" (the server replies with
    /// that error if the record doesn't exist yet); a nonzero `pos`
    /// positions, reads the record in, then advances `rp`/`wp` by
    /// `pos - 1`.
    pub fn position(
        &mut self,
        endpoint: &mut dyn RelEndpoint,
        record: u32,
        pos_in_record: u8,
    ) -> Result<(), XdError> {
        endpoint.position(wire_channel(self.channel), record)?;
        self.record = record;

        if pos_in_record == 0 {
            self.preload = false;
            return Ok(());
        }

        self.buffer = endpoint.read_record(wire_channel(self.channel), self.reclen)?;
        let advance = (pos_in_record - 1) as usize;
        if advance >= self.reclen as usize {
            return Err(XdError::RecordNotPresent);
        }
        self.rp = advance;
        self.wp = advance;
        self.preload = true;
        self.is_read = true;
        Ok(())
    }

    /// `get(byte)`: issue position-then-read on first use of a record;
    /// return `buffer[rp]`; signal record-EOF when the remainder of the
    /// record is all zero, advancing to the next record unless still in
    /// preload mode.
    pub fn get(&mut self, endpoint: &mut dyn RelEndpoint) -> Result<(u8, bool), XdError> {
        if !self.preload {
            endpoint.position(wire_channel(self.channel), self.record)?;
            self.buffer = endpoint.read_record(wire_channel(self.channel), self.reclen)?;
            self.rp = 0;
            self.preload = true;
        }

        let byte = self.buffer[self.rp];
        let remainder_is_zero = self.buffer[self.rp..].iter().all(|&b| b == 0);
        let at_eof = self.rp + 1 >= self.reclen as usize || remainder_is_zero;

        if at_eof {
            if !self.preload_only_mode() {
                self.record += 1;
                self.preload = false;
            }
        } else {
            self.rp += 1;
        }

        Ok((byte, at_eof))
    }

    fn preload_only_mode(&self) -> bool {
        false
    }

    /// `put(byte, flush)`: if the channel is in read mode, advance to
    /// the next record without reading it first; append the byte at
    /// `wp`; pad and send the record (via `POSITION` + write) once
    /// `wp` hits `reclen` or `flush` is requested.
    pub fn put(&mut self, endpoint: &mut dyn RelEndpoint, byte: u8, flush: bool) -> Result<(), XdError> {
        if self.is_read {
            self.record += 1;
            self.wp = 0;
            self.is_read = false;
        }

        if self.wp >= self.reclen as usize {
            return Err(XdError::OverflowInRecord);
        }
        self.buffer[self.wp] = byte;
        self.wp += 1;
        self.preload = true;

        if self.wp == self.reclen as usize || flush {
            for i in self.wp..self.reclen as usize {
                self.buffer[i] = 0;
            }
            endpoint.position(wire_channel(self.channel), self.record)?;
            endpoint.write_record(wire_channel(self.channel), self.reclen, &self.buffer)?;
            self.wp = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeEndpoint {
        records: HashMap<u32, Vec<u8>>,
        positioned: Option<u32>,
    }

    impl RelEndpoint for FakeEndpoint {
        fn position(&mut self, _channel: u8, record: u32) -> Result<(), XdError> {
            self.positioned = Some(record);
            Ok(())
        }
        fn read_record(&mut self, _channel: u8, reclen: u8) -> Result<Vec<u8>, XdError> {
            let record = self.positioned.unwrap_or(0);
            Ok(self
                .records
                .get(&record)
                .cloned()
                .unwrap_or_else(|| vec![0u8; reclen as usize]))
        }
        fn write_record(&mut self, _channel: u8, _reclen: u8, data: &[u8]) -> Result<(), XdError> {
            let record = self.positioned.unwrap_or(0);
            self.records.insert(record, data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn scenario_p6_position_then_get() {
        let mut endpoint = FakeEndpoint {
            records: HashMap::new(),
            positioned: None,
        };
        let mut rec1 = vec![0u8; 10];
        rec1[0] = 0xAA;
        rec1[1] = 0xBB;
        endpoint.records.insert(1, rec1);

        let mut proxy = RelProxy::new(5, 10).unwrap();
        proxy.position(&mut endpoint, 1, 1).unwrap();
        // P6: "the byte read at position 1 equals byte 0 of record r" —
        // pos-in-record 1 positions rp at index 0 (advance = pos - 1).
        let (byte, _eof) = proxy.get(&mut endpoint).unwrap();
        assert_eq!(byte, 0xAA);
    }

    #[test]
    fn wire_channel_masks_to_five_bits() {
        assert_eq!(wire_channel(0xFF), 0x1F);
        assert_eq!(wire_channel(3), 3);
    }

    #[test]
    fn record_length_ceiling_is_254() {
        assert!(RelProxy::new(1, 255).is_err());
        assert!(RelProxy::new(1, 254).is_ok());
    }

    #[test]
    fn put_pads_and_flushes_on_reclen() {
        let mut endpoint = FakeEndpoint {
            records: HashMap::new(),
            positioned: None,
        };
        let mut proxy = RelProxy::new(2, 4).unwrap();
        proxy.put(&mut endpoint, 1, false).unwrap();
        proxy.put(&mut endpoint, 2, false).unwrap();
        proxy.put(&mut endpoint, 3, false).unwrap();
        proxy.put(&mut endpoint, 4, false).unwrap();
        let stored = endpoint.records.get(&0).unwrap();
        assert_eq!(stored, &vec![1, 2, 3, 4]);
    }

    #[test]
    fn put_flush_pads_short_record_with_zeros() {
        let mut endpoint = FakeEndpoint {
            records: HashMap::new(),
            positioned: None,
        };
        let mut proxy = RelProxy::new(2, 4).unwrap();
        proxy.put(&mut endpoint, 9, true).unwrap();
        let stored = endpoint.records.get(&0).unwrap();
        assert_eq!(stored, &vec![9, 0, 0, 0]);
    }
}
