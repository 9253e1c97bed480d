//! The polymorphic *provider* a channel binds to (§4.3's contract;
//! Design Notes' tagged-variant decision). Rather than a `dyn Trait`
//! object (which an async `submit_call`/`submit` surface would force
//! into boxed-future gymnastics for little benefit with a closed,
//! five-member variant set), the capability set is one enum with
//! per-variant behavior, the REL-proxy variant carrying a boxed inner
//! provider as the Design Notes specify.

use crate::channel::Charset;
use crate::directory::{entry_to_basic_line, BasicLine, DirEntry};
use crate::petscii::{str_ascii_to_petscii, str_petscii_to_ascii};

/// What a channel is bound to.
pub enum Provider {
    /// The IEC/IEEE-488 bus frontend itself (status channel, command
    /// channel).
    Serial,
    /// A CBM disk image file or directory proxy.
    DiskImage,
    /// A direct sector buffer (`#`, U1/U2, B-R/B-W).
    DirectBuffer,
    /// A REL-file record proxy wrapping another provider.
    RelProxy { inner: Box<Provider> },
    /// The drive's status channel (error string after the last
    /// command).
    StatusChannel,
}

impl Provider {
    /// Whether this provider rewrites raw directory-entry packets into
    /// BASIC-listing lines (only `DiskImage` does, §4.5.2).
    pub fn directory_converter(&self, entry: &DirEntry, byte_len: u32) -> Option<BasicLine> {
        match self {
            Provider::DiskImage => Some(entry_to_basic_line(entry, byte_len)),
            Provider::RelProxy { inner } => inner.directory_converter(entry, byte_len),
            _ => None,
        }
    }

    /// Character-set tag carried on the channel (Design Notes:
    /// "character-set conversion happens at provider boundaries only").
    pub fn charset(&self) -> Charset {
        match self {
            Provider::DiskImage | Provider::DirectBuffer | Provider::StatusChannel => Charset::Petscii,
            Provider::Serial => Charset::Ascii,
            Provider::RelProxy { inner } => inner.charset(),
        }
    }

    /// Convert a filename from the bus's PETSCII into whatever this
    /// provider's own charset is, at the provider boundary.
    pub fn to_provider(&self, name: &[u8]) -> Vec<u8> {
        match self.charset() {
            Charset::Petscii => name.to_vec(),
            Charset::Ascii => str_petscii_to_ascii(name),
        }
    }

    /// Convert bytes coming back from the provider into bus PETSCII.
    pub fn from_provider(&self, data: &[u8]) -> Vec<u8> {
        match self.charset() {
            Charset::Petscii => data.to_vec(),
            Charset::Ascii => str_ascii_to_petscii(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_image_converts_directory_entries() {
        let entry = DirEntry {
            next_track: 0,
            next_sector: 0,
            file_type: crate::directory::FILETYPE_PRG,
            locked: false,
            closed: true,
            start_track: 1,
            start_sector: 0,
            name: b"HELLO".to_vec(),
            side_sector_track: 0,
            side_sector_sector: 0,
            record_len: 0,
            blocks: 0,
        };
        let provider = Provider::DiskImage;
        assert!(provider.directory_converter(&entry, 254).is_some());
    }

    #[test]
    fn serial_provider_does_not_convert_directory_entries() {
        let entry = DirEntry {
            next_track: 0,
            next_sector: 0,
            file_type: crate::directory::FILETYPE_SEQ,
            locked: false,
            closed: true,
            start_track: 1,
            start_sector: 0,
            name: b"X".to_vec(),
            side_sector_track: 0,
            side_sector_sector: 0,
            record_len: 0,
            blocks: 0,
        };
        assert!(Provider::Serial.directory_converter(&entry, 0).is_none());
    }

    #[test]
    fn relproxy_delegates_charset_to_inner() {
        let wrapped = Provider::RelProxy {
            inner: Box::new(Provider::DiskImage),
        };
        assert_eq!(wrapped.charset(), Charset::Petscii);
    }
}
