use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced to a caller outside the protocol itself.
///
/// Protocol-level reframes (§4.1) are silent by design and never reach this
/// type; a REPLY error code (§6) is a [`crate::packet::CbmError`] value
/// stored on the channel, not a Rust error. This enum covers the remaining
/// two failure classes from the error-handling design: fatal errors
/// (image I/O, misidentified geometry, merge-repair preconditions) and the
/// ambient CLI/config/transport failures around them.
#[derive(Debug, Error, Diagnostic)]
pub enum XdError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to identify disk image {path}: size {size} matches no known geometry")]
    #[diagnostic(help(
        "supported sizes are D64 (174848/175531), D71 (349696), D80 (533248), \
         D81 (819200/822400), D82 (1066496) bytes, with or without a trailing error table"
    ))]
    UnknownGeometry { path: String, size: u64 },

    #[error("illegal track/sector {track}/{sector} for this geometry")]
    IllegalTrackSector { track: u8, sector: u8 },

    #[error("merge-repair requires at least two images")]
    #[diagnostic(help("pass two or more image paths to `xd2031 merge`"))]
    MergeNeedsTwoImages,

    #[error("merge-repair images have mismatched geometry: {a} vs {b}")]
    #[diagnostic(help("all images passed to merge-repair must be the same disk type"))]
    MergeGeometryMismatch { a: String, b: String },

    #[error("no free channel available (pool exhausted at {max})")]
    NoChannel { max: usize },

    #[error("no free direct buffer available (pool exhausted at {max})")]
    NoBuffer { max: usize },

    #[error("channel {channel} not found")]
    ChannelNotFound { channel: i8 },

    #[error("record length {given} exceeds the 254-byte ceiling")]
    RecordTooLong { given: usize },

    #[error("record not present")]
    RecordNotPresent,

    #[error("overflow writing record")]
    OverflowInRecord,

    #[error("malformed packet: {reason}")]
    MalformedPacket { reason: String },

    #[error("side-sector chain is faulty for '{filename}': {reason}")]
    SideSectorFault { filename: String, reason: String },

    #[error("transport closed")]
    TransportClosed,
}

/// A protocol-level REPLY error code (§6). Distinct from [`XdError`]: this is
/// data carried on the wire and stored on a channel's last-error cell, not an
/// exception — a misbehaving file does not unwind the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CbmError {
    Ok = 0,
    Scratched = 1,
    SyntaxError = 30,
    SyntaxErrorNoCommand = 31,
    SyntaxErrorUnknown = 32,
    SyntaxErrorTooLong = 33,
    SyntaxErrorInvalid = 34,
    WriteProtectOn = 26,
    FileNotFound = 39,
    RecordNotPresent = 50,
    OverflowInRecord = 51,
    FileExists = 63,
    FileTypeMismatch = 64,
    NoBlock = 65,
    NoChannel = 70,
    DirError = 71,
    DiskFull = 72,
    DosVersion = 73,
    DriveNotReady = 74,
    Fault = 255,
}

impl CbmError {
    pub fn code(self) -> u8 {
        self as u8
    }
}
