//! Error taxonomy shared by every VernamFS crate.
//!
//! Mirrors the spec's error table: each variant surfaces to the caller
//! unchanged, nothing here is retried, and nothing here panics on corrupt
//! input.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("first 8 bytes do not match the VernamFS magic")]
    BadMagic,

    #[error("volume too small for the requested layout")]
    TooSmall,

    #[error("bad parameters: {0}")]
    BadParams(&'static str),

    #[error("volume already initialized")]
    Exists,

    #[error("no space left in the file allocation table or data region")]
    NoSpace,

    #[error("path plus NUL exceeds the table entry's name capacity")]
    NameTooLong,

    #[error("another file is already open on this volume")]
    Busy,

    #[error("mounted path was opened for anything other than write-only")]
    ReadOnlyRequested,

    #[error("remote payload was truncated")]
    Truncated,

    #[error("remote and vault table offsets disagree")]
    Mismatch,

    #[error("operation is not supported by VernamFS")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, Error>;
