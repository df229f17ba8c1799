use std::io;

use thiserror::Error;

/// Failures produced while resolving, decoding or encoding text.
#[derive(Debug, Error)]
pub enum Error {
    /// The label does not name any known character encoding.
    #[error("unsupported charset: {label:?}")]
    UnsupportedEncoding {
        /// Label as supplied by the caller.
        label: String,
    },

    /// Input holds a byte sequence that is invalid in the source encoding.
    #[error("malformed {encoding} input at byte {position}")]
    Decode {
        /// Name of the encoding the input was decoded as.
        encoding: &'static str,
        /// Offset of the first byte of the malformed sequence.
        position: u64,
    },

    /// A character has no representation in the target encoding.
    #[error("character {character:?} at byte {position} cannot be encoded as {encoding}")]
    Encode {
        /// Name of the target encoding.
        encoding: &'static str,
        /// The unmappable character.
        character: char,
        /// Offset of the character in the UTF-8 input.
        position: u64,
    },

    /// [std::io] error from an underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            Error::UnsupportedEncoding { .. } => io::Error::new(io::ErrorKind::InvalidInput, err),
            err => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}
