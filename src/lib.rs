//! This crate provides helpers for moving text between character encodings
//! and utf-8, and for copying one byte stream to several readers

pub mod bom;
pub mod charset;
pub mod convert;
pub mod error;
pub mod fanout;
pub mod reader;
pub mod writer;

pub use bom::{bom_for, trim_bom};
pub use charset::{lookup, Charset};
pub use convert::{from_utf8, to_utf8};
pub use error::{Error, Result};
pub use fanout::{fanout, fanout_with_options, Done, FanoutOptions, FanoutReader};
pub use reader::{decoding_reader, DecodingReader};
pub use writer::EncodingWriter;

pub const DEFAULT_BUF_SIZE: usize = 4096;
