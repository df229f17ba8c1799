//! Whole-buffer conversion between a charset and UTF-8.

use std::str;

use encoding_rs::Encoding;

use crate::charset::Charset;
use crate::error::{Error, Result};
use crate::reader::decode_into;
use crate::writer::EncodingWriter;

/// Decodes `input` from `charset` into UTF-8.
///
/// A leading UTF-8 or UTF-16 byte order mark overrides `charset` and is
/// dropped from the output. Only one mark is removed; a second U+FEFF is
/// text. [`trim_bom`](crate::bom::trim_bom), by contrast, strips repeats.
/// Malformed input fails with [`Error::Decode`].
pub fn to_utf8(input: &[u8], charset: Charset) -> Result<Vec<u8>> {
    let (encoding, bom_len) =
        Encoding::for_bom(input).unwrap_or((charset.decoder_encoding(), 0));
    let body = &input[bom_len..];
    let offset = bom_len as u64;

    let mut decoder = encoding.new_decoder_without_bom_handling();
    let mut output = String::new();
    decode_into(&mut decoder, body, &mut output, offset, true)?;
    Ok(output.into_bytes())
}

/// Encodes UTF-8 `input` into `charset`.
///
/// Characters the charset cannot represent fail with [`Error::Encode`];
/// input that is not UTF-8 fails with [`Error::Decode`].
pub fn from_utf8(input: &[u8], charset: Charset) -> Result<Vec<u8>> {
    let text = str::from_utf8(input).map_err(|e| Error::Decode {
        encoding: "UTF-8",
        position: e.valid_up_to() as u64,
    })?;

    // On error the writer is dropped, releasing the encoder, before we return.
    let mut writer = EncodingWriter::new(Vec::with_capacity(input.len()), charset)?;
    writer.write_str(text)?;
    writer.finish()
}
