use std::fmt;

use encoding::EncodingRef;
use log::debug;

use crate::bom;
use crate::error::{Error, Result};

/// A resolved character encoding.
///
/// Both directions go through [`encoding_rs`], except UTF-16 output, which
/// [`encoding_rs`] does not produce and the [`encoding`] crate does.
#[derive(Clone, Copy)]
pub struct Charset {
    decoding: &'static encoding_rs::Encoding,
}

impl Charset {
    /// Resolve a charset label such as `"Shift_JIS"`, `"latin1"` or `"utf-16"`.
    ///
    /// Labels are matched case-insensitively against the WHATWG label table,
    /// aliases included. The `replacement` pseudo-encoding is never returned.
    pub fn for_label(label: &str) -> Result<Self> {
        match encoding_rs::Encoding::for_label_no_replacement(label.as_bytes()) {
            Some(enc) => Ok(Self::from_encoding(enc)),
            None => {
                debug!("no charset matches label {:?}", label);
                Err(Error::UnsupportedEncoding {
                    label: label.to_string(),
                })
            }
        }
    }

    pub fn from_encoding(decoding: &'static encoding_rs::Encoding) -> Self {
        Charset { decoding }
    }

    /// Canonical name, e.g. `"UTF-16LE"` or `"Shift_JIS"`.
    pub fn name(&self) -> &'static str {
        self.decoding.name()
    }

    pub fn decoder_encoding(&self) -> &'static encoding_rs::Encoding {
        self.decoding
    }

    /// Whether text can be encoded into this charset.
    pub fn can_encode(&self) -> bool {
        self.utf16_encoding().is_some() || self.decoding.output_encoding() == self.decoding
    }

    /// The [`encoding`] crate codec for UTF-16 charsets.
    pub(crate) fn utf16_encoding(&self) -> Option<EncodingRef> {
        if self.decoding == encoding_rs::UTF_16LE {
            Some(encoding::all::UTF_16LE as EncodingRef)
        } else if self.decoding == encoding_rs::UTF_16BE {
            Some(encoding::all::UTF_16BE as EncodingRef)
        } else {
            None
        }
    }

    /// Strips this charset's byte order mark from `input`.
    pub fn trim_bom<'a>(&self, input: &'a [u8]) -> &'a [u8] {
        bom::trim_bom(input, self.name())
    }
}

impl PartialEq for Charset {
    fn eq(&self, other: &Self) -> bool {
        self.decoding == other.decoding
    }
}

impl Eq for Charset {}

impl fmt::Debug for Charset {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Charset")
            .field("name", &self.name())
            .field("can_encode", &self.can_encode())
            .finish()
    }
}

/// Shorthand for [`Charset::for_label`].
pub fn lookup(label: &str) -> Result<Charset> {
    Charset::for_label(label)
}

#[cfg(test)]
mod charset_tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(lookup("shift_jis").unwrap().name(), "Shift_JIS");
        assert_eq!(lookup("SJIS").unwrap().name(), "Shift_JIS");
        assert_eq!(lookup(" latin1 ").unwrap().name(), "windows-1252");
        assert_eq!(lookup("utf-16").unwrap().name(), "UTF-16LE");
        assert_eq!(lookup("UTF-16BE").unwrap().name(), "UTF-16BE");
        assert_eq!(lookup("utf8").unwrap(), lookup("UTF-8").unwrap());
    }

    #[test]
    fn test_unsupported_label() {
        match lookup("not-a-real-charset") {
            Err(Error::UnsupportedEncoding { label }) => assert_eq!(label, "not-a-real-charset"),
            other => panic!("expected unsupported encoding, got {:?}", other),
        }
    }

    #[test]
    fn test_replacement_is_rejected() {
        assert!(matches!(
            lookup("iso-2022-kr"),
            Err(Error::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_can_encode() {
        for label in ["utf-8", "utf-16le", "utf-16be", "shift_jis", "gbk", "gb18030", "euc-kr"] {
            assert!(lookup(label).unwrap().can_encode(), "{}", label);
        }
    }

    #[test]
    fn test_utf16_codec() {
        assert!(lookup("utf-16le").unwrap().utf16_encoding().is_some());
        assert!(lookup("utf-16be").unwrap().utf16_encoding().is_some());
        assert!(lookup("gbk").unwrap().utf16_encoding().is_none());
    }

    #[test]
    fn test_trim_bom_by_charset() {
        let utf16le = lookup("utf-16le").unwrap();
        assert_eq!(utf16le.trim_bom(&[0xff, 0xfe, 0x61, 0x00]), &[0x61, 0x00]);
    }
}
