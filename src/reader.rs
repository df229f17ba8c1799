use std::cmp;
use std::fmt;
use std::io;
use std::io::BufRead;
use std::io::Read;

use encoding_rs::{Decoder, DecoderResult};

use crate::charset::Charset;
use crate::error::{Error, Result};

/// Decodes `input` onto the end of `output`, failing on the first malformed
/// sequence. `offset` is the stream position of `input[0]`, used for error
/// reporting.
pub(crate) fn decode_into(
    decoder: &mut Decoder,
    input: &[u8],
    output: &mut String,
    offset: u64,
    last: bool,
) -> Result<()> {
    let mut consumed = 0;
    loop {
        let needed = decoder
            .max_utf8_buffer_length_without_replacement(input.len() - consumed)
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "decode buffer overflow"))?;
        output.reserve(needed);

        let (result, read) =
            decoder.decode_to_string_without_replacement(&input[consumed..], output, last);
        consumed += read;
        match result {
            DecoderResult::InputEmpty => return Ok(()),
            DecoderResult::OutputFull => continue,
            DecoderResult::Malformed(bad, lookahead) => {
                // The bad sequence may have started in an earlier chunk.
                let position = (offset + consumed as u64)
                    .saturating_sub(u64::from(bad) + u64::from(lookahead));
                return Err(Error::Decode {
                    encoding: decoder.encoding().name(),
                    position,
                });
            }
        }
    }
}

/// Reader yielding the UTF-8 decoding of an encoded byte stream.
///
/// Decoding is incremental: each `read` from the inner reader is decoded as
/// it arrives. A byte order mark at the start of the stream overrides the
/// declared charset and is not part of the output.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    input_buf: Vec<u8>,
    output_buf: String,
    output_pos: usize,
    position: u64,
    finished: bool,
    // Encoding and offset of a decode error; once set, every read repeats it.
    failed: Option<(&'static str, u64)>,
}

impl<R: Read> DecodingReader<R> {
    /// Create a decoding reader for the provided reader, and the specified encoding label
    pub fn for_label(inner: R, label: &str) -> Result<Self> {
        Ok(Self::new(inner, Charset::for_label(label)?))
    }

    pub fn new(inner: R, charset: Charset) -> Self {
        Self::with_capacity(inner, charset, crate::DEFAULT_BUF_SIZE)
    }

    /// Create a decoding reader with the specified input buffer capacity
    pub fn with_capacity(inner: R, charset: Charset, capacity: usize) -> Self {
        Self::with_initial_buffer(inner, charset, Vec::with_capacity(capacity))
    }

    pub fn with_initial_buffer(inner: R, charset: Charset, mut input_buf: Vec<u8>) -> Self {
        input_buf.clear();
        if input_buf.capacity() == 0 {
            input_buf.reserve(crate::DEFAULT_BUF_SIZE);
        }
        DecodingReader {
            inner,
            decoder: charset.decoder_encoding().new_decoder(),
            input_buf,
            output_buf: String::new(),
            output_pos: 0,
            position: 0,
            finished: false,
            failed: None,
        }
    }

    /// The charset in effect. Until the first bytes are decoded this is the
    /// declared one; afterwards it reflects any byte order mark override.
    pub fn charset(&self) -> Charset {
        Charset::from_encoding(self.decoder.encoding())
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill_input_buf(&mut self) -> io::Result<usize> {
        let capacity = self.input_buf.capacity();
        // Read::read() only sees initialised space, so grow len() up to capacity()
        self.input_buf.resize(capacity, 0);
        let read_size = loop {
            match self.inner.read(&mut self.input_buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.input_buf.clear();
                    return Err(e);
                }
            }
        };
        self.input_buf.truncate(read_size);
        Ok(read_size)
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let nread = {
            let mut rem = self.fill_buf()?;
            rem.read(buf)?
        };

        self.consume(nread);
        Ok(nread)
    }
}

impl<R: Read> BufRead for DecodingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        // A chunk can decode to nothing (a lone BOM, a split sequence), so
        // keep pulling until there is output or the input is exhausted.
        while self.output_pos >= self.output_buf.len() && !self.finished {
            if let Some((encoding, position)) = self.failed {
                return Err(Error::Decode { encoding, position }.into());
            }
            self.output_buf.clear();
            self.output_pos = 0;
            let read_size = self.fill_input_buf()?;
            let last = read_size == 0;
            let decoded = decode_into(
                &mut self.decoder,
                &self.input_buf,
                &mut self.output_buf,
                self.position,
                last,
            );
            if let Err(err) = decoded {
                // Output decoded before the bad sequence is discarded.
                if let Error::Decode { encoding, position } = err {
                    self.failed = Some((encoding, position));
                }
                self.output_buf.clear();
                self.input_buf.clear();
                return Err(err.into());
            }
            self.position += read_size as u64;
            self.input_buf.clear();
            self.finished = last;
        }
        Ok(&self.output_buf.as_bytes()[self.output_pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.output_pos = cmp::min(self.output_pos + amt, self.output_buf.len());
    }
}

impl<R> fmt::Debug for DecodingReader<R>
where
    R: fmt::Debug,
{
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("DecodingReader")
            .field("reader", &self.inner)
            .field("encoding", &self.decoder.encoding().name())
            .field(
                "output_buf",
                &format_args!(
                    "{}/{}",
                    self.output_buf.len() - self.output_pos,
                    self.output_buf.len()
                ),
            )
            .finish()
    }
}

/// Wraps `source` in a reader decoding the charset named by `label` to UTF-8.
pub fn decoding_reader<R: Read>(label: &str, source: R) -> Result<DecodingReader<R>> {
    DecodingReader::for_label(source, label)
}

#[cfg(test)]
mod reader_tests {
    use super::*;
    use std::io::Read;

    /// Hands out its data one byte per read.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    fn decode_all<R: Read>(reader: R, label: &str) -> String {
        let mut decoding_reader = match decoding_reader(label, reader) {
            Ok(r) => r,
            Err(e) => panic!("Failed initializing DecodingReader: {}", e),
        };
        let mut utf8_encoded_doc = String::new();
        decoding_reader
            .read_to_string(&mut utf8_encoded_doc)
            .expect("Failed decoding input data");
        utf8_encoded_doc
    }

    #[test]
    fn test_utf8() {
        // Validation doc has the same text as the test docs, always in utf-8, no bom
        let utf8_validation = include_str!("../tests/validation/doc.txt");

        let utf8_bytes = include_bytes!("../tests/utf8/doc.txt");
        assert_eq!(utf8_validation, decode_all(&utf8_bytes[..], "utf-8"));
    }

    #[test]
    fn test_utf8_with_bom() {
        let utf8_validation = include_str!("../tests/validation/doc.txt");

        let utf8_with_bom_bytes = include_bytes!("../tests/utf8_bom/doc.txt");
        assert_eq!(utf8_validation, decode_all(&utf8_with_bom_bytes[..], "utf-8"));
    }

    #[test]
    fn test_utf16le() {
        let utf16_validation = include_str!("../tests/validation/doc.txt");

        let utf16_bytes = include_bytes!("../tests/utf16le/doc.txt");
        assert_eq!(utf16_validation, decode_all(&utf16_bytes[..], "utf-16le"));
    }

    #[test]
    fn test_utf16le_with_bom() {
        let utf16_validation = include_str!("../tests/validation/doc.txt");

        let utf16_with_bom_bytes = include_bytes!("../tests/utf16le_bom/doc.txt");
        assert_eq!(utf16_validation, decode_all(&utf16_with_bom_bytes[..], "utf-16le"));
    }

    #[test]
    fn test_utf16be() {
        let utf16_validation = include_str!("../tests/validation/doc.txt");

        let utf16_bytes = include_bytes!("../tests/utf16be/doc.txt");
        assert_eq!(utf16_validation, decode_all(&utf16_bytes[..], "utf-16be"));
    }

    #[test]
    fn test_utf16be_with_bom() {
        let utf16_validation = include_str!("../tests/validation/doc.txt");

        let utf16_with_bom_bytes = include_bytes!("../tests/utf16be_bom/doc.txt");
        assert_eq!(utf16_validation, decode_all(&utf16_with_bom_bytes[..], "utf-16be"));
    }

    #[test]
    fn test_bom_overrides_label() {
        let utf16_validation = include_str!("../tests/validation/doc.txt");

        // Little-endian document mislabeled as big-endian.
        let utf16le_with_bom_bytes = include_bytes!("../tests/utf16le_bom/doc.txt");
        assert_eq!(utf16_validation, decode_all(&utf16le_with_bom_bytes[..], "utf-16be"));

        // UTF-8 document mislabeled as Shift_JIS.
        let utf8_with_bom_bytes = include_bytes!("../tests/utf8_bom/doc.txt");
        assert_eq!(utf16_validation, decode_all(&utf8_with_bom_bytes[..], "shift_jis"));
    }

    #[test]
    fn test_shift_jis() {
        let validation = include_str!("../tests/validation/doc_ja.txt");

        let sjis_bytes = include_bytes!("../tests/shift_jis/doc.txt");
        assert_eq!(validation, decode_all(&sjis_bytes[..], "shift_jis"));
    }

    #[test]
    fn test_split_reads() {
        let validation = include_str!("../tests/validation/doc.txt");

        let utf16_with_bom_bytes = include_bytes!("../tests/utf16be_bom/doc.txt");
        assert_eq!(validation, decode_all(Trickle(utf16_with_bom_bytes), "utf-16be"));

        let validation_ja = include_str!("../tests/validation/doc_ja.txt");
        let sjis_bytes = include_bytes!("../tests/shift_jis/doc.txt");
        assert_eq!(validation_ja, decode_all(Trickle(sjis_bytes), "shift_jis"));
    }

    #[test]
    fn test_charset_follows_bom() {
        let utf16_with_bom_bytes = include_bytes!("../tests/utf16le_bom/doc.txt");
        let mut reader = decoding_reader("utf-16be", &utf16_with_bom_bytes[..]).unwrap();
        assert_eq!(reader.charset().name(), "UTF-16BE");
        reader.fill_buf().unwrap();
        assert_eq!(reader.charset().name(), "UTF-16LE");
    }

    #[test]
    fn test_unsupported_label() {
        match decoding_reader("not-a-real-charset", &b""[..]) {
            Err(Error::UnsupportedEncoding { label }) => assert_eq!(label, "not-a-real-charset"),
            other => panic!("expected unsupported encoding, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_malformed_input() {
        let mut reader = decoding_reader("utf-8", Trickle(b"abc\xffdef")).unwrap();
        let mut out = String::new();
        let err = reader.read_to_string(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let inner = err.into_inner().unwrap().downcast::<Error>().unwrap();
        assert!(matches!(*inner, Error::Decode { position: 3, .. }));
    }

    #[test]
    fn test_stays_failed_after_malformed_input() {
        let mut input = b"ab\xffXYZ".to_vec();
        input.extend_from_slice(b"qqqqqqqqqq");
        let charset = Charset::for_label("utf-8").unwrap();
        let mut reader = DecodingReader::with_capacity(&input[..], charset, 6);

        let mut buf = [0u8; 64];
        for _ in 0..3 {
            let err = reader.read(&mut buf).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData);
            let inner = err.into_inner().unwrap().downcast::<Error>().unwrap();
            assert!(matches!(*inner, Error::Decode { position: 2, .. }));
        }
        assert!(reader.fill_buf().is_err());
    }

    #[test]
    fn test_truncated_input() {
        let mut reader = decoding_reader("utf-16le", &[0x61u8, 0x00, 0x62][..]).unwrap();
        let mut out = String::new();
        let err = reader.read_to_string(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode_all(&b""[..], "utf-16be"), "");
    }
}
