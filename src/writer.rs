use std::fmt;
use std::io;
use std::io::Write;
use std::mem;
use std::str;

use encoding::RawEncoder;
use encoding_rs::{Encoder, EncoderResult};
use log::debug;

use crate::charset::Charset;
use crate::error::{Error, Result};

enum Backend {
    Whatwg(Encoder),
    Utf16(Box<dyn RawEncoder>),
}

/// Encodes `text` onto the end of `output`. Returns the offset of the first
/// unmappable character, if any.
fn encode_whatwg(
    encoder: &mut Encoder,
    text: &str,
    output: &mut Vec<u8>,
    last: bool,
) -> Result<Option<usize>> {
    let mut consumed = 0;
    loop {
        let needed = encoder
            .max_buffer_length_from_utf8_without_replacement(text.len() - consumed)
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "encode buffer overflow"))?;
        output.reserve(needed);

        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(&text[consumed..], output, last);
        consumed += read;
        match result {
            EncoderResult::InputEmpty => return Ok(None),
            EncoderResult::OutputFull => continue,
            EncoderResult::Unmappable(c) => return Ok(Some(consumed - c.len_utf8())),
        }
    }
}

/// Writer that accepts UTF-8 and writes it to `inner` encoded as a charset.
///
/// Unmappable characters are an [`Error::Encode`], never substituted. A
/// multi-byte sequence may be split across `write` calls. Call
/// [`finish`](EncodingWriter::finish) to flush encoder state and get the sink
/// back; dropping the writer flushes what it can and discards errors.
///
/// After any error the writer rejects further input.
pub struct EncodingWriter<W: Write> {
    inner: Option<W>,
    charset: Charset,
    backend: Backend,
    pending: Vec<u8>,
    output_buf: Vec<u8>,
    position: u64,
    failed: bool,
}

impl<W: Write> EncodingWriter<W> {
    pub fn new(inner: W, charset: Charset) -> Result<Self> {
        let encoding = charset.decoder_encoding();
        let backend = match charset.utf16_encoding() {
            Some(utf16) => Backend::Utf16(utf16.raw_encoder()),
            None if encoding.output_encoding() == encoding => {
                Backend::Whatwg(encoding.new_encoder())
            }
            None => {
                return Err(Error::UnsupportedEncoding {
                    label: charset.name().to_string(),
                })
            }
        };
        Ok(EncodingWriter {
            inner: Some(inner),
            charset,
            backend,
            pending: Vec::new(),
            output_buf: Vec::with_capacity(crate::DEFAULT_BUF_SIZE),
            position: 0,
            failed: false,
        })
    }

    /// Create an encoding writer for the specified encoding label
    pub fn for_label(inner: W, label: &str) -> Result<Self> {
        Self::new(inner, Charset::for_label(label)?)
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.inner.as_ref()
    }

    /// Encodes `text` and writes the result through.
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.check_failed()?;
        if !self.pending.is_empty() {
            return Err(self.fail(Error::Decode {
                encoding: "UTF-8",
                position: self.position,
            }));
        }
        self.encode(text, false)?;
        self.flush_output()
    }

    /// Flushes encoder state and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.check_failed()?;
        if !self.pending.is_empty() {
            // Input ended inside a UTF-8 sequence.
            return Err(self.fail(Error::Decode {
                encoding: "UTF-8",
                position: self.position,
            }));
        }
        self.encode("", true)?;
        self.flush_output()?;
        let mut inner = self.inner.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "encoding writer already finished")
        })?;
        inner.flush()?;
        Ok(inner)
    }

    fn check_failed(&self) -> Result<()> {
        if self.failed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "encoding writer failed earlier",
            )));
        }
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Error {
        debug!("{} writer failed: {}", self.charset.name(), err);
        self.failed = true;
        err
    }

    fn encode(&mut self, text: &str, last: bool) -> Result<()> {
        let unmappable = match &mut self.backend {
            Backend::Whatwg(encoder) => encode_whatwg(encoder, text, &mut self.output_buf, last)?,
            Backend::Utf16(encoder) => {
                let (processed, err) = encoder.raw_feed(text, &mut self.output_buf);
                err.map(|_| processed)
            }
        };
        if let Some(offset) = unmappable {
            let err = Error::Encode {
                encoding: self.charset.name(),
                character: text[offset..]
                    .chars()
                    .next()
                    .unwrap_or(char::REPLACEMENT_CHARACTER),
                position: self.position + offset as u64,
            };
            self.output_buf.clear();
            return Err(self.fail(err));
        }
        self.position += text.len() as u64;
        Ok(())
    }

    fn flush_output(&mut self) -> Result<()> {
        if self.output_buf.is_empty() {
            return Ok(());
        }
        let inner = self.inner.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "encoding writer already finished")
        })?;
        if let Err(e) = inner.write_all(&self.output_buf) {
            self.failed = true;
            return Err(e.into());
        }
        self.output_buf.clear();
        Ok(())
    }
}

impl<W: Write> Write for EncodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_failed()?;
        let mut pending = mem::take(&mut self.pending);
        pending.extend_from_slice(buf);
        let valid = match str::from_utf8(&pending) {
            Ok(text) => text.len(),
            // Incomplete sequence at the end: wait for the rest of it.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                let position = self.position + e.valid_up_to() as u64;
                return Err(self
                    .fail(Error::Decode {
                        encoding: "UTF-8",
                        position,
                    })
                    .into());
            }
        };
        let text = str::from_utf8(&pending[..valid])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.encode(text, false)?;
        self.pending = pending.split_off(valid);
        self.flush_output()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_output()?;
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for EncodingWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_none() || self.failed {
            return;
        }
        // Errors cannot be reported from drop; finish() surfaces them.
        let _ = self.encode("", true).and_then(|()| self.flush_output());
    }
}

impl<W> fmt::Debug for EncodingWriter<W>
where
    W: Write + fmt::Debug,
{
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("EncodingWriter")
            .field("writer", &self.inner)
            .field("encoding", &self.charset.name())
            .field("pending", &self.pending.len())
            .field("failed", &self.failed)
            .finish()
    }
}
