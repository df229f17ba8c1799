//! Byte order marks of the Unicode encodings.

// Keyed by canonical lower-case encoding name.
static BOMS: [(&str, &[u8]); 3] = [
    ("utf-16be", &[0xfe, 0xff]),
    ("utf-16le", &[0xff, 0xfe]),
    ("utf-8", &[0xef, 0xbb, 0xbf]),
];

/// Returns the byte order mark of `encoding`, if it has one.
///
/// Names are compared ASCII case-insensitively, so both `"utf-16le"` and the
/// `"UTF-16LE"` spelling used by [`encoding_rs`] match.
pub fn bom_for(encoding: &str) -> Option<&'static [u8]> {
    BOMS.iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(encoding))
        .map(|&(_, bom)| bom)
}

/// Strips the byte order mark of `encoding` from the start of `input`.
///
/// Input without the mark, or an encoding without one, comes back unchanged.
/// Repeated marks are all removed, so trimming twice is the same as trimming
/// once. This differs from [`to_utf8`](crate::convert::to_utf8), which
/// removes a single mark and keeps any following U+FEFF as text.
pub fn trim_bom<'a>(mut input: &'a [u8], encoding: &str) -> &'a [u8] {
    if let Some(bom) = bom_for(encoding) {
        while let Some(rest) = input.strip_prefix(bom) {
            input = rest;
        }
    }
    input
}
