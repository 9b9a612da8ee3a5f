//! Line reading for text feeds that are not guaranteed to be UTF-8.
//!
//! Counter logs and sampler output can carry process names in the system
//! code page. Invalid bytes are replaced with U+FFFD so the line still
//! reaches the parser, which recovers or skips it like any other bad input.

use std::io::BufRead;

/// Read the next line from `reader` into `buf`, decoding it lossily.
///
/// The trailing `\n` or `\r\n` is removed. Returns `None` at end of input.
pub fn read_lossy_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(decode_line(buf)))
}

/// Decode one raw line lossily, dropping its line terminator.
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}
