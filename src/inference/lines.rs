//! Line reassembly over an arbitrarily chunked byte stream

use bytes::{Buf, BytesMut};

/// Accumulates network chunks and yields complete lines
///
/// Lines end at `\n`; a trailing `\r` is stripped. Invalid UTF-8 is replaced
/// rather than rejected.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Append a received chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete line, if one is buffered
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Take whatever remains after EOF as a final unterminated line
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        let line = String::from_utf8_lossy(rest.chunk()).trim_end_matches('\r').to_string();
        Some(line)
    }

    /// Number of buffered bytes not yet returned
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
