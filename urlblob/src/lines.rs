//! Line reconstruction over arbitrarily chunked byte streams, and the inverse
//! for line-oriented uploads.

use async_stream::stream;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::{BlobError, ByteStream, LineStream};

/// Incremental splitter that turns byte chunks into complete text lines.
///
/// Bytes are carried undecoded between chunks, so a line (or a multi-byte
/// character) split across chunk boundaries comes out whole. Lines end at
/// `\n`; a `\r` right before it is dropped, while one ending the input is
/// kept. Invalid UTF-8 is replaced with U+FFFD rather than failing the stream.
#[derive(Debug, Default)]
pub struct LineReconstructor {
    carry: Vec<u8>,
    // prefix of `carry` already known to hold no terminator
    scanned: usize,
}

impl LineReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and take every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut line_start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.carry[search_from..].iter().position(|&b| b == b'\n') {
            let terminator = search_from + offset;
            let raw = &self.carry[line_start..terminator];
            lines.push(decode_line(raw.strip_suffix(b"\r").unwrap_or(raw)));
            line_start = terminator + 1;
            search_from = line_start;
        }

        self.carry.drain(..line_start);
        self.scanned = self.carry.len();
        lines
    }

    /// End of input: whatever is carried is the last line, as-is
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.carry.is_empty() {
            return None;
        }
        let line = decode_line(&self.carry);
        self.carry.clear();
        Some(line)
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Lazily split a chunk stream into lines.
///
/// Dropping the returned stream drops `chunks` with it.
pub fn lines(mut chunks: ByteStream) -> LineStream {
    Box::pin(stream! {
        let mut reconstructor = LineReconstructor::new();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(chunk) => {
                    for line in reconstructor.push(&chunk) {
                        yield Ok::<String, BlobError>(line);
                    }
                }
                Err(e) => {
                    yield Err(BlobError::from(e));
                    return;
                }
            }
        }
        if let Some(line) = reconstructor.finish() {
            yield Ok(line);
        }
    })
}

/// Split a fully buffered body into lines
pub fn split_lines(content: &[u8]) -> Vec<String> {
    let mut reconstructor = LineReconstructor::new();
    let mut lines = reconstructor.push(content);
    lines.extend(reconstructor.finish());
    lines
}

/// Turn lines into an upload body, one chunk per line with `\n` appended
pub fn encode_lines<I, S>(lines: I) -> ByteStream
where
    I: IntoIterator<Item = S>,
    I::IntoIter: Send + 'static,
    S: Into<String>,
{
    Box::pin(futures_util::stream::iter(lines.into_iter().map(|line| {
        let mut line: String = line.into();
        line.push('\n');
        Ok::<_, std::io::Error>(Bytes::from(line))
    })))
}

/// Streaming variant of [`encode_lines`] for lines produced asynchronously
pub fn encode_line_stream<S>(lines: S) -> ByteStream
where
    S: futures_core::Stream<Item = String> + Send + 'static,
{
    Box::pin(lines.map(|mut line| {
        line.push('\n');
        Ok::<_, std::io::Error>(Bytes::from(line))
    }))
}
