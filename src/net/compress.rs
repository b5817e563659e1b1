use flate2::{Decompress, FlushDecompress, Status};
use std::error::Error;
use std::fmt::Display;

// Marker that terminates one logical message inside a shared zlib
// transport stream.
const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

// Output is grown in chunks of this size while inflating.
const CHUNK_SIZE: usize = 16 * 1024;

/// Streaming zlib decompressor with a context shared across frames.
///
/// Transport compression reuses a single zlib context for the lifetime of
/// a connection: every binary WebSocket frame is a slice of that stream
/// and a message boundary is marked with the zlib flush suffix. The
/// context must be [`reset`] whenever the underlying connection is
/// replaced, otherwise the dictionary of the old stream corrupts the new
/// one.
///
/// [`reset`]: Self::reset
#[derive(Debug)]
pub struct Inflater {
    /// Decompressed output of the message currently being assembled.
    buffer: Vec<u8>,

    /// Compressed frames received so far for the current message.
    compressed: Vec<u8>,

    /// Shared zlib context.
    decompress: Decompress,
}

impl Inflater {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(CHUNK_SIZE),
            compressed: Vec::new(),
            decompress: Decompress::new(true),
        }
    }

    /// Feeds one transport frame into the shared stream.
    ///
    /// Returns `Ok(None)` while the message is still incomplete and
    /// `Ok(Some(bytes))` once the frame carrying the flush suffix arrives.
    pub fn inflate(&mut self, frame: &[u8]) -> Result<Option<&[u8]>, CompressError> {
        self.compressed.extend_from_slice(frame);
        if !self.compressed.ends_with(&ZLIB_SUFFIX) {
            return Ok(None);
        }

        self.buffer.clear();

        let mut consumed = 0usize;
        loop {
            self.buffer.reserve(CHUNK_SIZE);

            let in_before = self.decompress.total_in();
            let status = self
                .decompress
                .decompress_vec(
                    &self.compressed[consumed..],
                    &mut self.buffer,
                    FlushDecompress::Sync,
                )
                .map_err(|source| CompressError {
                    kind: CompressErrorType::Inflating,
                    source: Some(Box::new(source)),
                })?;
            consumed += usize::try_from(self.decompress.total_in() - in_before).unwrap_or_default();

            let output_bound = self.buffer.len() == self.buffer.capacity();
            if matches!(status, Status::StreamEnd) || (consumed >= self.compressed.len() && !output_bound) {
                break;
            }
        }

        self.compressed.clear();
        Ok(Some(&self.buffer))
    }

    /// Resets the shared context for a fresh connection.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.compressed.clear();
        self.decompress.reset(true);
    }
}

/// Decompresses one payload-compressed message with its own context.
pub fn decompress_message(frame: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut decompress = Decompress::new(true);
    let mut buffer = Vec::with_capacity(CHUNK_SIZE);

    loop {
        let consumed = usize::try_from(decompress.total_in()).unwrap_or(usize::MAX);
        let status = decompress
            .decompress_vec(
                &frame[consumed.min(frame.len())..],
                &mut buffer,
                FlushDecompress::Finish,
            )
            .map_err(|source| CompressError {
                kind: CompressErrorType::Inflating,
                source: Some(Box::new(source)),
            })?;

        if matches!(status, Status::StreamEnd) {
            break;
        }

        let exhausted =
            usize::try_from(decompress.total_in()).unwrap_or(usize::MAX) >= frame.len();
        if exhausted && buffer.len() < buffer.capacity() {
            // Input ran out with room left to write: the message is
            // missing its stream end.
            return Err(CompressError {
                kind: CompressErrorType::Truncated,
                source: None,
            });
        }
        buffer.reserve(CHUNK_SIZE);
    }

    Ok(buffer)
}

/// Validates that a decompressed message is UTF-8 text.
pub(crate) fn into_text(bytes: Vec<u8>) -> Result<String, CompressError> {
    String::from_utf8(bytes).map_err(|source| CompressError {
        kind: CompressErrorType::NotUtf8,
        source: Some(Box::new(source)),
    })
}

#[derive(Debug)]
pub struct CompressError {
    pub(crate) kind: CompressErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl CompressError {
    #[must_use]
    pub const fn kind(&self) -> &CompressErrorType {
        &self.kind
    }
}

impl Display for CompressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            CompressErrorType::Inflating => f.write_str("failed to decompress frame"),
            CompressErrorType::Truncated => f.write_str("compressed frame is truncated"),
            CompressErrorType::NotUtf8 => f.write_str("decompressed frame is not valid UTF-8"),
        }
    }
}

impl Error for CompressError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum CompressErrorType {
    /// The zlib stream could not be decompressed.
    Inflating,

    /// The message ended before the zlib stream did.
    Truncated,

    /// The decompressed message is not valid UTF-8.
    NotUtf8,
}

#[cfg(test)]
mod tests {
    use super::{Inflater, decompress_message};
    use flate2::{Compress, Compression, FlushCompress};

    fn stream_frame(compress: &mut Compress, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 1024);
        compress
            .compress_vec(payload, &mut out, FlushCompress::Sync)
            .expect("compression should not fail");
        out
    }

    #[test]
    fn shares_context_across_messages() {
        let mut compress = Compress::new(Compression::default(), true);
        let mut inflater = Inflater::new();

        let first = stream_frame(&mut compress, br#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
        let second = stream_frame(&mut compress, br#"{"op":11}"#);

        let out = inflater.inflate(&first).expect("should inflate");
        assert_eq!(
            out,
            Some(br#"{"op":10,"d":{"heartbeat_interval":41250}}"# as &[u8])
        );

        let out = inflater.inflate(&second).expect("should inflate");
        assert_eq!(out, Some(br#"{"op":11}"# as &[u8]));
    }

    #[test]
    fn buffers_partial_frames_until_the_flush_suffix() {
        let mut compress = Compress::new(Compression::default(), true);
        let mut inflater = Inflater::new();

        let frame = stream_frame(&mut compress, b"hello, world");
        let split = frame.len() / 2;

        assert!(
            inflater
                .inflate(&frame[..split])
                .expect("should buffer")
                .is_none()
        );

        let out = inflater.inflate(&frame[split..]).expect("should inflate");
        assert_eq!(out, Some(b"hello, world" as &[u8]));
    }

    #[test]
    fn one_shot_messages_roundtrip() {
        let mut compress = Compress::new(Compression::default(), true);
        let mut frame = Vec::with_capacity(1024);
        compress
            .compress_vec(b"one-shot payload", &mut frame, FlushCompress::Finish)
            .expect("compression should not fail");

        let out = decompress_message(&frame).expect("should decompress");
        assert_eq!(out, b"one-shot payload");
    }

    #[test]
    fn truncated_messages_are_rejected() {
        let mut compress = Compress::new(Compression::default(), true);
        let mut frame = Vec::with_capacity(1024);
        compress
            .compress_vec(b"one-shot payload", &mut frame, FlushCompress::Finish)
            .expect("compression should not fail");

        assert!(decompress_message(&frame[..frame.len() / 2]).is_err());
    }
}
