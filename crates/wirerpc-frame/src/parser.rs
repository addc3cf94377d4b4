use bytes::Bytes;
use tracing::trace;

use crate::codec::{peek_length, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Default initial buffer size: 1 MiB.
pub const DEFAULT_INITIAL_SIZE: usize = 1024 * 1024;

/// Default buffer growth ratio.
pub const DEFAULT_GROW_RATIO: f64 = 1.5;

/// Smallest step the buffer grows by, so zero-sized buffers still grow.
const MIN_GROWTH: usize = 64;

/// Configuration for the stream parser.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Buffer size allocated up front and after [`LengthPrefixParser::reset`].
    pub initial_size: usize,
    /// Geometric growth ratio applied when a chunk does not fit. Values below
    /// 1.5 are raised to 1.5.
    pub grow_ratio: f64,
    /// Maximum declared body length accepted from the wire.
    pub max_payload: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_INITIAL_SIZE,
            grow_ratio: DEFAULT_GROW_RATIO,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Reassembles length-prefixed payloads from arbitrarily chunked bytes.
///
/// Bytes are appended at a write cursor into a buffer that only ever grows.
/// After each append every complete frame is emitted, in arrival order, and
/// trailing bytes are shifted down to offset 0.
#[derive(Debug)]
pub struct LengthPrefixParser {
    buffer: Vec<u8>,
    pos: usize,
    config: ParserConfig,
}

impl LengthPrefixParser {
    /// Create a parser with default configuration.
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Create a parser with explicit configuration.
    pub fn with_config(mut config: ParserConfig) -> Self {
        if config.grow_ratio.is_nan() || config.grow_ratio < DEFAULT_GROW_RATIO {
            config.grow_ratio = DEFAULT_GROW_RATIO;
        }
        let buffer = vec![0; config.initial_size];
        Self {
            buffer,
            pos: 0,
            config,
        }
    }

    /// Append `chunk` and invoke `on_frame` once per complete payload.
    ///
    /// All frames completed by this chunk are delivered before `parse`
    /// returns. Returns the number of frames delivered.
    ///
    /// A declared length above `max_payload` is an error; the buffered bytes
    /// are discarded because the stream can no longer be resynchronized.
    pub fn parse<F>(&mut self, chunk: &[u8], mut on_frame: F) -> Result<usize>
    where
        F: FnMut(Bytes),
    {
        self.ensure_capacity(chunk.len());
        self.buffer[self.pos..self.pos + chunk.len()].copy_from_slice(chunk);
        self.pos += chunk.len();
        self.check(&mut on_frame)
    }

    /// Convenience wrapper around [`parse`](Self::parse) collecting the frames.
    pub fn parse_collect(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        let mut frames = Vec::new();
        self.parse(chunk, |frame| frames.push(frame))?;
        Ok(frames)
    }

    /// Reallocate the buffer and drop any partial data.
    ///
    /// `None` restores the configured initial size; `Some(0)` releases the
    /// buffer entirely.
    pub fn reset(&mut self, size: Option<usize>) {
        let size = size.unwrap_or(self.config.initial_size);
        self.buffer = vec![0; size];
        self.pos = 0;
    }

    /// Number of bytes buffered but not yet emitted.
    pub fn buffered(&self) -> usize {
        self.pos
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Parser configuration.
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    fn ensure_capacity(&mut self, incoming: usize) {
        let required = self.pos + incoming;
        let mut capacity = self.buffer.len();
        if required <= capacity {
            return;
        }
        while capacity < required {
            let grown = (capacity as f64 * self.config.grow_ratio).ceil() as usize;
            capacity = grown.max(capacity + MIN_GROWTH);
        }
        trace!(from = self.buffer.len(), to = capacity, "growing parser buffer");
        self.buffer.resize(capacity, 0);
    }

    fn check<F>(&mut self, on_frame: &mut F) -> Result<usize>
    where
        F: FnMut(Bytes),
    {
        let mut emitted = 0;
        while let Some(body_len) = peek_length(&self.buffer[..self.pos]) {
            if body_len > self.config.max_payload {
                self.pos = 0;
                return Err(FrameError::PayloadTooLarge {
                    size: body_len,
                    max: self.config.max_payload,
                });
            }

            let total = HEADER_SIZE + body_len;
            if self.pos < total {
                break;
            }

            on_frame(Bytes::copy_from_slice(&self.buffer[HEADER_SIZE..total]));
            emitted += 1;

            self.buffer.copy_within(total..self.pos, 0);
            self.pos -= total;
        }
        Ok(emitted)
    }
}

impl Default for LengthPrefixParser {
    fn default() -> Self {
        Self::new()
    }
}
