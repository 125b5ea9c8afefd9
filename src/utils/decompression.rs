//! Incremental gzip decoding for streamed downloads
//!
//! Listing feeds are frequently served gzip-compressed, sometimes with a
//! `Content-Encoding: gzip` header and sometimes as a plain `.xml.gz` body.
//! [`StreamingDecoder`] detects either case from the header hint plus the
//! gzip magic bytes and inflates chunk by chunk, so a body spread over many
//! range requests decodes as one continuous stream. Concatenated gzip members
//! decode back to back.

use flate2::write::MultiGzDecoder;
use std::io::{self, Write};
use tracing::{debug, warn};

/// Gzip magic bytes
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression detected on a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Uncompressed,
}

/// Detect compression format using magic bytes
pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
    if data.len() >= 2 && data[..2] == GZIP_MAGIC {
        CompressionFormat::Gzip
    } else {
        CompressionFormat::Uncompressed
    }
}

enum Mode {
    /// Waiting for enough bytes to look at the magic
    Detecting { pending: Vec<u8> },
    /// Inflating; `started` flips once a chunk decoded cleanly
    Gzip {
        decoder: Box<MultiGzDecoder<Vec<u8>>>,
        started: bool,
    },
    Passthrough,
}

/// Chunk-at-a-time gzip decoder with plain-text fallback
pub struct StreamingDecoder {
    declared_gzip: bool,
    mode: Mode,
}

impl StreamingDecoder {
    /// `declared_gzip` is the server's `Content-Encoding` hint
    pub fn new(declared_gzip: bool) -> Self {
        Self {
            declared_gzip,
            mode: Mode::Detecting {
                pending: Vec::new(),
            },
        }
    }

    /// Whether the stream is being inflated
    pub fn is_decompressing(&self) -> bool {
        matches!(self.mode, Mode::Gzip { .. })
    }

    /// Feed the next raw chunk, returning whatever plain bytes it produced
    ///
    /// A stream that fails to inflate on its very first chunk is treated as
    /// plain text (servers mislabel files often enough). Failures after that
    /// point are real corruption and surface as errors.
    pub fn feed(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        match &mut self.mode {
            Mode::Passthrough => Ok(chunk.to_vec()),
            Mode::Detecting { pending } => {
                pending.extend_from_slice(chunk);
                if pending.len() < GZIP_MAGIC.len() {
                    return Ok(Vec::new());
                }
                let buffered = std::mem::take(pending);
                self.choose_mode(&buffered);
                self.feed(&buffered)
            }
            Mode::Gzip { decoder, started } => match decoder.write_all(chunk) {
                Ok(()) => {
                    *started = true;
                    Ok(std::mem::take(decoder.get_mut()))
                }
                Err(e) if !*started => {
                    warn!("Stream has gzip magic but failed to inflate ({}); storing raw", e);
                    self.mode = Mode::Passthrough;
                    Ok(chunk.to_vec())
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Flush the decoder at end of stream
    pub fn finish(self) -> io::Result<Vec<u8>> {
        match self.mode {
            Mode::Passthrough => Ok(Vec::new()),
            // Fewer than two bytes ever arrived
            Mode::Detecting { pending } => Ok(pending),
            Mode::Gzip { decoder, .. } => decoder.finish(),
        }
    }

    fn choose_mode(&mut self, head: &[u8]) {
        match detect_compression_format(head) {
            CompressionFormat::Gzip => {
                debug!(
                    "Gzip stream detected (declared by server: {})",
                    self.declared_gzip
                );
                self.mode = Mode::Gzip {
                    decoder: Box::new(MultiGzDecoder::new(Vec::new())),
                    started: false,
                };
            }
            CompressionFormat::Uncompressed => {
                if self.declared_gzip {
                    warn!("Server declared gzip encoding but body is not gzip; storing as-is");
                }
                self.mode = Mode::Passthrough;
            }
        }
    }
}
