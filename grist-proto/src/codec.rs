//! Byte-level encode/decode for [`Frame`].
//!
//! Pure and stateless: bytes in, message out. The codec neither reads nor
//! writes a transport — callers hand it exactly one frame's worth of bytes,
//! because frame boundaries belong to the transport layer.
//!
//! All multi-byte fields are host-native byte order, matching the packing
//! used by the server side. Doubles survive bit-exact, NaN payloads
//! included.

use crate::message::{Frame, FrameKind, Hello, Job, JobResult};

/// A received frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WireError {
    /// The frame contained no bytes at all, not even a tag.
    #[error("empty frame")]
    Empty,

    /// The leading byte is not one of the four assigned tags.
    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),

    /// The frame is shorter than the fixed portion of its kind.
    #[error("{kind} frame of {len} bytes is shorter than its {want}-byte header")]
    Truncated {
        /// Kind named by the tag byte.
        kind: FrameKind,
        /// Total frame length received.
        len: usize,
        /// Fixed size the kind requires.
        want: usize,
    },

    /// A fixed-size frame carried bytes past its last field. Boundaries come
    /// from the transport, so trailing bytes can only mean corruption.
    #[error("{kind} frame carries {extra} trailing bytes")]
    TrailingBytes {
        /// Kind named by the tag byte.
        kind: FrameKind,
        /// Number of unexpected bytes.
        extra: usize,
    },

    /// A job frame's payload region is not a whole number of doubles.
    #[error("job payload of {0} bytes is not a multiple of 8")]
    RaggedPayload(usize),
}

impl Frame {
    /// Serializes this frame to its exact wire representation.
    ///
    /// The output length is `kind().header_len()` plus eight bytes per
    /// payload element for a job frame; no padding is ever emitted.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Heartbeat => vec![FrameKind::Heartbeat.tag()],
            Self::Hello(hello) => {
                let mut out = Vec::with_capacity(FrameKind::Hello.header_len());
                out.push(FrameKind::Hello.tag());
                out.push(hello.version);
                out.extend_from_slice(&hello.job_type_from.to_ne_bytes());
                out.extend_from_slice(&hello.job_type_to.to_ne_bytes());
                out
            }
            Self::Job(job) => {
                let mut out =
                    Vec::with_capacity(FrameKind::Job.header_len() + 8 * job.payload.len());
                out.push(FrameKind::Job.tag());
                out.extend_from_slice(&job.id.to_ne_bytes());
                out.extend_from_slice(&job.job_type.to_ne_bytes());
                for value in &job.payload {
                    out.extend_from_slice(&value.to_ne_bytes());
                }
                out
            }
            Self::Result(result) => {
                let mut out = Vec::with_capacity(FrameKind::Result.header_len());
                out.push(FrameKind::Result.tag());
                out.extend_from_slice(&result.id.to_ne_bytes());
                out.extend_from_slice(&result.value.to_ne_bytes());
                out
            }
        }
    }

    /// Decodes one frame, keyed on its leading tag byte.
    ///
    /// `bytes` must be exactly one frame as delivered by the transport.
    /// Never reads past the slice and never allocates more than the slice
    /// length.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let (&tag, body) = bytes.split_first().ok_or(WireError::Empty)?;
        let kind = FrameKind::try_from(tag)?;

        let want = kind.header_len();
        if bytes.len() < want {
            return Err(WireError::Truncated {
                kind,
                len: bytes.len(),
                want,
            });
        }

        match kind {
            FrameKind::Heartbeat => {
                check_exact(kind, body.len())?;
                Ok(Self::Heartbeat)
            }
            FrameKind::Hello => {
                check_exact(kind, body.len())?;
                Ok(Self::Hello(Hello {
                    version: body[0],
                    job_type_from: read_u32(&body[1..5]),
                    job_type_to: read_u32(&body[5..9]),
                }))
            }
            FrameKind::Job => {
                let data = &body[8..];
                if !data.len().is_multiple_of(8) {
                    return Err(WireError::RaggedPayload(data.len()));
                }
                let payload = data.chunks_exact(8).map(read_f64).collect();
                Ok(Self::Job(Job {
                    id: read_u32(&body[..4]),
                    job_type: read_u32(&body[4..8]),
                    payload,
                }))
            }
            FrameKind::Result => {
                check_exact(kind, body.len())?;
                Ok(Self::Result(JobResult {
                    id: read_u32(&body[..4]),
                    value: read_f64(&body[4..12]),
                }))
            }
        }
    }
}

/// Rejects trailing bytes on a fixed-size frame kind.
///
/// `body_len` excludes the tag byte; callers have already ruled out
/// truncation, so anything past the fixed fields is an error.
fn check_exact(kind: FrameKind, body_len: usize) -> Result<(), WireError> {
    let extra = body_len + 1 - kind.header_len();
    if extra > 0 {
        return Err(WireError::TrailingBytes { kind, extra });
    }
    Ok(())
}

/// Reads a host-endian `u32`. `bytes` must be exactly four bytes.
fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_ne_bytes(buf)
}

/// Reads a host-endian `f64`. `bytes` must be exactly eight bytes.
fn read_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    f64::from_ne_bytes(buf)
}
