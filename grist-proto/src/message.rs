//! Protocol message types for worker↔server communication.

use crate::codec::WireError;

/// Version of the wire format this crate speaks.
///
/// Sent in every [`Hello`]. The worker lets callers override the advertised
/// version per session so that protocol revisions can be exercised side by
/// side in tests.
pub const PROTOCOL_VERSION: u8 = 0;

/// Handshake record, sent exactly once per session, always first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    /// Wire format version the sender speaks.
    pub version: u8,
    /// Lowest job type this worker accepts (inclusive).
    pub job_type_from: u32,
    /// Highest job type this worker accepts (inclusive).
    pub job_type_to: u32,
}

/// One unit of work assigned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Opaque correlation token; echoed unchanged in the matching [`JobResult`].
    pub id: u32,
    /// Selects which computation to run. Interpreted only by the objective
    /// function, never by the protocol engine.
    pub job_type: u32,
    /// Numeric argument vector. May be empty.
    pub payload: Vec<f64>,
}

/// The scalar outcome of evaluating one [`Job`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobResult {
    /// `id` of the job this result answers.
    pub id: u32,
    /// The computed scalar.
    pub value: f64,
}

/// One wire message, discriminated by its leading tag byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Zero-payload liveness marker.
    Heartbeat,
    /// Session handshake.
    Hello(Hello),
    /// Work assignment from the server.
    Job(Job),
    /// Computed answer for one job.
    Result(JobResult),
}

impl Frame {
    /// The message kind of this frame.
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::Heartbeat => FrameKind::Heartbeat,
            Self::Hello(_) => FrameKind::Hello,
            Self::Job(_) => FrameKind::Job,
            Self::Result(_) => FrameKind::Result,
        }
    }
}

/// Message kind — the set of valid leading tag bytes.
///
/// The four tags are the complete protocol; adding one is a wire format
/// break, so this enum is deliberately exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Liveness marker, no fields.
    Heartbeat = 0x00,
    /// Handshake record.
    Hello = 0x01,
    /// Work assignment with trailing `f64` payload.
    Job = 0x02,
    /// Scalar answer.
    Result = 0x03,
}

impl FrameKind {
    /// The tag byte that opens every frame of this kind.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Size in bytes of the fixed portion of a frame of this kind,
    /// tag byte included. A job frame may be longer (its payload), the
    /// other kinds are exactly this size.
    pub const fn header_len(self) -> usize {
        match self {
            Self::Heartbeat => 1,
            Self::Hello => 10,
            Self::Job => 9,
            Self::Result => 13,
        }
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(tag: u8) -> Result<Self, WireError> {
        match tag {
            0x00 => Ok(Self::Heartbeat),
            0x01 => Ok(Self::Hello),
            0x02 => Ok(Self::Job),
            0x03 => Ok(Self::Result),
            other => Err(WireError::UnknownTag(other)),
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Heartbeat => "heartbeat",
            Self::Hello => "hello",
            Self::Job => "job",
            Self::Result => "result",
        };
        f.write_str(name)
    }
}
