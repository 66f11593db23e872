//! Wire protocol for grist worker↔server communication.
//!
//! Every message is one frame: a single tag byte followed by fixed-width
//! fields in host-native byte order. Frame boundaries are supplied by the
//! transport — there is no length field anywhere in this format, which is
//! what lets a job frame carry its payload as the bare remainder of the
//! frame.
//!
//! ```text
//! Heartbeat:  [0x00]
//! Hello:      [0x01][version:u8][job_type_from:u32][job_type_to:u32]
//! Job:        [0x02][id:u32][job_type:u32][payload: N × f64]
//! Result:     [0x03][id:u32][value:f64]
//! ```

mod codec;
mod message;

pub use codec::WireError;
pub use message::{Frame, FrameKind, Hello, Job, JobResult, PROTOCOL_VERSION};
