//! Audio conversion subsystem

pub mod format;
pub mod wav;

pub use format::{ScratchBuffers, Overflow, quantize_sample, resample_linear};
pub use wav::{framing_header, streaming_header, WAV_HEADER_LEN};
