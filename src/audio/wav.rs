//! Streaming WAV header
//!
//! A canonical 44-byte RIFF/WAVE header for 16-bit PCM whose RIFF and
//! `data` chunk sizes are `0xFFFFFFFF`, the conventional marker for a
//! stream of unknown length.

use bytes::{BufMut, BytesMut};

use crate::config::{PayloadFormat, StreamConfig};

/// Size of the header in bytes
pub const WAV_HEADER_LEN: usize = 44;

/// Length sentinel for unbounded streams
pub const STREAMING_LEN: u32 = 0xFFFF_FFFF;

const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;

/// Build the header for a 16-bit PCM stream
pub fn streaming_header(channels: u16, sample_rate: u32) -> [u8; WAV_HEADER_LEN] {
    let block_align = channels * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut buf = BytesMut::with_capacity(WAV_HEADER_LEN);
    buf.put_slice(b"RIFF");
    buf.put_u32_le(STREAMING_LEN);
    buf.put_slice(b"WAVE");
    buf.put_slice(b"fmt ");
    buf.put_u32_le(16);
    buf.put_u16_le(FORMAT_PCM);
    buf.put_u16_le(channels);
    buf.put_u32_le(sample_rate);
    buf.put_u32_le(byte_rate);
    buf.put_u16_le(block_align);
    buf.put_u16_le(BITS_PER_SAMPLE);
    buf.put_slice(b"data");
    buf.put_u32_le(STREAMING_LEN);

    let mut header = [0u8; WAV_HEADER_LEN];
    header.copy_from_slice(&buf);
    header
}

/// Framing header for `config`, if its format has one
///
/// Only WAV is framed; every other format is sent bare.
pub fn framing_header(config: &StreamConfig) -> Option<[u8; WAV_HEADER_LEN]> {
    match config.format {
        PayloadFormat::Wav => Some(streaming_header(config.channels(), config.sample_rate)),
        _ => None,
    }
}
