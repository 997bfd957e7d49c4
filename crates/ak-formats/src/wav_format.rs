//! WAV encoding and decoding for 16-bit PCM.

use std::io::Write;

use ak_ir::Pcm;

use crate::reader::ByteReader;
use crate::{FormatError, Result};

/// Write interleaved 16-bit samples with `channels` samples per frame.
pub fn write_wav(
    w: &mut impl Write,
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> std::io::Result<()> {
    let data_len = (samples.len() * 2) as u32;
    w.write_all(&riff_header(channels, sample_rate, 16, data_len))?;
    for sample in samples {
        w.write_all(&sample.to_le_bytes())?;
    }
    Ok(())
}

pub fn samples_to_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(44 + samples.len() * 2);
    // Writing into a Vec cannot fail.
    let _ = write_wav(&mut buf, samples, channels, sample_rate);
    buf
}

/// RIFF, fmt and data chunk headers for uncompressed PCM.
fn riff_header(channels: u16, sample_rate: u32, bits: u16, data_len: u32) -> [u8; 44] {
    let block_align = channels * bits / 8;
    let mut h = [0u8; 44];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    h[8..16].copy_from_slice(b"WAVEfmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes());
    h[20..22].copy_from_slice(&1u16.to_le_bytes());
    h[22..24].copy_from_slice(&channels.to_le_bytes());
    h[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    h[32..34].copy_from_slice(&block_align.to_le_bytes());
    h[34..36].copy_from_slice(&bits.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_len.to_le_bytes());
    h
}

// --- Reading ---

/// Load a PCM WAV file as a mono playback buffer.
///
/// 8-bit data is widened to 16 bits and stereo is averaged down to one
/// channel. Returns the buffer and the file's sample rate.
pub fn load_wav(data: &[u8]) -> Result<(Pcm, u32)> {
    let header = parse_header(data)?;
    let raw = &data[header.data_offset..];
    let raw = &raw[..header.data_size.min(raw.len())];

    let frames: Vec<i16> = match (header.bits_per_sample, header.num_channels) {
        (8, 1) => raw.iter().map(|&b| widen_8bit(b)).collect(),
        (8, 2) => raw
            .chunks_exact(2)
            .map(|c| average(widen_8bit(c[0]), widen_8bit(c[1])))
            .collect(),
        (16, 1) => raw
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect(),
        (16, 2) => raw
            .chunks_exact(4)
            .map(|c| {
                average(
                    i16::from_le_bytes([c[0], c[1]]),
                    i16::from_le_bytes([c[2], c[3]]),
                )
            })
            .collect(),
        _ => return Err(FormatError::Unsupported("sample layout")),
    };
    Ok((Pcm::new(frames)?, header.sample_rate))
}

struct WavHeader {
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    data_offset: usize,
    data_size: usize,
}

fn parse_header(data: &[u8]) -> Result<WavHeader> {
    let mut r = ByteReader::new(data);
    let riff = r.read_bytes(12)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut fmt: Option<(u16, u32, u16)> = None;
    let mut data_chunk: Option<(usize, usize)> = None;

    while r.rest().len() >= 8 {
        let chunk_id = r.read_bytes(4)?;
        let chunk_size = read_u32_le(r.read_bytes(4)?) as usize;
        let body_offset = r.pos();
        let body = r.rest();

        if chunk_id == b"fmt " && chunk_size >= 16 && body.len() >= 16 {
            let format = u16::from_le_bytes([body[0], body[1]]);
            if format != 1 {
                return Err(FormatError::Unsupported("compressed wav"));
            }
            let channels = u16::from_le_bytes([body[2], body[3]]);
            let rate = read_u32_le(&body[4..8]);
            let bits = u16::from_le_bytes([body[14], body[15]]);
            fmt = Some((channels, rate, bits));
        } else if chunk_id == b"data" {
            data_chunk = Some((body_offset, chunk_size));
        }

        let padded = chunk_size + chunk_size % 2;
        if r.skip(padded).is_err() {
            break;
        }
    }

    match (fmt, data_chunk) {
        (Some((num_channels, sample_rate, bits_per_sample)), Some((data_offset, data_size))) => {
            Ok(WavHeader {
                num_channels,
                sample_rate,
                bits_per_sample,
                data_offset,
                data_size,
            })
        }
        _ => Err(FormatError::InvalidHeader),
    }
}

/// Unsigned 8-bit (center 128) to signed 16-bit.
fn widen_8bit(b: u8) -> i16 {
    ((b as i16) - 128) << 8
}

fn average(a: i16, b: i16) -> i16 {
    ((a as i32 + b as i32) / 2) as i16
}

fn read_u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
