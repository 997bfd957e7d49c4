//! Binary song format.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! magic        8  "\0AK\xffSONG"
//! tempo        2  beats per minute
//! drum count   1
//! instr count  1
//! extra len    4  bytes of extra header, skipped
//! extra        *
//! drums        2 per entry (pcm id)
//! instruments  1-byte length + envelope encoding, per entry
//! commands     opcode byte + operands, to the end of the data
//! ```

use std::io::Cursor;
use std::sync::Arc;

use ak_ir::{AdjustParam, Command, Song};
use arrayvec::ArrayVec;
use binrw::{BinRead, BinWrite};

use crate::instrument_format::InstrumentSpec;
use crate::reader::ByteReader;
use crate::{FormatError, Result};

pub const SONG_MAGIC: &[u8; 8] = b"\0AK\xffSONG";

/// Largest extra header a decoder will skip.
const MAX_EXTRA_HEADER: u32 = 0x0100_0000;

/// Longest encoded command.
const MAX_COMMAND_LEN: usize = 7;

/// Command opcodes.
pub mod opcode {
    pub const NOOP: u8 = 0;
    pub const BEAT: u8 = 1;
    pub const DRUM: u8 = 2;
    pub const NOTE: u8 = 3;
    pub const ADJPITCH: u8 = 4;
    pub const ADJTRIM: u8 = 5;
    pub const ADJPAN: u8 = 6;
    pub const DELAY: u8 = 7;
    pub const SYNC: u8 = 8;
}

#[derive(BinRead, BinWrite, Debug)]
#[brw(big, magic = b"\0AK\xffSONG")]
struct SongHeader {
    tempo: u16,
    drum_count: u8,
    instrument_count: u8,
    extra_len: u32,
}

const HEADER_LEN: usize = 16;

/// Decode a song. Inline instruments are built for `sample_rate`; drums stay
/// unresolved until the song is linked.
pub fn decode_song(data: &[u8], sample_rate: u32) -> Result<Song> {
    let header = SongHeader::read(&mut Cursor::new(data))?;
    if header.extra_len > MAX_EXTRA_HEADER {
        return Err(FormatError::ExtraHeaderTooLarge(header.extra_len));
    }

    let mut song = Song::new();
    song.set_tempo(header.tempo as u32)?;

    let mut r = ByteReader::new(data);
    r.skip(HEADER_LEN + header.extra_len as usize)?;

    for _ in 0..header.drum_count {
        song.add_drum(r.read_u16_be()?)?;
    }
    for _ in 0..header.instrument_count {
        let len = r.read_u8()? as usize;
        let encoding = r.read_bytes(len)?;
        let instrument = InstrumentSpec::parse(encoding)?.build(sample_rate)?;
        song.add_instrument(encoding.to_vec(), Arc::new(instrument))?;
    }

    while !r.is_empty() {
        if let Some(command) = read_command(&mut r)? {
            song.add_command(command)?;
        }
    }

    log::debug!(
        "decoded song: tempo {}, {} drums, {} instruments, {} commands",
        song.tempo(),
        song.drums().len(),
        song.instruments().len(),
        song.commands().len()
    );
    Ok(song)
}

/// Read one command. NOOP is consumed but not kept.
fn read_command(r: &mut ByteReader) -> Result<Option<Command>> {
    let offset = r.pos();
    let op = r.read_u8()?;
    let command = match op {
        opcode::NOOP => return Ok(None),
        opcode::BEAT => Command::Beat,
        opcode::DELAY => Command::Delay(r.read_u16_be()?),
        opcode::SYNC => Command::Sync(r.read_u16_be()?),
        opcode::DRUM => Command::Drum {
            reference: r.read_u8()?,
            drum: r.read_u8()?,
            trim: r.read_u8()?,
            pan: r.read_i8()?,
        },
        opcode::NOTE => Command::Note {
            reference: r.read_u8()?,
            instrument: r.read_u8()?,
            trim: r.read_u8()?,
            pan: r.read_i8()?,
            pitch: r.read_u8()?,
            duration: r.read_u8()?,
        },
        opcode::ADJPITCH | opcode::ADJTRIM | opcode::ADJPAN => Command::Adjust {
            param: match op {
                opcode::ADJPITCH => AdjustParam::Pitch,
                opcode::ADJTRIM => AdjustParam::Trim,
                _ => AdjustParam::Pan,
            },
            reference: r.read_u8()?,
            value: r.read_u8()?,
            duration: r.read_u8()?,
        },
        opcode => return Err(FormatError::UnknownOpcode { opcode, offset }),
    };
    Ok(Some(command))
}

/// Encode a song. Every instrument must be inline; external instruments
/// have no representation in the format. NOOPs are dropped.
pub fn encode_song(song: &Song) -> Result<Vec<u8>> {
    let header = SongHeader {
        tempo: song.tempo(),
        drum_count: song.drums().len() as u8,
        instrument_count: song.instruments().len() as u8,
        extra_len: 0,
    };
    let mut out = Cursor::new(Vec::new());
    header.write(&mut out)?;
    let mut out = out.into_inner();

    for drum in song.drums() {
        out.extend_from_slice(&drum.pcm_id.to_be_bytes());
    }
    for (index, slot) in song.instruments().iter().enumerate() {
        if slot.encoding.is_empty() {
            return Err(FormatError::Unencodable {
                what: "instrument",
                index,
            });
        }
        out.push(slot.encoding.len() as u8);
        out.extend_from_slice(&slot.encoding);
    }
    for command in song.commands() {
        out.extend_from_slice(&write_command(command));
    }
    Ok(out)
}

fn write_command(command: &Command) -> ArrayVec<u8, MAX_COMMAND_LEN> {
    let mut buf = ArrayVec::new();
    match *command {
        Command::Noop => {}
        Command::Beat => buf.push(opcode::BEAT),
        Command::Delay(frames) => {
            buf.push(opcode::DELAY);
            buf.extend(frames.to_be_bytes());
        }
        Command::Sync(token) => {
            buf.push(opcode::SYNC);
            buf.extend(token.to_be_bytes());
        }
        Command::Drum {
            reference,
            drum,
            trim,
            pan,
        } => buf.extend([opcode::DRUM, reference, drum, trim, pan as u8]),
        Command::Note {
            reference,
            instrument,
            trim,
            pan,
            pitch,
            duration,
        } => buf.extend([
            opcode::NOTE,
            reference,
            instrument,
            trim,
            pan as u8,
            pitch,
            duration,
        ]),
        Command::Adjust {
            param,
            reference,
            value,
            duration,
        } => {
            let op = match param {
                AdjustParam::Pitch => opcode::ADJPITCH,
                AdjustParam::Trim => opcode::ADJTRIM,
                AdjustParam::Pan => opcode::ADJPAN,
            };
            buf.extend([op, reference, value, duration]);
        }
    }
    buf
}
