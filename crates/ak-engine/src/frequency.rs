//! Pitch-to-rate conversion for tuned channels.
//!
//! Pitch is a semitone index starting at A-0 (27.5 Hz), twelve per octave.

/// Frequency of pitch 0 (A-0).
const BASE_FREQUENCY: f32 = 27.5;

/// Frequency ratios within one octave, 12-TET.
const INTERVALS: [f32; 12] = [
    1.000000, 1.059463, 1.122462, 1.189207, 1.259921, 1.334840, 1.414214, 1.498307, 1.587401,
    1.681793, 1.781797, 1.887749,
];

/// Frequency in Hz of a pitch.
pub fn rate_from_pitch(pitch: u8) -> f32 {
    let octave = (pitch / 12) as i32;
    BASE_FREQUENCY * 2f32.powi(octave) * INTERVALS[(pitch % 12) as usize]
}

/// Per-frame phase increment for a wave of `wave_len` samples holding one
/// cycle, played at `pitch` into a stream running at `sample_rate`.
pub fn pitch_to_increment(pitch: u8, wave_len: usize, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    rate_from_pitch(pitch) * wave_len as f32 / sample_rate as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_zero_is_a0() {
        assert_eq!(rate_from_pitch(0), 27.5);
    }

    #[test]
    fn octaves_double() {
        assert_eq!(rate_from_pitch(12), 55.0);
        assert_eq!(rate_from_pitch(48), 440.0);
    }

    #[test]
    fn semitones_step_up() {
        let c = rate_from_pitch(51);
        assert!((c - 523.25).abs() < 0.05);
        for p in 0..120u8 {
            assert!(rate_from_pitch(p + 1) > rate_from_pitch(p));
        }
    }

    #[test]
    fn increment_equals_hz_when_wave_spans_one_second() {
        assert_eq!(pitch_to_increment(48, 44100, 44100), 440.0);
        assert_eq!(pitch_to_increment(48, 22050, 44100), 220.0);
        assert_eq!(pitch_to_increment(48, 100, 0), 0.0);
    }
}
