//! Integration test: encode a song → load it through the controller → play
//! it and compare against the song it was encoded from.

use std::sync::Arc;

use ak_engine::{ChannelLayout, Intent, Mixer, MixerConfig};
use ak_formats::{encode_song, InstrumentSpec};
use ak_ir::{AdjustParam, Command, Pcm, PcmSource, ResourceStore, Song};
use ak_master::{Controller, ControllerConfig, Error, MemoryStore, ResourceKind};

const RATE: u32 = 8000;
const SNARE: u16 = 12;

fn mixer_config() -> MixerConfig {
    MixerConfig {
        sample_rate: RATE,
        layout: ChannelLayout::Stereo,
        print_songs: false,
        channel_capacity: 16,
    }
}

fn store() -> MemoryStore {
    let mut store = MemoryStore::new();
    let snare: Vec<i16> = (0..400).map(|i| if i % 7 < 3 { 6000 } else { -6000 }).collect();
    store.insert_pcm(SNARE, Pcm::new(snare).unwrap());
    store
}

fn bell() -> InstrumentSpec {
    InstrumentSpec {
        attack_ms: 5,
        drawback_ms: 50,
        decay_ms: 200,
        attack_trim: 0xff,
        drawback_trim: 0x90,
        coefficients: vec![0xffff, 0, 0x8000, 0x4000],
    }
}

/// A song with an inline instrument and a drum taken from `store`.
fn song(store: &MemoryStore) -> Song {
    let spec = bell();
    let mut song = Song::new();
    song.set_tempo(150).unwrap();
    song.add_instrument(spec.encode().unwrap(), Arc::new(spec.build(RATE).unwrap()))
        .unwrap();
    song.add_resolved_drum(SNARE, store.pcm(SNARE).unwrap())
        .unwrap();

    song.add_command(Command::Note {
        reference: 0,
        instrument: 0,
        trim: 0xc0,
        pan: -20,
        pitch: 60,
        duration: 2,
    })
    .unwrap();
    song.add_command(Command::Drum { reference: 1, drum: 0, trim: 0xff, pan: 64 })
        .unwrap();
    song.add_command(Command::Sync(0x0101)).unwrap();
    song.add_command(Command::Beat).unwrap();
    song.add_command(Command::Adjust {
        param: AdjustParam::Pitch,
        reference: 0,
        value: 67,
        duration: 1,
    })
    .unwrap();
    song.add_command(Command::Delay(1200)).unwrap();
    song.add_command(Command::Drum { reference: 1, drum: 0, trim: 0x80, pan: -64 })
        .unwrap();
    song.add_command(Command::Beat).unwrap();
    song
}

#[test]
fn decoded_song_plays_like_its_source() {
    let source = song(&store()).lock().unwrap();
    let bytes = encode_song(&source).unwrap();

    let mut ctrl = Controller::new(
        ControllerConfig {
            mixer: mixer_config(),
            sync_queue_capacity: 8,
        },
        store(),
    );
    let loaded = ctrl.load_song(1, &bytes).unwrap();
    assert_eq!(loaded.commands(), source.commands());
    assert_eq!(loaded.tempo(), 150);

    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = seen.clone();
    ctrl.watch_sync_tokens(move |t| sink.borrow_mut().push(t));

    ctrl.play_song(1).unwrap();
    let frames = source.duration_frames(RATE) as usize;
    let mut decoded = vec![0i16; frames * 2];
    ctrl.render(&mut decoded);
    ctrl.update().unwrap();

    let mut mixer = Mixer::new(mixer_config());
    mixer.play_song(&source, true, Intent::BGM).unwrap();
    let mut expected = vec![0i16; frames * 2];
    mixer.update(&mut expected).unwrap();

    assert_eq!(*seen.borrow(), vec![0x0101]);
    assert!(expected.iter().any(|&s| s != 0));
    assert_eq!(decoded, expected);
}

#[test]
fn reencoding_a_decoded_song_is_stable() {
    let bytes = encode_song(&song(&store())).unwrap();
    let decoded = ak_formats::decode_song(&bytes, RATE).unwrap();
    assert_eq!(encode_song(&decoded).unwrap(), bytes);
}

#[test]
fn loading_needs_every_drum_in_the_store() {
    let bytes = encode_song(&song(&store())).unwrap();
    let mut ctrl = Controller::new(
        ControllerConfig {
            mixer: mixer_config(),
            sync_queue_capacity: 8,
        },
        MemoryStore::new(),
    );
    let err = ctrl.load_song(1, &bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::Model(ak_ir::Error::MissingResource { kind: ResourceKind::Pcm, id: SNARE })
    ));
    assert!(matches!(
        ctrl.play_song(1),
        Err(Error::NotFound { kind: ResourceKind::Song, id: 1 })
    ));
}

#[test]
fn wav_resources_load_through_the_controller() {
    let wav = ak_formats::samples_to_wav(&[100, 200, 300], 1, RATE);
    let mut ctrl = Controller::new(ControllerConfig::default(), MemoryStore::new());
    ctrl.load_wav(4, &wav).unwrap();
    assert_eq!(ctrl.store().pcm(4).unwrap().samples(), &[100, 200, 300]);

    let envelope = bell().encode().unwrap();
    ctrl.load_instrument(9, &envelope).unwrap();
    let instrument = ctrl.store().instrument(9).unwrap();
    assert_eq!(instrument.wave().len(), 44100);
}
