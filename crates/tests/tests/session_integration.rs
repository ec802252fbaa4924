//! End-to-end tests: decode, live playback through an in-memory device, and
//! export read back through the real decoder.

use lofi_core::domain::audio::AudioDecoder;
use lofi_core::{
    encode, AudioError, EffectParameters, EngineConfig, LofiSession, ParamName, PlayStatus,
    Preset, WavHeader,
};
use lofi_infra::SymphoniaDecoder;
use lofi_tests::{test_wav, MemoryOutput};
use proptest::prelude::*;

fn session_with(output: &MemoryOutput, params: EffectParameters) -> LofiSession {
    LofiSession::new(
        Box::new(SymphoniaDecoder::with_extension("wav")),
        Box::new(output.clone()),
        EngineConfig {
            block_frames: 512,
            ..Default::default()
        },
        params,
    )
}

fn session(output: &MemoryOutput) -> LofiSession {
    session_with(output, EffectParameters::default())
}

// ============================================================================
// LOADING
// ============================================================================

#[test]
fn test_load_reports_source_shape() {
    let output = MemoryOutput::new(48000, 2);
    let mut session = session(&output);

    let source = session.load_file(&test_wav(22050, 1, 0.5)).unwrap();
    assert_eq!(source.sample_rate(), 22050);
    assert_eq!(source.channel_count(), 1);
    assert_eq!(source.frames(), 11025);
}

#[test]
fn test_failed_load_keeps_previous_source() {
    let output = MemoryOutput::new(48000, 2);
    let mut session = session(&output);
    session.load_file(&test_wav(44100, 2, 0.25)).unwrap();

    let err = session.load_file(b"RIFF but not really").unwrap_err();
    assert!(matches!(err, AudioError::Decode(_)));
    assert_eq!(session.source().unwrap().frames(), 11025);
}

// ============================================================================
// EXPORT
// ============================================================================

#[test]
fn test_export_decodes_back() {
    let output = MemoryOutput::new(48000, 2);
    let mut session = session_with(&output, Preset::Vintage.parameters());
    session.load_file(&test_wav(44100, 1, 0.5)).unwrap();

    let bytes = session.export().unwrap().unwrap();
    let header = WavHeader::parse(&bytes).unwrap();
    assert_eq!(header.format.channels, 2);
    assert_eq!(header.format.sample_rate, 44100);
    assert_eq!(header.frames(), 22050);
    assert_eq!(header.data_len, 22050 * 2 * 2);

    let decoded = SymphoniaDecoder::with_extension("wav").decode(&bytes).unwrap();
    assert_eq!(decoded.channel_count(), 2);
    assert_eq!(decoded.frames(), 22050);
    assert!(decoded.channel(0).iter().any(|&s| s != 0.0));
}

#[test]
fn test_exports_are_byte_identical() {
    let output = MemoryOutput::new(48000, 2);
    let params = EffectParameters {
        crackle_percent: 35.0,
        reverb_mix_percent: 60.0,
        ..Default::default()
    };
    let wav = test_wav(32000, 2, 0.4);

    let mut first = session_with(&output, params);
    first.load_file(&wav).unwrap();
    let a = first.export().unwrap().unwrap();
    let b = first.export().unwrap().unwrap();
    assert_eq!(a, b);

    let mut second = session_with(&output, params);
    second.load_file(&wav).unwrap();
    assert_eq!(a, second.export().unwrap().unwrap());
}

#[test]
fn test_export_without_source() {
    let output = MemoryOutput::new(48000, 2);
    let session = session(&output);
    assert!(session.export().unwrap().is_none());
}

#[test]
fn test_export_follows_parameter_changes() {
    let output = MemoryOutput::new(48000, 2);
    let mut session = session(&output);
    session.load_file(&test_wav(22050, 2, 0.3)).unwrap();

    let before = session.export().unwrap().unwrap();
    session.set_parameter(ParamName::Filter, 90.0);
    let after = session.export().unwrap().unwrap();

    assert_eq!(before.len(), after.len());
    assert_ne!(before, after);
}

#[test]
fn test_clipping_survives_round_trip() {
    let loud = lofi_core::AudioBuffer::from_channels(8000, vec![vec![1.5, -1.5, 0.0]]).unwrap();
    let bytes = encode(&loud);

    let samples: Vec<i16> = bytes[44..]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(samples, vec![32767, -32768, 0]);

    let decoded = SymphoniaDecoder::new().decode(&bytes).unwrap();
    assert!((decoded.channel(0)[0] - 1.0).abs() < 1e-3);
    assert_eq!(decoded.channel(0)[1], -1.0);
}

// ============================================================================
// LIVE PLAYBACK
// ============================================================================

#[test]
fn test_reversed_trim_builds_nothing() {
    let output = MemoryOutput::new(48000, 2);
    let mut session = session(&output);
    session.load_file(&test_wav(44100, 2, 8.0)).unwrap();

    let result = session.play(5.0, 2.0);
    assert!(matches!(result, Err(AudioError::InvalidTrimRange { .. })));
    assert_eq!(output.started(), 0);
    assert!(!session.is_playing());
}

#[test]
fn test_play_without_source() {
    let output = MemoryOutput::new(48000, 2);
    let mut session = session(&output);
    assert_eq!(session.play_all().unwrap(), PlayStatus::NoSource);
    assert_eq!(output.started(), 0);
}

#[test]
fn test_live_chain_resamples_to_device_rate() {
    let output = MemoryOutput::new(48000, 2);
    let mut session = session(&output);
    session.load_file(&test_wav(44100, 1, 0.5)).unwrap();
    assert_eq!(session.play_all().unwrap(), PlayStatus::Started);

    // 22050 source frames last 24000 device frames
    let head = output.pull(23000);
    assert!(session.is_playing());
    assert!(head.iter().any(|&s| s != 0.0));

    // The delay and reverb keep ringing past the selection
    let ringing = output.pull(2000);
    assert!(session.is_playing());
    assert!(ringing.iter().any(|&s| s != 0.0));

    // 0.3 s delay plus the 2 s impulse at 48 kHz
    let tail = output.pull(110400 + 1024);
    assert!(!session.is_playing());
    assert!(tail[tail.len() - 200..].iter().all(|&s| s == 0.0));
}

#[test]
fn test_short_selection_is_audible() {
    let output = MemoryOutput::new(44100, 2);
    let params = EffectParameters {
        reverb_mix_percent: 0.0,
        ..Default::default()
    };
    let mut session = session_with(&output, params);
    session.load_file(&test_wav(44100, 1, 2.0)).unwrap();

    // Shorter than the 0.3 s delay
    assert_eq!(session.play(0.5, 0.7).unwrap(), PlayStatus::Started);
    let out = output.pull(44100);
    let audible = out.iter().filter(|&&s| s != 0.0).count() / 2;
    assert!(audible >= 8000, "only {} frames audible", audible);
}

#[test]
fn test_selection_plays_to_its_end() {
    let output = MemoryOutput::new(44100, 2);
    let params = EffectParameters {
        reverb_mix_percent: 0.0,
        ..Default::default()
    };
    let mut session = session_with(&output, params);
    session.load_file(&test_wav(44100, 1, 3.0)).unwrap();

    assert_eq!(session.play(1.0, 2.0).unwrap(), PlayStatus::Started);
    let out = output.pull(2 * 44100);
    let last_audible = out
        .chunks(2)
        .rposition(|frame| frame.iter().any(|&s| s != 0.0))
        .unwrap();
    // The delayed selection ends 1.3 s in
    assert!(last_audible >= 57000, "audible until frame {}", last_audible);
}

#[test]
fn test_single_crackle_source_across_updates() {
    let output = MemoryOutput::new(48000, 2);
    let mut session = session(&output);
    session.load_file(&test_wav(48000, 2, 1.0)).unwrap();
    session.play_all().unwrap();

    session.set_parameter(ParamName::Crackle, 0.0);
    session.set_parameter(ParamName::Crackle, 40.0);
    output.pull(1024);
    assert_eq!(output.with_renderer(|r| r.chain().crackle_source_count()), Some(1));

    session.set_parameter(ParamName::Crackle, 0.0);
    session.set_parameter(ParamName::Crackle, 80.0);
    output.pull(1024);
    assert_eq!(output.with_renderer(|r| r.chain().crackle_source_count()), Some(1));

    // A rebuilt chain starts with the current crackle already on
    session.stop();
    session.play_all().unwrap();
    assert_eq!(output.started(), 2);
    assert_eq!(output.with_renderer(|r| r.chain().crackle_source_count()), Some(1));
}

#[test]
fn test_mute_silences_live_output() {
    let output = MemoryOutput::new(44100, 2);
    let mut session = session(&output);
    session.load_file(&test_wav(44100, 2, 1.0)).unwrap();
    session.play_all().unwrap();

    assert!(output.pull(2048).iter().any(|&s| s != 0.0));
    session.toggle_mute();
    assert!(output.pull(2048).iter().all(|&s| s == 0.0));
}

#[test]
fn test_stop_releases_stream() {
    let output = MemoryOutput::new(44100, 2);
    let mut session = session(&output);
    session.load_file(&test_wav(44100, 2, 1.0)).unwrap();
    session.play_all().unwrap();
    assert_eq!(session.play_all().unwrap(), PlayStatus::AlreadyPlaying);

    session.stop();
    assert_eq!(output.stopped(), 1);
    assert!(!session.is_playing());
    assert!(session.spectrum().is_none());
}

#[test]
fn test_spectrum_reacts_to_signal() {
    let output = MemoryOutput::new(44100, 2);
    let mut session = session_with(
        &output,
        EffectParameters {
            reverb_mix_percent: 0.0,
            ..Default::default()
        },
    );
    session.load_file(&test_wav(44100, 2, 1.0)).unwrap();
    session.play_all().unwrap();

    output.pull(4096);
    let spectrum = session.spectrum().unwrap();
    assert_eq!(spectrum.len(), 1024);
    assert!(spectrum.iter().any(|&b| b > 0));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_export_length_matches_source(
        speed in 50.0f32..150.0,
        rate in prop_oneof![Just(8000u32), Just(22050), Just(44100)],
        channels in 1usize..3,
    ) {
        let output = MemoryOutput::new(48000, 2);
        let mut session = session_with(&output, EffectParameters {
            speed_percent: speed,
            ..Default::default()
        });
        session.load_file(&test_wav(rate, channels, 0.2)).unwrap();
        let frames = session.source().unwrap().frames() as u32;

        let header = session.export().unwrap().unwrap().header().unwrap();
        prop_assert_eq!(header.frames(), frames);
        prop_assert_eq!(header.format.sample_rate, rate);
        prop_assert_eq!(header.format.channels, 2);
    }
}
