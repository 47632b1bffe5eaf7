// Integration tests for pushed speech playback
//
// These tests verify how incoming PCM frames are gated, decoded and scheduled
// on the shared audio context, and that cleanup releases everything.

mod common;

use anyhow::Result;
use common::{MockHardware, SilentInput};
use interview_media::audio::{
    AudioFrame, AudioHardware, ContextState, PcmEncoding, SchedulerConfig, SoftwareAudioHardware,
    SoftwareConfig,
};
use interview_media::recording::{AudioRecordingService, RecorderConfig};
use interview_media::MediaError;
use std::sync::Arc;
use std::time::Duration;

fn service(hardware: &MockHardware) -> AudioRecordingService {
    AudioRecordingService::new(
        Arc::new(hardware.clone()),
        SchedulerConfig::default(),
        RecorderConfig::default(),
    )
}

fn speech_frame(samples: usize) -> AudioFrame {
    AudioFrame::from_i16(&vec![8192i16; samples])
}

#[tokio::test]
async fn test_frames_ignored_while_not_recording() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    // Not even initialized
    assert!(audio.process_incoming_audio(&speech_frame(160)).is_none());

    // Initialized but not recording
    audio.initialize().await?;
    assert!(audio.process_incoming_audio(&speech_frame(160)).is_none());

    assert!(hardware.graph().voices.is_empty());
    assert_eq!(audio.frames_played(), 0);
    assert_eq!(audio.frames_dropped(), 0);

    Ok(())
}

#[tokio::test]
async fn test_frame_scheduled_with_fades() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    audio.initialize().await?;
    audio.start_recording().await?;
    hardware.set_time(2.5);

    // 100ms at 16kHz
    let id = audio.process_incoming_audio(&speech_frame(1600));
    assert!(id.is_some());

    let graph = hardware.graph();
    assert_eq!(graph.voices.len(), 1);

    let voice = &graph.voices[0];
    assert_eq!(voice.start_at, 2.5);
    assert_eq!(voice.sample_rate, 16000);
    assert_eq!(voice.samples.len(), 1600);
    assert_eq!(voice.samples[0], 0.25);
    assert!((voice.duration() - 0.1).abs() < 1e-9);

    // 1ms ramps at either end, unity in between
    assert_eq!(voice.envelope.gain_at(0.0), 0.0);
    assert_eq!(voice.envelope.gain_at(0.001), 1.0);
    assert_eq!(voice.envelope.gain_at(0.05), 1.0);
    assert_eq!(voice.envelope.gain_at(voice.duration()), 0.0);

    Ok(())
}

#[tokio::test]
async fn test_f32le_frame_scheduled_unchanged() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    audio.initialize().await?;
    audio.start_recording().await?;

    let input = [0.25f32, -1.5, 3e-7];
    audio
        .process_incoming_audio(&AudioFrame::from_f32(&input, 24000))
        .expect("scheduled");

    let graph = hardware.graph();
    let voice = &graph.voices[0];
    assert_eq!(voice.samples, input.to_vec());
    assert_eq!(voice.sample_rate, 24000);

    Ok(())
}

#[tokio::test]
async fn test_frames_scheduled_in_call_order() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    audio.initialize().await?;
    audio.start_recording().await?;

    let mut ids = Vec::new();
    for i in 0..5 {
        hardware.set_time(i as f64 * 0.02);
        ids.push(audio.process_incoming_audio(&speech_frame(320)).expect("scheduled"));
    }

    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);

    let starts: Vec<f64> = hardware.graph().voices.iter().map(|v| v.start_at).collect();
    let expected: Vec<f64> = (0..5).map(|i| i as f64 * 0.02).collect();
    assert_eq!(starts, expected);
    assert_eq!(audio.frames_played(), 5);

    Ok(())
}

#[tokio::test]
async fn test_malformed_frames_dropped() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    audio.initialize().await?;
    audio.start_recording().await?;

    // Odd byte count for 16-bit PCM
    let misaligned = AudioFrame::new(vec![1, 2, 3], 16000, PcmEncoding::PcmS16le);
    assert!(audio.process_incoming_audio(&misaligned).is_none());

    let empty = AudioFrame::new(Vec::new(), 16000, PcmEncoding::PcmS16le);
    assert!(audio.process_incoming_audio(&empty).is_none());

    let no_rate = AudioFrame::new(vec![0, 0], 0, PcmEncoding::PcmS16le);
    assert!(audio.process_incoming_audio(&no_rate).is_none());

    assert_eq!(audio.frames_dropped(), 3);
    assert!(hardware.graph().voices.is_empty());

    // The pipeline keeps working afterwards
    assert!(audio.process_incoming_audio(&speech_frame(160)).is_some());

    Ok(())
}

#[tokio::test]
async fn test_finished_voices_leave_registry() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    audio.initialize().await?;
    audio.start_recording().await?;

    let first = audio.process_incoming_audio(&speech_frame(160)).expect("scheduled");
    let _second = audio.process_incoming_audio(&speech_frame(160)).expect("scheduled");
    assert_eq!(audio.in_flight_voices(), 2);

    hardware.finish_voice(first);
    assert_eq!(audio.in_flight_voices(), 1);

    Ok(())
}

#[tokio::test]
async fn test_cleanup_never_initialized() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    audio.cleanup().await;

    assert!(!audio.is_initialized());
    assert!(!audio.is_recording());
    assert_eq!(audio.in_flight_voices(), 0);
    assert_eq!(hardware.graph().contexts_closed, 0);

    Ok(())
}

#[tokio::test]
async fn test_cleanup_halts_voices_and_releases_context() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    audio.initialize().await?;
    audio.start_recording().await?;
    let a = audio.process_incoming_audio(&speech_frame(160)).expect("scheduled");
    let b = audio.process_incoming_audio(&speech_frame(160)).expect("scheduled");

    audio.cleanup().await;

    {
        let graph = hardware.graph();
        let mut stopped = graph.stopped.clone();
        stopped.sort_unstable();
        assert_eq!(stopped, vec![a, b]);
        assert_eq!(graph.contexts_closed, 1);
        assert_eq!(graph.state, Some(ContextState::Closed));
    }
    assert_eq!(hardware.encoder().stop_calls(), 1);
    assert!(!audio.is_initialized());
    assert!(!audio.is_recording());

    // Safe to repeat
    audio.cleanup().await;
    assert_eq!(hardware.graph().contexts_closed, 1);

    Ok(())
}

#[tokio::test]
async fn test_suspended_context_resumed() -> Result<()> {
    let hardware = MockHardware::new().suspended();
    let mut audio = service(&hardware);

    audio.initialize().await?;

    assert_eq!(hardware.graph().resumed, 1);
    assert_eq!(hardware.graph().state, Some(ContextState::Running));

    Ok(())
}

#[tokio::test]
async fn test_initialize_twice_reuses_context() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    audio.initialize().await?;
    audio.initialize().await?;

    assert_eq!(hardware.graph().contexts_created, 1);

    Ok(())
}

#[tokio::test]
async fn test_hardware_unavailable() -> Result<()> {
    let hardware = MockHardware::new().failing();
    let mut audio = service(&hardware);

    let err = audio.initialize().await.unwrap_err();
    assert!(matches!(
        MediaError::find(&err),
        Some(MediaError::AudioUnavailable(_))
    ));
    assert!(!audio.is_initialized());

    // Cleanup after a failed initialize is still safe
    audio.cleanup().await;

    Ok(())
}

#[tokio::test]
async fn test_microphone_requires_initialize() -> Result<()> {
    let hardware = MockHardware::new();
    let mut audio = service(&hardware);

    let err = audio
        .connect_microphone(Box::new(SilentInput("desk-mic")))
        .unwrap_err();
    assert_eq!(MediaError::find(&err), Some(&MediaError::NotInitialized));

    audio.initialize().await?;
    audio.connect_microphone(Box::new(SilentInput("desk-mic")))?;
    assert_eq!(hardware.graph().inputs, vec!["desk-mic".to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_software_graph_records_played_speech() -> Result<()> {
    let hardware = Arc::new(SoftwareAudioHardware::new(SoftwareConfig {
        sample_rate: 16000,
        ..SoftwareConfig::default()
    }));
    let mut audio = AudioRecordingService::new(
        Arc::clone(&hardware) as Arc<dyn AudioHardware>,
        SchedulerConfig::default(),
        RecorderConfig::default(),
    );

    audio.initialize().await?;
    assert_eq!(audio.mime_type(), Some("audio/wav"));
    audio.start_recording().await?;

    // 100ms of speech at half scale, then 100ms of silence
    audio
        .process_incoming_audio(&AudioFrame::from_i16(&vec![16384i16; 1600]))
        .expect("scheduled");
    hardware.render(Duration::from_millis(200));
    assert_eq!(audio.in_flight_voices(), 0);

    let artifact = audio.stop_recording().await?;
    assert_eq!(&artifact.data[0..4], b"RIFF");
    assert_eq!(&artifact.data[8..12], b"WAVE");
    assert_eq!(artifact.data.len(), 44 + 3200 * 2);

    let pcm: Vec<i16> = artifact.data[44..]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    // Fade-in starts from silence, the middle plays at half scale
    assert_eq!(pcm[0], 0);
    assert!((pcm[800] as i32 - 16383).abs() <= 1);
    assert_eq!(pcm[2400], 0);

    audio.cleanup().await;
    Ok(())
}
