// Playback scheduler for pushed speech frames
//
// Each decoded frame becomes one voice on the mix destination, started at
// the current context time with a short fade-in/fade-out gain envelope so
// frame boundaries do not click. Voices are not time-stamped against a
// running clock: ordering comes from the order frames are handed in.
//
// Every in-flight voice is tracked by sequence id so that cleanup can halt
// playback deterministically.

use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::backend::{AudioContext, DestinationId, GainEnvelope, ScheduledVoice, VoiceId};

/// Configuration for the playback scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fade-in / fade-out length in seconds (default: 1ms)
    pub fade_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { fade_secs: 0.001 }
    }
}

/// Bookkeeping for one in-flight voice
#[derive(Debug, Clone, Copy)]
pub struct VoiceRecord {
    pub started_at: f64,
    pub duration: f64,
}

/// Schedules decoded frames as voices and keeps the in-flight registry
#[derive(Debug)]
pub struct PlaybackScheduler {
    config: SchedulerConfig,
    next_id: VoiceId,
    in_flight: BTreeMap<VoiceId, VoiceRecord>,
}

impl PlaybackScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            next_id: 0,
            in_flight: BTreeMap::new(),
        }
    }

    /// Schedule `samples` to start now on `destination`
    pub fn schedule(
        &mut self,
        context: &mut dyn AudioContext,
        destination: DestinationId,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Result<VoiceId> {
        self.prune(context);

        let id = self.next_id;
        self.next_id += 1;

        let start_at = context.current_time();
        let duration = samples.len() as f64 / sample_rate as f64;
        let voice = ScheduledVoice {
            id,
            samples,
            sample_rate,
            start_at,
            envelope: GainEnvelope::fade(duration, self.config.fade_secs),
        };

        context.start_voice(destination, voice)?;

        debug!(
            "Scheduled voice {} at {:.3}s ({:.1}ms @ {}Hz, {} in flight)",
            id,
            start_at,
            duration * 1000.0,
            sample_rate,
            self.in_flight.len() + 1
        );

        self.in_flight.insert(
            id,
            VoiceRecord {
                started_at: start_at,
                duration,
            },
        );

        Ok(id)
    }

    /// Forget voices the context reports as finished
    pub fn prune(&mut self, context: &dyn AudioContext) {
        self.in_flight.retain(|id, _| !context.voice_finished(*id));
    }

    /// Stop every in-flight voice
    pub fn halt_all(&mut self, context: &mut dyn AudioContext) -> usize {
        let halted = self.in_flight.len();
        for id in self.in_flight.keys() {
            context.stop_voice(*id);
        }
        self.in_flight.clear();

        if halted > 0 {
            info!("Halted {} in-flight voices", halted);
        }
        halted
    }

    /// Drop the registry without touching a context (context already gone)
    pub fn reset(&mut self) {
        self.in_flight.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn voice(&self, id: VoiceId) -> Option<&VoiceRecord> {
        self.in_flight.get(&id)
    }

    /// Ids of in-flight voices in scheduling order
    pub fn voice_ids(&self) -> Vec<VoiceId> {
        self.in_flight.keys().copied().collect()
    }
}
