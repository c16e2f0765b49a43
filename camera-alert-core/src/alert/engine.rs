use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::fade::{Fade, FadeKind};
use crate::models::analysis::{AnalysisResult, SleepState};
use crate::models::config::AlertConfig;
use crate::models::error::AudioError;
use crate::models::state::AlertPhase;
use crate::traits::audio_output::AudioOutput;

/// Receives a snapshot whenever the phase, track or error changes.
pub type AlertListener = Arc<dyn Fn(&AlertSnapshot) + Send + Sync + 'static>;

const VOLUME_EPSILON: f32 = 1e-4;

/// Observable alert state.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSnapshot {
    pub phase: AlertPhase,
    pub active_state: Option<SleepState>,
    pub track_uri: Option<String>,
    pub current_volume: f32,
    pub target_volume: f32,
    /// Manual override, if one is set.
    pub forced: Option<SleepState>,
    /// State queued behind the current fade-out.
    pub next_state: Option<SleepState>,
    pub last_error: Option<AudioError>,
}

impl AlertSnapshot {
    fn same_transition(&self, other: &AlertSnapshot) -> bool {
        self.phase == other.phase
            && self.active_state == other.active_state
            && self.track_uri == other.track_uri
            && self.forced == other.forced
            && self.last_error == other.last_error
    }
}

struct EngineState {
    config: AlertConfig,
    output: Box<dyn AudioOutput>,
    phase: AlertPhase,
    active_state: Option<SleepState>,
    track_uri: Option<String>,
    current_volume: f32,
    target_volume: f32,
    fade: Option<Fade>,
    next_fade_id: u64,
    cancelled_fades: u64,
    forced: Option<SleepState>,
    /// Latest accepted classification and the volume it asks for.
    classified: Option<(SleepState, f32)>,
    last_error: Option<AudioError>,
    shutdown: bool,
}

impl EngineState {
    fn new(config: AlertConfig, output: Box<dyn AudioOutput>) -> Self {
        Self {
            config,
            output,
            phase: AlertPhase::Idle,
            active_state: None,
            track_uri: None,
            current_volume: 0.0,
            target_volume: 0.0,
            fade: None,
            next_fade_id: 0,
            cancelled_fades: 0,
            forced: None,
            classified: None,
            last_error: None,
            shutdown: false,
        }
    }

    /// The state that should be sounding and its volume. A manual override
    /// wins over the classification.
    fn desired(&self) -> Option<(SleepState, f32)> {
        let candidate = match self.forced {
            Some(state) => Some((state, self.config.target_volume.clamp(0.0, 1.0))),
            None => self.classified,
        };
        candidate.filter(|(state, _)| self.config.track_for(*state).is_some())
    }

    fn snapshot(&self) -> AlertSnapshot {
        let next_state = match self.phase {
            AlertPhase::FadingOut => self
                .desired()
                .map(|(state, _)| state)
                .filter(|state| Some(*state) != self.active_state),
            _ => None,
        };
        AlertSnapshot {
            phase: self.phase,
            active_state: self.active_state,
            track_uri: self.track_uri.clone(),
            current_volume: self.current_volume,
            target_volume: self.target_volume,
            forced: self.forced,
            next_state,
            last_error: self.last_error.clone(),
        }
    }

    /// Reconcile the phase machine with the desired state.
    fn drive(&mut self) {
        if self.shutdown {
            return;
        }
        let desired = self.desired();
        match (self.phase, desired) {
            (AlertPhase::Idle, None) => {}
            (AlertPhase::Idle, Some((state, volume))) => self.begin_track(state, volume),
            (AlertPhase::FadingIn | AlertPhase::Holding, None) => self.fade_out(),
            (AlertPhase::FadingIn | AlertPhase::Holding, Some((state, volume)))
                if Some(state) == self.active_state =>
            {
                if (volume - self.target_volume).abs() > VOLUME_EPSILON {
                    if volume >= self.current_volume {
                        self.fade_in_to(volume);
                    } else {
                        self.settle_at(volume);
                    }
                }
            }
            (AlertPhase::FadingIn | AlertPhase::Holding, Some(_)) => self.fade_out(),
            (AlertPhase::FadingOut, Some((state, volume))) if Some(state) == self.active_state => {
                log::debug!("{state} requested again while fading out, fading back in");
                self.fade_in_to(volume);
            }
            // a different state starts once the fade-out completes
            (AlertPhase::FadingOut, _) => {}
        }
    }

    fn begin_track(&mut self, state: SleepState, volume: f32) {
        let Some(uri) = self.config.track_for(state).map(str::to_string) else {
            return;
        };

        if let Err(err) = self.output.load(&uri) {
            return self.audio_failed(err);
        }
        self.output.set_volume(0.0);
        if let Err(err) = self.output.play() {
            self.output.stop();
            return self.audio_failed(err);
        }

        log::info!("Alert {state}: playing {uri}");
        self.active_state = Some(state);
        self.track_uri = Some(uri);
        self.current_volume = 0.0;
        self.last_error = None;
        self.fade_in_to(volume);
    }

    fn fade_in_to(&mut self, volume: f32) {
        self.target_volume = volume.clamp(0.0, 1.0);
        self.phase = AlertPhase::FadingIn;
        let duration = self.config.fade_in;
        self.start_fade(FadeKind::In, self.target_volume, duration);
    }

    /// Lower the sounding track to `volume` in one step and hold there. A
    /// fade-in never moves downward.
    fn settle_at(&mut self, volume: f32) {
        if let Some(cancelled) = self.fade.take() {
            self.cancelled_fades += 1;
            log::debug!("Fade {} cancelled", cancelled.id);
        }
        self.target_volume = volume.clamp(0.0, 1.0);
        self.current_volume = self.target_volume;
        self.output.set_volume(self.current_volume);
        self.phase = AlertPhase::Holding;
        log::debug!("Alert lowered to {:.2}", self.current_volume);
    }

    fn fade_out(&mut self) {
        if self.current_volume <= 0.0 {
            return self.finish_fade_out();
        }
        self.phase = AlertPhase::FadingOut;
        let duration = self.config.fade_out;
        self.start_fade(FadeKind::Out, 0.0, duration);
    }

    fn start_fade(&mut self, kind: FadeKind, to: f32, duration: Duration) {
        if let Some(cancelled) = self.fade.take() {
            self.cancelled_fades += 1;
            log::debug!("Fade {} cancelled", cancelled.id);
        }
        self.next_fade_id += 1;
        self.fade = Some(Fade::new(
            self.next_fade_id,
            kind,
            self.current_volume,
            to,
            duration,
            self.config.tick,
        ));
    }

    /// Silence reached: pause, rewind, then start whatever is desired next.
    fn finish_fade_out(&mut self) {
        self.output.set_volume(0.0);
        self.output.stop();
        if let Some(state) = self.active_state.take() {
            log::info!("Alert {state} stopped");
        }
        self.fade = None;
        self.phase = AlertPhase::Idle;
        self.track_uri = None;
        self.current_volume = 0.0;
        self.target_volume = 0.0;
        self.drive();
    }

    fn audio_failed(&mut self, err: AudioError) {
        log::error!("Alert audio failed: {err}");
        self.output.stop();
        self.last_error = Some(err);
        self.fade = None;
        self.phase = AlertPhase::Idle;
        self.active_state = None;
        self.track_uri = None;
        self.current_volume = 0.0;
        self.target_volume = 0.0;
    }

    /// One fade tick.
    fn step(&mut self) {
        if let Some(err) = self.output.poll_error() {
            if self.phase.is_sounding() {
                self.audio_failed(err);
            } else {
                self.last_error = Some(err);
            }
            return;
        }

        let Some(fade) = self.fade.as_mut() else {
            return;
        };
        let volume = fade.advance();
        let done = fade.is_done();
        let kind = fade.kind;

        self.current_volume = volume;
        self.output.set_volume(volume);

        if done {
            self.fade = None;
            match kind {
                FadeKind::In => {
                    self.phase = AlertPhase::Holding;
                    log::debug!("Alert holding at {volume:.2}");
                }
                FadeKind::Out => self.finish_fade_out(),
            }
        }
    }
}

struct EngineShared {
    state: Mutex<EngineState>,
    wake: Condvar,
    listener: Mutex<Option<AlertListener>>,
}

impl EngineShared {
    /// Apply `change` under the lock, then notify the listener outside it if
    /// the change was observable.
    fn update<R>(&self, change: impl FnOnce(&mut EngineState) -> R) -> R {
        let (result, changed) = {
            let mut state = self.state.lock();
            let before = state.snapshot();
            let result = change(&mut state);
            let after = state.snapshot();
            if state.fade.is_some() {
                self.wake.notify_all();
            }
            let changed = (!after.same_transition(&before)).then_some(after);
            (result, changed)
        };
        if let Some(snapshot) = changed {
            let listener = self.listener.lock().clone();
            if let Some(listener) = listener {
                listener(&snapshot);
            }
        }
        result
    }
}

/// Drives looped alert audio from classifications and manual overrides.
///
/// ```text
/// idle → fading_in → holding → fading_out → idle
/// ```
/// At most one fade runs at a time; any trigger cancels the running fade.
/// Switching states always fades the old track out to silence before the
/// new one starts.
pub struct AlertEngine {
    shared: Arc<EngineShared>,
    ticker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl AlertEngine {
    /// Engine with a background fade ticker.
    pub fn new(config: AlertConfig, output: Box<dyn AudioOutput>) -> Result<Self, AudioError> {
        let engine = Self::manual(config, output)?;
        let shared = Arc::clone(&engine.shared);
        let handle = thread::Builder::new()
            .name("alert-fade".into())
            .spawn(move || run_ticker(shared))
            .map_err(|e| AudioError::Unavailable(format!("failed to spawn fade ticker: {e}")))?;
        *engine.ticker.lock() = Some(handle);
        Ok(engine)
    }

    /// Engine without a ticker; fades move only through [`AlertEngine::advance`].
    pub fn manual(config: AlertConfig, output: Box<dyn AudioOutput>) -> Result<Self, AudioError> {
        config.validate().map_err(AudioError::Unavailable)?;
        Ok(Self {
            shared: Arc::new(EngineShared {
                state: Mutex::new(EngineState::new(config, output)),
                wake: Condvar::new(),
                listener: Mutex::new(None),
            }),
            ticker: Mutex::new(None),
        })
    }

    pub fn set_listener(&self, listener: AlertListener) {
        *self.shared.listener.lock() = Some(listener);
    }

    /// Replace the track table and fade settings. A sounding state whose
    /// track was removed fades out.
    pub fn reconfigure(&self, config: AlertConfig) -> Result<(), AudioError> {
        config.validate().map_err(AudioError::Unavailable)?;
        self.shared.update(|state| {
            state.config = config;
            state.drive();
        });
        Ok(())
    }

    /// Feed a classification. Results below the confidence floor are ignored.
    pub fn apply_result(&self, result: &AnalysisResult) {
        self.shared.update(|state| {
            if result.confidence < state.config.min_confidence {
                log::debug!(
                    "Ignoring {} at {:.2} confidence (below {:.2})",
                    result.state,
                    result.confidence,
                    state.config.min_confidence
                );
                return;
            }
            let volume = state.config.volume_for(result.confidence);
            state.classified = Some((result.state, volume));
            state.drive();
        });
    }

    /// Manually force `state`. Forcing the state already forced clears the
    /// override and the classification, fading the alert out.
    pub fn force(&self, state: SleepState) {
        self.shared.update(|engine| {
            if engine.forced == Some(state) || !state.is_known() {
                log::info!("Alert override {state} toggled off");
                engine.forced = None;
                engine.classified = None;
            } else {
                log::info!("Alert override set to {state}");
                engine.forced = Some(state);
            }
            engine.drive();
        });
    }

    /// Drop the manual override; the latest classification takes over again.
    pub fn clear_force(&self) {
        self.shared.update(|engine| {
            engine.forced = None;
            engine.drive();
        });
    }

    /// Fade out and forget both the override and the classification.
    pub fn stop(&self) {
        self.shared.update(|engine| {
            engine.forced = None;
            engine.classified = None;
            engine.drive();
        });
    }

    /// Run one fade tick. Used by the ticker and by tests driving the engine
    /// by hand.
    pub fn advance(&self) -> AlertPhase {
        self.shared.update(|state| {
            state.step();
            state.phase
        })
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        self.shared.state.lock().snapshot()
    }

    pub fn phase(&self) -> AlertPhase {
        self.shared.state.lock().phase
    }

    /// Number of running fades: 0 or 1.
    pub fn active_fades(&self) -> usize {
        usize::from(self.shared.state.lock().fade.is_some())
    }

    /// Fades replaced before they completed.
    pub fn cancelled_fades(&self) -> u64 {
        self.shared.state.lock().cancelled_fades
    }

    /// Silence the output and stop the ticker. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.shutdown {
                state.shutdown = true;
                state.fade = None;
                state.output.set_volume(0.0);
                state.output.stop();
                state.phase = AlertPhase::Idle;
                state.active_state = None;
                state.track_uri = None;
                state.current_volume = 0.0;
            }
            self.shared.wake.notify_all();
        }
        if let Some(handle) = self.ticker.lock().take() {
            if handle.join().is_err() {
                log::error!("Fade ticker panicked");
            }
        }
    }
}

impl Drop for AlertEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_ticker(shared: Arc<EngineShared>) {
    let mut next_tick = Instant::now();
    loop {
        let tick = {
            let mut state = shared.state.lock();
            if state.shutdown {
                break;
            }
            if state.fade.is_none() {
                shared.wake.wait(&mut state);
                next_tick = Instant::now() + state.config.tick;
                continue;
            }
            let now = Instant::now();
            if now < next_tick {
                shared.wake.wait_until(&mut state, next_tick);
                continue;
            }
            state.config.tick
        };

        shared.update(EngineState::step);
        next_tick += tick;
        let now = Instant::now();
        if next_tick < now {
            next_tick = now + tick;
        }
    }
    log::debug!("Fade ticker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use approx::assert_relative_eq;
    use chrono::Utc;

    use crate::testing::{AudioEvent, MockAudio};

    const SLEEPING_URI: &str = "sounds/sleeping/Moonlight-Bamboo-Forest.mp3";
    const STRUGGLING_URI: &str = "sounds/struggling/Feline Symphony.mp3";
    const AWAKE_URI: &str = "sounds/awake/Silent Whisper of the Sakura.mp3";

    fn engine() -> (AlertEngine, MockAudio) {
        engine_with(AlertConfig::default())
    }

    fn engine_with(config: AlertConfig) -> (AlertEngine, MockAudio) {
        let audio = MockAudio::default();
        let engine = AlertEngine::manual(config, Box::new(audio.clone())).unwrap();
        (engine, audio)
    }

    fn result(state: SleepState, confidence: f32) -> AnalysisResult {
        AnalysisResult {
            state,
            confidence,
            objects: BTreeMap::new(),
            timestamp: Utc::now(),
            sequence: 1,
        }
    }

    /// Advance until the phase settles or `limit` ticks pass.
    fn run_until(engine: &AlertEngine, phase: AlertPhase, limit: usize) {
        for _ in 0..limit {
            if engine.phase() == phase && engine.active_fades() == 0 {
                return;
            }
            engine.advance();
        }
    }

    #[test]
    fn sleeping_result_fades_in_and_holds() {
        let (engine, audio) = engine();
        engine.apply_result(&result(SleepState::Sleeping, 0.92));

        let snap = engine.snapshot();
        assert_eq!(snap.phase, AlertPhase::FadingIn);
        assert_eq!(snap.active_state, Some(SleepState::Sleeping));
        assert_eq!(snap.track_uri.as_deref(), Some(SLEEPING_URI));

        for _ in 0..40 {
            engine.advance();
        }
        let snap = engine.snapshot();
        assert_eq!(snap.phase, AlertPhase::Holding);
        assert_relative_eq!(snap.current_volume, 0.8);
        assert_eq!(
            &audio.events()[..3],
            &[
                AudioEvent::Load(SLEEPING_URI.into()),
                AudioEvent::Volume(0.0),
                AudioEvent::Play
            ]
        );
    }

    #[test]
    fn fade_in_is_monotonic_and_bounded() {
        let (engine, audio) = engine();
        engine.apply_result(&result(SleepState::Awake, 0.9));
        run_until(&engine, AlertPhase::Holding, 100);

        let volumes = audio.volumes();
        assert!(volumes.windows(2).all(|w| w[1] >= w[0]));
        assert!(volumes.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn state_change_fades_out_before_next_track() {
        let (engine, audio) = engine();
        engine.apply_result(&result(SleepState::Struggling, 0.8));
        run_until(&engine, AlertPhase::Holding, 100);

        engine.apply_result(&result(SleepState::Awake, 0.8));
        assert_eq!(engine.phase(), AlertPhase::FadingOut);
        assert_eq!(engine.snapshot().next_state, Some(SleepState::Awake));

        run_until(&engine, AlertPhase::Holding, 200);
        let snap = engine.snapshot();
        assert_eq!(snap.active_state, Some(SleepState::Awake));
        assert_eq!(snap.track_uri.as_deref(), Some(AWAKE_URI));

        let events = audio.events();
        let awake_load = events
            .iter()
            .position(|e| *e == AudioEvent::Load(AWAKE_URI.into()))
            .unwrap();
        let stop = events[..awake_load]
            .iter()
            .rposition(|e| *e == AudioEvent::Stop)
            .unwrap();
        // the old track was silent before it stopped
        assert_eq!(events[stop - 1], AudioEvent::Volume(0.0));
        assert!(events[..stop]
            .iter()
            .any(|e| *e == AudioEvent::Load(STRUGGLING_URI.into())));
    }

    #[test]
    fn low_confidence_is_ignored() {
        let (engine, audio) = engine();
        engine.apply_result(&result(SleepState::Sleeping, 0.3));
        assert_eq!(engine.phase(), AlertPhase::Idle);
        assert!(audio.events().is_empty());
    }

    #[test]
    fn unknown_result_silences() {
        let (engine, _audio) = engine();
        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        run_until(&engine, AlertPhase::Holding, 100);

        engine.apply_result(&result(SleepState::Unknown, 0.9));
        assert_eq!(engine.phase(), AlertPhase::FadingOut);
        run_until(&engine, AlertPhase::Idle, 100);
        assert_eq!(engine.snapshot().active_state, None);
    }

    #[test]
    fn rapid_triggers_leave_one_fade() {
        let (engine, _audio) = engine();
        let states = [SleepState::Sleeping, SleepState::Awake];
        for i in 0..20 {
            engine.force(states[i % 2]);
            engine.advance();
            engine.apply_result(&result(states[(i + 1) % 2], 0.9));
            assert!(engine.active_fades() <= 1);
        }
        assert_eq!(engine.active_fades(), 1);
        assert!(engine.cancelled_fades() > 0);
    }

    #[test]
    fn forcing_same_state_toggles_off() {
        let (engine, audio) = engine();
        engine.force(SleepState::Struggling);
        run_until(&engine, AlertPhase::Holding, 100);
        assert_eq!(engine.snapshot().forced, Some(SleepState::Struggling));

        engine.force(SleepState::Struggling);
        assert_eq!(engine.phase(), AlertPhase::FadingOut);
        run_until(&engine, AlertPhase::Idle, 100);

        let snap = engine.snapshot();
        assert_eq!(snap.forced, None);
        assert_eq!(snap.active_state, None);
        assert_eq!(audio.events().last(), Some(&AudioEvent::Stop));
    }

    #[test]
    fn force_overrides_classification_until_cleared() {
        let (engine, _audio) = engine();
        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        run_until(&engine, AlertPhase::Holding, 100);

        engine.force(SleepState::Awake);
        run_until(&engine, AlertPhase::Holding, 200);
        assert_eq!(engine.snapshot().active_state, Some(SleepState::Awake));

        // classifications are recorded but do not win while forced
        engine.apply_result(&result(SleepState::Struggling, 0.9));
        assert_eq!(engine.phase(), AlertPhase::Holding);

        engine.clear_force();
        assert_eq!(engine.phase(), AlertPhase::FadingOut);
        run_until(&engine, AlertPhase::Holding, 200);
        assert_eq!(engine.snapshot().active_state, Some(SleepState::Struggling));
    }

    #[test]
    fn same_state_while_fading_out_fades_back_in() {
        let (engine, audio) = engine();
        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        run_until(&engine, AlertPhase::Holding, 100);
        engine.stop();
        engine.advance();
        engine.advance();
        assert_eq!(engine.phase(), AlertPhase::FadingOut);

        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        assert_eq!(engine.phase(), AlertPhase::FadingIn);
        run_until(&engine, AlertPhase::Holding, 100);

        let loads = audio
            .events()
            .iter()
            .filter(|e| matches!(e, AudioEvent::Load(_)))
            .count();
        assert_eq!(loads, 1);
    }

    #[test]
    fn stop_during_silent_fade_in_goes_idle_at_once() {
        let (engine, audio) = engine();
        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        engine.stop();
        assert_eq!(engine.phase(), AlertPhase::Idle);
        assert_eq!(engine.active_fades(), 0);
        assert_eq!(audio.events().last(), Some(&AudioEvent::Stop));
    }

    #[test]
    fn load_failure_is_surfaced_and_idle() {
        let (engine, audio) = engine();
        *audio.fail_load.lock() = true;
        engine.apply_result(&result(SleepState::Sleeping, 0.9));

        let snap = engine.snapshot();
        assert_eq!(snap.phase, AlertPhase::Idle);
        assert!(matches!(snap.last_error, Some(AudioError::LoadFailed { .. })));
        assert_eq!(engine.active_fades(), 0);
    }

    #[test]
    fn playback_error_falls_back_to_idle() {
        let (engine, audio) = engine();
        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        run_until(&engine, AlertPhase::Holding, 100);

        *audio.pending_error.lock() = Some(AudioError::PlaybackFailed("device lost".into()));
        engine.advance();
        let snap = engine.snapshot();
        assert_eq!(snap.phase, AlertPhase::Idle);
        assert_eq!(
            snap.last_error,
            Some(AudioError::PlaybackFailed("device lost".into()))
        );
    }

    #[test]
    fn confidence_scaled_volume() {
        let (engine, _audio) = engine_with(AlertConfig {
            scale_volume_by_confidence: true,
            ..Default::default()
        });
        engine.apply_result(&result(SleepState::Sleeping, 0.75));
        run_until(&engine, AlertPhase::Holding, 100);
        assert_relative_eq!(engine.snapshot().current_volume, 0.6, epsilon = 1e-5);

        // same state, new confidence: re-fades to the new level
        engine.apply_result(&result(SleepState::Sleeping, 1.0));
        assert_eq!(engine.phase(), AlertPhase::FadingIn);
        run_until(&engine, AlertPhase::Holding, 100);
        assert_relative_eq!(engine.snapshot().current_volume, 0.8, epsilon = 1e-5);
    }

    #[test]
    fn lower_confidence_steps_down_without_fading_in() {
        let (engine, audio) = engine_with(AlertConfig {
            scale_volume_by_confidence: true,
            ..Default::default()
        });
        engine.apply_result(&result(SleepState::Sleeping, 1.0));
        run_until(&engine, AlertPhase::Holding, 100);
        assert_relative_eq!(engine.snapshot().current_volume, 0.8, epsilon = 1e-5);
        let before = audio.volumes().len();

        engine.apply_result(&result(SleepState::Sleeping, 0.7));
        let snap = engine.snapshot();
        assert_eq!(snap.phase, AlertPhase::Holding);
        assert_eq!(engine.active_fades(), 0);
        assert_relative_eq!(snap.current_volume, 0.56, epsilon = 1e-5);
        assert_relative_eq!(snap.target_volume, 0.56, epsilon = 1e-5);

        for _ in 0..10 {
            assert_eq!(engine.advance(), AlertPhase::Holding);
        }
        let after = audio.volumes();
        assert_eq!(after.len(), before + 1);
        assert_relative_eq!(after[before], 0.56, epsilon = 1e-5);
    }

    #[test]
    fn lowering_mid_fade_in_never_ramps_down() {
        let (engine, audio) = engine_with(AlertConfig {
            scale_volume_by_confidence: true,
            ..Default::default()
        });
        engine.apply_result(&result(SleepState::Sleeping, 1.0));
        while engine.snapshot().current_volume < 0.6 {
            engine.advance();
        }

        engine.apply_result(&result(SleepState::Sleeping, 0.6));
        assert_eq!(engine.phase(), AlertPhase::Holding);
        assert_relative_eq!(engine.snapshot().current_volume, 0.48, epsilon = 1e-5);

        // a later rise fades in again from the lowered level
        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        assert_eq!(engine.phase(), AlertPhase::FadingIn);
        let start = audio.volumes().len();
        run_until(&engine, AlertPhase::Holding, 100);
        let ramp = &audio.volumes()[start..];
        assert!(ramp.windows(2).all(|w| w[1] >= w[0]));
        assert_relative_eq!(engine.snapshot().current_volume, 0.72, epsilon = 1e-5);
    }

    #[test]
    fn removing_a_track_fades_it_out() {
        let (engine, _audio) = engine();
        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        run_until(&engine, AlertPhase::Holding, 100);

        let mut config = AlertConfig::default();
        config.tracks.remove(&SleepState::Sleeping);
        engine.reconfigure(config).unwrap();
        assert_eq!(engine.phase(), AlertPhase::FadingOut);

        let bad = AlertConfig {
            target_volume: 2.0,
            ..Default::default()
        };
        assert!(engine.reconfigure(bad).is_err());
    }

    #[test]
    fn listener_sees_phase_changes_only() {
        let (engine, _audio) = engine();
        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = phases.clone();
        engine.set_listener(Arc::new(move |snap: &AlertSnapshot| {
            sink.lock().push(snap.phase)
        }));

        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        run_until(&engine, AlertPhase::Holding, 100);
        assert_eq!(
            *phases.lock(),
            vec![AlertPhase::FadingIn, AlertPhase::Holding]
        );
    }

    #[test]
    fn ticker_drives_fades() {
        let audio = MockAudio::default();
        let engine = AlertEngine::new(
            AlertConfig {
                fade_in: Duration::from_millis(40),
                tick: Duration::from_millis(5),
                ..Default::default()
            },
            Box::new(audio.clone()),
        )
        .unwrap();

        engine.apply_result(&result(SleepState::Sleeping, 0.9));
        let deadline = Instant::now() + Duration::from_secs(2);
        while engine.phase() != AlertPhase::Holding && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(engine.phase(), AlertPhase::Holding);

        engine.shutdown();
        assert_eq!(engine.phase(), AlertPhase::Idle);
        assert_eq!(audio.events().last(), Some(&AudioEvent::Stop));
    }
}
