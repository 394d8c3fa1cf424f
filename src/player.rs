use crate::audio::{AudioEngine, AudioEvent};
use crate::catalog::Catalog;
use crate::model::PlaybackState;
use crate::navigation::{wrap_next, wrap_previous};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::IteratorRandom;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackChanged { index: usize },
    PlayStateChanged { playing: bool },
    Progress { current_time: f64, duration: f64 },
    VolumeChanged { volume: f32 },
    ModesChanged { shuffle: bool, repeat: bool },
    PlaybackFailed { index: usize, reason: String },
}

pub struct PlayerController<A> {
    catalog: Catalog,
    audio: A,
    state: PlaybackState,
    rng: SmallRng,
    subscribers: Vec<Sender<PlayerEvent>>,
}

impl<A: AudioEngine> PlayerController<A> {
    pub fn new(catalog: Catalog, audio: A) -> Self {
        Self::with_rng(catalog, audio, SmallRng::from_os_rng())
    }

    pub fn with_rng(catalog: Catalog, mut audio: A, rng: SmallRng) -> Self {
        let state = PlaybackState::default();
        audio.set_volume(state.volume);
        let mut player = Self {
            catalog,
            audio,
            state,
            rng,
            subscribers: Vec::new(),
        };
        player.load_current();
        player
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn play(&mut self) {
        if self.catalog.is_empty() {
            tracing::warn!("play ignored: catalog is empty");
            return;
        }
        self.set_playing(true);
        self.start_audio();
    }

    pub fn pause(&mut self) {
        self.set_playing(false);
        self.audio.pause();
    }

    pub fn toggle_play_pause(&mut self) {
        if self.state.is_playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn next(&mut self) {
        if let Some(index) = wrap_next(self.state.current_track, self.catalog.len()) {
            self.change_track(index);
        }
    }

    pub fn previous(&mut self) {
        if let Some(index) = wrap_previous(self.state.current_track, self.catalog.len()) {
            self.change_track(index);
        }
    }

    pub fn play_track(&mut self, index: usize) {
        if !self.catalog.contains_index(index) {
            tracing::warn!(index, "play_track ignored: index outside catalog");
            return;
        }
        if index != self.state.current_track {
            self.state.current_track = index;
            self.load_current();
            self.emit(PlayerEvent::TrackChanged { index });
        }
        self.play();
    }

    pub fn seek(&mut self, seconds: f64) {
        if !seconds.is_finite() {
            tracing::debug!(seconds, "non-finite seek ignored");
            return;
        }
        let mut seconds = seconds.max(0.0);
        if self.state.duration.is_finite() {
            seconds = seconds.min(self.state.duration.max(0.0));
        }
        let Ok(position) = Duration::try_from_secs_f64(seconds) else {
            tracing::debug!(seconds, "out-of-range seek ignored");
            return;
        };
        self.state.current_time = seconds;
        if let Err(err) = self.audio.seek_to(position) {
            tracing::warn!(error = %format!("{err:#}"), seconds, "seek failed");
        }
        self.emit_progress();
    }

    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            tracing::debug!("NaN volume ignored");
            return;
        }
        self.state.volume = volume.clamp(0.0, 1.0);
        self.audio.set_volume(self.state.volume);
        self.emit(PlayerEvent::VolumeChanged {
            volume: self.state.volume,
        });
    }

    pub fn toggle_shuffle(&mut self) {
        self.state.shuffle = !self.state.shuffle;
        self.emit_modes();
    }

    pub fn toggle_repeat(&mut self) {
        self.state.repeat = !self.state.repeat;
        self.emit_modes();
    }

    pub fn tick(&mut self) {
        for event in self.audio.poll_events() {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::PositionChanged(position) => {
                self.state.current_time = position.as_secs_f64();
                self.emit_progress();
            }
            AudioEvent::MetadataReady(duration) => {
                self.state.duration = duration.map_or(f64::NAN, |d| d.as_secs_f64());
                self.emit_progress();
            }
            AudioEvent::Ended => self.track_ended(),
            AudioEvent::Error(reason) => self.playback_failed(reason),
        }
    }

    pub fn teardown(&mut self) {
        self.audio.pause();
        self.audio.shutdown();
        self.subscribers.clear();
        tracing::debug!("player torn down");
    }

    fn track_ended(&mut self) {
        if self.catalog.is_empty() {
            return;
        }
        if self.state.repeat {
            self.restart_current();
        } else if self.state.shuffle {
            let Some(index) = (0..self.catalog.len()).choose(&mut self.rng) else {
                return;
            };
            tracing::debug!(index, "shuffle picked next track");
            if index == self.state.current_track {
                self.restart_current();
            } else {
                self.change_track(index);
            }
        } else {
            self.next();
        }
    }

    fn restart_current(&mut self) {
        self.state.current_time = 0.0;
        if let Err(err) = self.audio.seek_to(Duration::ZERO) {
            tracing::debug!(error = %format!("{err:#}"), "rewind before restart failed");
        }
        self.emit_progress();
        self.start_audio();
    }

    fn change_track(&mut self, index: usize) {
        self.state.current_track = index;
        self.load_current();
        self.emit(PlayerEvent::TrackChanged { index });
        if self.state.is_playing {
            self.start_audio();
        }
    }

    fn load_current(&mut self) {
        self.state.current_time = 0.0;
        self.state.duration = f64::NAN;
        let Some(track) = self.catalog.get(self.state.current_track) else {
            return;
        };
        let uri = track.audio_url.clone();
        if let Err(err) = self.audio.load(&uri) {
            self.playback_failed(format!("{err:#}"));
        }
    }

    // Best-effort start; a rejection folds back into `is_playing = false`.
    fn start_audio(&mut self) {
        if !self.state.is_playing {
            return;
        }
        if let Err(err) = self.audio.play() {
            self.playback_failed(format!("{err:#}"));
        }
    }

    fn playback_failed(&mut self, reason: String) {
        let index = self.state.current_track;
        let title = self
            .catalog
            .get(index)
            .map(|track| track.title.as_str())
            .unwrap_or_default();
        tracing::error!(index, title, reason = %reason, "playback failed");
        self.set_playing(false);
        self.audio.pause();
        self.emit(PlayerEvent::PlaybackFailed { index, reason });
    }

    fn set_playing(&mut self, playing: bool) {
        if self.state.is_playing == playing {
            return;
        }
        self.state.is_playing = playing;
        self.emit(PlayerEvent::PlayStateChanged { playing });
    }

    fn emit_progress(&mut self) {
        self.emit(PlayerEvent::Progress {
            current_time: self.state.current_time,
            duration: self.state.duration,
        });
    }

    fn emit_modes(&mut self) {
        self.emit(PlayerEvent::ModesChanged {
            shuffle: self.state.shuffle,
            repeat: self.state.repeat,
        });
    }

    fn emit(&mut self, event: PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Track;
    use anyhow::{Result, bail};
    use proptest::prop_assert_eq;

    #[derive(Default)]
    struct TestAudioEngine {
        source: Option<String>,
        loads: Vec<String>,
        plays: usize,
        paused: bool,
        position: Duration,
        seeks: Vec<Duration>,
        volume: f32,
        reject_play: bool,
        pending: Vec<AudioEvent>,
        shut_down: bool,
    }

    impl AudioEngine for TestAudioEngine {
        fn load(&mut self, uri: &str) -> Result<()> {
            self.source = Some(uri.to_string());
            self.loads.push(uri.to_string());
            self.paused = true;
            self.position = Duration::ZERO;
            Ok(())
        }

        fn play(&mut self) -> Result<()> {
            if self.reject_play {
                bail!("unsupported format");
            }
            self.plays += 1;
            self.paused = false;
            Ok(())
        }

        fn pause(&mut self) {
            self.paused = true;
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn source(&self) -> Option<&str> {
            self.source.as_deref()
        }

        fn position(&self) -> Duration {
            self.position
        }

        fn seek_to(&mut self, position: Duration) -> Result<()> {
            self.position = position;
            self.seeks.push(position);
            Ok(())
        }

        fn duration(&self) -> Option<Duration> {
            None
        }

        fn volume(&self) -> f32 {
            self.volume
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }

        fn poll_events(&mut self) -> Vec<AudioEvent> {
            std::mem::take(&mut self.pending)
        }

        fn shutdown(&mut self) {
            self.shut_down = true;
        }
    }

    fn catalog(len: usize) -> Catalog {
        Catalog::from_tracks(
            (0..len)
                .map(|n| Track {
                    title: format!("song {n}"),
                    artist: String::from("band"),
                    album: None,
                    cover_url: format!("/covers/{n}.jpg"),
                    audio_url: format!("/music/{n}.mp3"),
                })
                .collect(),
        )
    }

    fn player(len: usize) -> PlayerController<TestAudioEngine> {
        PlayerController::with_rng(
            catalog(len),
            TestAudioEngine::default(),
            SmallRng::seed_from_u64(7),
        )
    }

    #[test]
    fn startup_loads_first_track_paused() {
        let player = player(3);
        assert_eq!(player.audio().loads, vec!["/music/0.mp3"]);
        assert_eq!(player.state().current_track, 0);
        assert!(!player.state().is_playing);
        assert_eq!(player.audio().volume, 0.7);
    }

    #[test]
    fn previous_and_next_wrap_around() {
        let mut player = player(3);
        player.previous();
        assert_eq!(player.state().current_track, 2);
        player.next();
        player.next();
        assert_eq!(player.state().current_track, 1);
        assert_eq!(player.audio().source(), Some("/music/1.mp3"));
    }

    #[test]
    fn track_change_while_playing_reissues_play() {
        let mut player = player(3);
        player.play();
        assert_eq!(player.audio().plays, 1);
        player.next();
        assert_eq!(player.audio().plays, 2);
        assert!(player.state().is_playing);

        player.pause();
        player.next();
        assert_eq!(player.audio().plays, 2);
    }

    #[test]
    fn rejected_play_clears_playing_flag() {
        let mut player = player(2);
        let events = player.subscribe();
        player.audio_mut().reject_play = true;

        player.toggle_play_pause();

        assert!(!player.state().is_playing);
        let received: Vec<PlayerEvent> = events.try_iter().collect();
        assert!(received.iter().any(|event| matches!(
            event,
            PlayerEvent::PlaybackFailed { index: 0, .. }
        )));
        assert_eq!(received.last(), Some(&PlayerEvent::PlaybackFailed {
            index: 0,
            reason: String::from("unsupported format"),
        }));
    }

    #[test]
    fn error_event_stops_playback() {
        let mut player = player(2);
        player.play();
        player
            .audio_mut()
            .pending
            .push(AudioEvent::Error(String::from("network")));
        player.tick();
        assert!(!player.state().is_playing);
        assert!(player.audio().paused);
    }

    #[test]
    fn seek_forwards_position_and_clamps_negative() {
        let mut player = player(1);
        player.seek(42.5);
        assert_eq!(player.state().current_time, 42.5);
        assert_eq!(player.audio().position, Duration::from_secs_f64(42.5));

        player.seek(-3.0);
        assert_eq!(player.state().current_time, 0.0);

        player.seek(f64::NAN);
        assert_eq!(player.audio().seeks.len(), 2);
    }

    #[test]
    fn seek_stops_at_known_duration() {
        let mut player = player(1);
        player.handle_event(AudioEvent::MetadataReady(Some(Duration::from_secs(90))));
        player.seek(500.0);
        assert_eq!(player.state().current_time, 90.0);
        assert_eq!(player.audio().position, Duration::from_secs(90));
    }

    #[test]
    fn volume_is_clamped() {
        let mut player = player(1);
        player.set_volume(1.4);
        assert_eq!(player.state().volume, 1.0);
        player.set_volume(-1.0);
        assert_eq!(player.state().volume, 0.0);
        player.set_volume(f32::NAN);
        assert_eq!(player.state().volume, 0.0);
        player.set_volume(0.25);
        assert_eq!(player.audio().volume, 0.25);
    }

    #[test]
    fn shuffle_and_repeat_are_independent() {
        let mut player = player(2);
        player.toggle_shuffle();
        player.toggle_repeat();
        assert!(player.state().shuffle && player.state().repeat);
        player.toggle_shuffle();
        assert!(!player.state().shuffle && player.state().repeat);
    }

    #[test]
    fn end_with_repeat_restarts_current_track() {
        let mut player = player(3);
        player.play_track(1);
        player.toggle_repeat();
        player.handle_event(AudioEvent::PositionChanged(Duration::from_secs(30)));

        player.handle_event(AudioEvent::Ended);

        assert_eq!(player.state().current_track, 1);
        assert_eq!(player.state().current_time, 0.0);
        assert_eq!(player.audio().seeks.last(), Some(&Duration::ZERO));
        assert_eq!(player.audio().plays, 2);
    }

    #[test]
    fn end_without_modes_advances() {
        let mut player = player(3);
        player.play_track(2);
        player.handle_event(AudioEvent::Ended);
        assert_eq!(player.state().current_track, 0);
        assert!(player.state().is_playing);
    }

    #[test]
    fn end_with_shuffle_stays_in_catalog() {
        let mut player = player(5);
        player.play();
        player.toggle_shuffle();
        for _ in 0..20 {
            player.handle_event(AudioEvent::Ended);
            assert!(player.state().current_track < 5);
            assert!(player.state().is_playing);
        }
    }

    #[test]
    fn metadata_and_position_update_times() {
        let mut player = player(1);
        player.handle_event(AudioEvent::MetadataReady(Some(Duration::from_secs(180))));
        player.handle_event(AudioEvent::PositionChanged(Duration::from_millis(1500)));
        assert_eq!(player.state().duration, 180.0);
        assert_eq!(player.state().current_time, 1.5);

        player.next();
        assert!(player.state().duration.is_nan());
        assert_eq!(player.state().current_time, 0.0);
    }

    #[test]
    fn play_track_ignores_out_of_range() {
        let mut player = player(2);
        player.play_track(5);
        assert_eq!(player.state().current_track, 0);
        assert!(!player.state().is_playing);
    }

    #[test]
    fn empty_catalog_is_inert() {
        let mut player = player(0);
        player.play();
        player.next();
        player.previous();
        player.handle_event(AudioEvent::Ended);
        assert!(!player.state().is_playing);
        assert_eq!(player.state().current_track, 0);
        assert!(player.audio().loads.is_empty());
    }

    #[test]
    fn teardown_detaches_subscribers() {
        let mut player = player(2);
        let events = player.subscribe();
        player.play();
        player.teardown();
        player.next();

        assert!(player.audio().shut_down);
        assert!(player.audio().paused);
        let received: Vec<PlayerEvent> = events.try_iter().collect();
        assert_eq!(received, vec![PlayerEvent::PlayStateChanged { playing: true }]);
    }

    proptest::proptest! {
        #[test]
        fn current_track_stays_in_catalog(len in 1usize..12, ops in proptest::collection::vec(0u8..6, 1..120)) {
            let mut player = player(len);
            for op in ops {
                match op {
                    0 => player.next(),
                    1 => player.previous(),
                    2 => player.toggle_shuffle(),
                    3 => player.toggle_repeat(),
                    4 => player.toggle_play_pause(),
                    _ => player.handle_event(AudioEvent::Ended),
                }
                proptest::prop_assert!(player.state().current_track < len);
            }
        }

        #[test]
        fn next_closes_cycle(len in 1usize..20, start in 0usize..20) {
            let mut player = player(len);
            player.play_track(start % len);
            let origin = player.state().current_track;
            for _ in 0..len {
                player.next();
            }
            prop_assert_eq!(player.state().current_track, origin);
            for _ in 0..len {
                player.previous();
            }
            prop_assert_eq!(player.state().current_track, origin);
        }
    }
}
