use anyhow::{Context, Result, bail};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::collections::VecDeque;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

const MAX_REMOTE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    PositionChanged(Duration),
    MetadataReady(Option<Duration>),
    Ended,
    Error(String),
}

// The single playback resource. Sources are reassigned in place with
// `load`; a freshly loaded source is paused at position 0.
pub trait AudioEngine {
    fn load(&mut self, uri: &str) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn source(&self) -> Option<&str>;
    fn position(&self) -> Duration;
    fn seek_to(&mut self, position: Duration) -> Result<()>;
    fn duration(&self) -> Option<Duration>;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    fn poll_events(&mut self) -> Vec<AudioEvent>;
    fn shutdown(&mut self);
}

impl<A: AudioEngine + ?Sized> AudioEngine for Box<A> {
    fn load(&mut self, uri: &str) -> Result<()> {
        (**self).load(uri)
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }

    fn source(&self) -> Option<&str> {
        (**self).source()
    }

    fn position(&self) -> Duration {
        (**self).position()
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        (**self).seek_to(position)
    }

    fn duration(&self) -> Option<Duration> {
        (**self).duration()
    }

    fn volume(&self) -> f32 {
        (**self).volume()
    }

    fn set_volume(&mut self, volume: f32) {
        (**self).set_volume(volume)
    }

    fn poll_events(&mut self) -> Vec<AudioEvent> {
        (**self).poll_events()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

pub fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

pub fn fetch_bytes(uri: &str) -> Result<Vec<u8>> {
    if is_remote(uri) {
        let mut response = ureq::get(uri)
            .call()
            .with_context(|| format!("failed to request {uri}"))?;
        return response
            .body_mut()
            .with_config()
            .limit(MAX_REMOTE_BYTES)
            .read_to_vec()
            .with_context(|| format!("failed to download {uri}"));
    }
    fs::read(uri).with_context(|| format!("failed to open track {uri}"))
}

pub fn spawn_fetch(uri: String) -> Receiver<Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(fetch_bytes(&uri));
    });
    rx
}

fn decode(bytes: Vec<u8>, uri: &str) -> Result<Decoder<Cursor<Vec<u8>>>> {
    Decoder::new(Cursor::new(bytes)).with_context(|| format!("failed to decode {uri}"))
}

fn drain_stream_errors(errors: &Receiver<String>, events: &mut VecDeque<AudioEvent>) {
    while let Ok(reason) = errors.try_recv() {
        events.push_back(AudioEvent::Error(reason));
    }
}

enum FetchPoll {
    Waiting,
    Ready(Vec<u8>),
    Failed(String),
}

struct PendingLoad {
    uri: String,
    bytes: Receiver<Result<Vec<u8>>>,
    play_requested: bool,
}

impl PendingLoad {
    fn start(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            bytes: spawn_fetch(uri.to_string()),
            play_requested: false,
        }
    }

    fn poll(&self) -> FetchPoll {
        match self.bytes.try_recv() {
            Ok(Ok(bytes)) => FetchPoll::Ready(bytes),
            Ok(Err(err)) => FetchPoll::Failed(format!("{err:#}")),
            Err(TryRecvError::Empty) => FetchPoll::Waiting,
            Err(TryRecvError::Disconnected) => {
                FetchPoll::Failed(format!("download of {} stopped", self.uri))
            }
        }
    }
}

pub struct RodioAudioEngine {
    stream: OutputStream,
    sink: Sink,
    source: Option<String>,
    pending: Option<PendingLoad>,
    bytes: Vec<u8>,
    track_duration: Option<Duration>,
    volume: f32,
    ended: bool,
    last_position: Duration,
    stream_errors: Receiver<String>,
    events: VecDeque<AudioEvent>,
}

impl RodioAudioEngine {
    pub fn new() -> Result<Self> {
        let (error_tx, stream_errors) = mpsc::channel();
        let mut stream = OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")?
            .with_error_callback(move |err| {
                tracing::warn!(error = %err, "audio stream error");
                let _ = error_tx.send(err.to_string());
            })
            .open_stream_or_fallback()
            .context("failed to start default output stream")?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());
        sink.pause();

        Ok(Self {
            stream,
            sink,
            source: None,
            pending: None,
            bytes: Vec::new(),
            track_duration: None,
            volume: 1.0,
            ended: false,
            last_position: Duration::ZERO,
            stream_errors,
            events: VecDeque::new(),
        })
    }

    fn fresh_sink(&mut self) {
        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();
        self.sink.set_volume(self.volume);
    }

    fn install(&mut self, uri: &str, bytes: Vec<u8>) -> Result<()> {
        let decoder = decode(bytes.clone(), uri)?;
        self.track_duration = decoder.total_duration();
        self.sink.append(decoder);
        self.bytes = bytes;
        self.events
            .push_back(AudioEvent::MetadataReady(self.track_duration));
        tracing::debug!(uri, duration = ?self.track_duration, "source loaded");
        Ok(())
    }

    fn poll_pending(&mut self) {
        let Some(pending) = self.pending.as_ref() else {
            return;
        };
        let outcome = pending.poll();
        let play_requested = pending.play_requested;
        let uri = pending.uri.clone();
        match outcome {
            FetchPoll::Waiting => {}
            FetchPoll::Ready(bytes) => {
                self.pending = None;
                match self.install(&uri, bytes) {
                    Ok(()) if play_requested => self.sink.play(),
                    Ok(()) => {}
                    Err(err) => self.events.push_back(AudioEvent::Error(format!("{err:#}"))),
                }
            }
            FetchPoll::Failed(reason) => {
                self.pending = None;
                self.events.push_back(AudioEvent::Error(reason));
            }
        }
    }

    // Re-queues the loaded bytes after the sink drained to its end.
    fn rewind(&mut self) -> Result<()> {
        let Some(uri) = self.source.clone() else {
            bail!("no playable source loaded");
        };
        let was_paused = self.sink.is_paused();
        self.fresh_sink();
        let decoder = decode(self.bytes.clone(), &uri)?;
        self.sink.append(decoder);
        if !was_paused {
            self.sink.play();
        }
        self.ended = false;
        self.last_position = Duration::ZERO;
        Ok(())
    }
}

impl AudioEngine for RodioAudioEngine {
    fn load(&mut self, uri: &str) -> Result<()> {
        self.fresh_sink();
        self.source = None;
        self.pending = None;
        self.bytes.clear();
        self.track_duration = None;
        self.ended = false;
        self.last_position = Duration::ZERO;

        if is_remote(uri) {
            self.pending = Some(PendingLoad::start(uri));
            self.source = Some(uri.to_string());
            tracing::debug!(uri, "remote source requested");
            return Ok(());
        }

        let bytes = fetch_bytes(uri)?;
        self.install(uri, bytes)?;
        self.source = Some(uri.to_string());
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.source.is_none() {
            bail!("no playable source loaded");
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.play_requested = true;
            return Ok(());
        }
        if self.ended || self.sink.empty() {
            self.rewind()?;
        }
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.play_requested = false;
        }
        self.sink.pause();
    }

    fn is_paused(&self) -> bool {
        match &self.pending {
            Some(pending) => !pending.play_requested,
            None => self.sink.is_paused(),
        }
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn position(&self) -> Duration {
        if self.source.is_none() || self.pending.is_some() {
            return Duration::ZERO;
        }
        self.sink.get_pos()
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if self.source.is_none() {
            bail!("no active track");
        }
        if self.pending.is_some() {
            bail!("track is still loading");
        }
        if self.ended || self.sink.empty() {
            self.rewind()?;
        }
        self.sink
            .try_seek(position)
            .map_err(|err| anyhow::anyhow!("failed to seek current track: {err:?}"))?;
        Ok(())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
    }

    fn poll_events(&mut self) -> Vec<AudioEvent> {
        drain_stream_errors(&self.stream_errors, &mut self.events);
        self.poll_pending();
        if self.source.is_some() && self.pending.is_none() && !self.ended {
            let position = self.sink.get_pos();
            if position != self.last_position {
                self.last_position = position;
                self.events.push_back(AudioEvent::PositionChanged(position));
            }
            if !self.sink.is_paused() && self.sink.empty() {
                self.ended = true;
                self.events.push_back(AudioEvent::Ended);
            }
        }
        self.events.drain(..).collect()
    }

    fn shutdown(&mut self) {
        self.sink.stop();
        self.source = None;
        self.pending = None;
        self.bytes.clear();
        self.events.clear();
    }
}

pub struct NullAudioEngine {
    paused: bool,
    source: Option<String>,
    volume: f32,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
    ended: bool,
    last_position: Duration,
    events: VecDeque<AudioEvent>,
}

impl NullAudioEngine {
    pub fn new() -> Self {
        Self {
            paused: true,
            source: None,
            volume: 1.0,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
            ended: false,
            last_position: Duration::ZERO,
            events: VecDeque::new(),
        }
    }

    fn probe_duration(uri: &str) -> Result<Option<Duration>> {
        if is_remote(uri) || !Path::new(uri).exists() {
            return Ok(None);
        }
        let source = decode(fetch_bytes(uri)?, uri)?;
        Ok(source
            .total_duration()
            .filter(|duration| !duration.is_zero()))
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.source.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }

    fn reached_end(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.source.is_some() && !self.paused && self.current_position() >= duration
    }
}

impl Default for NullAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for NullAudioEngine {
    fn load(&mut self, uri: &str) -> Result<()> {
        self.paused = true;
        self.source = Some(uri.to_string());
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.last_position = Duration::ZERO;
        self.ended = false;
        self.track_duration = None;
        match Self::probe_duration(uri) {
            Ok(duration) => {
                self.track_duration = duration;
                self.events.push_back(AudioEvent::MetadataReady(duration));
            }
            Err(err) => self.events.push_back(AudioEvent::Error(format!("{err:#}"))),
        }
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.source.is_none() {
            bail!("no playable source loaded");
        }
        if self.ended {
            self.position_offset = Duration::ZERO;
            self.ended = false;
        }
        if self.paused {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn position(&self) -> Duration {
        if self.source.is_none() {
            return Duration::ZERO;
        }
        self.current_position()
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if self.source.is_none() {
            bail!("no active track");
        }

        self.position_offset = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.ended = false;
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        Ok(())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn poll_events(&mut self) -> Vec<AudioEvent> {
        if self.source.is_some() && !self.ended {
            let position = self.current_position();
            if position != self.last_position {
                self.last_position = position;
                self.events.push_back(AudioEvent::PositionChanged(position));
            }
            if self.reached_end() {
                self.pause();
                self.ended = true;
                self.events.push_back(AudioEvent::Ended);
            }
        }
        self.events.drain(..).collect()
    }

    fn shutdown(&mut self) {
        self.pause();
        self.source = None;
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AudioEngine, AudioEvent, FetchPoll, NullAudioEngine, PendingLoad, drain_stream_errors,
    };
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::mpsc;
    use std::path::Path;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, duration_ms: u32) {
        let sample_rate: u32 = 44_100;
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
        let data_size = total_samples * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);

        let mut bytes = Vec::with_capacity((44_u32 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&36_u32.saturating_add(data_size).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.resize((44_u32 + data_size) as usize, 0_u8);

        fs::write(path, bytes).expect("wav fixture should be written");
    }

    #[test]
    fn loaded_source_starts_paused_at_zero() {
        let mut engine = NullAudioEngine::new();
        engine.load("missing.mp3").expect("load");
        assert!(engine.is_paused());
        assert_eq!(engine.position(), Duration::ZERO);
        assert_eq!(engine.source(), Some("missing.mp3"));
        assert_eq!(engine.poll_events(), vec![AudioEvent::MetadataReady(None)]);
    }

    #[test]
    fn play_without_source_is_rejected() {
        let mut engine = NullAudioEngine::new();
        assert!(engine.play().is_err());
    }

    #[test]
    fn pause_and_resume_control_position_progression() {
        let mut engine = NullAudioEngine::new();
        engine.load("missing.flac").expect("load");
        engine.play().expect("play");
        thread::sleep(Duration::from_millis(20));

        engine.pause();
        let paused = engine.position();
        assert!(paused > Duration::ZERO);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.position(), paused, "position should freeze while paused");

        engine.play().expect("resume");
        thread::sleep(Duration::from_millis(20));
        assert!(engine.position() > paused, "position should continue after resume");
    }

    #[test]
    fn seek_updates_position() {
        let mut engine = NullAudioEngine::new();
        engine.load("missing.flac").expect("load");

        let target = Duration::from_secs(12);
        engine.seek_to(target).expect("seek should succeed");
        assert_eq!(engine.position(), target);
    }

    #[test]
    fn position_changes_are_reported() {
        let mut engine = NullAudioEngine::new();
        engine.load("missing.flac").expect("load");
        engine.poll_events();
        engine.play().expect("play");
        thread::sleep(Duration::from_millis(10));

        let events = engine.poll_events();
        assert!(
            events
                .iter()
                .any(|event| matches!(event, AudioEvent::PositionChanged(_)))
        );
    }

    #[test]
    fn known_duration_emits_ended_once() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 60);

        let mut engine = NullAudioEngine::new();
        engine
            .load(track.to_str().expect("utf-8 path"))
            .expect("load");
        let duration = engine.duration().expect("duration should be detected");
        assert!(duration >= Duration::from_millis(50));

        engine.play().expect("play");
        thread::sleep(Duration::from_millis(100));
        let events = engine.poll_events();
        assert!(events.contains(&AudioEvent::Ended));
        assert!(!engine.poll_events().contains(&AudioEvent::Ended));

        engine.play().expect("restart");
        assert!(engine.position() < duration);
    }

    #[test]
    fn unknown_duration_does_not_end() {
        let mut engine = NullAudioEngine::new();
        engine.load("missing.flac").expect("load");
        engine.play().expect("play");
        thread::sleep(Duration::from_millis(30));
        assert!(!engine.poll_events().contains(&AudioEvent::Ended));
    }

    #[test]
    fn volume_is_clamped_to_unit_range() {
        let mut engine = NullAudioEngine::new();
        engine.set_volume(1.7);
        assert_eq!(engine.volume(), 1.0);
        engine.set_volume(-0.2);
        assert_eq!(engine.volume(), 0.0);
    }

    fn wait_for(pending: &PendingLoad) -> FetchPoll {
        for _ in 0..200 {
            match pending.poll() {
                FetchPoll::Waiting => thread::sleep(Duration::from_millis(10)),
                done => return done,
            }
        }
        FetchPoll::Waiting
    }

    #[test]
    fn pending_load_delivers_fetched_bytes() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 20);

        let pending = PendingLoad::start(track.to_str().expect("utf-8 path"));
        match wait_for(&pending) {
            FetchPoll::Ready(bytes) => assert_eq!(bytes, fs::read(&track).expect("read")),
            _ => panic!("fetch should succeed"),
        }
    }

    #[test]
    fn pending_load_reports_fetch_failure() {
        let pending = PendingLoad::start("definitely-missing.mp3");
        match wait_for(&pending) {
            FetchPoll::Failed(reason) => assert!(reason.contains("definitely-missing.mp3")),
            _ => panic!("fetch should fail"),
        }
    }

    #[test]
    fn stream_errors_become_error_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(String::from("device unplugged")).expect("send");
        let mut events = VecDeque::new();
        drain_stream_errors(&rx, &mut events);
        assert_eq!(
            events.into_iter().collect::<Vec<_>>(),
            vec![AudioEvent::Error(String::from("device unplugged"))]
        );
    }

    #[test]
    fn undecodable_file_reports_error() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("broken.mp3");
        fs::write(&track, b"not really audio").expect("write");

        let mut engine = NullAudioEngine::new();
        engine
            .load(track.to_str().expect("utf-8 path"))
            .expect("load");
        let events = engine.poll_events();
        assert!(
            events
                .iter()
                .any(|event| matches!(event, AudioEvent::Error(reason) if reason.contains("decode")))
        );
    }
}
