use serde::{Deserialize, Serialize};

pub const DEFAULT_VOLUME: f32 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub cover_url: String,
    pub audio_url: String,
}

impl Track {
    pub fn download_file_name(&self) -> String {
        format!("{} - {}.mp3", self.artist, self.title)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Playlist {
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<usize>,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub current_track: usize,
    pub is_playing: bool,
    pub volume: f32,
    pub shuffle: bool,
    pub repeat: bool,
    pub current_time: f64,
    // NaN until the audio resource reports metadata for the loaded source.
    pub duration: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: 0,
            is_playing: false,
            volume: DEFAULT_VOLUME,
            shuffle: false,
            repeat: false,
            current_time: 0.0,
            duration: f64::NAN,
        }
    }
}

impl PlaybackState {
    pub fn progress_ratio(&self) -> Option<f64> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return None;
        }
        Some((self.current_time / self.duration).clamp(0.0, 1.0))
    }
}

pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return String::from("0:00");
    }
    let whole = seconds.floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}
