use crate::model::Track;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const BUNDLED_CATALOG: &str = include_str!("../data/music.json");

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Arc<[Track]>,
}

impl Catalog {
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        Self {
            tracks: tracks.into(),
        }
    }

    pub fn bundled(prefix: &str) -> Result<Self> {
        Self::from_json(BUNDLED_CATALOG, prefix).context("failed to parse bundled catalog")
    }

    pub fn load(path: &Path, prefix: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_json(&raw, prefix)
            .with_context(|| format!("failed to parse catalog {}", path.display()))
    }

    pub fn from_json(raw: &str, prefix: &str) -> Result<Self> {
        let mut tracks: Vec<Track> = serde_json::from_str(raw)?;
        for track in &mut tracks {
            track.cover_url = resolve_asset(&track.cover_url, prefix);
            track.audio_url = resolve_asset(&track.audio_url, prefix);
        }
        tracing::debug!(tracks = tracks.len(), "catalog loaded");
        Ok(Self::from_tracks(tracks))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn contains_index(&self, index: usize) -> bool {
        index < self.tracks.len()
    }
}

pub fn resolve_asset(reference: &str, prefix: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    format!("{prefix}{reference}")
}
