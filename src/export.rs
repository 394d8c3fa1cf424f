use crate::model::Track;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistExport {
    pub name: String,
    pub tracks: Vec<Track>,
}

impl PlaylistExport {
    pub fn file_name(&self) -> String {
        export_file_name(&self.name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize playlist export")
    }

    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(self.file_name());
        fs::write(&path, self.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), tracks = self.tracks.len(), "playlist exported");
        Ok(path)
    }
}

pub fn export_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 5);
    let mut in_whitespace = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out.push_str(".json");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn track(title: &str) -> Track {
        Track {
            title: title.to_string(),
            artist: String::from("artist"),
            album: None,
            cover_url: format!("/covers/{title}.jpg"),
            audio_url: format!("/music/{title}.mp3"),
        }
    }

    #[test]
    fn whitespace_runs_collapse_to_single_underscore() {
        assert_eq!(export_file_name("My Mix"), "My_Mix.json");
        assert_eq!(export_file_name("Road  Trip\t2024"), "Road_Trip_2024.json");
        assert_eq!(export_file_name(" lead"), "_lead.json");
        assert_eq!(export_file_name("solo"), "solo.json");
    }

    #[test]
    fn export_document_embeds_full_tracks() {
        let export = PlaylistExport {
            name: String::from("My Mix"),
            tracks: vec![track("a"), track("c")],
        };
        let value: serde_json::Value =
            serde_json::from_str(&export.to_json().expect("json")).expect("parse");

        assert_eq!(value["name"], "My Mix");
        assert_eq!(value["tracks"][1]["title"], "c");
        assert_eq!(value["tracks"][0]["audioUrl"], "/music/a.mp3");
    }

    #[test]
    fn write_to_creates_named_file() {
        let dir = tempdir().expect("tempdir");
        let export = PlaylistExport {
            name: String::from("Late Night"),
            tracks: vec![track("a")],
        };

        let path = export.write_to(dir.path()).expect("write");
        assert_eq!(path, dir.path().join("Late_Night.json"));

        let raw = fs::read_to_string(&path).expect("read");
        let parsed: PlaylistExport = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed, export);
        assert!(raw.contains("\n  \"name\""));
    }
}
