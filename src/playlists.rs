use crate::catalog::Catalog;
use crate::export::PlaylistExport;
use crate::model::Playlist;
use crate::storage::{self, KeyValueStore};
use anyhow::Result;

pub const STORAGE_KEY: &str = "mrMusicPlaylists";
pub const DEFAULT_PLAYLIST_NAME: &str = "My Favorites";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
    UnknownPlaylist,
}

#[derive(Debug)]
pub struct PlaylistStore<S> {
    store: S,
    playlists: Vec<Playlist>,
}

impl<S: KeyValueStore> PlaylistStore<S> {
    pub fn load(mut store: S) -> Result<Self> {
        let stored: Option<Vec<Playlist>> = storage::load_json(&store, STORAGE_KEY)?;
        let playlists = match stored {
            Some(playlists) if !playlists.is_empty() => playlists,
            _ => {
                let seeded = vec![Playlist::new(DEFAULT_PLAYLIST_NAME)];
                storage::save_json(&mut store, STORAGE_KEY, &seeded)?;
                tracing::info!("seeded default playlist");
                seeded
            }
        };
        tracing::debug!(count = playlists.len(), "playlists loaded");
        Ok(Self { store, playlists })
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn get(&self, index: usize) -> Option<&Playlist> {
        self.playlists.get(index)
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn create(&mut self, name: &str) -> Result<bool> {
        if name.trim().is_empty() {
            tracing::debug!("ignoring blank playlist name");
            return Ok(false);
        }
        self.playlists.push(Playlist::new(name));
        self.persist()?;
        tracing::info!(name, "playlist created");
        Ok(true)
    }

    // Appends `track` unless the playlist already lists it. The collection is
    // written back either way.
    pub fn add_track(&mut self, playlist: usize, track: usize) -> Result<AddOutcome> {
        let Some(target) = self.playlists.get_mut(playlist) else {
            tracing::warn!(playlist, "add to unknown playlist ignored");
            return Ok(AddOutcome::UnknownPlaylist);
        };

        let outcome = if target.tracks.contains(&track) {
            AddOutcome::AlreadyPresent
        } else {
            target.tracks.push(track);
            AddOutcome::Added
        };
        self.persist()?;
        tracing::debug!(playlist, track, ?outcome, "add track to playlist");
        Ok(outcome)
    }

    pub fn export(&self, playlist: usize, catalog: &Catalog) -> Option<PlaylistExport> {
        let source = self.playlists.get(playlist)?;
        let tracks = source
            .tracks
            .iter()
            .filter_map(|&index| {
                let track = catalog.get(index).cloned();
                if track.is_none() {
                    tracing::warn!(playlist = %source.name, index, "stale track index skipped in export");
                }
                track
            })
            .collect();
        Some(PlaylistExport {
            name: source.name.clone(),
            tracks,
        })
    }

    fn persist(&mut self) -> Result<()> {
        storage::save_json(&mut self.store, STORAGE_KEY, &self.playlists)
    }
}
