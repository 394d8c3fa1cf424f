use crate::audio::{self, AudioEngine};
use crate::catalog::Catalog;
use crate::navigation::{
    Direction, ModalAction, ModalGesture, ModalKey, SessionMode, TrackModal, ViewScope,
};
use crate::player::{PlayerController, PlayerEvent};
use crate::playlists::{AddOutcome, PlaylistStore};
use crate::storage::KeyValueStore;
use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    TogglePlayPause,
    Play,
    Pause,
    Next,
    Previous,
    Seek(f64),
    SetVolume(f32),
    ToggleShuffle,
    ToggleRepeat,
    PlayTrack(usize),
    SelectTrack(usize),
    OpenCurrentTrack,
    ModalNavigate(Direction),
    ModalKey(ModalKey),
    ModalGesture(ModalGesture),
    CloseModal,
    PlaySelected,
    SelectView(ViewScope),
    ToggleMenu,
    OpenPlaylistDialog,
    SetDraftPlaylistName(String),
    CreatePlaylist,
    AddCurrentToPlaylist(usize),
    ClosePlaylistDialog,
    ExportPlaylist(usize),
    DownloadCurrent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Player(PlayerEvent),
    ViewChanged(ViewScope),
    ModalChanged(TrackModal),
    MenuToggled(bool),
    PlaylistDialogChanged(Option<PlaylistDialog>),
    PlaylistsChanged,
    TrackAdded { playlist: usize, outcome: AddOutcome },
    Exported(PathBuf),
    Downloaded(PathBuf),
    DownloadFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaylistDialog {
    pub draft_name: String,
}

pub struct Session<A, S> {
    catalog: Catalog,
    player: PlayerController<A>,
    player_events: Receiver<PlayerEvent>,
    playlists: PlaylistStore<S>,
    view: ViewScope,
    modal: TrackModal,
    dialog: Option<PlaylistDialog>,
    menu_open: bool,
    export_dir: PathBuf,
    downloads: Vec<Receiver<Result<PathBuf>>>,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl<A: AudioEngine, S: KeyValueStore> Session<A, S> {
    pub fn new(
        mut player: PlayerController<A>,
        playlists: PlaylistStore<S>,
        export_dir: PathBuf,
    ) -> Self {
        let player_events = player.subscribe();
        Self {
            catalog: player.catalog().clone(),
            player,
            player_events,
            playlists,
            view: ViewScope::AllMusic,
            modal: TrackModal::Closed,
            dialog: None,
            menu_open: false,
            export_dir,
            downloads: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn player(&self) -> &PlayerController<A> {
        &self.player
    }

    pub fn playlists(&self) -> &PlaylistStore<S> {
        &self.playlists
    }

    pub fn view(&self) -> ViewScope {
        self.view
    }

    pub fn modal(&self) -> TrackModal {
        self.modal
    }

    pub fn dialog(&self) -> Option<&PlaylistDialog> {
        self.dialog.as_ref()
    }

    pub fn menu_open(&self) -> bool {
        self.menu_open
    }

    pub fn selected_track(&self) -> usize {
        self.modal.selected_or(self.player.state().current_track)
    }

    pub fn mode(&self) -> SessionMode {
        let state = self.player.state();
        SessionMode::from_parts(self.modal, state.current_track, state.is_playing)
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn visible_tracks(&self) -> Vec<usize> {
        match self.view {
            ViewScope::AllMusic => (0..self.catalog.len()).collect(),
            ViewScope::Playlist(index) => self
                .playlists
                .get(index)
                .map(|playlist| {
                    playlist
                        .tracks
                        .iter()
                        .copied()
                        .filter(|&track| self.catalog.contains_index(track))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn view_title(&self) -> &str {
        match self.view {
            ViewScope::AllMusic => "All Music",
            ViewScope::Playlist(index) => self
                .playlists
                .get(index)
                .map_or("All Music", |playlist| playlist.name.as_str()),
        }
    }

    pub fn tick(&mut self) {
        self.player.tick();
        self.forward_player_events();
        self.poll_downloads();
    }

    pub fn dispatch(&mut self, intent: Intent) -> Result<()> {
        tracing::debug!(?intent, "dispatch");
        let result = self.apply(intent);
        self.forward_player_events();
        result
    }

    pub fn teardown(&mut self) {
        self.player.teardown();
        self.forward_player_events();
        self.subscribers.clear();
    }

    fn apply(&mut self, intent: Intent) -> Result<()> {
        match intent {
            Intent::TogglePlayPause => self.player.toggle_play_pause(),
            Intent::Play => self.player.play(),
            Intent::Pause => self.player.pause(),
            Intent::Next => self.player.next(),
            Intent::Previous => self.player.previous(),
            Intent::Seek(seconds) => self.player.seek(seconds),
            Intent::SetVolume(volume) => self.player.set_volume(volume),
            Intent::ToggleShuffle => self.player.toggle_shuffle(),
            Intent::ToggleRepeat => self.player.toggle_repeat(),
            Intent::PlayTrack(index) => self.player.play_track(index),
            Intent::SelectTrack(index) => {
                if self.catalog.contains_index(index) {
                    self.set_modal(TrackModal::Open { selected: index });
                } else {
                    tracing::warn!(index, "select ignored: index outside catalog");
                }
            }
            Intent::OpenCurrentTrack => {
                if !self.catalog.is_empty() {
                    let current = self.player.state().current_track;
                    self.set_modal(TrackModal::Open { selected: current });
                }
            }
            Intent::ModalNavigate(direction) => self.modal_action(ModalAction::Navigate(direction)),
            Intent::ModalKey(key) => self.modal_action(key.into()),
            Intent::ModalGesture(gesture) => self.modal_action(gesture.into()),
            Intent::CloseModal => self.modal_action(ModalAction::Close),
            Intent::PlaySelected => {
                if self.modal.is_open() {
                    let selected = self.selected_track();
                    self.player.play_track(selected);
                }
            }
            Intent::SelectView(view) => self.select_view(view),
            Intent::ToggleMenu => {
                self.menu_open = !self.menu_open;
                self.emit(SessionEvent::MenuToggled(self.menu_open));
            }
            Intent::OpenPlaylistDialog => self.set_dialog(Some(PlaylistDialog::default())),
            Intent::SetDraftPlaylistName(name) => {
                if let Some(dialog) = self.dialog.as_mut() {
                    dialog.draft_name = name;
                    let snapshot = self.dialog.clone();
                    self.emit(SessionEvent::PlaylistDialogChanged(snapshot));
                }
            }
            Intent::CreatePlaylist => self.create_playlist()?,
            Intent::AddCurrentToPlaylist(playlist) => self.add_current_to_playlist(playlist)?,
            Intent::ClosePlaylistDialog => self.set_dialog(None),
            Intent::ExportPlaylist(playlist) => {
                self.export_playlist(playlist)?;
            }
            Intent::DownloadCurrent => {
                self.download_current()?;
            }
        }
        Ok(())
    }

    fn modal_action(&mut self, action: ModalAction) {
        let scope = self.visible_tracks();
        let mut modal = self.modal;
        if modal.apply(action, &scope) {
            self.set_modal(modal);
        }
    }

    fn select_view(&mut self, view: ViewScope) {
        if let ViewScope::Playlist(index) = view
            && self.playlists.get(index).is_none()
        {
            tracing::warn!(index, "select view ignored: unknown playlist");
            return;
        }
        self.view = view;
        self.emit(SessionEvent::ViewChanged(view));
        if self.menu_open {
            self.menu_open = false;
            self.emit(SessionEvent::MenuToggled(false));
        }
    }

    fn create_playlist(&mut self) -> Result<()> {
        let Some(name) = self.dialog.as_ref().map(|dialog| dialog.draft_name.clone()) else {
            return Ok(());
        };
        if self.playlists.create(&name)? {
            if let Some(dialog) = self.dialog.as_mut() {
                dialog.draft_name.clear();
            }
            self.emit(SessionEvent::PlaylistsChanged);
            let snapshot = self.dialog.clone();
            self.emit(SessionEvent::PlaylistDialogChanged(snapshot));
        }
        Ok(())
    }

    fn add_current_to_playlist(&mut self, playlist: usize) -> Result<()> {
        let track = self.player.state().current_track;
        if !self.catalog.contains_index(track) {
            self.set_dialog(None);
            return Ok(());
        }
        let outcome = self.playlists.add_track(playlist, track)?;
        self.emit(SessionEvent::TrackAdded { playlist, outcome });
        if outcome == AddOutcome::Added {
            self.emit(SessionEvent::PlaylistsChanged);
        }
        self.set_dialog(None);
        Ok(())
    }

    pub fn export_playlist(&mut self, playlist: usize) -> Result<Option<PathBuf>> {
        let Some(export) = self.playlists.export(playlist, &self.catalog) else {
            tracing::warn!(playlist, "export ignored: unknown playlist");
            return Ok(None);
        };
        let path = export.write_to(&self.export_dir)?;
        self.emit(SessionEvent::Exported(path.clone()));
        Ok(Some(path))
    }

    pub fn download_current(&mut self) -> Result<Option<PathBuf>> {
        let Some(track) = self.catalog.get(self.player.state().current_track) else {
            return Ok(None);
        };
        if track.audio_url.is_empty() {
            return Ok(None);
        }
        let uri = track.audio_url.clone();
        let dir = self.export_dir.clone();
        let path = dir.join(track.download_file_name());
        let target = path.clone();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = audio::fetch_bytes(&uri).and_then(|bytes| {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                fs::write(&target, bytes)
                    .with_context(|| format!("failed to write {}", target.display()))?;
                Ok(target)
            });
            let _ = tx.send(result);
        });
        self.downloads.push(rx);
        tracing::debug!(path = %path.display(), "download started");
        Ok(Some(path))
    }

    fn poll_downloads(&mut self) {
        let mut finished = Vec::new();
        self.downloads.retain(|rx| match rx.try_recv() {
            Ok(result) => {
                finished.push(result);
                false
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Disconnected) => {
                finished.push(Err(anyhow!("download worker stopped")));
                false
            }
        });
        for result in finished {
            match result {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "track downloaded");
                    self.emit(SessionEvent::Downloaded(path));
                }
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "download failed");
                    self.emit(SessionEvent::DownloadFailed(format!("{err:#}")));
                }
            }
        }
    }

    fn set_modal(&mut self, modal: TrackModal) {
        self.modal = modal;
        self.emit(SessionEvent::ModalChanged(modal));
    }

    fn set_dialog(&mut self, dialog: Option<PlaylistDialog>) {
        self.dialog = dialog;
        let snapshot = self.dialog.clone();
        self.emit(SessionEvent::PlaylistDialogChanged(snapshot));
    }

    fn forward_player_events(&mut self) {
        while let Ok(event) = self.player_events.try_recv() {
            self.emit(SessionEvent::Player(event));
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
