#![no_main]

use libfuzzer_sys::fuzz_target;
use mrmusic::audio::NullAudioEngine;
use mrmusic::catalog::Catalog;
use mrmusic::model::Track;
use mrmusic::navigation::{Direction, ModalGesture, ModalKey, ViewScope};
use mrmusic::player::PlayerController;
use mrmusic::playlists::PlaylistStore;
use mrmusic::session::{Intent, Session};
use mrmusic::storage::MemoryStore;

fuzz_target!(|data: &[u8]| {
    let Some((&len, data)) = data.split_first() else {
        return;
    };
    let len = usize::from(len % 8);
    let catalog = Catalog::from_tracks(
        (0..len)
            .map(|idx| Track {
                title: format!("track {idx}"),
                artist: String::from("fuzz"),
                album: None,
                cover_url: String::new(),
                audio_url: format!("track_{idx}.mp3"),
            })
            .collect(),
    );
    let Ok(playlists) = PlaylistStore::load(MemoryStore::new()) else {
        return;
    };
    let player = PlayerController::new(catalog, NullAudioEngine::new());
    let mut session = Session::new(player, playlists, std::env::temp_dir());

    for pair in data.chunks(2) {
        let arg = usize::from(pair.get(1).copied().unwrap_or_default() % 10);
        let intent = match pair[0] % 20 {
            0 => Intent::TogglePlayPause,
            1 => Intent::Next,
            2 => Intent::Previous,
            3 => Intent::Seek(arg as f64 * 7.5 - 10.0),
            4 => Intent::SetVolume(arg as f32 / 4.0 - 0.5),
            5 => Intent::ToggleShuffle,
            6 => Intent::ToggleRepeat,
            7 => Intent::PlayTrack(arg),
            8 => Intent::SelectTrack(arg),
            9 => Intent::OpenCurrentTrack,
            10 => Intent::ModalNavigate(Direction::Next),
            11 => Intent::ModalKey(ModalKey::ArrowLeft),
            12 => Intent::ModalGesture(ModalGesture::SwipeLeft),
            13 => Intent::ModalKey(ModalKey::Escape),
            14 => Intent::PlaySelected,
            15 => Intent::SelectView(ViewScope::Playlist(arg % 3)),
            16 => Intent::SelectView(ViewScope::AllMusic),
            17 => Intent::OpenPlaylistDialog,
            18 => Intent::SetDraftPlaylistName(format!("list {arg}")),
            _ => {
                if arg % 2 == 0 {
                    Intent::CreatePlaylist
                } else {
                    Intent::AddCurrentToPlaylist(arg % 3)
                }
            }
        };
        let _ = session.dispatch(intent);
        session.tick();

        let state = session.player().state();
        if len > 0 {
            assert!(state.current_track < len);
            assert!(session.selected_track() < len);
        }
        assert!((0.0..=1.0).contains(&state.volume));
        for playlist in session.playlists().playlists() {
            let mut tracks = playlist.tracks.clone();
            tracks.sort_unstable();
            tracks.dedup();
            assert_eq!(tracks.len(), playlist.tracks.len());
        }
    }
    session.teardown();
});
