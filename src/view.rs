use crate::audio::AudioEngine;
use crate::model::format_time;
use crate::navigation::{SessionMode, ViewScope};
use crate::player::PlayerEvent;
use crate::playlists::AddOutcome;
use crate::session::{Session, SessionEvent};
use crate::storage::KeyValueStore;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};

const APP_TITLE: &str = "Mr. Music  ";
const PROGRESS_WIDTH: usize = 24;
const WIDE_LAYOUT_COLUMNS: u16 = 100;

const BG: Color = Color::Rgb(12, 12, 18);
const PANEL_BG: Color = Color::Rgb(22, 22, 32);
const POPUP_BG: Color = Color::Rgb(30, 28, 44);
const BORDER: Color = Color::Rgb(122, 92, 196);
const TEXT: Color = Color::Rgb(232, 230, 245);
const MUTED: Color = Color::Rgb(150, 146, 178);
const ACCENT: Color = Color::Rgb(236, 92, 150);
const SELECTED_BG: Color = Color::Rgb(52, 44, 82);

pub struct ViewContext<'a> {
    pub cursor: usize,
    pub dialog_cursor: usize,
    pub status: &'a str,
    pub command: Option<&'a str>,
}

pub fn sidebar_visible(area: Rect, menu_open: bool) -> bool {
    menu_open || area.width >= WIDE_LAYOUT_COLUMNS
}

pub fn modal_area(area: Rect) -> Rect {
    centered_rect(area, 60, 50)
}

pub fn draw<A: AudioEngine, S: KeyValueStore>(
    frame: &mut Frame,
    session: &Session<A, S>,
    ctx: &ViewContext,
) {
    frame.render_widget(Block::default().style(Style::default().bg(BG)), frame.area());

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            APP_TITLE,
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("Tracks {}", session.catalog().len()),
            Style::default().fg(TEXT),
        ),
        Span::styled("  |  ", Style::default().fg(MUTED)),
        Span::styled(mode_label(session.mode()), Style::default().fg(MUTED)),
    ]))
    .block(panel_block("Status", PANEL_BG));
    frame.render_widget(header, vertical[0]);

    if sidebar_visible(frame.area(), session.menu_open()) {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(20)])
            .split(vertical[1]);
        draw_sidebar(frame, session, body[0]);
        draw_grid(frame, session, ctx.cursor, body[1]);
    } else {
        draw_grid(frame, session, ctx.cursor, vertical[1]);
    }

    let bar = Paragraph::new(Span::styled(player_bar(session), Style::default().fg(TEXT)))
        .block(panel_block("Player", PANEL_BG));
    frame.render_widget(bar, vertical[2]);

    let footer = match ctx.command {
        Some(command) => Line::from(vec![
            Span::styled(":", Style::default().fg(ACCENT)),
            Span::styled(command, Style::default().fg(TEXT)),
        ]),
        None => Line::from(vec![
            Span::styled(
                "Space play/pause, n/b next/prev, Enter open, p play, a add, Tab view, : command",
                Style::default().fg(MUTED),
            ),
            Span::styled("  |  ", Style::default().fg(MUTED)),
            Span::styled(ctx.status, Style::default().fg(TEXT)),
        ]),
    };
    frame.render_widget(
        Paragraph::new(footer).block(panel_block("Message", PANEL_BG)),
        vertical[3],
    );

    if session.modal().is_open() {
        draw_track_modal(frame, session);
    }
    if session.dialog().is_some() {
        draw_playlist_dialog(frame, session, ctx.dialog_cursor);
    }
}

pub fn player_bar<A: AudioEngine, S: KeyValueStore>(session: &Session<A, S>) -> String {
    let state = session.player().state();
    let Some(track) = session.catalog().get(state.current_track) else {
        return String::from("(no tracks)");
    };
    let flags = match (state.shuffle, state.repeat) {
        (true, true) => " [shuffle] [repeat]",
        (true, false) => " [shuffle]",
        (false, true) => " [repeat]",
        (false, false) => "",
    };
    format!(
        "{} {} - {}  {} {} {}  vol {}%{}",
        if state.is_playing { ">" } else { "||" },
        track.title,
        track.artist,
        format_time(state.current_time),
        progress_bar(state.progress_ratio(), PROGRESS_WIDTH),
        format_time(state.duration),
        (state.volume * 100.0).round() as u16,
        flags
    )
}

// Status-line text for events worth announcing; progress ticks are skipped.
pub fn describe_event<A: AudioEngine, S: KeyValueStore>(
    session: &Session<A, S>,
    event: &SessionEvent,
) -> Option<String> {
    let title = |index: usize| {
        session
            .catalog()
            .get(index)
            .map_or_else(|| String::from("track"), |track| track.title.clone())
    };
    let playlist_name = |index: usize| {
        session
            .playlists()
            .get(index)
            .map_or_else(|| String::from("playlist"), |playlist| playlist.name.clone())
    };
    match event {
        SessionEvent::Player(PlayerEvent::TrackChanged { index }) => {
            Some(format!("Now: {}", title(*index)))
        }
        SessionEvent::Player(PlayerEvent::PlayStateChanged { playing }) => {
            Some(String::from(if *playing { "Playing" } else { "Paused" }))
        }
        SessionEvent::Player(PlayerEvent::VolumeChanged { volume }) => {
            Some(format!("Volume: {}%", (volume * 100.0).round() as u16))
        }
        SessionEvent::Player(PlayerEvent::ModesChanged { shuffle, repeat }) => Some(format!(
            "Shuffle {}, repeat {}",
            on_off(*shuffle),
            on_off(*repeat)
        )),
        SessionEvent::Player(PlayerEvent::PlaybackFailed { index, .. }) => {
            Some(format!("cannot play \"{}\"", title(*index)))
        }
        SessionEvent::Player(PlayerEvent::Progress { .. }) => None,
        SessionEvent::ViewChanged(_) => Some(format!("Viewing {}", session.view_title())),
        SessionEvent::ModalChanged(_) | SessionEvent::MenuToggled(_) => None,
        SessionEvent::PlaylistDialogChanged(_) => None,
        SessionEvent::PlaylistsChanged => Some(format!(
            "{} playlists",
            session.playlists().len()
        )),
        SessionEvent::TrackAdded { playlist, outcome } => match outcome {
            AddOutcome::Added => Some(format!("Added to {}", playlist_name(*playlist))),
            AddOutcome::AlreadyPresent => {
                Some(format!("Already in {}", playlist_name(*playlist)))
            }
            AddOutcome::UnknownPlaylist => Some(String::from("No such playlist")),
        },
        SessionEvent::Exported(path) => Some(format!("Exported {}", path.display())),
        SessionEvent::Downloaded(path) => Some(format!("Saved {}", path.display())),
        SessionEvent::DownloadFailed(reason) => Some(format!("download failed: {reason}")),
    }
}

fn draw_sidebar<A: AudioEngine, S: KeyValueStore>(
    frame: &mut Frame,
    session: &Session<A, S>,
    area: Rect,
) {
    let entry = |label: String, active: bool| {
        let style = if active {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(TEXT)
        };
        ListItem::new(Span::styled(label, style))
    };

    let mut items = vec![
        entry(
            String::from("All Music"),
            session.view() == ViewScope::AllMusic,
        ),
        ListItem::new(Span::styled("Playlists", Style::default().fg(MUTED))),
    ];
    for (index, playlist) in session.playlists().playlists().iter().enumerate() {
        items.push(entry(
            format!("  {} ({})", playlist.name, playlist.tracks.len()),
            session.view() == ViewScope::Playlist(index),
        ));
    }
    frame.render_widget(
        List::new(items).block(panel_block("Library", PANEL_BG)),
        area,
    );
}

fn draw_grid<A: AudioEngine, S: KeyValueStore>(
    frame: &mut Frame,
    session: &Session<A, S>,
    cursor: usize,
    area: Rect,
) {
    let current = session.player().state().current_track;
    let visible = session.visible_tracks();
    let items: Vec<ListItem> = visible
        .iter()
        .filter_map(|&index| {
            let track = session.catalog().get(index)?;
            let marker = if index == current { "  > " } else { "    " };
            Some(ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(ACCENT)),
                Span::styled(track.title.as_str(), Style::default().fg(TEXT)),
                Span::styled(
                    format!("  {}", track.artist),
                    Style::default().fg(MUTED),
                ),
            ])))
        })
        .collect();

    let mut state = ListState::default();
    state.select((!visible.is_empty()).then_some(cursor.min(visible.len().saturating_sub(1))));

    let list = List::new(items)
        .block(panel_block(session.view_title(), PANEL_BG))
        .highlight_style(
            Style::default()
                .bg(SELECTED_BG)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_track_modal<A: AudioEngine, S: KeyValueStore>(frame: &mut Frame, session: &Session<A, S>) {
    let selected = session.selected_track();
    let Some(track) = session.catalog().get(selected) else {
        return;
    };
    let popup = modal_area(frame.area());
    frame.render_widget(Clear, popup);

    let visible = session.visible_tracks();
    let position = visible
        .iter()
        .position(|&index| index == selected)
        .map_or_else(|| String::from("-"), |at| (at + 1).to_string());
    let state = session.player().state();
    let playing_here = state.is_playing && state.current_track == selected;

    let mut lines = vec![
        Line::from(Span::styled(
            track.title.as_str(),
            Style::default().fg(TEXT).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            track.artist.as_str(),
            Style::default().fg(MUTED),
        )),
    ];
    if let Some(album) = &track.album {
        lines.push(Line::from(Span::styled(
            format!("Album  {album}"),
            Style::default().fg(MUTED),
        )));
    }
    lines.push(Line::from(Span::styled(
        format!("Cover  {}", track.cover_url),
        Style::default().fg(MUTED),
    )));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!(
            "Track {position} of {}{}",
            visible.len(),
            if playing_here { "  (playing)" } else { "" }
        ),
        Style::default().fg(ACCENT),
    )));
    lines.push(Line::from(Span::styled(
        "Left/Right browse, Enter play, Esc close",
        Style::default().fg(MUTED),
    )));

    frame.render_widget(
        Paragraph::new(lines)
            .block(panel_block("Track", POPUP_BG))
            .wrap(Wrap { trim: true }),
        popup,
    );
}

fn draw_playlist_dialog<A: AudioEngine, S: KeyValueStore>(
    frame: &mut Frame,
    session: &Session<A, S>,
    cursor: usize,
) {
    let Some(dialog) = session.dialog() else {
        return;
    };
    let popup = centered_rect(frame.area(), 50, 60);
    frame.render_widget(Clear, popup);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(popup);

    let items: Vec<ListItem> = session
        .playlists()
        .playlists()
        .iter()
        .map(|playlist| ListItem::new(Span::styled(playlist.name.as_str(), Style::default().fg(TEXT))))
        .collect();
    let mut state = ListState::default();
    if !items.is_empty() {
        state.select(Some(cursor.min(items.len() - 1)));
    }
    let list = List::new(items)
        .block(panel_block("Add to Playlist", POPUP_BG))
        .highlight_style(Style::default().bg(SELECTED_BG).add_modifier(Modifier::BOLD))
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, layout[0], &mut state);

    let input = Paragraph::new(Line::from(vec![
        Span::styled(dialog.draft_name.as_str(), Style::default().fg(TEXT)),
        Span::styled("_", Style::default().fg(ACCENT)),
    ]))
    .block(panel_block("New playlist (Enter create, Esc cancel)", POPUP_BG));
    frame.render_widget(input, layout[1]);
}

fn mode_label(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Idle => "Idle",
        SessionMode::Playing { .. } => "Playing",
        SessionMode::Browsing { .. } => "Browsing",
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn panel_block(title: &str, bg: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(TEXT).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(BORDER))
        .style(Style::default().bg(bg))
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width.saturating_sub(filled)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudioEngine;
    use crate::catalog::Catalog;
    use crate::model::Track;
    use crate::player::PlayerController;
    use crate::playlists::PlaylistStore;
    use crate::session::Intent;
    use crate::storage::MemoryStore;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn session() -> Session<NullAudioEngine, MemoryStore> {
        let catalog = Catalog::from_tracks(vec![
            Track {
                title: String::from("Paper Boats"),
                artist: String::from("Lumen Field"),
                album: Some(String::from("Harbor")),
                cover_url: String::from("/c/1.jpg"),
                audio_url: String::from("missing-1.mp3"),
            },
            Track {
                title: String::from("Slow Orbit"),
                artist: String::from("Kite Season"),
                album: None,
                cover_url: String::from("/c/2.jpg"),
                audio_url: String::from("missing-2.mp3"),
            },
        ]);
        Session::new(
            PlayerController::new(catalog, NullAudioEngine::new()),
            PlaylistStore::load(MemoryStore::new()).expect("load"),
            std::env::temp_dir(),
        )
    }

    fn render(session: &Session<NullAudioEngine, MemoryStore>, width: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, 30)).expect("terminal");
        terminal
            .draw(|frame| {
                draw(
                    frame,
                    session,
                    &ViewContext {
                        cursor: 0,
                        dialog_cursor: 0,
                        status: "ready",
                        command: None,
                    },
                )
            })
            .expect("draw");
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(None, 4), "[----]");
        assert_eq!(progress_bar(Some(0.5), 4), "[##--]");
        assert_eq!(progress_bar(Some(1.0), 4), "[####]");
    }

    #[test]
    fn player_bar_shows_track_and_flags() {
        let mut session = session();
        session.dispatch(Intent::ToggleRepeat).expect("repeat");
        let bar = player_bar(&session);
        assert!(bar.starts_with("|| Paper Boats - Lumen Field  0:00"));
        assert!(bar.ends_with("vol 70% [repeat]"));
    }

    #[test]
    fn grid_lists_visible_tracks() {
        let screen = render(&session(), 80);
        assert!(screen.contains("All Music"));
        assert!(screen.contains("Paper Boats"));
        assert!(screen.contains("Slow Orbit"));
        assert!(screen.contains("ready"));
    }

    #[test]
    fn sidebar_needs_width_or_open_menu() {
        let mut session = session();
        assert!(!render(&session, 80).contains("My Favorites"));
        assert!(render(&session, 120).contains("My Favorites (0)"));

        session.dispatch(Intent::ToggleMenu).expect("menu");
        assert!(render(&session, 80).contains("My Favorites (0)"));
    }

    #[test]
    fn modal_renders_only_when_open() {
        let mut session = session();
        assert!(!render(&session, 80).contains("Track 1 of 2"));
        session.dispatch(Intent::SelectTrack(0)).expect("select");
        let screen = render(&session, 80);
        assert!(screen.contains("Track 1 of 2"));
        assert!(screen.contains("Album  Harbor"));
    }

    #[test]
    fn dialog_shows_draft_name() {
        let mut session = session();
        session.dispatch(Intent::OpenPlaylistDialog).expect("open");
        session
            .dispatch(Intent::SetDraftPlaylistName(String::from("Night")))
            .expect("draft");
        let screen = render(&session, 80);
        assert!(screen.contains("Add to Playlist"));
        assert!(screen.contains("Night_"));
    }

    #[test]
    fn playback_failure_is_described_by_title() {
        let session = session();
        let event = SessionEvent::Player(PlayerEvent::PlaybackFailed {
            index: 1,
            reason: String::from("decode"),
        });
        assert_eq!(
            describe_event(&session, &event).as_deref(),
            Some("cannot play \"Slow Orbit\"")
        );
        let progress = SessionEvent::Player(PlayerEvent::Progress {
            current_time: 1.0,
            duration: 2.0,
        });
        assert_eq!(describe_event(&session, &progress), None);
    }
}
