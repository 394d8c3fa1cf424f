use crate::audio::{AudioEngine, NullAudioEngine, RodioAudioEngine};
use crate::catalog::Catalog;
use crate::config::{self, AppConfig};
use crate::logging;
use crate::navigation::{ModalGesture, ModalKey, ViewScope, wrap_next, wrap_previous};
use crate::player::PlayerController;
use crate::playlists::PlaylistStore;
use crate::session::{Intent, Session, SessionEvent};
use crate::storage::{FileStore, KeyValueStore};
use crate::view::{self, ViewContext};
use anyhow::{Context, Result, bail};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::Rect;
use std::io::stdout;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const REDRAW_EVERY: Duration = Duration::from_millis(250);
const SEEK_STEP_SECONDS: f64 = 5.0;
const VOLUME_STEP: f32 = 0.05;
const SWIPE_COLUMNS: i32 = 6;
const DISMISS_ROWS: i32 = 3;

const HELP: &str = "Commands: play [n] | pause | next | prev | seek <s> | vol <0-100> | shuffle | repeat | open <n> | close | view <all|n> | menu | add | name <text> | create | addto <n> | export <n> | download | quit";

#[derive(Debug, Default)]
pub struct AppStartupOptions {
    pub catalog_path: Option<PathBuf>,
    pub null_audio: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Intent(Intent),
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Default)]
struct UiState {
    cursor: usize,
    dialog_cursor: usize,
    command_mode: bool,
    command_buffer: String,
    status: String,
    drag_start: Option<(u16, u16)>,
    area: Rect,
    dirty: bool,
}

impl UiState {
    fn context(&self) -> ViewContext<'_> {
        ViewContext {
            cursor: self.cursor,
            dialog_cursor: self.dialog_cursor,
            status: &self.status,
            command: self.command_mode.then_some(self.command_buffer.as_str()),
        }
    }
}

pub fn run_with_startup(options: AppStartupOptions) -> Result<()> {
    let mut config = AppConfig::from_env()?;
    if options.catalog_path.is_some() {
        config.catalog_path = options.catalog_path;
    }
    config::ensure_dir(&config.config_root)?;
    let _log_guard = logging::init_logging(&config.log_dir())?;

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path, &config.prefix_path)?,
        None => Catalog::bundled(&config.prefix_path)?,
    };
    let playlists = PlaylistStore::load(FileStore::new(config.storage_dir()))
        .context("failed to load playlists")?;
    let audio = open_audio(options.null_audio);

    let player = PlayerController::new(catalog, audio);
    let mut session = Session::new(player, playlists, config.export_dir.clone());
    let events = session.subscribe();

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut ui = UiState {
        status: String::from("Press : for commands, Ctrl+C to quit"),
        dirty: true,
        ..UiState::default()
    };
    let mut last_draw = Instant::now();

    let result: Result<()> = loop {
        session.tick();
        for event in events.try_iter() {
            if let SessionEvent::ViewChanged(_) = event {
                ui.cursor = 0;
            }
            if let Some(line) = view::describe_event(&session, &event) {
                ui.status = line;
            }
            ui.dirty = true;
        }

        if ui.dirty || last_draw.elapsed() > REDRAW_EVERY {
            terminal.draw(|frame| {
                ui.area = frame.area();
                view::draw(frame, &session, &ui.context());
            })?;
            ui.dirty = false;
            last_draw = Instant::now();
        }

        if !event::poll(Duration::from_millis(33))? {
            continue;
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if handle_key(&mut session, &mut ui, key) == Flow::Quit {
                    break Ok(());
                }
            }
            Event::Mouse(mouse) => handle_mouse(&mut session, &mut ui, mouse),
            Event::Resize(..) => ui.dirty = true,
            _ => {}
        }
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    session.teardown();
    tracing::info!("session closed");
    result
}

fn open_audio(null_audio: bool) -> Box<dyn AudioEngine> {
    if null_audio {
        return Box::new(NullAudioEngine::new());
    }
    match RodioAudioEngine::new() {
        Ok(engine) => Box::new(engine),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "no audio output, using null engine");
            Box::new(NullAudioEngine::new())
        }
    }
}

fn apply<A: AudioEngine, S: KeyValueStore>(
    session: &mut Session<A, S>,
    ui: &mut UiState,
    intent: Intent,
) {
    if let Err(err) = session.dispatch(intent) {
        tracing::error!(error = %format!("{err:#}"), "intent failed");
        ui.status = format!("error: {err:#}");
    }
}

fn handle_key<A: AudioEngine, S: KeyValueStore>(
    session: &mut Session<A, S>,
    ui: &mut UiState,
    key: KeyEvent,
) -> Flow {
    ui.dirty = true;
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Flow::Quit;
    }
    if ui.command_mode {
        return command_key(session, ui, key.code);
    }
    if session.dialog().is_some() {
        dialog_key(session, ui, key.code);
    } else if session.modal().is_open() {
        modal_key(session, ui, key.code);
    } else {
        grid_key(session, ui, key.code);
    }
    Flow::Continue
}

fn command_key<A: AudioEngine, S: KeyValueStore>(
    session: &mut Session<A, S>,
    ui: &mut UiState,
    code: KeyCode,
) -> Flow {
    match code {
        KeyCode::Esc => {
            ui.command_mode = false;
            ui.command_buffer.clear();
        }
        KeyCode::Enter => {
            let raw = std::mem::take(&mut ui.command_buffer);
            ui.command_mode = false;
            match parse_command(&raw) {
                Ok(Command::Quit) => return Flow::Quit,
                Ok(Command::Help) => ui.status = String::from(HELP),
                Ok(Command::Intent(intent)) => apply(session, ui, intent),
                Err(err) => ui.status = err.to_string(),
            }
        }
        KeyCode::Backspace => {
            ui.command_buffer.pop();
        }
        KeyCode::Char(ch) => ui.command_buffer.push(ch),
        _ => {}
    }
    Flow::Continue
}

fn dialog_key<A: AudioEngine, S: KeyValueStore>(
    session: &mut Session<A, S>,
    ui: &mut UiState,
    code: KeyCode,
) {
    let draft = session
        .dialog()
        .map(|dialog| dialog.draft_name.clone())
        .unwrap_or_default();
    let playlists = session.playlists().len();
    match code {
        KeyCode::Esc => apply(session, ui, Intent::ClosePlaylistDialog),
        KeyCode::Down => {
            ui.dialog_cursor = wrap_next(ui.dialog_cursor, playlists).unwrap_or(0);
        }
        KeyCode::Up => {
            ui.dialog_cursor = wrap_previous(ui.dialog_cursor, playlists).unwrap_or(0);
        }
        KeyCode::Enter if !draft.trim().is_empty() => apply(session, ui, Intent::CreatePlaylist),
        KeyCode::Enter => apply(session, ui, Intent::AddCurrentToPlaylist(ui.dialog_cursor)),
        KeyCode::Backspace => {
            let mut name = draft;
            name.pop();
            apply(session, ui, Intent::SetDraftPlaylistName(name));
        }
        KeyCode::Char(ch) => {
            let mut name = draft;
            name.push(ch);
            apply(session, ui, Intent::SetDraftPlaylistName(name));
        }
        _ => {}
    }
}

fn modal_key<A: AudioEngine, S: KeyValueStore>(
    session: &mut Session<A, S>,
    ui: &mut UiState,
    code: KeyCode,
) {
    let intent = match code {
        KeyCode::Left => Intent::ModalKey(ModalKey::ArrowLeft),
        KeyCode::Right => Intent::ModalKey(ModalKey::ArrowRight),
        KeyCode::Esc => Intent::ModalKey(ModalKey::Escape),
        KeyCode::Enter | KeyCode::Char('p') => Intent::PlaySelected,
        KeyCode::Char(' ') => Intent::TogglePlayPause,
        KeyCode::Char(':') => {
            ui.command_mode = true;
            return;
        }
        _ => return,
    };
    apply(session, ui, intent);
}

fn grid_key<A: AudioEngine, S: KeyValueStore>(
    session: &mut Session<A, S>,
    ui: &mut UiState,
    code: KeyCode,
) {
    let visible = session.visible_tracks();
    let state = *session.player().state();
    let intent = match code {
        KeyCode::Down => {
            ui.cursor = wrap_next(ui.cursor, visible.len()).unwrap_or(0);
            return;
        }
        KeyCode::Up => {
            ui.cursor = wrap_previous(ui.cursor, visible.len()).unwrap_or(0);
            return;
        }
        KeyCode::Enter => match visible.get(ui.cursor) {
            Some(&index) => Intent::SelectTrack(index),
            None => return,
        },
        KeyCode::Char('p') => match visible.get(ui.cursor) {
            Some(&index) => Intent::PlayTrack(index),
            None => return,
        },
        KeyCode::Char(' ') => Intent::TogglePlayPause,
        KeyCode::Char('n') => Intent::Next,
        KeyCode::Char('b') => Intent::Previous,
        KeyCode::Right => Intent::Seek(state.current_time + SEEK_STEP_SECONDS),
        KeyCode::Left => Intent::Seek(state.current_time - SEEK_STEP_SECONDS),
        KeyCode::Char('+') | KeyCode::Char('=') => Intent::SetVolume(state.volume + VOLUME_STEP),
        KeyCode::Char('-') => Intent::SetVolume(state.volume - VOLUME_STEP),
        KeyCode::Char('s') => Intent::ToggleShuffle,
        KeyCode::Char('r') => Intent::ToggleRepeat,
        KeyCode::Char('o') => Intent::OpenCurrentTrack,
        KeyCode::Char('m') => Intent::ToggleMenu,
        KeyCode::Char('a') => {
            ui.dialog_cursor = 0;
            Intent::OpenPlaylistDialog
        }
        KeyCode::Char('d') => Intent::DownloadCurrent,
        KeyCode::Char('e') => match session.view() {
            ViewScope::Playlist(index) => Intent::ExportPlaylist(index),
            ViewScope::AllMusic => {
                ui.status = String::from("Open a playlist view to export it");
                return;
            }
        },
        KeyCode::Tab => Intent::SelectView(next_view(session.view(), session.playlists().len())),
        KeyCode::Char(':') => {
            ui.command_mode = true;
            return;
        }
        _ => return,
    };
    apply(session, ui, intent);
}

fn next_view(view: ViewScope, playlists: usize) -> ViewScope {
    match view {
        ViewScope::AllMusic if playlists > 0 => ViewScope::Playlist(0),
        ViewScope::Playlist(index) if index + 1 < playlists => ViewScope::Playlist(index + 1),
        _ => ViewScope::AllMusic,
    }
}

fn handle_mouse<A: AudioEngine, S: KeyValueStore>(
    session: &mut Session<A, S>,
    ui: &mut UiState,
    mouse: MouseEvent,
) {
    let point = (mouse.column, mouse.row);
    let modal_open = session.modal().is_open();
    match mouse.kind {
        MouseEventKind::ScrollDown if !modal_open => {
            ui.cursor = wrap_next(ui.cursor, session.visible_tracks().len()).unwrap_or(0);
            ui.dirty = true;
        }
        MouseEventKind::ScrollUp if !modal_open => {
            ui.cursor = wrap_previous(ui.cursor, session.visible_tracks().len()).unwrap_or(0);
            ui.dirty = true;
        }
        MouseEventKind::Down(MouseButton::Left) if modal_open => {
            if point_in_rect(point, view::modal_area(ui.area)) {
                ui.drag_start = Some(point);
            } else {
                apply(session, ui, Intent::ModalGesture(ModalGesture::OutsideClick));
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if let Some(start) = ui.drag_start
                && let Some(gesture) = classify_drag(start, point)
            {
                ui.drag_start = None;
                apply(session, ui, Intent::ModalGesture(gesture));
            }
        }
        MouseEventKind::Up(_) => ui.drag_start = None,
        _ => {}
    }
}

// Vertical travel dismisses before horizontal travel navigates.
fn classify_drag(start: (u16, u16), end: (u16, u16)) -> Option<ModalGesture> {
    let dx = i32::from(end.0) - i32::from(start.0);
    let dy = i32::from(end.1) - i32::from(start.1);
    if dy.abs() >= DISMISS_ROWS {
        return Some(ModalGesture::DragDismiss);
    }
    if dx.abs() < SWIPE_COLUMNS || dx.abs() <= dy.abs() {
        return None;
    }
    Some(if dx < 0 {
        ModalGesture::SwipeLeft
    } else {
        ModalGesture::SwipeRight
    })
}

fn point_in_rect((x, y): (u16, u16), rect: Rect) -> bool {
    if rect.width == 0 || rect.height == 0 {
        return false;
    }
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

fn parse_command(raw: &str) -> Result<Command> {
    let input = raw.trim();
    if input.is_empty() {
        bail!("No command");
    }

    let mut split = input.splitn(2, char::is_whitespace);
    let command = split.next().unwrap_or_default();
    let rest = split.next().unwrap_or("").trim();

    let intent = match command {
        "help" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        "play" if rest.is_empty() => Intent::Play,
        "play" => Intent::PlayTrack(parse_index(rest, "play <track>")?),
        "pause" => Intent::Pause,
        "toggle" => Intent::TogglePlayPause,
        "next" => Intent::Next,
        "prev" | "previous" => Intent::Previous,
        "seek" => {
            let seconds: f64 = rest
                .parse()
                .map_err(|_| anyhow::anyhow!("Usage: seek <seconds>"))?;
            Intent::Seek(seconds)
        }
        "vol" | "volume" => {
            let percent: f32 = rest
                .parse()
                .map_err(|_| anyhow::anyhow!("Usage: vol <0-100>"))?;
            Intent::SetVolume(percent / 100.0)
        }
        "shuffle" => Intent::ToggleShuffle,
        "repeat" => Intent::ToggleRepeat,
        "open" => Intent::SelectTrack(parse_index(rest, "open <track>")?),
        "current" => Intent::OpenCurrentTrack,
        "close" => Intent::CloseModal,
        "view" => match rest {
            "all" | "" => Intent::SelectView(ViewScope::AllMusic),
            other => Intent::SelectView(ViewScope::Playlist(parse_index(
                other,
                "view <all|playlist>",
            )?)),
        },
        "menu" => Intent::ToggleMenu,
        "add" => Intent::OpenPlaylistDialog,
        "name" => Intent::SetDraftPlaylistName(rest.to_string()),
        "create" => Intent::CreatePlaylist,
        "addto" => Intent::AddCurrentToPlaylist(parse_index(rest, "addto <playlist>")?),
        "cancel" => Intent::ClosePlaylistDialog,
        "export" => Intent::ExportPlaylist(parse_index(rest, "export <playlist>")?),
        "download" => Intent::DownloadCurrent,
        _ => bail!("Unknown command. Use :help"),
    };
    Ok(Command::Intent(intent))
}

fn parse_index(raw: &str, usage: &str) -> Result<usize> {
    raw.parse().map_err(|_| anyhow::anyhow!("Usage: {usage}"))
}
