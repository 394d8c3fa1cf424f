pub fn wrap_next(current: usize, len: usize) -> Option<usize> {
    (len > 0).then(|| (current % len + 1) % len)
}

pub fn wrap_previous(current: usize, len: usize) -> Option<usize> {
    (len > 0).then(|| (current % len + len - 1) % len)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewScope {
    #[default]
    AllMusic,
    Playlist(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalKey {
    ArrowLeft,
    ArrowRight,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalGesture {
    SwipeLeft,
    SwipeRight,
    DragDismiss,
    OutsideClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalAction {
    Navigate(Direction),
    Close,
}

impl From<ModalKey> for ModalAction {
    fn from(key: ModalKey) -> Self {
        match key {
            ModalKey::ArrowLeft => Self::Navigate(Direction::Previous),
            ModalKey::ArrowRight => Self::Navigate(Direction::Next),
            ModalKey::Escape => Self::Close,
        }
    }
}

impl From<ModalGesture> for ModalAction {
    fn from(gesture: ModalGesture) -> Self {
        match gesture {
            ModalGesture::SwipeLeft => Self::Navigate(Direction::Next),
            ModalGesture::SwipeRight => Self::Navigate(Direction::Previous),
            ModalGesture::DragDismiss | ModalGesture::OutsideClick => Self::Close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackModal {
    #[default]
    Closed,
    Open {
        selected: usize,
    },
    Navigated {
        selected: usize,
    },
}

impl TrackModal {
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Closed)
    }

    pub fn selected_or(self, playing: usize) -> usize {
        match self {
            Self::Closed => playing,
            Self::Open { selected } | Self::Navigated { selected } => selected,
        }
    }

    pub fn open(&mut self, track: usize) {
        *self = Self::Open { selected: track };
    }

    pub fn close(&mut self) {
        *self = Self::Closed;
    }

    // Moves the selection through `scope` (catalog indices in display order).
    // A selection outside the scope enters it at the first or last entry.
    pub fn navigate(&mut self, direction: Direction, scope: &[usize]) -> bool {
        let selected = match *self {
            Self::Closed => return false,
            Self::Open { selected } | Self::Navigated { selected } => selected,
        };
        if scope.is_empty() {
            return false;
        }

        let position = scope.iter().position(|&track| track == selected);
        let next_position = match (position, direction) {
            (Some(pos), Direction::Next) => wrap_next(pos, scope.len()),
            (Some(pos), Direction::Previous) => wrap_previous(pos, scope.len()),
            (None, Direction::Next) => Some(0),
            (None, Direction::Previous) => Some(scope.len() - 1),
        };
        let Some(next_position) = next_position else {
            return false;
        };

        *self = Self::Navigated {
            selected: scope[next_position],
        };
        true
    }

    pub fn apply(&mut self, action: ModalAction, scope: &[usize]) -> bool {
        match action {
            ModalAction::Navigate(direction) => self.navigate(direction, scope),
            ModalAction::Close => {
                let was_open = self.is_open();
                self.close();
                was_open
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    Playing { track: usize },
    Browsing { selected: usize, playing: bool },
}

impl SessionMode {
    pub fn from_parts(modal: TrackModal, current: usize, is_playing: bool) -> Self {
        match modal {
            TrackModal::Open { selected } | TrackModal::Navigated { selected } => Self::Browsing {
                selected,
                playing: is_playing,
            },
            TrackModal::Closed if is_playing => Self::Playing { track: current },
            TrackModal::Closed => Self::Idle,
        }
    }
}
