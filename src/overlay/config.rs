use std::time::Duration;

use crate::window_api::Key;

use super::input::Chord;

pub const DEFAULT_WINDOW_TITLE: &str = "Stintbar";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_RELEASE_POLLS: u32 = 2;
pub const DEFAULT_STATUS_PERIOD: Duration = Duration::from_secs(1);

/// Window sizes of the two visibility modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayLayout {
    pub normal_size: (u32, u32),
    pub mini_size: (u32, u32),
    /// Distance between the top of the screen and the mini bar.
    pub mini_top_margin: i32,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            normal_size: (300, 220),
            mini_size: (450, 40),
            mini_top_margin: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Title of the window the surface attaches to.
    pub window_title: String,
    pub poll_interval: Duration,
    /// Consecutive released polls needed before a chord can fire again.
    pub release_polls: u32,
    pub status_period: Duration,
    pub lock_chord: Chord,
    pub mini_chord: Chord,
    pub layout: OverlayLayout,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            window_title: DEFAULT_WINDOW_TITLE.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            release_polls: DEFAULT_RELEASE_POLLS,
            status_period: DEFAULT_STATUS_PERIOD,
            lock_chord: Chord::new([Key::Control, Key::Shift, Key::Letter('L')]),
            mini_chord: Chord::new([Key::Control, Key::Shift, Key::Letter('K')]),
            layout: OverlayLayout::default(),
        }
    }
}
