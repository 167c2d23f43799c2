//! Owns the overlay's presentation state and keeps the window in line with it.
//!
//! Window styling is best effort. Whatever did not stick is tried again on the next input
//! sample.

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::window_api::{Geometry, WindowId, WindowSurface};

use super::{
    config::OverlayLayout,
    input::{Chord, InputSample},
};

pub const OPACITY_FOCUSED: u8 = 255;
pub const OPACITY_UNFOCUSED: u8 = 180;
pub const OPACITY_CLICK_THROUGH: u8 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Normal,
    Mini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    Unlocked,
    /// Pointer input passes through the overlay.
    ClickThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    Focused,
    #[default]
    Unfocused,
}

pub fn opacity_for(lock: LockMode, focus: Focus) -> u8 {
    match (lock, focus) {
        (LockMode::ClickThrough, _) => OPACITY_CLICK_THROUGH,
        (LockMode::Unlocked, Focus::Focused) => OPACITY_FOCUSED,
        (LockMode::Unlocked, Focus::Unfocused) => OPACITY_UNFOCUSED,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayState {
    pub visibility: Visibility,
    pub lock: LockMode,
    pub focus: Focus,
    pub opacity: u8,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            visibility: Visibility::default(),
            lock: LockMode::default(),
            focus: Focus::default(),
            opacity: opacity_for(LockMode::default(), Focus::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

pub const UNLOCKED_TINT: Rgba = Rgba(18, 18, 18, 245);
pub const CLICK_THROUGH_TINT: Rgba = Rgba(50, 0, 0, 150);

/// What front ends render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayView {
    pub state: OverlayState,
    pub tint: Rgba,
    /// Shown while locked, so the user knows how to get out.
    pub lock_label: Option<String>,
}

pub struct OverlayController {
    surface: Box<dyn WindowSurface>,
    layout: OverlayLayout,
    state: OverlayState,
    lock_label: String,
    view: watch::Sender<OverlayView>,

    window: Option<WindowId>,
    on_top: bool,
    applied_click_through: Option<bool>,
    layout_pending: bool,
    normal_geometry: Option<Geometry>,
}

impl OverlayController {
    pub fn new(surface: Box<dyn WindowSurface>, layout: OverlayLayout, lock_chord: &Chord) -> Self {
        let state = OverlayState::default();
        let lock_label = format!("LOCKED ({lock_chord} to unlock)");
        let (view, _) = watch::channel(Self::view_of(state, &lock_label));
        Self {
            surface,
            layout,
            state,
            lock_label,
            view,
            window: None,
            on_top: false,
            applied_click_through: None,
            layout_pending: false,
            normal_geometry: None,
        }
    }

    fn view_of(state: OverlayState, lock_label: &str) -> OverlayView {
        match state.lock {
            LockMode::Unlocked => OverlayView {
                state,
                tint: UNLOCKED_TINT,
                lock_label: None,
            },
            LockMode::ClickThrough => OverlayView {
                state,
                tint: CLICK_THROUGH_TINT,
                lock_label: Some(lock_label.to_string()),
            },
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<OverlayView> {
        self.view.subscribe()
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Looks the window up again every cycle so a recreated window gets restyled.
    fn attach(&mut self) {
        match self.surface.own_window() {
            Ok(window) if window != self.window => {
                if let Some(id) = window {
                    info!("Overlay window is available {:?}", id);
                }
                self.window = window;
                self.on_top = false;
                self.applied_click_through = None;
            }
            Ok(_) => (),
            Err(e) => debug!("Failed to look up the overlay window {e:?}"),
        }
    }

    fn toggle_lock(&mut self) {
        self.state.lock = match self.state.lock {
            LockMode::Unlocked => LockMode::ClickThrough,
            LockMode::ClickThrough => LockMode::Unlocked,
        };
        info!("Lock mode is now {:?}", self.state.lock);
    }

    fn toggle_mini(&mut self) {
        self.state.visibility = match self.state.visibility {
            Visibility::Normal => {
                if self.window.is_some() {
                    match self.surface.geometry() {
                        Ok(geometry) => self.normal_geometry = Some(geometry),
                        Err(e) => debug!("Failed to remember the window geometry {e:?}"),
                    }
                }
                Visibility::Mini
            }
            Visibility::Mini => Visibility::Normal,
        };
        self.layout_pending = true;
        info!("Visibility is now {:?}", self.state.visibility);
    }

    fn target_geometry(&mut self) -> Result<Geometry> {
        match self.state.visibility {
            Visibility::Mini => {
                let (screen_width, _) = self.surface.screen_size()?;
                let (width, height) = self.layout.mini_size;
                Ok(Geometry {
                    x: (screen_width as i32 - width as i32) / 2,
                    y: self.layout.mini_top_margin,
                    width,
                    height,
                })
            }
            Visibility::Normal => {
                let anchor = match self.normal_geometry {
                    Some(geometry) => geometry,
                    None => self.surface.geometry()?,
                };
                let (width, height) = self.layout.normal_size;
                Ok(Geometry {
                    width,
                    height,
                    ..anchor
                })
            }
        }
    }

    fn sync_surface(&mut self) {
        if self.window.is_none() {
            return;
        }

        if !self.on_top {
            match self.surface.set_always_on_top() {
                Ok(()) => self.on_top = true,
                Err(e) => debug!("Failed to keep the overlay on top {e:?}"),
            }
        }

        let click_through = self.state.lock == LockMode::ClickThrough;
        if self.applied_click_through != Some(click_through) {
            match self.surface.set_click_through(click_through) {
                Ok(()) => self.applied_click_through = Some(click_through),
                Err(e) => debug!("Failed to set click through to {click_through} {e:?}"),
            }
        }

        if self.layout_pending {
            match self
                .target_geometry()
                .and_then(|geometry| self.surface.move_and_resize(geometry))
            {
                Ok(()) => self.layout_pending = false,
                Err(e) => debug!("Failed to apply the {:?} layout {e:?}", self.state.visibility),
            }
        }

        if let Err(e) = self.surface.set_opacity(self.state.opacity) {
            debug!("Failed to set opacity {} {e:?}", self.state.opacity);
        }
    }

    /// Applies one input sample. Also retries whatever styling has not stuck yet.
    pub fn handle(&mut self, sample: InputSample) {
        self.attach();

        if sample.lock_toggle {
            self.toggle_lock();
        }
        if sample.mini_toggle {
            self.toggle_mini();
        }

        self.state.focus = match (self.window, sample.foreground) {
            (Some(own), Some(foreground)) if own == foreground => Focus::Focused,
            _ => Focus::Unfocused,
        };
        self.state.opacity = opacity_for(self.state.lock, self.state.focus);

        self.sync_surface();

        let view = Self::view_of(self.state, &self.lock_label);
        self.view.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    /// Consumes samples until the sending side goes away.
    pub async fn run(mut self, mut samples: mpsc::Receiver<InputSample>) -> Result<()> {
        while let Some(sample) = samples.recv().await {
            self.handle(sample);
        }
        info!("Input closed, stopping the controller");
        Ok(())
    }
}
