//! Contains the seams between the overlay core and the host windowing system.
//! [InputSource] and [WindowSurface] are what the core talks to, [connect] picks the
//! implementation for the current build.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

pub mod power;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::collections::HashSet;

use anyhow::Result;

/// Opaque identity of a top-level window, used to tell whether the overlay has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// Logical keys the overlay chords are made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Control,
    Shift,
    Alt,
    /// An ASCII letter, case insensitive.
    Letter(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    pub percent: u8,
    pub charging: bool,
}

/// Polled global keyboard and focus state.
#[cfg_attr(test, mockall::automock)]
pub trait InputSource: Send {
    /// Which of `keys` are held right now, read from a single snapshot of the keyboard.
    fn pressed_keys(&mut self, keys: &[Key]) -> Result<HashSet<Key>>;

    /// Window currently receiving keyboard input, if there is one.
    fn foreground_window(&mut self) -> Result<Option<WindowId>>;
}

/// Styling primitives applied to the overlay window. Every call is advisory; callers are
/// expected to retry on the next cycle.
#[cfg_attr(test, mockall::automock)]
pub trait WindowSurface: Send {
    /// `None` while the overlay window doesn't exist yet.
    fn own_window(&mut self) -> Result<Option<WindowId>>;

    fn set_opacity(&mut self, alpha: u8) -> Result<()>;

    /// Lets pointer input pass through to whatever is below the overlay.
    fn set_click_through(&mut self, enabled: bool) -> Result<()>;

    fn set_always_on_top(&mut self) -> Result<()>;

    fn geometry(&mut self) -> Result<Geometry>;

    fn screen_size(&mut self) -> Result<(u32, u32)>;

    fn move_and_resize(&mut self, geometry: Geometry) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
pub trait BatteryProbe: Send {
    /// `None` if the machine has no battery.
    fn battery(&mut self) -> Result<Option<BatteryStatus>>;
}

/// Input source for environments without a window system. Nothing is ever pressed.
pub struct HeadlessInput;

impl InputSource for HeadlessInput {
    fn pressed_keys(&mut self, _keys: &[Key]) -> Result<HashSet<Key>> {
        Ok(HashSet::new())
    }

    fn foreground_window(&mut self) -> Result<Option<WindowId>> {
        Ok(None)
    }
}

/// Surface for environments without a window system. The overlay window never shows up, so
/// the controller never styles anything.
pub struct HeadlessSurface;

impl WindowSurface for HeadlessSurface {
    fn own_window(&mut self) -> Result<Option<WindowId>> {
        Ok(None)
    }

    fn set_opacity(&mut self, _alpha: u8) -> Result<()> {
        Ok(())
    }

    fn set_click_through(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn set_always_on_top(&mut self) -> Result<()> {
        Ok(())
    }

    fn geometry(&mut self) -> Result<Geometry> {
        Ok(Geometry {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        })
    }

    fn screen_size(&mut self) -> Result<(u32, u32)> {
        Ok((0, 0))
    }

    fn move_and_resize(&mut self, _geometry: Geometry) -> Result<()> {
        Ok(())
    }
}

/// Everything the overlay needs from the host system.
pub struct PlatformHandles {
    pub input: Box<dyn InputSource>,
    pub surface: Box<dyn WindowSurface>,
    pub battery: Option<Box<dyn BatteryProbe>>,
}

impl PlatformHandles {
    pub fn headless() -> Self {
        Self {
            input: Box::new(HeadlessInput),
            surface: Box::new(HeadlessSurface),
            battery: power::default_probe(),
        }
    }
}

/// Connects to the window system the crate was built for. `window_title` is the title of the
/// overlay window the surface should attach to.
pub fn connect(window_title: &str) -> Result<PlatformHandles> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "win")] {
            use win::{WindowsBattery, WindowsInput, WindowsSurface};
            Ok(PlatformHandles {
                input: Box::new(WindowsInput::new()),
                surface: Box::new(WindowsSurface::new(window_title)),
                battery: Some(Box::new(WindowsBattery)),
            })
        }
        else if #[cfg(feature = "x11")] {
            use x11::{X11Input, X11Surface};
            Ok(PlatformHandles {
                input: Box::new(X11Input::new()?),
                surface: Box::new(X11Surface::new(window_title)?),
                battery: power::default_probe(),
            })
        }
        else {
            tracing::warn!("No window system was enabled at build time, running headless for {window_title:?}");
            Ok(PlatformHandles::headless())
        }
    }
}
