use std::collections::HashSet;

use anyhow::{anyhow, Result};
use tracing::{debug, error};
use windows::{
    core::{HSTRING, PCWSTR},
    Win32::{
        Foundation::{COLORREF, HWND, RECT},
        System::Power::{GetSystemPowerStatus, SYSTEM_POWER_STATUS},
        UI::{
            Input::KeyboardAndMouse::{GetAsyncKeyState, VK_CONTROL, VK_MENU, VK_SHIFT},
            WindowsAndMessaging::{
                FindWindowW, GetForegroundWindow, GetSystemMetrics, GetWindowLongW,
                GetWindowRect, IsWindow, SetLayeredWindowAttributes, SetWindowLongW,
                SetWindowPos, GWL_EXSTYLE, HWND_TOPMOST, LWA_ALPHA, SM_CXSCREEN, SM_CYSCREEN,
                SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, WS_EX_LAYERED, WS_EX_TOOLWINDOW,
                WS_EX_TRANSPARENT,
            },
        },
    },
};

use super::{
    BatteryProbe, BatteryStatus, Geometry, InputSource, Key, WindowId, WindowSurface,
};

// HWND wraps a raw pointer and isn't Send, so handles are kept as plain integers.
fn to_hwnd(raw: isize) -> HWND {
    HWND(raw as *mut core::ffi::c_void)
}

fn from_hwnd(hwnd: HWND) -> isize {
    hwnd.0 as isize
}

fn virtual_key(key: Key) -> Result<i32> {
    match key {
        Key::Control => Ok(VK_CONTROL.0 as i32),
        Key::Shift => Ok(VK_SHIFT.0 as i32),
        Key::Alt => Ok(VK_MENU.0 as i32),
        // Virtual key codes of letters match their upper case ASCII.
        Key::Letter(c) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase() as i32),
        Key::Letter(c) => Err(anyhow!("No virtual key for {c:?}")),
    }
}

pub struct WindowsInput {}

impl WindowsInput {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for WindowsInput {
    fn pressed_keys(&mut self, keys: &[Key]) -> Result<HashSet<Key>> {
        let mut pressed = HashSet::new();
        for key in keys {
            let state = unsafe { GetAsyncKeyState(virtual_key(*key)?) };
            if state as u16 & 0x8000 != 0 {
                pressed.insert(*key);
            }
        }
        Ok(pressed)
    }

    fn foreground_window(&mut self) -> Result<Option<WindowId>> {
        let window = unsafe { GetForegroundWindow() };
        if window.is_invalid() {
            return Ok(None);
        }
        Ok(Some(WindowId(from_hwnd(window) as u64)))
    }
}

/// Attaches to the overlay window by its title.
pub struct WindowsSurface {
    title: HSTRING,
    window: Option<isize>,
}

impl WindowsSurface {
    pub fn new(title: &str) -> Self {
        Self {
            title: HSTRING::from(title),
            window: None,
        }
    }

    fn window(&mut self) -> Result<HWND> {
        self.own_window()?
            .map(|v| to_hwnd(v.0 as isize))
            .ok_or_else(|| anyhow!("Overlay window {} isn't available", self.title))
    }

    fn update_ex_style(hwnd: HWND, update: impl FnOnce(u32) -> u32) {
        unsafe {
            let style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
            SetWindowLongW(hwnd, GWL_EXSTYLE, update(style) as i32);
        }
    }
}

impl WindowSurface for WindowsSurface {
    fn own_window(&mut self) -> Result<Option<WindowId>> {
        if let Some(raw) = self.window {
            if unsafe { IsWindow(to_hwnd(raw)) }.as_bool() {
                return Ok(Some(WindowId(raw as u64)));
            }
            debug!("Overlay window {raw} went away");
            self.window = None;
        }

        let found = unsafe { FindWindowW(PCWSTR::null(), &self.title) };
        match found {
            Ok(hwnd) if !hwnd.is_invalid() => {
                // Keeps the overlay out of the taskbar and alt-tab.
                Self::update_ex_style(hwnd, |style| style | WS_EX_TOOLWINDOW.0);
                let raw = from_hwnd(hwnd);
                self.window = Some(raw);
                Ok(Some(WindowId(raw as u64)))
            }
            _ => Ok(None),
        }
    }

    fn set_opacity(&mut self, alpha: u8) -> Result<()> {
        let hwnd = self.window()?;
        Self::update_ex_style(hwnd, |style| style | WS_EX_LAYERED.0);
        unsafe { SetLayeredWindowAttributes(hwnd, COLORREF(0), alpha, LWA_ALPHA) }
            .inspect_err(|e| error!("Failed to set opacity {e:?}"))?;
        Ok(())
    }

    fn set_click_through(&mut self, enabled: bool) -> Result<()> {
        let hwnd = self.window()?;
        Self::update_ex_style(hwnd, |style| {
            if enabled {
                style | WS_EX_TRANSPARENT.0
            } else {
                style & !WS_EX_TRANSPARENT.0
            }
        });
        Ok(())
    }

    fn set_always_on_top(&mut self) -> Result<()> {
        let hwnd = self.window()?;
        unsafe {
            SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )
        }?;
        Ok(())
    }

    fn geometry(&mut self) -> Result<Geometry> {
        let hwnd = self.window()?;
        let mut rect = RECT::default();
        unsafe { GetWindowRect(hwnd, &mut rect) }?;
        Ok(Geometry {
            x: rect.left,
            y: rect.top,
            width: (rect.right - rect.left).max(0) as u32,
            height: (rect.bottom - rect.top).max(0) as u32,
        })
    }

    fn screen_size(&mut self) -> Result<(u32, u32)> {
        let (width, height) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if width <= 0 || height <= 0 {
            return Err(anyhow!("Failed to query screen size"));
        }
        Ok((width as u32, height as u32))
    }

    fn move_and_resize(&mut self, geometry: Geometry) -> Result<()> {
        let hwnd = self.window()?;
        unsafe {
            SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                geometry.x,
                geometry.y,
                geometry.width as i32,
                geometry.height as i32,
                SWP_NOACTIVATE,
            )
        }?;
        Ok(())
    }
}

pub struct WindowsBattery;

impl BatteryProbe for WindowsBattery {
    fn battery(&mut self) -> Result<Option<BatteryStatus>> {
        let mut status = SYSTEM_POWER_STATUS::default();
        unsafe { GetSystemPowerStatus(&mut status) }
            .inspect_err(|e| error!("Failed to retrieve power status {e:?}"))?;

        // 128 means there is no system battery, 255 that the status is unknown.
        if status.BatteryFlag == 128 {
            return Ok(None);
        }
        if status.BatteryLifePercent == 255 {
            return Err(anyhow!("Battery level is unknown"));
        }
        Ok(Some(BatteryStatus {
            percent: status.BatteryLifePercent.min(100),
            charging: status.ACLineStatus == 1,
        }))
    }
}
