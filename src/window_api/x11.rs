use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use tracing::{debug, instrument};
use xcb::{
    shape,
    x::{self, Atom, InternAtom, Keycode, Keysym, Window, ATOM_ANY},
    Connection, Xid,
};

use super::{Geometry, InputSource, Key, WindowId, WindowSurface};

const XK_SHIFT_L: Keysym = 0xffe1;
const XK_SHIFT_R: Keysym = 0xffe2;
const XK_CONTROL_L: Keysym = 0xffe3;
const XK_CONTROL_R: Keysym = 0xffe4;
const XK_ALT_L: Keysym = 0xffe9;
const XK_ALT_R: Keysym = 0xffea;

fn intern(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn root_window(conn: &Connection, preferred_screen: i32) -> Result<x::Window> {
    conn.get_setup()
        .roots()
        .nth(preferred_screen.max(0) as usize)
        .map(|v| v.root())
        .ok_or_else(|| anyhow!("Screen {preferred_screen} doesn't exist"))
}

fn window_property<T: x::PropEl + Copy>(
    conn: &Connection,
    window: Window,
    property: Atom,
    length: u32,
) -> Result<Vec<T>> {
    let reply = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: length,
    }))?;
    Ok(reply.value::<T>().to_vec())
}

fn keysyms_of(key: Key) -> Vec<Keysym> {
    match key {
        Key::Control => vec![XK_CONTROL_L, XK_CONTROL_R],
        Key::Shift => vec![XK_SHIFT_L, XK_SHIFT_R],
        Key::Alt => vec![XK_ALT_L, XK_ALT_R],
        // Latin-1 keysyms of letters are their ASCII codes.
        Key::Letter(c) => vec![
            c.to_ascii_lowercase() as Keysym,
            c.to_ascii_uppercase() as Keysym,
        ],
    }
}

/// Reads the global key map through `QueryKeymap` and the focused window through
/// `_NET_ACTIVE_WINDOW`.
pub struct X11Input {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    keysym_codes: HashMap<Keysym, Vec<Keycode>>,
}

impl X11Input {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = Connection::connect(None)?;
        let active_window_atom = intern(&connection, b"_NET_ACTIVE_WINDOW")?;
        let keysym_codes = Self::keyboard_mapping(&connection)?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            keysym_codes,
        })
    }

    fn keyboard_mapping(conn: &Connection) -> Result<HashMap<Keysym, Vec<Keycode>>> {
        let setup = conn.get_setup();
        let first = setup.min_keycode();
        let count = setup.max_keycode() - first + 1;
        let reply = conn.wait_for_reply(conn.send_request(&x::GetKeyboardMapping {
            first_keycode: first,
            count,
        }))?;
        let per_code = reply.keysyms_per_keycode().max(1) as usize;

        let mut codes = HashMap::<Keysym, Vec<Keycode>>::new();
        for (index, keysym) in reply.keysyms().iter().enumerate() {
            if *keysym == 0 {
                continue;
            }
            let code = first + (index / per_code) as Keycode;
            let entry = codes.entry(*keysym).or_default();
            if !entry.contains(&code) {
                entry.push(code);
            }
        }
        Ok(codes)
    }
}

impl InputSource for X11Input {
    #[instrument(skip(self))]
    fn pressed_keys(&mut self, keys: &[Key]) -> Result<HashSet<Key>> {
        let keymap = self
            .connection
            .wait_for_reply(self.connection.send_request(&x::QueryKeymap {}))?;
        let bits = keymap.keys();
        Ok(keys
            .iter()
            .copied()
            .filter(|key| {
                keysyms_of(*key)
                    .iter()
                    .filter_map(|v| self.keysym_codes.get(v))
                    .flatten()
                    .any(|code| bits[*code as usize / 8] & (1 << (code % 8)) != 0)
            })
            .collect())
    }

    fn foreground_window(&mut self) -> Result<Option<WindowId>> {
        let root = root_window(&self.connection, self.preferred_screen)?;
        let windows =
            window_property::<Window>(&self.connection, root, self.active_window_atom, 1)?;
        Ok(windows
            .first()
            .filter(|v| !v.is_none())
            .map(|v| WindowId(v.resource_id() as u64)))
    }
}

struct SurfaceAtoms {
    client_list: Atom,
    window_name: Atom,
    window_state: Atom,
    state_above: Atom,
    window_opacity: Atom,
}

/// Finds the overlay among the window manager's clients by `_NET_WM_NAME` and styles it
/// through EWMH properties and the shape extension.
pub struct X11Surface {
    connection: Connection,
    preferred_screen: i32,
    atoms: SurfaceAtoms,
    title: String,
    window: Option<Window>,
}

impl X11Surface {
    pub fn new(title: &str) -> Result<Self> {
        let (connection, preferred_screen) =
            Connection::connect_with_extensions(None, &[xcb::Extension::Shape], &[])?;
        let atoms = SurfaceAtoms {
            client_list: intern(&connection, b"_NET_CLIENT_LIST")?,
            window_name: intern(&connection, b"_NET_WM_NAME")?,
            window_state: intern(&connection, b"_NET_WM_STATE")?,
            state_above: intern(&connection, b"_NET_WM_STATE_ABOVE")?,
            window_opacity: intern(&connection, b"_NET_WM_WINDOW_OPACITY")?,
        };
        Ok(Self {
            connection,
            preferred_screen,
            atoms,
            title: title.to_string(),
            window: None,
        })
    }

    fn window(&mut self) -> Result<Window> {
        self.own_window()?;
        self.window
            .ok_or_else(|| anyhow!("Overlay window {:?} isn't available", self.title))
    }

    fn find_window(&self) -> Result<Option<Window>> {
        let root = root_window(&self.connection, self.preferred_screen)?;
        let clients =
            window_property::<Window>(&self.connection, root, self.atoms.client_list, 4096)?;
        for client in clients {
            let name = window_property::<u8>(&self.connection, client, self.atoms.window_name, 1024)?;
            if String::from_utf8_lossy(&name) == self.title {
                return Ok(Some(client));
            }
        }
        Ok(None)
    }

    fn is_alive(&self, window: Window) -> bool {
        let cookie = self
            .connection
            .send_request(&x::GetWindowAttributes { window });
        self.connection.wait_for_reply(cookie).is_ok()
    }

    fn checked(&self, request: &impl xcb::RequestWithoutReply) -> Result<()> {
        let cookie = self.connection.send_request_checked(request);
        self.connection.check_request(cookie)?;
        Ok(())
    }
}

impl WindowSurface for X11Surface {
    #[instrument(skip(self))]
    fn own_window(&mut self) -> Result<Option<WindowId>> {
        if let Some(window) = self.window {
            if !self.is_alive(window) {
                debug!("Overlay window {:?} went away", window);
                self.window = None;
            }
        }
        if self.window.is_none() {
            self.window = self.find_window()?;
            if let Some(window) = self.window {
                debug!("Attached to overlay window {:?}", window);
            }
        }
        Ok(self.window.map(|v| WindowId(v.resource_id() as u64)))
    }

    fn set_opacity(&mut self, alpha: u8) -> Result<()> {
        let window = self.window()?;
        // The property scales 0..=255 onto the whole u32 range.
        let opacity = alpha as u32 * 0x0101_0101;
        self.checked(&x::ChangeProperty {
            mode: x::PropMode::Replace,
            window,
            property: self.atoms.window_opacity,
            r#type: x::ATOM_CARDINAL,
            data: &[opacity],
        })
    }

    fn set_click_through(&mut self, enabled: bool) -> Result<()> {
        let window = self.window()?;
        if enabled {
            // An empty input region lets every pointer event fall through.
            self.checked(&shape::Rectangles {
                operation: shape::So::Set,
                destination_kind: shape::Sk::Input,
                ordering: x::ClipOrdering::Unsorted,
                destination_window: window,
                x_offset: 0,
                y_offset: 0,
                rectangles: &[],
            })
        } else {
            self.checked(&shape::Mask {
                operation: shape::So::Set,
                destination_kind: shape::Sk::Input,
                destination_window: window,
                x_offset: 0,
                y_offset: 0,
                source_bitmap: x::Pixmap::none(),
            })
        }
    }

    fn set_always_on_top(&mut self) -> Result<()> {
        let window = self.window()?;
        let root = root_window(&self.connection, self.preferred_screen)?;
        let event = x::ClientMessageEvent::new(
            window,
            self.atoms.window_state,
            // _NET_WM_STATE_ADD, the state, no second state, source is a normal application.
            x::ClientMessageData::Data32([1, self.atoms.state_above.resource_id(), 0, 1, 0]),
        );
        self.checked(&x::SendEvent {
            propagate: false,
            destination: x::SendEventDest::Window(root),
            event_mask: x::EventMask::SUBSTRUCTURE_NOTIFY | x::EventMask::SUBSTRUCTURE_REDIRECT,
            event: &event,
        })
    }

    fn geometry(&mut self) -> Result<Geometry> {
        let window = self.window()?;
        let root = root_window(&self.connection, self.preferred_screen)?;
        let geometry = self
            .connection
            .wait_for_reply(self.connection.send_request(&x::GetGeometry {
                drawable: x::Drawable::Window(window),
            }))?;
        let position = self
            .connection
            .wait_for_reply(self.connection.send_request(&x::TranslateCoordinates {
                src_window: window,
                dst_window: root,
                src_x: 0,
                src_y: 0,
            }))?;
        Ok(Geometry {
            x: position.dst_x() as i32,
            y: position.dst_y() as i32,
            width: geometry.width() as u32,
            height: geometry.height() as u32,
        })
    }

    fn screen_size(&mut self) -> Result<(u32, u32)> {
        let setup = self.connection.get_setup();
        let screen = setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .ok_or_else(|| anyhow!("Screen {} doesn't exist", self.preferred_screen))?;
        Ok((
            screen.width_in_pixels() as u32,
            screen.height_in_pixels() as u32,
        ))
    }

    fn move_and_resize(&mut self, geometry: Geometry) -> Result<()> {
        let window = self.window()?;
        self.checked(&x::ConfigureWindow {
            window,
            value_list: &[
                x::ConfigWindow::X(geometry.x),
                x::ConfigWindow::Y(geometry.y),
                x::ConfigWindow::Width(geometry.width),
                x::ConfigWindow::Height(geometry.height),
            ],
        })
    }
}
