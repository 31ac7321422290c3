//! Input normalization
//!
//! Keyboard events are mapped from platform keycodes onto the dense ABI
//! vocabulary in `wicket-shared`; anything outside the vocabulary is
//! swallowed before it reaches the module. Pointer input collapses mouse
//! and touch into one stream: button transitions become `pointer_event`
//! calls, while position is tracked continuously and sampled once per
//! frame by `update_and_draw`. The first active touch owns the pointer
//! until it lifts; concurrent touches are ignored entirely.

use wicket_shared::{KeyCode, pointer_button};
use winit::event::{ElementState, MouseButton, TouchPhase};
use winit::keyboard::KeyCode as WinitKey;

/// Map a physical key to the ABI vocabulary.
pub fn map_key(key: WinitKey) -> Option<KeyCode> {
    use WinitKey::*;
    let code = match key {
        KeyA => KeyCode::A,
        KeyB => KeyCode::B,
        KeyC => KeyCode::C,
        KeyD => KeyCode::D,
        KeyE => KeyCode::E,
        KeyF => KeyCode::F,
        KeyG => KeyCode::G,
        KeyH => KeyCode::H,
        KeyI => KeyCode::I,
        KeyJ => KeyCode::J,
        KeyK => KeyCode::K,
        KeyL => KeyCode::L,
        KeyM => KeyCode::M,
        KeyN => KeyCode::N,
        KeyO => KeyCode::O,
        KeyP => KeyCode::P,
        KeyQ => KeyCode::Q,
        KeyR => KeyCode::R,
        KeyS => KeyCode::S,
        KeyT => KeyCode::T,
        KeyU => KeyCode::U,
        KeyV => KeyCode::V,
        KeyW => KeyCode::W,
        KeyX => KeyCode::X,
        KeyY => KeyCode::Y,
        KeyZ => KeyCode::Z,
        Digit0 => KeyCode::Num0,
        Digit1 => KeyCode::Num1,
        Digit2 => KeyCode::Num2,
        Digit3 => KeyCode::Num3,
        Digit4 => KeyCode::Num4,
        Digit5 => KeyCode::Num5,
        Digit6 => KeyCode::Num6,
        Digit7 => KeyCode::Num7,
        Digit8 => KeyCode::Num8,
        Digit9 => KeyCode::Num9,
        ArrowRight => KeyCode::Right,
        ArrowLeft => KeyCode::Left,
        ArrowDown => KeyCode::Down,
        ArrowUp => KeyCode::Up,
        Enter => KeyCode::Return,
        Space => KeyCode::Space,
        _ => return None,
    };
    Some(code)
}

/// Map a mouse button to its ABI index. Extra buttons are swallowed.
pub fn map_mouse_button(button: MouseButton) -> Option<i32> {
    match button {
        MouseButton::Left => Some(pointer_button::LEFT),
        MouseButton::Middle => Some(pointer_button::MIDDLE),
        MouseButton::Right => Some(pointer_button::RIGHT),
        _ => None,
    }
}

/// A button transition ready to forward to the module's `pointer_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub x: i32,
    pub y: i32,
    pub button: i32,
    pub down: bool,
}

/// Collapses multi-touch and mouse input into one pointer.
///
/// Position updates produce no event of their own; the frame call samples
/// [`PointerState::position`] instead. For touch, the first contact claims
/// ownership and reports as the left button. Later contacts while an owner
/// is live produce nothing, including their move and end phases.
#[derive(Debug, Default)]
pub struct PointerState {
    owner: Option<u64>,
    position: (i32, i32),
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer position in backing-store pixels, as of the last input
    /// event.
    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    /// Record the latest mouse position in backing-store pixels.
    pub fn mouse_moved(&mut self, x: i32, y: i32) {
        self.position = (x, y);
    }

    /// A mouse button changed state at the last known position.
    pub fn mouse_button(&mut self, state: ElementState, button: MouseButton) -> Option<PointerEvent> {
        let button = map_mouse_button(button)?;
        let (x, y) = self.position;
        Some(PointerEvent {
            x,
            y,
            button,
            down: state == ElementState::Pressed,
        })
    }

    /// Feed a raw touch, with coordinates in backing-store pixels.
    pub fn touch(&mut self, id: u64, phase: TouchPhase, x: i32, y: i32) -> Option<PointerEvent> {
        match phase {
            TouchPhase::Started => {
                if self.owner.is_some() {
                    return None;
                }
                self.owner = Some(id);
                self.position = (x, y);
                Some(PointerEvent {
                    x,
                    y,
                    button: pointer_button::LEFT,
                    down: true,
                })
            }
            TouchPhase::Moved => {
                if self.owner == Some(id) {
                    self.position = (x, y);
                }
                None
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                if self.owner != Some(id) {
                    return None;
                }
                self.owner = None;
                self.position = (x, y);
                Some(PointerEvent {
                    x,
                    y,
                    button: pointer_button::LEFT,
                    down: false,
                })
            }
        }
    }

    /// Drop touch ownership, e.g. when the module quits.
    pub fn reset(&mut self) {
        self.owner = None;
    }
}
