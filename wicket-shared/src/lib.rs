//! Shared ABI definitions for the Wicket bridge
//!
//! The bridge and its module-side tooling agree on a narrow numeric ABI:
//! fixed function names, a dense keycode vocabulary, fixed vertex strides,
//! and a cap on persisted cookie data. This crate is the single source of
//! truth for those constants.

pub mod abi;

use serde::{Deserialize, Serialize};

/// Byte stride of one sprite-pipeline vertex record.
///
/// 7 x 4-byte fields: position (2 floats), texture min corner or
/// inverse-sample-dims (2 floats), texture max corner (2 floats),
/// flash ratio (1 float).
pub const SPRITE_VERTEX_STRIDE: usize = 28;

/// Byte stride of one tiled-pipeline vertex record.
///
/// 4 x 4-byte fields: position (2 floats), texture coordinate (2 floats).
pub const TILED_VERTEX_STRIDE: usize = 16;

/// Maximum decoded size of the persisted cookie blob, in bytes.
pub const MAX_COOKIE_SIZE: usize = 1000;

/// Dense keycode vocabulary forwarded to the module's `key_event` export.
///
/// The assignments are fixed by the ABI: letters first, then digits, then
/// arrows, Enter and Space. Keys outside this vocabulary are never
/// forwarded.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    A = 0,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Num0 = 26,
    Num1,
    Num2,
    Num3,
    Num4,
    Num5,
    Num6,
    Num7,
    Num8,
    Num9,
    Right = 36,
    Left,
    Down,
    Up,
    Return = 40,
    Space = 41,
}

/// Number of distinct keycodes in the vocabulary.
pub const KEYCODE_COUNT: u8 = 42;

impl KeyCode {
    /// Every keycode, indexed by its discriminant.
    const TABLE: [KeyCode; KEYCODE_COUNT as usize] = [
        KeyCode::A,
        KeyCode::B,
        KeyCode::C,
        KeyCode::D,
        KeyCode::E,
        KeyCode::F,
        KeyCode::G,
        KeyCode::H,
        KeyCode::I,
        KeyCode::J,
        KeyCode::K,
        KeyCode::L,
        KeyCode::M,
        KeyCode::N,
        KeyCode::O,
        KeyCode::P,
        KeyCode::Q,
        KeyCode::R,
        KeyCode::S,
        KeyCode::T,
        KeyCode::U,
        KeyCode::V,
        KeyCode::W,
        KeyCode::X,
        KeyCode::Y,
        KeyCode::Z,
        KeyCode::Num0,
        KeyCode::Num1,
        KeyCode::Num2,
        KeyCode::Num3,
        KeyCode::Num4,
        KeyCode::Num5,
        KeyCode::Num6,
        KeyCode::Num7,
        KeyCode::Num8,
        KeyCode::Num9,
        KeyCode::Right,
        KeyCode::Left,
        KeyCode::Down,
        KeyCode::Up,
        KeyCode::Return,
        KeyCode::Space,
    ];

    /// Decode a raw ABI keycode. Returns `None` for values outside the
    /// vocabulary.
    pub fn from_u8(code: u8) -> Option<KeyCode> {
        Self::TABLE.get(code as usize).copied()
    }

    /// The raw ABI value forwarded to the module.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Mouse button indices as passed to the module's `pointer_event` export.
pub mod pointer_button {
    pub const LEFT: i32 = 0;
    pub const MIDDLE: i32 = 1;
    pub const RIGHT: i32 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycode_roundtrips_through_raw_value() {
        for raw in 0..KEYCODE_COUNT {
            let code = KeyCode::from_u8(raw).unwrap();
            assert_eq!(code.as_u8(), raw);
        }
    }

    #[test]
    fn keycode_rejects_out_of_vocabulary_values() {
        assert_eq!(KeyCode::from_u8(KEYCODE_COUNT), None);
        assert_eq!(KeyCode::from_u8(255), None);
    }

    #[test]
    fn fixed_abi_assignments() {
        assert_eq!(KeyCode::A.as_u8(), 0);
        assert_eq!(KeyCode::Z.as_u8(), 25);
        assert_eq!(KeyCode::Num0.as_u8(), 26);
        assert_eq!(KeyCode::Num9.as_u8(), 35);
        assert_eq!(KeyCode::Right.as_u8(), 36);
        assert_eq!(KeyCode::Left.as_u8(), 37);
        assert_eq!(KeyCode::Down.as_u8(), 38);
        assert_eq!(KeyCode::Up.as_u8(), 39);
        assert_eq!(KeyCode::Return.as_u8(), 40);
        assert_eq!(KeyCode::Space.as_u8(), 41);
    }

    #[test]
    fn sprite_stride_matches_field_layout() {
        // 7 f32 fields per vertex.
        assert_eq!(SPRITE_VERTEX_STRIDE, 7 * 4);
        assert_eq!(TILED_VERTEX_STRIDE, 4 * 4);
    }
}
