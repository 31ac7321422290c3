//! ABI function names
//!
//! The module's exports are called by the bridge; the imports are host
//! functions the bridge registers under the `env` namespace. Names are part
//! of the versioned ABI and never change without a version bump.

/// Import namespace for all host functions.
pub const IMPORT_MODULE: &str = "env";

/// Functions the module must export.
pub mod exports {
    pub const INIT: &str = "init";
    pub const ON_RESIZE: &str = "on_resize";
    pub const UPDATE_AND_DRAW: &str = "update_and_draw";
    pub const KEY_EVENT: &str = "key_event";
    pub const POINTER_EVENT: &str = "pointer_event";
    pub const IS_APP_DEFINED: &str = "is_app_defined";
    pub const MUSIC_COUNT: &str = "music_count";
    pub const SOUND_COUNT: &str = "sound_count";
    pub const SPRITE_VERT_SRC: &str = "sprite_vert_src";
    pub const SPRITE_FRAG_SRC: &str = "sprite_frag_src";
    pub const TILED_VERT_SRC: &str = "tiled_vert_src";
    pub const TILED_FRAG_SRC: &str = "tiled_frag_src";
    pub const COOKIE_DATA_PTR: &str = "cookie_data_ptr";
    pub const ON_RESTART: &str = "on_restart";
    pub const MEMORY: &str = "memory";
}

/// Host functions the bridge provides to the module.
pub mod imports {
    pub const SET_SCISSOR: &str = "set_scissor";
    pub const CLEAR: &str = "clear";
    pub const DRAW_SPRITES: &str = "draw_sprites";
    pub const SET_TILED_SURFACE_DIMS: &str = "set_tiled_surface_dims";
    pub const DRAW_TILES_TO_SURFACE: &str = "draw_tiles_to_surface";
    pub const COMPOSITE_TILES: &str = "composite_tiles";
    pub const LOOP_MUSIC: &str = "loop_music";
    pub const PLAY_MUSIC_ONCE: &str = "play_music_once";
    pub const STOP_MUSIC: &str = "stop_music";
    pub const PLAY_SOUND: &str = "play_sound";
    pub const SPRITE_ATLAS_BYTE_SIZE: &str = "sprite_atlas_byte_size";
    pub const FILL_SPRITE_ATLAS: &str = "fill_sprite_atlas";
    pub const TILED_ATLAS_BYTE_SIZE: &str = "tiled_atlas_byte_size";
    pub const FILL_TILED_ATLAS: &str = "fill_tiled_atlas";
    pub const REQUEST_EXCLUSIVE_DISPLAY: &str = "request_exclusive_display";
    pub const CANCEL_EXCLUSIVE_DISPLAY: &str = "cancel_exclusive_display";
    pub const IS_EXCLUSIVE_DISPLAY: &str = "is_exclusive_display";
    pub const WRITE_COOKIE: &str = "write_cookie";
    pub const MATH_ATAN2: &str = "math_atan2";
    pub const COS: &str = "cos";
    pub const SIN: &str = "sin";
    pub const EXP: &str = "exp";
    pub const FMOD: &str = "fmod";
    pub const ROUND: &str = "round";
}
