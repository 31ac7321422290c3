//! Host functions registered for app modules
//!
//! All imports live under the `env` namespace. Draw and audio calls are
//! recorded into [`BridgeContext`] and executed after the module call
//! returns; byte ranges are copied out of linear memory during the call.
//! A bad pointer or length from the module is logged and the call dropped.
//! It never corrupts host state.

use tracing::warn;
use wasmtime::{Caller, Linker};

use wicket_shared::MAX_COOKIE_SIZE;
use wicket_shared::abi::{IMPORT_MODULE, imports};

use crate::wasm::{AudioCommand, BridgeContext, DrawCommand, read_bytes_from_memory,
    write_bytes_to_memory};

/// Register every host function on the linker.
pub fn register_host_functions(linker: &mut Linker<BridgeContext>) -> anyhow::Result<()> {
    let env = IMPORT_MODULE;

    // Draw command recording
    linker.func_wrap(env, imports::SET_SCISSOR, set_scissor)?;
    linker.func_wrap(env, imports::CLEAR, clear)?;
    linker.func_wrap(env, imports::DRAW_SPRITES, draw_sprites)?;
    linker.func_wrap(env, imports::SET_TILED_SURFACE_DIMS, set_tiled_surface_dims)?;
    linker.func_wrap(env, imports::DRAW_TILES_TO_SURFACE, draw_tiles_to_surface)?;
    linker.func_wrap(env, imports::COMPOSITE_TILES, composite_tiles)?;

    // Audio command recording
    linker.func_wrap(env, imports::LOOP_MUSIC, loop_music)?;
    linker.func_wrap(env, imports::PLAY_MUSIC_ONCE, play_music_once)?;
    linker.func_wrap(env, imports::STOP_MUSIC, stop_music)?;
    linker.func_wrap(env, imports::PLAY_SOUND, play_sound)?;

    // Atlas layout access
    linker.func_wrap(env, imports::SPRITE_ATLAS_BYTE_SIZE, sprite_atlas_byte_size)?;
    linker.func_wrap(env, imports::FILL_SPRITE_ATLAS, fill_sprite_atlas)?;
    linker.func_wrap(env, imports::TILED_ATLAS_BYTE_SIZE, tiled_atlas_byte_size)?;
    linker.func_wrap(env, imports::FILL_TILED_ATLAS, fill_tiled_atlas)?;

    // Exclusive display
    linker.func_wrap(env, imports::REQUEST_EXCLUSIVE_DISPLAY, request_exclusive_display)?;
    linker.func_wrap(env, imports::CANCEL_EXCLUSIVE_DISPLAY, cancel_exclusive_display)?;
    linker.func_wrap(env, imports::IS_EXCLUSIVE_DISPLAY, is_exclusive_display)?;

    // Cookie persistence
    linker.func_wrap(env, imports::WRITE_COOKIE, write_cookie)?;

    // Math shims
    linker.func_wrap(env, imports::MATH_ATAN2, |y: f64, x: f64| y.atan2(x))?;
    linker.func_wrap(env, imports::COS, |x: f64| x.cos())?;
    linker.func_wrap(env, imports::SIN, |x: f64| x.sin())?;
    linker.func_wrap(env, imports::EXP, |x: f64| x.exp())?;
    linker.func_wrap(env, imports::FMOD, |a: f64, b: f64| a % b)?;
    // Half-up rounding: round(-0.5) is 0, not -1.
    linker.func_wrap(env, imports::ROUND, |x: f64| (x + 0.5).floor())?;

    Ok(())
}

/// Copy a module-owned byte range, or log and return `None` on a bad range.
fn copy_range(caller: &mut Caller<'_, BridgeContext>, what: &str, len: u32, ptr: u32) -> Option<Vec<u8>> {
    let memory = caller.data().memory?;
    match read_bytes_from_memory(memory, &mut *caller, ptr, len) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(what, error = %e, "dropping call with bad memory range");
            None
        }
    }
}

fn set_scissor(mut caller: Caller<'_, BridgeContext>, x: i32, y: i32, w: i32, h: i32) {
    caller
        .data_mut()
        .draw_commands
        .push(DrawCommand::SetScissor { x, y, w, h });
}

fn clear(mut caller: Caller<'_, BridgeContext>, r: f32, g: f32, b: f32) {
    caller.data_mut().draw_commands.push(DrawCommand::Clear { r, g, b });
}

fn draw_sprites(mut caller: Caller<'_, BridgeContext>, len: u32, ptr: u32) {
    if let Some(bytes) = copy_range(&mut caller, "draw_sprites", len, ptr) {
        caller.data_mut().draw_commands.push(DrawCommand::DrawSprites(bytes));
    }
}

fn set_tiled_surface_dims(mut caller: Caller<'_, BridgeContext>, w: i32, h: i32) {
    caller
        .data_mut()
        .draw_commands
        .push(DrawCommand::SetTiledSurfaceDims { w, h });
}

fn draw_tiles_to_surface(mut caller: Caller<'_, BridgeContext>, len: u32, ptr: u32) {
    if let Some(bytes) = copy_range(&mut caller, "draw_tiles_to_surface", len, ptr) {
        caller
            .data_mut()
            .draw_commands
            .push(DrawCommand::DrawTilesToSurface(bytes));
    }
}

fn composite_tiles(mut caller: Caller<'_, BridgeContext>, len: u32, ptr: u32) {
    if let Some(bytes) = copy_range(&mut caller, "composite_tiles", len, ptr) {
        caller
            .data_mut()
            .draw_commands
            .push(DrawCommand::CompositeTiles(bytes));
    }
}

fn loop_music(mut caller: Caller<'_, BridgeContext>, id: u32) {
    caller.data_mut().audio_commands.push(AudioCommand::LoopMusic(id));
}

fn play_music_once(mut caller: Caller<'_, BridgeContext>, id: u32) {
    caller.data_mut().audio_commands.push(AudioCommand::PlayMusicOnce(id));
}

fn stop_music(mut caller: Caller<'_, BridgeContext>) {
    caller.data_mut().audio_commands.push(AudioCommand::StopMusic);
}

fn play_sound(mut caller: Caller<'_, BridgeContext>, id: u32) {
    caller.data_mut().audio_commands.push(AudioCommand::PlaySound(id));
}

fn sprite_atlas_byte_size(caller: Caller<'_, BridgeContext>) -> i32 {
    caller.data().sprite_atlas.len() as i32
}

fn tiled_atlas_byte_size(caller: Caller<'_, BridgeContext>) -> i32 {
    caller.data().tiled_atlas.len() as i32
}

fn fill_sprite_atlas(mut caller: Caller<'_, BridgeContext>, ptr: u32) {
    fill_atlas(&mut caller, "fill_sprite_atlas", ptr, |ctx| &ctx.sprite_atlas);
}

fn fill_tiled_atlas(mut caller: Caller<'_, BridgeContext>, ptr: u32) {
    fill_atlas(&mut caller, "fill_tiled_atlas", ptr, |ctx| &ctx.tiled_atlas);
}

/// Copy an atlas layout blob into the buffer the module sized via
/// `*_atlas_byte_size`. The blob is opaque to the bridge.
fn fill_atlas(
    caller: &mut Caller<'_, BridgeContext>,
    what: &str,
    ptr: u32,
    atlas: impl Fn(&BridgeContext) -> &Vec<u8>,
) {
    let Some(memory) = caller.data().memory else {
        return;
    };
    let blob = atlas(caller.data()).clone();
    if let Err(e) = write_bytes_to_memory(memory, &mut *caller, ptr, &blob) {
        warn!(what, error = %e, "atlas destination out of bounds");
    }
}

fn request_exclusive_display(mut caller: Caller<'_, BridgeContext>) {
    caller.data_mut().exclusive_change = Some(true);
}

fn cancel_exclusive_display(mut caller: Caller<'_, BridgeContext>) {
    caller.data_mut().exclusive_change = Some(false);
}

fn is_exclusive_display(caller: Caller<'_, BridgeContext>) -> i32 {
    caller.data().exclusive_display as i32
}

fn write_cookie(mut caller: Caller<'_, BridgeContext>, len: u32, ptr: u32) {
    if len as usize > MAX_COOKIE_SIZE {
        warn!(len, cap = MAX_COOKIE_SIZE, "oversize cookie write rejected");
        return;
    }
    if let Some(bytes) = copy_range(&mut caller, "write_cookie", len, ptr) {
        caller.data_mut().cookie_write = Some(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wasm::BridgeEngine;
    use wasmtime::Store;

    /// Module importing the host surface and invoking it from `poke`.
    const CALLER_WAT: &str = r#"
        (module
            (import "env" "set_scissor" (func $set_scissor (param i32 i32 i32 i32)))
            (import "env" "clear" (func $clear (param f32 f32 f32)))
            (import "env" "draw_sprites" (func $draw_sprites (param i32 i32)))
            (import "env" "loop_music" (func $loop_music (param i32)))
            (import "env" "play_sound" (func $play_sound (param i32)))
            (import "env" "sprite_atlas_byte_size" (func $sprite_atlas_byte_size (result i32)))
            (import "env" "fill_sprite_atlas" (func $fill_sprite_atlas (param i32)))
            (import "env" "is_exclusive_display" (func $is_excl (result i32)))
            (import "env" "request_exclusive_display" (func $req_excl))
            (import "env" "write_cookie" (func $write_cookie (param i32 i32)))
            (import "env" "round" (func $round (param f64) (result f64)))
            (memory (export "memory") 1)
            (data (i32.const 64) "\01\02\03\04\05\06\07\08")
            (func (export "poke")
                (call $set_scissor (i32.const 1) (i32.const 2) (i32.const 3) (i32.const 4))
                (call $clear (f32.const 0.25) (f32.const 0.5) (f32.const 0.75))
                (call $draw_sprites (i32.const 8) (i32.const 64))
                (call $loop_music (i32.const 1))
                (call $play_sound (i32.const 0))
                (call $req_excl)
                (call $write_cookie (i32.const 4) (i32.const 64))
            )
            (func (export "bad_draw")
                (call $draw_sprites (i32.const 100) (i32.const 65535))
            )
            (func (export "atlas_size") (result i32)
                (call $sprite_atlas_byte_size))
            (func (export "pull_atlas")
                (call $fill_sprite_atlas (i32.const 128)))
            (func (export "excl") (result i32)
                (call $is_excl))
            (func (export "round_at") (param f64) (result f64)
                (call $round (local.get 0)))
        )
    "#;

    struct Fixture {
        store: Store<BridgeContext>,
        instance: wasmtime::Instance,
    }

    fn fixture(ctx: BridgeContext) -> Fixture {
        let engine = BridgeEngine::new().unwrap();
        let wasm = wat::parse_str(CALLER_WAT).unwrap();
        let module = engine.load_module(&wasm).unwrap();
        let mut linker = Linker::new(engine.engine());
        register_host_functions(&mut linker).unwrap();
        let mut store = Store::new(engine.engine(), ctx);
        let instance = linker.instantiate(&mut store, &module).unwrap();
        let memory = instance.get_memory(&mut store, "memory").unwrap();
        store.data_mut().memory = Some(memory);
        Fixture { store, instance }
    }

    fn call(fx: &mut Fixture, name: &str) {
        let func = fx
            .instance
            .get_typed_func::<(), ()>(&mut fx.store, name)
            .unwrap();
        func.call(&mut fx.store, ()).unwrap();
    }

    #[test]
    fn calls_record_commands_in_order() {
        let mut fx = fixture(BridgeContext::default());
        call(&mut fx, "poke");

        let ctx = fx.store.data();
        assert_eq!(
            ctx.draw_commands,
            vec![
                DrawCommand::SetScissor { x: 1, y: 2, w: 3, h: 4 },
                DrawCommand::Clear { r: 0.25, g: 0.5, b: 0.75 },
                DrawCommand::DrawSprites(vec![1, 2, 3, 4, 5, 6, 7, 8]),
            ]
        );
        assert_eq!(
            ctx.audio_commands,
            vec![AudioCommand::LoopMusic(1), AudioCommand::PlaySound(0)]
        );
        assert_eq!(ctx.exclusive_change, Some(true));
        assert_eq!(ctx.cookie_write.as_deref(), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn bad_range_drops_the_call() {
        let mut fx = fixture(BridgeContext::default());
        call(&mut fx, "bad_draw");
        assert!(fx.store.data().draw_commands.is_empty());
    }

    #[test]
    fn atlas_byte_size_and_fill_serve_the_layout_blob() {
        // The layout blob is opaque binary; the module gets its exact
        // length and its exact bytes.
        let blob: Vec<u8> = (0..37).collect();
        let mut fx = fixture(BridgeContext::new(blob.clone(), Vec::new()));

        let size = fx
            .instance
            .get_typed_func::<(), i32>(&mut fx.store, "atlas_size")
            .unwrap()
            .call(&mut fx.store, ())
            .unwrap();
        assert_eq!(size, blob.len() as i32);

        call(&mut fx, "pull_atlas");
        let memory = fx.store.data().memory.unwrap();
        let bytes = read_bytes_from_memory(memory, &fx.store, 128, blob.len() as u32).unwrap();
        assert_eq!(bytes, blob);
    }

    #[test]
    fn exclusive_display_reflects_host_state() {
        let mut fx = fixture(BridgeContext::default());
        let excl = fx
            .instance
            .get_typed_func::<(), i32>(&mut fx.store, "excl")
            .unwrap();
        assert_eq!(excl.call(&mut fx.store, ()).unwrap(), 0);
        fx.store.data_mut().exclusive_display = true;
        assert_eq!(excl.call(&mut fx.store, ()).unwrap(), 1);
    }

    #[test]
    fn round_is_half_up() {
        let mut fx = fixture(BridgeContext::default());
        let round = fx
            .instance
            .get_typed_func::<f64, f64>(&mut fx.store, "round_at")
            .unwrap();
        assert_eq!(round.call(&mut fx.store, 2.5).unwrap(), 3.0);
        assert_eq!(round.call(&mut fx.store, -0.5).unwrap(), 0.0);
        assert_eq!(round.call(&mut fx.store, -1.5).unwrap(), -1.0);
    }
}
