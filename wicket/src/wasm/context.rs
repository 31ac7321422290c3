//! Store data shared with host functions
//!
//! Everything a host function can touch lives in [`BridgeContext`], which
//! is the wasmtime `Store` data. Host calls record commands instead of
//! acting immediately; the bridge drains them after the module call
//! returns. Byte ranges handed over by the module are copied out of linear
//! memory during the host call and never referenced afterwards.

use anyhow::{Result, bail};
use wasmtime::{AsContext, AsContextMut, Memory};

/// A recorded draw call, executed in order after the module call returns.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    SetScissor { x: i32, y: i32, w: i32, h: i32 },
    Clear { r: f32, g: f32, b: f32 },
    DrawSprites(Vec<u8>),
    SetTiledSurfaceDims { w: i32, h: i32 },
    DrawTilesToSurface(Vec<u8>),
    CompositeTiles(Vec<u8>),
}

/// A recorded audio request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCommand {
    LoopMusic(u32),
    PlayMusicOnce(u32),
    StopMusic,
    PlaySound(u32),
}

/// Context attached to the wasmtime store.
#[derive(Default)]
pub struct BridgeContext {
    /// The module's exported linear memory, set after instantiation.
    pub memory: Option<Memory>,
    /// Raw atlas layout blobs, served verbatim through `fill_*_atlas`.
    pub sprite_atlas: Vec<u8>,
    pub tiled_atlas: Vec<u8>,
    pub draw_commands: Vec<DrawCommand>,
    pub audio_commands: Vec<AudioCommand>,
    /// Whether exclusive display (fullscreen) is currently active.
    pub exclusive_display: bool,
    /// Pending exclusive display change: `Some(true)` request,
    /// `Some(false)` cancel. Applied by the app after the module call.
    pub exclusive_change: Option<bool>,
    /// Cookie bytes staged by `write_cookie`, persisted after the call.
    pub cookie_write: Option<Vec<u8>>,
}

impl BridgeContext {
    pub fn new(sprite_atlas: Vec<u8>, tiled_atlas: Vec<u8>) -> Self {
        Self {
            sprite_atlas,
            tiled_atlas,
            ..Self::default()
        }
    }
}

/// Copy a byte range out of WASM linear memory.
pub fn read_bytes_from_memory(
    memory: Memory,
    store: impl AsContext,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>> {
    let data = memory.data(&store);
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|&end| end <= data.len());
    match end {
        Some(end) => Ok(data[start..end].to_vec()),
        None => bail!("memory range {}..+{} out of bounds", ptr, len),
    }
}

/// Copy bytes into WASM linear memory.
pub fn write_bytes_to_memory(
    memory: Memory,
    mut store: impl AsContextMut,
    ptr: u32,
    bytes: &[u8],
) -> Result<()> {
    let data = memory.data_mut(&mut store);
    let start = ptr as usize;
    let end = start
        .checked_add(bytes.len())
        .filter(|&end| end <= data.len());
    match end {
        Some(end) => {
            data[start..end].copy_from_slice(bytes);
            Ok(())
        }
        None => bail!("memory range {}..+{} out of bounds", ptr, bytes.len()),
    }
}

/// Read a NUL-terminated UTF-8 string out of WASM linear memory.
///
/// Used for module-supplied shader source. The scan is bounded by the end
/// of memory; a missing terminator is an error rather than a runaway read.
pub fn read_cstr_from_memory(memory: Memory, store: impl AsContext, ptr: u32) -> Result<String> {
    let data = memory.data(&store);
    let start = ptr as usize;
    if start >= data.len() {
        bail!("string pointer {} out of bounds", ptr);
    }
    let Some(nul) = data[start..].iter().position(|&b| b == 0) else {
        bail!("unterminated string at {}", ptr);
    };
    let bytes = &data[start..start + nul];
    Ok(std::str::from_utf8(bytes)
        .map_err(|e| anyhow::anyhow!("invalid UTF-8 in string at {}: {}", ptr, e))?
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Engine, Module, Store};

    fn store_with_memory(data_seg: &str) -> (Store<BridgeContext>, Memory) {
        let engine = Engine::default();
        let wat = format!(
            r#"
            (module
                (memory (export "memory") 1)
                (data (i32.const 16) "{data_seg}")
            )
        "#
        );
        let module = Module::new(&engine, wat::parse_str(&wat).unwrap()).unwrap();
        let mut store = Store::new(&engine, BridgeContext::default());
        let instance = wasmtime::Instance::new(&mut store, &module, &[]).unwrap();
        let memory = instance.get_memory(&mut store, "memory").unwrap();
        (store, memory)
    }

    #[test]
    fn read_bytes_in_bounds() {
        let (store, memory) = store_with_memory("abcd");
        let bytes = read_bytes_from_memory(memory, &store, 16, 4).unwrap();
        assert_eq!(bytes, b"abcd");
    }

    #[test]
    fn read_bytes_out_of_bounds_fails() {
        let (store, memory) = store_with_memory("abcd");
        assert!(read_bytes_from_memory(memory, &store, 65530, 100).is_err());
        // Overflowing ptr + len must not wrap.
        assert!(read_bytes_from_memory(memory, &store, u32::MAX, 8).is_err());
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (mut store, memory) = store_with_memory("");
        write_bytes_to_memory(memory, &mut store, 100, b"cookie").unwrap();
        let bytes = read_bytes_from_memory(memory, &store, 100, 6).unwrap();
        assert_eq!(bytes, b"cookie");
    }

    #[test]
    fn write_out_of_bounds_fails() {
        let (mut store, memory) = store_with_memory("");
        assert!(write_bytes_to_memory(memory, &mut store, 65535, b"xy").is_err());
    }

    #[test]
    fn cstr_reads_until_nul() {
        let (store, memory) = store_with_memory(r"hello\00world");
        let s = read_cstr_from_memory(memory, &store, 16).unwrap();
        assert_eq!(s, "hello");
    }

    #[test]
    fn cstr_terminates_at_fresh_memory() {
        // Fresh pages are zeroed, so an empty data segment still terminates.
        let (store, memory) = store_with_memory("tail");
        let s = read_cstr_from_memory(memory, &store, 16).unwrap();
        assert_eq!(s, "tail");
    }

    #[test]
    fn cstr_pointer_out_of_bounds_fails() {
        let (store, memory) = store_with_memory("x");
        assert!(read_cstr_from_memory(memory, &store, 70000).is_err());
    }

}
