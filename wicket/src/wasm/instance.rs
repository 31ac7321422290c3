//! App instance implementation for loaded WASM modules

use anyhow::Context;
use tracing::debug;
use wasmtime::{Instance, Linker, Module, Store, TypedFunc};

use wicket_shared::abi::exports;

use super::context::{BridgeContext, write_bytes_to_memory};
use super::engine::BridgeEngine;
use crate::error::BridgeError;

/// A loaded and instantiated app module.
///
/// Every ABI export is required; a module missing one fails construction
/// with [`BridgeError::ModuleContract`] rather than limping along with
/// optional calls. The interrogation exports (`is_app_defined`, clip
/// counts, shader sources) are called once here and cached.
pub struct AppInstance {
    store: Store<BridgeContext>,
    /// Kept alive for the lifetime of exported functions and memory.
    #[allow(dead_code)]
    instance: Instance,
    init_fn: TypedFunc<(), ()>,
    on_resize_fn: TypedFunc<(i32, i32), ()>,
    update_fn: TypedFunc<(f64, i32, i32), i32>,
    key_event_fn: TypedFunc<(i32, i32), i32>,
    pointer_event_fn: TypedFunc<(i32, i32, i32, i32), i32>,
    cookie_data_ptr_fn: TypedFunc<i32, i32>,
    on_restart_fn: TypedFunc<(), ()>,
    music_count: u32,
    sound_count: u32,
    sprite_vert_src: String,
    sprite_frag_src: String,
    tiled_vert_src: String,
    tiled_frag_src: String,
}

impl std::fmt::Debug for AppInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppInstance")
            .field("music_count", &self.music_count)
            .field("sound_count", &self.sound_count)
            .finish_non_exhaustive()
    }
}

fn required<T>(found: Result<T, wasmtime::Error>, name: &str) -> Result<T, BridgeError> {
    found.map_err(|_| BridgeError::ModuleContract(format!("missing or mistyped export '{name}'")))
}

impl AppInstance {
    /// Instantiate a compiled module against a linker with the host
    /// functions registered, and verify the ABI contract.
    pub fn new(
        engine: &BridgeEngine,
        module: &Module,
        linker: &Linker<BridgeContext>,
        ctx: BridgeContext,
    ) -> Result<Self, BridgeError> {
        let mut store = Store::new(engine.engine(), ctx);

        let instance = linker
            .instantiate(&mut store, module)
            .context("Failed to instantiate WASM module")?;

        let memory = instance
            .get_memory(&mut store, exports::MEMORY)
            .ok_or_else(|| {
                BridgeError::ModuleContract("module does not export 'memory'".into())
            })?;
        store.data_mut().memory = Some(memory);

        let init_fn = required(
            instance.get_typed_func::<(), ()>(&mut store, exports::INIT),
            exports::INIT,
        )?;
        let on_resize_fn = required(
            instance.get_typed_func::<(i32, i32), ()>(&mut store, exports::ON_RESIZE),
            exports::ON_RESIZE,
        )?;
        let update_fn = required(
            instance.get_typed_func::<(f64, i32, i32), i32>(&mut store, exports::UPDATE_AND_DRAW),
            exports::UPDATE_AND_DRAW,
        )?;
        let key_event_fn = required(
            instance.get_typed_func::<(i32, i32), i32>(&mut store, exports::KEY_EVENT),
            exports::KEY_EVENT,
        )?;
        let pointer_event_fn = required(
            instance.get_typed_func::<(i32, i32, i32, i32), i32>(&mut store, exports::POINTER_EVENT),
            exports::POINTER_EVENT,
        )?;
        let cookie_data_ptr_fn = required(
            instance.get_typed_func::<i32, i32>(&mut store, exports::COOKIE_DATA_PTR),
            exports::COOKIE_DATA_PTR,
        )?;
        let on_restart_fn = required(
            instance.get_typed_func::<(), ()>(&mut store, exports::ON_RESTART),
            exports::ON_RESTART,
        )?;

        let defined = required(
            instance.get_typed_func::<(), i32>(&mut store, exports::IS_APP_DEFINED),
            exports::IS_APP_DEFINED,
        )?
        .call(&mut store, ())
        .context("is_app_defined trapped")?;
        if defined == 0 {
            return Err(BridgeError::ModuleContract(
                "module reports no app defined".into(),
            ));
        }

        let music_count = required(
            instance.get_typed_func::<(), i32>(&mut store, exports::MUSIC_COUNT),
            exports::MUSIC_COUNT,
        )?
        .call(&mut store, ())
        .context("music_count trapped")?
        .max(0) as u32;
        let sound_count = required(
            instance.get_typed_func::<(), i32>(&mut store, exports::SOUND_COUNT),
            exports::SOUND_COUNT,
        )?
        .call(&mut store, ())
        .context("sound_count trapped")?
        .max(0) as u32;

        let mut read_shader = |name: &str| -> Result<String, BridgeError> {
            let ptr = required(
                instance.get_typed_func::<(), i32>(&mut store, name),
                name,
            )?
            .call(&mut store, ())
            .with_context(|| format!("{name} trapped"))?;
            super::context::read_cstr_from_memory(memory, &store, ptr as u32)
                .map_err(|e| BridgeError::ModuleContract(format!("{name}: {e}")))
        };
        let sprite_vert_src = read_shader(exports::SPRITE_VERT_SRC)?;
        let sprite_frag_src = read_shader(exports::SPRITE_FRAG_SRC)?;
        let tiled_vert_src = read_shader(exports::TILED_VERT_SRC)?;
        let tiled_frag_src = read_shader(exports::TILED_FRAG_SRC)?;

        debug!(music_count, sound_count, "module instantiated");

        Ok(Self {
            store,
            instance,
            init_fn,
            on_resize_fn,
            update_fn,
            key_event_fn,
            pointer_event_fn,
            cookie_data_ptr_fn,
            on_restart_fn,
            music_count,
            sound_count,
            sprite_vert_src,
            sprite_frag_src,
            tiled_vert_src,
            tiled_frag_src,
        })
    }

    /// Copy restored cookie bytes into module memory.
    ///
    /// Must happen before [`AppInstance::init`]: the module reserves the
    /// buffer via `cookie_data_ptr` and reads it during init.
    pub fn write_cookie_into_module(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        let ptr = self
            .cookie_data_ptr_fn
            .call(&mut self.store, data.len() as i32)
            .context("cookie_data_ptr trapped")?;
        let memory = self.memory()?;
        write_bytes_to_memory(memory, &mut self.store, ptr as u32, data)
            .map_err(|e| BridgeError::ModuleContract(format!("cookie buffer: {e}")))?;
        Ok(())
    }

    pub fn init(&mut self) -> Result<(), BridgeError> {
        self.init_fn
            .call(&mut self.store, ())
            .context("init trapped")?;
        Ok(())
    }

    pub fn on_resize(&mut self, width: i32, height: i32) -> Result<(), BridgeError> {
        self.on_resize_fn
            .call(&mut self.store, (width, height))
            .context("on_resize trapped")?;
        Ok(())
    }

    /// Run one frame. Returns the continuation flag: `false` means the
    /// module asked to quit.
    pub fn update_and_draw(
        &mut self,
        time_ms: f64,
        pointer_x: i32,
        pointer_y: i32,
    ) -> Result<bool, BridgeError> {
        let cont = self
            .update_fn
            .call(&mut self.store, (time_ms, pointer_x, pointer_y))
            .context("update_and_draw trapped")?;
        Ok(cont != 0)
    }

    /// Forward a key transition. Returns the continuation flag.
    pub fn key_event(&mut self, code: i32, down: bool) -> Result<bool, BridgeError> {
        let cont = self
            .key_event_fn
            .call(&mut self.store, (code, down as i32))
            .context("key_event trapped")?;
        Ok(cont != 0)
    }

    /// Forward a pointer button transition. Returns the continuation flag.
    pub fn pointer_event(
        &mut self,
        x: i32,
        y: i32,
        button: i32,
        down: bool,
    ) -> Result<bool, BridgeError> {
        let cont = self
            .pointer_event_fn
            .call(&mut self.store, (x, y, button, down as i32))
            .context("pointer_event trapped")?;
        Ok(cont != 0)
    }

    pub fn on_restart(&mut self) -> Result<(), BridgeError> {
        self.on_restart_fn
            .call(&mut self.store, ())
            .context("on_restart trapped")?;
        Ok(())
    }

    pub fn music_count(&self) -> u32 {
        self.music_count
    }

    pub fn sound_count(&self) -> u32 {
        self.sound_count
    }

    pub fn sprite_vert_src(&self) -> &str {
        &self.sprite_vert_src
    }

    pub fn sprite_frag_src(&self) -> &str {
        &self.sprite_frag_src
    }

    pub fn tiled_vert_src(&self) -> &str {
        &self.tiled_vert_src
    }

    pub fn tiled_frag_src(&self) -> &str {
        &self.tiled_frag_src
    }

    pub fn ctx(&self) -> &BridgeContext {
        self.store.data()
    }

    pub fn ctx_mut(&mut self) -> &mut BridgeContext {
        self.store.data_mut()
    }

    /// Drain the draw commands recorded during the last module call.
    pub fn take_draw_commands(&mut self) -> Vec<super::context::DrawCommand> {
        std::mem::take(&mut self.store.data_mut().draw_commands)
    }

    /// Drain the audio commands recorded during the last module call.
    pub fn take_audio_commands(&mut self) -> Vec<super::context::AudioCommand> {
        std::mem::take(&mut self.store.data_mut().audio_commands)
    }

    /// Take the cookie bytes staged by `write_cookie`, if any.
    pub fn take_cookie_write(&mut self) -> Option<Vec<u8>> {
        self.store.data_mut().cookie_write.take()
    }

    /// Take the pending exclusive display change, if any.
    pub fn take_exclusive_change(&mut self) -> Option<bool> {
        self.store.data_mut().exclusive_change.take()
    }

    fn memory(&self) -> Result<wasmtime::Memory, BridgeError> {
        self.store
            .data()
            .memory
            .ok_or_else(|| BridgeError::ModuleContract("no memory export".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A well-behaved module exporting the full ABI.
    pub(crate) const FULL_ABI_WAT: &str = r#"
        (module
            (memory (export "memory") 2)
            (data (i32.const 1024) "sprite vert\00")
            (data (i32.const 1056) "sprite frag\00")
            (data (i32.const 1088) "tiled vert\00")
            (data (i32.const 1120) "tiled frag\00")
            (func (export "init"))
            (func (export "on_resize") (param i32 i32))
            (func (export "update_and_draw") (param f64 i32 i32) (result i32)
                (i32.const 1))
            (func (export "key_event") (param i32 i32) (result i32)
                (i32.const 1))
            (func (export "pointer_event") (param i32 i32 i32 i32) (result i32)
                (i32.const 1))
            (func (export "is_app_defined") (result i32) (i32.const 1))
            (func (export "music_count") (result i32) (i32.const 2))
            (func (export "sound_count") (result i32) (i32.const 3))
            (func (export "sprite_vert_src") (result i32) (i32.const 1024))
            (func (export "sprite_frag_src") (result i32) (i32.const 1056))
            (func (export "tiled_vert_src") (result i32) (i32.const 1088))
            (func (export "tiled_frag_src") (result i32) (i32.const 1120))
            (func (export "cookie_data_ptr") (param i32) (result i32)
                (i32.const 4096))
            (func (export "on_restart"))
        )
    "#;

    fn instantiate(wat_src: &str) -> Result<AppInstance, BridgeError> {
        let engine = BridgeEngine::new().unwrap();
        let wasm = wat::parse_str(wat_src).unwrap();
        let module = engine.load_module(&wasm).unwrap();
        let linker = Linker::new(engine.engine());
        AppInstance::new(
            &engine,
            &module,
            &linker,
            BridgeContext::new(Vec::new(), Vec::new()),
        )
    }

    #[test]
    fn full_abi_module_instantiates() {
        let app = instantiate(FULL_ABI_WAT).unwrap();
        assert_eq!(app.music_count(), 2);
        assert_eq!(app.sound_count(), 3);
        assert_eq!(app.sprite_vert_src(), "sprite vert");
        assert_eq!(app.sprite_frag_src(), "sprite frag");
        assert_eq!(app.tiled_vert_src(), "tiled vert");
        assert_eq!(app.tiled_frag_src(), "tiled frag");
    }

    #[test]
    fn missing_export_is_contract_violation() {
        let wat_src = FULL_ABI_WAT.replace(r#"(func (export "on_restart"))"#, "");
        let err = instantiate(&wat_src).unwrap_err();
        assert!(matches!(err, BridgeError::ModuleContract(_)));
        assert!(err.to_string().contains("on_restart"));
    }

    #[test]
    fn mistyped_export_is_contract_violation() {
        let wat_src = FULL_ABI_WAT.replace(
            r#"(func (export "on_resize") (param i32 i32))"#,
            r#"(func (export "on_resize") (param i32))"#,
        );
        let err = instantiate(&wat_src).unwrap_err();
        assert!(matches!(err, BridgeError::ModuleContract(_)));
    }

    #[test]
    fn undefined_app_is_contract_violation() {
        let wat_src = FULL_ABI_WAT.replace(
            r#"(func (export "is_app_defined") (result i32) (i32.const 1))"#,
            r#"(func (export "is_app_defined") (result i32) (i32.const 0))"#,
        );
        let err = instantiate(&wat_src).unwrap_err();
        assert!(matches!(err, BridgeError::ModuleContract(_)));
    }

    #[test]
    fn missing_memory_is_contract_violation() {
        let wat_src = FULL_ABI_WAT.replace(r#"(memory (export "memory") 2)"#, "(memory 2)");
        let err = instantiate(&wat_src).unwrap_err();
        assert!(matches!(err, BridgeError::ModuleContract(_)));
    }

    #[test]
    fn continuation_flags_flow_through() {
        let mut app = instantiate(FULL_ABI_WAT).unwrap();
        app.init().unwrap();
        app.on_resize(640, 480).unwrap();
        assert!(app.update_and_draw(16.0, 5, 5).unwrap());
        assert!(app.key_event(0, true).unwrap());
        assert!(app.pointer_event(1, 2, 0, true).unwrap());
        app.on_restart().unwrap();
    }

    #[test]
    fn quit_flag_comes_back_false() {
        let wat_src = FULL_ABI_WAT.replace(
            "(func (export \"update_and_draw\") (param f64 i32 i32) (result i32)\n                (i32.const 1))",
            "(func (export \"update_and_draw\") (param f64 i32 i32) (result i32)\n                (i32.const 0))",
        );
        let mut app = instantiate(&wat_src).unwrap();
        assert!(!app.update_and_draw(0.0, 0, 0).unwrap());
    }

    #[test]
    fn trap_surfaces_as_runtime_error() {
        let wat_src = FULL_ABI_WAT.replace(
            r#"(func (export "init"))"#,
            r#"(func (export "init") (unreachable))"#,
        );
        let mut app = instantiate(&wat_src).unwrap();
        assert!(matches!(app.init(), Err(BridgeError::Runtime(_))));
    }

    #[test]
    fn restart_calls_module_once_per_legal_transition() {
        // The module counts on_restart invocations so the test can verify
        // the phase guards: only a Quit -> Running transition reaches it.
        let wat_src = FULL_ABI_WAT.replace(
            r#"(func (export "on_restart"))"#,
            r#"(global $restarts (mut i32) (i32.const 0))
            (func (export "on_restart")
                (global.set $restarts (i32.add (global.get $restarts) (i32.const 1))))
            (func (export "restart_count") (result i32) (global.get $restarts))"#,
        );
        let mut app = instantiate(&wat_src).unwrap();
        let count_fn = app
            .instance
            .get_typed_func::<(), i32>(&mut app.store, "restart_count")
            .unwrap();

        let mut lc = crate::lifecycle::Lifecycle::new(0);
        lc.set_audio_total(0);
        assert!(lc.start());

        // Restart while running refuses without touching the module.
        assert!(!lc.restart());
        assert_eq!(count_fn.call(&mut app.store, ()).unwrap(), 0);

        assert!(lc.quit());
        assert!(lc.restart());
        app.on_restart().unwrap();
        assert_eq!(count_fn.call(&mut app.store, ()).unwrap(), 1);

        // A second restart needs another quit first.
        assert!(!lc.restart());
        assert_eq!(count_fn.call(&mut app.store, ()).unwrap(), 1);

        assert!(lc.quit());
        assert!(lc.restart());
        app.on_restart().unwrap();
        assert_eq!(count_fn.call(&mut app.store, ()).unwrap(), 2);
    }

    #[test]
    fn cookie_lands_in_module_memory() {
        let mut app = instantiate(FULL_ABI_WAT).unwrap();
        app.write_cookie_into_module(b"saved").unwrap();
        let memory = app.store.data().memory.unwrap();
        let bytes =
            super::super::context::read_bytes_from_memory(memory, &app.store, 4096, 5).unwrap();
        assert_eq!(bytes, b"saved");
    }
}
