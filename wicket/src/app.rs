//! Event loop integration
//!
//! The bridge is driven by winit with `ControlFlow::Poll`: every pass
//! through the loop drains loader completions, then a redraw request runs
//! one frame. All module calls happen on this thread; the loader is the
//! only other source of work and it communicates through the channel.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::keyboard::PhysicalKey;
use winit::window::{Fullscreen, Window, WindowId};

use wicket_shared::MAX_COOKIE_SIZE;

use crate::audio::AudioPlayer;
use crate::config::Config;
use crate::cookie::{CookieStore, resolve_cookie_dir};
use crate::error::BridgeError;
use crate::ffi::register_host_functions;
use crate::graphics::{GraphicsContext, Renderer, ShaderSources, init_graphics};
use crate::input::{PointerState, map_key};
use crate::lifecycle::{Lifecycle, Phase};
use crate::loader::{CORE_TARGETS, LoadEvent, LoadPayload, LoadTarget, Loader, TextureImage};
use crate::surface::SurfaceTracker;
use crate::wasm::{AppInstance, BridgeContext, BridgeEngine};

/// Events injected into the loop from outside the bridge thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    Restart,
}

/// Handle given to host callbacks for driving the bridge from outside.
#[derive(Clone)]
pub struct BridgeHandle {
    proxy: EventLoopProxy<BridgeEvent>,
}

impl BridgeHandle {
    /// Request a restart. Honored only while the bridge sits in Quit.
    pub fn restart(&self) {
        let _ = self.proxy.send_event(BridgeEvent::Restart);
    }
}

/// Host integration points. Every field is optional; the `wicket` binary
/// wires file-backed defaults.
#[derive(Default)]
pub struct HostCallbacks {
    pub on_load_progress: Option<Box<dyn FnMut(f64, f64)>>,
    pub on_load: Option<Box<dyn FnMut(&BridgeHandle)>>,
    pub on_quit: Option<Box<dyn FnMut(&BridgeHandle)>>,
    pub on_error: Option<Box<dyn FnMut(&BridgeError)>>,
    /// Returns the persisted cookie as base64 text.
    pub read_cookie: Option<Box<dyn FnMut() -> Option<String>>>,
    /// Persists the cookie as base64 text.
    pub write_cookie: Option<Box<dyn FnMut(&str)>>,
}

/// Run the bridge to completion for the configured module. A bridge
/// failure comes back as the error.
pub fn run(config: Config, callbacks: HostCallbacks) -> Result<()> {
    let event_loop = EventLoop::<BridgeEvent>::with_user_event()
        .build()
        .context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let proxy = event_loop.create_proxy();
    let mut app = App::new(config, callbacks, proxy)?;
    event_loop.run_app(&mut app).context("Event loop failed")?;
    match app.failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

struct App {
    config: Config,
    callbacks: HostCallbacks,
    handle: BridgeHandle,
    cookie_store: Option<CookieStore>,
    module_id: String,
    base: String,

    window: Option<Arc<Window>>,
    gfx: Option<GraphicsContext>,
    renderer: Option<Renderer>,

    engine: BridgeEngine,
    loader: Loader,
    load_events: UnboundedReceiver<LoadEvent>,
    lifecycle: Lifecycle,

    instance: Option<AppInstance>,
    audio: Option<AudioPlayer>,

    pointer: PointerState,
    tracker: SurfaceTracker,
    start_time: Instant,

    /// First failure, handed back to the caller of [`run`].
    failure: Option<BridgeError>,

    // Core payloads staged until instantiation.
    module_bytes: Option<Vec<u8>>,
    sprite_atlas: Option<Vec<u8>>,
    tiled_atlas: Option<Vec<u8>>,
    sprite_texture: Option<TextureImage>,
    tiled_texture: Option<TextureImage>,
}

impl App {
    fn new(
        config: Config,
        callbacks: HostCallbacks,
        proxy: EventLoopProxy<BridgeEvent>,
    ) -> Result<Self> {
        let base = config.resources.base.clone().unwrap_or_default();
        let module_id = if base.is_empty() { "default".to_string() } else { base.clone() };

        // Default cookie persistence only when the host supplies no
        // accessors of its own.
        let cookie_store = if callbacks.read_cookie.is_none() && callbacks.write_cookie.is_none() {
            match resolve_cookie_dir(config.resources.cookie_dir.as_deref()) {
                Ok(dir) => Some(CookieStore::new(dir)),
                Err(e) => {
                    warn!(error = %e, "cookie persistence disabled");
                    None
                }
            }
        } else {
            None
        };

        let (loader, load_events) = Loader::new()?;
        for target in CORE_TARGETS {
            loader.spawn(&base, target);
        }

        Ok(Self {
            config,
            callbacks,
            handle: BridgeHandle { proxy },
            cookie_store,
            module_id,
            base,
            window: None,
            gfx: None,
            renderer: None,
            engine: BridgeEngine::new()?,
            loader,
            load_events,
            lifecycle: Lifecycle::new(CORE_TARGETS.len()),
            instance: None,
            audio: None,
            pointer: PointerState::new(),
            tracker: SurfaceTracker::new(),
            start_time: Instant::now(),
            failure: None,
            module_bytes: None,
            sprite_atlas: None,
            tiled_atlas: None,
            sprite_texture: None,
            tiled_texture: None,
        })
    }

    /// Latch Broken exactly once: log, tear down, notify the host. The
    /// error is kept so [`run`] can return it; without an `on_error`
    /// callback the loop also exits.
    fn fail(&mut self, err: BridgeError) {
        if !self.lifecycle.fail() {
            return;
        }
        error!(error = %err, "bridge failed");
        if let Some(audio) = &mut self.audio {
            audio.handle(crate::wasm::AudioCommand::StopMusic);
        }
        self.instance = None;
        self.renderer = None;
        if let Some(on_error) = &mut self.callbacks.on_error {
            on_error(&err);
        }
        self.failure = Some(err);
    }

    fn report_progress(&mut self) {
        if self.lifecycle.phase() != Phase::Loading {
            return;
        }
        if let Some(cb) = &mut self.callbacks.on_load_progress {
            cb(self.lifecycle.core_ratio(), self.lifecycle.audio_ratio());
        }
    }

    fn drain_load_events(&mut self) {
        while let Ok(event) = self.load_events.try_recv() {
            if self.lifecycle.phase() == Phase::Broken {
                continue;
            }
            match event.result {
                Err(e) => self.fail(e),
                Ok(payload) => self.accept_payload(event.target, payload),
            }
            self.report_progress();
        }
        self.try_instantiate();
        self.try_start();
    }

    fn accept_payload(&mut self, target: LoadTarget, payload: LoadPayload) {
        match (target, payload) {
            (LoadTarget::Module, LoadPayload::Module(bytes)) => {
                self.module_bytes = Some(bytes);
                self.lifecycle.core_loaded_one();
            }
            (LoadTarget::SpriteAtlas, LoadPayload::Blob(blob)) => {
                self.sprite_atlas = Some(blob);
                self.lifecycle.core_loaded_one();
            }
            (LoadTarget::TiledAtlas, LoadPayload::Blob(blob)) => {
                self.tiled_atlas = Some(blob);
                self.lifecycle.core_loaded_one();
            }
            (LoadTarget::SpriteTexture, LoadPayload::Texture(image)) => {
                self.sprite_texture = Some(image);
                self.lifecycle.core_loaded_one();
            }
            (LoadTarget::TiledTexture, LoadPayload::Texture(image)) => {
                self.tiled_texture = Some(image);
                self.lifecycle.core_loaded_one();
            }
            (LoadTarget::Music(id), LoadPayload::Clip(bytes)) => {
                self.accept_clip(target, id, bytes, true);
            }
            (LoadTarget::Sound(id), LoadPayload::Clip(bytes)) => {
                self.accept_clip(target, id, bytes, false);
            }
            (target, payload) => {
                warn!(?target, ?payload, "mismatched load payload, dropping");
            }
        }
    }

    fn accept_clip(&mut self, target: LoadTarget, id: u32, bytes: Vec<u8>, music: bool) {
        let Some(audio) = &mut self.audio else {
            warn!(?target, "clip arrived before audio player, dropping");
            return;
        };
        let inserted = if music {
            audio.insert_music(id, bytes)
        } else {
            audio.insert_sound(id, bytes)
        };
        match inserted {
            Ok(()) => self.lifecycle.audio_loaded_one(),
            Err(e) => self.fail(BridgeError::ResourceLoad {
                target: target.file_name(),
                reason: format!("{e:#}"),
            }),
        }
    }

    /// Instantiate once every core target and the GPU are ready.
    fn try_instantiate(&mut self) {
        if self.instance.is_some()
            || self.lifecycle.phase() != Phase::Loading
            || !self.lifecycle.core_complete()
            || self.gfx.is_none()
        {
            return;
        }
        if let Err(e) = self.instantiate() {
            self.fail(e);
        }
    }

    fn instantiate(&mut self) -> Result<(), BridgeError> {
        // Guarded by try_instantiate; bail quietly if called early.
        let (
            Some(module_bytes),
            Some(sprite_atlas),
            Some(tiled_atlas),
            Some(sprite_texture),
            Some(tiled_texture),
        ) = (
            self.module_bytes.take(),
            self.sprite_atlas.take(),
            self.tiled_atlas.take(),
            self.sprite_texture.take(),
            self.tiled_texture.take(),
        )
        else {
            return Ok(());
        };
        let Some(gfx) = self.gfx.as_ref() else {
            return Ok(());
        };

        let module = self.engine.load_module(&module_bytes)?;
        let mut linker = wasmtime::Linker::new(self.engine.engine());
        register_host_functions(&mut linker)?;

        let ctx = BridgeContext::new(sprite_atlas, tiled_atlas);
        let instance = AppInstance::new(&self.engine, &module, &linker, ctx)?;

        let renderer = Renderer::new(
            gfx,
            ShaderSources {
                sprite_vert: instance.sprite_vert_src(),
                sprite_frag: instance.sprite_frag_src(),
                tiled_vert: instance.tiled_vert_src(),
                tiled_frag: instance.tiled_frag_src(),
            },
            &sprite_texture,
            &tiled_texture,
        )?;

        let music_count = instance.music_count();
        let sound_count = instance.sound_count();
        self.audio = Some(AudioPlayer::new(
            music_count,
            sound_count,
            self.config.audio.master_volume,
        ));
        self.lifecycle
            .set_audio_total((music_count + sound_count) as usize);
        for id in 0..music_count {
            self.loader.spawn(&self.base, LoadTarget::Music(id));
        }
        for id in 0..sound_count {
            self.loader.spawn(&self.base, LoadTarget::Sound(id));
        }

        self.renderer = Some(renderer);
        self.instance = Some(instance);
        info!(music_count, sound_count, "module instantiated");
        Ok(())
    }

    /// Loading -> Running once every target is in: cookie, init, resize.
    fn try_start(&mut self) {
        if !self.lifecycle.start() {
            return;
        }
        if let Err(e) = self.start() {
            self.fail(e);
            return;
        }
        if let Some(on_load) = &mut self.callbacks.on_load {
            on_load(&self.handle);
        }
    }

    fn start(&mut self) -> Result<(), BridgeError> {
        if let Some(cookie) = self.restore_cookie() {
            if let Some(instance) = self.instance.as_mut() {
                instance.write_cookie_into_module(&cookie)?;
            }
        }
        if let Some(instance) = self.instance.as_mut() {
            instance.init()?;
        }
        self.apply_surface_geometry(true)?;
        info!("module running");
        Ok(())
    }

    /// Cookie from the host accessor or the file store, decoded and
    /// size-checked; anything invalid counts as absent.
    fn restore_cookie(&mut self) -> Option<Vec<u8>> {
        let data = if let Some(read) = &mut self.callbacks.read_cookie {
            let text = read()?;
            match BASE64.decode(text.trim()) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "host cookie is not valid base64, ignoring");
                    return None;
                }
            }
        } else {
            self.cookie_store.as_ref()?.load(&self.module_id)?
        };
        if data.is_empty() {
            return None;
        }
        if data.len() > MAX_COOKIE_SIZE {
            warn!(size = data.len(), "cookie over size cap, ignoring");
            return None;
        }
        Some(data)
    }

    fn persist_cookie(&mut self, data: &[u8]) {
        if let Some(write) = &mut self.callbacks.write_cookie {
            write(&BASE64.encode(data));
        } else if let Some(store) = &self.cookie_store {
            if let Err(e) = store.store(&self.module_id, data) {
                warn!(error = %e, "failed to persist cookie");
            }
        }
    }

    /// Window metrics in logical pixels plus scale factor.
    fn window_metrics(&self) -> Option<(f64, f64, f64)> {
        let window = self.window.as_ref()?;
        let scale = window.scale_factor();
        let size = window.inner_size().to_logical::<f64>(scale);
        Some((size.width, size.height, scale))
    }

    /// Recompute the backing store when logical size or scale changed.
    /// `force` pushes the current geometry to a freshly started module.
    fn apply_surface_geometry(&mut self, force: bool) -> Result<(), BridgeError> {
        let Some((width, height, scale)) = self.window_metrics() else {
            return Ok(());
        };
        let changed = self.tracker.update(width, height, scale);
        let backing = match (changed, force) {
            (Some(backing), _) => backing,
            (None, true) => (
                crate::surface::backing_extent(width, scale),
                crate::surface::backing_extent(height, scale),
            ),
            (None, false) => return Ok(()),
        };
        if let Some(gfx) = &mut self.gfx {
            gfx.resize(backing.0, backing.1);
            if let Some(renderer) = &mut self.renderer {
                renderer.surface_resized(gfx);
            }
        }
        // The module draws in backing-store pixels, so it is told the
        // backing extents, not the logical ones.
        if let Some(instance) = &mut self.instance {
            instance.on_resize(backing.0 as i32, backing.1 as i32)?;
        }
        Ok(())
    }

    /// One frame: geometry, module update, then recorded command playback.
    fn frame(&mut self) {
        if self.lifecycle.phase() != Phase::Running {
            return;
        }
        if let Err(e) = self.apply_surface_geometry(false) {
            self.fail(e);
            return;
        }

        let time_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let (px, py) = self.pointer.position();

        let fullscreen = self
            .window
            .as_ref()
            .is_some_and(|w| w.fullscreen().is_some());
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        instance.ctx_mut().exclusive_display = fullscreen;

        let cont = match instance.update_and_draw(time_ms, px, py) {
            Ok(cont) => cont,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        self.after_module_call();
        if !cont {
            self.quit();
        }
    }

    /// Apply everything the module staged during its last call.
    fn after_module_call(&mut self) {
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        let draw_commands = instance.take_draw_commands();
        let audio_commands = instance.take_audio_commands();
        let cookie = instance.take_cookie_write();
        let exclusive = instance.take_exclusive_change();

        if let Some(data) = cookie {
            self.persist_cookie(&data);
        }
        if let Some(enter) = exclusive {
            if let Some(window) = &self.window {
                window.set_fullscreen(enter.then(|| Fullscreen::Borderless(None)));
            }
        }
        if let Some(audio) = &mut self.audio {
            for command in audio_commands {
                audio.handle(command);
            }
        }
        if !draw_commands.is_empty() {
            if let (Some(gfx), Some(renderer)) = (self.gfx.as_mut(), self.renderer.as_mut()) {
                if let Err(e) = renderer.execute(gfx, draw_commands) {
                    self.fail(e);
                }
            }
        }
    }

    /// Running -> Quit: release input, leave fullscreen, pause music.
    fn quit(&mut self) {
        if !self.lifecycle.quit() {
            return;
        }
        self.pointer.reset();
        if let Some(window) = &self.window {
            window.set_fullscreen(None);
        }
        if let Some(audio) = &mut self.audio {
            audio.pause_music();
        }
        info!("module quit");
        if let Some(on_quit) = &mut self.callbacks.on_quit {
            on_quit(&self.handle);
        }
    }

    fn restart(&mut self) {
        if !self.lifecycle.restart() {
            return;
        }
        if let Some(audio) = &mut self.audio {
            audio.resume_music();
        }
        let result = self
            .instance
            .as_mut()
            .map(|instance| instance.on_restart())
            .unwrap_or(Ok(()));
        if let Err(e) = result {
            self.fail(e);
        } else {
            info!("module restarted");
        }
    }

    /// Forward a continuation flag, quitting on `false`.
    fn handle_continuation(&mut self, cont: Result<bool, BridgeError>) {
        match cont {
            Ok(true) => {}
            Ok(false) => self.quit(),
            Err(e) => self.fail(e),
        }
    }

    /// True when the loop should stop turning after a failure. A host
    /// `on_error` callback keeps it alive so the host can still restart
    /// or inspect; otherwise spinning forever would hide the error.
    fn exit_after_failure(failed: bool, has_on_error: bool) -> bool {
        failed && !has_on_error
    }
}

/// Pointer coordinates for the module, in backing-store pixels. Window
/// physical pixels already are that space, so no scaling is applied.
fn backing_position(position: winit::dpi::PhysicalPosition<f64>) -> (i32, i32) {
    (position.x as i32, position.y as i32)
}

impl ApplicationHandler<BridgeEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail(BridgeError::Runtime(anyhow::anyhow!(
                    "failed to create window: {e}"
                )));
                event_loop.exit();
                return;
            }
        };
        match init_graphics(window.clone()) {
            Ok(gfx) => {
                self.gfx = Some(gfx);
                self.window = Some(window);
                self.try_instantiate();
                self.try_start();
            }
            Err(e) => {
                self.fail(BridgeError::Runtime(e));
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: BridgeEvent) {
        match event {
            BridgeEvent::Restart => self.restart(),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.frame();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                // Applied lazily at the next frame via the tracker.
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat || self.lifecycle.phase() != Phase::Running {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                let Some(code) = map_key(key) else {
                    return;
                };
                let down = event.state == ElementState::Pressed;
                if let Some(instance) = self.instance.as_mut() {
                    let cont = instance.key_event(code.as_u8() as i32, down);
                    self.after_module_call();
                    self.handle_continuation(cont);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = backing_position(position);
                self.pointer.mouse_moved(x, y);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if self.lifecycle.phase() != Phase::Running {
                    return;
                }
                let Some(ev) = self.pointer.mouse_button(state, button) else {
                    return;
                };
                if let Some(instance) = self.instance.as_mut() {
                    let cont = instance.pointer_event(ev.x, ev.y, ev.button, ev.down);
                    self.after_module_call();
                    self.handle_continuation(cont);
                }
            }
            WindowEvent::Touch(touch) => {
                if self.lifecycle.phase() != Phase::Running {
                    return;
                }
                let (x, y) = backing_position(touch.location);
                let Some(ev) = self.pointer.touch(touch.id, touch.phase, x, y) else {
                    return;
                };
                if let Some(instance) = self.instance.as_mut() {
                    let cont = instance.pointer_event(ev.x, ev.y, ev.button, ev.down);
                    self.after_module_call();
                    self.handle_continuation(cont);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.drain_load_events();
        if Self::exit_after_failure(self.failure.is_some(), self.callbacks.on_error.is_some()) {
            event_loop.exit();
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
