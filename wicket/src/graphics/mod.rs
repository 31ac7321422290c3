//! wgpu rendering for recorded draw commands
//!
//! Two pipelines share one binding convention (see [`pipeline`]):
//!
//! - the sprite pipeline draws 28-byte-stride vertex blobs straight to the
//!   swapchain, sampling the sprite atlas, and also composites the tiled
//!   target during `composite_tiles`
//! - the tiled pipeline draws 16-byte-stride blobs into an offscreen
//!   target sized by `set_tiled_surface_dims`, sampling the tiled atlas
//!
//! Recorded commands from one module call are executed in order into a
//! single command encoder, then submitted and presented. The scissor rect
//! applies to sprite-pipeline draws and clears on the swapchain and is
//! reset after every execution so clip state never leaks into the next
//! frame. A clear under an active scissor touches only the clipped
//! region; an unscissored clear wipes the whole attachment.

pub mod pipeline;
pub mod vertex;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use bytemuck::{Pod, Zeroable};
use tracing::{info, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use wicket_shared::{SPRITE_VERTEX_STRIDE, TILED_VERTEX_STRIDE};

use crate::error::BridgeError;
use crate::loader::TextureImage;
use crate::wasm::DrawCommand;

/// Core wgpu objects for one window.
pub struct GraphicsContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
}

impl GraphicsContext {
    /// Initialize wgpu against the given window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to find suitable GPU adapter")?;

        info!("Using GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Wicket Device"),
                    required_features: wgpu::Features::default(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .context("Failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
        })
    }

    /// Apply a new backing-store size to the swapchain.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
    }
}

/// Uniforms shared by both pipelines: render target size in pixels (xy)
/// and bound texture size in pixels (zw).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PassUniforms {
    target_size: [f32; 2],
    tex_size: [f32; 2],
}

struct TextureBundle {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

fn create_atlas_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    atlas: &TextureImage,
) -> TextureBundle {
    let width = atlas.width.max(1);
    let height = atlas.height.max(1);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    if atlas.pixels.len() == (width * height * 4) as usize {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &atlas.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    } else if !atlas.pixels.is_empty() {
        warn!(label, "atlas pixel data does not match dimensions, leaving texture empty");
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureBundle {
        texture,
        view,
        width,
        height,
    }
}

fn create_target_texture(device: &wgpu::Device, width: u32, height: u32) -> TextureBundle {
    let width = width.max(1);
    let height = height.max(1);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("tiled target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureBundle {
        texture,
        view,
        width,
        height,
    }
}

/// Host-owned shader for scissored clears: a full-target triangle in a
/// uniform color, clipped by the pass scissor rect.
const CLEAR_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> clear_color: vec4<f32>;

@vertex
fn vs(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    var corners = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    return vec4<f32>(corners[index], 0.0, 1.0);
}

@fragment
fn fs() -> @location(0) vec4<f32> {
    return clear_color;
}
"#;

/// How a recorded `clear` is realized.
#[derive(Debug, PartialEq)]
enum ClearAction {
    /// No scissor: stage the color as the next pass's load op.
    Deferred,
    /// Scissor active: encode a clipped clear now, after flushing any
    /// previously staged full clear so ordering is preserved.
    Scissored { flush: Option<wgpu::Color> },
}

fn route_clear(
    scissor_active: bool,
    pending: &mut Option<wgpu::Color>,
    color: wgpu::Color,
) -> ClearAction {
    if scissor_active {
        ClearAction::Scissored { flush: pending.take() }
    } else {
        *pending = Some(color);
        ClearAction::Deferred
    }
}

/// Load op for an offscreen tile pass. Every redraw starts from a
/// transparent target regardless of what was drawn before, so scrolled
/// tile geometry never blends over the previous redraw.
fn tiled_pass_load() -> wgpu::LoadOp<wgpu::Color> {
    wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
}

/// Encode an unscissored clear of the whole attachment.
fn full_clear_pass(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    color: wgpu::Color,
) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("full clear"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

/// Executes recorded draw commands with module-supplied shaders.
pub struct Renderer {
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    sprite_pipeline: wgpu::RenderPipeline,
    tiled_pipeline: wgpu::RenderPipeline,
    clear_pipeline: wgpu::RenderPipeline,
    clear_bind_layout: wgpu::BindGroupLayout,
    sprite_atlas: TextureBundle,
    tiled_atlas: TextureBundle,
    tiled_target: Option<TextureBundle>,
    sprite_uniforms: wgpu::Buffer,
    composite_uniforms: wgpu::Buffer,
    tiled_uniforms: wgpu::Buffer,
    sprite_bind_group: wgpu::BindGroup,
    composite_bind_group: Option<wgpu::BindGroup>,
    tiled_bind_group: Option<wgpu::BindGroup>,
    scissor: Option<(u32, u32, u32, u32)>,
    pending_clear: Option<wgpu::Color>,
    surface_size: (u32, u32),
}

/// Module shader source for both pipelines, as read at instantiation.
pub struct ShaderSources<'a> {
    pub sprite_vert: &'a str,
    pub sprite_frag: &'a str,
    pub tiled_vert: &'a str,
    pub tiled_frag: &'a str,
}

impl Renderer {
    pub fn new(
        gfx: &GraphicsContext,
        shaders: ShaderSources<'_>,
        sprite_atlas: &TextureImage,
        tiled_atlas: &TextureImage,
    ) -> Result<Self, BridgeError> {
        let device = &gfx.device;

        let sprite_vs = pipeline::create_shader(device, "sprite vs", shaders.sprite_vert)?;
        let sprite_fs = pipeline::create_shader(device, "sprite fs", shaders.sprite_frag)?;
        let tiled_vs = pipeline::create_shader(device, "tiled vs", shaders.tiled_vert)?;
        let tiled_fs = pipeline::create_shader(device, "tiled fs", shaders.tiled_frag)?;

        let bind_group_layout = pipeline::create_bind_group_layout(device, "pass bindings");

        let sprite_pipeline = pipeline::create_pipeline(
            device,
            "sprite pipeline",
            gfx.config.format,
            &sprite_vs,
            &sprite_fs,
            vertex::sprite_vertex_layout(),
            &bind_group_layout,
        )?;
        // The tiled pipeline renders into the offscreen target, which has
        // a fixed format independent of the swapchain.
        let tiled_pipeline = pipeline::create_pipeline(
            device,
            "tiled pipeline",
            wgpu::TextureFormat::Rgba8UnormSrgb,
            &tiled_vs,
            &tiled_fs,
            vertex::tiled_vertex_layout(),
            &bind_group_layout,
        )?;

        let clear_bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("clear bindings"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let clear_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("clear shader"),
            source: wgpu::ShaderSource::Wgsl(CLEAR_SHADER.into()),
        });
        let clear_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("clear pipeline"),
            bind_group_layouts: &[&clear_bind_layout],
            push_constant_ranges: &[],
        });
        let clear_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("clear pipeline"),
            layout: Some(&clear_layout),
            vertex: wgpu::VertexState {
                module: &clear_module,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &clear_module,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gfx.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atlas sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let sprite_atlas = create_atlas_texture(device, &gfx.queue, "sprite atlas", sprite_atlas);
        let tiled_atlas = create_atlas_texture(device, &gfx.queue, "tiled atlas", tiled_atlas);

        let surface_size = (gfx.config.width, gfx.config.height);
        let sprite_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sprite uniforms"),
            contents: bytemuck::bytes_of(&PassUniforms {
                target_size: [surface_size.0 as f32, surface_size.1 as f32],
                tex_size: [sprite_atlas.width as f32, sprite_atlas.height as f32],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let composite_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("composite uniforms"),
            contents: bytemuck::bytes_of(&PassUniforms {
                target_size: [surface_size.0 as f32, surface_size.1 as f32],
                tex_size: [1.0, 1.0],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let tiled_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tiled uniforms"),
            contents: bytemuck::bytes_of(&PassUniforms {
                target_size: [1.0, 1.0],
                tex_size: [tiled_atlas.width as f32, tiled_atlas.height as f32],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sprite_bind_group = Self::bind(
            device,
            &bind_group_layout,
            &sprite_uniforms,
            &sprite_atlas.view,
            &sampler,
            "sprite bindings",
        );

        Ok(Self {
            bind_group_layout,
            sampler,
            sprite_pipeline,
            tiled_pipeline,
            clear_pipeline,
            clear_bind_layout,
            sprite_atlas,
            tiled_atlas,
            tiled_target: None,
            sprite_uniforms,
            composite_uniforms,
            tiled_uniforms,
            sprite_bind_group,
            composite_bind_group: None,
            tiled_bind_group: None,
            scissor: None,
            pending_clear: None,
            surface_size,
        })
    }

    fn bind(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniforms: &wgpu::Buffer,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        label: &str,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Propagate a new swapchain size into the surface-targeting uniforms.
    pub fn surface_resized(&mut self, gfx: &GraphicsContext) {
        self.surface_size = (gfx.config.width, gfx.config.height);
        let target = [self.surface_size.0 as f32, self.surface_size.1 as f32];
        gfx.queue.write_buffer(
            &self.sprite_uniforms,
            0,
            bytemuck::bytes_of(&PassUniforms {
                target_size: target,
                tex_size: [self.sprite_atlas.width as f32, self.sprite_atlas.height as f32],
            }),
        );
        let tiled_size = self
            .tiled_target
            .as_ref()
            .map(|t| [t.width as f32, t.height as f32])
            .unwrap_or([1.0, 1.0]);
        gfx.queue.write_buffer(
            &self.composite_uniforms,
            0,
            bytemuck::bytes_of(&PassUniforms {
                target_size: target,
                tex_size: tiled_size,
            }),
        );
    }

    fn apply_tiled_dims(&mut self, gfx: &GraphicsContext, w: i32, h: i32) {
        let (w, h) = (w.max(1) as u32, h.max(1) as u32);
        if self
            .tiled_target
            .as_ref()
            .is_some_and(|t| t.width == w && t.height == h)
        {
            return;
        }
        let target = create_target_texture(&gfx.device, w, h);
        gfx.queue.write_buffer(
            &self.tiled_uniforms,
            0,
            bytemuck::bytes_of(&PassUniforms {
                target_size: [w as f32, h as f32],
                tex_size: [self.tiled_atlas.width as f32, self.tiled_atlas.height as f32],
            }),
        );
        gfx.queue.write_buffer(
            &self.composite_uniforms,
            0,
            bytemuck::bytes_of(&PassUniforms {
                target_size: [self.surface_size.0 as f32, self.surface_size.1 as f32],
                tex_size: [w as f32, h as f32],
            }),
        );
        self.tiled_bind_group = Some(Self::bind(
            &gfx.device,
            &self.bind_group_layout,
            &self.tiled_uniforms,
            &self.tiled_atlas.view,
            &self.sampler,
            "tiled bindings",
        ));
        self.composite_bind_group = Some(Self::bind(
            &gfx.device,
            &self.bind_group_layout,
            &self.composite_uniforms,
            &target.view,
            &self.sampler,
            "composite bindings",
        ));
        self.tiled_target = Some(target);
    }

    fn clamp_scissor(&self, x: i32, y: i32, w: i32, h: i32) -> Option<(u32, u32, u32, u32)> {
        let (sw, sh) = self.surface_size;
        if w <= 0 || h <= 0 {
            return Some((0, 0, 0, 0));
        }
        let x = x.clamp(0, sw as i32) as u32;
        let y = y.clamp(0, sh as i32) as u32;
        let w = (w as u32).min(sw - x);
        let h = (h as u32).min(sh - y);
        Some((x, y, w, h))
    }

    /// Execute one module call's worth of recorded commands and present.
    pub fn execute(
        &mut self,
        gfx: &mut GraphicsContext,
        commands: Vec<DrawCommand>,
    ) -> Result<(), BridgeError> {
        let frame = match gfx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                // Reconfigure and drop this frame; the next tick redraws.
                gfx.surface.configure(&gfx.device, &gfx.config);
                self.scissor = None;
                return Ok(());
            }
            Err(e) => return Err(BridgeError::Runtime(anyhow!("surface error: {e}"))),
        };
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        for command in commands {
            match command {
                DrawCommand::SetScissor { x, y, w, h } => {
                    self.scissor = self.clamp_scissor(x, y, w, h);
                }
                DrawCommand::Clear { r, g, b } => {
                    let color = wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: 1.0,
                    };
                    match route_clear(self.scissor.is_some(), &mut self.pending_clear, color) {
                        ClearAction::Deferred => {}
                        ClearAction::Scissored { flush } => {
                            if let Some(staged) = flush {
                                full_clear_pass(&mut encoder, &surface_view, staged);
                            }
                            self.scissored_clear(gfx, &mut encoder, &surface_view, color);
                        }
                    }
                }
                DrawCommand::SetTiledSurfaceDims { w, h } => {
                    self.apply_tiled_dims(gfx, w, h);
                }
                DrawCommand::DrawSprites(bytes) => {
                    self.surface_draw(
                        gfx,
                        &mut encoder,
                        &surface_view,
                        &bytes,
                        SPRITE_VERTEX_STRIDE,
                        false,
                    );
                }
                DrawCommand::CompositeTiles(bytes) => {
                    if self.composite_bind_group.is_none() {
                        warn!("composite_tiles before set_tiled_surface_dims, dropping");
                        continue;
                    }
                    self.surface_draw(
                        gfx,
                        &mut encoder,
                        &surface_view,
                        &bytes,
                        SPRITE_VERTEX_STRIDE,
                        true,
                    );
                }
                DrawCommand::DrawTilesToSurface(bytes) => {
                    self.tiled_draw(gfx, &mut encoder, &bytes);
                }
            }
        }

        // A clear with no following draw still has to land.
        if let Some(color) = self.pending_clear.take() {
            full_clear_pass(&mut encoder, &surface_view, color);
        }

        gfx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        // Clip state does not leak across executions.
        self.scissor = None;
        Ok(())
    }

    /// Clear only the scissor region, leaving pixels outside it intact.
    /// The color rides in a per-clear uniform buffer so multiple scissored
    /// clears in one frame keep their own colors.
    fn scissored_clear(
        &self,
        gfx: &GraphicsContext,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        color: wgpu::Color,
    ) {
        let Some((x, y, w, h)) = self.scissor else {
            return;
        };
        if w == 0 || h == 0 {
            return;
        }
        let rgba = [color.r as f32, color.g as f32, color.b as f32, color.a as f32];
        let uniforms = gfx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("clear color"),
            contents: bytemuck::bytes_of(&rgba),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = gfx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("clear bindings"),
            layout: &self.clear_bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scissored clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.clear_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_scissor_rect(x, y, w, h);
        pass.draw(0..3, 0..1);
    }

    fn vertex_count(bytes: &[u8], stride: usize, what: &str) -> u32 {
        if bytes.len() % stride != 0 {
            warn!(
                what,
                len = bytes.len(),
                stride,
                "vertex blob not a stride multiple, truncating"
            );
        }
        (bytes.len() / stride) as u32
    }

    fn surface_draw(
        &mut self,
        gfx: &GraphicsContext,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        bytes: &[u8],
        stride: usize,
        composite: bool,
    ) {
        let count = Self::vertex_count(bytes, stride, if composite { "composite" } else { "sprites" });
        if count == 0 && self.pending_clear.is_none() {
            return;
        }
        let vbuf = (count > 0).then(|| {
            gfx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stream vertices"),
                contents: bytes,
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
        let load = match self.pending_clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("surface pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.sprite_pipeline);
        let bind_group = if composite {
            self.composite_bind_group.as_ref().unwrap_or(&self.sprite_bind_group)
        } else {
            &self.sprite_bind_group
        };
        pass.set_bind_group(0, bind_group, &[]);
        if let Some((x, y, w, h)) = self.scissor {
            pass.set_scissor_rect(x, y, w, h);
        }
        if let Some(vbuf) = &vbuf {
            pass.set_vertex_buffer(0, vbuf.slice(..));
            pass.draw(0..count, 0..1);
        }
    }

    /// Each tile redraw starts from a transparent target; stale pixels
    /// from the previous redraw never show through.
    fn tiled_draw(&mut self, gfx: &GraphicsContext, encoder: &mut wgpu::CommandEncoder, bytes: &[u8]) {
        let (Some(target), Some(bind_group)) = (&self.tiled_target, &self.tiled_bind_group) else {
            warn!("draw_tiles_to_surface before set_tiled_surface_dims, dropping");
            return;
        };
        let count = Self::vertex_count(bytes, TILED_VERTEX_STRIDE, "tiles");
        let vbuf = (count > 0).then(|| {
            gfx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tile vertices"),
                contents: bytes,
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tiled pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: tiled_pass_load(),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.tiled_pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        if let Some(vbuf) = &vbuf {
            pass.set_vertex_buffer(0, vbuf.slice(..));
            pass.draw(0..count, 0..1);
        }
    }
}

/// Blocking wrapper used by the winit app, which is not async.
pub fn init_graphics(window: Arc<Window>) -> Result<GraphicsContext> {
    pollster::block_on(GraphicsContext::new(window))
}
