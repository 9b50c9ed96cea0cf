use std::{
    sync::mpsc,
    time::{Duration, Instant},
};

use crate::{
    config::GpuConfig,
    foundation::core::{Rect, SurfaceSize, fit_rect},
    foundation::error::{DrapeError, DrapeResult},
    render::{Compositor, CompositorKind, FrameParams, FrameRGBA, SceneLayers},
    shading::{HIGHLIGHT_SCALE, SHADOW_SCALE, WARP_SCALE},
};

const PARAMS_SIZE: u64 = 80;
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const COMPOSITE_WGSL: &str = r#"
struct VsOut {
  @builtin(position) pos: vec4<f32>,
};

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> VsOut {
  var p = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -1.0),
    vec2<f32>( 3.0, -1.0),
    vec2<f32>(-1.0,  3.0),
  );
  var o: VsOut;
  o.pos = vec4<f32>(p[vi], 0.0, 1.0);
  return o;
}

struct Params {
  // width, height, filters, design_enabled
  surface: vec4<f32>,
  base_rect: vec4<f32>,
  placement: vec4<f32>,
  // strength, shadow_power, highlight_power, alpha_threshold
  shading: vec4<f32>,
  // blend_cap, warp, shadow, highlight
  scales: vec4<f32>,
};

@group(0) @binding(0) var t_base: texture_2d<f32>;
@group(0) @binding(1) var t_depth: texture_2d<f32>;
@group(0) @binding(2) var t_shadow: texture_2d<f32>;
@group(0) @binding(3) var t_highlight: texture_2d<f32>;
@group(0) @binding(4) var t_design: texture_2d<f32>;
@group(0) @binding(5) var<uniform> params: Params;

fn texel(t: texture_2d<f32>, uv: vec2<f32>) -> vec4<f32> {
  let dims = textureDimensions(t);
  let max_texel = vec2<i32>(dims) - vec2<i32>(1, 1);
  let c = clamp(vec2<i32>(floor(uv * vec2<f32>(dims))), vec2<i32>(0, 0), max_texel);
  return textureLoad(t, c, 0);
}

fn inside_unit(uv: vec2<f32>) -> bool {
  return all(uv >= vec2<f32>(0.0, 0.0)) && all(uv < vec2<f32>(1.0, 1.0));
}

fn design_at(p: vec2<f32>) -> vec4<f32> {
  let local = (p - params.placement.xy) / params.placement.zw;
  if (!inside_unit(local)) {
    return vec4<f32>(0.0);
  }
  return texel(t_design, local);
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
  let px = in.pos.xy;
  let base_uv = (px - params.base_rect.xy) / params.base_rect.zw;
  if (!inside_unit(base_uv)) {
    return vec4<f32>(0.0);
  }
  let base = texel(t_base, base_uv);
  if (params.surface.z < 0.5) {
    return base;
  }

  let depth = texel(t_depth, base_uv).r;
  let shadow = texel(t_shadow, base_uv).r;
  let highlight = texel(t_highlight, base_uv).r;

  var rgb = base.rgb;
  if (params.surface.w > 0.5) {
    let size = params.surface.xy;
    let offset = (depth - 0.5) * params.shading.x * params.scales.y;
    let uv = clamp(px / size + vec2<f32>(offset, offset), vec2<f32>(0.0), vec2<f32>(1.0));
    let design = design_at(uv * size);
    if (design.a > params.shading.w) {
      rgb = mix(rgb, rgb * design.rgb, design.a * params.scales.x);
    }
  }
  rgb = rgb * (1.0 - shadow * params.shading.y * params.scales.z);
  rgb = rgb + vec3<f32>(highlight * params.shading.z * params.scales.w);
  return vec4<f32>(clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0)), base.a);
}
"#;

struct LayerTexture {
    width: u32,
    height: u32,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuState {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,

    base: LayerTexture,
    depth: LayerTexture,
    shadow: LayerTexture,
    highlight: LayerTexture,
    /// Bound when no design is active so the layout stays fixed.
    empty_design: LayerTexture,
    design: Option<LayerTexture>,
}

/// wgpu compositor running the displacement/blend/lighting shader.
pub struct GpuCompositor {
    surface: SurfaceSize,
    base_rect: Rect,
    fence_timeout: Duration,
    state: Option<GpuState>,
}

impl GpuCompositor {
    pub fn new(layers: &SceneLayers, surface: SurfaceSize, cfg: &GpuConfig) -> DrapeResult<Self> {
        let fence_timeout = cfg.fence_timeout();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                DrapeError::renderer_init("no gpu adapter available")
            }
            other => DrapeError::renderer_init(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("drape_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| DrapeError::renderer_init(format!("wgpu request_device failed: {e:?}")))?;

        let limit = device.limits().max_texture_dimension_2d;
        for (name, (w, h)) in [
            ("base", layers.base.dimensions()),
            ("depth", layers.depth.image.dimensions()),
            ("surface", (surface.width, surface.height)),
        ] {
            if !fits_limit((w, h), limit) {
                return Err(DrapeError::renderer_init(format!(
                    "{name} texture {w}x{h} exceeds the device limit {limit}"
                )));
            }
        }

        let base = upload_rgba8(&device, &queue, "drape_base", &layers.base);
        let depth = upload_rgba8(&device, &queue, "drape_depth", &layers.depth.image);
        let shadow = upload_rgba8(&device, &queue, "drape_shadow", &layers.masks.shadow);
        let highlight = upload_rgba8(&device, &queue, "drape_highlight", &layers.masks.highlight);
        let empty_design = upload_rgba8(
            &device,
            &queue,
            "drape_empty_design",
            &image::RgbaImage::new(1, 1),
        );
        confirm_uploads(&device, &queue, fence_timeout, "layer texture upload")?;

        let (target, target_view) = create_target(&device, surface);
        let (pipeline, bind_group_layout) = create_pipeline(&device);
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("drape_params"),
            size: PARAMS_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::info!(
            adapter = ?adapter.get_info().name,
            width = surface.width,
            height = surface.height,
            "gpu compositor initialized"
        );

        Ok(Self {
            surface,
            base_rect: fit_rect(layers.base.width(), layers.base.height(), surface),
            fence_timeout,
            state: Some(GpuState {
                device,
                queue,
                pipeline,
                bind_group_layout,
                params,
                target,
                target_view,
                base,
                depth,
                shadow,
                highlight,
                empty_design,
                design: None,
            }),
        })
    }

    fn state(&self) -> DrapeResult<&GpuState> {
        self.state
            .as_ref()
            .ok_or_else(|| DrapeError::evaluation("gpu compositor was destroyed"))
    }

    fn params_bytes(
        &self,
        params: &FrameParams,
        design_enabled: bool,
    ) -> [u8; PARAMS_SIZE as usize] {
        let p = params.placement;
        let s = params.shading;
        let r = self.base_rect;
        let flag = |b: bool| if b { 1.0f32 } else { 0.0 };
        let values: [f32; 20] = [
            self.surface.width as f32,
            self.surface.height as f32,
            flag(params.filters),
            flag(design_enabled),
            r.x0 as f32,
            r.y0 as f32,
            r.width() as f32,
            r.height() as f32,
            p.x as f32,
            p.y as f32,
            p.width as f32,
            p.height as f32,
            s.strength,
            s.shadow_power,
            s.highlight_power,
            s.alpha_threshold,
            s.blend_cap,
            WARP_SCALE,
            SHADOW_SCALE,
            HIGHLIGHT_SCALE,
        ];
        let mut out = [0u8; PARAMS_SIZE as usize];
        for (chunk, v) in out.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        out
    }
}

impl Compositor for GpuCompositor {
    fn kind(&self) -> CompositorKind {
        CompositorKind::Gpu
    }

    fn set_design(&mut self, design: &image::RgbaImage) -> DrapeResult<()> {
        let timeout = self.fence_timeout;
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| DrapeError::evaluation("gpu compositor was destroyed"))?;
        check_design_size(design.dimensions(), state.device.limits().max_texture_dimension_2d)?;

        let tex = upload_rgba8(&state.device, &state.queue, "drape_design", design);
        confirm_uploads(&state.device, &state.queue, timeout, "design texture upload")?;
        tracing::debug!(w = tex.width, h = tex.height, "design texture replaced");
        state.design = Some(tex);
        Ok(())
    }

    fn clear_design(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.design = None;
        }
    }

    fn render(&mut self, params: &FrameParams) -> DrapeResult<FrameRGBA> {
        let state = self.state()?;
        let design_enabled = state.design.is_some()
            && params.placement.width > 0.0
            && params.placement.height > 0.0;
        let bytes = self.params_bytes(params, design_enabled);
        state.queue.write_buffer(&state.params, 0, &bytes);

        let design_view = &state.design.as_ref().unwrap_or(&state.empty_design).view;
        let bind_group = state.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("drape_composite_bg"),
            layout: &state.bind_group_layout,
            entries: &[
                texture_entry(0, &state.base.view),
                texture_entry(1, &state.depth.view),
                texture_entry(2, &state.shadow.view),
                texture_entry(3, &state.highlight.view),
                texture_entry(4, design_view),
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: state.params.as_entire_binding(),
                },
            ],
        });

        let (width, height) = (self.surface.width, self.surface.height);
        let bytes_per_row = align_to(width * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = state.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("drape_readback"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("drape_composite_encoder"),
            });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("drape_composite_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &state.target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(&state.pipeline);
            rp.set_bind_group(0, &bind_group, &[]);
            rp.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &state.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        state.queue.submit(Some(encoder.finish()));

        // The map callback is the render-complete fence; capture never relies on a fixed delay.
        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        wait_with_timeout(&state.device, &rx, self.fence_timeout, "frame readback")?
            .map_err(|e| DrapeError::evaluation(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let row_bytes = (width as usize) * 4;
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * bytes_per_row as usize;
            data.extend_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        readback.unmap();

        tracing::debug!(filters = params.filters, design = design_enabled, "gpu frame");
        Ok(FrameRGBA {
            width,
            height,
            data,
            premultiplied: false,
        })
    }

    fn destroy(&mut self) {
        if let Some(state) = self.state.take() {
            state.target.destroy();
            state.params.destroy();
            tracing::debug!("gpu compositor destroyed");
        }
    }
}

impl Drop for GpuCompositor {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn texture_entry(binding: u32, view: &wgpu::TextureView) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: wgpu::BindingResource::TextureView(view),
    }
}

fn upload_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    img: &image::RgbaImage,
) -> LayerTexture {
    let (width, height) = img.dimensions();
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        img.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    LayerTexture {
        width,
        height,
        _texture: texture,
        view,
    }
}

/// Flush staged uploads and wait until the queue reports them done.
fn confirm_uploads(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    timeout: Duration,
    what: &str,
) -> DrapeResult<()> {
    queue.submit(std::iter::empty());
    let (tx, rx) = mpsc::channel();
    queue.on_submitted_work_done(move || {
        let _ = tx.send(());
    });
    wait_with_timeout(device, &rx, timeout, what)
}

fn wait_with_timeout<T>(
    device: &wgpu::Device,
    rx: &mpsc::Receiver<T>,
    timeout: Duration,
    what: &str,
) -> DrapeResult<T> {
    let deadline = Instant::now() + timeout;
    loop {
        device
            .poll(wgpu::PollType::Poll)
            .map_err(|e| DrapeError::evaluation(format!("wgpu poll failed: {e:?}")))?;
        match rx.try_recv() {
            Ok(v) => return Ok(v),
            Err(mpsc::TryRecvError::Disconnected) => {
                return Err(DrapeError::evaluation(format!("{what}: callback dropped")));
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }
        if Instant::now() >= deadline {
            return Err(DrapeError::texture_timeout(format!(
                "{what} did not complete within {timeout:?}"
            )));
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn create_target(
    device: &wgpu::Device,
    surface: SurfaceSize,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("drape_target"),
        size: wgpu::Extent3d {
            width: surface.width,
            height: surface.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_pipeline(device: &wgpu::Device) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout) {
    let texture_layout = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    };

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("drape_composite_bgl"),
        entries: &[
            texture_layout(0),
            texture_layout(1),
            texture_layout(2),
            texture_layout(3),
            texture_layout(4),
            wgpu::BindGroupLayoutEntry {
                binding: 5,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(PARAMS_SIZE),
                },
                count: None,
            },
        ],
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("drape_composite_shader"),
        source: wgpu::ShaderSource::Wgsl(COMPOSITE_WGSL.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("drape_composite_pl"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("drape_composite_pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    (pipeline, bind_group_layout)
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

fn fits_limit((w, h): (u32, u32), limit: u32) -> bool {
    w <= limit && h <= limit
}

/// A design wgpu would reject must fail here, before `create_texture` sees it.
fn check_design_size((w, h): (u32, u32), limit: u32) -> DrapeResult<()> {
    if w == 0 || h == 0 {
        return Err(DrapeError::validation("design image is empty"));
    }
    if !fits_limit((w, h), limit) {
        return Err(DrapeError::validation(format!(
            "design {w}x{h} exceeds the device texture limit {limit}"
        )));
    }
    Ok(())
}
