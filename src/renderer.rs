use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::assets::TextureData;
use crate::error::RenderResult;
use crate::material::Material;
use crate::orchestrator::{Frame, RenderTarget};
use crate::scene::{DrawItem, MeshData, MeshId, NodeId};
use crate::shaders::{
    generate_background_shader, generate_blit_shader, generate_standard_shader, generate_transmission_shader,
};
use crate::viewport::Viewport;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
const WHITE: [u8; 4] = [255, 255, 255, 255];
// Stand-in for maps still loading, so glowing surfaces stay dark until then.
const BLACK: [u8; 4] = [0, 0, 0, 255];
const GRAY: [u8; 4] = [128, 128, 128, 255];

// ======================================
// === SHADER DATA STRUCTURES ===
// ======================================

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    inv_view_rot: [[f32; 4]; 4],
    camera_position: [f32; 3],
    time: f32,
    ambient: [f32; 4],
    exposure: f32,
    env_intensity: f32,
    background_blurriness: f32,
    background_intensity: f32,
    env_max_lod: f32,
    tone_mapping: u32,
    _padding: [f32; 2],
    viewport: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ObjectUniforms {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    base_color: [f32; 4],
    emissive: [f32; 4],
    surface: [f32; 4],
    glass: [f32; 4],
    distortion: [f32; 4],
    coat: [f32; 4],
}

impl ObjectUniforms {
    fn new(world: Mat4, material: &Material) -> Self {
        let mut uniforms = Self {
            model: world.to_cols_array_2d(),
            normal_matrix: world.inverse().transpose().to_cols_array_2d(),
            base_color: [1.0; 4],
            emissive: [0.0; 4],
            surface: [1.0, 0.0, 0.0, 1.0],
            glass: [0.0; 4],
            distortion: [0.0; 4],
            coat: [0.0; 4],
        };

        match material {
            Material::Standard(m) => {
                uniforms.base_color = m.color.extend(m.opacity).to_array();
                let emissive_map = if m.emissive_map.is_some() { 1.0 } else { 0.0 };
                uniforms.emissive = (m.emissive * m.emissive_intensity).extend(emissive_map).to_array();
                uniforms.surface = [m.roughness, m.metalness, f32::from(u8::from(m.double_sided)), m.opacity];
            }
            Material::Transmission(g) => {
                uniforms.base_color = g.color.extend(1.0).to_array();
                uniforms.surface = [g.roughness, 0.0, 1.0, 1.0];
                uniforms.glass = [g.transmission, g.ior, g.thickness, g.chromatic_aberration];
                uniforms.distortion = [g.distortion, g.distortion_scale, g.temporal_distortion, g.time];
                uniforms.coat = [g.clearcoat, g.clearcoat_roughness, g.anisotropy, g.samples as f32];
            }
        }
        uniforms
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: (std::mem::size_of::<[f32; 3]>() * 2) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }

    fn interleave(mesh: &MeshData) -> Vec<Vertex> {
        mesh.positions
            .iter()
            .enumerate()
            .map(|(i, &position)| Vertex {
                position,
                normal: mesh.normals.get(i).copied().unwrap_or([0.0, 0.0, 1.0]),
                uv: mesh.uvs.get(i).copied().unwrap_or([0.0, 0.0]),
            })
            .collect()
    }
}

// ======================================
// === GPU RESOURCES ===
// ======================================

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

struct GpuTexture {
    view: wgpu::TextureView,
    mip_levels: u32,
}

/// Which texture an object's bind group was built against.
#[derive(Clone, Debug, PartialEq, Eq)]
enum TextureSlot {
    Plain,
    Pending,
    Loaded(String),
}

struct ObjectBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    slot: TextureSlot,
}

struct RenderTargets {
    depth_view: wgpu::TextureView,
    scene_view: wgpu::TextureView,
    scene_bind_group: wgpu::BindGroup,
}

struct Pipelines {
    background: wgpu::RenderPipeline,
    standard: wgpu::RenderPipeline,
    transmission: wgpu::RenderPipeline,
    blit: wgpu::RenderPipeline,
}

// ======================================
// === RENDERER ===
// ======================================

/// wgpu implementation of [`RenderTarget`].
///
/// Opaque geometry and the background go to an offscreen colour target,
/// which is then blitted to the surface and sampled by transmissive meshes
/// drawn on top.
pub struct Renderer {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub window: Arc<Window>,
    color_format: wgpu::TextureFormat,
    frame_buffer: wgpu::Buffer,
    frame_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    scene_color_layout: wgpu::BindGroupLayout,
    env_sampler: wgpu::Sampler,
    clamp_sampler: wgpu::Sampler,
    environment: GpuTexture,
    frame_bind_group: wgpu::BindGroup,
    targets: RenderTargets,
    pipelines: Pipelines,
    white: GpuTexture,
    black: GpuTexture,
    meshes: HashMap<MeshId, GpuMesh>,
    textures: HashMap<String, GpuTexture>,
    objects: HashMap<NodeId, ObjectBinding>,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, viewport: Viewport) -> RenderResult<Self> {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                    backends: wgpu::Backends::BROWSER_WEBGPU,
                    ..Default::default()
                });
                let limits = wgpu::Limits::downlevel_webgl2_defaults();
            } else {
                let instance = wgpu::Instance::default();
                let limits = wgpu::Limits::default();
            }
        }

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await?;
        log::info!("Adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .first()
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);
        let color_format = surface_format.add_srgb_suffix();

        let (width, height) = clamp_size(viewport.physical_size(), device.limits().max_texture_dimension_2d);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![color_format],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_bind_group_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                sampler_entry(2),
            ],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object_bind_group_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                sampler_entry(2),
            ],
        });
        let scene_color_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_color_bind_group_layout"),
            entries: &[texture_entry(0), sampler_entry(1)],
        });

        let env_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let clamp_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let environment = create_texture(&device, &queue, &TextureData::solid(GRAY), "Placeholder Environment");
        let white = create_texture(&device, &queue, &TextureData::solid(WHITE), "White Texture");
        let black = create_texture(&device, &queue, &TextureData::solid(BLACK), "Pending Texture");

        let frame_bind_group =
            create_frame_bind_group(&device, &frame_layout, &frame_buffer, &environment, &env_sampler);
        let targets = create_render_targets(&device, &config, color_format, &scene_color_layout, &clamp_sampler);
        let pipelines = create_pipelines(
            &device,
            color_format,
            &frame_layout,
            &object_layout,
            &scene_color_layout,
        );

        log::info!("Surface {}x{} {:?}", width, height, color_format);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            window,
            color_format,
            frame_buffer,
            frame_layout,
            object_layout,
            scene_color_layout,
            env_sampler,
            clamp_sampler,
            environment,
            frame_bind_group,
            targets,
            pipelines,
            white,
            black,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            objects: HashMap::new(),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Re-applies the current configuration after a lost or outdated surface.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    fn texture_slot(&self, material: &Material) -> TextureSlot {
        match material.map() {
            None => TextureSlot::Plain,
            Some(key) if self.textures.contains_key(key) => TextureSlot::Loaded(key.to_string()),
            Some(_) => TextureSlot::Pending,
        }
    }

    fn prepare_object(&mut self, item: &DrawItem<'_>) {
        let uniforms = ObjectUniforms::new(item.world, item.material);
        let slot = self.texture_slot(item.material);

        let stale = self.objects.get(&item.node).is_none_or(|binding| binding.slot != slot);
        if stale {
            let texture = match &slot {
                TextureSlot::Plain => &self.white,
                TextureSlot::Pending => &self.black,
                TextureSlot::Loaded(key) => self.textures.get(key).unwrap_or(&self.black),
            };
            let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Object Uniform Buffer"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object_bind_group"),
                layout: &self.object_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.clamp_sampler),
                    },
                ],
            });
            self.objects.insert(item.node, ObjectBinding { buffer, bind_group, slot });
        } else if let Some(binding) = self.objects.get(&item.node) {
            self.queue
                .write_buffer(&binding.buffer, 0, bytemuck::cast_slice(&[uniforms]));
        }
    }

    fn write_frame_uniforms(&self, frame: &Frame<'_>) {
        let camera = frame.camera;
        let mut inv_view_rot = camera.view_matrix().inverse();
        inv_view_rot.w_axis = Vec4::W;

        let env = frame.environment;
        let ambient: Vec3 = env.ambient.color * env.ambient.intensity;
        let (width, height) = (self.config.width as f32, self.config.height as f32);

        let uniforms = FrameUniforms {
            view_proj: camera.view_proj_matrix().to_cols_array_2d(),
            inv_view_rot: inv_view_rot.to_cols_array_2d(),
            camera_position: camera.position.to_array(),
            time: frame.time,
            ambient: ambient.extend(1.0).to_array(),
            exposure: frame.exposure,
            env_intensity: env.environment_intensity,
            background_blurriness: env.background_blurriness,
            background_intensity: env.background_intensity,
            env_max_lod: self.environment.mip_levels.saturating_sub(1) as f32,
            tone_mapping: frame.tone_mapping as u32,
            _padding: [0.0; 2],
            viewport: [width, height, 1.0 / width, 1.0 / height],
        };
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::cast_slice(&[uniforms]));
    }

    fn draw_items<'a, 'b: 'a>(
        &self,
        render_pass: &mut wgpu::RenderPass<'_>,
        items: impl Iterator<Item = &'a DrawItem<'b>>,
    ) {
        for item in items {
            let (Some(mesh), Some(object)) = (self.meshes.get(&item.mesh), self.objects.get(&item.node)) else {
                continue;
            };
            render_pass.set_bind_group(1, &object.bind_group, &[]);
            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..mesh.num_indices, 0, 0..1);
        }
    }
}

impl RenderTarget for Renderer {
    fn resize(&mut self, viewport: &Viewport) {
        let (width, height) = clamp_size(viewport.physical_size(), self.device.limits().max_texture_dimension_2d);
        if width == self.config.width && height == self.config.height {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.targets = create_render_targets(
            &self.device,
            &self.config,
            self.color_format,
            &self.scene_color_layout,
            &self.clamp_sampler,
        );
    }

    fn upload_mesh(&mut self, id: MeshId, mesh: &MeshData) {
        let vertices = Vertex::interleave(mesh);
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                num_indices: mesh.indices.len() as u32,
            },
        );
    }

    fn upload_texture(&mut self, key: &str, texture: &TextureData) {
        let gpu = create_texture(&self.device, &self.queue, texture, key);
        self.textures.insert(key.to_string(), gpu);
    }

    fn set_environment(&mut self, texture: &TextureData) {
        self.environment = create_texture(&self.device, &self.queue, texture, "Environment Map");
        self.frame_bind_group = create_frame_bind_group(
            &self.device,
            &self.frame_layout,
            &self.frame_buffer,
            &self.environment,
            &self.env_sampler,
        );
    }

    fn draw(&mut self, frame: &Frame<'_>) -> RenderResult<()> {
        self.write_frame_uniforms(frame);
        for item in &frame.items {
            self.prepare_object(item);
        }

        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.color_format),
            ..Default::default()
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // Background and opaque meshes into the offscreen scene colour.
        {
            let load = if frame.auto_clear {
                wgpu::LoadOp::Clear(wgpu::Color::BLACK)
            } else {
                wgpu::LoadOp::Load
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Opaque Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.scene_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
            render_pass.set_pipeline(&self.pipelines.background);
            render_pass.draw(0..3, 0..1);

            render_pass.set_pipeline(&self.pipelines.standard);
            self.draw_items(
                &mut render_pass,
                frame.items.iter().filter(|item| !item.material.is_transmissive()),
            );
        }

        // Scene colour onto the surface, glass on top sampling it.
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Transmission Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipelines.blit);
            render_pass.set_bind_group(0, &self.targets.scene_bind_group, &[]);
            render_pass.draw(0..3, 0..1);

            render_pass.set_pipeline(&self.pipelines.transmission);
            render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
            render_pass.set_bind_group(2, &self.targets.scene_bind_group, &[]);
            self.draw_items(
                &mut render_pass,
                frame.items.iter().filter(|item| item.material.is_transmissive()),
            );
        }

        self.queue.submit([encoder.finish()]);
        self.window.pre_present_notify();
        output.present();

        Ok(())
    }
}

// ======================================
// === RESOURCE HELPERS ===
// ======================================

fn clamp_size((width, height): (u32, u32), max_dimension: u32) -> (u32, u32) {
    (width.clamp(1, max_dimension), height.clamp(1, max_dimension))
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Uploads every mip level that fits the device. Oversized leading levels
/// are dropped, so large panoramas degrade to a smaller base level.
fn create_texture(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData, label: &str) -> GpuTexture {
    let max_dimension = device.limits().max_texture_dimension_2d;
    let levels: Vec<_> = data
        .levels
        .iter()
        .skip_while(|level| level.width > max_dimension || level.height > max_dimension)
        .collect();
    let Some(base) = levels.first() else {
        log::warn!("{} has no usable mip level, using placeholder", label);
        return create_texture(device, queue, &TextureData::solid(GRAY), label);
    };
    if levels.len() < data.levels.len() {
        log::warn!(
            "{} exceeds max texture size {}, starting at {}x{}",
            label,
            max_dimension,
            base.width,
            base.height
        );
    }

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: base.width,
            height: base.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: levels.len() as u32,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    for (mip_level, level) in levels.iter().enumerate() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: mip_level as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &level.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * level.width),
                rows_per_image: Some(level.height),
            },
            wgpu::Extent3d {
                width: level.width,
                height: level.height,
                depth_or_array_layers: 1,
            },
        );
    }

    GpuTexture {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        mip_levels: levels.len() as u32,
    }
}

fn create_frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    frame_buffer: &wgpu::Buffer,
    environment: &GpuTexture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("frame_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&environment.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_render_targets(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    color_format: wgpu::TextureFormat,
    scene_color_layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
) -> RenderTargets {
    let size = wgpu::Extent3d {
        width: config.width,
        height: config.height,
        depth_or_array_layers: 1,
    };

    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });

    let scene_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Scene Colour Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: color_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let scene_view = scene_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("scene_color_bind_group"),
        layout: scene_color_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&scene_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    RenderTargets {
        depth_view: depth_texture.create_view(&wgpu::TextureViewDescriptor::default()),
        scene_view,
        scene_bind_group,
    }
}

struct PipelineDesc<'a> {
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    module: &'a wgpu::ShaderModule,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    cull_mode: Option<wgpu::Face>,
    depth_write: bool,
    depth_compare: wgpu::CompareFunction,
    blend: wgpu::BlendState,
}

fn create_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    desc: PipelineDesc<'_>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.module,
            entry_point: Some("vs_main"),
            buffers: desc.buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: desc.module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(desc.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: desc.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: desc.depth_write,
            depth_compare: desc.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

fn create_pipelines(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    frame_layout: &wgpu::BindGroupLayout,
    object_layout: &wgpu::BindGroupLayout,
    scene_color_layout: &wgpu::BindGroupLayout,
) -> Pipelines {
    let shader = |label: &str, source: String| {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    };
    let layout = |label: &str, groups: &[&wgpu::BindGroupLayout]| {
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: groups,
            push_constant_ranges: &[],
        })
    };

    let background_shader = shader("Background Shader", generate_background_shader());
    let standard_shader = shader("Standard Shader", generate_standard_shader());
    let transmission_shader = shader("Transmission Shader", generate_transmission_shader());
    let blit_shader = shader("Blit Shader", generate_blit_shader());

    let background_layout = layout("Background Pipeline Layout", &[frame_layout]);
    let mesh_layout = layout("Mesh Pipeline Layout", &[frame_layout, object_layout]);
    let transmission_layout = layout(
        "Transmission Pipeline Layout",
        &[frame_layout, object_layout, scene_color_layout],
    );
    let blit_layout = layout("Blit Pipeline Layout", &[scene_color_layout]);
    let mesh_buffers = [Vertex::desc()];

    Pipelines {
        background: create_pipeline(
            device,
            color_format,
            PipelineDesc {
                label: "Background Pipeline",
                layout: &background_layout,
                module: &background_shader,
                buffers: &[],
                cull_mode: None,
                depth_write: false,
                depth_compare: wgpu::CompareFunction::Always,
                blend: wgpu::BlendState::REPLACE,
            },
        ),
        standard: create_pipeline(
            device,
            color_format,
            PipelineDesc {
                label: "Standard Pipeline",
                layout: &mesh_layout,
                module: &standard_shader,
                buffers: &mesh_buffers,
                cull_mode: None,
                depth_write: true,
                depth_compare: wgpu::CompareFunction::Less,
                blend: wgpu::BlendState::ALPHA_BLENDING,
            },
        ),
        transmission: create_pipeline(
            device,
            color_format,
            PipelineDesc {
                label: "Transmission Pipeline",
                layout: &transmission_layout,
                module: &transmission_shader,
                buffers: &mesh_buffers,
                cull_mode: Some(wgpu::Face::Back),
                depth_write: true,
                depth_compare: wgpu::CompareFunction::Less,
                blend: wgpu::BlendState::REPLACE,
            },
        ),
        blit: create_pipeline(
            device,
            color_format,
            PipelineDesc {
                label: "Blit Pipeline",
                layout: &blit_layout,
                module: &blit_shader,
                buffers: &[],
                cull_mode: None,
                depth_write: false,
                depth_compare: wgpu::CompareFunction::Always,
                blend: wgpu::BlendState::REPLACE,
            },
        ),
    }
}
