use std::collections::HashMap;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::{BufferInitDescriptor, DeviceExt, TextureDataOrder};
use winit::dpi::PhysicalSize;

use crate::compile::{self, UniformLayout};
use crate::device::{
    BoundInput, DeviceError, FrameAcquire, OutputKind, ProgramDescriptor, RenderDevice,
    ResourceCounts,
};
use crate::noise::NoiseTexture;
use crate::types::{
    channel_index, Destination, FilterMode, PassKind, ProgramId, TargetDescriptor, TargetFormat,
    TargetId, TextureId, TextureRef, UniformValue, CHANNEL_COUNT,
};

use super::context::GpuContext;
use super::GpuOptions;

/// A sampled texture together with the sampler it is always bound with.
struct ChannelResource {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct GpuProgram {
    pass: PassKind,
    pipeline: wgpu::RenderPipeline,
    layout: UniformLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

struct Frame {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

struct SharedLayouts {
    uniform: wgpu::BindGroupLayout,
    channels: wgpu::BindGroupLayout,
    pipeline: wgpu::PipelineLayout,
    vertex: wgpu::ShaderModule,
}

impl SharedLayouts {
    fn new(device: &wgpu::Device) -> Self {
        let uniform = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pass inputs layout"),
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
        let channels = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("channel layout"),
            entries: &channel_layout_entries(),
        });
        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pass pipeline layout"),
            bind_group_layouts: &[&uniform, &channels],
            push_constant_ranges: &[],
        });
        let vertex = compile::compile_vertex_shader(device);
        Self {
            uniform,
            channels,
            pipeline,
            vertex,
        }
    }
}

fn channel_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
    for index in 0..CHANNEL_COUNT as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

/// `wgpu` implementation of [`RenderDevice`] presenting to a window surface.
///
/// Draws are recorded into one command encoder per frame and submitted by
/// `end_frame`. Each program owns its uniform buffer; values are staged per
/// draw and copied on the encoder so every pass sees its own snapshot.
pub struct GpuDevice {
    context: GpuContext,
    layouts: SharedLayouts,
    placeholder: ChannelResource,
    programs: HashMap<u32, GpuProgram>,
    targets: HashMap<u32, ChannelResource>,
    textures: HashMap<u32, ChannelResource>,
    frame: Option<Frame>,
    next_id: u32,
}

impl GpuDevice {
    pub fn new<T>(target: &T, size: PhysicalSize<u32>, options: GpuOptions) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size, options)?;
        let layouts = SharedLayouts::new(&context.device);
        let placeholder = create_placeholder(&context.device, &context.queue);
        Ok(Self {
            context,
            layouts,
            placeholder,
            programs: HashMap::new(),
            targets: HashMap::new(),
            textures: HashMap::new(),
            frame: None,
            next_id: 1,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.context.surface_format
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn channel(&self, texture: TextureRef) -> Result<&ChannelResource, DeviceError> {
        match texture {
            TextureRef::Target(id) => self.targets.get(&id.raw()).ok_or(DeviceError::UnknownHandle {
                kind: "target",
                id: id.raw(),
            }),
            TextureRef::Static(id) => {
                self.textures
                    .get(&id.raw())
                    .ok_or(DeviceError::UnknownHandle {
                        kind: "texture",
                        id: id.raw(),
                    })
            }
        }
    }

    fn channel_bind_group(&self, inputs: &[BoundInput]) -> Result<wgpu::BindGroup, DeviceError> {
        let mut slots = [&self.placeholder; CHANNEL_COUNT];
        for input in inputs {
            let UniformValue::Texture(texture) = input.value else {
                continue;
            };
            let slot = channel_index(input.name)
                .ok_or_else(|| DeviceError::input(input.name, "textures bind to iChannel0-3"))?;
            slots[slot] = self.channel(texture)?;
        }
        let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
        for (index, resource) in slots.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32 * 2,
                resource: wgpu::BindingResource::TextureView(&resource.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32 * 2 + 1,
                resource: wgpu::BindingResource::Sampler(&resource.sampler),
            });
        }
        Ok(self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("channel bind group"),
                layout: &self.layouts.channels,
                entries: &entries,
            }))
    }

    fn build_pipeline(
        &self,
        descriptor: &ProgramDescriptor<'_>,
        format: wgpu::TextureFormat,
    ) -> Result<wgpu::RenderPipeline, DeviceError> {
        let device = &self.context.device;
        let source = compile::fragment_source(descriptor.pass, descriptor.inputs);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let fragment = compile::compile_fragment_shader(device, descriptor.pass, source);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(descriptor.pass.label()),
            layout: Some(&self.layouts.pipeline),
            vertex: wgpu::VertexState {
                module: &self.layouts.vertex,
                entry_point: Some("main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(error) => Err(DeviceError::Compile {
                program: descriptor.pass.label().to_string(),
                message: error.to_string(),
            }),
            None => Ok(pipeline),
        }
    }
}

fn texture_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn create_placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> ChannelResource {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("placeholder channel"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &[0, 0, 0, 0],
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("placeholder sampler"),
        ..Default::default()
    });
    ChannelResource {
        _texture: texture,
        view,
        sampler,
    }
}

impl RenderDevice for GpuDevice {
    fn compile_program(
        &mut self,
        descriptor: &ProgramDescriptor<'_>,
    ) -> Result<ProgramId, DeviceError> {
        let format = match descriptor.output {
            OutputKind::Offscreen => wgpu::TextureFormat::Rgba8Unorm,
            OutputKind::Screen => self.context.surface_format,
        };
        let pipeline = self.build_pipeline(descriptor, format)?;

        let layout = UniformLayout::new(descriptor.inputs);
        let device = &self.context.device;
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(descriptor.pass.label()),
            size: u64::from(layout.size()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(descriptor.pass.label()),
            layout: &self.layouts.uniform,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let id = self.allocate_id();
        self.programs.insert(
            id,
            GpuProgram {
                pass: descriptor.pass,
                pipeline,
                layout,
                uniform_buffer,
                uniform_bind_group,
            },
        );
        Ok(ProgramId::new(id))
    }

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, DeviceError> {
        let size = descriptor.size;
        let max_dimension = self.context.device.limits().max_texture_dimension_2d;
        let fits = |extent: u32| (1..=max_dimension).contains(&extent);
        if !fits(size.width) || !fits(size.height) {
            return Err(DeviceError::Allocation {
                what: descriptor.label.to_string(),
                message: format!("size {size} outside 1..={max_dimension}"),
            });
        }
        let device = &self.context.device;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(descriptor.label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(descriptor.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let filter = filter_mode(descriptor.filter);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(descriptor.label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let id = self.allocate_id();
        self.targets.insert(
            id,
            ChannelResource {
                _texture: texture,
                view,
                sampler,
            },
        );
        Ok(TargetId::new(id))
    }

    fn upload_texture(
        &mut self,
        label: &'static str,
        texture: &NoiseTexture,
    ) -> Result<TextureId, DeviceError> {
        let device = &self.context.device;
        let side = texture.side();
        let uploaded = device.create_texture_with_data(
            &self.context.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: side,
                    height: side,
                    depth_or_array_layers: 1,
                },
                mip_level_count: texture.mip_count(),
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &texture.packed_levels(),
        );
        let view = uploaded.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        tracing::debug!(label, side, mips = texture.mip_count(), "uploaded noise texture");
        let id = self.allocate_id();
        self.textures.insert(
            id,
            ChannelResource {
                _texture: uploaded,
                view,
                sampler,
            },
        );
        Ok(TextureId::new(id))
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.context.resize(PhysicalSize::new(width, height));
    }

    fn begin_frame(&mut self) -> Result<FrameAcquire, DeviceError> {
        if self.context.is_zero_area() {
            return Ok(FrameAcquire::Unavailable);
        }
        let surface = match self.context.surface.get_current_texture() {
            Ok(surface) => surface,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                return Ok(FrameAcquire::Unavailable);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("timed out acquiring the next surface texture");
                return Ok(FrameAcquire::Unavailable);
            }
            Err(error) => return Err(DeviceError::Surface(error.to_string())),
        };
        let view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        self.frame = Some(Frame {
            surface,
            view,
            encoder,
        });
        Ok(FrameAcquire::Ready)
    }

    fn draw(
        &mut self,
        program: ProgramId,
        inputs: &[BoundInput],
        destination: Destination,
    ) -> Result<(), DeviceError> {
        if self.frame.is_none() {
            return Err(DeviceError::NoFrame);
        }
        if let Destination::Target(id) = destination {
            let feedback = inputs
                .iter()
                .any(|input| input.value == UniformValue::Texture(TextureRef::Target(id)));
            if feedback {
                return Err(DeviceError::input(
                    "destination",
                    "a draw cannot sample the target it writes",
                ));
            }
        }
        let channel_group = self.channel_bind_group(inputs)?;
        let compiled = self
            .programs
            .get(&program.raw())
            .ok_or(DeviceError::UnknownHandle {
                kind: "program",
                id: program.raw(),
            })?;
        let staging = self
            .context
            .device
            .create_buffer_init(&BufferInitDescriptor {
                label: Some("uniform staging"),
                contents: &compiled.layout.pack(inputs),
                usage: wgpu::BufferUsages::COPY_SRC,
            });

        let Some(frame) = self.frame.as_mut() else {
            return Err(DeviceError::NoFrame);
        };
        let view = match destination {
            Destination::Screen => &frame.view,
            Destination::Target(id) => {
                &self
                    .targets
                    .get(&id.raw())
                    .ok_or(DeviceError::UnknownHandle {
                        kind: "target",
                        id: id.raw(),
                    })?
                    .view
            }
        };

        frame.encoder.copy_buffer_to_buffer(
            &staging,
            0,
            &compiled.uniform_buffer,
            0,
            u64::from(compiled.layout.size()),
        );
        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(compiled.pass.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&compiled.pipeline);
        render_pass.set_bind_group(0, &compiled.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &channel_group, &[]);
        render_pass.draw(0..3, 0..1);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        let frame = self.frame.take().ok_or(DeviceError::NoFrame)?;
        self.context
            .queue
            .submit(std::iter::once(frame.encoder.finish()));
        frame.surface.present();
        Ok(())
    }

    fn release_program(&mut self, id: ProgramId) {
        self.programs.remove(&id.raw());
    }

    fn release_target(&mut self, id: TargetId) {
        self.targets.remove(&id.raw());
    }

    fn release_texture(&mut self, id: TextureId) {
        self.textures.remove(&id.raw());
    }

    fn live_resources(&self) -> ResourceCounts {
        ResourceCounts {
            programs: self.programs.len(),
            targets: self.targets.len(),
            textures: self.textures.len(),
        }
    }
}
