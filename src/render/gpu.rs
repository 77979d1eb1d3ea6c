use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use bytemuck::bytes_of;
use log::{debug, info, warn};
use pollster::block_on;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::kernel::{
    compute_source, COMPUTE_ENTRY, OUTPUT_BINDING, OUTPUT_FORMAT, PARAMS_BINDING, PRESENT_SHADER,
};
use crate::backend::{BufferKind, ComputeBackend, FrameSync};
use crate::error::BackendError;
use crate::frame::{FrameUniforms, WorkGroups};
use crate::scene::RenderSettings;

/// wgpu implementation of [`ComputeBackend`] presenting into a winit window.
pub struct GpuBackend {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    output: Option<OutputImage>,
    uniform_buffer: wgpu::Buffer,
    storage: HashMap<BufferKind, wgpu::Buffer>,
    kernel: Option<KernelState>,
    present_pipeline: wgpu::RenderPipeline,
    present_bind_group: Option<wgpu::BindGroup>,
    encoder: Option<wgpu::CommandEncoder>,
    sync: FrameSync,
}

struct OutputImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Compute pipeline and bind group for the current set of bound slots.
struct KernelState {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
}

impl GpuBackend {
    /// Creates the device, surface, output image and presentation pipeline.
    pub async fn new(window: Arc<Window>, render: RenderSettings) -> Result<Self, BackendError> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(BackendError::resource("surface", "window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| BackendError::resource("surface", err))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| BackendError::resource("GPU adapter", err))?;
        log_compute_limits(&adapter);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("raytracer-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: Default::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|err| BackendError::resource("GPU device", err))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| BackendError::resource("surface", "no supported surface formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            // Uncapped like the original swap interval of zero.
            present_mode: surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| {
                    matches!(
                        mode,
                        wgpu::PresentMode::Mailbox | wgpu::PresentMode::Immediate
                    )
                })
                .unwrap_or(wgpu::PresentMode::Fifo),
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        check_render_limits(render, &device.limits())?;

        let scope = CreationScope::begin(&device, "output image and present pipeline");
        let output = OutputImage::create(&device, render);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("output-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let present_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("present-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let present_pipeline = create_present_pipeline(&device, &present_layout, surface_format);
        let present_bind_group =
            create_present_bind_group(&device, &present_layout, &output.view, &sampler);
        scope.finish()?;

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            output: Some(output),
            uniform_buffer,
            storage: HashMap::new(),
            kernel: None,
            present_pipeline,
            present_bind_group: Some(present_bind_group),
            encoder: None,
            sync: FrameSync::new(),
        })
    }

    /// Returns the identifier of the window owned by the backend.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Reconfigures the swap chain. The output image keeps its resolution.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    fn bound_kinds(&self) -> Vec<BufferKind> {
        BufferKind::ALL
            .into_iter()
            .filter(|kind| self.storage.contains_key(kind))
            .collect()
    }

    fn build_kernel(&self) -> Result<KernelState, BackendError> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| BackendError::resource("compute kernel", "output image released"))?;
        let bound = self.bound_kinds();
        debug!("building compute kernel with bound slots {bound:?}");
        let scope = CreationScope::begin(&self.device, "compute kernel");

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("raytrace-kernel"),
                source: wgpu::ShaderSource::Wgsl(compute_source(&bound).into()),
            });

        let mut layout_entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: OUTPUT_BINDING,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: OUTPUT_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: PARAMS_BINDING,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<FrameUniforms>() as u64),
                },
                count: None,
            },
        ];
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: OUTPUT_BINDING,
                resource: wgpu::BindingResource::TextureView(&output.view),
            },
            wgpu::BindGroupEntry {
                binding: PARAMS_BINDING,
                resource: self.uniform_buffer.as_entire_binding(),
            },
        ];
        for kind in &bound {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: kind.slot(),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupEntry {
                binding: kind.slot(),
                resource: self.storage[kind].as_entire_binding(),
            });
        }

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("kernel-bind-layout"),
                entries: &layout_entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("kernel-pipeline-layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("kernel-pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(COMPUTE_ENTRY),
                compilation_options: Default::default(),
                cache: None,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel-bind-group"),
            layout: &layout,
            entries: &entries,
        });
        scope.finish()?;

        Ok(KernelState {
            pipeline,
            bind_group,
        })
    }
}

impl ComputeBackend for GpuBackend {
    fn upload_storage(&mut self, kind: BufferKind, bytes: &[u8]) -> Result<(), BackendError> {
        let max_binding = u64::from(self.device.limits().max_storage_buffer_binding_size);
        if bytes.len() as u64 > max_binding {
            return Err(BackendError::resource(
                kind.label(),
                format!(
                    "{} bytes exceed the device storage binding limit of {max_binding}",
                    bytes.len()
                ),
            ));
        }
        let scope = CreationScope::begin(&self.device, kind.label());
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(kind.label()),
                contents: bytes,
                usage: wgpu::BufferUsages::STORAGE,
            });
        scope.finish()?;
        self.storage.insert(kind, buffer);
        self.kernel = None;
        Ok(())
    }

    fn unbind_storage(&mut self, kind: BufferKind) {
        if self.storage.remove(&kind).is_some() {
            self.kernel = None;
        }
    }

    fn set_uniforms(&mut self, uniforms: &FrameUniforms) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytes_of(uniforms));
    }

    fn dispatch(&mut self, groups: WorkGroups) -> Result<(), BackendError> {
        if self.kernel.is_none() {
            self.kernel = Some(self.build_kernel()?);
        }
        let Some(kernel) = self.kernel.as_ref() else {
            return Ok(());
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kernel-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("raytrace-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &kernel.bind_group, &[]);
            pass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
        self.encoder = Some(encoder);
        self.sync.dispatched();
        Ok(())
    }

    fn barrier(&mut self) -> Result<(), BackendError> {
        // Submitting the compute work before the presentation pass is
        // recorded orders the storage writes before any sampled read.
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.sync.synchronized();
        Ok(())
    }

    fn present(&mut self) -> Result<(), BackendError> {
        self.sync.begin_present()?;
        let Some(bind_group) = self.present_bind_group.as_ref() else {
            return Ok(());
        };

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(err) => {
                warn!("Surface unavailable ({err}); retrying next frame");
                return Ok(());
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.present_pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..4, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn release(&mut self) {
        self.encoder = None;
        self.kernel = None;
        self.present_bind_group = None;
        if let Some(output) = self.output.take() {
            output.texture.destroy();
            debug!("released output image");
        }
    }
}

/// Captures validation and allocation errors raised while resources are
/// created, instead of leaving them to the device's uncaptured error handler.
struct CreationScope<'a> {
    device: &'a wgpu::Device,
    what: &'static str,
}

impl<'a> CreationScope<'a> {
    fn begin(device: &'a wgpu::Device, what: &'static str) -> Self {
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        Self { device, what }
    }

    fn finish(self) -> Result<(), BackendError> {
        let validation = block_on(self.device.pop_error_scope());
        let out_of_memory = block_on(self.device.pop_error_scope());
        if out_of_memory.is_some() {
            return Err(BackendError::OutOfMemory);
        }
        match validation {
            Some(err) => Err(BackendError::resource(self.what, err)),
            None => Ok(()),
        }
    }
}

/// Rejects render sizes the device cannot allocate or dispatch.
pub fn check_render_limits(
    render: RenderSettings,
    limits: &wgpu::Limits,
) -> Result<(), BackendError> {
    let max_side = limits.max_texture_dimension_2d;
    if render.width > max_side || render.height > max_side {
        return Err(BackendError::resource(
            "output image",
            format!(
                "{}x{} exceeds the device limit of {max_side} pixels per side",
                render.width, render.height
            ),
        ));
    }
    let groups = WorkGroups::for_image(render);
    let max_groups = limits.max_compute_workgroups_per_dimension;
    if groups.x > max_groups || groups.y > max_groups {
        return Err(BackendError::resource(
            "compute dispatch",
            format!(
                "{}x{} work groups exceed the device limit of {max_groups} per dimension",
                groups.x, groups.y
            ),
        ));
    }
    Ok(())
}

impl OutputImage {
    fn create(device: &wgpu::Device, render: RenderSettings) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("output-image"),
            size: wgpu::Extent3d {
                width: render.width,
                height: render.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

fn create_present_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("present-shader"),
        source: wgpu::ShaderSource::Wgsl(PRESENT_SHADER.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("present-pipeline-layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("present-pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

fn create_present_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("present-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn log_compute_limits(adapter: &wgpu::Adapter) {
    let info = adapter.get_info();
    let limits = adapter.limits();
    info!("GPU adapter: {} ({:?})", info.name, info.backend);
    info!(
        "max compute work groups per dimension: {}",
        limits.max_compute_workgroups_per_dimension
    );
    info!(
        "max compute work group size: {} x {} x {}",
        limits.max_compute_workgroup_size_x,
        limits.max_compute_workgroup_size_y,
        limits.max_compute_workgroup_size_z
    );
    info!(
        "max compute invocations per work group: {}",
        limits.max_compute_invocations_per_workgroup
    );
    if limits.max_storage_buffers_per_shader_stage < BufferKind::ALL.len() as u32 {
        warn!(
            "adapter exposes only {} storage buffers per stage",
            limits.max_storage_buffers_per_shader_stage
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_render_size_fits_default_limits() {
        assert!(check_render_limits(RenderSettings::default(), &wgpu::Limits::default()).is_ok());
    }

    #[test]
    fn oversized_output_image_is_a_creation_error() {
        let render = RenderSettings {
            width: 16384,
            height: 16384,
        };
        let err = check_render_limits(render, &wgpu::Limits::default()).unwrap_err();
        assert!(matches!(
            err,
            BackendError::ResourceCreation {
                what: "output image",
                ..
            }
        ));
    }

    #[test]
    fn dispatch_grid_must_fit_work_group_limit() {
        let limits = wgpu::Limits {
            max_compute_workgroups_per_dimension: 64,
            ..wgpu::Limits::default()
        };
        let render = RenderSettings {
            width: 1024,
            height: 128,
        };
        let err = check_render_limits(render, &limits).unwrap_err();
        assert!(matches!(
            err,
            BackendError::ResourceCreation {
                what: "compute dispatch",
                ..
            }
        ));
    }
}
