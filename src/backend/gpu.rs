use bevy::{
    log::{debug, info},
    math::{Mat4, Vec3},
};
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use wgpu::util::DeviceExt;

use crate::{
    backend::{box_triangles, AccumulationPass, ExposureBackend, TexelRect},
    error::BackendError,
    grid::SampleLayer,
    light::LightState,
};


const DEPTH_SHADER: &str = include_str!("depth.wgsl");
const ACCUMULATE_SHADER: &str = include_str!("accumulate.wgsl");

pub const LIGHT_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const ACCUMULATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;


#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DepthUniforms {
    clip_from_local: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct AccumulationUniforms {
    clip_from_local: [[f32; 4]; 4],
    weight: f32,
    depth_bias: f32,
    texture_size: u32,
    lit: u32,
}

const_assert_eq!(std::mem::size_of::<DepthUniforms>(), 64);
const_assert_eq!(std::mem::size_of::<AccumulationUniforms>(), 80);


pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: u32,
}

pub struct GpuPoints {
    positions: wgpu::Buffer,
    texels: wgpu::Buffer,
    count: u32,
}

struct ShadowMap {
    view: wgpu::TextureView,
    size: u32,
}

struct Occluders {
    vertices: wgpu::Buffer,
    count: u32,
}


/// Hardware backend: a depth-only render pass from the light camera followed by
/// a point-list pass into an `Rgba8Unorm` ping-pong target.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    depth_texture: bool,
    depth_bias: f32,

    shadow_map: ShadowMap,
    occluders: Option<Occluders>,
    light: Option<Mat4>,

    depth_pipeline: wgpu::RenderPipeline,
    depth_uniforms: wgpu::Buffer,
    depth_bind_group: wgpu::BindGroup,

    accumulate_pipeline: wgpu::RenderPipeline,
    accumulate_layout: wgpu::BindGroupLayout,
    accumulate_uniforms: wgpu::Buffer,
}

impl WgpuBackend {
    /// Requests a default adapter without a surface.
    pub fn headless(shadow_map_size: u32, depth_bias: f32) -> Result<Self, BackendError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok_or_else(|| BackendError::device("no compatible gpu adapter"))?;

            let info = adapter.get_info();
            info!("sunshine analysis adapter: {} ({:?})", info.name, info.backend);

            let (device, queue) = adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("sunshine_analysis_device"),
                        required_features: wgpu::Features::empty(),
                        required_limits: wgpu::Limits::default(),
                        ..Default::default()
                    },
                    None,
                )
                .await
                .map_err(BackendError::device)?;

            Self::from_device(&adapter, device, queue, shadow_map_size, depth_bias)
        })
    }

    pub fn from_device(
        adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        shadow_map_size: u32,
        depth_bias: f32,
    ) -> Result<Self, BackendError> {
        let required = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let depth_texture = adapter
            .get_texture_format_features(LIGHT_DEPTH_FORMAT)
            .allowed_usages
            .contains(required);

        let shadow_map = create_shadow_map(&device, shadow_map_size.max(1))?;

        let depth_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sunshine_depth_shader"),
            source: wgpu::ShaderSource::Wgsl(DEPTH_SHADER.into()),
        });
        let accumulate_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sunshine_accumulate_shader"),
            source: wgpu::ShaderSource::Wgsl(ACCUMULATE_SHADER.into()),
        });

        let depth_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sunshine_depth_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });

        let depth_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sunshine_depth_uniforms"),
            size: std::mem::size_of::<DepthUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let depth_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sunshine_depth_bind_group"),
            layout: &depth_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: depth_uniforms.as_entire_binding(),
            }],
        });

        let depth_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sunshine_depth_pipeline_layout"),
            bind_group_layouts: &[&depth_layout],
            push_constant_ranges: &[],
        });

        let depth_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sunshine_depth_pipeline"),
            layout: Some(&depth_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &depth_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: LIGHT_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: None,
            multiview: None,
            cache: None,
        });

        let accumulate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sunshine_accumulate_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let accumulate_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sunshine_accumulate_uniforms"),
            size: std::mem::size_of::<AccumulationUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let accumulate_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sunshine_accumulate_pipeline_layout"),
            bind_group_layouts: &[&accumulate_layout],
            push_constant_ranges: &[],
        });

        let accumulate_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sunshine_accumulate_pipeline"),
            layout: Some(&accumulate_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &accumulate_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        }],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[u32; 2]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Uint32x2,
                            offset: 0,
                            shader_location: 1,
                        }],
                    },
                ],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::PointList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &accumulate_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ACCUMULATION_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        debug!("sunshine backend ready, depth texture support: {depth_texture}");

        Ok(Self {
            device,
            queue,
            depth_texture,
            depth_bias,
            shadow_map,
            occluders: None,
            light: None,
            depth_pipeline,
            depth_uniforms,
            depth_bind_group,
            accumulate_pipeline,
            accumulate_layout,
            accumulate_uniforms,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn shadow_map_size(&self) -> u32 {
        self.shadow_map.size
    }

    pub fn set_boxes(&mut self, boxes: &[(Vec3, Vec3)]) -> Result<(), BackendError> {
        let triangles: Vec<[Vec3; 3]> = boxes
            .iter()
            .flat_map(|&(min, max)| box_triangles(min, max))
            .collect();
        self.set_occluders(&triangles)
    }

    /// Runs `create` inside out-of-memory and validation error scopes, so device
    /// failures come back as errors instead of reaching the uncaptured handler.
    fn scoped<T>(
        &self,
        what: &str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match out_of_memory.or(validation) {
            Some(error) => Err(BackendError::allocation(format!("{what}: {error}"))),
            None => Ok(value),
        }
    }
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

fn create_shadow_map(device: &wgpu::Device, size: u32) -> Result<ShadowMap, BackendError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("sunshine_light_depth"),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: LIGHT_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(BackendError::allocation(format!("light depth buffer: {error}")));
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(ShadowMap { view, size })
}

impl ExposureBackend for WgpuBackend {
    type Texture = GpuTexture;
    type Points = GpuPoints;

    fn supports_depth_texture(&self) -> bool {
        self.depth_texture
    }

    fn create_points(&mut self, layer: &SampleLayer) -> Result<GpuPoints, BackendError> {
        let positions: Vec<[f32; 3]> = layer.points.iter().map(|p| p.local.to_array()).collect();
        let texels: Vec<[u32; 2]> = layer.points.iter().map(|p| p.texel.to_array()).collect();

        // zero-sized vertex buffers are not bindable
        let padded = |bytes: &[u8]| -> Vec<u8> {
            if bytes.is_empty() { vec![0; 16] } else { bytes.to_vec() }
        };
        let position_bytes = padded(bytemuck::cast_slice(&positions));
        let texel_bytes = padded(bytemuck::cast_slice(&texels));

        let (positions_buffer, texels_buffer) = self.scoped("sample point buffers", |device| {
            let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sunshine_sample_positions"),
                contents: &position_bytes,
                usage: wgpu::BufferUsages::VERTEX,
            });
            let texels = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sunshine_sample_texels"),
                contents: &texel_bytes,
                usage: wgpu::BufferUsages::VERTEX,
            });
            (positions, texels)
        })?;

        Ok(GpuPoints {
            positions: positions_buffer,
            texels: texels_buffer,
            count: layer.points.len() as u32,
        })
    }

    fn create_accumulation_texture(&mut self, size: u32) -> Result<GpuTexture, BackendError> {
        let texture = self.scoped("accumulation texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("sunshine_accumulation"),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: ACCUMULATION_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture { texture, view, size })
    }

    fn set_occluders(&mut self, triangles: &[[Vec3; 3]]) -> Result<(), BackendError> {
        if triangles.is_empty() {
            self.occluders = None;
            return Ok(());
        }

        let vertices: Vec<[f32; 3]> = triangles
            .iter()
            .flat_map(|triangle| triangle.map(|v| v.to_array()))
            .collect();

        let buffer = self.scoped("occluder vertex buffer", |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sunshine_occluders"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
        })?;

        self.occluders = Some(Occluders {
            vertices: buffer,
            count: vertices.len() as u32,
        });
        Ok(())
    }

    fn render_depth(&mut self, light: &LightState) -> Result<(), BackendError> {
        self.light = light.clip_from_local_f32();

        self.scoped("light depth pass", |device| {
            if let Some(clip_from_local) = self.light {
                let uniforms = DepthUniforms {
                    clip_from_local: clip_from_local.to_cols_array_2d(),
                };
                self.queue.write_buffer(&self.depth_uniforms, 0, bytemuck::bytes_of(&uniforms));
            }

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sunshine_depth_encoder"),
            });

            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("sunshine_depth_pass"),
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &self.shadow_map.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });

                if let (Some(_), Some(occluders)) = (self.light, self.occluders.as_ref()) {
                    pass.set_pipeline(&self.depth_pipeline);
                    pass.set_bind_group(0, &self.depth_bind_group, &[]);
                    pass.set_vertex_buffer(0, occluders.vertices.slice(..));
                    pass.draw(0..occluders.count, 0..1);
                }
            }

            self.queue.submit(Some(encoder.finish()));
        })
    }

    fn accumulate(&mut self, pass: AccumulationPass<'_, Self>) -> Result<(), BackendError> {
        if pass.previous.size != pass.target.size {
            return Err(BackendError::device("ping-pong textures differ in size"));
        }

        let uniforms = AccumulationUniforms {
            clip_from_local: self.light.unwrap_or(Mat4::IDENTITY).to_cols_array_2d(),
            weight: pass.weight,
            depth_bias: self.depth_bias,
            texture_size: pass.target.size,
            lit: self.light.is_some() as u32,
        };
        self.scoped("accumulation pass", |device| {
            self.queue.write_buffer(&self.accumulate_uniforms, 0, bytemuck::bytes_of(&uniforms));

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("sunshine_accumulate_bind_group"),
                layout: &self.accumulate_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.accumulate_uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&self.shadow_map.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&pass.previous.view),
                    },
                ],
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sunshine_accumulate_encoder"),
            });

            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("sunshine_accumulate_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &pass.target.view,
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

                if pass.points.count > 0 {
                    render_pass.set_pipeline(&self.accumulate_pipeline);
                    render_pass.set_bind_group(0, &bind_group, &[]);
                    render_pass.set_vertex_buffer(0, pass.points.positions.slice(..));
                    render_pass.set_vertex_buffer(1, pass.points.texels.slice(..));
                    render_pass.draw(0..pass.points.count, 0..1);
                }
            }

            self.queue.submit(Some(encoder.finish()));
        })
    }

    fn read_pixels(&mut self, texture: &GpuTexture, rect: TexelRect) -> Result<Vec<[u8; 4]>, BackendError> {
        if !rect.fits(texture.size) {
            return Err(rect.out_of_bounds(texture.size));
        }

        let unpadded_bytes_per_row = rect.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging = self.scoped("readback buffer", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("sunshine_readback"),
                size: (padded_bytes_per_row * rect.height) as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        })?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sunshine_readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver.receive())
            .ok_or_else(|| BackendError::readback("map callback dropped"))?
            .map_err(BackendError::readback)?;

        let pixels = {
            let data = slice.get_mapped_range();
            let mut pixels = Vec::with_capacity((rect.width * rect.height) as usize);
            for row in data.chunks(padded_bytes_per_row as usize) {
                let row: &[[u8; 4]] = bytemuck::cast_slice(&row[..unpadded_bytes_per_row as usize]);
                pixels.extend_from_slice(row);
            }
            pixels
        };
        staging.unmap();

        Ok(pixels)
    }

    fn texture_size(&self, texture: &GpuTexture) -> u32 {
        texture.size
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layout_matches_wgsl() {
        let uniforms = AccumulationUniforms {
            clip_from_local: Mat4::IDENTITY.to_cols_array_2d(),
            weight: 0.25,
            depth_bias: 1e-4,
            texture_size: 1024,
            lit: 1,
        };
        let bytes = bytemuck::bytes_of(&uniforms);
        assert_eq!(bytes.len(), 80);
        assert_eq!(&bytes[64..68], &0.25_f32.to_ne_bytes());
        assert_eq!(&bytes[72..76], &1024_u32.to_ne_bytes());
    }

    #[test]
    fn shaders_declare_entry_points() {
        assert!(DEPTH_SHADER.contains("fn vs_main"));
        assert!(ACCUMULATE_SHADER.contains("fn vs_main"));
        assert!(ACCUMULATE_SHADER.contains("fn fs_main"));
        assert!(ACCUMULATE_SHADER.contains("fn pack_ratio"));
    }

    // needs an adapter; hosts without one skip it
    #[test]
    fn device_errors_come_back_as_backend_errors() {
        let Ok(backend) = WgpuBackend::headless(64, 1e-4) else {
            return;
        };

        let zero_sized = backend.scoped("zero sized texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: None,
                size: wgpu::Extent3d {
                    width: 0,
                    height: 0,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: ACCUMULATION_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        });
        assert!(matches!(zero_sized, Err(BackendError::Allocation(_))));

        let healthy = backend.scoped("uniform buffer", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: None,
                size: 64,
                usage: wgpu::BufferUsages::UNIFORM,
                mapped_at_creation: false,
            })
        });
        assert!(healthy.is_ok());
    }
}
