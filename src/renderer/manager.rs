use crate::renderer::backend::{Backend, DescriptorWrite, DeviceLimits};
use crate::renderer::cache::{Retention, SingleFlightCache};
use crate::renderer::common::{
    DepthPlane, DepthStencilAspect, DescriptorClass, DescriptorType, Format, GraphicsApi, MemoryAccess, ResourceState, ResourceType,
    align_up, compute_num_mips, content_hash,
};
use crate::renderer::config::RenderConfig;
use crate::renderer::handle::{HandleInner, HandleOwner, ResourceHandle, ResourceKind, SlotPool};
use crate::renderer::resources::color_buffer::ColorBufferDesc;
use crate::renderer::resources::depth_buffer::DepthBufferDesc;
use crate::renderer::resources::gpu_buffer::GpuBufferDesc;
use crate::renderer::resources::pipeline_state::{
    ComputePipelineDesc, GraphicsPipelineDesc, MeshletPipelineDesc, PipelineDesc,
};
use crate::renderer::resources::root_signature::{DescriptorSetLayout, RootParameter, RootSignatureDesc};
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::shader::{PipelineShaders, ShaderManager};
use color_eyre::eyre::{OptionExt, bail, eyre};
use color_eyre::Result;
use glam::Vec4;
use std::any::Any;
use std::sync::{Arc, Weak};

/// Backend agnostic surface the wrapper types talk to
pub trait ResourceManager: Send + Sync {
    fn api(&self) -> GraphicsApi;
    fn limits(&self) -> DeviceLimits;
    fn live_count(&self, kind: ResourceKind) -> usize;
    fn as_any(&self) -> &dyn Any;

    fn create_color_buffer(&self, desc: &ColorBufferDesc, initial_data: Option<&[u8]>) -> Result<ResourceHandle>;
    fn create_depth_buffer(&self, desc: &DepthBufferDesc) -> Result<ResourceHandle>;
    fn create_gpu_buffer(&self, desc: &GpuBufferDesc) -> Result<ResourceHandle>;
    fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<ResourceHandle>;
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<ResourceHandle>;
    fn create_meshlet_pipeline(&self, desc: &MeshletPipelineDesc) -> Result<ResourceHandle>;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<ResourceHandle>;
    fn create_descriptor_set(&self, root_signature: &ResourceHandle, root_parameter: u32) -> Result<ResourceHandle>;

    fn name(&self, handle: &ResourceHandle) -> Option<String>;
    fn resource_type(&self, handle: &ResourceHandle) -> Option<ResourceType>;
    fn width(&self, handle: &ResourceHandle) -> Option<u64>;
    fn height(&self, handle: &ResourceHandle) -> Option<u32>;
    fn array_size_or_depth(&self, handle: &ResourceHandle) -> Option<u32>;
    fn num_mips(&self, handle: &ResourceHandle) -> Option<u32>;
    fn num_samples(&self, handle: &ResourceHandle) -> Option<u32>;
    fn format(&self, handle: &ResourceHandle) -> Option<Format>;
    fn plane_count(&self, handle: &ResourceHandle) -> Option<u8>;
    fn clear_color(&self, handle: &ResourceHandle) -> Option<Vec4>;
    fn clear_depth(&self, handle: &ResourceHandle) -> Option<f32>;
    fn clear_stencil(&self, handle: &ResourceHandle) -> Option<u8>;
    fn usage_state(&self, handle: &ResourceHandle) -> Option<ResourceState>;
    fn set_usage_state(&self, handle: &ResourceHandle, state: ResourceState);

    fn element_count(&self, handle: &ResourceHandle) -> Option<usize>;
    fn element_size(&self, handle: &ResourceHandle) -> Option<usize>;
    fn buffer_size(&self, handle: &ResourceHandle) -> Option<u64>;
    fn gpu_address(&self, handle: &ResourceHandle) -> Option<u64>;
    /// Copies `data` into a CPU writable buffer at `offset`
    fn update(&self, handle: &ResourceHandle, offset: u64, data: &[u8]) -> Result<()>;

    fn num_root_parameters(&self, handle: &ResourceHandle) -> Option<u32>;
    fn root_parameter(&self, handle: &ResourceHandle, index: u32) -> Option<RootParameter>;
    /// Hash of the translated native object behind a root signature or pipeline
    fn content_hash(&self, handle: &ResourceHandle) -> Option<u64>;

    fn set_srv(&self, set: &ResourceHandle, slot: u32, resource: &ResourceHandle) -> Result<()>;
    fn set_depth_srv(&self, set: &ResourceHandle, slot: u32, depth_buffer: &ResourceHandle, plane: DepthPlane) -> Result<()>;
    fn set_uav(&self, set: &ResourceHandle, slot: u32, resource: &ResourceHandle, mip: u32) -> Result<()>;
    fn set_cbv(&self, set: &ResourceHandle, slot: u32, buffer: &ResourceHandle) -> Result<()>;
    fn set_sampler(&self, set: &ResourceHandle, slot: u32, sampler: &SamplerDesc) -> Result<()>;
    fn set_dynamic_offset(&self, set: &ResourceHandle, offset: u32) -> Result<()>;
    fn update_gpu_descriptors(&self, set: &ResourceHandle) -> Result<()>;

    fn num_descriptors(&self, set: &ResourceHandle) -> Option<u32>;
    fn is_root_buffer(&self, set: &ResourceHandle) -> Option<bool>;
    fn dirty_bits(&self, set: &ResourceHandle) -> Option<u32>;
    fn root_buffer_address(&self, set: &ResourceHandle) -> Option<u64>;
    fn dynamic_offset(&self, set: &ResourceHandle) -> Option<u32>;
}

struct TextureHot<T> {
    native: T,
    usage_state: ResourceState,
}

struct GpuBufferCold {
    desc: GpuBufferDesc,
    element_size: u64,
    size: u64,
}

struct RootSignatureHot<B: Backend> {
    native: Arc<B::RootSignature>,
    key: B::RootSignatureKey,
    layouts: Vec<Option<DescriptorSetLayout>>,
    content_hash: u64,
}

struct PipelineHot<B: Backend> {
    native: Arc<B::Pipeline>,
    content_hash: u64,
    _root_signature: ResourceHandle,
}

struct DescriptorSetCold {
    layout: DescriptorSetLayout,
    _root_signature: ResourceHandle,
}

struct DescriptorSetHot<B: Backend> {
    storage: B::DescriptorStorage,
    descriptors: Vec<Option<B::Descriptor>>,
    dirty: u32,
    gpu_address: u64,
    dynamic_offset: u32,
}

/// What a view was taken from, which decides the slot types it can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewSource {
    Texture,
    TypedBuffer,
    Buffer,
    ConstantBuffer,
    Sampler,
}

impl ViewSource {
    fn buffer(resource_type: ResourceType, class: DescriptorClass) -> Self {
        if class == DescriptorClass::ConstantBuffer {
            Self::ConstantBuffer
        } else if resource_type.contains(ResourceType::TYPED_BUFFER) {
            Self::TypedBuffer
        } else {
            Self::Buffer
        }
    }

    fn fills(self, descriptor_type: DescriptorType) -> bool {
        use DescriptorType::*;
        match self {
            Self::Texture => matches!(descriptor_type, TextureSRV | TextureUAV),
            Self::TypedBuffer => matches!(descriptor_type, TypedBufferSRV | TypedBufferUAV),
            Self::Buffer => matches!(
                descriptor_type,
                StructuredBufferSRV | StructuredBufferUAV | RawBufferSRV | RawBufferUAV
            ),
            Self::ConstantBuffer => matches!(descriptor_type, ConstantBuffer | DynamicConstantBuffer),
            Self::Sampler => descriptor_type == Sampler,
        }
    }
}

/// View about to be written into a descriptor set slot
struct SlotWrite<D> {
    class: DescriptorClass,
    source: ViewSource,
    descriptor: D,
    gpu_address: Option<u64>,
}

/// Owns every slot pool and native object cache of one device
pub struct BackendResourceManager<B: Backend> {
    self_ref: Weak<Self>,
    backend: B,
    shaders: ShaderManager,

    color_buffers: SlotPool<ColorBufferDesc, TextureHot<B::ColorBuffer>>,
    depth_buffers: SlotPool<DepthBufferDesc, TextureHot<B::DepthBuffer>>,
    gpu_buffers: SlotPool<GpuBufferCold, TextureHot<B::GpuBuffer>>,
    root_signatures: SlotPool<RootSignatureDesc, RootSignatureHot<B>>,
    pipelines: SlotPool<PipelineDesc, PipelineHot<B>>,
    descriptor_sets: SlotPool<DescriptorSetCold, DescriptorSetHot<B>>,

    root_signature_cache: SingleFlightCache<B::RootSignatureKey, B::RootSignature>,
    pipeline_cache: SingleFlightCache<B::PipelineKey, B::Pipeline>,
}

impl<B: Backend> BackendResourceManager<B> {
    pub fn new(backend: B, config: &RenderConfig) -> Arc<Self> {
        let shaders = ShaderManager::new(config.shader_paths.clone(), backend.api());
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            backend,
            shaders,

            color_buffers: SlotPool::new("color buffer", config.max_color_buffers),
            depth_buffers: SlotPool::new("depth buffer", config.max_depth_buffers),
            gpu_buffers: SlotPool::new("gpu buffer", config.max_gpu_buffers),
            root_signatures: SlotPool::new("root signature", config.max_root_signatures),
            pipelines: SlotPool::new("pipeline", config.max_pipelines),
            descriptor_sets: SlotPool::new("descriptor set", config.max_descriptor_sets),

            root_signature_cache: SingleFlightCache::new("root signature", Retention::Weak),
            pipeline_cache: SingleFlightCache::new("pipeline", Retention::Weak),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn shaders(&self) -> &ShaderManager {
        &self.shaders
    }

    /// Distinct native pipelines currently cached
    pub fn num_cached_pipelines(&self) -> usize {
        self.pipeline_cache.len()
    }

    pub fn num_cached_root_signatures(&self) -> usize {
        self.root_signature_cache.len()
    }

    /// Runs `f` on the native colour buffer behind `handle`
    pub fn with_color_buffer<R>(&self, handle: &ResourceHandle, f: impl FnOnce(&B::ColorBuffer) -> R) -> Option<R> {
        if handle.kind() != ResourceKind::ColorBuffer {
            return self.unsupported("with_color_buffer", handle);
        }
        self.color_buffers.with(handle.index(), |s| f(&s.hot.native))
    }

    pub fn with_gpu_buffer<R>(&self, handle: &ResourceHandle, f: impl FnOnce(&B::GpuBuffer) -> R) -> Option<R> {
        if handle.kind() != ResourceKind::GpuBuffer {
            return self.unsupported("with_gpu_buffer", handle);
        }
        self.gpu_buffers.with(handle.index(), |s| f(&s.hot.native))
    }

    /// Runs `f` on the native pipeline behind `handle`, which may be shared with other handles
    pub fn with_pipeline<R>(&self, handle: &ResourceHandle, f: impl FnOnce(&B::Pipeline) -> R) -> Option<R> {
        if handle.kind() != ResourceKind::Pipeline {
            return self.unsupported("with_pipeline", handle);
        }
        self.pipelines.with(handle.index(), |s| f(&s.hot.native))
    }

    /// Render target view of a colour buffer, `None` when it cannot be rendered to
    pub fn render_target_view(&self, handle: &ResourceHandle) -> Option<B::AttachmentView> {
        if handle.kind() != ResourceKind::ColorBuffer {
            return self.unsupported("render_target_view", handle);
        }
        self.color_buffers
            .with(handle.index(), |s| self.backend.color_buffer_rtv(&s.hot.native))
            .flatten()
    }

    pub fn depth_stencil_view(&self, handle: &ResourceHandle, aspect: DepthStencilAspect) -> Option<B::AttachmentView> {
        if handle.kind() != ResourceKind::DepthBuffer {
            return self.unsupported("depth_stencil_view", handle);
        }
        self.depth_buffers
            .with(handle.index(), |s| self.backend.depth_buffer_dsv(&s.hot.native, aspect))
    }

    fn new_handle(&self, index: u32, kind: ResourceKind) -> ResourceHandle {
        let owner: Weak<dyn HandleOwner> = self.self_ref.clone();
        HandleInner::new(index, kind, owner)
    }

    fn unsupported<T>(&self, operation: &str, handle: &ResourceHandle) -> Option<T> {
        log::error!("{operation} is not supported on {:?} handles", handle.kind());
        None
    }

    fn expect_kind(&self, handle: &ResourceHandle, kind: ResourceKind) -> Result<()> {
        if handle.kind() != kind {
            log::error!("Expected a {kind:?} handle, got {:?}", handle.kind());
            bail!("expected a {kind:?} handle, got {:?}", handle.kind());
        }
        Ok(())
    }

    fn create_pipeline(
        &self,
        cold: PipelineDesc,
        root_signature: &ResourceHandle,
        shaders: PipelineShaders,
        translate: impl FnOnce(&B::RootSignatureKey) -> Result<B::PipelineKey>,
    ) -> Result<ResourceHandle> {
        self.expect_kind(root_signature, ResourceKind::RootSignature)?;
        let (rs_key, rs_native) = self
            .root_signatures
            .with(root_signature.index(), |s| (s.hot.key.clone(), s.hot.native.clone()))
            .ok_or_eyre("pipeline root signature is not live")?;

        let key = translate(&rs_key)?;
        let hash = content_hash(&key);
        let name = cold.name().to_string();
        let native = self.pipeline_cache.get_or_create(&key, || {
            log::info!("Compiling pipeline {name} ({hash:016x})");
            self.backend
                .create_pipeline(&key, &shaders, &rs_native)
                .map(Arc::new)
                .inspect_err(|e| log::error!("Failed to create pipeline {name}: {e}"))
        })?;

        let index = self.pipelines.insert(
            cold,
            PipelineHot {
                native,
                content_hash: hash,
                _root_signature: root_signature.clone(),
            },
        );
        Ok(self.new_handle(index, ResourceKind::Pipeline))
    }

    fn resource_descriptor(
        &self,
        resource: &ResourceHandle,
        class: DescriptorClass,
        mip: u32,
    ) -> Option<SlotWrite<B::Descriptor>> {
        let index = resource.index();
        let texture = |descriptor| SlotWrite {
            class,
            source: ViewSource::Texture,
            descriptor,
            gpu_address: None,
        };
        match (resource.kind(), class) {
            (ResourceKind::ColorBuffer, DescriptorClass::ShaderResource) => self
                .color_buffers
                .with(index, |s| self.backend.color_buffer_srv(&s.hot.native))
                .map(texture),
            (ResourceKind::ColorBuffer, DescriptorClass::UnorderedAccess) => self
                .color_buffers
                .with(index, |s| self.backend.color_buffer_uav(&s.hot.native, mip))
                .flatten()
                .map(texture),
            (ResourceKind::DepthBuffer, DescriptorClass::ShaderResource) => self
                .depth_buffers
                .with(index, |s| self.backend.depth_buffer_srv(&s.hot.native, DepthPlane::Depth))
                .map(texture),
            (ResourceKind::GpuBuffer, _) => self
                .gpu_buffers
                .with(index, |s| {
                    let descriptor = match class {
                        DescriptorClass::ShaderResource => self.backend.gpu_buffer_srv(&s.hot.native),
                        DescriptorClass::UnorderedAccess => self.backend.gpu_buffer_uav(&s.hot.native),
                        DescriptorClass::ConstantBuffer => self.backend.gpu_buffer_cbv(&s.hot.native),
                        DescriptorClass::Sampler => None,
                    };
                    descriptor.map(|descriptor| SlotWrite {
                        class,
                        source: ViewSource::buffer(s.cold.desc.resource_type, class),
                        descriptor,
                        gpu_address: Some(self.backend.gpu_buffer_address(&s.hot.native)),
                    })
                })
                .flatten(),
            _ => None,
        }
    }

    /// Records a view in `slot`, marking it dirty only when it changed
    fn write_slot(&self, set: &ResourceHandle, slot: u32, write: SlotWrite<B::Descriptor>) -> Result<()> {
        self.expect_kind(set, ResourceKind::DescriptorSet)?;
        self.descriptor_sets
            .with_mut(set.index(), |s| {
                let layout = &s.cold.layout;
                let Some(binding) = layout.slots.get(slot as usize) else {
                    bail!(
                        "slot {slot} is out of range, root parameter {} has {} slots",
                        layout.root_parameter,
                        layout.slots.len()
                    );
                };
                if binding.class() != write.class || !write.source.fills(binding.descriptor_type) {
                    log::warn!(
                        "Slot {slot} of root parameter {} holds {:?}, not a {:?} {:?} view",
                        layout.root_parameter,
                        binding.descriptor_type,
                        write.source,
                        write.class
                    );
                    bail!("{:?} view does not fit the {:?} in slot {slot}", write.source, binding.descriptor_type);
                }

                if layout.is_root_buffer {
                    let Some(address) = write.gpu_address else {
                        bail!(
                            "root parameter {} binds a buffer address, {:?} views have none",
                            layout.root_parameter,
                            write.source
                        );
                    };
                    s.hot.gpu_address = address;
                }

                let current = &mut s.hot.descriptors[slot as usize];
                if current.as_ref() != Some(&write.descriptor) {
                    *current = Some(write.descriptor);
                    s.hot.dirty |= 1 << slot;
                }
                Ok(())
            })
            .ok_or_eyre("descriptor set is not live")?
    }

    fn set_resource(&self, set: &ResourceHandle, slot: u32, resource: &ResourceHandle, class: DescriptorClass, mip: u32) -> Result<()> {
        let write = self
            .resource_descriptor(resource, class, mip)
            .ok_or_else(|| eyre!("{:?} handle has no {class:?} view (mip {mip})", resource.kind()))?;
        self.write_slot(set, slot, write)
    }
}

impl<B: Backend> HandleOwner for BackendResourceManager<B> {
    fn destroy_handle(&self, index: u32, kind: ResourceKind) {
        let released = match kind {
            ResourceKind::ColorBuffer => self.color_buffers.remove(index).is_some(),
            ResourceKind::DepthBuffer => self.depth_buffers.remove(index).is_some(),
            ResourceKind::GpuBuffer => self.gpu_buffers.remove(index).is_some(),
            ResourceKind::RootSignature => self.root_signatures.remove(index).is_some(),
            ResourceKind::Pipeline => self.pipelines.remove(index).is_some(),
            ResourceKind::DescriptorSet => self.descriptor_sets.remove(index).is_some(),
        };
        if released {
            log::trace!("Released {kind:?} slot {index}");
        } else {
            log::error!("Released {kind:?} slot {index} which was not live");
        }
    }
}

impl<B: Backend> ResourceManager for BackendResourceManager<B> {
    fn api(&self) -> GraphicsApi {
        self.backend.api()
    }

    fn limits(&self) -> DeviceLimits {
        self.backend.limits()
    }

    fn live_count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::ColorBuffer => self.color_buffers.live_count(),
            ResourceKind::DepthBuffer => self.depth_buffers.live_count(),
            ResourceKind::GpuBuffer => self.gpu_buffers.live_count(),
            ResourceKind::RootSignature => self.root_signatures.live_count(),
            ResourceKind::Pipeline => self.pipelines.live_count(),
            ResourceKind::DescriptorSet => self.descriptor_sets.live_count(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn create_color_buffer(&self, desc: &ColorBufferDesc, initial_data: Option<&[u8]>) -> Result<ResourceHandle> {
        if desc.width == 0 || desc.height == 0 {
            bail!("color buffer {} has a zero extent", desc.name);
        }
        if !desc.format.is_color() {
            bail!("color buffer {} has non-colour format {:?}", desc.name, desc.format);
        }

        let mut desc = desc.clone();
        if desc.num_mips == 0 {
            desc.num_mips = compute_num_mips(desc.width, desc.height);
        }
        if desc.resource_type.is_multisampled() && desc.num_mips > 1 {
            log::warn!("Multisampled color buffer {} clamped to one mip", desc.name);
            desc.num_mips = 1;
        }

        let native = self.backend.create_color_buffer(&desc, initial_data)?;
        log::debug!(
            "Created color buffer {} {}x{} {:?} with {} mips",
            desc.name,
            desc.width,
            desc.height,
            desc.format,
            desc.num_mips
        );
        let index = self.color_buffers.insert(
            desc,
            TextureHot {
                native,
                usage_state: ResourceState::COMMON,
            },
        );
        Ok(self.new_handle(index, ResourceKind::ColorBuffer))
    }

    fn create_depth_buffer(&self, desc: &DepthBufferDesc) -> Result<ResourceHandle> {
        if desc.width == 0 || desc.height == 0 {
            bail!("depth buffer {} has a zero extent", desc.name);
        }
        if !desc.format.is_depth() {
            bail!("depth buffer {} has non-depth format {:?}", desc.name, desc.format);
        }

        let native = self.backend.create_depth_buffer(desc)?;
        log::debug!("Created depth buffer {} {}x{} {:?}", desc.name, desc.width, desc.height, desc.format);
        let index = self.depth_buffers.insert(
            desc.clone(),
            TextureHot {
                native,
                usage_state: ResourceState::COMMON,
            },
        );
        Ok(self.new_handle(index, ResourceKind::DepthBuffer))
    }

    fn create_gpu_buffer(&self, desc: &GpuBufferDesc) -> Result<ResourceHandle> {
        let mut element_size = desc.element_size as u64;
        if desc.resource_type.contains(ResourceType::CONSTANT_BUFFER) {
            element_size = align_up(element_size, self.backend.limits().constant_buffer_alignment);
        }
        let size = element_size * desc.element_count as u64;
        if size == 0 {
            bail!("gpu buffer {} is empty", desc.name);
        }
        if let Some(data) = &desc.initial_data {
            if data.len() as u64 > size {
                bail!("gpu buffer {} initial data is {} bytes, buffer is {size}", desc.name, data.len());
            }
        }

        let native = self.backend.create_gpu_buffer(desc, element_size, size)?;
        log::debug!("Created gpu buffer {} of {size} bytes", desc.name);
        let cold = GpuBufferCold {
            desc: GpuBufferDesc {
                initial_data: None,
                ..desc.clone()
            },
            element_size,
            size,
        };
        let index = self.gpu_buffers.insert(
            cold,
            TextureHot {
                native,
                usage_state: ResourceState::COMMON,
            },
        );
        Ok(self.new_handle(index, ResourceKind::GpuBuffer))
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<ResourceHandle> {
        desc.validate().inspect_err(|e| log::error!("Invalid root signature: {e}"))?;

        let key = self.backend.translate_root_signature(desc)?;
        let hash = content_hash(&key);
        let native = self.root_signature_cache.get_or_create(&key, || {
            log::debug!("Creating root signature {} ({hash:016x})", desc.name);
            self.backend.create_root_signature(&key).map(Arc::new)
        })?;

        let hot = RootSignatureHot {
            native,
            key,
            layouts: desc.descriptor_set_layouts(),
            content_hash: hash,
        };
        let index = self.root_signatures.insert(desc.clone(), hot);
        Ok(self.new_handle(index, ResourceKind::RootSignature))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<ResourceHandle> {
        let root_signature = desc
            .root_signature
            .as_ref()
            .ok_or_else(|| eyre!("graphics pipeline {} has no root signature", desc.name))?
            .handle()
            .clone();
        if desc.vertex_shader.is_none() {
            bail!("graphics pipeline {} has no vertex shader", desc.name);
        }

        let shaders = PipelineShaders {
            vertex: self.shaders.load_stage(desc.vertex_shader.as_ref())?,
            hull: self.shaders.load_stage(desc.hull_shader.as_ref())?,
            domain: self.shaders.load_stage(desc.domain_shader.as_ref())?,
            geometry: self.shaders.load_stage(desc.geometry_shader.as_ref())?,
            pixel: self.shaders.load_stage(desc.pixel_shader.as_ref())?,
            ..Default::default()
        };

        let cold = PipelineDesc::Graphics(GraphicsPipelineDesc {
            root_signature: None,
            ..desc.clone()
        });
        self.create_pipeline(cold, &root_signature, shaders.clone(), |rs_key| {
            self.backend.translate_graphics_pipeline(desc, &shaders, rs_key)
        })
    }

    fn create_meshlet_pipeline(&self, desc: &MeshletPipelineDesc) -> Result<ResourceHandle> {
        let root_signature = desc
            .root_signature
            .as_ref()
            .ok_or_else(|| eyre!("meshlet pipeline {} has no root signature", desc.name))?
            .handle()
            .clone();
        if desc.mesh_shader.is_none() {
            bail!("meshlet pipeline {} has no mesh shader", desc.name);
        }

        let shaders = PipelineShaders {
            amplification: self.shaders.load_stage(desc.amplification_shader.as_ref())?,
            mesh: self.shaders.load_stage(desc.mesh_shader.as_ref())?,
            pixel: self.shaders.load_stage(desc.pixel_shader.as_ref())?,
            ..Default::default()
        };

        let cold = PipelineDesc::Meshlet(MeshletPipelineDesc {
            root_signature: None,
            ..desc.clone()
        });
        self.create_pipeline(cold, &root_signature, shaders.clone(), |rs_key| {
            self.backend.translate_meshlet_pipeline(desc, &shaders, rs_key)
        })
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<ResourceHandle> {
        let root_signature = desc
            .root_signature
            .as_ref()
            .ok_or_else(|| eyre!("compute pipeline {} has no root signature", desc.name))?
            .handle()
            .clone();
        if desc.compute_shader.is_none() {
            bail!("compute pipeline {} has no compute shader", desc.name);
        }

        let shaders = PipelineShaders {
            compute: self.shaders.load_stage(desc.compute_shader.as_ref())?,
            ..Default::default()
        };

        let cold = PipelineDesc::Compute(ComputePipelineDesc {
            root_signature: None,
            ..desc.clone()
        });
        self.create_pipeline(cold, &root_signature, shaders.clone(), |rs_key| {
            self.backend.translate_compute_pipeline(desc, &shaders, rs_key)
        })
    }

    fn create_descriptor_set(&self, root_signature: &ResourceHandle, root_parameter: u32) -> Result<ResourceHandle> {
        self.expect_kind(root_signature, ResourceKind::RootSignature)?;
        let (layout, native) = self
            .root_signatures
            .with(root_signature.index(), |s| {
                (
                    s.hot.layouts.get(root_parameter as usize).cloned().flatten(),
                    s.hot.native.clone(),
                )
            })
            .ok_or_eyre("root signature is not live")?;
        let layout = layout.ok_or_else(|| {
            eyre!("root parameter {root_parameter} does not exist or holds root constants")
        })?;

        let storage = self.backend.create_descriptor_storage(&native, &layout)?;
        let hot = DescriptorSetHot {
            storage,
            descriptors: vec![None; layout.slots.len()],
            dirty: 0,
            gpu_address: 0,
            dynamic_offset: 0,
        };
        let cold = DescriptorSetCold {
            layout,
            _root_signature: root_signature.clone(),
        };
        let index = self.descriptor_sets.insert(cold, hot);
        Ok(self.new_handle(index, ResourceKind::DescriptorSet))
    }

    fn name(&self, handle: &ResourceHandle) -> Option<String> {
        let index = handle.index();
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(index, |s| s.cold.name.clone()),
            ResourceKind::DepthBuffer => self.depth_buffers.with(index, |s| s.cold.name.clone()),
            ResourceKind::GpuBuffer => self.gpu_buffers.with(index, |s| s.cold.desc.name.clone()),
            ResourceKind::RootSignature => self.root_signatures.with(index, |s| s.cold.name.clone()),
            ResourceKind::Pipeline => self.pipelines.with(index, |s| s.cold.name().to_string()),
            ResourceKind::DescriptorSet => self.unsupported("name", handle),
        }
    }

    fn resource_type(&self, handle: &ResourceHandle) -> Option<ResourceType> {
        let index = handle.index();
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(index, |s| s.cold.resource_type),
            ResourceKind::DepthBuffer => self.depth_buffers.with(index, |s| s.cold.resource_type),
            ResourceKind::GpuBuffer => self.gpu_buffers.with(index, |s| s.cold.desc.resource_type),
            _ => self.unsupported("resource_type", handle),
        }
    }

    fn width(&self, handle: &ResourceHandle) -> Option<u64> {
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(handle.index(), |s| s.cold.width),
            ResourceKind::DepthBuffer => self.depth_buffers.with(handle.index(), |s| s.cold.width),
            _ => self.unsupported("width", handle),
        }
    }

    fn height(&self, handle: &ResourceHandle) -> Option<u32> {
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(handle.index(), |s| s.cold.height),
            ResourceKind::DepthBuffer => self.depth_buffers.with(handle.index(), |s| s.cold.height),
            _ => self.unsupported("height", handle),
        }
    }

    fn array_size_or_depth(&self, handle: &ResourceHandle) -> Option<u32> {
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(handle.index(), |s| s.cold.array_size_or_depth),
            ResourceKind::DepthBuffer => self.depth_buffers.with(handle.index(), |s| s.cold.array_size_or_depth),
            _ => self.unsupported("array_size_or_depth", handle),
        }
    }

    fn num_mips(&self, handle: &ResourceHandle) -> Option<u32> {
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(handle.index(), |s| s.cold.num_mips),
            ResourceKind::DepthBuffer => self.depth_buffers.with(handle.index(), |s| s.cold.num_mips),
            _ => self.unsupported("num_mips", handle),
        }
    }

    fn num_samples(&self, handle: &ResourceHandle) -> Option<u32> {
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(handle.index(), |s| s.cold.num_samples),
            ResourceKind::DepthBuffer => self.depth_buffers.with(handle.index(), |s| s.cold.num_samples),
            _ => self.unsupported("num_samples", handle),
        }
    }

    fn format(&self, handle: &ResourceHandle) -> Option<Format> {
        let index = handle.index();
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(index, |s| s.cold.format),
            ResourceKind::DepthBuffer => self.depth_buffers.with(index, |s| s.cold.format),
            ResourceKind::GpuBuffer => self.gpu_buffers.with(index, |s| s.cold.desc.format),
            _ => self.unsupported("format", handle),
        }
    }

    fn plane_count(&self, handle: &ResourceHandle) -> Option<u8> {
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(handle.index(), |s| s.cold.plane_count),
            ResourceKind::DepthBuffer => self
                .depth_buffers
                .with(handle.index(), |s| if s.cold.format.is_stencil() { 2 } else { 1 }),
            _ => self.unsupported("plane_count", handle),
        }
    }

    fn clear_color(&self, handle: &ResourceHandle) -> Option<Vec4> {
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(handle.index(), |s| s.cold.clear_color),
            _ => self.unsupported("clear_color", handle),
        }
    }

    fn clear_depth(&self, handle: &ResourceHandle) -> Option<f32> {
        match handle.kind() {
            ResourceKind::DepthBuffer => self.depth_buffers.with(handle.index(), |s| s.cold.clear_depth),
            _ => self.unsupported("clear_depth", handle),
        }
    }

    fn clear_stencil(&self, handle: &ResourceHandle) -> Option<u8> {
        match handle.kind() {
            ResourceKind::DepthBuffer => self.depth_buffers.with(handle.index(), |s| s.cold.clear_stencil),
            _ => self.unsupported("clear_stencil", handle),
        }
    }

    fn usage_state(&self, handle: &ResourceHandle) -> Option<ResourceState> {
        let index = handle.index();
        match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with(index, |s| s.hot.usage_state),
            ResourceKind::DepthBuffer => self.depth_buffers.with(index, |s| s.hot.usage_state),
            ResourceKind::GpuBuffer => self.gpu_buffers.with(index, |s| s.hot.usage_state),
            _ => self.unsupported("usage_state", handle),
        }
    }

    fn set_usage_state(&self, handle: &ResourceHandle, state: ResourceState) {
        let index = handle.index();
        let updated = match handle.kind() {
            ResourceKind::ColorBuffer => self.color_buffers.with_mut(index, |s| s.hot.usage_state = state),
            ResourceKind::DepthBuffer => self.depth_buffers.with_mut(index, |s| s.hot.usage_state = state),
            ResourceKind::GpuBuffer => self.gpu_buffers.with_mut(index, |s| s.hot.usage_state = state),
            _ => self.unsupported("set_usage_state", handle),
        };
        if updated.is_none() {
            log::warn!("Usage state of {handle:?} was not updated");
        }
    }

    fn element_count(&self, handle: &ResourceHandle) -> Option<usize> {
        match handle.kind() {
            ResourceKind::GpuBuffer => self.gpu_buffers.with(handle.index(), |s| s.cold.desc.element_count),
            _ => self.unsupported("element_count", handle),
        }
    }

    fn element_size(&self, handle: &ResourceHandle) -> Option<usize> {
        match handle.kind() {
            ResourceKind::GpuBuffer => self.gpu_buffers.with(handle.index(), |s| s.cold.element_size as usize),
            _ => self.unsupported("element_size", handle),
        }
    }

    fn buffer_size(&self, handle: &ResourceHandle) -> Option<u64> {
        match handle.kind() {
            ResourceKind::GpuBuffer => self.gpu_buffers.with(handle.index(), |s| s.cold.size),
            _ => self.unsupported("buffer_size", handle),
        }
    }

    fn gpu_address(&self, handle: &ResourceHandle) -> Option<u64> {
        match handle.kind() {
            ResourceKind::GpuBuffer => self
                .gpu_buffers
                .with(handle.index(), |s| self.backend.gpu_buffer_address(&s.hot.native)),
            _ => self.unsupported("gpu_address", handle),
        }
    }

    fn update(&self, handle: &ResourceHandle, offset: u64, data: &[u8]) -> Result<()> {
        self.expect_kind(handle, ResourceKind::GpuBuffer)?;
        self.gpu_buffers
            .with(handle.index(), |s| {
                let desc = &s.cold.desc;
                if !desc
                    .memory_access
                    .intersects(MemoryAccess::CPU_WRITE | MemoryAccess::CPU_MAPPED)
                {
                    log::error!("Gpu buffer {} is not CPU writable", desc.name);
                    bail!("gpu buffer {} was created without CPU write access", desc.name);
                }
                let end = offset + data.len() as u64;
                if end > s.cold.size {
                    bail!("update of {} bytes at {offset} overruns gpu buffer {} ({} bytes)", data.len(), desc.name, s.cold.size);
                }
                self.backend.update_gpu_buffer(&s.hot.native, offset, data)
            })
            .ok_or_eyre("gpu buffer is not live")?
    }

    fn num_root_parameters(&self, handle: &ResourceHandle) -> Option<u32> {
        match handle.kind() {
            ResourceKind::RootSignature => self
                .root_signatures
                .with(handle.index(), |s| s.cold.root_parameters.len() as u32),
            _ => self.unsupported("num_root_parameters", handle),
        }
    }

    fn root_parameter(&self, handle: &ResourceHandle, index: u32) -> Option<RootParameter> {
        match handle.kind() {
            ResourceKind::RootSignature => self
                .root_signatures
                .with(handle.index(), |s| s.cold.root_parameters.get(index as usize).cloned())
                .flatten(),
            _ => self.unsupported("root_parameter", handle),
        }
    }

    fn content_hash(&self, handle: &ResourceHandle) -> Option<u64> {
        match handle.kind() {
            ResourceKind::RootSignature => self.root_signatures.with(handle.index(), |s| s.hot.content_hash),
            ResourceKind::Pipeline => self.pipelines.with(handle.index(), |s| s.hot.content_hash),
            _ => self.unsupported("content_hash", handle),
        }
    }

    fn set_srv(&self, set: &ResourceHandle, slot: u32, resource: &ResourceHandle) -> Result<()> {
        self.set_resource(set, slot, resource, DescriptorClass::ShaderResource, 0)
    }

    fn set_depth_srv(&self, set: &ResourceHandle, slot: u32, depth_buffer: &ResourceHandle, plane: DepthPlane) -> Result<()> {
        self.expect_kind(depth_buffer, ResourceKind::DepthBuffer)?;
        let descriptor = self
            .depth_buffers
            .with(depth_buffer.index(), |s| self.backend.depth_buffer_srv(&s.hot.native, plane))
            .ok_or_eyre("depth buffer is not live")?;
        let write = SlotWrite {
            class: DescriptorClass::ShaderResource,
            source: ViewSource::Texture,
            descriptor,
            gpu_address: None,
        };
        self.write_slot(set, slot, write)
    }

    fn set_uav(&self, set: &ResourceHandle, slot: u32, resource: &ResourceHandle, mip: u32) -> Result<()> {
        self.set_resource(set, slot, resource, DescriptorClass::UnorderedAccess, mip)
    }

    fn set_cbv(&self, set: &ResourceHandle, slot: u32, buffer: &ResourceHandle) -> Result<()> {
        self.expect_kind(buffer, ResourceKind::GpuBuffer)?;
        self.set_resource(set, slot, buffer, DescriptorClass::ConstantBuffer, 0)
    }

    fn set_sampler(&self, set: &ResourceHandle, slot: u32, sampler: &SamplerDesc) -> Result<()> {
        let write = SlotWrite {
            class: DescriptorClass::Sampler,
            source: ViewSource::Sampler,
            descriptor: self.backend.sampler(sampler)?,
            gpu_address: None,
        };
        self.write_slot(set, slot, write)
    }

    fn set_dynamic_offset(&self, set: &ResourceHandle, offset: u32) -> Result<()> {
        self.expect_kind(set, ResourceKind::DescriptorSet)?;
        self.descriptor_sets
            .with_mut(set.index(), |s| {
                if !s.cold.layout.is_root_buffer {
                    log::error!(
                        "Dynamic offset set on root parameter {}, which is not a root buffer",
                        s.cold.layout.root_parameter
                    );
                    bail!("dynamic offsets only apply to root buffer descriptor sets");
                }
                let limits = self.backend.limits();
                let alignment = match s.cold.layout.slots.first().map(|slot| slot.class()) {
                    Some(DescriptorClass::ConstantBuffer) => limits.constant_buffer_alignment,
                    _ => limits.storage_buffer_alignment,
                };
                if offset as u64 % alignment != 0 {
                    bail!("dynamic offset {offset} is not a multiple of the {alignment} byte buffer alignment");
                }
                s.hot.dynamic_offset = offset;
                Ok(())
            })
            .ok_or_eyre("descriptor set is not live")?
    }

    fn update_gpu_descriptors(&self, set: &ResourceHandle) -> Result<()> {
        self.expect_kind(set, ResourceKind::DescriptorSet)?;
        self.descriptor_sets
            .with_mut(set.index(), |s| {
                if s.hot.dirty == 0 || s.hot.descriptors.is_empty() {
                    return Ok(());
                }

                let mut writes = Vec::with_capacity(s.hot.dirty.count_ones() as usize);
                let mut bits = s.hot.dirty;
                while bits != 0 {
                    let slot = bits.trailing_zeros();
                    bits &= bits - 1;
                    if let Some(descriptor) = &s.hot.descriptors[slot as usize] {
                        writes.push(DescriptorWrite {
                            slot,
                            binding: &s.cold.layout.slots[slot as usize],
                            descriptor,
                        });
                    }
                }

                self.backend.write_descriptors(&s.hot.storage, &writes)?;
                s.hot.dirty = 0;
                Ok(())
            })
            .ok_or_eyre("descriptor set is not live")?
    }

    fn num_descriptors(&self, set: &ResourceHandle) -> Option<u32> {
        match set.kind() {
            ResourceKind::DescriptorSet => self.descriptor_sets.with(set.index(), |s| s.cold.layout.num_descriptors()),
            _ => self.unsupported("num_descriptors", set),
        }
    }

    fn is_root_buffer(&self, set: &ResourceHandle) -> Option<bool> {
        match set.kind() {
            ResourceKind::DescriptorSet => self.descriptor_sets.with(set.index(), |s| s.cold.layout.is_root_buffer),
            _ => self.unsupported("is_root_buffer", set),
        }
    }

    fn dirty_bits(&self, set: &ResourceHandle) -> Option<u32> {
        match set.kind() {
            ResourceKind::DescriptorSet => self.descriptor_sets.with(set.index(), |s| s.hot.dirty),
            _ => self.unsupported("dirty_bits", set),
        }
    }

    fn root_buffer_address(&self, set: &ResourceHandle) -> Option<u64> {
        match set.kind() {
            ResourceKind::DescriptorSet => self.descriptor_sets.with(set.index(), |s| s.hot.gpu_address),
            _ => self.unsupported("root_buffer_address", set),
        }
    }

    fn dynamic_offset(&self, set: &ResourceHandle) -> Option<u32> {
        match set.kind() {
            ResourceKind::DescriptorSet => self.descriptor_sets.with(set.index(), |s| s.hot.dynamic_offset),
            _ => self.unsupported("dynamic_offset", set),
        }
    }
}
