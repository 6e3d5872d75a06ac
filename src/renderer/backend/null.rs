use crate::renderer::backend::vulkan::translate::{self, PipelineKey, PipelineLayoutKey};
use crate::renderer::backend::{Backend, DescriptorWrite, DeviceLimits};
use crate::renderer::common::{DepthPlane, DepthStencilAspect, GraphicsApi, ResourceType};
use crate::renderer::resources::color_buffer::ColorBufferDesc;
use crate::renderer::resources::depth_buffer::DepthBufferDesc;
use crate::renderer::resources::gpu_buffer::GpuBufferDesc;
use crate::renderer::resources::pipeline_state::{ComputePipelineDesc, GraphicsPipelineDesc, MeshletPipelineDesc};
use crate::renderer::resources::root_signature::{DescriptorSetLayout, RootSignatureDesc};
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::shader::PipelineShaders;
use color_eyre::eyre::bail;
use color_eyre::Result;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const ADDRESS_BASE: u64 = 0x1_0000_0000;

/// View recorded by the in-memory backend
#[derive(Debug, Clone, PartialEq)]
pub enum NullDescriptor {
    Texture { id: u64, mip: Option<u32> },
    Depth { id: u64, plane: DepthPlane },
    Buffer { id: u64, address: u64, size: u64 },
    Sampler(SamplerDesc),
}

/// Attachment view recorded by the in-memory backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullAttachment {
    RenderTarget { id: u64 },
    DepthStencil { id: u64, aspect: DepthStencilAspect },
}

#[derive(Debug)]
pub struct NullTexture {
    id: u64,
    num_mips: u32,
    multisampled: bool,
    renderable: bool,
    has_stencil: bool,
    pub initial_bytes: usize,
}

#[derive(Debug)]
pub struct NullBuffer {
    id: u64,
    address: u64,
    resource_type: ResourceType,
    contents: Mutex<Vec<u8>>,
}

impl NullBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[derive(Debug)]
pub struct NullRootSignature {
    pub key: PipelineLayoutKey,
}

#[derive(Debug)]
pub struct NullPipeline {
    pub key: PipelineKey,
}

#[derive(Debug)]
pub struct NullDescriptorStorage {
    id: u64,
    root_parameter: u32,
}

/// One descriptor copy as the backend saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub storage: u64,
    pub root_parameter: u32,
    pub slot: u32,
    pub descriptor: NullDescriptor,
}

/// Backend without a device. Translates everything the way the Vulkan backend
/// does, counts native creations and records descriptor copies.
pub struct NullBackend {
    limits: DeviceLimits,
    compile_delay: Duration,
    next_id: AtomicU64,
    next_address: AtomicU64,
    pipelines_compiled: AtomicUsize,
    root_signatures_created: AtomicUsize,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new(DeviceLimits::default())
    }
}

impl NullBackend {
    pub fn new(limits: DeviceLimits) -> Self {
        Self {
            limits,
            compile_delay: Duration::ZERO,
            next_id: AtomicU64::new(1),
            next_address: AtomicU64::new(ADDRESS_BASE),
            pipelines_compiled: AtomicUsize::new(0),
            root_signatures_created: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Makes every pipeline compile take `delay`, widening race windows
    pub fn with_compile_delay(mut self, delay: Duration) -> Self {
        self.compile_delay = delay;
        self
    }

    pub fn pipelines_compiled(&self) -> usize {
        self.pipelines_compiled.load(Ordering::SeqCst)
    }

    pub fn root_signatures_created(&self) -> usize {
        self.root_signatures_created.load(Ordering::SeqCst)
    }

    /// Descriptor copies since the last call, in the order they happened
    pub fn take_writes(&self) -> Vec<RecordedWrite> {
        std::mem::take(&mut *self.writes.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn buffer_view(&self, buffer: &NullBuffer) -> NullDescriptor {
        NullDescriptor::Buffer {
            id: buffer.id,
            address: buffer.address,
            size: buffer.contents.lock().unwrap_or_else(PoisonError::into_inner).len() as u64,
        }
    }
}

impl Backend for NullBackend {
    type ColorBuffer = NullTexture;
    type DepthBuffer = NullTexture;
    type GpuBuffer = NullBuffer;
    type RootSignature = NullRootSignature;
    type Pipeline = NullPipeline;
    type DescriptorStorage = NullDescriptorStorage;
    type Descriptor = NullDescriptor;
    type AttachmentView = NullAttachment;
    type RootSignatureKey = PipelineLayoutKey;
    type PipelineKey = PipelineKey;

    fn api(&self) -> GraphicsApi {
        GraphicsApi::Null
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_color_buffer(&self, desc: &ColorBufferDesc, initial_data: Option<&[u8]>) -> Result<NullTexture> {
        Ok(NullTexture {
            id: self.id(),
            num_mips: desc.num_mips,
            multisampled: desc.resource_type.is_multisampled(),
            renderable: !desc.format.is_block_compressed(),
            has_stencil: false,
            initial_bytes: initial_data.map_or(0, <[u8]>::len),
        })
    }

    fn create_depth_buffer(&self, desc: &DepthBufferDesc) -> Result<NullTexture> {
        Ok(NullTexture {
            id: self.id(),
            num_mips: desc.num_mips,
            multisampled: desc.num_samples > 1,
            renderable: true,
            has_stencil: desc.format.is_stencil(),
            initial_bytes: 0,
        })
    }

    fn create_gpu_buffer(&self, desc: &GpuBufferDesc, _element_size: u64, size: u64) -> Result<NullBuffer> {
        let mut contents = vec![0; size as usize];
        if let Some(data) = &desc.initial_data {
            contents[..data.len()].copy_from_slice(data);
        }
        let address = self
            .next_address
            .fetch_add(crate::renderer::common::align_up(size, 0x1_0000), Ordering::Relaxed);
        Ok(NullBuffer {
            id: self.id(),
            address,
            resource_type: desc.resource_type,
            contents: Mutex::new(contents),
        })
    }

    fn update_gpu_buffer(&self, buffer: &NullBuffer, offset: u64, data: &[u8]) -> Result<()> {
        let mut contents = buffer.contents.lock().unwrap_or_else(PoisonError::into_inner);
        let start = offset as usize;
        let Some(target) = contents.get_mut(start..start + data.len()) else {
            bail!("write of {} bytes at {offset} is out of bounds", data.len());
        };
        target.copy_from_slice(data);
        Ok(())
    }

    fn gpu_buffer_address(&self, buffer: &NullBuffer) -> u64 {
        buffer.address
    }

    fn color_buffer_srv(&self, buffer: &NullTexture) -> NullDescriptor {
        NullDescriptor::Texture { id: buffer.id, mip: None }
    }

    fn color_buffer_uav(&self, buffer: &NullTexture, mip: u32) -> Option<NullDescriptor> {
        (!buffer.multisampled && mip < buffer.num_mips).then_some(NullDescriptor::Texture {
            id: buffer.id,
            mip: Some(mip),
        })
    }

    fn depth_buffer_srv(&self, buffer: &NullTexture, plane: DepthPlane) -> NullDescriptor {
        let plane = if buffer.has_stencil { plane } else { DepthPlane::Depth };
        NullDescriptor::Depth { id: buffer.id, plane }
    }

    fn color_buffer_rtv(&self, buffer: &NullTexture) -> Option<NullAttachment> {
        buffer.renderable.then_some(NullAttachment::RenderTarget { id: buffer.id })
    }

    fn depth_buffer_dsv(&self, buffer: &NullTexture, aspect: DepthStencilAspect) -> NullAttachment {
        NullAttachment::DepthStencil {
            id: buffer.id,
            aspect: aspect.resolve(buffer.has_stencil),
        }
    }

    fn gpu_buffer_srv(&self, buffer: &NullBuffer) -> Option<NullDescriptor> {
        Some(self.buffer_view(buffer))
    }

    fn gpu_buffer_uav(&self, buffer: &NullBuffer) -> Option<NullDescriptor> {
        buffer
            .resource_type
            .intersects(ResourceType::UNORDERED_ACCESS_TYPE)
            .then(|| self.buffer_view(buffer))
    }

    fn gpu_buffer_cbv(&self, buffer: &NullBuffer) -> Option<NullDescriptor> {
        buffer
            .resource_type
            .contains(ResourceType::CONSTANT_BUFFER)
            .then(|| self.buffer_view(buffer))
    }

    fn sampler(&self, desc: &SamplerDesc) -> Result<NullDescriptor> {
        Ok(NullDescriptor::Sampler(*desc))
    }

    fn translate_root_signature(&self, desc: &RootSignatureDesc) -> Result<PipelineLayoutKey> {
        translate::translate_root_signature(desc, self.limits.max_push_constants_size)
    }

    fn create_root_signature(&self, key: &PipelineLayoutKey) -> Result<NullRootSignature> {
        self.root_signatures_created.fetch_add(1, Ordering::SeqCst);
        Ok(NullRootSignature { key: key.clone() })
    }

    fn translate_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &PipelineLayoutKey,
    ) -> Result<PipelineKey> {
        translate::translate_graphics_pipeline(desc, shaders, root_signature)
    }

    fn translate_meshlet_pipeline(
        &self,
        desc: &MeshletPipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &PipelineLayoutKey,
    ) -> Result<PipelineKey> {
        translate::translate_meshlet_pipeline(desc, shaders, root_signature)
    }

    fn translate_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &PipelineLayoutKey,
    ) -> Result<PipelineKey> {
        translate::translate_compute_pipeline(desc, shaders, root_signature)
    }

    fn create_pipeline(
        &self,
        key: &PipelineKey,
        _shaders: &PipelineShaders,
        _root_signature: &NullRootSignature,
    ) -> Result<NullPipeline> {
        if !self.compile_delay.is_zero() {
            std::thread::sleep(self.compile_delay);
        }
        self.pipelines_compiled.fetch_add(1, Ordering::SeqCst);
        Ok(NullPipeline { key: key.clone() })
    }

    fn create_descriptor_storage(
        &self,
        _root_signature: &NullRootSignature,
        layout: &DescriptorSetLayout,
    ) -> Result<NullDescriptorStorage> {
        Ok(NullDescriptorStorage {
            id: self.id(),
            root_parameter: layout.root_parameter,
        })
    }

    fn write_descriptors(
        &self,
        storage: &NullDescriptorStorage,
        writes: &[DescriptorWrite<'_, NullDescriptor>],
    ) -> Result<()> {
        let mut log = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        log.extend(writes.iter().map(|write| RecordedWrite {
            storage: storage.id,
            root_parameter: storage.root_parameter,
            slot: write.slot,
            descriptor: write.descriptor.clone(),
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::common::{
        DescriptorType, Format, MemoryAccess, ShaderStage, compute_num_mips,
    };
    use crate::renderer::config::RenderConfig;
    use crate::renderer::handle::ResourceKind;
    use crate::renderer::manager::BackendResourceManager;
    use crate::renderer::resources::texture::TextureManager;
    use crate::renderer::resources::{
        ColorBuffer, ComputePipelineState, DepthBuffer, DescriptorRange, GpuBuffer, GraphicsPipelineState,
        ResourceSet, RootParameter, RootSignature,
    };
    use crate::renderer::GraphicsContext;
    use std::sync::Arc;

    fn context(config: &RenderConfig, backend: NullBackend) -> GraphicsContext {
        GraphicsContext::from_manager(BackendResourceManager::new(backend, config), config)
    }

    fn null_context() -> GraphicsContext {
        context(&RenderConfig::null(), NullBackend::default())
    }

    fn manager(ctx: &GraphicsContext) -> &BackendResourceManager<NullBackend> {
        ctx.manager()
            .as_any()
            .downcast_ref::<BackendResourceManager<NullBackend>>()
            .unwrap()
    }

    fn cbv_and_texture_table(ctx: &GraphicsContext) -> RootSignature {
        let desc = RootSignatureDesc::new("cbv + table")
            .with_parameter(RootParameter::root_cbv(0, ShaderStage::VERTEX))
            .with_parameter(RootParameter::range(DescriptorType::TextureSRV, 0, 1, ShaderStage::PIXEL));
        RootSignature::new(ctx, &desc).unwrap()
    }

    fn texture(ctx: &GraphicsContext, name: &str) -> ColorBuffer {
        ColorBuffer::new(ctx, &ColorBufferDesc::texture_2d(name, 4, 4, Format::RGBA8_UNorm)).unwrap()
    }

    #[test]
    fn full_mip_chain_and_independent_buffers() {
        let ctx = null_context();
        let desc = ColorBufferDesc::texture_2d("albedo", 256, 256, Format::RGBA8_UNorm).with_num_mips(0);
        let a = ColorBuffer::new(&ctx, &desc).unwrap();
        assert_eq!(a.num_mips(), compute_num_mips(256, 256));
        assert_eq!(a.num_mips(), 9);

        let b = ColorBuffer::new(&ctx, &ColorBufferDesc { name: "albedo copy".into(), ..desc }).unwrap();
        assert_ne!(a.handle().index(), b.handle().index());
        assert_eq!(b.num_mips(), 9);
        assert_eq!(b.name(), "albedo copy");
        assert_eq!(ctx.manager().live_count(ResourceKind::ColorBuffer), 2);
    }

    #[test]
    fn root_buffer_and_table_sets() {
        let ctx = null_context();
        let root_signature = cbv_and_texture_table(&ctx);
        assert_eq!(root_signature.num_root_parameters(), 2);

        let table = root_signature.create_descriptor_set(1).unwrap();
        assert_eq!(table.num_descriptors(), 1);
        assert!(!table.is_root_buffer());

        let root_cbv = root_signature.create_descriptor_set(0).unwrap();
        assert!(root_cbv.is_root_buffer());
        assert_eq!(root_cbv.num_descriptors(), 0);

        assert!(root_signature.create_descriptor_set(2).is_err());
    }

    #[test]
    fn dirty_bits_flush_once_in_slot_order() {
        let ctx = null_context();
        let desc = RootSignatureDesc::new("table").with_parameter(RootParameter::table(
            vec![DescriptorRange::texture_srv(0, 3)],
            ShaderStage::PIXEL,
        ));
        let root_signature = RootSignature::new(&ctx, &desc).unwrap();
        let (a, b) = (texture(&ctx, "a"), texture(&ctx, "b"));

        let mut set = root_signature.create_descriptor_set(0).unwrap();
        set.set_srv(2, &a).unwrap();
        set.set_srv(0, &a).unwrap();
        set.set_srv(0, &b).unwrap();
        assert_eq!(set.dirty_bits(), 0b101);

        set.update_gpu_descriptors().unwrap();
        assert_eq!(set.dirty_bits(), 0);
        let writes = manager(&ctx).backend().take_writes();
        assert_eq!(writes.iter().map(|w| w.slot).collect::<Vec<_>>(), vec![0, 2]);
        // last value wins
        let b_id = manager(&ctx).with_color_buffer(b.handle(), |t| t.id).unwrap();
        assert_eq!(writes[0].descriptor, NullDescriptor::Texture { id: b_id, mip: None });

        set.update_gpu_descriptors().unwrap();
        assert!(manager(&ctx).backend().take_writes().is_empty());

        // rewriting an unchanged view stays clean
        set.set_srv(0, &b).unwrap();
        assert_eq!(set.dirty_bits(), 0);
    }

    #[test]
    fn mismatched_views_are_rejected() {
        let ctx = null_context();
        let root_signature = cbv_and_texture_table(&ctx);
        let mut set = root_signature.create_descriptor_set(1).unwrap();
        let cb = GpuBuffer::new(&ctx, &GpuBufferDesc::constant_buffer("cb", 1, 64)).unwrap();

        assert!(set.set_cbv(0, &cb).is_err());
        assert!(set.set_srv(1, &texture(&ctx, "t")).is_err());
        assert!(set.set_dynamic_offset(256).is_err());
        assert_eq!(set.dirty_bits(), 0);
    }

    #[test]
    fn constant_buffers_are_aligned() {
        let ctx = null_context();
        let alignment = ctx.manager().limits().constant_buffer_alignment;
        for element_size in [1, 100, 256, 257] {
            let buffer = GpuBuffer::new(&ctx, &GpuBufferDesc::constant_buffer("cb", 3, element_size)).unwrap();
            let aligned = buffer.element_size() as u64;
            assert!(aligned >= element_size as u64);
            assert_eq!(aligned % alignment, 0);
            assert_eq!(buffer.size(), 3 * aligned);
        }

        let structured = GpuBuffer::new(
            &ctx,
            &GpuBufferDesc::new("particles", ResourceType::STRUCTURED_BUFFER, 10, 12),
        )
        .unwrap();
        assert_eq!(structured.size(), 120);
    }

    #[test]
    fn updates_respect_cpu_access_and_bounds() {
        let ctx = null_context();
        let cb = GpuBuffer::new(&ctx, &GpuBufferDesc::constant_buffer("frame", 1, 16)).unwrap();
        cb.update_pod(4, &7u32).unwrap();
        assert!(cb.update(250, &[0; 8]).is_err());

        let native = manager(&ctx).with_gpu_buffer(cb.handle(), NullBuffer::contents).unwrap();
        assert_eq!(&native[4..8], &7u32.to_le_bytes());

        let gpu_only = GpuBuffer::new(
            &ctx,
            &GpuBufferDesc::new("static", ResourceType::STRUCTURED_BUFFER, 4, 4)
                .with_memory_access(MemoryAccess::GPU_READ),
        )
        .unwrap();
        assert!(gpu_only.update(0, &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn root_buffer_tracks_address_and_offset() {
        let ctx = null_context();
        let root_signature = cbv_and_texture_table(&ctx);
        let cb = GpuBuffer::new(&ctx, &GpuBufferDesc::constant_buffer("object", 4, 64)).unwrap();

        let mut resources = ResourceSet::new(&root_signature).unwrap();
        assert_eq!(resources.num_descriptor_sets(), 2);
        resources.set_cbv(0, 0, &cb).unwrap();
        resources.set_dynamic_offset(0, 512).unwrap();
        resources.set_srv(1, 0, &texture(&ctx, "diffuse")).unwrap();
        resources.update_gpu_descriptors().unwrap();

        let root = resources.descriptor_set(0).unwrap();
        assert_eq!(root.root_buffer_address(), cb.gpu_address());
        assert_eq!(root.dynamic_offset(), 512);

        let writes = manager(&ctx).backend().take_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!((writes[0].root_parameter, writes[1].root_parameter), (0, 1));
    }

    #[test]
    fn slots_are_reused_after_drop() {
        let ctx = null_context();
        let a = texture(&ctx, "a");
        let b = texture(&ctx, "b");
        drop(a);
        assert_eq!(ctx.manager().live_count(ResourceKind::ColorBuffer), 1);

        let c = texture(&ctx, "c");
        assert_ne!(c.handle().index(), b.handle().index());
        assert_eq!(ctx.manager().live_count(ResourceKind::ColorBuffer), 2);
    }

    #[test]
    fn depth_buffers_view_each_plane() {
        let ctx = null_context();
        let depth = DepthBuffer::new(&ctx, &DepthBufferDesc::texture_2d("depth", 64, 64, Format::D24S8)).unwrap();
        assert_eq!(ctx.manager().plane_count(depth.handle()), Some(2));

        let desc = RootSignatureDesc::new("shadow").with_parameter(RootParameter::table(
            vec![DescriptorRange::texture_srv(0, 2)],
            ShaderStage::PIXEL,
        ));
        let root_signature = RootSignature::new(&ctx, &desc).unwrap();
        let mut set = root_signature.create_descriptor_set(0).unwrap();
        set.set_depth_srv(0, &depth, DepthPlane::Depth).unwrap();
        set.set_depth_srv(1, &depth, DepthPlane::Stencil).unwrap();
        assert_eq!(set.dirty_bits(), 0b11);
        assert!(DepthBuffer::new(&ctx, &DepthBufferDesc::texture_2d("bad", 64, 64, Format::RGBA8_UNorm)).is_err());
    }

    #[test]
    fn stencil_less_depth_buffers_alias_the_depth_plane() {
        let ctx = null_context();
        let depth = DepthBuffer::new(&ctx, &DepthBufferDesc::texture_2d("depth", 64, 64, Format::D32)).unwrap();
        assert_eq!(ctx.manager().plane_count(depth.handle()), Some(1));

        let desc = RootSignatureDesc::new("shadow")
            .with_parameter(RootParameter::range(DescriptorType::TextureSRV, 0, 1, ShaderStage::PIXEL));
        let root_signature = RootSignature::new(&ctx, &desc).unwrap();
        let mut set = root_signature.create_descriptor_set(0).unwrap();
        set.set_depth_srv(0, &depth, DepthPlane::Stencil).unwrap();
        set.update_gpu_descriptors().unwrap();

        let writes = manager(&ctx).backend().take_writes();
        assert!(matches!(writes[0].descriptor, NullDescriptor::Depth { plane: DepthPlane::Depth, .. }));
    }

    #[test]
    fn depth_stencil_views_cover_every_aspect() {
        let ctx = null_context();
        let manager = manager(&ctx);
        let aspects_of = |depth: &DepthBuffer| -> Vec<DepthStencilAspect> {
            DepthStencilAspect::ALL
                .iter()
                .map(|aspect| match manager.depth_stencil_view(depth.handle(), *aspect) {
                    Some(NullAttachment::DepthStencil { aspect, .. }) => aspect,
                    other => panic!("unexpected view {other:?}"),
                })
                .collect()
        };

        let stencil = DepthBuffer::new(&ctx, &DepthBufferDesc::texture_2d("ds", 64, 64, Format::D24S8)).unwrap();
        assert_eq!(aspects_of(&stencil), DepthStencilAspect::ALL);

        let depth_only = DepthBuffer::new(&ctx, &DepthBufferDesc::texture_2d("d", 64, 64, Format::D32)).unwrap();
        assert_eq!(
            aspects_of(&depth_only),
            vec![
                DepthStencilAspect::ReadWrite,
                DepthStencilAspect::DepthReadOnly,
                DepthStencilAspect::ReadWrite,
                DepthStencilAspect::DepthReadOnly,
            ]
        );
        assert!(manager.depth_stencil_view(texture(&ctx, "colour").handle(), DepthStencilAspect::ReadWrite).is_none());
    }

    #[test]
    fn colour_buffers_have_one_render_target_view() {
        let ctx = null_context();
        let manager = manager(&ctx);
        let target = texture(&ctx, "target");
        let id = manager.with_color_buffer(target.handle(), |t| t.id).unwrap();
        assert_eq!(manager.render_target_view(target.handle()), Some(NullAttachment::RenderTarget { id }));

        let compressed = ColorBuffer::new(&ctx, &ColorBufferDesc::texture_2d("bc", 16, 16, Format::BC7_UNorm)).unwrap();
        assert_eq!(manager.render_target_view(compressed.handle()), None);
    }

    #[test]
    fn storage_views_stop_at_the_mip_chain_and_multisampling() {
        let ctx = null_context();
        let desc = RootSignatureDesc::new("storage")
            .with_parameter(RootParameter::range(DescriptorType::TextureUAV, 0, 1, ShaderStage::COMPUTE));
        let root_signature = RootSignature::new(&ctx, &desc).unwrap();
        let mut set = root_signature.create_descriptor_set(0).unwrap();

        let mips = ColorBuffer::new(
            &ctx,
            &ColorBufferDesc::texture_2d("mips", 8, 8, Format::RGBA8_UNorm).with_num_mips(0),
        )
        .unwrap();
        assert_eq!(mips.num_mips(), 4);
        set.set_uav(0, &mips, 3).unwrap();
        assert!(set.set_uav(0, &mips, 4).is_err());

        let msaa = ColorBuffer::new(
            &ctx,
            &ColorBufferDesc::texture_2d("msaa", 8, 8, Format::RGBA8_UNorm)
                .with_num_mips(0)
                .with_samples(4),
        )
        .unwrap();
        assert_eq!(msaa.num_mips(), 1);
        assert!(set.set_uav(0, &msaa, 0).is_err());
        assert_eq!(set.dirty_bits(), 0b1);
    }

    #[test]
    fn root_buffers_only_take_buffer_addresses() {
        let ctx = null_context();
        let desc = RootSignatureDesc::new("root views")
            .with_parameter(RootParameter::root_srv(0, ShaderStage::VERTEX))
            .with_parameter(RootParameter::root_uav(0, ShaderStage::COMPUTE));
        let root_signature = RootSignature::new(&ctx, &desc).unwrap();
        let mut srv = root_signature.create_descriptor_set(0).unwrap();

        assert!(srv.set_srv(0, &texture(&ctx, "t")).is_err());
        assert_eq!((srv.dirty_bits(), srv.root_buffer_address()), (0, 0));

        let particles = GpuBuffer::new(
            &ctx,
            &GpuBufferDesc::new("particles", ResourceType::STRUCTURED_BUFFER, 16, 32),
        )
        .unwrap();
        srv.set_srv(0, &particles).unwrap();
        assert_eq!(srv.root_buffer_address(), particles.gpu_address());

        let mut uav = root_signature.create_descriptor_set(1).unwrap();
        assert!(uav.set_uav(0, &texture(&ctx, "t"), 0).is_err());
        uav.set_uav(0, &particles, 0).unwrap();
        assert_eq!(uav.dirty_bits(), 0b1);
    }

    #[test]
    fn slots_only_take_matching_view_types() {
        let ctx = null_context();
        let desc = RootSignatureDesc::new("typed").with_parameter(RootParameter::table(
            vec![
                DescriptorRange::structured_buffer_srv(0, 1),
                DescriptorRange::new(DescriptorType::TypedBufferSRV, 1, 1),
                DescriptorRange::texture_srv(2, 1),
            ],
            ShaderStage::PIXEL,
        ));
        let root_signature = RootSignature::new(&ctx, &desc).unwrap();
        let mut set = root_signature.create_descriptor_set(0).unwrap();

        let structured = GpuBuffer::new(
            &ctx,
            &GpuBufferDesc::new("structured", ResourceType::STRUCTURED_BUFFER, 4, 16),
        )
        .unwrap();
        let typed = GpuBuffer::new(
            &ctx,
            &GpuBufferDesc::new("typed", ResourceType::TYPED_BUFFER, 4, 4).with_format(Format::R32_Float),
        )
        .unwrap();
        let image = texture(&ctx, "image");

        assert!(set.set_srv(0, &image).is_err());
        assert!(set.set_srv(0, &typed).is_err());
        assert!(set.set_srv(1, &structured).is_err());
        assert!(set.set_srv(2, &structured).is_err());
        assert_eq!(set.dirty_bits(), 0);

        set.set_srv(0, &structured).unwrap();
        set.set_srv(1, &typed).unwrap();
        set.set_srv(2, &image).unwrap();
        assert_eq!(set.dirty_bits(), 0b111);
    }

    #[test]
    fn dynamic_offsets_follow_the_buffer_alignment() {
        let ctx = null_context();
        let root_signature = cbv_and_texture_table(&ctx);
        let mut set = root_signature.create_descriptor_set(0).unwrap();
        let alignment = ctx.manager().limits().constant_buffer_alignment as u32;

        assert!(set.set_dynamic_offset(alignment / 2).is_err());
        assert!(set.set_dynamic_offset(alignment + 4).is_err());
        set.set_dynamic_offset(3 * alignment).unwrap();
        assert_eq!(set.dynamic_offset(), 3 * alignment);
    }

    #[test]
    fn equal_root_signatures_share_native_objects() {
        let ctx = null_context();
        let a = cbv_and_texture_table(&ctx);
        let b = cbv_and_texture_table(&ctx);
        assert_ne!(a, b);
        assert_eq!(
            ctx.manager().content_hash(a.handle()),
            ctx.manager().content_hash(b.handle())
        );
        assert_eq!(manager(&ctx).backend().root_signatures_created(), 1);
    }

    #[test]
    fn invalid_root_signatures_create_nothing() {
        let ctx = null_context();
        let mixed = RootSignatureDesc::new("mixed").with_parameter(RootParameter::table(
            vec![DescriptorRange::texture_srv(0, 1), DescriptorRange::sampler(0, 1)],
            ShaderStage::PIXEL,
        ));
        assert!(RootSignature::new(&ctx, &mixed).is_err());

        let mut too_many = RootSignatureDesc::new("too many");
        for register in 0..9 {
            too_many = too_many.with_parameter(RootParameter::root_cbv(register, ShaderStage::ALL));
        }
        assert!(RootSignature::new(&ctx, &too_many).is_err());
        assert_eq!(ctx.manager().live_count(ResourceKind::RootSignature), 0);
        assert_eq!(manager(&ctx).backend().root_signatures_created(), 0);
    }

    #[test]
    fn concurrent_pipeline_creation_compiles_once() {
        let shader_dir = tempfile::tempdir().unwrap();
        std::fs::write(shader_dir.path().join("basic_vs.spirv"), [0u8; 16]).unwrap();
        std::fs::write(shader_dir.path().join("basic_ps.spirv"), [1u8; 16]).unwrap();
        let config = RenderConfig {
            shader_paths: vec![shader_dir.path().to_path_buf()],
            ..RenderConfig::null()
        };
        let ctx = context(&config, NullBackend::default().with_compile_delay(Duration::from_millis(20)));

        let root_signature = cbv_and_texture_table(&ctx);
        let desc = GraphicsPipelineDesc::new("basic")
            .with_root_signature(&root_signature)
            .with_vertex_shader("basic_vs")
            .with_pixel_shader("basic_ps")
            .with_render_targets(&[Format::RGBA8_UNorm], Format::D32);

        let pipelines: Vec<GraphicsPipelineState> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| GraphicsPipelineState::new(&ctx, &desc).unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let manager = manager(&ctx);
        assert_eq!(manager.backend().pipelines_compiled(), 1);
        assert_eq!(manager.num_cached_pipelines(), 1);
        let hash = pipelines[0].content_hash();
        assert!(pipelines.iter().all(|p| p.content_hash() == hash));
        assert_eq!(pipelines[3].name(), "basic");

        // a different blend state is a different native pipeline
        let mut blended = desc.clone();
        blended.blend_state.render_target_blend[0].blend_enable = true;
        let other = GraphicsPipelineState::new(&ctx, &blended).unwrap();
        assert_ne!(other.content_hash(), hash);
        assert_eq!(manager.backend().pipelines_compiled(), 2);
    }

    #[test]
    fn compute_pipelines_share_the_pipeline_cache() {
        let shader_dir = tempfile::tempdir().unwrap();
        std::fs::write(shader_dir.path().join("cull_cs.spirv"), [2u8; 16]).unwrap();
        std::fs::write(shader_dir.path().join("basic_vs.spirv"), [0u8; 16]).unwrap();
        let config = RenderConfig {
            shader_paths: vec![shader_dir.path().to_path_buf()],
            ..RenderConfig::null()
        };
        let ctx = context(&config, NullBackend::default().with_compile_delay(Duration::from_millis(20)));

        let root_signature = cbv_and_texture_table(&ctx);
        let desc = ComputePipelineDesc::new("cull")
            .with_root_signature(&root_signature)
            .with_compute_shader("cull_cs");

        let pipelines: Vec<ComputePipelineState> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| ComputePipelineState::new(&ctx, &desc).unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let manager = manager(&ctx);
        assert_eq!(manager.backend().pipelines_compiled(), 1);
        assert!(pipelines.iter().all(|p| p.content_hash() == pipelines[0].content_hash()));
        assert_eq!(pipelines[1].name(), "cull");
        assert_eq!(ctx.manager().live_count(ResourceKind::Pipeline), 4);

        let key = manager.with_pipeline(pipelines[0].handle(), |p| p.key.clone()).unwrap();
        assert!(key.compute);
        assert_eq!(key.stages.len(), 1);
        assert_eq!(key.stages[0].stage, ash::vk::ShaderStageFlags::COMPUTE);

        let no_shader = ComputePipelineDesc::new("no shader").with_root_signature(&root_signature);
        assert!(ComputePipelineState::new(&ctx, &no_shader).is_err());
        let no_root_signature = ComputePipelineDesc::new("no rs").with_compute_shader("cull_cs");
        assert!(ComputePipelineState::new(&ctx, &no_root_signature).is_err());
        assert_eq!(manager.backend().pipelines_compiled(), 1);

        // graphics and compute descs over the same shader bytes stay distinct
        let graphics = GraphicsPipelineDesc::new("cull")
            .with_root_signature(&root_signature)
            .with_vertex_shader("basic_vs");
        let graphics = GraphicsPipelineState::new(&ctx, &graphics).unwrap();
        assert_ne!(graphics.content_hash(), pipelines[0].content_hash());
        assert_eq!(manager.num_cached_pipelines(), 2);
    }

    #[test]
    fn pipelines_need_their_shaders() {
        let ctx = null_context();
        let root_signature = cbv_and_texture_table(&ctx);
        let desc = GraphicsPipelineDesc::new("broken")
            .with_root_signature(&root_signature)
            .with_vertex_shader("does_not_exist");
        assert!(GraphicsPipelineState::new(&ctx, &desc).is_err());
        assert!(GraphicsPipelineState::new(&ctx, &GraphicsPipelineDesc::new("no rs")).is_err());
        assert_eq!(manager(&ctx).backend().pipelines_compiled(), 0);
    }

    #[test]
    fn textures_load_once_per_key() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbaImage::from_pixel(8, 4, image::Rgba([255, 0, 0, 255]))
            .save(dir.path().join("red.png"))
            .unwrap();
        let config = RenderConfig {
            texture_dir: dir.path().to_path_buf(),
            ..RenderConfig::null()
        };
        let ctx = context(&config, NullBackend::default());
        let textures = TextureManager::new(&ctx);

        let (a, b) = std::thread::scope(|scope| {
            let first = scope.spawn(|| textures.load("red.png", false).unwrap());
            let second = scope.spawn(|| textures.load("red.png", false).unwrap());
            (first.join().unwrap(), second.join().unwrap())
        });
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!((a.width(), a.height(), a.format()), (8, 4, Format::RGBA8_UNorm));
        let uploaded = manager(&ctx).with_color_buffer(a.color_buffer.handle(), |t| t.initial_bytes);
        assert_eq!(uploaded, Some(8 * 4 * 4));

        let srgb = textures.load("red.png", true).unwrap();
        assert_eq!(srgb.format(), Format::SRGBA8_UNorm);
        assert_eq!(textures.num_textures(), 2);
        assert_eq!(ctx.manager().live_count(ResourceKind::ColorBuffer), 2);

        assert!(textures.load("missing.png", false).is_err());
        assert_eq!(textures.num_textures(), 2);

        drop((a, b));
        assert_eq!(textures.purge_unused(), 1);
        assert_eq!(ctx.manager().live_count(ResourceKind::ColorBuffer), 1);
    }
}
