use crate::renderer::common::DepthPlane;
use crate::renderer::handle::ResourceHandle;
use crate::renderer::resources::depth_buffer::DepthBuffer;
use crate::renderer::resources::gpu_buffer::GpuBuffer;
use crate::renderer::resources::root_signature::RootSignature;
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::GpuResource;
use crate::renderer::GraphicsContext;
use color_eyre::Result;

/// One bound group of descriptors for a root parameter.
///
/// Setters only record the new view and mark its slot dirty; nothing reaches
/// GPU visible storage until [`DescriptorSet::update_gpu_descriptors`]. A set
/// must only be mutated from one thread at a time.
pub struct DescriptorSet {
    ctx: GraphicsContext,
    handle: ResourceHandle,
}

impl DescriptorSet {
    pub fn new(ctx: &GraphicsContext, root_signature: &RootSignature, root_parameter: u32) -> Result<Self> {
        let handle = ctx
            .manager()
            .create_descriptor_set(root_signature.handle(), root_parameter)?;
        Ok(Self { ctx: ctx.clone(), handle })
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn set_srv(&mut self, slot: u32, resource: &dyn GpuResource) -> Result<()> {
        self.ctx.manager().set_srv(&self.handle, slot, resource.handle())
    }

    pub fn set_depth_srv(&mut self, slot: u32, depth_buffer: &DepthBuffer, plane: DepthPlane) -> Result<()> {
        self.ctx
            .manager()
            .set_depth_srv(&self.handle, slot, depth_buffer.handle(), plane)
    }

    pub fn set_uav(&mut self, slot: u32, resource: &dyn GpuResource, mip: u32) -> Result<()> {
        self.ctx.manager().set_uav(&self.handle, slot, resource.handle(), mip)
    }

    pub fn set_cbv(&mut self, slot: u32, buffer: &GpuBuffer) -> Result<()> {
        self.ctx.manager().set_cbv(&self.handle, slot, buffer.handle())
    }

    pub fn set_sampler(&mut self, slot: u32, sampler: &SamplerDesc) -> Result<()> {
        self.ctx.manager().set_sampler(&self.handle, slot, sampler)
    }

    pub fn set_dynamic_offset(&mut self, offset: u32) -> Result<()> {
        self.ctx.manager().set_dynamic_offset(&self.handle, offset)
    }

    pub fn update_gpu_descriptors(&mut self) -> Result<()> {
        self.ctx.manager().update_gpu_descriptors(&self.handle)
    }

    pub fn num_descriptors(&self) -> u32 {
        self.ctx.manager().num_descriptors(&self.handle).unwrap_or(0)
    }

    pub fn is_root_buffer(&self) -> bool {
        self.ctx.manager().is_root_buffer(&self.handle).unwrap_or(false)
    }

    pub fn dirty_bits(&self) -> u32 {
        self.ctx.manager().dirty_bits(&self.handle).unwrap_or(0)
    }

    pub fn root_buffer_address(&self) -> u64 {
        self.ctx.manager().root_buffer_address(&self.handle).unwrap_or(0)
    }

    pub fn dynamic_offset(&self) -> u32 {
        self.ctx.manager().dynamic_offset(&self.handle).unwrap_or(0)
    }
}

impl std::fmt::Debug for DescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DescriptorSet").field(&self.handle).finish()
    }
}
