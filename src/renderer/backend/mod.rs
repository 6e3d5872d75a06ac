pub mod dx12;
pub mod null;
pub mod vulkan;

use crate::renderer::common::{DepthPlane, DepthStencilAspect, GraphicsApi};
use crate::renderer::resources::color_buffer::ColorBufferDesc;
use crate::renderer::resources::depth_buffer::DepthBufferDesc;
use crate::renderer::resources::gpu_buffer::GpuBufferDesc;
use crate::renderer::resources::pipeline_state::{ComputePipelineDesc, GraphicsPipelineDesc, MeshletPipelineDesc};
use crate::renderer::resources::root_signature::{DescriptorSetLayout, RootSignatureDesc, SlotBinding};
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::shader::PipelineShaders;
use color_eyre::Result;
use std::fmt::Debug;
use std::hash::Hash;

/// Device properties the backend-agnostic layer depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub constant_buffer_alignment: u64,
    pub storage_buffer_alignment: u64,
    pub max_push_constants_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            constant_buffer_alignment: crate::renderer::common::CONSTANT_BUFFER_ALIGNMENT,
            storage_buffer_alignment: 16,
            max_push_constants_size: 256,
        }
    }
}

/// One dirty slot to copy into GPU visible descriptor storage
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite<'a, D> {
    pub slot: u32,
    pub binding: &'a SlotBinding,
    pub descriptor: &'a D,
}

/// Native side of the resource manager. Everything here runs on the calling
/// thread; the manager owns slots, handles and caching.
pub trait Backend: Send + Sync + 'static {
    type ColorBuffer: Send + Sync;
    type DepthBuffer: Send + Sync;
    type GpuBuffer: Send + Sync;
    type RootSignature: Send + Sync;
    type Pipeline: Send + Sync;
    type DescriptorStorage: Send + Sync;
    /// CPU side view of a resource, compared to skip redundant writes
    type Descriptor: Clone + PartialEq + Debug + Send + Sync;
    /// Render target or depth stencil view, bound when recording passes
    type AttachmentView: Clone + PartialEq + Debug + Send + Sync;
    /// Fully translated native root signature, the identity for deduplication
    type RootSignatureKey: Clone + Hash + Eq + Debug + Send + Sync;
    /// Fully translated native pipeline, the identity for deduplication
    type PipelineKey: Clone + Hash + Eq + Debug + Send + Sync;

    fn api(&self) -> GraphicsApi;
    fn limits(&self) -> DeviceLimits;

    fn create_color_buffer(&self, desc: &ColorBufferDesc, initial_data: Option<&[u8]>) -> Result<Self::ColorBuffer>;
    fn create_depth_buffer(&self, desc: &DepthBufferDesc) -> Result<Self::DepthBuffer>;
    /// `size` already includes constant buffer alignment
    fn create_gpu_buffer(&self, desc: &GpuBufferDesc, element_size: u64, size: u64) -> Result<Self::GpuBuffer>;
    fn update_gpu_buffer(&self, buffer: &Self::GpuBuffer, offset: u64, data: &[u8]) -> Result<()>;
    fn gpu_buffer_address(&self, buffer: &Self::GpuBuffer) -> u64;

    fn color_buffer_srv(&self, buffer: &Self::ColorBuffer) -> Self::Descriptor;
    /// `None` for multisampled buffers and mips past the chain
    fn color_buffer_uav(&self, buffer: &Self::ColorBuffer, mip: u32) -> Option<Self::Descriptor>;
    fn depth_buffer_srv(&self, buffer: &Self::DepthBuffer, plane: DepthPlane) -> Self::Descriptor;
    /// `None` for formats that cannot be rendered to
    fn color_buffer_rtv(&self, buffer: &Self::ColorBuffer) -> Option<Self::AttachmentView>;
    /// Stencil variants of stencil-less formats alias the depth ones
    fn depth_buffer_dsv(&self, buffer: &Self::DepthBuffer, aspect: DepthStencilAspect) -> Self::AttachmentView;
    fn gpu_buffer_srv(&self, buffer: &Self::GpuBuffer) -> Option<Self::Descriptor>;
    fn gpu_buffer_uav(&self, buffer: &Self::GpuBuffer) -> Option<Self::Descriptor>;
    fn gpu_buffer_cbv(&self, buffer: &Self::GpuBuffer) -> Option<Self::Descriptor>;
    fn sampler(&self, desc: &SamplerDesc) -> Result<Self::Descriptor>;

    fn translate_root_signature(&self, desc: &RootSignatureDesc) -> Result<Self::RootSignatureKey>;
    fn create_root_signature(&self, key: &Self::RootSignatureKey) -> Result<Self::RootSignature>;

    fn translate_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &Self::RootSignatureKey,
    ) -> Result<Self::PipelineKey>;
    fn translate_meshlet_pipeline(
        &self,
        desc: &MeshletPipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &Self::RootSignatureKey,
    ) -> Result<Self::PipelineKey>;
    fn translate_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &Self::RootSignatureKey,
    ) -> Result<Self::PipelineKey>;
    fn create_pipeline(
        &self,
        key: &Self::PipelineKey,
        shaders: &PipelineShaders,
        root_signature: &Self::RootSignature,
    ) -> Result<Self::Pipeline>;

    fn create_descriptor_storage(
        &self,
        root_signature: &Self::RootSignature,
        layout: &DescriptorSetLayout,
    ) -> Result<Self::DescriptorStorage>;
    /// Copies the given descriptors into GPU visible storage, in order
    fn write_descriptors(
        &self,
        storage: &Self::DescriptorStorage,
        writes: &[DescriptorWrite<'_, Self::Descriptor>],
    ) -> Result<()>;
}
