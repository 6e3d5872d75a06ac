pub mod color_buffer;
pub mod common_states;
pub mod depth_buffer;
pub mod descriptor_set;
pub mod gpu_buffer;
pub mod meshlet_model;
pub mod pipeline_state;
pub mod resource_set;
pub mod root_signature;
pub mod sampler;
pub mod shader;
pub mod texture;

use crate::renderer::handle::ResourceHandle;

pub use color_buffer::{ColorBuffer, ColorBufferDesc};
pub use depth_buffer::{DepthBuffer, DepthBufferDesc};
pub use descriptor_set::DescriptorSet;
pub use gpu_buffer::{GpuBuffer, GpuBufferDesc};
pub use pipeline_state::{
    ComputePipelineDesc, ComputePipelineState, GraphicsPipelineDesc, GraphicsPipelineState, MeshletPipelineDesc,
};
pub use resource_set::ResourceSet;
pub use root_signature::{DescriptorRange, RootParameter, RootSignature, RootSignatureDesc};
pub use sampler::{SamplerDesc, StaticSamplerDesc};

/// Anything a descriptor slot can view
pub trait GpuResource {
    fn handle(&self) -> &ResourceHandle;
}

impl GpuResource for ColorBuffer {
    fn handle(&self) -> &ResourceHandle {
        ColorBuffer::handle(self)
    }
}

impl GpuResource for DepthBuffer {
    fn handle(&self) -> &ResourceHandle {
        DepthBuffer::handle(self)
    }
}

impl GpuResource for GpuBuffer {
    fn handle(&self) -> &ResourceHandle {
        GpuBuffer::handle(self)
    }
}
