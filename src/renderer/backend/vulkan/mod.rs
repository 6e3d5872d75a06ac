pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod formats;
pub mod image;
pub mod instance;
pub mod pipeline;
pub mod transfer;
pub mod translate;

use crate::renderer::backend::vulkan::buffer::VulkanBuffer;
use crate::renderer::backend::vulkan::descriptor::{VulkanDescriptor, VulkanDescriptorStorage};
use crate::renderer::backend::vulkan::device::Device;
use crate::renderer::backend::vulkan::image::{VulkanAttachment, VulkanImage, depth_attachment_layout};
use crate::renderer::backend::vulkan::pipeline::{VulkanPipeline, VulkanRootSignature};
use crate::renderer::backend::vulkan::translate::{PipelineKey, PipelineLayoutKey};
use crate::renderer::backend::{Backend, DescriptorWrite, DeviceLimits};
use crate::renderer::common::{DepthPlane, DepthStencilAspect, GraphicsApi, ResourceType};
use crate::renderer::config::RenderConfig;
use crate::renderer::resources::color_buffer::ColorBufferDesc;
use crate::renderer::resources::depth_buffer::DepthBufferDesc;
use crate::renderer::resources::gpu_buffer::GpuBufferDesc;
use crate::renderer::resources::pipeline_state::{ComputePipelineDesc, GraphicsPipelineDesc, MeshletPipelineDesc};
use crate::renderer::resources::root_signature::{DescriptorSetLayout, RootSignatureDesc};
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::shader::PipelineShaders;
use ash::vk;
use color_eyre::Result;
use std::sync::Arc;

pub struct VulkanBackend {
    device: Arc<Device>,
    limits: DeviceLimits,
}

impl VulkanBackend {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let device = Arc::new(Device::new(config)?);
        let limits = device.limits();
        log::debug!("Device limits: {limits:?}");
        Ok(Self { device, limits })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn whole_buffer(buffer: &VulkanBuffer) -> VulkanDescriptor {
        VulkanDescriptor::Buffer {
            buffer: buffer.buffer,
            offset: 0,
            range: buffer.size,
        }
    }
}

impl Backend for VulkanBackend {
    type ColorBuffer = VulkanImage;
    type DepthBuffer = VulkanImage;
    type GpuBuffer = VulkanBuffer;
    type RootSignature = VulkanRootSignature;
    type Pipeline = VulkanPipeline;
    type DescriptorStorage = VulkanDescriptorStorage;
    type Descriptor = VulkanDescriptor;
    type AttachmentView = VulkanAttachment;
    type RootSignatureKey = PipelineLayoutKey;
    type PipelineKey = PipelineKey;

    fn api(&self) -> GraphicsApi {
        GraphicsApi::Vulkan
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_color_buffer(&self, desc: &ColorBufferDesc, initial_data: Option<&[u8]>) -> Result<VulkanImage> {
        VulkanImage::color(self.device.clone(), desc, initial_data)
    }

    fn create_depth_buffer(&self, desc: &DepthBufferDesc) -> Result<VulkanImage> {
        VulkanImage::depth(self.device.clone(), desc)
    }

    fn create_gpu_buffer(&self, desc: &GpuBufferDesc, element_size: u64, size: u64) -> Result<VulkanBuffer> {
        VulkanBuffer::new(self.device.clone(), desc, element_size, size)
    }

    fn update_gpu_buffer(&self, buffer: &VulkanBuffer, offset: u64, data: &[u8]) -> Result<()> {
        buffer.write(offset, data)
    }

    fn gpu_buffer_address(&self, buffer: &VulkanBuffer) -> u64 {
        buffer.address
    }

    fn color_buffer_srv(&self, buffer: &VulkanImage) -> VulkanDescriptor {
        VulkanDescriptor::Image {
            view: buffer.view,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    fn color_buffer_uav(&self, buffer: &VulkanImage, mip: u32) -> Option<VulkanDescriptor> {
        buffer.mip_views.get(mip as usize).map(|view| VulkanDescriptor::Image {
            view: *view,
            layout: vk::ImageLayout::GENERAL,
        })
    }

    fn depth_buffer_srv(&self, buffer: &VulkanImage, plane: DepthPlane) -> VulkanDescriptor {
        let view = match (plane, buffer.stencil_view) {
            (DepthPlane::Depth, _) => buffer.view,
            (DepthPlane::Stencil, Some(view)) => view,
            (DepthPlane::Stencil, None) => {
                log::warn!("Stencil plane requested from {:?}, which has none", buffer.format);
                buffer.view
            }
        };
        VulkanDescriptor::Image {
            view,
            layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        }
    }

    fn color_buffer_rtv(&self, buffer: &VulkanImage) -> Option<VulkanAttachment> {
        buffer.attachment_view.map(|view| VulkanAttachment {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        })
    }

    fn depth_buffer_dsv(&self, buffer: &VulkanImage, aspect: DepthStencilAspect) -> VulkanAttachment {
        VulkanAttachment {
            view: buffer.attachment_view.unwrap_or(buffer.view),
            layout: depth_attachment_layout(aspect, buffer.has_stencil),
        }
    }

    fn gpu_buffer_srv(&self, buffer: &VulkanBuffer) -> Option<VulkanDescriptor> {
        Some(match buffer.texel_view {
            Some(view) => VulkanDescriptor::TexelBuffer(view),
            None => Self::whole_buffer(buffer),
        })
    }

    fn gpu_buffer_uav(&self, buffer: &VulkanBuffer) -> Option<VulkanDescriptor> {
        if !buffer.resource_type.intersects(ResourceType::UNORDERED_ACCESS_TYPE) {
            return None;
        }
        self.gpu_buffer_srv(buffer)
    }

    fn gpu_buffer_cbv(&self, buffer: &VulkanBuffer) -> Option<VulkanDescriptor> {
        // Dynamic uniform bindings address one element at a time
        buffer
            .resource_type
            .contains(ResourceType::CONSTANT_BUFFER)
            .then_some(VulkanDescriptor::Buffer {
                buffer: buffer.buffer,
                offset: 0,
                range: buffer.element_size,
            })
    }

    fn sampler(&self, desc: &SamplerDesc) -> Result<VulkanDescriptor> {
        Ok(VulkanDescriptor::Sampler(self.device.sampler(desc)?))
    }

    fn translate_root_signature(&self, desc: &RootSignatureDesc) -> Result<PipelineLayoutKey> {
        translate::translate_root_signature(desc, self.limits.max_push_constants_size)
    }

    fn create_root_signature(&self, key: &PipelineLayoutKey) -> Result<VulkanRootSignature> {
        VulkanRootSignature::new(self.device.clone(), key)
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
        shaders: &PipelineShaders,
        root_signature: &VulkanRootSignature,
    ) -> Result<VulkanPipeline> {
        log::debug!("Compiling pipeline {}", key.name);
        VulkanPipeline::new(self.device.clone(), key, shaders, root_signature)
    }

    fn create_descriptor_storage(
        &self,
        root_signature: &VulkanRootSignature,
        layout: &DescriptorSetLayout,
    ) -> Result<VulkanDescriptorStorage> {
        let (set_layout, key) = root_signature.set_layout(layout.root_parameter)?;
        VulkanDescriptorStorage::new(self.device.clone(), set_layout, key.clone())
    }

    fn write_descriptors(
        &self,
        storage: &VulkanDescriptorStorage,
        writes: &[DescriptorWrite<'_, VulkanDescriptor>],
    ) -> Result<()> {
        storage.write(writes)
    }
}
