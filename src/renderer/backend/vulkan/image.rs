use crate::renderer::backend::vulkan::buffer::VulkanBuffer;
use crate::renderer::backend::vulkan::device::Device;
use crate::renderer::backend::vulkan::formats::{format_to_vulkan, image_aspect};
use crate::renderer::backend::vulkan::translate::sample_count_to_vulkan;
use crate::renderer::common::{DepthStencilAspect, Format, MemoryAccess, ResourceType, TextureDimension};
use crate::renderer::resources::color_buffer::ColorBufferDesc;
use crate::renderer::resources::depth_buffer::DepthBufferDesc;
use crate::renderer::resources::gpu_buffer::GpuBufferDesc;
use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Native shape of an image, derived from an engine description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub image_type: vk::ImageType,
    pub view_type: vk::ImageViewType,
    pub flags: vk::ImageCreateFlags,
    pub extent: vk::Extent3D,
    pub layers: u32,
}

pub fn image_shape(resource_type: ResourceType, width: u64, height: u32, array_size_or_depth: u32) -> Result<ImageShape> {
    let Some(dimension) = resource_type.dimension() else {
        bail!("{resource_type:?} is not a texture type");
    };
    let width = u32::try_from(width)?;
    let count = array_size_or_depth.max(1);
    let array = resource_type.is_array();

    let shape = match dimension {
        TextureDimension::Texture1D => ImageShape {
            image_type: vk::ImageType::TYPE_1D,
            view_type: if array { vk::ImageViewType::TYPE_1D_ARRAY } else { vk::ImageViewType::TYPE_1D },
            flags: vk::ImageCreateFlags::empty(),
            extent: vk::Extent3D { width, height: 1, depth: 1 },
            layers: count,
        },
        TextureDimension::Texture2D if resource_type.intersects(ResourceType::TEXTURE_CUBE_TYPE) => {
            if count % 6 != 0 {
                bail!("cube textures need a multiple of six faces, got {count}");
            }
            ImageShape {
                image_type: vk::ImageType::TYPE_2D,
                view_type: if array { vk::ImageViewType::CUBE_ARRAY } else { vk::ImageViewType::CUBE },
                flags: vk::ImageCreateFlags::CUBE_COMPATIBLE,
                extent: vk::Extent3D { width, height, depth: 1 },
                layers: count,
            }
        }
        TextureDimension::Texture2D => ImageShape {
            image_type: vk::ImageType::TYPE_2D,
            view_type: if array { vk::ImageViewType::TYPE_2D_ARRAY } else { vk::ImageViewType::TYPE_2D },
            flags: vk::ImageCreateFlags::empty(),
            extent: vk::Extent3D { width, height, depth: 1 },
            layers: count,
        },
        TextureDimension::Texture3D => ImageShape {
            image_type: vk::ImageType::TYPE_3D,
            view_type: vk::ImageViewType::TYPE_3D,
            flags: vk::ImageCreateFlags::empty(),
            extent: vk::Extent3D { width, height, depth: count },
            layers: 1,
        },
    };
    Ok(shape)
}

/// View type usable as a framebuffer attachment; cubes and volumes render as 2D arrays
pub fn attachment_view_type(view_type: vk::ImageViewType) -> vk::ImageViewType {
    match view_type {
        vk::ImageViewType::CUBE | vk::ImageViewType::CUBE_ARRAY | vk::ImageViewType::TYPE_3D => {
            vk::ImageViewType::TYPE_2D_ARRAY
        }
        other => other,
    }
}

/// Layout a depth attachment is bound in for the given read-only planes
pub fn depth_attachment_layout(aspect: DepthStencilAspect, has_stencil: bool) -> vk::ImageLayout {
    match (aspect.resolve(has_stencil), has_stencil) {
        (DepthStencilAspect::ReadWrite, true) => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        (DepthStencilAspect::ReadWrite, false) => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        (DepthStencilAspect::DepthReadOnly, true) => vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
        (DepthStencilAspect::DepthReadOnly, false) => vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
        (DepthStencilAspect::StencilReadOnly, _) => vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
        (DepthStencilAspect::ReadOnly, _) => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    }
}

/// Image view plus the layout it is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
}

/// Colour or depth image with a view over every mip plus per-mip storage views
pub struct VulkanImage {
    pub image: vk::Image,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub num_mips: u32,
    pub view: vk::ImageView,
    /// Stencil plane of depth-stencil images
    pub stencil_view: Option<vk::ImageView>,
    /// One per mip when the image allows unordered access
    pub mip_views: Vec<vk::ImageView>,
    /// Mip 0 of every layer and plane, for colour or depth stencil attachments
    pub attachment_view: Option<vk::ImageView>,
    pub has_stencil: bool,

    allocation: Option<Allocation>,
    device: Arc<Device>,
}

struct ImageCreateInfo<'a> {
    name: &'a str,
    format: Format,
    shape: ImageShape,
    num_mips: u32,
    samples: u32,
    usage: vk::ImageUsageFlags,
}

impl VulkanImage {
    pub fn color(device: Arc<Device>, desc: &ColorBufferDesc, initial_data: Option<&[u8]>) -> Result<Self> {
        let mut shape = image_shape(desc.resource_type, desc.width, desc.height, desc.array_size_or_depth)?;
        let mut usage = vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;
        let renderable = !desc.format.is_block_compressed();
        if renderable {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
            if shape.image_type == vk::ImageType::TYPE_3D {
                shape.flags |= vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE;
            }
        }
        let storage = desc.format.supports_storage(desc.num_samples);
        if storage {
            usage |= vk::ImageUsageFlags::STORAGE;
        }

        let mut image = Self::new(
            device,
            &ImageCreateInfo {
                name: &desc.name,
                format: desc.format,
                shape,
                num_mips: desc.num_mips,
                samples: desc.num_samples,
                usage,
            },
        )?;
        if storage {
            for mip in 0..desc.num_mips {
                let view = image.create_view(shape.view_type, image.aspect, mip, 1, shape.layers)?;
                image.mip_views.push(view);
            }
        }
        if renderable {
            let layers = shape.layers.max(shape.extent.depth);
            let view = image.create_view(attachment_view_type(shape.view_type), image.aspect, 0, 1, layers)?;
            image.attachment_view = Some(view);
        }

        if let Some(data) = initial_data {
            image.upload(data, shape)?;
        }
        Ok(image)
    }

    pub fn depth(device: Arc<Device>, desc: &DepthBufferDesc) -> Result<Self> {
        if !desc.format.is_depth() {
            bail!("depth buffer {} uses non-depth format {:?}", desc.name, desc.format);
        }
        let shape = image_shape(desc.resource_type, desc.width, desc.height, desc.array_size_or_depth)?;
        let usage = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
            | vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;

        let mut image = Self::new(
            device,
            &ImageCreateInfo {
                name: &desc.name,
                format: desc.format,
                shape,
                num_mips: desc.num_mips.max(1),
                samples: desc.num_samples,
                usage,
            },
        )?;
        if desc.format.is_stencil() {
            let view = image.create_view(shape.view_type, vk::ImageAspectFlags::STENCIL, 0, image.num_mips, shape.layers)?;
            image.stencil_view = Some(view);
        }
        // Read-only variants share this view and differ in layout
        let view = image.create_view(attachment_view_type(shape.view_type), image.aspect, 0, 1, shape.layers)?;
        image.attachment_view = Some(view);
        Ok(image)
    }

    fn new(device: Arc<Device>, info: &ImageCreateInfo<'_>) -> Result<Self> {
        let format = format_to_vulkan(info.format);
        let aspect = image_aspect(info.format);
        let image_info = vk::ImageCreateInfo::default()
            .flags(info.shape.flags)
            .image_type(info.shape.image_type)
            .format(format)
            .extent(info.shape.extent)
            .mip_levels(info.num_mips)
            .array_layers(info.shape.layers)
            .samples(sample_count_to_vulkan(info.samples)?)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { device.logical.create_image(&image_info, None)? };

        let requirements = unsafe { device.logical.get_image_memory_requirements(image) };
        let allocation = device
            .allocate(&AllocationCreateDesc {
                name: info.name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            })
            .inspect_err(|_| unsafe { device.logical.destroy_image(image, None) })?;
        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };

        let mut this = Self {
            image,
            format,
            aspect,
            num_mips: info.num_mips,
            view: vk::ImageView::null(),
            stencil_view: None,
            mip_views: Vec::new(),
            attachment_view: None,
            has_stencil: info.format.is_stencil(),
            allocation: Some(allocation),
            device,
        };
        unsafe { this.device.logical.bind_image_memory(image, memory, offset)? };

        // Sampling a depth-stencil image reads only the depth plane
        let view_aspect = if info.format.is_depth() { vk::ImageAspectFlags::DEPTH } else { aspect };
        this.view = this.create_view(info.shape.view_type, view_aspect, 0, info.num_mips, info.shape.layers)?;
        Ok(this)
    }

    fn create_view(
        &self,
        view_type: vk::ImageViewType,
        aspect_mask: vk::ImageAspectFlags,
        base_mip_level: u32,
        level_count: u32,
        layer_count: u32,
    ) -> Result<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .view_type(view_type)
            .image(self.image)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level,
                level_count,
                base_array_layer: 0,
                layer_count,
            });
        Ok(unsafe { self.device.logical.create_image_view(&info, None)? })
    }

    /// Fills mip 0 of every layer from `data` and leaves the image shader readable
    fn upload(&self, data: &[u8], shape: ImageShape) -> Result<()> {
        let staging_desc = GpuBufferDesc {
            name: "Image staging".to_string(),
            resource_type: ResourceType::empty(),
            memory_access: MemoryAccess::CPU_WRITE,
            ..Default::default()
        };
        let staging = VulkanBuffer::new(self.device.clone(), &staging_desc, 1, data.len() as u64)?;
        staging.write(0, data)?;

        let full_range = vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.num_mips,
            base_array_layer: 0,
            layer_count: shape.layers,
        };

        self.device.immediate_submit(|cmd, device| {
            transition_image_layout(
                cmd,
                self.image,
                full_range,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                device,
            );

            let copy_region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: self.aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: shape.layers,
                })
                .image_extent(shape.extent);
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy_region],
                );
            }

            transition_image_layout(
                cmd,
                self.image,
                full_range,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                device,
            );
            Ok(())
        })
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        let logical = &self.device.logical;
        unsafe {
            for view in self.mip_views.drain(..) {
                logical.destroy_image_view(view, None);
            }
            if let Some(view) = self.stencil_view.take() {
                logical.destroy_image_view(view, None);
            }
            if let Some(view) = self.attachment_view.take() {
                logical.destroy_image_view(view, None);
            }
            if self.view != vk::ImageView::null() {
                logical.destroy_image_view(self.view, None);
            }
            logical.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free(allocation);
        }
    }
}

fn transition_image_layout(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    subresource_range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    device: &ash::Device,
) {
    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(subresource_range)
        .image(image);
    let barriers = [barrier];
    let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);

    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_follow_the_resource_type() {
        let shape = image_shape(ResourceType::TEXTURE_2D, 64, 32, 1).unwrap();
        assert_eq!(shape.view_type, vk::ImageViewType::TYPE_2D);
        assert_eq!((shape.extent.width, shape.extent.height, shape.layers), (64, 32, 1));

        let cube = image_shape(ResourceType::TEXTURE_CUBE_ARRAY, 16, 16, 12).unwrap();
        assert_eq!(cube.view_type, vk::ImageViewType::CUBE_ARRAY);
        assert!(cube.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
        assert!(image_shape(ResourceType::TEXTURE_CUBE, 16, 16, 4).is_err());

        let volume = image_shape(ResourceType::TEXTURE_3D, 8, 8, 4).unwrap();
        assert_eq!((volume.extent.depth, volume.layers), (4, 1));

        assert!(image_shape(ResourceType::CONSTANT_BUFFER, 8, 8, 1).is_err());
    }

    #[test]
    fn attachments_render_cubes_and_volumes_as_arrays() {
        assert_eq!(attachment_view_type(vk::ImageViewType::CUBE), vk::ImageViewType::TYPE_2D_ARRAY);
        assert_eq!(attachment_view_type(vk::ImageViewType::TYPE_3D), vk::ImageViewType::TYPE_2D_ARRAY);
        assert_eq!(attachment_view_type(vk::ImageViewType::TYPE_2D), vk::ImageViewType::TYPE_2D);
    }

    #[test]
    fn depth_layouts_follow_the_read_only_planes() {
        let layouts: Vec<_> = DepthStencilAspect::ALL
            .iter()
            .map(|aspect| depth_attachment_layout(*aspect, true))
            .collect();
        assert_eq!(
            layouts,
            vec![
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ]
        );
        assert_eq!(
            depth_attachment_layout(DepthStencilAspect::StencilReadOnly, false),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            depth_attachment_layout(DepthStencilAspect::ReadOnly, false),
            vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn storage_views_skip_srgb_and_compressed_formats() {
        assert!(Format::RGBA8_UNorm.supports_storage(1));
        assert!(!Format::SRGBA8_UNorm.supports_storage(1));
        assert!(!Format::BC7_UNorm.supports_storage(1));
        assert!(!Format::RGBA16_Float.supports_storage(4));
        assert!(!Format::D32.supports_storage(1));
    }
}
