use crate::renderer::backend::vulkan::device::Device;
use crate::renderer::backend::vulkan::translate::SetLayoutKey;
use crate::renderer::backend::DescriptorWrite;
use ash::vk;
use color_eyre::eyre::{bail, OptionExt};
use color_eyre::Result;
use gpu_descriptor::{DescriptorSet, DescriptorTotalCount};
use smallvec::SmallVec;
use std::sync::Arc;

/// CPU side view of a resource, written into descriptor sets at flush time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VulkanDescriptor {
    Image { view: vk::ImageView, layout: vk::ImageLayout },
    Buffer { buffer: vk::Buffer, offset: u64, range: u64 },
    TexelBuffer(vk::BufferView),
    Sampler(vk::Sampler),
}

impl VulkanDescriptor {
    /// Whether this view can be written to a binding of `descriptor_type`
    pub fn fits(&self, descriptor_type: vk::DescriptorType) -> bool {
        match self {
            Self::Image { .. } => matches!(
                descriptor_type,
                vk::DescriptorType::SAMPLED_IMAGE | vk::DescriptorType::STORAGE_IMAGE
            ),
            Self::Buffer { .. } => matches!(
                descriptor_type,
                vk::DescriptorType::UNIFORM_BUFFER
                    | vk::DescriptorType::STORAGE_BUFFER
                    | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
                    | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
            ),
            Self::TexelBuffer(_) => matches!(
                descriptor_type,
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER | vk::DescriptorType::STORAGE_TEXEL_BUFFER
            ),
            Self::Sampler(_) => descriptor_type == vk::DescriptorType::SAMPLER,
        }
    }
}

/// Pool sizes needed by one set of `layout`
pub fn descriptor_counts(layout: &SetLayoutKey) -> DescriptorTotalCount {
    let mut counts = DescriptorTotalCount::default();
    for binding in &layout.bindings {
        let count = match binding.descriptor_type {
            vk::DescriptorType::SAMPLER => &mut counts.sampler,
            vk::DescriptorType::SAMPLED_IMAGE => &mut counts.sampled_image,
            vk::DescriptorType::STORAGE_IMAGE => &mut counts.storage_image,
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER => &mut counts.uniform_texel_buffer,
            vk::DescriptorType::STORAGE_TEXEL_BUFFER => &mut counts.storage_texel_buffer,
            vk::DescriptorType::UNIFORM_BUFFER => &mut counts.uniform_buffer,
            vk::DescriptorType::STORAGE_BUFFER => &mut counts.storage_buffer,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => &mut counts.uniform_buffer_dynamic,
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => &mut counts.storage_buffer_dynamic,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => &mut counts.acceleration_structure,
            _ => &mut counts.sampled_image,
        };
        *count += binding.count;
    }
    counts
}

/// Creates the native set layout, resolving immutable samplers through the device cache
pub fn create_set_layout(device: &Device, key: &SetLayoutKey) -> Result<vk::DescriptorSetLayout> {
    let immutable_samplers = key
        .bindings
        .iter()
        .map(|binding| binding.immutable_sampler.as_ref().map(|desc| device.sampler(desc)).transpose())
        .collect::<Result<Vec<Option<vk::Sampler>>>>()?;

    let bindings: Vec<vk::DescriptorSetLayoutBinding<'_>> = key
        .bindings
        .iter()
        .zip(&immutable_samplers)
        .map(|(binding, sampler)| {
            let layout_binding = vk::DescriptorSetLayoutBinding::default()
                .binding(binding.binding)
                .descriptor_type(binding.descriptor_type)
                .descriptor_count(binding.count)
                .stage_flags(binding.stages);
            match sampler {
                Some(sampler) => layout_binding.immutable_samplers(std::slice::from_ref(sampler)),
                None => layout_binding,
            }
        })
        .collect();
    let binding_flags = vec![vk::DescriptorBindingFlags::PARTIALLY_BOUND; bindings.len()];

    let mut binding_flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
    let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
        .bindings(&bindings)
        .push_next(&mut binding_flags_info);

    Ok(unsafe { device.logical.create_descriptor_set_layout(&layout_info, None)? })
}

/// One allocated descriptor set, returned to the allocator on drop
pub struct VulkanDescriptorStorage {
    set: Option<DescriptorSet<vk::DescriptorSet>>,
    layout: SetLayoutKey,
    device: Arc<Device>,
}

impl VulkanDescriptorStorage {
    pub fn new(device: Arc<Device>, set_layout: vk::DescriptorSetLayout, layout: SetLayoutKey) -> Result<Self> {
        let set = device.allocate_descriptor_set(set_layout, &descriptor_counts(&layout))?;
        Ok(Self {
            set: Some(set),
            layout,
            device,
        })
    }

    pub fn raw(&self) -> Option<vk::DescriptorSet> {
        self.set.as_ref().map(|set| *set.raw())
    }

    pub fn write(&self, writes: &[DescriptorWrite<'_, VulkanDescriptor>]) -> Result<()> {
        let set = self.raw().ok_or_eyre("descriptor set was already freed")?;

        let mut resolved: SmallVec<[(vk::DescriptorType, &DescriptorWrite<'_, VulkanDescriptor>); 8]> =
            SmallVec::with_capacity(writes.len());
        for write in writes {
            let Some(binding) = self.layout.bindings.iter().find(|b| b.binding == write.binding.binding) else {
                bail!("slot {} targets binding {}, which the set does not have", write.slot, write.binding.binding);
            };
            if !write.descriptor.fits(binding.descriptor_type) {
                log::error!(
                    "Slot {} holds {:?}, binding {} expects {:?}",
                    write.slot,
                    write.descriptor,
                    binding.binding,
                    binding.descriptor_type
                );
                bail!("descriptor does not fit binding {}", binding.binding);
            }
            resolved.push((binding.descriptor_type, write));
        }

        let image_infos: SmallVec<[vk::DescriptorImageInfo; 8]> = resolved
            .iter()
            .map(|(_, write)| match *write.descriptor {
                VulkanDescriptor::Image { view, layout } => vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .image_layout(layout),
                VulkanDescriptor::Sampler(sampler) => vk::DescriptorImageInfo::default().sampler(sampler),
                _ => vk::DescriptorImageInfo::default(),
            })
            .collect();
        let buffer_infos: SmallVec<[vk::DescriptorBufferInfo; 8]> = resolved
            .iter()
            .map(|(_, write)| match *write.descriptor {
                VulkanDescriptor::Buffer { buffer, offset, range } => vk::DescriptorBufferInfo::default()
                    .buffer(buffer)
                    .offset(offset)
                    .range(range),
                _ => vk::DescriptorBufferInfo::default(),
            })
            .collect();
        let texel_views: SmallVec<[vk::BufferView; 8]> = resolved
            .iter()
            .map(|(_, write)| match *write.descriptor {
                VulkanDescriptor::TexelBuffer(view) => view,
                _ => vk::BufferView::null(),
            })
            .collect();

        let vk_writes: SmallVec<[vk::WriteDescriptorSet<'_>; 8]> = resolved
            .iter()
            .enumerate()
            .map(|(i, (descriptor_type, write))| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding.binding)
                    .dst_array_element(write.binding.array_element)
                    .descriptor_type(*descriptor_type);
                match write.descriptor {
                    VulkanDescriptor::Image { .. } | VulkanDescriptor::Sampler(_) => {
                        vk_write.image_info(std::slice::from_ref(&image_infos[i]))
                    }
                    VulkanDescriptor::Buffer { .. } => vk_write.buffer_info(std::slice::from_ref(&buffer_infos[i])),
                    VulkanDescriptor::TexelBuffer(_) => {
                        vk_write.texel_buffer_view(std::slice::from_ref(&texel_views[i]))
                    }
                }
            })
            .collect();

        unsafe { self.device.logical.update_descriptor_sets(&vk_writes, &[]) };
        Ok(())
    }
}

impl Drop for VulkanDescriptorStorage {
    fn drop(&mut self) {
        if let Some(set) = self.set.take() {
            self.device.free_descriptor_set(set);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::vulkan::translate::SetLayoutBindingKey;

    fn binding(binding: u32, descriptor_type: vk::DescriptorType, count: u32) -> SetLayoutBindingKey {
        SetLayoutBindingKey {
            binding,
            descriptor_type,
            count,
            stages: vk::ShaderStageFlags::ALL,
            immutable_sampler: None,
        }
    }

    #[test]
    fn pool_sizes_sum_per_type() {
        let layout = SetLayoutKey {
            bindings: vec![
                binding(0, vk::DescriptorType::SAMPLED_IMAGE, 4),
                binding(1, vk::DescriptorType::SAMPLED_IMAGE, 2),
                binding(256, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1),
            ],
        };
        let counts = descriptor_counts(&layout);
        assert_eq!(counts.sampled_image, 6);
        assert_eq!(counts.uniform_buffer_dynamic, 1);
        assert_eq!(counts.storage_buffer, 0);
    }

    #[test]
    fn descriptors_fit_matching_bindings_only() {
        let buffer = VulkanDescriptor::Buffer {
            buffer: vk::Buffer::null(),
            offset: 0,
            range: 256,
        };
        assert!(buffer.fits(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC));
        assert!(!buffer.fits(vk::DescriptorType::SAMPLED_IMAGE));
        assert!(VulkanDescriptor::Sampler(vk::Sampler::null()).fits(vk::DescriptorType::SAMPLER));
        assert!(!VulkanDescriptor::TexelBuffer(vk::BufferView::null()).fits(vk::DescriptorType::STORAGE_BUFFER));
    }
}
