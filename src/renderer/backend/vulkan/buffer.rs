use crate::renderer::backend::vulkan::device::Device;
use crate::renderer::backend::vulkan::formats::format_to_vulkan;
use crate::renderer::common::{Format, MemoryAccess, ResourceType};
use crate::renderer::resources::gpu_buffer::GpuBufferDesc;
use ash::vk;
use color_eyre::eyre::{bail, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::{Arc, Mutex, PoisonError};

pub fn buffer_usage(resource_type: ResourceType, format: Format) -> vk::BufferUsageFlags {
    let mut usage = vk::BufferUsageFlags::TRANSFER_SRC
        | vk::BufferUsageFlags::TRANSFER_DST
        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
    if resource_type.contains(ResourceType::VERTEX_BUFFER) {
        usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if resource_type.contains(ResourceType::INDEX_BUFFER) {
        usage |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if resource_type.contains(ResourceType::CONSTANT_BUFFER) {
        usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if resource_type.intersects(ResourceType::STRUCTURED_BUFFER | ResourceType::BYTE_ADDRESS_BUFFER) {
        usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if resource_type.contains(ResourceType::INDIRECT_ARGS_BUFFER) {
        usage |= vk::BufferUsageFlags::INDIRECT_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if resource_type.contains(ResourceType::TYPED_BUFFER) && format != Format::Unknown {
        usage |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER;
    }
    usage
}

pub fn memory_location(memory_access: MemoryAccess) -> MemoryLocation {
    if memory_access.contains(MemoryAccess::CPU_READ) {
        MemoryLocation::GpuToCpu
    } else if memory_access.is_cpu_visible() {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Buffer with its own dedicated allocation
pub struct VulkanBuffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    pub element_size: u64,
    pub resource_type: ResourceType,
    pub address: u64,
    /// Present for typed buffers with a known element format
    pub texel_view: Option<vk::BufferView>,

    allocation: Mutex<Option<Allocation>>,
    device: Arc<Device>,
}

impl VulkanBuffer {
    pub fn new(device: Arc<Device>, desc: &GpuBufferDesc, element_size: u64, size: u64) -> Result<Self> {
        let usage = buffer_usage(desc.resource_type, desc.format);
        let location = memory_location(desc.memory_access);

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.logical.create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.logical.get_buffer_memory_requirements(buffer) };
        let allocation = device
            .allocate(&AllocationCreateDesc {
                name: &desc.name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
            })
            .inspect_err(|_| unsafe { device.logical.destroy_buffer(buffer, None) })?;

        // From here on Drop releases everything
        let mut this = Self {
            buffer,
            size,
            element_size,
            resource_type: desc.resource_type,
            address: 0,
            texel_view: None,
            allocation: Mutex::new(None),
            device: device.clone(),
        };
        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        *this.allocation.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(allocation);
        unsafe { device.logical.bind_buffer_memory(buffer, memory, offset)? };

        let address_info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
        this.address = unsafe { device.logical.get_buffer_device_address(&address_info) };

        if usage.contains(vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER) {
            let view_info = vk::BufferViewCreateInfo::default()
                .buffer(buffer)
                .format(format_to_vulkan(desc.format))
                .offset(0)
                .range(vk::WHOLE_SIZE);
            this.texel_view = Some(unsafe { device.logical.create_buffer_view(&view_info, None)? });
        }

        if let Some(data) = &desc.initial_data {
            if location == MemoryLocation::GpuOnly {
                this.upload(data)?;
            } else {
                this.write(0, data)?;
            }
        }
        Ok(this)
    }

    /// Copies `data` into the mapped allocation at `offset`
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > self.size {
            bail!("write of {} bytes at {offset} overruns a {} byte buffer", data.len(), self.size);
        }
        let mut allocation = self.allocation.lock().unwrap_or_else(PoisonError::into_inner);
        let allocation = allocation.as_mut().ok_or_eyre("buffer has no memory")?;
        if allocation.mapped_ptr().is_none() {
            bail!("buffer memory is not host visible");
        }
        presser::copy_from_slice_to_offset(data, allocation, offset as usize)?;
        Ok(())
    }

    fn upload(&self, data: &[u8]) -> Result<()> {
        let staging_desc = GpuBufferDesc {
            name: "Buffer staging".to_string(),
            resource_type: ResourceType::empty(),
            memory_access: MemoryAccess::CPU_WRITE,
            ..Default::default()
        };
        let staging = VulkanBuffer::new(self.device.clone(), &staging_desc, 1, data.len() as u64)?;
        staging.write(0, data)?;

        self.device.immediate_submit(|cmd, device| {
            let region = vk::BufferCopy::default().size(data.len() as u64);
            unsafe { device.cmd_copy_buffer(cmd, staging.buffer, self.buffer, &[region]) };
            Ok(())
        })
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if let Some(view) = self.texel_view.take() {
                self.device.logical.destroy_buffer_view(view, None);
            }
            self.device.logical.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            self.device.free(allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_follows_resource_type() {
        let usage = buffer_usage(ResourceType::CONSTANT_BUFFER, Format::Unknown);
        assert!(usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
        assert!(!usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER));

        let usage = buffer_usage(ResourceType::INDIRECT_ARGS_BUFFER, Format::Unknown);
        assert!(usage.contains(vk::BufferUsageFlags::INDIRECT_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER));

        // texel views need a format
        assert!(!buffer_usage(ResourceType::TYPED_BUFFER, Format::Unknown)
            .contains(vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER));
        assert!(buffer_usage(ResourceType::TYPED_BUFFER, Format::R32_Float)
            .contains(vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER));
    }

    #[test]
    fn cpu_access_picks_the_heap() {
        assert_eq!(memory_location(MemoryAccess::GPU_READ), MemoryLocation::GpuOnly);
        assert_eq!(memory_location(MemoryAccess::GPU_READ | MemoryAccess::CPU_WRITE), MemoryLocation::CpuToGpu);
        assert_eq!(memory_location(MemoryAccess::CPU_READ | MemoryAccess::GPU_WRITE), MemoryLocation::GpuToCpu);
    }
}
