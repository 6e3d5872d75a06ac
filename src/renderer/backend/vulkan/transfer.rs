use ash::vk;
use color_eyre::Result;
use std::sync::{Mutex, PoisonError};

/// One reusable command buffer for blocking uploads outside any frame
pub struct TransferContext {
    fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    queue: vk::Queue,
    // Serializes use of the command buffer and the queue
    lock: Mutex<()>,
}

impl TransferContext {
    pub fn new(device: &ash::Device, queue_family: u32, queue: vk::Queue) -> Result<Self> {
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None)? };

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None)? };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe { device.allocate_command_buffers(&command_buffer_info)?[0] };

        Ok(Self {
            fence,
            command_pool,
            command_buffer,
            queue,
            lock: Mutex::new(()),
        })
    }

    /// Records `func`, submits it and waits for the GPU to finish
    pub fn immediate_submit<F>(&self, device: &ash::Device, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let cmd = self.command_buffer;

        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(cmd, &begin_info)? };

        let recorded = func(cmd, device);
        unsafe { device.end_command_buffer(cmd)? };
        if let Err(e) = recorded {
            unsafe { device.reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())? };
            return Err(e);
        }

        let cmds = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        unsafe {
            device.queue_submit(self.queue, &[submit], self.fence)?;
            device.wait_for_fences(&[self.fence], true, u64::MAX)?;
            device.reset_fences(&[self.fence])?;
            device.reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }

    /// Must run before the device is destroyed
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_command_pool(self.command_pool, None);
            device.destroy_fence(self.fence, None);
        }
    }
}
