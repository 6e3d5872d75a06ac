use crate::renderer::common::{Format, MemoryAccess, ResourceState, ResourceType};
use crate::renderer::handle::ResourceHandle;
use crate::renderer::GraphicsContext;
use color_eyre::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct GpuBufferDesc {
    pub name: String,
    pub resource_type: ResourceType,
    pub memory_access: MemoryAccess,
    pub element_count: usize,
    pub element_size: usize,
    /// Element format of typed buffers
    pub format: Format,
    pub initial_data: Option<Vec<u8>>,
}

impl Default for GpuBufferDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            resource_type: ResourceType::STRUCTURED_BUFFER,
            memory_access: MemoryAccess::GPU_READ,
            element_count: 0,
            element_size: 0,
            format: Format::Unknown,
            initial_data: None,
        }
    }
}

impl GpuBufferDesc {
    pub fn new(
        name: impl Into<String>,
        resource_type: ResourceType,
        element_count: usize,
        element_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            resource_type,
            element_count,
            element_size,
            ..Default::default()
        }
    }

    pub fn constant_buffer(name: impl Into<String>, element_count: usize, element_size: usize) -> Self {
        Self {
            memory_access: MemoryAccess::GPU_READ | MemoryAccess::CPU_WRITE,
            ..Self::new(name, ResourceType::CONSTANT_BUFFER, element_count, element_size)
        }
    }

    pub fn with_memory_access(mut self, memory_access: MemoryAccess) -> Self {
        self.memory_access = memory_access;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_initial_data(mut self, data: &[u8]) -> Self {
        self.initial_data = Some(data.to_vec());
        self
    }
}

#[derive(Clone)]
pub struct GpuBuffer {
    ctx: GraphicsContext,
    handle: ResourceHandle,
}

impl GpuBuffer {
    pub fn new(ctx: &GraphicsContext, desc: &GpuBufferDesc) -> Result<Self> {
        let handle = ctx.manager().create_gpu_buffer(desc)?;
        Ok(Self { ctx: ctx.clone(), handle })
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn name(&self) -> String {
        self.ctx.manager().name(&self.handle).unwrap_or_default()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.ctx.manager().resource_type(&self.handle).unwrap_or_default()
    }

    pub fn element_count(&self) -> usize {
        self.ctx.manager().element_count(&self.handle).unwrap_or(0)
    }

    /// Element size after constant buffer alignment
    pub fn element_size(&self) -> usize {
        self.ctx.manager().element_size(&self.handle).unwrap_or(0)
    }

    pub fn size(&self) -> u64 {
        self.ctx.manager().buffer_size(&self.handle).unwrap_or(0)
    }

    pub fn gpu_address(&self) -> u64 {
        self.ctx.manager().gpu_address(&self.handle).unwrap_or(0)
    }

    /// Copies `data` into the mapped buffer at `offset`. Does not wait on the GPU.
    pub fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.ctx.manager().update(&self.handle, offset, data)
    }

    pub fn update_pod<T: bytemuck::Pod>(&self, offset: u64, value: &T) -> Result<()> {
        self.update(offset, bytemuck::bytes_of(value))
    }

    pub fn usage_state(&self) -> ResourceState {
        self.ctx.manager().usage_state(&self.handle).unwrap_or_default()
    }

    pub fn set_usage_state(&self, state: ResourceState) {
        self.ctx.manager().set_usage_state(&self.handle, state);
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("GpuBuffer").field(&self.handle).finish()
    }
}
