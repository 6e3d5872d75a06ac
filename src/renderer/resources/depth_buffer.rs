use crate::renderer::common::{Format, ResourceState, ResourceType};
use crate::renderer::handle::ResourceHandle;
use crate::renderer::GraphicsContext;
use color_eyre::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct DepthBufferDesc {
    pub name: String,
    pub resource_type: ResourceType,
    pub width: u64,
    pub height: u32,
    pub array_size_or_depth: u32,
    pub num_mips: u32,
    pub num_samples: u32,
    pub format: Format,
    pub clear_depth: f32,
    pub clear_stencil: u8,
}

impl Default for DepthBufferDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            resource_type: ResourceType::TEXTURE_2D,
            width: 0,
            height: 0,
            array_size_or_depth: 1,
            num_mips: 1,
            num_samples: 1,
            format: Format::Unknown,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

impl DepthBufferDesc {
    pub fn texture_2d(name: impl Into<String>, width: u64, height: u32, format: Format) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct DepthBuffer {
    ctx: GraphicsContext,
    handle: ResourceHandle,
}

impl DepthBuffer {
    pub fn new(ctx: &GraphicsContext, desc: &DepthBufferDesc) -> Result<Self> {
        let handle = ctx.manager().create_depth_buffer(desc)?;
        Ok(Self { ctx: ctx.clone(), handle })
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn name(&self) -> String {
        self.ctx.manager().name(&self.handle).unwrap_or_default()
    }

    pub fn width(&self) -> u64 {
        self.ctx.manager().width(&self.handle).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.ctx.manager().height(&self.handle).unwrap_or(0)
    }

    pub fn format(&self) -> Format {
        self.ctx.manager().format(&self.handle).unwrap_or_default()
    }

    pub fn num_samples(&self) -> u32 {
        self.ctx.manager().num_samples(&self.handle).unwrap_or(0)
    }

    pub fn clear_depth(&self) -> f32 {
        self.ctx.manager().clear_depth(&self.handle).unwrap_or(1.0)
    }

    pub fn clear_stencil(&self) -> u8 {
        self.ctx.manager().clear_stencil(&self.handle).unwrap_or(0)
    }

    pub fn usage_state(&self) -> ResourceState {
        self.ctx.manager().usage_state(&self.handle).unwrap_or_default()
    }

    pub fn set_usage_state(&self, state: ResourceState) {
        self.ctx.manager().set_usage_state(&self.handle, state);
    }
}

impl std::fmt::Debug for DepthBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DepthBuffer").field(&self.handle).finish()
    }
}
