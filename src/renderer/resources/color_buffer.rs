use crate::renderer::common::{Format, ResourceState, ResourceType};
use crate::renderer::handle::ResourceHandle;
use crate::renderer::GraphicsContext;
use color_eyre::Result;
use glam::Vec4;

#[derive(Debug, Clone, PartialEq)]
pub struct ColorBufferDesc {
    pub name: String,
    pub resource_type: ResourceType,
    pub width: u64,
    pub height: u32,
    pub array_size_or_depth: u32,
    /// Zero requests a full mip chain
    pub num_mips: u32,
    pub num_samples: u32,
    pub format: Format,
    pub num_fragments: u32,
    pub plane_count: u8,
    pub clear_color: Vec4,
}

impl Default for ColorBufferDesc {
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
            num_fragments: 1,
            plane_count: 1,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}

impl ColorBufferDesc {
    pub fn texture_2d(name: impl Into<String>, width: u64, height: u32, format: Format) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            ..Default::default()
        }
    }

    pub fn with_num_mips(mut self, num_mips: u32) -> Self {
        self.num_mips = num_mips;
        self
    }

    pub fn with_samples(mut self, num_samples: u32) -> Self {
        self.num_samples = num_samples;
        if num_samples > 1 {
            self.resource_type = if self.resource_type.is_array() {
                ResourceType::TEXTURE_2D_MS_ARRAY
            } else {
                ResourceType::TEXTURE_2D_MS
            };
        }
        self
    }

    pub fn with_clear_color(mut self, clear_color: Vec4) -> Self {
        self.clear_color = clear_color;
        self
    }
}

/// Engine level colour render target or texture
#[derive(Clone)]
pub struct ColorBuffer {
    ctx: GraphicsContext,
    handle: ResourceHandle,
}

impl ColorBuffer {
    pub fn new(ctx: &GraphicsContext, desc: &ColorBufferDesc) -> Result<Self> {
        Self::with_data(ctx, desc, None)
    }

    /// Creates the buffer and uploads `data` into mip 0
    pub fn with_data(ctx: &GraphicsContext, desc: &ColorBufferDesc, data: Option<&[u8]>) -> Result<Self> {
        let handle = ctx.manager().create_color_buffer(desc, data)?;
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

    pub fn width(&self) -> u64 {
        self.ctx.manager().width(&self.handle).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.ctx.manager().height(&self.handle).unwrap_or(0)
    }

    pub fn array_size_or_depth(&self) -> u32 {
        self.ctx.manager().array_size_or_depth(&self.handle).unwrap_or(0)
    }

    pub fn num_mips(&self) -> u32 {
        self.ctx.manager().num_mips(&self.handle).unwrap_or(0)
    }

    pub fn num_samples(&self) -> u32 {
        self.ctx.manager().num_samples(&self.handle).unwrap_or(0)
    }

    pub fn format(&self) -> Format {
        self.ctx.manager().format(&self.handle).unwrap_or_default()
    }

    pub fn plane_count(&self) -> u8 {
        self.ctx.manager().plane_count(&self.handle).unwrap_or(0)
    }

    pub fn clear_color(&self) -> Vec4 {
        self.ctx.manager().clear_color(&self.handle).unwrap_or_default()
    }

    pub fn usage_state(&self) -> ResourceState {
        self.ctx.manager().usage_state(&self.handle).unwrap_or_default()
    }

    pub fn set_usage_state(&self, state: ResourceState) {
        self.ctx.manager().set_usage_state(&self.handle, state);
    }
}

impl std::fmt::Debug for ColorBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ColorBuffer").field(&self.handle).finish()
    }
}
