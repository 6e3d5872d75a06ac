use bitflags::bitflags;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    #[default]
    Null,
    Vulkan,
    Direct3D12,
}

impl GraphicsApi {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "null" | "none" => Some(Self::Null),
            "vulkan" | "vk" => Some(Self::Vulkan),
            "dx12" | "d3d12" | "direct3d12" => Some(Self::Direct3D12),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    Zero,
    #[default]
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    DstColor,
    InvDstColor,
    SrcAlphaSat,
    BlendFactor,
    InvBlendFactor,
    AlphaFactor,
    InvAlphaFactor,
    Src1Color,
    InvSrc1Color,
    Src1Alpha,
    InvSrc1Alpha,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    Clear,
    Set,
    Copy,
    CopyInverted,
    #[default]
    Noop,
    Invert,
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Equiv,
    AndReverse,
    AndInverted,
    OrReverse,
    OrInverted,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrite: u8 {
        const RED = 1;
        const GREEN = 2;
        const BLUE = 4;
        const ALPHA = 8;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWrite {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthWrite {
    Zero,
    #[default]
    All,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    Wireframe,
    #[default]
    Solid,
}

/// `None` disables comparison and is only meaningful for samplers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    None,
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    Incr,
    Decr,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexBufferStripCutValue {
    #[default]
    Disabled,
    Value0xFFFF,
    Value0xFFFFFFFF,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    LineListWithAdjacency,
    LineStripWithAdjacency,
    TriangleListWithAdjacency,
    TriangleStripWithAdjacency,
    /// Patch list with 1..=32 control points
    PatchList(u8),
}

impl PrimitiveTopology {
    pub fn control_points(self) -> Option<u32> {
        match self {
            Self::PatchList(n) => Some(n as u32),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputClassification {
    #[default]
    PerVertexData,
    PerInstanceData,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStage: u16 {
        const VERTEX = 0x0001;
        const HULL = 0x0002;
        const DOMAIN = 0x0004;
        const GEOMETRY = 0x0008;
        const PIXEL = 0x0010;
        const COMPUTE = 0x0020;
        const AMPLIFICATION = 0x0040;
        const MESH = 0x0080;
        const ALL_GRAPHICS = 0x00FE;

        const RAY_GENERATION = 0x0100;
        const ANY_HIT = 0x0200;
        const CLOSEST_HIT = 0x0400;
        const MISS = 0x0800;
        const INTERSECTION = 0x1000;
        const CALLABLE = 0x2000;
        const ALL_RAYTRACING = 0x3F00;

        const ALL = 0x3FFF;
    }
}

/// Logical kind of a descriptor, independent of backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    ConstantBuffer,
    DynamicConstantBuffer,
    TextureSRV,
    TextureUAV,
    TypedBufferSRV,
    TypedBufferUAV,
    StructuredBufferSRV,
    StructuredBufferUAV,
    RawBufferSRV,
    RawBufferUAV,
    Sampler,
    RayTracingAccelStruct,
    SamplerFeedbackTextureUAV,
}

impl DescriptorType {
    pub const ALL: [Self; 13] = [
        Self::ConstantBuffer,
        Self::DynamicConstantBuffer,
        Self::TextureSRV,
        Self::TextureUAV,
        Self::TypedBufferSRV,
        Self::TypedBufferUAV,
        Self::StructuredBufferSRV,
        Self::StructuredBufferUAV,
        Self::RawBufferSRV,
        Self::RawBufferUAV,
        Self::Sampler,
        Self::RayTracingAccelStruct,
        Self::SamplerFeedbackTextureUAV,
    ];

    pub fn class(self) -> DescriptorClass {
        match self {
            Self::ConstantBuffer | Self::DynamicConstantBuffer => DescriptorClass::ConstantBuffer,
            Self::TextureSRV
            | Self::TypedBufferSRV
            | Self::StructuredBufferSRV
            | Self::RawBufferSRV
            | Self::RayTracingAccelStruct => DescriptorClass::ShaderResource,
            Self::TextureUAV
            | Self::TypedBufferUAV
            | Self::StructuredBufferUAV
            | Self::RawBufferUAV
            | Self::SamplerFeedbackTextureUAV => DescriptorClass::UnorderedAccess,
            Self::Sampler => DescriptorClass::Sampler,
        }
    }
}

/// Register class a descriptor binds through (HLSL `t`, `u`, `b`, `s`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorClass {
    ShaderResource,
    UnorderedAccess,
    ConstantBuffer,
    Sampler,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RootSignatureFlags: u32 {
        const ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT = 0x0001;
        const DENY_VERTEX_SHADER_ROOT_ACCESS = 0x0002;
        const DENY_HULL_SHADER_ROOT_ACCESS = 0x0004;
        const DENY_DOMAIN_SHADER_ROOT_ACCESS = 0x0008;
        const DENY_GEOMETRY_SHADER_ROOT_ACCESS = 0x0010;
        const DENY_PIXEL_SHADER_ROOT_ACCESS = 0x0020;
        const ALLOW_STREAM_OUTPUT = 0x0040;
        const LOCAL_ROOT_SIGNATURE = 0x0080;
        const DENY_AMPLIFICATION_SHADER_ROOT_ACCESS = 0x0100;
        const DENY_MESH_SHADER_ROOT_ACCESS = 0x0200;
        const CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED = 0x0400;
        const SAMPLER_HEAP_DIRECTLY_INDEXED = 0x0800;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    MinMagMipPoint,
    MinMagPointMipLinear,
    MinPointMagLinearMipPoint,
    MinPointMagMipLinear,
    MinLinearMagMipPoint,
    MinLinearMagPointMipLinear,
    MinMagLinearMipPoint,
    MinMagMipLinear,
    #[default]
    Anisotropic,

    ComparisonMinMagMipPoint,
    ComparisonMinMagPointMipLinear,
    ComparisonMinPointMagLinearMipPoint,
    ComparisonMinPointMagMipLinear,
    ComparisonMinLinearMagMipPoint,
    ComparisonMinLinearMagPointMipLinear,
    ComparisonMinMagLinearMipPoint,
    ComparisonMinMagMipLinear,
    ComparisonAnisotropic,

    MinimumMinMagMipPoint,
    MinimumMinMagPointMipLinear,
    MinimumMinPointMagLinearMipPoint,
    MinimumMinPointMagMipLinear,
    MinimumMinLinearMagMipPoint,
    MinimumMinLinearMagPointMipLinear,
    MinimumMinMagLinearMipPoint,
    MinimumMinMagMipLinear,
    MinimumAnisotropic,

    MaximumMinMagMipPoint,
    MaximumMinMagPointMipLinear,
    MaximumMinPointMagLinearMipPoint,
    MaximumMinPointMagMipLinear,
    MaximumMinLinearMagMipPoint,
    MaximumMinLinearMagPointMipLinear,
    MaximumMinMagLinearMipPoint,
    MaximumMinMagMipLinear,
    MaximumAnisotropic,
}

/// Sampling mode of one filter stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Point,
    Linear,
}

/// How filtered samples are reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReduction {
    Standard,
    Comparison,
    Minimum,
    Maximum,
}

impl TextureFilter {
    /// Splits the filter into (min, mag, mip, anisotropic, reduction)
    pub fn decompose(self) -> (FilterMode, FilterMode, FilterMode, bool, FilterReduction) {
        use FilterMode::*;
        use TextureFilter::*;

        let index = self as u32;
        let reduction = match index / 9 {
            0 => FilterReduction::Standard,
            1 => FilterReduction::Comparison,
            2 => FilterReduction::Minimum,
            _ => FilterReduction::Maximum,
        };
        let base = match index % 9 {
            0 => MinMagMipPoint,
            1 => MinMagPointMipLinear,
            2 => MinPointMagLinearMipPoint,
            3 => MinPointMagMipLinear,
            4 => MinLinearMagMipPoint,
            5 => MinLinearMagPointMipLinear,
            6 => MinMagLinearMipPoint,
            7 => MinMagMipLinear,
            _ => Anisotropic,
        };
        let (min, mag, mip, aniso) = match base {
            MinMagMipPoint => (Point, Point, Point, false),
            MinMagPointMipLinear => (Point, Point, Linear, false),
            MinPointMagLinearMipPoint => (Point, Linear, Point, false),
            MinPointMagMipLinear => (Point, Linear, Linear, false),
            MinLinearMagMipPoint => (Linear, Point, Point, false),
            MinLinearMagPointMipLinear => (Linear, Point, Linear, false),
            MinMagLinearMipPoint => (Linear, Linear, Point, false),
            MinMagMipLinear => (Linear, Linear, Linear, false),
            _ => (Linear, Linear, Linear, true),
        };
        (min, mag, mip, aniso, reduction)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureAddress {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
    MirrorOnce,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticBorderColor {
    TransparentBlack,
    OpaqueBlack,
    #[default]
    OpaqueWhite,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        const COMMON = 0x0000_0001;
        const CONSTANT_BUFFER = 0x0000_0002;
        const VERTEX_BUFFER = 0x0000_0004;
        const INDEX_BUFFER = 0x0000_0008;
        const INDIRECT_ARGUMENT = 0x0000_0010;
        const SHADER_RESOURCE = 0x0000_0020;
        const UNORDERED_ACCESS = 0x0000_0040;
        const RENDER_TARGET = 0x0000_0080;
        const DEPTH_WRITE = 0x0000_0100;
        const DEPTH_READ = 0x0000_0200;
        const STREAM_OUT = 0x0000_0400;
        const COPY_DEST = 0x0000_0800;
        const COPY_SOURCE = 0x0000_1000;
        const RESOLVE_DEST = 0x0000_2000;
        const RESOLVE_SOURCE = 0x0000_4000;
        const PRESENT = 0x0000_8000;
        const ACCEL_STRUCT_READ = 0x0001_0000;
        const ACCEL_STRUCT_WRITE = 0x0002_0000;
        const ACCEL_STRUCT_BUILD_INPUT = 0x0004_0000;
        const ACCEL_STRUCT_BUILD_BLAS = 0x0008_0000;
        const SHADING_RATE_SURFACE = 0x0010_0000;
        const OPACITY_MICROMAP_WRITE = 0x0020_0000;
        const OPACITY_MICROMAP_BUILD_INPUT = 0x0040_0000;
        const PREDICATION = 0x0080_0000;
        const GENERIC_READ = 0x0100_0000;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u32 {
        const TEXTURE_1D = 0x0001;
        const TEXTURE_1D_ARRAY = 0x0002;
        const TEXTURE_2D = 0x0004;
        const TEXTURE_2D_ARRAY = 0x0008;
        const TEXTURE_2D_MS = 0x0010;
        const TEXTURE_2D_MS_ARRAY = 0x0020;
        const TEXTURE_CUBE = 0x0040;
        const TEXTURE_CUBE_ARRAY = 0x0080;
        const TEXTURE_3D = 0x0100;
        const INDEX_BUFFER = 0x0200;
        const VERTEX_BUFFER = 0x0400;
        const CONSTANT_BUFFER = 0x0800;
        const BYTE_ADDRESS_BUFFER = 0x1000;
        const INDIRECT_ARGS_BUFFER = 0x2000;
        const STRUCTURED_BUFFER = 0x4000;
        const TYPED_BUFFER = 0x8000;
        const READBACK_BUFFER = 0x0001_0000;

        const TEXTURE_1D_TYPE = Self::TEXTURE_1D.bits() | Self::TEXTURE_1D_ARRAY.bits();
        const TEXTURE_2D_TYPE = Self::TEXTURE_2D.bits()
            | Self::TEXTURE_2D_ARRAY.bits()
            | Self::TEXTURE_2D_MS.bits()
            | Self::TEXTURE_2D_MS_ARRAY.bits();
        const TEXTURE_CUBE_TYPE = Self::TEXTURE_CUBE.bits() | Self::TEXTURE_CUBE_ARRAY.bits();
        const TEXTURE_ARRAY_TYPE = Self::TEXTURE_1D_ARRAY.bits()
            | Self::TEXTURE_2D_ARRAY.bits()
            | Self::TEXTURE_2D_MS_ARRAY.bits()
            | Self::TEXTURE_CUBE_ARRAY.bits();
        const TEXTURE_TYPE = Self::TEXTURE_1D_TYPE.bits()
            | Self::TEXTURE_2D_TYPE.bits()
            | Self::TEXTURE_CUBE_TYPE.bits()
            | Self::TEXTURE_3D.bits();
        const BUFFER_TYPE = Self::INDEX_BUFFER.bits()
            | Self::VERTEX_BUFFER.bits()
            | Self::CONSTANT_BUFFER.bits()
            | Self::BYTE_ADDRESS_BUFFER.bits()
            | Self::INDIRECT_ARGS_BUFFER.bits()
            | Self::STRUCTURED_BUFFER.bits()
            | Self::TYPED_BUFFER.bits()
            | Self::READBACK_BUFFER.bits();
        const UNORDERED_ACCESS_TYPE = Self::BYTE_ADDRESS_BUFFER.bits()
            | Self::INDIRECT_ARGS_BUFFER.bits()
            | Self::STRUCTURED_BUFFER.bits()
            | Self::TYPED_BUFFER.bits();
    }
}

impl ResourceType {
    pub fn is_texture(self) -> bool {
        self.intersects(Self::TEXTURE_TYPE)
    }

    pub fn is_buffer(self) -> bool {
        self.intersects(Self::BUFFER_TYPE)
    }

    pub fn is_array(self) -> bool {
        self.intersects(Self::TEXTURE_ARRAY_TYPE)
    }

    pub fn is_multisampled(self) -> bool {
        self.intersects(Self::TEXTURE_2D_MS | Self::TEXTURE_2D_MS_ARRAY)
    }

    pub fn dimension(self) -> Option<TextureDimension> {
        if self.intersects(Self::TEXTURE_1D_TYPE) {
            Some(TextureDimension::Texture1D)
        } else if self.intersects(Self::TEXTURE_2D_TYPE | Self::TEXTURE_CUBE_TYPE) {
            Some(TextureDimension::Texture2D)
        } else if self.contains(Self::TEXTURE_3D) {
            Some(TextureDimension::Texture3D)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    Texture1D,
    Texture2D,
    Texture3D,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryAccess: u32 {
        const GPU_READ = 0x0001;
        const GPU_WRITE = 0x0002;
        const CPU_READ = 0x0004;
        const CPU_WRITE = 0x0008;
        const CPU_MAPPED = 0x0010;
    }
}

impl MemoryAccess {
    pub fn is_cpu_visible(self) -> bool {
        self.intersects(Self::CPU_READ | Self::CPU_WRITE | Self::CPU_MAPPED)
    }
}

/// Which planes of a depth buffer a view can write
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthStencilAspect {
    #[default]
    ReadWrite,
    DepthReadOnly,
    StencilReadOnly,
    ReadOnly,
}

impl DepthStencilAspect {
    pub const ALL: [Self; 4] = [
        Self::ReadWrite,
        Self::DepthReadOnly,
        Self::StencilReadOnly,
        Self::ReadOnly,
    ];

    /// Variant actually built for a format; without stencil only the depth flag matters
    pub fn resolve(self, has_stencil: bool) -> Self {
        match (self, has_stencil) {
            (Self::StencilReadOnly, false) => Self::ReadWrite,
            (Self::ReadOnly, false) => Self::DepthReadOnly,
            (aspect, _) => aspect,
        }
    }

    pub fn depth_read_only(self) -> bool {
        matches!(self, Self::DepthReadOnly | Self::ReadOnly)
    }

    pub fn stencil_read_only(self) -> bool {
        matches!(self, Self::StencilReadOnly | Self::ReadOnly)
    }
}

/// Plane sampled by a depth buffer shader resource view
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthPlane {
    #[default]
    Depth,
    Stencil,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_descriptor_type_has_one_class() {
        assert_eq!(DescriptorType::ConstantBuffer.class(), DescriptorClass::ConstantBuffer);
        assert_eq!(DescriptorType::StructuredBufferSRV.class(), DescriptorClass::ShaderResource);
        assert_eq!(DescriptorType::RawBufferUAV.class(), DescriptorClass::UnorderedAccess);
        assert_eq!(DescriptorType::Sampler.class(), DescriptorClass::Sampler);
    }

    #[test]
    fn resource_type_masks() {
        assert!(ResourceType::TEXTURE_CUBE_ARRAY.is_texture());
        assert!(ResourceType::TEXTURE_CUBE_ARRAY.is_array());
        assert!(ResourceType::CONSTANT_BUFFER.is_buffer());
        assert!(!ResourceType::CONSTANT_BUFFER.intersects(ResourceType::UNORDERED_ACCESS_TYPE));
        assert_eq!(ResourceType::TEXTURE_CUBE.dimension(), Some(TextureDimension::Texture2D));
        assert_eq!(ResourceType::VERTEX_BUFFER.dimension(), None);
    }

    #[test]
    fn filter_decomposition() {
        let (min, mag, mip, aniso, reduction) = TextureFilter::MinPointMagMipLinear.decompose();
        assert_eq!((min, mag, mip), (FilterMode::Point, FilterMode::Linear, FilterMode::Linear));
        assert!(!aniso);
        assert_eq!(reduction, FilterReduction::Standard);

        let (.., aniso, reduction) = TextureFilter::ComparisonAnisotropic.decompose();
        assert!(aniso);
        assert_eq!(reduction, FilterReduction::Comparison);

        let (.., reduction) = TextureFilter::MaximumMinMagMipPoint.decompose();
        assert_eq!(reduction, FilterReduction::Maximum);
    }

    #[test]
    fn stencil_less_aspects_alias_onto_depth() {
        use DepthStencilAspect::*;
        let with_stencil: Vec<_> = DepthStencilAspect::ALL.iter().map(|a| a.resolve(true)).collect();
        assert_eq!(with_stencil, DepthStencilAspect::ALL);
        let depth_only: Vec<_> = DepthStencilAspect::ALL.iter().map(|a| a.resolve(false)).collect();
        assert_eq!(depth_only, vec![ReadWrite, DepthReadOnly, ReadWrite, DepthReadOnly]);
        assert!(ReadOnly.depth_read_only() && ReadOnly.stencil_read_only());
        assert!(!StencilReadOnly.depth_read_only());
    }

    #[test]
    fn graphics_api_parse() {
        assert_eq!(GraphicsApi::parse("Vulkan"), Some(GraphicsApi::Vulkan));
        assert_eq!(GraphicsApi::parse("d3d12"), Some(GraphicsApi::Direct3D12));
        assert_eq!(GraphicsApi::parse("metal"), None);
    }
}
