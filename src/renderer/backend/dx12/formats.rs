use crate::renderer::common::{DepthPlane, Format};

/// `DXGI_FORMAT` values used by the engine
pub mod dxgi {
    pub const UNKNOWN: u32 = 0;
    pub const R32G32B32A32_FLOAT: u32 = 2;
    pub const R32G32B32A32_UINT: u32 = 3;
    pub const R32G32B32A32_SINT: u32 = 4;
    pub const R32G32B32_FLOAT: u32 = 6;
    pub const R32G32B32_UINT: u32 = 7;
    pub const R32G32B32_SINT: u32 = 8;
    pub const R16G16B16A16_FLOAT: u32 = 10;
    pub const R16G16B16A16_UNORM: u32 = 11;
    pub const R16G16B16A16_UINT: u32 = 12;
    pub const R16G16B16A16_SNORM: u32 = 13;
    pub const R16G16B16A16_SINT: u32 = 14;
    pub const R32G32_FLOAT: u32 = 16;
    pub const R32G32_UINT: u32 = 17;
    pub const R32G32_SINT: u32 = 18;
    pub const R32G8X24_TYPELESS: u32 = 19;
    pub const D32_FLOAT_S8X24_UINT: u32 = 20;
    pub const R32_FLOAT_X8X24_TYPELESS: u32 = 21;
    pub const X32_TYPELESS_G8X24_UINT: u32 = 22;
    pub const R10G10B10A2_UNORM: u32 = 24;
    pub const R11G11B10_FLOAT: u32 = 26;
    pub const R8G8B8A8_UNORM: u32 = 28;
    pub const R8G8B8A8_UNORM_SRGB: u32 = 29;
    pub const R8G8B8A8_UINT: u32 = 30;
    pub const R8G8B8A8_SNORM: u32 = 31;
    pub const R8G8B8A8_SINT: u32 = 32;
    pub const R16G16_FLOAT: u32 = 34;
    pub const R16G16_UNORM: u32 = 35;
    pub const R16G16_UINT: u32 = 36;
    pub const R16G16_SNORM: u32 = 37;
    pub const R16G16_SINT: u32 = 38;
    pub const R32_TYPELESS: u32 = 39;
    pub const D32_FLOAT: u32 = 40;
    pub const R32_FLOAT: u32 = 41;
    pub const R32_UINT: u32 = 42;
    pub const R32_SINT: u32 = 43;
    pub const R24G8_TYPELESS: u32 = 44;
    pub const D24_UNORM_S8_UINT: u32 = 45;
    pub const R24_UNORM_X8_TYPELESS: u32 = 46;
    pub const X24_TYPELESS_G8_UINT: u32 = 47;
    pub const R8G8_UNORM: u32 = 49;
    pub const R8G8_UINT: u32 = 50;
    pub const R8G8_SNORM: u32 = 51;
    pub const R8G8_SINT: u32 = 52;
    pub const R16_TYPELESS: u32 = 53;
    pub const R16_FLOAT: u32 = 54;
    pub const D16_UNORM: u32 = 55;
    pub const R16_UNORM: u32 = 56;
    pub const R16_UINT: u32 = 57;
    pub const R16_SNORM: u32 = 58;
    pub const R16_SINT: u32 = 59;
    pub const R8_UNORM: u32 = 61;
    pub const R8_UINT: u32 = 62;
    pub const R8_SNORM: u32 = 63;
    pub const R8_SINT: u32 = 64;
    pub const BC1_UNORM: u32 = 71;
    pub const BC1_UNORM_SRGB: u32 = 72;
    pub const BC2_UNORM: u32 = 74;
    pub const BC2_UNORM_SRGB: u32 = 75;
    pub const BC3_UNORM: u32 = 77;
    pub const BC3_UNORM_SRGB: u32 = 78;
    pub const BC4_UNORM: u32 = 80;
    pub const BC4_SNORM: u32 = 81;
    pub const BC5_UNORM: u32 = 83;
    pub const BC5_SNORM: u32 = 84;
    pub const B5G6R5_UNORM: u32 = 85;
    pub const B5G5R5A1_UNORM: u32 = 86;
    pub const B8G8R8A8_UNORM: u32 = 87;
    pub const B8G8R8A8_UNORM_SRGB: u32 = 91;
    pub const BC6H_UF16: u32 = 95;
    pub const BC6H_SF16: u32 = 96;
    pub const BC7_UNORM: u32 = 98;
    pub const BC7_UNORM_SRGB: u32 = 99;
    pub const B4G4R4A4_UNORM: u32 = 115;
}

const FORMAT_MAP: &[(Format, u32)] = &[
    (Format::Unknown, dxgi::UNKNOWN),
    (Format::R8_UInt, dxgi::R8_UINT),
    (Format::R8_SInt, dxgi::R8_SINT),
    (Format::R8_UNorm, dxgi::R8_UNORM),
    (Format::R8_SNorm, dxgi::R8_SNORM),
    (Format::RG8_UInt, dxgi::R8G8_UINT),
    (Format::RG8_SInt, dxgi::R8G8_SINT),
    (Format::RG8_UNorm, dxgi::R8G8_UNORM),
    (Format::RG8_SNorm, dxgi::R8G8_SNORM),
    (Format::R16_UInt, dxgi::R16_UINT),
    (Format::R16_SInt, dxgi::R16_SINT),
    (Format::R16_UNorm, dxgi::R16_UNORM),
    (Format::R16_SNorm, dxgi::R16_SNORM),
    (Format::R16_Float, dxgi::R16_FLOAT),
    (Format::BGRA4_UNorm, dxgi::B4G4R4A4_UNORM),
    (Format::B5G6R5_UNorm, dxgi::B5G6R5_UNORM),
    (Format::B5G5R5A1_UNorm, dxgi::B5G5R5A1_UNORM),
    (Format::RGBA8_UInt, dxgi::R8G8B8A8_UINT),
    (Format::RGBA8_SInt, dxgi::R8G8B8A8_SINT),
    (Format::RGBA8_UNorm, dxgi::R8G8B8A8_UNORM),
    (Format::RGBA8_SNorm, dxgi::R8G8B8A8_SNORM),
    (Format::BGRA8_UNorm, dxgi::B8G8R8A8_UNORM),
    (Format::SRGBA8_UNorm, dxgi::R8G8B8A8_UNORM_SRGB),
    (Format::SBGRA8_UNorm, dxgi::B8G8R8A8_UNORM_SRGB),
    (Format::R10G10B10A2_UNorm, dxgi::R10G10B10A2_UNORM),
    (Format::R11G11B10_Float, dxgi::R11G11B10_FLOAT),
    (Format::RG16_UInt, dxgi::R16G16_UINT),
    (Format::RG16_SInt, dxgi::R16G16_SINT),
    (Format::RG16_UNorm, dxgi::R16G16_UNORM),
    (Format::RG16_SNorm, dxgi::R16G16_SNORM),
    (Format::RG16_Float, dxgi::R16G16_FLOAT),
    (Format::R32_UInt, dxgi::R32_UINT),
    (Format::R32_SInt, dxgi::R32_SINT),
    (Format::R32_Float, dxgi::R32_FLOAT),
    (Format::RGBA16_UInt, dxgi::R16G16B16A16_UINT),
    (Format::RGBA16_SInt, dxgi::R16G16B16A16_SINT),
    (Format::RGBA16_UNorm, dxgi::R16G16B16A16_UNORM),
    (Format::RGBA16_SNorm, dxgi::R16G16B16A16_SNORM),
    (Format::RGBA16_Float, dxgi::R16G16B16A16_FLOAT),
    (Format::RG32_UInt, dxgi::R32G32_UINT),
    (Format::RG32_SInt, dxgi::R32G32_SINT),
    (Format::RG32_Float, dxgi::R32G32_FLOAT),
    (Format::RGB32_UInt, dxgi::R32G32B32_UINT),
    (Format::RGB32_SInt, dxgi::R32G32B32_SINT),
    (Format::RGB32_Float, dxgi::R32G32B32_FLOAT),
    (Format::RGBA32_UInt, dxgi::R32G32B32A32_UINT),
    (Format::RGBA32_SInt, dxgi::R32G32B32A32_SINT),
    (Format::RGBA32_Float, dxgi::R32G32B32A32_FLOAT),
    (Format::D16, dxgi::D16_UNORM),
    (Format::D24S8, dxgi::D24_UNORM_S8_UINT),
    (Format::X24G8_UInt, dxgi::X24_TYPELESS_G8_UINT),
    (Format::D32, dxgi::D32_FLOAT),
    (Format::D32S8, dxgi::D32_FLOAT_S8X24_UINT),
    (Format::X32G8_UInt, dxgi::X32_TYPELESS_G8X24_UINT),
    (Format::BC1_UNorm, dxgi::BC1_UNORM),
    (Format::BC1_UNorm_Srgb, dxgi::BC1_UNORM_SRGB),
    (Format::BC2_UNorm, dxgi::BC2_UNORM),
    (Format::BC2_UNorm_Srgb, dxgi::BC2_UNORM_SRGB),
    (Format::BC3_UNorm, dxgi::BC3_UNORM),
    (Format::BC3_UNorm_Srgb, dxgi::BC3_UNORM_SRGB),
    (Format::BC4_UNorm, dxgi::BC4_UNORM),
    (Format::BC4_SNorm, dxgi::BC4_SNORM),
    (Format::BC5_UNorm, dxgi::BC5_UNORM),
    (Format::BC5_SNorm, dxgi::BC5_SNORM),
    (Format::BC6H_UFloat, dxgi::BC6H_UF16),
    (Format::BC6H_SFloat, dxgi::BC6H_SF16),
    (Format::BC7_UNorm, dxgi::BC7_UNORM),
    (Format::BC7_UNorm_Srgb, dxgi::BC7_UNORM_SRGB),
];

pub fn format_to_dxgi(format: Format) -> u32 {
    FORMAT_MAP[format as usize].1
}

/// Unmapped values come back as `Format::Unknown`
pub fn dxgi_to_format(format: u32) -> Format {
    FORMAT_MAP
        .iter()
        .find(|(_, dxgi)| *dxgi == format)
        .map_or(Format::Unknown, |(format, _)| *format)
}

/// Typeless format a depth buffer is created with so it can also be sampled
pub fn depth_resource_format(format: Format) -> u32 {
    match format {
        Format::D16 => dxgi::R16_TYPELESS,
        Format::D24S8 | Format::X24G8_UInt => dxgi::R24G8_TYPELESS,
        Format::D32 => dxgi::R32_TYPELESS,
        Format::D32S8 | Format::X32G8_UInt => dxgi::R32G8X24_TYPELESS,
        _ => format_to_dxgi(format),
    }
}

/// Format of a shader resource view reading one plane of a depth buffer
pub fn depth_srv_format(format: Format, plane: DepthPlane) -> u32 {
    match (format, plane) {
        (Format::D16, _) => dxgi::R16_UNORM,
        (Format::D24S8 | Format::X24G8_UInt, DepthPlane::Depth) => dxgi::R24_UNORM_X8_TYPELESS,
        (Format::D24S8 | Format::X24G8_UInt, DepthPlane::Stencil) => dxgi::X24_TYPELESS_G8_UINT,
        (Format::D32, _) => dxgi::R32_FLOAT,
        (Format::D32S8 | Format::X32G8_UInt, DepthPlane::Depth) => dxgi::R32_FLOAT_X8X24_TYPELESS,
        (Format::D32S8 | Format::X32G8_UInt, DepthPlane::Stencil) => dxgi::X32_TYPELESS_G8X24_UINT,
        _ => format_to_dxgi(format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_format() {
        assert_eq!(FORMAT_MAP.len(), Format::ALL.len());
        for (i, (format, _)) in FORMAT_MAP.iter().enumerate() {
            assert_eq!(*format as usize, i);
        }
    }

    #[test]
    fn every_format_round_trips() {
        for format in Format::ALL {
            assert_eq!(dxgi_to_format(format_to_dxgi(*format)), *format, "{format:?}");
        }
        assert_eq!(dxgi_to_format(dxgi::R32_TYPELESS), Format::Unknown);
    }

    #[test]
    fn depth_buffers_are_typeless_with_per_plane_views() {
        assert_eq!(depth_resource_format(Format::D24S8), dxgi::R24G8_TYPELESS);
        assert_eq!(depth_srv_format(Format::D24S8, DepthPlane::Depth), dxgi::R24_UNORM_X8_TYPELESS);
        assert_eq!(depth_srv_format(Format::D24S8, DepthPlane::Stencil), dxgi::X24_TYPELESS_G8_UINT);
        assert_eq!(depth_srv_format(Format::D32, DepthPlane::Depth), dxgi::R32_FLOAT);
        assert_eq!(depth_resource_format(Format::RGBA8_UNorm), dxgi::R8G8B8A8_UNORM);
    }
}
