use crate::renderer::common::Format;
use ash::vk;

const FORMAT_MAP: &[(Format, vk::Format)] = &[
    (Format::Unknown, vk::Format::UNDEFINED),
    (Format::R8_UInt, vk::Format::R8_UINT),
    (Format::R8_SInt, vk::Format::R8_SINT),
    (Format::R8_UNorm, vk::Format::R8_UNORM),
    (Format::R8_SNorm, vk::Format::R8_SNORM),
    (Format::RG8_UInt, vk::Format::R8G8_UINT),
    (Format::RG8_SInt, vk::Format::R8G8_SINT),
    (Format::RG8_UNorm, vk::Format::R8G8_UNORM),
    (Format::RG8_SNorm, vk::Format::R8G8_SNORM),
    (Format::R16_UInt, vk::Format::R16_UINT),
    (Format::R16_SInt, vk::Format::R16_SINT),
    (Format::R16_UNorm, vk::Format::R16_UNORM),
    (Format::R16_SNorm, vk::Format::R16_SNORM),
    (Format::R16_Float, vk::Format::R16_SFLOAT),
    (Format::BGRA4_UNorm, vk::Format::B4G4R4A4_UNORM_PACK16),
    (Format::B5G6R5_UNorm, vk::Format::B5G6R5_UNORM_PACK16),
    (Format::B5G5R5A1_UNorm, vk::Format::B5G5R5A1_UNORM_PACK16),
    (Format::RGBA8_UInt, vk::Format::R8G8B8A8_UINT),
    (Format::RGBA8_SInt, vk::Format::R8G8B8A8_SINT),
    (Format::RGBA8_UNorm, vk::Format::R8G8B8A8_UNORM),
    (Format::RGBA8_SNorm, vk::Format::R8G8B8A8_SNORM),
    (Format::BGRA8_UNorm, vk::Format::B8G8R8A8_UNORM),
    (Format::SRGBA8_UNorm, vk::Format::R8G8B8A8_SRGB),
    (Format::SBGRA8_UNorm, vk::Format::B8G8R8A8_SRGB),
    (Format::R10G10B10A2_UNorm, vk::Format::A2B10G10R10_UNORM_PACK32),
    (Format::R11G11B10_Float, vk::Format::B10G11R11_UFLOAT_PACK32),
    (Format::RG16_UInt, vk::Format::R16G16_UINT),
    (Format::RG16_SInt, vk::Format::R16G16_SINT),
    (Format::RG16_UNorm, vk::Format::R16G16_UNORM),
    (Format::RG16_SNorm, vk::Format::R16G16_SNORM),
    (Format::RG16_Float, vk::Format::R16G16_SFLOAT),
    (Format::R32_UInt, vk::Format::R32_UINT),
    (Format::R32_SInt, vk::Format::R32_SINT),
    (Format::R32_Float, vk::Format::R32_SFLOAT),
    (Format::RGBA16_UInt, vk::Format::R16G16B16A16_UINT),
    (Format::RGBA16_SInt, vk::Format::R16G16B16A16_SINT),
    (Format::RGBA16_UNorm, vk::Format::R16G16B16A16_UNORM),
    (Format::RGBA16_SNorm, vk::Format::R16G16B16A16_SNORM),
    (Format::RGBA16_Float, vk::Format::R16G16B16A16_SFLOAT),
    (Format::RG32_UInt, vk::Format::R32G32_UINT),
    (Format::RG32_SInt, vk::Format::R32G32_SINT),
    (Format::RG32_Float, vk::Format::R32G32_SFLOAT),
    (Format::RGB32_UInt, vk::Format::R32G32B32_UINT),
    (Format::RGB32_SInt, vk::Format::R32G32B32_SINT),
    (Format::RGB32_Float, vk::Format::R32G32B32_SFLOAT),
    (Format::RGBA32_UInt, vk::Format::R32G32B32A32_UINT),
    (Format::RGBA32_SInt, vk::Format::R32G32B32A32_SINT),
    (Format::RGBA32_Float, vk::Format::R32G32B32A32_SFLOAT),
    (Format::D16, vk::Format::D16_UNORM),
    (Format::D24S8, vk::Format::D24_UNORM_S8_UINT),
    (Format::X24G8_UInt, vk::Format::D24_UNORM_S8_UINT),
    (Format::D32, vk::Format::D32_SFLOAT),
    (Format::D32S8, vk::Format::D32_SFLOAT_S8_UINT),
    (Format::X32G8_UInt, vk::Format::D32_SFLOAT_S8_UINT),
    (Format::BC1_UNorm, vk::Format::BC1_RGB_UNORM_BLOCK),
    (Format::BC1_UNorm_Srgb, vk::Format::BC1_RGB_SRGB_BLOCK),
    (Format::BC2_UNorm, vk::Format::BC2_UNORM_BLOCK),
    (Format::BC2_UNorm_Srgb, vk::Format::BC2_SRGB_BLOCK),
    (Format::BC3_UNorm, vk::Format::BC3_UNORM_BLOCK),
    (Format::BC3_UNorm_Srgb, vk::Format::BC3_SRGB_BLOCK),
    (Format::BC4_UNorm, vk::Format::BC4_UNORM_BLOCK),
    (Format::BC4_SNorm, vk::Format::BC4_SNORM_BLOCK),
    (Format::BC5_UNorm, vk::Format::BC5_UNORM_BLOCK),
    (Format::BC5_SNorm, vk::Format::BC5_SNORM_BLOCK),
    (Format::BC6H_UFloat, vk::Format::BC6H_UFLOAT_BLOCK),
    (Format::BC6H_SFloat, vk::Format::BC6H_SFLOAT_BLOCK),
    (Format::BC7_UNorm, vk::Format::BC7_UNORM_BLOCK),
    (Format::BC7_UNorm_Srgb, vk::Format::BC7_SRGB_BLOCK),
];

pub fn format_to_vulkan(format: Format) -> vk::Format {
    FORMAT_MAP[format as usize].1
}

/// First engine format mapping to `format`, so typeless stencil aliases resolve to their depth format
pub fn vulkan_to_format(format: vk::Format) -> Format {
    FORMAT_MAP
        .iter()
        .find(|(_, vk_format)| *vk_format == format)
        .map_or(Format::Unknown, |(engine, _)| *engine)
}

pub fn image_aspect(format: Format) -> vk::ImageAspectFlags {
    if format.is_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
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
    fn formats_round_trip() {
        for &format in Format::ALL {
            let back = vulkan_to_format(format_to_vulkan(format));
            match format {
                Format::X24G8_UInt => assert_eq!(back, Format::D24S8),
                Format::X32G8_UInt => assert_eq!(back, Format::D32S8),
                _ => assert_eq!(back, format),
            }
        }
    }

    #[test]
    fn depth_formats_carry_their_planes() {
        assert_eq!(image_aspect(Format::D32), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            image_aspect(Format::D24S8),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(image_aspect(Format::RGBA8_UNorm), vk::ImageAspectFlags::COLOR);
    }
}
