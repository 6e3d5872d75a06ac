/// Backend-agnostic pixel and texel formats
#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    #[default]
    Unknown,
    R8_UInt,
    R8_SInt,
    R8_UNorm,
    R8_SNorm,
    RG8_UInt,
    RG8_SInt,
    RG8_UNorm,
    RG8_SNorm,
    R16_UInt,
    R16_SInt,
    R16_UNorm,
    R16_SNorm,
    R16_Float,
    BGRA4_UNorm,
    B5G6R5_UNorm,
    B5G5R5A1_UNorm,
    RGBA8_UInt,
    RGBA8_SInt,
    RGBA8_UNorm,
    RGBA8_SNorm,
    BGRA8_UNorm,
    SRGBA8_UNorm,
    SBGRA8_UNorm,
    R10G10B10A2_UNorm,
    R11G11B10_Float,
    RG16_UInt,
    RG16_SInt,
    RG16_UNorm,
    RG16_SNorm,
    RG16_Float,
    R32_UInt,
    R32_SInt,
    R32_Float,
    RGBA16_UInt,
    RGBA16_SInt,
    RGBA16_UNorm,
    RGBA16_SNorm,
    RGBA16_Float,
    RG32_UInt,
    RG32_SInt,
    RG32_Float,
    RGB32_UInt,
    RGB32_SInt,
    RGB32_Float,
    RGBA32_UInt,
    RGBA32_SInt,
    RGBA32_Float,
    D16,
    D24S8,
    X24G8_UInt,
    D32,
    D32S8,
    X32G8_UInt,
    BC1_UNorm,
    BC1_UNorm_Srgb,
    BC2_UNorm,
    BC2_UNorm_Srgb,
    BC3_UNorm,
    BC3_UNorm_Srgb,
    BC4_UNorm,
    BC4_SNorm,
    BC5_UNorm,
    BC5_SNorm,
    BC6H_UFloat,
    BC6H_SFloat,
    BC7_UNorm,
    BC7_UNorm_Srgb,
}

/// Byte layout of one mip level of a surface
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub num_bytes: usize,
    pub row_bytes: usize,
    pub num_rows: usize,
}

impl Format {
    pub const ALL: &'static [Self] = &[
        Self::Unknown,
        Self::R8_UInt,
        Self::R8_SInt,
        Self::R8_UNorm,
        Self::R8_SNorm,
        Self::RG8_UInt,
        Self::RG8_SInt,
        Self::RG8_UNorm,
        Self::RG8_SNorm,
        Self::R16_UInt,
        Self::R16_SInt,
        Self::R16_UNorm,
        Self::R16_SNorm,
        Self::R16_Float,
        Self::BGRA4_UNorm,
        Self::B5G6R5_UNorm,
        Self::B5G5R5A1_UNorm,
        Self::RGBA8_UInt,
        Self::RGBA8_SInt,
        Self::RGBA8_UNorm,
        Self::RGBA8_SNorm,
        Self::BGRA8_UNorm,
        Self::SRGBA8_UNorm,
        Self::SBGRA8_UNorm,
        Self::R10G10B10A2_UNorm,
        Self::R11G11B10_Float,
        Self::RG16_UInt,
        Self::RG16_SInt,
        Self::RG16_UNorm,
        Self::RG16_SNorm,
        Self::RG16_Float,
        Self::R32_UInt,
        Self::R32_SInt,
        Self::R32_Float,
        Self::RGBA16_UInt,
        Self::RGBA16_SInt,
        Self::RGBA16_UNorm,
        Self::RGBA16_SNorm,
        Self::RGBA16_Float,
        Self::RG32_UInt,
        Self::RG32_SInt,
        Self::RG32_Float,
        Self::RGB32_UInt,
        Self::RGB32_SInt,
        Self::RGB32_Float,
        Self::RGBA32_UInt,
        Self::RGBA32_SInt,
        Self::RGBA32_Float,
        Self::D16,
        Self::D24S8,
        Self::X24G8_UInt,
        Self::D32,
        Self::D32S8,
        Self::X32G8_UInt,
        Self::BC1_UNorm,
        Self::BC1_UNorm_Srgb,
        Self::BC2_UNorm,
        Self::BC2_UNorm_Srgb,
        Self::BC3_UNorm,
        Self::BC3_UNorm_Srgb,
        Self::BC4_UNorm,
        Self::BC4_SNorm,
        Self::BC5_UNorm,
        Self::BC5_SNorm,
        Self::BC6H_UFloat,
        Self::BC6H_SFloat,
        Self::BC7_UNorm,
        Self::BC7_UNorm_Srgb,
    ];

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::D16 | Self::D24S8 | Self::X24G8_UInt | Self::D32 | Self::D32S8 | Self::X32G8_UInt
        )
    }

    pub fn is_stencil(self) -> bool {
        matches!(self, Self::D24S8 | Self::X24G8_UInt | Self::D32S8 | Self::X32G8_UInt)
    }

    pub fn is_depth_stencil(self) -> bool {
        self.is_depth() || self.is_stencil()
    }

    pub fn is_color(self) -> bool {
        !self.is_depth_stencil()
    }

    pub fn is_block_compressed(self) -> bool {
        self >= Self::BC1_UNorm
    }

    /// Storage views are only made for formats every device can write
    pub fn supports_storage(self, samples: u32) -> bool {
        samples <= 1 && self.is_color() && !self.is_block_compressed() && self.remove_srgb() == self
    }

    pub fn remove_srgb(self) -> Self {
        match self {
            Self::SRGBA8_UNorm => Self::RGBA8_UNorm,
            Self::SBGRA8_UNorm => Self::BGRA8_UNorm,
            Self::BC1_UNorm_Srgb => Self::BC1_UNorm,
            Self::BC2_UNorm_Srgb => Self::BC2_UNorm,
            Self::BC3_UNorm_Srgb => Self::BC3_UNorm,
            Self::BC7_UNorm_Srgb => Self::BC7_UNorm,
            other => other,
        }
    }

    pub fn bits_per_pixel(self) -> u32 {
        use Format::*;
        match self {
            RGBA32_Float | RGBA32_SInt | RGBA32_UInt => 128,
            RGB32_Float | RGB32_SInt | RGB32_UInt => 96,
            RGBA16_Float | RGBA16_SInt | RGBA16_SNorm | RGBA16_UInt | RGBA16_UNorm
            | RG32_Float | RG32_SInt | RG32_UInt | D32S8 | X32G8_UInt => 64,
            R10G10B10A2_UNorm | R11G11B10_Float | BGRA8_UNorm | RGBA8_SInt | RGBA8_SNorm
            | RGBA8_UInt | RGBA8_UNorm | SRGBA8_UNorm | SBGRA8_UNorm | RG16_Float | RG16_SInt
            | RG16_SNorm | RG16_UInt | RG16_UNorm | R32_Float | R32_SInt | R32_UInt | D32
            | D24S8 | X24G8_UInt => 32,
            RG8_SInt | RG8_SNorm | RG8_UInt | RG8_UNorm | R16_Float | R16_SInt | R16_SNorm
            | R16_UInt | R16_UNorm | BGRA4_UNorm | B5G5R5A1_UNorm | B5G6R5_UNorm | D16 => 16,
            R8_SInt | R8_SNorm | R8_UInt | R8_UNorm => 8,
            BC1_UNorm | BC1_UNorm_Srgb | BC4_UNorm | BC4_SNorm => 4,
            BC2_UNorm | BC2_UNorm_Srgb | BC3_UNorm | BC3_UNorm_Srgb | BC5_UNorm | BC5_SNorm
            | BC6H_SFloat | BC6H_UFloat | BC7_UNorm | BC7_UNorm_Srgb => 8,
            Unknown => 0,
        }
    }

    /// Bytes per pixel, or per 4x4 block for block-compressed formats
    pub fn block_size(self) -> u32 {
        use Format::*;
        match self {
            RGBA32_Float | RGBA32_SInt | RGBA32_UInt => 16,
            RGB32_Float | RGB32_SInt | RGB32_UInt => 12,
            RGBA16_Float | RGBA16_SInt | RGBA16_SNorm | RGBA16_UInt | RGBA16_UNorm
            | RG32_Float | RG32_SInt | RG32_UInt => 8,
            D32S8 | X32G8_UInt => 5,
            R10G10B10A2_UNorm | R11G11B10_Float | BGRA8_UNorm | SBGRA8_UNorm | RGBA8_SInt
            | RGBA8_SNorm | RGBA8_UInt | RGBA8_UNorm | SRGBA8_UNorm | RG16_Float | RG16_SInt
            | RG16_SNorm | RG16_UInt | RG16_UNorm | R32_Float | R32_SInt | R32_UInt | D32
            | D24S8 | X24G8_UInt => 4,
            RG8_SInt | RG8_SNorm | RG8_UInt | RG8_UNorm | R16_Float | R16_SInt | R16_SNorm
            | R16_UInt | R16_UNorm | BGRA4_UNorm | B5G5R5A1_UNorm | B5G6R5_UNorm | D16 => 2,
            R8_SInt | R8_SNorm | R8_UInt | R8_UNorm => 1,
            BC1_UNorm | BC1_UNorm_Srgb | BC4_UNorm | BC4_SNorm => 8,
            BC2_UNorm | BC2_UNorm_Srgb | BC3_UNorm | BC3_UNorm_Srgb | BC5_UNorm | BC5_SNorm
            | BC6H_SFloat | BC6H_UFloat | BC7_UNorm | BC7_UNorm_Srgb => 16,
            Unknown => 0,
        }
    }

    pub fn surface_info(self, width: usize, height: usize) -> SurfaceInfo {
        if self.is_block_compressed() {
            let blocks_wide = if width > 0 { ((width + 3) / 4).max(1) } else { 0 };
            let blocks_high = if height > 0 { ((height + 3) / 4).max(1) } else { 0 };
            let row_bytes = blocks_wide * self.block_size() as usize;
            SurfaceInfo {
                num_bytes: row_bytes * blocks_high,
                row_bytes,
                num_rows: blocks_high,
            }
        } else {
            let row_bytes = (width * self.bits_per_pixel() as usize + 7) / 8;
            SurfaceInfo {
                num_bytes: row_bytes * height,
                row_bytes,
                num_rows: height,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_and_stencil_classification() {
        assert!(Format::D32.is_depth());
        assert!(!Format::D32.is_stencil());
        assert!(Format::D24S8.is_stencil());
        assert!(Format::X32G8_UInt.is_depth_stencil());
        assert!(Format::RGBA8_UNorm.is_color());
    }

    #[test]
    fn srgb_removal_only_touches_srgb_formats() {
        assert_eq!(Format::SRGBA8_UNorm.remove_srgb(), Format::RGBA8_UNorm);
        assert_eq!(Format::BC7_UNorm_Srgb.remove_srgb(), Format::BC7_UNorm);
        assert_eq!(Format::R32_Float.remove_srgb(), Format::R32_Float);
    }

    #[test]
    fn surface_info_for_block_compressed_rounds_up_to_blocks() {
        let info = Format::BC1_UNorm.surface_info(5, 5);
        assert_eq!(info.row_bytes, 16);
        assert_eq!(info.num_rows, 2);
        assert_eq!(info.num_bytes, 32);

        let info = Format::RGBA8_UNorm.surface_info(256, 4);
        assert_eq!(info.row_bytes, 1024);
        assert_eq!(info.num_bytes, 4096);
    }

    #[test]
    fn all_lists_every_variant_in_order() {
        for (i, format) in Format::ALL.iter().enumerate() {
            assert_eq!(*format as usize, i);
        }
        assert_eq!(*Format::ALL.last().unwrap(), Format::BC7_UNorm_Srgb);
    }
}
