use crate::renderer::common::{ComparisonFunc, ShaderStage, StaticBorderColor, TextureAddress, TextureFilter};
use glam::Vec4;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    pub filter: TextureFilter,
    pub address_u: TextureAddress,
    pub address_v: TextureAddress,
    pub address_w: TextureAddress,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunc,
    pub border_color: Vec4,
    pub static_border_color: StaticBorderColor,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: TextureFilter::Anisotropic,
            address_u: TextureAddress::Wrap,
            address_v: TextureAddress::Wrap,
            address_w: TextureAddress::Wrap,
            mip_lod_bias: 0.0,
            max_anisotropy: 16,
            comparison_func: ComparisonFunc::None,
            border_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            static_border_color: StaticBorderColor::OpaqueWhite,
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl SamplerDesc {
    pub fn with_filter(mut self, filter: TextureFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_address(mut self, address: TextureAddress) -> Self {
        self.address_u = address;
        self.address_v = address;
        self.address_w = address;
        self
    }

    pub fn with_comparison(mut self, func: ComparisonFunc) -> Self {
        self.comparison_func = func;
        self
    }

    // Floats compared by bit pattern so the desc can key a hash map
    fn bits(&self) -> impl PartialEq + Hash {
        (
            self.filter,
            self.address_u,
            self.address_v,
            self.address_w,
            self.mip_lod_bias.to_bits(),
            self.max_anisotropy,
            self.comparison_func,
            self.border_color.to_array().map(f32::to_bits),
            self.static_border_color,
            self.min_lod.to_bits(),
            self.max_lod.to_bits(),
        )
    }
}

impl PartialEq for SamplerDesc {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for SamplerDesc {}

impl Hash for SamplerDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Sampler baked into a root signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticSamplerDesc {
    pub sampler: SamplerDesc,
    pub shader_register: u32,
    pub register_space: u32,
    pub shader_visibility: ShaderStage,
}

impl StaticSamplerDesc {
    pub fn new(shader_register: u32, sampler: SamplerDesc, shader_visibility: ShaderStage) -> Self {
        Self {
            sampler,
            shader_register,
            register_space: 0,
            shader_visibility,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equal_descs_hash_alike() {
        let a = SamplerDesc::default().with_address(TextureAddress::Clamp);
        let b = SamplerDesc::default().with_address(TextureAddress::Clamp);
        let c = SamplerDesc::default();

        let set: HashSet<SamplerDesc> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
