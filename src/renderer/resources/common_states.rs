//! Ready made fixed function and sampler states.
//!
//! Depth presets assume the engine's reversed depth convention: depth buffers
//! clear to 0 and nearer surfaces pass a greater-equal test. The `*_reversed`
//! variants flip back to a conventional less-equal test.

use crate::renderer::common::{
    Blend, BlendOp, ColorWrite, ComparisonFunc, CullMode, DepthWrite, FillMode, StaticBorderColor, TextureAddress,
    TextureFilter,
};
use crate::renderer::resources::pipeline_state::{
    BlendStateDesc, DepthStencilStateDesc, RasterizerStateDesc, RenderTargetBlendDesc,
};
use crate::renderer::resources::sampler::SamplerDesc;

impl BlendStateDesc {
    fn uniform(blend_enable: bool, src_blend: Blend, dst_blend: Blend, write_mask: ColorWrite) -> Self {
        let target = RenderTargetBlendDesc {
            blend_enable,
            src_blend,
            dst_blend,
            blend_op: BlendOp::Add,
            src_blend_alpha: Blend::One,
            dst_blend_alpha: Blend::InvSrcAlpha,
            blend_op_alpha: BlendOp::Add,
            write_mask,
            ..Default::default()
        };
        Self {
            alpha_to_coverage_enable: false,
            independent_blend_enable: false,
            render_target_blend: [target; 8],
        }
    }

    /// Blending off and colour writes masked, for depth only passes
    pub fn no_color_write() -> Self {
        Self::uniform(false, Blend::SrcAlpha, Blend::InvSrcAlpha, ColorWrite::empty())
    }

    pub fn disabled() -> Self {
        Self::uniform(false, Blend::SrcAlpha, Blend::InvSrcAlpha, ColorWrite::ALL)
    }

    /// `1, 1 - src.a`
    pub fn premultiplied() -> Self {
        Self::uniform(true, Blend::One, Blend::InvSrcAlpha, ColorWrite::ALL)
    }

    /// `src.a, 1 - src.a`
    pub fn traditional() -> Self {
        Self::uniform(true, Blend::SrcAlpha, Blend::InvSrcAlpha, ColorWrite::ALL)
    }

    /// `1, 1`
    pub fn additive() -> Self {
        Self::uniform(true, Blend::One, Blend::One, ColorWrite::ALL)
    }

    /// `src.a, 1`
    pub fn traditional_additive() -> Self {
        Self::uniform(true, Blend::SrcAlpha, Blend::One, ColorWrite::ALL)
    }
}

impl RasterizerStateDesc {
    /// Back face culling with counter-clockwise front faces
    pub fn default_ccw() -> Self {
        Self {
            front_counter_clockwise: true,
            ..Default::default()
        }
    }

    /// Back face culling with clockwise front faces
    pub fn default_cw() -> Self {
        Self::default()
    }

    pub fn two_sided() -> Self {
        Self {
            cull_mode: CullMode::None,
            ..Self::default_ccw()
        }
    }

    /// Negative bias for shadow map rendering with reversed depth
    pub fn shadow() -> Self {
        Self {
            depth_bias: -100,
            slope_scaled_depth_bias: -1.5,
            ..Self::default_ccw()
        }
    }

    pub fn shadow_cw() -> Self {
        Self {
            front_counter_clockwise: false,
            ..Self::shadow()
        }
    }

    pub fn wireframe() -> Self {
        Self {
            fill_mode: FillMode::Wireframe,
            cull_mode: CullMode::None,
            ..Self::default_ccw()
        }
    }
}

impl DepthStencilStateDesc {
    fn depth_only(depth_enable: bool, depth_write_mask: DepthWrite, depth_func: ComparisonFunc) -> Self {
        Self {
            depth_enable,
            depth_write_mask,
            depth_func,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self::depth_only(false, DepthWrite::Zero, ComparisonFunc::Always)
    }

    pub fn read_write() -> Self {
        Self::depth_only(true, DepthWrite::All, ComparisonFunc::GreaterEqual)
    }

    pub fn read_write_reversed() -> Self {
        Self::depth_only(true, DepthWrite::All, ComparisonFunc::LessEqual)
    }

    pub fn read_only() -> Self {
        Self::depth_only(true, DepthWrite::Zero, ComparisonFunc::GreaterEqual)
    }

    pub fn read_only_reversed() -> Self {
        Self::depth_only(true, DepthWrite::Zero, ComparisonFunc::Less)
    }

    /// Passes only where a prepass wrote the same depth
    pub fn test_equal() -> Self {
        Self::depth_only(true, DepthWrite::Zero, ComparisonFunc::Equal)
    }
}

impl SamplerDesc {
    fn preset(filter: TextureFilter, address: TextureAddress) -> Self {
        Self::default().with_filter(filter).with_address(address)
    }

    pub fn linear_wrap() -> Self {
        Self::preset(TextureFilter::MinMagMipLinear, TextureAddress::Wrap)
    }

    pub fn aniso_wrap() -> Self {
        Self::preset(TextureFilter::Anisotropic, TextureAddress::Wrap)
    }

    /// Comparison sampler for reversed depth shadow maps
    pub fn shadow() -> Self {
        Self::preset(TextureFilter::ComparisonMinMagLinearMipPoint, TextureAddress::Clamp)
            .with_comparison(ComparisonFunc::GreaterEqual)
    }

    pub fn linear_clamp() -> Self {
        Self::preset(TextureFilter::MinMagMipLinear, TextureAddress::Clamp)
    }

    pub fn volume_wrap() -> Self {
        Self::preset(TextureFilter::MinMagMipPoint, TextureAddress::Wrap)
    }

    pub fn point_wrap() -> Self {
        Self::preset(TextureFilter::MinMagMipPoint, TextureAddress::Wrap)
    }

    pub fn point_clamp() -> Self {
        Self::preset(TextureFilter::MinMagMipPoint, TextureAddress::Clamp)
    }

    pub fn point_border(border: StaticBorderColor) -> Self {
        Self {
            static_border_color: border,
            ..Self::preset(TextureFilter::MinMagMipPoint, TextureAddress::Border)
        }
    }

    pub fn linear_border(border: StaticBorderColor) -> Self {
        Self {
            static_border_color: border,
            ..Self::preset(TextureFilter::MinMagMipLinear, TextureAddress::Border)
        }
    }

    pub fn linear_mirror() -> Self {
        Self::preset(TextureFilter::MinMagMipLinear, TextureAddress::Mirror)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::common::FilterReduction;

    #[test]
    fn blend_presets_apply_to_every_target() {
        let additive = BlendStateDesc::additive();
        assert!(additive.render_target_blend.iter().all(|rt| rt.blend_enable && rt.dst_blend == Blend::One));
        assert_eq!(additive.target(5), additive.target(0));

        let traditional = BlendStateDesc::traditional();
        assert_eq!(
            (traditional.target(0).src_blend, traditional.target(0).dst_blend),
            (Blend::SrcAlpha, Blend::InvSrcAlpha)
        );
        assert_eq!(BlendStateDesc::premultiplied().target(0).src_blend, Blend::One);
        assert!(BlendStateDesc::no_color_write().target(0).write_mask.is_empty());
        assert!(!BlendStateDesc::disabled().target(0).blend_enable);
    }

    #[test]
    fn rasterizer_presets() {
        assert_eq!(RasterizerStateDesc::default_cw(), RasterizerStateDesc::default());
        assert!(RasterizerStateDesc::default_ccw().front_counter_clockwise);
        assert_eq!(RasterizerStateDesc::two_sided().cull_mode, CullMode::None);

        let shadow = RasterizerStateDesc::shadow();
        assert_eq!(shadow.depth_bias, -100);
        assert!(shadow.front_counter_clockwise);
        assert!(!RasterizerStateDesc::shadow_cw().front_counter_clockwise);
        assert_eq!(RasterizerStateDesc::shadow_cw().depth_bias, -100);

        let wireframe = RasterizerStateDesc::wireframe();
        assert_eq!((wireframe.fill_mode, wireframe.cull_mode), (FillMode::Wireframe, CullMode::None));
    }

    #[test]
    fn depth_presets_follow_reversed_depth() {
        let read_write = DepthStencilStateDesc::read_write();
        assert_eq!(read_write.depth_func, ComparisonFunc::GreaterEqual);
        assert_eq!(read_write.depth_write_mask, DepthWrite::All);
        assert_eq!(DepthStencilStateDesc::read_write_reversed().depth_func, ComparisonFunc::LessEqual);
        assert_eq!(DepthStencilStateDesc::read_only().depth_write_mask, DepthWrite::Zero);
        assert_eq!(DepthStencilStateDesc::test_equal().depth_func, ComparisonFunc::Equal);

        let disabled = DepthStencilStateDesc::disabled();
        assert!(!disabled.depth_enable && !disabled.stencil_enable);
    }

    #[test]
    fn sampler_presets() {
        let shadow = SamplerDesc::shadow();
        assert_eq!(shadow.filter.decompose().4, FilterReduction::Comparison);
        assert_eq!(shadow.comparison_func, ComparisonFunc::GreaterEqual);
        assert_eq!(shadow.address_u, TextureAddress::Clamp);

        let border = SamplerDesc::linear_border(StaticBorderColor::OpaqueBlack);
        assert_eq!((border.address_w, border.static_border_color), (TextureAddress::Border, StaticBorderColor::OpaqueBlack));
        assert_eq!(SamplerDesc::linear_mirror().address_v, TextureAddress::Mirror);
        assert_ne!(SamplerDesc::point_clamp(), SamplerDesc::linear_clamp());
        assert_eq!(SamplerDesc::point_wrap(), SamplerDesc::volume_wrap());
    }
}
