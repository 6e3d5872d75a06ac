use bytemuck::{Pod, Zeroable};
use color_eyre::Result;
use glam::{Mat4, Vec4};
use luna::renderer::common::{Format, ShaderStage};
use luna::renderer::config::RenderConfig;
use luna::renderer::resources::{
    ColorBuffer, ColorBufferDesc, DepthBuffer, DepthBufferDesc, DescriptorRange, GpuBuffer, GpuBufferDesc, ResourceSet,
    RootParameter, RootSignature, RootSignatureDesc, SamplerDesc,
};
use luna::renderer::GraphicsContext;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameConstants {
    view_projection: Mat4,
    tint: Vec4,
}

const SIZE: u32 = 256;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let config = RenderConfig::from_env();
    let ctx = GraphicsContext::new(&config)?;
    log::info!("Context ready: {ctx:?}, limits {:?}", ctx.manager().limits());

    let checker: Vec<u8> = (0..SIZE * SIZE)
        .flat_map(|i| {
            let on = ((i % SIZE) / 32 + (i / SIZE) / 32) % 2 == 0;
            if on { [255, 255, 255, 255] } else { [32, 32, 32, 255] }
        })
        .collect();
    let albedo = ColorBuffer::with_data(
        &ctx,
        &ColorBufferDesc::texture_2d("Checker", SIZE as u64, SIZE, Format::RGBA8_UNorm),
        Some(&checker),
    )?;
    let scene = ColorBuffer::new(
        &ctx,
        &ColorBufferDesc::texture_2d("Scene", 1280, 720, Format::RGBA16_Float).with_num_mips(0),
    )?;
    let depth = DepthBuffer::new(&ctx, &DepthBufferDesc::texture_2d("Scene depth", 1280, 720, Format::D32))?;
    log::info!(
        "Created {} ({} mips), {} and {}",
        scene.name(),
        scene.num_mips(),
        albedo.name(),
        depth.name()
    );

    let constants = GpuBuffer::new(
        &ctx,
        &GpuBufferDesc::constant_buffer("Frame constants", 3, size_of::<FrameConstants>()),
    )?;
    let frame = FrameConstants {
        view_projection: Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
        tint: Vec4::ONE,
    };
    constants.update_pod(0, &frame)?;

    let root_signature = RootSignature::new(
        &ctx,
        &RootSignatureDesc::new("Textured")
            .with_parameter(RootParameter::root_cbv(0, ShaderStage::ALL_GRAPHICS))
            .with_parameter(RootParameter::table(vec![DescriptorRange::texture_srv(0, 1)], ShaderStage::PIXEL))
            .with_parameter(RootParameter::table(vec![DescriptorRange::sampler(0, 1)], ShaderStage::PIXEL)),
    )?;

    let mut resources = ResourceSet::new(&root_signature)?;
    resources.set_cbv(0, 0, &constants)?;
    resources.set_srv(1, 0, &albedo)?;
    resources.set_sampler(2, 0, &SamplerDesc::aniso_wrap())?;
    resources.update_gpu_descriptors()?;

    // Second frame's constants, bound through the dynamic offset
    let stride = constants.size() / constants.element_count() as u64;
    constants.update_pod(stride, &frame)?;
    resources.set_dynamic_offset(0, stride as u32)?;
    resources.update_gpu_descriptors()?;

    log::info!(
        "Resource set with {} descriptor sets flushed, constants at {:#x}",
        resources.num_descriptor_sets(),
        constants.gpu_address()
    );
    Ok(())
}
