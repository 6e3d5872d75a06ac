use crate::renderer::backend::vulkan::descriptor::{create_set_layout, descriptor_counts};
use crate::renderer::backend::vulkan::device::Device;
use crate::renderer::backend::vulkan::translate::{PipelineKey, PipelineLayoutKey, SetLayoutKey};
use crate::renderer::resources::shader::PipelineShaders;
use ash::vk;
use color_eyre::eyre::{bail, eyre, OptionExt};
use color_eyre::Result;
use gpu_descriptor::DescriptorSet;
use std::ffi::CString;
use std::sync::Arc;

/// Pipeline layout with its set layouts and the descriptor set of immutable samplers
pub struct VulkanRootSignature {
    pub layout: vk::PipelineLayout,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub key: PipelineLayoutKey,
    static_sampler_set: Option<DescriptorSet<vk::DescriptorSet>>,
    device: Arc<Device>,
}

impl VulkanRootSignature {
    pub fn new(device: Arc<Device>, key: &PipelineLayoutKey) -> Result<Self> {
        let mut this = Self {
            layout: vk::PipelineLayout::null(),
            set_layouts: Vec::with_capacity(key.set_layouts.len()),
            key: key.clone(),
            static_sampler_set: None,
            device,
        };

        for set_layout in &key.set_layouts {
            let set_layout = create_set_layout(&this.device, set_layout)?;
            this.set_layouts.push(set_layout);
        }

        let push_constant_ranges: Vec<vk::PushConstantRange> = key
            .push_constant_ranges()
            .iter()
            .map(|range| {
                vk::PushConstantRange::default()
                    .stage_flags(range.stages)
                    .offset(range.offset)
                    .size(range.size)
            })
            .collect();
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&this.set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        this.layout = unsafe { this.device.logical.create_pipeline_layout(&layout_info, None)? };

        if let Some(set) = key.static_sampler_set {
            let set_layout = this.set_layouts[set as usize];
            let counts = descriptor_counts(&key.set_layouts[set as usize]);
            this.static_sampler_set = Some(this.device.allocate_descriptor_set(set_layout, &counts)?);
        }
        Ok(this)
    }

    pub fn set_layout(&self, root_parameter: u32) -> Result<(vk::DescriptorSetLayout, &SetLayoutKey)> {
        let set = self
            .key
            .set_index(root_parameter)
            .ok_or_else(|| eyre!("root parameter {root_parameter} has no descriptor set"))?;
        Ok((self.set_layouts[set as usize], &self.key.set_layouts[set as usize]))
    }

    /// Set to bind at the trailing index for immutable samplers
    pub fn static_sampler_set(&self) -> Option<vk::DescriptorSet> {
        self.static_sampler_set.as_ref().map(|set| *set.raw())
    }
}

impl Drop for VulkanRootSignature {
    fn drop(&mut self) {
        if let Some(set) = self.static_sampler_set.take() {
            self.device.free_descriptor_set(set);
        }
        unsafe {
            if self.layout != vk::PipelineLayout::null() {
                self.device.logical.destroy_pipeline_layout(self.layout, None);
            }
            for set_layout in self.set_layouts.drain(..) {
                self.device.logical.destroy_descriptor_set_layout(set_layout, None);
            }
        }
    }
}

pub struct VulkanPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
    device: Arc<Device>,
}

impl VulkanPipeline {
    pub fn new(
        device: Arc<Device>,
        key: &PipelineKey,
        shaders: &PipelineShaders,
        root_signature: &VulkanRootSignature,
    ) -> Result<Self> {
        if key.mesh && !device.mesh_shader {
            bail!("pipeline {} needs mesh shaders, which the device does not support", key.name);
        }

        let modules = shaders
            .stages()
            .map(|(_, binding)| device.shader_module(&binding.shader))
            .collect::<Result<Vec<_>>>()?;
        let entry_names = shaders
            .stages()
            .map(|(_, binding)| CString::new(binding.entry.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let stages: Vec<vk::PipelineShaderStageCreateInfo<'_>> = key
            .stages
            .iter()
            .zip(&modules)
            .zip(&entry_names)
            .map(|((stage, module), name)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(*module)
                    .name(name)
            })
            .collect();

        if key.compute {
            let stage = stages
                .first()
                .copied()
                .ok_or_else(|| eyre!("compute pipeline {} has no compute shader", key.name))?;
            let pipeline_info = vk::ComputePipelineCreateInfo::default()
                .stage(stage)
                .layout(root_signature.layout);
            let pipeline = unsafe {
                device
                    .logical
                    .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                    .map_err(|(_, e)| eyre!("Failed to create compute pipeline {}: {e}", key.name))?
            }
            .into_iter()
            .next()
            .ok_or_eyre("driver returned no pipeline")?;
            return Ok(Self {
                pipeline,
                layout: root_signature.layout,
                bind_point: vk::PipelineBindPoint::COMPUTE,
                device,
            });
        }

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = key
            .vertex_bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: b.input_rate,
            })
            .collect();
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = key
            .vertex_attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: a.format,
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(key.topology)
            .primitive_restart_enable(key.primitive_restart);
        let tessellation = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(key.patch_control_points);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let raster = &key.rasterization;
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(raster.depth_clamp_enable)
            .rasterizer_discard_enable(false)
            .polygon_mode(raster.polygon_mode)
            .line_width(1.0)
            .cull_mode(raster.cull_mode)
            .front_face(raster.front_face)
            .depth_bias_enable(raster.depth_bias_enable)
            .depth_bias_constant_factor(raster.depth_bias_constant as f32)
            .depth_bias_clamp(f32::from_bits(raster.depth_bias_clamp))
            .depth_bias_slope_factor(f32::from_bits(raster.depth_bias_slope));

        let sample_mask = [key.sample_mask, u32::MAX];
        let mask_words = if key.samples == vk::SampleCountFlags::TYPE_64 { 2 } else { 1 };
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(key.samples)
            .sample_shading_enable(false)
            .min_sample_shading(1.0)
            .sample_mask(&sample_mask[..mask_words])
            .alpha_to_coverage_enable(key.alpha_to_coverage)
            .alpha_to_one_enable(false);

        let ds = &key.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(ds.depth_test_enable)
            .depth_write_enable(ds.depth_write_enable)
            .depth_compare_op(ds.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(ds.stencil_test_enable)
            .front(ds.front.to_vulkan())
            .back(ds.back.to_vulkan())
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let attachments: Vec<vk::PipelineColorBlendAttachmentState> =
            key.attachments.iter().map(|a| a.to_vulkan()).collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(key.logic_op_enable)
            .logic_op(key.logic_op)
            .attachments(&attachments);

        let dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::STENCIL_REFERENCE,
            vk::DynamicState::BLEND_CONSTANTS,
        ];
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&key.color_formats)
            .depth_attachment_format(key.depth_format)
            .stencil_attachment_format(key.stencil_format);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut rendering_info)
            .stages(&stages)
            .layout(root_signature.layout)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_info);
        if !key.mesh {
            pipeline_info = pipeline_info
                .vertex_input_state(&vertex_input)
                .input_assembly_state(&input_assembly);
        }
        if key.patch_control_points > 0 {
            pipeline_info = pipeline_info.tessellation_state(&tessellation);
        }

        let pipeline = unsafe {
            device
                .logical
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| eyre!("Failed to create pipeline {}: {e}", key.name))?
        }
        .into_iter()
        .next()
        .ok_or_eyre("driver returned no pipeline")?;

        Ok(Self {
            pipeline,
            layout: root_signature.layout,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            device,
        })
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe { self.device.logical.destroy_pipeline(self.pipeline, None) };
    }
}
