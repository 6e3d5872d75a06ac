use crate::renderer::common::DepthPlane;
use crate::renderer::resources::depth_buffer::DepthBuffer;
use crate::renderer::resources::descriptor_set::DescriptorSet;
use crate::renderer::resources::gpu_buffer::GpuBuffer;
use crate::renderer::resources::root_signature::{RootParameter, RootSignature};
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::GpuResource;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Every descriptor set a root signature needs, addressed by root parameter
#[derive(Debug)]
pub struct ResourceSet {
    root_signature: RootSignature,
    descriptor_sets: Vec<Option<DescriptorSet>>,
}

impl ResourceSet {
    pub fn new(root_signature: &RootSignature) -> Result<Self> {
        let mut descriptor_sets = Vec::new();
        for index in 0..root_signature.num_root_parameters() {
            let set = match root_signature.root_parameter(index) {
                Some(RootParameter::RootConstants { .. }) | None => None,
                Some(_) => Some(root_signature.create_descriptor_set(index)?),
            };
            descriptor_sets.push(set);
        }

        Ok(Self {
            root_signature: root_signature.clone(),
            descriptor_sets,
        })
    }

    pub fn root_signature(&self) -> &RootSignature {
        &self.root_signature
    }

    pub fn num_descriptor_sets(&self) -> usize {
        self.descriptor_sets.len()
    }

    pub fn descriptor_set(&self, root_param: u32) -> Option<&DescriptorSet> {
        self.descriptor_sets.get(root_param as usize)?.as_ref()
    }

    fn set_mut(&mut self, root_param: u32) -> Result<&mut DescriptorSet> {
        self.descriptor_sets
            .get_mut(root_param as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| eyre!("root parameter {root_param} has no descriptor set"))
    }

    pub fn set_srv(&mut self, root_param: u32, slot: u32, resource: &dyn GpuResource) -> Result<()> {
        self.set_mut(root_param)?.set_srv(slot, resource)
    }

    pub fn set_depth_srv(&mut self, root_param: u32, slot: u32, depth_buffer: &DepthBuffer, plane: DepthPlane) -> Result<()> {
        self.set_mut(root_param)?.set_depth_srv(slot, depth_buffer, plane)
    }

    pub fn set_uav(&mut self, root_param: u32, slot: u32, resource: &dyn GpuResource, mip: u32) -> Result<()> {
        self.set_mut(root_param)?.set_uav(slot, resource, mip)
    }

    pub fn set_cbv(&mut self, root_param: u32, slot: u32, buffer: &GpuBuffer) -> Result<()> {
        self.set_mut(root_param)?.set_cbv(slot, buffer)
    }

    pub fn set_sampler(&mut self, root_param: u32, slot: u32, sampler: &SamplerDesc) -> Result<()> {
        self.set_mut(root_param)?.set_sampler(slot, sampler)
    }

    pub fn set_dynamic_offset(&mut self, root_param: u32, offset: u32) -> Result<()> {
        self.set_mut(root_param)?.set_dynamic_offset(offset)
    }

    pub fn update_gpu_descriptors(&mut self) -> Result<()> {
        for set in self.descriptor_sets.iter_mut().flatten() {
            set.update_gpu_descriptors()?;
        }
        Ok(())
    }
}
