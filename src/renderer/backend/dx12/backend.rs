use crate::renderer::backend::dx12::device::{DescriptorHeap, Dx12Device};
use crate::renderer::backend::dx12::pipeline::{Dx12Pipeline, Dx12RootSignature};
use crate::renderer::backend::dx12::resource::{Dx12Buffer, Dx12Descriptor, Dx12Texture};
use crate::renderer::backend::dx12::translate::{self, PipelineKey, RootSignatureKey, MAX_ROOT_SIGNATURE_DWORDS};
use crate::renderer::backend::{Backend, DescriptorWrite, DeviceLimits};
use crate::renderer::common::{DepthPlane, DepthStencilAspect, GraphicsApi, CONSTANT_BUFFER_ALIGNMENT};
use crate::renderer::config::RenderConfig;
use crate::renderer::resources::color_buffer::ColorBufferDesc;
use crate::renderer::resources::depth_buffer::DepthBufferDesc;
use crate::renderer::resources::gpu_buffer::GpuBufferDesc;
use crate::renderer::resources::pipeline_state::{ComputePipelineDesc, GraphicsPipelineDesc, MeshletPipelineDesc};
use crate::renderer::resources::root_signature::{DescriptorSetLayout, RootSignatureDesc};
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::shader::PipelineShaders;
use color_eyre::eyre::bail;
use color_eyre::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use windows::Win32::Graphics::Direct3D12::{D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_GPU_DESCRIPTOR_HANDLE};

/// GPU visible home of one descriptor set
pub enum Dx12DescriptorStorage {
    /// Range of a shader visible heap, bound as a descriptor table
    Table {
        offset: u32,
        count: u32,
        sampler: bool,
        device: Arc<Dx12Device>,
    },
    /// Virtual address bound directly as a root CBV, SRV or UAV
    Root { address: AtomicU64 },
}

impl Dx12DescriptorStorage {
    fn heap(device: &Dx12Device, sampler: bool) -> &DescriptorHeap {
        if sampler { &device.gpu_sampler_heap } else { &device.gpu_view_heap }
    }

    /// Handle passed to `SetGraphicsRootDescriptorTable`
    pub fn gpu_handle(&self) -> Option<D3D12_GPU_DESCRIPTOR_HANDLE> {
        match self {
            Self::Table { offset, sampler, device, .. } => Some(Self::heap(device, *sampler).gpu(*offset)),
            Self::Root { .. } => None,
        }
    }

    /// Address passed to `SetGraphicsRootConstantBufferView` and friends
    pub fn root_address(&self) -> Option<u64> {
        match self {
            Self::Root { address } => Some(address.load(Ordering::Acquire)),
            Self::Table { .. } => None,
        }
    }
}

impl Drop for Dx12DescriptorStorage {
    fn drop(&mut self) {
        if let Self::Table { offset, count, sampler, device } = self {
            Self::heap(device, *sampler).free(*offset, *count);
        }
    }
}

pub struct Dx12Backend {
    device: Arc<Dx12Device>,
    limits: DeviceLimits,
}

impl Dx12Backend {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let device = Arc::new(Dx12Device::new(config)?);
        let limits = DeviceLimits {
            constant_buffer_alignment: CONSTANT_BUFFER_ALIGNMENT,
            storage_buffer_alignment: 16,
            max_push_constants_size: MAX_ROOT_SIGNATURE_DWORDS * 4,
        };
        log::debug!("Device limits: {limits:?}, mesh shaders: {}", device.mesh_shader);
        Ok(Self { device, limits })
    }

    pub fn device(&self) -> &Arc<Dx12Device> {
        &self.device
    }
}

impl Backend for Dx12Backend {
    type ColorBuffer = Dx12Texture;
    type DepthBuffer = Dx12Texture;
    type GpuBuffer = Dx12Buffer;
    type RootSignature = Dx12RootSignature;
    type Pipeline = Dx12Pipeline;
    type DescriptorStorage = Dx12DescriptorStorage;
    type Descriptor = Dx12Descriptor;
    type AttachmentView = D3D12_CPU_DESCRIPTOR_HANDLE;
    type RootSignatureKey = RootSignatureKey;
    type PipelineKey = PipelineKey;

    fn api(&self) -> GraphicsApi {
        GraphicsApi::Direct3D12
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_color_buffer(&self, desc: &ColorBufferDesc, initial_data: Option<&[u8]>) -> Result<Dx12Texture> {
        Dx12Texture::color(self.device.clone(), desc, initial_data)
    }

    fn create_depth_buffer(&self, desc: &DepthBufferDesc) -> Result<Dx12Texture> {
        Dx12Texture::depth(self.device.clone(), desc)
    }

    fn create_gpu_buffer(&self, desc: &GpuBufferDesc, element_size: u64, size: u64) -> Result<Dx12Buffer> {
        Dx12Buffer::new(self.device.clone(), desc, element_size, size)
    }

    fn update_gpu_buffer(&self, buffer: &Dx12Buffer, offset: u64, data: &[u8]) -> Result<()> {
        buffer.write(offset, data)
    }

    fn gpu_buffer_address(&self, buffer: &Dx12Buffer) -> u64 {
        buffer.address
    }

    fn color_buffer_srv(&self, buffer: &Dx12Texture) -> Dx12Descriptor {
        buffer.srv
    }

    fn color_buffer_uav(&self, buffer: &Dx12Texture, mip: u32) -> Option<Dx12Descriptor> {
        buffer.mip_uavs.get(mip as usize).copied()
    }

    fn depth_buffer_srv(&self, buffer: &Dx12Texture, plane: DepthPlane) -> Dx12Descriptor {
        match (plane, buffer.stencil_srv) {
            (DepthPlane::Depth, _) => buffer.srv,
            (DepthPlane::Stencil, Some(srv)) => srv,
            (DepthPlane::Stencil, None) => {
                log::warn!("Stencil plane requested from {:?}, which has none", buffer.format);
                buffer.srv
            }
        }
    }

    fn color_buffer_rtv(&self, buffer: &Dx12Texture) -> Option<D3D12_CPU_DESCRIPTOR_HANDLE> {
        buffer.rtv
    }

    fn depth_buffer_dsv(&self, buffer: &Dx12Texture, aspect: DepthStencilAspect) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        buffer.dsvs.get(aspect as usize).copied().unwrap_or_else(|| {
            log::warn!("{:?} has no depth stencil views", buffer.format);
            D3D12_CPU_DESCRIPTOR_HANDLE::default()
        })
    }

    fn gpu_buffer_srv(&self, buffer: &Dx12Buffer) -> Option<Dx12Descriptor> {
        Some(buffer.srv)
    }

    fn gpu_buffer_uav(&self, buffer: &Dx12Buffer) -> Option<Dx12Descriptor> {
        buffer.uav
    }

    fn gpu_buffer_cbv(&self, buffer: &Dx12Buffer) -> Option<Dx12Descriptor> {
        buffer.cbv
    }

    fn sampler(&self, desc: &SamplerDesc) -> Result<Dx12Descriptor> {
        let offset = self.device.sampler(desc)?;
        Ok(Dx12Descriptor {
            cpu: self.device.sampler_heap.cpu(offset).ptr,
            sampler: true,
            gpu_address: 0,
        })
    }

    fn translate_root_signature(&self, desc: &RootSignatureDesc) -> Result<RootSignatureKey> {
        translate::translate_root_signature(desc)
    }

    fn create_root_signature(&self, key: &RootSignatureKey) -> Result<Dx12RootSignature> {
        Dx12RootSignature::new(&self.device, key)
    }

    fn translate_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &RootSignatureKey,
    ) -> Result<PipelineKey> {
        translate::translate_graphics_pipeline(desc, shaders, root_signature)
    }

    fn translate_meshlet_pipeline(
        &self,
        desc: &MeshletPipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &RootSignatureKey,
    ) -> Result<PipelineKey> {
        translate::translate_meshlet_pipeline(desc, shaders, root_signature)
    }

    fn translate_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
        shaders: &PipelineShaders,
        root_signature: &RootSignatureKey,
    ) -> Result<PipelineKey> {
        translate::translate_compute_pipeline(desc, shaders, root_signature)
    }

    fn create_pipeline(
        &self,
        key: &PipelineKey,
        shaders: &PipelineShaders,
        root_signature: &Dx12RootSignature,
    ) -> Result<Dx12Pipeline> {
        log::debug!("Compiling pipeline {}", key.name);
        Dx12Pipeline::new(&self.device, key, shaders, root_signature)
    }

    fn create_descriptor_storage(
        &self,
        root_signature: &Dx12RootSignature,
        layout: &DescriptorSetLayout,
    ) -> Result<Dx12DescriptorStorage> {
        if layout.root_parameter as usize >= root_signature.key.parameters.len() {
            bail!(
                "root signature {} has no parameter {}",
                root_signature.key.name,
                layout.root_parameter
            );
        }
        if layout.is_root_buffer {
            return Ok(Dx12DescriptorStorage::Root {
                address: AtomicU64::new(0),
            });
        }

        let count = layout.num_descriptors();
        let sampler = layout.is_sampler_table;
        let offset = Dx12DescriptorStorage::heap(&self.device, sampler).allocate(count)?;
        Ok(Dx12DescriptorStorage::Table {
            offset,
            count,
            sampler,
            device: self.device.clone(),
        })
    }

    fn write_descriptors(
        &self,
        storage: &Dx12DescriptorStorage,
        writes: &[DescriptorWrite<'_, Dx12Descriptor>],
    ) -> Result<()> {
        match storage {
            Dx12DescriptorStorage::Root { address } => {
                // Only the last write of a root buffer is visible
                if let Some(write) = writes.last() {
                    address.store(write.descriptor.gpu_address, Ordering::Release);
                }
            }
            Dx12DescriptorStorage::Table { offset, count, sampler, device } => {
                let heap = Dx12DescriptorStorage::heap(device, *sampler);
                let source_heap = if *sampler { &device.sampler_heap } else { &device.view_heap };
                for write in writes {
                    if write.descriptor.sampler != *sampler {
                        bail!("slot {} mixes samplers and views in one table", write.slot);
                    }
                    if write.binding.heap_offset >= *count {
                        bail!("slot {} lands past the end of a {count} entry table", write.slot);
                    }
                    unsafe {
                        device.device.CopyDescriptorsSimple(
                            1,
                            heap.cpu(*offset + write.binding.heap_offset),
                            D3D12_CPU_DESCRIPTOR_HANDLE { ptr: write.descriptor.cpu },
                            source_heap.heap_type,
                        )
                    };
                }
            }
        }
        Ok(())
    }
}
