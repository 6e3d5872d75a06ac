use crate::renderer::backend::dx12::heap::HeapAllocator;
use crate::renderer::backend::dx12::translate::SamplerKey;
use crate::renderer::common::MAX_DESCRIPTORS_PER_TABLE;
use crate::renderer::config::RenderConfig;
use crate::renderer::resources::sampler::SamplerDesc;
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_12_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

const VIEW_HEAP_SIZE: u32 = 65536;
const SAMPLER_HEAP_SIZE: u32 = 2048;
const RENDER_TARGET_HEAP_SIZE: u32 = 4096;
const DEPTH_STENCIL_HEAP_SIZE: u32 = 1024;
/// Resource binding tier 1 limit
const MAX_SHADER_VISIBLE_VIEWS: usize = 1_000_000;

/// One descriptor heap and the allocator over its indices
pub struct DescriptorHeap {
    pub heap: ID3D12DescriptorHeap,
    pub heap_type: D3D12_DESCRIPTOR_HEAP_TYPE,
    increment: usize,
    cpu_start: usize,
    gpu_start: u64,
    allocator: Mutex<HeapAllocator>,
}

impl DescriptorHeap {
    fn new(device: &ID3D12Device, heap_type: D3D12_DESCRIPTOR_HEAP_TYPE, capacity: u32, shader_visible: bool) -> Result<Self> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type,
            NumDescriptors: capacity,
            Flags: if shader_visible {
                D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: 0,
        };
        let heap: ID3D12DescriptorHeap = unsafe { device.CreateDescriptorHeap(&desc)? };
        let increment = unsafe { device.GetDescriptorHandleIncrementSize(heap_type) } as usize;
        let cpu_start = unsafe { heap.GetCPUDescriptorHandleForHeapStart() }.ptr;
        let gpu_start = if shader_visible {
            unsafe { heap.GetGPUDescriptorHandleForHeapStart() }.ptr
        } else {
            0
        };
        Ok(Self {
            heap,
            heap_type,
            increment,
            cpu_start,
            gpu_start,
            allocator: Mutex::new(HeapAllocator::new(capacity)),
        })
    }

    pub fn allocate(&self, count: u32) -> Result<u32> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner).allocate(count)
    }

    pub fn free(&self, offset: u32, count: u32) {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner).free(offset, count);
    }

    pub fn cpu(&self, offset: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.cpu_start + offset as usize * self.increment,
        }
    }

    pub fn gpu(&self, offset: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: self.gpu_start + (offset as usize * self.increment) as u64,
        }
    }
}

/// CPU only heaps a resource's views are created in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewHeap {
    Resource,
    RenderTarget,
    DepthStencil,
}

/// Command list used to copy initial data, waited on before returning
struct UploadContext {
    allocator: ID3D12CommandAllocator,
    list: ID3D12GraphicsCommandList,
    fence: ID3D12Fence,
    fence_value: u64,
    event: HANDLE,
}

pub struct Dx12Device {
    pub device: ID3D12Device,
    pub queue: ID3D12CommandQueue,
    pub mesh_shader: bool,
    /// CPU only heaps the resource views live in
    pub view_heap: DescriptorHeap,
    pub sampler_heap: DescriptorHeap,
    pub rtv_heap: DescriptorHeap,
    pub dsv_heap: DescriptorHeap,
    /// Shader visible heaps descriptor tables are copied into
    pub gpu_view_heap: DescriptorHeap,
    pub gpu_sampler_heap: DescriptorHeap,

    upload: Mutex<UploadContext>,
    samplers: Mutex<HashMap<SamplerDesc, u32>>,
}

// D3D12 device, queue and heap interfaces are free threaded
unsafe impl Send for Dx12Device {}
unsafe impl Sync for Dx12Device {}

impl Dx12Device {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        if config.validation {
            let mut debug: Option<ID3D12Debug> = None;
            match unsafe { D3D12GetDebugInterface(&mut debug) } {
                Ok(()) => {
                    if let Some(debug) = debug {
                        unsafe { debug.EnableDebugLayer() };
                        log::info!("D3D12 debug layer enabled");
                    }
                }
                Err(e) => log::warn!("D3D12 debug layer requested, but not available: {e}"),
            }
        }

        let factory_flags = if config.validation { DXGI_CREATE_FACTORY_DEBUG } else { DXGI_CREATE_FACTORY_FLAGS(0) };
        let factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(factory_flags)? };
        let (adapter, name) = Self::select_adapter(&factory)?;
        log::info!("Using {name}");

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_12_0, &mut device)? };
        let device = device.ok_or_else(|| eyre!("D3D12CreateDevice returned no device"))?;

        let mut options7 = D3D12_FEATURE_DATA_D3D12_OPTIONS7::default();
        let mesh_shader = unsafe {
            device.CheckFeatureSupport(
                D3D12_FEATURE_D3D12_OPTIONS7,
                &mut options7 as *mut _ as *mut _,
                size_of::<D3D12_FEATURE_DATA_D3D12_OPTIONS7>() as u32,
            )
        }
        .is_ok()
            && options7.MeshShaderTier != D3D12_MESH_SHADER_TIER_NOT_SUPPORTED;

        let queue: ID3D12CommandQueue = unsafe {
            device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                ..Default::default()
            })?
        };

        let view_heap = DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, VIEW_HEAP_SIZE, false)?;
        let sampler_heap = DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER, SAMPLER_HEAP_SIZE, false)?;
        let rtv_heap = DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, RENDER_TARGET_HEAP_SIZE, false)?;
        let dsv_heap = DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, DEPTH_STENCIL_HEAP_SIZE, false)?;
        let gpu_views = (config.max_descriptor_sets * MAX_DESCRIPTORS_PER_TABLE).min(MAX_SHADER_VISIBLE_VIEWS) as u32;
        let gpu_view_heap = DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, gpu_views, true)?;
        let gpu_sampler_heap = DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER, SAMPLER_HEAP_SIZE, true)?;

        let allocator: ID3D12CommandAllocator = unsafe { device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)? };
        let list: ID3D12GraphicsCommandList = unsafe {
            device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &allocator, None::<&ID3D12PipelineState>)?
        };
        unsafe { list.Close()? };
        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE)? };
        let event = unsafe { CreateEventW(None, false, false, None)? };

        Ok(Self {
            device,
            queue,
            mesh_shader,
            view_heap,
            sampler_heap,
            rtv_heap,
            dsv_heap,
            gpu_view_heap,
            gpu_sampler_heap,
            upload: Mutex::new(UploadContext {
                allocator,
                list,
                fence,
                fence_value: 0,
                event,
            }),
            samplers: Mutex::new(HashMap::new()),
        })
    }

    fn select_adapter(factory: &IDXGIFactory4) -> Result<(IDXGIAdapter1, String)> {
        let mut software = None;
        for i in 0.. {
            let Ok(adapter) = (unsafe { factory.EnumAdapters1(i) }) else {
                break;
            };
            let desc = unsafe { adapter.GetDesc1()? };
            let name = String::from_utf16_lossy(&desc.Description)
                .trim_end_matches('\0')
                .to_string();

            let mut candidate: Option<ID3D12Device> = None;
            if unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_12_0, &mut candidate) }.is_err() {
                log::debug!("Skipping {name}, no feature level 12.0");
                continue;
            }
            if desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0 {
                software.get_or_insert((adapter, name));
                continue;
            }
            return Ok((adapter, name));
        }
        software.ok_or_else(|| eyre!("No Direct3D 12 adapter found"))
    }

    pub fn cpu_heap(&self, heap: ViewHeap) -> &DescriptorHeap {
        match heap {
            ViewHeap::Resource => &self.view_heap,
            ViewHeap::RenderTarget => &self.rtv_heap,
            ViewHeap::DepthStencil => &self.dsv_heap,
        }
    }

    /// Records `func` into the upload list, submits it and waits for completion
    pub fn immediate_submit<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(&ID3D12GraphicsCommandList) -> Result<()>,
    {
        let mut upload = self.upload.lock().unwrap_or_else(PoisonError::into_inner);
        unsafe {
            upload.allocator.Reset()?;
            upload.list.Reset(&upload.allocator, None::<&ID3D12PipelineState>)?;
        }
        let recorded = func(&upload.list);
        unsafe { upload.list.Close()? };
        recorded?;

        let list: ID3D12CommandList = upload.list.cast()?;
        upload.fence_value += 1;
        unsafe {
            self.queue.ExecuteCommandLists(&[Some(list)]);
            self.queue.Signal(&upload.fence, upload.fence_value)?;
            if upload.fence.GetCompletedValue() < upload.fence_value {
                upload.fence.SetEventOnCompletion(upload.fence_value, upload.event)?;
                WaitForSingleObject(upload.event, INFINITE);
            }
        }
        Ok(())
    }

    /// Sampler slot in the CPU sampler heap, created once per description
    pub fn sampler(&self, desc: &SamplerDesc) -> Result<u32> {
        let mut samplers = self.samplers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(offset) = samplers.get(desc) {
            return Ok(*offset);
        }

        let key = SamplerKey::new(desc);
        let native = D3D12_SAMPLER_DESC {
            Filter: D3D12_FILTER(key.filter as i32),
            AddressU: D3D12_TEXTURE_ADDRESS_MODE(key.address_u as i32),
            AddressV: D3D12_TEXTURE_ADDRESS_MODE(key.address_v as i32),
            AddressW: D3D12_TEXTURE_ADDRESS_MODE(key.address_w as i32),
            MipLODBias: desc.mip_lod_bias,
            MaxAnisotropy: key.max_anisotropy,
            ComparisonFunc: D3D12_COMPARISON_FUNC(key.comparison_func as i32),
            BorderColor: desc.border_color.to_array(),
            MinLOD: desc.min_lod,
            MaxLOD: desc.max_lod,
        };
        let offset = self.sampler_heap.allocate(1)?;
        unsafe { self.device.CreateSampler(&native, self.sampler_heap.cpu(offset)) };
        samplers.insert(*desc, offset);
        Ok(offset)
    }

    pub fn create_committed(
        &self,
        heap_type: D3D12_HEAP_TYPE,
        desc: &D3D12_RESOURCE_DESC,
        state: D3D12_RESOURCE_STATES,
        clear_value: Option<&D3D12_CLEAR_VALUE>,
        name: &str,
    ) -> Result<ID3D12Resource> {
        let heap_properties = D3D12_HEAP_PROPERTIES {
            Type: heap_type,
            ..Default::default()
        };
        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &heap_properties,
                D3D12_HEAP_FLAG_NONE,
                desc,
                state,
                clear_value.map(|v| v as *const _),
                &mut resource,
            )?
        };
        let Some(resource) = resource else {
            bail!("CreateCommittedResource returned no resource for {name}");
        };
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        if let Err(e) = unsafe { resource.SetName(windows::core::PCWSTR(wide.as_ptr())) } {
            log::debug!("Failed to name {name}: {e}");
        }
        Ok(resource)
    }
}

impl Drop for Dx12Device {
    fn drop(&mut self) {
        let upload = self.upload.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = unsafe { CloseHandle(upload.event) } {
            log::error!("Failed to close the upload event: {e}");
        }
        log::debug!("Destroyed D3D12 device");
    }
}
