use crate::renderer::backend::dx12::device::{Dx12Device, ViewHeap};
use crate::renderer::backend::dx12::formats::{depth_resource_format, depth_srv_format, format_to_dxgi};
use crate::renderer::common::math::align_up;
use crate::renderer::common::{
    DepthPlane, DepthStencilAspect, Format, MemoryAccess, ResourceType, TextureDimension, CONSTANT_BUFFER_ALIGNMENT,
};
use crate::renderer::resources::color_buffer::ColorBufferDesc;
use crate::renderer::resources::depth_buffer::DepthBufferDesc;
use crate::renderer::resources::gpu_buffer::GpuBufferDesc;
use color_eyre::eyre::bail;
use color_eyre::Result;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT, DXGI_SAMPLE_DESC};

const DEFAULT_COMPONENT_MAPPING: u32 = 0x1688;

/// CPU descriptor handle of a view, or a root address for root buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dx12Descriptor {
    pub cpu: usize,
    pub sampler: bool,
    pub gpu_address: u64,
}

pub fn heap_type(memory_access: MemoryAccess) -> D3D12_HEAP_TYPE {
    if memory_access.contains(MemoryAccess::CPU_READ) {
        D3D12_HEAP_TYPE_READBACK
    } else if memory_access.is_cpu_visible() {
        D3D12_HEAP_TYPE_UPLOAD
    } else {
        D3D12_HEAP_TYPE_DEFAULT
    }
}

/// Upload and readback heaps fix the state a resource lives in
fn initial_state(heap: D3D12_HEAP_TYPE) -> D3D12_RESOURCE_STATES {
    match heap {
        D3D12_HEAP_TYPE_UPLOAD => D3D12_RESOURCE_STATE_GENERIC_READ,
        D3D12_HEAP_TYPE_READBACK => D3D12_RESOURCE_STATE_COPY_DEST,
        _ => D3D12_RESOURCE_STATE_COMMON,
    }
}

fn borrowed(resource: &ID3D12Resource) -> ManuallyDrop<Option<ID3D12Resource>> {
    // Copies the pointer without an extra reference, the barrier never outlives `resource`
    unsafe { std::mem::transmute_copy(resource) }
}

fn transition(resource: &ID3D12Resource, before: D3D12_RESOURCE_STATES, after: D3D12_RESOURCE_STATES) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: borrowed(resource),
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

fn texture_dimension(resource_type: ResourceType) -> Result<D3D12_RESOURCE_DIMENSION> {
    Ok(match resource_type.dimension() {
        Some(TextureDimension::Texture1D) => D3D12_RESOURCE_DIMENSION_TEXTURE1D,
        Some(TextureDimension::Texture2D) => D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        Some(TextureDimension::Texture3D) => D3D12_RESOURCE_DIMENSION_TEXTURE3D,
        None => bail!("{resource_type:?} is not a texture type"),
    })
}

struct TextureShape {
    resource_type: ResourceType,
    width: u64,
    height: u32,
    array_size_or_depth: u32,
    num_mips: u32,
    num_samples: u32,
}

impl TextureShape {
    fn resource_desc(&self, format: u32, flags: D3D12_RESOURCE_FLAGS) -> Result<D3D12_RESOURCE_DESC> {
        let dimension = texture_dimension(self.resource_type)?;
        let count = self.array_size_or_depth.max(1);
        if self.resource_type.intersects(ResourceType::TEXTURE_CUBE_TYPE) && count % 6 != 0 {
            bail!("cube textures need a multiple of six faces, got {count}");
        }
        Ok(D3D12_RESOURCE_DESC {
            Dimension: dimension,
            Alignment: 0,
            Width: self.width,
            Height: if dimension == D3D12_RESOURCE_DIMENSION_TEXTURE1D { 1 } else { self.height },
            DepthOrArraySize: u16::try_from(count)?,
            MipLevels: u16::try_from(self.num_mips.max(1))?,
            Format: DXGI_FORMAT(format as i32),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: self.num_samples.max(1),
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: flags,
        })
    }

    fn layers(&self) -> u32 {
        if self.resource_type.contains(ResourceType::TEXTURE_3D) {
            1
        } else {
            self.array_size_or_depth.max(1)
        }
    }

    fn srv_desc(&self, format: u32, plane: u32) -> D3D12_SHADER_RESOURCE_VIEW_DESC {
        let mips = self.num_mips.max(1);
        let layers = self.array_size_or_depth.max(1);
        let rt = self.resource_type;
        let (dimension, anonymous) = if rt.contains(ResourceType::TEXTURE_1D) {
            (
                D3D12_SRV_DIMENSION_TEXTURE1D,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture1D: D3D12_TEX1D_SRV { MostDetailedMip: 0, MipLevels: mips, ResourceMinLODClamp: 0.0 },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_1D_ARRAY) {
            (
                D3D12_SRV_DIMENSION_TEXTURE1DARRAY,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture1DArray: D3D12_TEX1D_ARRAY_SRV {
                        MostDetailedMip: 0,
                        MipLevels: mips,
                        FirstArraySlice: 0,
                        ArraySize: layers,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_2D_MS) {
            (
                D3D12_SRV_DIMENSION_TEXTURE2DMS,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 { Texture2DMS: D3D12_TEX2DMS_SRV::default() },
            )
        } else if rt.contains(ResourceType::TEXTURE_2D_MS_ARRAY) {
            (
                D3D12_SRV_DIMENSION_TEXTURE2DMSARRAY,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2DMSArray: D3D12_TEX2DMS_ARRAY_SRV { FirstArraySlice: 0, ArraySize: layers },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_2D_ARRAY) {
            (
                D3D12_SRV_DIMENSION_TEXTURE2DARRAY,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2DArray: D3D12_TEX2D_ARRAY_SRV {
                        MostDetailedMip: 0,
                        MipLevels: mips,
                        FirstArraySlice: 0,
                        ArraySize: layers,
                        PlaneSlice: plane,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_CUBE) {
            (
                D3D12_SRV_DIMENSION_TEXTURECUBE,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    TextureCube: D3D12_TEXCUBE_SRV { MostDetailedMip: 0, MipLevels: mips, ResourceMinLODClamp: 0.0 },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_CUBE_ARRAY) {
            (
                D3D12_SRV_DIMENSION_TEXTURECUBEARRAY,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    TextureCubeArray: D3D12_TEXCUBE_ARRAY_SRV {
                        MostDetailedMip: 0,
                        MipLevels: mips,
                        First2DArrayFace: 0,
                        NumCubes: layers / 6,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_3D) {
            (
                D3D12_SRV_DIMENSION_TEXTURE3D,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture3D: D3D12_TEX3D_SRV { MostDetailedMip: 0, MipLevels: mips, ResourceMinLODClamp: 0.0 },
                },
            )
        } else {
            (
                D3D12_SRV_DIMENSION_TEXTURE2D,
                D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2D: D3D12_TEX2D_SRV {
                        MostDetailedMip: 0,
                        MipLevels: mips,
                        PlaneSlice: plane,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            )
        };
        D3D12_SHADER_RESOURCE_VIEW_DESC {
            Format: DXGI_FORMAT(format as i32),
            ViewDimension: dimension,
            Shader4ComponentMapping: DEFAULT_COMPONENT_MAPPING,
            Anonymous: anonymous,
        }
    }

    fn rtv_desc(&self, format: u32) -> D3D12_RENDER_TARGET_VIEW_DESC {
        let layers = self.array_size_or_depth.max(1);
        let rt = self.resource_type;
        let (dimension, anonymous) = if rt.contains(ResourceType::TEXTURE_1D) {
            (
                D3D12_RTV_DIMENSION_TEXTURE1D,
                D3D12_RENDER_TARGET_VIEW_DESC_0 { Texture1D: D3D12_TEX1D_RTV { MipSlice: 0 } },
            )
        } else if rt.contains(ResourceType::TEXTURE_1D_ARRAY) {
            (
                D3D12_RTV_DIMENSION_TEXTURE1DARRAY,
                D3D12_RENDER_TARGET_VIEW_DESC_0 {
                    Texture1DArray: D3D12_TEX1D_ARRAY_RTV { MipSlice: 0, FirstArraySlice: 0, ArraySize: layers },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_2D_MS) {
            (
                D3D12_RTV_DIMENSION_TEXTURE2DMS,
                D3D12_RENDER_TARGET_VIEW_DESC_0 { Texture2DMS: D3D12_TEX2DMS_RTV::default() },
            )
        } else if rt.contains(ResourceType::TEXTURE_2D_MS_ARRAY) {
            (
                D3D12_RTV_DIMENSION_TEXTURE2DMSARRAY,
                D3D12_RENDER_TARGET_VIEW_DESC_0 {
                    Texture2DMSArray: D3D12_TEX2DMS_ARRAY_RTV { FirstArraySlice: 0, ArraySize: layers },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_3D) {
            (
                D3D12_RTV_DIMENSION_TEXTURE3D,
                D3D12_RENDER_TARGET_VIEW_DESC_0 {
                    Texture3D: D3D12_TEX3D_RTV { MipSlice: 0, FirstWSlice: 0, WSize: u32::MAX },
                },
            )
        } else if rt.intersects(ResourceType::TEXTURE_2D_ARRAY | ResourceType::TEXTURE_CUBE_TYPE) {
            (
                D3D12_RTV_DIMENSION_TEXTURE2DARRAY,
                D3D12_RENDER_TARGET_VIEW_DESC_0 {
                    Texture2DArray: D3D12_TEX2D_ARRAY_RTV {
                        MipSlice: 0,
                        FirstArraySlice: 0,
                        ArraySize: layers,
                        PlaneSlice: 0,
                    },
                },
            )
        } else {
            (
                D3D12_RTV_DIMENSION_TEXTURE2D,
                D3D12_RENDER_TARGET_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_RTV { MipSlice: 0, PlaneSlice: 0 } },
            )
        };
        D3D12_RENDER_TARGET_VIEW_DESC {
            Format: DXGI_FORMAT(format as i32),
            ViewDimension: dimension,
            Anonymous: anonymous,
        }
    }

    fn dsv_desc(&self, format: u32, flags: D3D12_DSV_FLAGS) -> D3D12_DEPTH_STENCIL_VIEW_DESC {
        let layers = self.array_size_or_depth.max(1);
        let rt = self.resource_type;
        let (dimension, anonymous) = if rt.contains(ResourceType::TEXTURE_1D) {
            (
                D3D12_DSV_DIMENSION_TEXTURE1D,
                D3D12_DEPTH_STENCIL_VIEW_DESC_0 { Texture1D: D3D12_TEX1D_DSV { MipSlice: 0 } },
            )
        } else if rt.contains(ResourceType::TEXTURE_1D_ARRAY) {
            (
                D3D12_DSV_DIMENSION_TEXTURE1DARRAY,
                D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                    Texture1DArray: D3D12_TEX1D_ARRAY_DSV { MipSlice: 0, FirstArraySlice: 0, ArraySize: layers },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_2D_MS) {
            (
                D3D12_DSV_DIMENSION_TEXTURE2DMS,
                D3D12_DEPTH_STENCIL_VIEW_DESC_0 { Texture2DMS: D3D12_TEX2DMS_DSV::default() },
            )
        } else if rt.contains(ResourceType::TEXTURE_2D_MS_ARRAY) {
            (
                D3D12_DSV_DIMENSION_TEXTURE2DMSARRAY,
                D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                    Texture2DMSArray: D3D12_TEX2DMS_ARRAY_DSV { FirstArraySlice: 0, ArraySize: layers },
                },
            )
        } else if rt.intersects(ResourceType::TEXTURE_2D_ARRAY | ResourceType::TEXTURE_CUBE_TYPE) {
            (
                D3D12_DSV_DIMENSION_TEXTURE2DARRAY,
                D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                    Texture2DArray: D3D12_TEX2D_ARRAY_DSV { MipSlice: 0, FirstArraySlice: 0, ArraySize: layers },
                },
            )
        } else {
            (
                D3D12_DSV_DIMENSION_TEXTURE2D,
                D3D12_DEPTH_STENCIL_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_DSV { MipSlice: 0 } },
            )
        };
        D3D12_DEPTH_STENCIL_VIEW_DESC {
            Format: DXGI_FORMAT(format as i32),
            ViewDimension: dimension,
            Flags: flags,
            Anonymous: anonymous,
        }
    }

    fn uav_desc(&self, format: u32, mip: u32) -> D3D12_UNORDERED_ACCESS_VIEW_DESC {
        let layers = self.array_size_or_depth.max(1);
        let rt = self.resource_type;
        let (dimension, anonymous) = if rt.contains(ResourceType::TEXTURE_1D) {
            (
                D3D12_UAV_DIMENSION_TEXTURE1D,
                D3D12_UNORDERED_ACCESS_VIEW_DESC_0 { Texture1D: D3D12_TEX1D_UAV { MipSlice: mip } },
            )
        } else if rt.contains(ResourceType::TEXTURE_1D_ARRAY) {
            (
                D3D12_UAV_DIMENSION_TEXTURE1DARRAY,
                D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture1DArray: D3D12_TEX1D_ARRAY_UAV { MipSlice: mip, FirstArraySlice: 0, ArraySize: layers },
                },
            )
        } else if rt.contains(ResourceType::TEXTURE_3D) {
            (
                D3D12_UAV_DIMENSION_TEXTURE3D,
                D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture3D: D3D12_TEX3D_UAV { MipSlice: mip, FirstWSlice: 0, WSize: u32::MAX },
                },
            )
        } else if rt.intersects(ResourceType::TEXTURE_2D_ARRAY | ResourceType::TEXTURE_CUBE_TYPE) {
            // Cube maps are written as 2D arrays
            (
                D3D12_UAV_DIMENSION_TEXTURE2DARRAY,
                D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture2DArray: D3D12_TEX2D_ARRAY_UAV {
                        MipSlice: mip,
                        FirstArraySlice: 0,
                        ArraySize: layers,
                        PlaneSlice: 0,
                    },
                },
            )
        } else {
            (
                D3D12_UAV_DIMENSION_TEXTURE2D,
                D3D12_UNORDERED_ACCESS_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_UAV { MipSlice: mip, PlaneSlice: 0 } },
            )
        };
        D3D12_UNORDERED_ACCESS_VIEW_DESC {
            Format: DXGI_FORMAT(format as i32),
            ViewDimension: dimension,
            Anonymous: anonymous,
        }
    }
}

/// Offsets into the device's CPU heaps, released when the owner drops
struct ViewSlots {
    slots: Vec<(ViewHeap, u32)>,
    device: Arc<Dx12Device>,
}

impl ViewSlots {
    fn new(device: Arc<Dx12Device>) -> Self {
        Self { slots: Vec::new(), device }
    }

    fn next(&mut self, heap: ViewHeap) -> Result<D3D12_CPU_DESCRIPTOR_HANDLE> {
        let offset = self.device.cpu_heap(heap).allocate(1)?;
        self.slots.push((heap, offset));
        Ok(self.device.cpu_heap(heap).cpu(offset))
    }
}

impl Drop for ViewSlots {
    fn drop(&mut self) {
        for (heap, offset) in self.slots.drain(..) {
            self.device.cpu_heap(heap).free(offset, 1);
        }
    }
}

/// Colour or depth texture in its own committed heap
pub struct Dx12Texture {
    pub resource: ID3D12Resource,
    pub format: Format,
    pub srv: Dx12Descriptor,
    pub stencil_srv: Option<Dx12Descriptor>,
    /// One per mip when the texture allows unordered access
    pub mip_uavs: Vec<Dx12Descriptor>,
    pub rtv: Option<D3D12_CPU_DESCRIPTOR_HANDLE>,
    /// Indexed by `DepthStencilAspect`, stencil variants alias depth ones without a stencil plane
    pub dsvs: Vec<D3D12_CPU_DESCRIPTOR_HANDLE>,

    _views: ViewSlots,
}

// D3D12 resources are free threaded
unsafe impl Send for Dx12Texture {}
unsafe impl Sync for Dx12Texture {}

impl Dx12Texture {
    pub fn color(device: Arc<Dx12Device>, desc: &ColorBufferDesc, initial_data: Option<&[u8]>) -> Result<Self> {
        let shape = TextureShape {
            resource_type: desc.resource_type,
            width: desc.width,
            height: desc.height,
            array_size_or_depth: desc.array_size_or_depth,
            num_mips: desc.num_mips,
            num_samples: desc.num_samples,
        };
        let format = format_to_dxgi(desc.format);
        let storage = desc.format.supports_storage(desc.num_samples);
        let render_target = !desc.format.is_block_compressed();

        let mut flags = D3D12_RESOURCE_FLAG_NONE;
        if render_target {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
        }
        if storage {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }
        let resource_desc = shape.resource_desc(format, flags)?;
        let clear_value = D3D12_CLEAR_VALUE {
            Format: DXGI_FORMAT(format as i32),
            Anonymous: D3D12_CLEAR_VALUE_0 {
                Color: desc.clear_color.to_array(),
            },
        };
        let resource = device.create_committed(
            D3D12_HEAP_TYPE_DEFAULT,
            &resource_desc,
            D3D12_RESOURCE_STATE_COMMON,
            render_target.then_some(&clear_value),
            &desc.name,
        )?;

        let mut views = ViewSlots::new(device.clone());
        let handle = views.next(ViewHeap::Resource)?;
        unsafe {
            device
                .device
                .CreateShaderResourceView(&resource, Some(&shape.srv_desc(format, 0) as *const _), handle)
        };
        let srv = Dx12Descriptor { cpu: handle.ptr, sampler: false, gpu_address: 0 };

        let mut mip_uavs = Vec::new();
        if storage {
            for mip in 0..shape.num_mips.max(1) {
                let handle = views.next(ViewHeap::Resource)?;
                unsafe {
                    device.device.CreateUnorderedAccessView(
                        &resource,
                        None::<&ID3D12Resource>,
                        Some(&shape.uav_desc(format, mip) as *const _),
                        handle,
                    )
                };
                mip_uavs.push(Dx12Descriptor { cpu: handle.ptr, sampler: false, gpu_address: 0 });
            }
        }

        let rtv = if render_target {
            let handle = views.next(ViewHeap::RenderTarget)?;
            unsafe {
                device
                    .device
                    .CreateRenderTargetView(&resource, Some(&shape.rtv_desc(format) as *const _), handle)
            };
            Some(handle)
        } else {
            None
        };

        let texture = Self {
            resource,
            format: desc.format,
            srv,
            stencil_srv: None,
            mip_uavs,
            rtv,
            dsvs: Vec::new(),
            _views: views,
        };
        if let Some(data) = initial_data {
            texture.upload(&device, &shape, &resource_desc, data)?;
        }
        Ok(texture)
    }

    pub fn depth(device: Arc<Dx12Device>, desc: &DepthBufferDesc) -> Result<Self> {
        if !desc.format.is_depth() {
            bail!("depth buffer {} uses non-depth format {:?}", desc.name, desc.format);
        }
        let shape = TextureShape {
            resource_type: desc.resource_type,
            width: desc.width,
            height: desc.height,
            array_size_or_depth: desc.array_size_or_depth,
            num_mips: desc.num_mips,
            num_samples: desc.num_samples,
        };
        let resource_desc = shape.resource_desc(depth_resource_format(desc.format), D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL)?;
        let clear_value = D3D12_CLEAR_VALUE {
            Format: DXGI_FORMAT(format_to_dxgi(desc.format) as i32),
            Anonymous: D3D12_CLEAR_VALUE_0 {
                DepthStencil: D3D12_DEPTH_STENCIL_VALUE {
                    Depth: desc.clear_depth,
                    Stencil: desc.clear_stencil,
                },
            },
        };
        let resource = device.create_committed(
            D3D12_HEAP_TYPE_DEFAULT,
            &resource_desc,
            D3D12_RESOURCE_STATE_DEPTH_WRITE,
            Some(&clear_value),
            &desc.name,
        )?;

        let mut views = ViewSlots::new(device.clone());
        let mut plane_view = |plane: DepthPlane, slice: u32| -> Result<Dx12Descriptor> {
            let handle = views.next(ViewHeap::Resource)?;
            let srv = shape.srv_desc(depth_srv_format(desc.format, plane), slice);
            unsafe { device.device.CreateShaderResourceView(&resource, Some(&srv as *const _), handle) };
            Ok(Dx12Descriptor { cpu: handle.ptr, sampler: false, gpu_address: 0 })
        };
        let srv = plane_view(DepthPlane::Depth, 0)?;
        let has_stencil = desc.format.is_stencil();
        let stencil_srv = if has_stencil {
            Some(plane_view(DepthPlane::Stencil, 1)?)
        } else {
            None
        };

        let dsv_format = format_to_dxgi(desc.format);
        let mut dsvs: Vec<D3D12_CPU_DESCRIPTOR_HANDLE> = Vec::with_capacity(DepthStencilAspect::ALL.len());
        for aspect in DepthStencilAspect::ALL {
            let resolved = aspect.resolve(has_stencil);
            if resolved != aspect {
                dsvs.push(dsvs[resolved as usize]);
                continue;
            }
            let mut flags = D3D12_DSV_FLAG_NONE;
            if aspect.depth_read_only() {
                flags |= D3D12_DSV_FLAG_READ_ONLY_DEPTH;
            }
            if aspect.stencil_read_only() {
                flags |= D3D12_DSV_FLAG_READ_ONLY_STENCIL;
            }
            let handle = views.next(ViewHeap::DepthStencil)?;
            let dsv = shape.dsv_desc(dsv_format, flags);
            unsafe { device.device.CreateDepthStencilView(&resource, Some(&dsv as *const _), handle) };
            dsvs.push(handle);
        }

        Ok(Self {
            resource,
            format: desc.format,
            srv,
            stencil_srv,
            mip_uavs: Vec::new(),
            rtv: None,
            dsvs,
            _views: views,
        })
    }

    /// Fills mip 0 of every layer from tightly packed `data` and leaves the texture shader readable
    fn upload(&self, device: &Dx12Device, shape: &TextureShape, resource_desc: &D3D12_RESOURCE_DESC, data: &[u8]) -> Result<()> {
        let mips = shape.num_mips.max(1);
        let layers = shape.layers();
        let mut footprints = vec![D3D12_PLACED_SUBRESOURCE_FOOTPRINT::default(); layers as usize];
        let mut total = 0u64;

        // Mip 0 of layer n is subresource n * mips, so footprints come one layer at a time
        let mut offset = 0u64;
        for (layer, footprint) in footprints.iter_mut().enumerate() {
            let mut size = 0u64;
            unsafe {
                device.device.GetCopyableFootprints(
                    resource_desc,
                    layer as u32 * mips,
                    1,
                    offset,
                    Some(footprint as *mut _),
                    None,
                    None,
                    Some(&mut size as *mut _),
                )
            };
            offset = align_up(offset + size, D3D12_TEXTURE_DATA_PLACEMENT_ALIGNMENT as u64);
            total = offset;
        }

        let surface = self.format.surface_info(shape.width as usize, shape.height as usize);
        let depth = if shape.resource_type.contains(ResourceType::TEXTURE_3D) {
            shape.array_size_or_depth.max(1) as usize
        } else {
            1
        };
        let slice_bytes = surface.num_bytes * depth;
        if data.len() < slice_bytes * layers as usize {
            bail!(
                "initial data holds {} bytes, {} layers of {slice_bytes} bytes expected",
                data.len(),
                layers
            );
        }

        let staging = Dx12Buffer::staging(device, total)?;
        let mapped = staging.map()?;
        for (layer, footprint) in footprints.iter().enumerate() {
            let source = &data[layer * slice_bytes..][..slice_bytes];
            let pitch = footprint.Footprint.RowPitch as usize;
            for row in 0..surface.num_rows * depth {
                let src = &source[row * surface.row_bytes..][..surface.row_bytes];
                let dst = footprint.Offset as usize + row * pitch;
                unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), mapped.add(dst), src.len()) };
            }
        }
        unsafe { staging.Unmap(0, None) };

        device.immediate_submit(|list| {
            unsafe {
                list.ResourceBarrier(&[transition(&self.resource, D3D12_RESOURCE_STATE_COMMON, D3D12_RESOURCE_STATE_COPY_DEST)]);
                for (layer, footprint) in footprints.iter().enumerate() {
                    let dst = D3D12_TEXTURE_COPY_LOCATION {
                        pResource: borrowed(&self.resource),
                        Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
                        Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                            SubresourceIndex: layer as u32 * mips,
                        },
                    };
                    let src = D3D12_TEXTURE_COPY_LOCATION {
                        pResource: borrowed(&staging),
                        Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
                        Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { PlacedFootprint: *footprint },
                    };
                    list.CopyTextureRegion(&dst, 0, 0, 0, &src, None);
                }
                list.ResourceBarrier(&[transition(
                    &self.resource,
                    D3D12_RESOURCE_STATE_COPY_DEST,
                    D3D12_RESOURCE_STATE_ALL_SHADER_RESOURCE,
                )]);
            }
            Ok(())
        })
    }
}

/// Buffer in its own committed heap with views made up front
pub struct Dx12Buffer {
    pub resource: ID3D12Resource,
    pub size: u64,
    pub element_size: u64,
    pub resource_type: ResourceType,
    pub address: u64,
    pub srv: Dx12Descriptor,
    pub uav: Option<Dx12Descriptor>,
    pub cbv: Option<Dx12Descriptor>,
    heap: D3D12_HEAP_TYPE,

    _views: ViewSlots,
}

unsafe impl Send for Dx12Buffer {}
unsafe impl Sync for Dx12Buffer {}

impl Dx12Buffer {
    fn resource_desc(size: u64, flags: D3D12_RESOURCE_FLAGS) -> D3D12_RESOURCE_DESC {
        D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Alignment: 0,
            Width: size.max(1),
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: DXGI_FORMAT(0),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            Flags: flags,
        }
    }

    /// Bare upload heap resource used as a copy source
    fn staging(device: &Dx12Device, size: u64) -> Result<ID3D12Resource> {
        device.create_committed(
            D3D12_HEAP_TYPE_UPLOAD,
            &Self::resource_desc(size, D3D12_RESOURCE_FLAG_NONE),
            D3D12_RESOURCE_STATE_GENERIC_READ,
            None,
            "Staging",
        )
    }

    pub fn new(device: Arc<Dx12Device>, desc: &GpuBufferDesc, element_size: u64, size: u64) -> Result<Self> {
        let heap = heap_type(desc.memory_access);
        let unordered = desc.resource_type.intersects(ResourceType::UNORDERED_ACCESS_TYPE) && heap == D3D12_HEAP_TYPE_DEFAULT;
        let flags = if unordered { D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS } else { D3D12_RESOURCE_FLAG_NONE };
        let resource = device.create_committed(heap, &Self::resource_desc(size, flags), initial_state(heap), None, &desc.name)?;
        let address = unsafe { resource.GetGPUVirtualAddress() };

        let mut views = ViewSlots::new(device.clone());
        let element_count = if element_size > 0 { size / element_size } else { 0 };
        let raw = desc.resource_type.contains(ResourceType::BYTE_ADDRESS_BUFFER);
        let typed = desc.resource_type.contains(ResourceType::TYPED_BUFFER) && desc.format != Format::Unknown;
        let (view_format, first, count, stride) = if raw {
            (dxgi_r32_typeless(), 0, (size / 4) as u32, 0)
        } else if typed {
            (format_to_dxgi(desc.format), 0, element_count as u32, 0)
        } else {
            (0, 0, element_count as u32, element_size as u32)
        };

        let handle = views.next(ViewHeap::Resource)?;
        let srv_desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
            Format: DXGI_FORMAT(view_format as i32),
            ViewDimension: D3D12_SRV_DIMENSION_BUFFER,
            Shader4ComponentMapping: DEFAULT_COMPONENT_MAPPING,
            Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Buffer: D3D12_BUFFER_SRV {
                    FirstElement: first,
                    NumElements: count,
                    StructureByteStride: stride,
                    Flags: if raw { D3D12_BUFFER_SRV_FLAG_RAW } else { D3D12_BUFFER_SRV_FLAG_NONE },
                },
            },
        };
        unsafe { device.device.CreateShaderResourceView(&resource, Some(&srv_desc as *const _), handle) };
        let srv = Dx12Descriptor { cpu: handle.ptr, sampler: false, gpu_address: address };

        let uav = if unordered {
            let handle = views.next(ViewHeap::Resource)?;
            let uav_desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                Format: DXGI_FORMAT(view_format as i32),
                ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Buffer: D3D12_BUFFER_UAV {
                        FirstElement: first,
                        NumElements: count,
                        StructureByteStride: stride,
                        CounterOffsetInBytes: 0,
                        Flags: if raw { D3D12_BUFFER_UAV_FLAG_RAW } else { D3D12_BUFFER_UAV_FLAG_NONE },
                    },
                },
            };
            unsafe {
                device
                    .device
                    .CreateUnorderedAccessView(&resource, None::<&ID3D12Resource>, Some(&uav_desc as *const _), handle)
            };
            Some(Dx12Descriptor { cpu: handle.ptr, sampler: false, gpu_address: address })
        } else {
            None
        };

        let cbv = if desc.resource_type.contains(ResourceType::CONSTANT_BUFFER) {
            let handle = views.next(ViewHeap::Resource)?;
            let cbv_desc = D3D12_CONSTANT_BUFFER_VIEW_DESC {
                BufferLocation: address,
                SizeInBytes: u32::try_from(align_up(element_size, CONSTANT_BUFFER_ALIGNMENT))?,
            };
            unsafe { device.device.CreateConstantBufferView(Some(&cbv_desc as *const _), handle) };
            Some(Dx12Descriptor { cpu: handle.ptr, sampler: false, gpu_address: address })
        } else {
            None
        };

        let buffer = Self {
            resource,
            size,
            element_size,
            resource_type: desc.resource_type,
            address,
            srv,
            uav,
            cbv,
            heap,
            _views: views,
        };
        if let Some(data) = &desc.initial_data {
            if heap == D3D12_HEAP_TYPE_DEFAULT {
                buffer.upload(&device, data)?;
            } else {
                buffer.write(0, data)?;
            }
        }
        Ok(buffer)
    }

    /// Copies `data` into the upload heap at `offset`
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > self.size {
            bail!("write of {} bytes at {offset} overruns a {} byte buffer", data.len(), self.size);
        }
        if self.heap == D3D12_HEAP_TYPE_DEFAULT {
            bail!("buffer memory is not host visible");
        }
        let mapped = self.resource.map()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
            self.resource.Unmap(0, None);
        }
        Ok(())
    }

    fn upload(&self, device: &Dx12Device, data: &[u8]) -> Result<()> {
        let staging = Self::staging(device, data.len() as u64)?;
        let mapped = staging.map()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
            staging.Unmap(0, None);
        }

        device.immediate_submit(|list| {
            unsafe {
                list.ResourceBarrier(&[transition(&self.resource, D3D12_RESOURCE_STATE_COMMON, D3D12_RESOURCE_STATE_COPY_DEST)]);
                list.CopyBufferRegion(&self.resource, 0, &staging, 0, data.len() as u64);
                list.ResourceBarrier(&[transition(
                    &self.resource,
                    D3D12_RESOURCE_STATE_COPY_DEST,
                    D3D12_RESOURCE_STATE_GENERIC_READ,
                )]);
            }
            Ok(())
        })
    }
}

fn dxgi_r32_typeless() -> u32 {
    crate::renderer::backend::dx12::formats::dxgi::R32_TYPELESS
}

trait MapResource {
    fn map(&self) -> Result<*mut u8>;
}

impl MapResource for ID3D12Resource {
    fn map(&self) -> Result<*mut u8> {
        let mut ptr = std::ptr::null_mut();
        // Nothing is read back through this mapping
        let read = D3D12_RANGE { Begin: 0, End: 0 };
        unsafe { self.Map(0, Some(&read as *const _), Some(&mut ptr as *mut _))? };
        if ptr.is_null() {
            bail!("Map returned a null pointer");
        }
        Ok(ptr.cast())
    }
}
