use crate::renderer::backend::dx12::device::Dx12Device;
use crate::renderer::backend::dx12::translate::{
    DepthStencilKey, PipelineKey, RasterizerKey, RenderTargetBlendKey, RootParameterKey, RootSignatureKey, SamplerKey,
    StencilOpKey, MAX_RENDER_TARGETS,
};
use crate::renderer::common::ShaderStage;
use crate::renderer::resources::shader::PipelineShaders;
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use windows::core::{Interface, PCSTR};
use windows::Win32::Foundation::BOOL;
use windows::Win32::Graphics::Direct3D::{ID3DBlob, D3D_PRIMITIVE_TOPOLOGY};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT, DXGI_SAMPLE_DESC};

pub struct Dx12RootSignature {
    pub root_signature: ID3D12RootSignature,
    pub key: RootSignatureKey,
}

// Root signatures are immutable once created
unsafe impl Send for Dx12RootSignature {}
unsafe impl Sync for Dx12RootSignature {}

fn static_sampler(sampler: &SamplerKey, register: u32, register_space: u32, visibility: u32) -> D3D12_STATIC_SAMPLER_DESC {
    D3D12_STATIC_SAMPLER_DESC {
        Filter: D3D12_FILTER(sampler.filter as i32),
        AddressU: D3D12_TEXTURE_ADDRESS_MODE(sampler.address_u as i32),
        AddressV: D3D12_TEXTURE_ADDRESS_MODE(sampler.address_v as i32),
        AddressW: D3D12_TEXTURE_ADDRESS_MODE(sampler.address_w as i32),
        MipLODBias: f32::from_bits(sampler.mip_lod_bias),
        MaxAnisotropy: sampler.max_anisotropy,
        ComparisonFunc: D3D12_COMPARISON_FUNC(sampler.comparison_func as i32),
        BorderColor: D3D12_STATIC_BORDER_COLOR(sampler.static_border_color as i32),
        MinLOD: f32::from_bits(sampler.min_lod),
        MaxLOD: f32::from_bits(sampler.max_lod),
        ShaderRegister: register,
        RegisterSpace: register_space,
        ShaderVisibility: D3D12_SHADER_VISIBILITY(visibility as i32),
    }
}

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}

impl Dx12RootSignature {
    pub fn new(device: &Dx12Device, key: &RootSignatureKey) -> Result<Self> {
        // Range arrays are referenced by pointer from the parameters below
        let ranges: Vec<Vec<D3D12_DESCRIPTOR_RANGE>> = key
            .parameters
            .iter()
            .map(|parameter| match parameter {
                RootParameterKey::Table { ranges, .. } => ranges
                    .iter()
                    .map(|range| D3D12_DESCRIPTOR_RANGE {
                        RangeType: D3D12_DESCRIPTOR_RANGE_TYPE(range.range_type as i32),
                        NumDescriptors: range.num_descriptors,
                        BaseShaderRegister: range.base_register,
                        RegisterSpace: range.register_space,
                        OffsetInDescriptorsFromTableStart: range.offset,
                    })
                    .collect(),
                _ => Vec::new(),
            })
            .collect();

        let parameters: Vec<D3D12_ROOT_PARAMETER> = key
            .parameters
            .iter()
            .zip(&ranges)
            .map(|(parameter, ranges)| match parameter {
                RootParameterKey::Constants { register, register_space, num_values, visibility } => D3D12_ROOT_PARAMETER {
                    ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
                    Anonymous: D3D12_ROOT_PARAMETER_0 {
                        Constants: D3D12_ROOT_CONSTANTS {
                            ShaderRegister: *register,
                            RegisterSpace: *register_space,
                            Num32BitValues: *num_values,
                        },
                    },
                    ShaderVisibility: D3D12_SHADER_VISIBILITY(*visibility as i32),
                },
                RootParameterKey::Descriptor { parameter_type, register, register_space, visibility } => D3D12_ROOT_PARAMETER {
                    ParameterType: D3D12_ROOT_PARAMETER_TYPE(*parameter_type as i32),
                    Anonymous: D3D12_ROOT_PARAMETER_0 {
                        Descriptor: D3D12_ROOT_DESCRIPTOR {
                            ShaderRegister: *register,
                            RegisterSpace: *register_space,
                        },
                    },
                    ShaderVisibility: D3D12_SHADER_VISIBILITY(*visibility as i32),
                },
                RootParameterKey::Table { visibility, .. } => D3D12_ROOT_PARAMETER {
                    ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                    Anonymous: D3D12_ROOT_PARAMETER_0 {
                        DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                            NumDescriptorRanges: ranges.len() as u32,
                            pDescriptorRanges: ranges.as_ptr(),
                        },
                    },
                    ShaderVisibility: D3D12_SHADER_VISIBILITY(*visibility as i32),
                },
            })
            .collect();

        let static_samplers: Vec<D3D12_STATIC_SAMPLER_DESC> = key
            .static_samplers
            .iter()
            .map(|s| static_sampler(&s.sampler, s.register, s.register_space, s.visibility))
            .collect();

        let desc = D3D12_ROOT_SIGNATURE_DESC {
            NumParameters: parameters.len() as u32,
            pParameters: parameters.as_ptr(),
            NumStaticSamplers: static_samplers.len() as u32,
            pStaticSamplers: static_samplers.as_ptr(),
            Flags: D3D12_ROOT_SIGNATURE_FLAGS(key.flags as i32),
        };

        let mut blob: Option<ID3DBlob> = None;
        let mut error: Option<ID3DBlob> = None;
        let serialized =
            unsafe { D3D12SerializeRootSignature(&desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut blob, Some(&mut error as *mut _)) };
        if let Err(e) = serialized {
            let message = error
                .as_ref()
                .map(|error| String::from_utf8_lossy(blob_bytes(error)).into_owned())
                .unwrap_or_default();
            bail!("failed to serialize root signature {}: {e} {message}", key.name);
        }
        let blob = blob.ok_or_else(|| eyre!("root signature {} serialized to nothing", key.name))?;
        let root_signature: ID3D12RootSignature = unsafe { device.device.CreateRootSignature(0, blob_bytes(&blob))? };
        log::debug!("Created root signature {} ({} parameters)", key.name, key.parameters.len());

        Ok(Self {
            root_signature,
            key: key.clone(),
        })
    }
}

pub struct Dx12Pipeline {
    pub pipeline: ID3D12PipelineState,
    pub topology: D3D_PRIMITIVE_TOPOLOGY,
    pub vertex_strides: Vec<(u32, u32)>,
}

unsafe impl Send for Dx12Pipeline {}
unsafe impl Sync for Dx12Pipeline {}

fn bytecode(shaders: &PipelineShaders, stage: ShaderStage) -> D3D12_SHADER_BYTECODE {
    match shaders.stages().find(|(s, _)| *s == stage) {
        Some((_, binding)) => D3D12_SHADER_BYTECODE {
            pShaderBytecode: binding.shader.bytes.as_ptr().cast(),
            BytecodeLength: binding.shader.bytes.len(),
        },
        None => D3D12_SHADER_BYTECODE::default(),
    }
}

fn blend_desc(key: &PipelineKey) -> D3D12_BLEND_DESC {
    let target = |rt: &RenderTargetBlendKey| D3D12_RENDER_TARGET_BLEND_DESC {
        BlendEnable: BOOL::from(rt.blend_enable),
        LogicOpEnable: BOOL::from(rt.logic_op_enable),
        SrcBlend: D3D12_BLEND(rt.src_blend as i32),
        DestBlend: D3D12_BLEND(rt.dst_blend as i32),
        BlendOp: D3D12_BLEND_OP(rt.blend_op as i32),
        SrcBlendAlpha: D3D12_BLEND(rt.src_blend_alpha as i32),
        DestBlendAlpha: D3D12_BLEND(rt.dst_blend_alpha as i32),
        BlendOpAlpha: D3D12_BLEND_OP(rt.blend_op_alpha as i32),
        LogicOp: D3D12_LOGIC_OP(rt.logic_op as i32),
        RenderTargetWriteMask: rt.write_mask,
    };
    D3D12_BLEND_DESC {
        AlphaToCoverageEnable: BOOL::from(key.alpha_to_coverage),
        IndependentBlendEnable: BOOL::from(key.independent_blend),
        RenderTarget: key.blend.each_ref().map(target),
    }
}

fn rasterizer_desc(key: &RasterizerKey) -> D3D12_RASTERIZER_DESC {
    D3D12_RASTERIZER_DESC {
        FillMode: D3D12_FILL_MODE(key.fill_mode as i32),
        CullMode: D3D12_CULL_MODE(key.cull_mode as i32),
        FrontCounterClockwise: BOOL::from(key.front_counter_clockwise),
        DepthBias: key.depth_bias,
        DepthBiasClamp: f32::from_bits(key.depth_bias_clamp),
        SlopeScaledDepthBias: f32::from_bits(key.slope_scaled_depth_bias),
        DepthClipEnable: BOOL::from(key.depth_clip_enable),
        MultisampleEnable: BOOL::from(key.multisample_enable),
        AntialiasedLineEnable: BOOL::from(key.antialiased_line_enable),
        ForcedSampleCount: key.forced_sample_count,
        ConservativeRaster: if key.conservative {
            D3D12_CONSERVATIVE_RASTERIZATION_MODE_ON
        } else {
            D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF
        },
    }
}

fn depth_stencil_desc(key: &DepthStencilKey) -> D3D12_DEPTH_STENCIL_DESC {
    let face = |op: &StencilOpKey| D3D12_DEPTH_STENCILOP_DESC {
        StencilFailOp: D3D12_STENCIL_OP(op.fail_op as i32),
        StencilDepthFailOp: D3D12_STENCIL_OP(op.depth_fail_op as i32),
        StencilPassOp: D3D12_STENCIL_OP(op.pass_op as i32),
        StencilFunc: D3D12_COMPARISON_FUNC(op.func as i32),
    };
    D3D12_DEPTH_STENCIL_DESC {
        DepthEnable: BOOL::from(key.depth_enable),
        DepthWriteMask: if key.depth_write_all { D3D12_DEPTH_WRITE_MASK_ALL } else { D3D12_DEPTH_WRITE_MASK_ZERO },
        DepthFunc: D3D12_COMPARISON_FUNC(key.depth_func as i32),
        StencilEnable: BOOL::from(key.stencil_enable),
        StencilReadMask: key.stencil_read_mask,
        StencilWriteMask: key.stencil_write_mask,
        FrontFace: face(&key.front),
        BackFace: face(&key.back),
    }
}

fn rtv_formats(key: &PipelineKey) -> [DXGI_FORMAT; MAX_RENDER_TARGETS] {
    let mut formats = [DXGI_FORMAT(0); MAX_RENDER_TARGETS];
    for (slot, format) in formats.iter_mut().zip(&key.rtv_formats) {
        *slot = DXGI_FORMAT(*format as i32);
    }
    formats
}

/// One entry of a pipeline state stream, pointer aligned
#[repr(C, align(8))]
struct Subobject<T> {
    kind: D3D12_PIPELINE_STATE_SUBOBJECT_TYPE,
    data: T,
}

impl<T> Subobject<T> {
    fn new(kind: D3D12_PIPELINE_STATE_SUBOBJECT_TYPE, data: T) -> Self {
        Self { kind, data }
    }
}

#[repr(C)]
struct MeshPipelineStream {
    root_signature: Subobject<ManuallyDrop<Option<ID3D12RootSignature>>>,
    amplification: Subobject<D3D12_SHADER_BYTECODE>,
    mesh: Subobject<D3D12_SHADER_BYTECODE>,
    pixel: Subobject<D3D12_SHADER_BYTECODE>,
    blend: Subobject<D3D12_BLEND_DESC>,
    sample_mask: Subobject<u32>,
    rasterizer: Subobject<D3D12_RASTERIZER_DESC>,
    depth_stencil: Subobject<D3D12_DEPTH_STENCIL_DESC>,
    topology_type: Subobject<D3D12_PRIMITIVE_TOPOLOGY_TYPE>,
    rtv_formats: Subobject<D3D12_RT_FORMAT_ARRAY>,
    dsv_format: Subobject<DXGI_FORMAT>,
    sample_desc: Subobject<DXGI_SAMPLE_DESC>,
}

impl Dx12Pipeline {
    pub fn new(
        device: &Arc<Dx12Device>,
        key: &PipelineKey,
        shaders: &PipelineShaders,
        root_signature: &Dx12RootSignature,
    ) -> Result<Self> {
        let pipeline = if key.compute {
            Self::create_compute(device, key, shaders, root_signature)?
        } else if key.mesh {
            if !device.mesh_shader {
                bail!("pipeline {} needs mesh shaders, which the device lacks", key.name);
            }
            Self::create_mesh(device, key, shaders, root_signature)?
        } else {
            Self::create_graphics(device, key, shaders, root_signature)?
        };

        let wide: Vec<u16> = key.name.encode_utf16().chain(std::iter::once(0)).collect();
        if let Err(e) = unsafe { pipeline.SetName(windows::core::PCWSTR(wide.as_ptr())) } {
            log::debug!("Failed to name {}: {e}", key.name);
        }

        Ok(Self {
            pipeline,
            topology: D3D_PRIMITIVE_TOPOLOGY(key.topology as i32),
            vertex_strides: key.vertex_strides.clone(),
        })
    }

    fn create_graphics(
        device: &Dx12Device,
        key: &PipelineKey,
        shaders: &PipelineShaders,
        root_signature: &Dx12RootSignature,
    ) -> Result<ID3D12PipelineState> {
        let semantic_names = key
            .input_elements
            .iter()
            .map(|element| CString::new(element.semantic_name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let input_elements: Vec<D3D12_INPUT_ELEMENT_DESC> = key
            .input_elements
            .iter()
            .zip(&semantic_names)
            .map(|(element, name)| D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(name.as_ptr().cast()),
                SemanticIndex: element.semantic_index,
                Format: DXGI_FORMAT(element.format as i32),
                InputSlot: element.input_slot,
                AlignedByteOffset: element.aligned_byte_offset,
                InputSlotClass: D3D12_INPUT_CLASSIFICATION(element.input_slot_class as i32),
                InstanceDataStepRate: element.instance_data_step_rate,
            })
            .collect();

        let desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: ManuallyDrop::new(Some(root_signature.root_signature.clone())),
            VS: bytecode(shaders, ShaderStage::VERTEX),
            PS: bytecode(shaders, ShaderStage::PIXEL),
            DS: bytecode(shaders, ShaderStage::DOMAIN),
            HS: bytecode(shaders, ShaderStage::HULL),
            GS: bytecode(shaders, ShaderStage::GEOMETRY),
            BlendState: blend_desc(key),
            SampleMask: key.sample_mask,
            RasterizerState: rasterizer_desc(&key.rasterizer),
            DepthStencilState: depth_stencil_desc(&key.depth_stencil),
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: input_elements.as_ptr(),
                NumElements: input_elements.len() as u32,
            },
            IBStripCutValue: D3D12_INDEX_BUFFER_STRIP_CUT_VALUE(key.strip_cut as i32),
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE(key.topology_type as i32),
            NumRenderTargets: key.rtv_formats.len() as u32,
            RTVFormats: rtv_formats(key),
            DSVFormat: DXGI_FORMAT(key.dsv_format as i32),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: key.sample_count,
                Quality: key.sample_quality,
            },
            ..Default::default()
        };
        let created = unsafe { device.device.CreateGraphicsPipelineState(&desc) };
        // Balances the clone held by the description
        drop(ManuallyDrop::into_inner(desc.pRootSignature));
        created.map_err(|e| eyre!("failed to create pipeline {}: {e}", key.name))
    }

    fn create_compute(
        device: &Dx12Device,
        key: &PipelineKey,
        shaders: &PipelineShaders,
        root_signature: &Dx12RootSignature,
    ) -> Result<ID3D12PipelineState> {
        let desc = D3D12_COMPUTE_PIPELINE_STATE_DESC {
            pRootSignature: ManuallyDrop::new(Some(root_signature.root_signature.clone())),
            CS: bytecode(shaders, ShaderStage::COMPUTE),
            ..Default::default()
        };
        let created = unsafe { device.device.CreateComputePipelineState(&desc) };
        drop(ManuallyDrop::into_inner(desc.pRootSignature));
        created.map_err(|e| eyre!("failed to create compute pipeline {}: {e}", key.name))
    }

    fn create_mesh(
        device: &Dx12Device,
        key: &PipelineKey,
        shaders: &PipelineShaders,
        root_signature: &Dx12RootSignature,
    ) -> Result<ID3D12PipelineState> {
        let device2: ID3D12Device2 = device.device.cast()?;
        let mut stream = MeshPipelineStream {
            root_signature: Subobject::new(
                D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_ROOT_SIGNATURE,
                ManuallyDrop::new(Some(root_signature.root_signature.clone())),
            ),
            amplification: Subobject::new(D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_AS, bytecode(shaders, ShaderStage::AMPLIFICATION)),
            mesh: Subobject::new(D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_MS, bytecode(shaders, ShaderStage::MESH)),
            pixel: Subobject::new(D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_PS, bytecode(shaders, ShaderStage::PIXEL)),
            blend: Subobject::new(D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_BLEND, blend_desc(key)),
            sample_mask: Subobject::new(D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_SAMPLE_MASK, key.sample_mask),
            rasterizer: Subobject::new(D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_RASTERIZER, rasterizer_desc(&key.rasterizer)),
            depth_stencil: Subobject::new(
                D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_DEPTH_STENCIL,
                depth_stencil_desc(&key.depth_stencil),
            ),
            topology_type: Subobject::new(
                D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_PRIMITIVE_TOPOLOGY,
                D3D12_PRIMITIVE_TOPOLOGY_TYPE(key.topology_type as i32),
            ),
            rtv_formats: Subobject::new(
                D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_RENDER_TARGET_FORMATS,
                D3D12_RT_FORMAT_ARRAY {
                    RTFormats: rtv_formats(key),
                    NumRenderTargets: key.rtv_formats.len() as u32,
                },
            ),
            dsv_format: Subobject::new(
                D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_DEPTH_STENCIL_FORMAT,
                DXGI_FORMAT(key.dsv_format as i32),
            ),
            sample_desc: Subobject::new(
                D3D12_PIPELINE_STATE_SUBOBJECT_TYPE_SAMPLE_DESC,
                DXGI_SAMPLE_DESC {
                    Count: key.sample_count,
                    Quality: key.sample_quality,
                },
            ),
        };

        let desc = D3D12_PIPELINE_STATE_STREAM_DESC {
            SizeInBytes: size_of::<MeshPipelineStream>(),
            pPipelineStateSubobjectStream: &mut stream as *mut MeshPipelineStream as *mut _,
        };
        let created = unsafe { device2.CreatePipelineState(&desc) };
        drop(ManuallyDrop::into_inner(stream.root_signature.data));
        created.map_err(|e| eyre!("failed to create mesh pipeline {}: {e}", key.name))
    }
}
