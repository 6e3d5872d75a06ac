use crate::renderer::common::{
    APPEND_REGISTER, DescriptorClass, DescriptorType, MAX_DESCRIPTORS_PER_TABLE,
    MAX_ROOT_PARAMETERS, RootSignatureFlags, ShaderStage,
};
use crate::renderer::handle::ResourceHandle;
use crate::renderer::resources::descriptor_set::DescriptorSet;
use crate::renderer::resources::sampler::StaticSamplerDesc;
use crate::renderer::GraphicsContext;
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub descriptor_type: DescriptorType,
    pub start_register: u32,
    pub num_descriptors: u32,
    pub register_space: u32,
}

impl DescriptorRange {
    pub fn new(descriptor_type: DescriptorType, start_register: u32, num_descriptors: u32) -> Self {
        Self {
            descriptor_type,
            start_register,
            num_descriptors,
            register_space: 0,
        }
    }

    pub fn constant_buffer(start_register: u32, num_descriptors: u32) -> Self {
        Self::new(DescriptorType::ConstantBuffer, start_register, num_descriptors)
    }

    pub fn texture_srv(start_register: u32, num_descriptors: u32) -> Self {
        Self::new(DescriptorType::TextureSRV, start_register, num_descriptors)
    }

    pub fn texture_uav(start_register: u32, num_descriptors: u32) -> Self {
        Self::new(DescriptorType::TextureUAV, start_register, num_descriptors)
    }

    pub fn structured_buffer_srv(start_register: u32, num_descriptors: u32) -> Self {
        Self::new(DescriptorType::StructuredBufferSRV, start_register, num_descriptors)
    }

    pub fn structured_buffer_uav(start_register: u32, num_descriptors: u32) -> Self {
        Self::new(DescriptorType::StructuredBufferUAV, start_register, num_descriptors)
    }

    pub fn sampler(start_register: u32, num_descriptors: u32) -> Self {
        Self::new(DescriptorType::Sampler, start_register, num_descriptors)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootParameter {
    RootConstants {
        register: u32,
        register_space: u32,
        num_32bit_constants: u32,
        visibility: ShaderStage,
    },
    RootCbv {
        register: u32,
        register_space: u32,
        visibility: ShaderStage,
    },
    RootSrv {
        register: u32,
        register_space: u32,
        visibility: ShaderStage,
    },
    RootUav {
        register: u32,
        register_space: u32,
        visibility: ShaderStage,
    },
    Table {
        ranges: Vec<DescriptorRange>,
        visibility: ShaderStage,
    },
}

impl RootParameter {
    pub fn root_constants(register: u32, num_32bit_constants: u32, visibility: ShaderStage) -> Self {
        Self::RootConstants { register, register_space: 0, num_32bit_constants, visibility }
    }

    pub fn root_cbv(register: u32, visibility: ShaderStage) -> Self {
        Self::RootCbv { register, register_space: 0, visibility }
    }

    pub fn root_srv(register: u32, visibility: ShaderStage) -> Self {
        Self::RootSrv { register, register_space: 0, visibility }
    }

    pub fn root_uav(register: u32, visibility: ShaderStage) -> Self {
        Self::RootUav { register, register_space: 0, visibility }
    }

    /// Table holding a single range
    pub fn range(
        descriptor_type: DescriptorType,
        start_register: u32,
        num_descriptors: u32,
        visibility: ShaderStage,
    ) -> Self {
        Self::table(vec![DescriptorRange::new(descriptor_type, start_register, num_descriptors)], visibility)
    }

    pub fn table(ranges: Vec<DescriptorRange>, visibility: ShaderStage) -> Self {
        Self::Table { ranges, visibility }
    }

    pub fn visibility(&self) -> ShaderStage {
        match self {
            Self::RootConstants { visibility, .. }
            | Self::RootCbv { visibility, .. }
            | Self::RootSrv { visibility, .. }
            | Self::RootUav { visibility, .. }
            | Self::Table { visibility, .. } => *visibility,
        }
    }

    pub fn is_root_buffer(&self) -> bool {
        matches!(self, Self::RootCbv { .. } | Self::RootSrv { .. } | Self::RootUav { .. })
    }

    pub fn is_sampler_table(&self) -> bool {
        match self {
            Self::Table { ranges, .. } => ranges
                .first()
                .is_some_and(|range| range.descriptor_type == DescriptorType::Sampler),
            _ => false,
        }
    }

    /// Number of table descriptors, zero for everything but tables
    pub fn num_descriptors(&self) -> u32 {
        match self {
            Self::Table { ranges, .. } => ranges.iter().fold(0, |n, r| n.saturating_add(r.num_descriptors)),
            _ => 0,
        }
    }

    /// Checks table homogeneity and that every register stays inside its class's binding range
    pub fn validate(&self, offsets: &BindingOffsets) -> Result<()> {
        let ranges = match self {
            Self::RootConstants { register, .. } | Self::RootCbv { register, .. } => {
                return offsets.check_registers(DescriptorClass::ConstantBuffer, *register, 1);
            }
            Self::RootSrv { register, .. } => {
                return offsets.check_registers(DescriptorClass::ShaderResource, *register, 1);
            }
            Self::RootUav { register, .. } => {
                return offsets.check_registers(DescriptorClass::UnorderedAccess, *register, 1);
            }
            Self::Table { ranges, .. } => ranges,
        };

        if ranges.is_empty() {
            bail!("descriptor table has no ranges");
        }

        let is_sampler_table = self.is_sampler_table();
        for (i, range) in ranges.iter().enumerate() {
            if (range.descriptor_type == DescriptorType::Sampler) != is_sampler_table {
                bail!("descriptor table range {i} mixes sampler and non-sampler descriptors");
            }
            if range.num_descriptors == 0 {
                bail!("descriptor table range {i} has no descriptors");
            }
        }

        ranges
            .iter()
            .try_fold(0u32, |total, range| total.checked_add(range.num_descriptors))
            .filter(|total| *total as usize <= MAX_DESCRIPTORS_PER_TABLE)
            .ok_or_else(|| eyre!("descriptor table holds more than {MAX_DESCRIPTORS_PER_TABLE} descriptors"))?;

        let registers = resolve_registers(ranges)?;
        for (i, (range, register)) in ranges.iter().zip(&registers).enumerate() {
            let class = range.descriptor_type.class();
            offsets
                .check_registers(class, *register, range.num_descriptors)
                .map_err(|e| eyre!("descriptor table range {i}: {e}"))?;

            let end = register + range.num_descriptors;
            let overlap = ranges.iter().zip(&registers).take(i).position(|(other, start)| {
                other.descriptor_type.class() == class && *start < end && *register < start + other.num_descriptors
            });
            if let Some(j) = overlap {
                bail!("descriptor table ranges {j} and {i} bind the same {class:?} registers");
            }
        }
        Ok(())
    }

    /// Slot layout of the descriptor set bound at this parameter, `None` for root constants
    pub fn descriptor_set_layout(&self, root_parameter: u32, offsets: &BindingOffsets) -> Option<DescriptorSetLayout> {
        let root_slot = |descriptor_type: DescriptorType, register: u32, register_space: u32| SlotBinding {
            descriptor_type,
            shader_register: register,
            register_space,
            binding: register.saturating_add(offsets.offset(descriptor_type.class())),
            array_element: 0,
            heap_offset: 0,
            dynamic: true,
        };

        let slots = match self {
            Self::RootConstants { .. } => return None,
            Self::RootCbv { register, register_space, .. } => {
                vec![root_slot(DescriptorType::ConstantBuffer, *register, *register_space)]
            }
            Self::RootSrv { register, register_space, .. } => {
                vec![root_slot(DescriptorType::StructuredBufferSRV, *register, *register_space)]
            }
            Self::RootUav { register, register_space, .. } => {
                vec![root_slot(DescriptorType::StructuredBufferUAV, *register, *register_space)]
            }
            Self::Table { ranges, .. } => {
                let registers = resolve_registers(ranges).ok()?;
                let mut slots = Vec::new();
                for (range, register) in ranges.iter().zip(registers) {
                    for element in 0..range.num_descriptors {
                        slots.push(SlotBinding {
                            descriptor_type: range.descriptor_type,
                            shader_register: register,
                            register_space: range.register_space,
                            binding: register.saturating_add(offsets.offset(range.descriptor_type.class())),
                            array_element: element,
                            heap_offset: slots.len() as u32,
                            dynamic: range.descriptor_type == DescriptorType::DynamicConstantBuffer,
                        });
                    }
                }
                slots
            }
        };

        Some(DescriptorSetLayout {
            root_parameter,
            visibility: self.visibility(),
            is_root_buffer: self.is_root_buffer(),
            is_sampler_table: self.is_sampler_table(),
            slots,
        })
    }
}

/// Partition of the Vulkan binding number space by register class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingOffsets {
    pub shader_resource: u32,
    pub sampler: u32,
    pub constant_buffer: u32,
    pub unordered_access: u32,
}

impl Default for BindingOffsets {
    fn default() -> Self {
        Self {
            shader_resource: 0,
            sampler: 128,
            constant_buffer: 256,
            unordered_access: 384,
        }
    }
}

impl BindingOffsets {
    pub fn offset(&self, class: DescriptorClass) -> u32 {
        match class {
            DescriptorClass::ShaderResource => self.shader_resource,
            DescriptorClass::Sampler => self.sampler,
            DescriptorClass::ConstantBuffer => self.constant_buffer,
            DescriptorClass::UnorderedAccess => self.unordered_access,
        }
    }

    fn all(&self) -> [u32; 4] {
        [self.shader_resource, self.sampler, self.constant_buffer, self.unordered_access]
    }

    /// Registers of `class` that fit before the next class's range, `None` for the last range
    pub fn width(&self, class: DescriptorClass) -> Option<u32> {
        let start = self.offset(class);
        self.all()
            .into_iter()
            .filter(|offset| *offset > start)
            .min()
            .map(|next| next - start)
    }

    pub fn validate(&self) -> Result<()> {
        let mut offsets = self.all();
        offsets.sort_unstable();
        if offsets.windows(2).any(|pair| pair[0] == pair[1]) {
            bail!("binding offsets {self:?} give two register classes the same range");
        }
        Ok(())
    }

    /// Fails unless registers `register..register + count` of `class` map to distinct bindings
    pub fn check_registers(&self, class: DescriptorClass, register: u32, count: u32) -> Result<()> {
        let end = register
            .checked_add(count)
            .filter(|end| end.checked_add(self.offset(class)).is_some())
            .ok_or_else(|| eyre!("{class:?} registers {register}+{count} overflow the binding range"))?;
        if let Some(width) = self.width(class) {
            if end > width {
                bail!(
                    "{class:?} register {} lands past the {width} bindings reserved for its class",
                    end - 1
                );
            }
        }
        Ok(())
    }
}

/// First register of every range, with `APPEND_REGISTER` continuing after the previous range
pub fn resolve_registers(ranges: &[DescriptorRange]) -> Result<Vec<u32>> {
    let mut registers = Vec::with_capacity(ranges.len());
    let mut next_register = 0u32;
    for range in ranges {
        let register = if range.start_register == APPEND_REGISTER {
            next_register
        } else {
            range.start_register
        };
        next_register = register
            .checked_add(range.num_descriptors)
            .ok_or_else(|| eyre!("registers {register}+{} overflow", range.num_descriptors))?;
        registers.push(register);
    }
    Ok(registers)
}

/// Where one descriptor set slot lands natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotBinding {
    pub descriptor_type: DescriptorType,
    pub shader_register: u32,
    pub register_space: u32,
    /// Vulkan binding number
    pub binding: u32,
    /// Vulkan array element within `binding`
    pub array_element: u32,
    /// Offset inside a DX12 descriptor table
    pub heap_offset: u32,
    pub dynamic: bool,
}

impl SlotBinding {
    pub fn class(&self) -> DescriptorClass {
        self.descriptor_type.class()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayout {
    pub root_parameter: u32,
    pub visibility: ShaderStage,
    pub is_root_buffer: bool,
    pub is_sampler_table: bool,
    pub slots: Vec<SlotBinding>,
}

impl DescriptorSetLayout {
    /// Table descriptors only, a root buffer reports zero
    pub fn num_descriptors(&self) -> u32 {
        if self.is_root_buffer { 0 } else { self.slots.len() as u32 }
    }

    /// (binding, descriptor type, count) per native binding, in binding order
    pub fn native_bindings(&self) -> Vec<(u32, DescriptorType, u32)> {
        let mut bindings: Vec<(u32, DescriptorType, u32)> = Vec::new();
        for slot in &self.slots {
            match bindings.iter_mut().find(|(binding, ..)| *binding == slot.binding) {
                Some((_, _, count)) => *count = (*count).max(slot.array_element + 1),
                None => bindings.push((slot.binding, slot.descriptor_type, slot.array_element + 1)),
            }
        }
        bindings.sort_by_key(|(binding, ..)| *binding);
        bindings
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RootSignatureDesc {
    pub name: String,
    pub flags: RootSignatureFlags,
    pub binding_offsets: BindingOffsets,
    pub root_parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSamplerDesc>,
}

impl RootSignatureDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: RootSignatureFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_binding_offsets(mut self, offsets: BindingOffsets) -> Self {
        self.binding_offsets = offsets;
        self
    }

    pub fn with_parameter(mut self, parameter: RootParameter) -> Self {
        self.root_parameters.push(parameter);
        self
    }

    pub fn with_static_sampler(mut self, sampler: StaticSamplerDesc) -> Self {
        self.static_samplers.push(sampler);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_parameters.len() > MAX_ROOT_PARAMETERS {
            bail!(
                "root signature {} has {} parameters, the limit is {}",
                self.name,
                self.root_parameters.len(),
                MAX_ROOT_PARAMETERS
            );
        }
        self.binding_offsets
            .validate()
            .map_err(|e| eyre!("root signature {}: {e}", self.name))?;
        for (i, parameter) in self.root_parameters.iter().enumerate() {
            parameter
                .validate(&self.binding_offsets)
                .map_err(|e| eyre!("root signature {} parameter {i}: {e}", self.name))?;
        }
        for sampler in &self.static_samplers {
            self.binding_offsets
                .check_registers(DescriptorClass::Sampler, sampler.shader_register, 1)
                .map_err(|e| eyre!("root signature {} static sampler: {e}", self.name))?;
        }
        Ok(())
    }

    pub fn descriptor_set_layouts(&self) -> Vec<Option<DescriptorSetLayout>> {
        self.root_parameters
            .iter()
            .enumerate()
            .map(|(i, p)| p.descriptor_set_layout(i as u32, &self.binding_offsets))
            .collect()
    }
}

/// Engine level root signature, one handle per creation
#[derive(Clone)]
pub struct RootSignature {
    ctx: GraphicsContext,
    handle: ResourceHandle,
}

impl RootSignature {
    pub fn new(ctx: &GraphicsContext, desc: &RootSignatureDesc) -> Result<Self> {
        let handle = ctx.manager().create_root_signature(desc)?;
        Ok(Self { ctx: ctx.clone(), handle })
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn num_root_parameters(&self) -> u32 {
        self.ctx.manager().num_root_parameters(&self.handle).unwrap_or(0)
    }

    pub fn root_parameter(&self, index: u32) -> Option<RootParameter> {
        self.ctx.manager().root_parameter(&self.handle, index)
    }

    pub fn create_descriptor_set(&self, root_parameter: u32) -> Result<DescriptorSet> {
        DescriptorSet::new(&self.ctx, self, root_parameter)
    }
}

impl std::fmt::Debug for RootSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RootSignature").field(&self.handle).finish()
    }
}

impl PartialEq for RootSignature {
    fn eq(&self, other: &Self) -> bool {
        std::sync::Arc::ptr_eq(&self.handle, &other.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_limits() {
        let mut desc = RootSignatureDesc::new("too_many");
        for i in 0..9 {
            desc = desc.with_parameter(RootParameter::root_cbv(i, ShaderStage::ALL));
        }
        assert!(desc.validate().is_err());

        let mixed = RootSignatureDesc::new("mixed").with_parameter(RootParameter::table(
            vec![DescriptorRange::texture_srv(0, 1), DescriptorRange::sampler(0, 1)],
            ShaderStage::PIXEL,
        ));
        assert!(mixed.validate().is_err());

        let big = RootSignatureDesc::new("big")
            .with_parameter(RootParameter::range(DescriptorType::TextureSRV, 0, 33, ShaderStage::PIXEL));
        assert!(big.validate().is_err());

        let fine = RootSignatureDesc::new("fine")
            .with_parameter(RootParameter::root_constants(0, 4, ShaderStage::VERTEX))
            .with_parameter(RootParameter::range(DescriptorType::Sampler, 0, 2, ShaderStage::PIXEL));
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn table_slots_are_contiguous_and_append_registers() {
        let parameter = RootParameter::table(
            vec![
                DescriptorRange::texture_srv(2, 2),
                DescriptorRange::structured_buffer_srv(APPEND_REGISTER, 1),
                DescriptorRange::texture_uav(0, 1),
            ],
            ShaderStage::PIXEL,
        );
        let layout = parameter.descriptor_set_layout(3, &BindingOffsets::default()).unwrap();

        assert_eq!(layout.num_descriptors(), 4);
        let slots = &layout.slots;
        assert_eq!((slots[0].binding, slots[0].array_element, slots[0].heap_offset), (2, 0, 0));
        assert_eq!((slots[1].binding, slots[1].array_element, slots[1].heap_offset), (2, 1, 1));
        // structured SRVs use the shader resource range, not the UAV one
        assert_eq!((slots[2].binding, slots[2].shader_register), (4, 4));
        assert_eq!(slots[3].binding, 384);

        assert_eq!(
            layout.native_bindings(),
            vec![
                (2, DescriptorType::TextureSRV, 2),
                (4, DescriptorType::StructuredBufferSRV, 1),
                (384, DescriptorType::TextureUAV, 1),
            ]
        );
    }

    #[test]
    fn registers_stay_inside_their_class_range() {
        let offsets = BindingOffsets::default();
        assert_eq!(offsets.width(DescriptorClass::ShaderResource), Some(128));
        assert_eq!(offsets.width(DescriptorClass::UnorderedAccess), None);

        // t256 would share binding 256 with b0
        let colliding = RootParameter::table(
            vec![DescriptorRange::texture_srv(256, 1), DescriptorRange::constant_buffer(0, 1)],
            ShaderStage::PIXEL,
        );
        assert!(colliding.validate(&offsets).is_err());
        assert!(
            RootParameter::table(vec![DescriptorRange::texture_srv(127, 2)], ShaderStage::PIXEL)
                .validate(&offsets)
                .is_err()
        );
        assert!(RootParameter::root_cbv(128, ShaderStage::ALL).validate(&offsets).is_err());
        assert!(RootParameter::root_uav(4000, ShaderStage::ALL).validate(&offsets).is_ok());

        let fits = RootParameter::table(
            vec![DescriptorRange::texture_srv(127, 1), DescriptorRange::constant_buffer(127, 1)],
            ShaderStage::PIXEL,
        );
        assert!(fits.validate(&offsets).is_ok());
        let layout = fits.descriptor_set_layout(0, &offsets).unwrap();
        assert_eq!(layout.native_bindings().len(), 2);

        let shared = BindingOffsets { sampler: 0, ..offsets };
        assert!(RootSignatureDesc::new("shared").with_binding_offsets(shared).validate().is_err());
    }

    #[test]
    fn overlapping_and_overflowing_ranges_are_rejected() {
        let offsets = BindingOffsets::default();
        let overlapping = RootParameter::table(
            vec![
                DescriptorRange::texture_srv(0, 4),
                DescriptorRange::structured_buffer_srv(3, 1),
            ],
            ShaderStage::PIXEL,
        );
        assert!(overlapping.validate(&offsets).is_err());

        let appended = RootParameter::table(
            vec![
                DescriptorRange::texture_srv(0, 4),
                DescriptorRange::structured_buffer_srv(APPEND_REGISTER, 1),
                DescriptorRange::texture_uav(0, 4),
            ],
            ShaderStage::PIXEL,
        );
        assert!(appended.validate(&offsets).is_ok());

        let overflow = RootParameter::table(vec![DescriptorRange::texture_srv(u32::MAX - 1, 2)], ShaderStage::PIXEL);
        assert!(overflow.validate(&offsets).is_err());
        let uav_overflow = RootParameter::table(vec![DescriptorRange::texture_uav(u32::MAX - 100, 2)], ShaderStage::PIXEL);
        assert!(uav_overflow.validate(&offsets).is_err());
        assert!(resolve_registers(&[DescriptorRange::texture_srv(u32::MAX - 1, 2)]).is_err());
    }

    #[test]
    fn root_buffers_report_no_table_descriptors() {
        let layout = RootParameter::root_cbv(1, ShaderStage::VERTEX)
            .descriptor_set_layout(0, &BindingOffsets::default())
            .unwrap();
        assert!(layout.is_root_buffer);
        assert_eq!(layout.num_descriptors(), 0);
        assert_eq!(layout.slots.len(), 1);
        assert_eq!(layout.slots[0].binding, 257);
        assert!(layout.slots[0].dynamic);

        assert!(
            RootParameter::root_constants(0, 4, ShaderStage::ALL)
                .descriptor_set_layout(0, &BindingOffsets::default())
                .is_none()
        );
    }
}
