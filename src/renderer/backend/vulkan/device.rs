use crate::renderer::backend::vulkan::instance::Instance;
use crate::renderer::backend::vulkan::transfer::TransferContext;
use crate::renderer::backend::vulkan::translate::sampler_create_info;
use crate::renderer::backend::DeviceLimits;
use crate::renderer::common::CONSTANT_BUFFER_ALIGNMENT;
use crate::renderer::config::RenderConfig;
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::shader::Shader;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc};
use gpu_descriptor::{
    CreatePoolError, DescriptorAllocator, DescriptorDevice, DescriptorPoolCreateFlags, DescriptorSet,
    DescriptorSetLayoutCreateFlags, DescriptorTotalCount, DeviceAllocationError,
};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::sync::{Mutex, PoisonError};

/// Logical device plus everything allocated against it. Shared by every
/// native object so the device is destroyed last.
pub struct Device {
    pub logical: ash::Device,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_family: u32,
    pub queue: vk::Queue,
    pub mesh_shader: bool,

    allocator: Mutex<Option<Allocator>>,
    descriptor_allocator: Mutex<DescriptorAllocator<vk::DescriptorPool, vk::DescriptorSet>>,
    samplers: Mutex<HashMap<SamplerDesc, vk::Sampler>>,
    shader_modules: Mutex<HashMap<u64, vk::ShaderModule>>,
    transfer: TransferContext,
    instance: Instance,
}

impl Device {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let instance = Instance::new(config)?;
        let (physical, queue_family, mesh_shader) = Self::select_physical_device(&instance.handle)?;

        let (properties, features) = unsafe {
            (
                instance.handle.get_physical_device_properties(physical),
                instance.handle.get_physical_device_features(physical),
            )
        };
        let device_name = properties.device_name_as_c_str().map_or_else(|_| "unknown".into(), CStr::to_string_lossy);
        log::info!("Using {device_name} ({:?})", properties.device_type);

        let logical = Self::create_logical_device(&instance.handle, physical, queue_family, &features, mesh_shader)?;
        let queue = unsafe { logical.get_device_queue(queue_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle.clone(),
            device: logical.clone(),
            physical_device: physical,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: config.validation,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        let transfer = TransferContext::new(&logical, queue_family, queue)?;

        Ok(Self {
            logical,
            physical,
            properties,
            features,
            queue_family,
            queue,
            mesh_shader,
            allocator: Mutex::new(Some(allocator)),
            descriptor_allocator: Mutex::new(DescriptorAllocator::new(1024)),
            samplers: Mutex::new(HashMap::new()),
            shader_modules: Mutex::new(HashMap::new()),
            transfer,
            instance,
        })
    }

    pub fn limits(&self) -> DeviceLimits {
        let limits = &self.properties.limits;
        DeviceLimits {
            constant_buffer_alignment: limits.min_uniform_buffer_offset_alignment.max(CONSTANT_BUFFER_ALIGNMENT),
            storage_buffer_alignment: limits.min_storage_buffer_offset_alignment,
            max_push_constants_size: limits.max_push_constants_size,
        }
    }

    pub fn immediate_submit<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.transfer.immediate_submit(&self.logical, func)
    }

    pub fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> Result<Allocation> {
        let mut allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        let allocator = allocator.as_mut().ok_or_eyre("memory allocator is shut down")?;
        Ok(allocator.allocate(desc)?)
    }

    pub fn free(&self, allocation: Allocation) {
        let mut allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(allocator) = allocator.as_mut() {
            if let Err(e) = allocator.free(allocation) {
                log::error!("Failed to free allocation: {e}");
            }
        }
    }

    pub fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
        counts: &DescriptorTotalCount,
    ) -> Result<DescriptorSet<vk::DescriptorSet>> {
        let mut allocator = self.descriptor_allocator.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sets = unsafe {
            allocator.allocate(
                &RawDevice(&self.logical),
                &layout,
                DescriptorSetLayoutCreateFlags::empty(),
                counts,
                1,
            )?
        };
        sets.pop().ok_or_eyre("descriptor allocator returned no set")
    }

    pub fn free_descriptor_set(&self, set: DescriptorSet<vk::DescriptorSet>) {
        let mut allocator = self.descriptor_allocator.lock().unwrap_or_else(PoisonError::into_inner);
        unsafe { allocator.free(&RawDevice(&self.logical), std::iter::once(set)) };
    }

    /// Native sampler for `desc`, created once and kept until the device goes away
    pub fn sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler> {
        let mut samplers = self.samplers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sampler) = samplers.get(desc) {
            return Ok(*sampler);
        }

        let mut reduction_info = vk::SamplerReductionModeCreateInfo::default();
        let (mut info, reduction) = sampler_create_info(desc);
        if info.anisotropy_enable == vk::TRUE && self.features.sampler_anisotropy == vk::FALSE {
            log::warn!("Anisotropic filtering is not supported, falling back to linear");
            info.anisotropy_enable = vk::FALSE;
        }
        info.max_anisotropy = info.max_anisotropy.min(self.properties.limits.max_sampler_anisotropy);

        if let Some(mode) = reduction {
            reduction_info = reduction_info.reduction_mode(mode);
            info = info.push_next(&mut reduction_info);
        }

        let sampler = unsafe { self.logical.create_sampler(&info, None)? };
        samplers.insert(*desc, sampler);
        log::debug!("Created sampler {:?} ({} cached)", desc.filter, samplers.len());
        Ok(sampler)
    }

    /// Module for `shader`, shared by every pipeline built from the same bytes
    pub fn shader_module(&self, shader: &Shader) -> Result<vk::ShaderModule> {
        let mut modules = self.shader_modules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = modules.get(&shader.hash) {
            return Ok(*module);
        }

        let words = shader.words()?;
        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { self.logical.create_shader_module(&info, None) }
            .map_err(|e| eyre!("Failed to create a shader module from {}: {e}", shader.path.display()))?;
        modules.insert(shader.hash, module);
        Ok(module)
    }

    fn select_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32, bool)> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        devices
            .into_iter()
            .filter(|device| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                props.api_version >= vk::API_VERSION_1_3
            })
            .filter_map(|device| {
                let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
                let graphics = families
                    .iter()
                    .position(|q| q.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))?;
                let mesh_shader = Self::supports_extension(instance, device, ash::ext::mesh_shader::NAME);
                Some((device, graphics as u32, mesh_shader))
            })
            .min_by_key(|(device, ..)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    _ => 4,
                }
            })
            .ok_or_eyre("No Vulkan 1.3 device with a graphics queue found")
    }

    fn supports_extension(instance: &ash::Instance, device: vk::PhysicalDevice, name: &CStr) -> bool {
        unsafe { instance.enumerate_device_extension_properties(device) }
            .unwrap_or_default()
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext| ext == name))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        queue_family: u32,
        features: &vk::PhysicalDeviceFeatures,
        mesh_shader: bool,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let mut extensions: Vec<*const c_char> = Vec::new();
        if mesh_shader {
            extensions.push(ash::ext::mesh_shader::NAME.as_ptr());
        }
        #[cfg(target_os = "macos")]
        extensions.push(ash::khr::portability_subset::NAME.as_ptr());

        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_binding_partially_bound(true)
            .sampler_filter_minmax(true);
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let mut mesh_features = vk::PhysicalDeviceMeshShaderFeaturesEXT::default()
            .mesh_shader(true)
            .task_shader(true);

        let mut device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(features)
            .push_next(&mut vulkan12)
            .push_next(&mut vulkan13);
        if mesh_shader {
            device_info = device_info.push_next(&mut mesh_features);
        }

        unsafe { instance.create_device(physical, &device_info, None) }
            .map_err(|e| eyre!("Failed to create the logical device: {e}"))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for the device to go idle: {e}");
            }

            let samplers = self.samplers.get_mut().unwrap_or_else(PoisonError::into_inner);
            for (_, sampler) in samplers.drain() {
                self.logical.destroy_sampler(sampler, None);
            }
            let modules = self.shader_modules.get_mut().unwrap_or_else(PoisonError::into_inner);
            for (_, module) in modules.drain() {
                self.logical.destroy_shader_module(module, None);
            }

            let descriptor_allocator = self.descriptor_allocator.get_mut().unwrap_or_else(PoisonError::into_inner);
            descriptor_allocator.cleanup(&RawDevice(&self.logical));

            drop(self.allocator.get_mut().unwrap_or_else(PoisonError::into_inner).take());
            self.transfer.destroy(&self.logical);
            self.logical.destroy_device(None);
        }
        log::debug!("Destroyed Vulkan device");
    }
}

/// Borrowed device handed to the descriptor allocator
struct RawDevice<'a>(&'a ash::Device);

impl DescriptorDevice<vk::DescriptorSetLayout, vk::DescriptorPool, vk::DescriptorSet> for RawDevice<'_> {
    unsafe fn create_descriptor_pool(
        &self,
        descriptor_count: &DescriptorTotalCount,
        max_sets: u32,
        flags: DescriptorPoolCreateFlags,
    ) -> Result<vk::DescriptorPool, CreatePoolError> {
        let counts = [
            (vk::DescriptorType::SAMPLER, descriptor_count.sampler),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count.combined_image_sampler),
            (vk::DescriptorType::SAMPLED_IMAGE, descriptor_count.sampled_image),
            (vk::DescriptorType::STORAGE_IMAGE, descriptor_count.storage_image),
            (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, descriptor_count.uniform_texel_buffer),
            (vk::DescriptorType::STORAGE_TEXEL_BUFFER, descriptor_count.storage_texel_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER, descriptor_count.uniform_buffer),
            (vk::DescriptorType::STORAGE_BUFFER, descriptor_count.storage_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, descriptor_count.uniform_buffer_dynamic),
            (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, descriptor_count.storage_buffer_dynamic),
            (vk::DescriptorType::INPUT_ATTACHMENT, descriptor_count.input_attachment),
            (vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, descriptor_count.acceleration_structure),
        ];
        let pool_sizes: SmallVec<[vk::DescriptorPoolSize; 12]> = counts
            .iter()
            .filter(|(_, count)| *count != 0)
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: *count,
            })
            .collect();

        let mut ash_flags = vk::DescriptorPoolCreateFlags::empty();
        if flags.contains(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            ash_flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        }
        if flags.contains(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND) {
            ash_flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }

        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes)
            .flags(ash_flags);
        match unsafe { self.0.create_descriptor_pool(&info, None) } {
            Ok(pool) => Ok(pool),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(CreatePoolError::OutOfDeviceMemory),
            Err(vk::Result::ERROR_FRAGMENTATION) => Err(CreatePoolError::Fragmentation),
            Err(err) => {
                log::error!("Unexpected descriptor pool creation result {err}");
                Err(CreatePoolError::OutOfHostMemory)
            }
        }
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.0.destroy_descriptor_pool(pool, None) }
    }

    unsafe fn alloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        layouts: impl ExactSizeIterator<Item = &'a vk::DescriptorSetLayout>,
        sets: &mut impl Extend<vk::DescriptorSet>,
    ) -> Result<(), DeviceAllocationError> {
        let set_layouts: SmallVec<[vk::DescriptorSetLayout; 16]> = layouts.copied().collect();
        let info = vk::DescriptorSetAllocateInfo::default()
            .set_layouts(&set_layouts)
            .descriptor_pool(*pool);

        match unsafe { self.0.allocate_descriptor_sets(&info) } {
            Ok(allocated) => {
                sets.extend(allocated);
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(DeviceAllocationError::OutOfDeviceMemory),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) => Err(DeviceAllocationError::FragmentedPool),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => Err(DeviceAllocationError::OutOfPoolMemory),
            Err(err) => {
                log::error!("Unexpected descriptor set allocation result {err}");
                Err(DeviceAllocationError::OutOfHostMemory)
            }
        }
    }

    unsafe fn dealloc_descriptor_sets(
        &self,
        pool: &mut vk::DescriptorPool,
        sets: impl Iterator<Item = vk::DescriptorSet>,
    ) {
        let sets: SmallVec<[vk::DescriptorSet; 16]> = sets.collect();
        if let Err(err) = unsafe { self.0.free_descriptor_sets(*pool, &sets) } {
            log::error!("Failed to free {} descriptor sets: {err}", sets.len());
        }
    }
}
