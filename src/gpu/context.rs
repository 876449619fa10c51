use crate::error::GpuError;
use anyhow::{Context, Result};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Device, Entry, Instance};
use log::{info, warn};
use std::ffi::{CStr, CString};
use std::sync::Arc;

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Customizable bring-up settings.
#[derive(Debug, Clone)]
pub struct GpuSettings {
    pub application_name: String,
    pub enable_validation: bool,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            application_name: "voxelstream".into(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// Headless Vulkan device context: instance, one physical device and a
/// logical device with a single graphics-capable queue family. Surface and
/// swapchain creation belong to the embedding renderer, not this crate.
pub struct VulkanContext {
    // Field order matters for Drop: device before instance before entry.
    pub device: Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    instance: Instance,
    _entry: Entry,
}

impl VulkanContext {
    pub fn new(settings: GpuSettings) -> Result<Arc<Self>> {
        // Runtime loader: machines without a Vulkan ICD fail here instead of
        // at link time.
        let entry = unsafe { Entry::load() }.context("Failed to load the Vulkan loader")?;

        let validation = settings.enable_validation && Self::validation_available(&entry);
        if settings.enable_validation && !validation {
            warn!("Validation layer requested but not available; continuing without");
        }

        let app_name = CString::new(settings.application_name.clone())?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(app_name.as_c_str())
            .api_version(vk::API_VERSION_1_2);

        let mut layers: Vec<*const i8> = Vec::new();
        let mut extensions: Vec<*const i8> = Vec::new();
        if validation {
            layers.push(VALIDATION_LAYER.as_ptr());
            extensions.push(DebugUtils::name().as_ptr());
        }

        let instance = unsafe {
            entry.create_instance(
                &vk::InstanceCreateInfo::builder()
                    .application_info(&app_info)
                    .enabled_layer_names(&layers)
                    .enabled_extension_names(&extensions),
                None,
            )
        }
        .context("Failed to create Vulkan instance")?;

        let debug = if validation {
            let loader = DebugUtils::new(&entry, &instance);
            let messenger = unsafe {
                loader.create_debug_utils_messenger(
                    &vk::DebugUtilsMessengerCreateInfoEXT::builder()
                        .message_severity(
                            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                        )
                        .message_type(
                            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                        )
                        .pfn_user_callback(Some(vulkan_debug_callback)),
                    None,
                )
            }
            .context("Failed to create debug utils messenger")?;
            Some((loader, messenger))
        } else {
            None
        };

        let (physical_device, queue_family_index) =
            Self::select_physical_device(&instance).context("Failed to select physical device")?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        info!(
            "Using GPU {:?} (queue family {})",
            device_name, queue_family_index
        );

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities)
            .build()];

        let device = unsafe {
            instance.create_device(
                physical_device,
                &vk::DeviceCreateInfo::builder().queue_create_infos(&queue_infos),
                None,
            )
        }
        .context("Failed to create logical device")?;

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            queue_family_index,
            memory_properties,
            debug,
            instance,
            _entry: entry,
        }))
    }

    fn validation_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    (unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }) == VALIDATION_LAYER
                })
            })
            .unwrap_or(false)
    }

    fn select_physical_device(instance: &Instance) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices()? };

        let mut candidates = devices
            .into_iter()
            .filter_map(|device| {
                let family = Self::find_graphics_family(instance, device)?;

                let props = unsafe { instance.get_physical_device_properties(device) };
                let mut score: i64 = match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 500,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 250,
                    _ => 0,
                };

                let mem = unsafe { instance.get_physical_device_memory_properties(device) };
                let device_local: u64 = mem.memory_heaps[..mem.memory_heap_count as usize]
                    .iter()
                    .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                    .map(|heap| heap.size)
                    .sum();
                score += (device_local / 1024 / 1024) as i64;

                Some((device, family, score))
            })
            .collect::<Vec<_>>();

        candidates.sort_by(|a, b| b.2.cmp(&a.2));
        candidates
            .into_iter()
            .next()
            .map(|(device, family, _)| (device, family))
            .ok_or_else(|| GpuError::NoSuitableDevice.into())
    }

    fn find_graphics_family(instance: &Instance, device: vk::PhysicalDevice) -> Option<u32> {
        unsafe { instance.get_physical_device_queue_family_properties(device) }
            .iter()
            .enumerate()
            .find(|(_, props)| {
                props.queue_count > 0 && props.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .map(|(index, _)| index as u32)
    }

    /// The single graphics queue; callers must wrap it in a
    /// [`SubmissionQueue`](crate::gpu::SubmissionQueue) before submitting.
    pub fn graphics_queue(&self) -> vk::Queue {
        unsafe { self.device.get_device_queue(self.queue_family_index, 0) }
    }

    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        self.memory_properties.memory_types[..self.memory_properties.memory_type_count as usize]
            .iter()
            .enumerate()
            .find(|(i, memory_type)| {
                (type_filter & (1 << i)) != 0
                    && memory_type.property_flags.contains(properties)
            })
            .map(|(i, _)| i as u32)
    }

    /// Allocates and binds a buffer. Rejection by the device is
    /// unrecoverable for callers (see the crate error taxonomy).
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory), GpuError> {
        let buffer = unsafe {
            self.device.create_buffer(
                &vk::BufferCreateInfo::builder()
                    .size(size)
                    .usage(usage)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE),
                None,
            )?
        };

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory_type = self
            .find_memory_type(requirements.memory_type_bits, properties)
            .ok_or(GpuError::NoCompatibleMemory {
                type_filter: requirements.memory_type_bits,
            })?;

        let memory = unsafe {
            self.device.allocate_memory(
                &vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(memory_type),
                None,
            )?
        };
        unsafe { self.device.bind_buffer_memory(buffer, memory, 0)? };

        Ok((buffer, memory))
    }

    /// Transient pool for one worker thread's copy commands; never shared
    /// across threads.
    pub fn create_transient_command_pool(&self) -> Result<vk::CommandPool, GpuError> {
        let pool = unsafe {
            self.device.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .queue_family_index(self.queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                None,
            )?
        };
        Ok(pool)
    }

    pub fn begin_single_time_commands(
        &self,
        command_pool: vk::CommandPool,
    ) -> Result<vk::CommandBuffer, GpuError> {
        let command_buffer = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_pool(command_pool)
                    .command_buffer_count(1),
            )?[0]
        };

        unsafe {
            self.device.begin_command_buffer(
                command_buffer,
                &vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }

        Ok(command_buffer)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        // All meshes and command pools must already be released through
        // their gated destruction points.
        unsafe {
            self.device.destroy_device(None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message);
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("vulkan: {:?}", message);
    } else {
        log::warn!("vulkan: {:?}", message);
    }
    vk::FALSE
}
