//! Physical device (GPU) selection.
//!
//! Selection is driven by a [`DeviceRequirements`] value:
//! 1. Enumerate all GPUs
//! 2. Reject any that miss a required queue family, device extension,
//!    surface format/present mode, feature, or depth format
//! 3. Score the survivors and pick the best (discrete GPUs win)
//!
//! The scoring and final pick are pure functions over queried data, so
//! selection is deterministic for a given machine.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Depth formats in preference order.
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// What the engine needs from a GPU.
///
/// The default asks for graphics + present queues and the swapchain
/// extension, which is the minimum to put pixels on screen.
#[derive(Clone, Debug)]
pub struct DeviceRequirements {
    pub graphics: bool,
    pub present: bool,
    /// Prefer (but do not require) a transfer family separate from graphics.
    pub dedicated_transfer: bool,
    pub sampler_anisotropy: bool,
    pub extensions: Vec<&'static CStr>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            graphics: true,
            present: true,
            dedicated_transfer: true,
            sampler_anisotropy: false,
            extensions: vec![ash::khr::swapchain::NAME],
        }
    }
}

/// Queue family indices for the queue types the engine uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics operations.
    pub graphics_family: Option<u32>,
    /// Family supporting presentation to the surface.
    pub present_family: Option<u32>,
    /// Family used for transfers; aliases graphics when no dedicated
    /// transfer family exists.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True when the families the requirements ask for are present.
    pub fn satisfies(&self, requirements: &DeviceRequirements) -> bool {
        (!requirements.graphics || self.graphics_family.is_some())
            && (!requirements.present || self.present_family.is_some())
    }

    /// Unique family indices, for logical device queue creation.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);

        for family in [
            self.graphics_family,
            self.present_family,
            self.transfer_family,
        ]
        .into_iter()
        .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }

        families
    }
}

/// Everything queried about a GPU during selection, kept around so the
/// logical device and swapchain never have to re-query.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices.
    pub queue_families: QueueFamilyIndices,
    /// Depth format chosen for this device.
    pub depth_format: vk::Format,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Total device-local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .field("depth_format", &self.depth_format)
            .finish()
    }
}

/// Selects the most suitable physical device for the given surface.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableDevice`] when no GPU satisfies
/// `requirements`.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    requirements: &DeviceRequirements,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableDevice);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut suitable = Vec::new();
    for device in devices {
        if let Some(info) =
            check_device_suitability(instance, device, surface, surface_loader, requirements)
        {
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                rate_device(&info)
            );
            suitable.push(info);
        }
    }

    let selected = select_best(suitable).ok_or_else(|| {
        warn!("No suitable GPU found with required capabilities");
        RhiError::NoSuitableDevice
    })?;

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
    );

    Ok(selected)
}

/// Picks the highest-scoring candidate. Pure; ties keep the earlier
/// candidate, so a given candidate list always yields the same pick.
pub fn select_best(candidates: Vec<PhysicalDeviceInfo>) -> Option<PhysicalDeviceInfo> {
    candidates
        .into_iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            rate_device(a)
                .cmp(&rate_device(b))
                .then(ib.cmp(ia))
        })
        .map(|(_, info)| info)
}

/// Checks a device against the requirements. Returns `None` with a debug
/// log naming the first failed check.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    requirements: &DeviceRequirements,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.satisfies(requirements) {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    if !check_extension_support(instance, device, &requirements.extensions) {
        debug!("GPU '{}' skipped: missing required extensions", device_name);
        return None;
    }

    // A swapchain needs at least one format and one present mode.
    let format_count = unsafe {
        surface_loader
            .get_physical_device_surface_formats(device, surface)
            .map(|f| f.len())
            .unwrap_or(0)
    };
    let present_mode_count = unsafe {
        surface_loader
            .get_physical_device_surface_present_modes(device, surface)
            .map(|m| m.len())
            .unwrap_or(0)
    };
    if format_count == 0 || present_mode_count == 0 {
        debug!("GPU '{}' skipped: inadequate surface support", device_name);
        return None;
    }

    if requirements.sampler_anisotropy && features.sampler_anisotropy == vk::FALSE {
        debug!(
            "GPU '{}' skipped: sampler anisotropy not supported",
            device_name
        );
        return None;
    }

    let depth_format = match find_depth_format(instance, device) {
        Some(format) => format,
        None => {
            debug!("GPU '{}' skipped: no supported depth format", device_name);
            return None;
        }
    };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
        depth_format,
    })
}

/// Checks that every requested device extension is available.
fn check_extension_support(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    required: &[&CStr],
) -> bool {
    let available = match unsafe { instance.enumerate_device_extension_properties(device) } {
        Ok(props) => props,
        Err(_) => return false,
    };

    required.iter().all(|&wanted| {
        available.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == wanted
        })
    })
}

/// First candidate depth format with optimal-tiling depth attachment
/// support, in preference order.
pub fn find_depth_format(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES.into_iter().find(|&format| {
        let props = unsafe { instance.get_physical_device_format_properties(device, format) };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

/// Finds queue family indices, preferring a dedicated transfer family
/// (transfer without graphics) when one exists.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();
    let mut dedicated_transfer: Option<u32> = None;

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_transfer = family.queue_flags.contains(vk::QueueFlags::TRANSFER);

        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }

        if has_transfer {
            if !has_graphics && dedicated_transfer.is_none() {
                dedicated_transfer = Some(i);
            } else if indices.transfer_family.is_none() {
                indices.transfer_family = Some(i);
            }
        }

        if indices.present_family.is_none() {
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            };
            if present_support {
                indices.present_family = Some(i);
            }
        }
    }

    if let Some(dedicated) = dedicated_transfer {
        indices.transfer_family = Some(dedicated);
    }

    // Graphics families always support transfer.
    if indices.transfer_family.is_none() {
        indices.transfer_family = indices.graphics_family;
    }

    indices
}

/// Rates a device; higher is better.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = 0u32;

    match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => score += 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => score += 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => score += 100,
        vk::PhysicalDeviceType::CPU => score += 10,
        _ => score += 1,
    }

    // Larger limits and more VRAM indicate a more capable GPU.
    score += info.properties.limits.max_image_dimension2_d;
    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16_000);

    // Separate queue families can overlap work.
    if info.queue_families.graphics_family != info.queue_families.present_family {
        score += 100;
    }
    if info.queue_families.transfer_family != info.queue_families.graphics_family {
        score += 100;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_device(
        device_type: vk::PhysicalDeviceType,
        vram_bytes: u64,
        families: QueueFamilyIndices,
    ) -> PhysicalDeviceInfo {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = device_type;
        properties.limits.max_image_dimension2_d = 4096;

        let mut memory_properties = vk::PhysicalDeviceMemoryProperties::default();
        memory_properties.memory_heap_count = 1;
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: vram_bytes,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };

        PhysicalDeviceInfo {
            device: vk::PhysicalDevice::null(),
            properties,
            features: vk::PhysicalDeviceFeatures::default(),
            memory_properties,
            queue_families: families,
            depth_format: vk::Format::D32_SFLOAT,
        }
    }

    fn basic_families() -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            transfer_family: Some(0),
        }
    }

    #[test]
    fn queue_family_indices_default_incomplete() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.satisfies(&DeviceRequirements::default()));
    }

    #[test]
    fn queue_family_indices_satisfies_requirements() {
        let indices = basic_families();
        assert!(indices.satisfies(&DeviceRequirements::default()));

        let graphics_only = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
            transfer_family: Some(0),
        };
        assert!(!graphics_only.satisfies(&DeviceRequirements::default()));
    }

    #[test]
    fn unique_families_no_duplicates() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
            transfer_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![0, 1, 2]);
    }

    #[test]
    fn unique_families_all_same() {
        let indices = basic_families();
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn discrete_gpu_preferred_over_integrated() {
        let integrated = mock_device(
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            16 * 1024 * 1024 * 1024,
            basic_families(),
        );
        let discrete = mock_device(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            4 * 1024 * 1024 * 1024,
            basic_families(),
        );

        // Order in the candidate list must not matter.
        let picked = select_best(vec![integrated.clone(), discrete.clone()]).unwrap();
        assert_eq!(
            picked.properties.device_type,
            vk::PhysicalDeviceType::DISCRETE_GPU
        );

        let picked = select_best(vec![discrete, integrated]).unwrap();
        assert_eq!(
            picked.properties.device_type,
            vk::PhysicalDeviceType::DISCRETE_GPU
        );
    }

    #[test]
    fn selection_is_deterministic() {
        let candidates = || {
            vec![
                mock_device(vk::PhysicalDeviceType::CPU, 0, basic_families()),
                mock_device(
                    vk::PhysicalDeviceType::DISCRETE_GPU,
                    8 * 1024 * 1024 * 1024,
                    basic_families(),
                ),
                mock_device(
                    vk::PhysicalDeviceType::VIRTUAL_GPU,
                    2 * 1024 * 1024 * 1024,
                    basic_families(),
                ),
            ]
        };

        let first = select_best(candidates()).unwrap();
        for _ in 0..10 {
            let again = select_best(candidates()).unwrap();
            assert_eq!(
                again.properties.device_type,
                first.properties.device_type
            );
            assert_eq!(rate_device(&again), rate_device(&first));
        }
    }

    #[test]
    fn tie_keeps_first_candidate() {
        let mut a = mock_device(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            1024 * 1024 * 1024,
            basic_families(),
        );
        a.properties.device_name[0] = b'a' as _;
        let mut b = a.clone();
        b.properties.device_name[0] = b'b' as _;

        let picked = select_best(vec![a, b]).unwrap();
        assert_eq!(picked.device_name(), "a");
    }

    #[test]
    fn empty_candidate_list_selects_nothing() {
        assert!(select_best(Vec::new()).is_none());
    }

    #[test]
    fn dedicated_queues_raise_score() {
        let shared = mock_device(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            1024 * 1024 * 1024,
            basic_families(),
        );
        let split = mock_device(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            1024 * 1024 * 1024,
            QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(1),
                transfer_family: Some(2),
            },
        );
        assert!(rate_device(&split) > rate_device(&shared));
    }
}
