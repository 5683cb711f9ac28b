//! Hardware capabilities reported by a render backend

use bitflags::bitflags;

use crate::{GpuProgramType, RhiError, RhiResult};

bitflags! {
    /// Optional features a device may support
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RenderFeatures: u32 {
        const COMPUTE_PROGRAM = 1 << 0;
        const GEOMETRY_PROGRAM = 1 << 1;
        const TESSELLATION_PROGRAM = 1 << 2;
        const LOAD_STORE = 1 << 3;
        const TEXTURE_VIEWS = 1 << 4;
        const TIMER_QUERIES = 1 << 5;
        const SEAMLESS_CUBEMAP = 1 << 6;
        const TEXTURE_COMPRESSION_BC = 1 << 7;
        const TEXTURE_COMPRESSION_ETC2 = 1 << 8;
        const TEXTURE_COMPRESSION_ASTC = 1 << 9;
        const ANISOTROPIC_FILTERING = 1 << 10;
    }
}

/// GPU vendor, derived from the driver's vendor string
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    #[default]
    Unknown,
}

impl GpuVendor {
    pub fn from_vendor_string(vendor: &str) -> Self {
        let vendor = vendor.to_ascii_lowercase();
        if vendor.contains("nvidia") {
            GpuVendor::Nvidia
        } else if vendor.contains("intel") {
            GpuVendor::Intel
        } else if vendor.starts_with("ati") || vendor.contains("amd") {
            GpuVendor::Amd
        } else {
            GpuVendor::Unknown
        }
    }
}

/// Names of the GPUs visible to the backend
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GpuInfo {
    pub gpu_names: Vec<String>,
}

impl GpuInfo {
    pub fn num_gpus(&self) -> usize {
        self.gpu_names.len()
    }
}

/// Limits and features of the active device
///
/// Per-stage arrays are indexed with [`GpuProgramType::index`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderApiCapabilities {
    pub render_api_name: String,
    pub device_name: String,
    pub vendor: String,
    pub gpu_vendor: GpuVendor,
    pub driver_version: String,

    pub num_texture_units_per_stage: [u32; GpuProgramType::COUNT],
    pub num_combined_texture_units: u32,
    pub num_gpu_param_block_buffers_per_stage: [u32; GpuProgramType::COUNT],
    pub num_combined_param_block_buffers: u32,
    pub num_load_store_texture_units_per_stage: [u32; GpuProgramType::COUNT],
    pub num_combined_load_store_texture_units: u32,

    pub max_bound_vertex_buffers: u32,
    pub num_multi_render_targets: u32,
    pub features: RenderFeatures,
}

impl RenderApiCapabilities {
    #[inline]
    pub fn texture_units(&self, stage: GpuProgramType) -> u32 {
        self.num_texture_units_per_stage[stage.index()]
    }

    #[inline]
    pub fn param_block_buffers(&self, stage: GpuProgramType) -> u32 {
        self.num_gpu_param_block_buffers_per_stage[stage.index()]
    }

    #[inline]
    pub fn load_store_texture_units(&self, stage: GpuProgramType) -> u32 {
        self.num_load_store_texture_units_per_stage[stage.index()]
    }

    #[inline]
    pub fn has(&self, features: RenderFeatures) -> bool {
        self.features.contains(features)
    }

    /// Check that the per-stage ranges fit in the combined limits
    ///
    /// Backends that partition a global unit space between stages rely on
    /// this holding, otherwise two stages could resolve to the same unit.
    pub fn validate_unit_partition(&self) -> RhiResult<()> {
        let total_textures: u32 = self.num_texture_units_per_stage.iter().sum();
        if total_textures > self.num_combined_texture_units {
            return Err(RhiError::internal(format!(
                "Texture units per stage ({}) exceed the combined texture unit count ({})",
                total_textures, self.num_combined_texture_units
            )));
        }

        let total_blocks: u32 = self.num_gpu_param_block_buffers_per_stage.iter().sum();
        if total_blocks > self.num_combined_param_block_buffers {
            return Err(RhiError::internal(format!(
                "Uniform blocks per stage ({}) exceed the combined uniform block count ({})",
                total_blocks, self.num_combined_param_block_buffers
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> RenderApiCapabilities {
        RenderApiCapabilities {
            num_texture_units_per_stage: [16, 16, 16, 0, 0, 16],
            num_combined_texture_units: 80,
            num_gpu_param_block_buffers_per_stage: [12, 12, 12, 0, 0, 12],
            num_combined_param_block_buffers: 60,
            ..Default::default()
        }
    }

    #[test]
    fn partition_within_limits_is_valid() {
        assert!(caps().validate_unit_partition().is_ok());
    }

    #[test]
    fn partition_over_combined_textures_fails() {
        let mut caps = caps();
        caps.num_combined_texture_units = 32;
        assert!(matches!(
            caps.validate_unit_partition(),
            Err(RhiError::Internal { .. })
        ));
    }

    #[test]
    fn vendor_detection() {
        assert_eq!(
            GpuVendor::from_vendor_string("NVIDIA Corporation"),
            GpuVendor::Nvidia
        );
        assert_eq!(
            GpuVendor::from_vendor_string("ATI Technologies Inc."),
            GpuVendor::Amd
        );
        assert_eq!(GpuVendor::from_vendor_string("Mesa"), GpuVendor::Unknown);
    }
}
