//! Logical binding slots to global GL units
//!
//! Texture units and uniform-block bindings are global in GL while the
//! engine binds per stage. Each stage owns a fixed sub-range of the global
//! space, computed once from the capabilities. Within its range a stage
//! hands out units on demand and remembers which logical slot holds each.

use bsf_rhi::{GpuProgramType, RenderApiCapabilities, RhiResult};
use tracing::{error, trace};

/// Marks a unit no logical slot currently holds
pub const UNBOUND_SLOT: u32 = u32::MAX;

const STAGES: usize = GpuProgramType::COUNT;

#[derive(Debug, Clone)]
struct UnitRange {
    offset: u32,
    supported: u32,
    /// One past the highest unit handed out, absolute
    max_bound: u32,
}

impl UnitRange {
    fn new(offset: u32, supported: u32) -> Self {
        Self {
            offset,
            supported,
            max_bound: offset,
        }
    }
}

/// Resolves (stage, logical index) pairs to GL texture, image and uniform-block units
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    textures: [UnitRange; STAGES],
    /// Logical slot held by each global texture unit
    texture_units: Vec<u32>,

    images: [UnitRange; STAGES],
    /// Image units are not partitioned, each stage indexes its own table
    image_units: [Vec<u32>; STAGES],

    uniform_block_offsets: [u32; STAGES],
    uniform_block_counts: [u32; STAGES],
}

impl SlotAllocator {
    /// Partition the unit spaces described by `caps`
    ///
    /// Fails when the per-stage counts do not fit into the combined counts.
    pub fn new(caps: &RenderApiCapabilities) -> RhiResult<Self> {
        caps.validate_unit_partition()?;

        let tex = |stage: GpuProgramType| caps.texture_units(stage);

        // Fragment first, matching the order engine shaders expect
        let mut texture_offsets = [0u32; STAGES];
        texture_offsets[GpuProgramType::Fragment.index()] = 0;
        texture_offsets[GpuProgramType::Vertex.index()] = tex(GpuProgramType::Fragment);
        texture_offsets[GpuProgramType::Geometry.index()] =
            texture_offsets[GpuProgramType::Vertex.index()] + tex(GpuProgramType::Vertex);
        texture_offsets[GpuProgramType::Compute.index()] =
            texture_offsets[GpuProgramType::Geometry.index()] + tex(GpuProgramType::Geometry);

        let textures = GpuProgramType::ALL.map(|stage| {
            UnitRange::new(texture_offsets[stage.index()], tex(stage))
        });

        let images = GpuProgramType::ALL.map(|stage| {
            let supported = match stage {
                GpuProgramType::Fragment | GpuProgramType::Compute => {
                    caps.load_store_texture_units(stage)
                }
                _ => 0,
            };
            UnitRange::new(0, supported)
        });
        let image_units = GpuProgramType::ALL
            .map(|stage| vec![UNBOUND_SLOT; images[stage.index()].supported as usize]);

        let mut uniform_block_offsets = [0u32; STAGES];
        let mut uniform_block_counts = [0u32; STAGES];
        let mut total = 0;
        for stage in GpuProgramType::ALL {
            uniform_block_offsets[stage.index()] = total;
            uniform_block_counts[stage.index()] = caps.param_block_buffers(stage);
            total += caps.param_block_buffers(stage);
        }

        Ok(Self {
            textures,
            texture_units: vec![UNBOUND_SLOT; caps.num_combined_texture_units as usize],
            images,
            image_units,
            uniform_block_offsets,
            uniform_block_counts,
        })
    }

    /// First global texture unit owned by `stage`
    pub fn texture_offset(&self, stage: GpuProgramType) -> u32 {
        self.textures[stage.index()].offset
    }

    /// Global texture unit for a logical sampler index of `stage`
    ///
    /// Returns the unit already holding `sampler_idx`, else the first free
    /// unit, else the next unused unit of the stage. Exhaustion and stages
    /// without texture units are logged and resolve to unit 0.
    pub fn texture_unit(&self, stage: GpuProgramType, sampler_idx: u32) -> u32 {
        if matches!(stage, GpuProgramType::Hull | GpuProgramType::Domain) {
            error!("OpenGL cannot assign textures to {} programs", stage);
            return 0;
        }

        let range = &self.textures[stage.index()];
        let bound = &self.texture_units[range.offset as usize..range.max_bound as usize];
        if let Some(unit) = scan(bound, sampler_idx) {
            return range.offset + unit;
        }

        if range.max_bound - range.offset < range.supported {
            return range.max_bound;
        }

        error!(
            "Cannot find an empty slot to bind texture {} of the {} stage, {} units available",
            sampler_idx, stage, range.supported
        );
        0
    }

    /// Record that `unit` now holds `sampler_idx`, or nothing for `None`
    pub fn commit_texture_unit(&mut self, stage: GpuProgramType, unit: u32, sampler_idx: Option<u32>) {
        let range = &mut self.textures[stage.index()];
        if unit < range.offset || unit >= range.offset + range.supported {
            return;
        }

        let Some(entry) = self.texture_units.get_mut(unit as usize) else {
            return;
        };

        match sampler_idx {
            Some(idx) => {
                *entry = idx;
                range.max_bound = range.max_bound.max(unit + 1);
            }
            None => *entry = UNBOUND_SLOT,
        }
    }

    /// Free the unit holding `sampler_idx`, returning it if there was one
    pub fn release_texture_unit(&mut self, stage: GpuProgramType, sampler_idx: u32) -> Option<u32> {
        let range = &self.textures[stage.index()];
        let start = range.offset as usize;
        let bound = self.texture_units.get_mut(start..range.max_bound as usize)?;
        let pos = bound.iter().position(|&held| held == sampler_idx)?;
        bound[pos] = UNBOUND_SLOT;
        Some(range.offset + pos as u32)
    }

    /// Image unit for a logical load-store index of `stage`
    ///
    /// Only fragment and compute programs can bind load-store textures.
    pub fn image_unit(&self, stage: GpuProgramType, uniform_idx: u32) -> u32 {
        if !matches!(stage, GpuProgramType::Fragment | GpuProgramType::Compute) {
            error!("OpenGL cannot assign load-store textures to {} programs", stage);
            return 0;
        }

        let range = &self.images[stage.index()];
        let table = &self.image_units[stage.index()];
        let bound = &table[..range.max_bound as usize];
        if let Some(unit) = scan(bound, uniform_idx) {
            return unit;
        }

        if range.max_bound < range.supported {
            return range.max_bound;
        }

        error!(
            "Cannot find an empty slot to bind load-store texture {} of the {} stage, {} units available",
            uniform_idx, stage, range.supported
        );
        0
    }

    pub fn commit_image_unit(&mut self, stage: GpuProgramType, unit: u32, uniform_idx: Option<u32>) {
        let range = &mut self.images[stage.index()];
        let Some(entry) = self.image_units[stage.index()].get_mut(unit as usize) else {
            return;
        };

        match uniform_idx {
            Some(idx) => {
                *entry = idx;
                range.max_bound = range.max_bound.max(unit + 1);
            }
            None => *entry = UNBOUND_SLOT,
        }
    }

    /// Global uniform-block binding point for a logical block of `stage`
    pub fn uniform_block_binding(&self, stage: GpuProgramType, binding: u32) -> u32 {
        let count = self.uniform_block_counts[stage.index()];
        if binding >= count {
            error!(
                "Invalid uniform block binding {} for the {} stage, supported range is 0 .. {}",
                binding,
                stage,
                count.saturating_sub(1)
            );
            return 0;
        }

        self.uniform_block_offsets[stage.index()] + binding
    }

    /// Forget every binding of `stage`, called whenever its program changes
    pub fn reset_stage(&mut self, stage: GpuProgramType) {
        let range = &mut self.textures[stage.index()];
        for unit in &mut self.texture_units[range.offset as usize..range.max_bound as usize] {
            *unit = UNBOUND_SLOT;
        }
        range.max_bound = range.offset;

        let images = &mut self.images[stage.index()];
        self.image_units[stage.index()].fill(UNBOUND_SLOT);
        images.max_bound = 0;

        trace!("Reset binding slots of the {} stage", stage);
    }

    /// Bound texture units of `stage`, as (global unit, logical slot)
    pub fn bound_texture_units(&self, stage: GpuProgramType) -> impl Iterator<Item = (u32, u32)> + '_ {
        let range = &self.textures[stage.index()];
        self.texture_units[range.offset as usize..range.max_bound as usize]
            .iter()
            .enumerate()
            .filter(|(_, held)| **held != UNBOUND_SLOT)
            .map(move |(i, held)| (range.offset + i as u32, *held))
    }

    /// Bound image units of `stage`, as (unit, logical slot)
    pub fn bound_image_units(&self, stage: GpuProgramType) -> impl Iterator<Item = (u32, u32)> + '_ {
        let range = &self.images[stage.index()];
        self.image_units[stage.index()][..range.max_bound as usize]
            .iter()
            .enumerate()
            .filter(|(_, held)| **held != UNBOUND_SLOT)
            .map(|(i, held)| (i as u32, *held))
    }
}

/// Index of the entry holding `idx`, else of the first free entry
fn scan(bound: &[u32], idx: u32) -> Option<u32> {
    bound
        .iter()
        .position(|&held| held == idx)
        .or_else(|| bound.iter().position(|&held| held == UNBOUND_SLOT))
        .map(|pos| pos as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> RenderApiCapabilities {
        RenderApiCapabilities {
            num_texture_units_per_stage: [4, 8, 2, 0, 0, 4],
            num_combined_texture_units: 32,
            num_gpu_param_block_buffers_per_stage: [3, 3, 2, 2, 2, 4],
            num_combined_param_block_buffers: 24,
            num_load_store_texture_units_per_stage: [0, 2, 0, 0, 0, 4],
            num_combined_load_store_texture_units: 8,
            ..Default::default()
        }
    }

    #[test]
    fn texture_ranges_start_with_fragment() {
        let slots = SlotAllocator::new(&caps()).unwrap();
        assert_eq!(slots.texture_offset(GpuProgramType::Fragment), 0);
        assert_eq!(slots.texture_offset(GpuProgramType::Vertex), 8);
        assert_eq!(slots.texture_offset(GpuProgramType::Geometry), 12);
        assert_eq!(slots.texture_offset(GpuProgramType::Compute), 14);
    }

    #[test]
    fn uniform_blocks_are_offset_per_stage() {
        let slots = SlotAllocator::new(&caps()).unwrap();
        assert_eq!(slots.uniform_block_binding(GpuProgramType::Vertex, 1), 1);
        assert_eq!(slots.uniform_block_binding(GpuProgramType::Fragment, 0), 3);
        assert_eq!(slots.uniform_block_binding(GpuProgramType::Compute, 3), 12 + 3);
        assert_eq!(slots.uniform_block_binding(GpuProgramType::Geometry, 2), 0);
    }

    #[test]
    fn oversubscribed_partition_is_rejected() {
        let mut caps = caps();
        caps.num_combined_texture_units = 10;
        assert!(SlotAllocator::new(&caps).is_err());
    }

    #[test]
    fn freed_unit_is_reused_first() {
        let mut slots = SlotAllocator::new(&caps()).unwrap();
        let stage = GpuProgramType::Fragment;
        for idx in 0..3 {
            let unit = slots.texture_unit(stage, idx);
            slots.commit_texture_unit(stage, unit, Some(idx));
        }

        assert_eq!(slots.release_texture_unit(stage, 1), Some(1));
        assert_eq!(slots.texture_unit(stage, 7), 1);
        assert_eq!(slots.texture_unit(stage, 2), 2);
    }

    #[test]
    fn bound_slot_keeps_its_unit_within_the_stage() {
        let mut slots = SlotAllocator::new(&caps()).unwrap();
        let stage = GpuProgramType::Vertex;
        let offset = slots.texture_offset(stage);

        let unit = slots.texture_unit(stage, 5);
        slots.commit_texture_unit(stage, unit, Some(5));
        for idx in [9, 2, 7] {
            let other = slots.texture_unit(stage, idx);
            slots.commit_texture_unit(stage, other, Some(idx));
        }
        assert_eq!(slots.texture_unit(stage, 5), unit);

        // Exhausting the stage's four units falls back to unit 0
        assert_eq!(slots.texture_unit(stage, 11), 0);
        assert!(
            slots
                .bound_texture_units(stage)
                .all(|(unit, _)| (offset..offset + 4).contains(&unit))
        );

        slots.commit_texture_unit(stage, unit, None);
        assert_eq!(slots.texture_unit(stage, 11), unit);
    }

    #[test]
    fn reset_stage_reuses_texture_units_from_the_offset() {
        let mut slots = SlotAllocator::new(&caps()).unwrap();
        let stage = GpuProgramType::Fragment;
        for idx in [4, 5, 6] {
            let unit = slots.texture_unit(stage, idx);
            slots.commit_texture_unit(stage, unit, Some(idx));
        }
        assert_eq!(slots.bound_texture_units(stage).count(), 3);

        slots.reset_stage(stage);
        assert_eq!(slots.bound_texture_units(stage).count(), 0);

        // A new pipeline's slots start over at the stage offset
        let unit = slots.texture_unit(stage, 6);
        assert_eq!(unit, slots.texture_offset(stage));
        slots.commit_texture_unit(stage, unit, Some(6));
        assert_eq!(slots.texture_unit(stage, 4), unit + 1);

        // Other stages keep their bindings
        let vertex = GpuProgramType::Vertex;
        let vertex_unit = slots.texture_unit(vertex, 0);
        slots.commit_texture_unit(vertex, vertex_unit, Some(0));
        slots.reset_stage(stage);
        assert_eq!(
            slots.bound_texture_units(vertex).collect::<Vec<_>>(),
            vec![(vertex_unit, 0)]
        );
    }

    #[test]
    fn releasing_an_empty_slot_frees_nothing() {
        let mut slots = SlotAllocator::new(&caps()).unwrap();
        let stage = GpuProgramType::Fragment;
        assert_eq!(slots.release_texture_unit(stage, 3), None);

        let unit = slots.texture_unit(stage, 3);
        slots.commit_texture_unit(stage, unit, Some(3));
        assert_eq!(slots.release_texture_unit(stage, 3), Some(unit));
        assert_eq!(slots.release_texture_unit(stage, 3), None);
        assert_eq!(slots.bound_texture_units(stage).count(), 0);
    }

    #[test]
    fn reset_stage_collapses_the_bound_range() {
        let mut slots = SlotAllocator::new(&caps()).unwrap();
        let stage = GpuProgramType::Compute;
        for idx in 0..3 {
            let unit = slots.image_unit(stage, idx);
            slots.commit_image_unit(stage, unit, Some(idx));
        }
        assert_eq!(slots.bound_image_units(stage).count(), 3);

        slots.reset_stage(stage);
        assert_eq!(slots.bound_image_units(stage).count(), 0);
        assert_eq!(slots.image_unit(stage, 2), 0);
    }

    #[test]
    fn tessellation_stages_cannot_bind_textures() {
        let slots = SlotAllocator::new(&caps()).unwrap();
        assert_eq!(slots.texture_unit(GpuProgramType::Hull, 0), 0);
        assert_eq!(slots.image_unit(GpuProgramType::Vertex, 0), 0);
    }
}
