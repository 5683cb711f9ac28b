//! Render statistics counters

use std::ops::Sub;
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter tracked by [`RenderStats`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderStat {
    DrawCalls,
    ComputeCalls,
    RenderTargetChanges,
    Presents,
    Clears,
    Vertices,
    Primitives,
    PipelineStateChanges,
    GpuParamBinds,
    VertexBufferBinds,
    IndexBufferBinds,
    ResourceWrites,
    ResourceReads,
    ObjectsCreated,
    ObjectsDestroyed,
}

impl RenderStat {
    const COUNT: usize = 15;
}

/// Atomic render counters, shared between a backend and its profiler
#[derive(Debug, Default)]
pub struct RenderStats {
    counters: [AtomicU64; RenderStat::COUNT],
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self, stat: RenderStat) {
        self.add(stat, 1);
    }

    #[inline]
    pub fn add(&self, stat: RenderStat, value: u64) {
        self.counters[stat as usize].fetch_add(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, stat: RenderStat) -> u64 {
        self.counters[stat as usize].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RenderStatsSnapshot {
        RenderStatsSnapshot {
            num_draw_calls: self.get(RenderStat::DrawCalls),
            num_compute_calls: self.get(RenderStat::ComputeCalls),
            num_render_target_changes: self.get(RenderStat::RenderTargetChanges),
            num_presents: self.get(RenderStat::Presents),
            num_clears: self.get(RenderStat::Clears),
            num_vertices: self.get(RenderStat::Vertices),
            num_primitives: self.get(RenderStat::Primitives),
            num_pipeline_state_changes: self.get(RenderStat::PipelineStateChanges),
            num_gpu_param_binds: self.get(RenderStat::GpuParamBinds),
            num_vertex_buffer_binds: self.get(RenderStat::VertexBufferBinds),
            num_index_buffer_binds: self.get(RenderStat::IndexBufferBinds),
            num_resource_writes: self.get(RenderStat::ResourceWrites),
            num_resource_reads: self.get(RenderStat::ResourceReads),
            num_objects_created: self.get(RenderStat::ObjectsCreated),
            num_objects_destroyed: self.get(RenderStat::ObjectsDestroyed),
        }
    }
}

/// Point-in-time copy of [`RenderStats`]
///
/// Subtracting two snapshots yields the work done between them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderStatsSnapshot {
    pub num_draw_calls: u64,
    pub num_compute_calls: u64,
    pub num_render_target_changes: u64,
    pub num_presents: u64,
    pub num_clears: u64,
    pub num_vertices: u64,
    pub num_primitives: u64,
    pub num_pipeline_state_changes: u64,
    pub num_gpu_param_binds: u64,
    pub num_vertex_buffer_binds: u64,
    pub num_index_buffer_binds: u64,
    pub num_resource_writes: u64,
    pub num_resource_reads: u64,
    pub num_objects_created: u64,
    pub num_objects_destroyed: u64,
}

impl Sub for RenderStatsSnapshot {
    type Output = RenderStatsSnapshot;

    fn sub(self, rhs: Self) -> Self::Output {
        RenderStatsSnapshot {
            num_draw_calls: self.num_draw_calls.saturating_sub(rhs.num_draw_calls),
            num_compute_calls: self.num_compute_calls.saturating_sub(rhs.num_compute_calls),
            num_render_target_changes: self
                .num_render_target_changes
                .saturating_sub(rhs.num_render_target_changes),
            num_presents: self.num_presents.saturating_sub(rhs.num_presents),
            num_clears: self.num_clears.saturating_sub(rhs.num_clears),
            num_vertices: self.num_vertices.saturating_sub(rhs.num_vertices),
            num_primitives: self.num_primitives.saturating_sub(rhs.num_primitives),
            num_pipeline_state_changes: self
                .num_pipeline_state_changes
                .saturating_sub(rhs.num_pipeline_state_changes),
            num_gpu_param_binds: self
                .num_gpu_param_binds
                .saturating_sub(rhs.num_gpu_param_binds),
            num_vertex_buffer_binds: self
                .num_vertex_buffer_binds
                .saturating_sub(rhs.num_vertex_buffer_binds),
            num_index_buffer_binds: self
                .num_index_buffer_binds
                .saturating_sub(rhs.num_index_buffer_binds),
            num_resource_writes: self
                .num_resource_writes
                .saturating_sub(rhs.num_resource_writes),
            num_resource_reads: self
                .num_resource_reads
                .saturating_sub(rhs.num_resource_reads),
            num_objects_created: self
                .num_objects_created
                .saturating_sub(rhs.num_objects_created),
            num_objects_destroyed: self
                .num_objects_destroyed
                .saturating_sub(rhs.num_objects_destroyed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_subtract_to_deltas() {
        let stats = RenderStats::new();
        stats.add(RenderStat::DrawCalls, 3);
        let before = stats.snapshot();

        stats.increment(RenderStat::DrawCalls);
        stats.add(RenderStat::Primitives, 12);
        let delta = stats.snapshot() - before;

        assert_eq!(delta.num_draw_calls, 1);
        assert_eq!(delta.num_primitives, 12);
        assert_eq!(delta.num_clears, 0);
    }

    #[test]
    fn counters_are_independent() {
        let stats = RenderStats::new();
        stats.increment(RenderStat::ObjectsCreated);
        stats.increment(RenderStat::ObjectsCreated);
        stats.increment(RenderStat::ObjectsDestroyed);
        assert_eq!(stats.get(RenderStat::ObjectsCreated), 2);
        assert_eq!(stats.get(RenderStat::ObjectsDestroyed), 1);
        assert_eq!(stats.get(RenderStat::Presents), 0);
    }
}
