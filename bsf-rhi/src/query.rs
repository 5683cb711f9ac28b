//! GPU query contracts
//!
//! Queries are issued on the render thread and polled without blocking.
//! Result getters must only be called once `is_ready` reports true.

use crate::RhiResult;

/// Measures GPU time between `begin` and `end`
pub trait TimerQuery {
    fn begin(&mut self);
    fn end(&mut self);
    fn is_ready(&self) -> bool;
    /// Elapsed time in milliseconds
    fn time_ms(&mut self) -> f32;
}

/// Counts samples that pass the depth and stencil tests
pub trait OcclusionQuery {
    fn begin(&mut self);
    fn end(&mut self);
    fn is_ready(&self) -> bool;
    fn num_samples(&mut self) -> u32;
}

/// Signals once the GPU has processed every command issued before it
pub trait EventQuery {
    fn begin(&mut self);
    fn is_ready(&self) -> bool;
}

/// Creates queries for a backend
pub trait QueryFactory {
    type Timer: TimerQuery;
    type Occlusion: OcclusionQuery;

    fn create_timer_query(&mut self) -> RhiResult<Self::Timer>;

    /// `binary` queries only report whether any sample passed (0 or 1)
    fn create_occlusion_query(&mut self, binary: bool) -> RhiResult<Self::Occlusion>;
}
