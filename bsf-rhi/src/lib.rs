//! # bsf-rhi - render hardware interface contracts
//!
//! Backend-agnostic types and traits a render backend implements: pipeline
//! stages, capabilities, vertex declarations, resource descriptions, the
//! deferred command buffer model, GPU queries and the [`RenderApi`] itself.
//!
//! The crate also hosts the [`GpuProfiler`], which only needs a
//! [`QueryFactory`] from the backend.
//!
//! ## Features
//!
//! - Deferred command buffers with fence-derived lifecycle state
//! - Nested GPU profiling with a bounded, thread-safe report queue
//! - Atomic render statistics shared with the profiler
//!
//! ```no_run
//! use std::sync::Arc;
//! use bsf_rhi::{GpuProfiler, ProfilerConfig, QueryFactory, RenderStats};
//!
//! fn profile_frame<F: QueryFactory>(factory: F) -> bsf_rhi::RhiResult<()> {
//!     let stats = Arc::new(RenderStats::new());
//!     let mut profiler = GpuProfiler::new(factory, stats, ProfilerConfig::default());
//!
//!     profiler.begin_frame()?;
//!     profiler.begin_sample("Shadows")?;
//!     profiler.end_sample("Shadows");
//!     profiler.end_frame();
//!
//!     profiler.update();
//!     while let Some(report) = profiler.next_report() {
//!         println!("frame took {} ms", report.frame_sample.time_ms);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(rust_2018_idioms)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub use self::capabilities::*;
pub use self::command_buffer::*;
pub use self::error::*;
pub use self::profiler::*;
pub use self::query::*;
pub use self::render_api::*;
pub use self::resources::*;
pub use self::states::*;
pub use self::stats::*;
pub use self::types::*;
pub use self::vertex::*;

mod capabilities;
mod command_buffer;
mod error;
pub mod logging;
mod profiler;
mod query;
mod render_api;
mod resources;
mod states;
mod stats;
mod types;
mod vertex;
