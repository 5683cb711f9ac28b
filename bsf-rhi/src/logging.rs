//! Logging setup and render-thread log helpers
//!
//! Backends log through `tracing`. The subscriber helpers here are a
//! convenience for hosts and tests that do not install their own.

use tracing::{debug, info};

use crate::{RenderApiCapabilities, RenderStatsSnapshot};

/// Filter used when `RUST_LOG` is unset: backend targets at info, the rest at warn
pub const DEFAULT_LOG_FILTER: &str = "bsf_rhi=info,bsf_rhi_glow=info,warn";

/// Install a `fmt` subscriber filtered by `RUST_LOG`, else by `default_filter`
///
/// Output goes through the test writer so `cargo test` captures it per test.
/// Returns false if a global subscriber was already installed.
#[cfg(feature = "logging")]
pub fn init_tracing(default_filter: &str) -> bool {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "logging"))]
pub fn init_tracing(_default_filter: &str) -> bool {
    false
}

/// Log backend initialization
pub fn log_render_api_init(backend: &str, caps: &RenderApiCapabilities) {
    info!(
        "{} initialized on {} ({}), driver {}",
        backend, caps.device_name, caps.vendor, caps.driver_version
    );
    debug!(
        "Combined units - textures: {}, uniform blocks: {}, load-store: {}",
        caps.num_combined_texture_units,
        caps.num_combined_param_block_buffers,
        caps.num_combined_load_store_texture_units
    );
}

/// Log per-frame render statistics
pub fn log_frame_stats(stats: &RenderStatsSnapshot) {
    debug!(
        "Render stats - Draw calls: {}, Vertices: {}, Primitives: {}, Pipeline changes: {}",
        stats.num_draw_calls,
        stats.num_vertices,
        stats.num_primitives,
        stats.num_pipeline_state_changes
    );
}
