//! Glow (OpenGL) backend for the bsf render hardware interface
//!
//! This crate implements the [`bsf_rhi::RenderApi`] contracts on top of the
//! Glow OpenGL abstraction. The host creates the GL context and hands it
//! over; everything else (resources, deferred command buffers, binding slots,
//! derived-object caches and queries) is managed here.
//!
//! # Features
//!
//! - **Deferred recording**: every operation records into a command buffer
//!   that runs against the [`GlDevice`] on submission
//! - **Slot allocation**: logical per-stage bindings resolve to global
//!   texture, image and uniform-block units
//! - **Derived object caches**: VAOs, linked pipelines and framebuffers are
//!   created on first use and evicted when their resources are destroyed
//! - **OpenGL compatibility**: OpenGL 4.1+ and OpenGL ES 3.1+
//!
//! # Example
//!
//! ```rust,no_run
//! use bsf_rhi::{Color, FrameBufferType, RenderApi};
//! use bsf_rhi_glow::{GlRenderApi, GlRenderApiConfig};
//!
//! let gl = unsafe {
//!     glow::Context::from_loader_function(|_s| {
//!         // Your OpenGL loader function
//!         std::ptr::null()
//!     })
//! };
//! let mut rapi = GlRenderApi::new(gl, GlRenderApiConfig::default()).unwrap();
//!
//! // In your render loop:
//! rapi.begin_frame(None);
//! rapi.clear_render_target(FrameBufferType::COLOR, Color::BLACK, 1.0, 0, 0xFF, None);
//! // ... bind pipelines and draw ...
//! rapi.end_frame(None);
//! rapi.submit_command_buffer(None);
//! ```

#![deny(rust_2018_idioms)]

use std::ffi::c_char;

// Re-export glow to make it easier for users to use the correct version.
pub use glow;
use glow::{Context, HasContext};
use tracing::error;

mod buffer;
mod cache;
mod caps;
mod command_buffer;
mod config;
mod device;
mod error;
mod eviction;
mod framebuffer;
mod program;
mod program_pipeline;
mod query;
mod render_api;
mod render_target;
mod sampler;
mod slots;
mod state;
mod texture;
mod versions;
mod vertex_array;

pub use buffer::*;
pub use cache::*;
pub use caps::*;
pub use command_buffer::*;
pub use config::*;
pub use device::*;
pub use error::*;
pub use eviction::*;
pub use framebuffer::*;
pub use program::*;
pub use program_pipeline::*;
pub use query::*;
pub use render_api::*;
pub use render_target::*;
pub use sampler::*;
pub use slots::*;
pub use state::*;
pub use texture::*;
pub use versions::*;
pub use vertex_array::*;

/// Identifier the host uses to find this backend
pub const PLUGIN_NAME: &str = "bsf-rhi-glow";

/// Plugin entry point for hosts loading the backend dynamically
#[unsafe(no_mangle)]
pub extern "C" fn get_plugin_name() -> *const c_char {
    c"bsf-rhi-glow".as_ptr()
}

pub type RawBuffer = <Context as HasContext>::Buffer;
pub type RawTexture = <Context as HasContext>::Texture;
pub type RawSampler = <Context as HasContext>::Sampler;
pub type RawVertexArray = <Context as HasContext>::VertexArray;
pub type RawShader = <Context as HasContext>::Shader;
pub type RawProgram = <Context as HasContext>::Program;
pub type RawFramebuffer = <Context as HasContext>::Framebuffer;
pub type RawQuery = <Context as HasContext>::Query;
pub type RawFence = <Context as HasContext>::Fence;
pub type RawUniformLocation = <Context as HasContext>::UniformLocation;

/// Log any pending GL errors, tagged with the operation that produced them
///
/// Returns whether an error was found.
pub(crate) fn check_gl_error(gl: &Context, operation: &str) -> bool {
    let mut found = false;
    loop {
        let code = unsafe { gl.get_error() };
        if code == glow::NO_ERROR {
            break;
        }
        found = true;
        error!("OpenGL error in {}: {} (0x{:04X})", operation, gl_error_name(code), code);
    }
    found
}

fn gl_error_name(code: u32) -> &'static str {
    match code {
        glow::INVALID_ENUM => "GL_INVALID_ENUM",
        glow::INVALID_VALUE => "GL_INVALID_VALUE",
        glow::INVALID_OPERATION => "GL_INVALID_OPERATION",
        glow::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        glow::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        glow::STACK_UNDERFLOW => "GL_STACK_UNDERFLOW",
        glow::STACK_OVERFLOW => "GL_STACK_OVERFLOW",
        _ => "unknown error",
    }
}

/// Debug message helper for OpenGL debugging
#[cfg(feature = "debug_message_insert_support")]
pub(crate) fn gl_debug_message(gl: &Context, message: &str) {
    unsafe {
        gl.debug_message_insert(
            glow::DEBUG_SOURCE_APPLICATION,
            glow::DEBUG_TYPE_MARKER,
            0,
            glow::DEBUG_SEVERITY_NOTIFICATION,
            message,
        );
    }
}

#[cfg(not(feature = "debug_message_insert_support"))]
pub(crate) fn gl_debug_message(_gl: &Context, _message: &str) {
    // No-op when debug messages are not supported
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn plugin_name_matches_entry_point() {
        let name = unsafe { CStr::from_ptr(get_plugin_name()) };
        assert_eq!(name.to_str().unwrap(), PLUGIN_NAME);
    }
}
