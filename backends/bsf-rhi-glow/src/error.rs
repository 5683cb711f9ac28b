//! Error types for the OpenGL backend

use bsf_rhi::RhiError;
use thiserror::Error;

/// Errors that can occur while creating the backend or its GPU objects
#[derive(Error, Debug)]
pub enum InitError {
    /// Failed to create OpenGL buffer object
    #[error("Failed to create buffer object: {0}")]
    CreateBufferObject(String),

    /// Failed to create OpenGL texture
    #[error("Failed to create texture: {0}")]
    CreateTexture(String),

    /// Failed to create OpenGL sampler object
    #[error("Failed to create sampler: {0}")]
    CreateSampler(String),

    /// Failed to create OpenGL shader
    #[error("Failed to create shader: {0}")]
    CreateShader(String),

    /// Failed to compile shader
    #[error("Failed to compile shader: {0}")]
    CompileShader(String),

    /// Failed to link shader program
    #[error("Failed to link program: {0}")]
    LinkProgram(String),

    /// Failed to create vertex array object
    #[error("Failed to create vertex array: {0}")]
    CreateVertexArray(String),

    /// Failed to create or complete a framebuffer object
    #[error("Failed to create framebuffer: {0}")]
    CreateFramebuffer(String),

    /// OpenGL version not supported
    #[error("Unsupported OpenGL version: {0}")]
    UnsupportedVersion(String),

    /// Device limits are inconsistent
    #[error(transparent)]
    Capabilities(#[from] RhiError),
}

/// Errors that can occur while rendering
#[derive(Error, Debug)]
pub enum RenderError {
    /// OpenGL error
    #[error("OpenGL error: {0}")]
    OpenGLError(String),

    /// Operation invalid for the resource it was called on
    #[error("Invalid resource usage: {0}")]
    InvalidUsage(String),

    /// Read or write outside of a resource's bounds
    #[error("Out of bounds access: {0}")]
    OutOfBounds(String),
}

/// Result type for initialization operations
pub type InitResult<T> = Result<T, InitError>;

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
