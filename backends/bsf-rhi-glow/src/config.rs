//! Backend configuration

/// Options applied when the OpenGL render API is created
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GlRenderApiConfig {
    /// Poll `glGetError` after GL calls and log what it reports
    pub check_gl_errors: bool,
    /// Insert debug markers around frames and draws
    pub debug_markers: bool,
    /// Enable `GL_TEXTURE_CUBE_MAP_SEAMLESS` where it is a toggle
    pub seamless_cube_maps: bool,
    /// Treat clockwise winding as front facing
    pub clockwise_front_faces: bool,
    /// Log every VAO / pipeline / framebuffer cache miss
    pub log_cache_misses: bool,
}

impl Default for GlRenderApiConfig {
    fn default() -> Self {
        Self {
            check_gl_errors: cfg!(debug_assertions),
            debug_markers: false,
            seamless_cube_maps: true,
            clockwise_front_faces: true,
            log_cache_misses: false,
        }
    }
}

impl GlRenderApiConfig {
    pub fn with_gl_error_checks(mut self, enabled: bool) -> Self {
        self.check_gl_errors = enabled;
        self
    }

    pub fn with_debug_markers(mut self, enabled: bool) -> Self {
        self.debug_markers = enabled;
        self
    }
}
