//! OpenGL version detection and feature support

use glow::{Context, HasContext};

use crate::{InitError, InitResult};

/// OpenGL version information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
    pub is_es: bool,
}

impl GlVersion {
    /// Oldest desktop version the backend runs on
    pub const MIN_DESKTOP: GlVersion = GlVersion::new(4, 1, false);
    /// Oldest embedded version the backend runs on
    pub const MIN_ES: GlVersion = GlVersion::new(3, 1, true);

    pub const fn new(major: u32, minor: u32, is_es: bool) -> Self {
        Self {
            major,
            minor,
            is_es,
        }
    }

    /// Read the OpenGL version from the current context
    pub fn read(gl: &Context) -> Self {
        let version_string = unsafe { gl.get_parameter_string(glow::VERSION) };
        Self::parse(&version_string)
    }

    /// Parse OpenGL version from version string
    pub fn parse(version_string: &str) -> Self {
        // Examples:
        // "4.6.0 NVIDIA 460.89"
        // "OpenGL ES 3.2 Mesa 23.1.0"
        // "WebGL 2.0 (OpenGL ES 3.0 Chromium)"

        let is_es = version_string.contains("OpenGL ES") || version_string.contains("WebGL");

        let (major, minor) = if let Some(es) = version_string.find("OpenGL ES ") {
            Self::parse_version_numbers(&version_string[es + "OpenGL ES ".len()..])
                .unwrap_or((2, 0))
        } else if version_string.contains("WebGL 2.0") {
            (3, 0)
        } else if is_es {
            Self::parse_version_numbers(version_string).unwrap_or((2, 0))
        } else {
            Self::parse_version_numbers(version_string).unwrap_or((2, 1))
        };

        Self {
            major,
            minor,
            is_es,
        }
    }

    fn parse_version_numbers(version_string: &str) -> Option<(u32, u32)> {
        // Look for pattern like "3.2" or "4.6.0"
        for word in version_string.split_whitespace() {
            if let Some(dot_pos) = word.find('.') {
                let major_str = &word[..dot_pos];
                let rest = &word[dot_pos + 1..];

                if let Ok(major) = major_str.parse::<u32>() {
                    let minor_str: String = rest.chars().take_while(char::is_ascii_digit).collect();

                    if let Ok(minor) = minor_str.parse::<u32>() {
                        return Some((major, minor));
                    }
                }
            }
        }
        None
    }

    #[inline]
    fn at_least(self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }

    /// Whether the backend can run on this version
    pub fn is_supported(self) -> bool {
        if self.is_es {
            self.at_least(Self::MIN_ES.major, Self::MIN_ES.minor)
        } else {
            self.at_least(Self::MIN_DESKTOP.major, Self::MIN_DESKTOP.minor)
        }
    }

    /// Fail with [`InitError::UnsupportedVersion`] below GL 4.1 / ES 3.1
    pub fn ensure_supported(self) -> InitResult<()> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(InitError::UnsupportedVersion(format!(
                "{}, at least OpenGL {}.{} or OpenGL ES {}.{} is required",
                self,
                Self::MIN_DESKTOP.major,
                Self::MIN_DESKTOP.minor,
                Self::MIN_ES.major,
                Self::MIN_ES.minor
            )))
        }
    }

    /// Check if this version supports compute programs
    pub fn compute_support(self) -> bool {
        if self.is_es {
            self.at_least(3, 1)
        } else {
            self.at_least(4, 3)
        }
    }

    /// Check if this version supports load-store images (`glBindImageTexture`)
    pub fn load_store_support(self) -> bool {
        if self.is_es {
            self.at_least(3, 1)
        } else {
            self.at_least(4, 2)
        }
    }

    /// Check if this version supports geometry programs
    pub fn geometry_support(self) -> bool {
        if self.is_es {
            self.at_least(3, 2)
        } else {
            self.at_least(3, 2)
        }
    }

    /// Check if this version supports tessellation programs
    pub fn tessellation_support(self) -> bool {
        if self.is_es {
            self.at_least(3, 2)
        } else {
            self.at_least(4, 0)
        }
    }

    /// Check if this version supports texture views
    pub fn texture_view_support(self) -> bool {
        !self.is_es && self.at_least(4, 3)
    }

    /// Check if this version supports timestamp queries
    pub fn timer_query_support(self) -> bool {
        !self.is_es && self.at_least(3, 3)
    }

    /// Check if this version supports `GL_TEXTURE_CUBE_MAP_SEAMLESS`
    pub fn seamless_cubemap_support(self) -> bool {
        if self.is_es {
            // Always on in ES 3.0+, not a toggle
            false
        } else {
            self.at_least(3, 2)
        }
    }

    /// Check if this version supports glPolygonMode
    pub fn polygon_mode_support(self) -> bool {
        !self.is_es // Not supported in OpenGL ES
    }

    /// Check if this version supports `GL_DEPTH_CLAMP`
    pub fn depth_clamp_support(self) -> bool {
        !self.is_es && self.at_least(3, 2)
    }

    /// Check if this version supports `GL_FRAMEBUFFER_SRGB` toggling
    pub fn framebuffer_srgb_support(self) -> bool {
        !self.is_es
    }
}

impl std::fmt::Display for GlVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_es {
            write!(f, "OpenGL ES {}.{}", self.major, self.minor)
        } else {
            write!(f, "OpenGL {}.{}", self.major, self.minor)
        }
    }
}

/// GLSL version information
#[derive(Debug, Clone)]
pub struct GlslVersion {
    pub version_string: String,
}

impl GlslVersion {
    /// Get the appropriate GLSL version string for the given OpenGL version
    pub fn for_gl_version(gl_version: GlVersion) -> Self {
        let version_string = if gl_version.is_es {
            match (gl_version.major, gl_version.minor) {
                (3, minor) if minor >= 2 => "#version 320 es".to_string(),
                (3, 1) => "#version 310 es".to_string(),
                (major, _) if major > 3 => "#version 320 es".to_string(),
                _ => "#version 300 es".to_string(),
            }
        } else {
            match (gl_version.major, gl_version.minor) {
                (4, minor) if minor >= 6 => "#version 460 core".to_string(),
                (4, minor) if minor >= 5 => "#version 450 core".to_string(),
                (4, minor) if minor >= 4 => "#version 440 core".to_string(),
                (4, minor) if minor >= 3 => "#version 430 core".to_string(),
                (4, minor) if minor >= 2 => "#version 420 core".to_string(),
                (4, minor) if minor >= 1 => "#version 410 core".to_string(),
                (4, 0) => "#version 400 core".to_string(),
                (major, _) if major > 4 => "#version 460 core".to_string(),
                _ => "#version 330 core".to_string(),
            }
        };

        Self { version_string }
    }

    /// Get the version string
    pub fn as_str(&self) -> &str {
        &self.version_string
    }

    /// Prepend the version directive to `source` unless it already has one
    pub fn apply(&self, source: &str) -> String {
        if source.trim_start().starts_with("#version") {
            source.to_owned()
        } else if self.version_string.ends_with(" es") {
            format!(
                "{}\nprecision highp float;\nprecision highp int;\n{}",
                self.version_string, source
            )
        } else {
            format!("{}\n{}", self.version_string, source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_desktop_versions() {
        assert_eq!(
            GlVersion::parse("4.6.0 NVIDIA 460.89"),
            GlVersion::new(4, 6, false)
        );
        assert_eq!(
            GlVersion::parse("4.1 ATI-4.14.1"),
            GlVersion::new(4, 1, false)
        );
    }

    #[test]
    fn parses_es_versions() {
        assert_eq!(
            GlVersion::parse("OpenGL ES 3.2 Mesa 23.1.0"),
            GlVersion::new(3, 2, true)
        );
        assert_eq!(
            GlVersion::parse("OpenGL ES 3.1 v1.r32p1"),
            GlVersion::new(3, 1, true)
        );
        assert_eq!(
            GlVersion::parse("WebGL 2.0 (OpenGL ES 3.0 Chromium)"),
            GlVersion::new(3, 0, true)
        );
    }

    #[test]
    fn old_versions_are_rejected() {
        assert!(GlVersion::new(4, 1, false).ensure_supported().is_ok());
        assert!(GlVersion::new(3, 1, true).ensure_supported().is_ok());
        assert!(matches!(
            GlVersion::new(3, 3, false).ensure_supported(),
            Err(InitError::UnsupportedVersion(_))
        ));
        assert!(GlVersion::new(3, 0, true).ensure_supported().is_err());
    }

    #[test]
    fn feature_predicates() {
        let gl41 = GlVersion::new(4, 1, false);
        assert!(!gl41.compute_support());
        assert!(gl41.tessellation_support());
        assert!(gl41.timer_query_support());

        let es31 = GlVersion::new(3, 1, true);
        assert!(es31.compute_support());
        assert!(!es31.geometry_support());
        assert!(!es31.timer_query_support());
    }

    #[test]
    fn glsl_preamble() {
        let glsl = GlslVersion::for_gl_version(GlVersion::new(3, 1, true));
        assert_eq!(glsl.as_str(), "#version 310 es");
        assert!(glsl.apply("void main() {}").contains("precision highp float;"));

        let glsl = GlslVersion::for_gl_version(GlVersion::new(4, 5, false));
        assert_eq!(
            glsl.apply("void main() {}"),
            "#version 450 core\nvoid main() {}"
        );
        assert_eq!(glsl.apply("#version 330 core\n"), "#version 330 core\n");
    }
}
