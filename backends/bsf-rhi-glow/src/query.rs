//! Timer, occlusion and event queries
//!
//! Queries are recorded into the main command buffer, so they measure the
//! commands recorded around them rather than the moment `begin` is called.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bsf_rhi::{
    CommandBuffer, EventQuery, Fence, OcclusionQuery, QueryFactory, RhiError, RhiResult,
    TimerQuery,
};
use glow::{Context, HasContext};
use tracing::{debug, warn};

use crate::{GlDevice, GlFence, GlVersion, MainCommandBuffer, RawQuery};

fn create_query(gl: &Context) -> RhiResult<RawQuery> {
    unsafe { gl.create_query() }
        .map_err(|e| RhiError::rendering_api(format!("failed to create query: {}", e)))
}

fn result_available(gl: &Context, query: RawQuery) -> bool {
    unsafe { gl.get_query_parameter_u32(query, glow::QUERY_RESULT_AVAILABLE) != 0 }
}

fn result_u64(gl: &Context, query: RawQuery) -> u64 {
    let mut value = 0u64;
    // No query buffer is ever bound, so the offset is read as a client pointer
    unsafe {
        gl.get_query_parameter_u64_with_offset(
            query,
            glow::QUERY_RESULT,
            &mut value as *mut u64 as usize,
        );
    }
    value
}

/// GPU time between two timestamps
///
/// Without timestamp queries (OpenGL ES) the timer still completes but
/// always reports zero.
pub struct GlTimerQuery {
    gl: Rc<Context>,
    timestamps: Option<(RawQuery, RawQuery)>,
    main: MainCommandBuffer,
    end_issued: Rc<Cell<bool>>,
    time_ms: Option<f32>,
}

impl GlTimerQuery {
    fn new(gl: Rc<Context>, version: GlVersion, main: MainCommandBuffer) -> RhiResult<Self> {
        let timestamps = if version.timer_query_support() {
            let begin = create_query(&gl)?;
            match create_query(&gl) {
                Ok(end) => Some((begin, end)),
                Err(e) => {
                    unsafe { gl.delete_query(begin) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            gl,
            timestamps,
            main,
            end_issued: Rc::new(Cell::new(false)),
            time_ms: None,
        })
    }
}

impl TimerQuery for GlTimerQuery {
    fn begin(&mut self) {
        self.time_ms = None;
        self.end_issued.set(false);

        if let Some((begin, _)) = self.timestamps {
            self.main
                .borrow_mut()
                .queue_command(move |device: &mut GlDevice| unsafe {
                    device.gl().query_counter(begin, glow::TIMESTAMP);
                });
        }
    }

    fn end(&mut self) {
        let end = self.timestamps.map(|(_, end)| end);
        let end_issued = Rc::clone(&self.end_issued);

        self.main
            .borrow_mut()
            .queue_command(move |device: &mut GlDevice| {
                if let Some(end) = end {
                    unsafe { device.gl().query_counter(end, glow::TIMESTAMP) };
                }
                end_issued.set(true);
            });
    }

    fn is_ready(&self) -> bool {
        if !self.end_issued.get() {
            return false;
        }

        match self.timestamps {
            Some((_, end)) => result_available(&self.gl, end),
            None => true,
        }
    }

    fn time_ms(&mut self) -> f32 {
        if let Some(time_ms) = self.time_ms {
            return time_ms;
        }

        let time_ms = match self.timestamps {
            Some((begin, end)) => {
                let elapsed = result_u64(&self.gl, end).saturating_sub(result_u64(&self.gl, begin));
                (elapsed as f64 / 1_000_000.0) as f32
            }
            None => 0.0,
        };

        self.time_ms = Some(time_ms);
        time_ms
    }
}

impl Drop for GlTimerQuery {
    fn drop(&mut self) {
        if let Some((begin, end)) = self.timestamps.take() {
            unsafe {
                self.gl.delete_query(begin);
                self.gl.delete_query(end);
            }
        }
    }
}

/// Samples passing the depth and stencil tests
pub struct GlOcclusionQuery {
    gl: Rc<Context>,
    raw: RawQuery,
    target: u32,
    main: MainCommandBuffer,
    end_issued: Rc<Cell<bool>>,
    num_samples: Option<u32>,
}

impl GlOcclusionQuery {
    fn new(
        gl: Rc<Context>,
        version: GlVersion,
        binary: bool,
        main: MainCommandBuffer,
    ) -> RhiResult<Self> {
        if version.is_es && !binary {
            warn!("{} only reports whether any sample passed", version);
        }

        let raw = create_query(&gl)?;
        Ok(Self {
            gl,
            raw,
            target: occlusion_target(version, binary),
            main,
            end_issued: Rc::new(Cell::new(false)),
            num_samples: None,
        })
    }

    /// `GL_ANY_SAMPLES_PASSED` queries only report zero or one
    pub fn is_binary(&self) -> bool {
        self.target == glow::ANY_SAMPLES_PASSED
    }
}

impl OcclusionQuery for GlOcclusionQuery {
    fn begin(&mut self) {
        self.num_samples = None;
        self.end_issued.set(false);

        let (raw, target) = (self.raw, self.target);
        self.main
            .borrow_mut()
            .queue_command(move |device: &mut GlDevice| unsafe {
                device.gl().begin_query(target, raw);
            });
    }

    fn end(&mut self) {
        let target = self.target;
        let end_issued = Rc::clone(&self.end_issued);

        self.main
            .borrow_mut()
            .queue_command(move |device: &mut GlDevice| {
                unsafe { device.gl().end_query(target) };
                end_issued.set(true);
            });
    }

    fn is_ready(&self) -> bool {
        self.end_issued.get() && result_available(&self.gl, self.raw)
    }

    fn num_samples(&mut self) -> u32 {
        *self.num_samples.get_or_insert_with(|| unsafe {
            self.gl.get_query_parameter_u32(self.raw, glow::QUERY_RESULT)
        })
    }
}

impl Drop for GlOcclusionQuery {
    fn drop(&mut self) {
        unsafe { self.gl.delete_query(self.raw) };
    }
}

/// Occlusion query target, ES only has boolean occlusion
pub fn occlusion_target(version: GlVersion, binary: bool) -> u32 {
    if binary || version.is_es {
        glow::ANY_SAMPLES_PASSED
    } else {
        glow::SAMPLES_PASSED
    }
}

/// Fence signaled once the commands recorded before it have completed
pub struct GlEventQuery {
    main: MainCommandBuffer,
    fence: Rc<RefCell<Option<GlFence>>>,
}

impl EventQuery for GlEventQuery {
    fn begin(&mut self) {
        self.fence.borrow_mut().take();

        let fence = Rc::clone(&self.fence);
        self.main
            .borrow_mut()
            .queue_command(move |device: &mut GlDevice| {
                *fence.borrow_mut() = GlFence::insert(device.gl());
            });
    }

    fn is_ready(&self) -> bool {
        self.fence.borrow().as_ref().is_some_and(Fence::is_signaled)
    }
}

/// Creates queries recorded into the render API's main command buffer
#[derive(Clone)]
pub struct GlQueryFactory {
    gl: Rc<Context>,
    version: GlVersion,
    main: MainCommandBuffer,
}

impl GlQueryFactory {
    pub(crate) fn new(gl: Rc<Context>, version: GlVersion, main: MainCommandBuffer) -> Self {
        Self { gl, version, main }
    }

    pub fn create_event_query(&self) -> GlEventQuery {
        GlEventQuery {
            main: Rc::clone(&self.main),
            fence: Rc::new(RefCell::new(None)),
        }
    }
}

impl QueryFactory for GlQueryFactory {
    type Timer = GlTimerQuery;
    type Occlusion = GlOcclusionQuery;

    fn create_timer_query(&mut self) -> RhiResult<GlTimerQuery> {
        debug!("Creating timer query");
        GlTimerQuery::new(Rc::clone(&self.gl), self.version, Rc::clone(&self.main))
    }

    fn create_occlusion_query(&mut self, binary: bool) -> RhiResult<GlOcclusionQuery> {
        debug!("Creating occlusion query (binary: {})", binary);
        GlOcclusionQuery::new(Rc::clone(&self.gl), self.version, binary, Rc::clone(&self.main))
    }
}

impl std::fmt::Debug for GlQueryFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlQueryFactory")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn es_occlusion_is_always_binary() {
        let gl45 = GlVersion::new(4, 5, false);
        assert_eq!(occlusion_target(gl45, false), glow::SAMPLES_PASSED);
        assert_eq!(occlusion_target(gl45, true), glow::ANY_SAMPLES_PASSED);

        let es32 = GlVersion::new(3, 2, true);
        assert_eq!(occlusion_target(es32, false), glow::ANY_SAMPLES_PASSED);
    }
}
