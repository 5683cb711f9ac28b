//! GPU profiler
//!
//! Samples are recorded on the render thread between [`GpuProfiler::begin_frame`]
//! and [`GpuProfiler::end_frame`]. Their queries resolve asynchronously; each
//! [`GpuProfiler::update`] turns finished frames into [`GpuProfilerReport`]s
//! that any thread can drain from the shared [`GpuReportQueue`].
//!
//! Frames are assumed to complete on the GPU in submission order, so only
//! the oldest unresolved frame is ever polled.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::{
    OcclusionQuery, QueryFactory, RenderStats, RenderStatsSnapshot, RhiResult, TimerQuery,
};

/// Default number of reports kept before the oldest is dropped
pub const MAX_QUEUE_ELEMENTS: usize = 5;

/// Profiler settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProfilerConfig {
    /// Reports kept in the queue before the oldest unread one is dropped
    pub report_capacity: usize,
    /// Name given to the root sample of each frame
    pub frame_sample_name: String,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            report_capacity: MAX_QUEUE_ELEMENTS,
            frame_sample_name: "Frame".to_owned(),
        }
    }
}

/// A resolved sample and its children
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuProfileSample {
    pub name: String,
    pub time_ms: f32,
    /// Work recorded between the sample's begin and end
    pub stats: RenderStatsSnapshot,
    pub children: Vec<GpuProfileSample>,
}

impl GpuProfileSample {
    pub fn find_child(&self, name: &str) -> Option<&GpuProfileSample> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Profiling results of one frame
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuProfilerReport {
    pub frame_sample: GpuProfileSample,
    /// Samples that passed depth and stencil tests during the frame
    pub num_drawn_samples: u32,
}

/// Bounded queue of reports shared between the render thread and readers
#[derive(Debug)]
pub struct GpuReportQueue {
    reports: Mutex<VecDeque<GpuProfilerReport>>,
    capacity: usize,
}

impl GpuReportQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            reports: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a report, dropping the oldest unread one when full
    pub fn push(&self, report: GpuProfilerReport) {
        let mut reports = self.reports.lock();
        if reports.len() >= self.capacity {
            reports.pop_front();
            debug!("GPU profiler report queue full, dropped the oldest report");
        }
        reports.push_back(report);
    }

    /// Oldest unread report
    pub fn next_report(&self) -> Option<GpuProfilerReport> {
        self.reports.lock().pop_front()
    }

    pub fn num_available_reports(&self) -> usize {
        self.reports.lock().len()
    }
}

struct ActiveSample<T> {
    name: String,
    timer: T,
    start_stats: RenderStatsSnapshot,
    end_stats: RenderStatsSnapshot,
    children: Vec<usize>,
}

struct ActiveFrame<T, O> {
    /// Index 0 is the frame sample
    samples: Vec<ActiveSample<T>>,
    /// Indices of open samples, innermost last
    open: Vec<usize>,
    occlusion: O,
}

/// Hierarchical GPU profiler generic over the backend's queries
pub struct GpuProfiler<F: QueryFactory> {
    factory: F,
    stats: Arc<RenderStats>,
    frame_sample_name: String,
    frame: Option<ActiveFrame<F::Timer, F::Occlusion>>,
    unresolved: VecDeque<ActiveFrame<F::Timer, F::Occlusion>>,
    free_timer_queries: Vec<F::Timer>,
    free_occlusion_queries: Vec<F::Occlusion>,
    reports: Arc<GpuReportQueue>,
}

impl<F: QueryFactory> GpuProfiler<F> {
    pub fn new(factory: F, stats: Arc<RenderStats>, config: ProfilerConfig) -> Self {
        Self {
            factory,
            stats,
            frame_sample_name: config.frame_sample_name,
            frame: None,
            unresolved: VecDeque::new(),
            free_timer_queries: Vec::new(),
            free_occlusion_queries: Vec::new(),
            reports: Arc::new(GpuReportQueue::new(config.report_capacity)),
        }
    }

    /// Queue readers can hold on to
    pub fn report_queue(&self) -> Arc<GpuReportQueue> {
        Arc::clone(&self.reports)
    }

    pub fn next_report(&self) -> Option<GpuProfilerReport> {
        self.reports.next_report()
    }

    pub fn num_available_reports(&self) -> usize {
        self.reports.num_available_reports()
    }

    #[inline]
    pub fn is_frame_active(&self) -> bool {
        self.frame.is_some()
    }

    /// Frames ended but not yet resolved
    #[inline]
    pub fn num_unresolved_frames(&self) -> usize {
        self.unresolved.len()
    }

    /// Name of the innermost open sample
    pub fn current_sample(&self) -> Option<&str> {
        let frame = self.frame.as_ref()?;
        let idx = *frame.open.last()?;
        Some(frame.samples[idx].name.as_str())
    }

    pub fn begin_frame(&mut self) -> RhiResult<()> {
        if self.frame.is_some() {
            error!("Cannot begin a new GPU profiler frame before ending the current one");
            return Ok(());
        }

        let mut timer = self.acquire_timer_query()?;
        let mut occlusion = match self.acquire_occlusion_query() {
            Ok(query) => query,
            Err(err) => {
                self.free_timer_queries.push(timer);
                return Err(err);
            }
        };
        timer.begin();
        occlusion.begin();

        let root = ActiveSample {
            name: self.frame_sample_name.clone(),
            timer,
            start_stats: self.stats.snapshot(),
            end_stats: RenderStatsSnapshot::default(),
            children: Vec::new(),
        };
        self.frame = Some(ActiveFrame {
            samples: vec![root],
            open: vec![0],
            occlusion,
        });
        Ok(())
    }

    pub fn end_frame(&mut self) {
        let Some(mut frame) = self.frame.take() else {
            error!("Cannot end a GPU profiler frame that was never begun");
            return;
        };

        let end_stats = self.stats.snapshot();
        while frame.open.len() > 1 {
            if let Some(idx) = frame.open.pop() {
                let sample = &mut frame.samples[idx];
                warn!(
                    "GPU profiler sample \"{}\" still open at end of frame, closing it",
                    sample.name
                );
                sample.timer.end();
                sample.end_stats = end_stats;
            }
        }

        frame.open.clear();
        let root = &mut frame.samples[0];
        root.timer.end();
        root.end_stats = end_stats;
        frame.occlusion.end();

        self.unresolved.push_back(frame);
    }

    pub fn begin_sample(&mut self, name: impl Into<String>) -> RhiResult<()> {
        let name = name.into();
        if self.frame.is_none() {
            error!(
                "Cannot begin GPU profiler sample \"{}\" outside of a frame",
                name
            );
            return Ok(());
        }

        let mut timer = self.acquire_timer_query()?;
        let start_stats = self.stats.snapshot();
        timer.begin();

        if let Some(frame) = self.frame.as_mut() {
            let idx = frame.samples.len();
            if let Some(&parent) = frame.open.last() {
                frame.samples[parent].children.push(idx);
            }
            frame.samples.push(ActiveSample {
                name,
                timer,
                start_stats,
                end_stats: RenderStatsSnapshot::default(),
                children: Vec::new(),
            });
            frame.open.push(idx);
        }
        Ok(())
    }

    /// End the innermost open sample, which must be called `name`
    pub fn end_sample(&mut self, name: &str) {
        let Some(frame) = self.frame.as_mut() else {
            error!("Cannot end GPU profiler sample \"{}\" outside of a frame", name);
            return;
        };

        if frame.open.len() <= 1 {
            error!("Cannot end GPU profiler sample \"{}\", no sample is open", name);
            return;
        }

        let Some(&idx) = frame.open.last() else {
            return;
        };
        if frame.samples[idx].name != name {
            error!(
                "Attempting to end GPU profiler sample \"{}\" but \"{}\" is the innermost open sample",
                name, frame.samples[idx].name
            );
            return;
        }

        frame.open.pop();
        let sample = &mut frame.samples[idx];
        sample.timer.end();
        sample.end_stats = self.stats.snapshot();
    }

    /// Resolve every finished frame into the report queue
    pub fn update(&mut self) {
        loop {
            let ready = match self.unresolved.front() {
                Some(frame) => frame.samples[0].timer.is_ready() && frame.occlusion.is_ready(),
                None => false,
            };
            if !ready {
                break;
            }

            if let Some(frame) = self.unresolved.pop_front() {
                let report = self.resolve_frame(frame);
                self.reports.push(report);
            }
        }
    }

    fn resolve_frame(&mut self, frame: ActiveFrame<F::Timer, F::Occlusion>) -> GpuProfilerReport {
        let ActiveFrame {
            samples,
            mut occlusion,
            ..
        } = frame;

        let num_drawn_samples = occlusion.num_samples();
        self.free_occlusion_queries.push(occlusion);

        let mut samples: Vec<Option<ActiveSample<F::Timer>>> =
            samples.into_iter().map(Some).collect();
        let frame_sample = self.resolve_sample(&mut samples, 0);

        GpuProfilerReport {
            frame_sample,
            num_drawn_samples,
        }
    }

    fn resolve_sample(
        &mut self,
        samples: &mut [Option<ActiveSample<F::Timer>>],
        idx: usize,
    ) -> GpuProfileSample {
        let Some(mut sample) = samples.get_mut(idx).and_then(Option::take) else {
            return GpuProfileSample::default();
        };

        let time_ms = sample.timer.time_ms();
        let mut children = Vec::with_capacity(sample.children.len());
        for &child in &sample.children {
            children.push(self.resolve_sample(samples, child));
        }
        self.free_timer_queries.push(sample.timer);

        GpuProfileSample {
            name: sample.name,
            time_ms,
            stats: sample.end_stats - sample.start_stats,
            children,
        }
    }

    fn acquire_timer_query(&mut self) -> RhiResult<F::Timer> {
        match self.free_timer_queries.pop() {
            Some(query) => Ok(query),
            None => self.factory.create_timer_query(),
        }
    }

    fn acquire_occlusion_query(&mut self) -> RhiResult<F::Occlusion> {
        match self.free_occlusion_queries.pop() {
            Some(query) => Ok(query),
            None => self.factory.create_occlusion_query(false),
        }
    }
}
