//! GPU profiler behaviour against mock queries

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use bsf_rhi::{
    GpuProfiler, MAX_QUEUE_ELEMENTS, OcclusionQuery, ProfilerConfig, QueryFactory, RenderStat,
    RenderStats, RhiError, RhiResult, TimerQuery,
};
use pretty_assertions::assert_eq;

/// Shared switch standing in for GPU completion
#[derive(Clone, Default)]
struct Gpu {
    finished: Rc<Cell<bool>>,
    timers_created: Rc<Cell<u32>>,
    occlusions_created: Rc<Cell<u32>>,
    occlusions_fail: Rc<Cell<bool>>,
}

struct MockTimer {
    gpu: Gpu,
    running: bool,
}

impl TimerQuery for MockTimer {
    fn begin(&mut self) {
        self.running = true;
    }

    fn end(&mut self) {
        self.running = false;
    }

    fn is_ready(&self) -> bool {
        !self.running && self.gpu.finished.get()
    }

    fn time_ms(&mut self) -> f32 {
        2.5
    }
}

struct MockOcclusion {
    gpu: Gpu,
}

impl OcclusionQuery for MockOcclusion {
    fn begin(&mut self) {}

    fn end(&mut self) {}

    fn is_ready(&self) -> bool {
        self.gpu.finished.get()
    }

    fn num_samples(&mut self) -> u32 {
        640
    }
}

struct MockFactory {
    gpu: Gpu,
}

impl QueryFactory for MockFactory {
    type Timer = MockTimer;
    type Occlusion = MockOcclusion;

    fn create_timer_query(&mut self) -> RhiResult<MockTimer> {
        self.gpu.timers_created.set(self.gpu.timers_created.get() + 1);
        Ok(MockTimer {
            gpu: self.gpu.clone(),
            running: false,
        })
    }

    fn create_occlusion_query(&mut self, _binary: bool) -> RhiResult<MockOcclusion> {
        if self.gpu.occlusions_fail.get() {
            return Err(RhiError::rendering_api("no query objects left"));
        }
        self.gpu
            .occlusions_created
            .set(self.gpu.occlusions_created.get() + 1);
        Ok(MockOcclusion {
            gpu: self.gpu.clone(),
        })
    }
}

fn profiler() -> (GpuProfiler<MockFactory>, Gpu, Arc<RenderStats>) {
    bsf_rhi::logging::init_tracing(bsf_rhi::logging::DEFAULT_LOG_FILTER);
    let gpu = Gpu::default();
    let stats = Arc::new(RenderStats::new());
    let profiler = GpuProfiler::new(
        MockFactory { gpu: gpu.clone() },
        Arc::clone(&stats),
        ProfilerConfig::default(),
    );
    (profiler, gpu, stats)
}

fn profile_single_frame(profiler: &mut GpuProfiler<MockFactory>) {
    profiler.begin_frame().unwrap();
    profiler.begin_sample("A").unwrap();
    profiler.end_sample("A");
    profiler.end_frame();
}

#[test]
fn single_sample_frame_produces_one_report() {
    let (mut profiler, gpu, _) = profiler();
    profile_single_frame(&mut profiler);

    profiler.update();
    assert_eq!(profiler.num_available_reports(), 0);

    gpu.finished.set(true);
    profiler.update();
    assert_eq!(profiler.num_available_reports(), 1);

    let report = profiler.next_report().unwrap();
    assert_eq!(report.frame_sample.name, "Frame");
    assert_eq!(report.frame_sample.children.len(), 1);
    assert_eq!(report.frame_sample.children[0].name, "A");
    assert_eq!(report.frame_sample.children[0].time_ms, 2.5);
    assert_eq!(report.num_drawn_samples, 640);
    assert!(profiler.next_report().is_none());
}

#[test]
fn mismatched_end_sample_keeps_inner_sample_open() {
    let (mut profiler, gpu, _) = profiler();
    profiler.begin_frame().unwrap();
    profiler.begin_sample("A").unwrap();

    profiler.end_sample("B");
    assert_eq!(profiler.current_sample(), Some("A"));

    profiler.end_sample("A");
    assert_eq!(profiler.current_sample(), Some("Frame"));
    profiler.end_frame();

    gpu.finished.set(true);
    profiler.update();
    let report = profiler.next_report().unwrap();
    assert_eq!(report.frame_sample.children.len(), 1);
}

#[test]
fn nested_samples_form_a_tree() {
    let (mut profiler, gpu, _) = profiler();
    profiler.begin_frame().unwrap();
    profiler.begin_sample("Scene").unwrap();
    profiler.begin_sample("Opaque").unwrap();
    profiler.end_sample("Opaque");
    profiler.begin_sample("Transparent").unwrap();
    profiler.end_sample("Transparent");
    profiler.end_sample("Scene");
    profiler.begin_sample("Post").unwrap();
    profiler.end_sample("Post");
    profiler.end_frame();

    gpu.finished.set(true);
    profiler.update();

    let frame = profiler.next_report().unwrap().frame_sample;
    let names: Vec<&str> = frame.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Scene", "Post"]);

    let scene = frame.find_child("Scene").unwrap();
    let names: Vec<&str> = scene.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Opaque", "Transparent"]);
}

#[test]
fn overflowing_reports_drop_the_oldest() {
    let (mut profiler, gpu, stats) = profiler();
    gpu.finished.set(true);

    for frame in 0..(MAX_QUEUE_ELEMENTS as u64 + 2) {
        profiler.begin_frame().unwrap();
        stats.add(RenderStat::DrawCalls, frame);
        profiler.end_frame();
        profiler.update();
        assert!(profiler.num_available_reports() <= MAX_QUEUE_ELEMENTS);
    }

    assert_eq!(profiler.num_available_reports(), MAX_QUEUE_ELEMENTS);
    // Frames 0 and 1 were dropped
    let oldest = profiler.next_report().unwrap();
    assert_eq!(oldest.frame_sample.stats.num_draw_calls, 2);
}

#[test]
fn frames_resolve_in_submission_order() {
    let (mut profiler, gpu, stats) = profiler();

    for draws in [1, 2, 3] {
        profiler.begin_frame().unwrap();
        stats.add(RenderStat::DrawCalls, draws);
        profiler.end_frame();
    }
    assert_eq!(profiler.num_unresolved_frames(), 3);

    gpu.finished.set(true);
    profiler.update();
    assert_eq!(profiler.num_unresolved_frames(), 0);

    let draws: Vec<u64> = std::iter::from_fn(|| profiler.next_report())
        .map(|r| r.frame_sample.stats.num_draw_calls)
        .collect();
    assert_eq!(draws, vec![1, 2, 3]);
}

#[test]
fn samples_record_render_stat_deltas() {
    let (mut profiler, gpu, stats) = profiler();
    stats.add(RenderStat::DrawCalls, 100);

    profiler.begin_frame().unwrap();
    stats.increment(RenderStat::Clears);
    profiler.begin_sample("Geometry").unwrap();
    stats.add(RenderStat::DrawCalls, 4);
    stats.add(RenderStat::Primitives, 40);
    profiler.end_sample("Geometry");
    profiler.end_frame();

    gpu.finished.set(true);
    profiler.update();

    let frame = profiler.next_report().unwrap().frame_sample;
    assert_eq!(frame.stats.num_draw_calls, 4);
    assert_eq!(frame.stats.num_clears, 1);

    let geometry = frame.find_child("Geometry").unwrap();
    assert_eq!(geometry.stats.num_draw_calls, 4);
    assert_eq!(geometry.stats.num_primitives, 40);
    assert_eq!(geometry.stats.num_clears, 0);
}

#[test]
fn resolved_queries_are_recycled() {
    let (mut profiler, gpu, _) = profiler();
    gpu.finished.set(true);

    profile_single_frame(&mut profiler);
    profiler.update();
    assert_eq!(gpu.timers_created.get(), 2);
    assert_eq!(gpu.occlusions_created.get(), 1);

    profile_single_frame(&mut profiler);
    profiler.update();
    assert_eq!(gpu.timers_created.get(), 2);
    assert_eq!(gpu.occlusions_created.get(), 1);
}

#[test]
fn failed_frame_start_returns_its_timer_to_the_pool() {
    let (mut profiler, gpu, _) = profiler();
    gpu.occlusions_fail.set(true);
    assert!(profiler.begin_frame().is_err());
    assert!(!profiler.is_frame_active());
    assert_eq!(gpu.timers_created.get(), 1);

    gpu.occlusions_fail.set(false);
    profiler.begin_frame().unwrap();
    assert_eq!(gpu.timers_created.get(), 1);
    assert_eq!(gpu.occlusions_created.get(), 1);
    profiler.end_frame();
    assert_eq!(profiler.num_unresolved_frames(), 1);
}

#[test]
fn end_frame_closes_open_samples() {
    let (mut profiler, gpu, _) = profiler();
    profiler.begin_frame().unwrap();
    profiler.begin_sample("Unbalanced").unwrap();
    profiler.end_frame();
    assert!(!profiler.is_frame_active());

    gpu.finished.set(true);
    profiler.update();
    let frame = profiler.next_report().unwrap().frame_sample;
    assert!(frame.find_child("Unbalanced").is_some());
}

#[test]
fn misuse_outside_frame_is_ignored() {
    let (mut profiler, _, _) = profiler();
    profiler.begin_sample("Orphan").unwrap();
    profiler.end_sample("Orphan");
    profiler.end_frame();
    assert!(!profiler.is_frame_active());
    assert_eq!(profiler.num_unresolved_frames(), 0);

    profiler.begin_frame().unwrap();
    profiler.begin_frame().unwrap();
    profiler.end_frame();
    assert_eq!(profiler.num_unresolved_frames(), 1);
}

#[test]
fn report_queue_is_shared_across_threads() {
    let (mut profiler, gpu, _) = profiler();
    let queue = profiler.report_queue();
    gpu.finished.set(true);

    profile_single_frame(&mut profiler);
    profiler.update();

    let handle = std::thread::spawn(move || queue.next_report().map(|r| r.frame_sample.name));
    assert_eq!(handle.join().unwrap(), Some("Frame".to_owned()));
    assert_eq!(profiler.num_available_reports(), 0);
}
