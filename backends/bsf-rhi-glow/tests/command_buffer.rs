//! Deferred recording against a mock device context

use std::cell::Cell;
use std::rc::Rc;

use bsf_rhi::{
    CommandBuffer, CommandBufferDesc, CommandBufferState, DrawOperation, Fence, FenceSource,
    QueueType,
};
use bsf_rhi_glow::GlCommandBuffer;
use pretty_assertions::assert_eq;

struct MockFence(Rc<Cell<bool>>);

impl Fence for MockFence {
    fn is_signaled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Default)]
struct MockDevice {
    log: Vec<u32>,
    gpu_done: Rc<Cell<bool>>,
    fences: bool,
}

impl FenceSource for MockDevice {
    type Fence = MockFence;

    fn insert_fence(&mut self) -> Option<MockFence> {
        self.fences.then(|| MockFence(Rc::clone(&self.gpu_done)))
    }
}

fn primary() -> GlCommandBuffer<MockDevice> {
    GlCommandBuffer::new(CommandBufferDesc::primary(QueueType::Graphics))
}

fn secondary() -> GlCommandBuffer<MockDevice> {
    GlCommandBuffer::new(CommandBufferDesc::secondary(QueueType::Graphics))
}

#[test]
fn commands_run_in_recording_order() {
    let mut cb = primary();
    for value in [3, 1, 2] {
        cb.queue_command(move |device: &mut MockDevice| device.log.push(value));
    }
    assert_eq!(cb.state(), CommandBufferState::Recording);
    assert_eq!(cb.num_commands(), 3);

    let mut device = MockDevice::default();
    cb.execute_commands(&mut device);

    assert_eq!(device.log, vec![3, 1, 2]);
    assert_eq!(cb.num_commands(), 0);
}

#[test]
fn state_follows_the_fence() {
    let mut device = MockDevice {
        fences: true,
        ..Default::default()
    };

    let mut cb = primary();
    assert_eq!(cb.state(), CommandBufferState::Empty);

    cb.queue_command(|device: &mut MockDevice| device.log.push(0));
    cb.execute_commands(&mut device);
    assert_eq!(cb.state(), CommandBufferState::Executing);

    // Recording is refused until the GPU catches up
    cb.queue_command(|device: &mut MockDevice| device.log.push(1));
    assert_eq!(cb.num_commands(), 0);

    device.gpu_done.set(true);
    assert_eq!(cb.state(), CommandBufferState::Done);

    cb.queue_command(|device: &mut MockDevice| device.log.push(2));
    assert_eq!(cb.state(), CommandBufferState::Recording);

    cb.execute_commands(&mut device);
    assert_eq!(device.log, vec![0, 2]);
}

#[test]
fn missing_fence_means_done_after_submit() {
    let mut device = MockDevice::default();
    let mut cb = primary();
    cb.queue_command(|_: &mut MockDevice| {});
    cb.execute_commands(&mut device);
    assert_eq!(cb.state(), CommandBufferState::Done);
}

#[test]
fn secondary_commands_append_after_primary_ones() {
    let mut device = MockDevice::default();

    let mut inner = secondary();
    inner.queue_command(|device: &mut MockDevice| device.log.push(20));
    inner.queue_command(|device: &mut MockDevice| device.log.push(21));
    inner.set_draw_operation(DrawOperation::LineList);

    let mut outer = primary();
    outer.queue_command(|device: &mut MockDevice| device.log.push(10));
    outer.append_secondary(&inner);
    outer.queue_command(|device: &mut MockDevice| device.log.push(11));

    assert_eq!(outer.draw_operation(), DrawOperation::LineList);

    outer.execute_commands(&mut device);
    assert_eq!(device.log, vec![10, 20, 21, 11]);

    // The secondary keeps its commands and can be appended again
    assert_eq!(inner.num_commands(), 2);
}

#[test]
fn secondary_buffers_do_not_execute() {
    let mut device = MockDevice::default();
    let mut cb = secondary();
    cb.queue_command(|device: &mut MockDevice| device.log.push(1));
    cb.execute_commands(&mut device);

    assert!(device.log.is_empty());
    assert_eq!(cb.state(), CommandBufferState::Recording);
}

#[test]
fn only_secondary_buffers_can_be_appended() {
    let mut device = MockDevice::default();

    let mut other = primary();
    other.queue_command(|device: &mut MockDevice| device.log.push(1));

    let mut cb = primary();
    cb.append_secondary(&other);
    assert_eq!(cb.state(), CommandBufferState::Empty);

    let mut nested = secondary();
    nested.append_secondary(&secondary());
    assert_eq!(nested.state(), CommandBufferState::Empty);

    cb.execute_commands(&mut device);
    assert!(device.log.is_empty());
}

#[test]
fn reset_discards_commands() {
    let mut device = MockDevice::default();
    let mut cb = primary();
    cb.queue_command(|device: &mut MockDevice| device.log.push(1));
    cb.reset();

    assert_eq!(cb.state(), CommandBufferState::Empty);
    assert_eq!(cb.draw_operation(), DrawOperation::TriangleList);

    cb.execute_commands(&mut device);
    assert!(device.log.is_empty());
}
