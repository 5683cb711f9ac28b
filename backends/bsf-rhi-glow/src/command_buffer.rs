//! Deferred command recording
//!
//! GL has no native command buffers, so recorded commands are closures that
//! run against the device context when the buffer is submitted.

use std::rc::Rc;

use bsf_rhi::{
    CommandBuffer, CommandBufferDesc, CommandBufferState, DrawOperation, Fence, FenceSource,
};
use glow::{Context, HasContext};
use tracing::{error, trace};

use crate::RawFence;

type Command<C> = Rc<dyn Fn(&mut C)>;

/// Command buffer executed against a context of type `C`
pub struct GlCommandBuffer<C: FenceSource> {
    desc: CommandBufferDesc,
    commands: Vec<Command<C>>,
    fence: Option<C::Fence>,
    submitted: bool,
    draw_operation: DrawOperation,
}

impl<C: FenceSource> GlCommandBuffer<C> {
    pub fn new(desc: CommandBufferDesc) -> Self {
        Self {
            desc,
            commands: Vec::new(),
            fence: None,
            submitted: false,
            draw_operation: DrawOperation::default(),
        }
    }

    /// Number of commands waiting for execution
    pub fn num_commands(&self) -> usize {
        self.commands.len()
    }

    /// Draw operation most recently recorded, used for primitive statistics
    pub fn draw_operation(&self) -> DrawOperation {
        self.draw_operation
    }

    /// Track the draw operation without recording a command
    pub fn set_draw_operation(&mut self, op: DrawOperation) {
        self.draw_operation = op;
    }
}

impl<C: FenceSource> CommandBuffer for GlCommandBuffer<C> {
    type Context = C;

    fn desc(&self) -> &CommandBufferDesc {
        &self.desc
    }

    fn queue_command<F>(&mut self, command: F)
    where
        F: Fn(&mut C) + 'static,
    {
        if self.state() == CommandBufferState::Executing {
            error!("Cannot record commands into a command buffer that is executing");
            return;
        }

        // A finished buffer starts a new batch
        if self.submitted {
            self.submitted = false;
            self.fence = None;
        }

        self.commands.push(Rc::new(command));
    }

    fn execute_commands(&mut self, context: &mut C) {
        if self.is_secondary() {
            error!("Secondary command buffers cannot be executed directly");
            return;
        }

        trace!("Executing {} recorded commands", self.commands.len());
        for command in std::mem::take(&mut self.commands) {
            command(context);
        }

        self.fence = context.insert_fence();
        self.submitted = true;
    }

    fn append_secondary(&mut self, secondary: &Self) {
        if !secondary.is_secondary() {
            error!("Cannot append a command buffer that is not secondary");
            return;
        }

        if self.is_secondary() {
            error!("Cannot append a command buffer to a secondary command buffer");
            return;
        }

        if self.state() == CommandBufferState::Executing {
            error!("Cannot append commands to a command buffer that is executing");
            return;
        }

        if self.submitted {
            self.submitted = false;
            self.fence = None;
        }

        self.commands.extend(secondary.commands.iter().cloned());
        self.draw_operation = secondary.draw_operation;
    }

    fn state(&self) -> CommandBufferState {
        CommandBufferState::derive(
            self.submitted,
            self.fence.as_ref().map(Fence::is_signaled),
            !self.commands.is_empty(),
        )
    }

    fn reset(&mut self) {
        self.commands.clear();
        self.fence = None;
        self.submitted = false;
        self.draw_operation = DrawOperation::default();
    }
}

/// `glFenceSync` object, deleted on drop
pub struct GlFence {
    gl: Rc<Context>,
    raw: RawFence,
}

impl GlFence {
    /// Insert a fence after every command submitted so far
    pub fn insert(gl: &Rc<Context>) -> Option<Self> {
        match unsafe { gl.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) } {
            Ok(raw) => Some(Self {
                gl: Rc::clone(gl),
                raw,
            }),
            Err(e) => {
                error!("Failed to create fence: {}", e);
                None
            }
        }
    }
}

impl Fence for GlFence {
    fn is_signaled(&self) -> bool {
        let status = unsafe { self.gl.client_wait_sync(self.raw, 0, 0) };
        status == glow::ALREADY_SIGNALED || status == glow::CONDITION_SATISFIED
    }
}

impl Drop for GlFence {
    fn drop(&mut self) {
        unsafe { self.gl.delete_sync(self.raw) };
    }
}
