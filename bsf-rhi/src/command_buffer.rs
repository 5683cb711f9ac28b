//! Command buffer contracts
//!
//! A command buffer records work for later submission. The recording side
//! never touches the GPU; all work runs when the buffer is executed against
//! the backend's device context.

use crate::QueueType;

/// Identity of a command buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct CommandBufferDesc {
    pub queue_type: QueueType,
    pub device_idx: u32,
    pub queue_idx: u32,
    /// Secondary buffers are only ever appended into primary buffers
    pub secondary: bool,
}

impl CommandBufferDesc {
    pub fn primary(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            ..Default::default()
        }
    }

    pub fn secondary(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            secondary: true,
            ..Default::default()
        }
    }
}

/// Lifecycle of a command buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    /// Nothing recorded
    Empty,
    /// Commands recorded, not submitted
    Recording,
    /// Submitted and the GPU has not finished
    Executing,
    /// Submitted and the GPU has finished
    Done,
}

impl CommandBufferState {
    /// Derive the state from what a buffer actually holds
    ///
    /// `fence_signaled` is `None` when no fence exists.
    pub fn derive(submitted: bool, fence_signaled: Option<bool>, has_commands: bool) -> Self {
        if submitted {
            match fence_signaled {
                Some(false) => CommandBufferState::Executing,
                Some(true) | None => CommandBufferState::Done,
            }
        } else if has_commands {
            CommandBufferState::Recording
        } else {
            CommandBufferState::Empty
        }
    }
}

/// GPU-side completion marker
pub trait Fence {
    fn is_signaled(&self) -> bool;
}

/// A device context able to insert fences after submitted work
pub trait FenceSource {
    type Fence: Fence;

    /// Insert a fence after all work submitted so far, `None` if unavailable
    fn insert_fence(&mut self) -> Option<Self::Fence>;
}

/// Deferred command recording
pub trait CommandBuffer {
    /// Context each recorded command receives on execution
    type Context;

    fn desc(&self) -> &CommandBufferDesc;

    /// Record a command; ignored while the buffer is executing
    fn queue_command<F>(&mut self, command: F)
    where
        F: Fn(&mut Self::Context) + 'static;

    /// Run every recorded command in order and mark the buffer submitted
    fn execute_commands(&mut self, context: &mut Self::Context);

    /// Copy the commands of a secondary buffer onto this primary buffer
    fn append_secondary(&mut self, secondary: &Self);

    fn state(&self) -> CommandBufferState;

    /// Drop recorded commands and any fence, back to `Empty`
    fn reset(&mut self);

    #[inline]
    fn is_secondary(&self) -> bool {
        self.desc().secondary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_derivation() {
        use CommandBufferState::*;
        assert_eq!(CommandBufferState::derive(false, None, false), Empty);
        assert_eq!(CommandBufferState::derive(false, None, true), Recording);
        assert_eq!(CommandBufferState::derive(true, Some(false), false), Executing);
        assert_eq!(CommandBufferState::derive(true, Some(true), false), Done);
        assert_eq!(CommandBufferState::derive(true, None, false), Done);
    }

    #[test]
    fn secondary_desc() {
        assert!(CommandBufferDesc::secondary(QueueType::Graphics).secondary);
        assert!(!CommandBufferDesc::primary(QueueType::Compute).secondary);
    }
}
