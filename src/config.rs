use core::time::Duration;

/// What the scheduler does when a task panics or returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Hold the task, record the fault and keep scheduling the others.
    #[default]
    Isolate,
    /// Hold the task, record the fault and return [`Error::TaskFault`](crate::Error::TaskFault)
    /// from the pass.
    Propagate,
}

/// Kernel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Pause between scheduler passes.
    pub pass_pause: Duration,

    pub fault_policy: FaultPolicy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            pass_pause: Duration::from_millis(1),
            fault_policy: FaultPolicy::Isolate,
        }
    }
}

impl KernelConfig {
    /// Builder method to set `pass_pause` and return `self`
    pub fn with_pass_pause(mut self, pause: Duration) -> Self {
        self.pass_pause = pause;
        self
    }

    /// Builder method to set `fault_policy` and return `self`
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }
}
