use core::time::Duration;

use crate::channel::RunResult;

/// The classified result of one [`AxControlChannel::run_vcpu`](crate::AxControlChannel::run_vcpu) call.
///
/// Raw results are decoded with [`AxRunEvent::classify`]. A result kind the controller does not
/// know about is kept as [`AxRunEvent::Unknown`] and ends the run loop like a fault does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxRunEvent {
    /// The vcpu is halted.
    Halt,
    /// The vcpu faulted and cannot be resumed.
    Fault {
        /// The reason code reported by the hypervisor.
        reason: u64,
    },
    /// An interrupt returned control to the host, the vcpu can be resumed immediately.
    ResumeAfterInterrupt,
    /// The vcpu has nothing to do for a while.
    Yield {
        /// How long to wait before running the vcpu again.
        duration: Duration,
    },
    /// A result kind outside the known set.
    Unknown {
        /// The raw result kind.
        code: u64,
    },
}

impl AxRunEvent {
    /// Classifies a raw run result.
    pub fn classify(result: RunResult) -> Self {
        match result.kind {
            RunResult::HLT => Self::Halt,
            RunResult::FAULT => Self::Fault { reason: result.arg },
            RunResult::RESUME_AFTER_INTERRUPT => Self::ResumeAfterInterrupt,
            RunResult::YIELD => Self::Yield {
                duration: Duration::from_micros(result.arg),
            },
            code => Self::Unknown { code },
        }
    }

    /// Whether the run loop must stop after this event.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::ResumeAfterInterrupt | Self::Yield { .. })
    }
}

impl From<RunResult> for AxRunEvent {
    fn from(result: RunResult) -> Self {
        Self::classify(result)
    }
}
