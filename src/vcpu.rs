use std::thread;

use axerrno::{ax_err, AxResult};
use log::{debug, error, info};

use crate::channel::{AxControlChannel, ChannelOp, DomainId, VcpuId};
use crate::error::{ExecError, ExecResult};
use crate::exit::AxRunEvent;

/// The state of a vcpu driven by an [`AxVCpuRunner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VCpuState {
    /// An invalid state.
    Invalid = 0,
    /// The vcpu is created but its run loop has not started yet.
    Created = 1,
    /// The run loop is active.
    Running = 2,
    /// The vcpu halted. Terminal.
    Halted = 3,
    /// The vcpu faulted. Terminal.
    Faulted = 4,
    /// The vcpu returned an unknown result. Terminal.
    Unknown = 5,
}

impl VCpuState {
    /// Whether the run loop can no longer be entered from this state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Halted | Self::Faulted | Self::Unknown)
    }
}

/// A vcpu created through a control channel, destroyed when dropped.
///
/// The destroy request is issued exactly once, whether the run loop ended normally or with an
/// error. A failing destroy is logged and never replaces the error the caller is returning.
pub struct VcpuGuard<'a, C: AxControlChannel + ?Sized> {
    channel: &'a C,
    id: VcpuId,
    domain: DomainId,
}

impl<'a, C: AxControlChannel + ?Sized> VcpuGuard<'a, C> {
    /// Creates a vcpu in `domain`.
    pub fn create(channel: &'a C, domain: DomainId) -> ExecResult<Self> {
        let id = channel
            .create_vcpu(domain)
            .map_err(|status| ExecError::channel(ChannelOp::CreateVcpu, status))?;
        info!("created vcpu {id} in domain {domain}");
        Ok(Self {
            channel,
            id,
            domain,
        })
    }

    /// Get the id of the vcpu.
    pub const fn id(&self) -> VcpuId {
        self.id
    }

    /// Get the id of the domain the vcpu belongs to.
    pub const fn domain(&self) -> DomainId {
        self.domain
    }
}

impl<C: AxControlChannel + ?Sized> Drop for VcpuGuard<'_, C> {
    fn drop(&mut self) {
        match self.channel.destroy_vcpu(self.id) {
            Ok(()) => debug!("destroyed vcpu {}", self.id),
            Err(status) => error!(
                "{} failed for vcpu {}: {status}",
                ChannelOp::DestroyVcpu,
                self.id
            ),
        }
    }
}

/// Drives the run loop of one vcpu until it halts, faults or returns something unknown.
///
/// The runner never destroys the vcpu; its lifetime is owned by a [`VcpuGuard`].
pub struct AxVCpuRunner<'a, C: AxControlChannel + ?Sized> {
    channel: &'a C,
    id: VcpuId,
    state: VCpuState,
}

impl<'a, C: AxControlChannel + ?Sized> AxVCpuRunner<'a, C> {
    /// Create a runner for an already created vcpu.
    pub const fn new(channel: &'a C, id: VcpuId) -> Self {
        Self {
            channel,
            id,
            state: VCpuState::Created,
        }
    }

    /// Get the id of the vcpu.
    pub const fn id(&self) -> VcpuId {
        self.id
    }

    /// Get the state of the vcpu.
    pub const fn state(&self) -> VCpuState {
        self.state
    }

    /// Transition the state of the vcpu. If the current state is not `from`, the state becomes
    /// [`VCpuState::Invalid`] and an error is returned.
    pub fn transition_state(&mut self, from: VCpuState, to: VCpuState) -> AxResult {
        if self.state != from {
            let current = self.state;
            self.state = VCpuState::Invalid;
            ax_err!(
                BadState,
                format!("VCpu state is not {:?}, but {:?}", from, current)
            )
        } else {
            self.state = to;
            Ok(())
        }
    }

    /// Issue one run request and classify its result.
    pub fn step(&self) -> ExecResult<AxRunEvent> {
        let result = self
            .channel
            .run_vcpu(self.id)
            .map_err(|status| ExecError::channel(ChannelOp::RunVcpu, status))?;
        Ok(AxRunEvent::classify(result))
    }

    /// Run the vcpu to a terminal state.
    ///
    /// Returns `Ok(())` only if the vcpu halted.
    pub fn run(&mut self) -> ExecResult {
        self.transition_state(VCpuState::Created, VCpuState::Running)?;
        loop {
            let event = match self.step() {
                Ok(event) => event,
                Err(err) => {
                    self.state = VCpuState::Invalid;
                    return Err(err);
                }
            };
            debug!("vcpu {}: {:?}", self.id, event);
            match event {
                AxRunEvent::Halt => {
                    self.transition_state(VCpuState::Running, VCpuState::Halted)?;
                    return Ok(());
                }
                AxRunEvent::Fault { reason } => {
                    self.transition_state(VCpuState::Running, VCpuState::Faulted)?;
                    return Err(ExecError::RunFault {
                        vcpu: self.id,
                        reason,
                    });
                }
                AxRunEvent::ResumeAfterInterrupt => continue,
                AxRunEvent::Yield { duration } => {
                    thread::sleep(duration);
                    continue;
                }
                AxRunEvent::Unknown { code } => {
                    self.transition_state(VCpuState::Running, VCpuState::Unknown)?;
                    return Err(ExecError::UnknownRunResult { vcpu: self.id, code });
                }
            }
        }
    }
}
