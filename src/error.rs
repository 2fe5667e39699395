//! Errors reported by the lifecycle controller.
//!
//! Requests to the control interface fail with an [`AxError`] status; the controller wraps it
//! together with the failing [`ChannelOp`] so the operator can tell which request went wrong.

use std::{io, path::PathBuf};

use axerrno::AxError;
use thiserror::Error;

use crate::channel::{ChannelOp, VcpuId};

/// Result type alias using [`ExecError`].
pub type ExecResult<T = ()> = Result<T, ExecError>;

/// Errors that end an execution. Exactly one of them reaches the operator.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Required input missing, or mutually exclusive inputs both supplied.
    #[error("invalid arguments: {0}")]
    Config(String),

    /// An input was supplied but is unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The image file could not be read.
    #[error("failed to read image {}: {source}", .path.display())]
    Image {
        /// Path of the image.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A request to the control interface failed.
    #[error("{operation} failed: {status}")]
    ControlChannel {
        /// The failing request.
        operation: ChannelOp,
        /// The status the interface answered with.
        status: AxError,
    },

    /// The vcpu faulted.
    #[error("[{vcpu:#x}] vcpu fault: {reason}")]
    RunFault {
        /// The faulting vcpu.
        vcpu: VcpuId,
        /// The fault reason.
        reason: u64,
    },

    /// The vcpu returned a result kind outside the known set.
    #[error("[{vcpu:#x}] unknown vcpu ret: {code}")]
    UnknownRunResult {
        /// The vcpu.
        vcpu: VcpuId,
        /// The raw result kind.
        code: u64,
    },

    /// The vcpu state machine was driven out of order.
    #[error("vcpu state error: {0}")]
    State(AxError),

    /// The worker running the vcpu panicked.
    #[error("vcpu worker panicked: {0}")]
    Worker(String),
}

impl ExecError {
    /// Wraps a failed control channel request.
    pub const fn channel(operation: ChannelOp, status: AxError) -> Self {
        Self::ControlChannel { operation, status }
    }

    /// The line reported to the operator.
    ///
    /// Vcpu faults and unknown results start with the vcpu id; everything else is prefixed
    /// with `error: `.
    pub fn report(&self) -> String {
        match self {
            Self::RunFault { .. } | Self::UnknownRunResult { .. } => self.to_string(),
            _ => format!("error: {self}"),
        }
    }
}

impl From<AxError> for ExecError {
    fn from(err: AxError) -> Self {
        Self::State(err)
    }
}
