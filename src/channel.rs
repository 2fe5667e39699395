use core::fmt;

use axerrno::AxResult;

use crate::domain::CreationRequest;

/// Identifier of a domain living inside the privileged control interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DomainId(pub u64);

/// Identifier of a vcpu, scoped to the domain it was created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VcpuId(pub u64);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for VcpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for VcpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// The raw outcome of one run-vcpu request: a result kind and its auxiliary argument.
///
/// The argument is the fault reason for a fault, or the number of microseconds to wait for a
/// yield. Interpretation is left to [`AxRunEvent`](crate::AxRunEvent).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunResult {
    /// The result kind.
    pub kind: u64,
    /// The auxiliary argument.
    pub arg: u64,
}

impl RunResult {
    /// The vcpu executed a halt.
    pub const HLT: u64 = 1;
    /// The vcpu faulted, `arg` holds the reason.
    pub const FAULT: u64 = 2;
    /// The vcpu was interrupted and can be resumed right away.
    pub const RESUME_AFTER_INTERRUPT: u64 = 3;
    /// The vcpu yielded, `arg` holds the duration in microseconds.
    pub const YIELD: u64 = 4;

    const KIND_MASK: u64 = 0xF;
    const ARG_SHIFT: u32 = 4;

    /// Creates a run result from its parts.
    pub const fn new(kind: u64, arg: u64) -> Self {
        Self { kind, arg }
    }

    /// Decodes a packed run result, kind in the low 4 bits and argument in the remaining 60.
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            kind: raw & Self::KIND_MASK,
            arg: raw >> Self::ARG_SHIFT,
        }
    }
}

/// The operations issued through an [`AxControlChannel`], used to name a failing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOp {
    /// Open the channel itself.
    Open,
    /// Create a domain from an executable image.
    CreateDomain,
    /// Destroy a domain.
    DestroyDomain,
    /// Create a vcpu in a domain.
    CreateVcpu,
    /// Destroy a vcpu.
    DestroyVcpu,
    /// Run a vcpu until it returns control.
    RunVcpu,
}

impl ChannelOp {
    /// The name of the operation as it appears in diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::CreateDomain => "create_domain_from_image",
            Self::DestroyDomain => "destroy_domain",
            Self::CreateVcpu => "create_vcpu",
            Self::DestroyVcpu => "destroy_vcpu",
            Self::RunVcpu => "run_vcpu",
        }
    }
}

impl fmt::Display for ChannelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request/response boundary to the privileged hypervisor control interface.
///
/// Every call blocks until the interface answers. Implementations must be [`Sync`] because the
/// run loop of a vcpu is driven from a worker thread while the controlling thread keeps the
/// channel borrowed; requests for one vcpu are never issued concurrently.
pub trait AxControlChannel: Sync {
    /// Submits a creation request and returns the id of the new domain.
    fn create_domain_from_image(&self, request: &CreationRequest<'_>) -> AxResult<DomainId>;

    /// Destroys a domain previously created through this channel.
    fn destroy_domain(&self, domain: DomainId) -> AxResult;

    /// Creates a vcpu in the given domain.
    fn create_vcpu(&self, domain: DomainId) -> AxResult<VcpuId>;

    /// Destroys a vcpu.
    fn destroy_vcpu(&self, vcpu: VcpuId) -> AxResult;

    /// Runs the vcpu until it hands control back to the caller.
    fn run_vcpu(&self, vcpu: VcpuId) -> AxResult<RunResult>;
}
