use std::{any::Any, thread};

use log::{debug, error, info};

use crate::channel::{AxControlChannel, ChannelOp, DomainId};
use crate::domain::{create_domain, DomainOptions};
use crate::error::{ExecError, ExecResult};
use crate::vcpu::{AxVCpuRunner, VcpuGuard};

/// Exit status of a run that ended with the vcpu halted.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit status of every other outcome.
pub const EXIT_FAILURE: u8 = 1;

/// The options of one execution, as produced by the command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Image to create a new domain from. Excludes `attach`.
    pub image: Option<Vec<u8>>,
    /// Existing domain to attach to. Excludes `image`.
    pub attach: Option<DomainId>,
    /// Options used when creating a domain from `image`.
    pub domain: DomainOptions,
}

/// Where the domain of an execution comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainSource<'a> {
    /// Create a new domain, owned and destroyed by the controller.
    Image(&'a [u8], &'a DomainOptions),
    /// Use a pre-existing domain, which is left alive.
    Attach(DomainId),
}

impl ExecOptions {
    /// Resolves the domain source, rejecting missing or conflicting choices.
    pub fn source(&self) -> ExecResult<DomainSource<'_>> {
        match (&self.image, self.attach) {
            (Some(image), None) => Ok(DomainSource::Image(image, &self.domain)),
            (None, Some(domain)) => Ok(DomainSource::Attach(domain)),
            (Some(_), Some(_)) => Err(ExecError::Config(
                "--path and --attach are mutually exclusive".into(),
            )),
            (None, None) => Err(ExecError::Config("must specify --path or --attach".into())),
        }
    }
}

/// The domain an execution runs in.
///
/// An owned domain is destroyed exactly once when the guard drops; an attached one is not
/// touched. A failing destroy is logged and never replaces the result being returned.
pub struct DomainGuard<'a, C: AxControlChannel + ?Sized> {
    channel: &'a C,
    id: DomainId,
    owned: bool,
}

impl<'a, C: AxControlChannel + ?Sized> DomainGuard<'a, C> {
    /// Creates a new domain from `image`. The guard owns it.
    pub fn create(channel: &'a C, image: &[u8], options: &DomainOptions) -> ExecResult<Self> {
        let id = create_domain(channel, image, options)?;
        Ok(Self {
            channel,
            id,
            owned: true,
        })
    }

    /// Attaches to a domain created elsewhere. The guard does not own it.
    pub fn attach(channel: &'a C, id: DomainId) -> Self {
        info!("attached to domain {id}");
        Self {
            channel,
            id,
            owned: false,
        }
    }

    /// Get the id of the domain.
    pub const fn id(&self) -> DomainId {
        self.id
    }

    /// Whether the domain is destroyed when the guard drops.
    pub const fn is_owned(&self) -> bool {
        self.owned
    }
}

impl<C: AxControlChannel + ?Sized> Drop for DomainGuard<'_, C> {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        match self.channel.destroy_domain(self.id) {
            Ok(()) => debug!("destroyed domain {}", self.id),
            Err(status) => error!(
                "{} failed for domain {}: {status}",
                ChannelOp::DestroyDomain,
                self.id
            ),
        }
    }
}

/// Sequences domain setup and the vcpu run loop over one control channel.
///
/// A controller drives at most one domain and one vcpu at a time.
pub struct AxExecController<C: AxControlChannel> {
    channel: C,
}

impl<C: AxControlChannel> AxExecController<C> {
    /// Create a controller issuing its requests through `channel`.
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Get the control channel.
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Run an execution described by `options` to completion.
    ///
    /// Every vcpu and owned domain acquired on the way is released before returning, in reverse
    /// order of acquisition.
    pub fn execute(&self, options: &ExecOptions) -> ExecResult {
        let domain = match options.source()? {
            DomainSource::Image(image, domain_options) => {
                DomainGuard::create(&self.channel, image, domain_options)?
            }
            DomainSource::Attach(id) => DomainGuard::attach(&self.channel, id),
        };
        self.attach_and_run(domain.id())
    }

    /// Create a vcpu in `domain` and run it on a worker thread until it reaches a terminal state.
    pub fn attach_and_run(&self, domain: DomainId) -> ExecResult {
        let vcpu = VcpuGuard::create(&self.channel, domain)?;
        let mut runner = AxVCpuRunner::new(&self.channel, vcpu.id());
        thread::scope(|s| s.spawn(|| runner.run()).join())
            .map_err(|payload| ExecError::Worker(panic_message(payload.as_ref())))?
    }
}

/// Map the result of an execution to a process exit status.
pub fn exit_code(result: &ExecResult) -> u8 {
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(_) => EXIT_FAILURE,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
