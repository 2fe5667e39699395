use log::info;

use crate::channel::{AxControlChannel, ChannelOp, DomainId};
use crate::error::{ExecError, ExecResult};

/// Sizing and boot options for a domain created from an image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DomainOptions {
    /// Memory size of the domain in bytes. Defaults to twice the image length.
    pub size: Option<u64>,
    /// I/O port of the serial console. No console is set up when absent.
    pub uart: Option<u64>,
    /// Path of the init program passed on the boot command line.
    pub init: Option<String>,
    /// Extra boot arguments, appended verbatim.
    pub cmdline: Option<String>,
}

/// A boot command line, assembled fragment by fragment.
///
/// Fragments are separated by a single space, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootCmdline {
    fragments: Vec<String>,
}

impl BootCmdline {
    /// Creates an empty command line.
    pub const fn new() -> Self {
        Self {
            fragments: Vec::new(),
        }
    }

    /// Assembles the command line for `options`.
    ///
    /// The order is fixed: serial console, then init, then the extra arguments.
    pub fn from_options(options: &DomainOptions) -> Self {
        let mut cmdl = Self::new();
        if let Some(port) = options.uart {
            cmdl.add(format!("console=uart,io,{port:x},115200n8"));
        }
        if let Some(init) = &options.init {
            cmdl.add(format!("init={init}"));
        }
        if let Some(extra) = &options.cmdline {
            cmdl.add(extra.clone());
        }
        cmdl
    }

    /// Appends a fragment.
    pub fn add(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    /// The fragments, in order.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Whether no fragment was added.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Joins the fragments into the final string.
    pub fn build(&self) -> String {
        self.fragments.join(" ")
    }
}

/// The request submitted to create a domain from an image. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreationRequest<'a> {
    image: &'a [u8],
    cmdline: String,
    uart: Option<u64>,
    size: u64,
}

impl<'a> CreationRequest<'a> {
    /// Builds the request for `image` with the given options.
    ///
    /// Fails with [`ExecError::InvalidArgument`] if the image is empty.
    pub fn new(image: &'a [u8], options: &DomainOptions) -> ExecResult<Self> {
        if image.is_empty() {
            return Err(ExecError::InvalidArgument("image is empty"));
        }
        let size = options
            .size
            .unwrap_or_else(|| (image.len() as u64).saturating_mul(2));
        Ok(Self {
            image,
            cmdline: BootCmdline::from_options(options).build(),
            uart: options.uart,
            size,
        })
    }

    /// The image bytes.
    pub const fn image(&self) -> &'a [u8] {
        self.image
    }

    /// The image length in bytes.
    pub const fn image_len(&self) -> u64 {
        self.image.len() as u64
    }

    /// The boot command line bytes.
    pub fn cmdline(&self) -> &[u8] {
        self.cmdline.as_bytes()
    }

    /// The boot command line length in bytes.
    pub fn cmdline_len(&self) -> u64 {
        self.cmdline.len() as u64
    }

    /// The serial console port, if any.
    pub const fn uart(&self) -> Option<u64> {
        self.uart
    }

    /// The requested memory size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// Creates a domain from `image`, submitting exactly one creation request.
///
/// Nothing is retried. On failure no domain is left behind by this call.
pub fn create_domain<C>(channel: &C, image: &[u8], options: &DomainOptions) -> ExecResult<DomainId>
where
    C: AxControlChannel + ?Sized,
{
    let request = CreationRequest::new(image, options)?;
    let domain = channel
        .create_domain_from_image(&request)
        .map_err(|status| ExecError::channel(ChannelOp::CreateDomain, status))?;
    info!(
        "created domain {domain} from a {} byte image, size {:#x}, cmdline {:?}",
        request.image_len(),
        request.size(),
        String::from_utf8_lossy(request.cmdline()),
    );
    Ok(domain)
}
