//! Control channel backed by the hypervisor builder driver.
//!
//! Domains are created and destroyed through ioctls on the builder device. Vcpus are created,
//! destroyed and run through hypercalls issued directly from this process, which therefore has
//! to run on a host where the hypervisor is loaded.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

use axerrno::{AxError, AxResult};
use log::{debug, warn};
use nix::errno::Errno;
use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use crate::channel::{AxControlChannel, DomainId, RunResult, VcpuId};
use crate::domain::CreationRequest;

/// Default path of the builder device.
pub const BUILDER_DEVICE: &str = "/dev/bareflank_builder";

const BUILDER_MAGIC: u8 = 0xBF;
const IOCTL_CREATE_FROM_ELF_CMD: u8 = 0x01;
const IOCTL_DESTROY_CMD: u8 = 0x02;

const RUN_OP: u64 = 0xBF01_0000_0000_0000;
const VCPU_OP: u64 = 0xBF03_0000_0000_0000;
const VCPU_OP_CREATE_VCPU: u64 = 0x100;
const VCPU_OP_DESTROY_VCPU: u64 = 0x101;

const INVALID_VCPUID: u64 = u64::MAX;
const SUCCESS: u64 = 0;

/// Argument block of the create-from-elf ioctl. `domainid` is filled in by the driver.
#[repr(C)]
#[derive(Debug)]
struct CreateFromElfArgs {
    file: *const u8,
    file_size: u64,
    cmdl: *const u8,
    cmdl_size: u64,
    uart: u64,
    size: u64,
    domainid: u64,
}

nix::ioctl_readwrite!(
    ioctl_create_from_elf,
    BUILDER_MAGIC,
    IOCTL_CREATE_FROM_ELF_CMD,
    CreateFromElfArgs
);
nix::ioctl_write_ptr!(ioctl_destroy, BUILDER_MAGIC, IOCTL_DESTROY_CMD, u64);

/// The builder device, plus the hypercall interface of the running hypervisor.
#[derive(Debug)]
pub struct BuilderDriver {
    device: File,
}

impl BuilderDriver {
    /// Open the builder device at `path`.
    pub fn open(path: impl AsRef<Path>) -> AxResult<Self> {
        let path = path.as_ref();
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| {
                warn!("failed to open {}: {err}", path.display());
                err.raw_os_error()
                    .map_or(AxError::Io, |code| errno_to_ax(Errno::from_raw(code)))
            })?;
        debug!("opened builder device {}", path.display());
        Ok(Self { device })
    }
}

impl AxControlChannel for BuilderDriver {
    fn create_domain_from_image(&self, request: &CreationRequest<'_>) -> AxResult<DomainId> {
        let mut args = CreateFromElfArgs {
            file: request.image().as_ptr(),
            file_size: request.image_len(),
            cmdl: request.cmdline().as_ptr(),
            cmdl_size: request.cmdline_len(),
            uart: request.uart().unwrap_or(0),
            size: request.size(),
            domainid: 0,
        };
        // SAFETY: `args` points at buffers borrowed from `request`, which outlive the call.
        unsafe { ioctl_create_from_elf(self.device.as_raw_fd(), &mut args) }
            .map_err(errno_to_ax)?;
        Ok(DomainId(args.domainid))
    }

    fn destroy_domain(&self, domain: DomainId) -> AxResult {
        // SAFETY: the driver only reads the domain id behind the pointer.
        unsafe { ioctl_destroy(self.device.as_raw_fd(), &domain.0) }.map_err(errno_to_ax)?;
        Ok(())
    }

    fn create_vcpu(&self, domain: DomainId) -> AxResult<VcpuId> {
        match hypercall(VCPU_OP, VCPU_OP_CREATE_VCPU, domain.0, 0)? {
            INVALID_VCPUID => Err(AxError::BadState),
            id => Ok(VcpuId(id)),
        }
    }

    fn destroy_vcpu(&self, vcpu: VcpuId) -> AxResult {
        match hypercall(VCPU_OP, VCPU_OP_DESTROY_VCPU, vcpu.0, 0)? {
            SUCCESS => Ok(()),
            _ => Err(AxError::BadState),
        }
    }

    fn run_vcpu(&self, vcpu: VcpuId) -> AxResult<RunResult> {
        hypercall(RUN_OP, vcpu.0, 0, 0).map(RunResult::from_raw)
    }
}

#[cfg(target_arch = "x86_64")]
fn hypercall(opcode: u64, arg1: u64, arg2: u64, arg3: u64) -> AxResult<u64> {
    let ret: u64;
    // SAFETY: `vmcall` traps into the hypervisor, which only reads the argument registers and
    // writes its answer to `rax`.
    unsafe {
        core::arch::asm!(
            "vmcall",
            inout("rax") opcode => ret,
            in("rdi") arg1,
            in("rsi") arg2,
            in("rdx") arg3,
            options(nostack),
        );
    }
    Ok(ret)
}

#[cfg(not(target_arch = "x86_64"))]
fn hypercall(_opcode: u64, _arg1: u64, _arg2: u64, _arg3: u64) -> AxResult<u64> {
    Err(AxError::Unsupported)
}

fn errno_to_ax(errno: Errno) -> AxError {
    match errno {
        Errno::ENOENT | Errno::ENODEV | Errno::ENXIO => AxError::NotFound,
        Errno::EPERM | Errno::EACCES => AxError::PermissionDenied,
        Errno::EINVAL => AxError::InvalidInput,
        Errno::ENOMEM => AxError::NoMemory,
        Errno::EBUSY => AxError::ResourceBusy,
        Errno::ENOTTY | Errno::ENOSYS => AxError::Unsupported,
        Errno::EFAULT => AxError::BadAddress,
        _ => AxError::Io,
    }
}

/// Pin the calling process to `cpu`.
///
/// Failure is only logged.
pub fn pin_to_cpu(cpu: usize) {
    let mut set = CpuSet::new();
    if let Err(err) = set
        .set(cpu)
        .and_then(|()| sched_setaffinity(Pid::from_raw(0), &set))
    {
        warn!("failed to pin to cpu {cpu}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(errno_to_ax(Errno::ENOENT), AxError::NotFound);
        assert_eq!(errno_to_ax(Errno::ENODEV), AxError::NotFound);
        assert_eq!(errno_to_ax(Errno::ENXIO), AxError::NotFound);
        assert_eq!(errno_to_ax(Errno::EPERM), AxError::PermissionDenied);
        assert_eq!(errno_to_ax(Errno::EACCES), AxError::PermissionDenied);
        assert_eq!(errno_to_ax(Errno::EINVAL), AxError::InvalidInput);
        assert_eq!(errno_to_ax(Errno::ENOMEM), AxError::NoMemory);
        assert_eq!(errno_to_ax(Errno::EBUSY), AxError::ResourceBusy);
        assert_eq!(errno_to_ax(Errno::ENOTTY), AxError::Unsupported);
        assert_eq!(errno_to_ax(Errno::ENOSYS), AxError::Unsupported);
        assert_eq!(errno_to_ax(Errno::EFAULT), AxError::BadAddress);
        assert_eq!(errno_to_ax(Errno::EIO), AxError::Io);
        assert_eq!(errno_to_ax(Errno::EAGAIN), AxError::Io);
    }

    #[test]
    fn test_open_missing_device() {
        let err = BuilderDriver::open("/nonexistent/axexec/builder").unwrap_err();
        assert_eq!(err, AxError::NotFound);
    }
}
