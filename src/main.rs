//! axexec CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use axexec::{DomainId, DomainOptions, ExecError, ExecOptions, ExecResult};
use clap::Parser;

/// Create a guest domain from an image, or attach to an existing one, and run it until its
/// vcpu halts.
#[derive(Parser, Debug)]
#[command(name = "axexec")]
#[command(version)]
struct Cli {
    /// Executable image to create the domain from
    #[arg(long, visible_alias = "elf", conflicts_with = "attach", required_unless_present = "attach")]
    path: Option<PathBuf>,

    /// Id of an existing domain to attach to
    #[arg(long, value_parser = parse_u64)]
    attach: Option<u64>,

    /// Memory size of the domain in bytes (default: twice the image size)
    #[arg(long, value_parser = parse_u64)]
    size: Option<u64>,

    /// I/O port of the guest serial console
    #[arg(long, value_parser = parse_u64)]
    uart: Option<u64>,

    /// Init program the guest should start
    #[arg(long)]
    init: Option<String>,

    /// Extra boot arguments, appended verbatim
    #[arg(long)]
    cmdline: Option<String>,

    /// Builder device of the hypervisor driver
    #[arg(long, default_value = "/dev/bareflank_builder")]
    device: PathBuf,

    /// CPU to pin this process to
    #[arg(long, default_value_t = 0)]
    cpu: usize,

    /// Report lifecycle events
    #[arg(short, long)]
    verbose: bool,
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|err| format!("invalid number {s:?}: {err}"))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

impl Cli {
    fn exec_options(&self) -> ExecResult<ExecOptions> {
        let image = match &self.path {
            Some(path) => Some(std::fs::read(path).map_err(|source| ExecError::Image {
                path: path.clone(),
                source,
            })?),
            None => None,
        };
        Ok(ExecOptions {
            image,
            attach: self.attach.map(DomainId),
            domain: DomainOptions {
                size: self.size,
                uart: self.uart,
                init: self.init.clone(),
                cmdline: self.cmdline.clone(),
            },
        })
    }
}

#[cfg(target_os = "linux")]
fn run(cli: &Cli) -> ExecResult {
    use axexec::driver::{pin_to_cpu, BuilderDriver};
    use axexec::{AxExecController, ChannelOp};

    pin_to_cpu(cli.cpu);
    let options = cli.exec_options()?;
    // Validate before touching the driver.
    options.source()?;
    let driver = BuilderDriver::open(&cli.device)
        .map_err(|status| ExecError::channel(ChannelOp::Open, status))?;
    AxExecController::new(driver).execute(&options)
}

#[cfg(not(target_os = "linux"))]
fn run(cli: &Cli) -> ExecResult {
    cli.exec_options()?.source()?;
    Err(ExecError::Config(
        "the builder driver is only available on linux".into(),
    ))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(&cli);
    if let Err(err) = &result {
        eprintln!("{}", err.report());
    }
    ExitCode::from(axexec::exit_code(&result))
}
