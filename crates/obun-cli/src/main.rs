use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use obun_core::config::settings::{DEFAULT_DEBOUNCE_MS, DEFAULT_GRACE_MS, DEFAULT_POLL_MS};
use obun_core::{BuildMode, BuildRequest, CoreError, Settings};
use obun_runner::RunnerError;

mod commands;
mod output;

#[derive(Parser)]
#[command(
    name = "obun",
    version,
    about = "o° Obun - assemble source fragments into one runnable artifact"
)]
struct Cli {
    /// Entry fragment, or a directory containing index.obun
    #[arg(default_value = ".")]
    input: PathBuf,

    /// Artifact path (overrides the manifest's artifact-name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Turn on a flag for #:if blocks (repeatable)
    #[arg(short = 'D', long = "define", value_name = "FLAG")]
    define: Vec<String>,

    /// Build mode (overrides the manifest's build-mode)
    #[arg(short = 'B', long = "build-mode", value_enum)]
    build_mode: Option<ModeArg>,

    /// Rebuild when a used fragment changes
    #[arg(short, long)]
    watch: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for build reports
    #[arg(long, default_value = "text")]
    format: output::OutputFormat,

    /// Quiet window that coalesces bursts of edits, in milliseconds
    #[arg(long, env = "OBUN_DEBOUNCE_MS", default_value_t = DEFAULT_DEBOUNCE_MS)]
    debounce_ms: u64,

    /// How often watched fragments are checked, in milliseconds
    #[arg(long, env = "OBUN_POLL_MS", default_value_t = DEFAULT_POLL_MS)]
    poll_ms: u64,

    /// Time a running artifact gets to exit before it is killed, in milliseconds
    #[arg(long, env = "OBUN_GRACE_MS", default_value_t = DEFAULT_GRACE_MS)]
    grace_ms: u64,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Run,
    Prod,
}

impl From<ModeArg> for BuildMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Run => BuildMode::Run,
            ModeArg::Prod => BuildMode::Prod,
        }
    }
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings::default()
            .with_debounce(Duration::from_millis(self.debounce_ms))
            .with_poll_interval(Duration::from_millis(self.poll_ms))
            .with_grace_period(Duration::from_millis(self.grace_ms))
    }

    fn invocation(&self) -> Result<commands::Invocation> {
        let settings = self.settings();
        let entry = obun_core::resolve_entry(&self.input, &settings)?;

        let mut request =
            BuildRequest::new(entry).with_flags(self.define.iter().cloned().collect());
        if let Some(output) = &self.output {
            request = request.with_output(output);
        }
        if let Some(mode) = self.build_mode {
            request = request.with_mode(mode.into());
        }

        Ok(commands::Invocation {
            request,
            settings,
            format: self.format,
        })
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let invocation = cli.invocation()?;
    if cli.watch {
        commands::watch::run(&invocation)
    } else {
        commands::build::run(&invocation)
    }
}

/// Exit code for a failed invocation, taken from the root obun error.
fn failure_code(err: &anyhow::Error) -> u8 {
    let code = if let Some(e) = err.downcast_ref::<RunnerError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<CoreError>() {
        e.exit_code()
    } else {
        1
    };
    u8::try_from(code).unwrap_or(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("!° {err:#}");
            ExitCode::from(failure_code(&err))
        }
    }
}
