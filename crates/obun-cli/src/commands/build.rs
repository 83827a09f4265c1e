use std::process::ExitCode;

use anyhow::{Context, Result};

use obun_core::{ArtifactBuilder, BuildMode, FsStore};
use obun_runner::{exit_code, ProcessRunner, RunnerError};

use super::Invocation;
use crate::output::format;

/// Build once. In `run` mode, execute the artifact and exit with its code.
pub fn run(inv: &Invocation) -> Result<ExitCode> {
    let builder = ArtifactBuilder::new(FsStore, inv.settings.clone());
    let built = builder.build(&inv.request)?;

    format::print_build(&built.record, inv.format);

    if built.mode() != BuildMode::Run {
        return Ok(ExitCode::SUCCESS);
    }

    // stays in our process group so Ctrl-C and terminal input reach it
    let runner = ProcessRunner::new(inv.settings.grace_period).with_process_group(false);
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    let code = rt.block_on(async {
        let mut process = runner.start(&built.record)?;
        let status = process.wait().await?;
        Ok::<_, RunnerError>(exit_code(&status))
    })?;

    tracing::info!(code, "Artifact exited");
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
