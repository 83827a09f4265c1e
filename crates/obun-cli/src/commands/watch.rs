use std::process::ExitCode;

use anyhow::{Context, Result};

use obun_core::{ArtifactBuilder, FsStore};
use obun_runner::WatchLoop;

use super::Invocation;
use crate::output::{format, OutputFormat};

/// Build, then keep rebuilding on edits until Ctrl-C.
pub fn run(inv: &Invocation) -> Result<ExitCode> {
    let builder = ArtifactBuilder::new(FsStore, inv.settings.clone());
    let (watch_loop, mut events) = WatchLoop::new(builder, inv.request.clone());
    let fmt = inv.format;

    if matches!(fmt, OutputFormat::Text) {
        eprintln!("o° Watch mode active");
        eprintln!("   Ctrl+C: Stop");
        eprintln!();
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    rt.block_on(async {
        let reporter = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                format::print_event(&event, fmt);
            }
        });

        let result = watch_loop.run().await;
        // the loop dropped its sender, so the reporter drains and ends
        let _ = reporter.await;
        result
    })?;

    Ok(ExitCode::SUCCESS)
}
