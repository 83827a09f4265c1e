use obun_core::BuildRecord;
use obun_runner::{WatchEvent, WatchState};

use super::OutputFormat;

/// Report a one-shot build: status line on stderr, or the record as JSON on
/// stdout.
pub fn print_build(record: &BuildRecord, fmt: OutputFormat) {
    match fmt {
        OutputFormat::Text => eprintln!("{}", format_build_text(record)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(record).unwrap_or_default())
        }
    }
}

/// Report one watch event. JSON output is one object per line.
pub fn print_event(event: &WatchEvent, fmt: OutputFormat) {
    match fmt {
        OutputFormat::Text => {
            if let Some(line) = format_event_text(event) {
                eprintln!("{line}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(event).unwrap_or_default()),
    }
}

fn format_build_text(record: &BuildRecord) -> String {
    let count = record.fragments.len();
    let plural = if count == 1 { "" } else { "s" };
    format!(
        "o° Build complete! -> {} ({count} fragment{plural}, {})",
        record.artifact.display(),
        record.mode
    )
}

fn format_event_text(event: &WatchEvent) -> Option<String> {
    match event {
        WatchEvent::StateChanged {
            state: WatchState::Stopped,
        } => Some("o° Watcher stopped".to_string()),
        WatchEvent::StateChanged { .. } => None,
        WatchEvent::ChangeDetected { paths } => {
            let mut out = String::from("\no° Changes detected. Rebuilding...");
            for path in paths {
                out.push_str(&format!("\n   ~ {}", path.display()));
            }
            Some(out)
        }
        WatchEvent::Built { record } => {
            let time = record
                .built_at
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S");
            Some(format!("[{time}] {}", format_build_text(record)))
        }
        WatchEvent::BuildFailed { message, .. } => Some(format!("!° Build failed: {message}")),
        WatchEvent::ProcessStarted { pid, artifact } => {
            Some(format!("o° Running {} (pid {pid})", artifact.display()))
        }
        WatchEvent::ProcessFailed { message } => Some(format!("!° {message}")),
        WatchEvent::ProcessExited { pid, code } => {
            Some(format!("o° Process {pid} exited with code {code}"))
        }
        WatchEvent::ProcessTerminated { pid, .. } => Some(format!("o° Stopped process {pid}")),
    }
}
