use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ImportReport, ProgressEvent, ProgressSink, RefreshReport};
use crate::domain::SourceDescriptor;
use crate::publish::PublishReport;

const BAR_WIDTH: usize = 50;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_refresh(report: &RefreshReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_import(report: &ImportReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_sources(sources: &[SourceDescriptor]) -> io::Result<()> {
        Self::print_json(&sources)
    }

    pub fn print_publish(reports: &[PublishReport]) -> io::Result<()> {
        Self::print_json(&reports)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr();
        let _ = match event {
            ProgressEvent::Download {
                received, total, ..
            } => write!(stderr, "\r{}", progress_line(received, total)),
            ProgressEvent::Message(message) => writeln!(stderr, "\r{message}"),
        };
        let _ = stderr.flush();
    }
}

/// `[=====     ] 10%, 5 of 50`, or a plain byte count when the size is unknown.
pub fn progress_line(received: u64, total: Option<u64>) -> String {
    let Some(total) = total.filter(|total| *total > 0) else {
        return format!("Unknown Size: {received} downloaded");
    };
    let shown = received.min(total);
    let percent = (u128::from(shown) * 100 / u128::from(total)) as usize;
    format!(
        "[{:<width$}] {percent}%, {shown} of {total}",
        "=".repeat(percent / 2),
        width = BAR_WIDTH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_renders_bar() {
        let line = progress_line(25, Some(50));
        assert!(line.starts_with(&format!("[{}{}]", "=".repeat(25), " ".repeat(25))));
        assert!(line.ends_with(" 50%, 25 of 50"));
    }

    #[test]
    fn progress_line_clamps_and_handles_unknown_size() {
        assert!(progress_line(80, Some(50)).ends_with("100%, 50 of 50"));
        assert_eq!(progress_line(7, None), "Unknown Size: 7 downloaded");
        assert_eq!(progress_line(7, Some(0)), "Unknown Size: 7 downloaded");
    }
}
