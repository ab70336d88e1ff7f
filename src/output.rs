use std::io::{self, Write};

use serde::Serialize;

use crate::app::{MirrorSummary, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &MirrorSummary) -> io::Result<()> {
        Self::print_json(summary)
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

pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &MirrorSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "mgnify-mirror summary ({})", summary.dest)?;
        for walk in &summary.walks {
            let kind = walk
                .kind
                .map(|kind| kind.dir_name())
                .unwrap_or("entities");
            writeln!(
                stdout,
                "  {kind}: {} entities over {} pages",
                walk.entities, walk.pages
            )?;
            let counts = [
                ("complete", walk.complete),
                ("already downloaded", walk.skipped),
                ("no runs", walk.no_runs),
                ("no analyses", walk.no_analyses),
                ("failed analyses", walk.failed_analyses),
                ("rejected", walk.rejected),
                ("no matching download", walk.no_download),
                ("download present", walk.downloads_present),
                ("downloaded", walk.downloaded),
            ];
            for (label, count) in counts.into_iter().filter(|(_, count)| *count > 0) {
                writeln!(stdout, "    {label}: {count}")?;
            }
            for err in &walk.errors {
                writeln!(stdout, "    error {}: {}", err.id, err.message)?;
            }
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("[{:>7.1}s] {}", elapsed.as_secs_f64(), event.message),
            None => eprintln!("{}", event.message),
        }
    }
}
