use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::api::MgnifyClient;
use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::EntityKind;
use crate::error::MirrorError;
use crate::pagination::fetch_page;
use crate::processor::{EntityProcessor, Outcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkSummary {
    pub kind: Option<EntityKind>,
    pub pages: usize,
    pub entities: usize,
    pub skipped: usize,
    pub complete: usize,
    pub no_runs: usize,
    pub no_analyses: usize,
    pub failed_analyses: usize,
    pub rejected: usize,
    pub no_download: usize,
    pub downloads_present: usize,
    pub downloaded: usize,
    pub errors: Vec<EntityError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityError {
    pub id: String,
    pub message: String,
}

impl WalkSummary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::NoRuns => self.no_runs += 1,
            Outcome::NoAnalyses => self.no_analyses += 1,
            Outcome::FailedAnalysis => self.failed_analyses += 1,
            Outcome::Complete => self.complete += 1,
            Outcome::Rejected { .. } => self.rejected += 1,
            Outcome::NoDownload => self.no_download += 1,
            Outcome::DownloadPresent { .. } => self.downloads_present += 1,
            Outcome::Downloaded { .. } => self.downloaded += 1,
        }
    }
}

/// Drives a processor over every page of a collection, in server order,
/// until a page comes back without a `next` link.
pub struct Walker<'a, C: MgnifyClient + ?Sized> {
    client: &'a C,
    processor: EntityProcessor<'a, C>,
    keep_going: bool,
}

impl<'a, C: MgnifyClient + ?Sized> Walker<'a, C> {
    pub fn new(client: &'a C, processor: EntityProcessor<'a, C>, keep_going: bool) -> Self {
        Self {
            client,
            processor,
            keep_going,
        }
    }

    pub fn walk(
        &self,
        start_url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<WalkSummary, MirrorError> {
        let kind = self.processor.kind();
        let started = Instant::now();
        let mut summary = WalkSummary {
            kind: Some(kind),
            ..WalkSummary::default()
        };
        let mut current = Some(start_url.to_string());

        while let Some(url) = current.take() {
            // Page failures are never absorbed, keep_going or not.
            let page = fetch_page(self.client, &url, &[])?;
            summary.pages += 1;
            let label = page
                .number
                .map(|number| number.to_string())
                .unwrap_or_else(|| summary.pages.to_string());
            info!("---------- {kind} page {label} ----------");
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Walk; {kind} page {label} ({} entities)",
                    page.data.len()
                ),
                elapsed: Some(started.elapsed()),
            });

            for entity in page.entities()? {
                summary.entities += 1;
                match self.processor.process(&entity) {
                    Ok(outcome) => {
                        debug!("{kind} {}: {outcome}", entity.id());
                        summary.record(&outcome);
                    }
                    Err(err) if self.keep_going => {
                        error!("{kind} {} failed: {err}", entity.id());
                        summary.errors.push(EntityError {
                            id: entity.id().to_string(),
                            message: err.to_string(),
                        });
                    }
                    Err(err) => return Err(err),
                }
            }
            current = page.next;
        }

        info!("Reached the last {kind} page");
        sink.event(ProgressEvent {
            message: format!("phase=Done; {} {kind} entities", summary.entities),
            elapsed: Some(started.elapsed()),
        });
        Ok(summary)
    }
}
