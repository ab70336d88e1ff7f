use std::fmt;

use regex::Regex;
use tracing::info;

use crate::api::MgnifyClient;
use crate::config::MirrorConfig;
use crate::domain::{Entity, EntityKind};
use crate::error::MirrorError;
use crate::pagination::{fetch_collection, fetch_page};
use crate::store::MirrorStore;

pub const ANALYSIS_FILE: &str = "analysis.json";
pub const ANALYSES_FILE: &str = "analyses.json";
pub const GO_TERMS_FILE: &str = "go-terms.json";
pub const TAXONOMY_SSU_FILE: &str = "taxonomy-ssu.json";

const FAILED_STATUS: &str = "failed";

/// What happened to one entity. Everything here is a normal return; real
/// failures travel as `MirrorError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Descriptor already on disk; no network traffic.
    Skipped,
    NoRuns,
    NoAnalyses,
    FailedAnalysis,
    Complete,
    /// Study whose analyses are not all of the target experiment type.
    Rejected { found: String },
    NoDownload,
    DownloadPresent { file: String },
    Downloaded { file: String, bytes: usize },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Skipped => write!(f, "already downloaded"),
            Outcome::NoRuns => write!(f, "no runs"),
            Outcome::NoAnalyses => write!(f, "no analyses"),
            Outcome::FailedAnalysis => write!(f, "analysis failed"),
            Outcome::Complete => write!(f, "complete"),
            Outcome::Rejected { found } => write!(f, "rejected ({found})"),
            Outcome::NoDownload => write!(f, "no matching download"),
            Outcome::DownloadPresent { file } => write!(f, "{file} already present"),
            Outcome::Downloaded { file, bytes } => write!(f, "downloaded {file} ({bytes} bytes)"),
        }
    }
}

/// Matches download identifiers of the form `<prefix><substring><suffix>.tsv`,
/// with at least one character on each side of the substring.
#[derive(Debug, Clone)]
pub struct DownloadMatcher {
    pattern: Regex,
}

impl DownloadMatcher {
    pub fn new(substring: &str) -> Result<Self, MirrorError> {
        let pattern = Regex::new(&format!(r"^.+{}.+\.tsv$", regex::escape(substring)))
            .map_err(|err| MirrorError::InvalidPattern(err.to_string()))?;
        Ok(Self { pattern })
    }

    pub fn is_match(&self, id: &str) -> bool {
        self.pattern.is_match(id)
    }

    pub fn first_match<'a>(&self, downloads: &'a [Entity]) -> Option<&'a Entity> {
        downloads.iter().find(|download| self.is_match(download.id()))
    }
}

/// Fetch-and-persist routine for one entity. The entity kind picks the
/// relations walked and the skip policy.
pub struct EntityProcessor<'a, C: MgnifyClient + ?Sized> {
    kind: EntityKind,
    client: &'a C,
    store: &'a MirrorStore,
    config: &'a MirrorConfig,
    matcher: DownloadMatcher,
}

impl<'a, C: MgnifyClient + ?Sized> EntityProcessor<'a, C> {
    pub fn new(
        kind: EntityKind,
        client: &'a C,
        store: &'a MirrorStore,
        config: &'a MirrorConfig,
    ) -> Result<Self, MirrorError> {
        Ok(Self {
            kind,
            client,
            store,
            config,
            matcher: DownloadMatcher::new(&config.file_substring)?,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn process(&self, entity: &Entity) -> Result<Outcome, MirrorError> {
        let id = MirrorStore::checked_name("resource id", entity.id())?;
        if self.kind.skips_recorded() {
            self.store.ensure_record(self.kind, id)?;
            if self.store.is_recorded(self.kind, id) {
                info!("Already downloaded {id}, continuing");
                return Ok(Outcome::Skipped);
            }
        }
        match self.kind {
            EntityKind::Sample => self.process_sample(entity),
            EntityKind::Study => self.process_study(entity),
        }
    }

    fn related(&self, entity: &Entity, relation: &str) -> Result<Vec<Entity>, MirrorError> {
        let url = entity.related_url(relation)?;
        fetch_page(self.client, url, &[])?.entities()
    }

    fn process_sample(&self, sample: &Entity) -> Result<Outcome, MirrorError> {
        let kind = EntityKind::Sample;
        let id = sample.id();
        let descriptor = self.store.descriptor_path(kind, id);
        MirrorStore::write_json(&descriptor, sample.raw())?;
        info!("Wrote to {descriptor}");

        let runs = self.related(sample, "runs")?;
        let Some(run) = self.config.selection.select(&runs) else {
            info!("Sample {id} has no runs, skipping");
            return Ok(Outcome::NoRuns);
        };

        let analyses = self.related(run, "analyses")?;
        let Some(analysis) = self.config.selection.select(&analyses) else {
            info!("Sample {id} has no analyses, continuing");
            return Ok(Outcome::NoAnalyses);
        };
        let analysis_path = self.store.record_file(kind, id, ANALYSIS_FILE);
        MirrorStore::write_json(&analysis_path, analysis.raw())?;
        info!("Wrote to {analysis_path}");

        if analysis.require_attribute_str("analysis-status")? == FAILED_STATUS {
            info!("Analysis {} status is 'failed', continuing", analysis.id());
            return Ok(Outcome::FailedAnalysis);
        }

        for (relation, file) in [("go-terms", GO_TERMS_FILE), ("taxonomy-ssu", TAXONOMY_SSU_FILE)] {
            let url = analysis.related_url(relation)?;
            let document = self.client.get_json(url, &[])?;
            let path = self.store.record_file(kind, id, file);
            MirrorStore::write_json(&path, &document)?;
            info!("Wrote {relation} data to {path}");
        }
        Ok(Outcome::Complete)
    }

    fn process_study(&self, study: &Entity) -> Result<Outcome, MirrorError> {
        let kind = EntityKind::Study;
        let id = study.id();
        let secondary = self.config.study_relation;
        let analyses = fetch_collection(
            self.client,
            study.related_url("analyses")?,
            self.config.page_size,
        )?;
        let related = fetch_collection(
            self.client,
            study.related_url(secondary.relation())?,
            self.config.page_size,
        )?;

        if let Some(found) = self.experiment_type_mismatch(&analyses.entities()?)? {
            info!(
                "Study {id} is not {}, skipping (found {found})",
                self.config.experiment_type
            );
            return Ok(Outcome::Rejected { found });
        }

        info!("Writing study files for {id}");
        self.store.ensure_record(kind, id)?;
        MirrorStore::write_json(&self.store.descriptor_path(kind, id), study.raw())?;
        MirrorStore::write_json(
            &self.store.record_file(kind, id, ANALYSES_FILE),
            &analyses.to_document(),
        )?;
        MirrorStore::write_json(
            &self.store.record_file(kind, id, secondary.file_name()),
            &related.to_document(),
        )?;

        let downloads = fetch_collection(
            self.client,
            study.related_url("downloads")?,
            self.config.page_size,
        )?
        .entities()?;
        let Some(download) = self.matcher.first_match(&downloads) else {
            info!(
                "Study {id} has no download matching {}",
                self.config.file_substring
            );
            return Ok(Outcome::NoDownload);
        };

        let file = MirrorStore::checked_name("download id", download.id())?.to_string();
        info!("Found a download for {id}: {file}");
        let path = self.store.record_file(kind, id, &file);
        if self.store.exists(&path) {
            info!("File already exists at {path}");
            return Ok(Outcome::DownloadPresent { file });
        }
        info!("Starting download for {id}");
        let content = self.client.get_bytes(download.self_url()?)?;
        MirrorStore::write_bytes_atomic(&path, &content)?;
        info!("Download finished for {id}");
        Ok(Outcome::Downloaded {
            file,
            bytes: content.len(),
        })
    }

    /// First experiment type that differs from the target, if any.
    fn experiment_type_mismatch(&self, analyses: &[Entity]) -> Result<Option<String>, MirrorError> {
        if self.config.any_experiment_type {
            return Ok(None);
        }
        for analysis in analyses {
            let found = analysis.require_attribute_str("experiment-type")?;
            if found != self.config.experiment_type {
                return Ok(Some(found.to_string()));
            }
        }
        Ok(None)
    }
}
