use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::api::{Endpoints, MgnifyClient, discover_endpoints};
use crate::config::MirrorConfig;
use crate::domain::EntityKind;
use crate::error::MirrorError;
use crate::processor::EntityProcessor;
use crate::store::MirrorStore;
use crate::walker::{WalkSummary, Walker};

#[derive(Debug, Clone, Serialize)]
pub struct MirrorSummary {
    pub dest: String,
    pub walks: Vec<WalkSummary>,
}

impl MirrorSummary {
    pub fn error_count(&self) -> usize {
        self.walks.iter().map(|walk| walk.errors.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: MgnifyClient> {
    store: MirrorStore,
    client: C,
    config: MirrorConfig,
}

impl<C: MgnifyClient> App<C> {
    pub fn new(config: MirrorConfig, client: C) -> Self {
        Self {
            store: MirrorStore::new(config.dest.clone()),
            client,
            config,
        }
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn endpoints(&self) -> Result<Endpoints, MirrorError> {
        discover_endpoints(&self.client, &self.config.api_url)
    }

    /// Mirrors each requested collection in turn, starting from the URLs the
    /// API root advertises.
    pub fn mirror(
        &self,
        kinds: &[EntityKind],
        sink: &dyn ProgressSink,
    ) -> Result<MirrorSummary, MirrorError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading {}", self.config.api_url),
            elapsed: None,
        });
        let endpoints = self.endpoints()?;
        let mut walks = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            walks.push(self.mirror_from(kind, endpoints.for_kind(kind), sink)?);
        }
        Ok(MirrorSummary {
            dest: self.store.root().to_string(),
            walks,
        })
    }

    pub fn mirror_from(
        &self,
        kind: EntityKind,
        start_url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<WalkSummary, MirrorError> {
        info!("Downloading {}", kind.dir_name());
        self.store.ensure_layout(kind)?;
        let processor = EntityProcessor::new(kind, &self.client, &self.store, &self.config)?;
        Walker::new(&self.client, processor, self.config.keep_going).walk(start_url, sink)
    }
}
