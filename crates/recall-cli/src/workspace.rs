//! On-disk state shared by every command: config, snapshots and the archive

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use recall_engine::config::Config;
use recall_engine::engine::MemoryEngine;
use recall_engine::memory::ArchiveStore;
use recall_engine::oracle::{self, SummarizationOracle};
use recall_engine::storage::{JsonlArchive, SnapshotStore};

use crate::error::{CliError, CliResult};

pub struct Workspace {
    config: Config,
    data_dir: PathBuf,
    snapshots: SnapshotStore,
    archive: Arc<dyn ArchiveStore>,
    summarizer: Arc<dyn SummarizationOracle>,
}

impl Workspace {
    pub fn open(config: Config, data_dir: Option<&Path>) -> CliResult<Self> {
        let data_dir = data_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.storage.data_dir.clone());
        std::fs::create_dir_all(&data_dir).map_err(|source| CliError::DataDir {
            path: data_dir.clone(),
            source,
        })?;
        debug!("Using data directory {}", data_dir.display());

        let archive: Arc<dyn ArchiveStore> = Arc::new(JsonlArchive::open_in(&data_dir)?);
        let summarizer = oracle::build_summarizer(&config.oracle)?;

        Ok(Self {
            snapshots: SnapshotStore::new(&data_dir),
            config,
            data_dir,
            archive,
            summarizer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn archive(&self) -> &Arc<dyn ArchiveStore> {
        &self.archive
    }

    pub fn summarizer(&self) -> &Arc<dyn SummarizationOracle> {
        &self.summarizer
    }

    pub fn entities(&self) -> CliResult<Vec<String>> {
        Ok(self.snapshots.list()?)
    }

    /// Restore a saved entity
    pub fn load(&self, entity: &str) -> CliResult<MemoryEngine> {
        let snapshot = self.snapshots.load(entity)?;
        Ok(MemoryEngine::restore(
            snapshot,
            &self.config,
            self.summarizer.clone(),
            self.archive.clone(),
        )?)
    }

    /// Restore a saved entity, or start an empty one with the given persona
    pub fn load_or_create(&self, entity: &str, persona: Option<&str>) -> CliResult<MemoryEngine> {
        match self.load(entity) {
            Ok(engine) => Ok(engine),
            Err(_) if !self.snapshots.exists(entity) => {
                let persona = persona.unwrap_or(&self.config.oracle.persona);
                Ok(MemoryEngine::new(
                    entity,
                    persona,
                    &self.config,
                    self.summarizer.clone(),
                    self.archive.clone(),
                )?)
            }
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, engine: &MemoryEngine) -> CliResult<PathBuf> {
        Ok(self.snapshots.save(&engine.snapshot())?)
    }
}
