//! Ingestion orchestration.
//!
//! One request runs through a fixed, linear sequence of stages:
//!
//! ```text
//! validate_input → load_documents → chunk_documents → build_index
//!   → prepare_artifact → publish → cleanup
//! ```
//!
//! Every stage reads and updates the request's [`PipelineState`]. The first
//! stage that fails stops the run: its error is recorded in the state and
//! every remaining stage is skipped, **including `cleanup`**. A failure in
//! `publish` therefore leaves the packaged artifact's temporary directory on
//! disk; the outcome reports it in [`IngestOutcome::leaked_temp_dir`].
//!
//! [`Orchestrator::run`] never returns an error. Callers always get an
//! [`IngestOutcome`].

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::builder::{IndexBuilder, IndexReport};
use crate::chunk::chunk_blocks;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::loader::{self, LoadError};
use crate::models::{Chunk, ContentBlock};
use crate::package::{self, Artifact};
use crate::publish::{self, UploadClient};

/// One ingestion request.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// File or directory to ingest.
    pub input_path: PathBuf,
    pub index_dir: PathBuf,
    pub chunk_store: PathBuf,
    /// Publish the artifact to this bucket when set.
    pub bucket: Option<String>,
    pub prefix: String,
}

impl IngestRequest {
    /// A request for `input_path` using the configured locations and prefix.
    pub fn new(input_path: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            input_path: input_path.into(),
            index_dir: config.paths.index_dir.clone(),
            chunk_store: config.paths.chunk_store.clone(),
            bucket: None,
            prefix: config.publish.prefix.clone(),
        }
    }

    pub fn with_index_dir(mut self, index_dir: impl Into<PathBuf>) -> Self {
        self.index_dir = index_dir.into();
        self
    }

    pub fn with_chunk_store(mut self, chunk_store: impl Into<PathBuf>) -> Self {
        self.chunk_store = chunk_store.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateInput,
    LoadDocuments,
    ChunkDocuments,
    BuildIndex,
    PrepareArtifact,
    Publish,
    Cleanup,
}

impl Stage {
    /// Execution order.
    pub const ALL: [Stage; 7] = [
        Stage::ValidateInput,
        Stage::LoadDocuments,
        Stage::ChunkDocuments,
        Stage::BuildIndex,
        Stage::PrepareArtifact,
        Stage::Publish,
        Stage::Cleanup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::ValidateInput => "validate_input",
            Stage::LoadDocuments => "load_documents",
            Stage::ChunkDocuments => "chunk_documents",
            Stage::BuildIndex => "build_index",
            Stage::PrepareArtifact => "prepare_artifact",
            Stage::Publish => "publish",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutable record threaded through the stages of a single request.
#[derive(Debug)]
pub struct PipelineState {
    pub request: IngestRequest,
    pub blocks: Vec<ContentBlock>,
    pub chunks: Vec<Chunk>,
    pub index_report: Option<IndexReport>,
    /// Set by `prepare_artifact`, cleared once `cleanup` removed it.
    pub artifact: Option<Artifact>,
    pub remote_uri: Option<String>,
    pub error: Option<String>,
}

impl PipelineState {
    fn new(request: IngestRequest) -> Self {
        Self {
            request,
            blocks: Vec::new(),
            chunks: Vec::new(),
            index_report: None,
            artifact: None,
            remote_uri: None,
            error: None,
        }
    }
}

/// Result record of one request.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Remote location of the published archive, if one was uploaded.
    pub remote_uri: Option<String>,
    /// Rendered error chain of the failing stage.
    pub error: Option<String>,
    pub failed_stage: Option<Stage>,
    /// Stages that ran to completion, in order.
    pub completed: Vec<Stage>,
    pub chunks_added: usize,
    pub index_report: Option<IndexReport>,
    /// Temporary artifact directory left behind because `cleanup` was skipped.
    pub leaked_temp_dir: Option<PathBuf>,
}

impl IngestOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives ingestion requests through the stage sequence.
///
/// Holds no per-request state; construct one per process or per call.
pub struct Orchestrator<'a> {
    config: &'a Config,
    embedder: &'a dyn Embedder,
    upload_client: UploadClient,
}

impl<'a> Orchestrator<'a> {
    /// Build an orchestrator, resolving the upload client from the environment.
    pub fn new(config: &'a Config, embedder: &'a dyn Embedder) -> Self {
        Self {
            config,
            embedder,
            upload_client: UploadClient::from_env(&config.publish),
        }
    }

    /// Replace the upload client resolved by [`Orchestrator::new`].
    pub fn with_upload_client(mut self, client: UploadClient) -> Self {
        self.upload_client = client;
        self
    }

    /// Run one request to a terminal state.
    pub fn run(&self, request: IngestRequest) -> IngestOutcome {
        info!(input = %request.input_path.display(), "ingestion started");
        let mut state = PipelineState::new(request);
        let mut completed = Vec::with_capacity(Stage::ALL.len());
        let mut failed_stage = None;

        for stage in Stage::ALL {
            debug!(stage = %stage, "running stage");
            if let Err(e) = self.run_stage(stage, &mut state) {
                let message = format!("{:#}", e);
                error!(stage = %stage, "ingestion failed: {}", message);
                state.error = Some(message);
                failed_stage = Some(stage);
                break;
            }
            completed.push(stage);
        }

        let leaked_temp_dir = state.artifact.as_ref().map(|a| a.temp_dir.clone());
        if let Some(dir) = &leaked_temp_dir {
            warn!(
                temp_dir = %dir.display(),
                "cleanup did not complete; temporary artifact directory left on disk"
            );
        }
        if state.error.is_none() {
            info!(
                chunks = state.chunks.len(),
                remote = state.remote_uri.as_deref().unwrap_or("-"),
                "ingestion finished"
            );
        }

        IngestOutcome {
            remote_uri: state.remote_uri,
            error: state.error,
            failed_stage,
            completed,
            chunks_added: state.chunks.len(),
            index_report: state.index_report,
            leaked_temp_dir,
        }
    }

    fn run_stage(&self, stage: Stage, state: &mut PipelineState) -> Result<()> {
        match stage {
            Stage::ValidateInput => self.validate_input(state),
            Stage::LoadDocuments => self.load_documents(state),
            Stage::ChunkDocuments => self.chunk_documents(state),
            Stage::BuildIndex => self.build_index(state),
            Stage::PrepareArtifact => self.prepare_artifact(state),
            Stage::Publish => self.publish(state),
            Stage::Cleanup => self.cleanup(state),
        }
    }

    fn validate_input(&self, state: &mut PipelineState) -> Result<()> {
        let request = &state.request;
        if !request.input_path.exists() {
            return Err(LoadError::NotFound(request.input_path.clone()).into());
        }
        if request.index_dir.is_file() {
            bail!(
                "Vector index location is a file, expected a directory: {}",
                request.index_dir.display()
            );
        }
        if request.chunk_store.is_dir() {
            bail!(
                "Chunk store location is a directory, expected a file: {}",
                request.chunk_store.display()
            );
        }
        Ok(())
    }

    fn load_documents(&self, state: &mut PipelineState) -> Result<()> {
        state.blocks = loader::load_path(&state.request.input_path)?;
        info!(blocks = state.blocks.len(), "documents loaded");
        Ok(())
    }

    fn chunk_documents(&self, state: &mut PipelineState) -> Result<()> {
        state.chunks = chunk_blocks(&state.blocks, &self.config.chunking);
        if state.chunks.is_empty() {
            bail!(
                "No chunks produced from {}",
                state.request.input_path.display()
            );
        }
        info!(chunks = state.chunks.len(), "documents chunked");
        Ok(())
    }

    fn build_index(&self, state: &mut PipelineState) -> Result<()> {
        let (_, report) = IndexBuilder::new(self.embedder).build(
            &state.chunks,
            &state.request.index_dir,
            &state.request.chunk_store,
        )?;
        state.index_report = Some(report);
        Ok(())
    }

    fn prepare_artifact(&self, state: &mut PipelineState) -> Result<()> {
        let artifact =
            package::prepare_artifact(&state.request.index_dir, &state.request.chunk_store)?;
        state.artifact = Some(artifact);
        Ok(())
    }

    fn publish(&self, state: &mut PipelineState) -> Result<()> {
        let archive = match &state.artifact {
            Some(artifact) => artifact.archive_path.as_path(),
            None => bail!("No artifact to publish"),
        };
        state.remote_uri = publish::publish(
            &self.upload_client,
            archive,
            state.request.bucket.as_deref(),
            &state.request.prefix,
        )?;
        Ok(())
    }

    fn cleanup(&self, state: &mut PipelineState) -> Result<()> {
        if let Some(artifact) = &state.artifact {
            remove_temp_dir(&artifact.temp_dir)?;
        }
        state.artifact = None;
        Ok(())
    }
}

fn remove_temp_dir(dir: &Path) -> Result<()> {
    std::fs::remove_dir_all(dir)
        .with_context(|| format!("Failed to remove temporary directory {}", dir.display()))?;
    debug!(temp_dir = %dir.display(), "temporary artifact directory removed");
    Ok(())
}
