use std::{collections::HashMap, path::PathBuf, sync::Arc};

use botforge_instance::{InstanceId, InstanceStatus};
use tokio::sync::Mutex;

use crate::archive;
use crate::error::{Error, Result};
use crate::generator::{self, GeneratedArtifact, GenerationRequest};
use crate::paths;
use crate::supervisor::Supervisor;
use crate::templates::{self, BotTemplate};

#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub instance_id: InstanceId,
    pub archive_available: bool,
}

/// The boundary the thin collaborators (HTTP layer, UI, CLI) call into.
/// Owns the artifact registry and the supervisor; generation and packaging
/// run on the blocking pool so concurrent requests never stall each other.
#[derive(Clone, Debug)]
pub struct BotForge {
    trees_root: PathBuf,
    archives_root: PathBuf,
    supervisor: Supervisor,
    artifacts: Arc<Mutex<HashMap<String, GeneratedArtifact>>>,
}

impl BotForge {
    pub fn new() -> Self {
        Self::with_roots(paths::trees_root(), paths::archives_root())
    }

    pub fn with_roots(trees_root: PathBuf, archives_root: PathBuf) -> Self {
        Self {
            trees_root,
            archives_root,
            supervisor: Supervisor::default(),
            artifacts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn list_templates(&self) -> &'static [BotTemplate] {
        templates::list_templates()
    }

    /// Render a tree and package it. The artifact is registered only after
    /// both steps succeed; a failed run leaves nothing behind.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerateOutcome> {
        let trees_root = self.trees_root.clone();
        let archives_root = self.archives_root.clone();

        let artifact = tokio::task::spawn_blocking(move || {
            let mut artifact = generator::generate(&trees_root, &request)?;

            let archive_path = archives_root.join(format!("{}.zip", artifact.instance_id));
            if let Err(e) = archive::package(&artifact.tree_dir, &archive_path) {
                // Unpackaged trees are never registered; discard the output.
                let _ = std::fs::remove_dir_all(&artifact.tree_dir);
                return Err(e);
            }
            artifact.archive_path = Some(archive_path);
            Ok(artifact)
        })
        .await
        .map_err(|e| Error::GenerationFailed(std::io::Error::other(e)))??;

        let outcome = GenerateOutcome {
            instance_id: artifact.instance_id.clone(),
            archive_available: artifact.archive_path.is_some(),
        };
        self.artifacts
            .lock()
            .await
            .insert(artifact.instance_id.0.clone(), artifact);

        tracing::info!(instance_id = %outcome.instance_id, "artifact generated");
        Ok(outcome)
    }

    /// Launch the instance for a previously generated artifact.
    pub async fn start(
        &self,
        instance_id: &str,
        secret_token: &str,
        command_prefix: &str,
    ) -> Result<InstanceStatus> {
        let artifact = {
            let artifacts = self.artifacts.lock().await;
            artifacts
                .get(instance_id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("artifact: {instance_id}")))?
        };

        let template = templates::find_template(&artifact.template_id)
            .ok_or_else(|| Error::not_found(format!("template: {}", artifact.template_id)))?;

        self.supervisor
            .start(
                instance_id,
                template.template_id,
                &artifact.tree_dir,
                template.runtime,
                secret_token,
                command_prefix,
            )
            .await
    }

    pub async fn stop(&self, instance_id: &str) -> Result<()> {
        self.supervisor.stop(instance_id).await
    }

    pub async fn status(&self, instance_id: &str) -> Result<InstanceStatus> {
        self.supervisor
            .status(instance_id)
            .await
            .ok_or_else(|| Error::not_found(format!("instance: {instance_id}")))
    }

    pub async fn list_all(&self) -> Vec<InstanceStatus> {
        self.supervisor.list().await
    }

    pub async fn tail_logs(
        &self,
        instance_id: &str,
        cursor: u64,
        limit: usize,
    ) -> Result<(Vec<String>, u64)> {
        self.supervisor.tail_logs(instance_id, cursor, limit).await
    }

    /// Open the packaged archive for download.
    pub async fn fetch_archive(&self, instance_id: &str) -> Result<tokio::fs::File> {
        let archive_path = {
            let artifacts = self.artifacts.lock().await;
            artifacts
                .get(instance_id)
                .and_then(|a| a.archive_path.clone())
                .ok_or_else(|| Error::not_found(format!("archive: {instance_id}")))?
        };

        tokio::fs::File::open(&archive_path)
            .await
            .map_err(|_| Error::not_found(format!("archive: {instance_id}")))
    }

    /// Explicit retention policy: artifacts accumulate until the caller
    /// removes them. Removal is refused while the instance is live.
    pub async fn remove_artifact(&self, instance_id: &str) -> Result<()> {
        if self.supervisor.status(instance_id).await.is_some() {
            return Err(Error::AlreadyRunning(instance_id.to_string()));
        }

        let artifact = {
            let mut artifacts = self.artifacts.lock().await;
            artifacts
                .remove(instance_id)
                .ok_or_else(|| Error::not_found(format!("artifact: {instance_id}")))?
        };

        // Best-effort disk cleanup; the registry entry is gone either way.
        if let Err(e) = tokio::fs::remove_dir_all(&artifact.tree_dir).await {
            tracing::warn!(instance_id, error = %e, "failed to remove tree");
        }
        if let Some(archive_path) = &artifact.archive_path
            && let Err(e) = tokio::fs::remove_file(archive_path).await
        {
            tracing::warn!(instance_id, error = %e, "failed to remove archive");
        }

        tracing::info!(instance_id, "artifact removed");
        Ok(())
    }
}

impl Default for BotForge {
    fn default() -> Self {
        Self::new()
    }
}
