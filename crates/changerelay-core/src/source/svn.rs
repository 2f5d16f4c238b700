//! Subversion change extraction.
//!
//! A post-commit hook fires once per transaction. One commit can touch
//! paths under several logical branches (a simultaneous trunk and tag
//! operation, for instance), so the changed paths are classified through
//! the configured branch filters and grouped into one record per branch.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::change::{non_empty, ChangeRecord};
use crate::error::GatewayError;
use crate::filter::{classify, BranchFilter};
use crate::gateway::VcsGateway;
use crate::source::ChangeSource;

/// Extracts change records from the latest Subversion transaction.
pub struct SvnChangeSource {
    repository: String,
    filters: Vec<BranchFilter>,
    gateway: Arc<dyn VcsGateway>,
}

impl SvnChangeSource {
    pub fn new(
        repository: impl Into<String>,
        filters: Vec<BranchFilter>,
        gateway: Arc<dyn VcsGateway>,
    ) -> Self {
        SvnChangeSource {
            repository: repository.into(),
            filters,
            gateway,
        }
    }

    /// Changed paths of the transaction, status prefix stripped.
    async fn changed_paths(&self) -> Result<Vec<String>, GatewayError> {
        let raw = self.gateway.svn_changed("", &self.repository).await?;
        // The first 4 columns carry status information.
        Ok(raw
            .lines()
            .filter_map(|line| line.get(4..))
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Group the changed paths by the branch their filter rule assigns,
    /// preserving first-touch order of branches.
    fn files_per_branch(&self, paths: &[String]) -> Vec<(Option<String>, Vec<String>)> {
        let mut groups: Vec<(Option<String>, Vec<String>)> = Vec::new();
        for path in paths {
            let (branch, file) = classify(&self.filters, path);
            debug!(%path, ?branch, %file, "classified path");
            match groups.iter_mut().find(|(b, _)| *b == branch) {
                Some((_, files)) => files.push(file),
                None => groups.push((branch, vec![file])),
            }
        }
        groups
    }
}

#[async_trait]
impl ChangeSource for SvnChangeSource {
    async fn changes(&self) -> Result<Vec<ChangeRecord>, GatewayError> {
        info!(repository = %self.repository, "collecting subversion changes");
        let paths = self.changed_paths().await?;

        let message = self.gateway.svn_message("", &self.repository).await?;
        let author = self.gateway.svn_author("", &self.repository).await?;
        let revision = self.gateway.svn_revision("", &self.repository).await?;
        debug!(
            message = message.trim(),
            author = author.trim(),
            revision = revision.trim(),
            "transaction metadata"
        );

        let changes = self
            .files_per_branch(&paths)
            .into_iter()
            .map(|(branch, files)| {
                let mut record = ChangeRecord::new(revision.trim());
                record.repository = non_empty(&self.repository);
                record.author = non_empty(author.trim());
                record.comments = non_empty(message.trim_end());
                // The unmatched bucket keeps an explicitly empty branch.
                record.branch = Some(branch.unwrap_or_default());
                record.set_files(files);
                record
            })
            .collect();
        Ok(changes)
    }
}
