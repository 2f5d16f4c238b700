//! Git change extraction.
//!
//! A post-receive hook reports every updated ref on stdin. Each ref update
//! is classified as a branch creation, deletion, or update; updates are
//! split at the merge base so a force-push first yields a synthetic rewind
//! record before the forward commits.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::change::{non_empty, ChangeRecord};
use crate::error::GatewayError;
use crate::gateway::VcsGateway;
use crate::source::ChangeSource;

const AUTHOR_PATTERN: &str = r"^Author:\s+(.+)$";
const DIFF_PATTERN: &str = r"^:.*[MAD]\s+(.+)$";
const ONELINE_PATTERN: &str = r"^([0-9a-f]+) (.*)$";

/// One `(oldrev, newrev, refname)` triple from hook stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub oldrev: String,
    pub newrev: String,
    pub refname: String,
}

/// Extracts change records from a Git post-receive event.
pub struct GitChangeSource {
    repository: String,
    first_parent: bool,
    gateway: Arc<dyn VcsGateway>,
}

impl GitChangeSource {
    pub fn new(repository: impl Into<String>, gateway: Arc<dyn VcsGateway>) -> Self {
        GitChangeSource {
            repository: repository.into(),
            first_parent: true,
            gateway,
        }
    }

    /// Consider only the first parent of merge commits when walking ranges.
    pub fn with_first_parent(mut self, first_parent: bool) -> Self {
        self.first_parent = first_parent;
        self
    }

    async fn commits_for_ref(
        &self,
        update: &RefUpdate,
        branch: &str,
    ) -> Result<Vec<ChangeRecord>, GatewayError> {
        if is_zero(&update.oldrev) {
            self.commits_on_create(update, branch).await
        } else if is_zero(&update.newrev) {
            // Branch deletion produces no records.
            Ok(Vec::new())
        } else {
            self.commits_on_update(update, branch).await
        }
    }

    async fn commits_on_create(
        &self,
        update: &RefUpdate,
        branch: &str,
    ) -> Result<Vec<ChangeRecord>, GatewayError> {
        debug!(branch, "branch created");
        let listing = self
            .gateway
            .git_commits(&update.refname, &update.newrev, None, self.first_parent, true)
            .await?;
        self.records_from_listing(&listing, branch).await
    }

    async fn commits_on_update(
        &self,
        update: &RefUpdate,
        branch: &str,
    ) -> Result<Vec<ChangeRecord>, GatewayError> {
        let baserev = self
            .gateway
            .git_merge_base(&update.oldrev, &update.newrev)
            .await?;
        let baserev = baserev.trim().to_string();
        debug!(branch, %baserev, "branch updated");

        let mut records = Vec::new();
        if baserev != update.oldrev {
            // History was rewritten, rewind to the common base first.
            debug!(branch, "force push detected");
            records.push(self.rewind_record(&update.oldrev, &baserev, branch).await?);
        }
        if update.newrev != baserev {
            let listing = self
                .gateway
                .git_commits(
                    &update.refname,
                    &update.newrev,
                    Some(&baserev),
                    self.first_parent,
                    false,
                )
                .await?;
            records.extend(self.records_from_listing(&listing, branch).await?);
        }
        Ok(records)
    }

    /// Synthesize the record that undoes everything between the old tip and
    /// the common base of a force-push.
    async fn rewind_record(
        &self,
        oldrev: &str,
        baserev: &str,
        branch: &str,
    ) -> Result<ChangeRecord, GatewayError> {
        let diff = self.gateway.git_diff(oldrev, baserev).await?;
        let mut record = ChangeRecord::new(baserev);
        record.branch = non_empty(branch);
        record.repository = non_empty(&self.repository);
        record.comments = Some("rewind".to_string());
        record.author = Some("dummy".to_string());
        record.set_files(extract_files_from_diff(&diff));
        Ok(record)
    }

    async fn records_from_listing(
        &self,
        listing: &str,
        branch: &str,
    ) -> Result<Vec<ChangeRecord>, GatewayError> {
        let mut records = Vec::new();
        for line in listing.lines().filter(|line| !line.is_empty()) {
            if let Some(record) = self.commit_record(branch, line).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn commit_record(
        &self,
        branch: &str,
        line: &str,
    ) -> Result<Option<ChangeRecord>, GatewayError> {
        let Some(rev) = extract_rev(line) else {
            warn!(line, "skipping commit line without a revision");
            return Ok(None);
        };
        let info = self.gateway.git_commit_info(&rev).await?;
        let mut record = ChangeRecord::new(rev);
        record.branch = non_empty(branch);
        record.repository = non_empty(&self.repository);
        record.author = extract_author(&info);
        record.set_files(extract_files(&info));
        record.comments = non_empty(&extract_comments(&info));
        debug!(revision = %record.revision, "extracted commit");
        Ok(Some(record))
    }
}

#[async_trait]
impl ChangeSource for GitChangeSource {
    async fn changes(&self) -> Result<Vec<ChangeRecord>, GatewayError> {
        let input = self.gateway.git_hook_input().await?;
        let mut changes = Vec::new();
        for update in parse_ref_updates(&input) {
            let Some(branch) = extract_branch(&update.refname) else {
                // Tags and other refs produce no records.
                continue;
            };
            debug!(
                oldrev = %update.oldrev,
                newrev = %update.newrev,
                refname = %update.refname,
                %branch,
                "ref update"
            );
            changes.extend(self.commits_for_ref(&update, &branch).await?);
        }
        info!(count = changes.len(), "extracted git changes");
        Ok(changes)
    }
}

/// Parse hook stdin into ref updates, skipping malformed lines.
pub fn parse_ref_updates(input: &str) -> Vec<RefUpdate> {
    input
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(oldrev), Some(newrev), Some(refname)) => Some(RefUpdate {
                    oldrev: oldrev.to_string(),
                    newrev: newrev.to_string(),
                    refname: refname.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// The all-zero sentinel marking a ref that does not exist.
fn is_zero(rev: &str) -> bool {
    rev.chars().all(|c| c == '0')
}

/// Branch name for `refs/heads/...` refnames, `None` for anything else.
fn extract_branch(refname: &str) -> Option<String> {
    refname
        .strip_prefix("refs/heads/")
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Revision id from a oneline commit listing entry.
fn extract_rev(line: &str) -> Option<String> {
    let oneline = Regex::new(ONELINE_PATTERN).expect("oneline pattern is valid");
    oneline
        .captures(line.trim())
        .map(|caps| caps[1].to_string())
}

/// First `Author:` line of the commit metadata.
fn extract_author(commit_info: &str) -> Option<String> {
    let author = Regex::new(AUTHOR_PATTERN).expect("author pattern is valid");
    commit_info
        .lines()
        .find_map(|line| author.captures(line).map(|caps| caps[1].to_string()))
}

/// Touched paths from the raw diff lines of the commit metadata.
///
/// Merge commits carry `Merge:` headers instead of raw diff lines; those
/// contribute the literal sentinel entry `"merge"`.
fn extract_files(commit_info: &str) -> Vec<String> {
    let diff = Regex::new(DIFF_PATTERN).expect("diff pattern is valid");
    let mut files = Vec::new();
    for line in commit_info.lines() {
        if let Some(caps) = diff.captures(line) {
            files.push(caps[1].to_string());
        } else if line.starts_with("Merge: ") {
            files.push("merge".to_string());
        }
    }
    files
}

/// Touched paths from `git diff --raw` output.
fn extract_files_from_diff(diff_output: &str) -> Vec<String> {
    let diff = Regex::new(DIFF_PATTERN).expect("diff pattern is valid");
    diff_output
        .lines()
        .filter_map(|line| diff.captures(line).map(|caps| caps[1].to_string()))
        .collect()
}

/// Commit message lines, indented by four spaces in `--pretty=full` output,
/// concatenated without a separator.
fn extract_comments(commit_info: &str) -> String {
    commit_info
        .lines()
        .filter_map(|line| line.strip_prefix("    "))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMIT_INFO: &str = "Author: user <User@mail.com>\n\
        Commit: user <User@mail.com>\n\
        \n\
        \x20   New Feature\n\
        \n\
        :000000 100644 0000000 7b57bd2 A        somefile.txt";

    #[test]
    fn is_zero_matches_all_zero_revisions() {
        assert!(is_zero("000"));
        assert!(is_zero("0000000000000000000000000000000000000000"));
        assert!(!is_zero("001"));
    }

    #[test]
    fn extract_author_finds_the_author_header() {
        assert_eq!(
            extract_author(COMMIT_INFO).as_deref(),
            Some("user <User@mail.com>")
        );
        assert_eq!(extract_author("no headers here"), None);
    }

    #[test]
    fn extract_files_reads_raw_diff_lines() {
        assert_eq!(extract_files(COMMIT_INFO), vec!["somefile.txt"]);
    }

    #[test]
    fn extract_files_marks_merge_commits() {
        let info = "Merge: 24900f9 83060a2\nAuthor: user <User@mail.com>\n\n    Merge branch";
        assert_eq!(extract_files(info), vec!["merge"]);
    }

    #[test]
    fn extract_comments_joins_indented_lines() {
        assert_eq!(extract_comments(COMMIT_INFO), "New Feature");
    }

    #[test]
    fn extract_comments_keeps_deeper_indentation() {
        let info = "    first\n        indented";
        assert_eq!(extract_comments(info), "first    indented");
    }

    #[test]
    fn extract_branch_only_matches_heads() {
        assert_eq!(extract_branch("refs/heads/master").as_deref(), Some("master"));
        assert_eq!(
            extract_branch("refs/heads/feature/x").as_deref(),
            Some("feature/x")
        );
        assert_eq!(extract_branch("refs/tags/v1.0"), None);
        assert_eq!(extract_branch("refs/heads/"), None);
    }

    #[test]
    fn extract_files_from_diff_reads_all_paths() {
        let diff = ":100644 000000 ad6d56b 0000000 D        FILE1.txt\n\
            :100644 000000 e69de29 0000000 D        FILE2.txt";
        assert_eq!(extract_files_from_diff(diff), vec!["FILE1.txt", "FILE2.txt"]);
    }

    #[test]
    fn extract_rev_reads_the_leading_hash() {
        assert_eq!(
            extract_rev("24900f9565adfe70eca693610102b5b201720c21 bla").as_deref(),
            Some("24900f9565adfe70eca693610102b5b201720c21")
        );
        assert_eq!(extract_rev("not a commit line"), None);
    }

    #[test]
    fn parse_ref_updates_skips_malformed_lines() {
        let input = "old new refs/heads/master\nbroken line\nold2 new2 refs/tags/v1\n";
        let updates = parse_ref_updates(input);

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].refname, "refs/heads/master");
        assert_eq!(updates[1].refname, "refs/tags/v1");
    }
}
