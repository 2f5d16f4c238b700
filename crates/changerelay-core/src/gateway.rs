//! Raw access to the VCS command-line tools.
//!
//! The extractors only ever see decoded command output; everything that
//! shells out lives behind [`VcsGateway`] so tests can script it. The
//! production implementation runs `git` and `svnlook` as child processes.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::error::GatewayError;

/// Raw VCS command access consumed by the change extractors.
///
/// Every method returns decoded text as the tool produced it; trailing
/// newlines and empty-line artifacts are the caller's to strip.
#[async_trait]
pub trait VcsGateway: Send + Sync {
    /// The Git hook's stdin, one `oldrev newrev refname` line per updated ref.
    async fn git_hook_input(&self) -> Result<String, GatewayError>;

    /// Oneline commit listing for a ref update.
    ///
    /// With `new_branch` set, lists the commits reachable from `newrev` but
    /// not from any existing branch tip. Otherwise lists the range
    /// `baserev..newrev`, honoring `first_parent`.
    async fn git_commits(
        &self,
        refname: &str,
        newrev: &str,
        baserev: Option<&str>,
        first_parent: bool,
        new_branch: bool,
    ) -> Result<String, GatewayError>;

    /// Most recent common ancestor of two revisions.
    async fn git_merge_base(&self, oldrev: &str, newrev: &str) -> Result<String, GatewayError>;

    /// Full metadata for one commit (`git show --raw --pretty=full`).
    async fn git_commit_info(&self, rev: &str) -> Result<String, GatewayError>;

    /// Raw diff between two revisions (`git diff --raw`).
    async fn git_diff(&self, oldrev: &str, newrev: &str) -> Result<String, GatewayError>;

    /// Changed-path listing for a Subversion transaction (`svnlook changed`).
    async fn svn_changed(&self, rev_arg: &str, repository: &str) -> Result<String, GatewayError>;

    /// Author of the Subversion transaction (`svnlook author`).
    async fn svn_author(&self, rev_arg: &str, repository: &str) -> Result<String, GatewayError>;

    /// Log message of the Subversion transaction (`svnlook log`).
    async fn svn_message(&self, rev_arg: &str, repository: &str) -> Result<String, GatewayError>;

    /// Latest revision number of the repository (`svnlook youngest`).
    async fn svn_revision(&self, rev_arg: &str, repository: &str) -> Result<String, GatewayError>;
}

/// Production gateway that shells out to `git` and `svnlook`.
///
/// Commands run in the current working directory, which for hook
/// invocations is the repository itself. A non-zero exit still yields the
/// captured stdout; empty output flows through the same empty-range paths
/// the extractors already handle.
#[derive(Debug, Default)]
pub struct ShellGateway;

impl ShellGateway {
    pub fn new() -> Self {
        ShellGateway
    }

    async fn output(&self, program: &str, args: &[&str]) -> Result<String, GatewayError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| GatewayError::Spawn(format!("{program}: {err}")))?;
        if !output.status.success() {
            debug!(
                program,
                ?args,
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "command exited non-zero"
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn output_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> Result<String, GatewayError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| GatewayError::Spawn(format!("{program}: {err}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            debug!(
                program,
                ?args,
                status = ?output.status.code(),
                "command exited non-zero"
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run the `rev_arg`-parameterized `svnlook` subcommands.
    async fn svnlook(
        &self,
        subcommand: &str,
        rev_arg: &str,
        repository: &str,
    ) -> Result<String, GatewayError> {
        let mut args = vec![subcommand];
        args.extend(rev_arg.split_whitespace());
        args.push(repository);
        self.output("svnlook", &args).await
    }
}

#[async_trait]
impl VcsGateway for ShellGateway {
    async fn git_hook_input(&self) -> Result<String, GatewayError> {
        let mut input = String::new();
        tokio::io::stdin().read_to_string(&mut input).await?;
        Ok(input)
    }

    async fn git_commits(
        &self,
        refname: &str,
        newrev: &str,
        baserev: Option<&str>,
        first_parent: bool,
        new_branch: bool,
    ) -> Result<String, GatewayError> {
        if new_branch {
            // Exclude everything reachable from existing branch tips, except
            // the new ref's own tip, then walk from newrev.
            let exclusions = self.output("git", &["rev-parse", "--not", "--branches"]).await?;
            let tip = self.output("git", &["rev-parse", refname]).await?;
            let tip = tip.trim();
            let exclusions: Vec<&str> = exclusions
                .lines()
                .filter(|line| tip.is_empty() || !line.contains(tip))
                .collect();
            self.output_with_stdin(
                "git",
                &["rev-list", "--reverse", "--pretty=oneline", "--stdin", newrev],
                &exclusions.join("\n"),
            )
            .await
        } else {
            let range = format!("{}..{}", baserev.unwrap_or_default(), newrev);
            let mut args = vec!["rev-list", "--reverse", "--pretty=oneline"];
            if first_parent {
                args.push("--first-parent");
            }
            args.push(&range);
            self.output("git", &args).await
        }
    }

    async fn git_merge_base(&self, oldrev: &str, newrev: &str) -> Result<String, GatewayError> {
        self.output("git", &["merge-base", oldrev, newrev]).await
    }

    async fn git_commit_info(&self, rev: &str) -> Result<String, GatewayError> {
        self.output("git", &["show", "--raw", "--pretty=full", rev]).await
    }

    async fn git_diff(&self, oldrev: &str, newrev: &str) -> Result<String, GatewayError> {
        let range = format!("{oldrev}..{newrev}");
        self.output("git", &["diff", "--raw", &range]).await
    }

    async fn svn_changed(&self, rev_arg: &str, repository: &str) -> Result<String, GatewayError> {
        self.svnlook("changed", rev_arg, repository).await
    }

    async fn svn_author(&self, rev_arg: &str, repository: &str) -> Result<String, GatewayError> {
        self.svnlook("author", rev_arg, repository).await
    }

    async fn svn_message(&self, rev_arg: &str, repository: &str) -> Result<String, GatewayError> {
        self.svnlook("log", rev_arg, repository).await
    }

    async fn svn_revision(&self, _rev_arg: &str, repository: &str) -> Result<String, GatewayError> {
        self.output("svnlook", &["youngest", repository]).await
    }
}
