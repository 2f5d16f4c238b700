//! Change sources turn raw VCS hook events into normalized change records.

pub mod git;
pub mod svn;

pub use git::{GitChangeSource, RefUpdate};
pub use svn::SvnChangeSource;

use async_trait::async_trait;

use crate::change::ChangeRecord;
use crate::error::GatewayError;

/// A source of change records for one hook invocation.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Extract the change records for the current VCS event.
    async fn changes(&self) -> Result<Vec<ChangeRecord>, GatewayError>;
}
