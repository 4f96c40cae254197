use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::IdentityTriple;
use crate::session::SessionId;

pub mod policy;
pub mod store;

pub use store::ClosureStore;

/// The outcome of the most recent dismissal of a campaign.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClosureAction {
    None,
    FirstClosureHide,
    TemporaryCloseSession,
    PermanentBlock,
    GlobalOptOut,
}

impl ClosureAction {
    /// Whether the outcome suppresses the banner for the rest of the
    /// session. Deferrals ("show later") never do.
    pub fn is_permanent(self) -> bool {
        match self {
            ClosureAction::FirstClosureHide
            | ClosureAction::PermanentBlock
            | ClosureAction::GlobalOptOut => true,
            ClosureAction::None | ClosureAction::TemporaryCloseSession => false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureRecord {
    pub campaign_id: String,
    pub user_id: String,
    pub company_id: String,
    pub closure_count: u32,
    pub action: ClosureAction,
    pub closed_at: DateTime<Utc>,
    pub session_id: SessionId,
}

impl ClosureRecord {
    pub fn is_for(&self, triple: &IdentityTriple) -> bool {
        self.campaign_id == triple.campaign_id()
            && self.user_id == triple.user_id()
            && self.company_id == triple.company_id()
    }
}
