use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::commission::CommissionConfig;
use super::domain::{
    DemandeId, DemandeSnapshot, Mission, MissionId, Proposition, ProviderId, ProviderReputation,
};
use super::selection::SelectionOutcome;

/// Storage port for missions and propositions.
///
/// `update` must compare the stored version with the incoming aggregate's
/// version and refuse stale writes with [`RepositoryError::Conflict`]; the
/// per-mission mutual exclusion of concurrent client/provider/admin actions
/// rests on that check. `apply_selection` must apply the whole outcome in one
/// demande-scoped transaction or not at all.
pub trait MissionStore: Send + Sync {
    fn insert(&self, mission: Mission) -> Result<Mission, RepositoryError>;
    fn update(&self, mission: Mission) -> Result<Mission, RepositoryError>;
    fn fetch(&self, id: &MissionId) -> Result<Option<Mission>, RepositoryError>;
    fn for_demande(&self, demande_id: &DemandeId) -> Result<Vec<Mission>, RepositoryError>;
    fn insert_proposition(
        &self,
        proposition: Proposition,
    ) -> Result<Proposition, RepositoryError>;
    fn propositions_for_demande(
        &self,
        demande_id: &DemandeId,
    ) -> Result<Vec<Proposition>, RepositoryError>;
    fn apply_selection(
        &self,
        outcome: &SelectionOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    #[error("stale write refused, reload and retry")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only lookups against the surrounding application's collaborators.
/// A missing commission configuration is not an error here: the caller falls
/// back to the documented default and logs the gap.
pub trait MarketplaceDirectory: Send + Sync {
    fn demande(&self, id: &DemandeId) -> Result<Option<DemandeSnapshot>, DirectoryError>;
    fn reputation(&self, id: &ProviderId) -> Result<ProviderReputation, DirectoryError>;
    fn commission_config(&self, service_type: &str) -> Result<Option<CommissionConfig>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook fired after committed transitions. Best-effort
/// and retryable on the consumer side; a failure never rolls a transition
/// back.
pub trait MissionNotifier: Send + Sync {
    fn publish(&self, event: MissionEvent) -> Result<(), NotifyError>;
}

/// Notification payload handed to mail/messaging adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionEvent {
    pub template: String,
    pub mission_id: MissionId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
