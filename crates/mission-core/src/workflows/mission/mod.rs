//! Mission lifecycle engine: the state machine coordinating a client
//! request, competing provider bids, and the admin-driven pricing, payment,
//! and proof-validation flow that takes one winning engagement to completion.

pub mod commission;
pub mod domain;
pub mod installment;
pub mod lifecycle;
pub mod progress;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod selection;
pub mod service;

#[cfg(test)]
mod tests;

pub use commission::{CommissionBreakdown, CommissionConfig, RiskRule};
pub use domain::{
    AdvanceTier, ClientStatus, ClosedBy, DemandeId, DemandeSnapshot, EstimationPartenaire,
    ExecutionPhase, Mission, MissionId, MissionState, ProgressEvent, ProofDocument, Proposition,
    PropositionId, PropositionStatut, ProviderId, ProviderReputation, Urgence,
};
pub use installment::{InstallmentPlan, InstallmentPlanKind, InstallmentTerms, Tranche};
pub use lifecycle::{
    EstimationInput, PhaseInput, PreconditionFailed, TransitionError, ValidationError,
};
pub use repository::{
    DirectoryError, MarketplaceDirectory, MissionEvent, MissionNotifier, MissionStore,
    NotifyError, RepositoryError,
};
pub use router::mission_router;
pub use scoring::{PropositionScore, ScoringWeights};
pub use selection::{SelectionError, SelectionOutcome};
pub use service::{EngineSettings, MissionService, MissionServiceError};
