use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::commission::CommissionConfig;
use super::domain::{
    AdvanceTier, ClosedBy, DemandeId, Mission, MissionId, ProofDocument, Proposition, ProviderId,
    PropositionId,
};
use super::installment::{InstallmentPlanKind, InstallmentTerms};
use super::lifecycle::{
    EstimationInput, PhaseInput, TransitionError, ValidationError,
};
use super::repository::{
    DirectoryError, MarketplaceDirectory, MissionEvent, MissionNotifier, MissionStore,
    RepositoryError,
};
use super::scoring::{self, PropositionScore, ScoringWeights};
use super::selection::{self, SelectionError, SelectionOutcome};

/// Injected engine policy: scoring weights, installment terms, the fallback
/// commission configuration, and the provider estimation SLA.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scoring: ScoringWeights,
    pub installment: InstallmentTerms,
    pub fallback_commission: CommissionConfig,
    pub proposition_sla: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scoring: ScoringWeights::default(),
            installment: InstallmentTerms {
                threshold: 100_000,
                annual_rate_pct: 12.0,
            },
            fallback_commission: CommissionConfig {
                marge_min_pct: 15,
                marge_max_pct: 20,
                risk: super::commission::RiskRule::Flat(2_000),
            },
            proposition_sla: Duration::hours(24),
        }
    }
}

static MISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_mission_identity() -> (MissionId, String) {
    let seq = MISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (MissionId(format!("mis-{seq:06}")), format!("M-{seq:06}"))
}

/// Error raised by the mission service.
#[derive(Debug, thiserror::Error)]
pub enum MissionServiceError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("mission '{0}' not found")]
    MissionNotFound(MissionId),
    #[error("demande '{0}' not found")]
    DemandeNotFound(DemandeId),
}

/// Service composing the store, the read-only directory, and the notifier
/// into the operations consumed by the surrounding application.
///
/// Every mutation follows the same shape: load the aggregate, apply the
/// lifecycle operation, persist under the optimistic version check, then fire
/// a best-effort notification that never affects the committed transition.
pub struct MissionService<S, D, N> {
    store: Arc<S>,
    directory: Arc<D>,
    notifier: Arc<N>,
    settings: EngineSettings,
}

impl<S, D, N> MissionService<S, D, N>
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        notifier: Arc<N>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Spawn a mission for a demande; with a provider id the assignment
    /// transition is applied immediately and the estimation SLA starts.
    pub fn create_mission(
        &self,
        demande_id: DemandeId,
        prestataire_id: Option<ProviderId>,
    ) -> Result<Mission, MissionServiceError> {
        let demande = self
            .directory
            .demande(&demande_id)?
            .ok_or_else(|| MissionServiceError::DemandeNotFound(demande_id.clone()))?;

        let now = Utc::now();
        let (id, reference) = next_mission_identity();
        let mut mission = Mission::new(id, reference, demande_id, demande.client_email, now);
        if let Some(prestataire) = prestataire_id {
            mission.assign_to_provider(prestataire, self.settings.proposition_sla, now)?;
        }

        let stored = self.store.insert(mission)?;
        self.notify("mission_creee", &stored);
        Ok(stored)
    }

    pub fn mission(&self, id: &MissionId) -> Result<Mission, MissionServiceError> {
        self.store
            .fetch(id)?
            .ok_or_else(|| MissionServiceError::MissionNotFound(id.clone()))
    }

    pub fn missions_for_demande(
        &self,
        demande_id: &DemandeId,
    ) -> Result<Vec<Mission>, MissionServiceError> {
        Ok(self.store.for_demande(demande_id)?)
    }

    pub fn assign_to_provider(
        &self,
        id: &MissionId,
        prestataire_id: ProviderId,
    ) -> Result<Mission, MissionServiceError> {
        let sla = self.settings.proposition_sla;
        self.apply(id, "mission_assignee", move |mission, now| {
            mission
                .assign_to_provider(prestataire_id, sla, now)
                .map(|_| ())
        })
    }

    pub fn submit_estimation(
        &self,
        id: &MissionId,
        input: EstimationInput,
    ) -> Result<Mission, MissionServiceError> {
        self.apply(id, "estimation_recue", move |mission, now| {
            mission.submit_estimation(input, now).map(|_| ())
        })
    }

    /// Generate the client quote. The commission configuration is looked up
    /// by service category; a missing configuration falls back to the engine
    /// default and is logged as a data-quality signal, never surfaced as a
    /// failure.
    pub fn generate_devis(
        &self,
        id: &MissionId,
        marge_pct: u8,
        frais_supplementaires: u64,
        echelonnement: Option<InstallmentPlanKind>,
    ) -> Result<Mission, MissionServiceError> {
        let mission = self.mission(id)?;
        let demande = self
            .directory
            .demande(&mission.demande_id)?
            .ok_or_else(|| MissionServiceError::DemandeNotFound(mission.demande_id.clone()))?;

        let config = match self.directory.commission_config(&demande.service_type)? {
            Some(config) => config,
            None => {
                warn!(
                    service_type = %demande.service_type,
                    "no commission configuration for category, falling back to default pricing"
                );
                self.settings.fallback_commission.clone()
            }
        };
        let terms = self.settings.installment;

        self.apply(id, "devis_genere", move |mission, now| {
            mission
                .generate_devis(
                    marge_pct,
                    frais_supplementaires,
                    echelonnement,
                    &config,
                    &terms,
                    now,
                )
                .map(|_| ())
        })
    }

    pub fn record_client_payment(&self, id: &MissionId) -> Result<Mission, MissionServiceError> {
        self.apply(id, "paiement_recu", |mission, now| {
            mission.record_client_payment(now).map(|_| ())
        })
    }

    pub fn send_advance(
        &self,
        id: &MissionId,
        percentage: u8,
    ) -> Result<Mission, MissionServiceError> {
        let tier = AdvanceTier::from_percent(percentage).ok_or_else(|| {
            TransitionError::from(ValidationError::UnknownAdvanceTier(percentage))
        })?;
        self.apply(id, "avance_envoyee", move |mission, now| {
            mission.send_advance(tier, now).map(|_| ())
        })
    }

    pub fn provider_takeover(&self, id: &MissionId) -> Result<Mission, MissionServiceError> {
        self.apply(id, "prise_en_charge", |mission, now| {
            mission.provider_takeover(now).map(|_| ())
        })
    }

    pub fn plan_phases(
        &self,
        id: &MissionId,
        phases: Vec<PhaseInput>,
    ) -> Result<Mission, MissionServiceError> {
        self.apply(id, "phases_planifiees", move |mission, now| {
            mission.plan_phases(phases, now)
        })
    }

    pub fn complete_phase(
        &self,
        id: &MissionId,
        phase_id: &str,
    ) -> Result<Mission, MissionServiceError> {
        let phase_id = phase_id.to_owned();
        self.apply(id, "phase_terminee", move |mission, now| {
            mission.complete_phase(&phase_id, now)
        })
    }

    pub fn submit_proofs(
        &self,
        id: &MissionId,
        proofs: Vec<ProofDocument>,
        comment: Option<String>,
    ) -> Result<Mission, MissionServiceError> {
        self.apply(id, "preuves_soumises", move |mission, now| {
            mission.submit_proofs(proofs, comment, now).map(|_| ())
        })
    }

    pub fn validate_proofs(
        &self,
        id: &MissionId,
        accept: bool,
        validate_for_client: bool,
    ) -> Result<Mission, MissionServiceError> {
        let template = if accept {
            "preuves_validees"
        } else {
            "preuves_rejetees"
        };
        self.apply(id, template, move |mission, now| {
            mission
                .validate_proofs(accept, validate_for_client, now)
                .map(|_| ())
        })
    }

    pub fn pay_balance(&self, id: &MissionId) -> Result<Mission, MissionServiceError> {
        self.apply(id, "solde_verse", |mission, now| {
            mission.pay_balance(now).map(|_| ())
        })
    }

    pub fn close_mission(
        &self,
        id: &MissionId,
        closed_by: ClosedBy,
    ) -> Result<Mission, MissionServiceError> {
        self.apply(id, "mission_cloturee", move |mission, now| {
            mission.close(closed_by, now).map(|_| ())
        })
    }

    pub fn cancel_mission(&self, id: &MissionId) -> Result<Mission, MissionServiceError> {
        self.apply(id, "mission_annulee", |mission, now| {
            mission.cancel(now).map(|_| ())
        })
    }

    pub fn archive_mission(
        &self,
        id: &MissionId,
        by: &str,
    ) -> Result<Mission, MissionServiceError> {
        let by = by.to_owned();
        self.apply(id, "mission_archivee", move |mission, now| {
            mission.archive(&by, now)
        })
    }

    pub fn delete_mission(
        &self,
        id: &MissionId,
        by: &str,
    ) -> Result<Mission, MissionServiceError> {
        let by = by.to_owned();
        self.apply(id, "mission_supprimee", move |mission, now| {
            mission.delete(&by, now)
        })
    }

    /// Score the pending bids of a demande and return them best first. The
    /// top entry is a recommendation only; committing it goes through
    /// [`MissionService::select_winner`].
    pub fn score_and_rank_propositions(
        &self,
        demande_id: &DemandeId,
    ) -> Result<Vec<PropositionScore>, MissionServiceError> {
        let propositions = self.store.propositions_for_demande(demande_id)?;
        let mut candidates: Vec<(Proposition, _)> = Vec::new();
        for proposition in propositions
            .into_iter()
            .filter(|p| p.statut == super::domain::PropositionStatut::EnAttente)
        {
            let reputation = self.directory.reputation(&proposition.prestataire_id)?;
            candidates.push((proposition, reputation));
        }
        Ok(scoring::rank(&candidates, &self.settings.scoring))
    }

    /// Commit the admin's winner: accept the proposition, refuse its
    /// siblings, ready the winning mission for devis generation, and archive
    /// the losing missions, all in one demande-scoped transaction.
    pub fn select_winner(
        &self,
        demande_id: &DemandeId,
        proposition_id: &PropositionId,
    ) -> Result<SelectionOutcome, MissionServiceError> {
        let propositions = self.store.propositions_for_demande(demande_id)?;
        let missions = self.store.for_demande(demande_id)?;
        let now = Utc::now();

        let outcome =
            selection::resolve(demande_id, &propositions, &missions, proposition_id, now)?;
        self.store.apply_selection(&outcome, now)?;

        self.notify_selection(&outcome);
        Ok(outcome)
    }

    fn apply<F>(
        &self,
        id: &MissionId,
        template: &'static str,
        operation: F,
    ) -> Result<Mission, MissionServiceError>
    where
        F: FnOnce(&mut Mission, DateTime<Utc>) -> Result<(), TransitionError>,
    {
        let mut mission = self.mission(id)?;
        let now = Utc::now();
        operation(&mut mission, now)?;
        let stored = self.store.update(mission)?;
        self.notify(template, &stored);
        Ok(stored)
    }

    fn notify(&self, template: &str, mission: &Mission) {
        let mut details = BTreeMap::new();
        details.insert("reference".to_string(), mission.reference.clone());
        details.insert(
            "etat".to_string(),
            mission.internal_state.label().to_string(),
        );
        details.insert("client".to_string(), mission.client_email.clone());

        let event = MissionEvent {
            template: template.to_string(),
            mission_id: mission.id.clone(),
            details,
        };
        if let Err(err) = self.notifier.publish(event) {
            warn!(mission = %mission.id, %err, "mission notification dropped");
        }
    }

    fn notify_selection(&self, outcome: &SelectionOutcome) {
        let mut details = BTreeMap::new();
        details.insert("demande".to_string(), outcome.demande_id.to_string());
        details.insert("proposition".to_string(), outcome.accepted.to_string());
        details.insert(
            "perdantes".to_string(),
            outcome.refused.len().to_string(),
        );

        let event = MissionEvent {
            template: "gagnant_selectionne".to_string(),
            mission_id: outcome.winning_mission_id.clone(),
            details,
        };
        if let Err(err) = self.notifier.publish(event) {
            warn!(demande = %outcome.demande_id, %err, "selection notification dropped");
        }
    }
}
