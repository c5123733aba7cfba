use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::commission::CommissionConfig;
use super::domain::{
    AdvanceTier, ClosedBy, EstimationPartenaire, ExecutionPhase, Mission, MissionState,
    ProgressEvent, ProofDocument,
};
use super::installment::{InstallmentPlanKind, InstallmentTerms};
use super::{commission, installment, progress};

/// Malformed input, rejected before any mutation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("marge {found}% outside the allowed range [{min}%, {max}%]")]
    MargeOutOfRange { found: u8, min: u8, max: u8 },
    #[error("advance percentage {0} is not one of 25, 50 or 100")]
    UnknownAdvanceTier(u8),
    #[error("installment plans require a total above {threshold}, got {total}")]
    BelowInstallmentThreshold { total: u64, threshold: u64 },
    #[error("phase plan is empty")]
    EmptyPhasePlan,
    #[error("proof submission carries no documents")]
    EmptyProofSet,
}

/// State is right but a dependent field is missing or already consumed.
/// Distinct from [`TransitionError::InvalidTransition`] so callers can render
/// a precise message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreconditionFailed {
    #[error("mission is already assigned to a provider")]
    AlreadyAssigned,
    #[error("no provider estimation recorded")]
    MissingEstimation,
    #[error("devis has not been generated")]
    DevisNotGenerated,
    #[error("no advance has been sent")]
    AdvanceNotSent,
    #[error("phase '{0}' not found")]
    PhaseNotFound(String),
    #[error("phase '{0}' is already completed")]
    PhaseAlreadyCompleted(String),
    #[error("phases cannot be replanned once execution started")]
    PhasesAlreadyStarted,
    #[error("no proof submission pending validation")]
    NothingToValidate,
    #[error("balance already paid")]
    BalanceAlreadyPaid,
    #[error("no balance owed after a full advance")]
    NoBalanceDue,
    #[error("balance must be paid before closing")]
    BalanceOutstanding,
    #[error("mission has been deleted")]
    MissionDeleted,
}

/// Typed failure of a lifecycle operation. Nothing is ever partially applied:
/// an error leaves the aggregate untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("operation '{operation}' is not allowed from state '{from}'")]
    InvalidTransition {
        operation: &'static str,
        from: MissionState,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Precondition(#[from] PreconditionFailed),
}

/// Estimation payload submitted by the assigned provider.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationInput {
    pub prix: u64,
    pub delai_jours: u32,
    pub frais_externes: u64,
    pub note: Option<String>,
}

/// One entry of an execution phase plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseInput {
    pub label: String,
    pub date_limite: Option<DateTime<Utc>>,
}

impl Mission {
    fn guard(
        &self,
        operation: &'static str,
        allowed: MissionState,
    ) -> Result<(), TransitionError> {
        if self.deleted {
            return Err(PreconditionFailed::MissionDeleted.into());
        }
        if self.internal_state != allowed {
            return Err(TransitionError::InvalidTransition {
                operation,
                from: self.internal_state,
            });
        }
        Ok(())
    }

    /// Move to `next`, reproject the client status, and bump the monotonic
    /// progress percentage. Every transition leaves a progress history entry.
    fn advance_state(&mut self, next: MissionState, now: DateTime<Utc>, comment: Option<&str>) {
        let previous = self.internal_state;
        self.internal_state = next;
        self.status = progress::client_status(next);
        let mapped = progress::percentage_for(next);
        if mapped > self.current_progress {
            self.current_progress = mapped;
        }
        self.progress.push(ProgressEvent {
            at: now,
            progress: self.current_progress,
            retard: false,
            comment: comment.map(str::to_owned),
        });
        info!(
            mission = %self.id,
            from = %previous,
            to = %next,
            progress = self.current_progress,
            "mission transition applied"
        );
    }

    /// Attach the mission to a provider and start the proposition SLA clock.
    /// The provider binding is immutable once set.
    pub fn assign_to_provider(
        &mut self,
        prestataire: super::domain::ProviderId,
        proposition_sla: Duration,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        if self.internal_state == MissionState::AssignedToProvider
            && self.prestataire_id.as_ref() == Some(&prestataire)
        {
            return Ok(self.internal_state);
        }
        if self.prestataire_id.is_some() {
            return Err(PreconditionFailed::AlreadyAssigned.into());
        }
        self.guard("assign_to_provider", MissionState::Created)?;

        self.prestataire_id = Some(prestataire);
        self.date_assignation = Some(now);
        self.date_limite_proposition = Some(now + proposition_sla);
        self.advance_state(MissionState::AssignedToProvider, now, None);
        Ok(self.internal_state)
    }

    /// Record the provider estimation. A submission past the deadline is
    /// still recorded, flagged as late for the admin.
    pub fn submit_estimation(
        &mut self,
        input: EstimationInput,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        if self.internal_state == MissionState::ProviderEstimated {
            return Ok(self.internal_state);
        }
        self.guard("submit_estimation", MissionState::AssignedToProvider)?;

        let late = self
            .date_limite_proposition
            .map(|limite| now > limite)
            .unwrap_or(false);
        if late {
            warn!(mission = %self.id, "estimation received after the proposition deadline");
        }

        self.estimation = Some(EstimationPartenaire {
            prix: input.prix,
            delai_jours: input.delai_jours,
            frais_externes: input.frais_externes,
            note: input.note,
            recorded_at: now,
            late,
        });
        self.advance_state(MissionState::ProviderEstimated, now, None);
        Ok(self.internal_state)
    }

    /// Price the mission: run the commission calculator against the category
    /// configuration, optionally freeze an installment plan, and open the
    /// client payment window. The commercial totals are always recomputed
    /// here, never hand-edited.
    pub fn generate_devis(
        &mut self,
        marge_pct: u8,
        frais_supplementaires: u64,
        echelonnement: Option<InstallmentPlanKind>,
        config: &CommissionConfig,
        terms: &InstallmentTerms,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        if self.internal_state == MissionState::WaitingClientPayment && self.devis_genere {
            return Ok(self.internal_state);
        }
        self.guard("generate_devis", MissionState::ProviderEstimated)?;

        let estimation = self
            .estimation
            .as_ref()
            .ok_or(PreconditionFailed::MissingEstimation)?;
        let prix_prestataire = estimation.prix;

        let breakdown = commission::compute(prix_prestataire, marge_pct, config)?;
        let tarif_total = breakdown.prix_client + frais_supplementaires;

        let paiement_echelonne = match echelonnement {
            Some(kind) => Some(installment::plan(tarif_total, kind, terms, now)?),
            None => None,
        };

        self.tarif_prestataire = Some(prix_prestataire);
        self.commission_hybride = Some(breakdown.commission_hybride);
        self.commission_risk = Some(breakdown.commission_risk);
        self.commission_totale = Some(breakdown.commission_totale);
        self.frais_supplementaires = frais_supplementaires;
        self.tarif_total = Some(tarif_total);
        self.paiement_echelonne = paiement_echelonne;
        self.devis_genere = true;
        self.devis_genere_at = Some(now);
        self.advance_state(MissionState::WaitingClientPayment, now, None);
        Ok(self.internal_state)
    }

    pub fn record_client_payment(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        if self.internal_state == MissionState::PaidWaitingTakeover {
            return Ok(self.internal_state);
        }
        self.guard("record_client_payment", MissionState::WaitingClientPayment)?;
        if !self.devis_genere {
            return Err(PreconditionFailed::DevisNotGenerated.into());
        }

        self.paiement_effectue_at = Some(now);
        self.advance_state(MissionState::PaidWaitingTakeover, now, None);
        Ok(self.internal_state)
    }

    pub fn send_advance(
        &mut self,
        tier: AdvanceTier,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        // Idempotent only for the tier already sent; a different tier after
        // the transfer is a conflicting instruction, not a retry.
        if self.internal_state == MissionState::AdvanceSent && self.avance == Some(tier) {
            return Ok(self.internal_state);
        }
        self.guard("send_advance", MissionState::PaidWaitingTakeover)?;

        self.avance = Some(tier);
        self.avance_versee_at = Some(now);
        self.advance_state(MissionState::AdvanceSent, now, None);
        Ok(self.internal_state)
    }

    pub fn provider_takeover(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        if self.internal_state == MissionState::InProgress {
            return Ok(self.internal_state);
        }
        self.guard("provider_takeover", MissionState::AdvanceSent)?;

        self.date_prise_en_charge = Some(now);
        self.advance_state(MissionState::InProgress, now, None);
        Ok(self.internal_state)
    }

    /// Register the ordered execution plan. Replanning is allowed only while
    /// no phase has been completed.
    pub fn plan_phases(
        &mut self,
        phases: Vec<PhaseInput>,
        _now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.deleted {
            return Err(PreconditionFailed::MissionDeleted.into());
        }
        if !matches!(
            self.internal_state,
            MissionState::AdvanceSent | MissionState::InProgress
        ) {
            return Err(TransitionError::InvalidTransition {
                operation: "plan_phases",
                from: self.internal_state,
            });
        }
        if phases.is_empty() {
            return Err(ValidationError::EmptyPhasePlan.into());
        }
        if self.phases.iter().any(|phase| phase.completed) {
            return Err(PreconditionFailed::PhasesAlreadyStarted.into());
        }

        self.phases = phases
            .into_iter()
            .enumerate()
            .map(|(index, input)| ExecutionPhase {
                id: format!("phase-{}", index + 1),
                ordre: index as u32 + 1,
                label: input.label,
                completed: false,
                completed_at: None,
                date_limite: input.date_limite,
            })
            .collect();
        Ok(())
    }

    /// Mark one phase done. Lateness of the remaining phases is derived on
    /// read, so the only bookkeeping here is the completion stamp and a
    /// progress history entry carrying the retard flag of the closed phase.
    pub fn complete_phase(
        &mut self,
        phase_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.guard("complete_phase", MissionState::InProgress)?;

        let phase = self
            .phases
            .iter_mut()
            .find(|phase| phase.id == phase_id)
            .ok_or_else(|| PreconditionFailed::PhaseNotFound(phase_id.to_owned()))?;
        if phase.completed {
            return Err(PreconditionFailed::PhaseAlreadyCompleted(phase_id.to_owned()).into());
        }

        let was_late = phase.retard(now);
        phase.completed = true;
        phase.completed_at = Some(now);
        let label = phase.label.clone();
        self.progress.push(ProgressEvent {
            at: now,
            progress: self.current_progress,
            retard: was_late,
            comment: Some(format!("phase terminee: {label}")),
        });
        Ok(())
    }

    /// Submit proof-of-completion documents. Open phases do not block a
    /// submission. With a full advance the payout is already settled, so the
    /// submission auto-validates both gates and rolls straight through to
    /// admin confirmation; there is no admin-actionable review step.
    pub fn submit_proofs(
        &mut self,
        proofs: Vec<ProofDocument>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        if self.deleted {
            return Err(PreconditionFailed::MissionDeleted.into());
        }
        if proofs.is_empty() {
            return Err(ValidationError::EmptyProofSet.into());
        }
        match self.internal_state {
            MissionState::ProviderValidationSubmitted if self.proof_submitted_at.is_some() => {
                return Ok(self.internal_state);
            }
            MissionState::AdminConfirmed if self.proof_validated_by_admin => {
                return Ok(self.internal_state);
            }
            // Resubmission slot after an admin reject.
            MissionState::InProgress | MissionState::ProviderValidationSubmitted => {}
            from => {
                return Err(TransitionError::InvalidTransition {
                    operation: "submit_proofs",
                    from,
                });
            }
        }

        self.proofs = proofs;
        self.proof_comment = comment;
        self.proof_submitted_at = Some(now);

        if self.internal_state == MissionState::InProgress {
            self.advance_state(MissionState::ProviderValidationSubmitted, now, None);
        }

        if self.avance == Some(AdvanceTier::Integrale) {
            self.proof_validated_by_admin = true;
            self.proof_validated_by_admin_at = Some(now);
            self.proof_validated_for_client = true;
            self.proof_validated_for_client_at = Some(now);
            self.advance_state(
                MissionState::AdminConfirmed,
                now,
                Some("validation automatique, avance integrale"),
            );
        }
        Ok(self.internal_state)
    }

    /// Admin review of a pending submission. A reject clears the submission
    /// and leaves the mission resubmittable; progress never moves backwards.
    pub fn validate_proofs(
        &mut self,
        accept: bool,
        validate_for_client: bool,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        if self.internal_state == MissionState::AdminConfirmed && self.proof_validated_by_admin {
            return Ok(self.internal_state);
        }
        self.guard("validate_proofs", MissionState::ProviderValidationSubmitted)?;
        if self.proof_submitted_at.is_none() {
            return Err(PreconditionFailed::NothingToValidate.into());
        }

        if accept {
            self.proof_validated_by_admin = true;
            self.proof_validated_by_admin_at = Some(now);
            if validate_for_client {
                self.proof_validated_for_client = true;
                self.proof_validated_for_client_at = Some(now);
            }
            self.advance_state(MissionState::AdminConfirmed, now, None);
        } else {
            self.proofs.clear();
            self.proof_comment = None;
            self.proof_submitted_at = None;
            info!(mission = %self.id, "proof submission rejected, awaiting resubmission");
        }
        Ok(self.internal_state)
    }

    /// Pay out the remaining provider share. Rejected once settled, and
    /// rejected outright after a full advance since nothing is owed.
    pub fn pay_balance(&mut self, now: DateTime<Utc>) -> Result<u64, TransitionError> {
        self.guard("pay_balance", MissionState::AdminConfirmed)?;
        let tier = self.avance.ok_or(PreconditionFailed::AdvanceNotSent)?;
        if tier == AdvanceTier::Integrale {
            return Err(PreconditionFailed::NoBalanceDue.into());
        }
        if self.solde_versee {
            return Err(PreconditionFailed::BalanceAlreadyPaid.into());
        }
        let tarif = self
            .tarif_prestataire
            .ok_or(PreconditionFailed::DevisNotGenerated)?;

        let solde = tarif * (100 - tier.percent() as u64) / 100;
        self.solde_versee = true;
        self.solde_montant = Some(solde);
        self.solde_versee_at = Some(now);
        info!(mission = %self.id, solde, "balance released to provider");
        Ok(solde)
    }

    /// Close out the engagement once the provider payout is settled, either
    /// through the balance payment or a full advance.
    pub fn close(
        &mut self,
        closed_by: ClosedBy,
        now: DateTime<Utc>,
    ) -> Result<MissionState, TransitionError> {
        if self.internal_state == MissionState::Completed {
            return Ok(self.internal_state);
        }
        self.guard("close_mission", MissionState::AdminConfirmed)?;
        if !self.solde_versee && self.avance != Some(AdvanceTier::Integrale) {
            return Err(PreconditionFailed::BalanceOutstanding.into());
        }

        self.closed_by = Some(closed_by);
        self.closed_at = Some(now);
        self.advance_state(MissionState::Completed, now, None);
        Ok(self.internal_state)
    }

    /// Side exit: the client request was refused. Reachable from any
    /// non-completed state; progress freezes where it was.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<MissionState, TransitionError> {
        if self.internal_state == MissionState::Cancelled {
            return Ok(self.internal_state);
        }
        if self.deleted {
            return Err(PreconditionFailed::MissionDeleted.into());
        }
        if self.internal_state == MissionState::Completed {
            return Err(TransitionError::InvalidTransition {
                operation: "cancel_mission",
                from: self.internal_state,
            });
        }
        self.advance_state(MissionState::Cancelled, now, None);
        Ok(self.internal_state)
    }

    /// Soft archive. Orthogonal to the lifecycle state, which never moves.
    pub fn archive(&mut self, by: &str, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.deleted {
            return Err(PreconditionFailed::MissionDeleted.into());
        }
        if !self.archived {
            self.archived = true;
            self.archived_at = Some(now);
            self.archived_by = Some(by.to_owned());
        }
        Ok(())
    }

    /// Soft delete. Fails when already deleted; never touches the state.
    pub fn delete(&mut self, by: &str, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.deleted {
            return Err(PreconditionFailed::MissionDeleted.into());
        }
        self.deleted = true;
        self.deleted_at = Some(now);
        self.deleted_by = Some(by.to_owned());
        Ok(())
    }
}
