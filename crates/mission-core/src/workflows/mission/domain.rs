use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier wrapper for missions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionId(pub String);

/// Identifier wrapper for the originating client request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DemandeId(pub String);

/// Identifier wrapper for service providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub String);

/// Identifier wrapper for provider bids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropositionId(pub String);

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DemandeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PropositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Internal lifecycle state, single source of truth for a mission.
///
/// The forward path is strictly linear; `Cancelled` is the only side exit.
/// The client-facing `status` and the progress percentage are projections of
/// this enum and are never written directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    Created,
    AssignedToProvider,
    ProviderEstimated,
    WaitingClientPayment,
    PaidWaitingTakeover,
    AdvanceSent,
    InProgress,
    ProviderValidationSubmitted,
    AdminConfirmed,
    Completed,
    Cancelled,
}

impl MissionState {
    pub const fn label(self) -> &'static str {
        match self {
            MissionState::Created => "creee",
            MissionState::AssignedToProvider => "assignee_prestataire",
            MissionState::ProviderEstimated => "estimation_recue",
            MissionState::WaitingClientPayment => "attente_paiement_client",
            MissionState::PaidWaitingTakeover => "payee_attente_prise_en_charge",
            MissionState::AdvanceSent => "avance_envoyee",
            MissionState::InProgress => "en_cours",
            MissionState::ProviderValidationSubmitted => "validation_soumise",
            MissionState::AdminConfirmed => "confirmee_admin",
            MissionState::Completed => "terminee",
            MissionState::Cancelled => "annulee",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, MissionState::Completed | MissionState::Cancelled)
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse client-facing bucket, recomputed from [`MissionState`] on every
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Analyse,
    Evaluation,
    AttentePaiement,
    EnCours,
    Terminee,
}

impl ClientStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ClientStatus::Analyse => "analyse",
            ClientStatus::Evaluation => "evaluation",
            ClientStatus::AttentePaiement => "attente_paiement",
            ClientStatus::EnCours => "en_cours",
            ClientStatus::Terminee => "terminee",
        }
    }
}

/// Advance tier released to the provider after client payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceTier {
    Quart,
    Moitie,
    Integrale,
}

impl AdvanceTier {
    pub const fn percent(self) -> u8 {
        match self {
            AdvanceTier::Quart => 25,
            AdvanceTier::Moitie => 50,
            AdvanceTier::Integrale => 100,
        }
    }

    pub fn from_percent(value: u8) -> Option<Self> {
        match value {
            25 => Some(AdvanceTier::Quart),
            50 => Some(AdvanceTier::Moitie),
            100 => Some(AdvanceTier::Integrale),
            _ => None,
        }
    }
}

/// Actor that closed a completed mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosedBy {
    Client,
    Admin,
    Auto,
}

/// Provider estimation recorded against an assigned mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationPartenaire {
    pub prix: u64,
    pub delai_jours: u32,
    pub frais_externes: u64,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
    /// Recorded after the proposition deadline expired. The estimation is
    /// still usable, the flag is surfaced to the admin.
    pub late: bool,
}

/// Ordered execution sub-step of an in-progress mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPhase {
    pub id: String,
    pub ordre: u32,
    pub label: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub date_limite: Option<DateTime<Utc>>,
}

impl ExecutionPhase {
    /// Lateness is derived on read against the stored deadline, never stored.
    pub fn retard(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.date_limite.map(|limite| now > limite).unwrap_or(false)
    }
}

/// Stamped entry in the mission progress history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub at: DateTime<Utc>,
    pub progress: u8,
    pub retard: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Proof-of-completion document reference submitted by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofDocument {
    pub label: String,
    pub storage_key: String,
}

/// The central aggregate: one provider's engagement against a demande.
///
/// Commercial totals are always recomputed from their inputs, and
/// `current_progress` only ever increases. Archival and deletion are soft
/// flags orthogonal to `internal_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub reference: String,
    pub demande_id: DemandeId,
    pub client_email: String,
    /// Set exactly once, at assignment or winner selection.
    pub prestataire_id: Option<ProviderId>,
    pub internal_state: MissionState,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    pub date_assignation: Option<DateTime<Utc>>,
    pub date_limite_proposition: Option<DateTime<Utc>>,
    pub estimation: Option<EstimationPartenaire>,
    pub tarif_prestataire: Option<u64>,
    pub commission_hybride: Option<u64>,
    pub commission_risk: Option<u64>,
    pub commission_totale: Option<u64>,
    pub frais_supplementaires: u64,
    pub tarif_total: Option<u64>,
    pub paiement_echelonne: Option<super::installment::InstallmentPlan>,
    pub devis_genere: bool,
    pub devis_genere_at: Option<DateTime<Utc>>,
    pub paiement_effectue_at: Option<DateTime<Utc>>,
    pub avance: Option<AdvanceTier>,
    pub avance_versee_at: Option<DateTime<Utc>>,
    pub date_prise_en_charge: Option<DateTime<Utc>>,
    pub solde_versee: bool,
    pub solde_montant: Option<u64>,
    pub solde_versee_at: Option<DateTime<Utc>>,
    pub phases: Vec<ExecutionPhase>,
    pub progress: Vec<ProgressEvent>,
    pub current_progress: u8,
    pub proofs: Vec<ProofDocument>,
    pub proof_comment: Option<String>,
    pub proof_submitted_at: Option<DateTime<Utc>>,
    pub proof_validated_by_admin: bool,
    pub proof_validated_by_admin_at: Option<DateTime<Utc>>,
    pub proof_validated_for_client: bool,
    pub proof_validated_for_client_at: Option<DateTime<Utc>>,
    pub closed_by: Option<ClosedBy>,
    pub closed_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<String>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    /// Optimistic concurrency stamp, bumped by the store on every update.
    pub version: u64,
}

impl Mission {
    pub fn new(
        id: MissionId,
        reference: String,
        demande_id: DemandeId,
        client_email: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            reference,
            demande_id,
            client_email,
            prestataire_id: None,
            internal_state: MissionState::Created,
            status: super::progress::client_status(MissionState::Created),
            created_at: now,
            date_assignation: None,
            date_limite_proposition: None,
            estimation: None,
            tarif_prestataire: None,
            commission_hybride: None,
            commission_risk: None,
            commission_totale: None,
            frais_supplementaires: 0,
            tarif_total: None,
            paiement_echelonne: None,
            devis_genere: false,
            devis_genere_at: None,
            paiement_effectue_at: None,
            avance: None,
            avance_versee_at: None,
            date_prise_en_charge: None,
            solde_versee: false,
            solde_montant: None,
            solde_versee_at: None,
            phases: Vec::new(),
            progress: vec![ProgressEvent {
                at: now,
                progress: 0,
                retard: false,
                comment: None,
            }],
            current_progress: 0,
            proofs: Vec::new(),
            proof_comment: None,
            proof_submitted_at: None,
            proof_validated_by_admin: false,
            proof_validated_by_admin_at: None,
            proof_validated_for_client: false,
            proof_validated_for_client_at: None,
            closed_by: None,
            closed_at: None,
            archived: false,
            archived_at: None,
            archived_by: None,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            version: 0,
        }
    }

    /// Phases currently late with respect to their deadline.
    pub fn late_phases(&self, now: DateTime<Utc>) -> Vec<&ExecutionPhase> {
        self.phases
            .iter()
            .filter(|phase| phase.retard(now))
            .collect()
    }
}

/// Lifecycle state of a provider bid. Acceptance is terminal: exactly one
/// proposition per demande may ever be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropositionStatut {
    EnAttente,
    Acceptee,
    Refusee,
}

impl PropositionStatut {
    pub const fn label(self) -> &'static str {
        match self {
            PropositionStatut::EnAttente => "en_attente",
            PropositionStatut::Acceptee => "acceptee",
            PropositionStatut::Refusee => "refusee",
        }
    }
}

/// A provider's priced bid against a demande.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposition {
    pub id: PropositionId,
    pub demande_id: DemandeId,
    pub prestataire_id: ProviderId,
    pub prix_prestataire: u64,
    pub delai_estime_jours: u32,
    /// Self-assessed difficulty, 1 (routine) to 5 (specialist).
    pub difficulte_estimee: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentaire: Option<String>,
    pub statut: PropositionStatut,
    pub submitted_at: DateTime<Utc>,
}

/// Urgency tier carried by the originating client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgence {
    Faible,
    Normale,
    Urgente,
}

/// Read-only snapshot of the client request, owned by the intake collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandeSnapshot {
    pub id: DemandeId,
    pub service_type: String,
    pub lieu: String,
    pub urgence: Urgence,
    pub client_email: String,
}

/// Reputation signals consumed by the proposition scorer. All fields are
/// optional: a new provider carries no history and must not be punished for it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderReputation {
    /// Average rating on a 0–5 scale.
    pub note_moyenne: Option<f64>,
    /// Share of past missions completed without dispute, 0–100.
    pub taux_reussite: Option<f64>,
    pub nombre_missions: u32,
}
