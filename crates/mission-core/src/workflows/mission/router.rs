use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ClosedBy, DemandeId, MissionId, ProofDocument, ProviderId, PropositionId};
use super::installment::InstallmentPlanKind;
use super::lifecycle::{EstimationInput, PhaseInput, TransitionError};
use super::repository::{MarketplaceDirectory, MissionNotifier, MissionStore, RepositoryError};
use super::service::{MissionService, MissionServiceError};
use chrono::{DateTime, Utc};

/// Router builder exposing the mission lifecycle over HTTP.
pub fn mission_router<S, D, N>(service: Arc<MissionService<S, D, N>>) -> Router
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    Router::new()
        .route("/api/v1/missions", post(create_mission::<S, D, N>))
        .route("/api/v1/missions/:id", get(get_mission::<S, D, N>))
        .route(
            "/api/v1/missions/:id/estimation",
            post(submit_estimation::<S, D, N>),
        )
        .route("/api/v1/missions/:id/devis", post(generate_devis::<S, D, N>))
        .route(
            "/api/v1/missions/:id/paiement",
            post(record_payment::<S, D, N>),
        )
        .route("/api/v1/missions/:id/avance", post(send_advance::<S, D, N>))
        .route(
            "/api/v1/missions/:id/prise-en-charge",
            post(provider_takeover::<S, D, N>),
        )
        .route("/api/v1/missions/:id/phases", post(plan_phases::<S, D, N>))
        .route(
            "/api/v1/missions/:id/phases/:phase_id/complete",
            post(complete_phase::<S, D, N>),
        )
        .route("/api/v1/missions/:id/preuves", post(submit_proofs::<S, D, N>))
        .route(
            "/api/v1/missions/:id/preuves/validation",
            post(validate_proofs::<S, D, N>),
        )
        .route("/api/v1/missions/:id/solde", post(pay_balance::<S, D, N>))
        .route("/api/v1/missions/:id/cloture", post(close_mission::<S, D, N>))
        .route("/api/v1/missions/:id/archive", post(archive_mission::<S, D, N>))
        .route(
            "/api/v1/demandes/:demande_id/classement",
            get(rank_propositions::<S, D, N>),
        )
        .route(
            "/api/v1/demandes/:demande_id/selection",
            post(select_winner::<S, D, N>),
        )
        .with_state(service)
}

fn error_response(error: MissionServiceError) -> Response {
    let status = match &error {
        MissionServiceError::MissionNotFound(_) | MissionServiceError::DemandeNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        MissionServiceError::Transition(TransitionError::InvalidTransition { .. }) => {
            StatusCode::CONFLICT
        }
        MissionServiceError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MissionServiceError::Selection(_) => StatusCode::CONFLICT,
        MissionServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        MissionServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        MissionServiceError::Repository(_) | MissionServiceError::Directory(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = Json(json!({ "error": error.to_string() }));
    (status, body).into_response()
}

fn mission_response(
    result: Result<super::domain::Mission, MissionServiceError>,
) -> Response {
    match result {
        Ok(mission) => (StatusCode::OK, Json(mission)).into_response(),
        Err(error) => error_response(error),
    }
}

type Service<S, D, N> = State<Arc<MissionService<S, D, N>>>;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateMissionRequest {
    pub(crate) demande_id: String,
    #[serde(default)]
    pub(crate) prestataire_id: Option<String>,
}

async fn create_mission<S, D, N>(
    State(service): Service<S, D, N>,
    Json(payload): Json<CreateMissionRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    let result = service.create_mission(
        DemandeId(payload.demande_id),
        payload.prestataire_id.map(ProviderId),
    );
    match result {
        Ok(mission) => (StatusCode::CREATED, Json(mission)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn get_mission<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.mission(&MissionId(id)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct EstimationRequest {
    pub(crate) prix: u64,
    pub(crate) delai_jours: u32,
    #[serde(default)]
    pub(crate) frais_externes: u64,
    #[serde(default)]
    pub(crate) note: Option<String>,
}

async fn submit_estimation<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
    Json(payload): Json<EstimationRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    let input = EstimationInput {
        prix: payload.prix,
        delai_jours: payload.delai_jours,
        frais_externes: payload.frais_externes,
        note: payload.note,
    };
    mission_response(service.submit_estimation(&MissionId(id), input))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DevisRequest {
    pub(crate) marge_pct: u8,
    #[serde(default)]
    pub(crate) frais_supplementaires: u64,
    #[serde(default)]
    pub(crate) echelonnement: Option<InstallmentPlanKind>,
}

async fn generate_devis<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
    Json(payload): Json<DevisRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.generate_devis(
        &MissionId(id),
        payload.marge_pct,
        payload.frais_supplementaires,
        payload.echelonnement,
    ))
}

async fn record_payment<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.record_client_payment(&MissionId(id)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdvanceRequest {
    pub(crate) percentage: u8,
}

async fn send_advance<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
    Json(payload): Json<AdvanceRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.send_advance(&MissionId(id), payload.percentage))
}

async fn provider_takeover<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.provider_takeover(&MissionId(id)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PhasePlanRequest {
    pub(crate) phases: Vec<PhaseEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PhaseEntry {
    pub(crate) label: String,
    #[serde(default)]
    pub(crate) date_limite: Option<DateTime<Utc>>,
}

async fn plan_phases<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
    Json(payload): Json<PhasePlanRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    let phases = payload
        .phases
        .into_iter()
        .map(|entry| PhaseInput {
            label: entry.label,
            date_limite: entry.date_limite,
        })
        .collect();
    mission_response(service.plan_phases(&MissionId(id), phases))
}

async fn complete_phase<S, D, N>(
    State(service): Service<S, D, N>,
    Path((id, phase_id)): Path<(String, String)>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.complete_phase(&MissionId(id), &phase_id))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProofSubmissionRequest {
    pub(crate) proofs: Vec<ProofDocument>,
    #[serde(default)]
    pub(crate) commentaire: Option<String>,
}

async fn submit_proofs<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
    Json(payload): Json<ProofSubmissionRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.submit_proofs(&MissionId(id), payload.proofs, payload.commentaire))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProofValidationRequest {
    pub(crate) accept: bool,
    #[serde(default)]
    pub(crate) validate_for_client: bool,
}

async fn validate_proofs<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
    Json(payload): Json<ProofValidationRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.validate_proofs(
        &MissionId(id),
        payload.accept,
        payload.validate_for_client,
    ))
}

async fn pay_balance<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.pay_balance(&MissionId(id)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloseRequest {
    pub(crate) closed_by: ClosedBy,
}

async fn close_mission<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
    Json(payload): Json<CloseRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.close_mission(&MissionId(id), payload.closed_by))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArchiveRequest {
    pub(crate) by: String,
}

async fn archive_mission<S, D, N>(
    State(service): Service<S, D, N>,
    Path(id): Path<String>,
    Json(payload): Json<ArchiveRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    mission_response(service.archive_mission(&MissionId(id), &payload.by))
}

async fn rank_propositions<S, D, N>(
    State(service): Service<S, D, N>,
    Path(demande_id): Path<String>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    match service.score_and_rank_propositions(&DemandeId(demande_id)) {
        Ok(ranking) => (StatusCode::OK, Json(ranking)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WinnerRequest {
    pub(crate) proposition_id: String,
}

async fn select_winner<S, D, N>(
    State(service): Service<S, D, N>,
    Path(demande_id): Path<String>,
    Json(payload): Json<WinnerRequest>,
) -> Response
where
    S: MissionStore + 'static,
    D: MarketplaceDirectory + 'static,
    N: MissionNotifier + 'static,
{
    match service.select_winner(
        &DemandeId(demande_id),
        &PropositionId(payload.proposition_id),
    ) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}
