use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    DemandeId, Mission, MissionId, MissionState, Proposition, PropositionId, PropositionStatut,
};
use super::lifecycle::{EstimationInput, TransitionError};

/// Failure of a winner selection, computed before anything is persisted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("proposition '{0}' not found for this demande")]
    PropositionNotFound(PropositionId),
    #[error("proposition '{id}' is already {statut}", statut = .statut.label())]
    PropositionNotPending {
        id: PropositionId,
        statut: PropositionStatut,
    },
    #[error("demande '{0}' already has an accepted proposition")]
    AlreadyDecided(DemandeId),
    #[error("no mission found for the winning provider")]
    WinningMissionNotFound,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Full post-state of a winner selection. The store applies it atomically:
/// a winner marked accepted without its siblings refused or the losing
/// missions archived would be a data-integrity bug.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionOutcome {
    pub demande_id: DemandeId,
    pub accepted: PropositionId,
    pub refused: Vec<PropositionId>,
    pub winning_mission_id: MissionId,
    pub archived_mission_ids: Vec<MissionId>,
    #[serde(skip)]
    pub updated_propositions: Vec<Proposition>,
    #[serde(skip)]
    pub winning_mission: Mission,
    #[serde(skip)]
    pub archived_missions: Vec<Mission>,
}

/// Resolve the admin's selection into the complete set of mutations.
///
/// Pure with respect to storage: the caller loads the demande's propositions
/// and missions, and commits the returned outcome in one transaction scope.
/// Re-selecting the already-accepted winner yields the same outcome with no
/// further mutations; picking a different winner once one is accepted is
/// refused — acceptance is terminal.
pub fn resolve(
    demande_id: &DemandeId,
    propositions: &[Proposition],
    missions: &[Mission],
    winner_id: &PropositionId,
    now: DateTime<Utc>,
) -> Result<SelectionOutcome, SelectionError> {
    let winner = propositions
        .iter()
        .find(|proposition| &proposition.id == winner_id)
        .ok_or_else(|| SelectionError::PropositionNotFound(winner_id.clone()))?;

    if let Some(accepted) = propositions
        .iter()
        .find(|proposition| proposition.statut == PropositionStatut::Acceptee)
    {
        if &accepted.id == winner_id {
            // Idempotent re-selection of the decided winner.
            return already_decided_outcome(demande_id, winner, missions);
        }
        return Err(SelectionError::AlreadyDecided(demande_id.clone()));
    }

    if winner.statut != PropositionStatut::EnAttente {
        return Err(SelectionError::PropositionNotPending {
            id: winner.id.clone(),
            statut: winner.statut,
        });
    }

    let mut winning_mission = missions
        .iter()
        .find(|mission| {
            !mission.deleted && mission.prestataire_id.as_ref() == Some(&winner.prestataire_id)
        })
        .cloned()
        .ok_or(SelectionError::WinningMissionNotFound)?;

    // The accepted proposition doubles as the provider estimation when the
    // provider has not pushed one through the mission channel yet.
    if winning_mission.internal_state == MissionState::AssignedToProvider {
        winning_mission.submit_estimation(
            EstimationInput {
                prix: winner.prix_prestataire,
                delai_jours: winner.delai_estime_jours,
                frais_externes: 0,
                note: winner.commentaire.clone(),
            },
            now,
        )?;
    }

    let mut updated_propositions = Vec::with_capacity(propositions.len());
    let mut refused = Vec::new();
    for proposition in propositions {
        let mut updated = proposition.clone();
        if &updated.id == winner_id {
            updated.statut = PropositionStatut::Acceptee;
        } else if updated.statut == PropositionStatut::EnAttente {
            updated.statut = PropositionStatut::Refusee;
            refused.push(updated.id.clone());
        }
        updated_propositions.push(updated);
    }

    // Losing missions are preserved for audit: proposition refused and the
    // mission archived, never advanced or deleted.
    let mut archived_missions = Vec::new();
    let mut archived_mission_ids = Vec::new();
    for mission in missions {
        if mission.id == winning_mission.id || mission.deleted || mission.archived {
            continue;
        }
        let mut loser = mission.clone();
        loser.archive("selection", now)?;
        archived_mission_ids.push(loser.id.clone());
        archived_missions.push(loser);
    }

    Ok(SelectionOutcome {
        demande_id: demande_id.clone(),
        accepted: winner_id.clone(),
        refused,
        winning_mission_id: winning_mission.id.clone(),
        archived_mission_ids,
        updated_propositions,
        winning_mission,
        archived_missions,
    })
}

fn already_decided_outcome(
    demande_id: &DemandeId,
    winner: &Proposition,
    missions: &[Mission],
) -> Result<SelectionOutcome, SelectionError> {
    let winning_mission = missions
        .iter()
        .find(|mission| {
            !mission.deleted && mission.prestataire_id.as_ref() == Some(&winner.prestataire_id)
        })
        .cloned()
        .ok_or(SelectionError::WinningMissionNotFound)?;

    Ok(SelectionOutcome {
        demande_id: demande_id.clone(),
        accepted: winner.id.clone(),
        refused: Vec::new(),
        winning_mission_id: winning_mission.id.clone(),
        archived_mission_ids: Vec::new(),
        updated_propositions: Vec::new(),
        winning_mission,
        archived_missions: Vec::new(),
    })
}
