use super::domain::{ClientStatus, MissionState};

/// Canonical progress breakpoint for an internal state.
///
/// `Cancelled` maps to 0 on purpose: the stored `current_progress` is updated
/// as `max(current, percentage_for(state))`, so a cancellation freezes the
/// percentage where it was instead of jumping anywhere.
pub const fn percentage_for(state: MissionState) -> u8 {
    match state {
        MissionState::Created => 0,
        MissionState::AssignedToProvider => 20,
        MissionState::ProviderEstimated => 30,
        MissionState::WaitingClientPayment => 50,
        MissionState::PaidWaitingTakeover => 55,
        MissionState::AdvanceSent => 60,
        MissionState::InProgress => 80,
        MissionState::ProviderValidationSubmitted => 90,
        MissionState::AdminConfirmed => 95,
        MissionState::Completed => 100,
        MissionState::Cancelled => 0,
    }
}

/// Collapse the internal state into the five coarse client-facing buckets.
/// Cancelled missions land in the closed bucket.
pub const fn client_status(state: MissionState) -> ClientStatus {
    match state {
        MissionState::Created => ClientStatus::Analyse,
        MissionState::AssignedToProvider | MissionState::ProviderEstimated => {
            ClientStatus::Evaluation
        }
        MissionState::WaitingClientPayment => ClientStatus::AttentePaiement,
        MissionState::PaidWaitingTakeover
        | MissionState::AdvanceSent
        | MissionState::InProgress
        | MissionState::ProviderValidationSubmitted
        | MissionState::AdminConfirmed => ClientStatus::EnCours,
        MissionState::Completed | MissionState::Cancelled => ClientStatus::Terminee,
    }
}
