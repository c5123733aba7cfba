use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::mission::commission::{CommissionConfig, RiskRule};
use crate::workflows::mission::domain::{
    DemandeId, DemandeSnapshot, Mission, MissionId, Proposition, PropositionId,
    PropositionStatut, ProviderId, ProviderReputation, Urgence,
};
use crate::workflows::mission::repository::{
    DirectoryError, MarketplaceDirectory, MissionEvent, MissionNotifier, MissionStore,
    NotifyError, RepositoryError,
};
use crate::workflows::mission::selection::SelectionOutcome;
use crate::workflows::mission::service::{EngineSettings, MissionService};

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).single().expect("valid timestamp")
}

pub(super) fn fresh_mission(id: &str) -> Mission {
    Mission::new(
        MissionId(format!("mis-{id}")),
        format!("M-{id}"),
        DemandeId("dem-1".to_string()),
        "client@example.com".to_string(),
        t0(),
    )
}

pub(super) fn plomberie_config() -> CommissionConfig {
    CommissionConfig {
        marge_min_pct: 15,
        marge_max_pct: 20,
        risk: RiskRule::Flat(2_000),
    }
}

pub(super) fn demande(id: &str, service_type: &str) -> DemandeSnapshot {
    DemandeSnapshot {
        id: DemandeId(id.to_string()),
        service_type: service_type.to_string(),
        lieu: "Douala".to_string(),
        urgence: Urgence::Normale,
        client_email: "client@example.com".to_string(),
    }
}

pub(super) fn proposition(
    id: &str,
    demande_id: &str,
    provider: &str,
    prix: u64,
    delai_jours: u32,
) -> Proposition {
    Proposition {
        id: PropositionId(id.to_string()),
        demande_id: DemandeId(demande_id.to_string()),
        prestataire_id: ProviderId(provider.to_string()),
        prix_prestataire: prix,
        delai_estime_jours: delai_jours,
        difficulte_estimee: 3,
        commentaire: None,
        statut: PropositionStatut::EnAttente,
        submitted_at: t0(),
    }
}

#[derive(Default)]
struct StoreInner {
    missions: HashMap<MissionId, Mission>,
    propositions: HashMap<PropositionId, Proposition>,
}

/// In-memory store honoring the optimistic version check and the atomic
/// selection contract, all state behind a single mutex.
#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub(super) fn proposition(&self, id: &PropositionId) -> Option<Proposition> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .propositions
            .get(id)
            .cloned()
    }
}

impl MissionStore for MemoryStore {
    fn insert(&self, mission: Mission) -> Result<Mission, RepositoryError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.missions.contains_key(&mission.id) {
            return Err(RepositoryError::Duplicate);
        }
        inner.missions.insert(mission.id.clone(), mission.clone());
        Ok(mission)
    }

    fn update(&self, mut mission: Mission) -> Result<Mission, RepositoryError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let stored = inner
            .missions
            .get(&mission.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != mission.version {
            return Err(RepositoryError::Conflict);
        }
        mission.version += 1;
        inner.missions.insert(mission.id.clone(), mission.clone());
        Ok(mission)
    }

    fn fetch(&self, id: &MissionId) -> Result<Option<Mission>, RepositoryError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.missions.get(id).cloned())
    }

    fn for_demande(&self, demande_id: &DemandeId) -> Result<Vec<Mission>, RepositoryError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut missions: Vec<Mission> = inner
            .missions
            .values()
            .filter(|mission| &mission.demande_id == demande_id)
            .cloned()
            .collect();
        missions.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(missions)
    }

    fn insert_proposition(
        &self,
        proposition: Proposition,
    ) -> Result<Proposition, RepositoryError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.propositions.contains_key(&proposition.id) {
            return Err(RepositoryError::Duplicate);
        }
        inner
            .propositions
            .insert(proposition.id.clone(), proposition.clone());
        Ok(proposition)
    }

    fn propositions_for_demande(
        &self,
        demande_id: &DemandeId,
    ) -> Result<Vec<Proposition>, RepositoryError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut propositions: Vec<Proposition> = inner
            .propositions
            .values()
            .filter(|proposition| &proposition.demande_id == demande_id)
            .cloned()
            .collect();
        propositions.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(propositions)
    }

    fn apply_selection(
        &self,
        outcome: &SelectionOutcome,
        _at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        // Validate every version before touching anything.
        let mut updated_missions = Vec::new();
        for mission in std::iter::once(&outcome.winning_mission)
            .chain(outcome.archived_missions.iter())
        {
            let stored = inner
                .missions
                .get(&mission.id)
                .ok_or(RepositoryError::NotFound)?;
            if stored.version != mission.version {
                return Err(RepositoryError::Conflict);
            }
            let mut next = mission.clone();
            next.version += 1;
            updated_missions.push(next);
        }

        for proposition in &outcome.updated_propositions {
            if !inner.propositions.contains_key(&proposition.id) {
                return Err(RepositoryError::NotFound);
            }
        }

        for mission in updated_missions {
            inner.missions.insert(mission.id.clone(), mission);
        }
        for proposition in &outcome.updated_propositions {
            inner
                .propositions
                .insert(proposition.id.clone(), proposition.clone());
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryDirectory {
    demandes: Arc<Mutex<HashMap<DemandeId, DemandeSnapshot>>>,
    reputations: Arc<Mutex<HashMap<ProviderId, ProviderReputation>>>,
    commissions: Arc<Mutex<HashMap<String, CommissionConfig>>>,
}

impl MemoryDirectory {
    pub(super) fn seed_demande(&self, snapshot: DemandeSnapshot) {
        self.demandes
            .lock()
            .expect("directory mutex poisoned")
            .insert(snapshot.id.clone(), snapshot);
    }

    pub(super) fn seed_reputation(&self, provider: &str, reputation: ProviderReputation) {
        self.reputations
            .lock()
            .expect("directory mutex poisoned")
            .insert(ProviderId(provider.to_string()), reputation);
    }

    pub(super) fn seed_commission(&self, service_type: &str, config: CommissionConfig) {
        self.commissions
            .lock()
            .expect("directory mutex poisoned")
            .insert(service_type.to_string(), config);
    }
}

impl MarketplaceDirectory for MemoryDirectory {
    fn demande(&self, id: &DemandeId) -> Result<Option<DemandeSnapshot>, DirectoryError> {
        Ok(self
            .demandes
            .lock()
            .expect("directory mutex poisoned")
            .get(id)
            .cloned())
    }

    fn reputation(&self, id: &ProviderId) -> Result<ProviderReputation, DirectoryError> {
        Ok(self
            .reputations
            .lock()
            .expect("directory mutex poisoned")
            .get(id)
            .copied()
            .unwrap_or_default())
    }

    fn commission_config(
        &self,
        service_type: &str,
    ) -> Result<Option<CommissionConfig>, DirectoryError> {
        Ok(self
            .commissions
            .lock()
            .expect("directory mutex poisoned")
            .get(service_type)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<MissionEvent>>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<MissionEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl MissionNotifier for MemoryNotifier {
    fn publish(&self, event: MissionEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

/// Notifier that always fails, to prove transitions commit regardless.
pub(super) struct BrokenNotifier;

impl MissionNotifier for BrokenNotifier {
    fn publish(&self, _event: MissionEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp offline".to_string()))
    }
}

pub(super) fn build_service() -> (
    MissionService<MemoryStore, MemoryDirectory, MemoryNotifier>,
    Arc<MemoryStore>,
    Arc<MemoryDirectory>,
    Arc<MemoryNotifier>,
) {
    let store = Arc::new(MemoryStore::default());
    let directory = Arc::new(MemoryDirectory::default());
    let notifier = Arc::new(MemoryNotifier::default());
    directory.seed_demande(demande("dem-1", "plomberie"));
    directory.seed_commission("plomberie", plomberie_config());
    let service = MissionService::new(
        store.clone(),
        directory.clone(),
        notifier.clone(),
        EngineSettings::default(),
    );
    (service, store, directory, notifier)
}
