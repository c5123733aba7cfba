use chrono::{DateTime, Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use mission_core::workflows::mission::{
    CommissionConfig, DemandeId, DemandeSnapshot, DirectoryError, EngineSettings,
    MarketplaceDirectory, Mission, MissionEvent, MissionId, MissionNotifier, MissionStore,
    NotifyError, Proposition, PropositionId, ProviderId, ProviderReputation, RepositoryError,
    RiskRule, SelectionOutcome, Urgence,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct MarketplaceRecords {
    missions: HashMap<MissionId, Mission>,
    propositions: HashMap<PropositionId, Proposition>,
}

/// In-memory mission store. Missions and propositions live behind one mutex
/// so the selection outcome commits as a single unit, and `update` enforces
/// the optimistic version check the engine relies on.
#[derive(Default, Clone)]
pub(crate) struct InMemoryMarketplaceStore {
    records: Arc<Mutex<MarketplaceRecords>>,
}

impl MissionStore for InMemoryMarketplaceStore {
    fn insert(&self, mission: Mission) -> Result<Mission, RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.missions.contains_key(&mission.id) {
            return Err(RepositoryError::Duplicate);
        }
        guard.missions.insert(mission.id.clone(), mission.clone());
        Ok(mission)
    }

    fn update(&self, mut mission: Mission) -> Result<Mission, RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let stored = guard
            .missions
            .get(&mission.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != mission.version {
            return Err(RepositoryError::Conflict);
        }
        mission.version += 1;
        guard.missions.insert(mission.id.clone(), mission.clone());
        Ok(mission)
    }

    fn fetch(&self, id: &MissionId) -> Result<Option<Mission>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.missions.get(id).cloned())
    }

    fn for_demande(&self, demande_id: &DemandeId) -> Result<Vec<Mission>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        let mut missions: Vec<Mission> = guard
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
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.propositions.contains_key(&proposition.id) {
            return Err(RepositoryError::Duplicate);
        }
        guard
            .propositions
            .insert(proposition.id.clone(), proposition.clone());
        Ok(proposition)
    }

    fn propositions_for_demande(
        &self,
        demande_id: &DemandeId,
    ) -> Result<Vec<Proposition>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        let mut propositions: Vec<Proposition> = guard
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
        let mut guard = self.records.lock().expect("store mutex poisoned");

        // Every version is checked before the first write lands.
        let mut staged = Vec::new();
        for mission in std::iter::once(&outcome.winning_mission)
            .chain(outcome.archived_missions.iter())
        {
            let stored = guard
                .missions
                .get(&mission.id)
                .ok_or(RepositoryError::NotFound)?;
            if stored.version != mission.version {
                return Err(RepositoryError::Conflict);
            }
            let mut next = mission.clone();
            next.version += 1;
            staged.push(next);
        }
        for proposition in &outcome.updated_propositions {
            if !guard.propositions.contains_key(&proposition.id) {
                return Err(RepositoryError::NotFound);
            }
        }

        for mission in staged {
            guard.missions.insert(mission.id.clone(), mission);
        }
        for proposition in &outcome.updated_propositions {
            guard
                .propositions
                .insert(proposition.id.clone(), proposition.clone());
        }
        Ok(())
    }
}

/// Directory adapter over seed data. In the deployed platform this sits in
/// front of the intake and provider services.
#[derive(Default, Clone)]
pub(crate) struct InMemoryDirectory {
    demandes: Arc<Mutex<HashMap<DemandeId, DemandeSnapshot>>>,
    reputations: Arc<Mutex<HashMap<ProviderId, ProviderReputation>>>,
    commissions: Arc<Mutex<HashMap<String, CommissionConfig>>>,
}

impl InMemoryDirectory {
    pub(crate) fn seed_demande(&self, snapshot: DemandeSnapshot) {
        self.demandes
            .lock()
            .expect("directory mutex poisoned")
            .insert(snapshot.id.clone(), snapshot);
    }

    pub(crate) fn seed_reputation(&self, provider: ProviderId, reputation: ProviderReputation) {
        self.reputations
            .lock()
            .expect("directory mutex poisoned")
            .insert(provider, reputation);
    }

    pub(crate) fn seed_commission(&self, service_type: &str, config: CommissionConfig) {
        self.commissions
            .lock()
            .expect("directory mutex poisoned")
            .insert(service_type.to_string(), config);
    }
}

impl MarketplaceDirectory for InMemoryDirectory {
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

/// Notifier that records events and mirrors them to the log. Stands in for
/// the mail adapter of the deployed platform.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    events: Arc<Mutex<Vec<MissionEvent>>>,
}

impl LoggingNotifier {
    pub(crate) fn events(&self) -> Vec<MissionEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl MissionNotifier for LoggingNotifier {
    fn publish(&self, event: MissionEvent) -> Result<(), NotifyError> {
        info!(
            mission = %event.mission_id,
            template = %event.template,
            "mission notification"
        );
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(crate) fn engine_settings(proposition_sla_hours: i64) -> EngineSettings {
    EngineSettings {
        proposition_sla: Duration::hours(proposition_sla_hours),
        ..EngineSettings::default()
    }
}

/// Seed the demo marketplace: two open demandes and three providers with
/// distinct reputations, plus per-category commission rules.
pub(crate) fn seed_directory(directory: &InMemoryDirectory) {
    directory.seed_demande(DemandeSnapshot {
        id: DemandeId("dem-0001".to_string()),
        service_type: "plomberie".to_string(),
        lieu: "Douala".to_string(),
        urgence: Urgence::Urgente,
        client_email: "client@example.com".to_string(),
    });
    directory.seed_demande(DemandeSnapshot {
        id: DemandeId("dem-0002".to_string()),
        service_type: "electricite".to_string(),
        lieu: "Yaounde".to_string(),
        urgence: Urgence::Normale,
        client_email: "autre.client@example.com".to_string(),
    });

    directory.seed_commission(
        "plomberie",
        CommissionConfig {
            marge_min_pct: 15,
            marge_max_pct: 20,
            risk: RiskRule::Flat(2_000),
        },
    );
    directory.seed_commission(
        "electricite",
        CommissionConfig {
            marge_min_pct: 12,
            marge_max_pct: 18,
            risk: RiskRule::PercentOfPrice(3),
        },
    );

    directory.seed_reputation(
        ProviderId("prest-alpha".to_string()),
        ProviderReputation {
            note_moyenne: Some(4.8),
            taux_reussite: Some(96.0),
            nombre_missions: 41,
        },
    );
    directory.seed_reputation(
        ProviderId("prest-bravo".to_string()),
        ProviderReputation {
            note_moyenne: Some(4.0),
            taux_reussite: Some(88.0),
            nombre_missions: 17,
        },
    );
    // prest-nova carries no history on purpose: the scorer treats it neutrally.
}
