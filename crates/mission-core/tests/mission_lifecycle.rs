use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use mission_core::workflows::mission::{
    ClosedBy, CommissionConfig, DemandeId, DemandeSnapshot, DirectoryError, EngineSettings,
    EstimationInput, InstallmentPlanKind, MarketplaceDirectory, Mission, MissionEvent, MissionId,
    MissionNotifier, MissionService, MissionState, MissionStore, NotifyError, PhaseInput,
    ProofDocument, Proposition, PropositionId, PropositionStatut, ProviderId, ProviderReputation,
    RepositoryError, RiskRule, SelectionOutcome, Urgence,
};

#[derive(Default)]
struct Inner {
    missions: HashMap<MissionId, Mission>,
    propositions: HashMap<PropositionId, Proposition>,
}

#[derive(Default)]
struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl MissionStore for InMemoryStore {
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
        Ok(self
            .inner
            .lock()
            .expect("store mutex poisoned")
            .missions
            .get(id)
            .cloned())
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
        let mut staged = Vec::new();
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
            staged.push(next);
        }
        for mission in staged {
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

struct StaticDirectory;

impl MarketplaceDirectory for StaticDirectory {
    fn demande(&self, id: &DemandeId) -> Result<Option<DemandeSnapshot>, DirectoryError> {
        if id.0 != "dem-42" {
            return Ok(None);
        }
        Ok(Some(DemandeSnapshot {
            id: id.clone(),
            service_type: "electricite".to_string(),
            lieu: "Yaounde".to_string(),
            urgence: Urgence::Urgente,
            client_email: "client@example.com".to_string(),
        }))
    }

    fn reputation(&self, id: &ProviderId) -> Result<ProviderReputation, DirectoryError> {
        Ok(match id.0.as_str() {
            "prest-a" => ProviderReputation {
                note_moyenne: Some(4.8),
                taux_reussite: Some(96.0),
                nombre_missions: 40,
            },
            "prest-b" => ProviderReputation {
                note_moyenne: Some(4.0),
                taux_reussite: Some(88.0),
                nombre_missions: 15,
            },
            _ => ProviderReputation::default(),
        })
    }

    fn commission_config(
        &self,
        service_type: &str,
    ) -> Result<Option<CommissionConfig>, DirectoryError> {
        if service_type != "electricite" {
            return Ok(None);
        }
        Ok(Some(CommissionConfig {
            marge_min_pct: 15,
            marge_max_pct: 20,
            risk: RiskRule::Flat(2_000),
        }))
    }
}

#[derive(Default)]
struct CapturingNotifier {
    events: Mutex<Vec<MissionEvent>>,
}

impl MissionNotifier for CapturingNotifier {
    fn publish(&self, event: MissionEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

fn build_engine() -> (
    MissionService<InMemoryStore, StaticDirectory, CapturingNotifier>,
    Arc<InMemoryStore>,
    Arc<CapturingNotifier>,
) {
    let store = Arc::new(InMemoryStore::default());
    let notifier = Arc::new(CapturingNotifier::default());
    let service = MissionService::new(
        store.clone(),
        Arc::new(StaticDirectory),
        notifier.clone(),
        EngineSettings::default(),
    );
    (service, store, notifier)
}

fn proposition(id: &str, provider: &str, prix: u64, delai_jours: u32) -> Proposition {
    Proposition {
        id: PropositionId(id.to_string()),
        demande_id: DemandeId("dem-42".to_string()),
        prestataire_id: ProviderId(provider.to_string()),
        prix_prestataire: prix,
        delai_estime_jours: delai_jours,
        difficulte_estimee: 3,
        commentaire: None,
        statut: PropositionStatut::EnAttente,
        submitted_at: Utc
            .with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
            .single()
            .expect("valid timestamp"),
    }
}

#[test]
fn competing_bids_to_completed_engagement() {
    let (service, store, notifier) = build_engine();
    let demande_id = DemandeId("dem-42".to_string());

    // Three providers accepted the demande, each gets a mission shell.
    let mission_a = service
        .create_mission(demande_id.clone(), Some(ProviderId("prest-a".to_string())))
        .expect("mission a");
    let mission_b = service
        .create_mission(demande_id.clone(), Some(ProviderId("prest-b".to_string())))
        .expect("mission b");
    let mission_c = service
        .create_mission(demande_id.clone(), Some(ProviderId("prest-c".to_string())))
        .expect("mission c");

    store
        .insert_proposition(proposition("prop-a", "prest-a", 80_000, 5))
        .expect("bid a");
    store
        .insert_proposition(proposition("prop-b", "prest-b", 100_000, 3))
        .expect("bid b");
    store
        .insert_proposition(proposition("prop-c", "prest-c", 90_000, 4))
        .expect("bid c");

    let ranking = service
        .score_and_rank_propositions(&demande_id)
        .expect("ranking");
    assert_eq!(ranking.len(), 3);
    assert_eq!(ranking[0].proposition_id.0, "prop-a");

    // The admin follows the recommendation.
    let outcome = service
        .select_winner(&demande_id, &PropositionId("prop-a".to_string()))
        .expect("winner committed");
    assert_eq!(outcome.winning_mission_id, mission_a.id);
    assert_eq!(outcome.refused.len(), 2);

    let winner = service.mission(&mission_a.id).expect("winner");
    assert_eq!(winner.internal_state, MissionState::ProviderEstimated);
    assert_eq!(winner.estimation.as_ref().map(|e| e.prix), Some(80_000));
    for loser_id in [&mission_b.id, &mission_c.id] {
        let loser = service.mission(loser_id).expect("loser");
        assert!(loser.archived);
        assert_eq!(loser.internal_state, MissionState::AssignedToProvider);
    }

    // Pricing with an installment plan above the threshold.
    let priced = service
        .generate_devis(
            &mission_a.id,
            18,
            5_000,
            Some(InstallmentPlanKind::TroisTranches),
        )
        .expect("devis");
    assert_eq!(priced.tarif_total, Some(101_400));
    let plan = priced.paiement_echelonne.as_ref().expect("plan");
    assert_eq!(plan.tranches.len(), 3);
    assert!(plan.total_avec_interets >= 101_400);

    service.record_client_payment(&mission_a.id).expect("paid");
    service.send_advance(&mission_a.id, 50).expect("advance");
    service.provider_takeover(&mission_a.id).expect("takeover");

    service
        .plan_phases(
            &mission_a.id,
            vec![
                PhaseInput {
                    label: "diagnostic".to_string(),
                    date_limite: None,
                },
                PhaseInput {
                    label: "installation".to_string(),
                    date_limite: None,
                },
            ],
        )
        .expect("phases planned");
    service
        .complete_phase(&mission_a.id, "phase-1")
        .expect("phase 1");
    service
        .complete_phase(&mission_a.id, "phase-2")
        .expect("phase 2");

    service
        .submit_proofs(
            &mission_a.id,
            vec![ProofDocument {
                label: "certificat de conformite".to_string(),
                storage_key: "proofs/dem-42/certificat.pdf".to_string(),
            }],
            Some("travaux termines".to_string()),
        )
        .expect("proofs");
    service
        .validate_proofs(&mission_a.id, true, true)
        .expect("validated");

    let settled = service.pay_balance(&mission_a.id).expect("balance");
    assert_eq!(settled.solde_montant, Some(40_000));

    let closed = service
        .close_mission(&mission_a.id, ClosedBy::Admin)
        .expect("closed");
    assert_eq!(closed.internal_state, MissionState::Completed);
    assert_eq!(closed.current_progress, 100);

    let events = notifier.events.lock().expect("notifier mutex poisoned");
    assert!(events
        .iter()
        .any(|event| event.template == "gagnant_selectionne"));
    assert!(events
        .iter()
        .any(|event| event.template == "mission_cloturee"));
}

#[test]
fn full_advance_skips_the_admin_review() {
    let (service, _, _) = build_engine();
    let mission = service
        .create_mission(
            DemandeId("dem-42".to_string()),
            Some(ProviderId("prest-b".to_string())),
        )
        .expect("created");
    let id = mission.id.clone();

    service
        .submit_estimation(
            &id,
            EstimationInput {
                prix: 60_000,
                delai_jours: 3,
                frais_externes: 0,
                note: None,
            },
        )
        .expect("estimated");
    service.generate_devis(&id, 15, 0, None).expect("devis");
    service.record_client_payment(&id).expect("paid");
    service.send_advance(&id, 100).expect("full advance");
    service.provider_takeover(&id).expect("takeover");

    let mission = service
        .submit_proofs(
            &id,
            vec![ProofDocument {
                label: "rapport".to_string(),
                storage_key: "proofs/rapport.pdf".to_string(),
            }],
            None,
        )
        .expect("proofs auto-validated");
    assert_eq!(mission.internal_state, MissionState::AdminConfirmed);
    assert!(mission.proof_validated_by_admin);
    assert!(mission.proof_validated_for_client);

    let closed = service
        .close_mission(&id, ClosedBy::Auto)
        .expect("closed without a balance payment");
    assert_eq!(closed.internal_state, MissionState::Completed);
}
