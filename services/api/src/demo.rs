use crate::infra::{
    engine_settings, seed_directory, InMemoryDirectory, InMemoryMarketplaceStore, LoggingNotifier,
};
use chrono::Utc;
use clap::Args;
use mission_core::error::AppError;
use mission_core::workflows::mission::{
    ClosedBy, DemandeId, InstallmentPlanKind, MissionService, MissionStore, PhaseInput,
    ProofDocument, Proposition, PropositionId, PropositionStatut, ProviderId,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Advance share released to the provider after payment (25, 50 or 100)
    #[arg(long, default_value_t = 50)]
    pub(crate) advance: u8,
    /// Margin percentage applied when generating the devis
    #[arg(long, default_value_t = 18)]
    pub(crate) marge: u8,
    /// Freeze a three-tranche installment plan on the devis
    #[arg(long)]
    pub(crate) echelonnement: bool,
    /// Skip the execution phase planning portion of the demo
    #[arg(long)]
    pub(crate) skip_phases: bool,
}

/// Walk one demande from competing bids to a completed mission, printing each
/// step the way an admin would see it.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryMarketplaceStore::default());
    let directory = Arc::new(InMemoryDirectory::default());
    seed_directory(&directory);
    let notifier = Arc::new(LoggingNotifier::default());
    let service = MissionService::new(
        store.clone(),
        directory,
        notifier.clone(),
        engine_settings(24),
    );

    let demande_id = DemandeId("dem-0001".to_string());
    println!("Mission lifecycle demo, demande {}", demande_id);

    let bids = [
        ("prest-alpha", 80_000u64, 5u32),
        ("prest-bravo", 100_000, 3),
        ("prest-nova", 90_000, 4),
    ];
    for (index, (provider, prix, delai)) in bids.iter().enumerate() {
        let mission = service.create_mission(
            demande_id.clone(),
            Some(ProviderId(provider.to_string())),
        )?;
        store
            .insert_proposition(Proposition {
                id: PropositionId(format!("prop-{}", index + 1)),
                demande_id: demande_id.clone(),
                prestataire_id: ProviderId(provider.to_string()),
                prix_prestataire: *prix,
                delai_estime_jours: *delai,
                difficulte_estimee: 3,
                commentaire: None,
                statut: PropositionStatut::EnAttente,
                submitted_at: Utc::now(),
            })
            .map_err(mission_core::workflows::mission::MissionServiceError::from)?;
        println!(
            "- {} bids {} over {} days (mission {})",
            provider, prix, delai, mission.reference
        );
    }

    let ranking = service.score_and_rank_propositions(&demande_id)?;
    println!("\nScored ranking (best first)");
    for score in &ranking {
        println!(
            "- {}: prix {:.2} | reputation {:.2} | delai {:.2} -> composite {:.2}",
            score.prestataire_id,
            score.score_prix,
            score.score_reputation,
            score.score_delai,
            score.score_composite
        );
    }
    let Some(recommended) = ranking.first() else {
        println!("No pending propositions to rank");
        return Ok(());
    };

    let outcome = service.select_winner(&demande_id, &recommended.proposition_id)?;
    println!(
        "\nWinner {} selected; {} sibling bid(s) refused, {} mission(s) archived",
        recommended.prestataire_id,
        outcome.refused.len(),
        outcome.archived_mission_ids.len()
    );
    let mission_id = outcome.winning_mission_id.clone();

    let echelonnement = args
        .echelonnement
        .then_some(InstallmentPlanKind::TroisTranches);
    let mission = service.generate_devis(&mission_id, args.marge, 5_000, echelonnement)?;
    println!("\nDevis for mission {}", mission.reference);
    println!(
        "- provider price {} | commission {} (hybride {} + risk {})",
        mission.tarif_prestataire.unwrap_or_default(),
        mission.commission_totale.unwrap_or_default(),
        mission.commission_hybride.unwrap_or_default(),
        mission.commission_risk.unwrap_or_default()
    );
    println!(
        "- client total {} (frais supplementaires {})",
        mission.tarif_total.unwrap_or_default(),
        mission.frais_supplementaires
    );
    if let Some(plan) = &mission.paiement_echelonne {
        println!(
            "- installment plan: {} tranches, {} with interest",
            plan.tranches.len(),
            plan.total_avec_interets
        );
        for tranche in &plan.tranches {
            println!(
                "  - {}% -> {} due {}",
                tranche.percentage,
                tranche.amount,
                tranche.due_date.date_naive()
            );
        }
    }

    service.record_client_payment(&mission_id)?;
    service.send_advance(&mission_id, args.advance)?;
    service.provider_takeover(&mission_id)?;
    println!("\nClient paid, {}% advance released, provider took over", args.advance);

    if !args.skip_phases {
        service.plan_phases(
            &mission_id,
            vec![
                PhaseInput {
                    label: "diagnostic".to_string(),
                    date_limite: None,
                },
                PhaseInput {
                    label: "intervention".to_string(),
                    date_limite: None,
                },
            ],
        )?;
        service.complete_phase(&mission_id, "phase-1")?;
        service.complete_phase(&mission_id, "phase-2")?;
        println!("Execution phases planned and completed");
    }

    let mission = service.submit_proofs(
        &mission_id,
        vec![ProofDocument {
            label: "rapport d'intervention".to_string(),
            storage_key: "proofs/demo/rapport.pdf".to_string(),
        }],
        Some("travaux termines".to_string()),
    )?;
    if mission.proof_validated_by_admin {
        println!("Proofs auto-validated (full advance)");
    } else {
        service.validate_proofs(&mission_id, true, true)?;
        println!("Proofs submitted and validated by the admin");
    }

    if args.advance != 100 {
        let mission = service.pay_balance(&mission_id)?;
        println!(
            "Balance of {} released to the provider",
            mission.solde_montant.unwrap_or_default()
        );
    }

    let mission = service.close_mission(&mission_id, ClosedBy::Admin)?;
    println!(
        "\nMission {} closed: state {}, progress {}%",
        mission.reference, mission.internal_state, mission.current_progress
    );

    println!("\nNotifications dispatched");
    for event in notifier.events() {
        println!("- template={} -> {}", event.template, event.mission_id);
    }

    Ok(())
}
