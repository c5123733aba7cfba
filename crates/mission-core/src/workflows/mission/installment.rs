use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::ValidationError;

/// Fixed tranche splits offered to clients above the opt-in threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentPlanKind {
    DeuxTranches,
    TroisTranches,
}

impl InstallmentPlanKind {
    pub const fn shares(self) -> &'static [u8] {
        match self {
            InstallmentPlanKind::DeuxTranches => &[50, 50],
            InstallmentPlanKind::TroisTranches => &[30, 30, 40],
        }
    }
}

/// Planner policy: activation threshold and the annual simple-interest rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstallmentTerms {
    pub threshold: u64,
    pub annual_rate_pct: f64,
}

/// One scheduled payment of a frozen installment contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tranche {
    pub percentage: u8,
    pub amount: u64,
    pub due_date: DateTime<Utc>,
}

/// The generated plan, stored verbatim on the mission and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub tranches: Vec<Tranche>,
    pub total_avec_interets: u64,
    pub annual_rate_pct: f64,
    pub generated_at: DateTime<Utc>,
}

/// Split a client total into tranches, one calendar month apart.
///
/// Simple interest over the plan duration is distributed proportionally to
/// each tranche's share, and every tranche amount is rounded up so the plan
/// never collects less than the original total.
pub fn plan(
    prix_total_client: u64,
    kind: InstallmentPlanKind,
    terms: &InstallmentTerms,
    now: DateTime<Utc>,
) -> Result<InstallmentPlan, ValidationError> {
    if prix_total_client <= terms.threshold {
        return Err(ValidationError::BelowInstallmentThreshold {
            total: prix_total_client,
            threshold: terms.threshold,
        });
    }

    let shares = kind.shares();
    let nb_tranches = shares.len() as u32;
    let interest =
        prix_total_client as f64 * terms.annual_rate_pct * nb_tranches as f64 / (100.0 * 12.0);
    let total_with_interest = prix_total_client as f64 + interest;

    let mut tranches = Vec::with_capacity(shares.len());
    let mut collected: u64 = 0;
    for (index, share) in shares.iter().enumerate() {
        let amount = (total_with_interest * (*share as f64) / 100.0).ceil() as u64;
        collected += amount;
        let due_date = now
            .checked_add_months(Months::new(index as u32 + 1))
            .unwrap_or(now);
        tranches.push(Tranche {
            percentage: *share,
            amount,
            due_date,
        });
    }

    Ok(InstallmentPlan {
        tranches,
        total_avec_interets: collected,
        annual_rate_pct: terms.annual_rate_pct,
        generated_at: now,
    })
}
