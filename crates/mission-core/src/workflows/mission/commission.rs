use serde::{Deserialize, Serialize};

use super::lifecycle::ValidationError;

/// Commission configuration for one service category.
///
/// The margin bounds and the risk rule are configuration data, selected per
/// category by the directory collaborator; the calculator never hardcodes a
/// business formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub marge_min_pct: u8,
    pub marge_max_pct: u8,
    pub risk: RiskRule,
}

/// Category risk premium. Both forms are non-negative and monotonic in the
/// provider price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRule {
    Flat(u64),
    PercentOfPrice(u8),
}

impl RiskRule {
    fn premium(self, prix_fournisseur: u64) -> u64 {
        match self {
            RiskRule::Flat(montant) => montant,
            RiskRule::PercentOfPrice(pct) => prix_fournisseur.saturating_mul(pct as u64) / 100,
        }
    }
}

/// Priced quote components derived from a provider price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub commission_hybride: u64,
    pub commission_risk: u64,
    pub commission_totale: u64,
    pub prix_client: u64,
}

/// Compute the hybrid commission, the risk premium, and the client price.
///
/// Deterministic integer arithmetic: same inputs, same quote.
pub fn compute(
    prix_fournisseur: u64,
    marge_pct: u8,
    config: &CommissionConfig,
) -> Result<CommissionBreakdown, ValidationError> {
    if marge_pct < config.marge_min_pct || marge_pct > config.marge_max_pct {
        return Err(ValidationError::MargeOutOfRange {
            found: marge_pct,
            min: config.marge_min_pct,
            max: config.marge_max_pct,
        });
    }

    let commission_hybride = prix_fournisseur.saturating_mul(marge_pct as u64) / 100;
    let commission_risk = config.risk.premium(prix_fournisseur);
    let commission_totale = commission_hybride + commission_risk;

    Ok(CommissionBreakdown {
        commission_hybride,
        commission_risk,
        commission_totale,
        prix_client: prix_fournisseur + commission_totale,
    })
}
