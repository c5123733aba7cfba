use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::domain::{Proposition, PropositionId, ProviderId, ProviderReputation};

const SCALE: f64 = 10.0;
const NEUTRAL_REPUTATION: f64 = 5.0;

/// Weights of the composite ranking score. Injected policy, not scorer
/// internals; they should sum to 1 so composites stay on the 0–10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub prix: f64,
    pub reputation: f64,
    pub delai: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            prix: 0.4,
            reputation: 0.3,
            delai: 0.3,
        }
    }
}

/// Normalized sub-scores and the composite for one pending bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropositionScore {
    pub proposition_id: PropositionId,
    pub prestataire_id: ProviderId,
    pub prix_prestataire: u64,
    pub delai_estime_jours: u32,
    pub score_prix: f64,
    pub score_reputation: f64,
    pub score_delai: f64,
    pub score_composite: f64,
}

/// Score and rank competing bids, best candidate first.
///
/// Price and delay are normalized against the set's min/max (cheapest and
/// fastest earn the full scale). Ties on the composite break on lower price,
/// then higher reputation. The result is a recommendation: committing a
/// winner always requires the explicit admin selection.
pub fn rank(
    candidates: &[(Proposition, ProviderReputation)],
    weights: &ScoringWeights,
) -> Vec<PropositionScore> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let min_prix = candidates
        .iter()
        .map(|(p, _)| p.prix_prestataire)
        .min()
        .unwrap_or(0);
    let max_prix = candidates
        .iter()
        .map(|(p, _)| p.prix_prestataire)
        .max()
        .unwrap_or(0);
    let min_delai = candidates
        .iter()
        .map(|(p, _)| p.delai_estime_jours)
        .min()
        .unwrap_or(0);
    let max_delai = candidates
        .iter()
        .map(|(p, _)| p.delai_estime_jours)
        .max()
        .unwrap_or(0);

    let mut scores: Vec<PropositionScore> = candidates
        .iter()
        .map(|(proposition, reputation)| {
            let score_prix = inverse_normalized(
                proposition.prix_prestataire as f64,
                min_prix as f64,
                max_prix as f64,
            );
            let score_delai = inverse_normalized(
                proposition.delai_estime_jours as f64,
                min_delai as f64,
                max_delai as f64,
            );
            let score_reputation = reputation_score(reputation);
            let score_composite = weights.prix * score_prix
                + weights.reputation * score_reputation
                + weights.delai * score_delai;

            PropositionScore {
                proposition_id: proposition.id.clone(),
                prestataire_id: proposition.prestataire_id.clone(),
                prix_prestataire: proposition.prix_prestataire,
                delai_estime_jours: proposition.delai_estime_jours,
                score_prix,
                score_reputation,
                score_delai,
                score_composite,
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.score_composite
            .partial_cmp(&a.score_composite)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.prix_prestataire.cmp(&b.prix_prestataire))
            .then_with(|| {
                b.score_reputation
                    .partial_cmp(&a.score_reputation)
                    .unwrap_or(Ordering::Equal)
            })
    });

    scores
}

/// Lower raw value, higher score. A degenerate set (all values equal) earns
/// the full scale for everyone rather than penalizing the lone candidate.
fn inverse_normalized(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span <= f64::EPSILON {
        return SCALE;
    }
    SCALE * (max - value) / span
}

/// Blend the 0–5 average rating with the 0–100 success rate. Providers with
/// no history sit at the neutral midpoint instead of zero so new entrants are
/// not unfairly buried.
fn reputation_score(reputation: &ProviderReputation) -> f64 {
    match (reputation.note_moyenne, reputation.taux_reussite) {
        (None, None) => NEUTRAL_REPUTATION,
        (note, taux) => {
            let note_part = note.map(|n| (n * 2.0).clamp(0.0, SCALE));
            let taux_part = taux.map(|t| (t / 10.0).clamp(0.0, SCALE));
            match (note_part, taux_part) {
                (Some(n), Some(t)) => 0.6 * n + 0.4 * t,
                (Some(n), None) => n,
                (None, Some(t)) => t,
                (None, None) => NEUTRAL_REPUTATION,
            }
        }
    }
}
