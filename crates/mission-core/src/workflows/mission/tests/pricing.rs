use chrono::{Datelike, Duration};

use super::common::{plomberie_config, t0};
use crate::workflows::mission::commission::{self, CommissionConfig, RiskRule};
use crate::workflows::mission::installment::{self, InstallmentPlanKind, InstallmentTerms};
use crate::workflows::mission::lifecycle::ValidationError;

fn terms() -> InstallmentTerms {
    InstallmentTerms {
        threshold: 100_000,
        annual_rate_pct: 12.0,
    }
}

#[test]
fn commission_breakdown_with_flat_risk() {
    let breakdown =
        commission::compute(100_000, 18, &plomberie_config()).expect("marge within bounds");
    assert_eq!(breakdown.commission_hybride, 18_000);
    assert_eq!(breakdown.commission_risk, 2_000);
    assert_eq!(breakdown.commission_totale, 20_000);
    assert_eq!(breakdown.prix_client, 120_000);
}

#[test]
fn commission_breakdown_with_percent_risk() {
    let config = CommissionConfig {
        marge_min_pct: 10,
        marge_max_pct: 25,
        risk: RiskRule::PercentOfPrice(3),
    };
    let breakdown = commission::compute(100_000, 20, &config).expect("marge within bounds");
    assert_eq!(breakdown.commission_hybride, 20_000);
    assert_eq!(breakdown.commission_risk, 3_000);
    assert_eq!(breakdown.prix_client, 123_000);
}

#[test]
fn marge_bounds_are_inclusive() {
    let config = plomberie_config();
    assert!(commission::compute(50_000, 15, &config).is_ok());
    assert!(commission::compute(50_000, 20, &config).is_ok());

    for out_of_range in [14, 21] {
        match commission::compute(50_000, out_of_range, &config) {
            Err(ValidationError::MargeOutOfRange { found, min, max }) => {
                assert_eq!((found, min, max), (out_of_range, 15, 20));
            }
            other => panic!("expected marge rejection, got {other:?}"),
        }
    }
}

#[test]
fn commission_is_deterministic_integer_math() {
    let config = plomberie_config();
    let first = commission::compute(99_999, 17, &config).expect("compute");
    let second = commission::compute(99_999, 17, &config).expect("compute");
    assert_eq!(first, second);
    // Integer division truncates the hybrid part, never rounds up.
    assert_eq!(first.commission_hybride, 16_999);
}

#[test]
fn three_tranche_plan_splits_interest_proportionally() {
    let plan = installment::plan(125_000, InstallmentPlanKind::TroisTranches, &terms(), t0())
        .expect("above threshold");

    // 12% annual over three months on 125 000 adds 3 750 of interest.
    let amounts: Vec<u64> = plan.tranches.iter().map(|tranche| tranche.amount).collect();
    assert_eq!(amounts, vec![38_625, 38_625, 51_500]);
    assert_eq!(plan.total_avec_interets, 128_750);
    assert_eq!(
        plan.tranches.iter().map(|t| t.percentage).collect::<Vec<_>>(),
        vec![30, 30, 40]
    );
}

#[test]
fn tranche_rounding_never_under_collects() {
    let plan = installment::plan(100_001, InstallmentPlanKind::DeuxTranches, &terms(), t0())
        .expect("above threshold");
    // 12% annual over two months adds 2 000.02 of interest, so each 50%
    // tranche is ceil(51 000.51).
    assert_eq!(plan.tranches.len(), 2);
    assert_eq!(plan.tranches[0].amount, 51_001);
    assert_eq!(plan.tranches[1].amount, 51_001);
    assert_eq!(plan.total_avec_interets, 102_002);
    assert!(plan.total_avec_interets >= 100_001);
}

#[test]
fn plan_requires_total_strictly_above_threshold() {
    match installment::plan(100_000, InstallmentPlanKind::DeuxTranches, &terms(), t0()) {
        Err(ValidationError::BelowInstallmentThreshold { total, threshold }) => {
            assert_eq!((total, threshold), (100_000, 100_000));
        }
        other => panic!("expected threshold rejection, got {other:?}"),
    }
}

#[test]
fn tranches_fall_due_one_calendar_month_apart() {
    let now = t0();
    let plan = installment::plan(150_000, InstallmentPlanKind::TroisTranches, &terms(), now)
        .expect("above threshold");

    let months: Vec<u32> = plan.tranches.iter().map(|t| t.due_date.month()).collect();
    assert_eq!(months, vec![7, 8, 9]);
    assert!(plan
        .tranches
        .iter()
        .all(|tranche| tranche.due_date > now + Duration::days(27)));
}
