#![cfg(feature = "optimization")]

mod common;

use std::time::Duration;

use community_solar::domain::{AllocationDomain, Community, PeakGridLimit, PolicyVariant};
use community_solar::optimizer::{
    AllocationModel, GoodLpSolver, ResultExtractor, SolveStatus, SolverAdapter,
};
use community_solar::scenario::{ScenarioRunner, SensitivitySweep, SweepParameter};
use community_solar::AllocationError;
use rstest::rstest;

use common::{assert_physical_invariants, scarce, scenario_a, scenario_b, TOLERANCE};

fn runner(community: Community) -> ScenarioRunner<GoodLpSolver> {
    ScenarioRunner::new(community, GoodLpSolver::new())
}

#[test]
fn test_scenario_a_serves_all_demand_and_banks_surplus() {
    let outcome = runner(scenario_a()).run(PolicyVariant::CreditBanked).unwrap();
    let matrices = &outcome.matrices;

    for i in 0..2 {
        for t in 0..3 {
            assert!((matrices.allocation[[i, t]] - 4.0).abs() < TOLERANCE);
            assert!(matrices.grid_draw[[i, t]].abs() < TOLERANCE);
            assert!(matrices.credit_used[[i, t]].abs() < TOLERANCE);
        }
    }
    for t in 0..3 {
        let banked = matrices.credit_generated.column(t).sum();
        assert!((banked - 2.0).abs() < TOLERANCE, "period {} banked {}", t, banked);
        // equal split
        let split = matrices.credit_generated[[0, t]] - matrices.credit_generated[[1, t]];
        assert!(split.abs() < TOLERANCE);
    }
    assert!((outcome.summary.leftover_credits - 6.0).abs() < TOLERANCE);
    assert!((outcome.summary.self_sufficiency_pct - 100.0).abs() < 1e-4);
}

#[rstest]
#[case(PolicyVariant::CreditBanked)]
#[case(PolicyVariant::EquityConstrained)]
fn test_scenario_b_is_infeasible(#[case] variant: PolicyVariant) {
    let err = runner(scenario_b()).run(variant).unwrap_err();
    assert!(matches!(err, AllocationError::InfeasibleModel(_)), "got {:?}", err);
}

#[test]
fn test_scenario_b_reports_failure_without_partial_output() {
    let reports = runner(scenario_b())
        .run_all(&[PolicyVariant::CreditBanked, PolicyVariant::Proportional])
        .unwrap();
    assert!(reports[0].outcome.is_none());
    assert_eq!(reports[0].error.as_ref().unwrap().kind, "InfeasibleModelError");
    assert!(reports[1].is_success());
}

#[test]
fn test_scenario_c_savings_non_decreasing_in_tariff() {
    let runner = runner(scenario_a());
    let sweep = SensitivitySweep {
        variant: PolicyVariant::CreditBanked,
        parameter: SweepParameter::TariffRate,
        candidates: vec![0.80, 0.85, 0.90],
    };
    let points = sweep.run(&runner).unwrap();
    let savings = SensitivitySweep::series(&points, |s| s.economic_saving);

    assert_eq!(savings.len(), 3);
    for pair in savings.windows(2) {
        assert!(pair[1].1 + TOLERANCE >= pair[0].1, "{:?}", savings);
    }
    assert!((savings[0].1 - 0.80 * 24.0).abs() < 1e-4);
}

#[rstest]
#[case(PolicyVariant::CreditBanked)]
#[case(PolicyVariant::EquityConstrained)]
fn test_solver_variants_respect_invariants(#[case] variant: PolicyVariant) {
    let community = scarce();
    let outcome = runner(community.clone()).run(variant).unwrap();
    assert_physical_invariants(&community, &outcome.matrices);
}

#[test]
fn test_equity_bounds_hold_in_solution() {
    let community = scarce();
    let built = AllocationModel::build(&community, PolicyVariant::EquityConstrained);
    let budget = Duration::from_secs(60);
    let outcome = GoodLpSolver::new().solve(&built.model, budget).unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    let (values, _) = outcome.into_solution(built.model.name(), budget).unwrap();
    let flat: Vec<f64> = values.iter().map(|v| v.unwrap_or(0.0)).collect();
    assert!(built.model.max_violation(&flat) < TOLERANCE);

    let matrices = ResultExtractor::extract(&community, &built, &values).unwrap();
    let totals = matrices.unit_allocation_totals();
    let mean = totals.mean().unwrap();
    let deviation = built.vars.deviation.as_ref().unwrap();
    for (i, total) in totals.iter().enumerate() {
        let v = flat[deviation[i].index()];
        assert!((total - mean).abs() <= v + TOLERANCE);
        assert!(v + TOLERANCE >= community.epsilon() * mean);
    }
}

#[test]
fn test_repeated_solves_are_deterministic() {
    let runner = runner(scarce());
    let first = runner.run(PolicyVariant::CreditBanked).unwrap();
    let second = runner.run(PolicyVariant::CreditBanked).unwrap();

    let a = first.summary.objective_value.unwrap();
    let b = second.summary.objective_value.unwrap();
    assert!((a - b).abs() < 1e-9);
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn test_binary_domain_serves_units_whole() {
    let community = Community::builder()
        .demand(vec![vec![4.0, 4.0], vec![6.0, 6.0]])
        .generation(vec![5.0, 5.0])
        .priority_weight(vec![5.0, 1.0])
        .allocation_domain(AllocationDomain::Binary)
        .build()
        .unwrap();
    let outcome = runner(community.clone()).run(PolicyVariant::CreditBanked).unwrap();

    for ((i, t), allocated) in outcome.matrices.allocation.indexed_iter() {
        let demand = community.demand_at(i, t);
        assert!(
            allocated.abs() < TOLERANCE || (allocated - demand).abs() < TOLERANCE,
            "unit {} period {} got {}",
            i,
            t,
            allocated
        );
    }
    assert_physical_invariants(&community, &outcome.matrices);
}

#[test]
fn test_zero_generation_period_is_satisfiable() {
    let community = Community::builder()
        .demand(vec![vec![1.0, 1.0], vec![1.0, 1.0]])
        .generation(vec![0.0, 4.0])
        .build()
        .unwrap();
    let outcome = runner(community).run(PolicyVariant::CreditBanked).unwrap();
    assert!(outcome.matrices.allocation.column(0).sum().abs() < TOLERANCE);
    assert!((outcome.matrices.grid_draw.column(0).sum() - 2.0).abs() < TOLERANCE);
}

#[test]
fn test_flow_peak_and_minimum_service_rows_bind_in_solution() {
    let community = Community::builder()
        .demand(vec![vec![2.0, 2.0, 2.0], vec![2.0, 2.0, 2.0]])
        .generation(vec![10.0, 0.0, 0.0])
        .priority_weight(vec![1.0, 5.0])
        .minimum_service(vec![1.5, 0.0])
        .flow_limit(vec![3.0, 3.0, 3.0])
        .peak_grid_limit(PeakGridLimit {
            periods: vec![2],
            max_fraction: 0.5,
        })
        .build()
        .unwrap();
    let outcome = runner(community.clone()).run(PolicyVariant::CreditBanked).unwrap();
    let matrices = &outcome.matrices;

    let direct_in_first = matrices.allocation.column(0).sum();
    assert!(direct_in_first <= 3.0 + TOLERANCE, "flow limit exceeded: {}", direct_in_first);

    // unit 1 has the higher priority, unit 0 still gets its minimum
    let totals = matrices.unit_allocation_totals();
    assert!(totals[0] + TOLERANCE >= 1.5, "unit 0 allocated {}", totals[0]);

    let peak_grid = matrices.grid_draw.column(2).sum();
    assert!(peak_grid <= 2.0 + TOLERANCE, "peak grid draw {}", peak_grid);
    assert_physical_invariants(&community, matrices);
}
