mod common;

use community_solar::domain::{Community, CreditSplit, PolicyVariant};
use community_solar::optimizer::{GoodLpSolver, HeuristicAllocator, ResultExtractor};
use community_solar::scenario::ScenarioRunner;
use proptest::prelude::*;

use common::assert_physical_invariants;

prop_compose! {
    fn arb_community()(units in 1usize..4, periods in 1usize..6)(
        demand in prop::collection::vec(prop::collection::vec(0.0f64..10.0, periods), units),
        generation in prop::collection::vec(prop::option::weighted(0.8, 0.0f64..20.0), periods),
        efficiency in prop::collection::vec(0.8f64..=1.0, periods),
        injection in prop::collection::vec(0.0f64..10.0, periods),
        priority in prop::collection::vec(1.0f64..5.0, units),
        proportional_split in any::<bool>(),
    ) -> Community {
        Community::builder()
            .demand(demand)
            .generation(generation.into_iter().map(|g| g.unwrap_or(0.0)).collect())
            .efficiency(efficiency)
            .injection_limit(injection)
            .priority_weight(priority)
            .credit_split(if proportional_split {
                CreditSplit::Proportional
            } else {
                CreditSplit::Equal
            })
            .build()
            .unwrap()
    }
}

fn heuristic_variant() -> impl Strategy<Value = PolicyVariant> {
    prop_oneof![
        Just(PolicyVariant::Proportional),
        Just(PolicyVariant::PriorityWeighted),
        Just(PolicyVariant::Sequential),
    ]
}

proptest! {
    #[test]
    fn heuristic_allocations_reconcile(
        community in arb_community(),
        variant in heuristic_variant()
    ) {
        let matrices = HeuristicAllocator::new(variant).unwrap().allocate(&community);
        prop_assert!(ResultExtractor::reconcile(&community, &matrices).is_ok());
        assert_physical_invariants(&community, &matrices);
        for ((i, t), direct) in matrices.allocation.indexed_iter() {
            prop_assert!(*direct >= 0.0);
            prop_assert!(*direct <= community.demand_at(i, t) + 1e-9);
        }
    }

    #[test]
    fn heuristic_allocations_are_deterministic(
        community in arb_community(),
        variant in heuristic_variant()
    ) {
        let allocator = HeuristicAllocator::new(variant).unwrap();
        prop_assert_eq!(allocator.allocate(&community), allocator.allocate(&community));
    }
}

#[cfg(feature = "optimization")]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn solved_allocations_hold_invariants(community in arb_community()) {
        let runner = ScenarioRunner::new(community.clone(), GoodLpSolver::new());
        for variant in [PolicyVariant::CreditBanked, PolicyVariant::EquityConstrained] {
            let outcome = runner.run(variant);
            prop_assert!(outcome.is_ok(), "{} failed: {:?}", variant, outcome.err());
            let outcome = outcome.unwrap();
            assert_physical_invariants(&community, &outcome.matrices);
        }
    }
}
