#![allow(dead_code)]

use community_solar::domain::Community;
use community_solar::optimizer::AllocationMatrices;

pub const TOLERANCE: f64 = 1e-6;

/// Two units, three periods, generation 10 each period, both demanding 4.
pub fn scenario_a() -> Community {
    Community::builder()
        .demand(vec![vec![4.0, 4.0, 4.0], vec![4.0, 4.0, 4.0]])
        .generation(vec![10.0, 10.0, 10.0])
        .build()
        .expect("scenario A community")
}

/// No generation at all and a minimum service requirement on unit 0.
pub fn scenario_b() -> Community {
    Community::builder()
        .demand(vec![vec![4.0, 4.0, 4.0], vec![4.0, 4.0, 4.0]])
        .generation(vec![0.0, 0.0, 0.0])
        .priority_weight(vec![5.0, 1.0])
        .minimum_service(vec![1.0, 0.0])
        .build()
        .expect("scenario B community")
}

/// Scarce generation, uneven demand and priorities.
pub fn scarce() -> Community {
    Community::builder()
        .demand(vec![
            vec![4.0, 1.0, 3.0, 2.0],
            vec![2.0, 2.0, 2.0, 2.0],
            vec![6.0, 0.0, 1.0, 5.0],
        ])
        .generation(vec![6.0, 8.0, 0.0, 4.0])
        .efficiency(vec![0.95, 0.95, 0.9, 0.9])
        .priority_weight(vec![5.0, 1.0, 5.0])
        .injection_limit(vec![2.0, 2.0, 2.0, 2.0])
        .build()
        .expect("scarce community")
}

/// Asserts capacity, injection and ledger sign invariants on extracted matrices.
pub fn assert_physical_invariants(community: &Community, matrices: &AllocationMatrices) {
    for (t, period) in community.periods().iter().enumerate() {
        let used: f64 = matrices.allocation.column(t).sum()
            + matrices.credit_generated.column(t).sum();
        assert!(
            used <= period.effective_generation + TOLERANCE,
            "capacity exceeded in period {}: {} > {}",
            t,
            used,
            period.effective_generation
        );
        let banked = matrices.credit_generated.column(t).sum();
        assert!(
            banked <= period.injection_limit + TOLERANCE,
            "injection exceeded in period {}",
            t
        );
    }
    for ((i, k), stock) in matrices.credit_stock.indexed_iter() {
        assert!(*stock >= -TOLERANCE, "negative stock at unit {} index {}", i, k);
    }
    for ((i, t), used) in matrices.credit_used.indexed_iter() {
        assert!(
            *used <= matrices.credit_stock[[i, t]] + TOLERANCE,
            "unit {} overdrew credit in period {}",
            i,
            t
        );
    }
}
