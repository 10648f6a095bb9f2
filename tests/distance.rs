use votelab::{
    distance, distance_with_solver, BallotProfile, ExactSolver, KendallTau,
    PositionalDisplacement, ProfileBuilder, VotingError,
};

fn profile(candidates: &[&str], ballots: &[(&[&str], f64)]) -> BallotProfile {
    let mut b = ProfileBuilder::new(candidates).unwrap();
    for (ranking, weight) in ballots {
        b.add_simple(ranking, *weight).unwrap();
    }
    b.build()
}

// Profile A = {[X, Y]: 1}, profile B = {[Y, X]: 1}: the single comparable
// pair disagrees, so the Kendall cost is maximal and the plan moves all
// mass from A's one ballot to B's.
#[test]
fn single_swap_profiles_are_at_distance_one() {
    let a = profile(&["X", "Y"], &[(&["X", "Y"], 1.0)]);
    let b = profile(&["X", "Y"], &[(&["Y", "X"], 1.0)]);
    let (d, plan) = distance(&a, &b, &KendallTau).unwrap();
    assert!((d - 1.0).abs() < 1e-9);
    let entries: Vec<_> = plan.entries().collect();
    assert_eq!(entries, vec![(0, 0, 1.0)]);
}

#[test]
fn distance_to_self_is_zero() {
    let a = profile(
        &["V", "W", "X", "Y", "Z"],
        &[
            (&["V", "W", "X"], 4.0),
            (&["Z", "Y"], 2.5),
            (&["X"], 1.0),
            (&["Y", "X", "W", "V"], 0.5),
        ],
    );
    let (d, _) = distance(&a, &a, &KendallTau).unwrap();
    assert!(d.abs() < 1e-9);
    let (d, _) = distance(&a, &a, &PositionalDisplacement::fixed(5)).unwrap();
    assert!(d.abs() < 1e-9);
}

#[test]
fn distance_is_symmetric_for_symmetric_costs() {
    let a = profile(
        &["X", "Y", "Z"],
        &[(&["X", "Y", "Z"], 3.0), (&["Y", "Z"], 2.0)],
    );
    let b = profile(
        &["X", "Y", "Z"],
        &[(&["Z", "Y", "X"], 1.0), (&["X", "Z"], 4.0)],
    );
    for model in [
        Box::new(KendallTau) as Box<dyn votelab::RankingCost>,
        Box::new(PositionalDisplacement::fixed(3)),
    ] {
        let (d_ab, _) = distance(&a, &b, model.as_ref()).unwrap();
        let (d_ba, _) = distance(&b, &a, model.as_ref()).unwrap();
        assert!((d_ab - d_ba).abs() < 1e-9);
    }
}

// The past-the-end penalty measures displacement in the source ballot's
// frame, so the distance is direction-dependent; this is the documented
// asymmetric variant.
#[test]
fn past_end_penalty_is_direction_dependent() {
    let a = profile(&["X", "Y", "Z"], &[(&["X", "Y", "Z"], 1.0)]);
    let b = profile(&["X", "Y", "Z"], &[(&["Z"], 1.0)]);
    let model = PositionalDisplacement::past_end();
    let (d_ab, _) = distance(&a, &b, &model).unwrap();
    let (d_ba, _) = distance(&b, &a, &model).unwrap();
    assert_eq!(d_ab, 7.0);
    assert_eq!(d_ba, 3.0);
}

#[test]
fn mismatched_universes_are_rejected() {
    let a = profile(&["X", "Y"], &[(&["X"], 1.0)]);
    let b = profile(&["X", "Y", "Z"], &[(&["X"], 1.0)]);
    assert_eq!(
        distance(&a, &b, &KendallTau).unwrap_err(),
        VotingError::IncompatibleCandidateSet
    );
}

#[test]
fn plan_splits_mass_between_targets() {
    // One source ballot must split 50/50 between two equally weighted
    // targets regardless of cost.
    let a = profile(&["X", "Y"], &[(&["X", "Y"], 2.0)]);
    let b = profile(&["X", "Y"], &[(&["X", "Y"], 1.0), (&["Y", "X"], 1.0)]);
    let (d, plan) = distance_with_solver(&a, &b, &KendallTau, &ExactSolver).unwrap();
    assert!((plan.source_marginal(0) - 1.0).abs() < 1e-9);
    assert!((plan.target_marginal(0) - 0.5).abs() < 1e-9);
    assert!((plan.target_marginal(1) - 0.5).abs() < 1e-9);
    // Half the mass crosses the single disagreeing pair.
    assert!((d - 0.5).abs() < 1e-9);
}
