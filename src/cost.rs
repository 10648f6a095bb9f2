use itertools::Itertools;

use crate::profile::Ballot;

/// Strategy assigning a non-negative cost to a pair of rankings over the
/// same candidate universe.
///
/// `universe` is the number of declared candidates; candidate ids index
/// `0..universe`. Every model returns 0 for two identical rankings; whether
/// a model is symmetric is documented per variant.
pub trait RankingCost {
    fn cost(&self, a: &Ballot, b: &Ballot, universe: usize) -> f64;
}

/// Rank position per candidate id; `None` for unranked candidates. A tied
/// group occupies a single position.
fn positions(ballot: &Ballot, universe: usize) -> Vec<Option<usize>> {
    let mut pos = vec![None; universe];
    for (idx, group) in ballot.ranks().iter().enumerate() {
        for cid in group {
            if cid.index() < universe {
                pos[cid.index()] = Some(idx);
            }
        }
    }
    pos
}

/// Kendall-tau style pairwise-disagreement cost.
///
/// Counts the candidate pairs ranked in strictly opposite order by the two
/// ballots, normalized by the number of pairs strictly ordered in both
/// (pairs involving an unranked candidate, or tied on either side, are not
/// comparable). Symmetric; 0 when no pair is comparable in both rankings.
pub struct KendallTau;

impl RankingCost for KendallTau {
    fn cost(&self, a: &Ballot, b: &Ballot, universe: usize) -> f64 {
        let pa = positions(a, universe);
        let pb = positions(b, universe);
        let mut comparable = 0u64;
        let mut disagreements = 0u64;
        for (x, y) in (0..universe).tuple_combinations() {
            if let (Some(ax), Some(ay), Some(bx), Some(by)) = (pa[x], pa[y], pb[x], pb[y]) {
                if ax != ay && bx != by {
                    comparable += 1;
                    if (ax < ay) != (bx < by) {
                        disagreements += 1;
                    }
                }
            }
        }
        if comparable == 0 {
            0.0
        } else {
            disagreements as f64 / comparable as f64
        }
    }
}

/// Rank position assigned to candidates a ballot leaves unranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRank {
    /// A fixed virtual position, the same for both ballots. Keeps the cost
    /// symmetric; the candidate-universe size is a natural choice.
    Fixed(usize),
    /// One position past the end of the *source* ballot (the first
    /// argument): displacement is measured in the source ballot's frame.
    /// **Not symmetric**: swapping the two profiles can change the cost
    /// when their rankings have different lengths.
    PastEnd,
}

/// Positional-displacement cost: the sum of `|rank_a(c) - rank_b(c)|` over
/// every candidate ranked by at least one of the two ballots, with unranked
/// candidates assigned the configured [`MissingRank`] position.
///
/// Symmetric with [`MissingRank::Fixed`]; not with [`MissingRank::PastEnd`].
pub struct PositionalDisplacement {
    pub missing: MissingRank,
}

impl PositionalDisplacement {
    /// Penalizes missing candidates at a fixed virtual position.
    pub fn fixed(position: usize) -> PositionalDisplacement {
        PositionalDisplacement {
            missing: MissingRank::Fixed(position),
        }
    }

    /// Penalizes missing candidates just past the end of the source ballot.
    pub fn past_end() -> PositionalDisplacement {
        PositionalDisplacement {
            missing: MissingRank::PastEnd,
        }
    }
}

impl RankingCost for PositionalDisplacement {
    fn cost(&self, a: &Ballot, b: &Ballot, universe: usize) -> f64 {
        let pa = positions(a, universe);
        let pb = positions(b, universe);
        let penalty = match self.missing {
            MissingRank::Fixed(position) => position,
            MissingRank::PastEnd => a.len(),
        };
        let mut total = 0.0;
        for c in 0..universe {
            if pa[c].is_none() && pb[c].is_none() {
                continue;
            }
            let ra = pa[c].unwrap_or(penalty) as f64;
            let rb = pb[c].unwrap_or(penalty) as f64;
            total += (ra - rb).abs();
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BallotProfile, ProfileBuilder};

    fn ballots(profile: &BallotProfile) -> Vec<Ballot> {
        profile.ballots().map(|(b, _)| b.clone()).collect()
    }

    fn two_ballots(candidates: &[&str], first: &[&str], second: &[&str]) -> (Ballot, Ballot, usize) {
        let mut b = ProfileBuilder::new(candidates).unwrap();
        b.add_simple(first, 1.0).unwrap();
        b.add_simple(second, 2.0).unwrap();
        let p = b.build();
        let all = ballots(&p);
        assert_eq!(all.len(), 2);
        // BTreeMap order is not insertion order; identify by weight.
        let w0 = p.ballots().next().map(|(_, w)| w).unwrap();
        if w0 == 1.0 {
            (all[0].clone(), all[1].clone(), candidates.len())
        } else {
            (all[1].clone(), all[0].clone(), candidates.len())
        }
    }

    #[test]
    fn identical_rankings_cost_zero() {
        let (a, _, n) = two_ballots(&["X", "Y", "Z"], &["X", "Y", "Z"], &["Z", "Y", "X"]);
        assert_eq!(KendallTau.cost(&a, &a, n), 0.0);
        assert_eq!(PositionalDisplacement::fixed(n).cost(&a, &a, n), 0.0);
        assert_eq!(PositionalDisplacement::past_end().cost(&a, &a, n), 0.0);
    }

    #[test]
    fn kendall_full_reversal_is_maximal() {
        let (a, b, n) = two_ballots(&["X", "Y", "Z"], &["X", "Y", "Z"], &["Z", "Y", "X"]);
        assert_eq!(KendallTau.cost(&a, &b, n), 1.0);
        assert_eq!(KendallTau.cost(&b, &a, n), 1.0);
    }

    #[test]
    fn kendall_single_swap_on_two_candidates() {
        let (a, b, n) = two_ballots(&["X", "Y"], &["X", "Y"], &["Y", "X"]);
        assert_eq!(KendallTau.cost(&a, &b, n), 1.0);
    }

    #[test]
    fn kendall_ignores_incomparable_pairs() {
        // Only the (X, Y) pair is strictly ordered by both ballots, and
        // they agree on it.
        let (a, b, n) = two_ballots(&["X", "Y", "Z"], &["X", "Y", "Z"], &["X", "Y"]);
        assert_eq!(KendallTau.cost(&a, &b, n), 0.0);
    }

    #[test]
    fn kendall_no_comparable_pairs_is_zero() {
        let (a, b, n) = two_ballots(&["X", "Y", "Z", "W"], &["X", "Y"], &["Z", "W"]);
        assert_eq!(KendallTau.cost(&a, &b, n), 0.0);
    }

    #[test]
    fn displacement_counts_position_moves() {
        let (a, b, n) = two_ballots(&["X", "Y", "Z"], &["X", "Y", "Z"], &["Y", "X", "Z"]);
        // X and Y swap adjacent positions, Z stays.
        assert_eq!(PositionalDisplacement::fixed(n).cost(&a, &b, n), 2.0);
    }

    #[test]
    fn displacement_fixed_penalty_is_symmetric() {
        let (a, b, n) = two_ballots(&["X", "Y", "Z"], &["X", "Y", "Z"], &["Z"]);
        let model = PositionalDisplacement::fixed(n);
        assert_eq!(model.cost(&a, &b, n), model.cost(&b, &a, n));
    }

    #[test]
    fn displacement_past_end_is_asymmetric() {
        let (a, b, n) = two_ballots(&["X", "Y", "Z"], &["X", "Y", "Z"], &["Z"]);
        let model = PositionalDisplacement::past_end();
        // The source frame differs: penalty 3 measured from a, penalty 1
        // measured from b.
        assert_eq!(model.cost(&a, &b, n), 7.0);
        assert_eq!(model.cost(&b, &a, n), 3.0);
    }
}
