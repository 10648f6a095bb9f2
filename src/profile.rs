use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::errors::{MalformedBallotSnafu, Result};

/// Opaque candidate identifier, assigned by declared order at profile
/// construction. Ids are only meaningful relative to the profile that issued
/// them.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CandidateId(pub(crate) u32);

impl CandidateId {
    /// Index of this candidate in the declared order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A ranking as supplied by callers: outer order is preference order, an
/// inner group of more than one name is a tie at that position.
pub type Ranking = Vec<Vec<String>>;

/// An ordered ranking over candidates, top choice first.
///
/// A rank may hold a group of candidates ranked equally. Groups are kept
/// sorted so two ballots expressing the same preferences compare equal, and
/// the whole ballot orders and hashes deterministically.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct Ballot {
    ranks: Vec<Vec<CandidateId>>,
}

impl Ballot {
    pub(crate) fn from_groups(mut ranks: Vec<Vec<CandidateId>>) -> Ballot {
        for group in ranks.iter_mut() {
            group.sort_unstable();
        }
        Ballot { ranks }
    }

    /// The ranks of this ballot, top choice first. Each rank is a sorted,
    /// duplicate-free group of candidates; more than one entry means a tie.
    pub fn ranks(&self) -> &[Vec<CandidateId>] {
        &self.ranks
    }

    /// The top rank group, if any preference remains.
    pub fn first_rank(&self) -> Option<&[CandidateId]> {
        self.ranks.first().map(|g| g.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Number of rank positions (a tied group counts as one position).
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// New ballot with `removed` dropped from every rank. Tied groups
    /// shrink; groups emptied by the removal vanish and later ranks move up.
    pub(crate) fn restricted(&self, removed: &HashSet<CandidateId>) -> Ballot {
        let ranks = self
            .ranks
            .iter()
            .filter_map(|group| {
                let g: Vec<CandidateId> = group
                    .iter()
                    .filter(|cid| !removed.contains(cid))
                    .copied()
                    .collect();
                if g.is_empty() {
                    None
                } else {
                    Some(g)
                }
            })
            .collect();
        Ballot { ranks }
    }
}

/// A weighted multiset of ballots over a fixed candidate universe.
///
/// The declared candidate set never changes after construction; elimination
/// and election remove candidates from *consideration* via
/// [`restricted`](BallotProfile::restricted), which always returns a new
/// profile. Weights are non-negative and may be fractional after surplus
/// transfers. Equal rankings are aggregated, and a zero-weight pair is
/// indistinguishable from an absent one.
#[derive(Debug, Clone, PartialEq)]
pub struct BallotProfile {
    candidates: Vec<String>,
    by_name: HashMap<String, CandidateId>,
    ballots: BTreeMap<Ballot, f64>,
    total_weight: f64,
}

/// Incremental construction of a [`BallotProfile`].
///
/// ```
/// use votelab::ProfileBuilder;
/// # use votelab::VotingError;
/// let mut builder = ProfileBuilder::new(&["Anna", "Bob", "Clara"])?;
/// builder.add_simple(&["Anna", "Clara"], 3.0)?;
/// builder.add_ranking(&[vec!["Bob".to_string(), "Clara".to_string()]], 1.0)?;
/// let profile = builder.build();
/// assert_eq!(profile.total_weight(), 4.0);
/// # Ok::<(), VotingError>(())
/// ```
pub struct ProfileBuilder {
    profile: BallotProfile,
}

impl ProfileBuilder {
    /// Starts a profile over the declared candidates, in declared order.
    pub fn new<S: AsRef<str>>(candidates: &[S]) -> Result<ProfileBuilder> {
        ensure!(
            !candidates.is_empty(),
            MalformedBallotSnafu {
                reason: "declared candidate set is empty".to_string(),
            }
        );
        let mut by_name: HashMap<String, CandidateId> = HashMap::new();
        let mut names: Vec<String> = Vec::with_capacity(candidates.len());
        for (idx, name) in candidates.iter().enumerate() {
            let name = name.as_ref().to_string();
            ensure!(
                !by_name.contains_key(&name),
                MalformedBallotSnafu {
                    reason: format!("candidate {name:?} declared twice"),
                }
            );
            by_name.insert(name.clone(), CandidateId(idx as u32));
            names.push(name);
        }
        Ok(ProfileBuilder {
            profile: BallotProfile {
                candidates: names,
                by_name,
                ballots: BTreeMap::new(),
                total_weight: 0.0,
            },
        })
    }

    /// Adds a ranking with tied groups. Fails on undeclared candidates,
    /// duplicates within the ballot, empty tie groups, or a negative or
    /// non-finite weight. A zero weight is accepted and ignored.
    pub fn add_ranking(&mut self, ranking: &[Vec<String>], weight: f64) -> Result<()> {
        ensure!(
            weight.is_finite() && weight >= 0.0,
            MalformedBallotSnafu {
                reason: format!("ballot weight {weight} is negative or not finite"),
            }
        );
        let ballot = resolve_ranking(&self.profile.by_name, ranking)?;
        if weight == 0.0 || ballot.is_empty() {
            return Ok(());
        }
        *self.profile.ballots.entry(ballot).or_insert(0.0) += weight;
        self.profile.total_weight += weight;
        Ok(())
    }

    /// Adds a strict ranking without ties. The simplest use for most cases.
    pub fn add_simple<S: AsRef<str>>(&mut self, ranking: &[S], weight: f64) -> Result<()> {
        let groups: Vec<Vec<String>> = ranking
            .iter()
            .map(|name| vec![name.as_ref().to_string()])
            .collect();
        self.add_ranking(&groups, weight)
    }

    pub fn build(self) -> BallotProfile {
        debug!(
            "built profile: {} candidates, {} distinct ballots, total weight {}",
            self.profile.candidates.len(),
            self.profile.ballots.len(),
            self.profile.total_weight
        );
        self.profile
    }
}

impl BallotProfile {
    /// Builds a profile from `(ranking, weight)` pairs over the declared
    /// candidates. Equal rankings are aggregated by summing their weights.
    pub fn new<S: AsRef<str>>(candidates: &[S], pairs: &[(Ranking, f64)]) -> Result<BallotProfile> {
        let mut builder = ProfileBuilder::new(candidates)?;
        for (ranking, weight) in pairs {
            builder.add_ranking(ranking, *weight)?;
        }
        Ok(builder.build())
    }

    /// Declared candidates, in declared order.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn num_candidates(&self) -> usize {
        self.candidates.len()
    }

    pub fn candidate_id(&self, name: &str) -> Option<CandidateId> {
        self.by_name.get(name).copied()
    }

    /// Name of a candidate issued by this profile. Empty for a foreign id.
    pub fn candidate_name(&self, cid: CandidateId) -> &str {
        self.candidates
            .get(cid.index())
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Sum of all ballot weights.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Number of distinct ballots carrying weight.
    pub fn num_ballots(&self) -> usize {
        self.ballots.len()
    }

    /// Distinct ballots with their aggregated weights, in a deterministic
    /// order.
    pub fn ballots(&self) -> impl Iterator<Item = (&Ballot, f64)> + '_ {
        self.ballots.iter().map(|(b, w)| (b, *w))
    }

    /// Weight carried by one ranking; 0 if the profile does not contain it
    /// (including rankings that would not validate against this profile).
    pub fn weight_of(&self, ranking: &[Vec<String>]) -> f64 {
        match resolve_ranking(&self.by_name, ranking) {
            Ok(ballot) => self.ballots.get(&ballot).copied().unwrap_or(0.0),
            Err(_) => 0.0,
        }
    }

    /// The `(ranking, weight)` pairs of this profile. Feeding them back to
    /// [`BallotProfile::new`] with the same candidates reconstructs an equal
    /// profile.
    pub fn to_pairs(&self) -> Vec<(Ranking, f64)> {
        self.ballots
            .iter()
            .map(|(b, w)| (self.ranking_of(b), *w))
            .collect()
    }

    /// Renders a ballot back to candidate names.
    pub fn ranking_of(&self, ballot: &Ballot) -> Ranking {
        ballot
            .ranks
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|cid| self.candidate_name(*cid).to_string())
                    .collect()
            })
            .collect()
    }

    /// First-place weight per declared candidate. A tied top group splits
    /// the ballot weight evenly across its members.
    pub fn first_place_votes(&self) -> BTreeMap<String, f64> {
        self.first_place_tally()
            .into_iter()
            .map(|(cid, w)| (self.candidate_name(cid).to_string(), w))
            .collect()
    }

    pub(crate) fn first_place_tally(&self) -> BTreeMap<CandidateId, f64> {
        let mut tally: BTreeMap<CandidateId, f64> = (0..self.candidates.len())
            .map(|idx| (CandidateId(idx as u32), 0.0))
            .collect();
        for (ballot, weight) in self.ballots.iter() {
            if let Some(first) = ballot.first_rank() {
                let share = weight / first.len() as f64;
                for cid in first {
                    if let Some(w) = tally.get_mut(cid) {
                        *w += share;
                    }
                }
            }
        }
        tally
    }

    /// Total mentions per candidate across all rank positions, tied ranks
    /// splitting the ballot weight evenly. Candidates never mentioned are
    /// absent from the map.
    pub fn mentions(&self) -> BTreeMap<String, f64> {
        let mut mentions: BTreeMap<String, f64> = BTreeMap::new();
        for (ballot, weight) in self.ballots.iter() {
            for group in ballot.ranks() {
                let share = weight / group.len() as f64;
                for cid in group {
                    *mentions
                        .entry(self.candidate_name(*cid).to_string())
                        .or_insert(0.0) += share;
                }
            }
        }
        mentions
    }

    /// Borda score per declared candidate: a candidate in sole position `p`
    /// (0-based, counting individual candidates) scores `n - 1 - p` per unit
    /// of ballot weight, tied groups share the mean of the points their
    /// positions cover, and unranked candidates score 0.
    pub fn borda_scores(&self) -> BTreeMap<String, f64> {
        let n = self.candidates.len() as f64;
        let mut scores: BTreeMap<String, f64> = self
            .candidates
            .iter()
            .map(|name| (name.clone(), 0.0))
            .collect();
        for (ballot, weight) in self.ballots.iter() {
            let mut offset = 0usize;
            for group in ballot.ranks() {
                let k = group.len();
                let mean_points: f64 = (0..k)
                    .map(|j| n - 1.0 - (offset + j) as f64)
                    .sum::<f64>()
                    / k as f64;
                for cid in group {
                    if let Some(s) = scores.get_mut(self.candidate_name(*cid)) {
                        *s += weight * mean_points;
                    }
                }
                offset += k;
            }
        }
        scores
    }

    /// New profile with the named candidates removed from every ballot.
    /// Ties collapse, ballots emptied by the removal vanish (their weight
    /// leaves the total), and the declared candidate set is unchanged.
    /// Restriction by an empty set returns an equal profile.
    pub fn restricted<S: AsRef<str>>(&self, removed: &[S]) -> Result<BallotProfile> {
        let mut ids: HashSet<CandidateId> = HashSet::new();
        for name in removed {
            let name = name.as_ref();
            match self.candidate_id(name) {
                Some(cid) => {
                    ids.insert(cid);
                }
                None => {
                    return MalformedBallotSnafu {
                        reason: format!("cannot restrict by undeclared candidate {name:?}"),
                    }
                    .fail();
                }
            }
        }
        Ok(self.restricted_ids(&ids).0)
    }

    /// Restriction in id space. Also returns the weight that left the
    /// profile because its ballots were fully exhausted by the removal.
    pub(crate) fn restricted_ids(&self, removed: &HashSet<CandidateId>) -> (BallotProfile, f64) {
        let mut out = self.empty_like();
        let mut exhausted = 0.0;
        for (ballot, weight) in self.ballots.iter() {
            let b = ballot.restricted(removed);
            if b.is_empty() {
                exhausted += weight;
            } else {
                out.push(b, *weight);
            }
        }
        (out, exhausted)
    }

    /// Gregory surplus transfer: every ballot whose top rank contains
    /// `winner` keeps the co-ranked candidates' shares whole and transfers
    /// the winner's share at `factor` (surplus over first-place weight);
    /// then the winner is removed from every ballot. Returns the new
    /// profile and the weight exhausted because a ballot had no remaining
    /// preference for its transferable share.
    pub(crate) fn transfer_surplus(
        &self,
        winner: CandidateId,
        factor: f64,
    ) -> (BallotProfile, f64) {
        let removed: HashSet<CandidateId> = std::iter::once(winner).collect();
        let mut out = self.empty_like();
        let mut exhausted = 0.0;
        for (ballot, weight) in self.ballots.iter() {
            let heads_winner = ballot
                .first_rank()
                .map(|g| g.contains(&winner))
                .unwrap_or(false);
            let weight = if heads_winner {
                let k = ballot
                    .first_rank()
                    .map(|g| g.len())
                    .unwrap_or(1) as f64;
                // The winner's share (weight / k) transfers at `factor`;
                // the other k - 1 shares stay whole.
                weight * ((k - 1.0) + factor) / k
            } else {
                *weight
            };
            if weight <= 0.0 {
                continue;
            }
            let b = ballot.restricted(&removed);
            if b.is_empty() {
                exhausted += weight;
            } else {
                out.push(b, weight);
            }
        }
        (out, exhausted)
    }

    fn empty_like(&self) -> BallotProfile {
        BallotProfile {
            candidates: self.candidates.clone(),
            by_name: self.by_name.clone(),
            ballots: BTreeMap::new(),
            total_weight: 0.0,
        }
    }

    fn push(&mut self, ballot: Ballot, weight: f64) {
        *self.ballots.entry(ballot).or_insert(0.0) += weight;
        self.total_weight += weight;
    }
}

fn resolve_ranking(
    by_name: &HashMap<String, CandidateId>,
    ranking: &[Vec<String>],
) -> Result<Ballot> {
    let mut seen: HashSet<CandidateId> = HashSet::new();
    let mut groups: Vec<Vec<CandidateId>> = Vec::with_capacity(ranking.len());
    for group in ranking {
        ensure!(
            !group.is_empty(),
            MalformedBallotSnafu {
                reason: "empty tie group".to_string(),
            }
        );
        let mut g: Vec<CandidateId> = Vec::with_capacity(group.len());
        for name in group {
            let cid = match by_name.get(name) {
                Some(cid) => *cid,
                None => {
                    return MalformedBallotSnafu {
                        reason: format!("ballot ranks undeclared candidate {name:?}"),
                    }
                    .fail();
                }
            };
            ensure!(
                seen.insert(cid),
                MalformedBallotSnafu {
                    reason: format!("candidate {name:?} appears twice in one ballot"),
                }
            );
            g.push(cid);
        }
        groups.push(g);
    }
    Ok(Ballot::from_groups(groups))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_profile() -> BallotProfile {
        let mut b = ProfileBuilder::new(&["A", "B", "C"]).unwrap();
        b.add_simple(&["A", "B", "C"], 3.0).unwrap();
        b.add_simple(&["B", "A"], 2.0).unwrap();
        b.add_ranking(
            &[
                vec!["B".to_string(), "C".to_string()],
                vec!["A".to_string()],
            ],
            2.0,
        )
        .unwrap();
        b.build()
    }

    #[test]
    fn rejects_undeclared_candidate() {
        let mut b = ProfileBuilder::new(&["A", "B"]).unwrap();
        let err = b.add_simple(&["A", "Z"], 1.0).unwrap_err();
        assert!(matches!(
            err,
            crate::VotingError::MalformedBallot { .. }
        ));
    }

    #[test]
    fn rejects_duplicate_candidate_in_ballot() {
        let mut b = ProfileBuilder::new(&["A", "B"]).unwrap();
        assert!(b.add_simple(&["A", "A"], 1.0).is_err());
        // Duplicates across a tie group and a later rank are also caught.
        assert!(b
            .add_ranking(
                &[
                    vec!["A".to_string(), "B".to_string()],
                    vec!["A".to_string()]
                ],
                1.0
            )
            .is_err());
    }

    #[test]
    fn rejects_negative_weight() {
        let mut b = ProfileBuilder::new(&["A", "B"]).unwrap();
        assert!(b.add_simple(&["A"], -1.0).is_err());
        assert!(b.add_simple(&["A"], f64::NAN).is_err());
    }

    #[test]
    fn rejects_duplicate_declared_candidate() {
        assert!(ProfileBuilder::new(&["A", "A"]).is_err());
    }

    #[test]
    fn aggregates_equal_rankings() {
        let mut b = ProfileBuilder::new(&["A", "B"]).unwrap();
        b.add_simple(&["A", "B"], 1.5).unwrap();
        b.add_simple(&["A", "B"], 2.5).unwrap();
        let p = b.build();
        assert_eq!(p.num_ballots(), 1);
        assert_eq!(
            p.weight_of(&[vec!["A".to_string()], vec!["B".to_string()]]),
            4.0
        );
        assert_eq!(p.weight_of(&[vec!["B".to_string()]]), 0.0);
    }

    #[test]
    fn first_place_splits_ties() {
        let p = abc_profile();
        let votes = p.first_place_votes();
        assert_eq!(votes["A"], 3.0);
        assert_eq!(votes["B"], 2.0 + 1.0);
        assert_eq!(votes["C"], 1.0);
    }

    #[test]
    fn restriction_by_empty_set_is_identity() {
        let p = abc_profile();
        let r = p.restricted::<&str>(&[]).unwrap();
        assert_eq!(p, r);
    }

    #[test]
    fn restriction_collapses_ties_and_exhausts() {
        let p = abc_profile();
        // Dropping B shrinks the tied group {B, C} to just C and rewrites
        // the [B, A] ballots to [A].
        let r = p.restricted(&["B"]).unwrap();
        assert_eq!(r.total_weight(), p.total_weight());
        assert_eq!(
            r.weight_of(&[vec!["C".to_string()], vec!["A".to_string()]]),
            2.0
        );
        assert_eq!(r.weight_of(&[vec!["A".to_string()]]), 2.0);
        // Dropping everything a ballot ranked exhausts it.
        let r2 = p.restricted(&["B", "A"]).unwrap();
        assert!(r2.total_weight() < p.total_weight());
        assert_eq!(r2.total_weight(), 3.0 + 2.0);
        // The declared universe is untouched.
        assert_eq!(r2.candidates(), p.candidates());
    }

    #[test]
    fn restriction_never_increases_weight() {
        let p = abc_profile();
        for name in ["A", "B", "C"] {
            let r = p.restricted(&[name]).unwrap();
            assert!(r.total_weight() <= p.total_weight());
        }
    }

    #[test]
    fn pairs_round_trip() {
        let p = abc_profile();
        let rebuilt = BallotProfile::new(p.candidates(), &p.to_pairs()).unwrap();
        assert_eq!(p, rebuilt);
    }

    #[test]
    fn mentions_split_tied_ranks() {
        let p = abc_profile();
        let m = p.mentions();
        // A: 3 (first) + 2 (second) + 2 (second) = 7
        assert_eq!(m["A"], 7.0);
        // C: 3 (third) + 1 (half of the tied group of 2)
        assert_eq!(m["C"], 4.0);
    }

    #[test]
    fn borda_scores_share_tied_points() {
        let mut b = ProfileBuilder::new(&["A", "B", "C"]).unwrap();
        b.add_ranking(
            &[
                vec!["A".to_string(), "B".to_string()],
                vec!["C".to_string()],
            ],
            1.0,
        )
        .unwrap();
        let s = b.build().borda_scores();
        // Positions 0 and 1 are worth 2 and 1 points; A and B share 1.5 each.
        assert_eq!(s["A"], 1.5);
        assert_eq!(s["B"], 1.5);
        assert_eq!(s["C"], 0.0);
    }

    #[test]
    fn surplus_transfer_conserves_mass() {
        let mut b = ProfileBuilder::new(&["A", "B", "C"]).unwrap();
        b.add_simple(&["A", "B"], 6.0).unwrap();
        b.add_simple(&["C"], 2.0).unwrap();
        let p = b.build();
        let a = p.candidate_id("A").unwrap();
        // First-place weight 6, quota 4: factor = 2/6.
        let (after, exhausted) = p.transfer_surplus(a, 2.0 / 6.0);
        assert_eq!(exhausted, 0.0);
        let moved = after.weight_of(&[vec!["B".to_string()]]);
        assert!((moved - 2.0).abs() < 1e-9);
        assert!((after.total_weight() - 4.0).abs() < 1e-9);
    }
}
