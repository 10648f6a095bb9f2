use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::errors::{InsufficientCandidatesSnafu, Result, UnresolvedTieSnafu};
use crate::profile::{BallotProfile, CandidateId};
use crate::quota::QuotaRule;
use crate::tiebreak::{TieBreakPolicy, TieContext, TieKind};

// Slack for comparing accumulated f64 vote weights.
const WEIGHT_EPS: f64 = 1e-9;

/// Final status of a declared candidate.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CandidateStatus {
    Elected { round: u32 },
    Eliminated { round: u32 },
    /// Still in contention when the count ended: the seats were already
    /// filled, or no first-place support remained to separate the field.
    Hopeful,
}

/// Vote totals and events for one counting round.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round: u32,
    pub quota: f64,
    /// First-place weight per candidate still in contention at the start of
    /// the round, in declared order.
    pub tally: Vec<(String, f64)>,
    pub elected: Vec<String>,
    pub eliminated: Vec<String>,
    /// Ballot weight that ran out of preferences during this round and left
    /// the count.
    pub exhausted: f64,
}

/// Immutable outcome of a tabulation. Either complete or not returned at
/// all; unfilled seats are reported here, never as an error.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TabulationResult {
    /// Seats the election was run for.
    pub seats: usize,
    /// Elected candidates with their round of election, in order of
    /// election.
    pub elected: Vec<(String, u32)>,
    /// Eliminated candidates with their round of elimination, in order of
    /// elimination.
    pub eliminated: Vec<(String, u32)>,
    pub rounds: Vec<RoundSnapshot>,
    /// Final status of every declared candidate.
    pub statuses: BTreeMap<String, CandidateStatus>,
    /// Seats left unfilled because the viable candidates ran out.
    pub unfilled_seats: usize,
}

impl TabulationResult {
    /// Elected candidate names in order of election.
    pub fn winners(&self) -> Vec<&str> {
        self.elected.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn status(&self, name: &str) -> Option<CandidateStatus> {
        self.statuses.get(name).copied()
    }
}

/// Runs a multi-winner transferable-vote count over `profile`.
///
/// Each round recomputes the quota from the live total weight and the seats
/// remaining, tallies first-place weight per hopeful (tied top groups split
/// their ballot weight evenly), then either elects the highest candidate at
/// or above quota (transferring the surplus by the Gregory method), elects
/// all remaining hopefuls when they exactly fill the remaining seats, stops
/// when no first-place support remains, or eliminates the lowest hopeful.
/// Ties are resolved by `tie_break` and quota arithmetic by `quota_rule`;
/// either failing aborts the count with no partial result.
pub fn tabulate(
    profile: &BallotProfile,
    seats: usize,
    quota_rule: &dyn QuotaRule,
    tie_break: &dyn TieBreakPolicy,
) -> Result<TabulationResult> {
    ensure!(
        profile.num_candidates() >= seats,
        InsufficientCandidatesSnafu {
            candidates: profile.num_candidates(),
            seats,
        }
    );
    info!(
        "tabulate: {} candidates, {} seats, total weight {} over {} distinct ballots, quota rule {}",
        profile.num_candidates(),
        seats,
        profile.total_weight(),
        profile.num_ballots(),
        quota_rule.name()
    );

    let mut state = ElectionState {
        profile: profile.clone(),
        hopefuls: (0..profile.num_candidates())
            .map(|idx| CandidateId(idx as u32))
            .collect(),
        elected: Vec::new(),
        eliminated: Vec::new(),
        seats_remaining: seats,
        round: 0,
        rounds: Vec::new(),
        quota_rule,
        tie_break,
    };

    let mut phase = Phase::Round;
    loop {
        phase = match phase {
            Phase::Round => state.begin_round()?,
            Phase::Surplus {
                winner,
                first_weight,
                quota,
            } => state.transfer_surplus(winner, first_weight, quota),
            Phase::Eliminate { loser } => state.eliminate(loser),
            Phase::Done => break,
        };
    }

    Ok(state.into_result(seats))
}

enum Phase {
    Round,
    Surplus {
        winner: CandidateId,
        first_weight: f64,
        quota: f64,
    },
    Eliminate {
        loser: CandidateId,
    },
    Done,
}

/// Mutable state owned by one running tabulation.
struct ElectionState<'a> {
    /// Working profile: reweighted and restricted as the count progresses.
    profile: BallotProfile,
    hopefuls: BTreeSet<CandidateId>,
    elected: Vec<(CandidateId, u32)>,
    eliminated: Vec<(CandidateId, u32)>,
    seats_remaining: usize,
    round: u32,
    rounds: Vec<RoundSnapshot>,
    quota_rule: &'a dyn QuotaRule,
    tie_break: &'a dyn TieBreakPolicy,
}

impl ElectionState<'_> {
    fn begin_round(&mut self) -> Result<Phase> {
        if self.seats_remaining == 0 || self.hopefuls.is_empty() {
            return Ok(Phase::Done);
        }
        self.round += 1;
        let quota = self
            .quota_rule
            .threshold(self.profile.total_weight(), self.seats_remaining)?;
        let tally = self.hopeful_tally();
        self.rounds.push(RoundSnapshot {
            round: self.round,
            quota,
            tally: tally
                .iter()
                .map(|(cid, w)| (self.name(*cid), *w))
                .collect(),
            elected: Vec::new(),
            eliminated: Vec::new(),
            exhausted: 0.0,
        });
        info!(
            "round {}: quota {}, total weight {}, {} hopefuls for {} seats",
            self.round,
            quota,
            self.profile.total_weight(),
            self.hopefuls.len(),
            self.seats_remaining
        );
        for (cid, w) in tally.iter() {
            debug!("round {}: {} = {}", self.round, self.name(*cid), w);
        }

        // A hopeful at or above quota is elected and transfers its surplus.
        let over_quota: Vec<(CandidateId, f64)> = tally
            .iter()
            .filter(|(_, w)| **w >= quota - WEIGHT_EPS)
            .map(|(cid, w)| (*cid, *w))
            .collect();
        if !over_quota.is_empty() {
            let top = over_quota
                .iter()
                .map(|(_, w)| *w)
                .fold(f64::NEG_INFINITY, f64::max);
            let at_top: Vec<CandidateId> = over_quota
                .iter()
                .filter(|(_, w)| (w - top).abs() <= WEIGHT_EPS)
                .map(|(cid, _)| *cid)
                .collect();
            let winner = self.pick(&at_top, TieKind::Election)?;
            self.mark_elected(winner);
            info!(
                "round {}: {} elected with {} (quota {})",
                self.round,
                self.name(winner),
                top,
                quota
            );
            return Ok(Phase::Surplus {
                winner,
                first_weight: tally.get(&winner).copied().unwrap_or(0.0),
                quota,
            });
        }

        // The remaining hopefuls exactly fill the remaining seats.
        if self.hopefuls.len() == self.seats_remaining {
            let order = self.simultaneous_election_order(&tally)?;
            for cid in order {
                self.mark_elected(cid);
                info!("round {}: {} elected (fills remaining seat)", self.round, self.name(cid));
            }
            return Ok(Phase::Done);
        }

        // All remaining ballots are exhausted; the seats stay unfilled.
        if !tally.values().any(|w| *w > WEIGHT_EPS) {
            info!(
                "round {}: no first-place support remains, {} seats unfilled",
                self.round, self.seats_remaining
            );
            return Ok(Phase::Done);
        }

        // Eliminate the lowest hopeful.
        let bottom = tally.values().copied().fold(f64::INFINITY, f64::min);
        let at_bottom: Vec<CandidateId> = tally
            .iter()
            .filter(|(_, w)| (*w - bottom).abs() <= WEIGHT_EPS)
            .map(|(cid, _)| *cid)
            .collect();
        let loser = self.pick(&at_bottom, TieKind::Elimination)?;
        Ok(Phase::Eliminate { loser })
    }

    fn transfer_surplus(&mut self, winner: CandidateId, first_weight: f64, quota: f64) -> Phase {
        let surplus = (first_weight - quota).max(0.0);
        let factor = if first_weight > 0.0 {
            surplus / first_weight
        } else {
            0.0
        };
        debug!(
            "round {}: transferring surplus {} from {} at factor {}",
            self.round,
            surplus,
            self.name(winner),
            factor
        );
        let (profile, exhausted) = self.profile.transfer_surplus(winner, factor);
        self.profile = profile;
        self.record_exhausted(exhausted);
        Phase::Round
    }

    fn eliminate(&mut self, loser: CandidateId) -> Phase {
        let name = self.name(loser);
        self.eliminated.push((loser, self.round));
        self.hopefuls.remove(&loser);
        let removed = std::iter::once(loser).collect();
        let (profile, exhausted) = self.profile.restricted_ids(&removed);
        self.profile = profile;
        self.record_exhausted(exhausted);
        info!(
            "round {}: {} eliminated, {} weight exhausted",
            self.round, name, exhausted
        );
        if let Some(snapshot) = self.rounds.last_mut() {
            snapshot.eliminated.push(name);
        }
        Phase::Round
    }

    /// First-place weights restricted to the hopefuls. The working profile
    /// only ranks hopefuls, but zero-support hopefuls must still appear.
    fn hopeful_tally(&self) -> BTreeMap<CandidateId, f64> {
        self.profile
            .first_place_tally()
            .into_iter()
            .filter(|(cid, _)| self.hopefuls.contains(cid))
            .collect()
    }

    /// Orders the remaining hopefuls for simultaneous election: descending
    /// first-place weight, ties resolved by the policy one pick at a time.
    fn simultaneous_election_order(
        &self,
        tally: &BTreeMap<CandidateId, f64>,
    ) -> Result<Vec<CandidateId>> {
        let mut weights: Vec<f64> = tally.values().copied().collect();
        weights.sort_by(|a, b| b.total_cmp(a));
        weights.dedup_by(|a, b| (*a - *b).abs() <= WEIGHT_EPS);

        let mut placed: BTreeSet<CandidateId> = BTreeSet::new();
        let mut order = Vec::with_capacity(tally.len());
        for w in weights {
            let mut tied: Vec<CandidateId> = tally
                .iter()
                .filter(|(cid, tw)| !placed.contains(*cid) && (**tw - w).abs() <= WEIGHT_EPS)
                .map(|(cid, _)| *cid)
                .collect();
            while !tied.is_empty() {
                let pick = self.pick(&tied, TieKind::Election)?;
                tied.retain(|cid| *cid != pick);
                placed.insert(pick);
                order.push(pick);
            }
        }
        Ok(order)
    }

    /// Resolves a tie through the policy, verifying the selection is a
    /// member of the tied set.
    fn pick(&self, tied: &[CandidateId], kind: TieKind) -> Result<CandidateId> {
        if tied.len() == 1 {
            return Ok(tied[0]);
        }
        let ctx = TieContext {
            round: self.round,
            kind,
            candidates: self.profile.candidates(),
        };
        let pick = self.tie_break.resolve(tied, &ctx)?;
        ensure!(
            tied.contains(&pick),
            UnresolvedTieSnafu {
                candidates: tied.iter().map(|cid| self.name(*cid)).collect::<Vec<_>>(),
                reason: "policy selected a candidate outside the tied set",
            }
        );
        debug!(
            "round {}: tie between {:?} resolved onto {}",
            self.round,
            tied.iter().map(|cid| self.name(*cid)).collect::<Vec<_>>(),
            self.name(pick)
        );
        Ok(pick)
    }

    fn mark_elected(&mut self, cid: CandidateId) {
        let name = self.name(cid);
        self.elected.push((cid, self.round));
        self.hopefuls.remove(&cid);
        self.seats_remaining -= 1;
        if let Some(snapshot) = self.rounds.last_mut() {
            snapshot.elected.push(name);
        }
    }

    fn record_exhausted(&mut self, exhausted: f64) {
        if let Some(snapshot) = self.rounds.last_mut() {
            snapshot.exhausted += exhausted;
        }
    }

    fn name(&self, cid: CandidateId) -> String {
        self.profile.candidate_name(cid).to_string()
    }

    fn into_result(self, seats: usize) -> TabulationResult {
        let mut statuses: BTreeMap<String, CandidateStatus> = self
            .profile
            .candidates()
            .iter()
            .map(|name| (name.clone(), CandidateStatus::Hopeful))
            .collect();
        for (cid, round) in self.elected.iter() {
            statuses.insert(self.name(*cid), CandidateStatus::Elected { round: *round });
        }
        for (cid, round) in self.eliminated.iter() {
            statuses.insert(self.name(*cid), CandidateStatus::Eliminated { round: *round });
        }
        TabulationResult {
            seats,
            elected: self
                .elected
                .iter()
                .map(|(cid, round)| (self.name(*cid), *round))
                .collect(),
            eliminated: self
                .eliminated
                .iter()
                .map(|(cid, round)| (self.name(*cid), *round))
                .collect(),
            rounds: self.rounds,
            statuses,
            unfilled_seats: self.seats_remaining,
        }
    }
}
