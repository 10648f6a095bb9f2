use snafu::{ensure, OptionExt};

use crate::errors::{Result, UnresolvedTieSnafu};
use crate::profile::CandidateId;

/// Direction of the tie being resolved.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieKind {
    /// The selected candidate is elected (or ordered) first.
    Election,
    /// The selected candidate is the one eliminated.
    Elimination,
}

/// What a policy may consult when resolving a tie.
pub struct TieContext<'a> {
    /// Round in which the tie occurred (1-based).
    pub round: u32,
    pub kind: TieKind,
    /// Declared candidate names; a [`CandidateId`] indexes into this slice.
    pub candidates: &'a [String],
}

impl TieContext<'_> {
    fn name_of(&self, cid: CandidateId) -> Result<&str> {
        self.candidates
            .get(cid.index())
            .map(|s| s.as_str())
            .context(UnresolvedTieSnafu {
                candidates: Vec::<String>::new(),
                reason: "tied candidate is not part of the declared set",
            })
    }

    fn names_of(&self, tied: &[CandidateId]) -> Vec<String> {
        tied.iter()
            .filter_map(|cid| self.candidates.get(cid.index()).cloned())
            .collect()
    }
}

/// Strategy resolving a tie in vote totals by selecting exactly one
/// candidate from the tied set: the one elected first for election ties,
/// the one eliminated for elimination ties.
///
/// A policy that cannot decide must fail with
/// [`VotingError::UnresolvedTie`](crate::VotingError::UnresolvedTie);
/// tabulation never proceeds on an unresolved tie.
pub trait TieBreakPolicy {
    fn resolve(&self, tied: &[CandidateId], ctx: &TieContext<'_>) -> Result<CandidateId>;
}

/// Resolves ties by declared candidate order: election ties favor the
/// earliest declared candidate, elimination ties remove the latest declared.
///
/// Deterministic with no randomness; this is the crate's documented default
/// policy.
pub struct DeclaredOrder;

impl TieBreakPolicy for DeclaredOrder {
    fn resolve(&self, tied: &[CandidateId], ctx: &TieContext<'_>) -> Result<CandidateId> {
        let pick = match ctx.kind {
            TieKind::Election => tied.iter().min(),
            TieKind::Elimination => tied.iter().max(),
        };
        pick.copied().context(UnresolvedTieSnafu {
            candidates: ctx.names_of(tied),
            reason: "empty tie set",
        })
    }
}

/// Deterministic pseudo-random resolution for reproducible simulation.
///
/// Tied candidates are permuted by the sha256 digest of the seed, the round
/// number and the candidate name, and the first of the permutation is
/// selected for both tie kinds. The outcome is stable across runs and
/// platforms for a fixed seed, and hard to anticipate without it.
pub struct RandomSeeded {
    pub seed: u32,
}

impl TieBreakPolicy for RandomSeeded {
    fn resolve(&self, tied: &[CandidateId], ctx: &TieContext<'_>) -> Result<CandidateId> {
        let mut keyed: Vec<(String, CandidateId)> = Vec::with_capacity(tied.len());
        for cid in tied {
            let name = ctx.name_of(*cid)?;
            let key = sha256::digest(format!("{:08}{:08}{}", self.seed, ctx.round, name));
            keyed.push((key, *cid));
        }
        keyed.sort();
        keyed
            .first()
            .map(|(_, cid)| *cid)
            .context(UnresolvedTieSnafu {
                candidates: ctx.names_of(tied),
                reason: "empty tie set",
            })
    }
}

/// Delegates to an externally supplied ordering of all candidates (most
/// preferred first), for auditable tie resolution.
///
/// Election ties select the best-ranked tied candidate, elimination ties the
/// worst-ranked. Fails if any tied candidate is missing from the ordering.
pub struct ManualOrder {
    ranking: Vec<String>,
}

impl ManualOrder {
    pub fn new<S: AsRef<str>>(ranking: &[S]) -> ManualOrder {
        ManualOrder {
            ranking: ranking.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }
}

impl TieBreakPolicy for ManualOrder {
    fn resolve(&self, tied: &[CandidateId], ctx: &TieContext<'_>) -> Result<CandidateId> {
        ensure!(
            !tied.is_empty(),
            UnresolvedTieSnafu {
                candidates: Vec::<String>::new(),
                reason: "empty tie set",
            }
        );
        let mut positions: Vec<(usize, CandidateId)> = Vec::with_capacity(tied.len());
        for cid in tied {
            let name = ctx.name_of(*cid)?;
            let pos = self
                .ranking
                .iter()
                .position(|r| r == name)
                .context(UnresolvedTieSnafu {
                    candidates: ctx.names_of(tied),
                    reason: format!("manual ordering does not rank {name:?}"),
                })?;
            positions.push((pos, *cid));
        }
        let pick = match ctx.kind {
            TieKind::Election => positions.iter().min(),
            TieKind::Elimination => positions.iter().max(),
        };
        pick.map(|(_, cid)| *cid).context(UnresolvedTieSnafu {
            candidates: ctx.names_of(tied),
            reason: "empty tie set",
        })
    }
}
