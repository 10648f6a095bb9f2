//! Ranked-ballot election analysis for social-choice research: multi-winner
//! transferable-vote tabulation and optimal-transport distances between
//! ballot profiles.
//!
//! A [`BallotProfile`] is a weighted multiset of (possibly partial, possibly
//! tied) rankings over a fixed candidate set. [`tabulate`] runs the
//! round-by-round transferable-vote count over a profile with a pluggable
//! [`QuotaRule`] and [`TieBreakPolicy`]; [`distance`] compares two profiles
//! by solving an optimal-transport problem over their ballots under a
//! pluggable [`RankingCost`].
//!
//! ```
//! use votelab::{tabulate, DeclaredOrder, DroopQuota, ProfileBuilder};
//! # use votelab::VotingError;
//!
//! let mut builder = ProfileBuilder::new(&["Alice", "Bob", "Charlie"])?;
//! builder.add_simple(&["Alice", "Bob"], 5.0)?;
//! builder.add_simple(&["Bob", "Charlie"], 4.0)?;
//! builder.add_simple(&["Charlie", "Bob"], 2.0)?;
//!
//! let result = tabulate(&builder.build(), 1, &DroopQuota, &DeclaredOrder)?;
//! assert_eq!(result.winners(), vec!["Bob"]);
//! # Ok::<(), VotingError>(())
//! ```
//!
//! Profiles are never mutated in place: restriction and surplus transfers
//! always produce new profiles, and separate tabulation or distance calls
//! share no state, so independent elections and comparisons can run on
//! independent threads with no coordination.

mod cost;
mod errors;
mod profile;
mod quota;
mod tabulation;
mod tiebreak;
mod transport;

pub use crate::cost::*;
pub use crate::errors::*;
pub use crate::profile::*;
pub use crate::quota::*;
pub use crate::tabulation::*;
pub use crate::tiebreak::*;
pub use crate::transport::*;
