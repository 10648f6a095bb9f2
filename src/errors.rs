use snafu::Snafu;

/// Failures surfaced by profile construction, tabulation and the distance
/// engine.
///
/// Construction errors reject bad input before any computation starts.
/// Policy errors abort a running tabulation, which never returns a partial
/// result. Cross-input errors reject comparisons that are not meaningful.
/// Unfilled seats and exhausted ballots are not errors; they are reported in
/// the [`TabulationResult`](crate::TabulationResult).
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum VotingError {
    /// A ballot failed validation at profile construction.
    #[snafu(display("malformed ballot: {reason}"))]
    MalformedBallot { reason: String },

    /// The declared candidate set cannot fill the requested seats.
    #[snafu(display("{candidates} candidates cannot fill {seats} seats"))]
    InsufficientCandidates { candidates: usize, seats: usize },

    /// A quota rule was asked for a threshold with no seats to fill.
    #[snafu(display("quota is undefined for {seats} seats"))]
    InvalidQuota { seats: usize },

    /// A tie-break policy could not select a candidate from the tied set.
    #[snafu(display("unresolved tie between {candidates:?}: {reason}"))]
    UnresolvedTie {
        candidates: Vec<String>,
        reason: String,
    },

    /// The two profiles do not declare the same candidate universe.
    #[snafu(display("profiles declare different candidate sets"))]
    IncompatibleCandidateSet,

    /// The profile carries no ballot weight and cannot be normalized.
    #[snafu(display("profile has zero total weight"))]
    EmptyProfile,

    /// An iterative solver hit its iteration cap before converging.
    #[snafu(display("no convergence after {iterations} iterations"))]
    NoConvergence { iterations: usize },
}

pub type Result<T, E = VotingError> = std::result::Result<T, E>;
