use std::collections::BTreeSet;

use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;
use snafu::ensure;

use crate::cost::RankingCost;
use crate::errors::{
    EmptyProfileSnafu, IncompatibleCandidateSetSnafu, NoConvergenceSnafu, Result, VotingError,
};
use crate::profile::{Ballot, BallotProfile, CandidateId, Ranking};

// Masses below this are treated as fully placed by the exact solver.
const MASS_EPS: f64 = 1e-12;

// Largest per-side support for which `distance` picks the exact solver.
const EXACT_SUPPORT_LIMIT: usize = 128;

/// Joint flow between the ballots of two profiles.
///
/// Row `i` is the `i`-th distinct ballot of the source profile, column `j`
/// the `j`-th of the target profile, both with their masses normalized to
/// sum 1. Flows are non-negative and their row/column sums reproduce the
/// marginal masses within the solver's documented tolerance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportPlan {
    source: Vec<(Ranking, f64)>,
    target: Vec<(Ranking, f64)>,
    flows: Vec<f64>,
}

impl TransportPlan {
    pub fn num_source(&self) -> usize {
        self.source.len()
    }

    pub fn num_target(&self) -> usize {
        self.target.len()
    }

    /// Source ballots with their normalized masses.
    pub fn source(&self) -> &[(Ranking, f64)] {
        &self.source
    }

    /// Target ballots with their normalized masses.
    pub fn target(&self) -> &[(Ranking, f64)] {
        &self.target
    }

    pub fn flow(&self, i: usize, j: usize) -> f64 {
        self.flows[i * self.target.len() + j]
    }

    /// Nonzero flows as `(source index, target index, amount)`.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let m = self.target.len();
        self.flows
            .iter()
            .enumerate()
            .filter(|(_, f)| **f > 0.0)
            .map(move |(idx, f)| (idx / m, idx % m, *f))
    }

    /// Mass leaving source ballot `i` (the `i`-th row sum).
    pub fn source_marginal(&self, i: usize) -> f64 {
        let m = self.target.len();
        self.flows[i * m..(i + 1) * m].iter().sum()
    }

    /// Mass arriving at target ballot `j` (the `j`-th column sum).
    pub fn target_marginal(&self, j: usize) -> f64 {
        let m = self.target.len();
        self.flows.iter().skip(j).step_by(m).sum()
    }
}

/// Backend solving the discrete transportation problem.
///
/// `cost` is row-major with `mu.len()` rows and `nu.len()` columns; both
/// mass vectors are strictly positive and sum to 1. The returned flows are
/// row-major, non-negative, and satisfy the marginals within the backend's
/// documented tolerance.
pub trait TransportSolver {
    fn solve(&self, mu: &[f64], nu: &[f64], cost: &[f64]) -> Result<Vec<f64>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Exact solver: successive shortest augmenting paths with node potentials
/// over the dense bipartite network.
///
/// Optimal up to floating-point round-off; the returned value is within
/// about 1e-9 (relative) of the true optimum for well-scaled costs. Runtime
/// grows cubically with the support size, which is why
/// [`distance`] switches to [`SinkhornSolver`] for large supports.
pub struct ExactSolver;

impl TransportSolver for ExactSolver {
    fn solve(&self, mu: &[f64], nu: &[f64], cost: &[f64]) -> Result<Vec<f64>> {
        let n = mu.len();
        let m = nu.len();
        let nodes = n + m;
        let mut flow = vec![0.0; n * m];
        let mut pot = vec![0.0; nodes];
        let mut rem_mu = mu.to_vec();
        let mut rem_nu = nu.to_vec();
        let mut remaining: f64 = mu.iter().sum();

        // Each augmentation moves a positive amount of new mass, so the
        // loop terminates; the cap guards against degenerate stalls.
        let max_augmentations = 16 * nodes + 64;
        let mut augmentations = 0usize;

        while remaining > MASS_EPS {
            augmentations += 1;
            ensure!(
                augmentations <= max_augmentations,
                NoConvergenceSnafu {
                    iterations: max_augmentations,
                }
            );
            let s = match rem_mu.iter().position(|w| *w > MASS_EPS) {
                Some(s) => s,
                None => break,
            };

            // Dijkstra over reduced costs from source s. Sources are nodes
            // 0..n, targets n..n+m.
            let mut dist = vec![f64::INFINITY; nodes];
            let mut parent = vec![usize::MAX; nodes];
            let mut done = vec![false; nodes];
            dist[s] = 0.0;
            loop {
                let mut u = usize::MAX;
                let mut best = f64::INFINITY;
                for v in 0..nodes {
                    if !done[v] && dist[v] < best {
                        best = dist[v];
                        u = v;
                    }
                }
                if u == usize::MAX {
                    break;
                }
                done[u] = true;
                if u < n {
                    for j in 0..m {
                        let rc = (cost[u * m + j] + pot[u] - pot[n + j]).max(0.0);
                        if dist[u] + rc < dist[n + j] {
                            dist[n + j] = dist[u] + rc;
                            parent[n + j] = u;
                        }
                    }
                } else {
                    let j = u - n;
                    for i in 0..n {
                        if flow[i * m + j] > MASS_EPS {
                            let rc = (pot[n + j] - pot[i] - cost[i * m + j]).max(0.0);
                            if dist[u] + rc < dist[i] {
                                dist[i] = dist[u] + rc;
                                parent[i] = u;
                            }
                        }
                    }
                }
            }

            let t = (0..m)
                .filter(|j| rem_nu[*j] > MASS_EPS && dist[n + j].is_finite())
                .min_by(|a, b| dist[n + a].total_cmp(&dist[n + b]));
            let t = match t {
                Some(t) => t,
                // Unreachable demand despite balanced masses: numerical
                // breakdown rather than a modeling error.
                None => {
                    return NoConvergenceSnafu {
                        iterations: augmentations,
                    }
                    .fail()
                }
            };

            // Walk the path back to find the bottleneck.
            let mut delta = rem_mu[s].min(rem_nu[t]);
            let mut node = n + t;
            while node != s {
                let prev = parent[node];
                if prev >= n && node < n {
                    // Backward use of arc (node, prev - n).
                    delta = delta.min(flow[node * m + (prev - n)]);
                }
                node = prev;
            }
            if !(delta > 0.0) {
                return NoConvergenceSnafu {
                    iterations: augmentations,
                }
                .fail();
            }

            // Apply the augmentation.
            let mut node = n + t;
            while node != s {
                let prev = parent[node];
                if prev < n && node >= n {
                    flow[prev * m + (node - n)] += delta;
                } else {
                    flow[node * m + (prev - n)] -= delta;
                }
                node = prev;
            }
            rem_mu[s] -= delta;
            rem_nu[t] -= delta;
            remaining -= delta;

            let dt = dist[n + t];
            for v in 0..nodes {
                pot[v] += dist[v].min(dt);
            }
        }
        debug!(
            "exact transport: {} augmentations for a {}x{} support",
            augmentations, n, m
        );
        Ok(flow)
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

/// Entropic-regularized approximate solver (Sinkhorn scaling).
///
/// Alternates row and column rescalings of the Gibbs kernel
/// `exp(-cost / epsilon)` until the plan's marginals match the masses
/// within `tolerance`. The reported cost carries an entropic bias that
/// shrinks with `epsilon` (and grows with support size); use
/// [`ExactSolver`] when exactness matters more than scale. Fails with
/// `NoConvergence` if the tolerance is not met within `max_iterations` or
/// the kernel underflows (pick a larger `epsilon` relative to the cost
/// scale in that case).
pub struct SinkhornSolver {
    pub epsilon: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for SinkhornSolver {
    fn default() -> SinkhornSolver {
        SinkhornSolver {
            epsilon: 1e-2,
            max_iterations: 10_000,
            tolerance: 1e-8,
        }
    }
}

impl TransportSolver for SinkhornSolver {
    fn solve(&self, mu: &[f64], nu: &[f64], cost: &[f64]) -> Result<Vec<f64>> {
        let n = mu.len();
        let m = nu.len();
        let kernel: Vec<f64> = cost.iter().map(|c| (-c / self.epsilon).exp()).collect();
        let mut u = vec![1.0; n];
        let mut v = vec![1.0; m];

        for iteration in 0..self.max_iterations {
            for i in 0..n {
                let kv: f64 = (0..m).map(|j| kernel[i * m + j] * v[j]).sum();
                if !kv.is_normal() {
                    return NoConvergenceSnafu { iterations: iteration }.fail();
                }
                u[i] = mu[i] / kv;
            }
            for j in 0..m {
                let ktu: f64 = (0..n).map(|i| kernel[i * m + j] * u[i]).sum();
                if !ktu.is_normal() {
                    return NoConvergenceSnafu { iterations: iteration }.fail();
                }
                v[j] = nu[j] / ktu;
            }

            // Column marginals are exact after the v update; only the rows
            // can still be off.
            let mut err = 0.0;
            for i in 0..n {
                let row: f64 = (0..m).map(|j| u[i] * kernel[i * m + j] * v[j]).sum();
                err += (row - mu[i]).abs();
            }
            if err < self.tolerance {
                debug!(
                    "sinkhorn: converged after {} iterations (marginal error {})",
                    iteration + 1,
                    err
                );
                let flow: Vec<f64> = (0..n * m)
                    .map(|idx| u[idx / m] * kernel[idx] * v[idx % m])
                    .collect();
                return Ok(flow);
            }
        }
        NoConvergenceSnafu {
            iterations: self.max_iterations,
        }
        .fail()
    }

    fn name(&self) -> &'static str {
        "sinkhorn"
    }
}

/// Optimal-transport distance between two ballot profiles.
///
/// Support points are the distinct ballots of each profile with masses
/// normalized to sum 1; the pairwise cost comes from `cost_model`. Picks
/// [`ExactSolver`] when both supports hold at most 128 ballots and
/// [`SinkhornSolver`] defaults otherwise; use [`distance_with_solver`] to
/// pin a backend. Returns the minimal flow-weighted cost and the plan that
/// achieves it.
pub fn distance(
    a: &BallotProfile,
    b: &BallotProfile,
    cost_model: &dyn RankingCost,
) -> Result<(f64, TransportPlan)> {
    if a.num_ballots() <= EXACT_SUPPORT_LIMIT && b.num_ballots() <= EXACT_SUPPORT_LIMIT {
        distance_with_solver(a, b, cost_model, &ExactSolver)
    } else {
        distance_with_solver(a, b, cost_model, &SinkhornSolver::default())
    }
}

/// [`distance`] with an explicit solver backend.
///
/// Fails with `IncompatibleCandidateSet` unless the two profiles declare
/// the same candidate universe (declared order may differ), and with
/// `EmptyProfile` if either carries no weight.
pub fn distance_with_solver(
    a: &BallotProfile,
    b: &BallotProfile,
    cost_model: &dyn RankingCost,
    solver: &dyn TransportSolver,
) -> Result<(f64, TransportPlan)> {
    let set_a: BTreeSet<&str> = a.candidates().iter().map(|s| s.as_str()).collect();
    let set_b: BTreeSet<&str> = b.candidates().iter().map(|s| s.as_str()).collect();
    ensure!(set_a == set_b, IncompatibleCandidateSetSnafu);
    ensure!(a.total_weight() > 0.0, EmptyProfileSnafu);
    ensure!(b.total_weight() > 0.0, EmptyProfileSnafu);

    let universe = a.num_candidates();
    let source: Vec<(&Ballot, f64)> = normalized_support(a);
    let target: Vec<(&Ballot, f64)> = normalized_support(b);
    let mu: Vec<f64> = source.iter().map(|(_, w)| *w).collect();
    let nu: Vec<f64> = target.iter().map(|(_, w)| *w).collect();

    // The profiles may declare the same candidates in different orders;
    // rewrite the target ballots into the source profile's id space before
    // costing them.
    let remap: Vec<CandidateId> = b
        .candidates()
        .iter()
        .map(|name| {
            a.candidate_id(name)
                .ok_or(VotingError::IncompatibleCandidateSet)
        })
        .collect::<Result<_>>()?;
    let target_ballots: Vec<Ballot> = target
        .iter()
        .map(|(ballot, _)| {
            Ballot::from_groups(
                ballot
                    .ranks()
                    .iter()
                    .map(|group| group.iter().map(|cid| remap[cid.index()]).collect())
                    .collect(),
            )
        })
        .collect();

    let cost: Vec<f64> = source
        .iter()
        .cartesian_product(target_ballots.iter())
        .map(|(pair, tb)| cost_model.cost(pair.0, tb, universe))
        .collect();

    info!(
        "distance: {}x{} support, solver {}",
        mu.len(),
        nu.len(),
        solver.name()
    );
    let flows = solver.solve(&mu, &nu, &cost)?;
    let total: f64 = flows.iter().zip(cost.iter()).map(|(f, c)| f * c).sum();

    let plan = TransportPlan {
        source: source
            .iter()
            .map(|(ballot, w)| (a.ranking_of(ballot), *w))
            .collect(),
        target: target
            .iter()
            .map(|(ballot, w)| (b.ranking_of(ballot), *w))
            .collect(),
        flows,
    };
    Ok((total, plan))
}

fn normalized_support(profile: &BallotProfile) -> Vec<(&Ballot, f64)> {
    let total = profile.total_weight();
    profile
        .ballots()
        .map(|(ballot, w)| (ballot, w / total))
        .collect()
}
