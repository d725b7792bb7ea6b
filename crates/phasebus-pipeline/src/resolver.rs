//! Chain resolution.
//!
//! [`ChainResolver`] merges the interceptors contributed by every scope and
//! orders them:
//!
//! 1. Interceptors are bucketed by phase; buckets follow phase order.
//! 2. Inside a bucket, before/after constraints naming other members of the
//!    same bucket become graph edges. Constraints naming absent IDs are
//!    vacuously satisfied. Constraints across buckets are only checked
//!    against phase order and logged when phase order contradicts them.
//! 3. Each bucket is sorted topologically. Among interceptors that are free
//!    to run, the one contributed first runs first, so scope order (bus,
//!    endpoint, binding, service) breaks ties.
//! 4. A cycle fails resolution with [`PipelineError::OrderingCycle`].
//!
//! The result is an immutable [`ResolvedChain`] that may be shared by every
//! exchange resolved from the same configuration.

use crate::error::{PipelineError, PipelineResult};
use crate::interceptor::BoxedInterceptor;
use crate::phase::PhaseList;
use crate::provider::InterceptorScope;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

/// An ordered, immutable interceptor sequence.
#[derive(Clone, Default)]
pub struct ResolvedChain {
    interceptors: Vec<BoxedInterceptor>,
}

impl ResolvedChain {
    /// Returns the interceptor at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BoxedInterceptor> {
        self.interceptors.get(index)
    }

    /// Returns the number of interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns `true` if the chain has no interceptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Iterates interceptors in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxedInterceptor> {
        self.interceptors.iter()
    }

    /// Returns interceptor IDs in execution order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.id()).collect()
    }

    /// Returns the position of the interceptor with `id`.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.interceptors.iter().position(|i| i.id() == id)
    }
}

impl fmt::Debug for ResolvedChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

struct Candidate {
    interceptor: BoxedInterceptor,
    phase: usize,
}

/// Builds a [`ResolvedChain`] from scoped interceptor lists.
///
/// ```
/// use phasebus_core::phases;
/// use phasebus_pipeline::{
///     ChainResolver, Control, FnInterceptor, InterceptorDescriptor, InterceptorScope, PhaseList,
/// };
/// use std::sync::Arc;
///
/// let noop = |id: &str, phase: &str| -> phasebus_pipeline::BoxedInterceptor {
///     Arc::new(FnInterceptor::new(InterceptorDescriptor::new(id, phase), |_| {
///         Ok(Control::Continue)
///     }))
/// };
///
/// let phases = PhaseList::from_names(phases::DEFAULT_INBOUND).unwrap();
/// let chain = ChainResolver::new(phases)
///     .add_scope(InterceptorScope::Bus, &[noop("invoker", phases::INVOKE)])
///     .add_scope(InterceptorScope::Binding, &[noop("decoder", phases::UNMARSHAL)])
///     .resolve()
///     .unwrap();
///
/// assert_eq!(chain.ids(), vec!["decoder", "invoker"]);
/// ```
pub struct ChainResolver {
    phases: PhaseList,
    contributions: Vec<(InterceptorScope, BoxedInterceptor)>,
}

impl ChainResolver {
    /// Creates a resolver for chains over `phases`.
    #[must_use]
    pub const fn new(phases: PhaseList) -> Self {
        Self {
            phases,
            contributions: Vec::new(),
        }
    }

    /// Adds the interceptors contributed by one scope.
    #[must_use]
    pub fn add_scope(mut self, scope: InterceptorScope, interceptors: &[BoxedInterceptor]) -> Self {
        if !interceptors.is_empty() {
            debug!(
                scope = scope.as_str(),
                interceptors = ?interceptors.iter().map(|i| i.id()).collect::<Vec<_>>(),
                "Interceptors contributed"
            );
        }
        self.contributions
            .extend(interceptors.iter().map(|i| (scope, i.clone())));
        self
    }

    /// Orders the contributed interceptors.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingPhase`] or
    /// [`PipelineError::UnknownPhase`] for an interceptor without a valid
    /// phase, and [`PipelineError::OrderingCycle`] when constraints inside a
    /// phase cannot be satisfied.
    pub fn resolve(self) -> PipelineResult<ResolvedChain> {
        let candidates = self.candidates()?;

        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.phases.len()];
        for (index, candidate) in candidates.iter().enumerate() {
            buckets[candidate.phase].push(index);
        }

        self.check_cross_phase(&candidates);

        let mut ordered = Vec::with_capacity(candidates.len());
        for (phase, bucket) in buckets.iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            for index in self.sort_bucket(phase, bucket, &candidates)? {
                ordered.push(candidates[index].interceptor.clone());
            }
        }

        Ok(ResolvedChain {
            interceptors: ordered,
        })
    }

    // Validates phases and drops duplicate IDs, keeping the first.
    fn candidates(&self) -> PipelineResult<Vec<Candidate>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(self.contributions.len());

        for (scope, interceptor) in &self.contributions {
            let descriptor = interceptor.descriptor();
            if !seen.insert(descriptor.id()) {
                debug!(
                    interceptor = descriptor.id(),
                    scope = scope.as_str(),
                    "Skipping duplicate interceptor"
                );
                continue;
            }

            if descriptor.phase().is_empty() {
                return Err(PipelineError::MissingPhase {
                    interceptor: descriptor.id().to_string(),
                });
            }

            let phase = self
                .phases
                .index_of(descriptor.phase())
                .ok_or_else(|| PipelineError::unknown_phase(descriptor.id(), descriptor.phase()))?;

            candidates.push(Candidate {
                interceptor: interceptor.clone(),
                phase,
            });
        }

        Ok(candidates)
    }

    // Kahn's algorithm; the ready set is ordered by contribution index.
    fn sort_bucket(
        &self,
        phase: usize,
        bucket: &[usize],
        candidates: &[Candidate],
    ) -> PipelineResult<Vec<usize>> {
        let local: HashMap<&str, usize> = bucket
            .iter()
            .enumerate()
            .map(|(position, &index)| (candidates[index].interceptor.id(), position))
            .collect();

        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); bucket.len()];
        for (position, &index) in bucket.iter().enumerate() {
            let descriptor = candidates[index].interceptor.descriptor();
            for target in descriptor.before_ids() {
                if let Some(&other) = local.get(target.as_str()) {
                    if other != position {
                        successors[position].insert(other);
                    }
                }
            }
            for target in descriptor.after_ids() {
                if let Some(&other) = local.get(target.as_str()) {
                    if other != position {
                        successors[other].insert(position);
                    }
                }
            }
        }

        let mut in_degree = vec![0_usize; bucket.len()];
        for targets in &successors {
            for &target in targets {
                in_degree[target] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..bucket.len()).filter(|&p| in_degree[p] == 0).collect();
        let mut sorted = Vec::with_capacity(bucket.len());

        while let Some(position) = ready.pop_first() {
            sorted.push(bucket[position]);
            for &next in &successors[position] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if sorted.len() < bucket.len() {
            // Unsorted nodes also include those only downstream of a cycle.
            let members = (0..bucket.len())
                .filter(|&p| in_degree[p] > 0 && on_cycle(p, &successors))
                .map(|p| candidates[bucket[p]].interceptor.id().to_string())
                .collect();
            let phase_name = self
                .phases
                .get(phase)
                .map(|p| p.name().to_string())
                .unwrap_or_default();
            return Err(PipelineError::ordering_cycle(phase_name, members));
        }

        Ok(sorted)
    }

    // Cross-phase constraints are satisfied by phase order or not at all.
    fn check_cross_phase(&self, candidates: &[Candidate]) {
        let phase_of: HashMap<&str, usize> = candidates
            .iter()
            .map(|c| (c.interceptor.id(), c.phase))
            .collect();
        let target_phase = |target: &str| {
            phase_of
                .get(target)
                .copied()
                .or_else(|| self.phases.index_of(target))
        };

        for candidate in candidates {
            let descriptor = candidate.interceptor.descriptor();
            let violated_before = descriptor
                .before_ids()
                .iter()
                .filter(|t| target_phase(t).is_some_and(|p| p < candidate.phase));
            let violated_after = descriptor
                .after_ids()
                .iter()
                .filter(|t| target_phase(t).is_some_and(|p| p > candidate.phase));

            for target in violated_before.chain(violated_after) {
                warn!(
                    interceptor = descriptor.id(),
                    phase = descriptor.phase(),
                    target = target.as_str(),
                    "Ordering constraint contradicted by phase order; phase order wins"
                );
            }
        }
    }
}

fn on_cycle(start: usize, successors: &[BTreeSet<usize>]) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = successors[start].iter().copied().collect();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if seen.insert(node) {
            stack.extend(successors[node].iter().copied());
        }
    }
    false
}
