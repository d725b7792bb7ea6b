//! Phases and phase lists.
//!
//! A [`Phase`] is a named ordering bucket. A [`PhaseList`] is the immutable,
//! totally ordered sequence of phases for one direction; the
//! [`PhaseManager`] owns the inbound and outbound lists of a bus.

use crate::error::{PipelineError, PipelineResult};
use crate::provider::Flow;
use phasebus_core::phases;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A named phase with its ordering priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Phase {
    name: String,
    priority: usize,
}

impl Phase {
    /// Creates a phase.
    pub fn new(name: impl Into<String>, priority: usize) -> Self {
        Self {
            name: name.into(),
            priority,
        }
    }

    /// Returns the phase name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordering priority.
    #[must_use]
    pub const fn priority(&self) -> usize {
        self.priority
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An immutable, ordered list of phases.
///
/// Cloning shares the underlying list.
///
/// ```
/// use phasebus_pipeline::PhaseList;
///
/// let phases = PhaseList::from_names(&["receive", "unmarshal", "invoke"]).unwrap();
/// assert_eq!(phases.index_of("unmarshal"), Some(1));
/// assert!(PhaseList::from_names(&["a", "a"]).is_err());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct PhaseList {
    phases: Arc<[Phase]>,
}

impl PhaseList {
    /// Creates a list from phases in execution order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidPhaseOrder`] if the list is empty or
    /// priorities are not strictly increasing, and
    /// [`PipelineError::DuplicatePhase`] if a name repeats.
    pub fn new(phases: Vec<Phase>) -> PipelineResult<Self> {
        if phases.is_empty() {
            return Err(PipelineError::invalid_phase_order("phase list is empty"));
        }

        let mut names = HashSet::with_capacity(phases.len());
        for phase in &phases {
            if phase.name.is_empty() {
                return Err(PipelineError::invalid_phase_order("phase name is empty"));
            }
            if !names.insert(phase.name.as_str()) {
                return Err(PipelineError::DuplicatePhase {
                    phase: phase.name.clone(),
                });
            }
        }

        if let Some(pair) = phases.windows(2).find(|pair| pair[0].priority >= pair[1].priority) {
            return Err(PipelineError::invalid_phase_order(format!(
                "'{}' ({}) must have a higher priority than '{}' ({})",
                pair[1].name, pair[1].priority, pair[0].name, pair[0].priority
            )));
        }

        Ok(Self {
            phases: phases.into(),
        })
    }

    /// Creates a list from names, using list position as priority.
    ///
    /// # Errors
    ///
    /// Same as [`PhaseList::new`].
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> PipelineResult<Self> {
        Self::new(
            names
                .iter()
                .enumerate()
                .map(|(priority, name)| Phase::new(name.as_ref(), priority))
                .collect(),
        )
    }

    // Only for the compiled-in lists, whose names are unique.
    fn builtin(names: &[&str]) -> Self {
        Self {
            phases: names
                .iter()
                .enumerate()
                .map(|(priority, name)| Phase::new(*name, priority))
                .collect(),
        }
    }

    /// Returns the position of the phase named `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|phase| phase.name == name)
    }

    /// Returns the phase at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    /// Returns the number of phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always `false`; a list holds at least one phase.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Iterates phases in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Phase> {
        self.phases.iter()
    }

    /// Returns the phase names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.phases.iter().map(Phase::name).collect()
    }
}

impl fmt::Debug for PhaseList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// The inbound and outbound phase lists of a bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseManager {
    inbound: PhaseList,
    outbound: PhaseList,
}

impl PhaseManager {
    /// Creates a manager from two lists.
    #[must_use]
    pub const fn new(inbound: PhaseList, outbound: PhaseList) -> Self {
        Self { inbound, outbound }
    }

    /// Creates a manager from phase names.
    ///
    /// # Errors
    ///
    /// Returns an error if either list is invalid.
    pub fn from_names<S: AsRef<str>>(inbound: &[S], outbound: &[S]) -> PipelineResult<Self> {
        Ok(Self::new(
            PhaseList::from_names(inbound)?,
            PhaseList::from_names(outbound)?,
        ))
    }

    /// Returns the inbound list.
    #[must_use]
    pub const fn inbound(&self) -> &PhaseList {
        &self.inbound
    }

    /// Returns the outbound list.
    #[must_use]
    pub const fn outbound(&self) -> &PhaseList {
        &self.outbound
    }

    /// Returns the list chains of `flow` are resolved against. Fault flows
    /// reuse the list of their direction.
    #[must_use]
    pub const fn phases_for(&self, flow: Flow) -> &PhaseList {
        match flow {
            Flow::In | Flow::InFault => &self.inbound,
            Flow::Out | Flow::OutFault => &self.outbound,
        }
    }
}

impl Default for PhaseManager {
    fn default() -> Self {
        Self::new(
            PhaseList::builtin(phases::DEFAULT_INBOUND),
            PhaseList::builtin(phases::DEFAULT_OUTBOUND),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_must_increase() {
        let result = PhaseList::new(vec![Phase::new("read", 5), Phase::new("write", 5)]);
        assert!(matches!(result, Err(PipelineError::InvalidPhaseOrder { .. })));

        let list = PhaseList::new(vec![Phase::new("read", 5), Phase::new("write", 10)]).unwrap();
        assert_eq!(list.get(1).map(Phase::priority), Some(10));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = PhaseList::from_names(&["send", "marshal", "send"]);
        assert_eq!(
            result,
            Err(PipelineError::DuplicatePhase {
                phase: "send".to_string()
            })
        );
    }

    #[test]
    fn test_empty_rejected() {
        let names: [&str; 0] = [];
        assert!(PhaseList::from_names(&names).is_err());
        assert!(PhaseList::from_names(&["ok", ""]).is_err());
    }

    #[test]
    fn test_default_manager_matches_core_lists() {
        let manager = PhaseManager::default();
        assert_eq!(manager.inbound().names(), phases::DEFAULT_INBOUND.to_vec());
        assert_eq!(manager.outbound().names(), phases::DEFAULT_OUTBOUND.to_vec());
        assert_eq!(
            PhaseList::from_names(phases::DEFAULT_INBOUND).as_ref(),
            Ok(manager.inbound())
        );
    }

    #[test]
    fn test_fault_flows_reuse_direction_lists() {
        let manager = PhaseManager::default();
        assert_eq!(manager.phases_for(Flow::OutFault), manager.outbound());
        assert_eq!(manager.phases_for(Flow::InFault), manager.inbound());
        assert_eq!(manager.phases_for(Flow::In).index_of(phases::INVOKE), Some(9));
    }

    #[test]
    fn test_debug_lists_names() {
        let list = PhaseList::from_names(&["a", "b"]).unwrap();
        assert_eq!(format!("{list:?}"), r#"["a", "b"]"#);
    }
}
