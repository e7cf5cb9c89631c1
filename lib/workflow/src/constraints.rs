//! Per-task structural constraints.
//!
//! Every task carries a constraint record that gates how the graph around it
//! may grow, both at static registration and at runtime spawning:
//! - a spawn quota (how many tasks it may spawn while executing)
//! - node policies (which tasks may follow it, which may precede it)
//! - edge policies (which concrete edges may leave it or enter it)
//!
//! Records are validated at construction and read-only afterwards.

use crate::error::ConstraintError;
use serde::{Deserialize, Serialize};
use std::fmt;
use taskloom_core::TaskId;

/// Admission policy for node and edge candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Every candidate is admitted.
    AllowAll,
    /// Every candidate is rejected.
    AllowNone,
    /// Only listed candidates are admitted.
    Custom,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowAll => write!(f, "allow_all"),
            Self::AllowNone => write!(f, "allow_none"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// The constraint field a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintField {
    NextNodes,
    PreviousNodes,
    IncomingEdges,
    OutgoingEdges,
}

impl fmt::Display for ConstraintField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NextNodes => write!(f, "valid_next_nodes"),
            Self::PreviousNodes => write!(f, "valid_previous_nodes"),
            Self::IncomingEdges => write!(f, "valid_incoming_edges"),
            Self::OutgoingEdges => write!(f, "valid_outgoing_edges"),
        }
    }
}

/// A node admission rule: a policy plus the candidate list consulted under
/// `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRule {
    policy: Policy,
    nodes: Vec<TaskId>,
}

impl NodeRule {
    /// A rule admitting every candidate.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            policy: Policy::AllowAll,
            nodes: Vec::new(),
        }
    }

    /// A rule rejecting every candidate.
    #[must_use]
    pub fn allow_none() -> Self {
        Self {
            policy: Policy::AllowNone,
            nodes: Vec::new(),
        }
    }

    /// A rule admitting only the listed tasks.
    #[must_use]
    pub fn custom<I, T>(nodes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        Self {
            policy: Policy::Custom,
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the policy of this rule.
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Returns the candidate list of this rule.
    #[must_use]
    pub fn nodes(&self) -> &[TaskId] {
        &self.nodes
    }

    /// Returns true if the rule admits the candidate task.
    #[must_use]
    pub fn admits(&self, candidate: &TaskId) -> bool {
        match self.policy {
            Policy::AllowAll => true,
            Policy::AllowNone => false,
            Policy::Custom => self.nodes.contains(candidate),
        }
    }

    fn validate(&self, field: ConstraintField) -> Result<(), ConstraintError> {
        match self.policy {
            Policy::AllowNone if !self.nodes.is_empty() => {
                Err(ConstraintError::AllowNoneWithCandidates { field })
            }
            Policy::Custom if self.nodes.is_empty() => {
                Err(ConstraintError::CustomWithoutCandidates { field })
            }
            _ => Ok(()),
        }
    }
}

impl Default for NodeRule {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// An edge admission rule: a policy plus the `(src, dst)` pairs consulted
/// under `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRule {
    policy: Policy,
    edges: Vec<(TaskId, TaskId)>,
}

impl EdgeRule {
    /// A rule admitting every candidate edge.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            policy: Policy::AllowAll,
            edges: Vec::new(),
        }
    }

    /// A rule rejecting every candidate edge.
    #[must_use]
    pub fn allow_none() -> Self {
        Self {
            policy: Policy::AllowNone,
            edges: Vec::new(),
        }
    }

    /// A rule admitting only the listed `(src, dst)` pairs.
    #[must_use]
    pub fn custom<I, S, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<TaskId>,
        D: Into<TaskId>,
    {
        Self {
            policy: Policy::Custom,
            edges: edges
                .into_iter()
                .map(|(src, dst)| (src.into(), dst.into()))
                .collect(),
        }
    }

    /// Returns the policy of this rule.
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Returns the candidate pairs of this rule.
    #[must_use]
    pub fn edges(&self) -> &[(TaskId, TaskId)] {
        &self.edges
    }

    /// Returns true if the rule admits the candidate edge `src -> dst`.
    #[must_use]
    pub fn admits(&self, src: &TaskId, dst: &TaskId) -> bool {
        match self.policy {
            Policy::AllowAll => true,
            Policy::AllowNone => false,
            Policy::Custom => self
                .edges
                .iter()
                .any(|(s, d)| s == src && d == dst),
        }
    }

    fn validate(&self, field: ConstraintField) -> Result<(), ConstraintError> {
        match self.policy {
            Policy::AllowNone if !self.edges.is_empty() => {
                Err(ConstraintError::AllowNoneWithCandidates { field })
            }
            Policy::Custom if self.edges.is_empty() => {
                Err(ConstraintError::CustomWithoutCandidates { field })
            }
            _ => Ok(()),
        }
    }
}

impl Default for EdgeRule {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// Structural constraints attached to a task.
///
/// `max_spawn_count` caps how many tasks this task may spawn while executing
/// (`None` means unlimited). The four rules gate graph growth around the
/// task; see [`crate::policy`] for how they are consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConstraints {
    max_spawn_count: Option<u32>,
    next_nodes: NodeRule,
    previous_nodes: NodeRule,
    incoming_edges: EdgeRule,
    outgoing_edges: EdgeRule,
}

impl TaskConstraints {
    /// Creates a validated constraint record.
    ///
    /// # Errors
    ///
    /// Returns an error if any rule pairs an `allow_none` policy with a
    /// non-empty candidate list, or a `custom` policy with an empty one.
    pub fn new(
        max_spawn_count: Option<u32>,
        next_nodes: NodeRule,
        previous_nodes: NodeRule,
        incoming_edges: EdgeRule,
        outgoing_edges: EdgeRule,
    ) -> Result<Self, ConstraintError> {
        next_nodes.validate(ConstraintField::NextNodes)?;
        previous_nodes.validate(ConstraintField::PreviousNodes)?;
        incoming_edges.validate(ConstraintField::IncomingEdges)?;
        outgoing_edges.validate(ConstraintField::OutgoingEdges)?;

        Ok(Self {
            max_spawn_count,
            next_nodes,
            previous_nodes,
            incoming_edges,
            outgoing_edges,
        })
    }

    /// Returns the spawn quota, if any.
    #[must_use]
    pub fn max_spawn_count(&self) -> Option<u32> {
        self.max_spawn_count
    }

    /// Returns the rule for tasks that may follow this one.
    #[must_use]
    pub fn next_nodes(&self) -> &NodeRule {
        &self.next_nodes
    }

    /// Returns the rule for tasks that may precede this one.
    #[must_use]
    pub fn previous_nodes(&self) -> &NodeRule {
        &self.previous_nodes
    }

    /// Returns the rule for edges entering this task.
    #[must_use]
    pub fn incoming_edges(&self) -> &EdgeRule {
        &self.incoming_edges
    }

    /// Returns the rule for edges leaving this task.
    #[must_use]
    pub fn outgoing_edges(&self) -> &EdgeRule {
        &self.outgoing_edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_constraints_admit_everything() {
        let constraints = TaskConstraints::default();
        assert_eq!(constraints.max_spawn_count(), None);
        assert!(constraints.next_nodes().admits(&TaskId::from("anything")));
        assert!(constraints
            .incoming_edges()
            .admits(&TaskId::from("a"), &TaskId::from("b")));
    }

    #[test]
    fn custom_node_rule_requires_candidates() {
        let result = TaskConstraints::new(
            None,
            NodeRule::custom(Vec::<TaskId>::new()),
            NodeRule::allow_all(),
            EdgeRule::allow_all(),
            EdgeRule::allow_all(),
        );
        assert_eq!(
            result.unwrap_err(),
            ConstraintError::CustomWithoutCandidates {
                field: ConstraintField::NextNodes,
            }
        );
    }

    #[test]
    fn custom_edge_rule_requires_candidates() {
        let result = TaskConstraints::new(
            None,
            NodeRule::allow_all(),
            NodeRule::allow_all(),
            EdgeRule::allow_all(),
            EdgeRule::custom(Vec::<(TaskId, TaskId)>::new()),
        );
        assert_eq!(
            result.unwrap_err(),
            ConstraintError::CustomWithoutCandidates {
                field: ConstraintField::OutgoingEdges,
            }
        );
    }

    #[test]
    fn allow_none_rule_rejects_candidate_list() {
        let rule = NodeRule {
            policy: Policy::AllowNone,
            nodes: vec![TaskId::from("BranchA")],
        };
        let result = TaskConstraints::new(
            None,
            NodeRule::allow_all(),
            rule,
            EdgeRule::allow_all(),
            EdgeRule::allow_all(),
        );
        assert_eq!(
            result.unwrap_err(),
            ConstraintError::AllowNoneWithCandidates {
                field: ConstraintField::PreviousNodes,
            }
        );
    }

    #[test]
    fn node_rule_admission() {
        let rule = NodeRule::custom(["BranchA", "BranchB"]);
        assert!(rule.admits(&TaskId::from("BranchA")));
        assert!(rule.admits(&TaskId::from("BranchB")));
        assert!(!rule.admits(&TaskId::from("BranchC")));

        assert!(NodeRule::allow_all().admits(&TaskId::from("BranchC")));
        assert!(!NodeRule::allow_none().admits(&TaskId::from("BranchC")));
    }

    #[test]
    fn edge_rule_admission() {
        let rule = EdgeRule::custom([("BranchTask", "BranchA"), ("BranchTask", "BranchB")]);
        assert!(rule.admits(&TaskId::from("BranchTask"), &TaskId::from("BranchA")));
        assert!(!rule.admits(&TaskId::from("BranchA"), &TaskId::from("BranchTask")));
        assert!(!rule.admits(&TaskId::from("BranchTask"), &TaskId::from("BranchC")));
    }

    #[test]
    fn spawn_quota_is_recorded() {
        let constraints = TaskConstraints::new(
            Some(8),
            NodeRule::allow_all(),
            NodeRule::allow_all(),
            EdgeRule::allow_all(),
            EdgeRule::allow_all(),
        )
        .unwrap();
        assert_eq!(constraints.max_spawn_count(), Some(8));
    }

    #[test]
    fn constraints_serde_roundtrip() {
        let constraints = TaskConstraints::new(
            Some(1),
            NodeRule::custom(["BranchA"]),
            NodeRule::allow_none(),
            EdgeRule::allow_all(),
            EdgeRule::custom([("BranchTask", "BranchA")]),
        )
        .unwrap();
        let json = serde_json::to_string(&constraints).expect("serialize");
        let parsed: TaskConstraints = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(constraints, parsed);
    }
}
