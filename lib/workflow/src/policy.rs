//! Policy checker: decides whether a proposed node or edge relation is
//! admissible under the endpoint tasks' constraint records.
//!
//! Both checks are pure: they consult constraint records and return either
//! admission or a [`PolicyViolation`] carrying the offending ids, the
//! direction, and the policy that rejected the candidate.

use crate::error::PolicyViolation;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The node relation being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeDirection {
    /// Is `b` admissible as a next node of `a`? Consults `a`'s next-node rule.
    Next,
    /// Is `a` admissible as a previous node of `b`? Consults `b`'s
    /// previous-node rule.
    Previous,
}

impl fmt::Display for NodeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => write!(f, "next"),
            Self::Previous => write!(f, "previous"),
        }
    }
}

/// The edge relation being checked for a candidate edge `a -> b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// Consults `a`'s outgoing-edge rule.
    Outgoing,
    /// Consults `b`'s incoming-edge rule.
    Incoming,
}

impl fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outgoing => write!(f, "outgoing"),
            Self::Incoming => write!(f, "incoming"),
        }
    }
}

/// Checks whether the node relation between `a` and `b` is admissible.
///
/// # Errors
///
/// Returns a [`PolicyViolation`] if the consulted rule rejects the candidate.
pub fn check_node_policy(
    a: &Task,
    b: &Task,
    direction: NodeDirection,
) -> Result<(), PolicyViolation> {
    let (owner, candidate, rule) = match direction {
        NodeDirection::Next => (a, b, a.constraints().next_nodes()),
        NodeDirection::Previous => (b, a, b.constraints().previous_nodes()),
    };

    if rule.admits(candidate.id()) {
        Ok(())
    } else {
        Err(PolicyViolation::NodeRejected {
            owner: owner.id().clone(),
            candidate: candidate.id().clone(),
            direction,
            policy: rule.policy(),
        })
    }
}

/// Checks whether the candidate edge `a -> b` is admissible in the given
/// direction.
///
/// # Errors
///
/// Returns a [`PolicyViolation`] if the consulted rule rejects the edge.
pub fn check_edge_policy(
    a: &Task,
    b: &Task,
    direction: EdgeDirection,
) -> Result<(), PolicyViolation> {
    let (owner, rule) = match direction {
        EdgeDirection::Outgoing => (a, a.constraints().outgoing_edges()),
        EdgeDirection::Incoming => (b, b.constraints().incoming_edges()),
    };

    if rule.admits(a.id(), b.id()) {
        Ok(())
    } else {
        Err(PolicyViolation::EdgeRejected {
            src: a.id().clone(),
            dst: b.id().clone(),
            owner: owner.id().clone(),
            direction,
            policy: rule.policy(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{EdgeRule, NodeRule, Policy, TaskConstraints};

    fn task(id: &str) -> Task {
        Task::from_fn(id, |_| Ok(None)).unwrap()
    }

    fn task_with(id: &str, constraints: TaskConstraints) -> Task {
        task(id).with_constraints(constraints)
    }

    fn constraints(
        next: NodeRule,
        previous: NodeRule,
        incoming: EdgeRule,
        outgoing: EdgeRule,
    ) -> TaskConstraints {
        TaskConstraints::new(None, next, previous, incoming, outgoing).unwrap()
    }

    #[test]
    fn allow_all_admits_any_node() {
        let a = task("A");
        let b = task("B");
        assert!(check_node_policy(&a, &b, NodeDirection::Next).is_ok());
        assert!(check_node_policy(&a, &b, NodeDirection::Previous).is_ok());
    }

    #[test]
    fn allow_none_rejects_next_nodes() {
        let a = task_with(
            "A",
            constraints(
                NodeRule::allow_none(),
                NodeRule::allow_all(),
                EdgeRule::allow_all(),
                EdgeRule::allow_all(),
            ),
        );
        let b = task("B");

        let err = check_node_policy(&a, &b, NodeDirection::Next).unwrap_err();
        match err {
            PolicyViolation::NodeRejected {
                owner,
                candidate,
                direction,
                policy,
            } => {
                assert_eq!(owner.as_str(), "A");
                assert_eq!(candidate.as_str(), "B");
                assert_eq!(direction, NodeDirection::Next);
                assert_eq!(policy, Policy::AllowNone);
            }
            PolicyViolation::EdgeRejected { .. } => panic!("expected node rejection"),
        }
    }

    #[test]
    fn previous_direction_consults_target_rule() {
        // B only accepts X as a predecessor; A is rejected.
        let a = task("A");
        let b = task_with(
            "B",
            constraints(
                NodeRule::allow_all(),
                NodeRule::custom(["X"]),
                EdgeRule::allow_all(),
                EdgeRule::allow_all(),
            ),
        );

        assert!(check_node_policy(&a, &b, NodeDirection::Next).is_ok());
        let err = check_node_policy(&a, &b, NodeDirection::Previous).unwrap_err();
        match err {
            PolicyViolation::NodeRejected { owner, candidate, .. } => {
                assert_eq!(owner.as_str(), "B");
                assert_eq!(candidate.as_str(), "A");
            }
            PolicyViolation::EdgeRejected { .. } => panic!("expected node rejection"),
        }
    }

    #[test]
    fn custom_next_nodes_admit_listed_candidates() {
        let a = task_with(
            "BranchTask",
            constraints(
                NodeRule::custom(["BranchA", "BranchB"]),
                NodeRule::allow_all(),
                EdgeRule::allow_all(),
                EdgeRule::allow_all(),
            ),
        );

        assert!(check_node_policy(&a, &task("BranchA"), NodeDirection::Next).is_ok());
        assert!(check_node_policy(&a, &task("BranchC"), NodeDirection::Next).is_err());
    }

    #[test]
    fn custom_outgoing_edges_check_pair_membership() {
        let a = task_with(
            "A",
            constraints(
                NodeRule::allow_all(),
                NodeRule::allow_all(),
                EdgeRule::allow_all(),
                EdgeRule::custom([("A", "B")]),
            ),
        );

        assert!(check_edge_policy(&a, &task("B"), EdgeDirection::Outgoing).is_ok());
        let err = check_edge_policy(&a, &task("C"), EdgeDirection::Outgoing).unwrap_err();
        match err {
            PolicyViolation::EdgeRejected {
                src,
                dst,
                owner,
                direction,
                policy,
            } => {
                assert_eq!(src.as_str(), "A");
                assert_eq!(dst.as_str(), "C");
                assert_eq!(owner.as_str(), "A");
                assert_eq!(direction, EdgeDirection::Outgoing);
                assert_eq!(policy, Policy::Custom);
            }
            PolicyViolation::NodeRejected { .. } => panic!("expected edge rejection"),
        }
    }

    #[test]
    fn custom_incoming_edges_consult_target_rule() {
        // Reduce only accepts edges from the map tasks.
        let reduce = task_with(
            "Reduce",
            constraints(
                NodeRule::allow_all(),
                NodeRule::allow_all(),
                EdgeRule::custom([("Map_1", "Reduce"), ("Map_2", "Reduce")]),
                EdgeRule::allow_all(),
            ),
        );

        assert!(check_edge_policy(&task("Map_1"), &reduce, EdgeDirection::Incoming).is_ok());
        assert!(check_edge_policy(&task("Other"), &reduce, EdgeDirection::Incoming).is_err());
    }

    #[test]
    fn allow_none_rejects_edges_in_both_directions() {
        let sealed = task_with(
            "Sealed",
            constraints(
                NodeRule::allow_all(),
                NodeRule::allow_all(),
                EdgeRule::allow_none(),
                EdgeRule::allow_none(),
            ),
        );
        let other = task("Other");

        assert!(check_edge_policy(&sealed, &other, EdgeDirection::Outgoing).is_err());
        assert!(check_edge_policy(&other, &sealed, EdgeDirection::Incoming).is_err());
        // The same edge is fine from the unconstrained endpoint's perspective.
        assert!(check_edge_policy(&other, &sealed, EdgeDirection::Outgoing).is_ok());
    }
}
