//! Mutation plans: the ordered add/remove steps a resolution produces.
//!
//! Planners never touch the membership authority. They return a
//! [`MutationPlan`] that the [`MutationExecutor`](crate::executor::MutationExecutor)
//! applies step by step.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::marker::MarkerKey;

/// Direction of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Add,
    Remove,
}

impl std::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// A single marker mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mutation {
    pub op: MutationOp,
    pub marker: MarkerKey,
}

/// Ordered add/remove steps: adds first, then removes, each in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationPlan {
    steps: Vec<Mutation>,
}

impl MutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// The plan that turns `before` into `after`.
    pub fn between(before: &BTreeSet<MarkerKey>, after: &BTreeSet<MarkerKey>) -> Self {
        let mut plan = Self::new();
        for marker in after.difference(before) {
            plan.push_add(*marker);
        }
        for marker in before.difference(after) {
            plan.push_remove(*marker);
        }
        plan
    }

    /// Append an add step. A marker already added is not added twice.
    pub fn push_add(&mut self, marker: MarkerKey) {
        self.push(Mutation {
            op: MutationOp::Add,
            marker,
        });
    }

    /// Append a remove step. A marker already removed is not removed twice.
    pub fn push_remove(&mut self, marker: MarkerKey) {
        self.push(Mutation {
            op: MutationOp::Remove,
            marker,
        });
    }

    fn push(&mut self, step: Mutation) {
        if !self.steps.contains(&step) {
            self.steps.push(step);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[Mutation] {
        &self.steps
    }

    /// Markers this plan adds, in plan order.
    pub fn adds(&self) -> impl Iterator<Item = MarkerKey> + '_ {
        self.steps
            .iter()
            .filter(|s| s.op == MutationOp::Add)
            .map(|s| s.marker)
    }

    /// Markers this plan removes, in plan order.
    pub fn removes(&self) -> impl Iterator<Item = MarkerKey> + '_ {
        self.steps
            .iter()
            .filter(|s| s.op == MutationOp::Remove)
            .map(|s| s.marker)
    }

    pub fn adds_marker(&self, marker: MarkerKey) -> bool {
        self.adds().any(|m| m == marker)
    }

    /// The marker set that results from applying this plan to `current`.
    pub fn apply(&self, current: &BTreeSet<MarkerKey>) -> BTreeSet<MarkerKey> {
        let mut next = current.clone();
        for step in &self.steps {
            match step.op {
                MutationOp::Add => {
                    next.insert(step.marker);
                }
                MutationOp::Remove => {
                    next.remove(&step.marker);
                }
            }
        }
        next
    }
}

impl std::fmt::Display for MutationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "(no changes)");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            let sign = match step.op {
                MutationOp::Add => '+',
                MutationOp::Remove => '-',
            };
            write!(f, "{sign}{}", step.marker)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a MutationPlan {
    type Item = &'a Mutation;
    type IntoIter = std::slice::Iter<'a, Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
