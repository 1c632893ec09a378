//! Logical composition of conditions into AND/OR trees.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::Condition;

/// Combinator applied to a group's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Every child must be satisfied. An empty group is satisfied.
    All,
    /// At least one child must be satisfied. An empty group is not.
    Any,
}

/// How a task-supplied structure is reconciled into the live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateMode {
    /// Converge on the supplied structure: add what is missing, remove what
    /// is no longer supplied, keep matched children untouched.
    Sync,
    /// Only add children that are missing.
    AddOnly,
    /// Only remove children that are no longer supplied.
    RemoveOnly,
}

/// One slot in a logical group.
#[derive(Clone)]
pub enum Node {
    Leaf(Box<dyn Condition>),
    Group(LogicalCondition),
}

impl Node {
    fn is_satisfied(&self) -> bool {
        match self {
            Node::Leaf(c) => c.is_satisfied(),
            Node::Group(g) => g.is_satisfied(),
        }
    }

    fn progress_percent(&self) -> f64 {
        match self {
            Node::Leaf(c) => c.progress_percent(),
            Node::Group(g) => g.progress_percent(),
        }
    }

    fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Node::Leaf(c) => c.current_trigger_time(),
            Node::Group(g) => g.current_trigger_time(),
        }
    }

    fn can_trigger_again(&self) -> bool {
        match self {
            Node::Leaf(c) => c.can_trigger_again(),
            Node::Group(g) => g.can_trigger_again(),
        }
    }

    /// Matching key for watchdog reconciliation. Leaves match on condition
    /// identity; groups match on their whole (order-insensitive) shape.
    fn signature(&self) -> String {
        match self {
            Node::Leaf(c) => c.identity(),
            Node::Group(g) => g.signature(),
        }
    }
}

/// A tree of conditions combined with [`Operator::All`] / [`Operator::Any`].
///
/// The tree owns its leaves. Structural edits (`sync_with`, `merge_add`,
/// `merge_remove`) match children by signature and never touch the internal
/// state of a child that survives the edit.
#[derive(Clone)]
pub struct LogicalCondition {
    op: Operator,
    children: Vec<Node>,
}

impl LogicalCondition {
    pub fn new(op: Operator) -> Self {
        Self { op, children: Vec::new() }
    }

    pub fn all() -> Self {
        Self::new(Operator::All)
    }

    pub fn any() -> Self {
        Self::new(Operator::Any)
    }

    /// Single-condition group, the common construction shorthand.
    pub fn of(op: Operator, condition: Box<dyn Condition>) -> Self {
        let mut group = Self::new(op);
        group.add_condition(condition);
        group
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn add_condition(&mut self, condition: Box<dyn Condition>) {
        self.children.push(Node::Leaf(condition));
    }

    pub fn add_group(&mut self, group: LogicalCondition) {
        self.children.push(Node::Group(group));
    }

    pub fn with_condition(mut self, condition: Box<dyn Condition>) -> Self {
        self.add_condition(condition);
        self
    }

    /// Number of leaves anywhere in the tree.
    pub fn leaf_count(&self) -> usize {
        self.children
            .iter()
            .map(|n| match n {
                Node::Leaf(_) => 1,
                Node::Group(g) => g.leaf_count(),
            })
            .sum()
    }

    /// Number of leaves that are currently satisfied.
    pub fn satisfied_leaf_count(&self) -> usize {
        self.children
            .iter()
            .map(|n| match n {
                Node::Leaf(c) => usize::from(c.is_satisfied()),
                Node::Group(g) => g.satisfied_leaf_count(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    pub fn is_satisfied(&self) -> bool {
        match self.op {
            Operator::All => self.children.iter().all(Node::is_satisfied),
            Operator::Any => self.children.iter().any(Node::is_satisfied),
        }
    }

    /// Aggregate progress: ALL reports its least-advanced child, ANY its
    /// most-advanced.
    pub fn progress_percent(&self) -> f64 {
        let progress = self.children.iter().map(Node::progress_percent);
        match self.op {
            Operator::All => progress.fold(None, |acc: Option<f64>, p| {
                Some(acc.map_or(p, |a| a.min(p)))
            }),
            Operator::Any => progress.fold(None, |acc: Option<f64>, p| {
                Some(acc.map_or(p, |a| a.max(p)))
            }),
        }
        .unwrap_or(if self.op == Operator::All { 100.0 } else { 0.0 })
    }

    /// Aggregate trigger forecast: ALL takes the earliest child forecast,
    /// ANY the latest. Children without a forecast are ignored.
    pub fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        let times = self.children.iter().filter_map(Node::current_trigger_time);
        match self.op {
            Operator::All => times.min(),
            Operator::Any => times.max(),
        }
    }

    pub fn can_trigger_again(&self) -> bool {
        if self.children.is_empty() {
            return true;
        }
        match self.op {
            Operator::All => self.children.iter().all(Node::can_trigger_again),
            Operator::Any => self.children.iter().any(Node::can_trigger_again),
        }
    }

    pub fn has_one_time(&self) -> bool {
        self.children.iter().any(|n| match n {
            Node::Leaf(c) => c.is_one_time(),
            Node::Group(g) => g.has_one_time(),
        })
    }

    /// Whether any one-time leaf has already been consumed.
    pub fn has_triggered_one_time(&self) -> bool {
        self.children.iter().any(|n| match n {
            Node::Leaf(c) => c.is_one_time() && !c.can_trigger_again(),
            Node::Group(g) => g.has_triggered_one_time(),
        })
    }

    pub fn contains_identity(&self, identity: &str) -> bool {
        self.children.iter().any(|n| match n {
            Node::Leaf(c) => c.identity() == identity,
            Node::Group(g) => g.contains_identity(identity),
        })
    }

    /// Remove every leaf with the given identity, anywhere in the tree.
    pub fn remove_by_identity(&mut self, identity: &str) -> bool {
        let before = self.leaf_count();
        self.children.retain_mut(|n| match n {
            Node::Leaf(c) => c.identity() != identity,
            Node::Group(g) => {
                g.remove_by_identity(identity);
                true
            }
        });
        self.leaf_count() != before
    }

    pub fn reset(&mut self) {
        for node in &mut self.children {
            match node {
                Node::Leaf(c) => c.reset(),
                Node::Group(g) => g.reset(),
            }
        }
    }

    pub fn hard_reset(&mut self) {
        for node in &mut self.children {
            match node {
                Node::Leaf(c) => c.hard_reset(),
                Node::Group(g) => g.hard_reset(),
            }
        }
    }

    pub fn shift_by(&mut self, delta: TimeDelta) {
        for node in &mut self.children {
            match node {
                Node::Leaf(c) => c.shift_by(delta),
                Node::Group(g) => g.shift_by(delta),
            }
        }
    }

    pub fn has_only_time_conditions(&self) -> bool {
        self.children.iter().all(|n| match n {
            Node::Leaf(c) => c.is_time_based(),
            Node::Group(g) => g.has_only_time_conditions(),
        })
    }

    /// Projection keeping only the time-based leaves, for schedule forecasts
    /// that must ignore task state.
    pub fn time_only(&self) -> LogicalCondition {
        let mut out = LogicalCondition::new(self.op);
        for node in &self.children {
            match node {
                Node::Leaf(c) if c.is_time_based() => out.children.push(Node::Leaf(c.clone())),
                Node::Leaf(_) => {}
                Node::Group(g) => {
                    let projected = g.time_only();
                    if !projected.is_empty() {
                        out.children.push(Node::Group(projected));
                    }
                }
            }
        }
        out
    }

    /// Order-insensitive structural fingerprint of the whole tree.
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self.children.iter().map(Node::signature).collect();
        parts.sort();
        let tag = match self.op {
            Operator::All => "ALL",
            Operator::Any => "ANY",
        };
        format!("{tag}({})", parts.join(","))
    }

    /// Multi-line human-readable rendering with satisfaction markers.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, 0);
        out
    }

    fn describe_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let tag = match self.op {
            Operator::All => "ALL",
            Operator::Any => "ANY",
        };
        let mark = if self.is_satisfied() { "✓" } else { " " };
        out.push_str(&format!("{indent}{tag} [{mark}]\n"));
        for node in &self.children {
            match node {
                Node::Leaf(c) => {
                    let mark = if c.is_satisfied() { "✓" } else { " " };
                    out.push_str(&format!("{indent}  {} [{mark}]\n", c.description()));
                }
                Node::Group(g) => g.describe_into(out, depth + 1),
            }
        }
    }

    /// Report structural problems without fixing them.
    pub fn validate_structure(&self) -> Vec<String> {
        let mut issues = Vec::new();
        self.validate_into(&mut issues, 0);
        issues
    }

    fn validate_into(&self, issues: &mut Vec<String>, depth: usize) {
        if depth > 16 {
            issues.push(format!("group nesting exceeds depth 16 at {}", self.signature()));
            return;
        }
        for node in &self.children {
            if let Node::Group(g) = node {
                if g.children.is_empty() {
                    issues.push(format!("empty group inside {}", self.signature()));
                }
                g.validate_into(issues, depth + 1);
            }
        }
    }

    /// Remove empty child groups and splice same-operator child groups into
    /// their parent. Returns whether anything changed.
    pub fn optimize_structure(&mut self) -> bool {
        let mut changed = false;
        for node in &mut self.children {
            if let Node::Group(g) = node {
                changed |= g.optimize_structure();
            }
        }
        let op = self.op;
        let mut rebuilt: Vec<Node> = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                Node::Group(g) if g.children.is_empty() => changed = true,
                Node::Group(g) if g.op == op => {
                    changed = true;
                    rebuilt.extend(g.children);
                }
                other => rebuilt.push(other),
            }
        }
        self.children = rebuilt;
        changed
    }

    fn signature_count(&self, signature: &str) -> usize {
        self.children.iter().filter(|n| n.signature() == signature).count()
    }

    /// Add top-level children present in `incoming` but missing here.
    /// Matching is by signature with multiplicity.
    pub fn merge_add(&mut self, incoming: &LogicalCondition) -> bool {
        let mut changed = false;
        for node in &incoming.children {
            let sig = node.signature();
            if self.signature_count(&sig) < incoming.signature_count(&sig) {
                self.children.push(node.clone());
                changed = true;
            }
        }
        changed
    }

    /// Drop top-level children no longer present in `incoming`. Surviving
    /// children keep their state; dropped children lose theirs.
    pub fn merge_remove(&mut self, incoming: &LogicalCondition) -> bool {
        let before = self.children.len();
        let mut kept_per_sig: std::collections::HashMap<String, usize> = Default::default();
        self.children.retain(|n| {
            let sig = n.signature();
            let kept = kept_per_sig.entry(sig.clone()).or_insert(0);
            if *kept < incoming.signature_count(&sig) {
                *kept += 1;
                true
            } else {
                false
            }
        });
        self.children.len() != before
    }

    /// Converge on `incoming`'s structure while preserving the state of
    /// every matched child. Idempotent.
    pub fn sync_with(&mut self, incoming: &LogicalCondition) -> bool {
        let mut changed = false;
        if self.op != incoming.op {
            self.op = incoming.op;
            changed = true;
        }
        changed |= self.merge_remove(incoming);
        changed |= self.merge_add(incoming);
        changed
    }
}

impl std::fmt::Debug for LogicalCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LogicalCondition({})", self.signature())
    }
}
