// SPDX-License-Identifier: MIT OR Apache-2.0

//! The behavior tree the evaluator walks.
//!
//! Trees are arena-allocated: a [`Model`] owns flat vectors of behaviors and
//! nodes, and everything else refers to them through [`BehaviorId`] and
//! [`NodeId`] indices. The tree itself is immutable during evaluation; all
//! per-run results live in the evaluation context, never on the nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::AttributeValue;
use crate::core::time::Time;

/// Index of a behavior in the model arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BehaviorId(pub usize);

/// Index of a node in the model arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// One parsed model: a root behavior plus the arenas its tree lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub namespace: String,
    behaviors: Vec<Behavior>,
    nodes: Vec<Node>,
    root: Option<BehaviorId>,
}

impl Model {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            behaviors: Vec::new(),
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn add_behavior(&mut self, behavior: Behavior) -> BehaviorId {
        let id = BehaviorId(self.behaviors.len());
        self.behaviors.push(behavior);
        id
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn set_root(&mut self, root: BehaviorId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> EngineResult<BehaviorId> {
        self.root
            .ok_or_else(|| EngineError::model(format!("model '{}' has no root behavior", self.name)))
    }

    pub fn behavior(&self, id: BehaviorId) -> &Behavior {
        &self.behaviors[id.0]
    }

    pub fn behavior_mut(&mut self, id: BehaviorId) -> &mut Behavior {
        &mut self.behaviors[id.0]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn behaviors(&self) -> &[Behavior] {
        &self.behaviors
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// An ordered sibling list evaluated left to right, with an optional
/// behavior-level constraint applied to the accumulated result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Behavior {
    pub name: String,
    pub namespace: String,
    pub children: Vec<NodeId>,
    pub constraint: Option<Constraint>,
}

impl Behavior {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            children: Vec::new(),
            constraint: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub namespace: String,
    pub kind: NodeKind,
    /// Operator time-window constraint, e.g. the delta on `~>` or `olap`.
    pub op_constraint: Option<OpConstraint>,
    /// Name was generated by the tree builder; labeled reporting skips it.
    pub anonymous: bool,
}

impl Node {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            kind,
            op_constraint: None,
            anonymous: false,
        }
    }

    pub fn with_op_constraint(mut self, constraint: OpConstraint) -> Self {
        self.op_constraint = Some(constraint);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    /// The behavior's top-level filter; establishes the candidate population
    /// and a fresh correlation epoch.
    Qualifier,
    State,
    Logical(LogicalOp),
    LeadsTo,
    Always,
    Interval(IntervalOp),
    /// A nested behavior evaluated in place.
    Behavior(BehaviorId),
    /// A back-reference to an enclosing behavior; evaluated with the
    /// qualifier step suppressed, since the ancestor already established it.
    Recursion(BehaviorId),
    /// Reporting marker, transparent to evaluation.
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
    Not,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Xor => "xor",
            LogicalOp::Not => "not",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalOp {
    Overlap,
    StartsWith,
    EndsWith,
    During,
    Equals,
}

impl fmt::Display for IntervalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntervalOp::Overlap => "olap",
            IntervalOp::StartsWith => "sw",
            IntervalOp::EndsWith => "ew",
            IntervalOp::During => "dur",
            IntervalOp::Equals => "eq",
        })
    }
}

/// Classification of one declared state attribute, produced once at parse
/// time. The evaluator never re-sniffs strings to decide what an attribute
/// expression means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeExpr {
    /// Glob pattern match (`*` alone is the pure wildcard).
    Glob(String),
    /// Negated glob pattern.
    NotGlob(String),
    Constant(AttributeValue),
    NotConstant(AttributeValue),
    /// Value bound from the current data record at resolution time.
    Independent,
    /// Reference to another state's bound value, by fully-qualified
    /// `namespace.state.attr` key.
    Dependent(String),
}

impl AttributeExpr {
    pub fn is_dependent(&self) -> bool {
        matches!(self, AttributeExpr::Dependent(_))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, AttributeExpr::Glob(p) if p == "*")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    pub fn parse(text: &str) -> EngineResult<Self> {
        match text {
            "=" | "==" => Ok(RelOp::Eq),
            "!=" => Ok(RelOp::Ne),
            "<" => Ok(RelOp::Lt),
            "<=" => Ok(RelOp::Le),
            ">" => Ok(RelOp::Gt),
            ">=" => Ok(RelOp::Ge),
            other => Err(EngineError::syntax(format!("invalid relational operator '{other}'"))),
        }
    }

    pub fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            RelOp::Eq => left == right,
            RelOp::Ne => left != right,
            RelOp::Lt => left < right,
            RelOp::Le => left <= right,
            RelOp::Gt => left > right,
            RelOp::Ge => left >= right,
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelOp::Eq => "=",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        })
    }
}

/// Quantitative constraint keys. `Limit` and `EventNo` are the internal
/// windowing keys spelled `_limit` and `_eventno` in scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKey {
    Bcount,
    Icount,
    At,
    End,
    Duration,
    Rate,
    Limit,
    EventNo,
}

impl ConstraintKey {
    pub fn parse(text: &str) -> EngineResult<Self> {
        match text {
            "bcount" => Ok(ConstraintKey::Bcount),
            "icount" => Ok(ConstraintKey::Icount),
            "at" => Ok(ConstraintKey::At),
            "end" => Ok(ConstraintKey::End),
            "duration" => Ok(ConstraintKey::Duration),
            "rate" => Ok(ConstraintKey::Rate),
            "_limit" => Ok(ConstraintKey::Limit),
            "_eventno" => Ok(ConstraintKey::EventNo),
            other => Err(EngineError::syntax(format!("invalid constraint key '{other}'"))),
        }
    }
}

impl fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintKey::Bcount => "bcount",
            ConstraintKey::Icount => "icount",
            ConstraintKey::At => "at",
            ConstraintKey::End => "end",
            ConstraintKey::Duration => "duration",
            ConstraintKey::Rate => "rate",
            ConstraintKey::Limit => "_limit",
            ConstraintKey::EventNo => "_eventno",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstraintValue {
    Int(i64),
    Float(f64),
    /// `lower:upper`, inclusive on both ends; only valid with `=`.
    Range(i64, i64),
}

impl ConstraintValue {
    pub fn as_i64(&self) -> EngineResult<i64> {
        match self {
            ConstraintValue::Int(v) => Ok(*v),
            ConstraintValue::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            other => Err(EngineError::constraint(format!(
                "expected integer constraint value, got {other:?}"
            ))),
        }
    }

    pub fn as_f64(&self) -> EngineResult<f64> {
        match self {
            ConstraintValue::Int(v) => Ok(*v as f64),
            ConstraintValue::Float(v) => Ok(*v),
            other => Err(EngineError::constraint(format!(
                "expected scalar constraint value, got {other:?}"
            ))),
        }
    }
}

/// A quantitative constraint attached to a state, behavior, or summary.
///
/// `apply` selects partition mode for `bcount`: instead of filtering
/// candidate instances, the constraint regroups the children inside one
/// instance. The parser sets it for behavior-level partition constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub key: ConstraintKey,
    pub relop: RelOp,
    pub value: ConstraintValue,
    pub apply: bool,
}

impl Constraint {
    pub fn new(key: ConstraintKey, relop: RelOp, value: ConstraintValue) -> Self {
        Self {
            key,
            relop,
            value,
            apply: false,
        }
    }

    pub fn applied(mut self) -> Self {
        self.apply = true;
        self
    }
}

/// Operator time-window constraint: a relation and a time delta, e.g.
/// `~> [<= 2 secs]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpConstraint {
    pub relop: RelOp,
    pub delta: Time,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_wiring() {
        let mut model = Model::new("portscan", "net");
        let b = model.add_behavior(Behavior::new("b_scan", "net"));
        let q = model.add_node(Node::new("s_tcp", "net", NodeKind::Qualifier));
        let op = model.add_node(Node::new("op1", "net", NodeKind::LeadsTo));
        let s = model.add_node(Node::new("s_ack", "net", NodeKind::State));
        model.behaviors[b.0].children = vec![q, op, s];
        model.set_root(b);

        assert_eq!(model.root().unwrap(), b);
        assert_eq!(model.behavior(b).children.len(), 3);
        assert!(matches!(model.node(op).kind, NodeKind::LeadsTo));
    }

    #[test]
    fn relop_parse_and_compare() {
        assert_eq!(RelOp::parse(">=").unwrap(), RelOp::Ge);
        assert!(RelOp::Ge.holds(3, 3));
        assert!(RelOp::Lt.holds(2, 3));
        assert!(!RelOp::Ne.holds(5, 5));
        assert!(RelOp::parse("<>").is_err());
    }

    #[test]
    fn constraint_value_coercions() {
        assert_eq!(ConstraintValue::Int(5).as_i64().unwrap(), 5);
        assert_eq!(ConstraintValue::Float(2.5).as_f64().unwrap(), 2.5);
        assert!(ConstraintValue::Range(5, 10).as_i64().is_err());
    }
}
