//! Filter expression tree
//!
//! A closed set of node kinds. Conjunctions and disjunctions are always
//! flattened and hold at least two operands; the combinators below are
//! the only way to build them.
//!
//! `!=` and `IN` are representable on `FilterNode` but are not executable
//! by the store; the normalizer rewrites them into disjunctions.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

use crate::model::Value;

use super::errors::{QueryError, QueryResult};
use super::params::{Bindings, Parameterized, UsedParameters};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
        }
    }

    /// Range operators; at most one property per primitive query may use them
    pub fn is_inequality(&self) -> bool {
        matches!(self, Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge)
    }

    /// Operators the store executes natively
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Operator::Ne | Operator::In)
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "in" => Ok(Operator::In),
            other => Err(QueryError::invalid_argument(format!(
                "Unknown filter operator {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Concrete comparison `property op value`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    name: String,
    op: Operator,
    value: Value,
}

impl FilterNode {
    /// Creates a filter. `IN` requires a list value.
    pub fn new(name: impl Into<String>, op: Operator, value: impl Into<Value>) -> QueryResult<Self> {
        let value = value.into();
        if op == Operator::In && value.as_list().is_none() {
            return Err(QueryError::invalid_argument(format!(
                "IN requires a list of values, not {}",
                value
            )));
        }
        Ok(Self {
            name: name.into(),
            op,
            value,
        })
    }

    fn make(name: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::make(name, Operator::Eq, value)
    }

    pub fn ne(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::make(name, Operator::Ne, value)
    }

    pub fn lt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::make(name, Operator::Lt, value)
    }

    pub fn le(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::make(name, Operator::Le, value)
    }

    pub fn gt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::make(name, Operator::Gt, value)
    }

    pub fn ge(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::make(name, Operator::Ge, value)
    }

    /// `name IN (values...)`
    pub fn is_in<V: Into<Value>>(name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::make(name, Operator::In, Value::List(values))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.op, self.value)
    }
}

/// Comparison whose right-hand side is still a parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    name: String,
    op: Operator,
    param: Parameterized,
}

impl ParameterNode {
    pub fn new(name: impl Into<String>, op: Operator, param: impl Into<Parameterized>) -> Self {
        Self {
            name: name.into(),
            op,
            param: param.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn param(&self) -> &Parameterized {
        &self.param
    }

    /// Binds the parameter, producing a concrete filter
    pub fn resolve(&self, bindings: &Bindings, used: UsedParameters) -> QueryResult<(FilterNode, UsedParameters)> {
        let (value, used) = self.param.resolve(bindings, used)?;
        if self.op == Operator::In && value.as_list().is_none() {
            return Err(QueryError::bad_argument(format!(
                "Expected a list for IN on {}, got {}",
                self.name,
                value.type_name()
            )));
        }
        Ok((FilterNode::make(self.name.clone(), self.op, value), used))
    }
}

impl fmt::Display for ParameterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.op, self.param)
    }
}

/// Predicate the store cannot express exactly; re-checked on each record
#[derive(Debug, Clone, PartialEq)]
pub enum PostFilterPredicate {
    /// `property op value`, evaluated client-side
    Compare {
        property: String,
        op: Operator,
        value: Value,
    },
    /// Some element of a repeated structured property has every listed
    /// sub-property equal to the given value
    RepeatedStructured {
        property: String,
        matches: BTreeMap<String, Value>,
    },
}

impl PostFilterPredicate {
    /// Top-level property the predicate reads
    pub fn property(&self) -> &str {
        match self {
            PostFilterPredicate::Compare { property, .. }
            | PostFilterPredicate::RepeatedStructured { property, .. } => property,
        }
    }
}

impl fmt::Display for PostFilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostFilterPredicate::Compare { property, op, value } => {
                write!(f, "{} {} {}", property, op, value)
            }
            PostFilterPredicate::RepeatedStructured { property, matches } => {
                write!(f, "{} HAS {{", property)?;
                for (i, (k, v)) in matches.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostFilterNode {
    predicate: PostFilterPredicate,
}

impl PostFilterNode {
    pub fn new(predicate: PostFilterPredicate) -> Self {
        Self { predicate }
    }

    pub fn predicate(&self) -> &PostFilterPredicate {
        &self.predicate
    }
}

/// AND of two or more nodes, none of them a conjunction
#[derive(Debug, Clone, PartialEq)]
pub struct ConjunctionNode {
    operands: Vec<Node>,
}

impl ConjunctionNode {
    pub fn operands(&self) -> &[Node] {
        &self.operands
    }
}

/// OR of two or more nodes, none of them a disjunction
#[derive(Debug, Clone, PartialEq)]
pub struct DisjunctionNode {
    operands: Vec<Node>,
}

impl DisjunctionNode {
    pub fn operands(&self) -> &[Node] {
        &self.operands
    }
}

/// A filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Matches nothing
    False,
    Parameter(ParameterNode),
    Filter(FilterNode),
    PostFilter(PostFilterNode),
    Conjunction(ConjunctionNode),
    Disjunction(DisjunctionNode),
}

impl Node {
    /// Builds a filter from its parts
    pub fn filter(name: impl Into<String>, op: Operator, value: impl Into<Value>) -> QueryResult<Node> {
        FilterNode::new(name, op, value).map(Node::Filter)
    }

    /// Builds a parameterized comparison
    pub fn parameter(name: impl Into<String>, op: Operator, param: impl Into<Parameterized>) -> Node {
        Node::Parameter(ParameterNode::new(name, op, param))
    }

    pub fn post_filter(predicate: PostFilterPredicate) -> Node {
        Node::PostFilter(PostFilterNode::new(predicate))
    }

    /// AND of `nodes`.
    ///
    /// Nested conjunctions are flattened in order, any `False` operand
    /// makes the result `False`, and a single operand is returned as is.
    pub fn and(nodes: impl IntoIterator<Item = Node>) -> QueryResult<Node> {
        let nodes: Vec<Node> = nodes.into_iter().collect();
        if nodes.is_empty() {
            return Err(QueryError::invalid_argument(
                "Conjunction requires at least one node",
            ));
        }
        Ok(Self::conjoin(nodes))
    }

    /// OR of `nodes`.
    ///
    /// Nested disjunctions are flattened in order and `False` operands are
    /// dropped; if nothing remains the result is `False`.
    pub fn or(nodes: impl IntoIterator<Item = Node>) -> QueryResult<Node> {
        let nodes: Vec<Node> = nodes.into_iter().collect();
        if nodes.is_empty() {
            return Err(QueryError::invalid_argument(
                "Disjunction requires at least one node",
            ));
        }
        Ok(Self::disjoin(nodes))
    }

    fn conjoin(nodes: Vec<Node>) -> Node {
        let mut operands = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::False => return Node::False,
                Node::Conjunction(c) => operands.extend(c.operands),
                other => operands.push(other),
            }
        }
        match operands.len() {
            1 => operands.pop().unwrap_or(Node::False),
            _ => Node::Conjunction(ConjunctionNode { operands }),
        }
    }

    fn disjoin(nodes: Vec<Node>) -> Node {
        let mut operands = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::False => {}
                Node::Disjunction(d) => operands.extend(d.operands),
                other => operands.push(other),
            }
        }
        match operands.len() {
            0 => Node::False,
            1 => operands.pop().unwrap_or(Node::False),
            _ => Node::Disjunction(DisjunctionNode { operands }),
        }
    }

    /// True if any `ParameterNode` remains in the tree
    pub fn has_parameters(&self) -> bool {
        match self {
            Node::Parameter(_) => true,
            Node::False | Node::Filter(_) | Node::PostFilter(_) => false,
            Node::Conjunction(c) => c.operands.iter().any(Node::has_parameters),
            Node::Disjunction(d) => d.operands.iter().any(Node::has_parameters),
        }
    }

    /// Replaces every `ParameterNode` with its bound `FilterNode`
    pub fn resolve(&self, bindings: &Bindings, used: UsedParameters) -> QueryResult<(Node, UsedParameters)> {
        match self {
            Node::Parameter(p) => {
                let (filter, used) = p.resolve(bindings, used)?;
                Ok((Node::Filter(filter), used))
            }
            Node::False | Node::Filter(_) | Node::PostFilter(_) => Ok((self.clone(), used)),
            Node::Conjunction(c) => {
                let (operands, used) = Self::resolve_all(&c.operands, bindings, used)?;
                Ok((Self::conjoin(operands), used))
            }
            Node::Disjunction(d) => {
                let (operands, used) = Self::resolve_all(&d.operands, bindings, used)?;
                Ok((Self::disjoin(operands), used))
            }
        }
    }

    fn resolve_all(
        nodes: &[Node],
        bindings: &Bindings,
        used: UsedParameters,
    ) -> QueryResult<(Vec<Node>, UsedParameters)> {
        let mut used = used;
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            let (node, next) = node.resolve(bindings, used)?;
            used = next;
            resolved.push(node);
        }
        Ok((resolved, used))
    }
}

impl From<FilterNode> for Node {
    fn from(f: FilterNode) -> Self {
        Node::Filter(f)
    }
}

impl From<ParameterNode> for Node {
    fn from(p: ParameterNode) -> Self {
        Node::Parameter(p)
    }
}

impl From<PostFilterNode> for Node {
    fn from(p: PostFilterNode) -> Self {
        Node::PostFilter(p)
    }
}

impl BitAnd for Node {
    type Output = Node;

    fn bitand(self, rhs: Node) -> Node {
        Node::conjoin(vec![self, rhs])
    }
}

impl BitOr for Node {
    type Output = Node;

    fn bitor(self, rhs: Node) -> Node {
        Node::disjoin(vec![self, rhs])
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, label: &str, nodes: &[Node]) -> fmt::Result {
            write!(f, "{}(", label)?;
            for (i, node) in nodes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", node)?;
            }
            write!(f, ")")
        }

        match self {
            Node::False => write!(f, "FALSE"),
            Node::Parameter(p) => write!(f, "{}", p),
            Node::Filter(flt) => write!(f, "{}", flt),
            Node::PostFilter(p) => write!(f, "POST[{}]", p.predicate),
            Node::Conjunction(c) => join(f, "AND", &c.operands),
            Node::Disjunction(d) => join(f, "OR", &d.operands),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::params::{ParamKey, Parameter};

    fn f(name: &str, v: i64) -> Node {
        FilterNode::eq(name, v).into()
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("IN".parse::<Operator>().unwrap(), Operator::In);
        assert_eq!(">=".parse::<Operator>().unwrap(), Operator::Ge);
        assert!("~".parse::<Operator>().is_err());
        assert!(Operator::Lt.is_inequality());
        assert!(!Operator::Ne.is_inequality());
        assert!(!Operator::In.is_primitive());
    }

    #[test]
    fn test_in_requires_list() {
        let err = Node::filter("a", Operator::In, 3i64).unwrap_err();
        assert_eq!(err.code(), "DSQ_INVALID_ARGUMENT");
        assert!(Node::filter("a", Operator::In, vec![1i64, 2]).is_ok());
    }

    #[test]
    fn test_and_flattens_in_order() {
        let left = f("a", 1) & f("b", 2);
        let right = f("c", 3) & f("d", 4);
        match left & right {
            Node::Conjunction(c) => {
                let names: Vec<_> = c
                    .operands()
                    .iter()
                    .map(|n| match n {
                        Node::Filter(flt) => flt.name().to_string(),
                        other => panic!("unexpected {}", other),
                    })
                    .collect();
                assert_eq!(names, vec!["a", "b", "c", "d"]);
            }
            other => panic!("expected conjunction, got {}", other),
        }
    }

    #[test]
    fn test_false_annihilates_and() {
        assert_eq!(f("a", 1) & Node::False, Node::False);
        assert_eq!(Node::and([f("a", 1), f("b", 2), Node::False]).unwrap(), Node::False);
    }

    #[test]
    fn test_or_flattens_and_drops_false() {
        let node = (f("a", 1) | f("b", 2)) | (Node::False | f("c", 3));
        match node {
            Node::Disjunction(d) => assert_eq!(d.operands().len(), 3),
            other => panic!("expected disjunction, got {}", other),
        }
        assert_eq!(Node::or([Node::False]).unwrap(), Node::False);
        assert_eq!(Node::or([Node::False, f("a", 1)]).unwrap(), f("a", 1));
    }

    #[test]
    fn test_empty_combinations_rejected() {
        assert!(Node::and(Vec::new()).is_err());
        assert!(Node::or(Vec::new()).is_err());
    }

    #[test]
    fn test_structural_equality_is_order_sensitive() {
        assert_eq!(f("a", 1) & f("b", 2), f("a", 1) & f("b", 2));
        assert_ne!(f("a", 1) & f("b", 2), f("b", 2) & f("a", 1));
    }

    #[test]
    fn test_resolve_replaces_parameters() {
        let tree = Node::parameter("age", Operator::Gt, Parameter::new("min")) & f("a", 1);
        assert!(tree.has_parameters());

        let bindings = Bindings::new().set("min", 18i64);
        let (resolved, used) = tree.resolve(&bindings, UsedParameters::new()).unwrap();
        assert!(!resolved.has_parameters());
        assert!(used.contains(&ParamKey::from("min")));
        assert_eq!(resolved, Node::from(FilterNode::gt("age", 18i64)) & f("a", 1));
    }

    #[test]
    fn test_resolve_in_requires_list_binding() {
        let tree = Node::parameter("tag", Operator::In, Parameter::new(1));
        let bindings = Bindings::new().set(1, "x");
        let err = tree.resolve(&bindings, UsedParameters::new()).unwrap_err();
        assert_eq!(err.code(), "DSQ_BAD_ARGUMENT");
    }

    #[test]
    fn test_display() {
        let node = f("a", 1) | Node::from(FilterNode::is_in("b", ["x", "y"]));
        assert_eq!(node.to_string(), "OR(a = 1, b IN [\"x\", \"y\"])");
    }
}
