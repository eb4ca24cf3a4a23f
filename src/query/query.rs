//! Query descriptor
//!
//! A `Query` is immutable once built. Everything that can be checked
//! without bindings is checked in `QueryBuilder::build`; parameters are
//! resolved by `bind`, and normalization happens when the query is
//! planned for execution.

use std::fmt;
use std::sync::Arc;

use crate::config::QueryConfig;
use crate::executor::{QueryIterator, StoreExecutor};
use crate::model::{Entity, Key, NoRegistry, PropertyRef, PropertyRegistry, Value};
use crate::observability::{log_event_with_fields, Event, QueryMetrics};
use crate::planner::{ExplainPlan, Normalizer, QueryPlan, SortSpec};

use super::errors::{QueryError, QueryResult};
use super::node::Node;
use super::options::FetchOptions;
use super::params::{Bindings, Parameter, Parameterized, ParameterizedFunction, UsedParameters};

/// Ancestor restriction of a query
#[derive(Debug, Clone, PartialEq)]
pub enum Ancestor {
    Key(Key),
    /// Resolved to a key by `Query::bind`
    Parameterized(Parameterized),
}

impl From<Key> for Ancestor {
    fn from(key: Key) -> Self {
        Ancestor::Key(key)
    }
}

impl From<Parameter> for Ancestor {
    fn from(p: Parameter) -> Self {
        Ancestor::Parameterized(p.into())
    }
}

impl From<ParameterizedFunction> for Ancestor {
    fn from(f: ParameterizedFunction) -> Self {
        Ancestor::Parameterized(f.into())
    }
}

impl fmt::Display for Ancestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ancestor::Key(key) => write!(f, "{}", key),
            Ancestor::Parameterized(p) => write!(f, "{}", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    kind: Option<String>,
    ancestor: Option<Ancestor>,
    filters: Option<Node>,
    app: Option<String>,
    namespace: Option<String>,
    projection: Option<Vec<String>>,
    group_by: Option<Vec<String>>,
}

/// Collects query arguments; validation runs in `build`
#[derive(Debug, Default)]
pub struct QueryBuilder {
    kind: Option<String>,
    ancestor: Option<Ancestor>,
    filters: Option<Node>,
    orders: Option<Vec<SortSpec>>,
    app: Option<String>,
    namespace: Option<String>,
    default_options: Option<FetchOptions>,
    projection: Option<Vec<PropertyRef>>,
    group_by: Option<Vec<PropertyRef>>,
}

impl QueryBuilder {
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn ancestor(mut self, ancestor: impl Into<Ancestor>) -> Self {
        self.ancestor = Some(ancestor.into());
        self
    }

    pub fn filters(mut self, filters: impl Into<Node>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    /// Not supported yet; `build` rejects any value
    pub fn orders(mut self, orders: Vec<SortSpec>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Not supported yet; `build` rejects any value
    pub fn default_options(mut self, options: FetchOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    pub fn projection<P: Into<PropertyRef>>(mut self, properties: impl IntoIterator<Item = P>) -> Self {
        self.projection = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    pub fn group_by<P: Into<PropertyRef>>(mut self, properties: impl IntoIterator<Item = P>) -> Self {
        self.group_by = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Validate without a model registry
    pub fn build(self) -> QueryResult<Query> {
        self.build_with(&NoRegistry)
    }

    /// Validate, checking projection and group_by against `registry`
    pub fn build_with(self, registry: &dyn PropertyRegistry) -> QueryResult<Query> {
        if self.orders.is_some() {
            return Err(QueryError::not_supported("orders"));
        }
        if self.default_options.is_some() {
            return Err(QueryError::not_supported("default_options"));
        }

        validate_ancestor(
            self.ancestor.as_ref(),
            self.app.as_deref(),
            self.namespace.as_deref(),
        )?;

        let namespace = match (&self.namespace, &self.ancestor) {
            (None, Some(Ancestor::Key(key))) => Some(key.namespace().to_string()),
            (ns, _) => ns.clone(),
        };

        let kind = self.kind.as_deref();
        let projection = validate_properties("projection", self.projection, kind, registry)?;
        let group_by = validate_properties("group_by", self.group_by, kind, registry)?;

        Ok(Query {
            kind: self.kind,
            ancestor: self.ancestor,
            filters: self.filters,
            app: self.app,
            namespace,
            projection,
            group_by,
        })
    }
}

fn validate_ancestor(
    ancestor: Option<&Ancestor>,
    app: Option<&str>,
    namespace: Option<&str>,
) -> QueryResult<()> {
    match ancestor {
        None => Ok(()),
        Some(Ancestor::Parameterized(Parameterized::Function(func))) if func.name() != "key" => {
            Err(QueryError::invalid_argument(
                "ancestor cannot be a GQL function other than KEY",
            ))
        }
        Some(Ancestor::Parameterized(_)) => Ok(()),
        Some(Ancestor::Key(key)) => {
            if !key.is_complete() {
                return Err(QueryError::invalid_argument(
                    "ancestor cannot be an incomplete key",
                ));
            }
            ancestor_scope_mismatch(key, app, namespace)
                .map_or(Ok(()), |msg| Err(QueryError::invalid_argument(msg)))
        }
    }
}

/// An explicit app or namespace must agree with the ancestor's
fn ancestor_scope_mismatch(key: &Key, app: Option<&str>, namespace: Option<&str>) -> Option<&'static str> {
    if app.is_some_and(|app| app != key.app()) {
        Some("app/ancestor mismatch")
    } else if namespace.is_some_and(|ns| ns != key.namespace()) {
        Some("namespace/ancestor mismatch")
    } else {
        None
    }
}

/// Non-empty, and known + indexed when the kind is registered.
/// A dotted name is accepted if its root property is declared.
fn validate_properties(
    label: &str,
    properties: Option<Vec<PropertyRef>>,
    kind: Option<&str>,
    registry: &dyn PropertyRegistry,
) -> QueryResult<Option<Vec<String>>> {
    let Some(properties) = properties else {
        return Ok(None);
    };
    if properties.is_empty() {
        return Err(QueryError::invalid_argument(format!(
            "{} argument cannot be empty",
            label
        )));
    }

    let names: Vec<String> = properties.iter().map(|p| p.name().to_string()).collect();

    let Some(kind) = kind else {
        return Ok(Some(names));
    };
    let Some(declared) = registry.properties_for(kind) else {
        return Ok(Some(names));
    };

    for name in &names {
        let root = name.split('.').next().unwrap_or(name.as_str());
        let registered = if declared.contains(name) {
            name.as_str()
        } else if declared.contains(root) {
            root
        } else {
            return Err(QueryError::invalid_argument(format!(
                "{} references unknown property {} of {}",
                label, name, kind
            )));
        };
        if !registry.is_indexable(kind, registered) {
            return Err(QueryError::invalid_argument(format!(
                "{} references unindexed property {} of {}",
                label, name, kind
            )));
        }
    }
    Ok(Some(names))
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn ancestor(&self) -> Option<&Ancestor> {
        self.ancestor.as_ref()
    }

    pub fn filters(&self) -> Option<&Node> {
        self.filters.as_ref()
    }

    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    pub fn group_by(&self) -> Option<&[String]> {
        self.group_by.as_deref()
    }

    /// New query with `node` ANDed onto the existing filters
    pub fn filter(&self, node: impl Into<Node>) -> Query {
        let node = node.into();
        let filters = match self.filters.clone() {
            Some(existing) => existing & node,
            None => node,
        };
        Query {
            filters: Some(filters),
            ..self.clone()
        }
    }

    /// True while a parameter remains in the filters or ancestor
    pub fn has_parameters(&self) -> bool {
        matches!(self.ancestor, Some(Ancestor::Parameterized(_)))
            || self.filters.as_ref().is_some_and(Node::has_parameters)
    }

    /// Resolve every parameter against `bindings`.
    ///
    /// Fails if a referenced parameter is unbound, or if a positional
    /// (integer) binding is never referenced.
    pub fn bind(&self, bindings: &Bindings) -> QueryResult<Query> {
        let scoped = bindings.clone().scoped(
            self.app.clone().unwrap_or_else(|| bindings.app().to_string()),
            self.namespace
                .clone()
                .unwrap_or_else(|| bindings.namespace().to_string()),
        );

        let used = UsedParameters::new();
        let (filters, used) = match &self.filters {
            Some(node) => {
                let (node, used) = node.resolve(&scoped, used)?;
                (Some(node), used)
            }
            None => (None, used),
        };

        let (ancestor, used) = match &self.ancestor {
            Some(Ancestor::Parameterized(p)) => {
                let (value, used) = p.resolve(&scoped, used)?;
                let key = bound_ancestor(value)?;
                if let Some(msg) =
                    ancestor_scope_mismatch(&key, self.app.as_deref(), self.namespace.as_deref())
                {
                    return Err(QueryError::bad_argument(msg));
                }
                (Some(Ancestor::Key(key)), used)
            }
            other => (other.clone(), used),
        };

        let mut unused: Vec<String> = bindings
            .keys()
            .filter(|key| key.is_positional() && !used.contains(key))
            .map(|key| format!(":{}", key))
            .collect();
        if !unused.is_empty() {
            unused.sort();
            return Err(QueryError::bad_argument(format!(
                "Positional arguments not used: {}",
                unused.join(", ")
            )));
        }

        let namespace = match (&self.namespace, &ancestor) {
            (None, Some(Ancestor::Key(key))) => Some(key.namespace().to_string()),
            (ns, _) => ns.clone(),
        };

        log_event_with_fields(
            Event::QueryBound,
            &[
                ("kind", self.kind.as_deref().unwrap_or("")),
                ("parameters", &used.len().to_string()),
            ],
        );

        Ok(Query {
            ancestor,
            filters,
            namespace,
            ..self.clone()
        })
    }

    /// Normalize into an executable plan
    pub fn plan(&self, max_branches: usize) -> QueryResult<QueryPlan> {
        let result = self.try_plan(max_branches);
        match &result {
            Ok(plan) => {
                QueryMetrics::global().increment_queries_planned();
                log_event_with_fields(
                    Event::QueryPlanned,
                    &[
                        ("branches", &plan.branches.len().to_string()),
                        ("kind", self.kind.as_deref().unwrap_or("")),
                    ],
                );
            }
            Err(err) => {
                QueryMetrics::global().increment_queries_rejected();
                log_event_with_fields(
                    Event::QueryPlanRejected,
                    &[("code", err.code()), ("reason", &err.to_string())],
                );
            }
        }
        result
    }

    fn try_plan(&self, max_branches: usize) -> QueryResult<QueryPlan> {
        if self.has_parameters() {
            return Err(QueryError::bad_argument(
                "Query has unbound parameters; call bind first",
            ));
        }
        let branches = Normalizer::new(max_branches).normalize(self.filters.as_ref())?;
        if let Some(projection) = &self.projection {
            // projected records only carry the projected properties
            let uncovered = branches
                .iter()
                .flat_map(|b| b.post_filters())
                .find(|p| !projection.iter().any(|name| name == p.property()));
            if let Some(predicate) = uncovered {
                return Err(QueryError::BadFilterCombination(format!(
                    "post-filter on {} requires it in the projection",
                    predicate.property()
                )));
            }
        }
        let ancestor = match &self.ancestor {
            Some(Ancestor::Key(key)) => Some(key.clone()),
            _ => None,
        };
        Ok(QueryPlan {
            kind: self.kind.clone(),
            ancestor,
            app: self.app.clone(),
            namespace: self.namespace.clone(),
            orders: Vec::new(),
            projection: self.projection.clone(),
            branches,
        })
    }

    /// Plan and start a lazy iterator over the results
    pub fn fetch(&self, executor: Arc<dyn StoreExecutor>, options: FetchOptions) -> QueryResult<QueryIterator> {
        let plan = self.plan(options.max_branches)?;
        Ok(QueryIterator::new(executor, plan, options))
    }

    /// `fetch` with default options
    pub fn iter(&self, executor: Arc<dyn StoreExecutor>) -> QueryResult<QueryIterator> {
        self.fetch(executor, FetchOptions::default())
    }

    /// Every result, in order
    pub async fn fetch_all(&self, executor: Arc<dyn StoreExecutor>, options: FetchOptions) -> QueryResult<Vec<Entity>> {
        self.fetch(executor, options)?.collect().await
    }

    /// Describe how the query would execute, or why it cannot
    pub fn explain(&self, config: &QueryConfig) -> ExplainPlan {
        match self.plan(config.max_branches) {
            Ok(plan) => ExplainPlan::from_plan(&plan),
            Err(err) => ExplainPlan::from_error(&err),
        }
    }
}

fn bound_ancestor(value: Value) -> QueryResult<Key> {
    match value {
        Value::Key(key) if key.is_complete() => Ok(key),
        Value::Key(_) => Err(QueryError::bad_argument(
            "ancestor cannot be an incomplete key",
        )),
        other => Err(QueryError::bad_argument(format!(
            "ancestor must be a Key; received {}",
            other.type_name()
        ))),
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query(kind={}", self.kind.as_deref().unwrap_or("*"))?;
        if let Some(ancestor) = &self.ancestor {
            write!(f, ", ancestor={}", ancestor)?;
        }
        if let Some(filters) = &self.filters {
            write!(f, ", filters={}", filters)?;
        }
        if let Some(ns) = &self.namespace {
            write!(f, ", namespace={:?}", ns)?;
        }
        if let Some(projection) = &self.projection {
            write!(f, ", projection=[{}]", projection.join(", "))?;
        }
        if let Some(group_by) = &self.group_by {
            write!(f, ", group_by=[{}]", group_by.join(", "))?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelRegistry, PropertyDef};
    use crate::query::params::FunctionArg;
    use crate::query::{FilterNode, Operator, PostFilterPredicate};

    fn owner() -> Key {
        Key::new("app", [("Owner", 7)])
    }

    #[test]
    fn test_incomplete_ancestor_rejected() {
        let err = Query::builder()
            .kind("Pet")
            .ancestor(Key::incomplete("app", None, "Owner"))
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_ancestor_mismatch_rejected() {
        let err = Query::builder()
            .ancestor(owner())
            .app("other")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("app/ancestor mismatch"));

        let err = Query::builder()
            .ancestor(owner().with_namespace("a"))
            .namespace("b")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("namespace/ancestor mismatch"));
    }

    #[test]
    fn test_namespace_defaults_to_ancestor() {
        let query = Query::builder()
            .ancestor(owner().with_namespace("tenant"))
            .build()
            .unwrap();
        assert_eq!(query.namespace(), Some("tenant"));
    }

    #[test]
    fn test_ancestor_function_must_be_key() {
        let err = Query::builder()
            .ancestor(ParameterizedFunction::new("list", [FunctionArg::from(Parameter::new(1))]))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "DSQ_INVALID_ARGUMENT");

        assert!(Query::builder()
            .ancestor(ParameterizedFunction::new(
                "KEY",
                [FunctionArg::from("Owner"), FunctionArg::from(7i64)],
            ))
            .build()
            .is_ok());
    }

    #[test]
    fn test_orders_and_default_options_not_supported() {
        let err = Query::builder()
            .orders(vec![SortSpec::asc("name")])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "DSQ_NOT_SUPPORTED");

        let err = Query::builder()
            .default_options(FetchOptions::default())
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "DSQ_NOT_SUPPORTED");
    }

    #[test]
    fn test_projection_validation() {
        let registry = ModelRegistry::new().with_kind(
            "Pet",
            [
                PropertyDef::indexed("species"),
                PropertyDef::indexed("tags"),
                PropertyDef::unindexed("notes"),
            ],
        );

        let query = Query::builder()
            .kind("Pet")
            .projection(["species", "tags.label"])
            .build_with(&registry)
            .unwrap();
        assert_eq!(
            query.projection(),
            Some(&["species".to_string(), "tags.label".to_string()][..])
        );

        let empty: [&str; 0] = [];
        assert!(Query::builder().projection(empty).build().is_err());
        assert!(Query::builder()
            .kind("Pet")
            .group_by(["color"])
            .build_with(&registry)
            .is_err());
        assert!(Query::builder()
            .kind("Pet")
            .projection(["notes"])
            .build_with(&registry)
            .is_err());
        // unknown kinds are not checked
        assert!(Query::builder()
            .kind("Plant")
            .projection(["anything"])
            .build_with(&registry)
            .is_ok());
    }

    #[test]
    fn test_filter_ands() {
        let query = Query::builder()
            .kind("Pet")
            .filters(FilterNode::eq("a", 1i64))
            .build()
            .unwrap();
        let narrowed = query.filter(FilterNode::eq("b", 2i64));

        assert_eq!(query.filters(), Some(&Node::Filter(FilterNode::eq("a", 1i64))));
        assert_eq!(
            narrowed.filters().map(|n| n.to_string()),
            Some("AND(a = 1, b = 2)".to_string())
        );
    }

    #[test]
    fn test_bind_resolves_parameters() {
        let query = Query::builder()
            .kind("Pet")
            .filters(Node::parameter("age", Operator::Gt, Parameter::new("min")))
            .build()
            .unwrap();
        assert!(query.has_parameters());

        let bound = query.bind(&Bindings::new().set("min", 3i64)).unwrap();
        assert!(!bound.has_parameters());
        assert_eq!(bound.filters(), Some(&Node::Filter(FilterNode::gt("age", 3i64))));
    }

    #[test]
    fn test_bind_unbound_parameter() {
        let query = Query::builder()
            .filters(Node::parameter("age", Operator::Eq, Parameter::new("age")))
            .build()
            .unwrap();
        let err = query.bind(&Bindings::new()).unwrap_err();
        assert!(err.is_bad_argument());
    }

    #[test]
    fn test_bind_rejects_unused_positional() {
        let query = Query::builder()
            .filters(Node::parameter("age", Operator::Eq, Parameter::new(1)))
            .build()
            .unwrap();
        let err = query
            .bind(&Bindings::new().set(1, 4i64).set(2, 5i64))
            .unwrap_err();
        assert!(matches!(err, QueryError::BadArgument(_)));
        assert!(err.to_string().contains(":2"));

        // unused named bindings are fine
        assert!(query
            .bind(&Bindings::new().set(1, 4i64).set("extra", 5i64))
            .is_ok());
    }

    #[test]
    fn test_bind_parameterized_ancestor() {
        let query = Query::builder()
            .kind("Pet")
            .ancestor(Parameter::new("owner"))
            .build()
            .unwrap();
        assert!(query.plan(30).is_err());

        let bound = query.bind(&Bindings::new().set("owner", owner())).unwrap();
        assert_eq!(bound.ancestor(), Some(&Ancestor::Key(owner())));
        assert_eq!(bound.plan(30).unwrap().ancestor, Some(owner()));

        let err = query.bind(&Bindings::new().set("owner", 3i64)).unwrap_err();
        assert!(err.is_bad_argument());
    }

    #[test]
    fn test_bind_ancestor_scope_mismatch() {
        let query = Query::builder()
            .kind("Pet")
            .app("app-x")
            .namespace("ns-a")
            .ancestor(Parameter::new("owner"))
            .build()
            .unwrap();

        let foreign = Key::new("app-y", [("Owner", 1)]).with_namespace("ns-b");
        let err = query.bind(&Bindings::new().set("owner", foreign)).unwrap_err();
        assert!(matches!(err, QueryError::BadArgument(_)));
        assert!(err.to_string().contains("app/ancestor mismatch"));

        let other_ns = Key::new("app-x", [("Owner", 1)]).with_namespace("ns-b");
        let err = query.bind(&Bindings::new().set("owner", other_ns)).unwrap_err();
        assert!(err.to_string().contains("namespace/ancestor mismatch"));

        let local = Key::new("app-x", [("Owner", 1)]).with_namespace("ns-a");
        let bound = query.bind(&Bindings::new().set("owner", local.clone())).unwrap();
        assert_eq!(bound.plan(30).unwrap().ancestor, Some(local));
    }

    #[test]
    fn test_plan_too_many_branches() {
        let query = Query::builder()
            .filters(Node::from(FilterNode::is_in("a", [1i64, 2, 3])) & FilterNode::is_in("b", [1i64, 2, 3]).into())
            .build()
            .unwrap();
        assert_eq!(query.plan(9).unwrap().branches.len(), 9);
        let err = query.plan(8).unwrap_err();
        assert_eq!(err.code(), "DSQ_BAD_FILTER_COMBINATION");
    }

    #[test]
    fn test_post_filter_outside_projection_rejected() {
        let post = |property: &str| {
            Node::post_filter(PostFilterPredicate::Compare {
                property: property.to_string(),
                op: Operator::Eq,
                value: Value::from("cat"),
            })
        };

        let hidden = Query::builder()
            .kind("Pet")
            .projection(["age"])
            .filters(Node::from(FilterNode::gt("age", 1i64)) & post("species"))
            .build()
            .unwrap();
        let err = hidden.plan(30).unwrap_err();
        assert!(matches!(err, QueryError::BadFilterCombination(_)));

        let covered = Query::builder()
            .kind("Pet")
            .projection(["age", "species"])
            .filters(Node::from(FilterNode::gt("age", 1i64)) & post("species"))
            .build()
            .unwrap();
        assert_eq!(covered.plan(30).unwrap().branches.len(), 1);
    }

    #[test]
    fn test_explain_rejection() {
        let query = Query::builder()
            .filters(Node::from(FilterNode::lt("a", 1i64)) & FilterNode::gt("b", 2i64).into())
            .build()
            .unwrap();
        let explain = query.explain(&QueryConfig::default());
        assert!(!explain.accepted);
        assert_eq!(explain.rejection_code.as_deref(), Some("DSQ_BAD_FILTER_COMBINATION"));
    }

    #[test]
    fn test_display() {
        let query = Query::builder()
            .kind("Pet")
            .filters(FilterNode::eq("species", "cat"))
            .build()
            .unwrap();
        assert_eq!(query.to_string(), "Query(kind=Pet, filters=species = \"cat\")");
    }
}
