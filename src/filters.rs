//! Predicate builders for `where` (metadata) and `where_document` (content)
//! expressions. Two sibling recursive trees sharing one shape: a comparison
//! node, and `and`/`or` combinators of arity >= 1. Both serialize to the
//! server's nested, dollar-prefixed JSON filter dialect.
//!
//! Two equivalent construction styles are exposed, matching the source
//! client's two idioms:
//!
//! - free functions (`eq`, `ne`, `and`, ...) that validate eagerly and
//!   return `Result<Filter>`, meant to be composed with `?`;
//! - [`WhereBuilder`] / [`WhereDocumentBuilder`], which mutate in place,
//!   accumulate the first validation error lazily, and resolve on
//!   [`WhereBuilder::build`].

use crate::error::{ChromiumError, Result};
use crate::types::Scalar;
use serde_json::{json, Value};

/// Comparison operator for metadata (`where`) predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Gt => "gt",
            CmpOp::Gte => "gte",
            CmpOp::Lt => "lt",
            CmpOp::Lte => "lte",
            CmpOp::In => "in",
            CmpOp::Nin => "nin",
        }
    }

    fn from_dollar(key: &str) -> Option<Self> {
        match key.strip_prefix('$')? {
            "eq" => Some(CmpOp::Eq),
            "ne" => Some(CmpOp::Ne),
            "gt" => Some(CmpOp::Gt),
            "gte" => Some(CmpOp::Gte),
            "lt" => Some(CmpOp::Lt),
            "lte" => Some(CmpOp::Lte),
            "in" => Some(CmpOp::In),
            "nin" => Some(CmpOp::Nin),
            _ => None,
        }
    }

    fn is_list_op(self) -> bool {
        matches!(self, CmpOp::In | CmpOp::Nin)
    }
}

/// Comparison operator for document (`where_document`) predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocOp {
    Contains,
    NotContains,
}

impl DocOp {
    pub fn as_str(self) -> &'static str {
        match self {
            DocOp::Contains => "contains",
            DocOp::NotContains => "not_contains",
        }
    }

    fn from_dollar(key: &str) -> Option<Self> {
        match key.strip_prefix('$')? {
            "contains" => Some(DocOp::Contains),
            "not_contains" => Some(DocOp::NotContains),
            _ => None,
        }
    }
}

/// Recursive metadata predicate tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Cmp {
        field: String,
        op: CmpOp,
        value: Scalar,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

/// Recursive document predicate tree.
#[derive(Clone, Debug, PartialEq)]
pub enum DocFilter {
    Cmp { op: DocOp, value: String },
    And(Vec<DocFilter>),
    Or(Vec<DocFilter>),
}

pub(crate) fn validate_scalar(value: &Scalar) -> Result<()> {
    match value {
        Value::String(_) | Value::Bool(_) => Ok(()),
        Value::Number(n) if n.is_i64() || n.is_u64() || n.is_f64() => Ok(()),
        other => Err(ChromiumError::validation(format!(
            "unsupported metadata value type: {other}"
        ))),
    }
}

fn validate_scalar_list(values: &[Scalar]) -> Result<()> {
    if values.is_empty() {
        return Err(ChromiumError::validation(
            "in/nin requires a non-empty list of values",
        ));
    }
    values.iter().try_for_each(validate_scalar)
}

// ---- Functional constructors (eager validation) ----

fn cmp(field: impl Into<String>, op: CmpOp, value: Scalar) -> Result<Filter> {
    debug_assert!(!op.is_list_op());
    validate_scalar(&value)?;
    Ok(Filter::Cmp {
        field: field.into(),
        op,
        value,
    })
}

pub fn eq(field: impl Into<String>, value: impl Into<Scalar>) -> Result<Filter> {
    cmp(field, CmpOp::Eq, value.into())
}

pub fn ne(field: impl Into<String>, value: impl Into<Scalar>) -> Result<Filter> {
    cmp(field, CmpOp::Ne, value.into())
}

pub fn gt(field: impl Into<String>, value: impl Into<Scalar>) -> Result<Filter> {
    cmp(field, CmpOp::Gt, value.into())
}

pub fn gte(field: impl Into<String>, value: impl Into<Scalar>) -> Result<Filter> {
    cmp(field, CmpOp::Gte, value.into())
}

pub fn lt(field: impl Into<String>, value: impl Into<Scalar>) -> Result<Filter> {
    cmp(field, CmpOp::Lt, value.into())
}

pub fn lte(field: impl Into<String>, value: impl Into<Scalar>) -> Result<Filter> {
    cmp(field, CmpOp::Lte, value.into())
}

pub fn in_(field: impl Into<String>, values: Vec<Scalar>) -> Result<Filter> {
    validate_scalar_list(&values)?;
    Ok(Filter::Cmp {
        field: field.into(),
        op: CmpOp::In,
        value: Value::Array(values),
    })
}

pub fn nin(field: impl Into<String>, values: Vec<Scalar>) -> Result<Filter> {
    validate_scalar_list(&values)?;
    Ok(Filter::Cmp {
        field: field.into(),
        op: CmpOp::Nin,
        value: Value::Array(values),
    })
}

pub fn and(children: Vec<Result<Filter>>) -> Result<Filter> {
    if children.is_empty() {
        return Err(ChromiumError::validation("and requires at least one child"));
    }
    Ok(Filter::And(children.into_iter().collect::<Result<Vec<_>>>()?))
}

pub fn or(children: Vec<Result<Filter>>) -> Result<Filter> {
    if children.is_empty() {
        return Err(ChromiumError::validation("or requires at least one child"));
    }
    Ok(Filter::Or(children.into_iter().collect::<Result<Vec<_>>>()?))
}

pub fn contains(value: impl Into<String>) -> Result<DocFilter> {
    Ok(DocFilter::Cmp {
        op: DocOp::Contains,
        value: value.into(),
    })
}

pub fn not_contains(value: impl Into<String>) -> Result<DocFilter> {
    Ok(DocFilter::Cmp {
        op: DocOp::NotContains,
        value: value.into(),
    })
}

pub fn doc_and(children: Vec<Result<DocFilter>>) -> Result<DocFilter> {
    if children.is_empty() {
        return Err(ChromiumError::validation("and requires at least one child"));
    }
    Ok(DocFilter::And(children.into_iter().collect::<Result<Vec<_>>>()?))
}

pub fn doc_or(children: Vec<Result<DocFilter>>) -> Result<DocFilter> {
    if children.is_empty() {
        return Err(ChromiumError::validation("or requires at least one child"));
    }
    Ok(DocFilter::Or(children.into_iter().collect::<Result<Vec<_>>>()?))
}

// ---- Stateful builders (lazy error accumulation) ----

/// Mutating builder over the metadata (`where`) dialect. Each call returns
/// `Self` for chaining; the first validation failure is latched and
/// returned by [`build`](Self::build) rather than short-circuiting the
/// chain, so callers can write a full chain before handling errors.
#[derive(Default)]
pub struct WhereBuilder {
    clauses: Vec<Filter>,
    error: Option<ChromiumError>,
}

impl WhereBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, result: Result<Filter>) -> Self {
        if self.error.is_some() {
            return self;
        }
        match result {
            Ok(f) => self.clauses.push(f),
            Err(e) => self.error = Some(e),
        }
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        let r = eq(field, value);
        self.push(r)
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        let r = ne(field, value);
        self.push(r)
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        let r = gt(field, value);
        self.push(r)
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        let r = gte(field, value);
        self.push(r)
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        let r = lt(field, value);
        self.push(r)
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        let r = lte(field, value);
        self.push(r)
    }

    pub fn in_(self, field: impl Into<String>, values: Vec<Scalar>) -> Self {
        let r = in_(field, values);
        self.push(r)
    }

    pub fn nin(self, field: impl Into<String>, values: Vec<Scalar>) -> Self {
        let r = nin(field, values);
        self.push(r)
    }

    /// Nest a fully-formed sub-expression (e.g. the result of another
    /// `WhereBuilder`) as a single clause under this builder's implicit AND.
    pub fn and_group(self, branches: Vec<WhereBuilder>) -> Self {
        let r = and(branches.into_iter().map(WhereBuilder::build).collect());
        self.push(r)
    }

    pub fn or_group(self, branches: Vec<WhereBuilder>) -> Self {
        let r = or(branches.into_iter().map(WhereBuilder::build).collect());
        self.push(r)
    }

    /// Resolve the builder. Multiple top-level clauses are implicitly
    /// AND-ed; a single clause is returned unwrapped.
    pub fn build(self) -> Result<Filter> {
        if let Some(e) = self.error {
            return Err(e);
        }
        match self.clauses.len() {
            0 => Err(ChromiumError::validation("empty where() expression")),
            1 => Ok(self.clauses.into_iter().next().expect("len checked above")),
            _ => Ok(Filter::And(self.clauses)),
        }
    }
}

/// Mutating builder over the document (`where_document`) dialect.
#[derive(Default)]
pub struct WhereDocumentBuilder {
    clauses: Vec<DocFilter>,
    error: Option<ChromiumError>,
}

impl WhereDocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, result: Result<DocFilter>) -> Self {
        if self.error.is_some() {
            return self;
        }
        match result {
            Ok(f) => self.clauses.push(f),
            Err(e) => self.error = Some(e),
        }
        self
    }

    pub fn contains(self, value: impl Into<String>) -> Self {
        let r = contains(value);
        self.push(r)
    }

    pub fn not_contains(self, value: impl Into<String>) -> Self {
        let r = not_contains(value);
        self.push(r)
    }

    pub fn and_group(self, branches: Vec<WhereDocumentBuilder>) -> Self {
        let r = doc_and(branches.into_iter().map(WhereDocumentBuilder::build).collect());
        self.push(r)
    }

    pub fn or_group(self, branches: Vec<WhereDocumentBuilder>) -> Self {
        let r = doc_or(branches.into_iter().map(WhereDocumentBuilder::build).collect());
        self.push(r)
    }

    pub fn build(self) -> Result<DocFilter> {
        if let Some(e) = self.error {
            return Err(e);
        }
        match self.clauses.len() {
            0 => Err(ChromiumError::validation(
                "empty where_document() expression",
            )),
            1 => Ok(self.clauses.into_iter().next().expect("len checked above")),
            _ => Ok(DocFilter::And(self.clauses)),
        }
    }
}

// ---- Serialization (bit-exact, server-visible) ----

/// Serialize a metadata predicate to the server's nested JSON dialect.
/// `Cmp(k, op, v) -> { k: { "$"+op: v } }`, `And/Or -> { "$and"/"$or": [...] }`.
pub fn serialize_where(filter: &Filter) -> Value {
    match filter {
        Filter::Cmp { field, op, value } => {
            json!({ field.clone(): { format!("${}", op.as_str()): value.clone() } })
        }
        Filter::And(children) => {
            json!({ "$and": children.iter().map(serialize_where).collect::<Vec<_>>() })
        }
        Filter::Or(children) => {
            json!({ "$or": children.iter().map(serialize_where).collect::<Vec<_>>() })
        }
    }
}

/// Serialize a document predicate to the server's nested JSON dialect.
/// `DocCmp(op, v) -> { "$"+op: v }`.
pub fn serialize_where_document(filter: &DocFilter) -> Value {
    match filter {
        DocFilter::Cmp { op, value } => json!({ format!("${}", op.as_str()): value.clone() }),
        DocFilter::And(children) => {
            json!({ "$and": children.iter().map(serialize_where_document).collect::<Vec<_>>() })
        }
        DocFilter::Or(children) => {
            json!({ "$or": children.iter().map(serialize_where_document).collect::<Vec<_>>() })
        }
    }
}

// ---- Parsing (inverse of serialization, used for round-trip tests) ----

pub fn parse_where(value: &Value) -> Result<Filter> {
    let obj = value
        .as_object()
        .ok_or_else(|| ChromiumError::validation("where expression must be a JSON object"))?;
    if obj.len() != 1 {
        return Err(ChromiumError::validation(
            "where expression must have exactly one top-level key",
        ));
    }
    let (key, val) = obj.iter().next().expect("len checked above");

    if key == "$and" || key == "$or" {
        let items = val
            .as_array()
            .ok_or_else(|| ChromiumError::validation("$and/$or value must be an array"))?;
        let children = items.iter().map(parse_where).collect::<Result<Vec<_>>>()?;
        return Ok(if key == "$and" {
            Filter::And(children)
        } else {
            Filter::Or(children)
        });
    }

    // key is a field name; value must be { "$op": v }
    let inner = val
        .as_object()
        .ok_or_else(|| ChromiumError::validation("comparison value must be an object"))?;
    if inner.len() != 1 {
        return Err(ChromiumError::validation(
            "comparison object must have exactly one operator key",
        ));
    }
    let (op_key, op_val) = inner.iter().next().expect("len checked above");
    let op = CmpOp::from_dollar(op_key)
        .ok_or_else(|| ChromiumError::validation(format!("unknown operator: {op_key}")))?;
    Ok(Filter::Cmp {
        field: key.clone(),
        op,
        value: op_val.clone(),
    })
}

pub fn parse_where_document(value: &Value) -> Result<DocFilter> {
    let obj = value
        .as_object()
        .ok_or_else(|| ChromiumError::validation("where_document expression must be an object"))?;
    if obj.len() != 1 {
        return Err(ChromiumError::validation(
            "where_document expression must have exactly one top-level key",
        ));
    }
    let (key, val) = obj.iter().next().expect("len checked above");
    if key == "$and" || key == "$or" {
        let items = val
            .as_array()
            .ok_or_else(|| ChromiumError::validation("$and/$or value must be an array"))?;
        let children = items
            .iter()
            .map(parse_where_document)
            .collect::<Result<Vec<_>>>()?;
        return Ok(if key == "$and" {
            DocFilter::And(children)
        } else {
            DocFilter::Or(children)
        });
    }
    let op = DocOp::from_dollar(key)
        .ok_or_else(|| ChromiumError::validation(format!("unknown operator: {key}")))?;
    let value = val
        .as_str()
        .ok_or_else(|| ChromiumError::validation("document predicate value must be a string"))?
        .to_string();
    Ok(DocFilter::Cmp { op, value })
}
