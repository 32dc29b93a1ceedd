//! A type-stated fluent predicate builder over JSON-column paths (spec
//! §4.D). `Where` is a pure function of its method chain to
//! `(predicate, params)` — it performs no I/O and knows nothing about
//! `sqlx` or any particular backend connection.

use std::marker::PhantomData;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("`{0}` requires at least one value via `.values(...)`")]
    EmptyValues(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
    NotIn,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "LIKE",
            Op::In => "IN",
            Op::NotIn => "NOT IN",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Op::In => "IN",
            Op::NotIn => "NOT IN",
            _ => "comparison",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
enum Column {
    /// A JSON-column path, given in dot notation (e.g. `"content.nested"`).
    Json(Vec<String>),
    CreatedAt,
    CreatedBy,
    UpdatedAt,
    UpdatedBy,
}

#[derive(Debug, Clone)]
enum Node {
    Cmp {
        column: Column,
        op: Op,
        values: Vec<serde_json::Value>,
    },
    Between {
        column: Column,
        lo: serde_json::Value,
        hi: serde_json::Value,
    },
    Search(String),
    And,
    Or,
    Group(Vec<Node>),
}

/// Marker: the chain currently expects a clause (`.key(...)`, a metadata
/// shortcut, `.search(...)`, or `.expression(...)`).
pub struct NeedClause;
/// Marker: the chain just completed a clause and may be combined with
/// `.and()`/`.or()` or terminated.
pub struct HaveClause;

/// The fluent predicate chain. `S` tracks whether the chain currently
/// expects a clause or a combinator, enforcing well-formed alternation at
/// compile time.
pub struct Where<S = NeedClause> {
    nodes: Vec<Node>,
    order_by: Option<(Column, Order)>,
    limit_per_shard: Option<i64>,
    offset: Option<i64>,
    _state: PhantomData<S>,
}

impl Where<NeedClause> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            order_by: None,
            limit_per_shard: None,
            offset: None,
            _state: PhantomData,
        }
    }

    /// Begins a comparison against a JSON-column path. Dot notation
    /// (`"content.nested"`) addresses nested object keys.
    pub fn key(self, path: &str) -> KeyClause {
        KeyClause {
            parent: self,
            column: Column::Json(path.split('.').map(str::to_string).collect()),
        }
    }

    pub fn expression(mut self, sub: Where<HaveClause>) -> Where<HaveClause> {
        self.nodes.push(Node::Group(sub.nodes));
        self.transition()
    }

    pub fn created_between(mut self, start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> Where<HaveClause> {
        self.nodes.push(Node::Between {
            column: Column::CreatedAt,
            lo: serde_json::json!(start),
            hi: serde_json::json!(end),
        });
        self.transition()
    }

    pub fn created_by(mut self, user: &str) -> Where<HaveClause> {
        self.nodes.push(Node::Cmp {
            column: Column::CreatedBy,
            op: Op::Eq,
            values: vec![serde_json::json!(user)],
        });
        self.transition()
    }

    pub fn updated_between(mut self, start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> Where<HaveClause> {
        self.nodes.push(Node::Between {
            column: Column::UpdatedAt,
            lo: serde_json::json!(start),
            hi: serde_json::json!(end),
        });
        self.transition()
    }

    pub fn updated_by(mut self, user: &str) -> Where<HaveClause> {
        self.nodes.push(Node::Cmp {
            column: Column::UpdatedBy,
            op: Op::Eq,
            values: vec![serde_json::json!(user)],
        });
        self.transition()
    }

    /// Whitespace-normalised phrase, tokens joined by `AND` in the
    /// backend's full-text query language.
    pub fn search(mut self, phrase: &str) -> Where<HaveClause> {
        let normalized = phrase
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" & ");
        self.nodes.push(Node::Search(normalized));
        self.transition()
    }

    fn transition<T>(self) -> Where<T> {
        Where {
            nodes: self.nodes,
            order_by: self.order_by,
            limit_per_shard: self.limit_per_shard,
            offset: self.offset,
            _state: PhantomData,
        }
    }
}

impl Default for Where<NeedClause> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct KeyClause {
    parent: Where<NeedClause>,
    column: Column,
}

macro_rules! comparator {
    ($name:ident, $op:expr) => {
        pub fn $name(self) -> ValueClause {
            ValueClause {
                parent: self.parent,
                column: self.column,
                op: $op,
            }
        }
    };
}

impl KeyClause {
    comparator!(equals, Op::Eq);
    comparator!(not_equals, Op::Ne);
    comparator!(less_than, Op::Lt);
    comparator!(less_or_equal, Op::Le);
    comparator!(greater_than, Op::Gt);
    comparator!(greater_or_equal, Op::Ge);
    comparator!(like, Op::Like);
    comparator!(is_in, Op::In);
    comparator!(is_not_in, Op::NotIn);
}

pub struct ValueClause {
    parent: Where<NeedClause>,
    column: Column,
    op: Op,
}

impl ValueClause {
    pub fn value(mut self, v: impl serde::Serialize) -> Where<HaveClause> {
        self.parent.nodes.push(Node::Cmp {
            column: self.column,
            op: self.op,
            values: vec![serde_json::to_value(v).unwrap_or(serde_json::Value::Null)],
        });
        self.parent.transition()
    }

    pub fn values<I, V>(mut self, vs: I) -> Where<HaveClause>
    where
        I: IntoIterator<Item = V>,
        V: serde::Serialize,
    {
        let values = vs
            .into_iter()
            .map(|v| serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
            .collect();
        self.parent.nodes.push(Node::Cmp {
            column: self.column,
            op: self.op,
            values,
        });
        self.parent.transition()
    }
}

impl Where<HaveClause> {
    pub fn and(mut self) -> Where<NeedClause> {
        self.nodes.push(Node::And);
        self.transition()
    }

    pub fn or(mut self) -> Where<NeedClause> {
        self.nodes.push(Node::Or);
        self.transition()
    }
}

impl<S> Where<S> {
    pub fn order_by_asc(mut self, path: &str) -> Self {
        self.order_by = Some((Column::Json(path.split('.').map(str::to_string).collect()), Order::Asc));
        self
    }

    pub fn order_by_desc(mut self, path: &str) -> Self {
        self.order_by = Some((Column::Json(path.split('.').map(str::to_string).collect()), Order::Desc));
        self
    }

    pub fn order_by_created_at_asc(mut self) -> Self {
        self.order_by = Some((Column::CreatedAt, Order::Asc));
        self
    }

    pub fn order_by_created_at_desc(mut self) -> Self {
        self.order_by = Some((Column::CreatedAt, Order::Desc));
        self
    }

    pub fn order_by_updated_at_asc(mut self) -> Self {
        self.order_by = Some((Column::UpdatedAt, Order::Asc));
        self
    }

    pub fn order_by_updated_at_desc(mut self) -> Self {
        self.order_by = Some((Column::UpdatedAt, Order::Desc));
        self
    }

    /// Applied per-shard: a fan-out query returns up to `n * shardCount`
    /// rows. Callers needing a true top-n must sort and truncate after
    /// merge.
    pub fn limit_per_shard(mut self, n: i64) -> Self {
        self.limit_per_shard = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Emits `(predicate, params)`. Placeholders are positional (`$1, $2,
    /// ...`); values are pre-serialized to JSON scalars so comparisons
    /// against JSON column paths are type-consistent.
    pub fn statement(&self) -> Result<(String, Vec<serde_json::Value>), QueryError> {
        let mut params = Vec::new();
        let mut sql = emit(&self.nodes, &mut params)?;

        if let Some((column, order)) = &self.order_by {
            if !sql.is_empty() {
                sql.push(' ');
            }
            sql.push_str(&format!(
                "ORDER BY {} {}",
                column_sql(column),
                match order {
                    Order::Asc => "ASC",
                    Order::Desc => "DESC",
                }
            ));
        }
        if let Some(n) = self.limit_per_shard {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if let Some(n) = self.offset {
            sql.push_str(&format!(" OFFSET {n}"));
        }

        Ok((sql.trim().to_string(), params))
    }
}

fn column_sql(column: &Column) -> String {
    match column {
        Column::Json(path) => {
            let joined = path
                .iter()
                .map(|p| format!("'{}'", p.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(",");
            format!("jsonb_extract_path(object, {joined})")
        }
        Column::CreatedAt => "created_at".to_string(),
        Column::CreatedBy => "created_by".to_string(),
        Column::UpdatedAt => "updated_at".to_string(),
        Column::UpdatedBy => "updated_by".to_string(),
    }
}

fn emit(nodes: &[Node], params: &mut Vec<serde_json::Value>) -> Result<String, QueryError> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::And => out.push_str(" AND "),
            Node::Or => out.push_str(" OR "),
            Node::Group(sub) => {
                out.push('(');
                out.push_str(&emit(sub, params)?);
                out.push(')');
            }
            Node::Search(query) => {
                params.push(serde_json::json!(query));
                out.push_str(&format!("text_search @@ to_tsquery(${})", params.len()));
            }
            Node::Between { column, lo, hi } => {
                params.push(lo.clone());
                let lo_idx = params.len();
                params.push(hi.clone());
                let hi_idx = params.len();
                out.push_str(&format!(
                    "{} BETWEEN ${} AND ${}",
                    column_sql(column),
                    lo_idx,
                    hi_idx
                ));
            }
            Node::Cmp { column, op, values } => {
                if matches!(op, Op::In | Op::NotIn) && values.is_empty() {
                    return Err(QueryError::EmptyValues(op.name()));
                }
                if values.len() == 1 && !matches!(op, Op::In | Op::NotIn) {
                    params.push(values[0].clone());
                    out.push_str(&format!(
                        "{} {} ${}",
                        column_sql(column),
                        op.sql(),
                        params.len()
                    ));
                } else {
                    let placeholders: Vec<String> = values
                        .iter()
                        .map(|v| {
                            params.push(v.clone());
                            format!("${}", params.len())
                        })
                        .collect();
                    out.push_str(&format!(
                        "{} {} ({})",
                        column_sql(column),
                        op.sql(),
                        placeholders.join(",")
                    ));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_equality_emits_single_placeholder() {
        let (sql, params) = Where::new()
            .key("content")
            .equals()
            .value("hello")
            .order_by_created_at_desc()
            .limit_per_shard(1)
            .statement()
            .unwrap();

        assert!(sql.contains("jsonb_extract_path(object, 'content') = $1"));
        assert!(sql.contains("ORDER BY created_at DESC"));
        assert!(sql.ends_with("LIMIT 1"));
        assert_eq!(params, vec![serde_json::json!("hello")]);
    }

    #[test]
    fn and_combinator_joins_two_clauses() {
        let (sql, params) = Where::new()
            .key("a")
            .equals()
            .value(1)
            .and()
            .key("b")
            .greater_than()
            .value(2)
            .statement()
            .unwrap();

        assert!(sql.contains(" AND "));
        assert_eq!(params, vec![serde_json::json!(1), serde_json::json!(2)]);
    }

    #[test]
    fn expression_parenthesizes_a_sub_chain() {
        let sub = Where::new().key("a").equals().value(1).or().key("b").equals().value(2);
        let (sql, params) = Where::new()
            .expression(sub)
            .and()
            .key("c")
            .equals()
            .value(3)
            .statement()
            .unwrap();

        assert!(sql.starts_with('('));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn in_clause_binds_each_value_as_its_own_placeholder() {
        let (sql, params) = Where::new()
            .key("tag")
            .is_in()
            .values(["a", "b", "c"])
            .statement()
            .unwrap();

        assert!(sql.contains("IN ($1,$2,$3)"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn empty_in_values_is_an_error() {
        let empty: Vec<&str> = vec![];
        let result = Where::new().key("tag").is_in().values(empty).statement();
        assert!(matches!(result, Err(QueryError::EmptyValues("IN"))));
    }

    #[test]
    fn nested_dot_path_becomes_multi_key_json_extract() {
        let (sql, _) = Where::new()
            .key("content.nested")
            .equals()
            .value(1)
            .statement()
            .unwrap();
        assert!(sql.contains("jsonb_extract_path(object, 'content','nested')"));
    }

    #[test]
    fn path_segments_escape_embedded_single_quotes() {
        let (sql, _) = Where::new().key("it's").equals().value(1).statement().unwrap();
        assert!(sql.contains("jsonb_extract_path(object, 'it''s')"));
    }

    #[test]
    fn metadata_shortcuts_compare_plain_columns() {
        let (sql, params) = Where::new().created_by("alice").statement().unwrap();
        assert_eq!(sql, "created_by = $1");
        assert_eq!(params, vec![serde_json::json!("alice")]);
    }

    #[test]
    fn search_normalizes_whitespace_and_ands_tokens() {
        let (sql, params) = Where::new().search("  hello   world  ").statement().unwrap();
        assert!(sql.starts_with("text_search @@"));
        assert_eq!(params[0], serde_json::json!("hello & world"));
    }

    #[test]
    fn no_clauses_still_supports_order_and_limit() {
        let (sql, params) = Where::new()
            .order_by_created_at_desc()
            .limit_per_shard(1)
            .statement()
            .unwrap();
        assert_eq!(sql, "ORDER BY created_at DESC LIMIT 1");
        assert!(params.is_empty());
    }
}
