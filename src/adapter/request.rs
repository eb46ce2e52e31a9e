//! Remote request builder.
//!
//! Requests are plain data so the retry executor can re-issue the same request
//! on every attempt.

use crate::filter::{FilterOperator, Predicate};
use serde::Serialize;
use serde_json::Value;

/// A call against the remote data service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RemoteRequest {
    /// Table-scoped read or write.
    Table(TableQuery),
    /// Named remote procedure.
    Rpc(RpcCall),
}

impl RemoteRequest {
    /// Start a table-scoped request.
    pub fn from(table: impl Into<String>) -> TableQuery {
        TableQuery::new(table)
    }

    /// Build a remote procedure call.
    pub fn rpc(function: impl Into<String>, params: Value) -> Self {
        RemoteRequest::Rpc(RpcCall {
            function: function.into(),
            params,
        })
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            RemoteRequest::Table(q) => format!("{} {}", q.action.verb(), q.table),
            RemoteRequest::Rpc(call) => format!("rpc {}", call.function),
        }
    }
}

impl From<TableQuery> for RemoteRequest {
    fn from(query: TableQuery) -> Self {
        RemoteRequest::Table(query)
    }
}

/// What a table request does.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TableAction {
    Select {
        columns: String,
        /// Ask for an exact row count.
        count: bool,
        /// Count only, no rows.
        head: bool,
    },
    Insert {
        rows: Value,
    },
    Update {
        patch: Value,
    },
    Delete,
    Upsert {
        rows: Value,
        on_conflict: Option<String>,
    },
}

impl TableAction {
    /// Verb used in logs.
    pub fn verb(&self) -> &'static str {
        match self {
            TableAction::Select { .. } => "select",
            TableAction::Insert { .. } => "insert",
            TableAction::Update { .. } => "update",
            TableAction::Delete => "delete",
            TableAction::Upsert { .. } => "upsert",
        }
    }

    /// Whether the action modifies rows.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, TableAction::Select { .. })
    }
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// A table-scoped request under construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableQuery {
    pub table: String,
    pub action: TableAction,
    pub filters: Vec<Predicate>,
    pub order: Option<OrderBy>,
    pub limit: Option<u64>,
    /// Inclusive row range (from, to).
    pub range: Option<(u64, u64)>,
    pub single: bool,
    /// Return the affected rows of a mutation.
    pub returning: bool,
}

impl TableQuery {
    /// New request that selects all columns.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            action: TableAction::Select {
                columns: "*".to_string(),
                count: false,
                head: false,
            },
            filters: Vec::new(),
            order: None,
            limit: None,
            range: None,
            single: false,
            returning: false,
        }
    }

    /// Select rows with the given projection.
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.action = TableAction::Select {
            columns: columns.into(),
            count: false,
            head: false,
        };
        self
    }

    /// Select with an exact count; `head` drops the rows.
    pub fn select_count(mut self, head: bool) -> Self {
        self.action = TableAction::Select {
            columns: "*".to_string(),
            count: true,
            head,
        };
        self
    }

    /// Insert one row (object) or many (array).
    pub fn insert(mut self, rows: Value) -> Self {
        self.action = TableAction::Insert { rows };
        self
    }

    /// Update matching rows with `patch`.
    pub fn update(mut self, patch: Value) -> Self {
        self.action = TableAction::Update { patch };
        self
    }

    /// Delete matching rows.
    pub fn delete(mut self) -> Self {
        self.action = TableAction::Delete;
        self
    }

    /// Insert or update on conflict.
    pub fn upsert(mut self, rows: Value, on_conflict: Option<String>) -> Self {
        self.action = TableAction::Upsert { rows, on_conflict };
        self
    }

    /// Return affected rows from a mutation.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    /// Append a predicate.
    pub fn filter(mut self, column: &str, operator: FilterOperator, value: Value) -> Self {
        self.filters.push(Predicate {
            column: column.to_string(),
            operator,
            value,
        });
        self
    }

    pub fn eq(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Eq, value)
    }

    pub fn neq(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Neq, value)
    }

    pub fn gt(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Gt, value)
    }

    pub fn gte(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Gte, value)
    }

    pub fn lt(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Lt, value)
    }

    pub fn lte(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Lte, value)
    }

    pub fn like(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Like, value)
    }

    pub fn ilike(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Ilike, value)
    }

    pub fn is(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Is, value)
    }

    /// `in` is a keyword, hence the trailing underscore.
    pub fn in_(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::In, value)
    }

    pub fn contains(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Contains, value)
    }

    pub fn contained_by(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::ContainedBy, value)
    }

    pub fn overlaps(self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOperator::Overlaps, value)
    }

    /// Order results by `column`.
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    /// Cap the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict to the inclusive row range `from..=to`.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to));
        self
    }

    /// Expect exactly one row back as an object.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }
}

/// A named remote procedure invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcCall {
    pub function: String,
    pub params: Value,
}
