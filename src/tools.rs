//! Operations exposed by the gateway.
//!
//! - `query`: read rows with filters, ordering and paging (cached)
//! - `insert`: insert one or more rows
//! - `update`: update rows matching filters
//! - `delete`: delete rows matching filters
//! - `upsert`: insert or update on conflict
//! - `rpc`: call a remote procedure (alias `remote-call`)
//! - `count`: count rows matching filters
//! - `batch`: run several table operations, each on its own
//! - `schema`: list tables and columns (alias `schema-introspect`)
//! - `metrics`: operational metrics snapshot (alias `metrics-snapshot`)
//!
//! This module resolves names, validates parameters and turns them into a
//! [`Plan`]. Executing plans is the dispatcher's job (see `handlers`).

mod inputs;

pub use inputs::*;

use crate::adapter::{RemoteRequest, TableQuery};
use crate::cache::fingerprint;
use crate::config::Config;
use crate::error::GatewayError;
use crate::filter;
use crate::security::{validate_identifier, validate_table_name};
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Known operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
    Insert,
    Update,
    Delete,
    Upsert,
    Rpc,
    Count,
    Batch,
    Schema,
    Metrics,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Query,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
        Operation::Upsert,
        Operation::Rpc,
        Operation::Count,
        Operation::Batch,
        Operation::Schema,
        Operation::Metrics,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Upsert => "upsert",
            Operation::Rpc => "rpc",
            Operation::Count => "count",
            Operation::Batch => "batch",
            Operation::Schema => "schema",
            Operation::Metrics => "metrics",
        }
    }

    /// Alternative name accepted when resolving.
    pub fn alias(&self) -> Option<&'static str> {
        match self {
            Operation::Rpc => Some("remote-call"),
            Operation::Schema => Some("schema-introspect"),
            Operation::Metrics => Some("metrics-snapshot"),
            _ => None,
        }
    }

    /// All wire names.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Operation::as_str).collect()
    }

    /// Parameters that must be present and non-null.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Operation::Query | Operation::Count => &["table"],
            Operation::Insert | Operation::Upsert => &["table", "data"],
            Operation::Update => &["table", "data", "filters"],
            Operation::Delete => &["table", "filters"],
            Operation::Rpc => &["functionName"],
            Operation::Batch => &["operations"],
            Operation::Schema | Operation::Metrics => &[],
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Operation::Query => "Query data from a table with filters and options",
            Operation::Insert => "Insert data into a table",
            Operation::Update => "Update data in a table",
            Operation::Delete => "Delete data from a table",
            Operation::Upsert => "Upsert (insert or update) data in a table",
            Operation::Rpc => "Call a remote procedure",
            Operation::Count => "Count rows in a table",
            Operation::Batch => "Execute multiple operations in a batch",
            Operation::Schema => "Get table schema information",
            Operation::Metrics => "Get database operation metrics",
        }
    }

    /// Only reads are served from cache.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Operation::Query)
    }

    /// JSON Schema of the operation's parameters.
    pub fn input_schema(&self) -> Value {
        match self {
            Operation::Query => schema_of::<QueryInput>(),
            Operation::Insert => schema_of::<InsertInput>(),
            Operation::Update => schema_of::<UpdateInput>(),
            Operation::Delete => schema_of::<DeleteInput>(),
            Operation::Upsert => schema_of::<UpsertInput>(),
            Operation::Rpc => schema_of::<RpcInput>(),
            Operation::Count => schema_of::<CountInput>(),
            Operation::Batch => schema_of::<BatchInput>(),
            Operation::Schema => schema_of::<SchemaInput>(),
            Operation::Metrics => schema_of::<MetricsInput>(),
        }
    }

    /// Check that every required parameter is present and non-null.
    pub fn validate_required(&self, params: &Value) -> Result<(), GatewayError> {
        let fields = params.as_object();
        for name in self.required_fields() {
            match fields.and_then(|f| f.get(*name)) {
                None | Some(Value::Null) => return Err(GatewayError::missing_parameter(*name)),
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s || op.alias() == Some(s))
            .ok_or_else(|| GatewayError::unknown_operation(s))
    }
}

fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

/// Catalog entry describing one operation to the protocol layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<&'static str>,
    pub description: &'static str,
    pub required: Vec<&'static str>,
    pub input_schema: Value,
}

/// Describe every operation.
pub fn catalog() -> Vec<OperationDescriptor> {
    Operation::ALL
        .iter()
        .map(|op| OperationDescriptor {
            name: op.as_str(),
            alias: op.alias(),
            description: op.description(),
            required: op.required_fields().to_vec(),
            input_schema: op.input_schema(),
        })
        .collect()
}

/// A validated operation, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Cacheable read returning `{data, count}`.
    Read { key: String, request: RemoteRequest },
    /// Mutation or procedure call returning `{success: true, data}`.
    Write { request: RemoteRequest },
    /// Row count returning `{count}`.
    Count { request: RemoteRequest },
    /// Two reads returning `{tables, columns}`.
    Schema {
        tables: RemoteRequest,
        columns: RemoteRequest,
    },
    /// Metrics snapshot, no remote call.
    Metrics,
}

/// Validate parameters for a single (non-batch) operation and build its plan.
pub fn plan(op: Operation, params: Value, config: &Config) -> Result<Plan, GatewayError> {
    let params = normalize_params(params)?;
    op.validate_required(&params)?;

    match op {
        Operation::Query => {
            let input: QueryInput = parse_input(params)?;
            let fields = serde_json::to_value(&input).map_err(|e| {
                GatewayError::internal(format!("Failed to encode query parameters: {}", e))
            })?;
            let key = fingerprint(op.as_str(), &fields);
            let query = build_query(&input, config.query.default_page_size)?;
            Ok(Plan::Read {
                key,
                request: query.into(),
            })
        }
        Operation::Insert => {
            let input: InsertInput = parse_input(params)?;
            validate_table_name(&input.table)?;
            check_rows(&input.data)?;
            let query = with_returning(
                RemoteRequest::from(input.table).insert(input.data),
                input.returning,
            );
            Ok(Plan::Write { request: query.into() })
        }
        Operation::Update => {
            let input: UpdateInput = parse_input(params)?;
            validate_table_name(&input.table)?;
            if input.data.is_empty() {
                return Err(GatewayError::invalid_parameter("data", "must set at least one column"));
            }
            check_columns(input.data.keys())?;
            require_filters(&input.filters)?;
            let query = RemoteRequest::from(input.table).update(Value::Object(input.data));
            let query = filter::compile_onto(query, &input.filters)?;
            Ok(Plan::Write {
                request: with_returning(query, input.returning).into(),
            })
        }
        Operation::Delete => {
            let input: DeleteInput = parse_input(params)?;
            validate_table_name(&input.table)?;
            require_filters(&input.filters)?;
            let query =
                filter::compile_onto(RemoteRequest::from(input.table).delete(), &input.filters)?;
            Ok(Plan::Write {
                request: with_returning(query, input.returning).into(),
            })
        }
        Operation::Upsert => {
            let input: UpsertInput = parse_input(params)?;
            validate_table_name(&input.table)?;
            check_rows(&input.data)?;
            let on_conflict = match input.on_conflict {
                Some(cols) => Some(check_conflict_columns(&cols)?),
                None => None,
            };
            let query = RemoteRequest::from(input.table).upsert(input.data, on_conflict);
            Ok(Plan::Write {
                request: with_returning(query, input.returning).into(),
            })
        }
        Operation::Rpc => {
            let input: RpcInput = parse_input(params)?;
            validate_table_name(&input.function_name)?;
            Ok(Plan::Write {
                request: RemoteRequest::rpc(input.function_name, Value::Object(input.params)),
            })
        }
        Operation::Count => {
            let input: CountInput = parse_input(params)?;
            validate_table_name(&input.table)?;
            let query = filter::compile_onto(
                RemoteRequest::from(input.table).select_count(true),
                &input.filters,
            )?;
            Ok(Plan::Count { request: query.into() })
        }
        Operation::Schema => {
            let input: SchemaInput = parse_input(params)?;
            let (tables, columns) = build_schema(&config.supabase.schema, input.table.as_deref())?;
            Ok(Plan::Schema {
                tables: tables.into(),
                columns: columns.into(),
            })
        }
        Operation::Metrics => Ok(Plan::Metrics),
        Operation::Batch => Err(GatewayError::invalid_parameter(
            "operation",
            "batch cannot be nested inside a batch",
        )),
    }
}

/// Parse and validate `batch` parameters.
pub fn parse_batch(params: Value) -> Result<BatchInput, GatewayError> {
    let params = normalize_params(params)?;
    Operation::Batch.validate_required(&params)?;
    parse_input(params)
}

/// Build the read request for a `query` operation.
pub fn build_query(input: &QueryInput, default_page_size: u64) -> Result<TableQuery, GatewayError> {
    validate_table_name(&input.table)?;

    let select = if input.select.trim().is_empty() {
        "*"
    } else {
        input.select.as_str()
    };
    let mut query = filter::compile_onto(
        RemoteRequest::from(input.table.as_str()).select(select),
        &input.filters,
    )?;

    if let Some(order) = &input.order {
        validate_identifier(&order.column)?;
        query = query.order(order.column.as_str(), order.ascending);
    }

    if input.limit == Some(0) {
        return Err(GatewayError::invalid_parameter("limit", "must be a positive integer"));
    }

    query = match (input.offset, input.limit) {
        (Some(offset), limit) if offset > 0 => {
            let page = limit.unwrap_or(default_page_size).max(1);
            let last = offset.checked_add(page - 1).ok_or_else(|| {
                GatewayError::invalid_parameter("offset", "offset + limit overflows")
            })?;
            query.range(offset, last)
        }
        (_, Some(limit)) => query.limit(limit),
        _ => query,
    };

    if input.single {
        query = query.single();
    }

    Ok(query)
}

/// Table and column listings for `schema`, scoped to `schema` and optionally one table.
fn build_schema(
    schema: &str,
    table: Option<&str>,
) -> Result<(TableQuery, TableQuery), GatewayError> {
    let tables = RemoteRequest::from("information_schema.tables")
        .select("*")
        .eq("table_schema", Value::String(schema.to_string()));
    let columns = RemoteRequest::from("information_schema.columns")
        .select("*")
        .eq("table_schema", Value::String(schema.to_string()));

    match table {
        Some(name) => {
            validate_identifier(name)?;
            let name = Value::String(name.to_string());
            Ok((
                tables.eq("table_name", name.clone()),
                columns.eq("table_name", name).order("ordinal_position", true),
            ))
        }
        None => Ok((tables, columns)),
    }
}

fn normalize_params(params: Value) -> Result<Value, GatewayError> {
    match params {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(params),
        _ => Err(GatewayError::invalid_parameter("parameters", "must be an object")),
    }
}

fn parse_input<T: DeserializeOwned>(params: Value) -> Result<T, GatewayError> {
    serde_json::from_value(params)
        .map_err(|e| GatewayError::invalid_parameter("parameters", e.to_string()))
}

fn with_returning(query: TableQuery, returning: bool) -> TableQuery {
    if returning {
        query.returning()
    } else {
        query
    }
}

fn require_filters(filters: &[filter::FilterCondition]) -> Result<(), GatewayError> {
    if filters.is_empty() {
        return Err(GatewayError::invalid_parameter(
            "filters",
            "must contain at least one condition",
        ));
    }
    Ok(())
}

/// Rows for insert/upsert: one object or a non-empty array of objects.
fn check_rows(data: &Value) -> Result<(), GatewayError> {
    match data {
        Value::Object(row) => check_columns(row.keys()),
        Value::Array(rows) if !rows.is_empty() => {
            for row in rows {
                match row {
                    Value::Object(row) => check_columns(row.keys())?,
                    _ => {
                        return Err(GatewayError::invalid_parameter(
                            "data",
                            "array items must be objects",
                        ))
                    }
                }
            }
            Ok(())
        }
        Value::Array(_) => Err(GatewayError::invalid_parameter("data", "must not be empty")),
        _ => Err(GatewayError::invalid_parameter(
            "data",
            "must be an object or an array of objects",
        )),
    }
}

fn check_columns<'a>(columns: impl Iterator<Item = &'a String>) -> Result<(), GatewayError> {
    for column in columns {
        validate_identifier(column)?;
    }
    Ok(())
}

fn check_conflict_columns(columns: &str) -> Result<String, GatewayError> {
    let parts: Vec<&str> = columns.split(',').map(str::trim).collect();
    for part in &parts {
        validate_identifier(part)?;
    }
    Ok(parts.join(","))
}
