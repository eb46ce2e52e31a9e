//! Operation input types with JSON Schema generation.

use crate::constants::DEFAULT_SELECT;
use crate::filter::FilterCondition;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Operation;

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    #[schemars(description = "Column to order by")]
    pub column: String,

    #[serde(default = "default_true")]
    #[schemars(description = "Ascending order (default: true)")]
    pub ascending: bool,
}

/// Input for the `query` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryInput {
    #[schemars(description = "Table name")]
    pub table: String,

    #[serde(default = "default_select")]
    #[schemars(description = "Columns to select (default: *)")]
    pub select: String,

    #[serde(default)]
    #[schemars(description = "Filter conditions, all of which must hold")]
    pub filters: Vec<FilterCondition>,

    #[serde(default)]
    pub order: Option<OrderInput>,

    #[serde(default)]
    #[schemars(description = "Maximum number of rows (positive)")]
    pub limit: Option<u64>,

    #[serde(default)]
    #[schemars(description = "Rows to skip; without a limit a default page size applies")]
    pub offset: Option<u64>,

    #[serde(default)]
    #[schemars(description = "Return a single record")]
    pub single: bool,
}

/// Input for the `insert` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertInput {
    #[schemars(description = "Table name")]
    pub table: String,

    #[schemars(description = "Single record (object) or multiple records (array of objects)")]
    pub data: Value,

    #[serde(default = "default_true")]
    #[schemars(description = "Return inserted data (default: true)")]
    pub returning: bool,
}

/// Input for the `update` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInput {
    #[schemars(description = "Table name")]
    pub table: String,

    #[schemars(description = "Column values to set")]
    pub data: Map<String, Value>,

    #[schemars(description = "Filter conditions selecting the rows to update")]
    pub filters: Vec<FilterCondition>,

    #[serde(default = "default_true")]
    #[schemars(description = "Return updated data (default: true)")]
    pub returning: bool,
}

/// Input for the `delete` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteInput {
    #[schemars(description = "Table name")]
    pub table: String,

    #[schemars(description = "Filter conditions selecting the rows to delete")]
    pub filters: Vec<FilterCondition>,

    #[serde(default = "default_true")]
    #[schemars(description = "Return deleted data (default: true)")]
    pub returning: bool,
}

/// Input for the `upsert` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertInput {
    #[schemars(description = "Table name")]
    pub table: String,

    #[schemars(description = "Single record (object) or multiple records (array of objects)")]
    pub data: Value,

    #[serde(default)]
    #[schemars(description = "Column(s) to check for conflicts, comma separated")]
    pub on_conflict: Option<String>,

    #[serde(default = "default_true")]
    #[schemars(description = "Return upserted data (default: true)")]
    pub returning: bool,
}

/// Input for the `rpc` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RpcInput {
    #[schemars(description = "Remote procedure name")]
    pub function_name: String,

    #[serde(default)]
    #[schemars(description = "Function parameters (default: {})")]
    pub params: Map<String, Value>,
}

/// Input for the `count` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountInput {
    #[schemars(description = "Table name")]
    pub table: String,

    #[serde(default)]
    #[schemars(description = "Filter conditions")]
    pub filters: Vec<FilterCondition>,
}

/// Input for the `schema` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInput {
    #[serde(default)]
    #[schemars(description = "Table name (optional, returns all tables if not specified)")]
    pub table: Option<String>,
}

/// Input for the `metrics` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricsInput {}

/// Input for the `batch` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchInput {
    #[schemars(description = "Operations to run in order; each one succeeds or fails on its own")]
    pub operations: Vec<BatchItem>,
}

/// Table operation allowed inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
}

impl BatchAction {
    /// Operation this item dispatches to.
    pub fn operation(&self) -> Operation {
        match self {
            BatchAction::Select => Operation::Query,
            BatchAction::Insert => Operation::Insert,
            BatchAction::Update => Operation::Update,
            BatchAction::Delete => Operation::Delete,
            BatchAction::Upsert => Operation::Upsert,
        }
    }
}

/// One item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub table: String,

    pub operation: BatchAction,

    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default)]
    #[schemars(
        description = "Remaining parameters of the operation (filters, order, returning, ...)"
    )]
    pub options: Option<Map<String, Value>>,
}

impl BatchItem {
    /// Parameters for the item's own dispatch: `options` merged with `table` and `data`.
    pub fn params(&self) -> Value {
        let mut params = self.options.clone().unwrap_or_default();
        params.insert("table".to_string(), Value::String(self.table.clone()));
        if let Some(data) = &self.data {
            params.insert("data".to_string(), data.clone());
        }
        Value::Object(params)
    }
}

fn default_true() -> bool {
    true
}

fn default_select() -> String {
    DEFAULT_SELECT.to_string()
}
