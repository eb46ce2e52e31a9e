//! HTTP adapter for PostgREST-compatible endpoints (Supabase `/rest/v1`).

use super::{
    DataAdapter, RemoteError, RemoteRequest, RemoteResponse, RpcCall, TableAction, TableQuery,
};
use crate::config::SupabaseConfig;
use crate::error::GatewayError;
use crate::filter::{FilterOperator, Predicate};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde_json::Value;
use tracing::debug;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// PostgREST adapter built on `reqwest`.
#[derive(Clone)]
pub struct PostgrestAdapter {
    client: Client,
    rest_url: String,
}

impl PostgrestAdapter {
    /// Create an adapter for the configured project.
    pub fn new(config: &SupabaseConfig) -> Result<Self, GatewayError> {
        Self::with_builder(config, Client::builder())
    }

    fn with_builder(config: &SupabaseConfig, builder: ClientBuilder) -> Result<Self, GatewayError> {
        let base = config.url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(GatewayError::config(format!(
                "Project URL must be an http(s) URL, got '{}'",
                config.url
            )));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| GatewayError::config("API key contains invalid header characters"))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| GatewayError::config("API key contains invalid header characters"))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = builder
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", base),
        })
    }

    async fn send_table(&self, query: &TableQuery) -> RemoteResponse {
        let (profile, table) = split_profile(&query.table);
        let url = format!("{}/{}", self.rest_url, table);

        let (method, body) = match &query.action {
            TableAction::Select { head: true, .. } => (Method::HEAD, None),
            TableAction::Select { .. } => (Method::GET, None),
            TableAction::Insert { rows } | TableAction::Upsert { rows, .. } => {
                (Method::POST, Some(rows))
            }
            TableAction::Update { patch } => (Method::PATCH, Some(patch)),
            TableAction::Delete => (Method::DELETE, None),
        };

        let mut request = self
            .client
            .request(method.clone(), &url)
            .query(&query_params(query));

        if let Some(prefer) = prefer_header(query) {
            request = request.header("Prefer", prefer);
        }
        if query.single {
            request = request.header(ACCEPT, SINGLE_OBJECT);
        }
        if let Some(schema) = profile {
            let header = if method == Method::GET || method == Method::HEAD {
                "Accept-Profile"
            } else {
                "Content-Profile"
            };
            request = request.header(header, schema);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("PostgREST {} {}", method, url);
        self.finish(request).await
    }

    async fn send_rpc(&self, call: &RpcCall) -> RemoteResponse {
        let (profile, function) = split_profile(&call.function);
        let url = format!("{}/rpc/{}", self.rest_url, function);

        let mut request = self.client.post(&url).json(&call.params);
        if let Some(schema) = profile {
            request = request.header("Content-Profile", schema);
        }

        debug!("PostgREST POST {}", url);
        self.finish(request).await
    }

    async fn finish(&self, request: reqwest::RequestBuilder) -> RemoteResponse {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return RemoteResponse::failed(transport_error(&e)),
        };

        let status = response.status();
        let count = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return RemoteResponse::failed(transport_error(&e)),
        };

        if !status.is_success() {
            return RemoteResponse::failed(error_from_body(status, &body));
        }

        let data = if body.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&body) {
                Ok(data) => data,
                Err(e) => {
                    return RemoteResponse::failed(
                        RemoteError::new(format!("Malformed response body: {}", e))
                            .with_status(status.as_u16()),
                    )
                }
            }
        };

        RemoteResponse {
            data: Some(data),
            error: None,
            count,
        }
    }
}

#[async_trait]
impl DataAdapter for PostgrestAdapter {
    fn name(&self) -> &'static str {
        "postgrest"
    }

    async fn execute(&self, request: &RemoteRequest) -> RemoteResponse {
        match request {
            RemoteRequest::Table(query) => self.send_table(query).await,
            RemoteRequest::Rpc(call) => self.send_rpc(call).await,
        }
    }
}

fn needs_quoting(s: &str) -> bool {
    s.contains([',', '(', ')', '{', '}', '"', '\\', ' '])
}

/// Split `schema.name` into a profile header value and the bare name.
fn split_profile(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, bare)) => (Some(schema), bare),
        None => (None, name),
    }
}

fn transport_error(e: &reqwest::Error) -> RemoteError {
    let err = RemoteError::new(e.to_string());
    match e.status() {
        Some(status) => err.with_status(status.as_u16()),
        None => err,
    }
}

fn error_from_body(status: StatusCode, body: &str) -> RemoteError {
    let mut err = serde_json::from_str::<RemoteError>(body).unwrap_or_else(|_| {
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.to_string()
        };
        RemoteError::new(message)
    });
    err.status = Some(status.as_u16());
    err
}

fn prefer_header(query: &TableQuery) -> Option<String> {
    let mut prefs = Vec::new();
    match &query.action {
        TableAction::Select { count: true, .. } => prefs.push("count=exact"),
        TableAction::Select { .. } => {}
        TableAction::Upsert { .. } => {
            prefs.push("resolution=merge-duplicates");
            prefs.push(returning(query));
        }
        _ => prefs.push(returning(query)),
    }
    if prefs.is_empty() {
        None
    } else {
        Some(prefs.join(","))
    }
}

fn returning(query: &TableQuery) -> &'static str {
    if query.returning {
        "return=representation"
    } else {
        "return=minimal"
    }
}

/// Query-string parameters for a table request.
fn query_params(query: &TableQuery) -> Vec<(String, String)> {
    let mut params = Vec::new();

    match &query.action {
        TableAction::Select { columns, .. } => params.push(("select".to_string(), columns.clone())),
        TableAction::Upsert {
            on_conflict: Some(cols),
            ..
        } => params.push(("on_conflict".to_string(), cols.clone())),
        _ => {}
    }
    if query.action.is_mutation() && query.returning {
        params.push(("select".to_string(), "*".to_string()));
    }

    for predicate in &query.filters {
        params.push((predicate.column.clone(), encode_predicate(predicate)));
    }

    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }

    match (query.range, query.limit) {
        (Some((from, to)), _) => {
            params.push(("offset".to_string(), from.to_string()));
            params.push(("limit".to_string(), (to.saturating_sub(from) + 1).to_string()));
        }
        (None, Some(limit)) => params.push(("limit".to_string(), limit.to_string())),
        (None, None) => {}
    }

    params
}

/// Encode one predicate as a PostgREST `op.value` expression.
fn encode_predicate(predicate: &Predicate) -> String {
    let value = &predicate.value;
    match predicate.operator {
        FilterOperator::Eq => format!("eq.{}", scalar(value)),
        FilterOperator::Neq => format!("neq.{}", scalar(value)),
        FilterOperator::Gt => format!("gt.{}", scalar(value)),
        FilterOperator::Gte => format!("gte.{}", scalar(value)),
        FilterOperator::Lt => format!("lt.{}", scalar(value)),
        FilterOperator::Lte => format!("lte.{}", scalar(value)),
        FilterOperator::Like => format!("like.{}", scalar(value)),
        FilterOperator::Ilike => format!("ilike.{}", scalar(value)),
        FilterOperator::Is => format!("is.{}", scalar(value)),
        FilterOperator::In => format!("in.({})", list(value)),
        FilterOperator::Contains => format!("cs.{}", container(value)),
        FilterOperator::ContainedBy => format!("cd.{}", container(value)),
        FilterOperator::Overlaps => format!("ov.{{{}}}", list(value)),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Comma-separated items, quoting strings that carry reserved characters.
fn list(value: &Value) -> String {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) if needs_quoting(s) => {
                format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            other => scalar(other),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Arrays become `{a,b}`; objects are sent as JSON.
fn container(value: &Value) -> String {
    match value {
        Value::Array(_) => format!("{{{}}}", list(value)),
        other => other.to_string(),
    }
}

/// Total row count from a `Content-Range` header such as `0-9/42` or `*/42`.
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn predicate(op: FilterOperator, value: Value) -> Predicate {
        Predicate {
            column: "col".to_string(),
            operator: op,
            value,
        }
    }

    #[test]
    fn test_encode_scalar_operators() {
        assert_eq!(encode_predicate(&predicate(FilterOperator::Gte, json!(18))), "gte.18");
        assert_eq!(encode_predicate(&predicate(FilterOperator::Eq, json!("NL"))), "eq.NL");
        assert_eq!(encode_predicate(&predicate(FilterOperator::Is, json!(null))), "is.null");
        assert_eq!(
            encode_predicate(&predicate(FilterOperator::Ilike, json!("%smith%"))),
            "ilike.%smith%"
        );
    }

    #[test]
    fn test_encode_collection_operators() {
        assert_eq!(
            encode_predicate(&predicate(FilterOperator::In, json!(["a", "b c", 3]))),
            "in.(a,\"b c\",3)"
        );
        assert_eq!(
            encode_predicate(&predicate(FilterOperator::Contains, json!(["x", "y"]))),
            "cs.{x,y}"
        );
        assert_eq!(
            encode_predicate(&predicate(FilterOperator::ContainedBy, json!({"tier": "gold"}))),
            "cd.{\"tier\":\"gold\"}"
        );
        assert_eq!(
            encode_predicate(&predicate(FilterOperator::Overlaps, json!([1, 2]))),
            "ov.{1,2}"
        );
    }

    #[test]
    fn test_query_params_for_paged_select() {
        let query = RemoteRequest::from("users")
            .select("id,name")
            .gte("age", json!(18))
            .order("name", true)
            .range(20, 29);

        assert_eq!(
            query_params(&query),
            vec![
                ("select".to_string(), "id,name".to_string()),
                ("age".to_string(), "gte.18".to_string()),
                ("order".to_string(), "name.asc".to_string()),
                ("offset".to_string(), "20".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_prefer_header() {
        let insert = RemoteRequest::from("orders").insert(json!({"id": 1})).returning();
        assert_eq!(prefer_header(&insert).as_deref(), Some("return=representation"));

        let upsert = RemoteRequest::from("orders").upsert(json!([]), Some("id".to_string()));
        assert_eq!(
            prefer_header(&upsert).as_deref(),
            Some("resolution=merge-duplicates,return=minimal")
        );

        let count = RemoteRequest::from("orders").select_count(true);
        assert_eq!(prefer_header(&count).as_deref(), Some("count=exact"));

        assert_eq!(prefer_header(&RemoteRequest::from("orders")), None);
    }

    #[test]
    fn test_mutation_with_returning_selects_rows() {
        let query = RemoteRequest::from("orders")
            .delete()
            .eq("id", json!(1))
            .returning();
        let params = query_params(&query);
        assert_eq!(params[0], ("select".to_string(), "*".to_string()));
        assert_eq!(params[1], ("id".to_string(), "eq.1".to_string()));
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-9/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_error_from_body() {
        let err = error_from_body(
            StatusCode::CONFLICT,
            r#"{"message":"duplicate key","code":"23505","details":null,"hint":null}"#,
        );
        assert_eq!(err.code.as_deref(), Some("23505"));
        assert_eq!(err.status, Some(409));

        let err = error_from_body(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.message, "Bad Gateway");
        assert_eq!(err.status, Some(502));
    }

    #[test]
    fn test_split_profile() {
        assert_eq!(
            split_profile("information_schema.tables"),
            (Some("information_schema"), "tables")
        );
        assert_eq!(split_profile("users"), (None, "users"));
    }

    // =====================================================================
    // HTTP round trips against a loopback listener
    // =====================================================================

    fn adapter_for(url: String) -> PostgrestAdapter {
        let config = SupabaseConfig {
            url,
            api_key: "anon-key".to_string(),
            ..Default::default()
        };
        PostgrestAdapter::with_builder(&config, Client::builder().no_proxy()).unwrap()
    }

    /// Serve one canned response and hand back the raw request, lowercased.
    async fn serve_once(response: String) -> (PostgrestAdapter, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];

            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                raw.extend_from_slice(&chunk[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&raw[..header_end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while raw.len() < header_end + body_len {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
            }

            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&raw).to_lowercase()
        });

        (adapter_for(format!("http://{}", addr)), handle)
    }

    fn http_response(status: &str, headers: &[&str], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {}\r\n", status);
        for header in headers {
            out.push_str(header);
            out.push_str("\r\n");
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));
        out
    }

    fn header_lines<'a>(request: &'a str, name: &str) -> Vec<&'a str> {
        let prefix = format!("{}:", name);
        request
            .lines()
            .filter(|line| line.starts_with(&prefix))
            .collect()
    }

    #[tokio::test]
    async fn test_select_sends_auth_and_filters() {
        let (adapter, server) =
            serve_once(http_response("200 OK", &[], r#"[{"id":1,"age":30}]"#)).await;

        let request: RemoteRequest = RemoteRequest::from("users")
            .select("id,age")
            .gte("age", json!(18))
            .into();
        let response = adapter.execute(&request).await;
        let raw = server.await.unwrap();

        assert!(response.error.is_none());
        assert_eq!(response.data, Some(json!([{"id": 1, "age": 30}])));
        assert!(raw.starts_with("get /rest/v1/users?select=id%2cage&age=gte.18 "));
        assert_eq!(header_lines(&raw, "apikey"), vec!["apikey: anon-key"]);
        assert_eq!(header_lines(&raw, "authorization"), vec!["authorization: bearer anon-key"]);
    }

    #[tokio::test]
    async fn test_unavailable_is_retryable() {
        let (adapter, server) =
            serve_once(http_response("503 Service Unavailable", &[], "upstream down")).await;

        let response = adapter.execute(&RemoteRequest::from("users").into()).await;
        server.await.unwrap();

        let err = response.error.unwrap();
        assert_eq!(err.status, Some(503));
        assert_eq!(err.message, "upstream down");
        assert!(response.data.is_none());
        assert!(GatewayError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_conflict_body_is_parsed() {
        let body = json!({
            "message": "duplicate key value violates unique constraint",
            "code": "23505",
            "details": "Key (id)=(1) already exists.",
            "hint": null
        })
        .to_string();
        let (adapter, server) = serve_once(http_response(
            "409 Conflict",
            &["Content-Type: application/json"],
            &body,
        ))
        .await;

        let request = RemoteRequest::from("orders").insert(json!({"id": 1}));
        let response = adapter.execute(&request.into()).await;
        server.await.unwrap();

        let err = response.error.unwrap();
        assert_eq!(err.status, Some(409));
        assert_eq!(err.code.as_deref(), Some("23505"));
        assert_eq!(err.details.as_deref(), Some("Key (id)=(1) already exists."));
        assert!(err.hint.is_none());
        assert!(err.message.starts_with("duplicate key"));
        assert!(!GatewayError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_head_count_reads_content_range() {
        let (adapter, server) =
            serve_once(http_response("200 OK", &["Content-Range: */42"], "")).await;

        let request = RemoteRequest::from("orders").select_count(true);
        let response = adapter.execute(&request.into()).await;
        let raw = server.await.unwrap();

        assert!(response.error.is_none());
        assert_eq!(response.count, Some(42));
        assert!(raw.starts_with("head /rest/v1/orders"));
        assert_eq!(header_lines(&raw, "prefer"), vec!["prefer: count=exact"]);
    }

    #[tokio::test]
    async fn test_single_sends_one_accept_header() {
        let (adapter, server) = serve_once(http_response("200 OK", &[], r#"{"id":7}"#)).await;

        let request = RemoteRequest::from("users").eq("id", json!(7)).single();
        let response = adapter.execute(&request.into()).await;
        let raw = server.await.unwrap();

        assert_eq!(response.data, Some(json!({"id": 7})));
        assert_eq!(
            header_lines(&raw, "accept"),
            vec!["accept: application/vnd.pgrst.object+json"]
        );
    }

    #[tokio::test]
    async fn test_schema_qualified_read_sets_accept_profile() {
        let (adapter, server) = serve_once(http_response("200 OK", &[], "[]")).await;

        let request = RemoteRequest::from("information_schema.tables").select("table_name");
        adapter.execute(&request.into()).await;
        let raw = server.await.unwrap();

        assert!(raw.starts_with("get /rest/v1/tables?"));
        assert_eq!(
            header_lines(&raw, "accept-profile"),
            vec!["accept-profile: information_schema"]
        );
        assert!(header_lines(&raw, "content-profile").is_empty());
    }

    #[tokio::test]
    async fn test_schema_qualified_insert_sets_content_profile() {
        let (adapter, server) = serve_once(http_response("201 Created", &[], "")).await;

        let request = RemoteRequest::from("audit.events").insert(json!([{"kind": "login"}]));
        let response = adapter.execute(&request.into()).await;
        let raw = server.await.unwrap();

        assert!(response.error.is_none());
        assert_eq!(response.data, Some(Value::Null));
        assert!(raw.starts_with("post /rest/v1/events "));
        assert_eq!(header_lines(&raw, "content-profile"), vec!["content-profile: audit"]);
        assert_eq!(header_lines(&raw, "prefer"), vec!["prefer: return=minimal"]);
        assert!(raw.ends_with(r#"[{"kind":"login"}]"#));
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let (adapter, server) = serve_once(http_response("204 No Content", &[], "")).await;

        let request = RemoteRequest::from("orders").delete().eq("id", json!(1));
        let response = adapter.execute(&request.into()).await;
        let raw = server.await.unwrap();

        assert!(raw.starts_with("delete /rest/v1/orders?id=eq.1 "));
        assert!(response.error.is_none());
        assert_eq!(response.data, Some(Value::Null));
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let (adapter, server) = serve_once(http_response("200 OK", &[], "<html>oops")).await;

        let response = adapter.execute(&RemoteRequest::from("users").into()).await;
        server.await.unwrap();

        let err = response.error.unwrap();
        assert_eq!(err.status, Some(200));
        assert!(err.message.starts_with("Malformed response body"));
        assert!(!GatewayError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_rpc_posts_params() {
        let (adapter, server) = serve_once(http_response("200 OK", &[], "5")).await;

        let request = RemoteRequest::rpc("api.add_numbers", json!({"a": 2, "b": 3}));
        let response = adapter.execute(&request).await;
        let raw = server.await.unwrap();

        assert_eq!(response.data, Some(json!(5)));
        assert!(raw.starts_with("post /rest/v1/rpc/add_numbers "));
        assert_eq!(header_lines(&raw, "content-profile"), vec!["content-profile: api"]);
        assert!(raw.ends_with(r#"{"a":2,"b":3}"#));
    }

    #[tokio::test]
    async fn test_connection_refused_has_no_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let adapter = adapter_for(format!("http://{}", addr));
        let response = adapter.execute(&RemoteRequest::from("users").into()).await;

        let err = response.error.unwrap();
        assert_eq!(err.status, None);
        assert!(err.code.is_none());
        assert!(GatewayError::from(err).is_retryable());
    }
}
