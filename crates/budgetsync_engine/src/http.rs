//! HTTP RPC executor.
//!
//! Calls each upsert procedure as `POST {base_url}/rpc/{procedure}` with the
//! named parameters as a JSON object, the convention PostgREST-style
//! gateways expose for stored procedures. The HTTP client is abstracted so
//! tests can script responses.

use budgetsync_protocol::ProcedureCall;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ExecuteError, StoreSide, SyncError, SyncResult};
use crate::executor::{ProcedureExecutor, TargetConnector};

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// `Err` means the request never produced a response (DNS, TLS, timeout,
/// refused connection).
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Checks that `url` answers at all. Any HTTP status counts as reachable.
    fn probe(&self, url: &str) -> Result<(), String>;
}

/// Executes procedure calls over HTTP.
pub struct HttpRpcExecutor<C: HttpClient> {
    base_url: String,
    client: Arc<C>,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRpcExecutor<C> {
    /// Creates an executor for the gateway at `base_url`.
    pub fn new(base_url: impl Into<String>, client: Arc<C>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Gateway base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Last transport or HTTP error.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Endpoint for `procedure`.
    pub fn endpoint(&self, procedure: &str) -> String {
        format!("{}/rpc/{}", self.base_url, procedure)
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }
}

impl<C: HttpClient> ProcedureExecutor for HttpRpcExecutor<C> {
    fn execute(&self, call: &ProcedureCall) -> Result<(), ExecuteError> {
        let params: serde_json::Map<String, serde_json::Value> = call
            .params()
            .iter()
            .map(|(name, value)| {
                serde_json::to_value(value).map(|value| ((*name).to_string(), value))
            })
            .collect::<Result<_, _>>()
            .map_err(|e| ExecuteError::rejected(format!("cannot encode parameters: {e}")))?;
        let body = serde_json::to_vec(&params)
            .map_err(|e| ExecuteError::rejected(format!("cannot encode parameters: {e}")))?;

        let url = self.endpoint(call.procedure());
        let response = self.client.post(&url, body).map_err(|e| {
            warn!(url = %url, error = %e, "RPC request failed");
            self.set_error(&e);
            self.connected.store(false, Ordering::SeqCst);
            ExecuteError::transient(e)
        })?;
        self.connected.store(true, Ordering::SeqCst);

        match response.status {
            200..=299 => {
                debug!(procedure = call.procedure(), id = call.record_id(), "RPC ok");
                Ok(())
            }
            status => {
                let message = format!("HTTP {status}: {}", error_message(&response.body));
                self.set_error(&message);
                if status == 408 || status == 429 || status >= 500 {
                    Err(ExecuteError::transient(message))
                } else {
                    Err(ExecuteError::rejected(message))
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Pulls `message` out of a JSON error body, or falls back to the raw text.
fn error_message(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = json.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(200) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Connects to an HTTP gateway, probing it first.
pub struct HttpConnector<C: HttpClient> {
    base_url: String,
    client: Arc<C>,
}

impl<C: HttpClient> HttpConnector<C> {
    /// Connector for the gateway at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client: Arc::new(client),
        }
    }

    /// Gateway base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl<C: HttpClient> TargetConnector for HttpConnector<C> {
    type Executor = HttpRpcExecutor<C>;

    fn connect(&self) -> SyncResult<HttpRpcExecutor<C>> {
        self.client
            .probe(&self.base_url)
            .map_err(|e| SyncError::connection(StoreSide::Secondary, e))?;
        debug!(url = %self.base_url, "Secondary store reachable");
        Ok(HttpRpcExecutor::new(self.base_url.clone(), Arc::clone(&self.client)))
    }
}

/// Blocking `reqwest` client sending the API key as both a bearer token
/// and an `apikey` header.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    api_key: Option<String>,
}

impl ReqwestClient {
    /// Creates a client with a per-request timeout.
    pub fn new(timeout: Duration, api_key: Option<String>) -> Result<Self, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { client, api_key })
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key).header("apikey", key),
            None => request,
        }
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let response = self.authorize(request).send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, body })
    }

    fn probe(&self, url: &str) -> Result<(), String> {
        self.authorize(self.client.get(url))
            .send()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetsync_protocol::{EntityRecord, ExpenseRecord};
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct TestClient {
        responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
        requests: Mutex<Vec<(String, serde_json::Value)>>,
        reachable: AtomicBool,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                reachable: AtomicBool::new(true),
                ..Default::default()
            }
        }

        fn respond(&self, response: Result<HttpResponse, String>) {
            self.responses.lock().push_back(response);
        }

        fn status(&self, status: u16, body: &str) {
            self.respond(Ok(HttpResponse {
                status,
                body: body.as_bytes().to_vec(),
            }));
        }
    }

    impl HttpClient for TestClient {
        fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
            let json = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
            self.requests.lock().push((url.to_string(), json));
            self.responses.lock().pop_front().unwrap_or(Ok(HttpResponse {
                status: 204,
                body: Vec::new(),
            }))
        }

        fn probe(&self, _url: &str) -> Result<(), String> {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err("connection refused".into())
            }
        }
    }

    fn expense_call() -> ProcedureCall {
        ExpenseRecord {
            id: 9,
            budget_id: 3,
            amount: dec!(42.50),
            description: None,
            date: NaiveDate::from_ymd_opt(2024, 3, 1),
        }
        .to_call()
    }

    #[test]
    fn posts_named_parameters() {
        let client = Arc::new(TestClient::new());
        let executor = HttpRpcExecutor::new("https://db.example.com/rest/v1/", Arc::clone(&client));

        executor.execute(&expense_call()).unwrap();

        let requests = client.requests.lock();
        let (url, body) = &requests[0];
        assert_eq!(url, "https://db.example.com/rest/v1/rpc/sync_expense");
        assert_eq!(body["id"], 9);
        assert_eq!(body["budget_id"], 3);
        assert_eq!(body["expense_date"], "2024-03-01");
        assert_eq!(body["description"], serde_json::Value::Null);
    }

    #[test]
    fn status_classification() {
        let client = Arc::new(TestClient::new());
        let executor = HttpRpcExecutor::new("http://gw", Arc::clone(&client));

        client.status(409, r#"{"message":"insert or update violates foreign key constraint"}"#);
        let err = executor.execute(&expense_call()).unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("foreign key"));

        client.status(503, "upstream unavailable");
        let err = executor.execute(&expense_call()).unwrap_err();
        assert!(err.retryable);
        assert!(executor.is_connected());
        assert_eq!(executor.last_error().as_deref(), Some("HTTP 503: upstream unavailable"));
    }

    #[test]
    fn transport_errors_mark_disconnected() {
        let client = Arc::new(TestClient::new());
        let executor = HttpRpcExecutor::new("http://gw", Arc::clone(&client));

        client.respond(Err("connection reset".into()));
        let err = executor.execute(&expense_call()).unwrap_err();
        assert!(err.retryable);
        assert!(!executor.is_connected());

        executor.execute(&expense_call()).unwrap();
        assert!(executor.is_connected());
    }

    #[test]
    fn connector_probes_gateway() {
        let client = TestClient::new();
        client.reachable.store(false, Ordering::SeqCst);
        let connector = HttpConnector::new("http://gw", client);
        assert!(matches!(
            connector.connect(),
            Err(SyncError::Connection {
                store: StoreSide::Secondary,
                ..
            })
        ));

        connector.client.reachable.store(true, Ordering::SeqCst);
        let executor = connector.connect().unwrap();
        assert_eq!(executor.endpoint("sync_user"), "http://gw/rpc/sync_user");
        executor.close().unwrap();
        assert!(!executor.is_connected());
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(500);
        let message = error_message(body.as_bytes());
        assert!(message.ends_with("..."));
        assert_eq!(message.len(), 203);
    }
}
