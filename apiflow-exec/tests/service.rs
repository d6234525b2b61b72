use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use apiflow_core::{ParamMap, RouteTemplate, ServiceConfig};
use apiflow_exec::client::{HttpClient, HttpError, ResponseParts};
use apiflow_exec::error::ServiceError;
use apiflow_exec::service::{ApiService, RequestParts};
use apiflow_exec::ServiceBuilder;

fn params(v: JsonValue) -> ParamMap {
    v.as_object().expect("object").clone()
}

fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

struct MockHttpClient {
    response: ResponseParts,
    requests: Mutex<Vec<RequestParts>>,
}

impl MockHttpClient {
    fn ok_json(body: JsonValue) -> Self {
        Self::with_status(200, body.to_string().into_bytes())
    }

    fn with_status(status: u16, body: Vec<u8>) -> Self {
        Self {
            response: ResponseParts {
                status,
                headers: BTreeMap::new(),
                body,
            },
            requests: Mutex::new(Vec::new()),
        }
    }

    fn last_request(&self) -> RequestParts {
        self.requests.lock().unwrap().last().cloned().expect("a request was sent")
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(
        &self,
        req: RequestParts,
        _timeout: Option<Duration>,
    ) -> Result<ResponseParts, HttpError> {
        self.requests.lock().unwrap().push(req);
        Ok(self.response.clone())
    }
}

fn user_service(mock: Arc<MockHttpClient>) -> ApiService {
    ServiceBuilder::new()
        .with_http_client(mock)
        .with_service("TestAPI", "http://api.test")
        .with_service_token("TestAPI", "test-token")
        .with_template(
            "TestAPI",
            "GetUser",
            RouteTemplate::new("GET", "/api/{{version}}/users/{{user_id}}")
                .with_header("X-Test-Header", "test-value"),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn performs_templated_request_end_to_end() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({
        "id": 123,
        "name": "Test User",
        "email": "test@example.com",
    })));
    let service = user_service(mock.clone());

    let result: ParamMap = service
        .perform_request(
            "TestAPI",
            "GetUser",
            &params(json!({"version": "v1", "user_id": "123"})),
        )
        .await
        .unwrap()
        .expect("non-empty response");

    assert_eq!(result.get("id"), Some(&json!(123)));
    assert_eq!(result.get("name"), Some(&json!("Test User")));

    let req = mock.last_request();
    assert_eq!(req.method, "GET");
    assert_eq!(req.url, "http://api.test/api/v1/users/123");
    assert!(!req.url.contains("{{"));
    assert_eq!(
        req.headers.get("X-Test-Header").map(String::as_str),
        Some("test-value")
    );
    assert_eq!(
        req.headers.get("Authorization").map(String::as_str),
        Some("Bearer test-token")
    );
    assert!(req.body.is_none());
}

#[tokio::test]
async fn missing_required_path_parameter_fails() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({})));
    let service = user_service(mock);

    let err = service
        .prepare_request("TestAPI", "GetUser", &params(json!({"version": "v1"})))
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingPathParam(ref p) if p == "user_id"));
}

#[tokio::test]
async fn optional_path_segment_is_dropped_when_absent() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({})));
    let service = ServiceBuilder::new()
        .with_http_client(mock)
        .with_service("api", "http://api.test")
        .with_template(
            "api",
            "posts",
            RouteTemplate::new("GET", "/users/{{id}}/posts/{{post_id?}}"),
        )
        .build()
        .unwrap();

    let with_both = service
        .prepare_request("api", "posts", &params(json!({"id": "7", "post_id": "9"})))
        .unwrap();
    assert_eq!(with_both.url, "http://api.test/users/7/posts/9");

    let without = service
        .prepare_request("api", "posts", &params(json!({"id": "7"})))
        .unwrap();
    assert_eq!(without.url, "http://api.test/users/7/posts");
}

#[tokio::test]
async fn parameter_layers_merge_with_call_precedence() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({})));
    let service = ServiceBuilder::new()
        .with_http_client(mock)
        .with_service("api", "http://api.test")
        .with_service_default_params(
            "api",
            params(json!({"p": "default", "d": "default-only"})),
        )
        .with_service_params("api", params(json!({"p": "global", "q": "global"})))
        .with_template(
            "api",
            "search",
            RouteTemplate::new("GET", "/search").with_query_params(params(json!({
                "p": "{{p}}",
                "q": "{{q}}",
                "d": "{{d}}",
            }))),
        )
        .build()
        .unwrap();

    let req = service
        .prepare_request("api", "search", &params(json!({"p": "call"})))
        .unwrap();

    let url = url::Url::parse(&req.url).unwrap();
    let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(query.get("p").map(String::as_str), Some("call"));
    assert_eq!(query.get("q").map(String::as_str), Some("global"));
    assert_eq!(query.get("d").map(String::as_str), Some("default-only"));
}

#[tokio::test]
async fn header_layers_override_in_order() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({})));
    let service = ServiceBuilder::new()
        .with_http_client(mock)
        .with_service("api", "http://api.test")
        .with_service_token("api", "tok")
        .with_service_headers(
            "api",
            headers(&[
                ("X-Shared", "service"),
                ("X-Service-Only", "service"),
                ("Authorization", "service-auth"),
            ]),
        )
        .with_template(
            "api",
            "ping",
            RouteTemplate::new("GET", "/ping").with_header("X-Shared", "template"),
        )
        .build()
        .unwrap();

    let req = service
        .prepare_request("api", "ping", &ParamMap::new())
        .unwrap();
    assert_eq!(req.headers.get("X-Shared").map(String::as_str), Some("template"));
    assert_eq!(
        req.headers.get("X-Service-Only").map(String::as_str),
        Some("service")
    );
    assert_eq!(
        req.headers.get("Authorization").map(String::as_str),
        Some("Bearer tok")
    );
}

#[tokio::test]
async fn optional_body_field_is_omitted() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({})));
    let service = ServiceBuilder::new()
        .with_http_client(mock.clone())
        .with_service("api", "http://api.test")
        .with_template(
            "api",
            "create",
            RouteTemplate::new("POST", "/users").with_body(params(json!({
                "name": "{{name}}",
                "email": "{{email}}",
                "age": "{{age?}}",
            }))),
        )
        .build()
        .unwrap();

    let _: Option<JsonValue> = service
        .perform_request(
            "api",
            "create",
            &params(json!({"name": "John", "email": "j@x"})),
        )
        .await
        .unwrap();

    let req = mock.last_request();
    let body: JsonValue = serde_json::from_slice(&req.body.expect("body")).unwrap();
    assert_eq!(body, json!({"name": "John", "email": "j@x"}));
    assert!(body.get("age").is_none());
}

#[tokio::test]
async fn missing_required_body_field_fails() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({})));
    let service = ServiceBuilder::new()
        .with_http_client(mock)
        .with_service("api", "http://api.test")
        .with_template(
            "api",
            "create",
            RouteTemplate::new("POST", "/users")
                .with_body(params(json!({"name": "{{name}}"}))),
        )
        .build()
        .unwrap();

    let err = service
        .prepare_request("api", "create", &ParamMap::new())
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingBodyParam(ref k) if k == "name"));
}

#[tokio::test]
async fn optional_query_parameter_is_omitted() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({})));
    let service = ServiceBuilder::new()
        .with_http_client(mock)
        .with_service("api", "http://api.test")
        .with_template(
            "api",
            "list",
            RouteTemplate::new("GET", "/users")
                .with_query_params(params(json!({"page": "{{page?}}"}))),
        )
        .build()
        .unwrap();

    let req = service
        .prepare_request("api", "list", &ParamMap::new())
        .unwrap();
    assert_eq!(req.url, "http://api.test/users");

    let req = service
        .prepare_request("api", "list", &params(json!({"page": 2})))
        .unwrap();
    assert_eq!(req.url, "http://api.test/users?page=2");
}

#[tokio::test]
async fn non_2xx_response_carries_status_and_body() {
    let mock = Arc::new(MockHttpClient::with_status(404, b"not found".to_vec()));
    let service = user_service(mock);

    let err = service
        .perform_request::<JsonValue>(
            "TestAPI",
            "GetUser",
            &params(json!({"version": "v1", "user_id": "123"})),
        )
        .await
        .unwrap_err();
    match err {
        ServiceError::Http(HttpError::Status { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "not found");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_response_body_decodes_to_none() {
    let mock = Arc::new(MockHttpClient::with_status(204, Vec::new()));
    let service = user_service(mock);

    let result: Option<JsonValue> = service
        .perform_request(
            "TestAPI",
            "GetUser",
            &params(json!({"version": "v1", "user_id": "123"})),
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn unknown_service_and_template_are_errors() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({})));
    let service = user_service(mock);

    let err = service
        .prepare_request("TestAPI", "Nope", &ParamMap::new())
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnknownTemplate { .. }));

    service.add_route_template("Ghost", "Get", RouteTemplate::new("GET", "/x"));
    let err = service
        .prepare_request("Ghost", "Get", &ParamMap::new())
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnknownService(ref s) if s == "Ghost"));
}

#[tokio::test]
async fn execute_request_with_params_splits_template_id() {
    let mock = Arc::new(MockHttpClient::ok_json(json!({"id": 123})));
    let service = user_service(mock);

    let result = service
        .execute_request_with_params(
            "TestAPI.GetUser",
            &params(json!({"version": "v1", "user_id": "123"})),
        )
        .await
        .unwrap();
    assert_eq!(result.get("id"), Some(&json!(123)));

    let err = service
        .execute_request_with_params("noseparator", &ParamMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTemplateId(_)));
}

#[tokio::test]
async fn service_state_management_round_trips() {
    let service = ApiService::new();
    service.set_service_config("svc", ServiceConfig::new("http://one").with_token("t"));

    assert_eq!(service.service_url("svc"), Some("http://one".to_string()));
    service.set_service_url("svc", "http://two");
    assert_eq!(service.service_url("svc"), Some("http://two".to_string()));
    assert_eq!(service.service_token("svc"), Some("t".to_string()));

    service.set_service_headers("svc", headers(&[("X-A", "1"), ("X-B", "2")]));
    service.remove_service_header("svc", "X-A");
    assert_eq!(service.service_headers("svc"), headers(&[("X-B", "2")]));

    service.set_service_params("svc", params(json!({"a": 1, "b": 2})));
    service.remove_service_param("svc", "a");
    assert_eq!(service.service_params("svc"), params(json!({"b": 2})));

    // Unknown services read back empty.
    assert_eq!(service.service_url("ghost"), None);
    assert!(service.service_headers("ghost").is_empty());
    assert!(service.service_params("ghost").is_empty());
}
