//! Integration tests for remote extraction against a mock HTTP server

use etl_orchestrator::client::{ApiClient, Auth, RetryPolicy};
use etl_orchestrator::error::EtlError;
use etl_orchestrator::etl::Extractor;
use etl_orchestrator::extract::{ApiExtractor, Pagination, SOURCE_ENDPOINT_COLUMN};
use etl_orchestrator::load::{SqliteStore, TableLoader};
use etl_orchestrator::orchestrator::{JobSpec, Orchestrator, RunOptions, RunStatus};
use etl_orchestrator::table::Value;
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, attempts: u32) -> ApiClient {
    ApiClient::try_new(
        Url::parse(&server.uri()).unwrap(),
        Auth::None,
        Duration::from_secs(5),
        RetryPolicy::new(attempts, Duration::from_millis(1), 2.0),
    )
    .unwrap()
}

fn page(ids: &[i64], total_pages: Option<u64>) -> serde_json::Value {
    let data: Vec<_> = ids.iter().map(|id| json!({"id": id, "name": format!("user{}", id)})).collect();
    match total_pages {
        Some(total) => json!({"data": data, "pagination": {"total_pages": total}}),
        None => json!({"data": data}),
    }
}

async fn mount_page(server: &MockServer, number: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", number))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn ids(table: &etl_orchestrator::table::Table) -> Vec<Value> {
    table.column("id").unwrap().values().to_vec()
}

#[tokio::test]
async fn test_pagination_stops_at_total_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "1", page(&[1, 2], Some(2))).await;
    mount_page(&server, "2", page(&[3, 4], Some(2))).await;
    Mock::given(method("GET"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[5], Some(2))))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, 1);
    let table = ApiExtractor::new(&client, "users")
        .with_pagination(Some(Pagination::default()))
        .extract()
        .await
        .unwrap();
    assert_eq!(
        ids(&table),
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(4)
        ]
    );
    assert_eq!(
        table.column(SOURCE_ENDPOINT_COLUMN).unwrap().values()[0],
        Value::from("users")
    );
}

#[tokio::test]
async fn test_page_cap_limits_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[7, 8], None)))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 1);
    let pagination = Pagination {
        page_size: 2,
        max_pages: Some(3),
        ..Default::default()
    };
    let table = ApiExtractor::new(&client, "users")
        .with_pagination(Some(pagination))
        .extract()
        .await
        .unwrap();
    assert_eq!(table.row_count(), 6);
}

#[tokio::test]
async fn test_empty_page_ends_pagination() {
    let server = MockServer::start().await;
    mount_page(&server, "1", page(&[1], None)).await;
    mount_page(&server, "2", page(&[], None)).await;

    let client = client_for(&server, 1);
    let table = ApiExtractor::new(&client, "users")
        .with_pagination(Some(Pagination::default()))
        .extract()
        .await
        .unwrap();
    assert_eq!(table.row_count(), 1);
}

#[tokio::test]
async fn test_transient_failure_keeps_prior_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "1", page(&[1, 2], None)).await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let table = ApiExtractor::new(&client, "users")
        .with_pagination(Some(Pagination::default()))
        .extract()
        .await
        .unwrap();
    assert_eq!(ids(&table), vec![Value::Integer(1), Value::Integer(2)]);
}

#[tokio::test]
async fn test_retry_recovers_before_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let table = ApiExtractor::new(&client, "users").extract().await.unwrap();
    assert_eq!(ids(&table), vec![Value::Integer(1)]);
}

#[tokio::test]
async fn test_timeout_is_retried_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1}]))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = ApiClient::try_new(
        Url::parse(&server.uri()).unwrap(),
        Auth::None,
        Duration::from_millis(100),
        RetryPolicy::new(3, Duration::from_millis(1), 2.0),
    )
    .unwrap();
    let err = ApiExtractor::new(&client, "slow").extract().await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, EtlError::TransientSource { attempts: 3, .. }));
}

#[tokio::test]
async fn test_first_page_failure_is_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let err = ApiExtractor::new(&client, "users")
        .with_pagination(Some(Pagination::default()))
        .extract()
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::NoData(_)));
}

#[tokio::test]
async fn test_single_call_with_data_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("status", "open"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": [{"id": 1, "total": 9.5}], "count": 1})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 1);
    let table = ApiExtractor::new(&client, "orders")
        .with_params(vec![("status".into(), "open".into())])
        .with_data_key(Some("items".into()))
        .extract()
        .await
        .unwrap();
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.column("total").unwrap().values()[0], Value::Float(9.5));
}

#[tokio::test]
async fn test_remote_job_upserts_twice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "first"}])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "second"}])))
        .mount(&server)
        .await;

    let job: JobSpec = serde_yaml::from_str(
        r#"
name: users
source:
  kind: api
  endpoint: users
target: users
load:
  mode: upsert
  conflict_columns: [id]
"#,
    )
    .unwrap();

    let orchestrator = Orchestrator::new(
        TableLoader::new(SqliteStore::in_memory().unwrap()),
        Some(client_for(&server, 1)),
        RunOptions {
            audit_table: None,
            ..Default::default()
        },
    );
    assert_eq!(orchestrator.run(std::slice::from_ref(&job)).await.status, RunStatus::Success);
    assert_eq!(orchestrator.run(std::slice::from_ref(&job)).await.status, RunStatus::Success);

    let stored = orchestrator
        .loader()
        .execute_query("SELECT id, name FROM users", &[])
        .unwrap();
    assert_eq!(
        stored.rows(),
        vec![vec![Value::Integer(1), Value::from("second")]]
    );
}
