//! JSON-RPC protocol tests
//!
//! Feeds line-delimited requests through `RpcServer::serve` with the real
//! JWT verifier, a wiremock oracle and in-memory SQLite.

use std::path::PathBuf;
use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::io::BufReader;
use wiremock::{
    matchers::{method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

use guided_diagnosis::config::{
    AuthConfig, Config, DatabaseConfig, LoggingConfig, OracleConfig, RequestConfig,
};
use guided_diagnosis::oracle::OracleClient;
use guided_diagnosis::server::{AppState, RpcServer};
use guided_diagnosis::storage::{Doctor, SqliteStorage, Storage, User};

const SECRET: &str = "protocol-test-secret";

fn mint(user_id: &str, secret: &str) -> String {
    let token = encode(
        &Header::default(),
        &json!({"userId": user_id}),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

struct Harness {
    _oracle: MockServer,
    server: RpcServer,
    user: User,
    doctor: Doctor,
}

async fn harness() -> Harness {
    let oracle_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stageLimits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "data": {"firstStageLimit": 10, "secondStageLimit": {"1": 5}, "thirdStageLimit": {"1": 5}}
        })))
        .mount(&oracle_server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/generateQues/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "data": {"type": "question", "question": "Hello_there"}
        })))
        .mount(&oracle_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/predictDisorderForFirstStage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": false, "data": 1})))
        .mount(&oracle_server)
        .await;

    let config = Config {
        oracle: OracleConfig {
            api_key: "oracle-key".to_string(),
            base_url: oracle_server.uri(),
            default_question_set: "ar".to_string(),
        },
        auth: AuthConfig {
            jwt_secret: SECRET.to_string(),
        },
        database: DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        logging: LoggingConfig::default(),
        request: RequestConfig {
            timeout_ms: 5000,
            max_retries: 0,
            retry_delay_ms: 10,
        },
    };

    let storage = SqliteStorage::new(&config.database).await.unwrap();
    let user = User::new("Sara Ali", "sara", "sara@example.com");
    let doctor = Doctor::new("Dr. Omar", "male", "omar@example.com", "omar");
    storage.create_user(&user).await.unwrap();
    storage.create_doctor(&doctor).await.unwrap();

    let oracle = OracleClient::new(&config.oracle, config.request.clone()).unwrap();
    let state = AppState::new(config, Arc::new(storage), Arc::new(oracle));

    Harness {
        _oracle: oracle_server,
        server: RpcServer::new(Arc::new(state)),
        user,
        doctor,
    }
}

/// Run `requests` through the serve loop and return the parsed responses
async fn exchange(server: &RpcServer, requests: &[Value]) -> Vec<Value> {
    let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
    let mut output = Vec::new();
    server
        .serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_create_and_answer_over_jsonrpc() {
    let h = harness().await;
    let token = mint(&h.user.id, SECRET);

    let responses = exchange(
        &h.server,
        &[json!({
            "jsonrpc": "2.0", "id": 1, "method": "sessions/create",
            "params": {"authorization": token, "doctorId": h.doctor.id}
        })],
    )
    .await;
    let session_id = responses[0]["result"]["sessionId"].as_str().unwrap().to_string();

    let responses = exchange(
        &h.server,
        &[
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "sessions/add_message",
                "params": {"authorization": token, "sessionId": session_id, "message": "fine"}
            }),
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "sessions/create",
                "params": {"authorization": token, "doctorId": h.doctor.id}
            }),
        ],
    )
    .await;

    let turn = &responses[0]["result"];
    assert_eq!(turn["stage"], 1);
    assert_eq!(turn["progress"], 5.0);
    assert_eq!(turn["finished"], false);
    assert_eq!(turn["currentDisorder"], 1);
    assert_eq!(turn["messages"].as_array().unwrap().len(), 3);
    assert_eq!(turn["messages"][1]["sender"], "user");
    assert_eq!(turn["extractedSymptoms"], json!([]));

    let conflict = &responses[1]["error"];
    assert_eq!(conflict["code"], -32009);
    assert_eq!(conflict["data"]["kind"], "conflict");
}

#[tokio::test]
async fn test_forged_token_rejected() {
    let h = harness().await;
    let forged = mint(&h.user.id, "someone-else");

    let responses = exchange(
        &h.server,
        &[json!({
            "jsonrpc": "2.0", "id": 1, "method": "sessions/list",
            "params": {"authorization": forged}
        })],
    )
    .await;

    assert_eq!(responses[0]["error"]["code"], -32001);
    assert_eq!(responses[0]["error"]["data"]["kind"], "auth_error");
}

#[tokio::test]
async fn test_other_users_session_is_forbidden() {
    let h = harness().await;
    let owner = mint(&h.user.id, SECRET);
    let stranger = mint("someone-else", SECRET);

    let responses = exchange(
        &h.server,
        &[json!({
            "jsonrpc": "2.0", "id": 1, "method": "sessions/create",
            "params": {"authorization": owner, "doctorId": h.doctor.id}
        })],
    )
    .await;
    let session_id = responses[0]["result"]["sessionId"].as_str().unwrap().to_string();

    let responses = exchange(
        &h.server,
        &[json!({
            "jsonrpc": "2.0", "id": 2, "method": "sessions/get",
            "params": {"authorization": stranger, "sessionId": session_id}
        })],
    )
    .await;

    assert_eq!(responses[0]["error"]["data"]["kind"], "auth_error");
}
