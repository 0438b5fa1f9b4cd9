use std::time::Duration;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pawname::{
  Error, ErrorKind, HealthState, NameGenerator, OpenAiTransport, Prompt,
  RetryPolicy, ServiceConfig, Transport,
};

const API_KEY: &str = "sk-test";
const NAMES: &str = r#"[{"name":"Apollo","reason":"God of light"},{"name":"Orion","reason":"The hunter"}]"#;

fn init_logging()
{   let _ = env_logger::builder().is_test(true).try_init();
}

fn config(server: &MockServer) -> ServiceConfig
{   ServiceConfig::builder(API_KEY)
      .base_url(server.uri())
      .timeout_secs(2.0)
      .build()
      .unwrap()
}

fn transport(server: &MockServer) -> OpenAiTransport
{   OpenAiTransport::new(config(server).into())
}

fn prompt() -> Prompt
{   Prompt
    {   system: "system text".to_string()
      , user: "user text".to_string()
    }
}

fn completion(content: &str) -> serde_json::Value
{   json!({
      "id": "chatcmpl-1",
      "choices": [{
        "index": 0,
        "message": { "role": "assistant", "content": content },
        "finish_reason": "stop"
      }]
    })
}

fn quick_retries(max_attempts: u32) -> RetryPolicy
{   RetryPolicy::new(
      max_attempts
    , Duration::from_millis(10)
    , Duration::from_millis(50)
    )
}

async fn send_with_status(template: ResponseTemplate) -> Error
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(template)
      .expect(1)
      .mount(&server)
      .await;
    transport(&server).send(&prompt()).await.unwrap_err()
}

#[tokio::test]
async fn sends_chat_completion_and_returns_content()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .and(header("Authorization", format!("Bearer {}", API_KEY).as_str()))
      .and(body_partial_json(json!({
        "model": "gpt-3.5-turbo",
        "max_tokens": 1000,
        "messages": [
          { "role": "system", "content": "system text" },
          { "role": "user", "content": "user text" }
        ]
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(completion(NAMES)))
      .expect(1)
      .mount(&server)
      .await;

    let content = transport(&server).send(&prompt()).await.unwrap();
    assert_eq!(content, NAMES);
}

#[tokio::test]
async fn attribution_headers_are_sent_when_configured()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .and(header("HTTP-Referer", "https://pawname.example"))
      .and(header("X-Title", "PawName"))
      .respond_with(ResponseTemplate::new(200).set_body_json(completion(NAMES)))
      .expect(1)
      .mount(&server)
      .await;

    let config = ServiceConfig::builder(API_KEY)
      .base_url(server.uri())
      .site_url("https://pawname.example")
      .app_name("PawName")
      .build()
      .unwrap();
    let transport = OpenAiTransport::new(config.into());
    assert!(transport.send(&prompt()).await.is_ok());
}

#[tokio::test]
async fn unauthorized_is_an_authentication_error()
{   let body = json!({ "error": { "message": "Invalid API key", "type": "invalid_request_error" } });
    let err = send_with_status(ResponseTemplate::new(401).set_body_json(body)).await;
    assert_eq!(err, Error::Authentication("Invalid API key".to_string()));

    let err = send_with_status(ResponseTemplate::new(403)).await;
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn too_many_requests_keeps_retry_after()
{   let err = send_with_status(
      ResponseTemplate::new(429).insert_header("Retry-After", "7")
    ).await;
    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));

    let err = send_with_status(ResponseTemplate::new(429)).await;
    assert_eq!(err.retry_after(), None);
}

#[tokio::test]
async fn payment_required_is_quota_exceeded()
{   let err = send_with_status(ResponseTemplate::new(402)).await;
    assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
}

#[tokio::test]
async fn other_client_errors_are_model_errors()
{   let err = send_with_status(ResponseTemplate::new(400).set_body_string("bad model")).await;
    assert_eq!(err, Error::Model("bad model".to_string()));
}

#[tokio::test]
async fn server_errors_are_transport_errors()
{   let err = send_with_status(ResponseTemplate::new(503)).await;
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn slow_provider_hits_the_hard_timeout()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(completion(NAMES))
          .set_delay(Duration::from_secs(3))
      )
      .mount(&server)
      .await;

    let config = ServiceConfig::builder(API_KEY)
      .base_url(server.uri())
      .timeout_secs(0.2)
      .build()
      .unwrap();
    let err = OpenAiTransport::new(config.into())
      .send(&prompt())
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error()
{   init_logging();
    let config = ServiceConfig::builder(API_KEY)
      .base_url("http://127.0.0.1:9")
      .timeout_secs(2.0)
      .build()
      .unwrap();
    let err = OpenAiTransport::new(config.into())
      .send(&prompt())
      .await
      .unwrap_err();
    assert!(err.is_transient(), "{:?}", err);
}

#[tokio::test]
async fn success_without_choices_is_a_model_error()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
      .mount(&server)
      .await;

    let err = transport(&server).send(&prompt()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Model);
}

#[tokio::test]
async fn start_and_close_are_idempotent()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(completion(NAMES)))
      .mount(&server)
      .await;

    let transport = transport(&server);
    assert!(!transport.is_started());

    transport.start().unwrap();
    transport.start().unwrap();
    assert!(transport.is_started());

    transport.close();
    transport.close();
    assert!(!transport.is_started());

    // a send after close starts a fresh pool
    assert!(transport.send(&prompt()).await.is_ok());
    assert!(transport.is_started());
}

#[tokio::test]
async fn probe_lists_models()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/models"))
      .and(header("Authorization", format!("Bearer {}", API_KEY).as_str()))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": [{ "id": "gpt-3.5-turbo" }, { "id": "gpt-4o-mini" }]
      })))
      .mount(&server)
      .await;

    let transport = transport(&server);
    assert_eq!(
      transport.list_models().await.unwrap(),
      vec!["gpt-3.5-turbo".to_string(), "gpt-4o-mini".to_string()]
    );
    assert!(transport.probe().await.is_ok());
}

#[tokio::test]
async fn generator_retries_server_errors_then_succeeds()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(503))
      .up_to_n_times(2)
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(completion(NAMES)))
      .expect(1)
      .mount(&server)
      .await;

    let generator = NameGenerator::new(config(&server))
      .with_retry_policy(quick_retries(3));
    let session = generator.session().unwrap();
    let names = session
      .generate_pet_names("dog", &["playful", "loyal"], Some("mythology"), 3)
      .await
      .unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0].name, "Apollo");

    // second identical call is served from the cache
    session
      .generate_pet_names("dog", &["loyal", "playful"], Some("mythology"), 3)
      .await
      .unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn generator_does_not_retry_bad_credentials()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(401))
      .expect(1)
      .mount(&server)
      .await;

    let generator = NameGenerator::new(config(&server))
      .with_retry_policy(quick_retries(3));
    let err = generator
      .generate_pet_names("cat", &["lazy"], None, 2)
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.http_status(), 401);
}

#[tokio::test]
async fn generator_gives_up_after_max_retries()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(429))
      .expect(4)
      .mount(&server)
      .await;

    let config = ServiceConfig::builder(API_KEY)
      .base_url(server.uri())
      .max_retries(4)
      .build()
      .unwrap();
    let generator = NameGenerator::new(config)
      .with_retry_policy(quick_retries(4));
    let err = generator
      .generate_pet_names("cat", &["lazy"], None, 2)
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimit);
}

#[tokio::test]
async fn health_check_reports_provider_state()
{   init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/models"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
      .mount(&server)
      .await;
    let status = NameGenerator::new(config(&server)).health_check().await;
    assert_eq!(status.status, HealthState::Healthy);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/models"))
      .respond_with(ResponseTemplate::new(401))
      .mount(&server)
      .await;
    let status = NameGenerator::new(config(&server)).health_check().await;
    assert_eq!(status.status, HealthState::Unhealthy);
    assert!(status.message.is_some());

    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/models"))
      .respond_with(ResponseTemplate::new(502))
      .mount(&server)
      .await;
    let status = NameGenerator::new(config(&server)).health_check().await;
    assert_eq!(status.status, HealthState::Degraded);
}
