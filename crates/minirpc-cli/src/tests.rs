use super::call::{call_json, call_options, parse_args};
use super::demo::{demo_server, foo_service, Args};
use minirpc_common::protocol::CodecType;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;

async fn start_demo() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = demo_server().unwrap();
    tokio::spawn(async move { server.accept(listener).await });
    addr
}

#[test]
fn test_foo_service_methods() {
    let service = foo_service().unwrap();
    let names: Vec<_> = service.methods().iter().map(|m| m.name().to_string()).collect();
    assert_eq!(service.name(), "Foo");
    assert_eq!(names, vec!["Sleep", "Sum"]);
}

#[test]
fn test_call_options_use_json() {
    assert_eq!(call_options().codec_type, CodecType::Json);
}

#[test]
fn test_parse_args() {
    assert_eq!(parse_args(r#"{"num1": 1, "num2": 2}"#).unwrap(), json!({"num1": 1, "num2": 2}));
    assert!(parse_args("{num1: 1").is_err());
}

#[tokio::test]
async fn test_call_json_sum() {
    let addr = start_demo().await;
    let args = serde_json::to_value(Args { num1: 2, num2: 3 }).unwrap();

    let reply = call_json(&format!("tcp@{}", addr), "Foo.Sum", &args, None)
        .await
        .unwrap();
    assert_eq!(reply, json!(5));
}

#[tokio::test]
async fn test_call_json_sleep_times_out() {
    let addr = start_demo().await;
    let args = json!({"num1": 5, "num2": 0});

    let err = call_json(
        &format!("tcp@{}", addr),
        "Foo.Sleep",
        &args,
        Some(Duration::from_millis(50)),
    )
    .await
    .unwrap_err();
    assert!(format!("{:#}", err).contains("call canceled"));
}

#[tokio::test]
async fn test_call_json_bad_argument() {
    let addr = start_demo().await;

    let err = call_json(&format!("tcp@{}", addr), "Foo.Sum", &json!("two"), None)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("read body err"));
}
