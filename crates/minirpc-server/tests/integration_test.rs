// Integration tests for minirpc-server
//
// These tests start a real TCP (or unix, or HTTP) server with a small
// arithmetic service, then connect a minirpc client to make calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use minirpc_client::{dial, dial_http, Client};
use minirpc_common::protocol::{CodecType, Header, Options};
use minirpc_common::transport::{write_options, Codec};
use minirpc_common::RpcError;
use minirpc_server::{HttpServer, Server, Service};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ============================================================================
// Test Helpers
// ============================================================================

struct Arith;

#[derive(Debug, Serialize, Deserialize)]
struct Args {
    num1: i64,
    num2: i64,
}

fn arith_server() -> Arc<Server> {
    let server = Arc::new(Server::new());
    server
        .register(
            Service::builder("Arith", Arith)
                .method("Sum", |_arith, args: Args| async move {
                    Ok::<_, String>(args.num1 + args.num2)
                })
                .method("Div", |_arith, args: Args| async move {
                    if args.num2 == 0 {
                        return Err("divide by zero".to_string());
                    }
                    Ok(args.num1 / args.num2)
                })
                .method("Sleep", |_arith, ms: u64| async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok::<_, String>(ms)
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    server
}

/// Start a TCP server on a random port
async fn start_server(server: Arc<Server>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move { server.accept(listener).await });
    addr
}

/// Start the HTTP front-end on a random port
async fn start_http_server(server: Arc<Server>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(HttpServer::new(server).run(listener));
    addr
}

/// Send a raw HTTP/1.0 request and return the whole response
async fn raw_http(addr: &str, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

async fn sum(client: &Client, num1: i64, num2: i64) -> i64 {
    client.call("Arith.Sum", &Args { num1, num2 }).await.unwrap()
}

// ============================================================================
// Calls over TCP
// ============================================================================

#[tokio::test]
async fn test_basic_calls() {
    let addr = start_server(arith_server()).await;
    let client = dial("tcp", &addr, None).await.unwrap();

    assert_eq!(sum(&client, 2, 3).await, 5);
    assert_eq!(sum(&client, 10, 20).await, 30);

    let quotient: i64 = client
        .call("Arith.Div", &Args { num1: 9, num2: 3 })
        .await
        .unwrap();
    assert_eq!(quotient, 3);
}

#[tokio::test]
async fn test_handler_error_reaches_caller() {
    let addr = start_server(arith_server()).await;
    let client = dial("tcp", &addr, None).await.unwrap();

    let err = client
        .call::<_, i64>("Arith.Div", &Args { num1: 1, num2: 0 })
        .await
        .unwrap_err();
    assert!(err.is_server_error());
    assert_eq!(err.to_string(), "divide by zero");
}

#[tokio::test]
async fn test_lookup_errors() {
    let addr = start_server(arith_server()).await;
    let client = dial("tcp", &addr, None).await.unwrap();

    let cases = [
        ("Arith.Bogus", "rpc server: can't find method Bogus"),
        ("Geo.Sum", "rpc server: can't find service Geo"),
        ("ArithSum", "rpc server: service/method request ill-formed: ArithSum"),
    ];
    for (service_method, expected) in cases {
        let err = client
            .call::<_, i64>(service_method, &Args { num1: 1, num2: 2 })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    assert_eq!(sum(&client, 1, 2).await, 3);
}

#[tokio::test]
async fn test_concurrent_calls_on_one_client() {
    let addr = start_server(arith_server()).await;
    let client = Arc::new(dial("tcp", &addr, None).await.unwrap());

    let mut tasks = Vec::new();
    for i in 0..20i64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { (i, sum(&client, i, i * i).await) }));
    }

    for task in tasks {
        let (i, result) = task.await.unwrap();
        assert_eq!(result, i + i * i);
    }
}

#[tokio::test]
async fn test_fast_call_not_blocked_by_slow_call() {
    let addr = start_server(arith_server()).await;
    let client = Arc::new(dial("tcp", &addr, None).await.unwrap());

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call::<_, u64>("Arith.Sleep", &300u64).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    assert_eq!(sum(&client, 1, 1).await, 2);
    assert!(started.elapsed() < Duration::from_millis(250));

    assert_eq!(slow.await.unwrap().unwrap(), 300);
}

#[tokio::test]
async fn test_interleaved_replies_decode_cleanly() {
    let addr = start_server(arith_server()).await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    let options = Options::default();
    write_options(&mut stream, &options).await.unwrap();
    let (mut reader, mut writer) = Codec::new(stream, &options.codec_type).unwrap().split();

    writer.write(&Header::request("Arith.Sleep", 1), &200u64).await.unwrap();
    writer.write(&Header::request("Arith.Sum", 2), &Args { num1: 2, num2: 3 }).await.unwrap();
    writer.write(&Header::request("Arith.Sleep", 3), &50u64).await.unwrap();
    writer.write(&Header::request("Arith.Sum", 4), &Args { num1: 10, num2: 20 }).await.unwrap();

    // Each reply is a whole header+body pair, whatever order the handlers finish in.
    let mut order = Vec::new();
    let mut header = Header::default();
    for _ in 0..4 {
        reader.read_header(&mut header).await.unwrap();
        assert!(header.is_ok(), "seq {} failed: {}", header.seq, header.error);

        match header.seq {
            1 => assert_eq!(reader.read_body::<u64>().await.unwrap(), 200),
            2 => assert_eq!(reader.read_body::<i64>().await.unwrap(), 5),
            3 => assert_eq!(reader.read_body::<u64>().await.unwrap(), 50),
            4 => assert_eq!(reader.read_body::<i64>().await.unwrap(), 30),
            other => panic!("unexpected seq {}", other),
        }
        order.push(header.seq);
    }

    order[..2].sort();
    assert_eq!(order, vec![2, 4, 3, 1]);
}

#[tokio::test]
async fn test_handle_timeout_over_tcp() {
    let addr = start_server(arith_server()).await;
    let options = Options::default().with_handle_timeout(Duration::from_millis(50));
    let client = dial("tcp", &addr, Some(options)).await.unwrap();

    let err = client.call::<_, u64>("Arith.Sleep", &1_000u64).await.unwrap_err();
    assert!(err.to_string().contains("request handle timeout"));

    assert_eq!(client.call::<_, u64>("Arith.Sleep", &1u64).await.unwrap(), 1);
}

#[tokio::test]
async fn test_json_codec_over_tcp() {
    let server = arith_server();
    let addr = start_server(server.clone()).await;
    let options = Options::default().with_codec(CodecType::Json);
    let client = dial("tcp", &addr, Some(options)).await.unwrap();

    assert_eq!(sum(&client, 7, 8).await, 15);
    assert_eq!(server.find_method("Arith.Sum").unwrap().num_calls(), 1);
}

#[tokio::test]
async fn test_client_close_then_call() {
    let addr = start_server(arith_server()).await;
    let client = dial("tcp", &addr, None).await.unwrap();

    client.close().unwrap();
    let err = client.call::<_, i64>("Arith.Sum", &Args { num1: 1, num2: 1 }).await.unwrap_err();
    assert!(matches!(err, RpcError::Shutdown));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arith.sock");
    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    let server = arith_server();
    tokio::spawn(async move { server.accept(listener).await });

    let client = dial("unix", path.to_str().unwrap(), None).await.unwrap();
    assert_eq!(sum(&client, 20, 22).await, 42);
}

// ============================================================================
// HTTP front-end
// ============================================================================

#[tokio::test]
async fn test_http_rpc_path_requires_connect() {
    let addr = start_http_server(arith_server()).await;

    let response = raw_http(&addr, "GET /_minirpc_ HTTP/1.0\r\n\r\n").await;
    assert!(response.contains(" 405 "));
    assert!(response.ends_with("405 must CONNECT\n"));
}

#[tokio::test]
async fn test_http_unknown_path() {
    let addr = start_http_server(arith_server()).await;

    let response = raw_http(&addr, "GET /nowhere HTTP/1.0\r\n\r\n").await;
    assert!(response.contains(" 404 "));
}

#[tokio::test]
async fn test_http_connect_response_line() {
    let addr = start_http_server(arith_server()).await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"CONNECT /_minirpc_ HTTP/1.0\r\n\r\n")
        .await
        .unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head);
    assert!(head.starts_with("HTTP/1.0 200 Connected to minirpc\r\n"));
}

#[tokio::test]
async fn test_calls_through_http_tunnel() {
    let server = arith_server();
    let addr = start_http_server(server.clone()).await;
    let client = dial_http("tcp", &addr, None).await.unwrap();

    assert_eq!(sum(&client, 2, 3).await, 5);
    assert_eq!(sum(&client, 10, 20).await, 30);
    assert_eq!(server.metrics().snapshot().total_connections, 1);
}

#[tokio::test]
async fn test_debug_page() {
    let server = arith_server();
    let addr = start_http_server(server.clone()).await;
    let client = dial_http("tcp", &addr, None).await.unwrap();
    assert_eq!(sum(&client, 1, 1).await, 2);

    let response = raw_http(&addr, "GET /debug/minirpc HTTP/1.0\r\n\r\n").await;
    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    assert!(head.contains(" 200 "));
    assert!(head.to_ascii_lowercase().contains("content-type: application/json"));

    let page: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(page["server"]["name"], "minirpc");
    assert_eq!(page["services"][0]["name"], "Arith");

    let methods = page["services"][0]["methods"].as_array().unwrap();
    let names: Vec<_> = methods.iter().map(|m| m["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Div", "Sleep", "Sum"]);
    assert_eq!(methods[2]["calls"], 1);
    assert_eq!(page["metrics"]["total_requests"], 1);
}
