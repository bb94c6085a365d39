use coursehub_client::api::events::{ALL_EVENTS, BUFFER_READY, CRAWL_LOG, IncomingEvent};
use coursehub_client::transport::Transport;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

/// Push server stub: sends `script` to every client, forwards whatever the
/// client sends to `inbound`, then closes if `close_after_script` is set.
async fn push_server(
    script: Vec<String>,
    close_after_script: bool,
) -> (Url, mpsc::UnboundedReceiver<String>, Arc<Mutex<usize>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let accepted = Arc::new(Mutex::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            *counter.lock().unwrap() += 1;
            let mut ws = accept_async(stream).await.unwrap();
            let tx = tx.clone();
            let script = script.clone();
            tokio::spawn(async move {
                for frame in script {
                    ws.send(WsMessage::Text(frame)).await.unwrap();
                }
                if close_after_script {
                    let _ = ws.close(None).await;
                    return;
                }
                while let Some(Ok(msg)) = ws.next().await {
                    if let WsMessage::Text(text) = msg {
                        let _ = tx.send(text);
                    }
                }
            });
        }
    });
    (Url::parse(&format!("ws://{}/ws", addr)).unwrap(), rx, accepted)
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn dispatches_typed_and_all_listeners() {
    let script = vec![
        json!({"type": BUFFER_READY, "data": {"job_id": "j1"}}).to_string(),
        "not json".to_string(),
        json!({"type": CRAWL_LOG, "data": {"line": "GET /"}}).to_string(),
    ];
    let (url, _inbound, _) = push_server(script, false).await;
    let transport = Transport::new(url, None);

    let typed: Arc<Mutex<Vec<IncomingEvent>>> = Arc::default();
    let all: Arc<Mutex<Vec<String>>> = Arc::default();
    let t = typed.clone();
    transport.on(BUFFER_READY, move |ev| t.lock().unwrap().push(ev.clone()));
    let a = all.clone();
    transport.on(ALL_EVENTS, move |ev| a.lock().unwrap().push(ev.event_type.clone()));

    transport.connect().await;
    assert!(transport.is_connected());
    eventually(|| all.lock().unwrap().len() == 2).await;

    assert_eq!(*all.lock().unwrap(), [BUFFER_READY, CRAWL_LOG]);
    assert_eq!(typed.lock().unwrap()[0].data["job_id"], "j1");
}

#[tokio::test]
async fn connect_is_idempotent_and_send_reaches_server() {
    let (url, mut inbound, accepted) = push_server(Vec::new(), false).await;
    let transport = Transport::new(url, Some("tok"));
    transport.connect().await;
    transport.connect().await;
    assert_eq!(*accepted.lock().unwrap(), 1);

    assert!(transport.send("typing_start", json!({"senderId": "me"})).await);
    let frame = tokio::time::timeout(Duration::from_secs(2), inbound.recv()).await.unwrap().unwrap();
    let ev: IncomingEvent = serde_json::from_str(&frame).unwrap();
    assert_eq!(ev.event_type, "typing_start");
    assert_eq!(ev.data["senderId"], "me");

    transport.disconnect().await;
    assert!(!transport.is_connected());
    assert!(!transport.send("typing_stop", json!({})).await);
}

#[tokio::test]
async fn server_close_marks_link_down_and_reconnect_works() {
    let (url, _inbound, accepted) = push_server(vec![json!({"type": "hello"}).to_string()], true).await;
    let transport = Transport::new(url, None);
    transport.connect().await;
    let status = transport.status();
    eventually(|| !status.is_connected()).await;

    transport.connect().await;
    assert_eq!(*accepted.lock().unwrap(), 2);
}
