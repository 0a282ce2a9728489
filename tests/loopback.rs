//! End-to-end tests against an in-process fake ESL server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use freeswitch_esl_control::{
    CallControl, ConnectionStatus, ConnectionTable, DisconnectReason, EslClient, EslError,
    EslEvent, EslEventType, EslTransport, EventDispatcher, EventFormat, HandlerResult, JobId,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PASSWORD: &str = "ClueCon";
const JOB_UUID: &str = "7f4db78a-17d7-11dd-b7a0-db4edd065621";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("freeswitch_esl_control=trace")
        .with_test_writer()
        .try_init();
}

fn command_reply(reply_text: &str) -> String {
    format!("Content-Type: command/reply\nReply-Text: {}\n\n", reply_text)
}

fn api_response(body: &str) -> String {
    format!(
        "Content-Type: api/response\nContent-Length: {}\n\n{}",
        body.len(),
        body
    )
}

fn plain_event(inner: &str) -> String {
    format!(
        "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
        inner.len(),
        inner
    )
}

fn background_job(job_uuid: &str, command: &str, result: &str) -> String {
    plain_event(&format!(
        "Event-Name: BACKGROUND_JOB\nJob-UUID: {}\nJob-Command: {}\nContent-Length: {}\n\n{}",
        job_uuid,
        command,
        result.len(),
        result
    ))
}

/// Frames the fake switch writes back for one command.
fn respond(command: &str) -> Vec<String> {
    let (verb, rest) = command
        .split_once(' ')
        .unwrap_or((command, ""));
    match verb {
        "api" => match rest {
            "uuid_getvar u1 hold_music" => vec![api_response("local_stream://moh\n")],
            "uuid_getvar slow var_a" => vec![api_response("value-of-var-A\n")],
            "uuid_getvar slow var_b" => vec![api_response("value-of-var-B\n")],
            "status" => vec![api_response("UP 0 years, 0 days\n")],
            _ => vec![api_response("-ERR No such channel!\n")],
        },
        "bgapi" => {
            let job_command = rest
                .split_whitespace()
                .next()
                .unwrap_or("");
            vec![
                format!(
                    "Content-Type: command/reply\nReply-Text: +OK Job-UUID: {}\nJob-UUID: {}\n\n",
                    JOB_UUID, JOB_UUID
                ),
                background_job(JOB_UUID, job_command, "+OK\n"),
            ]
        }
        "event" | "filter" | "noevents" => vec![command_reply("+OK")],
        "exit" => vec![
            command_reply("+OK bye"),
            "Content-Type: text/disconnect-notice\n\n".to_string(),
        ],
        _ => vec![command_reply("-ERR command not found")],
    }
}

/// Accept one client and serve it; resolves to the commands it received.
async fn spawn_fake_switch() -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener
        .local_addr()
        .unwrap()
        .port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener
            .accept()
            .await
            .unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut received = Vec::new();

        write_half
            .write_all(b"Content-Type: auth/request\n\n")
            .await
            .unwrap();

        while let Ok(Some(line)) = lines
            .next_line()
            .await
        {
            if line.is_empty() {
                continue;
            }
            received.push(line.clone());

            if let Some(password) = line.strip_prefix("auth ") {
                if password == PASSWORD {
                    write_half
                        .write_all(command_reply("+OK accepted").as_bytes())
                        .await
                        .unwrap();
                    continue;
                }
                let _ = write_half
                    .write_all(command_reply("-ERR invalid").as_bytes())
                    .await;
                break;
            }

            if line == "api uuid_getvar slow var_a" {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            let frames = respond(&line);
            for frame in &frames {
                if write_half
                    .write_all(frame.as_bytes())
                    .await
                    .is_err()
                {
                    return received;
                }
            }
            if line == "exit" {
                break;
            }
        }
        received
    });

    (port, handle)
}

#[tokio::test]
async fn call_control_round_trip() {
    init_tracing();
    let (port, server) = spawn_fake_switch().await;
    let addr = format!("127.0.0.1:{}", port);
    let (client, _events) = EslClient::connect("127.0.0.1", port, PASSWORD)
        .await
        .unwrap();
    let calls = CallControl::new(client.clone());

    let job = calls
        .answer(&addr, "u1")
        .await
        .unwrap();
    assert_eq!(job, JobId::new(JOB_UUID));

    let value = calls
        .get_var(&addr, "u1", "hold_music")
        .await
        .unwrap();
    assert_eq!(value, vec!["local_stream://moh"]);

    let err = calls
        .get_var(&addr, "gone", "hold_music")
        .await
        .unwrap_err();
    assert!(
        matches!(err, EslError::CommandFailed { ref reply_text } if reply_text == "-ERR No such channel!")
    );

    let skipped = calls
        .multi_set_var(&addr, "u1", HashMap::<String, String>::new())
        .await
        .unwrap();
    assert_eq!(skipped, None);

    client
        .exit()
        .await
        .unwrap();
    let received = server
        .await
        .unwrap();
    assert_eq!(
        received,
        vec![
            format!("auth {}", PASSWORD),
            "bgapi uuid_answer u1".to_string(),
            "api uuid_getvar u1 hold_music".to_string(),
            "api uuid_getvar gone hold_music".to_string(),
            "exit".to_string(),
        ]
    );
}

#[tokio::test]
async fn background_job_event_reaches_dispatcher() {
    init_tracing();
    let (port, server) = spawn_fake_switch().await;
    let addr = format!("127.0.0.1:{}", port);
    let (client, events) = EslClient::connect("127.0.0.1", port, PASSWORD)
        .await
        .unwrap();
    client
        .subscribe_events(EventFormat::Plain, &[EslEventType::BackgroundJob])
        .await
        .unwrap();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let unrouted = Arc::new(Mutex::new(0usize));
    let unrouted_in_handler = unrouted.clone();
    let dispatcher = EventDispatcher::builder()
        .register_type(
            EslEventType::BackgroundJob,
            move |addr: &str, event: &EslEvent| -> HandlerResult {
                let _ = done_tx.send((
                    addr.to_string(),
                    event
                        .job_uuid()
                        .map(str::to_string),
                    event.body_lines(),
                ));
                Ok(())
            },
        )
        .register("default", move |_: &str, _: &EslEvent| -> HandlerResult {
            *unrouted_in_handler
                .lock()
                .unwrap() += 1;
            Ok(())
        })
        .build();
    let pump = {
        let addr = addr.clone();
        tokio::spawn(async move { dispatcher.run(&addr, events).await })
    };

    let job = CallControl::new(client.clone())
        .record(&addr, "u1", freeswitch_esl_control::RecordAction::Start, "/tmp/u1.wav", 0)
        .await
        .unwrap();

    let (seen_addr, seen_job, body) = tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
        .await
        .expect("background job event not dispatched")
        .unwrap();
    assert_eq!(seen_addr, addr);
    assert_eq!(seen_job.as_deref(), Some(job.as_str()));
    assert_eq!(body, vec!["+OK"]);

    client
        .exit()
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), pump)
        .await
        .expect("dispatch loop did not stop after disconnect")
        .unwrap();
    assert_eq!(*unrouted.lock().unwrap(), 0);
    assert_eq!(
        client.status(),
        ConnectionStatus::Disconnected(DisconnectReason::ServerNotice)
    );

    let received = server
        .await
        .unwrap();
    assert_eq!(received[1], "event plain BACKGROUND_JOB");
    assert_eq!(received[2], "bgapi uuid_record u1 start /tmp/u1.wav");
}

#[tokio::test]
async fn late_reply_is_never_handed_to_the_next_command() {
    init_tracing();
    let (port, server) = spawn_fake_switch().await;
    let addr = format!("127.0.0.1:{}", port);
    let (client, _events) = EslClient::connect("127.0.0.1", port, PASSWORD)
        .await
        .unwrap();
    client.set_command_timeout(Duration::from_millis(100));
    let calls = CallControl::new(client.clone());

    let first = calls
        .get_var(&addr, "slow", "var_a")
        .await;
    assert!(matches!(first, Err(EslError::Timeout { timeout_ms: 100 })));
    assert_eq!(
        client.status(),
        ConnectionStatus::Disconnected(DisconnectReason::ReplyTimeout)
    );

    let second = calls
        .get_var(&addr, "slow", "var_b")
        .await;
    assert!(matches!(second, Err(EslError::NotConnected)), "{:?}", second);

    let received = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("fake switch did not see the connection close")
        .unwrap();
    assert_eq!(
        received,
        vec![
            format!("auth {}", PASSWORD),
            "api uuid_getvar slow var_a".to_string(),
        ]
    );
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    init_tracing();
    let (port, server) = spawn_fake_switch().await;
    let err = EslClient::connect("127.0.0.1", port, "hunter2")
        .await
        .unwrap_err();
    assert!(matches!(err, EslError::AuthFailed { ref reason } if reason == "-ERR invalid"));
    server
        .await
        .unwrap();
}

#[tokio::test]
async fn connection_table_routes_by_address() {
    init_tracing();
    let (port, server) = spawn_fake_switch().await;
    let addr = format!("127.0.0.1:{}", port);
    let (client, _events) = EslClient::connect("127.0.0.1", port, PASSWORD)
        .await
        .unwrap();

    assert_eq!(client.addr(), addr);

    let table = ConnectionTable::new();
    assert!(table
        .add(client.clone())
        .await
        .is_none());
    assert_eq!(table.addresses().await, vec![addr.clone()]);

    let reply = table
        .send_sync(&addr, "status", "")
        .await
        .unwrap();
    assert_eq!(reply.first_line(), Some("UP 0 years, 0 days"));

    let err = table
        .send_async("192.0.2.1:8021", "uuid_answer u1", "")
        .await
        .unwrap_err();
    assert!(matches!(err, EslError::UnknownAddress { .. }));

    let calls = CallControl::new(table.clone());
    let job = calls
        .bridge(&addr, "u1", "u2")
        .await
        .unwrap();
    assert_eq!(job.as_str(), JOB_UUID);

    assert!(table
        .remove(&addr)
        .await
        .is_some());
    client
        .exit()
        .await
        .unwrap();
    let received = server
        .await
        .unwrap();
    assert!(received.contains(&"bgapi uuid_bridge u1 u2".to_string()));
}
