//! End-to-end tests for the session engine against a real WebSocket.
//!
//! Each test runs a scripted in-process server (`tokio_tungstenite::accept_async`
//! on an ephemeral port) and drives a `Session` through connect, frame
//! exchange, and teardown, verifying the conversation log that results.

use std::time::Duration;

use core_chat::{Role, Session, SessionPhase};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerWs = WebSocketStream<TcpStream>;

/// Bind an ephemeral listener and return its ws:// endpoint.
async fn bind_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let endpoint = format!("ws://{}", listener.local_addr().expect("local addr"));
    (listener, endpoint)
}

/// Accept one client and complete the WebSocket handshake.
async fn accept_client(listener: &TcpListener) -> ServerWs {
    let (stream, _) = listener.accept().await.expect("accept");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("websocket handshake")
}

/// Read the next text message from the client, skipping control frames.
async fn next_text(ws: &mut ServerWs) -> String {
    loop {
        match ws.next().await.expect("client hung up") {
            Ok(Message::Text(text)) => return text.to_string(),
            Ok(_) => {}
            Err(e) => panic!("server read error: {e}"),
        }
    }
}

/// Read until the client closes the connection.
async fn read_until_closed(ws: &mut ServerWs) {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

/// Send a frame to the client as JSON text.
async fn send_frame(ws: &mut ServerWs, frame: serde_json::Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("server send");
}

/// Pump session events until `pred` holds, panicking after 5 seconds.
async fn pump_until(session: &mut Session, pred: impl Fn(&Session) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !pred(session) {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .expect("timed out waiting for session condition");
        let event = tokio::time::timeout(remaining, session.next_event())
            .await
            .expect("timed out waiting for connection event")
            .expect("event stream ended");
        session.handle_event(event).await;
    }
}

#[tokio::test]
async fn test_end_to_end_streamed_conversation() {
    let (listener, endpoint) = bind_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_client(&listener).await;

        let subscribe: serde_json::Value =
            serde_json::from_str(&next_text(&mut ws).await).expect("subscribe json");
        assert_eq!(subscribe["type"], "subscribe");
        assert_eq!(subscribe["data"], "claude");

        let message: serde_json::Value =
            serde_json::from_str(&next_text(&mut ws).await).expect("message json");
        assert_eq!(message["type"], "claude_message");
        assert_eq!(message["data"], "hello");

        send_frame(&mut ws, serde_json::json!({"type": "claude_stream", "data": "Hi"})).await;
        send_frame(
            &mut ws,
            serde_json::json!({"type": "claude_stream", "data": " there"}),
        )
        .await;
        send_frame(&mut ws, serde_json::json!({"type": "claude_stream_end"})).await;

        read_until_closed(&mut ws).await;
    });

    let mut session = Session::new("claude");
    session.connect(&endpoint).await;
    // Wait for the Opened event to be processed (subscribe sent, notice logged)
    pump_until(&mut session, |s| !s.messages().is_empty()).await;

    session.send_user_message("hello").await;
    assert_eq!(session.phase(), SessionPhase::AwaitingResponse);

    // User turn is echoed immediately, before any backend acknowledgment
    let user_turns: Vec<_> = session
        .messages()
        .iter()
        .filter(|t| t.role == Role::User)
        .collect();
    assert_eq!(user_turns.len(), 1);
    assert_eq!(user_turns[0].content, "hello");

    pump_until(&mut session, |s| {
        s.messages().iter().any(|t| t.role == Role::Assistant)
    })
    .await;

    let assistant_turns: Vec<_> = session
        .messages()
        .iter()
        .filter(|t| t.role == Role::Assistant)
        .collect();
    assert_eq!(assistant_turns.len(), 1, "exactly one assistant turn");
    assert_eq!(assistant_turns[0].content, "Hi there");
    assert_eq!(session.phase(), SessionPhase::Idle);

    // User turn precedes the assistant turn in the log
    let non_system: Vec<_> = session
        .messages()
        .iter()
        .filter(|t| t.role != Role::System)
        .collect();
    assert_eq!(non_system.len(), 2);
    assert_eq!(non_system[0].role, Role::User);
    assert_eq!(non_system[1].role, Role::Assistant);

    session.disconnect().await;
    server.await.expect("server task");
}

#[tokio::test]
async fn test_connect_subscribes_and_notes_connection() {
    let (listener, endpoint) = bind_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_client(&listener).await;
        let subscribe = next_text(&mut ws).await;
        read_until_closed(&mut ws).await;
        subscribe
    });

    let mut session = Session::new("claude");
    session.connect(&endpoint).await;
    pump_until(&mut session, |s| s.is_connected() && !s.messages().is_empty()).await;

    assert_eq!(session.messages()[0].role, Role::System);
    assert_eq!(session.messages()[0].content, "Connected to Core");

    session.disconnect().await;
    let subscribe: serde_json::Value =
        serde_json::from_str(&server.await.expect("server task")).expect("subscribe json");
    assert_eq!(subscribe["type"], "subscribe");
    assert_eq!(subscribe["data"], "claude");
    assert!(
        !subscribe["timestamp"].as_str().unwrap_or_default().is_empty(),
        "outbound frames carry a timestamp"
    );
}

#[tokio::test]
async fn test_reconnect_leaves_exactly_one_live_connection() {
    let (listener, endpoint) = bind_server().await;

    let server = tokio::spawn(async move {
        let mut first = accept_client(&listener).await;
        let _subscribe = next_text(&mut first).await;
        // The client must close this connection before opening the next
        read_until_closed(&mut first).await;

        let mut second = accept_client(&listener).await;
        let subscribe = next_text(&mut second).await;
        read_until_closed(&mut second).await;
        subscribe
    });

    let mut session = Session::new("claude");
    session.connect(&endpoint).await;
    // Process the first Opened event before reconnecting
    pump_until(&mut session, |s| !s.messages().is_empty()).await;

    session.connect(&endpoint).await;
    pump_until(&mut session, |s| {
        s.is_connected()
            && s.messages()
                .iter()
                .filter(|t| t.content == "Connected to Core")
                .count()
                == 2
    })
    .await;

    // The replaced connection was noted as closed, in order
    let notices: Vec<&str> = session
        .messages()
        .iter()
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(
        notices,
        vec![
            "Connected to Core",
            "Disconnected from Core",
            "Connected to Core"
        ]
    );

    session.disconnect().await;
    let second_subscribe: serde_json::Value =
        serde_json::from_str(&server.await.expect("server task")).expect("subscribe json");
    assert_eq!(second_subscribe["type"], "subscribe");
}

#[tokio::test]
async fn test_server_close_discards_in_flight_stream() {
    let (listener, endpoint) = bind_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_client(&listener).await;
        let _subscribe = next_text(&mut ws).await;

        send_frame(
            &mut ws,
            serde_json::json!({"type": "claude_stream", "data": "never committed"}),
        )
        .await;
        // Drop the connection mid-stream, no stream_end
        ws.close(None).await.expect("server close");
    });

    let mut session = Session::new("claude");
    session.connect(&endpoint).await;
    pump_until(&mut session, |s| {
        s.messages()
            .iter()
            .any(|t| t.content == "Disconnected from Core")
    })
    .await;

    assert!(
        session.messages().iter().all(|t| t.role != Role::Assistant),
        "no assistant turn may be committed for an unterminated stream"
    );
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(session.streaming_preview().is_none());
    assert!(!session.is_connected());

    server.await.expect("server task");
}

#[tokio::test]
async fn test_response_delivered_before_close_is_committed() {
    let (listener, endpoint) = bind_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_client(&listener).await;
        send_frame(
            &mut ws,
            serde_json::json!({"type": "claude_response", "data": "final answer"}),
        )
        .await;
        ws.close(None).await.expect("server close");
    });

    let mut session = Session::new("claude");
    session.connect(&endpoint).await;
    // Let the reader drain both the response and the close before the
    // session pumps anything, so the physical state is already down when
    // the data frame is processed
    tokio::time::sleep(Duration::from_millis(500)).await;
    pump_until(&mut session, |s| {
        s.messages()
            .iter()
            .any(|t| t.content == "Disconnected from Core")
    })
    .await;

    // The response precedes the disconnect notice, matching delivery order
    let contents: Vec<&str> = session
        .messages()
        .iter()
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec!["Connected to Core", "final answer", "Disconnected from Core"]
    );
    assert_eq!(session.messages()[1].role, Role::Assistant);

    server.await.expect("server task");
}

#[tokio::test]
async fn test_stream_terminated_before_close_is_committed() {
    let (listener, endpoint) = bind_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_client(&listener).await;
        send_frame(&mut ws, serde_json::json!({"type": "claude_stream", "data": "Hi"})).await;
        send_frame(
            &mut ws,
            serde_json::json!({"type": "claude_stream", "data": " there"}),
        )
        .await;
        send_frame(&mut ws, serde_json::json!({"type": "claude_stream_end"})).await;
        ws.close(None).await.expect("server close");
    });

    let mut session = Session::new("claude");
    session.connect(&endpoint).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    pump_until(&mut session, |s| {
        s.messages()
            .iter()
            .any(|t| t.content == "Disconnected from Core")
    })
    .await;

    // The stream ended before the close, so its turn must be committed
    let assistant_turns: Vec<_> = session
        .messages()
        .iter()
        .filter(|t| t.role == Role::Assistant)
        .collect();
    assert_eq!(assistant_turns.len(), 1);
    assert_eq!(assistant_turns[0].content, "Hi there");
    assert_eq!(session.phase(), SessionPhase::Idle);

    server.await.expect("server task");
}

#[tokio::test]
async fn test_unknown_and_malformed_frames_are_tolerated() {
    let (listener, endpoint) = bind_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_client(&listener).await;
        let _subscribe = next_text(&mut ws).await;

        send_frame(&mut ws, serde_json::json!({"type": "future_feature", "data": {}})).await;
        ws.send(Message::Text("not json at all".to_string().into()))
            .await
            .expect("server send");
        send_frame(
            &mut ws,
            serde_json::json!({"type": "claude_response", "data": "still alive"}),
        )
        .await;

        read_until_closed(&mut ws).await;
    });

    let mut session = Session::new("claude");
    session.connect(&endpoint).await;
    pump_until(&mut session, |s| {
        s.messages().iter().any(|t| t.role == Role::Assistant)
    })
    .await;

    // Only the connection notice and the response made it into the log
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[1].content, "still alive");
    assert_eq!(session.phase(), SessionPhase::Idle);

    session.disconnect().await;
    server.await.expect("server task");
}
