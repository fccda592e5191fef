//! Connection Tests
//!
//! Tests for blocking calls and pipelining against a toy server.

#[path = "../common/mod.rs"]
mod common;

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::thread;

use common::{received_commands, spawn_server, spawn_server_accepting, spawn_unix_server};
use redwire::connection::{Transport, UNIX_SOCKET_PORT};
use redwire::{
    CommandRequest, Config, Connection, ConnectionState, Endpoint, RedwireError, ReplyValue,
    StatusMode,
};

fn connect_to(server: &common::TestServer) -> Connection {
    Connection::connect(&server.addr.ip().to_string(), i64::from(server.addr.port()))
        .expect("connect")
}

// =============================================================================
// Calls
// =============================================================================

#[test]
fn test_call_roundtrip() {
    let server = spawn_server();
    let mut conn = connect_to(&server);
    assert_eq!(conn.state(), ConnectionState::Connected);

    assert_eq!(conn.call(CommandRequest::ping()).unwrap(), ReplyValue::status("PONG"));
    assert_eq!(
        conn.call(["SET", "foo", "bar"]).unwrap(),
        ReplyValue::status("OK")
    );
    assert_eq!(conn.call(CommandRequest::get("foo")).unwrap(), ReplyValue::bulk("bar"));
    assert_eq!(conn.call(CommandRequest::get("missing")).unwrap(), ReplyValue::null_bulk());
    assert_eq!(conn.pending(), 0);

    let seen = received_commands(&server.received, 4);
    assert_eq!(seen[1], vec!["SET", "foo", "bar"]);
}

#[test]
fn test_unknown_command_keeps_connection_usable() {
    let server = spawn_server();
    let mut conn = connect_to(&server);

    let reply = conn.call(["NOSUCHCOMMAND", "x"]).unwrap();
    assert!(reply.is_error());
    match reply.into_result() {
        Err(RedwireError::Reply(err)) => {
            assert_eq!(err.kind(), "ERR");
            assert!(err.message().contains("unknown command"));
        }
        other => panic!("Expected reply error, got {:?}", other),
    }

    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(conn.call(CommandRequest::incr("n")).unwrap(), ReplyValue::Integer(1));
}

#[test]
fn test_binary_safe_values() {
    let server = spawn_server();
    let mut conn = connect_to(&server);

    conn.call(CommandRequest::set("k", "line one\r\nline two")).unwrap();
    let reply = conn.call(CommandRequest::get("k")).unwrap();
    assert_eq!(reply.as_bytes(), Some(&b"line one\r\nline two"[..]));
}

#[test]
fn test_text_status_mode() {
    let server = spawn_server();
    let config = Config::builder()
        .endpoint(Endpoint::tcp(server.addr.ip().to_string(), server.addr.port()))
        .status_mode(StatusMode::Text)
        .build();
    let mut conn = Connection::open(config).unwrap();

    assert_eq!(conn.call(CommandRequest::ping()).unwrap(), ReplyValue::bulk("PONG"));
}

// =============================================================================
// Pipelining
// =============================================================================

#[test]
fn test_pipeline_replies_in_order() {
    let server = spawn_server();
    let mut conn = connect_to(&server);

    let k = 50;
    for _ in 0..k {
        conn.queue(CommandRequest::incr("counter")).unwrap();
    }
    assert_eq!(conn.pending(), k);

    let replies = conn.bulk_reply().unwrap();
    let expected: Vec<ReplyValue> = (1..=k as i64).map(ReplyValue::Integer).collect();
    assert_eq!(replies, expected);
    assert_eq!(conn.pending(), 0);
}

#[test]
fn test_pipeline_keeps_error_replies_aligned() {
    let server = spawn_server();
    let mut conn = connect_to(&server);

    conn.append(CommandRequest::set("a", "1")).unwrap();
    conn.append(["BOGUS"]).unwrap();
    conn.append(CommandRequest::get("a")).unwrap();

    assert_eq!(conn.reply().unwrap(), ReplyValue::status("OK"));
    assert!(conn.reply().unwrap().is_error());
    assert_eq!(conn.reply().unwrap(), ReplyValue::bulk("1"));
}

#[test]
fn test_call_with_pending_replies_is_rejected() {
    let server = spawn_server();
    let mut conn = connect_to(&server);

    conn.queue(CommandRequest::ping()).unwrap();
    match conn.call(CommandRequest::ping()) {
        Err(RedwireError::PipelineBusy { pending }) => assert_eq!(pending, 1),
        other => panic!("Expected PipelineBusy, got {:?}", other),
    }

    // The queued command is still answered normally.
    assert_eq!(conn.reply().unwrap(), ReplyValue::status("PONG"));
    assert_eq!(conn.call(CommandRequest::ping()).unwrap(), ReplyValue::status("PONG"));
}

#[test]
fn test_reply_with_nothing_queued() {
    let server = spawn_server();
    let mut conn = connect_to(&server);

    assert!(matches!(conn.reply(), Err(RedwireError::NothingQueued)));
    assert!(matches!(conn.bulk_reply(), Err(RedwireError::NothingQueued)));
    assert_eq!(conn.state(), ConnectionState::Connected);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_eof_after_quit() {
    let server = spawn_server();
    let mut conn = connect_to(&server);

    assert_eq!(conn.call(CommandRequest::quit()).unwrap(), ReplyValue::status("OK"));

    let err = conn.call(CommandRequest::ping()).unwrap_err();
    assert!(err.is_eof(), "{:?}", err);
    assert!(err.is_io_failure());
    assert_eq!(conn.state(), ConnectionState::ClosedWithError);

    assert!(matches!(
        conn.call(CommandRequest::ping()),
        Err(RedwireError::NotConnected)
    ));
}

#[test]
fn test_protocol_error_closes_connection() {
    let (client, mut server) = UnixStream::pair().unwrap();
    let handle = thread::spawn(move || {
        let mut request = [0u8; 64];
        let _ = std::io::Read::read(&mut server, &mut request);
        server.write_all(b"?garbage\r\n").unwrap();
        server
    });

    let mut conn = Connection::from_transport(Transport::from(client), Config::default());
    let err = conn.call(CommandRequest::ping()).unwrap_err();
    assert!(matches!(err, RedwireError::Protocol(_)), "{:?}", err);
    assert!(err.is_fatal());
    assert_eq!(conn.state(), ConnectionState::ClosedWithError);
    assert_eq!(conn.pending(), 0);

    drop(handle.join().unwrap());
}

#[test]
fn test_disconnect_then_reconnect() {
    let server = spawn_server_accepting(2);
    let mut conn = connect_to(&server);
    conn.call(CommandRequest::set("k", "v")).unwrap();

    conn.queue(CommandRequest::ping()).unwrap();
    conn.disconnect();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(conn.pending(), 0);
    assert!(matches!(
        conn.queue(CommandRequest::ping()),
        Err(RedwireError::NotConnected)
    ));

    conn.reconnect().unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(conn.call(CommandRequest::ping()).unwrap(), ReplyValue::status("PONG"));

    // Both connections were accepted; the listener is gone now.
    conn.disconnect();
    let err = conn.reconnect().unwrap_err();
    assert!(err.is_io_failure(), "{:?}", err);
    assert_eq!(conn.state(), ConnectionState::ClosedWithError);
}

#[test]
fn test_reconnect_requires_endpoint() {
    let (client, _server) = UnixStream::pair().unwrap();
    let mut conn = Connection::from_transport(Transport::from(client), Config::default());
    assert!(conn.endpoint().is_none());
    assert!(matches!(conn.reconnect(), Err(RedwireError::Config(_))));
}

#[test]
fn test_unix_socket_endpoint() {
    let server = spawn_unix_server();
    let path = server.path.to_str().unwrap();

    let mut conn = Connection::connect(path, UNIX_SOCKET_PORT).unwrap();
    assert!(matches!(conn.endpoint(), Some(Endpoint::Unix(_))));
    assert_eq!(conn.call(["ECHO", "hello"]).unwrap(), ReplyValue::bulk("hello"));
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_bad_host_or_port_is_type_mismatch() {
    for (host, port) in [
        ("", 6379),
        ("localhost", 0),
        ("localhost", 70000),
        ("localhost", -2),
        ("bad host", 6379),
    ] {
        match Connection::connect(host, port) {
            Err(RedwireError::TypeMismatch(_)) => {}
            Err(other) => panic!("{:?}:{} gave {:?}", host, port, other),
            Ok(_) => panic!("{:?}:{} connected", host, port),
        }
    }
}

#[test]
fn test_connect_refused_is_io_failure() {
    // Bind then drop to get a port with nothing listening.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    match Connection::connect("127.0.0.1", i64::from(port)) {
        Err(err) => assert!(err.is_io_failure(), "{:?}", err),
        Ok(_) => panic!("connected to a closed port"),
    }
}
