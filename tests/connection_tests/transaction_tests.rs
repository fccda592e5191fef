//! Transaction Tests
//!
//! Tests for MULTI / EXEC handling against a toy server.

#[path = "../common/mod.rs"]
mod common;

use std::io::{BufReader, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use common::{received_commands, spawn_server};
use redwire::connection::Transport;
use redwire::{
    CommandRequest, Config, Connection, ConnectionState, Endpoint, RedwireError, ReplyValue,
    StatusMode, TransactionOutcome, TransactionReplies,
};

fn open(server: &common::TestServer, replies: TransactionReplies) -> Connection {
    let config = Config::builder()
        .endpoint(Endpoint::tcp(server.addr.ip().to_string(), server.addr.port()))
        .transaction_replies(replies)
        .build();
    Connection::open(config).expect("connect")
}

/// Answer each request with the next canned reply, reporting requests
fn scripted_pair(replies: Vec<&'static [u8]>) -> (Connection, thread::JoinHandle<Vec<Vec<String>>>) {
    let (client, server) = UnixStream::pair().unwrap();
    let handle = thread::spawn(move || {
        let mut writer = server.try_clone().unwrap();
        let mut reader = BufReader::new(server);
        let mut seen = Vec::new();
        for reply in replies {
            let Ok(Some(args)) = common::read_command(&mut reader) else {
                break;
            };
            seen.push(args);
            writer.write_all(reply).unwrap();
        }
        seen
    });

    let conn = Connection::from_transport(Transport::from(client), Config::default());
    (conn, handle)
}

#[test]
fn test_transaction_full_replies() {
    let server = spawn_server();
    let mut conn = open(&server, TransactionReplies::Full);

    let replies = conn
        .transaction([CommandRequest::set("foo", "bar"), CommandRequest::get("foo")])
        .unwrap();

    assert_eq!(
        replies,
        vec![
            ReplyValue::status("OK"),
            ReplyValue::status("QUEUED"),
            ReplyValue::status("QUEUED"),
            ReplyValue::array(vec![ReplyValue::status("OK"), ReplyValue::bulk("bar")]),
        ]
    );
    assert_eq!(conn.pending(), 0);

    // MULTI + N + EXEC
    let names: Vec<String> = received_commands(&server.received, 4)
        .into_iter()
        .map(|args| args[0].clone())
        .collect();
    assert_eq!(names, vec!["MULTI", "SET", "GET", "EXEC"]);
}

#[test]
fn test_transaction_results_only() {
    let server = spawn_server();
    let mut conn = open(&server, TransactionReplies::ResultsOnly);

    let replies = conn
        .transaction([CommandRequest::incr("n"), CommandRequest::incr("n")])
        .unwrap();
    assert_eq!(replies, vec![ReplyValue::Integer(1), ReplyValue::Integer(2)]);

    // The connection is ready for plain calls afterwards.
    assert_eq!(conn.call(CommandRequest::get("n")).unwrap(), ReplyValue::bulk("2"));
}

#[test]
fn test_transaction_text_status_mode() {
    let server = spawn_server();
    let config = Config::builder()
        .endpoint(Endpoint::tcp(server.addr.ip().to_string(), server.addr.port()))
        .status_mode(StatusMode::Text)
        .build();
    let mut conn = Connection::open(config).unwrap();

    let replies = conn.transaction([CommandRequest::set("a", "1")]).unwrap();
    assert_eq!(
        replies,
        vec![
            ReplyValue::bulk("OK"),
            ReplyValue::bulk("QUEUED"),
            ReplyValue::array(vec![ReplyValue::bulk("OK")]),
        ]
    );
}

#[test]
fn test_empty_transaction() {
    let server = spawn_server();
    let mut conn = open(&server, TransactionReplies::ResultsOnly);

    let replies = conn.transaction(Vec::<CommandRequest>::new()).unwrap();
    assert!(replies.is_empty());
}

#[test]
fn test_bad_ack_sends_discard() {
    let server = spawn_server();
    let mut conn = open(&server, TransactionReplies::Full);

    let outcome = conn
        .try_transaction([
            CommandRequest::set("a", "1"),
            CommandRequest::new("NOSUCHCOMMAND"),
        ])
        .unwrap();

    match outcome {
        TransactionOutcome::Aborted { cause } => {
            assert!(cause.is_error());
            assert!(cause.to_string().contains("unknown command"));
        }
        other => panic!("Expected abort, got {:?}", other),
    }

    let names: Vec<String> = received_commands(&server.received, 4)
        .into_iter()
        .map(|args| args[0].clone())
        .collect();
    assert_eq!(names, vec!["MULTI", "SET", "NOSUCHCOMMAND", "DISCARD"]);

    // Nothing ran, and the connection is clean.
    assert_eq!(conn.call(CommandRequest::get("a")).unwrap(), ReplyValue::null_bulk());
    assert_eq!(conn.state(), ConnectionState::Connected);
}

#[test]
fn test_transaction_maps_abort_to_error() {
    let server = spawn_server();
    let mut conn = open(&server, TransactionReplies::Full);

    match conn.transaction([CommandRequest::new("BOGUS")]) {
        Err(RedwireError::TransactionAborted { cause }) => assert!(cause.is_error()),
        other => panic!("Expected TransactionAborted, got {:?}", other),
    }
}

#[test]
fn test_execabort_is_aborted() {
    let (mut conn, server) = scripted_pair(vec![
        b"+OK\r\n",
        b"+QUEUED\r\n",
        b"-EXECABORT Transaction discarded because of previous errors.\r\n",
    ]);

    let outcome = conn.try_transaction([CommandRequest::incr("n")]).unwrap();
    assert!(!outcome.is_committed());
    match outcome {
        TransactionOutcome::Aborted { cause } => {
            assert_eq!(
                cause,
                ReplyValue::error("EXECABORT Transaction discarded because of previous errors.")
            );
        }
        other => panic!("Expected abort, got {:?}", other),
    }

    drop(conn);
    let seen = server.join().unwrap();
    assert_eq!(seen.last().map(|args| args[0].as_str()), Some("EXEC"));
}

#[test]
fn test_null_exec_after_watch_is_aborted() {
    let (mut conn, _server) = scripted_pair(vec![b"+OK\r\n", b"+QUEUED\r\n", b"*-1\r\n"]);

    let outcome = conn.try_transaction([CommandRequest::incr("n")]).unwrap();
    assert_eq!(
        outcome,
        TransactionOutcome::Aborted {
            cause: ReplyValue::null_array()
        }
    );
    assert_eq!(conn.state(), ConnectionState::Connected);
}

#[test]
fn test_exec_length_mismatch_is_protocol_error() {
    let (mut conn, _server) = scripted_pair(vec![
        b"+OK\r\n",
        b"+QUEUED\r\n",
        b"+QUEUED\r\n",
        b"*1\r\n:1\r\n",
    ]);

    let err = conn
        .try_transaction([CommandRequest::incr("a"), CommandRequest::incr("b")])
        .unwrap_err();
    assert!(matches!(err, RedwireError::Protocol(_)), "{:?}", err);
    assert_eq!(conn.state(), ConnectionState::ClosedWithError);
}

#[test]
fn test_transaction_rejected_while_pipelining() {
    let server = spawn_server();
    let mut conn = open(&server, TransactionReplies::Full);

    conn.queue(CommandRequest::ping()).unwrap();
    assert!(matches!(
        conn.transaction([CommandRequest::ping()]),
        Err(RedwireError::PipelineBusy { pending: 1 })
    ));
}
