//! Integration tests for frame transfer over a real TCP loopback connection
//! and for the console input relay fed across threads.
//!
//! These exercise the public API the server and client crates build on:
//! `write_frame` / `read_frame` against `TcpStream`, and `PendingInput`
//! shared between a producer thread and a consumer.

use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use chat_core::{
    read_frame, spawn_line_reader, write_frame, EndReason, Frame, PendingInput, ShutdownSignal,
};

/// Binds an ephemeral loopback listener and returns both ends of one
/// accepted connection.
fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    (client, server)
}

#[test]
fn test_frames_arrive_in_order_over_tcp() {
    // Arrange
    let (mut client, mut server) = loopback_pair();
    let sent = vec![
        Frame::Accepted,
        Frame::Data(b"first".to_vec()),
        Frame::Data(Vec::new()),
        Frame::Data(b"third".to_vec()),
    ];

    // Act
    let writer_frames = sent.clone();
    let writer = thread::spawn(move || {
        for frame in &writer_frames {
            write_frame(&mut server, frame).expect("write frame");
        }
    });
    let received: Vec<Frame> = (0..sent.len())
        .map(|_| read_frame(&mut client).expect("read frame"))
        .collect();
    writer.join().expect("writer panicked");

    // Assert
    assert_eq!(received, sent);
}

#[test]
fn test_close_frame_carries_reason_and_debug_text() {
    let (mut client, mut server) = loopback_pair();

    write_frame(
        &mut client,
        &Frame::Close {
            reason: EndReason::APP_GENERIC.code(),
            debug: "Server Shutdown".to_string(),
        },
    )
    .expect("write close");

    match read_frame(&mut server).expect("read close") {
        Frame::Close { reason, debug } => {
            assert_eq!(EndReason(reason), EndReason::APP_GENERIC);
            assert_eq!(debug, "Server Shutdown");
        }
        other => panic!("expected Close frame, got {other:?}"),
    }
}

#[test]
fn test_peer_hangup_is_reported_as_disconnect() {
    // Arrange
    let (client, mut server) = loopback_pair();

    // Act: drop the client side without sending anything
    drop(client);
    let err = read_frame(&mut server).expect_err("read after hangup must fail");

    // Assert
    assert!(err.is_disconnect(), "unexpected error kind: {err}");
}

#[test]
fn test_console_lines_cross_threads_in_fifo_order() {
    // Arrange: the producer end of a loopback socket plays the role of the
    // terminal, the reader thread consumes it like stdin.
    let (mut terminal, input_side) = loopback_pair();
    let queue = PendingInput::new();
    let shutdown = ShutdownSignal::new();
    let reader = spawn_line_reader(BufReader::new(input_side), queue.clone(), shutdown.clone())
        .expect("spawn reader");

    // Act
    terminal
        .write_all(b"  hello  \n\n\t\nworld\n/quit\n")
        .expect("write lines");
    drop(terminal);
    reader.join().expect("reader panicked");

    // Assert
    assert!(shutdown.is_triggered(), "end of input must request shutdown");
    assert_eq!(queue.try_dequeue().as_deref(), Some("hello"));
    assert_eq!(queue.try_dequeue().as_deref(), Some("world"));
    assert_eq!(queue.try_dequeue().as_deref(), Some("/quit"));
    assert_eq!(queue.try_dequeue(), None);
}
