//! HTTP round-trips against the live-frame endpoint.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, SystemTime};

use clip_sentry::{ApiConfig, Frame, LatestFrameSlot, LiveApiServer};

fn get(addr: std::net::SocketAddr, path: &str) -> (u16, String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    write!(stream, "GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path).expect("request");

    let mut response = Vec::new();
    stream.read_to_end(&mut response).expect("response");
    let header_end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator");
    let head = String::from_utf8_lossy(&response[..header_end]).into_owned();
    let body = response[header_end + 4..].to_vec();
    let status: u16 = head
        .split_whitespace()
        .nth(1)
        .expect("status code")
        .parse()
        .expect("numeric status");
    (status, head, body)
}

fn test_frame(tag: u8) -> Frame {
    Frame::new(vec![tag; 16 * 12 * 3], 16, 12, SystemTime::now(), 0).expect("frame")
}

#[test]
fn health_frame_and_status_round_trip() {
    let slot = LatestFrameSlot::new();
    let handle = LiveApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        slot.clone(),
    )
    .spawn()
    .expect("spawn api");
    let addr = handle.addr;

    let (status, _, body) = get(addr, "/health");
    assert_eq!(status, 200);
    assert_eq!(body, br#"{"status":"ok"}"#);

    // No frame published yet.
    let (status, _, body) = get(addr, "/frame");
    assert_eq!(status, 503);
    let err: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(err["error"], "no_frame_yet");

    slot.publish(&test_frame(7));
    slot.publish(&test_frame(9));

    let (status, head, body) = get(addr, "/frame");
    assert_eq!(status, 200);
    assert!(head.contains("image/jpeg"));
    assert_eq!(&body[..2], &[0xFF, 0xD8]);

    let (status, _, body) = get(addr, "/status");
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["frames_published"], 2);
    assert_eq!(json["width"], 16);
    assert_eq!(json["height"], 12);

    handle.stop().expect("stop api");
}

#[test]
fn unknown_paths_and_methods_are_rejected() {
    let handle = LiveApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        LatestFrameSlot::new(),
    )
    .spawn()
    .expect("spawn api");
    let addr = handle.addr;

    let (status, _, _) = get(addr, "/nope");
    assert_eq!(status, 404);

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    write!(stream, "POST /health HTTP/1.1\r\nHost: test\r\n\r\n").expect("request");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).expect("response");
    let head = String::from_utf8_lossy(&response);
    assert!(head.starts_with("HTTP/1.1 405"));

    handle.stop().expect("stop api");
}
