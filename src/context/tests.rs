use http::header::{HeaderName, CONTENT_LENGTH, ETAG, REFERER, USER_AGENT};
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::json;

use super::core::{Context, PathValues};
use crate::headers;
use crate::response::ResponseWriter;
use crate::testing::{request, MockWriter};

#[test]
fn write_header_is_idempotent() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/"));
    ctx.write_header(StatusCode::CREATED);
    ctx.write_header(StatusCode::NOT_FOUND);
    assert_eq!(ctx.status(), StatusCode::CREATED);
    ctx.free();
    assert_eq!(w.status, Some(StatusCode::CREATED));
}

#[test]
fn body_write_defaults_status_to_ok() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/"));
    ctx.write(b"hello").unwrap();
    assert_eq!(ctx.status(), StatusCode::OK);
    assert_eq!(ctx.bytes(), 5);
    ctx.free();
    assert_eq!(w.status, Some(StatusCode::OK));
    assert_eq!(w.body, b"hello");
}

#[test]
fn bytes_counts_only_body() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/"));
    ctx.write_header(StatusCode::OK);
    assert_eq!(ctx.bytes(), 0);
    ctx.write(b"12345678").unwrap();
    ctx.write(b"90").unwrap();
    assert_eq!(ctx.bytes(), 10);
    ctx.free();
}

#[test]
fn respond_encodes_with_bound_encoder() {
    #[derive(Serialize)]
    struct Message {
        status: u16,
        text: &'static str,
    }

    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::POST, "/v1/tickets"));
    ctx.respond_with(
        &Message {
            status: 201,
            text: "Ticket created",
        },
        StatusCode::CREATED,
    );
    ctx.free();
    assert_eq!(w.status, Some(StatusCode::CREATED));
    let body: serde_json::Value = serde_json::from_slice(&w.body).unwrap();
    assert_eq!(body, json!({"status": 201, "text": "Ticket created"}));
}

#[test]
fn error_encodes_status_error_record() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/nope"));
    ctx.error_with(
        StatusCode::NOT_IMPLEMENTED,
        "That route is not implemented",
        json!({"method": "PATCH", "path": "/v1/tickets/{id}"}),
    );
    ctx.free();
    assert_eq!(w.status, Some(StatusCode::NOT_IMPLEMENTED));
    let body: serde_json::Value = serde_json::from_slice(&w.body).unwrap();
    assert_eq!(body["code"], 501);
    assert_eq!(body["details"]["method"], "PATCH");
}

#[test]
fn capture_diverts_writes_and_release_restores() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/"));
    headers::set(ctx.headers_mut(), ETAG, "\"seed\"");

    ctx.capture();
    ctx.write_header(StatusCode::ACCEPTED);
    ctx.write(b"buffered").unwrap();
    // headers seeded from the writer at capture time
    assert_eq!(headers::get(ctx.headers(), &ETAG), Some("\"seed\""));

    let rb = ctx.release();
    assert_eq!(rb.status(), StatusCode::ACCEPTED);
    assert_eq!(rb.bytes(), b"buffered");
    // nothing reached the real writer while buffering
    assert_eq!(ctx.bytes(), 0);
    assert!(!ctx.wrote_header());

    rb.flush(&mut ctx).unwrap();
    assert_eq!(ctx.status(), StatusCode::ACCEPTED);
    ctx.free();
    assert_eq!(w.body, b"buffered");
}

#[test]
fn nested_captures_unwind_in_order() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/"));
    ctx.capture();
    ctx.capture();
    ctx.write(b"inner").unwrap();
    let inner = ctx.release();
    assert_eq!(inner.bytes(), b"inner");
    inner.flush(&mut ctx).unwrap();
    let outer = ctx.release();
    assert_eq!(outer.bytes(), b"inner");
    outer.flush(&mut ctx).unwrap();
    ctx.free();
    assert_eq!(w.body, b"inner");
}

#[test]
fn extras_round_trip() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/"));
    ctx.set("content.version", "v2");
    ctx.set("cors.request", false);
    assert_eq!(ctx.get_str("content.version"), Some("v2"));
    assert_eq!(ctx.get("cors.request"), Some(&json!(false)));
    assert_eq!(ctx.get("missing"), None);
    ctx.free();
}

#[test]
fn decode_body_uses_bound_decoder() {
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Ticket {
        id: u32,
        tag: String,
    }

    let mut w = MockWriter::new();
    let mut req = request(Method::POST, "/v1/tickets");
    req.body = br#"{"id": 7, "tag": "urgent"}"#.to_vec();
    let ctx = Context::acquire(&mut w, req);
    let ticket: Ticket = ctx.decode_body().unwrap();
    assert_eq!(
        ticket,
        Ticket {
            id: 7,
            tag: "urgent".to_string()
        }
    );
    ctx.free();
}

#[test]
fn path_values_positional_and_named_keys_coexist() {
    let mut pv = PathValues::new();
    pv.record(Some("id"), "444");
    pv.record(None, "2014");
    pv.record(Some("tag"), "rust");
    assert_eq!(pv.get("_1"), Some("444"));
    assert_eq!(pv.get("id"), Some("444"));
    assert_eq!(pv.get("_2"), Some("2014"));
    assert_eq!(pv.get("_3"), Some("rust"));
    assert_eq!(pv.get("tag"), Some("rust"));
    assert_eq!(pv.get("nope"), None);
}

#[test]
fn format_log_renders_request_line_and_status() {
    let mut w = MockWriter::new();
    let mut req = request(Method::GET, "/v1/tickets");
    req.query = "page=2".to_string();
    headers::set(&mut req.headers, USER_AGENT, "curl/8.0");
    headers::set(&mut req.headers, REFERER, "https://example.com/");
    headers::set(&mut req.headers, CONTENT_LENGTH, "0");
    let mut ctx = Context::acquire(&mut w, req);
    ctx.write_header(StatusCode::OK);

    assert_eq!(ctx.format_log("%m"), "GET");
    assert_eq!(ctx.format_log("\"%r\""), "\"GET /v1/tickets?page=2 HTTP/1.1\"");
    assert_eq!(ctx.format_log("\"%#r\""), "\"GET /v1/tickets?page=2\"");
    assert_eq!(ctx.format_log("%s"), "200");
    assert_eq!(ctx.format_log("%#s"), "200 OK");
    assert_eq!(ctx.format_log("%h"), "192.0.2.1");
    assert_eq!(ctx.format_log("%v"), "api.example.com");
    assert_eq!(ctx.format_log("%P"), "80");
    assert_eq!(ctx.format_log("%A"), "curl/8.0");
    assert_eq!(ctx.format_log("%R"), "https://example.com/");
    assert_eq!(ctx.format_log("%U"), "/v1/tickets");
    assert_eq!(ctx.format_log("%q"), "page=2");
    assert_eq!(ctx.format_log("%l"), "-");
    assert_eq!(ctx.format_log("100%%"), "100%");
    ctx.free();
}

#[test]
fn format_log_body_bytes_and_user() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/"));
    assert_eq!(ctx.format_log("%b"), "-");
    assert_eq!(ctx.format_log("%B"), "0");
    ctx.write(b"xyz").unwrap();
    assert_eq!(ctx.format_log("%b"), "3");
    assert_eq!(ctx.format_log("%u"), "-");
    ctx.set("auth.user", "alice");
    assert_eq!(ctx.format_log("%u"), "alice");
    ctx.free();
}

#[test]
fn format_log_precision_truncates() {
    let mut w = MockWriter::new();
    let mut ctx = Context::acquire(&mut w, request(Method::GET, "/v1/"));
    let full = ctx.format_log("%L");
    let short = ctx.format_log("%.8L");
    assert_eq!(short.len(), 8);
    assert!(full.starts_with(&short));
    // %D consumes precision as decimal places
    let elapsed = ctx.format_log("%.6D");
    let decimals = elapsed.split('.').nth(1).unwrap();
    assert_eq!(decimals.len(), 6);
    ctx.free();
}

#[test]
fn format_log_proxied_address() {
    let mut w = MockWriter::new();
    let mut req = request(Method::GET, "/v1/");
    headers::set(
        &mut req.headers,
        HeaderName::from_static("x-forwarded-for"),
        "203.0.113.9",
    );
    let ctx = Context::acquire(&mut w, req);
    assert_eq!(ctx.format_log("%a"), "192.0.2.1:52611");
    assert_eq!(ctx.format_log("%#a"), "203.0.113.9");
    ctx.free();
}
