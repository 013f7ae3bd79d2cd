use std::sync::Arc;

use http::header::{HeaderName, ACCEPT, ALLOW, CACHE_CONTROL, CONTENT_TYPE, ETAG, LINK, SERVER};
use http::{Method, StatusCode};
use serde_json::{json, Value};

use super::{Service, ServiceHandler};
use crate::context::Context;
use crate::filter::ETag;
use crate::headers;
use crate::request::Request;
use crate::resource::{Crud, Resourcer};
use crate::response::ResponseWriter;
use crate::testing::{request, MockWriter};

struct Tickets;

impl Resourcer for Tickets {
    fn name(&self) -> &str {
        "tickets"
    }

    fn index(&self, ctx: &mut Context<'_>) {
        ctx.respond(&json!([{"id": 1}, {"id": 2}]));
    }
}

impl Crud for Tickets {
    fn create(&self, ctx: &mut Context<'_>) {
        match ctx.decode_body::<Value>() {
            Ok(body) => ctx.respond_with(&body, StatusCode::CREATED),
            Err(e) => ctx.error(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    }

    fn read(&self, ctx: &mut Context<'_>) {
        let id = ctx.path_values.get("id").unwrap_or("").to_string();
        ctx.respond(&json!({ "id": id }));
    }

    fn update(&self, ctx: &mut Context<'_>) {
        ctx.respond(&json!({"updated": true}));
    }

    fn delete(&self, ctx: &mut Context<'_>) {
        ctx.write_header(StatusCode::NO_CONTENT);
    }
}

fn ticket_service() -> ServiceHandler {
    let mut svc = Service::new("/v1").expect("service uri parses");
    svc.resource(Arc::new(Tickets)).crud("{uint:id}");
    svc.into_handler()
}

fn call(handler: &ServiceHandler, req: Request) -> MockWriter {
    let mut w = MockWriter::new();
    handler.handle(&mut w, req);
    w
}

fn body_json(w: &MockWriter) -> Value {
    serde_json::from_slice(&w.body).expect("response body was not JSON")
}

#[test]
fn root_lists_resources_with_default_headers() {
    let handler = ticket_service();
    let w = call(&handler, request(Method::GET, "/v1/"));

    assert_eq!(w.status, Some(StatusCode::OK));
    assert_eq!(
        body_json(&w),
        json!({"tickets": "http://localhost/v1/tickets"})
    );
    assert_eq!(
        headers::get(&w.headers, &SERVER),
        Some(concat!("restive/", env!("CARGO_PKG_VERSION")))
    );
    assert!(headers::get(&w.headers, &HeaderName::from_static("request-id")).is_some());
    let links = headers::get_all_joined(&w.headers, &LINK).unwrap();
    assert!(links.contains("</v1/>; rel=\"self\""));
    assert_eq!(
        headers::get(&w.headers, &CONTENT_TYPE),
        Some("application/json;charset=utf-8")
    );
}

#[test]
fn index_and_read_routes() {
    let handler = ticket_service();

    let w = call(&handler, request(Method::GET, "/v1/tickets"));
    assert_eq!(w.status, Some(StatusCode::OK));
    assert_eq!(body_json(&w), json!([{"id": 1}, {"id": 2}]));
    let links = headers::get_all_joined(&w.headers, &LINK).unwrap();
    assert!(links.contains("rel=\"collection\""));
    assert!(links.contains("rel=\"item\""));

    let w = call(&handler, request(Method::GET, "/v1/tickets/42"));
    assert_eq!(body_json(&w), json!({"id": "42"}));
}

#[test]
fn create_decodes_the_payload() {
    let handler = ticket_service();
    let mut req = request(Method::POST, "/v1/tickets");
    headers::set(&mut req.headers, CONTENT_TYPE, "application/json");
    req.body = br#"{"subject": "door stuck"}"#.to_vec();
    let w = call(&handler, req);
    assert_eq!(w.status, Some(StatusCode::CREATED));
    assert_eq!(body_json(&w), json!({"subject": "door stuck"}));
}

#[test]
fn oversized_payload_surfaces_as_bad_request() {
    let mut svc = Service::new("/v1").expect("service uri parses");
    svc.use_encoder(Arc::new(crate::encoding::JsonEncoder {
        max_body_size: 8,
        ..crate::encoding::JsonEncoder::new()
    }));
    svc.resource(Arc::new(Tickets)).crud("{uint:id}");
    let handler = svc.into_handler();

    let mut req = request(Method::POST, "/v1/tickets");
    headers::set(&mut req.headers, CONTENT_TYPE, "application/json");
    req.body = br#"{"subject": "much too large for the limit"}"#.to_vec();
    let w = call(&handler, req);
    assert_eq!(w.status, Some(StatusCode::BAD_REQUEST));
    let body = body_json(&w);
    assert_eq!(body["message"], "body too large");
}

#[test]
fn collection_put_is_method_not_allowed_with_allow() {
    let handler = ticket_service();
    let w = call(&handler, request(Method::PUT, "/v1/tickets"));
    assert_eq!(w.status, Some(StatusCode::METHOD_NOT_ALLOWED));
    let allow = headers::get(&w.headers, &ALLOW).unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("POST"));
    assert_eq!(body_json(&w)["code"], 405);
}

#[test]
fn unknown_route_is_404_with_stale_cache_hint() {
    let handler = ticket_service();
    let w = call(&handler, request(Method::GET, "/v1/nothing"));
    assert_eq!(w.status, Some(StatusCode::NOT_FOUND));
    assert_eq!(
        headers::get(&w.headers, &CACHE_CONTROL),
        Some("max-age=300, stale-if-error=600")
    );
    assert_eq!(body_json(&w)["message"], "That route was not found.");
}

#[test]
fn unknown_method_is_405_with_allow() {
    let handler = ticket_service();
    let w = call(&handler, request(Method::PATCH, "/v1/tickets/42"));
    assert_eq!(w.status, Some(StatusCode::METHOD_NOT_ALLOWED));
    let allow = headers::get(&w.headers, &ALLOW).unwrap();
    assert!(allow.contains("HEAD"));
    assert!(allow.contains("GET"));
    assert!(allow.contains("PUT"));
    assert!(allow.contains("DELETE"));
}

#[test]
fn head_resolves_the_get_route() {
    let handler = ticket_service();
    let w = call(&handler, request(Method::HEAD, "/v1/tickets/7"));
    assert_eq!(w.status, Some(StatusCode::OK));
}

#[test]
fn service_options_describe_media() {
    let handler = ticket_service();
    let w = call(&handler, request(Method::OPTIONS, "/v1/"));
    assert_eq!(w.status, Some(StatusCode::OK));
    let body = body_json(&w);
    assert_eq!(body["href"], "http://localhost/v1/");
    assert_eq!(body["media"]["type"], "application/vnd.restive");
    assert_eq!(body["media"]["version"], "current");
    assert!(body["media"]["encoders"]
        .as_array()
        .unwrap()
        .contains(&json!("application/json")));
    assert!(headers::get(&w.headers, &ALLOW).unwrap().contains("OPTIONS"));
}

#[test]
fn resource_options_lists_methods() {
    let handler = ticket_service();
    let w = call(&handler, request(Method::OPTIONS, "/v1/tickets"));
    assert_eq!(w.status, Some(StatusCode::NO_CONTENT));
    let allow = headers::get(&w.headers, &ALLOW).unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("POST"));
    assert!(allow.contains("OPTIONS"));
}

#[test]
fn panic_in_handler_recovers_to_500() {
    let mut svc = Service::new("/v1").expect("service uri parses");
    svc.add_route(
        "GET",
        "/v1/boom",
        Arc::new(|_ctx: &mut Context<'_>| panic!("kaboom")),
    );
    let handler = svc.into_handler();
    let w = call(&handler, request(Method::GET, "/v1/boom"));
    assert_eq!(w.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(w.body, b"Internal Server Error");
}

#[test]
fn valid_client_request_id_is_echoed() {
    let handler = ticket_service();
    let rid = HeaderName::from_static("request-id");

    let mut req = request(Method::GET, "/v1/tickets");
    headers::set(&mut req.headers, rid.clone(), "client-supplied-id-0001");
    let w = call(&handler, req);
    assert_eq!(
        headers::get(&w.headers, &rid),
        Some("client-supplied-id-0001")
    );

    let mut req = request(Method::GET, "/v1/tickets");
    headers::set(&mut req.headers, rid.clone(), "short");
    let w = call(&handler, req);
    assert_ne!(headers::get(&w.headers, &rid), Some("short"));
}

#[test]
fn path_extension_selects_encoder_and_routes() {
    let handler = ticket_service();
    let mut req = request(Method::GET, "/v1/tickets.json");
    headers::set(&mut req.headers, ACCEPT, "*/*");
    let w = call(&handler, req);
    assert_eq!(w.status, Some(StatusCode::OK));
    assert_eq!(body_json(&w), json!([{"id": 1}, {"id": 2}]));
}

#[test]
fn service_level_etag_filter_tags_responses() {
    let mut svc = Service::new("/v1").expect("service uri parses");
    svc.use_filter(Arc::new(ETag::default()));
    svc.resource(Arc::new(Tickets)).crud("{uint:id}");
    let handler = svc.into_handler();

    let w = call(&handler, request(Method::GET, "/v1/tickets"));
    assert_eq!(w.status, Some(StatusCode::OK));
    assert!(headers::get(&w.headers, &ETAG).is_some());
}

#[test]
fn uptime_counts_from_service_creation() {
    let handler = ticket_service();
    assert!(handler.uptime() < 60);
}
