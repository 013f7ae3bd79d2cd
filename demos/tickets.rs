//! A small runnable service: a ticket collection with CRUD routes, entity
//! tags, gzip compression and access logs.
//!
//! ```sh
//! cargo run --example tickets
//! curl -i http://127.0.0.1:8000/v1/
//! curl -i http://127.0.0.1:8000/v1/tickets
//! curl -i -X POST -H 'Content-Type: application/json' \
//!      -d '{"subject": "door stuck"}' http://127.0.0.1:8000/v1/tickets
//! curl -i http://127.0.0.1:8000/v1/tickets/1
//! ```

use std::sync::{Arc, RwLock};

use http::StatusCode;
use restive::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ticket {
    id: u64,
    subject: String,
}

#[derive(Debug, Deserialize)]
struct TicketDraft {
    subject: String,
}

struct Tickets {
    store: RwLock<Vec<Ticket>>,
}

impl Tickets {
    fn seeded() -> Self {
        Self {
            store: RwLock::new(vec![
                Ticket {
                    id: 1,
                    subject: "Coffee machine leaks".to_string(),
                },
                Ticket {
                    id: 2,
                    subject: "Stand-up desk stuck standing".to_string(),
                },
            ]),
        }
    }

    fn ticket_id(ctx: &Context<'_>) -> Option<u64> {
        ctx.path_values.get("id").and_then(|v| v.parse().ok())
    }
}

impl Resourcer for Tickets {
    fn name(&self) -> &str {
        "tickets"
    }

    fn index(&self, ctx: &mut Context<'_>) {
        let tickets = self.store.read().unwrap().clone();
        ctx.respond(&tickets);
    }
}

impl Crud for Tickets {
    fn create(&self, ctx: &mut Context<'_>) {
        let draft: TicketDraft = match ctx.decode_body() {
            Ok(draft) => draft,
            Err(e) => return ctx.error(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        let mut store = self.store.write().unwrap();
        let ticket = Ticket {
            id: store.iter().map(|t| t.id).max().unwrap_or(0) + 1,
            subject: draft.subject,
        };
        store.push(ticket.clone());
        ctx.respond_with(&ticket, StatusCode::CREATED);
    }

    fn read(&self, ctx: &mut Context<'_>) {
        let Some(id) = Self::ticket_id(ctx) else {
            return ctx.error(StatusCode::BAD_REQUEST, "Malformed ticket id.");
        };
        let store = self.store.read().unwrap();
        match store.iter().find(|t| t.id == id) {
            Some(ticket) => ctx.respond(ticket),
            None => ctx.error(StatusCode::NOT_FOUND, "No such ticket."),
        }
    }

    fn update(&self, ctx: &mut Context<'_>) {
        let Some(id) = Self::ticket_id(ctx) else {
            return ctx.error(StatusCode::BAD_REQUEST, "Malformed ticket id.");
        };
        let draft: TicketDraft = match ctx.decode_body() {
            Ok(draft) => draft,
            Err(e) => return ctx.error(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        let mut store = self.store.write().unwrap();
        match store.iter_mut().find(|t| t.id == id) {
            Some(ticket) => {
                ticket.subject = draft.subject;
                let updated = ticket.clone();
                ctx.respond(&updated);
            }
            None => ctx.error(StatusCode::NOT_FOUND, "No such ticket."),
        }
    }

    fn delete(&self, ctx: &mut Context<'_>) {
        let Some(id) = Self::ticket_id(ctx) else {
            return ctx.error(StatusCode::BAD_REQUEST, "Malformed ticket id.");
        };
        let mut store = self.store.write().unwrap();
        let before = store.len();
        store.retain(|t| t.id != id);
        if store.len() == before {
            ctx.error(StatusCode::NOT_FOUND, "No such ticket.");
        } else {
            ctx.respond_with(&json!({"deleted": id}), StatusCode::OK);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,restive=debug".into()),
        )
        .init();

    let mut svc = Service::new("/v1")?;
    svc.use_filter(Arc::new(Logs::default()));
    svc.use_filter(Arc::new(Security {
        ua_check_disable: true,
        ..Security::default()
    }));
    svc.use_filter(Arc::new(Gzip::default()));
    svc.use_filter(Arc::new(ETag::default()));
    svc.resource(Arc::new(Tickets::seeded())).crud("{uint:id}");

    HttpServer::new(svc.into_handler()).serve("127.0.0.1:8000")?;
    Ok(())
}
