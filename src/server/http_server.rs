use std::io::{self, BufReader};
use std::sync::Arc;

use http::header::CONNECTION;
use http::Method;
use may::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::request::read_request;
use super::writer::HostResponse;
use crate::request::Request;
use crate::service::ServiceHandler;

/// Serves a [`ServiceHandler`] over HTTP/1.1, one coroutine per connection.
///
/// ```ignore
/// let mut svc = Service::new("/v1")?;
/// svc.resource(Arc::new(Tickets)).crud("{uint:id}");
/// HttpServer::new(svc.into_handler()).serve("0.0.0.0:8000")?;
/// ```
pub struct HttpServer {
    handler: Arc<ServiceHandler>,
}

impl HttpServer {
    pub fn new(handler: ServiceHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Bind `addr` and serve until the listener fails. The accept loop runs
    /// as a coroutine; this call blocks the calling thread on it.
    pub fn serve(&self, addr: &str) -> io::Result<()> {
        let listener = TcpListener::bind(addr)?;
        info!(addr, "listening");
        let handler = self.handler.clone();
        let accept = may::go!(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let handler = handler.clone();
                        may::go!(move || handle_connection(stream, handler));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        });
        accept
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "accept loop ended abnormally"))
    }
}

fn wants_keep_alive(req: &Request) -> bool {
    let connection = req.header_or_empty(&CONNECTION).to_ascii_lowercase();
    if req.proto == "HTTP/1.0" {
        connection.contains("keep-alive")
    } else {
        !connection.contains("close")
    }
}

fn handle_connection(mut stream: TcpStream, handler: Arc<ServiceHandler>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);

    loop {
        match read_request(&mut reader, &peer, false) {
            Ok(Some(request)) => {
                let keep_alive = wants_keep_alive(&request);
                let head_only = request.method == Method::HEAD;

                let mut response = HostResponse::new();
                handler.handle(&mut response, request);

                if let Err(e) = response.write_to(&mut stream, head_only, keep_alive) {
                    debug!(peer, error = %e, "response write failed");
                    return;
                }
                if !keep_alive {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                debug!(peer, error = %e, "request read failed");
                let mut bad = HostResponse::new();
                crate::response::ResponseWriter::write_header(
                    &mut bad,
                    http::StatusCode::BAD_REQUEST,
                );
                let _ = bad.write_to(&mut stream, false, false);
                return;
            }
        }
    }
}
