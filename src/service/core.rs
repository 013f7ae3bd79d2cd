use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, RwLock, Weak};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use http::header::{HeaderName, ALLOW, CACHE_CONTROL, LINK, SERVER};
use http::StatusCode;
use serde::Serialize;
use tracing::{error, info};
use url::Url;

use crate::content::{
    Negotiator, CONTENT_DEFAULT_LANGUAGE, CONTENT_DEFAULT_VERSION, CONTENT_MEDIA_TYPE,
};
use crate::context::{Context, Handler};
use crate::encoding::{Encoder, JsonEncoder};
use crate::filter::{self, Filter, FilterScope};
use crate::headers;
use crate::ids::RequestId;
use crate::links::{link_header_value, Link};
use crate::request::Request;
use crate::resource::{Resource, Resourcer};
use crate::response::ResponseWriter;
use crate::router::Router;

/// Hook run when a handler panics. Receives the context and the panic
/// message; the default responds 500 with a plain body, keeping the encoder
/// out of the way of secondary faults.
pub type RecoveryFn = Arc<dyn Fn(&mut Context<'_>, &str) + Send + Sync>;

/// Deferred reference to the frozen service internals. Handlers registered
/// during setup (the root and OPTIONS routes, canned 405s) capture one and
/// resolve it at request time, once [`Service::into_handler`] has run.
pub(crate) type CoreSlot = Arc<OnceLock<Weak<ServiceCore>>>;

/// Read-only service state shared by every request once serving begins.
pub(crate) struct ServiceCore {
    pub(crate) uri: String,
    pub(crate) router: Router,
    resources: Vec<(String, String)>,
    links: Vec<Link>,
    encoder_types: Vec<String>,
    server_header: String,
    start: Instant,
}

/// Options description served for `OPTIONS` requests on the base URI.
#[derive(Debug, Serialize)]
pub struct ServiceOptions {
    pub href: String,
    pub media: MediaOptions,
}

#[derive(Debug, Serialize)]
pub struct MediaOptions {
    #[serde(rename = "type")]
    pub media_type: String,
    pub version: String,
    pub language: String,
    pub encoders: Vec<String>,
}

/// A service under construction: resources, routes, encoders and filters are
/// registered on it, then [`Service::into_handler`] freezes it into the
/// shareable request handler.
pub struct Service {
    uri: Url,
    base_path: String,
    router: Router,
    encoders: HashMap<String, Arc<dyn Encoder>>,
    media_types: HashMap<String, String>,
    filters: Vec<Arc<dyn Filter>>,
    resources: Vec<(String, String)>,
    links: Arc<RwLock<Vec<Link>>>,
    core_slot: CoreSlot,
    start: Instant,
    recovery: RecoveryFn,
}

impl Service {
    /// Create a service rooted at `uri`, which may be absolute
    /// (`https://api.example.com/v1`) or a bare path (`/v1`). The base path
    /// is made to end with `/`; user info, query and fragment are dropped.
    ///
    /// Two routes are installed up front: `GET` on the base URI listing the
    /// resources, and `OPTIONS` describing the service.
    pub fn new(uri: &str) -> Result<Self, url::ParseError> {
        let mut parsed = match Url::parse(uri) {
            Ok(u) => u,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse("http://localhost")?.join(uri)?
            }
            Err(e) => return Err(e),
        };
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        let _ = parsed.set_username("");
        let _ = parsed.set_password(None);
        parsed.set_query(None);
        parsed.set_fragment(None);

        let base_path = parsed.path().to_string();
        let mut encoders: HashMap<String, Arc<dyn Encoder>> = HashMap::new();
        encoders.insert("application/json".to_string(), Arc::new(JsonEncoder::new()));
        let mut media_types = HashMap::new();
        media_types.insert("json".to_string(), "application/json".to_string());
        media_types.insert("xml".to_string(), "application/xml".to_string());

        let mut svc = Self {
            uri: parsed.clone(),
            base_path: base_path.clone(),
            router: Router::new(),
            encoders,
            media_types,
            filters: Vec::new(),
            resources: Vec::new(),
            links: Arc::new(RwLock::new(Vec::new())),
            core_slot: Arc::new(OnceLock::new()),
            start: Instant::now(),
            recovery: Arc::new(default_recovery),
        };

        let slot = svc.core_slot.clone();
        svc.router.add_route(
            "GET",
            &base_path,
            Arc::new(move |ctx: &mut Context<'_>| {
                with_core(&slot, ctx, ServiceCore::root_handler)
            }),
        );
        let slot = svc.core_slot.clone();
        svc.router.add_route(
            "OPTIONS",
            &base_path,
            Arc::new(move |ctx: &mut Context<'_>| {
                with_core(&slot, ctx, ServiceCore::options_handler)
            }),
        );

        info!(uri = %parsed, "new service");
        Ok(svc)
    }

    /// The parsed service URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The service base path, always ending with `/`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub(crate) fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub(crate) fn core_slot(&self) -> CoreSlot {
        self.core_slot.clone()
    }

    /// Register a route directly with the routing engine. The path must
    /// reside under the service base path; no checks are made.
    pub fn add_route(&mut self, method: &str, path: &str, handler: Handler) -> &mut Self {
        self.router.add_route(method, path, handler);
        self
    }

    /// Append a service-level filter, run for all incoming requests in
    /// registration order. Filters whose scope predicate excludes the
    /// service scope are ignored.
    pub fn use_filter(&mut self, filter: Arc<dyn Filter>) -> &mut Self {
        if filter.run_in(FilterScope::Service) {
            self.filters.push(filter);
        } else {
            info!("filter not usable at service scope");
        }
        self
    }

    /// Register an encoder, replacing any existing one for the same media
    /// type.
    pub fn use_encoder(&mut self, encoder: Arc<dyn Encoder>) -> &mut Self {
        self.encoders
            .insert(encoder.accept().to_string(), encoder);
        self
    }

    /// Map a path extension (without the dot) to a media type for
    /// extension-based negotiation.
    pub fn register_media_type(&mut self, ext: &str, media_type: &str) -> &mut Self {
        self.media_types
            .insert(ext.to_string(), media_type.to_string());
        self
    }

    /// Replace the panic recovery hook.
    pub fn use_recovery(&mut self, recovery: RecoveryFn) -> &mut Self {
        self.recovery = recovery;
        self
    }

    /// Add a service-level relation link, emitted by the root handler.
    pub fn new_link(&mut self, link: Link) -> &mut Self {
        self.links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(link);
        self
    }

    /// Register a resource under the base URI and return its registration
    /// handle. An OPTIONS route and a GET route to [`Resourcer::index`] are
    /// installed, along with the index and collection relation links.
    ///
    /// # Panics
    ///
    /// Panics when the collection's name is empty.
    pub fn resource<T: Resourcer + 'static>(&mut self, collection: Arc<T>) -> Resource<'_, T> {
        let name = collection.name().trim().to_lowercase();
        assert!(
            !name.is_empty(),
            "resource registration requires a non-empty name"
        );

        let path = format!("{}{}", self.base_path, name);
        let abs_path = self
            .uri
            .join(&name)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| path.clone());
        let rel = format!("{}rel/{}", self.uri, name);
        self.resources.push((name.clone(), abs_path.clone()));

        let mut res = Resource {
            svc: self,
            name,
            path,
            abs_path: abs_path.clone(),
            collection: collection.clone(),
            links: Arc::new(RwLock::new(Vec::new())),
            filters: Vec::new(),
        };

        // OPTIONS lists the methods allowed
        res.default_options_route();

        // GET on the collection accesses the index handler
        res.get(
            "",
            Arc::new(move |ctx: &mut Context<'_>| collection.index(ctx)),
        );

        res.new_link(Link::new(abs_path.clone(), rel));
        res.new_link(Link::new(abs_path, "collection"));
        res
    }

    /// Freeze the service into a request handler: compose the filter chain
    /// around the dispatcher, wrap it in content negotiation and share the
    /// read-only core.
    pub fn into_handler(self) -> ServiceHandler {
        let mut encoder_types: Vec<String> = self.encoders.keys().cloned().collect();
        encoder_types.sort();

        let core = Arc::new(ServiceCore {
            uri: self.uri.to_string(),
            router: self.router,
            resources: self.resources,
            links: self
                .links
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            encoder_types,
            server_header: concat!("restive/", env!("CARGO_PKG_VERSION")).to_string(),
            start: self.start,
        });
        let _ = self.core_slot.set(Arc::downgrade(&core));

        let dispatch_core = core.clone();
        let dispatch: Handler =
            Arc::new(move |ctx: &mut Context<'_>| dispatch_core.dispatch(ctx));
        let chain = filter::attach(dispatch, &self.filters, FilterScope::Service);
        let negotiator = Arc::new(Negotiator {
            encoders: self.encoders,
            media_types: self.media_types,
        });
        let chain = negotiator.wrap(chain);

        ServiceHandler {
            core,
            chain,
            recovery: self.recovery,
        }
    }
}

impl ServiceCore {
    /// Connect the request to a resource handler, or respond with the
    /// routing error.
    fn dispatch(&self, ctx: &mut Context<'_>) {
        let method = ctx.request.method.clone();
        let path = ctx.request.path.clone();
        match self.router.find_handler(&method, &path, &mut ctx.path_values) {
            Ok(handler) => handler(ctx),
            Err(err) => {
                headers::set(
                    ctx.headers_mut(),
                    CACHE_CONTROL,
                    "max-age=300, stale-if-error=600",
                );
                if err.status() == StatusCode::METHOD_NOT_ALLOWED {
                    headers::set(ctx.headers_mut(), ALLOW, &self.router.path_methods(&path));
                }
                ctx.error_status(&err);
            }
        }
    }

    /// Responds with a map of all resources managed by the service; the
    /// default route for the base URI.
    fn root_handler(&self, ctx: &mut Context<'_>) {
        let resources: BTreeMap<&str, &str> = self
            .resources
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_str()))
            .collect();
        for link in &self.links {
            headers::append(ctx.headers_mut(), LINK, &link.to_string());
        }
        ctx.respond(&resources);
    }

    /// Responds to OPTIONS requests on the base URI with the service
    /// options.
    fn options_handler(&self, ctx: &mut Context<'_>) {
        let methods = self.router.path_methods(&ctx.request.path);
        headers::set(ctx.headers_mut(), ALLOW, &methods);
        ctx.respond(&self.options());
    }

    fn options(&self) -> ServiceOptions {
        ServiceOptions {
            href: self.uri.clone(),
            media: MediaOptions {
                media_type: CONTENT_MEDIA_TYPE.to_string(),
                version: CONTENT_DEFAULT_VERSION.to_string(),
                language: CONTENT_DEFAULT_LANGUAGE.to_string(),
                encoders: self.encoder_types.clone(),
            },
        }
    }
}

fn with_core(slot: &CoreSlot, ctx: &mut Context<'_>, f: fn(&ServiceCore, &mut Context<'_>)) {
    match slot.get().and_then(Weak::upgrade) {
        Some(core) => f(&core, ctx),
        None => ctx.error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Service is not accepting requests yet.",
        ),
    }
}

fn default_recovery(ctx: &mut Context<'_>, _msg: &str) {
    ctx.write_header(StatusCode::INTERNAL_SERVER_ERROR);
    let _ = ctx.write(b"Internal Server Error");
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The frozen, shareable request handler for a service. Hosts call
/// [`ServiceHandler::handle`] once per request with a response writer and
/// the parsed request.
pub struct ServiceHandler {
    core: Arc<ServiceCore>,
    chain: Handler,
    recovery: RecoveryFn,
}

impl ServiceHandler {
    /// Run one request through the pipeline: allocate a pooled context, set
    /// the default response headers, run the negotiation/filter/dispatch
    /// chain, and recover from panics.
    pub fn handle(&self, writer: &mut dyn ResponseWriter, request: Request) {
        let mut ctx = Context::acquire(writer, request);

        let request_id = RequestId::from_header_or_new(
            ctx.request.header(&HeaderName::from_static("request-id")),
        );

        // default headers for every response
        headers::set(ctx.headers_mut(), SERVER, &self.core.server_header);
        headers::set(
            ctx.headers_mut(),
            HeaderName::from_static("request-id"),
            request_id.as_str(),
        );
        let self_link = link_header_value(&ctx.request.path, &["rel=\"self\""]);
        headers::append(ctx.headers_mut(), LINK, &self_link);

        ctx.set("request.id", request_id.as_str());
        ctx.set(
            "request.start_time",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        );
        ctx.request_id = request_id;

        let chain = &self.chain;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| chain(&mut ctx))) {
            let msg = panic_message(panic);
            error!(request_id = %ctx.request_id, panic = %msg, "panic recovery");
            (self.recovery)(&mut ctx, &msg);
        }

        ctx.free();
    }

    /// Seconds since the service was created.
    pub fn uptime(&self) -> u64 {
        self.core.start.elapsed().as_secs()
    }
}
