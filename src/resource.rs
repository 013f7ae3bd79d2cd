//! The resource facade: a namespace where all operations for one resource
//! happen, with Index/CRUD/Options conventions and relation links.

use std::sync::{Arc, RwLock};

use http::header::{HeaderName, ALLOW, LINK};
use http::StatusCode;
use tracing::debug;

use crate::context::{Context, Handler};
use crate::filter::{self, Filter, FilterScope};
use crate::headers;
use crate::links::Link;
use crate::response::ResponseWriter;
use crate::service::{CoreSlot, Service};

/// A collection served as a resource. The name becomes the resource's URL
/// segment under the service base path.
///
/// ```ignore
/// struct Locations {
///     city: String,
///     country: String,
/// }
///
/// impl Resourcer for Locations {
///     fn name(&self) -> &str {
///         "locations"
///     }
///     fn index(&self, ctx: &mut Context<'_>) {
///         ctx.respond(&self.city);
///     }
/// }
/// ```
pub trait Resourcer: Send + Sync {
    /// The resource's URL segment. Lowercased on registration; registration
    /// panics on an empty name.
    fn name(&self) -> &str;

    /// Serves the entry GET request to the resource, such as the listing of
    /// a collection.
    fn index(&self, ctx: &mut Context<'_>);
}

/// Implemented by collections that provide their own response to OPTIONS
/// requests; attach with [`Resource::optioner`].
pub trait Optioner: Send + Sync {
    fn options(&self, ctx: &mut Context<'_>);
}

/// Create, read, update and delete operations over a [`Resourcer`]
/// collection; wired up by [`Resource::crud`].
pub trait Crud: Resourcer {
    /// Creation of new resource items via POST.
    fn create(&self, ctx: &mut Context<'_>);

    /// A specific resource item given an ID or name, via GET.
    fn read(&self, ctx: &mut Context<'_>);

    /// Updates to resource items via PUT.
    fn update(&self, ctx: &mut Context<'_>);

    /// Removal of items via DELETE.
    fn delete(&self, ctx: &mut Context<'_>);
}

/// Registration handle for one resource within a [`Service`]. Routes added
/// through it live under the resource path and inherit the resource's
/// filters and relation links.
pub struct Resource<'s, T: ?Sized> {
    pub(crate) svc: &'s mut Service,
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) abs_path: String,
    pub(crate) collection: Arc<T>,
    pub(crate) links: Arc<RwLock<Vec<Link>>>,
    pub(crate) filters: Vec<Arc<dyn Filter>>,
}

/// Handler responding 501 for routes that exist but aren't implemented yet.
pub fn not_implemented() -> Handler {
    Arc::new(|ctx: &mut Context<'_>| {
        ctx.error(StatusCode::NOT_IMPLEMENTED, "That route is not implemented.");
    })
}

fn method_not_allowed(slot: CoreSlot) -> Handler {
    Arc::new(move |ctx: &mut Context<'_>| {
        if let Some(core) = slot.get().and_then(|w| w.upgrade()) {
            let methods = core.router.path_methods(&ctx.request.path);
            headers::set(ctx.headers_mut(), ALLOW, &methods);
        }
        let message = format!("The method {} is not allowed.", ctx.request.method);
        ctx.error(StatusCode::METHOD_NOT_ALLOWED, &message);
    })
}

impl<'s, T: Resourcer + ?Sized + 'static> Resource<'s, T> {
    /// A handler responding 405 with an `Allow` header listing what the
    /// path does accept. Useful for collection-level PUT/DELETE routes.
    pub fn method_not_allowed(&self) -> Handler {
        method_not_allowed(self.svc.core_slot())
    }

    /// The resource path; absolute includes the service URI authority.
    pub fn path(&self, absolute: bool) -> String {
        if absolute {
            self.abs_path.clone()
        } else {
            self.path.clone()
        }
    }

    /// Attach a resource-level filter, run for every route of this resource
    /// after service filters. Filters whose scope predicate excludes the
    /// resource scope are ignored.
    pub fn use_filter(&mut self, filter: Arc<dyn Filter>) -> &mut Self {
        if !filter.run_in(FilterScope::Resource) {
            debug!(resource = %self.name, "filter not usable at resource scope");
            return self;
        }
        self.filters.push(filter);
        self
    }

    /// Add a route under this resource and return the resource for chaining.
    ///
    /// `path` may hold path segment expressions (see [`crate::router`]).
    /// `filters` are route-level filters, run after the resource's own.
    pub fn route(
        &mut self,
        method: &str,
        path: &str,
        handler: Handler,
        filters: &[Arc<dyn Filter>],
    ) -> &mut Self {
        let handler = self.relation_handler(handler);
        // route-specific filters, then inherited resource filters, so the
        // resource's run first
        let handler = filter::attach(handler, filters, FilterScope::Router);
        let handler = filter::attach(handler, &self.filters, FilterScope::Resource);

        let full = format!("{}/{}", self.path, path);
        self.svc.router_mut().add_route(method, &full, handler);
        self
    }

    pub fn get(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.route("GET", path, handler, &[])
    }

    pub fn post(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.route("POST", path, handler, &[])
    }

    pub fn put(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.route("PUT", path, handler, &[])
    }

    pub fn patch(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.route("PATCH", path, handler, &[])
    }

    pub fn delete(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.route("DELETE", path, handler, &[])
    }

    pub fn options(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.route("OPTIONS", path, handler, &[])
    }

    /// Replace the default OPTIONS response with the collection's own.
    pub fn optioner(&mut self, optioner: Arc<dyn Optioner>) -> &mut Self {
        let slot = self.svc.core_slot();
        let handler: Handler = Arc::new(move |ctx: &mut Context<'_>| {
            allow_header(&slot, ctx);
            optioner.options(ctx);
        });
        self.options("", handler)
    }

    /// Wire the CRUD operations of the collection:
    ///
    /// ```text
    /// GET    /name/{pse}   read
    /// POST   /name         create
    /// PUT    /name         405 Method Not Allowed
    /// PUT    /name/{pse}   update
    /// DELETE /name         405 Method Not Allowed
    /// DELETE /name/{pse}   delete
    /// ```
    ///
    /// `pse` is a path segment expression; when empty, a singular form of
    /// the resource name is used (`{ticket}` for `tickets`), falling back to
    /// `{item}`.
    pub fn crud(&mut self, pse: &str) -> &mut Self
    where
        T: Crud,
    {
        let pse = if pse.is_empty() {
            let singular = self.name.trim_end_matches('s');
            if singular.is_empty() {
                "{item}".to_string()
            } else {
                format!("{{{singular}}}")
            }
        } else {
            pse.to_string()
        };

        let coll = self.collection.clone();
        self.route(
            "GET",
            &pse,
            Arc::new(move |ctx: &mut Context<'_>| coll.read(ctx)),
            &[],
        );
        let coll = self.collection.clone();
        self.route(
            "POST",
            "",
            Arc::new(move |ctx: &mut Context<'_>| coll.create(ctx)),
            &[],
        );
        self.route("PUT", "", method_not_allowed(self.svc.core_slot()), &[]);
        let coll = self.collection.clone();
        self.route(
            "PUT",
            &pse,
            Arc::new(move |ctx: &mut Context<'_>| coll.update(ctx)),
            &[],
        );
        self.route("DELETE", "", method_not_allowed(self.svc.core_slot()), &[]);
        let coll = self.collection.clone();
        self.route(
            "DELETE",
            &pse,
            Arc::new(move |ctx: &mut Context<'_>| coll.delete(ctx)),
            &[],
        );

        let link = Link::new(format!("{}/{}", self.abs_path, pse), "item");
        self.new_link(link);
        self
    }

    /// Insert a relation link for this resource. A link with the same URI
    /// and relation replaces the existing one.
    pub fn new_link(&mut self, link: Link) -> &mut Self {
        let mut links = self.links.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = links
            .iter_mut()
            .find(|l| l.uri == link.uri && l.rel == link.rel)
        {
            *existing = link;
        } else {
            links.push(link);
        }
        drop(links);
        self
    }

    /// Wrap a handler so responses carry this resource's relation links.
    fn relation_handler(&self, next: Handler) -> Handler {
        let links = self.links.clone();
        Arc::new(move |ctx: &mut Context<'_>| {
            for link in links.read().unwrap_or_else(|e| e.into_inner()).iter() {
                headers::append(ctx.headers_mut(), LINK, &link.to_string());
            }
            next(ctx);
        })
    }

    /// The default OPTIONS route: an `Allow` header listing the methods
    /// available on the URI, with `Accept-Patch` when PATCH is among them.
    pub(crate) fn default_options_route(&mut self) {
        let slot = self.svc.core_slot();
        let handler: Handler = Arc::new(move |ctx: &mut Context<'_>| {
            allow_header(&slot, ctx);
            ctx.write_header(StatusCode::NO_CONTENT);
        });
        self.options("", handler);
    }
}

fn allow_header(slot: &CoreSlot, ctx: &mut Context<'_>) {
    let Some(core) = slot.get().and_then(|w| w.upgrade()) else {
        return;
    };
    let methods = core.router.path_methods(&ctx.request.path);
    headers::set(ctx.headers_mut(), ALLOW, &methods);
    if methods.contains("PATCH") {
        if let Some(encoding) = ctx.get_str("content.encoding").map(String::from) {
            headers::set(
                ctx.headers_mut(),
                HeaderName::from_static("accept-patch"),
                &encoding,
            );
        }
    }
}
