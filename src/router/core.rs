use std::collections::{BTreeMap, HashMap};

use http::Method;
use regex::Regex;
use tracing::debug;

use super::pse::segment_exp;
use crate::context::{Handler, PathValues};
use crate::error::StatusError;

/// A node of the route trie.
///
/// `handler`, if set, points to the resource handler served by the route
/// terminating here. `num_exp` is non-zero when the node has regexp-bearing
/// links that must be tried against incoming segments. `depth` is the path
/// depth of the segment, where the HTTP verb sits at depth 1.
#[derive(Default)]
struct TrieNode {
    handler: Option<Handler>,
    num_exp: usize,
    depth: usize,
    // ordered so overlapping expressions match deterministically
    links: BTreeMap<String, TrieNode>,
}

impl TrieNode {
    fn at_depth(depth: usize) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }
}

/// The routing engine: a trie keyed by path segments, where segments holding
/// path segment expressions are matched via pre-compiled regexps.
///
/// Registration happens before serving begins; the trie and its regexp cache
/// are read-only afterwards. A route is identified by its method and
/// canonical path template: adding the same pair again replaces the handler
/// silently.
pub struct Router {
    root: TrieNode,
    methods: Vec<String>,
    exps: HashMap<String, Regex>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            root: TrieNode::default(),
            methods: Vec::new(),
            exps: HashMap::new(),
        }
    }

    /// Insert a route. The path is split into segments after prepending the
    /// uppercased method and trimming any trailing slash; segments holding
    /// `{}`-expressions or `*` are compiled and cached.
    ///
    /// # Panics
    ///
    /// Panics when a segment expression fails to compile, see
    /// [`crate::router`] module docs.
    pub fn add_route(&mut self, method: &str, path: &str, handler: Handler) {
        let method = method.to_uppercase();
        let full = format!("{}{}", method, path.trim_end_matches('/'));

        let mut node = &mut self.root;
        for seg in full.split('/') {
            if (seg.contains('{') && seg.contains('}')) || seg.contains('*') {
                if !self.exps.contains_key(seg) {
                    self.exps.insert(seg.to_string(), segment_exp(seg));
                }
                node.num_exp += 1;
            }
            let depth = node.depth + 1;
            node = node
                .links
                .entry(seg.to_string())
                .or_insert_with(|| TrieNode::at_depth(depth));
        }

        if node.handler.is_some() {
            debug!(%method, path, "route replaced");
        } else {
            debug!(%method, path, "route added");
        }
        node.handler = Some(handler);

        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
    }

    /// Resolve a method and path to a registered handler, recording matched
    /// path values into `values`.
    ///
    /// `HEAD` requests match `GET` routes. A path whose first segment (the
    /// method) finds no link yields a method-not-allowed error; bottoming out
    /// deeper yields not-found.
    pub fn find_handler(
        &self,
        method: &Method,
        path: &str,
        values: &mut PathValues,
    ) -> Result<Handler, StatusError> {
        let mut m = method.as_str();
        if m == "HEAD" {
            m = "GET";
        }
        let full = format!("{}{}", m, path.trim_end_matches('/'));
        let segs: Vec<&str> = full.split('/').collect();
        let slen = segs.len();

        let mut node = Some(&self.root);
        let mut values = Some(values);
        for (i, seg) in segs.iter().enumerate() {
            let Some(current) = node else {
                if i <= 1 {
                    return Err(StatusError::route_bad_method());
                }
                return Err(StatusError::route_not_found());
            };
            node = self.match_segment(current, seg, slen, values.as_deref_mut());
        }

        match node.and_then(|n| n.handler.as_ref()) {
            Some(handler) => Ok(handler.clone()),
            None => Err(StatusError::route_not_found()),
        }
    }

    /// A comma-separated list of HTTP methods that match the path, suitable
    /// for an `Allow` header. `HEAD` is always included. Note that this only
    /// lists the methods, not whether they are allowed.
    pub fn path_methods(&self, path: &str) -> String {
        let mut methods = String::from("HEAD");
        let trimmed = path.trim_end_matches('/');
        for method in &self.methods {
            let full = format!("{method}{trimmed}");
            let segs: Vec<&str> = full.split('/').collect();
            let slen = segs.len();

            let mut node = Some(&self.root);
            for seg in &segs {
                let Some(current) = node else { break };
                node = self.match_segment(current, seg, slen, None);
            }
            if node.is_some_and(|n| n.handler.is_some()) {
                methods.push_str(", ");
                methods.push_str(method);
            }
        }
        methods
    }

    /// Try to match one path segment against a node's links. Regexp links are
    /// tried first when present, falling back to the literal map.
    fn match_segment<'n>(
        &self,
        node: &'n TrieNode,
        seg: &str,
        seg_count: usize,
        mut values: Option<&mut PathValues>,
    ) -> Option<&'n TrieNode> {
        if node.num_exp == 0 {
            return node.links.get(seg);
        }
        for (pexp, child) in &node.links {
            let Some(rx) = self.exps.get(pexp) else {
                continue;
            };
            // prevents the matching from being side-tracked by shallower routes
            if seg_count > child.depth && child.links.is_empty() {
                continue;
            }
            let Some(caps) = rx.captures(seg) else {
                continue;
            };
            // the expression must consume the whole segment
            if caps.len() < 2 || &caps[0] != seg {
                continue;
            }
            if let Some(values) = values.as_deref_mut() {
                let names: Vec<Option<&str>> = rx.capture_names().collect();
                for i in 1..caps.len() {
                    let text = caps.get(i).map_or("", |m| m.as_str());
                    values.record(names[i], text);
                }
            }
            return Some(child);
        }
        node.links.get(seg)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
