//! Printf-style log formatting over a [`Context`], based on Apache HTTP's
//! `CustomLog` directive. Each verb renders one request quantity:
//!
//! ```text
//! %%   Percent sign
//! %a   Client remote address          %#a  Proxied client address
//! %b   Body bytes, or '-' if zero     %B   Body bytes, numeric
//! %h   Remote host                    %l   Literal '-'
//! %m   Request method                 %q   Query string
//! %r   Request line                   %#r  Request line without protocol
//! %s   Status code                    %#s  Status code and text
//! %t   Request time                   %u   Authenticated user, or '-'
//! %v   Request host name              %A   User agent
//! %D   Seconds lapsed serving         %H   Request protocol
//! %I   Bytes received                 %L   Request ID
//! %P   Server port, default '80'      %R   Referer
//! %U   Request path
//! ```
//!
//! An optional precision (`%.8L`) truncates the rendered value; a width with
//! `-` pads. `%D` consumes the precision as decimal places instead.

use chrono::{DateTime, Local};

use super::core::Context;
use crate::response::ResponseWriter;
use crate::util;

impl Context<'_> {
    /// Render `spec`, substituting each format verb with its value from this
    /// request. Unknown verbs render as empty.
    pub fn format_log(&self, spec: &str) -> String {
        let mut out = String::with_capacity(spec.len() + 32);
        let mut chars = spec.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }

            let mut sharp = false;
            let mut left = false;
            let mut width: Option<usize> = None;
            let mut precision: Option<usize> = None;

            while let Some(&f) = chars.peek() {
                match f {
                    '#' => sharp = true,
                    '-' => left = true,
                    _ => break,
                }
                chars.next();
            }
            while let Some(&d) = chars.peek() {
                if let Some(n) = d.to_digit(10) {
                    width = Some(width.unwrap_or(0) * 10 + n as usize);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek() == Some(&'.') {
                chars.next();
                precision = Some(0);
                while let Some(&d) = chars.peek() {
                    if let Some(n) = d.to_digit(10) {
                        precision = Some(precision.unwrap_or(0) * 10 + n as usize);
                        chars.next();
                    } else {
                        break;
                    }
                }
            }

            let Some(verb) = chars.next() else { break };
            if verb == '%' {
                out.push('%');
                continue;
            }

            let mut value = self.render_verb(verb, sharp, &mut precision);
            if let Some(p) = precision {
                if value.len() > p {
                    value.truncate(
                        value
                            .char_indices()
                            .nth(p)
                            .map(|(i, _)| i)
                            .unwrap_or(value.len()),
                    );
                }
            }
            if let Some(w) = width {
                while value.chars().count() < w {
                    if left {
                        value.push(' ');
                    } else {
                        value.insert(0, ' ');
                    }
                }
            }
            out.push_str(&value);
        }
        out
    }

    fn render_verb(&self, verb: char, sharp: bool, precision: &mut Option<usize>) -> String {
        match verb {
            'a' => {
                if sharp {
                    self.get_str("proxy_client")
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| util::real_ip(&self.request))
                } else {
                    self.request.remote_addr.clone()
                }
            }
            'b' => {
                if self.bytes() == 0 {
                    "-".to_string()
                } else {
                    self.bytes().to_string()
                }
            }
            'B' => self.bytes().to_string(),
            'h' => util::split_port(&self.request.remote_addr).0.to_string(),
            'l' => "-".to_string(),
            'm' => self.request.method.to_string(),
            'q' => self.request.query.clone(),
            'r' => {
                let mut line = format!("{} {}", self.request.method, self.request.request_uri());
                if !sharp {
                    line.push(' ');
                    line.push_str(&self.request.proto);
                }
                line
            }
            's' => {
                let status = self.status();
                if sharp {
                    format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""))
                } else {
                    status.as_u16().to_string()
                }
            }
            't' => DateTime::<Local>::from(self.start_time())
                .format("[%d/%b/%Y:%H:%M:%S %z]")
                .to_string(),
            'u' => self
                .get_str("auth.user")
                .filter(|u| !u.is_empty())
                .unwrap_or("-")
                .to_string(),
            'v' => self.request.host.clone(),
            'A' => self.request.user_agent().to_string(),
            'D' => {
                // precision here selects decimal places, not truncation
                let secs = self.elapsed().as_secs_f64();
                match precision.take() {
                    Some(p) => format!("{secs:.p$}"),
                    None => format!("{secs}"),
                }
            }
            'H' => self.request.proto.clone(),
            'I' => self.request.content_length().to_string(),
            'L' => self.request_id.to_string(),
            'P' => {
                let (_, port) = util::split_port(&self.request.host);
                if port.is_empty() {
                    "80".to_string()
                } else {
                    port.to_string()
                }
            }
            'R' => self.request.referer().to_string(),
            'U' => self.request.path.clone(),
            _ => String::new(),
        }
    }
}
