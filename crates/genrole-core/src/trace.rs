//! Trace line matching
//!
//! `kubectl -v6` logs one line per finished HTTP round trip, e.g.
//!
//! ```text
//! I1016 10:12:01.123456   4711 round_trippers.go:553] GET https://api.crc.testing:6443/api/v1/namespaces/default/pods?limit=500 200 OK in 12 milliseconds
//! ```
//!
//! Only lines of that shape with a 2xx status are picked up. Everything else
//! in the stream (errors, connection chatter, the client's own messages) is
//! ignored.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// HTTP methods that show up in request traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    Get,
    Delete,
    Post,
    Patch,
    Put,
}

impl HttpVerb {
    /// Parse the upper-case method token used in trace lines
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Self::Get),
            "DELETE" => Some(Self::Delete),
            "POST" => Some(Self::Post),
            "PATCH" => Some(Self::Patch),
            "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Lower-case form, which doubles as the RBAC verb for non-GET requests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Delete => "delete",
            Self::Post => "post",
            Self::Patch => "patch",
            Self::Put => "put",
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful request pulled out of the trace stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedRequest {
    pub verb: HttpVerb,
    /// Request path after `host:port/`, query string included
    pub path: String,
}

fn request_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(GET|DELETE|POST|PATCH|PUT) https?://[^\s/]+:[0-9]+/(\S*) 2.. OK")
            .expect("request trace pattern is valid")
    })
}

/// Match a single trace line.
///
/// Returns `None` for anything that is not a completed 2xx request.
pub fn match_line(line: &str) -> Option<TracedRequest> {
    let caps = request_pattern().captures(line)?;
    let verb = HttpVerb::parse(caps.get(1)?.as_str())?;
    let path = caps.get(2)?.as_str().to_string();
    Some(TracedRequest { verb, path })
}
