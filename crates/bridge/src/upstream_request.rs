use std::net::SocketAddr;

use http::{
    HeaderMap, HeaderName, HeaderValue, Request, Uri, Version,
    header::{CONNECTION, HOST, TE},
    uri::{Authority, PathAndQuery, Scheme},
};

#[derive(Debug)]
pub enum BridgeError {
    InvalidUri,
    UnsupportedScheme(String),
    MissingAuthority,
    InvalidHeader,
    Build(http::Error),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::InvalidUri => write!(f, "invalid uri"),
            BridgeError::UnsupportedScheme(scheme) => {
                write!(f, "unsupported scheme: {scheme} (expected http or https)")
            }
            BridgeError::MissingAuthority => write!(f, "uri has no host"),
            BridgeError::InvalidHeader => write!(f, "invalid header"),
            BridgeError::Build(e) => write!(f, "request build error: {e}"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Address of the peer that sent the inbound request, stored in the request
/// extensions by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Parsed upstream base URL: `http[s]://host[:port][/base][?query]`.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    scheme: Scheme,
    authority: Authority,
    path: String,
    query: Option<String>,
}

impl UpstreamTarget {
    pub fn parse(address: &str) -> Result<Self, BridgeError> {
        let uri = Uri::try_from(address).map_err(|_| BridgeError::InvalidUri)?;

        // schemes are case-insensitive; store the canonical form the
        // connector matches on
        let scheme = match uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("http") => Scheme::HTTP,
            Some(s) if s.eq_ignore_ascii_case("https") => Scheme::HTTPS,
            Some(s) => return Err(BridgeError::UnsupportedScheme(s.to_string())),
            None => return Err(BridgeError::InvalidUri),
        };

        let authority = uri
            .authority()
            .cloned()
            .ok_or(BridgeError::MissingAuthority)?;
        if authority.host().is_empty() {
            return Err(BridgeError::MissingAuthority);
        }

        Ok(Self {
            scheme,
            authority,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
        })
    }

    pub fn authority(&self) -> &str {
        self.authority.as_str()
    }

    fn join_path_and_query(&self, uri: &Uri) -> Result<PathAndQuery, BridgeError> {
        let mut joined = join_paths(&self.path, uri.path());

        let query = match (self.query.as_deref(), uri.query()) {
            (Some(base), Some(req)) if !base.is_empty() && !req.is_empty() => {
                Some(format!("{base}&{req}"))
            }
            (Some(base), _) if !base.is_empty() => Some(base.to_string()),
            (_, Some(req)) if !req.is_empty() => Some(req.to_string()),
            _ => None,
        };
        if let Some(query) = query {
            joined.push('?');
            joined.push_str(&query);
        }

        PathAndQuery::try_from(joined).map_err(|_| BridgeError::InvalidUri)
    }
}

/// Joins two paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Strips hop-by-hop headers, including any named by `Connection`.
pub fn remove_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }

    for name in HOP_HEADERS {
        headers.remove(*name);
    }
}

/// True when any `TE` value lists the `trailers` token.
fn accepts_trailers(headers: &HeaderMap) -> bool {
    headers
        .get_all(TE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("trailers"))
}

fn append_forwarded_for(headers: &mut HeaderMap, client: SocketAddr) -> Result<(), BridgeError> {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    let client_ip = client.ip().to_string();
    let value = if prior.is_empty() {
        client_ip
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };

    let value = HeaderValue::try_from(value).map_err(|_| BridgeError::InvalidHeader)?;
    headers.insert(X_FORWARDED_FOR, value);
    Ok(())
}

/// Rewrites an inbound request so it targets `target`.
///
/// Method, body and end-to-end headers are kept. The URI gets the upstream
/// scheme and authority with the base path prepended, `Host` is replaced and
/// the client address is appended to `X-Forwarded-For`. `TE: trailers` is the
/// one hop-by-hop value passed on.
pub fn rewrite_request<B>(
    target: &UpstreamTarget,
    req: Request<B>,
) -> Result<Request<B>, BridgeError> {
    let (mut parts, body) = req.into_parts();

    let path_and_query = target.join_path_and_query(&parts.uri)?;
    parts.uri = Uri::builder()
        .scheme(target.scheme.clone())
        .authority(target.authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(BridgeError::Build)?;

    // upstreams are spoken to over HTTP/1.1 whatever the client used
    parts.version = Version::HTTP_11;

    let trailers = accepts_trailers(&parts.headers);
    remove_hop_headers(&mut parts.headers);
    if trailers {
        parts.headers.insert(TE, HeaderValue::from_static("trailers"));
    }

    let host = HeaderValue::from_str(target.authority()).map_err(|_| BridgeError::InvalidHeader)?;
    parts.headers.insert(HOST, host);

    if let Some(ClientAddr(client)) = parts.extensions.get::<ClientAddr>().copied() {
        append_forwarded_for(&mut parts.headers, client)?;
    }

    Ok(Request::from_parts(parts, body))
}
