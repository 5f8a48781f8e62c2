//! Pure URL and header transformations applied to every proxied exchange.
//!
//! Inbound requests lose their `/api` prefix before reaching the backend;
//! `Location` headers on 307 redirects get the prefix re-added so the
//! client's next request routes back through the same stripping rule. The
//! two transformations are inverses of each other for the redirect case.

use crate::config::BackendEndpoint;
use hyper::header::{HeaderValue, LOCATION};
use hyper::{Response, StatusCode, Uri};
use tracing::debug;

/// Public path prefix stripped from inbound requests.
const API_PREFIX: &str = "/api";

/// Strip a leading `/api` from the path. A double leading slash produced by
/// the strip collapses to a single one; stripping the whole path yields `/`.
/// Paths without the prefix pass through unchanged.
pub fn rewrite_path(path: &str) -> String {
    let stripped = path.strip_prefix(API_PREFIX).unwrap_or(path);
    let collapsed = if stripped.starts_with("//") {
        &stripped[1..]
    } else {
        stripped
    };
    if collapsed.is_empty() {
        "/".to_string()
    } else {
        collapsed.to_string()
    }
}

/// Build the backend-facing URI for an inbound request: scheme `http`,
/// authority from the resolved endpoint, path rewritten, query preserved.
pub fn backend_uri(endpoint: &BackendEndpoint, uri: &Uri) -> Result<Uri, hyper::http::Error> {
    let path = rewrite_path(uri.path());
    let target = match uri.query() {
        Some(query) => format!("http://{}{}?{}", endpoint.authority(), path, query),
        None => format!("http://{}{}", endpoint.authority(), path),
    };
    target.parse::<Uri>().map_err(hyper::http::Error::from)
}

/// Re-add the `/api` prefix to the `Location` header of a 307 redirect so
/// the client's follow-up request is routed back through the prefix strip.
///
/// Non-307 responses pass through unmodified. A missing or unresolvable
/// `Location` leaves the response untouched; a response is never failed over
/// a malformed header.
pub fn rewrite_redirect<B>(response: &mut Response<B>) {
    if response.status() != StatusCode::TEMPORARY_REDIRECT {
        return;
    }

    let Some(location) = response.headers().get(LOCATION) else {
        return;
    };
    let raw = match location.to_str() {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "Redirect Location is not valid UTF-8, leaving unmodified");
            return;
        }
    };
    let Some(path) = absolute_path(raw) else {
        debug!(location = raw, "Could not resolve redirect Location, leaving unmodified");
        return;
    };

    if path.starts_with("/api/") {
        return;
    }

    let prefixed = format!("{}{}", API_PREFIX, path);
    match HeaderValue::from_str(&prefixed) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
        }
        Err(e) => {
            debug!(location = %prefixed, error = %e, "Rewritten Location not a valid header value");
        }
    }
}

/// Resolve a `Location` value to its absolute-path form. Absolute URLs keep
/// only their path; relative references without a leading slash cannot be
/// resolved here and yield `None`.
fn absolute_path(raw: &str) -> Option<String> {
    if raw.starts_with('/') {
        let path = raw.split('?').next().unwrap_or(raw);
        return Some(path.to_string());
    }

    let uri: Uri = raw.parse().ok()?;
    if uri.scheme().is_some() {
        Some(uri.path().to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Empty;
    use hyper::body::Bytes;

    fn redirect_to(status: StatusCode, location: &str) -> Response<Empty<Bytes>> {
        Response::builder()
            .status(status)
            .header(LOCATION, location)
            .body(Empty::new())
            .expect("valid response")
    }

    #[test]
    fn test_non_api_paths_unchanged() {
        for path in ["/", "/health", "/ws/updates", "/apples", "/v1/api/x"] {
            assert_eq!(rewrite_path(path), path);
        }
    }

    #[test]
    fn test_api_prefix_stripped() {
        assert_eq!(rewrite_path("/api/users"), "/users");
        assert_eq!(rewrite_path("/api/a/b/c"), "/a/b/c");
    }

    #[test]
    fn test_bare_api_becomes_root() {
        assert_eq!(rewrite_path("/api"), "/");
    }

    #[test]
    fn test_no_double_leading_slash() {
        assert_eq!(rewrite_path("/api//users"), "/users");
        for path in ["/api", "/api/", "/api//x", "/api/x"] {
            assert!(!rewrite_path(path).starts_with("//"), "path {path}");
        }
    }

    #[test]
    fn test_backend_uri_rewrites_host_and_path() {
        let endpoint = BackendEndpoint::parse("127.0.0.1:8506");
        let uri: Uri = "/api/users?page=2".parse().unwrap();
        let rewritten = backend_uri(&endpoint, &uri).unwrap();
        assert_eq!(rewritten.to_string(), "http://127.0.0.1:8506/users?page=2");
    }

    #[test]
    fn test_backend_uri_keeps_non_api_path() {
        let endpoint = BackendEndpoint::parse("127.0.0.1:8506");
        let uri: Uri = "/static/app.js".parse().unwrap();
        let rewritten = backend_uri(&endpoint, &uri).unwrap();
        assert_eq!(rewritten.to_string(), "http://127.0.0.1:8506/static/app.js");
    }

    #[test]
    fn test_redirect_gains_api_prefix() {
        let mut resp = redirect_to(StatusCode::TEMPORARY_REDIRECT, "/login");
        rewrite_redirect(&mut resp);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), "/api/login");
    }

    #[test]
    fn test_redirect_round_trip_restores_original() {
        // /api/x stripped to /x, redirected by the backend to /x, must come
        // back as exactly /api/x
        let public = "/api/x";
        let stripped = rewrite_path(public);
        assert_eq!(stripped, "/x");

        let mut resp = redirect_to(StatusCode::TEMPORARY_REDIRECT, &stripped);
        rewrite_redirect(&mut resp);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), public);
    }

    #[test]
    fn test_redirect_already_prefixed_untouched() {
        let mut resp = redirect_to(StatusCode::TEMPORARY_REDIRECT, "/api/login");
        rewrite_redirect(&mut resp);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), "/api/login");
    }

    #[test]
    fn test_non_307_untouched() {
        for status in [
            StatusCode::OK,
            StatusCode::MOVED_PERMANENTLY,
            StatusCode::FOUND,
            StatusCode::SEE_OTHER,
            StatusCode::PERMANENT_REDIRECT,
        ] {
            let mut resp = redirect_to(status, "/login");
            rewrite_redirect(&mut resp);
            assert_eq!(resp.headers().get(LOCATION).unwrap(), "/login", "status {status}");
        }
    }

    #[test]
    fn test_missing_location_left_alone() {
        let mut resp = Response::builder()
            .status(StatusCode::TEMPORARY_REDIRECT)
            .body(Empty::<Bytes>::new())
            .unwrap();
        rewrite_redirect(&mut resp);
        assert!(resp.headers().get(LOCATION).is_none());
    }

    #[test]
    fn test_absolute_url_location_reduced_to_path() {
        let mut resp = redirect_to(
            StatusCode::TEMPORARY_REDIRECT,
            "http://127.0.0.1:8506/login",
        );
        rewrite_redirect(&mut resp);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), "/api/login");
    }

    #[test]
    fn test_unresolvable_relative_location_left_alone() {
        let mut resp = redirect_to(StatusCode::TEMPORARY_REDIRECT, "login");
        rewrite_redirect(&mut resp);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), "login");
    }
}
