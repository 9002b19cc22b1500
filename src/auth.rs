use crate::config::BasicAuthConfig;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub const REALM_CHALLENGE: &str = "Basic realm=\"Protected\"";

/// Pull `(user, pass)` out of an `Authorization: Basic ...` header.
///
/// The password may itself contain ':'; only the first one separates.
pub fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Middleware: every request must carry the configured credentials.
pub async fn require_basic_auth(
    State(expected): State<BasicAuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    match credentials(request.headers()) {
        Some((user, pass)) if user == expected.user && pass == expected.pass => {
            next.run(request).await
        }
        Some((user, _)) => {
            log::warn!("Rejected basic auth for user '{}'", user);
            unauthorized()
        }
        None => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, REALM_CHALLENGE)],
        "Authentication required",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn decodes_basic_credentials() {
        let encoded = STANDARD.encode("admin:s3cret");
        assert_eq!(
            credentials(&headers_with(&format!("Basic {}", encoded))),
            Some(("admin".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn password_keeps_extra_colons() {
        let encoded = STANDARD.encode("admin:a:b:c");
        assert_eq!(
            credentials(&headers_with(&format!("basic {}", encoded))),
            Some(("admin".to_string(), "a:b:c".to_string()))
        );
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert_eq!(credentials(&HeaderMap::new()), None);
        assert_eq!(credentials(&headers_with("Bearer abc")), None);
        assert_eq!(credentials(&headers_with("Basic !!!")), None);
        let no_colon = STANDARD.encode("admin");
        assert_eq!(credentials(&headers_with(&format!("Basic {}", no_colon))), None);
    }
}
