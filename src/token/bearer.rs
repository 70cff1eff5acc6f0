//! Bearer credential extraction from an `Authorization` header value.

/// Extract the token from `Bearer <token>`.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// ignored. Returns `None` for any other scheme or an empty token.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
