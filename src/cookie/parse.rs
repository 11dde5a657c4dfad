//! `Set-Cookie` header parsing.
//!
//! HTTP stacks expose multi-value `Set-Cookie` either as repeated headers or
//! folded into one comma-joined value. Both shapes go through
//! [`split_set_cookie`] before each piece is parsed by [`parse_set_cookie`].

use super::{Cookie, CookieError};

/// Split a possibly comma-joined `Set-Cookie` value into individual cookies.
///
/// A comma only separates two cookies when the text after it starts a new
/// `name=` pair, so attribute values such as
/// `Expires=Wed, 21 Oct 2015 07:28:00 GMT` stay intact.
pub fn split_set_cookie(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;

    for (idx, ch) in header.char_indices() {
        if ch == ',' && starts_cookie_pair(&header[idx + 1..]) {
            parts.push(header[start..idx].trim());
            start = idx + 1;
        }
    }
    parts.push(header[start..].trim());

    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// True when `rest` begins (after whitespace) with `token=` and the token
/// contains no separator characters.
fn starts_cookie_pair(rest: &str) -> bool {
    let rest = rest.trim_start();
    match rest.find(['=', ';', ',']) {
        Some(pos) if rest.as_bytes()[pos] == b'=' => {
            let token = &rest[..pos];
            !token.is_empty() && !token.contains(char::is_whitespace)
        }
        _ => false,
    }
}

/// Parse a single `Set-Cookie` value into a [`Cookie`].
///
/// Only the leading `name=value` pair is required; attributes are recorded
/// when recognised and otherwise ignored.
pub fn parse_set_cookie(raw: &str) -> Result<Cookie, CookieError> {
    let mut segments = raw.split(';');
    let pair = segments.next().unwrap_or_default().trim();

    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| CookieError::Malformed(raw.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CookieError::Malformed(raw.to_string()));
    }

    let mut cookie = Cookie::new(name, value.trim());

    for attr in segments {
        let attr = attr.trim();
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attr, None),
        };

        match (key.to_ascii_lowercase().as_str(), val) {
            ("path", Some(v)) => cookie.path = Some(v.to_string()),
            ("domain", Some(v)) => cookie.domain = Some(v.to_string()),
            ("expires", Some(v)) => cookie.expires = Some(v.to_string()),
            ("max-age", Some(v)) => cookie.max_age = v.parse().ok(),
            ("samesite", Some(v)) => cookie.same_site = Some(v.to_string()),
            ("secure", _) => cookie.secure = true,
            ("httponly", _) => cookie.http_only = true,
            _ => {}
        }
    }

    Ok(cookie)
}
