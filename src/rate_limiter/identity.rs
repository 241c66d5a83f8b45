//! Client identity derivation from proxy headers.
//!
//! ```text
//!     x-forwarded-for: "203.0.113.5, 10.0.0.2"  ──► "203.0.113.5"
//!     x-real-ip: "198.51.100.4"                  ──► "198.51.100.4"
//!     (neither)                                  ──► "unknown"
//! ```
//!
//! Every request without distinguishing network identity lands in the shared
//! `"unknown"` bucket and is throttled together.

use std::collections::{BTreeMap, HashMap};

/// Header carrying the client chain appended by reverse proxies.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Header carrying the client address set by the edge proxy.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Identity used when no header identifies the client.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Read access to request headers, matched case-insensitively.
pub trait HeaderSource {
    /// Returns the value of the first header named `name`.
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str).or_else(|| {
            self.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }
}

impl HeaderSource for BTreeMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str).or_else(|| {
            self.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }
}

impl HeaderSource for [(&str, &str)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

impl<const N: usize> HeaderSource for [(&str, &str); N] {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

/// Derives the rate-limit identity of a request.
///
/// Uses the first entry of `x-forwarded-for`, then `x-real-ip`, then
/// `"unknown"`. Blank values are skipped.
///
/// # Example
///
/// ```rust
/// use newsdesk::derive_client_identity;
///
/// let headers = [("X-Forwarded-For", " 203.0.113.5 , 10.0.0.2")];
/// assert_eq!(derive_client_identity(&headers), "203.0.113.5");
///
/// let none: [(&str, &str); 0] = [];
/// assert_eq!(derive_client_identity(&none), "unknown");
/// ```
pub fn derive_client_identity<H>(headers: &H) -> String
where
    H: HeaderSource + ?Sized,
{
    let forwarded = headers
        .header(FORWARDED_FOR_HEADER)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let real_ip = || {
        headers
            .header(REAL_IP_HEADER)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_IDENTITY)
        .to_string()
}
