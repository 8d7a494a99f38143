// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reverse-DNS names for IP addresses.

use hickory_proto::rr::Name;
use std::net::{AddrParseError, IpAddr};

/// Canonical reverse-DNS name of an address, without the trailing root dot.
///
/// IPv4 addresses map into `in-addr.arpa`, IPv6 addresses into `ip6.arpa` using
/// the full nibble form.
///
/// ```rust
/// use pdns_sync::reverse::reverse_pointer;
///
/// let name = reverse_pointer("10.0.0.1".parse().unwrap());
/// assert_eq!(name, "1.0.0.10.in-addr.arpa");
/// ```
#[must_use]
pub fn reverse_pointer(addr: IpAddr) -> String {
    let name = Name::from(addr).to_string();
    name.trim_end_matches('.').to_string()
}

/// Reverse-DNS name of an address given as text.
///
/// # Errors
///
/// Returns the parse error if `value` is not an IPv4 or IPv6 address.
pub fn reverse_pointer_str(value: &str) -> Result<String, AddrParseError> {
    value.trim().parse::<IpAddr>().map(reverse_pointer)
}
