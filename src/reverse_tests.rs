// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for reverse-DNS names.

#[cfg(test)]
mod tests {
    use crate::reverse::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_ipv4_reverse_name() {
        let addr = IpAddr::V4(Ipv4Addr::new(192, 168, 10, 25));
        assert_eq!(reverse_pointer(addr), "25.10.168.192.in-addr.arpa");
    }

    #[test]
    fn test_ipv6_reverse_name_uses_full_nibbles() {
        let name = reverse_pointer_str("2a00:1f78:fffd:4013::0001").unwrap();
        assert_eq!(
            name,
            "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.3.1.0.4.d.f.f.f.8.7.f.1.0.0.a.2.ip6.arpa"
        );
    }

    #[test]
    fn test_equivalent_ipv6_spellings_share_a_name() {
        assert_eq!(
            reverse_pointer_str("2001:db8::1").unwrap(),
            reverse_pointer_str("2001:0db8:0000:0000:0000:0000:0000:0001").unwrap()
        );
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(
            reverse_pointer_str(" 10.0.0.1 ").unwrap(),
            "1.0.0.10.in-addr.arpa"
        );
    }

    #[test]
    fn test_invalid_address_rejected() {
        assert!(reverse_pointer_str("mail.example.com").is_err());
        assert!(reverse_pointer_str("10.0.0.256").is_err());
    }
}
