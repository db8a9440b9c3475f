//! Host port allocation for networked sandboxes.
//!
//! The bind probe is the authority on whether a port is free. A port can
//! still be taken by another process between the probe and the container
//! actually publishing it; that race is not retried here.

use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use tracing::debug;

/// Returned when no port in the range is available.
pub const NO_PORT: u16 = 0;

/// Find the lowest port in `[start, end]` that is not in `used` and can be
/// bound right now. Returns [`NO_PORT`] for an empty or exhausted range.
pub fn find_free_port(start: u16, end: u16, used: &HashSet<String>) -> u16 {
    if start > end {
        return NO_PORT;
    }

    for port in start..=end {
        if used.contains(&port.to_string()) {
            continue;
        }
        // The listener is dropped at the end of the statement, releasing the port.
        if TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok() {
            debug!(port, "Found free host port");
            return port;
        }
    }

    NO_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn used(ports: &[u16]) -> HashSet<String> {
        ports.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_returns_port_in_range() {
        let port = find_free_port(49500, 49510, &HashSet::new());
        assert!((49500..=49510).contains(&port), "got {port}");
        assert!(TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok());
    }

    #[test]
    fn test_skips_used_ports() {
        let port = find_free_port(49520, 49530, &used(&[49520, 49521, 49522]));
        assert!((49523..=49530).contains(&port), "got {port}");
    }

    #[test]
    fn test_all_used_returns_zero() {
        // Hold real listeners so the result does not depend on the exclusion set alone.
        let listeners: Vec<_> = (49550..=49552)
            .filter_map(|p| TcpListener::bind((Ipv4Addr::UNSPECIFIED, p)).ok())
            .collect();
        let port = find_free_port(49550, 49552, &used(&[49550, 49551, 49552]));
        assert_eq!(port, NO_PORT);
        drop(listeners);
    }

    #[test]
    fn test_bound_but_unlisted_port_is_skipped() {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let held = listener.local_addr().unwrap().port();
        assert_eq!(find_free_port(held, held, &HashSet::new()), NO_PORT);
    }

    #[test]
    fn test_empty_range() {
        assert_eq!(find_free_port(49510, 49500, &HashSet::new()), NO_PORT);
    }

    #[test]
    fn test_single_port() {
        assert_eq!(find_free_port(49560, 49560, &HashSet::new()), 49560);
    }
}
