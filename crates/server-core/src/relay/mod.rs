//! Session relay: outbound connection, trust pinning, and byte bridging.

mod connection;
mod handler;

pub(crate) use connection::{RelayHandle, start_bridge};

/// Terminal message when the inbound (local) channel closed the relay.
pub(crate) const LOCAL_CLOSED_MSG: &str = "lch closed the connection";
/// Terminal message when the outbound (remote) channel closed the relay.
pub(crate) const REMOTE_CLOSED_MSG: &str = "rch closed the connection";

/// Normalize the relay loop's terminal message for the audit record.
///
/// Exactly the two canonical benign-EOF messages above count as a normal
/// teardown and are suppressed to empty; anything else is a real error and
/// recorded verbatim. Changing this set changes audit-log fidelity.
pub(crate) fn normalize_close_err(err: &str) -> &str {
    match err {
        LOCAL_CLOSED_MSG | REMOTE_CLOSED_MSG => "",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_closures_are_suppressed() {
        assert_eq!(normalize_close_err(LOCAL_CLOSED_MSG), "");
        assert_eq!(normalize_close_err(REMOTE_CLOSED_MSG), "");
    }

    #[test]
    fn real_errors_pass_through() {
        assert_eq!(normalize_close_err("ssh: host key mismatch"), "ssh: host key mismatch");
        assert_eq!(normalize_close_err("connection reset by peer"), "connection reset by peer");
        // Near misses are not benign.
        assert_eq!(normalize_close_err("lch closed the connection "), "lch closed the connection ");
    }
}
