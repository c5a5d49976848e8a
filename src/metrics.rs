//! Metrics emitted through the `metrics` facade
//!
//! Nothing here installs a recorder; the host process decides where the
//! numbers go. Without a recorder every call is a no-op.

/// Metric names and label keys
pub mod labels {
    /// Acquisition attempts started
    pub const ATTEMPTS: &str = "intake_connect_attempts_total";
    /// Failed attempts, labelled by stage
    pub const FAILURES: &str = "intake_connect_failures_total";
    /// Successful acquisitions
    pub const ESTABLISHED: &str = "intake_connect_established_total";
    /// Connections closed by the peer and detected by the watcher
    pub const PEER_CLOSED: &str = "intake_connect_peer_closed_total";
    /// Watcher read errors
    pub const WATCHER_ERRORS: &str = "intake_connect_watcher_errors_total";

    /// Label key for the failing stage
    pub const STAGE: &str = "stage";
    /// Label key for the transport kind
    pub const TRANSPORT: &str = "transport";
    /// Plain TCP transport
    pub const TRANSPORT_TCP: &str = "tcp";
    /// TLS transport
    pub const TRANSPORT_TLS: &str = "tls";
}

/// Counter helpers
pub mod counters {
    use super::labels;

    /// Record the start of an acquisition attempt
    pub fn attempt_started() {
        metrics::counter!(labels::ATTEMPTS).increment(1);
    }

    /// Record a failed attempt at `stage` (proxy, dial, tls, ...)
    pub fn attempt_failed(stage: &'static str) {
        metrics::counter!(labels::FAILURES, labels::STAGE => stage).increment(1);
    }

    /// Record a successful acquisition
    pub fn established(tls: bool) {
        let transport = if tls {
            labels::TRANSPORT_TLS
        } else {
            labels::TRANSPORT_TCP
        };
        metrics::counter!(labels::ESTABLISHED, labels::TRANSPORT => transport).increment(1);
    }

    /// Record a peer-initiated close
    pub fn peer_closed() {
        metrics::counter!(labels::PEER_CLOSED).increment(1);
    }

    /// Record a watcher read error
    pub fn watcher_error() {
        metrics::counter!(labels::WATCHER_ERRORS).increment(1);
    }
}
