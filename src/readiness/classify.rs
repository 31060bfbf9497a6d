//! Transient error classification
//!
//! A readiness probe that fails because the service is not listening yet, or
//! because the peer dropped the connection, should be retried. Everything
//! else aborts the wait.

use reqwest::StatusCode;
use std::error::Error;
use std::io;

/// IO error kinds of a refused, reset or broken connection
const TRANSIENT_IO_KINDS: [io::ErrorKind; 4] = [
    io::ErrorKind::ConnectionRefused,
    io::ErrorKind::ConnectionReset,
    io::ErrorKind::ConnectionAborted,
    io::ErrorKind::BrokenPipe,
];

/// Message fragments of an abrupt peer disconnect
const DISCONNECT_MARKERS: [&str; 3] = [
    "socket hang up",
    "connection closed before message completed",
    "other side closed",
];

/// Whether a probe failure is worth retrying.
///
/// The error itself and its immediate source are inspected, so a transport
/// error wrapped once by the caller still classifies correctly.
pub fn is_transient(err: &(dyn Error + 'static)) -> bool {
    is_transient_level(err) || err.source().is_some_and(is_transient_level)
}

fn is_transient_level(err: &(dyn Error + 'static)) -> bool {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return TRANSIENT_IO_KINDS.contains(&io_err.kind()) || has_disconnect_marker(err);
    }

    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        if http.status() == Some(StatusCode::BAD_GATEWAY) {
            return true;
        }

        // reqwest keeps the socket error a few layers down its own chain
        return std::iter::successors(http.source(), |&e| e.source()).any(|cause| {
            cause
                .downcast_ref::<io::Error>()
                .is_some_and(|io_err| TRANSIENT_IO_KINDS.contains(&io_err.kind()))
                || has_disconnect_marker(cause)
        });
    }

    has_disconnect_marker(err)
}

fn has_disconnect_marker(err: &dyn Error) -> bool {
    let message = err.to_string().to_lowercase();
    DISCONNECT_MARKERS.iter().any(|marker| message.contains(marker))
}
