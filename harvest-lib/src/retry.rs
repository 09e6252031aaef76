//! Deciding whether a failed query is worth sending again.

use std::{error::Error, io};

use http::StatusCode;

/// Classifies failures into those a later attempt may fix and those it won't
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    fn should_retry(&self) -> bool {
        self.is_server_error()
            || matches!(
                *self,
                StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
            )
    }
}

impl RetryExt for reqwest::Error {
    fn should_retry(&self) -> bool {
        // Unreachable or restarting endpoints count as transient
        if self.is_timeout() || self.is_connect() {
            return true;
        }
        if self.is_decode() || self.is_builder() || self.is_redirect() {
            return false;
        }
        if let Some(status) = self.status() {
            return status.should_retry();
        }
        if self.is_body() || self.is_request() {
            return sources(self).any(|source| {
                // A connection cut while the body was streaming
                if let Some(hyper_error) = source.downcast_ref::<hyper::Error>() {
                    return hyper_error.is_incomplete_message() || hyper_error.is_canceled();
                }
                source
                    .downcast_ref::<io::Error>()
                    .is_some_and(is_transient_io)
            });
        }
        false
    }
}

/// Socket errors that go away when the query is repeated
fn is_transient_io(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
    )
}

/// The causes of `error`, nearest first, excluding `error` itself
fn sources<'a>(error: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(error.source(), |&e| e.source())
}
