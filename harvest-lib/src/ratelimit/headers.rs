//! The `Retry-After` hint sent along with rate-limited responses.

use std::time::{Duration, SystemTime};

use http::{HeaderMap, HeaderValue, header::RETRY_AFTER};
use log::debug;
use thiserror::Error;

/// Hints longer than this are ignored as implausible
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum InvalidRetryAfter {
    #[error("`{0}` is neither a number of seconds nor an HTTP date")]
    Unparsable(String),

    #[error("value is not visible ASCII")]
    NotAscii,

    #[error("a wait of {0:?} exceeds the longest accepted hint")]
    TooLong(Duration),
}

/// The wait requested by a response, if it sent a usable `Retry-After`
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    retry_after(value)
        .inspect_err(|e| debug!("Ignoring Retry-After header: {e}"))
        .ok()
}

/// Either delay-seconds or an HTTP date; a date in the past means no wait
fn retry_after(value: &HeaderValue) -> Result<Duration, InvalidRetryAfter> {
    let text = value.to_str().map_err(|_| InvalidRetryAfter::NotAscii)?;

    let delay = if let Ok(seconds) = text.trim().parse::<u64>() {
        Duration::from_secs(seconds)
    } else {
        let date = httpdate::parse_http_date(text)
            .map_err(|_| InvalidRetryAfter::Unparsable(text.to_owned()))?;
        date.duration_since(SystemTime::now()).unwrap_or_default()
    };

    if delay > MAX_RETRY_AFTER {
        Err(InvalidRetryAfter::TooLong(delay))
    } else {
        Ok(delay)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use http::{HeaderMap, HeaderValue};

    use super::{InvalidRetryAfter, parse_retry_after, retry_after};

    fn header(text: &str) -> HeaderValue {
        HeaderValue::from_str(text).unwrap()
    }

    #[test]
    fn test_delay_seconds() {
        assert_eq!(retry_after(&header("30")), Ok(Duration::from_secs(30)));
        assert_eq!(retry_after(&header(" 0 ")), Ok(Duration::ZERO));
        assert_eq!(
            retry_after(&header("86400")),
            Err(InvalidRetryAfter::TooLong(Duration::from_secs(86400)))
        );
        assert_eq!(
            retry_after(&header("-5")),
            Err(InvalidRetryAfter::Unparsable("-5".into()))
        );
    }

    #[test]
    fn test_http_date() {
        assert_eq!(
            retry_after(&header("Wed, 21 Oct 2015 07:28:00 GMT")),
            Ok(Duration::ZERO)
        );

        let soon = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(120));
        let delay = retry_after(&header(&soon)).unwrap();
        assert!(delay > Duration::from_secs(100), "{delay:?}");
        assert!(delay <= Duration::from_secs(120), "{delay:?}");
    }

    #[test]
    fn test_unusable_header_is_ignored() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("retry-after", header("later"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("retry-after", header("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
    }
}
