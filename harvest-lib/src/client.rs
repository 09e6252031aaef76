//! Sending one prefix query and classifying whatever comes back.
//!
//! [`QueryClient`] is the seam between the exploration and the transport.
//! [`HttpClient`] speaks to a JSON autocomplete endpoint of the form
//! `GET <endpoint>?query=<prefix>&max_results=<cap>` answering
//! `{"results": ["name", ...]}`.
use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use http::{
    HeaderMap, StatusCode,
    header::{self, HeaderValue},
};
use log::{trace, warn};
use serde_json::Value;
use typed_builder::TypedBuilder;
use url::Url;

use crate::{
    ErrorKind, Outcome, Prefix, QueryResult, Result, ratelimit::parse_retry_after,
    retry::RetryExt,
};

/// Default name of the query-string parameter carrying the prefix
pub const DEFAULT_QUERY_PARAM: &str = "query";
/// Default name of the query-string parameter carrying the result cap
pub const DEFAULT_LIMIT_PARAM: &str = "max_results";
/// Default JSON field holding the array of names
pub const DEFAULT_RESULTS_FIELD: &str = "results";
/// Default timeout for a whole request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default timeout for establishing a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default user agent, `harvest/<version>`
pub const DEFAULT_USER_AGENT: &str = concat!("harvest/", env!("CARGO_PKG_VERSION"));

/// Anything that can answer prefix queries.
///
/// Implementations never fail: every problem is classified into an
/// [`Outcome`] so the caller can decide between retrying and giving up.
#[async_trait]
pub trait QueryClient: Send + Sync + Debug {
    /// Query the names starting with `prefix`, asking for at most `max_results`
    async fn query(&self, prefix: &Prefix, max_results: usize) -> Outcome;
}

/// Builder for [`HttpClient`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(builder_method(doc = "
Create a builder for the endpoint client.

The endpoint URL is required, all other settings have sensible defaults."))]
pub struct ClientBuilder {
    /// Base URL of the autocomplete endpoint.
    ///
    /// Existing query parameters are kept; the prefix and the cap are
    /// appended.
    endpoint: Url,

    /// Query-string parameter carrying the prefix
    #[builder(default_code = "String::from(DEFAULT_QUERY_PARAM)", setter(into))]
    query_param: String,

    /// Query-string parameter carrying the cap
    #[builder(default_code = "String::from(DEFAULT_LIMIT_PARAM)", setter(into))]
    limit_param: String,

    /// JSON field holding the names
    #[builder(default_code = "String::from(DEFAULT_RESULTS_FIELD)", setter(into))]
    results_field: String,

    /// User-agent used for querying the endpoint
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)", setter(into))]
    user_agent: String,

    /// Sets the default [headers] for every request. See also [here].
    ///
    /// [headers]: https://docs.rs/http/latest/http/header/struct.HeaderName.html
    /// [here]: https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#method.default_headers
    #[builder(default)]
    custom_headers: HeaderMap,

    /// Timeout for a whole request, including reading the body
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,

    /// Timeout for establishing a connection
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    connect_timeout: Duration,
}

impl ClientBuilder {
    /// Instantiates a [`HttpClient`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user agent contains characters other than ASCII 32-127.
    /// - The reqwest client cannot be instantiated. This occurs if a TLS
    ///   backend cannot be initialized or the resolver fails to load the system
    ///   configuration. See [here].
    ///
    /// [here]: https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors
    pub fn client(self) -> Result<HttpClient> {
        let Self {
            endpoint,
            query_param,
            limit_param,
            results_field,
            user_agent,
            custom_headers: mut headers,
            timeout,
            connect_timeout,
        } = self;

        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|e| ErrorKind::InvalidHeader(user_agent.clone(), e.to_string()))?,
        );
        headers
            .entry(header::ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        let reqwest_client = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(ErrorKind::BuildClient)?;

        Ok(HttpClient {
            reqwest_client,
            endpoint,
            query_param,
            limit_param,
            results_field,
        })
    }
}

/// Queries a JSON autocomplete endpoint over HTTP.
///
/// The client is cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    reqwest_client: reqwest::Client,
    endpoint: Url,
    query_param: String,
    limit_param: String,
    results_field: String,
}

impl HttpClient {
    /// The full request URL for `prefix`
    #[must_use]
    pub fn request_url(&self, prefix: &Prefix, max_results: usize) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(&self.query_param, prefix.as_str())
            .append_pair(&self.limit_param, &max_results.to_string());
        url
    }
}

#[async_trait]
impl QueryClient for HttpClient {
    async fn query(&self, prefix: &Prefix, max_results: usize) -> Outcome {
        let url = self.request_url(prefix, max_results);
        trace!("GET {url}");

        let response = match self.reqwest_client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Outcome::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            };
        }
        if !status.is_success() {
            return if status.should_retry() {
                Outcome::Transient(format!("HTTP {status}"))
            } else {
                Outcome::Malformed(format!("unexpected HTTP {status}"))
            };
        }

        match response.bytes().await {
            Ok(body) => parse_results(&body, &self.results_field, max_results),
            Err(e) => classify_error(&e),
        }
    }
}

/// Map a transport error onto an outcome
fn classify_error(error: &reqwest::Error) -> Outcome {
    if error.should_retry() {
        Outcome::Transient(error.to_string())
    } else {
        Outcome::Malformed(error.to_string())
    }
}

/// Extract the array of names from a response body
pub(crate) fn parse_results(body: &[u8], field: &str, max_results: usize) -> Outcome {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => return Outcome::Malformed(format!("response is not valid JSON: {e}")),
    };

    let Some(items) = value.get(field).and_then(Value::as_array) else {
        return Outcome::Malformed(format!("response has no `{field}` array"));
    };

    let names: Option<Vec<String>> = items
        .iter()
        .map(|item| item.as_str().map(str::to_owned))
        .collect();

    match names {
        Some(names) => {
            if names.len() > max_results {
                warn!(
                    "Endpoint returned {} names, more than the requested {max_results}",
                    names.len()
                );
            }
            Outcome::Results(QueryResult::new(names, max_results))
        }
        None => Outcome::Malformed(format!("`{field}` contains a non-string entry")),
    }
}
