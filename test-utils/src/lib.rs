//! Mock endpoints shared by the tests of `harvest-lib` and `harvest-bin`.
//!
//! Everything is a macro, so this crate needs no dependencies of its own:
//! the calling crate provides `wiremock`, `http` and `serde_json`.

/// A server answering every `GET` with `$status`.
///
/// Further arguments are applied to the `ResponseTemplate`, for example
/// `mock_server!(StatusCode::OK, set_delay(Duration::from_secs(5)))`.
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $method:ident ($($arg:expr),*))*) => {{
        let server = wiremock::MockServer::start().await;
        let response = wiremock::ResponseTemplate::new(http::StatusCode::from($status))
            $(.$method($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }};
}

/// Create a mock autocomplete endpoint over a fixed vocabulary.
///
/// It reads the `query` and `max_results` parameters and answers with
/// `{"results": [...]}`, holding the lexicographically first names that
/// start with the query.
#[macro_export]
macro_rules! vocabulary_server {
    ($names:expr) => {{
        let vocabulary: std::collections::BTreeSet<String> =
            $names.into_iter().map(String::from).collect();
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(move |request: &wiremock::Request| {
                let mut prefix = String::new();
                let mut max_results = usize::MAX;
                for (key, value) in request.url.query_pairs() {
                    match key.as_ref() {
                        "query" => prefix = value.into_owned(),
                        "max_results" => max_results = value.parse().unwrap_or(usize::MAX),
                        _ => {}
                    }
                }
                let names: Vec<&String> = vocabulary
                    .iter()
                    .filter(|name| name.starts_with(&prefix))
                    .take(max_results)
                    .collect();
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "results": names }))
            })
            .mount(&mock_server)
            .await;
        mock_server
    }};
}
