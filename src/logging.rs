//! Middleware for logging requests and responses.

use axum::{extract::Request, http::header::CONTENT_TYPE, middleware::Next, response::Response};

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is truncated
/// and the full body logged at the `debug` level.
///
/// Passwords in JSON request bodies (register and log-in) are redacted.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (headers, body_text) = extract_header_and_body_text_from_request(request).await;

    let is_json_post = headers.method == axum::http::Method::POST
        && headers
            .headers
            .get(CONTENT_TYPE)
            .and_then(|content_type| content_type.to_str().ok())
            .is_some_and(|content_type| content_type.starts_with("application/json"));

    if is_json_post {
        let display_text = redact_password(&body_text, "password");
        log_request(&headers, &display_text);
    } else {
        log_request(&headers, &body_text);
    }

    let request = Request::from_parts(headers, body_text.into());
    let response = next.run(request).await;

    let (headers, body_text) = extract_header_and_body_text_from_response(response).await;
    log_response(&headers, &body_text);

    Response::from_parts(headers, body_text.into())
}

/// Replace the string value of `field_name` in a JSON body with asterisks.
///
/// This works on the raw text so the logged body is byte-for-byte what the
/// client sent apart from the redacted value. Values containing escaped
/// quotes are only partially redacted.
fn redact_password(body_text: &str, field_name: &str) -> String {
    let needle = format!("\"{field_name}\"");
    let field_start = match body_text.find(&needle) {
        Some(position) => position,
        None => return body_text.to_string(),
    };

    let after_field = field_start + needle.len();
    let value_open = match body_text[after_field..].find('"') {
        Some(offset) => after_field + offset + 1,
        None => return body_text.to_string(),
    };
    let value_close = match body_text[value_open..].find('"') {
        Some(offset) => value_open + offset,
        None => return body_text.to_string(),
    };

    format!(
        "{}********{}",
        &body_text[..value_open],
        &body_text[value_close..]
    )
}

// The same limit axum's JSON extractor enforces on request bodies.
const BODY_READ_LIMIT: usize = 2 * 1024 * 1024;

async fn extract_header_and_body_text_from_request(
    request: Request,
) -> (axum::http::request::Parts, String) {
    let (headers, body) = request.into_parts();
    let body_text = match axum::body::to_bytes(body, BODY_READ_LIMIT).await {
        Ok(body_bytes) => String::from_utf8_lossy(&body_bytes).to_string(),
        Err(error) => {
            tracing::error!("could not read the request body: {error}");
            String::new()
        }
    };

    (headers, body_text)
}

async fn extract_header_and_body_text_from_response(
    response: Response,
) -> (axum::http::response::Parts, String) {
    let (headers, body) = response.into_parts();
    let body_text = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body_bytes) => String::from_utf8_lossy(&body_bytes).to_string(),
        Err(error) => {
            tracing::error!("could not read the response body: {error}");
            String::new()
        }
    };

    (headers, body_text)
}

/// The maximum number of body bytes included in an info level log line.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// The longest prefix of `body` that fits the log limit without splitting a
/// UTF-8 character.
fn truncate_body(body: &str) -> &str {
    let mut end = LOG_BODY_LENGTH_LIMIT;

    while !body.is_char_boundary(end) {
        end -= 1;
    }

    &body[..end]
}

fn log_request(headers: &axum::http::request::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Received request: {headers:#?}\nbody: {:}...",
            truncate_body(body)
        );
        tracing::debug!("Full request body: {body:?}");
    } else {
        tracing::info!("Received request: {headers:#?}\nbody: {body:?}");
    }
}

fn log_response(headers: &axum::http::response::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Sending response: {headers:#?}\nbody: {:}...",
            truncate_body(body)
        );
        tracing::debug!("Full response body: {body:?}");
    } else {
        tracing::info!("Sending response: {headers:#?}\nbody: {body:?}");
    }
}


#[cfg(test)]
mod truncation_tests {
    use super::{LOG_BODY_LENGTH_LIMIT, log_request, truncate_body};

    #[test]
    fn truncates_a_long_body_to_the_limit() {
        let body = "a".repeat(100);

        assert_eq!(truncate_body(&body), "a".repeat(LOG_BODY_LENGTH_LIMIT));
    }

    #[test]
    fn backs_off_to_a_character_boundary() {
        let body = format!("{}é tail", "a".repeat(LOG_BODY_LENGTH_LIMIT - 1));

        let got = truncate_body(&body);

        assert_eq!(got, "a".repeat(LOG_BODY_LENGTH_LIMIT - 1));
    }

    #[test]
    fn logs_a_body_with_a_multibyte_character_at_the_limit() {
        let body = format!(
            "{}é and more text to push the body over the limit",
            "a".repeat(LOG_BODY_LENGTH_LIMIT - 1)
        );
        let (headers, _) = axum::http::Request::builder()
            .method("POST")
            .uri("/transactions")
            .body(())
            .expect("Could not build request")
            .into_parts();

        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, || log_request(&headers, &body));
    }
}

#[cfg(test)]
mod body_extraction_tests {
    use axum::body::Body;

    use super::{BODY_READ_LIMIT, extract_header_and_body_text_from_request};

    #[tokio::test]
    async fn reads_the_body_back_as_text() {
        let request = axum::http::Request::builder()
            .body(Body::from(r#"{"amount": 42.0}"#))
            .expect("Could not build request");

        let (_, body_text) = extract_header_and_body_text_from_request(request).await;

        assert_eq!(body_text, r#"{"amount": 42.0}"#);
    }

    #[tokio::test]
    async fn an_oversized_body_is_replaced_with_an_empty_one() {
        let request = axum::http::Request::builder()
            .body(Body::from("a".repeat(BODY_READ_LIMIT + 1)))
            .expect("Could not build request");

        let (_, body_text) = extract_header_and_body_text_from_request(request).await;

        assert_eq!(body_text, "");
    }
}
