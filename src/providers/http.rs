//! Blocking HTTP helpers shared by the provider clients.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use log::info;
use serde_json::Value;

/// Coarse failure classes used to decide whether a request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFailureKind {
    Timeout,
    RateLimited,
    Unauthorized,
    Hard,
}

/// Classified request failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub kind: HttpFailureKind,
    pub message: String,
}

impl HttpFailure {
    pub fn new(kind: HttpFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn hard(message: impl Into<String>) -> Self {
        Self::new(HttpFailureKind::Hard, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == HttpFailureKind::Timeout
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            HttpFailureKind::Timeout => "timeout",
            HttpFailureKind::RateLimited => "rate limited",
            HttpFailureKind::Unauthorized => "unauthorized",
            HttpFailureKind::Hard => "error",
        };
        write!(f, "{label}: {}", self.message)
    }
}

impl From<HttpFailure> for String {
    fn from(failure: HttpFailure) -> Self {
        failure.to_string()
    }
}

/// How often, and how patiently, timed-out requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(4),
        }
    }
}

/// Builds an agent with connection timeouts; per-request timeouts are set at call sites.
pub fn build_agent(connect_timeout: Duration, io_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .timeout_read(io_timeout)
        .timeout_write(io_timeout)
        .build()
}

pub fn classify_ureq_failure(error: &ureq::Error) -> HttpFailureKind {
    match error {
        ureq::Error::Status(code, _) => match code {
            401 => HttpFailureKind::Unauthorized,
            429 => HttpFailureKind::RateLimited,
            408 | 500 | 502 | 503 | 504 => HttpFailureKind::Timeout,
            _ => HttpFailureKind::Hard,
        },
        ureq::Error::Transport(transport) => {
            let lowered = transport.to_string().to_ascii_lowercase();
            if lowered.contains("timed out") || lowered.contains("timeout") {
                HttpFailureKind::Timeout
            } else {
                HttpFailureKind::Hard
            }
        }
    }
}

pub fn classify_io_timeout(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    ) || error.to_string().to_ascii_lowercase().contains("timed out")
}

fn classify_call_error(error: ureq::Error) -> HttpFailure {
    let kind = classify_ureq_failure(&error);
    HttpFailure::new(kind, format!("Request failed: {error}"))
}

fn read_body(response: ureq::Response) -> Result<String, HttpFailure> {
    let mut body = String::new();
    response
        .into_reader()
        .read_to_string(&mut body)
        .map_err(|error| {
            let kind = if classify_io_timeout(&error) {
                HttpFailureKind::Timeout
            } else {
                HttpFailureKind::Hard
            };
            HttpFailure::new(kind, format!("Failed to read response: {error}"))
        })?;
    Ok(body)
}

/// Appends url-encoded query parameters to `base`.
pub fn request_url(base: &str, params: &[(&str, &str)]) -> String {
    let mut url = base.to_string();
    if params.is_empty() {
        return url;
    }
    url.push(if base.contains('?') { '&' } else { '?' });
    for (index, (key, value)) in params.iter().enumerate() {
        if index > 0 {
            url.push('&');
        }
        url.push_str(key);
        url.push('=');
        url.push_str(urlencoding::encode(value).as_ref());
    }
    url
}

/// Issues one GET and returns the body as text.
pub fn get_text_once(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    timeout: Duration,
) -> Result<String, HttpFailure> {
    let mut request = agent.get(url).timeout(timeout);
    for (name, value) in headers {
        request = request.set(name, value);
    }
    let response = request.call().map_err(classify_call_error)?;
    read_body(response)
}

/// Parses a response body as JSON, treating blank bodies as `null`.
pub fn parse_json_body(body: &str) -> Result<Value, HttpFailure> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|error| {
        let snippet: String = trimmed.chars().take(120).collect();
        HttpFailure::hard(format!("Invalid JSON response: {error}; prefix={snippet}"))
    })
}

/// Issues one GET with `Accept: application/json` and parses the body.
pub fn get_json_once(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    timeout: Duration,
) -> Result<Value, HttpFailure> {
    let mut all_headers = vec![("Accept", "application/json")];
    all_headers.extend_from_slice(headers);
    let body = get_text_once(agent, url, &all_headers, timeout)?;
    parse_json_body(&body)
}

/// Issues one form-encoded POST and parses the JSON response.
pub fn post_form_json_once(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    form: &[(&str, &str)],
    timeout: Duration,
) -> Result<Value, HttpFailure> {
    let mut request = agent
        .post(url)
        .timeout(timeout)
        .set("Accept", "application/json");
    for (name, value) in headers {
        request = request.set(name, value);
    }
    let response = request.send_form(form).map_err(classify_call_error)?;
    let body = read_body(response)?;
    parse_json_body(&body)
}

pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(6);
    let multiplier = 1u32 << exponent;
    policy
        .base_delay
        .checked_mul(multiplier)
        .unwrap_or(policy.max_delay)
        .min(policy.max_delay)
}

/// Runs `operation`, retrying timeouts with exponential backoff.
pub fn with_timeout_backoff<T, F>(
    label: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, HttpFailure>
where
    F: FnMut() -> Result<T, HttpFailure>,
{
    let mut attempt = 1u32;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(failure) if failure.is_timeout() && attempt < policy.max_attempts => {
                let backoff = backoff_delay(policy, attempt);
                info!("{label}: attempt {attempt} timed out, retrying in {backoff:?}");
                std::thread::sleep(backoff);
                attempt = attempt.saturating_add(1);
            }
            Err(failure) => return Err(failure),
        }
    }
}

/// Returns the elements of a JSON value that may be an array or a lone object.
pub fn array_or_single(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        item @ Value::Object(_) => vec![item],
        _ => Vec::new(),
    }
}

/// Trimmed non-empty string field.
pub fn str_field(value: &Value, key: &str) -> Option<String> {
    value[key]
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_encodes_params() {
        assert_eq!(
            request_url("https://example.test/api", &[("q", "Dying Fetus"), ("limit", "5")]),
            "https://example.test/api?q=Dying%20Fetus&limit=5"
        );
        assert_eq!(
            request_url("https://example.test/api?x=1", &[("y", "a&b")]),
            "https://example.test/api?x=1&y=a%26b"
        );
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(&policy, 4), Duration::from_secs(3));
    }

    #[test]
    fn test_with_timeout_backoff_retries_only_timeouts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        let mut calls = 0;
        let result: Result<(), HttpFailure> = with_timeout_backoff("test", &policy, || {
            calls += 1;
            Err(HttpFailure::new(HttpFailureKind::Timeout, "slow"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);

        let mut hard_calls = 0;
        let _: Result<(), HttpFailure> = with_timeout_backoff("test", &policy, || {
            hard_calls += 1;
            Err(HttpFailure::hard("broken"))
        });
        assert_eq!(hard_calls, 1);
    }

    #[test]
    fn test_parse_json_body_blank_is_null() {
        assert_eq!(parse_json_body("  "), Ok(Value::Null));
        assert!(parse_json_body("<html>").is_err());
    }

    #[test]
    fn test_array_or_single_accepts_lone_object() {
        let value = serde_json::json!({"name": "Gorguts"});
        assert_eq!(array_or_single(&value).len(), 1);
        assert!(array_or_single(&Value::Null).is_empty());
    }
}
