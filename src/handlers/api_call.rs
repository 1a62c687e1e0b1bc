//! ApiCall - performs an HTTP request with a hard timeout

use super::JobContext;
use crate::core::{ApiCallAttrs, HttpMethod};
use crate::error::JobExecutionError;
use crate::template;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

const HANDLER: &str = "api call";
/// Longest response body quoted in an HTTP status error
const ERROR_BODY_LIMIT: usize = 200;

pub(super) async fn execute(
    attrs: &ApiCallAttrs,
    ctx: &mut JobContext,
) -> Result<Value, JobExecutionError> {
    if attrs.url.trim().is_empty() {
        return Err(JobExecutionError::invalid(HANDLER, "url is required"));
    }

    let url = template::render(&attrs.url, &ctx.context);
    let timeout_ms = attrs.timeout_ms.unwrap_or(ctx.config.api_timeout_ms);

    let mut request = ctx.http.request(method(attrs.method), &url);
    for (name, value) in &attrs.headers {
        request = request.header(name.as_str(), template::render(value, &ctx.context));
    }
    if let Some(body) = &attrs.body {
        request = match template::render_value(body, &ctx.context) {
            Value::String(text) => request.body(text),
            other => request.json(&other),
        };
    }

    ctx.log(format!("{} {}", attrs.method, url));
    let started = Instant::now();

    let send = async move {
        let response = request.send().await?;
        let status = response.status();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        let text = response.text().await?;
        Ok::<_, reqwest::Error>((status, headers, text))
    };

    let outcome = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(JobExecutionError::Cancelled(HANDLER)),
        outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), send) => outcome,
    };

    let (status, headers, text) = match outcome {
        Err(_) => {
            return Err(JobExecutionError::Timeout {
                handler: HANDLER,
                timeout_ms,
            })
        }
        Ok(Err(e)) => return Err(classify(&url, timeout_ms, e)),
        Ok(Ok(parts)) => parts,
    };

    let elapsed = started.elapsed().as_millis() as u64;
    ctx.log(format!("HTTP {} in {}ms", status.as_u16(), elapsed));

    if !status.is_success() {
        return Err(JobExecutionError::HttpStatus {
            method: attrs.method.to_string(),
            url,
            status: status.as_u16(),
            body: truncate(&text, ERROR_BODY_LIMIT),
        });
    }

    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Ok(json!({
        "status": status.as_u16(),
        "headers": headers,
        "body": body,
        "durationMs": elapsed,
    }))
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Map a transport error onto the handler's error kinds
fn classify(url: &str, timeout_ms: u64, error: reqwest::Error) -> JobExecutionError {
    let reason = error_chain(&error);
    if error.is_timeout() {
        JobExecutionError::Timeout {
            handler: HANDLER,
            timeout_ms,
        }
    } else if error.is_connect() {
        JobExecutionError::Network {
            url: url.to_string(),
            reason,
        }
    } else if error.is_builder() {
        JobExecutionError::invalid(HANDLER, format!("bad request for '{}': {}", url, reason))
    } else {
        JobExecutionError::Request {
            url: url.to_string(),
            reason,
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        format!("{}…", text.chars().take(limit).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::Arc;

    fn context() -> JobContext {
        JobContext::new("call", Arc::new(EngineConfig::default()))
    }

    #[tokio::test]
    async fn test_missing_url_is_invalid() {
        let mut ctx = context();
        let err = execute(&ApiCallAttrs::default(), &mut ctx).await.unwrap_err();
        assert!(matches!(err, JobExecutionError::InvalidAttributes { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let mut ctx = context();
        let attrs = ApiCallAttrs {
            url: "http://127.0.0.1:1/health".into(),
            timeout_ms: Some(5_000),
            ..Default::default()
        };
        let err = execute(&attrs, &mut ctx).await.unwrap_err();
        assert!(matches!(err, JobExecutionError::Network { .. }), "{err}");
        assert_eq!(ctx.logs()[0], "GET http://127.0.0.1:1/health");
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        let mut ctx = context();
        ctx.cancel.cancel();
        let attrs = ApiCallAttrs {
            url: "http://127.0.0.1:1/".into(),
            timeout_ms: Some(10_000),
            ..Default::default()
        };
        let err = execute(&attrs, &mut ctx).await.unwrap_err();
        assert!(matches!(err, JobExecutionError::Cancelled(_)));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
