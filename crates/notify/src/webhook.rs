//! Generic HTTP webhook channel.

use std::time::Duration;

use serde_json::Value;

use cf_domain::error::{Error, Result};

use crate::{config_str, parse_config, replace_placeholders, NotifyParams};

pub async fn send(config: &str, params: &NotifyParams) -> Result<()> {
    let config = parse_config(config)?;
    let url = config_str(&config, "url").to_string();
    if url.is_empty() {
        return Err(Error::Notify("webhook: url is required".into()));
    }
    let method = {
        let m = config_str(&config, "method").to_uppercase();
        if m.is_empty() {
            "POST".to_string()
        } else {
            m
        }
    };
    let raw_data = {
        let d = config_str(&config, "data");
        if d.is_empty() {
            "{}"
        } else {
            d
        }
    };
    let data = replace_placeholders(raw_data, &params.vars());
    let headers = parse_headers(config_str(&config, "headers"))?;
    let ignore_ssl = config
        .get("ignore_ssl")
        .map(cf_domain::value::as_bool_loose)
        .unwrap_or(false);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .danger_accept_invalid_certs(ignore_ssl)
        .build()
        .map_err(|e| Error::Http(e.to_string()))?;

    let mut req = match method.as_str() {
        "POST" => {
            let content_type = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .map(|(_, v)| v.as_str())
                .unwrap_or("application/json");
            let req = client.post(&url);
            if content_type.starts_with("application/x-www-form-urlencoded") {
                req.form(&string_map(&data)?)
            } else if content_type.starts_with("multipart/form-data") {
                let mut form = reqwest::multipart::Form::new();
                for (k, v) in string_map(&data)? {
                    form = form.text(k, v);
                }
                req.multipart(form)
            } else {
                let body: Value = serde_json::from_str(&data)
                    .map_err(|e| Error::Notify(format!("webhook data: {e}")))?;
                req.json(&body)
            }
        }
        "GET" => client.get(&url).query(&string_map(&data)?),
        other => return Err(Error::Notify(format!("webhook: unsupported method {other}"))),
    };
    for (k, v) in &headers {
        req = req.header(k, v);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| Error::Notify(format!("webhook request: {e}")))?;
    if !resp.status().is_success() {
        return Err(Error::Notify(format!(
            "webhook returned status {}",
            resp.status().as_u16()
        )));
    }
    tracing::debug!(url = %url, "webhook delivered");
    Ok(())
}

/// Parse newline-separated `Key: Value` headers.
fn parse_headers(raw: &str) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(Error::Notify(format!("webhook headers, line {}: {line}", i + 1)));
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(Error::Notify(format!("webhook headers, line {} is empty", i + 1)));
        }
        headers.push((key.to_string(), value.to_string()));
    }
    Ok(headers)
}

fn string_map(data: &str) -> Result<Vec<(String, String)>> {
    let parsed: Value =
        serde_json::from_str(data).map_err(|e| Error::Notify(format!("webhook data: {e}")))?;
    let Value::Object(map) = parsed else {
        return Err(Error::Notify("webhook data must be a JSON object".into()));
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, s)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lines_parse_and_reject_malformed() {
        let parsed = parse_headers("X-Token: abc\n\nContent-Type: application/json\n").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], ("X-Token".to_string(), "abc".to_string()));
        assert!(parse_headers("no-colon-here").is_err());
        assert!(parse_headers("Key:").is_err());
    }

    #[test]
    fn string_map_stringifies_non_strings() {
        let map = string_map(r#"{"a":"x","n":7}"#).unwrap();
        assert!(map.contains(&("a".to_string(), "x".to_string())));
        assert!(map.contains(&("n".to_string(), "7".to_string())));
        assert!(string_map("[1]").is_err());
    }

    #[tokio::test]
    async fn missing_url_is_a_config_error() {
        let err = send("{}", &NotifyParams::default()).await.unwrap_err();
        assert!(err.to_string().contains("url is required"));
    }
}
