//! DingTalk group-bot channel.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use cf_domain::error::{Error, Result};

use crate::{config_str, parse_config, NotifyParams};

/// DingTalk signs `"{timestamp_ms}\n{secret}"` with the secret; the
/// signature rides on the webhook URL query.
pub(crate) fn signed_url(webhook: &str, secret: &str, timestamp_ms: i64) -> Result<String> {
    let string_to_sign = format!("{timestamp_ms}\n{secret}");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(string_to_sign.as_bytes());
    let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let mut url = url::Url::parse(webhook).map_err(|e| Error::Notify(format!("dingtalk url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("timestamp", &timestamp_ms.to_string())
        .append_pair("sign", &signature);
    Ok(url.to_string())
}

pub async fn send(config: &str, params: &NotifyParams) -> Result<()> {
    let config = parse_config(config)?;
    let webhook = config_str(&config, "webhook");
    let secret = config_str(&config, "secret");
    if webhook.is_empty() {
        return Err(Error::Notify("dingtalk: webhook url is required".into()));
    }

    let url = signed_url(webhook, secret, chrono::Utc::now().timestamp_millis())?;
    let body = json!({
        "msgtype": "text",
        "text": { "content": format!("{} : {}", params.subject, params.body) },
    });

    let resp = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Notify(format!("dingtalk request: {e}")))?;
    let reply: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| Error::Notify(format!("dingtalk response: {e}")))?;
    let code = reply.get("errcode").and_then(|v| v.as_i64()).unwrap_or(-1);
    if code != 0 {
        let msg = reply.get("errmsg").and_then(|v| v.as_str()).unwrap_or("unknown");
        return Err(Error::Notify(format!("dingtalk send failed: {msg}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_timestamp_and_sign() {
        let url = signed_url("https://oapi.dingtalk.com/robot/send?access_token=t", "sec", 1_718_000_000_000).unwrap();
        assert!(url.contains("access_token=t"));
        assert!(url.contains("timestamp=1718000000000"));
        assert!(url.contains("sign="));
    }

    #[test]
    fn invalid_webhook_is_rejected() {
        assert!(signed_url("not a url", "s", 0).is_err());
    }
}
