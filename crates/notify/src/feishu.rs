//! Feishu group-bot channel.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use cf_domain::error::{Error, Result};

use crate::{config_str, parse_config, NotifyParams};

/// Feishu's signature keys the MAC with `"{timestamp}\n{secret}"` over an
/// empty message.
pub(crate) fn sign(secret: &str, timestamp: i64) -> String {
    let string_to_sign = format!("{timestamp}\n{secret}");
    let mac = Hmac::<Sha256>::new_from_slice(string_to_sign.as_bytes())
        .expect("hmac accepts any key length");
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

pub async fn send(config: &str, params: &NotifyParams) -> Result<()> {
    let config = parse_config(config)?;
    let webhook = config_str(&config, "webhook");
    let secret = config_str(&config, "secret");
    if webhook.is_empty() {
        return Err(Error::Notify("feishu: webhook url is required".into()));
    }

    let timestamp = chrono::Utc::now().timestamp();
    let body = json!({
        "timestamp": timestamp,
        "sign": sign(secret, timestamp),
        "msg_type": "text",
        "content": { "text": format!("{} : {}", params.subject, params.body) },
    });

    let resp = reqwest::Client::new()
        .post(webhook)
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Notify(format!("feishu request: {e}")))?;
    let reply: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| Error::Notify(format!("feishu response: {e}")))?;
    let code = reply.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);
    if code != 0 {
        let msg = reply.get("msg").and_then(|v| v.as_str()).unwrap_or("unknown");
        return Err(Error::Notify(format!("feishu send failed: {msg}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_per_timestamp() {
        let a = sign("secret", 1_718_000_000);
        let b = sign("secret", 1_718_000_000);
        let c = sign("secret", 1_718_000_001);
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Base64 of a 32-byte MAC.
        assert_eq!(base64::engine::general_purpose::STANDARD.decode(&a).unwrap().len(), 32);
    }
}
