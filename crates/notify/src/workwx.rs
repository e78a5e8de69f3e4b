//! WeCom (WorkWeChat) group-bot channel with a templated JSON payload.

use serde_json::Value;

use cf_domain::error::{Error, Result};

use crate::{config_str, parse_config, replace_placeholders, NotifyParams};

const DEFAULT_DATA: &str = r#"{"msgtype":"text","text":{"content":"__subject__: __body__"}}"#;

pub async fn send(config: &str, params: &NotifyParams) -> Result<()> {
    let config = parse_config(config)?;
    let url = config_str(&config, "url");
    if url.is_empty() {
        return Err(Error::Notify("workwx: webhook url is required".into()));
    }
    let data = {
        let d = config_str(&config, "data");
        if d.is_empty() {
            DEFAULT_DATA
        } else {
            d
        }
    };
    let rendered = replace_placeholders(data, &params.vars());
    let body: Value = serde_json::from_str(&rendered)
        .map_err(|e| Error::Notify(format!("workwx data: {e}")))?;

    let resp = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Notify(format!("workwx request: {e}")))?;
    if !resp.status().is_success() {
        return Err(Error::Notify(format!(
            "workwx returned status {}",
            resp.status().as_u16()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_renders_subject_and_body() {
        let params = NotifyParams {
            subject: "renewed".into(),
            body: "a.example done".into(),
            ..Default::default()
        };
        let rendered = replace_placeholders(DEFAULT_DATA, &params.vars());
        let v: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(v["text"]["content"], "renewed: a.example done");
    }
}
