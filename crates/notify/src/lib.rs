//! Notification routing.
//!
//! A `notify` node (or the monitor loop) names a channel kind and a
//! stored channel configuration; the router dispatches to the matching
//! sender. Payload templates may carry `__KEY__` placeholders resolved
//! against the notification parameters at send time.

use serde_json::{Map, Value};

use cf_domain::error::{Error, Result};
use cf_store::Store;

mod dingtalk;
mod feishu;
mod mail;
mod template;
mod webhook;
mod workwx;

pub use template::replace_placeholders;

/// Parameters of one notification.
#[derive(Debug, Clone, Default)]
pub struct NotifyParams {
    pub provider: String,
    pub provider_id: String,
    pub subject: String,
    pub body: String,
    /// Additional template variables beyond subject/body.
    pub extra: Map<String, Value>,
}

impl NotifyParams {
    /// The variable map visible to `__KEY__` templates.
    pub fn vars(&self) -> Map<String, Value> {
        let mut vars = self.extra.clone();
        vars.insert("provider".into(), Value::String(self.provider.clone()));
        vars.insert("provider_id".into(), Value::String(self.provider_id.clone()));
        vars.insert("subject".into(), Value::String(self.subject.clone()));
        vars.insert("body".into(), Value::String(self.body.clone()));
        vars
    }
}

/// Send a notification through the channel identified by
/// `params.provider` / `params.provider_id`.
pub async fn notify(store: &Store, params: &NotifyParams) -> Result<()> {
    let row = store.get_report(&params.provider_id)?;
    dispatch(&params.provider, &row.config, params).await
}

/// Send a canned test message through a stored channel.
pub async fn notify_test(store: &Store, provider_id: &str) -> Result<()> {
    let row = store.get_report(provider_id)?;
    let params = NotifyParams {
        provider: row.kind.clone(),
        provider_id: provider_id.to_string(),
        subject: "certfleet channel test".into(),
        body: "certfleet channel test".into(),
        extra: Map::new(),
    };
    dispatch(&row.kind, &row.config, &params).await
}

async fn dispatch(kind: &str, config: &str, params: &NotifyParams) -> Result<()> {
    match kind {
        "mail" => mail::send(config, params).await,
        "webhook" => webhook::send(config, params).await,
        "feishu" => feishu::send(config, params).await,
        "dingtalk" => dingtalk::send(config, params).await,
        "workwx" => workwx::send(config, params).await,
        other => Err(Error::Notify(format!("unsupported channel kind: {other}"))),
    }
}

pub(crate) fn parse_config(config: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(config) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::Notify("channel config is not an object".into())),
        Err(e) => Err(Error::Notify(format!("channel config: {e}"))),
    }
}

pub(crate) fn config_str<'a>(config: &'a Map<String, Value>, key: &str) -> &'a str {
    config.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let params = NotifyParams {
            provider: "pager".into(),
            ..Default::default()
        };
        let err = dispatch("pager", "{}", &params).await.unwrap_err();
        assert!(err.to_string().contains("unsupported channel kind"));
    }

    #[test]
    fn vars_include_subject_and_body() {
        let mut extra = Map::new();
        extra.insert("domains".into(), Value::String("a.example".into()));
        let params = NotifyParams {
            provider: "webhook".into(),
            provider_id: "1".into(),
            subject: "s".into(),
            body: "b".into(),
            extra,
        };
        let vars = params.vars();
        assert_eq!(vars.get("subject").unwrap(), "s");
        assert_eq!(vars.get("domains").unwrap(), "a.example");
    }
}
