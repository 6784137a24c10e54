//! Template model for notification emails.
//!
//! Builds the JSON model the provider-side `notification` template is
//! rendered with. Field names are part of the template contract and use
//! camelCase.

use serde_json::{Value, json};

use crate::config::DEFAULT_NETWORK;
use crate::domain::PendingNotification;
use crate::error::MailError;

const APP_NAME_SUFFIX: &str = ".aragonpm.eth";

/// Renders [`PendingNotification`]s into template models.
#[derive(Debug, Clone)]
pub struct NotificationRenderer {
    management_url_template: String,
}

impl NotificationRenderer {
    /// Creates a renderer. `{network}` and `{ens_name}` in
    /// `management_url_template` are substituted per notification.
    #[must_use]
    pub fn new(management_url_template: impl Into<String>) -> Self {
        Self {
            management_url_template: management_url_template.into(),
        }
    }

    /// Builds the template model for one notification.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Render`] if the event values cannot be
    /// serialized.
    pub fn render(&self, notification: &PendingNotification) -> Result<Value, MailError> {
        let event_values = serde_json::to_string_pretty(&notification.return_values)
            .map_err(|e| MailError::Render(e.to_string()))?;
        let block_time = notification
            .block_time
            .map(|t| t.format("%a %b %d %Y %H:%M:%S GMT%z").to_string());

        Ok(json!({
            "appName": notification.app_name,
            "appTitle": app_title(&notification.app_name, &notification.contract_address),
            "block": notification.block_number,
            "blockTime": block_time,
            "contractAddress": notification.contract_address,
            "eventName": notification.event_name,
            "eventValues": event_values,
            "eventParameters": event_parameters(&notification.return_values),
            "etherscanUrl": etherscan_url(&notification.network, &notification.transaction_hash),
            "managementUrl": self.management_url(notification),
            "network": notification.network,
            "transactionHash": notification.transaction_hash,
        }))
    }

    fn management_url(&self, notification: &PendingNotification) -> String {
        let organization = notification
            .ens_name
            .as_deref()
            .unwrap_or(&notification.contract_address);
        self.management_url_template
            .replace("{network}", &notification.network)
            .replace("{ens_name}", organization)
    }
}

/// Transaction link on the network's block explorer.
#[must_use]
pub fn etherscan_url(network: &str, transaction_hash: &str) -> String {
    if network == DEFAULT_NETWORK {
        format!("https://etherscan.io/tx/{transaction_hash}")
    } else {
        format!("https://{network}.etherscan.io/tx/{transaction_hash}")
    }
}

/// `agent.aragonpm.eth` + `0x0596598561d0C8ECEAd2b3E836e90298b4Ed012A` → `Agent (0x0596...012A)`.
#[must_use]
pub fn app_title(app_name: &str, contract_address: &str) -> String {
    let name = capitalize(app_name.trim_end_matches(APP_NAME_SUFFIX));
    let head = contract_address.get(..6).unwrap_or(contract_address);
    let tail = contract_address
        .get(contract_address.len().saturating_sub(4)..)
        .unwrap_or_default();
    format!("{name} ({head}...{tail})")
}

/// Uppercases the first character of every word.
#[must_use]
pub fn capitalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_word = false;
    for c in text.chars() {
        let is_word = c.is_alphanumeric() || c == '_';
        if is_word && !previous_is_word {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        previous_is_word = is_word;
    }
    out
}

/// Turns a camelCase parameter name into words: `voteId` → `Vote Id`,
/// `HTTPServer` → `Http Server`.
#[must_use]
pub fn convert_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut spaced = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(|p| chars.get(p)).copied();
        let next = chars.get(i + 1).copied();
        let lower_to_upper = c.is_ascii_uppercase()
            && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit());
        let acronym_end = c.is_ascii_uppercase()
            && prev.is_some_and(|p| p.is_ascii_uppercase())
            && next.is_some_and(|n| n.is_ascii_lowercase() || n.is_ascii_digit());
        if lower_to_upper || acronym_end {
            spaced.push(' ');
        }
        spaced.push(c);
    }
    capitalize(&spaced.to_lowercase())
}

/// `[{parameter, value}]` for the named (non-positional) return values.
#[must_use]
pub fn event_parameters(return_values: &Value) -> Value {
    let Some(values) = return_values.as_object() else {
        return Value::Array(Vec::new());
    };
    values
        .iter()
        .filter(|(key, _)| key.parse::<f64>().is_err())
        .map(|(key, value)| json!({ "parameter": convert_key(key), "value": value }))
        .collect()
}
