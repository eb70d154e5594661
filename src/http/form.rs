//! Render form decoding
//!
//! [`FormFields`] is what axum's `Query` and `Form` extractors deserialize. A body value
//! wins over the same key in the query string. Extra request headers use the
//! `headers[Name]=value` key form and are collected from the keys no field claims.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer};

use crate::render::RenderForm;
use crate::Error;

/// Render fields as sent by a caller
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FormFields {
    url: Option<String>,
    kind: Option<String>,
    #[serde(default, deserialize_with = "number")]
    width: Option<u32>,
    #[serde(default, deserialize_with = "number")]
    height: Option<u32>,
    #[serde(rename = "userAgent")]
    user_agent: Option<String>,
    #[serde(default, deserialize_with = "number")]
    timeout: Option<u64>,
    #[serde(default, deserialize_with = "number")]
    delay: Option<u64>,
    #[serde(rename = "asPDF", default, deserialize_with = "flag")]
    as_pdf: Option<bool>,
    script: Option<String>,
    #[serde(flatten)]
    rest: HashMap<String, String>,
}

impl FormFields {
    /// These fields with every field set in `over` replaced by its value there
    pub fn overlaid(self, over: FormFields) -> FormFields {
        let mut rest = self.rest;
        rest.extend(over.rest);

        FormFields {
            url: over.url.or(self.url),
            kind: over.kind.or(self.kind),
            width: over.width.or(self.width),
            height: over.height.or(self.height),
            user_agent: over.user_agent.or(self.user_agent),
            timeout: over.timeout.or(self.timeout),
            delay: over.delay.or(self.delay),
            as_pdf: over.as_pdf.or(self.as_pdf),
            script: over.script.or(self.script),
            rest,
        }
    }

    /// Raw render form, with `headers[Name]` keys gathered into the header map
    pub fn into_form(self) -> RenderForm {
        let headers = self
            .rest
            .into_iter()
            .filter_map(|(key, value)| header_name(&key).map(|name| (name.to_string(), value)))
            .collect();

        RenderForm {
            url: self.url,
            kind: self.kind,
            width: self.width,
            height: self.height,
            user_agent: self.user_agent,
            timeout: self.timeout,
            delay: self.delay,
            as_pdf: self.as_pdf,
            script: self.script,
            headers,
        }
    }
}

/// Render form from query fields and, when the request carried one, a form body
pub fn merge(query: FormFields, body: Option<FormFields>) -> RenderForm {
    match body {
        Some(body) => query.overlaid(body).into_form(),
        None => query.into_form(),
    }
}

/// Request error for fields the extractors could not decode
pub fn rejected<T: fmt::Display>(reason: T) -> Error {
    Error::invalid_request(format!("could not decode form: {}", reason))
}

fn header_name(key: &str) -> Option<&str> {
    key.strip_prefix("headers[")
        .and_then(|rest| rest.strip_suffix(']'))
        .filter(|name| !name.is_empty())
}

// Values are read as text first so they decode the same inside a flattened struct
fn number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let value = String::deserialize(deserializer)?;
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| de::Error::custom(format!("{} is not a number", value)))
}

fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" | "on" | "yes" => Ok(Some(true)),
        "false" | "0" | "off" | "no" => Ok(Some(false)),
        other => Err(de::Error::custom(format!("{} is not a boolean", other))),
    }
}
