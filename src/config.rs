//! DataStore configuration / 数据存储配置
//!
//! A [`DataStoreConfig`] is a backend type plus flat string parameters.
//! Loading it from a file is up to the caller; it deserializes from any serde
//! format, e.g.
//!
//! ```json
//! { "type": "HTTP", "params": { "base_url": "https://example.com/data/", "timeout": "60s" } }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DataStoreError, Result};

/// Backend type plus parameters / 后端类型及参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    /// Backend discriminator (matched case-insensitively) / 后端类型
    #[serde(rename = "type")]
    pub store_type: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl DataStoreConfig {
    pub fn new(store_type: &str) -> Self {
        Self {
            store_type: store_type.to_string(),
            params: HashMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DataStoreError::config("datastore", format!("failed to parse config: {}", e)))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Required parameter, failing with a config error when absent / 必填参数
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| DataStoreError::config(&self.store_type, format!("no {}", key)))
    }

    /// Optional boolean parameter / 可选布尔参数
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(DataStoreError::config(
                    &self.store_type,
                    format!("invalid {}: {}", key, v),
                )),
            },
        }
    }

    /// Optional duration parameter such as `"30s"` or `"1m30s"` / 可选时长参数
    pub fn get_duration(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => parse_duration(v).map_err(|e| {
                DataStoreError::config(&self.store_type, format!("invalid {}: {}", key, e))
            }),
        }
    }

    /// All parameters whose key starts with `prefix`, prefix stripped / 按前缀筛选参数
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.params.iter().filter_map(move |(k, v)| {
            k.strip_prefix(prefix).map(|name| (name, v.as_str()))
        })
    }
}

/// Parse a duration string like `"300ms"`, `"1.5h"` or `"2h45m"`.
///
/// Accepted units: `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`. A bare `"0"` is
/// zero. Negative durations are rejected.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s.starts_with('-') {
        return Err(format!("negative duration {:?}", input));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("invalid duration {:?}", input));
        }

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let nanos_per_unit: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("missing unit in duration {:?}", input)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| format!("invalid duration {:?}", input))?
        };
        let mut nanos = whole
            .checked_mul(nanos_per_unit)
            .ok_or_else(|| format!("duration {:?} overflows", input))?;

        if !frac_part.is_empty() {
            // Precision past nanoseconds is dropped
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits
                .parse()
                .map_err(|_| format!("invalid duration {:?}", input))?;
            nanos += frac * nanos_per_unit / 10u128.pow(digits.len() as u32);
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| format!("duration {:?} overflows", input))?;
    }

    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| format!("duration {:?} overflows", input))?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}
