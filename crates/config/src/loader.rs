use std::{path::Path, str::FromStr};

use anyhow::bail;
use indoc::formatdoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use std::fmt::Write;
use toml::Value;

use crate::{AdmissionConfig, Config};

/// Fields whose absence must never prevent startup. When their environment variable is
/// missing, the whole table named by the second element is dropped and defaults apply.
const OPTIONAL_ENV_FIELDS: &[(&str, &str)] = &[("admission.storage.url", "admission.storage")];

/// Check if the error is specifically about a missing environment variable
fn is_missing_env_var_error<E: std::fmt::Display>(err: &E) -> bool {
    let err_str = err.to_string().to_lowercase();
    err_str.contains("environment variable not found")
        || err_str.contains("env var")
        || (err_str.contains("variable") && err_str.contains("not found"))
}

/// Extract the path from an error message like "Failed to expand dynamic string at path 'path': error"
fn extract_path_from_error(error_message: &str) -> Option<String> {
    let start = error_message.find("path '")? + 6;
    let end = error_message[start..].find("':")?;

    Some(error_message[start..start + end].to_string())
}

/// Remove a field from the TOML configuration by path
fn remove_field_from_config(config: &mut Value, path: &str) {
    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };

    let mut current = config;

    for part in parents.into_iter().flat_map(|p| p.split('.')) {
        match current.as_table_mut().and_then(|table| table.get_mut(part)) {
            Some(value) => current = value,
            None => return,
        }
    }

    if let Some(table) = current.as_table_mut() {
        table.remove(last);
        log::debug!("Removed '{path}' due to a missing environment variable");
    }
}

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let raw_config: Value = toml::from_str(&content)?;

    load_from_value(raw_config)
}

pub(crate) fn load_from_value(mut raw_config: Value) -> anyhow::Result<Config> {
    loop {
        let result = expand_dynamic_strings(&mut Vec::new(), &mut raw_config);

        let Err(err) = result else {
            break;
        };

        let optional = extract_path_from_error(&err.to_string())
            .and_then(|path| OPTIONAL_ENV_FIELDS.iter().find(|(field, _)| *field == path))
            .filter(|_| is_missing_env_var_error(&err));

        let Some((field, table)) = optional else {
            return Err(err);
        };

        log::warn!("Environment variable for '{field}' is not set, falling back to in-memory admission counters");
        remove_field_from_config(&mut raw_config, table);
    }

    let config = Config::deserialize(raw_config)?;
    validate_admission(&config.admission)?;

    Ok(config)
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();
                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]")?,
                    }
                }
                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

/// Validates the window policies. Every ceiling and every window must be non-zero.
pub(crate) fn validate_admission(config: &AdmissionConfig) -> anyhow::Result<()> {
    if config.tiers.is_empty() {
        bail!("At least one tier must be configured in [admission.tiers]");
    }

    for (id, tier) in &config.tiers {
        if tier.limit == 0 {
            bail!("Tier '{id}' must have a limit greater than zero");
        }

        if tier.window.is_zero() {
            bail!("Tier '{id}' must have a window greater than zero");
        }
    }

    if !config.tiers.contains_key(&config.default_tier) {
        let known = config.tiers.keys().map(String::as_str).collect::<Vec<_>>().join(", ");

        bail!(formatdoc! {r#"
            Default tier '{default}' is not configured. Known tiers: {known}.

            Either add it:

              [admission.tiers.{default}]
              limit = 100
              window = "15m"

            or point default_tier at one of the known tiers.
        "#, default = config.default_tier});
    }

    if config.burst.enabled && (config.burst.limit == 0 || config.burst.window.is_zero()) {
        bail!("The burst guard must have a limit and a window greater than zero");
    }

    Ok(())
}
