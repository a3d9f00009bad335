//! Parameter sweep generation
//!
//! Expands the `sweep` section of a config into one config per combination
//! of strategy parameter values.

use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::warn;

use crate::Config;

/// Generate all config combinations from sweep parameters
///
/// Keys are taken in sorted order, so the combination order is stable. A
/// config without a sweep section yields itself.
pub fn generate_sweep_configs(config: &Config) -> Vec<Config> {
    let sweep = match &config.sweep {
        Some(s) if !s.is_empty() => s,
        _ => return vec![config.clone()],
    };

    sweep
        .values()
        .map(|values| values.iter())
        .multi_cartesian_product()
        .map(|combo| {
            let mut cfg = config.clone();
            for (key, value) in sweep.keys().zip(combo) {
                cfg.set_strategy_param(key, value.clone());
            }
            cfg
        })
        .collect()
}

/// Get total number of sweep combinations
pub fn total_combinations(config: &Config) -> usize {
    match &config.sweep {
        Some(sweep) if !sweep.is_empty() => sweep.values().map(|v| v.len()).product(),
        _ => 1,
    }
}

/// Parse a CLI override of the form `param=val1,val2,val3`
pub fn parse_sweep_override(s: &str) -> Option<(String, Vec<serde_json::Value>)> {
    let (key, raw_values) = s.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let values: Vec<serde_json::Value> = raw_values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            // Numbers first, then booleans, then plain strings
            if let Ok(n) = v.parse::<i64>() {
                serde_json::json!(n)
            } else if let Ok(n) = v.parse::<f64>() {
                serde_json::json!(n)
            } else if let Ok(b) = v.parse::<bool>() {
                serde_json::json!(b)
            } else {
                serde_json::json!(v)
            }
        })
        .collect();

    if values.is_empty() {
        None
    } else {
        Some((key.to_string(), values))
    }
}

/// Apply CLI overrides to the config's sweep section
pub fn apply_overrides(config: &mut Config, overrides: &[String]) {
    for override_str in overrides {
        match parse_sweep_override(override_str) {
            Some((key, values)) => {
                config
                    .sweep
                    .get_or_insert_with(BTreeMap::new)
                    .insert(key, values);
            }
            None => warn!(value = %override_str, "Ignoring malformed sweep override"),
        }
    }
}

/// Numeric strategy params for reporting (booleans as 0/1)
pub fn extract_params(config: &Config) -> BTreeMap<String, f64> {
    config
        .strategy
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| {
                    let n = v
                        .as_f64()
                        .or_else(|| v.as_bool().map(|b| if b { 1.0 } else { 0.0 }))?;
                    Some((k.clone(), n))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Format params for display
pub fn format_params(params: &BTreeMap<String, f64>) -> String {
    params
        .iter()
        .map(|(k, v)| {
            if v.fract() == 0.0 && v.abs() < 1e9 {
                format!("{}={}", k, *v as i64)
            } else {
                format!("{}={}", k, v)
            }
        })
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_with_sweep(entries: &[(&str, Vec<serde_json::Value>)]) -> Config {
        let mut config = Config::default();
        let sweep = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        config.sweep = Some(sweep);
        config
    }

    #[test]
    fn test_no_sweep_yields_base_config() {
        let config = Config::default();
        assert_eq!(generate_sweep_configs(&config).len(), 1);
        assert_eq!(total_combinations(&config), 1);
    }

    #[test]
    fn test_cartesian_product() {
        let config = config_with_sweep(&[
            ("step_percent", vec![json!(0.05), json!(0.1)]),
            ("bottom", vec![json!(8.0), json!(10.0), json!(12.0)]),
        ]);
        let configs = generate_sweep_configs(&config);
        assert_eq!(configs.len(), 6);
        assert_eq!(total_combinations(&config), 6);

        // Sorted keys: bottom varies slowest
        assert_eq!(configs[0].strategy["bottom"], json!(8.0));
        assert_eq!(configs[0].strategy["step_percent"], json!(0.05));
        assert_eq!(configs[1].strategy["step_percent"], json!(0.1));
        assert_eq!(configs[5].strategy["bottom"], json!(12.0));
        // Untouched params survive
        assert_eq!(configs[3].strategy["top"], json!(20.0));
    }

    #[test]
    fn test_parse_override() {
        let (key, values) = parse_sweep_override("lot_size=100, 200").unwrap();
        assert_eq!(key, "lot_size");
        assert_eq!(values, vec![json!(100), json!(200)]);

        let (_, values) = parse_sweep_override("order_type=market,limit").unwrap();
        assert_eq!(values, vec![json!("market"), json!("limit")]);

        let (_, values) = parse_sweep_override("log_enabled=false").unwrap();
        assert_eq!(values, vec![json!(false)]);

        assert!(parse_sweep_override("step_percent").is_none());
        assert!(parse_sweep_override("step_percent=").is_none());
        assert!(parse_sweep_override("=0.1").is_none());
    }

    #[test]
    fn test_apply_overrides_replaces_entries() {
        let mut config = config_with_sweep(&[("step_percent", vec![json!(0.05)])]);
        apply_overrides(
            &mut config,
            &["step_percent=0.1,0.2".to_string(), "top=25".to_string()],
        );
        assert_eq!(total_combinations(&config), 2);
        assert_eq!(config.sweep.as_ref().unwrap()["top"], vec![json!(25)]);
    }

    #[test]
    fn test_extract_and_format_params() {
        let params = extract_params(&Config::default());
        assert_eq!(params["top"], 20.0);
        assert_eq!(params["log_enabled"], 1.0);
        assert!(!params.contains_key("order_type"));

        let formatted = format_params(&params);
        assert!(formatted.contains("step_percent=0.1"));
        assert!(formatted.contains("lot_size=200"));
    }
}
