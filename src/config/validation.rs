//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse approach: first parse raw TOML into `toml::Value`, walk
//! the key tree, compare against known field names, and emit warnings with
//! "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.
//!
//! Arrays of tables (`[[engines]]`) are walked per element without an index,
//! so `engines.rpm.fast` is the key for every engine's fast threshold.

use std::collections::HashSet;

/// A non-fatal config warning (typo, unknown section).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for ServiceConfig.
///
/// Maintained by hand to match the struct hierarchy in service_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [service]
        "service",
        "service.name",
        "service.data_dir",
        "service.state_retention_days",
        // [timing]
        "timing",
        "timing.sweep_interval_secs",
        "timing.snapshot_interval_secs",
        // [debounce]
        "debounce",
        "debounce.stability_threshold",
        // [[engines]]
        "engines",
        "engines.id",
        "engines.rpm_sensor",
        "engines.oil_sensor",
        "engines.temp_sensor",
        "engines.running_threshold_rpm",
        "engines.run_grace_secs",
        "engines.stop_grace_secs",
        "engines.pressure_when_closed",
        "engines.stability_threshold",
        "engines.rpm",
        "engines.rpm.slow",
        "engines.rpm.normal",
        "engines.rpm.fast",
        "engines.rpm.too_fast",
        "engines.temperature",
        "engines.temperature.hot",
        "engines.temperature.too_hot",
        // [[pumps]]
        "pumps",
        "pumps.id",
        "pumps.switch_sensor",
        "pumps.on_too_long_secs",
        "pumps.off_too_long_secs",
        // [[tanks]]
        "tanks",
        "tanks.id",
        "tanks.level_sensor",
        "tanks.group",
        "tanks.min_distance",
        "tanks.max_distance",
        "tanks.settle_secs",
        "tanks.stability_threshold",
        "tanks.levels",
        "tanks.levels.very_low",
        "tanks.levels.low",
        "tanks.levels.ok",
        "tanks.levels.full",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// Key Walking
// ============================================================================

/// Recursively collect dotted key paths from a TOML value.
///
/// Tables inside arrays contribute their keys under the array's path.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        keys.extend(walk_toml_keys(item, &path));
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == *cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the alphabetically first key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

/// First pass of config loading: warn about keys no struct field accepts.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let mut seen = HashSet::new();
    let mut warnings = Vec::new();

    for key in walk_toml_keys(&value, "") {
        if known.contains(key.as_str()) || !seen.insert(key.clone()) {
            continue;
        }
        let suggestion = suggest_correction(&key, &known);
        warnings.push(ValidationWarning {
            message: format!("Unknown config key '{key}'"),
            field: key,
            suggestion,
        });
    }

    warnings
}
