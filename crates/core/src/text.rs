//! Key Normalization Helpers
//!
//! Small string-normalization functions shared by the ledger, the file
//! resolver, and the join-admission engine. Keeping them in one place
//! guarantees that a dataset slug computed for a filename match is the
//! same slug used for the namespaced merge columns.

/// Normalize a display name into a filesystem/column-safe slug.
///
/// Alphanumerics are lowercased; every other character collapses to an
/// underscore; leading/trailing underscores are trimmed.
/// `"Housing Cost (HUD)"` becomes `"housing_cost__hud_"` trimmed to
/// `"housing_cost__hud"`.
pub fn slug(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    mapped.trim_matches('_').to_string()
}

/// Normalize a county display value for joining: lowercase, strip a
/// trailing " county" suffix, trim whitespace.
pub fn normalize_county_name(value: &str) -> String {
    value.to_lowercase().replace(" county", "").trim().to_string()
}

/// Zero-pad a numeric FIPS code to the standard 5-digit width.
pub fn pad_fips(value: i64) -> String {
    format!("{:05}", value)
}
