//! Known-vulnerable software advisories.

use serde::{Deserialize, Serialize};

/// Builtin advisory table: lowercase name substring -> advisory text.
const BUILTIN_ADVISORIES: &[(&str, &str)] = &[
    (
        "adobe reader",
        "Multiple versions have critical vulnerabilities. Update to latest version.",
    ),
    (
        "java 8",
        "Older versions have remote code execution vulnerabilities.",
    ),
    (
        "internet explorer",
        "Legacy browser with security issues. Consider alternative browsers.",
    ),
    (
        "flash player",
        "Deprecated software with known vulnerabilities.",
    ),
    (
        "quicktime",
        "Deprecated software with security vulnerabilities.",
    ),
];

/// One advisory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advisory {
    /// Case-insensitive substring matched against product names
    pub name_contains: String,
    /// Advisory text attached to matching entries
    pub advisory: String,
}

/// Advisory table matched by product-name substring.
///
/// Like the signature registry this is loaded once and read-only afterwards.
#[derive(Debug, Clone)]
pub struct VulnerabilityAdvisories {
    entries: Vec<Advisory>,
}

impl VulnerabilityAdvisories {
    /// Create the builtin advisory table.
    pub fn builtin() -> Self {
        let entries = BUILTIN_ADVISORIES
            .iter()
            .map(|(name, advisory)| Advisory {
                name_contains: name.to_string(),
                advisory: advisory.to_string(),
            })
            .collect();
        Self { entries }
    }

    /// Build a table from explicit advisories.
    pub fn from_entries(entries: Vec<Advisory>) -> Self {
        let entries = entries
            .into_iter()
            .map(|mut a| {
                a.name_contains = a.name_contains.to_lowercase();
                a
            })
            .collect();
        Self { entries }
    }

    /// Find the advisory matching a product name, if any.
    pub fn lookup(&self, product_name: &str) -> Option<&str> {
        let name = product_name.to_lowercase();
        self.entries
            .iter()
            .find(|a| name.contains(&a.name_contains))
            .map(|a| a.advisory.as_str())
    }

    /// Number of advisories in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for VulnerabilityAdvisories {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let advisories = VulnerabilityAdvisories::builtin();
        assert_eq!(advisories.len(), 5);
    }

    #[test]
    fn test_lookup_substring_match() {
        let advisories = VulnerabilityAdvisories::builtin();

        let hit = advisories.lookup("Adobe Reader DC 2023");
        assert!(hit.is_some());
        assert!(hit.unwrap().contains("critical vulnerabilities"));

        assert!(advisories.lookup("Mozilla Firefox").is_none());
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let advisories = VulnerabilityAdvisories::builtin();
        assert!(advisories.lookup("QUICKTIME 7").is_some());
    }

    #[test]
    fn test_custom_entries() {
        let advisories = VulnerabilityAdvisories::from_entries(vec![Advisory {
            name_contains: "Legacy Agent".to_string(),
            advisory: "Unsupported; remove it.".to_string(),
        }]);
        assert_eq!(
            advisories.lookup("legacy agent 1.0"),
            Some("Unsupported; remove it.")
        );
    }
}
