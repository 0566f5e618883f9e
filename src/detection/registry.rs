//! Signature registry: content hash to threat label lookups.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Builtin illustrative signature table.
///
/// Not a real AV feed; these exist so the engine has something to match
/// against out of the box.
const BUILTIN_SIGNATURES: &[(&str, &str)] = &[
    ("e99a18c428cb38d5f260853678922e03", "Trojan.Generic"),
    ("c157a79031e1c40f85931829bc5fc552", "Ransomware.WannaCry"),
    ("5f4dcc3b5aa765d61d8327deb882cf99", "Malware.Password"),
    ("25f9e794323b453885f5181f1b624d0b", "Trojan.Downloader"),
    ("827ccb0eea8a706c4c34a16891f84e7b", "Backdoor.Remote"),
    ("e10adc3949ba59abbe56e057f20f883e", "Keylogger.Common"),
    ("098f6bcd4621d373cade4e832627b4f6", "Worm.Network"),
];

/// A single hash signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    /// 128-bit content digest, lowercase hex
    pub hash: String,
    /// Human-readable threat label (e.g. "Trojan.Generic")
    pub label: String,
}

/// On-disk signature file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureFile {
    /// Database version (e.g. "2025.08.01")
    pub version: String,
    /// List of signatures; hashes must be unique
    pub signatures: Vec<Signature>,
}

impl SignatureFile {
    /// Load a signature file from JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::SignatureLoad(format!("Failed to parse signature file: {}", e)))
    }
}

/// Immutable hash-to-label registry with O(1) lookups.
///
/// Constructed once at startup; lookups are case-insensitive on the hex
/// digest. Share across workers via `Arc`.
#[derive(Debug, Clone)]
pub struct SignatureRegistry {
    by_hash: HashMap<String, String>,
}

impl SignatureRegistry {
    /// Create a registry from the builtin table.
    pub fn builtin() -> Self {
        let by_hash = BUILTIN_SIGNATURES
            .iter()
            .map(|(hash, label)| (hash.to_string(), label.to_string()))
            .collect();
        Self { by_hash }
    }

    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            by_hash: HashMap::new(),
        }
    }

    /// Build a registry from explicit signatures.
    pub fn from_signatures(signatures: impl IntoIterator<Item = Signature>) -> Self {
        let by_hash = signatures
            .into_iter()
            .map(|s| (s.hash.to_lowercase(), s.label))
            .collect();
        Self { by_hash }
    }

    /// Load a registry from a JSON signature file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = SignatureFile::load(path)?;
        log::info!(
            "Loaded {} signature(s) from {:?} (version {})",
            file.signatures.len(),
            path,
            file.version
        );
        Ok(Self::from_signatures(file.signatures))
    }

    /// Look up a content digest, returning the threat label on a match.
    pub fn lookup(&self, hash: &str) -> Option<&str> {
        if hash.bytes().any(|b| b.is_ascii_uppercase()) {
            return self
                .by_hash
                .get(&hash.to_lowercase())
                .map(String::as_str);
        }
        self.by_hash.get(hash).map(String::as_str)
    }

    /// Number of loaded signatures.
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    /// Whether the registry holds no signatures.
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_lookup() {
        let registry = SignatureRegistry::builtin();
        assert_eq!(registry.len(), 7);
        assert_eq!(
            registry.lookup("e99a18c428cb38d5f260853678922e03"),
            Some("Trojan.Generic")
        );
        assert_eq!(registry.lookup("0000000000000000000000000000dead"), None);
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let registry = SignatureRegistry::builtin();
        assert_eq!(
            registry.lookup("E99A18C428CB38D5F260853678922E03"),
            Some("Trojan.Generic")
        );
    }

    #[test]
    fn test_from_signatures_normalizes() {
        let registry = SignatureRegistry::from_signatures(vec![Signature {
            hash: "DEADBEEFDEADBEEFDEADBEEFDEADBEEF".to_string(),
            label: "Test.Malware".to_string(),
        }]);
        assert_eq!(
            registry.lookup("deadbeefdeadbeefdeadbeefdeadbeef"),
            Some("Test.Malware")
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "version": "2025.08.01",
                "signatures": [
                    {"hash": "098f6bcd4621d373cade4e832627b4f6", "label": "Worm.Network"}
                ]
            }"#,
        )
        .unwrap();

        let registry = SignatureRegistry::from_file(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup("098f6bcd4621d373cade4e832627b4f6"),
            Some("Worm.Network")
        );
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();

        let err = SignatureRegistry::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::SignatureLoad(_)));
    }
}
