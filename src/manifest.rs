//! Manifest describing the files exposed by the mount
//!
//! The manifest is a JSON (or YAML) array of entries. Each entry maps a
//! virtual path to the on-disk ciphertext that backs it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// File-type bits of a mode
pub const S_IFMT: u32 = 0o170000;

/// Regular file type bits
pub const S_IFREG: u32 = 0o100000;

/// One advertised virtual file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Virtual path exposed to clients
    #[serde(alias = "Name")]
    pub name: String,

    /// On-disk ciphertext location (never exposed)
    #[serde(alias = "File")]
    pub file: PathBuf,

    /// File mode, including type bits
    #[serde(alias = "Mode", with = "mode_serde")]
    pub mode: u32,

    /// Owner override
    #[serde(alias = "Owner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<u32>,

    /// Group override
    #[serde(alias = "Group", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
}

impl ManifestEntry {
    /// Create an entry without owner/group overrides
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            mode,
            owner: None,
            group: None,
        }
    }

    /// Normalised path components of the virtual name
    ///
    /// Leading `/` and `.` are dropped and `..` removes the previous
    /// component. A name that escapes the root or normalises to nothing is
    /// rejected.
    pub fn components(&self) -> Result<Vec<String>> {
        let mut parts: Vec<String> = Vec::new();

        for component in Path::new(&self.name).components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(Error::Manifest(format!(
                            "entry {:?} escapes the mount root",
                            self.name
                        )));
                    }
                }
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::Prefix(_) => {
                    return Err(Error::Manifest(format!(
                        "entry {:?} has an unsupported path prefix",
                        self.name
                    )));
                }
            }
        }

        if parts.is_empty() {
            return Err(Error::Manifest(format!(
                "entry {:?} has an empty virtual path",
                self.name
            )));
        }

        Ok(parts)
    }

    /// Mode with regular-file type bits applied
    ///
    /// A mode without type bits is taken as a regular file.
    pub fn file_mode(&self) -> Result<u32> {
        match self.mode & S_IFMT {
            0 => Ok(self.mode | S_IFREG),
            S_IFREG => Ok(self.mode),
            other => Err(Error::Manifest(format!(
                "entry {:?} has non-regular file type {:o}",
                self.name, other
            ))),
        }
    }

    /// Permission bits only
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }

    fn validate(&self) -> Result<()> {
        self.components()?;
        self.file_mode()?;
        if self.file.as_os_str().is_empty() {
            return Err(Error::Manifest(format!(
                "entry {:?} has an empty backing file path",
                self.name
            )));
        }
        Ok(())
    }
}

/// The full list of entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Load a manifest from disk
    ///
    /// `.yaml` and `.yml` files are parsed as YAML, everything else as JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Manifest(format!("Failed to read manifest {:?}: {}", path, e))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    /// Parse and validate a JSON manifest
    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(content)
            .map_err(|e| Error::Manifest(format!("Failed to parse manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate a YAML manifest
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content)
            .map_err(|e| Error::Manifest(format!("Failed to parse manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate every entry
    pub fn validate(&self) -> Result<()> {
        self.entries.iter().try_for_each(ManifestEntry::validate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mode serialization: accepts a number or an octal string
mod mode_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMode {
        Number(u32),
        Text(String),
    }

    pub fn serialize<S>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(*mode)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawMode::deserialize(deserializer)? {
            RawMode::Number(mode) => Ok(mode),
            RawMode::Text(text) => {
                let text = text.trim();
                let digits = text.strip_prefix("0o").unwrap_or(text);
                u32::from_str_radix(digits, 8).map_err(|_| {
                    serde::de::Error::custom(format!("invalid octal mode {:?}", text))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_manifest() {
        let manifest = Manifest::from_json(
            r#"[
                {"name": "secrets/db.txt", "file": "/data/db.txt.age", "mode": 33056},
                {"name": "token", "file": "/data/token.age", "mode": 33024, "owner": 0, "group": 42}
            ]"#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.entries[0].mode, 0o100440);
        assert_eq!(manifest.entries[0].owner, None);
        assert_eq!(manifest.entries[1].owner, Some(0));
        assert_eq!(manifest.entries[1].group, Some(42));
    }

    #[test]
    fn test_capitalised_field_names() {
        let manifest = Manifest::from_json(
            r#"[{"Name": "a.txt", "File": "/x/a.age", "Mode": 33188, "Owner": 1000}]"#,
        )
        .unwrap();
        assert_eq!(manifest.entries[0].name, "a.txt");
        assert_eq!(manifest.entries[0].owner, Some(1000));
    }

    #[test]
    fn test_octal_string_mode() {
        let manifest = Manifest::from_json(
            r#"[{"name": "a", "file": "/a.age", "mode": "0100440"},
                {"name": "b", "file": "/b.age", "mode": "0o600"}]"#,
        )
        .unwrap();
        assert_eq!(manifest.entries[0].mode, 0o100440);
        assert_eq!(manifest.entries[1].mode, 0o600);
        assert_eq!(manifest.entries[1].file_mode().unwrap(), 0o100600);
    }

    #[test]
    fn test_missing_mode_is_rejected() {
        let result = Manifest::from_json(r#"[{"name": "a", "file": "/a.age"}]"#);
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        assert!(matches!(Manifest::from_json("{not json"), Err(Error::Manifest(_))));
        assert!(matches!(
            Manifest::from_json(r#"[{"name": "a", "file": "/a.age", "mode": "rw-"}]"#),
            Err(Error::Manifest(_))
        ));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        for name in ["", "/", ".", "a/.."] {
            let entry = ManifestEntry::new(name, "/a.age", 0o100400);
            assert!(entry.components().is_err(), "name {:?} should be rejected", name);
        }
    }

    #[test]
    fn test_name_normalisation() {
        let entry = ManifestEntry::new("/a/./b/../c.txt", "/c.age", 0o100400);
        assert_eq!(entry.components().unwrap(), vec!["a", "c.txt"]);

        let escaping = ManifestEntry::new("../etc/passwd", "/p.age", 0o100400);
        assert!(escaping.components().is_err());
    }

    #[test]
    fn test_non_regular_mode_is_rejected() {
        let result = Manifest::from_json(r#"[{"name": "d", "file": "/d.age", "mode": 16877}]"#);
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_perm_strips_type_bits() {
        let entry = ManifestEntry::new("a", "/a.age", 0o100440);
        assert_eq!(entry.perm(), 0o440);
    }

    #[test]
    fn test_load_yaml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        std::fs::write(
            &path,
            "- name: secrets/api.key\n  file: /data/api.key.age\n  mode: \"0100400\"\n  group: 7\n",
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.entries[0].name, "secrets/api.key");
        assert_eq!(manifest.entries[0].mode, 0o100400);
        assert_eq!(manifest.entries[0].group, Some(7));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Manifest::load("/nonexistent/manifest.json");
        assert!(matches!(result, Err(Error::Manifest(_))));
    }
}
