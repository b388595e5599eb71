use std::collections::BTreeMap;

use serde_json::Value;

/// Sentinel returned for any field the extraction backend did not supply.
pub const UNKNOWN: &str = "unknown";

/// Canonical field names the rest of the pipeline looks up.
pub const CANONICAL_KEYS: &[&str] = &[
    "SourceFile",
    "CreateDate",
    "ImageDescription",
    "Model",
    "GPSLatitude",
    "GPSLatitudeRef",
    "GPSLongitude",
    "GPSLongitudeRef",
    "GPSAltitude",
    "GPSAltitudeRef",
    "GPSImgDirection",
    "GPSImgDirectionRef",
];

/// Fields that stand in for a canonical key when that key itself is absent.
const ALIASES: &[(&str, &str)] = &[("DateTimeOriginal", "CreateDate")];

/// Canonical per-file metadata. Lookups never fail: a missing key resolves
/// to the `"unknown"` sentinel.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    fields: BTreeMap<String, String>,
}

impl Metadata {
    /// Value for `key`, or the `"unknown"` sentinel if absent.
    pub fn get(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or(UNKNOWN)
    }

    /// Value for `key` only if the backend actually supplied it.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Normalize one raw extraction record into canonical `Metadata`.
///
/// Backends key fields differently: flat (`CreateDate`), group-prefixed
/// (`EXIF:CreateDate`, exiftool `-G`) or space-namespaced
/// (`EXIF DateTimeOriginal`). The last segment is taken as the field name;
/// a flat key already present wins over a namespaced variant of the same
/// field. Scalar values are stringified; arrays and objects are skipped.
pub fn normalize(raw: &serde_json::Map<String, Value>) -> Metadata {
    let mut meta = Metadata::default();

    for (key, value) in raw {
        let Some(text) = scalar_to_string(value) else {
            continue;
        };
        let name = field_name(key);
        if name == key || meta.lookup(name).is_none() {
            meta.insert(name, &text);
        }
    }

    for (alias, canonical) in ALIASES {
        if meta.lookup(canonical).is_none() {
            if let Some(value) = meta.lookup(alias).map(str::to_string) {
                meta.insert(canonical, &value);
            }
        }
    }

    meta
}

/// Strip a `Group:` or `Group ` namespace prefix from a raw key.
fn field_name(key: &str) -> &str {
    key.rsplit(|c| c == ':' || c == ' ').next().unwrap_or(key)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_missing_key_yields_sentinel() {
        let meta = normalize(&raw(json!({"Model": "Canon EOS 5D"})));
        assert_eq!(meta.get("Model"), "Canon EOS 5D");
        assert_eq!(meta.get("CreateDate"), UNKNOWN);
        assert_eq!(meta.lookup("CreateDate"), None);
    }

    #[test]
    fn test_namespaced_keys_normalize() {
        let meta = normalize(&raw(json!({
            "EXIF:CreateDate": "2019:05:09 15:47:33",
            "EXIF GPSLatitudeRef": "N",
        })));
        assert_eq!(meta.get("CreateDate"), "2019:05:09 15:47:33");
        assert_eq!(meta.get("GPSLatitudeRef"), "N");
    }

    #[test]
    fn test_flat_key_wins_over_namespaced() {
        let meta = normalize(&raw(json!({
            "CreateDate": "2019:05:09 15:47:33",
            "QuickTime:CreateDate": "2001:01:01 00:00:00",
        })));
        assert_eq!(meta.get("CreateDate"), "2019:05:09 15:47:33");
    }

    #[test]
    fn test_datetimeoriginal_aliases_createdate() {
        let meta = normalize(&raw(json!({
            "EXIF DateTimeOriginal": "2019:05:09 15:47:33",
        })));
        assert_eq!(meta.get("CreateDate"), "2019:05:09 15:47:33");

        // An explicit CreateDate is not displaced by the alias.
        let meta = normalize(&raw(json!({
            "CreateDate": "2020:01:02 03:04:05",
            "DateTimeOriginal": "2019:05:09 15:47:33",
        })));
        assert_eq!(meta.get("CreateDate"), "2020:01:02 03:04:05");
    }

    #[test]
    fn test_scalars_stringified() {
        let meta = normalize(&raw(json!({
            "GPSAltitude": 57.2,
            "GPSImgDirection": 181,
            "SubjectArea": [1, 2, 3],
        })));
        assert_eq!(meta.get("GPSAltitude"), "57.2");
        assert_eq!(meta.get("GPSImgDirection"), "181");
        assert_eq!(meta.lookup("SubjectArea"), None);
    }
}
