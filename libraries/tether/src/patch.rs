//! Shallow JSON object merges, the partial-update format used by every
//! mutator surface in this crate.

use serde_json::Value;

use crate::Record;

/// Merge `patch` into `record` at the top level and deserialize the result.
///
/// Returns `None` (logging, not erroring) when the patch is not a JSON object
/// or the merged document no longer deserializes as `R`. The `id` key is never
/// patchable; ids are stable for a record's lifetime.
pub fn shallow_merge<R: Record>(record: &R, patch: &Value) -> Option<R> {
    let Value::Object(patch_fields) = patch else {
        log::warn!("ignoring non-object patch: {patch}");
        return None;
    };

    let mut fields = match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            log::warn!("record did not serialize as an object: {other}");
            return None;
        }
        Err(e) => {
            log::warn!("record failed to serialize for patching: {e}");
            return None;
        }
    };

    for (key, value) in patch_fields {
        if key == "id" {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }

    match serde_json::from_value(Value::Object(fields)) {
        Ok(merged) => Some(merged),
        Err(e) => {
            log::warn!("dropping patch that no longer deserializes: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        title: String,
        pinned: bool,
    }

    impl Record for Note {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    fn note() -> Note {
        Note {
            id: "n1".into(),
            title: "pour slab".into(),
            pinned: false,
        }
    }

    #[test]
    fn merges_named_fields_and_keeps_the_rest() {
        let merged = shallow_merge(&note(), &json!({ "pinned": true })).unwrap();
        assert_eq!(merged.title, "pour slab");
        assert!(merged.pinned);
    }

    #[test]
    fn id_is_not_patchable() {
        let merged = shallow_merge(&note(), &json!({ "id": "hijacked" })).unwrap();
        assert_eq!(merged.id, "n1");
    }

    #[test]
    fn non_object_patch_is_dropped() {
        assert!(shallow_merge(&note(), &json!(42)).is_none());
    }

    #[test]
    fn patch_breaking_the_schema_is_dropped() {
        assert!(shallow_merge(&note(), &json!({ "pinned": "not-a-bool" })).is_none());
    }
}
