//! Domain types for build snapshots.
//!
//! A [`BuildSnapshot`] is the complete known state of one build. A
//! [`BuildUpdate`] is what the remote build system reports about it: every
//! field is optional so "not reported" stays distinct from "reported empty".
//!
//! Wire keys follow the data store's camelCase naming (`objectId`,
//! `commitSha`, `finishedAtTime`, ...). Keys this crate does not model are
//! carried through in `extra` so persisted and pushed records stay complete.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Status tag held by a build whose run failed.
pub const FAILED: &str = "failed";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a build record, stable across snapshots of the same build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub String);

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BuildId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BuildId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a user record. Realtime pushes are addressed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// The lifecycle tags a build currently holds.
///
/// Equality is order-independent. Accepted on the wire as a tag array or a
/// single tag string; always written as an array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct StatusSet(BTreeSet<String>);

impl StatusSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// True when the set holds the [`FAILED`] tag.
    pub fn is_failed(&self) -> bool {
        self.contains(FAILED)
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for StatusSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.iter().collect();
        f.write_str(&tags.join(","))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for StatusSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match StatusRepr::deserialize(deserializer)? {
            StatusRepr::One(tag) if tag.is_empty() => StatusSet::new(),
            StatusRepr::One(tag) => std::iter::once(tag).collect(),
            StatusRepr::Many(tags) => tags.into_iter().collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Pointer to the user that owns a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "objectId")]
    pub object_id: ObjectId,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl UserRef {
    pub fn new(object_id: impl Into<ObjectId>) -> Self {
        Self {
            object_id: object_id.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// The complete known state of one build at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSnapshot {
    #[serde(rename = "objectId", alias = "id")]
    pub id: BuildId,
    #[serde(default)]
    pub status: StatusSet,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub is_invalid: bool,
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default)]
    pub finished_at_time: Option<DateTime<Utc>>,
    pub user: UserRef,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The remote build system's current view of a build.
///
/// `None` means the remote did not report the field. `finished_at_time` is
/// nullable upstream, so it distinguishes absent (`None`) from an explicit
/// `null` (`Some(None)`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildUpdate {
    /// Echoed identifier, if the remote reports one. Never merged.
    #[serde(
        default,
        rename = "objectId",
        alias = "id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<BuildId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_invalid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Maps a present key to `Some`, including an explicit `null`. Absent keys
/// fall back to `#[serde(default)]`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn newtype_display() {
        assert_eq!(BuildId::from("b-01").to_string(), "b-01");
        assert_eq!(ObjectId::from("u-01").to_string(), "u-01");
    }

    #[test]
    fn status_equality_ignores_order() {
        let a: StatusSet = ["running", "queued"].into_iter().collect();
        let b: StatusSet = ["queued", "running"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "queued,running");
    }

    #[test]
    fn status_accepts_single_string() {
        let status: StatusSet = serde_json::from_value(json!("failed")).expect("status");
        assert!(status.is_failed());
        assert_eq!(status.len(), 1);

        let empty: StatusSet = serde_json::from_value(json!("")).expect("status");
        assert!(empty.is_empty());
    }

    #[test]
    fn status_serializes_as_array() {
        let status: StatusSet = ["success"].into_iter().collect();
        assert_eq!(serde_json::to_value(&status).expect("ser"), json!(["success"]));
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let absent: BuildUpdate = serde_json::from_value(json!({})).expect("absent");
        assert_eq!(absent.finished_at_time, None);

        let null: BuildUpdate =
            serde_json::from_value(json!({ "finishedAtTime": null })).expect("null");
        assert_eq!(null.finished_at_time, Some(None));

        let set: BuildUpdate =
            serde_json::from_value(json!({ "finishedAtTime": "2014-02-08T10:00:00Z" }))
                .expect("set");
        assert!(matches!(set.finished_at_time, Some(Some(_))));
    }

    #[test]
    fn snapshot_keeps_unknown_keys() {
        let snapshot: BuildSnapshot = serde_json::from_value(json!({
            "objectId": "b1",
            "status": ["running"],
            "name": "web",
            "user": { "__type": "Pointer", "className": "_User", "objectId": "u1" }
        }))
        .expect("snapshot");
        assert_eq!(snapshot.extra.get("name"), Some(&json!("web")));
        assert_eq!(snapshot.user.object_id, ObjectId::from("u1"));
        assert_eq!(snapshot.user.extra.get("className"), Some(&json!("_User")));

        let back = serde_json::to_value(&snapshot).expect("ser");
        assert_eq!(back["name"], json!("web"));
        assert_eq!(back["objectId"], json!("b1"));
    }
}
