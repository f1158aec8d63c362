//! Snapshot parsing and merging.
//!
//! Both operations are pure: parsing turns a serialized previous snapshot
//! into a [`BuildSnapshot`], and [`merge`] folds a remote [`BuildUpdate`]
//! over it.

use crate::error::ParseError;
use crate::types::{BuildSnapshot, BuildUpdate};

impl BuildSnapshot {
    /// Parse a serialized previous snapshot.
    ///
    /// The payload must carry a non-empty `objectId` and a `user.objectId`.
    pub fn parse(payload: &str) -> Result<Self, ParseError> {
        let snapshot: BuildSnapshot = serde_json::from_str(payload)?;
        if snapshot.id.0.trim().is_empty() {
            return Err(ParseError::MissingId);
        }
        if snapshot.user.object_id.0.trim().is_empty() {
            return Err(ParseError::MissingUser { build: snapshot.id });
        }
        Ok(snapshot)
    }

    /// Serialize back into the payload form [`BuildSnapshot::parse`] accepts.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl BuildUpdate {
    /// Parse a remote update. Omitted keys stay `None`.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Right-biased merge of `update` over `previous`.
///
/// Every field the update reports wins; everything else is kept from
/// `previous`. The build id always comes from `previous`.
pub fn merge(previous: &BuildSnapshot, update: &BuildUpdate) -> BuildSnapshot {
    let mut extra = previous.extra.clone();
    for (key, value) in &update.extra {
        extra.insert(key.clone(), value.clone());
    }

    BuildSnapshot {
        id: previous.id.clone(),
        status: update
            .status
            .clone()
            .unwrap_or_else(|| previous.status.clone()),
        branch: update
            .branch
            .clone()
            .unwrap_or_else(|| previous.branch.clone()),
        is_invalid: update.is_invalid.unwrap_or(previous.is_invalid),
        commit_sha: update
            .commit_sha
            .clone()
            .unwrap_or_else(|| previous.commit_sha.clone()),
        finished_at_time: update
            .finished_at_time
            .unwrap_or(previous.finished_at_time),
        user: update.user.clone().unwrap_or_else(|| previous.user.clone()),
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuildId, StatusSet, UserRef};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn previous() -> BuildSnapshot {
        BuildSnapshot {
            id: BuildId::from("b1"),
            status: ["running"].into_iter().collect(),
            branch: "main".to_string(),
            is_invalid: false,
            commit_sha: "abc123".to_string(),
            finished_at_time: Some(Utc.with_ymd_and_hms(2014, 2, 8, 10, 0, 0).unwrap()),
            user: UserRef::new("u1"),
            extra: [("name".to_string(), json!("web"))].into_iter().collect(),
        }
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = BuildSnapshot::parse("{not json").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)), "got: {err}");
    }

    #[test]
    fn parse_rejects_missing_user() {
        let err = BuildSnapshot::parse(r#"{"objectId":"b1","status":["running"]}"#).unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)), "got: {err}");
    }

    #[test]
    fn parse_rejects_blank_ids() {
        let err = BuildSnapshot::parse(r#"{"objectId":" ","user":{"objectId":"u1"}}"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingId));

        let err = BuildSnapshot::parse(r#"{"objectId":"b1","user":{"objectId":""}}"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingUser { .. }));
        assert!(err.to_string().contains("b1"));
    }

    #[test]
    fn parse_accepts_id_alias_and_defaults() {
        let snapshot = BuildSnapshot::parse(r#"{"id":"b1","user":{"objectId":"u1"}}"#)
            .expect("parse");
        assert_eq!(snapshot.id, BuildId::from("b1"));
        assert!(snapshot.status.is_empty());
        assert!(!snapshot.is_invalid);
        assert_eq!(snapshot.finished_at_time, None);
    }

    #[test]
    fn payload_roundtrips_through_parse() {
        let prev = previous();
        let payload = prev.to_payload().expect("payload");
        assert_eq!(BuildSnapshot::parse(&payload).expect("parse"), prev);
    }

    #[test]
    fn empty_update_keeps_everything() {
        let prev = previous();
        assert_eq!(merge(&prev, &BuildUpdate::default()), prev);
    }

    #[test]
    fn reported_fields_win() {
        let prev = previous();
        let finished = Utc.with_ymd_and_hms(2014, 2, 8, 11, 30, 0).unwrap();
        let update = BuildUpdate {
            status: Some(["failed"].into_iter().collect()),
            branch: Some("release".to_string()),
            is_invalid: Some(true),
            commit_sha: Some("def456".to_string()),
            finished_at_time: Some(Some(finished)),
            ..BuildUpdate::default()
        };

        let merged = merge(&prev, &update);
        assert_eq!(merged.status, ["failed"].into_iter().collect::<StatusSet>());
        assert_eq!(merged.branch, "release");
        assert!(merged.is_invalid);
        assert_eq!(merged.commit_sha, "def456");
        assert_eq!(merged.finished_at_time, Some(finished));
        assert_eq!(merged.user, prev.user);
    }

    #[test]
    fn explicit_null_clears_finished_time() {
        let prev = previous();
        let update = BuildUpdate {
            finished_at_time: Some(None),
            ..BuildUpdate::default()
        };
        assert_eq!(merge(&prev, &update).finished_at_time, None);
    }

    #[test]
    fn merge_never_changes_id() {
        let prev = previous();
        let update = BuildUpdate {
            id: Some(BuildId::from("someone-else")),
            ..BuildUpdate::default()
        };
        assert_eq!(merge(&prev, &update).id, prev.id);
    }

    #[test]
    fn extra_keys_merge_right_biased() {
        let prev = previous();
        let update = BuildUpdate {
            extra: [
                ("name".to_string(), json!("web-app")),
                ("url".to_string(), json!("https://ci.example/b1")),
            ]
            .into_iter()
            .collect(),
            ..BuildUpdate::default()
        };
        let merged = merge(&prev, &update);
        assert_eq!(merged.extra.get("name"), Some(&json!("web-app")));
        assert_eq!(merged.extra.get("url"), Some(&json!("https://ci.example/b1")));
    }
}
