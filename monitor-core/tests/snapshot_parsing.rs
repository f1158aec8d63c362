//! Payload parsing and merge tests against realistic data-store records.
//!
//! Each `#[case]` is isolated; no shared state.

use monitor_core::{merge, BuildId, BuildSnapshot, BuildUpdate, ParseError, StatusSet};
use rstest::rstest;

const STORED_BUILD: &str = r#"{
    "objectId": "Xk3fP0aQ",
    "createdAt": "2014-02-08T09:58:12.000Z",
    "name": "project-monitor",
    "type": "travis",
    "status": ["running"],
    "branch": "master",
    "isInvalid": false,
    "commitSha": "3f2a9c1",
    "finishedAtTime": null,
    "user": { "__type": "Pointer", "className": "_User", "objectId": "u9Rr2" }
}"#;

// ---------------------------------------------------------------------------
// 1. Parsing
// ---------------------------------------------------------------------------

#[test]
fn stored_build_parses() {
    let build = BuildSnapshot::parse(STORED_BUILD).expect("parse");
    assert_eq!(build.id, BuildId::from("Xk3fP0aQ"));
    assert_eq!(build.status, ["running"].into_iter().collect::<StatusSet>());
    assert_eq!(build.branch, "master");
    assert_eq!(build.finished_at_time, None);
    assert_eq!(build.user.object_id.0, "u9Rr2");
    assert!(build.extra.contains_key("createdAt"));
}

#[rstest]
#[case::empty("")]
#[case::not_an_object("[1, 2, 3]")]
#[case::truncated(r#"{"objectId": "b1", "user": {"objectId""#)]
#[case::bad_timestamp(r#"{"objectId":"b1","finishedAtTime":"yesterday","user":{"objectId":"u1"}}"#)]
#[case::bad_flag(r#"{"objectId":"b1","isInvalid":"no","user":{"objectId":"u1"}}"#)]
fn malformed_payloads_are_rejected(#[case] payload: &str) {
    let err = BuildSnapshot::parse(payload).unwrap_err();
    assert!(matches!(err, ParseError::Malformed(_)), "got: {err}");
}

#[rstest]
#[case::array(r#"["failed", "running"]"#, 2)]
#[case::single("\"failed\"", 1)]
#[case::duplicates(r#"["failed", "failed"]"#, 1)]
fn status_shapes(#[case] status: &str, #[case] expected_len: usize) {
    let payload = format!(r#"{{"objectId":"b1","status":{status},"user":{{"objectId":"u1"}}}}"#);
    let build = BuildSnapshot::parse(&payload).expect("parse");
    assert!(build.status.is_failed());
    assert_eq!(build.status.len(), expected_len);
}

// ---------------------------------------------------------------------------
// 2. Merge against a partial remote view
// ---------------------------------------------------------------------------

#[test]
fn partial_remote_view_merges_over_stored_build() {
    let build = BuildSnapshot::parse(STORED_BUILD).expect("parse");
    let update = BuildUpdate::parse(
        r#"{"status": "success", "finishedAtTime": "2014-02-08T10:04:40Z", "duration": 268}"#,
    )
    .expect("update");

    let merged = merge(&build, &update);
    assert_eq!(merged.id, build.id);
    assert_eq!(merged.status, ["success"].into_iter().collect::<StatusSet>());
    assert_eq!(merged.branch, "master");
    assert_eq!(merged.commit_sha, "3f2a9c1");
    assert!(merged.finished_at_time.is_some());
    assert_eq!(merged.extra.get("duration"), Some(&serde_json::json!(268)));
    assert_eq!(merged.extra.get("type"), Some(&serde_json::json!("travis")));
}

#[test]
fn remote_user_pointer_replaces_owner() {
    let build = BuildSnapshot::parse(STORED_BUILD).expect("parse");
    let update = BuildUpdate::parse(r#"{"user": {"objectId": "other"}}"#).expect("update");
    assert_eq!(merge(&build, &update).user.object_id.0, "other");
}
