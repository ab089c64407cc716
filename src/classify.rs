//! # Webhook Event Classification
//!
//! Maps verified provider payloads onto the ledger's enumerated action types.
//! Classification is pure: it reads the payload and produces structured
//! details plus the raw actor handle and resource identifier needed by
//! attribution. Unrecognized event types classify to `None` and are ignored
//! upstream rather than rejected.

use serde_json::Value as JsonValue;

use crate::models::activity_record::ActivityDetails;

/// A provider event mapped onto the ledger vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    /// Structured details destined for the ledger row
    pub details: ActivityDetails,
    /// Raw platform handle of the acting user, when the payload names one
    pub actor_handle: Option<String>,
    /// Provider-side resource identifier (repo full name, channel ID)
    pub resource_external_id: Option<String>,
}

/// Classify a GitHub webhook delivery.
///
/// Returns `None` for event types with no ledger mapping (ping, status,
/// check_suite and the long tail); the gateway acknowledges those without
/// recording anything.
pub fn classify_github_event(event_type: &str, payload: &JsonValue) -> Option<ClassifiedEvent> {
    let repo = payload
        .pointer("/repository/full_name")
        .and_then(JsonValue::as_str)?
        .to_string();

    match event_type {
        "push" => {
            let git_ref = payload.get("ref").and_then(JsonValue::as_str)?.to_string();
            let commit_count = payload
                .get("commits")
                .and_then(JsonValue::as_array)
                .map(|commits| commits.len() as u64)
                .unwrap_or(0);
            let head_sha = payload
                .get("after")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            let actor_handle = payload
                .pointer("/pusher/name")
                .or_else(|| payload.pointer("/sender/login"))
                .and_then(JsonValue::as_str)
                .map(str::to_string);

            Some(ClassifiedEvent {
                details: ActivityDetails::CodePush {
                    repo: repo.clone(),
                    git_ref,
                    commit_count,
                    head_sha,
                },
                actor_handle,
                resource_external_id: Some(repo),
            })
        }
        "pull_request" => {
            let action = payload
                .get("action")
                .and_then(JsonValue::as_str)?
                .to_string();
            let number = payload.pointer("/pull_request/number")?.as_u64()?;
            let title = payload
                .pointer("/pull_request/title")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            let actor_handle = sender_login(payload);

            // A merged close is a distinct audit event from an abandoned one
            let merged = payload
                .pointer("/pull_request/merged")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false);
            let details = if action == "closed" && merged {
                ActivityDetails::CodeMerge {
                    repo: repo.clone(),
                    number,
                    title,
                    merge_sha: payload
                        .pointer("/pull_request/merge_commit_sha")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string),
                }
            } else {
                ActivityDetails::PullRequest {
                    repo: repo.clone(),
                    action,
                    number,
                    title,
                }
            };

            Some(ClassifiedEvent {
                details,
                actor_handle,
                resource_external_id: Some(repo),
            })
        }
        "issues" => {
            let action = payload
                .get("action")
                .and_then(JsonValue::as_str)?
                .to_string();
            let number = payload.pointer("/issue/number")?.as_u64()?;
            let title = payload
                .pointer("/issue/title")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            let actor_handle = sender_login(payload);

            Some(ClassifiedEvent {
                details: ActivityDetails::Issue {
                    repo: repo.clone(),
                    action,
                    number,
                    title,
                },
                actor_handle,
                resource_external_id: Some(repo),
            })
        }
        "pull_request_review" => {
            let action = payload
                .get("action")
                .and_then(JsonValue::as_str)?
                .to_string();
            let number = payload.pointer("/pull_request/number")?.as_u64()?;
            let state = payload
                .pointer("/review/state")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            let actor_handle = payload
                .pointer("/review/user/login")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .or_else(|| sender_login(payload));

            Some(ClassifiedEvent {
                details: ActivityDetails::Review {
                    repo: repo.clone(),
                    action,
                    number,
                    state,
                },
                actor_handle,
                resource_external_id: Some(repo),
            })
        }
        _ => None,
    }
}

/// Classify a Slack Events API callback.
///
/// Message events map to the `comment` action type and channel lifecycle
/// events to `archive`/`edit`. Other recognized event callbacks are kept as
/// generic records so the audit trail stays complete.
pub fn classify_slack_event(event_type: &str, payload: &JsonValue) -> Option<ClassifiedEvent> {
    let event = payload.get("event").unwrap_or(payload);

    match event_type {
        "message" => {
            // Bot messages and edits carry a subtype; only plain user
            // messages are attributable activity
            if event.get("subtype").and_then(JsonValue::as_str).is_some() {
                return None;
            }

            let channel = event
                .get("channel")
                .and_then(JsonValue::as_str)?
                .to_string();
            let thread_ts = event
                .get("thread_ts")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            let actor_handle = event
                .get("user")
                .and_then(JsonValue::as_str)
                .map(str::to_string);

            Some(ClassifiedEvent {
                details: ActivityDetails::Comment {
                    channel: channel.clone(),
                    thread_ts,
                },
                actor_handle,
                resource_external_id: Some(channel),
            })
        }
        "channel_archive" => {
            let channel = event
                .get("channel")
                .and_then(JsonValue::as_str)?
                .to_string();
            let actor_handle = event
                .get("user")
                .and_then(JsonValue::as_str)
                .map(str::to_string);

            Some(ClassifiedEvent {
                details: ActivityDetails::Archive {
                    channel: channel.clone(),
                },
                actor_handle,
                resource_external_id: Some(channel),
            })
        }
        "channel_rename" => {
            // Slack nests the channel object here, unlike channel_archive
            let channel = event
                .pointer("/channel/id")
                .and_then(JsonValue::as_str)?
                .to_string();
            let name = event
                .pointer("/channel/name")
                .and_then(JsonValue::as_str)
                .map(str::to_string);

            Some(ClassifiedEvent {
                details: ActivityDetails::Edit {
                    channel: channel.clone(),
                    name,
                },
                actor_handle: None,
                resource_external_id: Some(channel),
            })
        }
        "reaction_added" | "file_shared" => {
            let channel = event
                .get("channel")
                .or_else(|| event.get("item").and_then(|item| item.get("channel")))
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            let actor_handle = event
                .get("user")
                .and_then(JsonValue::as_str)
                .map(str::to_string);

            Some(ClassifiedEvent {
                details: ActivityDetails::Generic {
                    provider: "slack".to_string(),
                    event_type: event_type.to_string(),
                },
                actor_handle,
                resource_external_id: channel,
            })
        }
        _ => None,
    }
}

/// Build the one-line ledger summary for a classified event.
pub fn summarize(details: &ActivityDetails, actor_handle: Option<&str>) -> String {
    let actor = actor_handle.unwrap_or("unknown");
    match details {
        ActivityDetails::CodePush {
            repo,
            git_ref,
            commit_count,
            ..
        } => format!(
            "{} pushed {} commit(s) to {} on {}",
            actor, commit_count, git_ref, repo
        ),
        ActivityDetails::CodeMerge { repo, number, .. } => {
            format!("{} merged pull request #{} in {}", actor, number, repo)
        }
        ActivityDetails::PullRequest {
            repo,
            action,
            number,
            ..
        } => format!("{} {} pull request #{} in {}", actor, action, number, repo),
        ActivityDetails::Issue {
            repo,
            action,
            number,
            ..
        } => format!("{} {} issue #{} in {}", actor, action, number, repo),
        ActivityDetails::Review {
            repo,
            action,
            number,
            ..
        } => format!("{} {} review on #{} in {}", actor, action, number, repo),
        ActivityDetails::Comment { channel, .. } => {
            format!("{} posted a message in {}", actor, channel)
        }
        ActivityDetails::Archive { channel } => {
            format!("{} archived channel {}", actor, channel)
        }
        ActivityDetails::Edit { channel, name } => match name {
            Some(name) => format!("channel {} renamed to {}", channel, name),
            None => format!("channel {} renamed", channel),
        },
        ActivityDetails::Telemetry { step, .. } => {
            format!("{} reported telemetry for step '{}'", actor, step)
        }
        ActivityDetails::Generic {
            provider,
            event_type,
        } => format!("{} triggered {} event on {}", actor, event_type, provider),
    }
}

fn sender_login(payload: &JsonValue) -> Option<String> {
    payload
        .pointer("/sender/login")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_push_event() {
        let payload = json!({
            "ref": "refs/heads/main",
            "after": "abc123def",
            "repository": { "full_name": "acme/api" },
            "pusher": { "name": "octocat" },
            "commits": [{}, {}, {}]
        });

        let classified = classify_github_event("push", &payload).expect("push classifies");
        assert_eq!(classified.actor_handle.as_deref(), Some("octocat"));
        assert_eq!(classified.resource_external_id.as_deref(), Some("acme/api"));
        assert_eq!(
            classified.details,
            ActivityDetails::CodePush {
                repo: "acme/api".to_string(),
                git_ref: "refs/heads/main".to_string(),
                commit_count: 3,
                head_sha: Some("abc123def".to_string()),
            }
        );
    }

    #[test]
    fn test_classify_pull_request_event() {
        let payload = json!({
            "action": "opened",
            "repository": { "full_name": "acme/api" },
            "pull_request": { "number": 42, "title": "Add caching" },
            "sender": { "login": "octocat" }
        });

        let classified =
            classify_github_event("pull_request", &payload).expect("pull_request classifies");
        assert_eq!(classified.details.action_type(), "pull_request");
        assert_eq!(classified.actor_handle.as_deref(), Some("octocat"));
    }

    #[test]
    fn test_merged_close_classifies_as_code_merge() {
        let payload = json!({
            "action": "closed",
            "repository": { "full_name": "acme/api" },
            "pull_request": {
                "number": 42,
                "merged": true,
                "merge_commit_sha": "deadbeef"
            },
            "sender": { "login": "octocat" }
        });

        let classified =
            classify_github_event("pull_request", &payload).expect("pull_request classifies");
        assert_eq!(classified.details.action_type(), "code_merge");
        let ActivityDetails::CodeMerge {
            number, merge_sha, ..
        } = &classified.details
        else {
            panic!("expected code merge details");
        };
        assert_eq!(*number, 42);
        assert_eq!(merge_sha.as_deref(), Some("deadbeef"));

        // An unmerged close stays a plain pull_request record
        let payload = json!({
            "action": "closed",
            "repository": { "full_name": "acme/api" },
            "pull_request": { "number": 42, "merged": false },
            "sender": { "login": "octocat" }
        });
        let classified = classify_github_event("pull_request", &payload).unwrap();
        assert_eq!(classified.details.action_type(), "pull_request");
        let ActivityDetails::PullRequest { action, .. } = &classified.details else {
            panic!("expected pull request details");
        };
        assert_eq!(action, "closed");
    }

    #[test]
    fn test_classify_review_event_uses_reviewer() {
        let payload = json!({
            "action": "submitted",
            "repository": { "full_name": "acme/api" },
            "pull_request": { "number": 7 },
            "review": { "state": "approved", "user": { "login": "reviewer" } },
            "sender": { "login": "someone-else" }
        });

        let classified =
            classify_github_event("pull_request_review", &payload).expect("review classifies");
        assert_eq!(classified.actor_handle.as_deref(), Some("reviewer"));
    }

    #[test]
    fn test_unrecognized_github_event_is_ignored() {
        let payload = json!({
            "zen": "Keep it logically awesome.",
            "repository": { "full_name": "acme/api" }
        });

        assert!(classify_github_event("ping", &payload).is_none());
        assert!(classify_github_event("check_suite", &payload).is_none());
    }

    #[test]
    fn test_malformed_push_payload_is_ignored() {
        // Missing ref
        let payload = json!({
            "repository": { "full_name": "acme/api" },
            "commits": []
        });
        assert!(classify_github_event("push", &payload).is_none());
    }

    #[test]
    fn test_classify_slack_message() {
        let payload = json!({
            "type": "event_callback",
            "event": {
                "type": "message",
                "channel": "C012345",
                "user": "U067890",
                "text": "standup in 5",
                "ts": "1712000000.000100"
            }
        });

        let classified = classify_slack_event("message", &payload).expect("message classifies");
        assert_eq!(classified.actor_handle.as_deref(), Some("U067890"));
        assert_eq!(classified.resource_external_id.as_deref(), Some("C012345"));
        assert_eq!(classified.details.action_type(), "comment");
    }

    #[test]
    fn test_channel_archive_maps_to_archive() {
        let payload = json!({
            "event": {
                "type": "channel_archive",
                "channel": "C012345",
                "user": "U067890"
            }
        });

        let classified =
            classify_slack_event("channel_archive", &payload).expect("archive classifies");
        assert_eq!(classified.details.action_type(), "archive");
        assert_eq!(classified.actor_handle.as_deref(), Some("U067890"));
        assert_eq!(classified.resource_external_id.as_deref(), Some("C012345"));
    }

    #[test]
    fn test_channel_rename_maps_to_edit() {
        let payload = json!({
            "event": {
                "type": "channel_rename",
                "channel": { "id": "C012345", "name": "audit-2026", "created": 1712000000 }
            }
        });

        let classified =
            classify_slack_event("channel_rename", &payload).expect("rename classifies");
        assert_eq!(classified.details.action_type(), "edit");
        let ActivityDetails::Edit { channel, name } = &classified.details else {
            panic!("expected edit details");
        };
        assert_eq!(channel, "C012345");
        assert_eq!(name.as_deref(), Some("audit-2026"));
    }

    #[test]
    fn test_slack_bot_message_subtype_ignored() {
        let payload = json!({
            "event": {
                "type": "message",
                "subtype": "bot_message",
                "channel": "C012345"
            }
        });

        assert!(classify_slack_event("message", &payload).is_none());
    }

    #[test]
    fn test_slack_reaction_maps_to_generic() {
        let payload = json!({
            "event": {
                "type": "reaction_added",
                "user": "U067890",
                "item": { "channel": "C012345" }
            }
        });

        let classified =
            classify_slack_event("reaction_added", &payload).expect("reaction classifies");
        assert_eq!(classified.details.action_type(), "generic");
        assert_eq!(classified.resource_external_id.as_deref(), Some("C012345"));
    }

    #[test]
    fn test_summary_mentions_actor_and_resource() {
        let details = ActivityDetails::CodePush {
            repo: "acme/api".to_string(),
            git_ref: "refs/heads/main".to_string(),
            commit_count: 2,
            head_sha: None,
        };

        let summary = summarize(&details, Some("octocat"));
        assert!(summary.contains("octocat"));
        assert!(summary.contains("acme/api"));

        let anonymous = summarize(&details, None);
        assert!(anonymous.contains("unknown"));
    }
}
