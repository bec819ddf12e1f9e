//! Core domain types for tagreport
//!
//! These types are the typed form of the platform's API records. Raw JSON is
//! converted into them at the harvester boundary (see [`crate::api::records`])
//! and they are what the snapshot blob stores.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Tag** | A label attached to Questions and Articles; the unit of the report |
//! | **Question** | A post that carries tags and may receive Answers |
//! | **Answer** | A post replying to a Question; inherits the Question's tags |
//! | **Article** | A long-form post that carries tags |
//! | **SME** | Subject-matter expert assigned to a tag, directly or via a user group |
//! | **Webhook** | A chat integration notifying a channel about activity on some tags |
//! | **Watcher** | A user who follows a tag |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================
// Tags
// ============================================

/// A tag known to the platform.
///
/// Identity is `name`; names are unique within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name (e.g. "python")
    pub name: String,
    /// Number of posts the platform reports for the tag
    #[serde(default)]
    pub result_count: i64,
    /// Platform tag id (v3 API), needed to look up SMEs
    #[serde(default)]
    pub id: Option<i64>,
    /// Subject-matter experts configured for the tag
    #[serde(default)]
    pub smes: TagSmes,
}

impl Tag {
    /// Create a tag with no SMEs.
    pub fn new(name: impl Into<String>, result_count: i64) -> Self {
        Self {
            name: name.into(),
            result_count,
            id: None,
            smes: TagSmes::default(),
        }
    }
}

/// SME assignment for a tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSmes {
    /// Users assigned individually
    #[serde(default)]
    pub users: Vec<i64>,
    /// Members of user groups assigned to the tag, one list per group
    #[serde(default)]
    pub groups: Vec<Vec<i64>>,
}

impl TagSmes {
    /// Distinct SME user ids, individual and group members combined.
    pub fn all_users(&self) -> BTreeSet<i64> {
        self.users
            .iter()
            .copied()
            .chain(self.groups.iter().flatten().copied())
            .collect()
    }
}

// ============================================
// Users
// ============================================

/// A platform user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ============================================
// Posts
// ============================================

/// Kind of post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    Question,
    Answer,
    Article,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Question => "question",
            PostType::Answer => "answer",
            PostType::Article => "article",
        }
    }
}

/// A question and the tags it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    /// Tag names in the order the platform lists them
    pub tags: Vec<String>,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub answer_count: i64,
    #[serde(default)]
    pub is_answered: bool,
    #[serde(default)]
    pub accepted_answer_id: Option<i64>,
    /// Author; None for deleted or anonymous accounts
    #[serde(default)]
    pub owner_id: Option<i64>,
}

/// An answer to a question.
///
/// Answers carry no tags of their own; they belong to whatever tags the
/// parent question (`question_id`) has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_accepted: bool,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

/// A knowledge article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub tags: Vec<String>,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

// ============================================
// Supplementary records
// ============================================

/// Point-in-time count attached to a tag by name (webhooks, watchers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag_name: String,
    pub count: i64,
}

/// Which tags a webhook notifies about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tags", rename_all = "snake_case")]
pub enum WebhookScope {
    /// Every tag on the instance
    AllTags,
    /// Only the listed tags
    Tags(Vec<String>),
}

/// A chat webhook scraped from the admin pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    /// Integration type (e.g. "slack", "microsoft-teams")
    pub kind: String,
    /// Target channel
    pub channel: String,
    pub scope: WebhookScope,
    /// Activity types that trigger the webhook (e.g. "questions", "answers")
    pub activities: Vec<String>,
    /// Creation date as displayed on the page
    pub creation_date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_smes_all_users_dedups_groups() {
        let smes = TagSmes {
            users: vec![5, 7],
            groups: vec![vec![7, 9], vec![9, 11]],
        };
        let all: Vec<_> = smes.all_users().into_iter().collect();
        assert_eq!(all, vec![5, 7, 9, 11]);
    }

    #[test]
    fn test_tag_deserializes_with_defaults() {
        let tag: Tag = serde_json::from_str(r#"{"name": "rust"}"#).unwrap();
        assert_eq!(tag.name, "rust");
        assert_eq!(tag.result_count, 0);
        assert!(tag.smes.users.is_empty());
    }

    #[test]
    fn test_webhook_scope_serialization() {
        let scope = WebhookScope::Tags(vec!["aws".to_string()]);
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["kind"], "tags");
        assert_eq!(json["tags"][0], "aws");

        let all = serde_json::to_value(WebhookScope::AllTags).unwrap();
        assert_eq!(all["kind"], "all_tags");
    }
}
