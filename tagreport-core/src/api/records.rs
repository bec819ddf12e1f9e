//! Conversion of raw API JSON into typed records
//!
//! Items that lack a required field are dropped here and counted, so nothing
//! downstream ever sees a half-populated record.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::{Answer, Article, PostType, Question, Tag, TagSmes, User};

/// Typed records parsed from one API resource, plus how many items were dropped.
#[derive(Debug)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Questions and the answers embedded in them.
#[derive(Debug, Default)]
pub struct QuestionsAndAnswers {
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub skipped: usize,
}

/// Parse v2.3 `/questions` items, flattening the embedded `answers` arrays.
///
/// An answer without its own `question_id` inherits the enclosing question's id.
pub fn parse_questions(items: &[Value]) -> QuestionsAndAnswers {
    let mut out = QuestionsAndAnswers::default();

    for item in items {
        match parse_question(item) {
            Some(question) => {
                for answer_item in item
                    .get("answers")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                {
                    match parse_answer(answer_item, question.id) {
                        Some(answer) => out.answers.push(answer),
                        None => {
                            out.skipped += 1;
                            log_skip(PostType::Answer, answer_item);
                        }
                    }
                }
                out.questions.push(question);
            }
            None => {
                out.skipped += 1;
                log_skip(PostType::Question, item);
            }
        }
    }

    out
}

fn parse_question(item: &Value) -> Option<Question> {
    Some(Question {
        id: item.get("question_id")?.as_i64()?,
        tags: string_list(item.get("tags")?)?,
        creation_date: epoch(item.get("creation_date")?)?,
        score: int_or_zero(item, "score"),
        view_count: int_or_zero(item, "view_count"),
        answer_count: int_or_zero(item, "answer_count"),
        is_answered: item
            .get("is_answered")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        accepted_answer_id: item.get("accepted_answer_id").and_then(Value::as_i64),
        owner_id: owner_id(item),
    })
}

fn parse_answer(item: &Value, parent_id: i64) -> Option<Answer> {
    Some(Answer {
        id: item.get("answer_id")?.as_i64()?,
        question_id: item
            .get("question_id")
            .and_then(Value::as_i64)
            .unwrap_or(parent_id),
        creation_date: epoch(item.get("creation_date")?)?,
        score: int_or_zero(item, "score"),
        is_accepted: item
            .get("is_accepted")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        owner_id: owner_id(item),
    })
}

/// Parse v2.3 `/articles` items.
pub fn parse_articles(items: &[Value]) -> Parsed<Article> {
    let mut out = Parsed::default();
    for item in items {
        match parse_article(item) {
            Some(article) => out.records.push(article),
            None => {
                out.skipped += 1;
                log_skip(PostType::Article, item);
            }
        }
    }
    out
}

fn parse_article(item: &Value) -> Option<Article> {
    Some(Article {
        id: item.get("article_id")?.as_i64()?,
        tags: string_list(item.get("tags")?)?,
        creation_date: epoch(item.get("creation_date")?)?,
        score: int_or_zero(item, "score"),
        view_count: int_or_zero(item, "view_count"),
        owner_id: owner_id(item),
    })
}

/// Parse v2.3 `/users` items.
///
/// Ids of 1 and below are the Community bot and user groups; they are
/// excluded without counting as skipped.
pub fn parse_users(items: &[Value]) -> Parsed<User> {
    let mut out = Parsed::default();
    for item in items {
        let Some(user_id) = item.get("user_id").and_then(Value::as_i64) else {
            out.skipped += 1;
            tracing::warn!(item = %item, "Skipping user without user_id");
            continue;
        };
        if user_id <= 1 {
            continue;
        }
        out.records.push(User {
            user_id,
            display_name: item
                .get("display_name")
                .and_then(Value::as_str)
                .map(strip_entities),
        });
    }
    out
}

/// Parse v3 `/tags` items into tags without SMEs.
pub fn parse_tags(items: &[Value]) -> Parsed<Tag> {
    let mut out = Parsed::default();
    for item in items {
        let Some(name) = item.get("name").and_then(Value::as_str) else {
            out.skipped += 1;
            tracing::warn!(item = %item, "Skipping tag without name");
            continue;
        };
        let result_count = ["postCount", "count"]
            .iter()
            .find_map(|key| item.get(*key).and_then(Value::as_i64))
            .unwrap_or(0);

        let mut tag = Tag::new(name, result_count);
        tag.id = item.get("id").and_then(Value::as_i64);
        out.records.push(tag);
    }
    out
}

/// Parse a v3 `/tags/{id}/subject-matter-experts` response.
///
/// Users and groups without ids are ignored; a response without either list
/// yields an empty assignment.
pub fn parse_smes(value: &Value) -> TagSmes {
    let ids = |users: Option<&Value>| -> Vec<i64> {
        users
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|user| user.get("id").and_then(Value::as_i64))
            .collect()
    };

    TagSmes {
        users: ids(value.get("users")),
        groups: value
            .get("userGroups")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|group| ids(group.get("users")))
            .collect(),
    }
}

fn epoch(value: &Value) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.as_i64()?, 0)
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn int_or_zero(item: &Value, key: &str) -> i64 {
    item.get(key).and_then(Value::as_i64).unwrap_or(0)
}

/// Deleted accounts come back as an owner with no `user_id`.
fn owner_id(item: &Value) -> Option<i64> {
    item.get("owner")?.get("user_id")?.as_i64()
}

/// The v2.3 API HTML-escapes display names.
fn strip_entities(text: &str) -> String {
    text.replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn log_skip(kind: PostType, item: &Value) {
    let id_key = format!("{}_id", kind.as_str());
    tracing::warn!(
        kind = kind.as_str(),
        id = ?item.get(&id_key),
        "Skipping record with missing or malformed fields"
    );
}
