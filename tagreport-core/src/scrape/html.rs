//! Parsing of scraped admin pages
//!
//! Everything here is a pure function over page HTML, so it can be tested
//! without a live session.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};

use crate::types::{TagCount, Webhook, WebhookScope};

/// Activity types a webhook can notify about, two-word forms first.
pub const ACTIVITY_TYPES: &[&str] = &[
    "edited questions",
    "updated answers",
    "accepted answers",
    "questions",
    "answers",
    "comments",
];

/// Column layout of a webhook table row, which differs per edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookTable<'a> {
    /// Enterprise: type, (target), description, creator, date
    Enterprise,
    /// Business: description, creator, date; type comes from the page
    Business { kind: &'a str },
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Text content of an element with line breaks removed and whitespace collapsed.
pub fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a page shows a logged-in user card (valid session).
pub fn has_user_card(html: &str) -> bool {
    let doc = Html::parse_document(html);
    selector(".s-user-card").is_some_and(|card| doc.select(&card).next().is_some())
}

/// Number of pages in a paginated admin list; 1 when there is no pagination.
///
/// The last pagination link is "Next", so the page count is the one before it.
pub fn page_count(html: &str) -> u32 {
    let Some(link) = selector("a.s-pagination--item.js-pagination-item") else {
        return 1;
    };
    let doc = Html::parse_document(html);
    let links: Vec<_> = doc.select(&link).collect();

    links
        .len()
        .checked_sub(2)
        .and_then(|i| clean_text(links[i]).parse().ok())
        .unwrap_or(1)
}

/// Tag names from a user's tag-notifications page.
pub fn watched_tags(html: &str) -> Vec<String> {
    let (Some(settings), Some(tr), Some(td)) =
        (selector("table.-settings"), selector("tr"), selector("td"))
    else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&settings).next() else {
        return Vec::new();
    };

    table
        .select(&tr)
        .filter_map(|row| row.select(&td).next())
        .map(clean_text)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Parse every webhook row on an admin integrations page.
///
/// Rows whose description does not follow the known grammar (for example
/// disabled webhooks) are skipped with a warning.
pub fn parse_webhook_rows(html: &str, table: WebhookTable<'_>) -> Vec<Webhook> {
    let (Some(tr), Some(th), Some(td)) = (selector("tr"), selector("th"), selector("td")) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);

    let mut webhooks = Vec::new();
    for row in doc.select(&tr) {
        if row.select(&th).next().is_some() {
            continue;
        }
        let columns: Vec<String> = row.select(&td).map(clean_text).collect();

        let fields = match table {
            WebhookTable::Enterprise if columns.len() >= 5 => Some((
                columns[0].clone(),
                &columns[2],
                &columns[3],
                &columns[4],
            )),
            WebhookTable::Business { kind } if columns.len() >= 3 => {
                Some((kind.to_string(), &columns[0], &columns[1], &columns[2]))
            }
            _ => None,
        };
        let Some((kind, description, creator, creation_date)) = fields else {
            tracing::warn!(columns = columns.len(), "Skipping webhook row with unexpected layout");
            continue;
        };

        match parse_webhook_description(description, creator) {
            Some((scope, activities, channel)) => webhooks.push(Webhook {
                kind,
                channel,
                scope,
                activities,
                creation_date: creation_date.clone(),
            }),
            None => {
                tracing::warn!(description = %description, "Unable to process webhook description");
            }
        }
    }

    webhooks
}

/// Parse a webhook description into its scope, activity types and channel.
///
/// Recognised forms:
///
/// ```text
/// All post activity to <channel>
/// Any <tags> posts to <channel>
/// Any [<tags>] <activities> to <channel>
/// ```
///
/// Tags are space separated and may carry an "(added via synonyms)" suffix;
/// activities are comma separated. A channel of `self` is a private
/// notification and is labelled with the creator's name.
pub fn parse_webhook_description(
    description: &str,
    creator: &str,
) -> Option<(WebhookScope, Vec<String>, String)> {
    let description = description.replace("(added via synonyms)", "").replace(',', "");
    let description = description.split_whitespace().collect::<Vec<_>>().join(" ");

    let all_activities =
        || -> Vec<String> { ACTIVITY_TYPES.iter().map(|a| a.to_string()).collect() };

    let (scope, activities, channel) =
        if let Some(channel) = description.strip_prefix("All post activity to ") {
            (WebhookScope::AllTags, all_activities(), channel.to_string())
        } else if let Some(rest) = description.strip_prefix("Any ") {
            let (head, channel) = rest.split_once(" to ")?;

            if head == "posts" {
                (WebhookScope::AllTags, all_activities(), channel.to_string())
            } else if let Some(tags) = head.strip_suffix(" posts") {
                (scope_from(tags.split(' ')), all_activities(), channel.to_string())
            } else {
                let (tags, activities) = split_tags_and_activities(head);
                if activities.is_empty() {
                    return None;
                }
                (scope_from(tags), activities, channel.to_string())
            }
        } else {
            return None;
        };

    if channel.is_empty() {
        return None;
    }
    let channel = if channel == "self" {
        format!("self ({})", creator.trim())
    } else {
        channel
    };

    Some((scope, activities, channel))
}

/// Split the words before " to " into leading tags and trailing activities.
fn split_tags_and_activities(head: &str) -> (Vec<&str>, Vec<String>) {
    let words: Vec<&str> = head.split(' ').collect();
    let mut tags = Vec::new();
    let mut activities = Vec::new();

    let mut i = 0;
    while i < words.len() {
        if i + 1 < words.len() {
            let pair = format!("{} {}", words[i], words[i + 1]);
            if ACTIVITY_TYPES.contains(&pair.as_str()) {
                activities.push(pair);
                i += 2;
                continue;
            }
        }
        if ACTIVITY_TYPES.contains(&words[i]) {
            activities.push(words[i].to_string());
        } else if activities.is_empty() {
            tags.push(words[i]);
        }
        i += 1;
    }

    (tags, activities)
}

fn scope_from<'a>(tags: impl IntoIterator<Item = &'a str>) -> WebhookScope {
    let tags: Vec<String> = tags
        .into_iter()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if tags.is_empty() {
        WebhookScope::AllTags
    } else {
        WebhookScope::Tags(tags)
    }
}

/// Count webhooks per tag. Webhooks scoped to all tags are not attributed.
pub fn tally_webhooks(webhooks: &[Webhook]) -> Vec<TagCount> {
    tally(webhooks.iter().filter_map(|w| match &w.scope {
        WebhookScope::Tags(tags) => Some(tags.as_slice()),
        WebhookScope::AllTags => None,
    }))
}

/// Count watchers per tag from each user's watched-tag list.
pub fn tally_watchers(watched: &[Vec<String>]) -> Vec<TagCount> {
    tally(watched.iter().map(Vec::as_slice))
}

/// A tag listed twice in one group is counted once for that group.
fn tally<'a>(groups: impl Iterator<Item = &'a [String]>) -> Vec<TagCount> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for group in groups {
        let mut seen: Vec<&str> = Vec::new();
        for tag in group {
            if !seen.contains(&tag.as_str()) {
                seen.push(tag.as_str());
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }
    }

    counts
        .into_iter()
        .map(|(tag_name, count)| TagCount {
            tag_name: tag_name.to_string(),
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> WebhookScope {
        WebhookScope::Tags(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_all_post_activity() {
        let (scope, activities, channel) = parse_webhook_description(
            "All post activity to Private Channel > Private Channel",
            "Ada",
        )
        .unwrap();
        assert_eq!(scope, WebhookScope::AllTags);
        assert_eq!(activities.len(), ACTIVITY_TYPES.len());
        assert_eq!(channel, "Private Channel > Private Channel");
    }

    #[test]
    fn test_tags_with_synonyms_and_posts() {
        let (scope, activities, channel) = parse_webhook_description(
            "Any aws kubernetes amazon-web-services (added via synonyms) kube (added via synonyms) posts to Engineering > Platform",
            "Ada",
        )
        .unwrap();
        assert_eq!(
            scope,
            tags(&["aws", "kubernetes", "amazon-web-services", "kube"])
        );
        assert_eq!(activities.len(), ACTIVITY_TYPES.len());
        assert_eq!(channel, "Engineering > Platform");
    }

    #[test]
    fn test_tags_with_listed_activities() {
        let (scope, activities, channel) = parse_webhook_description(
            "Any admiral python questions, edited questions, answers to #admiral",
            "Ada",
        )
        .unwrap();
        assert_eq!(scope, tags(&["admiral", "python"]));
        assert_eq!(activities, vec!["questions", "edited questions", "answers"]);
        assert_eq!(channel, "#admiral");
    }

    #[test]
    fn test_activities_without_tags_cover_all_tags() {
        let (scope, activities, _) =
            parse_webhook_description("Any questions, answers to #help-desk", "Ada").unwrap();
        assert_eq!(scope, WebhookScope::AllTags);
        assert_eq!(activities, vec!["questions", "answers"]);
    }

    #[test]
    fn test_self_channel_names_creator() {
        let (_, _, channel) =
            parse_webhook_description("Any machine-learning posts to self", "Grace Hopper")
                .unwrap();
        assert_eq!(channel, "self (Grace Hopper)");
    }

    #[test]
    fn test_disabled_webhook_is_rejected() {
        assert!(parse_webhook_description(
            "Notification failed, please re-authorize it.",
            "Ada"
        )
        .is_none());
        assert!(parse_webhook_description("Any python to", "Ada").is_none());
    }

    #[test]
    fn test_parse_enterprise_rows() {
        let html = r#"
            <table>
              <tr><th>Type</th><th>Target</th><th>Description</th><th>Creator</th><th>Created</th></tr>
              <tr>
                <td>Slack</td><td>acme</td>
                <td>Any <b>python</b> posts to <b>#py</b></td>
                <td>Ada</td><td>Jan 2, 2024</td>
              </tr>
              <tr>
                <td>Slack</td><td>acme</td>
                <td>Notification failed, please re-authorize it.</td>
                <td>Ada</td><td>Jan 3, 2024</td>
              </tr>
            </table>"#;

        let webhooks = parse_webhook_rows(html, WebhookTable::Enterprise);
        assert_eq!(webhooks.len(), 1);
        assert_eq!(webhooks[0].kind, "Slack");
        assert_eq!(webhooks[0].scope, tags(&["python"]));
        assert_eq!(webhooks[0].channel, "#py");
        assert_eq!(webhooks[0].creation_date, "Jan 2, 2024");
    }

    #[test]
    fn test_parse_business_rows_take_kind_from_page() {
        let html = r#"<table><tr>
            <td>Any rust questions to #rust</td><td>Ada</td><td>2024-01-02</td>
        </tr></table>"#;

        let webhooks = parse_webhook_rows(html, WebhookTable::Business { kind: "slack" });
        assert_eq!(webhooks.len(), 1);
        assert_eq!(webhooks[0].kind, "slack");
        assert_eq!(webhooks[0].activities, vec!["questions"]);
    }

    #[test]
    fn test_page_count() {
        let html = r#"<div>
            <a class="s-pagination--item js-pagination-item">1</a>
            <a class="s-pagination--item js-pagination-item">2</a>
            <a class="s-pagination--item js-pagination-item">3</a>
            <a class="s-pagination--item js-pagination-item">Next</a>
        </div>"#;
        assert_eq!(page_count(html), 3);
        assert_eq!(page_count("<p>no pages</p>"), 1);
    }

    #[test]
    fn test_watched_tags() {
        let html = r#"<table class="-settings">
            <tr><td>
                python
            </td><td>Immediately</td></tr>
            <tr><td>rust</td><td>Daily</td></tr>
        </table>"#;
        assert_eq!(watched_tags(html), vec!["python", "rust"]);
        assert!(watched_tags("<p>nothing</p>").is_empty());
    }

    #[test]
    fn test_has_user_card() {
        assert!(has_user_card(r#"<div class="s-user-card s-user-card__minimal">x</div>"#));
        assert!(!has_user_card("<form>Log in</form>"));
    }

    #[test]
    fn test_tally_webhooks_ignores_all_tag_scope() {
        let hook = |scope| Webhook {
            kind: "slack".to_string(),
            channel: "#c".to_string(),
            scope,
            activities: vec![],
            creation_date: String::new(),
        };
        let webhooks = vec![
            hook(tags(&["python", "aws"])),
            hook(tags(&["python"])),
            hook(WebhookScope::AllTags),
        ];

        let counts = tally_webhooks(&webhooks);
        assert_eq!(
            counts,
            vec![
                TagCount {
                    tag_name: "aws".to_string(),
                    count: 1
                },
                TagCount {
                    tag_name: "python".to_string(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_tally_watchers_counts_each_user_once() {
        let watched = vec![
            vec!["rust".to_string(), "rust".to_string()],
            vec!["rust".to_string()],
        ];
        assert_eq!(tally_watchers(&watched)[0].count, 2);
    }
}
