use std::sync::LazyLock;

use board::CanonicalItem;
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use tracing::warn;

use crate::models::{RawCommit, RawPull};

static NEXT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).unwrap());

/// URL of the `rel="next"` relation in a `Link` header, if any.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|relation| {
            NEXT_LINK
                .captures(relation.trim())
                .map(|captures| captures[1].to_string())
        })
}

/// Drops bot commits and merge commits, maps the rest 1:1.
pub fn normalize_commits(
    raw: Vec<RawCommit>,
    excluded_author: &str,
    excluded_prefix: &str,
) -> Vec<CanonicalItem> {
    raw.into_iter()
        .filter_map(|commit| {
            let Some(actor) = commit.commit.author.or(commit.commit.committer) else {
                warn!("Skipping commit {} without author", commit.sha);
                return None;
            };

            if actor.name == excluded_author {
                return None;
            }
            if !excluded_prefix.is_empty() && commit.commit.message.starts_with(excluded_prefix) {
                return None;
            }

            Some(CanonicalItem {
                id: commit.sha,
                message: commit.commit.message,
                description: None,
                author: actor.name,
                date: actor.date,
                link: commit.html_url,
                state: None,
                merged: None,
                merged_at: None,
            })
        })
        .collect()
}

pub fn normalize_pulls(raw: Vec<RawPull>) -> Vec<CanonicalItem> {
    raw.into_iter()
        .map(|pull| CanonicalItem {
            id: pull.number.to_string(),
            message: pull.title,
            description: pull.body,
            author: pull
                .user
                .map(|user| user.login)
                .unwrap_or_else(|| "ghost".to_string()),
            date: pull.created_at,
            link: pull.html_url,
            state: Some(pull.state),
            merged: Some(pull.merged_at.is_some()),
            merged_at: pull.merged_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use board::PullState;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    use super::*;

    fn headers(link: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LINK, HeaderValue::from_str(link).unwrap());
        headers
    }

    #[test]
    fn test_next_link() {
        let link = r#"<https://api.github.com/repositories/1/commits?per_page=100&page=2>; rel="next", <https://api.github.com/repositories/1/commits?per_page=100&page=9>; rel="last""#;

        assert_eq!(
            next_link(&headers(link)).as_deref(),
            Some("https://api.github.com/repositories/1/commits?per_page=100&page=2")
        );
    }

    #[test]
    fn test_next_link_not_first() {
        let link = r#"<https://x/commits?page=1>; rel="prev", <https://x/commits?page=3>; rel="next""#;

        assert_eq!(
            next_link(&headers(link)).as_deref(),
            Some("https://x/commits?page=3")
        );
    }

    #[test]
    fn test_no_next_link() {
        let link = r#"<https://x/commits?page=1>; rel="prev", <https://x/commits?page=1>; rel="first""#;

        assert_eq!(next_link(&headers(link)), None);
        assert_eq!(next_link(&HeaderMap::new()), None);
    }

    fn raw_commit(sha: &str, name: &str, message: &str) -> RawCommit {
        serde_json::from_value(json!({
            "sha": sha,
            "html_url": format!("https://github.com/o/r/commit/{sha}"),
            "commit": {
                "message": message,
                "author": { "name": name, "email": "x@y.z", "date": "2024-03-01T10:00:00Z" },
                "committer": { "name": "GitHub", "email": "noreply@github.com", "date": "2024-03-01T10:05:00Z" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_commit_filters() {
        let raw = vec![
            raw_commit("a1", "alice", "Fix off-by-one"),
            raw_commit("b2", "github-actions[bot]", "Update snapshots"),
            raw_commit("c3", "bob", "Merge pull request #4 from bob/feature"),
            raw_commit("d4", "carol", "Mention Merge in the middle"),
        ];

        let items = normalize_commits(raw, "github-actions[bot]", "Merge");
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();

        assert_eq!(ids, vec!["a1", "d4"]);
        assert_eq!(items[0].author, "alice");
        assert_eq!(items[0].message, "Fix off-by-one");
        assert_eq!(items[0].link, "https://github.com/o/r/commit/a1");
        assert_eq!(items[0].date.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert!(items[0].state.is_none());
    }

    #[test]
    fn test_empty_prefix_keeps_everything() {
        let raw = vec![raw_commit("a1", "alice", "Merge branch 'main'")];

        assert_eq!(normalize_commits(raw, "", "").len(), 1);
    }

    #[test]
    fn test_pull_mapping() {
        let raw: Vec<RawPull> = serde_json::from_value(json!([
            {
                "number": 12,
                "title": "Add search",
                "body": "Adds a search box",
                "user": { "login": "dana" },
                "state": "closed",
                "created_at": "2024-04-01T09:00:00Z",
                "merged_at": "2024-04-02T09:00:00Z",
                "html_url": "https://github.com/o/r/pull/12"
            },
            {
                "number": 13,
                "title": "WIP",
                "body": null,
                "user": null,
                "state": "open",
                "created_at": "2024-04-03T09:00:00Z",
                "merged_at": null,
                "html_url": "https://github.com/o/r/pull/13"
            }
        ]))
        .unwrap();

        let items = normalize_pulls(raw);

        assert_eq!(items[0].id, "12");
        assert_eq!(items[0].description.as_deref(), Some("Adds a search box"));
        assert_eq!(items[0].state, Some(PullState::Closed));
        assert_eq!(items[0].merged, Some(true));
        assert!(items[0].merged_at.is_some());

        assert_eq!(items[1].author, "ghost");
        assert_eq!(items[1].merged, Some(false));
        assert_eq!(items[1].merged_at, None);
    }
}
