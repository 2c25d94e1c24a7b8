//! Session ordering, capping, day grouping and title derivation
//!
//! Every list handed to a consumer is ordered pinned-first, then by
//! `timestamp` descending. Day grouping makes the calendar bucket the
//! primary key and applies the same rule inside each bucket.

use super::{ChatMessage, ChatSession, Role};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::cmp::Reverse;

/// Maximum number of characters kept from the first user message
pub const TITLE_MAX_CHARS: usize = 40;

/// Marker appended to a truncated title
pub const TITLE_ELLIPSIS: &str = "...";

/// Sort sessions pinned-first, most recent first
///
/// The sort is stable, so sessions with identical keys keep their
/// relative order.
pub fn sort_sessions(sessions: &mut [ChatSession]) {
    sessions.sort_by_key(|s| (!s.is_pinned(), Reverse(s.timestamp)));
}

/// Evict sessions until at most `max` remain
///
/// The oldest unpinned session goes first; pinned sessions are only
/// evicted (oldest first) when nothing unpinned is left.
/// Returns the ids of the evicted sessions.
pub fn enforce_cap(sessions: &mut Vec<ChatSession>, max: usize) -> Vec<String> {
    let mut evicted = Vec::new();
    while sessions.len() > max {
        let victim = oldest_index(sessions, false).or_else(|| oldest_index(sessions, true));
        match victim {
            Some(idx) => evicted.push(sessions.remove(idx).id),
            None => break,
        }
    }
    evicted
}

fn oldest_index(sessions: &[ChatSession], pinned: bool) -> Option<usize> {
    sessions
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_pinned() == pinned)
        .min_by_key(|(_, s)| s.timestamp)
        .map(|(idx, _)| idx)
}

/// Sessions sharing one calendar day
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    /// Calendar day in the grouping offset
    pub day: NaiveDate,
    /// Sessions of that day, pinned-first then most recent first
    pub sessions: Vec<ChatSession>,
}

/// Group sessions by the calendar day of their timestamp
///
/// Buckets are ordered newest day first.
pub fn group_by_day(sessions: &[ChatSession], offset: FixedOffset) -> Vec<DayBucket> {
    let mut buckets: Vec<DayBucket> = Vec::new();
    for session in sessions {
        let day = session.timestamp.with_timezone(&offset).date_naive();
        match buckets.iter_mut().find(|b| b.day == day) {
            Some(bucket) => bucket.sessions.push(session.clone()),
            None => buckets.push(DayBucket {
                day,
                sessions: vec![session.clone()],
            }),
        }
    }

    buckets.sort_by_key(|b| Reverse(b.day));
    for bucket in &mut buckets {
        sort_sessions(&mut bucket.sessions);
    }
    buckets
}

/// Derive a session title from its messages
///
/// Only the first `user` message is considered. Its content is cut to
/// [`TITLE_MAX_CHARS`] characters followed by [`TITLE_ELLIPSIS`] when
/// longer. Without a user message the title is a date-stamped placeholder.
pub fn derive_title(messages: &[ChatMessage], now: DateTime<Utc>) -> String {
    match messages.iter().find(|m| m.role == Role::User) {
        Some(first) => truncate_title(&first.content),
        None => format!("Chat {}", now.format("%Y-%m-%d")),
    }
}

fn truncate_title(content: &str) -> String {
    if content.chars().count() > TITLE_MAX_CHARS {
        let head: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}{}", head, TITLE_ELLIPSIS)
    } else {
        content.to_string()
    }
}
