use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use tokio::time::Instant;

use crate::{
    ChatScope, ScopeRule, ThrottlerOptions,
    common::ScopeId,
};

/// Padding added to every reported wait so the retry lands strictly past the
/// window boundary instead of re-checking on it.
pub(crate) const ADMISSION_SLACK: Duration = Duration::from_millis(20);

/// Sliding-window call histories for every rate-limit scope.
///
/// Not synchronized; the owner wraps it in a mutex and performs
/// purge/check/record as one critical section so a request is admitted
/// against all of its scopes atomically.
pub(crate) struct WindowTracker {
    options: ThrottlerOptions,
    histories: HashMap<ScopeId, VecDeque<Instant>>,
}

impl WindowTracker {
    pub fn new(options: ThrottlerOptions) -> Self {
        Self {
            options,
            histories: HashMap::new(),
        }
    }

    /// Append `now` to every scope the request falls under.
    pub fn record(&mut self, now: Instant, chat_key: &str, scope: ChatScope, broadcast: bool) {
        for id in applicable_scopes(chat_key, scope, broadcast) {
            self.histories.entry(id).or_default().push_back(now);
        }
    } // end method record

    /// Drop timestamps that have left their window; drop emptied histories so
    /// memory stays bounded by currently-active scope keys.
    pub fn purge(&mut self, now: Instant) {
        let options = self.options;

        self.histories.retain(|id, history| {
            let period = rule_for(&options, id).period.duration();

            while let Some(oldest) = history.front()
                && now.duration_since(*oldest) >= period
            {
                history.pop_front();
            }

            !history.is_empty()
        });
    } // end method purge

    /// Admission check across every applicable scope.
    ///
    /// Returns `None` when the request may proceed now, otherwise the wait
    /// after which the most-constraining violated scope frees a slot. Expects
    /// [`purge`](Self::purge) to have run for `now`; read-only otherwise.
    pub fn check(
        &self,
        now: Instant,
        chat_key: &str,
        scope: ChatScope,
        broadcast: bool,
    ) -> Option<Duration> {
        let mut wait: Option<Duration> = None;

        for id in applicable_scopes(chat_key, scope, broadcast) {
            let rule = rule_for(&self.options, &id);

            let Some(history) = self.histories.get(&id) else {
                continue;
            };

            if history.len() < *rule.limit as usize {
                continue;
            }

            let Some(oldest) = history.front() else {
                continue;
            };

            let until_free = rule
                .period
                .duration()
                .saturating_sub(now.duration_since(*oldest))
                + ADMISSION_SLACK;

            wait = Some(wait.map_or(until_free, |current| current.max(until_free)));
        }

        wait
    } // end method check

    /// Number of scope histories currently retained.
    #[cfg(test)]
    pub fn tracked_scopes(&self) -> usize {
        self.histories.len()
    }
}

fn rule_for(options: &ThrottlerOptions, id: &ScopeId) -> ScopeRule {
    match id {
        ScopeId::Chat(_) => options.per_chat,
        ScopeId::Group(_) => options.per_group,
        ScopeId::Broadcast => options.broadcast,
    }
}

fn applicable_scopes(chat_key: &str, scope: ChatScope, broadcast: bool) -> Vec<ScopeId> {
    let mut scopes = vec![ScopeId::Chat(chat_key.to_owned())];

    if scope == ChatScope::Group {
        scopes.push(ScopeId::Group(chat_key.to_owned()));
    }

    if broadcast {
        scopes.push(ScopeId::Broadcast);
    }

    scopes
}
