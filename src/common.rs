use std::{ops::Deref, time::Duration};

/// Maximum number of calls admitted per scope within one period.
///
/// Must be at least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeLimit(u32);

impl TryFrom<u32> for ScopeLimit {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err("Scope limit must be at least 1");
        }

        Ok(Self(value))
    }
}

impl Deref for ScopeLimit {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Length of a scope's sliding window, in seconds.
///
/// Must be greater than 0. Fractional periods are supported.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScopePeriodSeconds(f64);

impl TryFrom<f64> for ScopePeriodSeconds {
    type Error = &'static str;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value <= 0f64 {
            return Err("Scope period must be greater than 0");
        }

        Ok(Self(value))
    }
}

impl Deref for ScopePeriodSeconds {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ScopePeriodSeconds {
    pub(crate) fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.0)
    }
}

/// A single scope's ceiling: at most `limit` calls per `period`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScopeRule {
    /// Calls admitted per window.
    pub limit: ScopeLimit,
    /// Window length.
    pub period: ScopePeriodSeconds,
}

impl ScopeRule {
    /// Build a rule from raw values, validating both.
    pub fn new(limit: u32, period_seconds: f64) -> Result<Self, &'static str> {
        Ok(Self {
            limit: ScopeLimit::try_from(limit)?,
            period: ScopePeriodSeconds::try_from(period_seconds)?,
        })
    }
}

/// Kind of conversation a request targets.
///
/// Group and channel targets are subject to the per-group ceiling in addition
/// to the per-chat one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatScope {
    /// One-on-one conversation.
    Private,
    /// Group or channel conversation.
    Group,
}

/// Ceilings applied by [`Throttler`](crate::Throttler).
///
/// Defaults match the documented platform limits: 1 message per second per
/// chat, 20 messages per minute per group, 30 broadcast sends per second
/// overall.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThrottlerOptions {
    /// Ceiling applied to every request, keyed by chat.
    pub per_chat: ScopeRule,
    /// Ceiling applied to group/channel targets, keyed by chat.
    pub per_group: ScopeRule,
    /// Global ceiling applied to broadcast-flagged requests.
    pub broadcast: ScopeRule,
}

impl Default for ThrottlerOptions {
    fn default() -> Self {
        Self {
            per_chat: ScopeRule {
                limit: ScopeLimit(1),
                period: ScopePeriodSeconds(1.0),
            },
            per_group: ScopeRule {
                limit: ScopeLimit(20),
                period: ScopePeriodSeconds(60.0),
            },
            broadcast: ScopeRule {
                limit: ScopeLimit(30),
                period: ScopePeriodSeconds(1.0),
            },
        }
    }
}

/// Identity of one sliding-window history.
///
/// Per-chat and per-group histories are keyed by the chat; the broadcast
/// history is a single global bucket.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) enum ScopeId {
    Chat(String),
    Group(String),
    Broadcast,
}
