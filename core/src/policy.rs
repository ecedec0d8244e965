use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Ok,
    Warn,
    Fail,
}

/// Exit codes a unit accepts outright (`ok`) or accepts with a logged
/// warning (`warn`). Anything else fails the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnCodePolicy {
    ok: BTreeSet<i32>,
    warn: BTreeSet<i32>,
}

impl ReturnCodePolicy {
    pub fn new<O, W>(ok: O, warn: W) -> Self
    where
        O: IntoIterator<Item = i32>,
        W: IntoIterator<Item = i32>,
    {
        Self {
            ok: ok.into_iter().collect(),
            warn: warn.into_iter().collect(),
        }
    }

    /// A policy with neither set filled in: every code fails.
    pub fn empty() -> Self {
        Self::new([], [])
    }

    pub fn with_ok<I: IntoIterator<Item = i32>>(mut self, codes: I) -> Self {
        self.ok = codes.into_iter().collect();
        self
    }

    pub fn with_warn<I: IntoIterator<Item = i32>>(mut self, codes: I) -> Self {
        self.warn = codes.into_iter().collect();
        self
    }

    pub fn ok_codes(&self) -> &BTreeSet<i32> {
        &self.ok
    }

    pub fn warn_codes(&self) -> &BTreeSet<i32> {
        &self.warn
    }

    pub fn classify(&self, code: i32) -> ReturnCode {
        if self.ok.contains(&code) {
            ReturnCode::Ok
        } else if self.warn.contains(&code) {
            ReturnCode::Warn
        } else {
            ReturnCode::Fail
        }
    }

    /// Processes killed by a signal carry no exit code and always fail.
    pub fn classify_status(&self, code: Option<i32>) -> ReturnCode {
        code.map_or(ReturnCode::Fail, |code| self.classify(code))
    }
}

impl Default for ReturnCodePolicy {
    fn default() -> Self {
        Self::new([0], [])
    }
}
