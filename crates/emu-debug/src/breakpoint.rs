//! A single breakpoint.

use std::fmt;

use crate::condition::{Condition, ConditionError};

/// Who set a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind {
    /// Set by the user; stays until removed.
    User,
    /// Temporary, placed by a step-over and removed when hit.
    StepOver,
    /// Placed by the assembler for a run-to-cursor style stop.
    Assembler,
}

impl fmt::Display for BreakpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::StepOver => "step-over",
            Self::Assembler => "assembler",
        })
    }
}

/// An address, a kind and an optional condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub address: u16,
    pub kind: BreakpointKind,
    condition: Option<Condition>,
}

impl Breakpoint {
    #[must_use]
    pub const fn new(address: u16, kind: BreakpointKind) -> Self {
        Self {
            address,
            kind,
            condition: None,
        }
    }

    /// Replace the condition. Blank text removes it. On a compile error
    /// the previous condition is kept.
    pub fn set_condition(&mut self, text: Option<&str>) -> Result<(), ConditionError> {
        self.condition = match text.map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(Condition::compile(text)?),
        };
        Ok(())
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// True if execution should stop here.
    #[must_use]
    pub fn test_condition(&self) -> bool {
        self.condition.as_ref().is_none_or(Condition::evaluate)
    }
}
