//! Keyword-driven running summary over a window of turns.

use std::fmt;

use crate::protocol::{truncate_chars, Turn};

/// Most recent key points kept in a summary.
pub const MAX_KEY_POINTS: usize = 8;
const KEY_POINT_CHARS: usize = 100;

const DECISION_MARKERS: &[&str] = &[
    "decide", "choose", "adopt", "implement", "approve", "决定", "选择", "采用", "实现", "通过",
];
const CONSTRAINT_MARKERS: &[&str] = &[
    "must", "cannot", "require", "constraint", "必须", "不能", "限制", "要求",
];
const ACTION_MARKERS: &[&str] = &[
    "need", "should", "suggest", "todo", "next", "需要", "应该", "建议",
];

/// Class of a summarised line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPointKind {
    Decision,
    Constraint,
    ActionItem,
}

impl KeyPointKind {
    pub const ALL: [KeyPointKind; 3] = [Self::Decision, Self::Constraint, Self::ActionItem];

    fn markers(self) -> &'static [&'static str] {
        match self {
            Self::Decision => DECISION_MARKERS,
            Self::Constraint => CONSTRAINT_MARKERS,
            Self::ActionItem => ACTION_MARKERS,
        }
    }

    /// Whether `message` carries one of this class's markers (case-insensitive).
    pub fn matches(self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.markers().iter().any(|m| lowered.contains(m))
    }
}

impl fmt::Display for KeyPointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::Constraint => write!(f, "constraint"),
            Self::ActionItem => write!(f, "todo"),
        }
    }
}

/// Build the summary for `window`, oldest first.
///
/// A turn may contribute one line per matching class. Only the last
/// [`MAX_KEY_POINTS`] lines are kept; an empty string means nothing matched.
pub fn summarize(window: &[Turn]) -> String {
    let mut points = Vec::new();
    for turn in window {
        let message = turn.reply.message.as_str();
        for kind in KeyPointKind::ALL {
            if kind.matches(message) {
                points.push(format!(
                    "{kind}-{}: {}",
                    turn.role,
                    truncate_chars(message, KEY_POINT_CHARS)
                ));
            }
        }
    }
    let skip = points.len().saturating_sub(MAX_KEY_POINTS);
    points[skip..].join("\n")
}
