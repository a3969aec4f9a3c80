//! Prompt sections: the per-turn building blocks of a prompt.
//!
//! Sections are built fresh every turn from live state and never persisted.
//! Each one carries a priority and a compression strategy that
//! [`TokenBudget`](crate::context::TokenBudget) applies when the section does
//! not fit whole.

use serde::{Deserialize, Serialize};

/// What a section holds. Also decides which message of the final prompt it
/// lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    SystemInstructions,
    Notes,
    Memories,
    Tools,
    History,
    UserQuery,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemInstructions => "system",
            Self::Notes => "notes",
            Self::Memories => "memories",
            Self::Tools => "tools",
            Self::History => "history",
            Self::UserQuery => "user_query",
        }
    }

    /// Header line rendered above the section's items.
    pub fn header(&self) -> &'static str {
        match self {
            Self::SystemInstructions => "[System]",
            Self::Notes => "[Notes]",
            Self::Memories => "[Long-Term Memory]",
            Self::Tools => "[Available Tools]",
            Self::History => "[Conversation History]",
            Self::UserQuery => "[User]",
        }
    }

    pub fn default_priority(&self) -> i32 {
        match self {
            Self::SystemInstructions => 100,
            Self::UserQuery => 95,
            Self::Notes => 90,
            Self::Tools => 80,
            Self::Memories => 70,
            Self::History => 60,
        }
    }

    pub fn default_strategy(&self) -> Strategy {
        match self {
            Self::SystemInstructions | Self::Tools => Strategy::Keep,
            Self::UserQuery => Strategy::Truncate(Preserve::Head),
            Self::Notes => Strategy::Summarize {
                fallback: Preserve::Head,
            },
            // Items arrive most relevant first
            Self::Memories => Strategy::Truncate(Preserve::Head),
            // Most recent turns matter more
            Self::History => Strategy::Truncate(Preserve::Tail),
        }
    }
}

/// Which end of a section survives truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preserve {
    Head,
    Tail,
}

/// How a section is compressed when it does not fit its share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    /// Render whole or not at all.
    Keep,
    /// Drop items (then clip text) from the other end.
    Truncate(Preserve),
    /// Ask the utility model for a shorter version; truncate on failure.
    Summarize { fallback: Preserve },
}

/// One prioritized block of prompt content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub kind: SectionKind,
    pub priority: i32,
    pub items: Vec<String>,
    pub strategy: Strategy,
}

impl ContextSection {
    /// A section with the kind's default priority and strategy.
    pub fn new(kind: SectionKind, items: Vec<String>) -> Self {
        Self {
            kind,
            priority: kind.default_priority(),
            items,
            strategy: kind.default_strategy(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.iter().all(|item| item.trim().is_empty())
    }

    /// The items joined, without the header.
    pub fn body(&self) -> String {
        self.items.join("\n")
    }

    /// Full rendering: header line followed by every item.
    pub fn render(&self) -> String {
        render_with_header(self.kind, &self.items)
    }
}

pub(crate) fn render_with_header<S: AsRef<str>>(kind: SectionKind, parts: &[S]) -> String {
    let mut out = String::from(kind.header());
    for part in parts {
        out.push('\n');
        out.push_str(part.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_puts_header_first() {
        let section = ContextSection::new(
            SectionKind::Memories,
            vec!["- deploy via CI".into(), "- staging first".into()],
        );
        assert_eq!(
            section.render(),
            "[Long-Term Memory]\n- deploy via CI\n- staging first"
        );
    }

    #[test]
    fn blank_items_count_as_empty() {
        assert!(ContextSection::new(SectionKind::Notes, vec![]).is_empty());
        assert!(ContextSection::new(SectionKind::Notes, vec!["  ".into()]).is_empty());
        assert!(!ContextSection::new(SectionKind::Notes, vec!["x".into()]).is_empty());
    }

    #[test]
    fn history_defaults_to_tail_truncation() {
        let section = ContextSection::new(SectionKind::History, vec![]);
        assert_eq!(section.strategy, Strategy::Truncate(Preserve::Tail));
        assert!(section.priority < SectionKind::SystemInstructions.default_priority());
    }
}
