//! Token budget: fits prioritized sections into a fixed capacity.
//!
//! Sections are visited in descending priority (declaration order breaks
//! ties) and allocated greedily from what remains. A section that does not
//! fit whole is compressed by its [`Strategy`]:
//!
//! | Strategy | Overflow behavior |
//! |----------|-------------------|
//! | `Keep` | Omitted entirely |
//! | `Truncate(Head)` | Later items dropped, then the first item clipped |
//! | `Truncate(Tail)` | Earlier items dropped, then the last item clipped |
//! | `Summarize` | Utility-model summary; truncation on failure |
//!
//! # Invariant
//!
//! `estimate_tokens(composed.render()) <= capacity` for every input. Each
//! section is charged [`SEPARATOR_TOKENS`] on top of its own text to pay for
//! the blank line joining it to its neighbour.

use crate::context::section::{ContextSection, Preserve, SectionKind, Strategy, render_with_header};
use crate::context::token::{byte_allowance, clip_head, clip_tail, estimate_tokens};
use crate::context::utility::Summarizer;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, warn};

/// Charged per rendered section for the separator.
pub const SEPARATOR_TOKENS: usize = 1;

/// Marks the side of a section where content was dropped.
pub const TRUNCATION_MARKER: &str = "[... truncated]";

const SECTION_SEPARATOR: &str = "\n\n";

// ── Types ─────────────────────────────────────────────────────────────────

/// A section as it made it into the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedSection {
    pub kind: SectionKind,
    pub priority: i32,
    pub text: String,
    pub tokens: usize,
    /// Content was replaced by a utility-model summary
    pub summarized: bool,
}

/// Detailed metadata about one composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Estimated tokens of the full rendering.
    pub total_tokens: usize,
    /// Capacity the sections were composed into.
    pub budget: usize,
    /// Budget utilization percentage (0.0–100.0).
    pub utilization_pct: f32,
    /// Per-section statistics, in render order.
    pub per_layer: Vec<LayerStats>,
    /// Content removed from each section.
    pub drops: Vec<DropInfo>,
}

/// Statistics for a single section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    /// Items included after budget trimming (a clipped item counts).
    pub items_included: usize,
    pub items_total: usize,
}

/// Information about content dropped from a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    /// Estimated tokens of dropped content.
    pub tokens_dropped: usize,
    pub reason: String,
}

/// The result of [`TokenBudget::compose`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedPrompt {
    /// Sections in render order.
    pub sections: Vec<RenderedSection>,
    pub metadata: AssemblyMetadata,
}

impl ComposedPrompt {
    /// The whole prompt as one string.
    pub fn render(&self) -> String {
        join_sections(self.sections.iter())
    }

    /// Render only the sections of the given kinds, in the order given.
    pub fn render_kinds(&self, kinds: &[SectionKind]) -> String {
        join_sections(kinds.iter().filter_map(|kind| self.section(*kind)))
    }

    pub fn section(&self, kind: SectionKind) -> Option<&RenderedSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

fn join_sections<'a>(sections: impl Iterator<Item = &'a RenderedSection>) -> String {
    sections
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

/// Intermediate: text that fits the allowance it was built for.
struct Fitted {
    text: String,
    items_included: usize,
    summarized: bool,
}

// ── Budget ────────────────────────────────────────────────────────────────

/// Allocates a token capacity across prompt sections.
#[derive(Clone)]
pub struct TokenBudget {
    summarizer: Option<Arc<dyn Summarizer>>,
    summary_target_ratio: f32,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            summarizer: None,
            summary_target_ratio: 0.5,
        }
    }
}

impl TokenBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the `Summarize` strategy. Without a summarizer it behaves like
    /// its truncation fallback.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Fraction of a section's natural size to ask the summarizer for.
    pub fn with_summary_target_ratio(mut self, ratio: f32) -> Self {
        self.summary_target_ratio = ratio.clamp(0.05, 1.0);
        self
    }

    /// Compose sections into at most `capacity` tokens.
    pub async fn compose(&self, sections: &[ContextSection], capacity: usize) -> ComposedPrompt {
        let mut order: Vec<usize> = (0..sections.len()).collect();
        // Stable: equal priorities keep declaration order
        order.sort_by_key(|&i| Reverse(sections[i].priority));

        let mut remaining = capacity;
        let mut rendered = Vec::new();
        let mut per_layer = Vec::new();
        let mut drops = Vec::new();

        for section in order.into_iter().map(|i| &sections[i]) {
            let kind = section.kind;
            let items_total = section.items.len();
            if section.is_empty() {
                per_layer.push(Self::empty_stats(kind, items_total));
                continue;
            }

            let full = section.render();
            let full_tokens = estimate_tokens(&full);
            let fitted = if full_tokens + SEPARATOR_TOKENS <= remaining {
                Some(Fitted {
                    text: full,
                    items_included: items_total,
                    summarized: false,
                })
            } else {
                self.compress(section, remaining, full_tokens).await
            };

            let Some(fitted) = fitted else {
                debug!(section = kind.as_str(), full_tokens, remaining, "Section omitted");
                per_layer.push(Self::empty_stats(kind, items_total));
                drops.extend(Self::maybe_drop(
                    kind,
                    items_total,
                    full_tokens,
                    "no budget remaining",
                ));
                continue;
            };

            let tokens = estimate_tokens(&fitted.text);
            remaining -= tokens + SEPARATOR_TOKENS;

            let reason = if fitted.summarized {
                "summarized to fit budget"
            } else {
                "truncated to fit budget"
            };
            drops.extend(Self::maybe_drop(
                kind,
                items_total - fitted.items_included,
                full_tokens.saturating_sub(tokens),
                reason,
            ));
            per_layer.push(LayerStats {
                name: kind.as_str().into(),
                tokens,
                items_included: fitted.items_included,
                items_total,
            });
            rendered.push(RenderedSection {
                kind,
                priority: section.priority,
                text: fitted.text,
                tokens,
                summarized: fitted.summarized,
            });
        }

        let total_tokens = estimate_tokens(&join_sections(rendered.iter()));
        let utilization_pct = if capacity == 0 {
            0.0
        } else {
            (total_tokens as f32 / capacity as f32) * 100.0
        };

        ComposedPrompt {
            sections: rendered,
            metadata: AssemblyMetadata {
                total_tokens,
                budget: capacity,
                utilization_pct,
                per_layer,
                drops,
            },
        }
    }

    async fn compress(
        &self,
        section: &ContextSection,
        remaining: usize,
        full_tokens: usize,
    ) -> Option<Fitted> {
        let allowance = remaining.checked_sub(SEPARATOR_TOKENS).filter(|a| *a > 0)?;
        match section.strategy {
            Strategy::Keep => None,
            Strategy::Truncate(preserve) => {
                truncate(section.kind, &section.items, allowance, preserve)
            }
            Strategy::Summarize { fallback } => {
                match self.summarize(section, allowance, full_tokens, fallback).await {
                    Some(fitted) => Some(fitted),
                    None => truncate(section.kind, &section.items, allowance, fallback),
                }
            }
        }
    }

    async fn summarize(
        &self,
        section: &ContextSection,
        allowance: usize,
        full_tokens: usize,
        fallback: Preserve,
    ) -> Option<Fitted> {
        let summarizer = self.summarizer.as_ref()?;
        let target = ((full_tokens as f32 * self.summary_target_ratio).ceil() as usize)
            .clamp(1, allowance);

        let summary = match summarizer.summarize(&section.body(), target).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(section = section.kind.as_str(), error = %e, "Summarization failed, truncating instead");
                return None;
            }
        };

        let text = render_with_header(section.kind, &[summary.as_str()]);
        let mut fitted = if estimate_tokens(&text) <= allowance {
            Fitted {
                text,
                items_included: 0,
                summarized: true,
            }
        } else {
            // The model overshot its target
            truncate(section.kind, &[summary], allowance, fallback)?
        };
        fitted.items_included = section.items.len();
        fitted.summarized = true;
        Some(fitted)
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    fn empty_stats(kind: SectionKind, total: usize) -> LayerStats {
        LayerStats {
            name: kind.as_str().into(),
            tokens: 0,
            items_included: 0,
            items_total: total,
        }
    }

    fn maybe_drop(kind: SectionKind, count: usize, tokens: usize, reason: &str) -> Option<DropInfo> {
        if count > 0 || tokens > 0 {
            Some(DropInfo {
                layer: kind.as_str().into(),
                items_dropped: count,
                tokens_dropped: tokens,
                reason: reason.into(),
            })
        } else {
            None
        }
    }
}

/// Keep whole items from the preserved end while they fit, marking the cut.
/// When not even one item fits whole, clip it instead.
fn truncate(
    kind: SectionKind,
    items: &[String],
    allowance: usize,
    preserve: Preserve,
) -> Option<Fitted> {
    let budget = byte_allowance(allowance);
    let ordered: Vec<&str> = match preserve {
        Preserve::Head => items.iter().map(String::as_str).collect(),
        Preserve::Tail => items.iter().rev().map(String::as_str).collect(),
    };

    // Header plus the marker line
    let fixed = kind.header().len() + 1 + TRUNCATION_MARKER.len();
    if fixed >= budget {
        return None;
    }

    let mut used = fixed;
    let mut kept: Vec<&str> = Vec::new();
    for item in ordered.iter().copied() {
        let cost = item.len() + 1;
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(item);
    }

    if kept.len() == ordered.len() {
        return Some(Fitted {
            text: render_with_header(kind, items),
            items_included: items.len(),
            summarized: false,
        });
    }

    if kept.is_empty() {
        let first = ordered.first()?;
        let room = budget - fixed - 1;
        let part = match preserve {
            Preserve::Head => clip_head(first, room),
            Preserve::Tail => clip_tail(first, room),
        };
        if part.trim().is_empty() {
            return None;
        }
        kept.push(part);
    }

    let items_included = kept.len();
    let parts: Vec<&str> = match preserve {
        Preserve::Head => kept.into_iter().chain([TRUNCATION_MARKER]).collect(),
        Preserve::Tail => [TRUNCATION_MARKER]
            .into_iter()
            .chain(kept.into_iter().rev())
            .collect(),
    };

    Some(Fitted {
        text: render_with_header(kind, &parts),
        items_included,
        summarized: false,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────
