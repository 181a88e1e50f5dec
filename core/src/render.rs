//! Renderer: snapshot → ordered chat payloads, one logical slot per group, split into pages
//! to fit the platform's per-message limits. Pure; output depends only on the snapshot contents.

use std::fmt;

use crate::chat::{ChatCapabilities, Embed, MessageContent};
use crate::instance::{Category, InstanceKind};
use crate::queue::QueueItem;
use crate::snapshot::{InstanceResult, Snapshot};

/// Shown when no instance is configured at all.
pub const NOTHING_DOWNLOADING: &str = "Nothing is being downloaded at the moment. :)";

const PROGRESS_CELLS: usize = 20;
const EMBED_TITLE_MAX: usize = 256;
const EMBED_FIELD_MAX: usize = 1024;
const NOT_AVAILABLE: &str = "N/A";

/// Stable logical position of one chat message: group (instance or category, in registry
/// order) and page within that group. Orders the channel top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex {
    pub group: usize,
    pub page: usize,
}

impl SlotIndex {
    pub fn new(group: usize, page: usize) -> Self {
        Self { group, page }
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.page)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPayload {
    pub slot: SlotIndex,
    pub content: MessageContent,
}

/// How instances are folded into slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotGrouping {
    /// One slot (plus overflow pages) per configured instance.
    #[default]
    PerInstance,
    /// One slot per category; all Sonarr instances share one, all Radarr instances another.
    PerCategory,
}

impl SlotGrouping {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "instance" | "perinstance" => Some(Self::PerInstance),
            "category" | "percategory" => Some(Self::PerCategory),
            _ => None,
        }
    }
}

/// Per-message limits, taken from the transport's capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLimits {
    pub max_text_len: usize,
    pub max_embeds: usize,
    pub max_embed_chars: usize,
}

impl From<&ChatCapabilities> for RenderLimits {
    fn from(caps: &ChatCapabilities) -> Self {
        Self {
            max_text_len: caps.max_message_len,
            max_embeds: caps.max_embeds_per_message.max(1),
            max_embed_chars: caps.max_embed_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub grouping: SlotGrouping,
    pub limits: RenderLimits,
}

impl RenderOptions {
    pub fn new(grouping: SlotGrouping, caps: &ChatCapabilities) -> Self {
        Self {
            grouping,
            limits: caps.into(),
        }
    }
}

pub fn render(snapshot: &Snapshot, options: &RenderOptions) -> Vec<RenderedPayload> {
    if snapshot.results.is_empty() {
        return vec![RenderedPayload {
            slot: SlotIndex::new(0, 0),
            content: MessageContent::text(NOTHING_DOWNLOADING),
        }];
    }

    let groups: Vec<(String, Vec<&InstanceResult>)> = match options.grouping {
        SlotGrouping::PerInstance => snapshot
            .results
            .iter()
            .map(|result| (result.label.clone(), vec![result]))
            .collect(),
        SlotGrouping::PerCategory => {
            let mut groups: Vec<(Category, Vec<&InstanceResult>)> = Vec::new();
            for result in &snapshot.results {
                let category = result.kind.category();
                match groups.iter_mut().find(|(c, _)| *c == category) {
                    Some((_, members)) => members.push(result),
                    None => groups.push((category, vec![result])),
                }
            }
            groups
                .into_iter()
                .map(|(category, members)| (category.label().to_string(), members))
                .collect()
        }
    };

    let mut payloads = Vec::new();
    for (group, (title, members)) in groups.iter().enumerate() {
        let header = match options.grouping {
            SlotGrouping::PerInstance => format!("**{}** · {}", title, state_line(members[0])),
            SlotGrouping::PerCategory => {
                let mut header = format!("**{title}**");
                for member in members {
                    header.push_str(&format!("\n{} · {}", member.label, state_line(member)));
                }
                header
            }
        };
        let embeds = members
            .iter()
            .filter_map(|m| m.outcome.as_ref().ok().map(|items| (*m, items)))
            .flat_map(|(member, items)| items.iter().map(move |item| item_embed(member, item)))
            .collect();
        payloads.extend(paginate(group, title, header, embeds, &options.limits));
    }
    payloads
}

/// `N active`, `idle`, or `instance unavailable: <reason>`.
fn state_line(result: &InstanceResult) -> String {
    match &result.outcome {
        Ok(items) if items.is_empty() => "idle".to_string(),
        Ok(items) => format!("{} active", items.len()),
        Err(error) => format!("instance unavailable: {}", error.kind),
    }
}

fn paginate(
    group: usize,
    title: &str,
    header: String,
    embeds: Vec<Embed>,
    limits: &RenderLimits,
) -> Vec<RenderedPayload> {
    let mut pages: Vec<Vec<Embed>> = vec![Vec::new()];
    let mut chars = 0;
    for embed in embeds {
        let size = embed.char_count();
        let full = pages.last().is_some_and(|page| {
            !page.is_empty() && (page.len() >= limits.max_embeds || chars + size > limits.max_embed_chars)
        });
        if full {
            pages.push(Vec::new());
            chars = 0;
        }
        chars += size;
        if let Some(page) = pages.last_mut() {
            page.push(embed);
        }
    }

    pages
        .into_iter()
        .enumerate()
        .map(|(page, embeds)| {
            let text = if page == 0 {
                header.clone()
            } else {
                format!("**{}** (page {})", title, page + 1)
            };
            RenderedPayload {
                slot: SlotIndex::new(group, page),
                content: MessageContent {
                    text: clip(&text, limits.max_text_len),
                    embeds,
                },
            }
        })
        .collect()
}

fn item_embed(instance: &InstanceResult, item: &QueueItem) -> Embed {
    let mut embed = Embed {
        title: Some(clip(&item.title, EMBED_TITLE_MAX)),
        author: Some(clip(&instance.label, EMBED_TITLE_MAX)),
        colour: Some(kind_colour(instance.kind)),
        thumbnail_url: item.poster_url.clone(),
        ..Embed::default()
    };
    if let Some(detail) = &item.detail {
        let name = match instance.kind {
            InstanceKind::Sonarr => "Episode",
            InstanceKind::Radarr => "Movie",
        };
        embed = embed.field(name, clip(detail, EMBED_FIELD_MAX), false);
    }
    embed = embed
        .field("Time Left", field_or_na(item.time_left.as_deref()), true)
        .field(
            "Estimated Completion",
            field_or_na(item.estimated_completion.as_deref()),
            true,
        )
        .field("Status", item.status.to_string(), true)
        .field("Progress", progress_line(item.progress), false);
    if let Some(error) = &item.error_message {
        embed = embed.field("Error", clip(error, EMBED_FIELD_MAX), false);
    }
    embed
}

pub fn kind_colour(kind: InstanceKind) -> u32 {
    match kind {
        InstanceKind::Sonarr => 0x00b0f4,
        InstanceKind::Radarr => 0xbd5b00,
    }
}

/// `[██████████----------] 50%`; whole-number percentage.
pub fn progress_line(progress: Option<f64>) -> String {
    let Some(fraction) = progress.filter(|p| p.is_finite()) else {
        return "Progress unavailable".to_string();
    };
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = ((fraction * PROGRESS_CELLS as f64).floor() as usize).min(PROGRESS_CELLS);
    format!(
        "[{}{}] {}%",
        "█".repeat(filled),
        "-".repeat(PROGRESS_CELLS - filled),
        (fraction * 100.0).round() as u32
    )
}

fn field_or_na(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => clip(v, EMBED_FIELD_MAX),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Cut to at most `max` chars, marking the cut with an ellipsis.
fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceConfig;
    use crate::queue::{BackendError, FailureKind, ItemStatus};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn caps() -> ChatCapabilities {
        ChatCapabilities {
            max_message_len: 2000,
            max_embeds_per_message: 10,
            max_embed_chars: 6000,
            history_page_size: 100,
            channel_id_prefix: "test",
        }
    }

    fn instance(id: &str, kind: InstanceKind) -> InstanceConfig {
        InstanceConfig::new(id, kind, "http://localhost:8989", "key", id.to_uppercase()).unwrap()
    }

    fn item(id: &str, title: &str, progress: f64) -> QueueItem {
        QueueItem::new(id, title, ItemStatus::Downloading).with_progress(progress)
    }

    fn snapshot(results: Vec<InstanceResult>) -> Snapshot {
        Snapshot {
            taken_at: Utc::now(),
            results,
        }
    }

    #[test]
    fn progress_bar_rounds_to_whole_percent() {
        assert_eq!(progress_line(Some(0.5)), "[██████████----------] 50%");
        assert_eq!(progress_line(Some(0.8049)), "[████████████████----] 80%");
        assert_eq!(progress_line(Some(1.0)), "[████████████████████] 100%");
        assert_eq!(progress_line(None), "Progress unavailable");
    }

    #[test]
    fn idle_and_unavailable_render_differently() {
        let a = instance("a", InstanceKind::Sonarr);
        let idle = render(
            &snapshot(vec![InstanceResult::ok(&a, vec![])]),
            &RenderOptions::new(SlotGrouping::PerInstance, &caps()),
        );
        let broken = render(
            &snapshot(vec![InstanceResult::err(&a, BackendError::new(FailureKind::Timeout, "slow"))]),
            &RenderOptions::new(SlotGrouping::PerInstance, &caps()),
        );

        assert_eq!(idle[0].content.text, "**A** · idle");
        assert_eq!(broken[0].content.text, "**A** · instance unavailable: timeout");
        assert_ne!(idle[0].content, broken[0].content);
        assert!(broken[0].content.embeds.is_empty());
    }

    #[test]
    fn one_slot_per_instance_with_item_percentages() {
        let a = instance("a", InstanceKind::Sonarr);
        let b = instance("b", InstanceKind::Radarr);
        let payloads = render(
            &snapshot(vec![
                InstanceResult::ok(&a, vec![item("a", "Show", 0.5)]),
                InstanceResult::ok(&b, vec![item("b", "Film", 0.8)]),
            ]),
            &RenderOptions::new(SlotGrouping::PerInstance, &caps()),
        );

        let slots: Vec<_> = payloads.iter().map(|p| p.slot).collect();
        assert_eq!(slots, [SlotIndex::new(0, 0), SlotIndex::new(1, 0)]);
        let progress = |p: &RenderedPayload| p.content.embeds[0].fields.iter().find(|f| f.name == "Progress").unwrap().value.clone();
        assert!(progress(&payloads[0]).ends_with(" 50%"));
        assert!(progress(&payloads[1]).ends_with(" 80%"));
        assert_eq!(payloads[0].content.embeds[0].colour, Some(0x00b0f4));
        assert_eq!(payloads[1].content.embeds[0].colour, Some(0xbd5b00));
    }

    #[test]
    fn overflow_spills_into_further_pages_of_the_same_group() {
        let a = instance("a", InstanceKind::Radarr);
        let items = (0..23).map(|i| item("a", &format!("Film {i}"), 0.1)).collect();
        let payloads = render(
            &snapshot(vec![InstanceResult::ok(&a, items)]),
            &RenderOptions::new(SlotGrouping::PerInstance, &caps()),
        );

        let sizes: Vec<_> = payloads.iter().map(|p| (p.slot, p.content.embeds.len())).collect();
        assert_eq!(
            sizes,
            [
                (SlotIndex::new(0, 0), 10),
                (SlotIndex::new(0, 1), 10),
                (SlotIndex::new(0, 2), 3)
            ]
        );
        assert_eq!(payloads[0].content.text, "**A** · 23 active");
        assert_eq!(payloads[2].content.text, "**A** (page 3)");
    }

    #[test]
    fn embed_character_budget_also_splits_pages() {
        let a = instance("a", InstanceKind::Sonarr);
        let mut big = item("a", "Show", 0.3);
        big.error_message = Some("x".repeat(1000));
        let options = RenderOptions {
            grouping: SlotGrouping::PerInstance,
            limits: RenderLimits {
                max_text_len: 2000,
                max_embeds: 10,
                max_embed_chars: 1500,
            },
        };
        let payloads = render(&snapshot(vec![InstanceResult::ok(&a, vec![big.clone(), big])]), &options);
        assert_eq!(payloads.len(), 2);
        assert!(payloads.iter().all(|p| p.content.embeds.len() == 1));
    }

    #[test]
    fn per_category_grouping_merges_instances_of_one_kind() {
        let tv = instance("tv", InstanceKind::Sonarr);
        let anime = instance("anime", InstanceKind::Sonarr);
        let movies = instance("movies", InstanceKind::Radarr);
        let payloads = render(
            &snapshot(vec![
                InstanceResult::ok(&tv, vec![item("tv", "Show", 0.2)]),
                InstanceResult::ok(&movies, vec![]),
                InstanceResult::err(&anime, BackendError::new(FailureKind::Auth, "401")),
            ]),
            &RenderOptions::new(SlotGrouping::PerCategory, &caps()),
        );

        assert_eq!(payloads.len(), 2);
        assert_eq!(
            payloads[0].content.text,
            "**Series**\nTV · 1 active\nANIME · instance unavailable: authentication failed"
        );
        assert_eq!(payloads[1].content.text, "**Movies**\nMOVIES · idle");
        assert_eq!(payloads[0].content.embeds.len(), 1);
    }

    #[test]
    fn empty_registry_renders_placeholder() {
        let payloads = render(&snapshot(vec![]), &RenderOptions::new(SlotGrouping::default(), &caps()));
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].content.text, NOTHING_DOWNLOADING);
    }

    #[test]
    fn identical_snapshots_render_identically() {
        let a = instance("a", InstanceKind::Sonarr);
        let results = vec![InstanceResult::ok(&a, vec![item("a", "Show", 0.42)])];
        let options = RenderOptions::new(SlotGrouping::PerInstance, &caps());
        let first = render(&snapshot(results.clone()), &options);
        let second = render(&snapshot(results), &options);
        assert_eq!(first, second);
    }
}
