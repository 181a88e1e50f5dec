//! Channel reconciler: makes the destination channel match the latest rendered payloads with
//! the fewest chat calls. Owns the only state carried between ticks.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tokio::time::Instant;

use crate::chat::log::summarize;
use crate::chat::{ChatApiError, ChatCapabilities, ChatGateway, ChatTransport, MessageContent, MessageId};
use crate::render::{RenderedPayload, SlotIndex};

/// History pages walked by one purge before giving up on reaching the bottom.
pub const DEFAULT_MAX_PURGE_PAGES: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedMessage {
    pub id: MessageId,
    /// Content as last successfully written.
    pub content: MessageContent,
}

/// Slot → live message. Starts unsynced so the first tick purges the channel.
#[derive(Debug, Default)]
pub struct ChannelMessageState {
    slots: BTreeMap<SlotIndex, TrackedMessage>,
    synced: bool,
}

impl ChannelMessageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State that trusts `slots` as-is (no purge on the next tick).
    pub fn synced_with(slots: impl IntoIterator<Item = (SlotIndex, TrackedMessage)>) -> Self {
        Self {
            slots: slots.into_iter().collect(),
            synced: true,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn mark_unsynced(&mut self) {
        self.synced = false;
    }

    pub fn get(&self, slot: SlotIndex) -> Option<&TrackedMessage> {
        self.slots.get(&slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.slots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn record(&mut self, slot: SlotIndex, id: MessageId, content: MessageContent) {
        self.slots.insert(slot, TrackedMessage { id, content });
    }

    fn remove(&mut self, slot: SlotIndex) {
        self.slots.remove(&slot);
    }

    fn reset(&mut self) {
        self.slots.clear();
        self.synced = true;
    }
}

/// A tracked message id no longer resolves; the channel changed behind our back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tracked message {id} for slot {slot} no longer exists")]
pub struct ConsistencyError {
    pub slot: SlotIndex,
    pub id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Channel history could not be read, or deletes ran out of retries; nothing was posted
    /// this tick.
    #[error("channel purge failed: {0}")]
    Purge(ChatApiError),
}

impl ReconcileError {
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            ReconcileError::Purge(e) => e.is_unrecoverable(),
        }
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub posted: usize,
    pub edited: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Operations that failed after retries; their state entries were left for the next tick.
    pub failed: usize,
    /// Messages removed by a channel purge.
    pub purged: usize,
    /// Messages a purge could not remove (usually missing Manage Messages); left in place.
    pub purge_skipped: usize,
    /// Set when a vanished message forced an in-tick purge and rerun.
    pub resynced: bool,
    /// Chat API calls issued, retries included.
    pub api_calls: u64,
}

pub struct Reconciler<T> {
    gateway: ChatGateway<T>,
    state: ChannelMessageState,
    max_purge_pages: usize,
}

impl<T> Reconciler<T>
where
    T: ChatTransport,
{
    pub fn new(gateway: ChatGateway<T>) -> Self {
        Self::with_state(gateway, ChannelMessageState::new())
    }

    pub fn with_state(gateway: ChatGateway<T>, state: ChannelMessageState) -> Self {
        Self {
            gateway,
            state,
            max_purge_pages: DEFAULT_MAX_PURGE_PAGES,
        }
    }

    pub fn with_max_purge_pages(mut self, pages: usize) -> Self {
        self.max_purge_pages = pages.max(1);
        self
    }

    pub fn capabilities(&self) -> ChatCapabilities {
        self.gateway.transport().capabilities()
    }

    pub fn state(&self) -> &ChannelMessageState {
        &self.state
    }

    /// Purge the channel and repost everything on the next pass.
    pub fn request_resync(&mut self) {
        self.state.mark_unsynced();
    }

    /// Bring the channel in line with `payloads`. Deletes run before posts; waits and retries
    /// never extend past `deadline`. Only an aborted purge is an error; any other failed
    /// operation is counted in the report and retried on the next pass.
    pub async fn reconcile(
        &mut self,
        payloads: &[RenderedPayload],
        deadline: Option<Instant>,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.gateway.set_deadline(deadline);
        let calls_before = self.gateway.calls_issued();
        let mut report = ReconcileReport::default();

        let mut ordered: Vec<&RenderedPayload> = payloads.iter().collect();
        ordered.sort_by_key(|p| p.slot);

        let result = self.reconcile_ordered(&ordered, &mut report).await;
        report.api_calls = self.gateway.calls_issued() - calls_before;
        result.map(|()| report)
    }

    async fn reconcile_ordered(
        &mut self,
        payloads: &[&RenderedPayload],
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        loop {
            if !self.state.is_synced() {
                self.purge(report).await?;
            }
            match self.apply(payloads, report).await {
                Ok(()) => return Ok(()),
                Err(stale) if !report.resynced => {
                    tracing::warn!(slot = %stale.slot, message_id = %stale.id, "{stale}; resyncing channel");
                    self.state.mark_unsynced();
                    report.resynced = true;
                }
                Err(stale) => {
                    tracing::warn!(slot = %stale.slot, message_id = %stale.id, "{stale}; retrying next tick");
                    self.state.mark_unsynced();
                    return Ok(());
                }
            }
        }
    }

    async fn apply(
        &mut self,
        payloads: &[&RenderedPayload],
        report: &mut ReconcileReport,
    ) -> Result<(), ConsistencyError> {
        let wanted: BTreeSet<SlotIndex> = payloads.iter().map(|p| p.slot).collect();
        let stale: Vec<(SlotIndex, MessageId)> = self
            .state
            .slots
            .iter()
            .filter(|(slot, _)| !wanted.contains(slot))
            .map(|(slot, tracked)| (*slot, tracked.id))
            .collect();

        for (slot, id) in stale {
            match self.gateway.delete(id).await {
                Ok(()) | Err(ChatApiError::NotFound) => {
                    tracing::debug!(%slot, message_id = %id, "slot message deleted");
                    self.state.remove(slot);
                    report.deleted += 1;
                }
                Err(e) => {
                    log_failure("delete", slot, &e);
                    report.failed += 1;
                }
            }
        }

        for payload in payloads {
            let slot = payload.slot;
            match self.state.get(slot) {
                Some(tracked) if tracked.content == payload.content => report.unchanged += 1,
                Some(tracked) => {
                    let id = tracked.id;
                    match self.gateway.edit(id, &payload.content).await {
                        Ok(()) => {
                            tracing::debug!(%slot, message_id = %id, content = %summarize(&payload.content), "slot message edited");
                            self.state.record(slot, id, payload.content.clone());
                            report.edited += 1;
                        }
                        Err(ChatApiError::NotFound) => return Err(ConsistencyError { slot, id }),
                        Err(e) => {
                            log_failure("edit", slot, &e);
                            report.failed += 1;
                        }
                    }
                }
                None => match self.gateway.send(&payload.content).await {
                    Ok(id) => {
                        tracing::debug!(%slot, message_id = %id, content = %summarize(&payload.content), "slot message posted");
                        self.state.record(slot, id, payload.content.clone());
                        report.posted += 1;
                    }
                    Err(e) => {
                        log_failure("post", slot, &e);
                        report.failed += 1;
                        if e.is_unconfirmed() {
                            // The message may exist untracked; clear the channel next tick.
                            self.state.mark_unsynced();
                        }
                    }
                },
            }
        }
        Ok(())
    }

    /// Delete every message in the channel, newest first, then start from empty state.
    /// Messages the bot may not delete are skipped and purging stops after that page; only a
    /// failed history read or spent retries abort the tick.
    async fn purge(&mut self, report: &mut ReconcileReport) -> Result<(), ReconcileError> {
        let page_size = self.capabilities().history_page_size.max(1);
        let mut exhausted_pages = true;

        for _ in 0..self.max_purge_pages {
            let ids = self
                .gateway
                .list_messages(page_size)
                .await
                .map_err(ReconcileError::Purge)?;
            let last_page = ids.len() < usize::from(page_size);
            let skipped_before = report.purge_skipped;
            for id in ids {
                match self.gateway.delete(id).await {
                    Ok(()) | Err(ChatApiError::NotFound) => report.purged += 1,
                    Err(e @ ChatApiError::Exhausted { .. }) => return Err(ReconcileError::Purge(e)),
                    Err(error) => {
                        tracing::error!(message_id = %id, %error, "cannot delete channel message; leaving it in place");
                        report.purge_skipped += 1;
                    }
                }
            }
            if last_page || report.purge_skipped > skipped_before {
                exhausted_pages = false;
                break;
            }
        }
        if exhausted_pages {
            tracing::warn!(
                pages = self.max_purge_pages,
                "channel purge stopped at page limit; older messages remain"
            );
        }

        self.state.reset();
        tracing::info!(
            target_channel = %self.gateway.transport().target(),
            deleted = report.purged,
            skipped = report.purge_skipped,
            "channel purged"
        );
        Ok(())
    }
}

fn log_failure(op: &'static str, slot: SlotIndex, error: &ChatApiError) {
    if error.is_unrecoverable() {
        tracing::error!(op, %slot, %error, "chat operation rejected; check bot permissions");
    } else {
        tracing::warn!(op, %slot, %error, "chat operation failed; retrying next tick");
    }
}
