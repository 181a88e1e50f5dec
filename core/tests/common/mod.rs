#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrwatch::chat::{ChatApiError, ChatCapabilities, ChatGateway, ChatTransport, MessageContent, MessageId, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Send,
    Edit,
    Delete,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send,
    Edit(MessageId),
    Delete(MessageId),
    List,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    /// Oldest first (ids only grow).
    messages: BTreeMap<u64, MessageContent>,
    calls: Vec<Call>,
    failures: VecDeque<(Op, ChatApiError)>,
    lost_send_replies: VecDeque<ChatApiError>,
}

/// In-memory channel that records every call and can be told to fail specific ones.
#[derive(Default)]
pub struct FakeChannel {
    inner: Mutex<Inner>,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A message that was already in the channel (e.g. from a previous run).
    pub fn seed(&self, text: &str) -> MessageId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.insert(id, MessageContent::text(text));
        MessageId(id)
    }

    /// Make the next call of kind `op` fail with `error`.
    pub fn fail_next(&self, op: Op, error: ChatApiError) {
        self.inner.lock().unwrap().failures.push_back((op, error));
    }

    /// The next send lands in the channel but the caller gets `error` instead of the id.
    pub fn lose_next_send_reply(&self, error: ChatApiError) {
        self.inner.lock().unwrap().lost_send_replies.push_back(error);
    }

    /// Someone deleted a message by hand.
    pub fn remove_externally(&self, id: MessageId) {
        self.inner.lock().unwrap().messages.remove(&id.0);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Channel contents top to bottom.
    pub fn texts(&self) -> Vec<String> {
        self.inner.lock().unwrap().messages.values().map(|m| m.text.clone()).collect()
    }

    pub fn contents(&self) -> Vec<MessageContent> {
        self.inner.lock().unwrap().messages.values().cloned().collect()
    }

    fn begin(&self, op: Op, call: Call) -> Result<std::sync::MutexGuard<'_, Inner>, ChatApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if let Some(pos) = inner.failures.iter().position(|(o, _)| *o == op) {
            let (_, error) = inner.failures.remove(pos).unwrap();
            return Err(error);
        }
        Ok(inner)
    }
}

#[async_trait::async_trait]
impl ChatTransport for FakeChannel {
    fn capabilities(&self) -> ChatCapabilities {
        ChatCapabilities {
            max_message_len: 2000,
            max_embeds_per_message: 10,
            max_embed_chars: 6000,
            history_page_size: 100,
            channel_id_prefix: "fake",
        }
    }

    fn target(&self) -> String {
        "fake:1".into()
    }

    async fn send(&self, content: &MessageContent) -> Result<MessageId, ChatApiError> {
        let mut inner = self.begin(Op::Send, Call::Send)?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.insert(id, content.clone());
        match inner.lost_send_replies.pop_front() {
            Some(error) => Err(error),
            None => Ok(MessageId(id)),
        }
    }

    async fn edit(&self, id: MessageId, content: &MessageContent) -> Result<(), ChatApiError> {
        let mut inner = self.begin(Op::Edit, Call::Edit(id))?;
        match inner.messages.get_mut(&id.0) {
            Some(existing) => {
                *existing = content.clone();
                Ok(())
            }
            None => Err(ChatApiError::NotFound),
        }
    }

    async fn delete(&self, id: MessageId) -> Result<(), ChatApiError> {
        let mut inner = self.begin(Op::Delete, Call::Delete(id))?;
        match inner.messages.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(ChatApiError::NotFound),
        }
    }

    async fn list_messages(&self, limit: u8) -> Result<Vec<MessageId>, ChatApiError> {
        let inner = self.begin(Op::List, Call::List)?;
        Ok(inner
            .messages
            .keys()
            .rev()
            .take(usize::from(limit))
            .map(|id| MessageId(*id))
            .collect())
    }
}

/// Gateway without call spacing so tests only wait on retries.
pub fn gateway(channel: &Arc<FakeChannel>) -> ChatGateway<FakeChannel> {
    ChatGateway::new(Arc::clone(channel), RetryPolicy::default()).with_min_interval(Duration::ZERO)
}
