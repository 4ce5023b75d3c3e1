//! Bounded render queue of received messages.

use crate::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Where new messages land in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderOrder {
    /// Append; the newest message is last.
    NewestLast,
    /// Prepend; the newest message is first.
    NewestFirst,
}

#[derive(Debug, Clone)]
pub struct MessageLog {
    order: RenderOrder,
    limit: usize,
    entries: VecDeque<ChatMessage>,
}

impl MessageLog {
    pub fn new(order: RenderOrder, limit: usize) -> Self {
        Self {
            order,
            limit,
            entries: VecDeque::new(),
        }
    }

    pub fn order(&self) -> RenderOrder {
        self.order
    }

    /// Insert a message, evicting the oldest one once over the limit.
    pub fn push(&mut self, message: ChatMessage) {
        match self.order {
            RenderOrder::NewestLast => {
                self.entries.push_back(message);
                if self.entries.len() > self.limit {
                    self.entries.pop_front();
                }
            }
            RenderOrder::NewestFirst => {
                self.entries.push_front(message);
                if self.entries.len() > self.limit {
                    self.entries.pop_back();
                }
            }
        }
    }

    /// The most recently inserted message.
    pub fn newest(&self) -> Option<&ChatMessage> {
        match self.order {
            RenderOrder::NewestLast => self.entries.back(),
            RenderOrder::NewestFirst => self.entries.front(),
        }
    }

    /// Messages in display order.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
