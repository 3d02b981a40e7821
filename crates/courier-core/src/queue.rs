//! Queue abstraction for Courier.
//!
//! A queue is an ordered message buffer plus an ordered set of consumer
//! links. Messages leave the queue only when a consumer has credit.

use courier_protocol::{LinkId, Message};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// Order in which a full-queue dispatch visits consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchPolicy {
    /// Every pass starts at the earliest registered consumer.
    #[default]
    RegistrationOrder,
    /// Every pass resumes after the consumer served last.
    RoundRobin,
}

/// Destination of dispatched messages.
///
/// Credit is owned by the transport. The sink reports the current credit of
/// a link and accounts for every message handed to it.
pub trait DeliverySink {
    /// Current credit of a link.
    fn credit(&self, link: &LinkId) -> u32;

    /// Send a message on a link, consuming one unit of its credit.
    fn send(&mut self, link: &LinkId, message: Message);
}

/// A message queue.
#[derive(Debug, Default)]
pub struct Queue {
    dynamic: bool,
    messages: VecDeque<Message>,
    /// Insertion order is dispatch priority order.
    consumers: Vec<LinkId>,
    policy: DispatchPolicy,
    /// Rotation index used by `DispatchPolicy::RoundRobin`.
    next: usize,
}

impl Queue {
    /// Create a static queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dynamic queue, deleted as soon as its last consumer leaves.
    #[must_use]
    pub fn dynamic() -> Self {
        Self::with_policy(true, DispatchPolicy::default())
    }

    /// Create a queue with an explicit dispatch policy.
    #[must_use]
    pub fn with_policy(dynamic: bool, policy: DispatchPolicy) -> Self {
        Self {
            dynamic,
            policy,
            ..Self::default()
        }
    }

    /// Check if this is a dynamic queue.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the backlog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Buffered messages, head first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Subscribed consumers in dispatch priority order.
    #[must_use]
    pub fn consumers(&self) -> &[LinkId] {
        &self.consumers
    }

    /// Check if a link is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, link: &LinkId) -> bool {
        self.consumers.contains(link)
    }

    /// Subscribe a consumer link.
    ///
    /// Nothing is dispatched here; delivery waits for the next sendable or
    /// publish.
    pub fn subscribe(&mut self, link: LinkId) {
        self.consumers.push(link);
    }

    /// Unsubscribe a consumer link. Absent links are ignored.
    ///
    /// Returns `true` if the queue should now be deleted.
    pub fn unsubscribe(&mut self, link: &LinkId) -> bool {
        if let Some(position) = self.consumers.iter().position(|c| c == link) {
            self.consumers.remove(position);
            if position < self.next {
                self.next -= 1;
            }
        }
        self.is_deletable()
    }

    /// Check whether the queue is garbage: no consumers, and either dynamic
    /// or without backlog.
    #[must_use]
    pub fn is_deletable(&self) -> bool {
        self.consumers.is_empty() && (self.dynamic || self.messages.is_empty())
    }

    /// Append a message and dispatch to all consumers.
    ///
    /// Returns the number of messages sent.
    pub fn publish<S: DeliverySink + ?Sized>(&mut self, message: Message, sink: &mut S) -> usize {
        self.messages.push_back(message);
        self.dispatch(None, sink)
    }

    /// Send buffered messages to consumers with credit.
    ///
    /// `target` restricts dispatch to a single link; `None` means every
    /// consumer. Each pass gives at most one message to each credited
    /// consumer. Dispatch stops once the backlog is empty or a pass sends
    /// nothing.
    ///
    /// Returns the number of messages sent.
    pub fn dispatch<S: DeliverySink + ?Sized>(
        &mut self,
        target: Option<&LinkId>,
        sink: &mut S,
    ) -> usize {
        let targets: &[LinkId] = match target {
            Some(link) => std::slice::from_ref(link),
            None => &self.consumers,
        };
        let count = targets.len();
        let rotate = target.is_none() && self.policy == DispatchPolicy::RoundRobin;
        let mut sent = 0;

        'passes: loop {
            let start = if rotate && count > 0 { self.next % count } else { 0 };
            let mut progressed = false;

            for offset in 0..count {
                let index = (start + offset) % count;
                let link = &targets[index];
                if sink.credit(link) == 0 {
                    continue;
                }
                let Some(message) = self.messages.pop_front() else {
                    break 'passes;
                };
                sink.send(link, message);
                sent += 1;
                progressed = true;
                if rotate {
                    self.next = index + 1;
                }
                trace!(consumer = %link, backlog = self.messages.len(), "Dispatched message");
            }

            if !progressed {
                break;
            }
        }

        sent
    }
}
