//! Test doubles shared by the unit tests.

use crate::queue::DeliverySink;
use courier_protocol::{
    capabilities, Command, Condition, DeliveryState, DeliveryTag, Event, LinkId, Message, Role,
    Terminus, TerminusKind, Value,
};
use std::collections::HashMap;

pub(crate) fn link(connection: &str, name: &str) -> LinkId {
    LinkId::new(connection, name)
}

/// A peer attaching a link the broker sends on.
pub(crate) fn attach_sender(link: &LinkId, source: Terminus, credit: u32) -> Event {
    Event::LinkOpening {
        link: link.clone(),
        role: Role::Sender,
        source,
        target: Terminus::default(),
        credit,
    }
}

/// A peer attaching a link the broker receives on.
pub(crate) fn attach_receiver(link: &LinkId, target: Terminus) -> Event {
    Event::LinkOpening {
        link: link.clone(),
        role: Role::Receiver,
        source: Terminus::default(),
        target,
        credit: 0,
    }
}

pub(crate) fn attach_coordinator(link: &LinkId) -> Event {
    attach_receiver(
        link,
        Terminus::coordinator(vec![capabilities::LOCAL_TRANSACTIONS.into()]),
    )
}

pub(crate) fn source(address: &str) -> Terminus {
    Terminus::address(TerminusKind::Source, address)
}

pub(crate) fn target(address: &str) -> Terminus {
    Terminus::address(TerminusKind::Target, address)
}

pub(crate) fn transfer(link: &LinkId, delivery: u64, message: Message) -> Event {
    Event::MessageArrived {
        link: link.clone(),
        delivery: DeliveryTag(delivery),
        message,
        state: None,
    }
}

/// Bodies sent on a link, in order.
pub(crate) fn sent_bodies(commands: &[Command], to: &LinkId) -> Vec<Value> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Send { link, message } if link == to => Some(message.body.clone()),
            _ => None,
        })
        .collect()
}

/// Every local state update, in order.
pub(crate) fn dispositions(commands: &[Command]) -> Vec<(DeliveryState, Option<Condition>)> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Update {
                state, condition, ..
            } => Some((state.clone(), condition.clone())),
            _ => None,
        })
        .collect()
}

/// A sink with per-link credit that records everything sent.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    credits: HashMap<LinkId, u32>,
    pub sent: Vec<(LinkId, Message)>,
}

impl RecordingSink {
    pub fn with_credit(mut self, link: &LinkId, credit: u32) -> Self {
        self.set_credit(link, credit);
        self
    }

    pub fn set_credit(&mut self, link: &LinkId, credit: u32) {
        self.credits.insert(link.clone(), credit);
    }

    pub fn received(&self, link: &LinkId) -> Vec<&Message> {
        self.sent
            .iter()
            .filter(|(l, _)| l == link)
            .map(|(_, m)| m)
            .collect()
    }
}

impl DeliverySink for RecordingSink {
    fn credit(&self, link: &LinkId) -> u32 {
        self.credits.get(link).copied().unwrap_or(0)
    }

    fn send(&mut self, link: &LinkId, message: Message) {
        let credit = self.credits.entry(link.clone()).or_insert(0);
        assert!(*credit > 0, "sent to {link} without credit");
        *credit -= 1;
        self.sent.push((link.clone(), message));
    }
}
