//! Link lifecycle: attach, credit, detach and connection teardown.

use crate::broker::Broker;
use crate::link::{LinkKind, LinkRef};
use crate::outbox::{LinkSink, Outbox};
use courier_protocol::{ConnectionId, LinkId, Role, Terminus, TerminusKind};
use tracing::{debug, trace};

impl Broker {
    /// Handle a link attach from the peer.
    ///
    /// The link kind is decided here and never changes.
    pub(crate) fn on_link_opening(
        &mut self,
        link: LinkId,
        role: Role,
        source: Terminus,
        target: Terminus,
        credit: u32,
        outbox: &mut Outbox,
    ) {
        // A re-attach under the same id replaces the old link entirely.
        if self.links.get(&link).is_some() {
            debug!(link = %link, "Re-attach of tracked link");
            self.on_link_closing(&link);
        }

        let link_ref = match role {
            Role::Sender => self.open_sender(link, source, credit, outbox),
            Role::Receiver => self.open_receiver(link, target, outbox),
        };
        debug!(link = %link_ref.id, kind = ?link_ref.kind, "Link opened");
        self.links.insert(link_ref);
    }

    fn open_sender(
        &mut self,
        link: LinkId,
        source: Terminus,
        credit: u32,
        outbox: &mut Outbox,
    ) -> LinkRef {
        let mut link_ref = LinkRef::new(link, LinkKind::PlainSender);
        link_ref.credit = credit;

        let address = if source.dynamic {
            Some(self.router.allocate_dynamic_address())
        } else {
            source.address.clone()
        };
        let Some(address) = address else {
            debug!(link = %link_ref.id, "Sender link without source address");
            return link_ref;
        };

        outbox.set_source(
            link_ref.id.clone(),
            Terminus {
                kind: TerminusKind::Source,
                address: Some(address.clone()),
                ..source
            },
        );
        self.router
            .resolve_or_create(&address)
            .subscribe(link_ref.id.clone());
        debug!(link = %link_ref.id, queue = %address, "Subscribed");

        link_ref.source_address = Some(address);
        link_ref
    }

    fn open_receiver(&mut self, link: LinkId, target: Terminus, outbox: &mut Outbox) -> LinkRef {
        if target.is_coordinator() {
            outbox.set_target(link.clone(), Terminus::coordinator(target.capabilities));
            return LinkRef::new(link, LinkKind::Coordinator);
        }

        let mut link_ref = LinkRef::new(link, LinkKind::PlainReceiver);
        if let Some(address) = target.address {
            outbox.set_target(
                link_ref.id.clone(),
                Terminus::address(TerminusKind::Target, address.clone()),
            );
            link_ref.target_address = Some(address);
        }
        link_ref
    }

    /// Handle a link detach from the peer.
    pub(crate) fn on_link_closing(&mut self, link: &LinkId) {
        let Some(link_ref) = self.links.remove(link) else {
            trace!(link = %link, "Closing untracked link");
            return;
        };

        if let Some(address) = link_ref.subscription() {
            if let Some(queue) = self.router.get_mut(address) {
                queue.unsubscribe(link);
                debug!(link = %link, queue = %address, "Unsubscribed");
            }
            self.router.remove_if_empty(address);
        }
        debug!(link = %link, kind = ?link_ref.kind, "Link closed");
    }

    /// Close every link of a connection that is still tracked.
    pub(crate) fn on_connection_teardown(&mut self, connection: &ConnectionId) {
        let links = self.links.on_connection(connection);
        debug!(connection = %connection, links = links.len(), "Connection teardown");
        for link in &links {
            self.on_link_closing(link);
        }
    }

    /// Handle new credit on a sending link.
    pub(crate) fn on_link_sendable(&mut self, link: LinkId, credit: u32, outbox: &mut Outbox) {
        let Some(link_ref) = self.links.get_mut(&link) else {
            trace!(link = %link, "Credit for untracked link");
            return;
        };
        link_ref.credit = credit;
        let Some(address) = link_ref.subscription().map(str::to_owned) else {
            return;
        };

        let queue = self.router.resolve_or_create(&address);
        let sent = queue.dispatch(
            Some(&link),
            &mut LinkSink {
                links: &mut self.links,
                outbox: &mut *outbox,
            },
        );
        trace!(link = %link, queue = %address, credit, sent, "Link sendable");
    }
}

#[cfg(test)]
mod tests {
    use crate::broker::Broker;
    use crate::testing::{
        attach_coordinator, attach_receiver, attach_sender, link, sent_bodies, source, target,
        transfer,
    };
    use courier_protocol::{Command, Event, LinkId, Message, Terminus, TerminusKind, Value};

    fn local_source(commands: &[Command], of: &LinkId) -> Option<Terminus> {
        commands.iter().find_map(|c| match c {
            Command::SetSource { link, source } if link == of => Some(source.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_explicit_source_mirrored_and_subscribed() {
        let mut broker = Broker::new();
        let consumer = link("conn-1", "consumer");

        let commands = broker.handle(attach_sender(&consumer, source("orders"), 0));
        let local = local_source(&commands, &consumer).expect("source set");
        assert_eq!(local.address.as_deref(), Some("orders"));
        assert!(broker
            .router()
            .get("orders")
            .is_some_and(|q| q.is_subscribed(&consumer)));
    }

    #[test]
    fn test_dynamic_source_lifecycle() {
        let mut broker = Broker::new();
        let consumer = link("conn-1", "reply-to");

        let commands = broker.handle(attach_sender(&consumer, Terminus::dynamic_source(), 5));
        let local = local_source(&commands, &consumer).expect("source set");
        let address = local.address.expect("dynamic address");
        assert!(local.dynamic);
        assert!(broker.router().get(&address).is_some_and(|q| q.is_dynamic()));

        broker.handle(Event::LinkClosing {
            link: consumer.clone(),
        });
        assert!(!broker.router().contains(&address));
        assert!(broker.links().is_empty());
    }

    #[test]
    fn test_receiver_target_mirrored() {
        let mut broker = Broker::new();
        let producer = link("conn-1", "producer");

        let commands = broker.handle(attach_receiver(&producer, target("orders")));
        assert!(matches!(
            commands.as_slice(),
            [Command::SetTarget { target, .. }]
                if target.address.as_deref() == Some("orders") && target.kind == TerminusKind::Target
        ));
    }

    #[test]
    fn test_coordinator_target_copies_capabilities() {
        let mut broker = Broker::new();
        let ctl = link("conn-1", "txn-ctl");

        let commands = broker.handle(attach_coordinator(&ctl));
        match commands.as_slice() {
            [Command::SetTarget { target, .. }] => {
                assert!(target.is_coordinator());
                assert_eq!(target.capabilities.len(), 1);
            }
            other => panic!("Expected coordinator target, got {:?}", other),
        }
    }

    #[test]
    fn test_sendable_dispatches_backlog() {
        let mut broker = Broker::new();
        let producer = link("conn-1", "producer");
        let consumer = link("conn-2", "consumer");

        broker.handle(attach_receiver(&producer, target("q1")));
        broker.handle(transfer(&producer, 0, Message::new("M1")));
        assert_eq!(broker.router().get("q1").map(|q| q.len()), Some(1));

        broker.handle(attach_sender(&consumer, source("q1"), 0));
        let commands = broker.handle(Event::LinkSendable {
            link: consumer.clone(),
            credit: 1,
        });

        assert_eq!(sent_bodies(&commands, &consumer), vec![Value::from("M1")]);
        assert_eq!(broker.router().get("q1").map(|q| q.len()), Some(0));
        assert_eq!(broker.links().get(&consumer).map(|l| l.credit), Some(0));
    }

    #[test]
    fn test_disconnect_unsubscribes_every_link() {
        let mut broker = Broker::new();
        let first = link("conn-1", "c1");
        let second = link("conn-1", "c2");
        let other = link("conn-2", "c3");

        broker.handle(attach_sender(&first, source("q2"), 0));
        broker.handle(attach_sender(&second, source("q2"), 0));
        broker.handle(attach_sender(&other, source("q2"), 0));

        broker.handle(Event::ConnectionDisconnected {
            connection: "conn-1".into(),
        });

        let queue = broker.router().get("q2").expect("queue kept for conn-2");
        assert_eq!(queue.consumers(), &[other.clone()]);
        assert_eq!(broker.links().len(), 1);

        broker.handle(Event::ConnectionClosing {
            connection: "conn-2".into(),
        });
        assert!(!broker.router().contains("q2"));
    }

    #[test]
    fn test_reattach_moves_subscription() {
        let mut broker = Broker::new();
        let consumer = link("conn-1", "c");

        broker.handle(attach_sender(&consumer, source("a"), 0));
        broker.handle(attach_sender(&consumer, source("b"), 0));
        assert!(!broker.router().contains("a"));
        assert!(broker
            .router()
            .get("b")
            .is_some_and(|q| q.consumers() == [consumer.clone()]));
        assert_eq!(broker.links().len(), 1);

        broker.handle(Event::LinkClosing {
            link: consumer.clone(),
        });
        assert!(!broker.router().contains("a"));
        assert!(!broker.router().contains("b"));
        assert!(broker.links().is_empty());
    }

    #[test]
    fn test_closing_untracked_link_is_noop() {
        let mut broker = Broker::new();
        let commands = broker.handle(Event::LinkClosing {
            link: link("conn-1", "ghost"),
        });
        assert!(commands.is_empty());
    }
}
