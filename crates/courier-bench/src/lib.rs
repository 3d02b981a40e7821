//! Shared fixtures for Courier benchmarks.

use courier_core::Broker;
use courier_protocol::{
    DeliveryTag, Event, LinkId, Message, Role, Terminus, TerminusKind, Value,
};

/// Connection used by bench producers.
pub const PRODUCER_CONNECTION: &str = "bench-producer";
/// Connection used by bench consumers.
pub const CONSUMER_CONNECTION: &str = "bench-consumer";

/// Link of the bench producer.
#[must_use]
pub fn producer() -> LinkId {
    LinkId::new(PRODUCER_CONNECTION, "producer")
}

/// Link of the `index`th bench consumer.
#[must_use]
pub fn consumer(index: usize) -> LinkId {
    LinkId::new(CONSUMER_CONNECTION, format!("consumer-{index}"))
}

/// Attach of a consumer on `address`.
#[must_use]
pub fn attach_consumer(link: LinkId, address: &str, credit: u32) -> Event {
    Event::LinkOpening {
        link,
        role: Role::Sender,
        source: Terminus::address(TerminusKind::Source, address),
        target: Terminus::default(),
        credit,
    }
}

/// Attach of a producer targeting `address`.
#[must_use]
pub fn attach_producer(link: LinkId, address: &str) -> Event {
    Event::LinkOpening {
        link,
        role: Role::Receiver,
        source: Terminus::default(),
        target: Terminus::address(TerminusKind::Target, address),
        credit: 0,
    }
}

/// Arrival of a message with a zeroed body of `size` bytes.
#[must_use]
pub fn arrival(link: LinkId, delivery: u64, size: usize) -> Event {
    Event::MessageArrived {
        link,
        delivery: DeliveryTag(delivery),
        message: Message::new(Value::Binary(vec![0u8; size])),
        state: None,
    }
}

/// A broker with one producer and `consumers` consumers on `address`,
/// each consumer holding `credit`.
#[must_use]
pub fn broker_with_consumers(address: &str, consumers: usize, credit: u32) -> Broker {
    let mut broker = Broker::new();
    broker.handle(attach_producer(producer(), address));
    for index in 0..consumers {
        broker.handle(attach_consumer(consumer(index), address, credit));
        broker.handle(Event::LinkSendable {
            link: consumer(index),
            credit,
        });
    }
    broker
}
