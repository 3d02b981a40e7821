//! Transaction coordinator handling.
//!
//! A coordinator link carries declare and discharge requests. Each request
//! gets exactly one disposition and is settled. Ordinary deliveries and
//! disposition updates that name a transaction are checked against the
//! active set.

use crate::broker::Broker;
use crate::outbox::Outbox;
use courier_protocol::{
    conditions, Condition, CoordinatorRequest, DeliveryState, DeliveryTag, LinkId, Message,
    TransactionId,
};
use tracing::{debug, info, warn};

impl Broker {
    /// Handle a message that arrived on a coordinator link.
    pub(crate) fn on_control_message(
        &mut self,
        link: LinkId,
        delivery: DeliveryTag,
        message: &Message,
        outbox: &mut Outbox,
    ) {
        match CoordinatorRequest::decode(&message.body) {
            Ok(CoordinatorRequest::Declare) => {
                let txn_id = self.transactions.declare(link.clone(), delivery);
                info!(link = %link, txn_id = %txn_id, "Declared transaction");
                outbox.update(
                    link.clone(),
                    delivery,
                    DeliveryState::Declared { txn_id },
                    None,
                );
            }
            Ok(CoordinatorRequest::Discharge { txn_id, failed }) => {
                match self.transactions.discharge(&txn_id) {
                    Ok(_) => {
                        info!(link = %link, txn_id = %txn_id, failed, "Discharged transaction");
                        outbox.update(link.clone(), delivery, DeliveryState::Accepted, None);
                    }
                    Err(e) => {
                        warn!(link = %link, txn_id = %txn_id, "Discharge of unknown transaction");
                        outbox.update(
                            link.clone(),
                            delivery,
                            DeliveryState::Rejected,
                            Some(e.condition()),
                        );
                    }
                }
            }
            Err(e) => {
                warn!(link = %link, delivery = %delivery, error = %e, "Undecodable coordinator message");
                let condition = Condition::new(conditions::DECODE_ERROR).with_description(e.to_string());
                outbox.update(link.clone(), delivery, DeliveryState::Rejected, Some(condition));
            }
        }
        outbox.settle(link, delivery);
    }

    /// Check the transaction named by a delivery.
    ///
    /// Unknown IDs reject and settle the delivery. Returns `true` if the
    /// transaction is active.
    pub(crate) fn admit_transactional(
        &self,
        link: &LinkId,
        delivery: DeliveryTag,
        txn_id: &TransactionId,
        outbox: &mut Outbox,
    ) -> bool {
        match self.transactions.check(txn_id) {
            Ok(_) => {
                debug!(link = %link, delivery = %delivery, txn_id = %txn_id, "Transactional delivery");
                true
            }
            Err(e) => {
                warn!(link = %link, delivery = %delivery, txn_id = %txn_id, "Delivery names unknown transaction");
                outbox.reject(link.clone(), delivery, e.condition());
                false
            }
        }
    }

    /// Handle a disposition update from the peer.
    pub(crate) fn on_delivery_updated(
        &mut self,
        link: LinkId,
        delivery: DeliveryTag,
        state: &DeliveryState,
        outbox: &mut Outbox,
    ) {
        match state.transaction() {
            Some(txn_id) => {
                self.admit_transactional(&link, delivery, txn_id, outbox);
            }
            None => {
                debug!(link = %link, delivery = %delivery, state = state.code(), "Delivery updated");
            }
        }
    }
}
