//! Order lifecycle transitions.
//!
//! Every writer of order status goes through [`validate_transition`] (for the caller-facing check) and
//! [`OrderStatusType::sources_for`] (for the conditional update in the store). There is no other place where the
//! permitted transitions are defined.
//!
//! | From              | To                                        | Who              |
//! |-------------------|-------------------------------------------|------------------|
//! | `payment_pending` | `paid`, `payment_failed`                  | payment provider |
//! | `payment_pending` | `cancelled`                               | staff            |
//! | `payment_failed`  | `paid`                                    | payment provider |
//! | `payment_failed`  | `cancelled`                               | staff            |
//! | `paid`, `pending` | `accepted`, `rejected`, `cancelled`       | staff            |
//! | `accepted`        | `processing`, `shipped`, `cancelled`      | staff            |
//! | `processing`      | `shipped`, `cancelled`                    | staff            |
//! | `shipped`         | `delivered`                               | staff            |
//! | `delivered`       | `completed`                               | staff            |
//!
//! `completed`, `cancelled` and `rejected` are terminal. Once an order is `paid`, a failed-payment event has no
//! effect, and re-applying a transition to the state an order is already in matches no rows.
use thiserror::Error;

use crate::db_types::OrderStatusType::{self, *};

/// Who is asking for the status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    PaymentProvider,
    Staff,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Orders cannot move from {from} to {to}")]
    NotPermitted { from: OrderStatusType, to: OrderStatusType },
    #[error("{status} can only be set by the payment flow")]
    ReservedForPayments { status: OrderStatusType },
    #[error("{status} can only be set by staff")]
    ReservedForStaff { status: OrderStatusType },
    #[error("{status} is set when an order is created, it cannot be re-entered")]
    InitialOnly { status: OrderStatusType },
}

impl OrderStatusType {
    /// The states this status may move to.
    pub fn successors(&self) -> &'static [OrderStatusType] {
        match self {
            PaymentPending => &[Paid, PaymentFailed, Cancelled],
            PaymentFailed => &[Paid, Cancelled],
            Paid | Pending => &[Accepted, Rejected, Cancelled],
            Accepted => &[Processing, Shipped, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered],
            Delivered => &[Completed],
            Completed | Cancelled | Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        self.successors().contains(&next)
    }

    /// Every status from which `target` is reachable in a single step. The store uses this list as the guard in its
    /// conditional update.
    pub fn sources_for(target: OrderStatusType) -> Vec<OrderStatusType> {
        OrderStatusType::ALL.iter().copied().filter(|s| s.can_transition_to(target)).collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Paid and pay-later orders are what staff need to act on.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Paid | Pending)
    }

    /// Orders still waiting on the payment provider, or whose payment failed. They don't count toward revenue.
    pub fn is_awaiting_payment(&self) -> bool {
        matches!(self, PaymentPending | PaymentFailed)
    }
}

fn actor_may_set(actor: Actor, status: OrderStatusType) -> Result<(), TransitionError> {
    match (actor, status) {
        (_, PaymentPending) | (_, Pending) => Err(TransitionError::InitialOnly { status }),
        (Actor::Staff, Paid) | (Actor::Staff, PaymentFailed) => Err(TransitionError::ReservedForPayments { status }),
        (Actor::PaymentProvider, Paid) | (Actor::PaymentProvider, PaymentFailed) => Ok(()),
        (Actor::PaymentProvider, _) => Err(TransitionError::ReservedForStaff { status }),
        (Actor::Staff, _) => Ok(()),
    }
}

/// Checks that `actor` may move an order from `from` to `to`.
pub fn validate_transition(actor: Actor, from: OrderStatusType, to: OrderStatusType) -> Result<(), TransitionError> {
    actor_may_set(actor, to)?;
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError::NotPermitted { from, to })
    }
}

/// Checks whether `actor` may request `to` at all, regardless of the order's current status.
pub fn validate_target(actor: Actor, to: OrderStatusType) -> Result<(), TransitionError> {
    actor_may_set(actor, to)
}
