use bloom_common::Cents;
use bloom_engine::db_types::{Order, OrderStatusType};
use chrono::NaiveDate;
use serde::Serialize;

/// Headline figures for the dashboard. Always recomputed from the full order set, never patched incrementally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_orders: usize,
    pub awaiting_payment: usize,
    /// Orders staff need to act on: paid card orders and pay-later orders
    pub pending: usize,
    pub accepted: usize,
    pub completed: usize,
    pub total_revenue: Cents,
    pub today_orders: usize,
}

impl DashboardStats {
    pub fn from_orders<'a, I>(orders: I, today: NaiveDate) -> Self
    where I: IntoIterator<Item = &'a Order> {
        orders.into_iter().fold(Self::default(), |mut stats, order| {
            stats.total_orders += 1;
            match order.status {
                OrderStatusType::Accepted => stats.accepted += 1,
                OrderStatusType::Completed => stats.completed += 1,
                s if s.is_awaiting_payment() => stats.awaiting_payment += 1,
                s if s.is_actionable() => stats.pending += 1,
                _ => {},
            }
            if counts_toward_revenue(order.status) {
                stats.total_revenue += order.total_amount;
            }
            if order.created_at.date_naive() == today {
                stats.today_orders += 1;
            }
            stats
        })
    }
}

fn counts_toward_revenue(status: OrderStatusType) -> bool {
    !(status.is_awaiting_payment() || matches!(status, OrderStatusType::Cancelled | OrderStatusType::Rejected))
}
