use std::fmt::Write;

use bloom_engine::db_types::Order;
use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};

use crate::stats::DashboardStats;

const MAX_ROWS: usize = 20;

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

pub fn format_status(stats: &DashboardStats, orders: &[&Order], online: bool, unread: usize) -> String {
    let mut f = String::new();
    let _ = writeln!(f, "===============================================================================");
    let _ = writeln!(
        f,
        "{state}  |  {unread} unread notifications  |  updated {time}",
        state = if online { "🟢 Online" } else { "🔴 Offline" },
        time = chrono::Local::now().format("%H:%M:%S"),
    );
    let _ = writeln!(
        f,
        "Orders: {total}  Today: {today}  Awaiting payment: {awaiting}  To action: {pending}  Accepted: {accepted}  \
         Completed: {completed}  Revenue: {revenue}",
        total = stats.total_orders,
        today = stats.today_orders,
        awaiting = stats.awaiting_payment,
        pending = stats.pending,
        accepted = stats.accepted,
        completed = stats.completed,
        revenue = stats.total_revenue,
    );
    let _ = writeln!(f, "===============================================================================");
    let _ = writeln!(f, "{}", format_orders(orders));
    f
}

/// The most recent orders, newest first.
pub fn format_orders(orders: &[&Order]) -> String {
    if orders.is_empty() {
        return "No orders yet".to_string();
    }
    let mut table = Table::new();
    table.set_titles(row!["Order", "Customer", "Email", "Total", "Status", "Payment", "Created"]);
    orders.iter().take(MAX_ROWS).for_each(|o| {
        table.add_row(row![
            o.order_number,
            o.customer_name,
            o.customer_email,
            format!("{} {}", o.total_amount, o.currency.to_uppercase()),
            o.status,
            o.payment_method,
            o.created_at.format("%Y-%m-%d %H:%M"),
        ]);
    });
    table.set_format(markdown_format());
    let mut result = table.to_string();
    if orders.len() > MAX_ROWS {
        let _ = write!(result, "... and {} more", orders.len() - MAX_ROWS);
    }
    result
}
