use std::{sync::Arc, time::Duration};

use bloom_common::{helpers::parse_boolean_flag, Secret};
use clap::Parser;
use dotenvy::dotenv;
use log::*;

mod alerts;
mod client;
mod feed;
mod formatting;
mod session;
mod stats;

use crate::{
    alerts::TerminalAlert,
    client::StaffClient,
    session::{run_session, DashboardSession, SessionSettings},
};

#[derive(Parser, Debug)]
#[command(version, about = "Live order dashboard for Bloom staff")]
pub struct Arguments {
    /// Base URL of the Bloom server
    #[arg(short, long, env = "BLOOM_SERVER_URL", default_value = "http://127.0.0.1:3001")]
    server: String,
    /// The staff API key configured on the server
    #[arg(short = 'k', long = "staff-key", env = "BLOOM_STAFF_API_KEY", hide_env_values = true)]
    staff_key: String,
    /// Seconds between full order refreshes. These cover anything the live feed missed.
    #[arg(long = "poll-secs", default_value = "30")]
    poll_secs: u64,
    /// Seconds between checks for unread notifications
    #[arg(long = "notification-poll-secs", default_value = "10")]
    notification_poll_secs: u64,
    /// Don't ring for new orders. BLOOM_DASHBOARD_QUIET=yes does the same.
    #[arg(short, long)]
    quiet: bool,
    /// Mark notifications as read once the dashboard has caught up with them
    #[arg(long = "mark-read")]
    mark_read: bool,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let client = match StaffClient::new(&args.server, Secret::new(args.staff_key)) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Could not set up the server client. {e}");
            std::process::exit(1);
        },
    };
    info!("🖥️ Bloom dashboard connecting to {}", client.server());
    let settings = SessionSettings {
        poll_interval: Duration::from_secs(args.poll_secs.max(1)),
        notification_interval: Duration::from_secs(args.notification_poll_secs.max(1)),
        mark_read: args.mark_read,
    };
    let quiet = args.quiet || parse_boolean_flag(std::env::var("BLOOM_DASHBOARD_QUIET").ok(), false);
    let alerts = TerminalAlert::new(quiet);
    let session = DashboardSession::new(Arc::clone(&client), alerts, settings.mark_read);
    run_session(session, client, settings).await;
}
