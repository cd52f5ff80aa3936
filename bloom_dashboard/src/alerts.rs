use std::{
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;

const RING_INTERVAL: Duration = Duration::from_secs(3);

/// Where the dashboard sends its alerts.
pub trait AlertSink {
    /// Starts ringing. Ringing continues until [`AlertSink::silence`] is called.
    fn ring(&self, message: &str);
    fn silence(&self);
    fn is_ringing(&self) -> bool;
}

/// Rings the terminal bell until someone presses Enter. With `quiet` set, alerts are printed but never rung.
#[derive(Debug, Clone)]
pub struct TerminalAlert {
    quiet: bool,
    ringing: Arc<AtomicBool>,
}

impl TerminalAlert {
    pub fn new(quiet: bool) -> Self {
        Self { quiet, ringing: Arc::new(AtomicBool::new(false)) }
    }
}

impl AlertSink for TerminalAlert {
    fn ring(&self, message: &str) {
        println!("🔔 {message}");
        if self.quiet {
            return;
        }
        if self.ringing.swap(true, Ordering::SeqCst) {
            return;
        }
        println!("   Press Enter to silence the alert.");
        let ringing = Arc::clone(&self.ringing);
        tokio::spawn(async move {
            while ringing.load(Ordering::SeqCst) {
                print!("\x07");
                let _ = std::io::stdout().flush();
                tokio::time::sleep(RING_INTERVAL).await;
            }
            trace!("🖥️ Alert silenced");
        });
    }

    fn silence(&self) {
        if self.ringing.swap(false, Ordering::SeqCst) {
            info!("🖥️ Alert silenced");
        }
    }

    fn is_ringing(&self) -> bool {
        self.ringing.load(Ordering::SeqCst)
    }
}
