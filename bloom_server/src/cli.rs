use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // BLOOM_STAFF_API_KEY, BLOOM_STRIPE_SECRET_KEY and BLOOM_STRIPE_WEBHOOK_SECRET must never be printed
    const DISPLAY_ENVS: [&str; 12] = [
        "RUST_LOG",
        "BLOOM_HOST",
        "BLOOM_PORT",
        "BLOOM_DATABASE_URL",
        "BLOOM_ALLOWED_ORIGINS",
        "BLOOM_RECONCILE_INTERVAL_SECS",
        "BLOOM_STALE_PAYMENT_MINS",
        "BLOOM_EVENT_BUFFER_SIZE",
        "BLOOM_STRIPE_API_URL",
        "BLOOM_STRIPE_TIMEOUT_SECS",
        "BLOOM_WEBHOOK_TOLERANCE_SECS",
        "BLOOM_SHIPPING_COUNTRIES",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
