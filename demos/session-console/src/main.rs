//! Terminal front end for the memegen session coordinator.
//!
//! ```text
//! login <user> <pass>   sign in
//! logout                sign out
//! revalidate            re-read the user from the backend
//! status                print the session and timer state
//! quit                  stop
//! anything else         counts as a key press
//! ```
//!
//! The backend URL comes from `MEMEGEN_API_URL`. Set
//! `MEMEGEN_SESSION_CONFIG` to a JSON file to override session timings,
//! e.g. `{"inactivity_timeout": {"secs": 20, "nanos": 0}}` for a quick
//! look at the countdown.

use std::sync::atomic::{AtomicU64, Ordering};

use memegen::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const SESSION_CONFIG_ENV: &str = "MEMEGEN_SESSION_CONFIG";

/// Prints the countdown on stdout.
#[derive(Default)]
struct ConsoleNotifier {
    next_id: AtomicU64,
}

impl Notifier for ConsoleNotifier {
    fn warn(&self, seconds: u32) -> NoticeHandle {
        let handle = NoticeHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        println!("!! You will be logged out in {seconds}s due to inactivity. Type anything to stay.");
        handle
    }

    fn update(&self, _handle: NoticeHandle, seconds: u32) {
        if seconds <= 10 || seconds % 10 == 0 {
            println!("!! {seconds}s");
        }
    }

    fn dismiss(&self, handle: NoticeHandle) {
        println!("-- {handle} dismissed");
    }
}

fn session_config() -> SessionConfig {
    let Ok(path) = std::env::var(SESSION_CONFIG_ENV) else {
        return SessionConfig::default();
    };
    let parsed = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()));
    match parsed {
        Ok(config) => config,
        Err(e) => {
            warn!(%path, error = %e, "unreadable session config; using defaults");
            SessionConfig::default()
        }
    }
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    match &snapshot.user {
        Some(user) => println!(
            "signed in as {} <{}> (epoch {})",
            user.display_name(),
            user.email,
            snapshot.epoch
        ),
        None if snapshot.is_validating => println!("checking session..."),
        None => println!("signed out (epoch {})", snapshot.epoch),
    }
}

/// Expired sessions send the user back to the login prompt; a manual
/// logout just says goodbye.
fn logout_notice(reason: LogoutReason) -> String {
    if reason.is_expiry() {
        format!("{} Redirecting to login.", reason.message())
    } else {
        reason.message().to_owned()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    memegen::telemetry::init()?;

    let client = MemegenClient::builder()
        .session(session_config())
        .http(HttpConfig::from_env())
        .build(ConsoleNotifier::default())?;
    let session = client.session().clone();

    let mut events = session.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::LoggedIn { user, .. } => println!("welcome, {}", user.first_name),
                SessionEvent::LoggedOut { reason, .. } => println!("{}", logout_notice(reason)),
            }
        }
    });

    print_snapshot(&session.initialize().await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["login", user, pass] => match session.login(Credentials::new(*user, *pass)).await {
                Ok(snapshot) => print_snapshot(&snapshot),
                Err(e) => println!("login failed: {e}"),
            },
            ["login", ..] => println!("usage: login <user> <pass>"),
            ["logout"] => session.logout(LogoutReason::Manual).await,
            ["revalidate"] => print_snapshot(&session.revalidate().await?),
            ["status"] => {
                print_snapshot(&session.snapshot());
                let timers = session.inspect().await?;
                println!("{}", serde_json::to_string_pretty(&timers)?);
            }
            ["quit"] | ["exit"] => break,
            _ => {
                session.activity().signal(ActivityKind::KeyPress);
            }
        }
    }

    info!("shutting down");
    session.shutdown().await;
    Ok(())
}
