use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

/// Blocked-fetch recovery hook. Given a URL that came back 403/429/timeout,
/// an implementation may arrange for a retry to succeed (typically by having
/// a human open the URL in a real browser) and return a Cookie header to
/// send with the retry.
pub trait Recovery {
    fn prepare(&self, url: &str) -> Option<String>;
}

/// No recovery; blocked URLs stay blocked. Used under --no-fetch and in
/// non-interactive batch runs that opted out.
pub struct NoRecovery;

impl Recovery for NoRecovery {
    fn prepare(&self, _url: &str) -> Option<String> {
        None
    }
}

/// Ask a human to visit the URL in their own browser, then retry once. On an
/// interactive terminal we wait for Enter; otherwise we sleep a fixed window
/// and hope. An optional cookie file supplies a session header for the retry.
pub struct ManualRecovery {
    pub cookie_file: Option<PathBuf>,
    pub wait: Duration,
}

impl ManualRecovery {
    pub fn new(cookie_file: Option<PathBuf>) -> Self {
        Self {
            cookie_file,
            wait: Duration::from_secs(20),
        }
    }

    fn load_cookie(&self) -> Option<String> {
        let path = self.cookie_file.as_ref()?;
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let cookie = text.trim().to_string();
                (!cookie.is_empty()).then_some(cookie)
            }
            Err(e) => {
                info!("Could not read cookie file {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Recovery for ManualRecovery {
    fn prepare(&self, url: &str) -> Option<String> {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            eprintln!("Blocked: {}", url);
            eprint!("Open it in a browser, complete any challenge, then press Enter... ");
            let _ = io::stderr().flush();
            let mut line = String::new();
            let _ = stdin.lock().read_line(&mut line);
        } else {
            info!(
                "Blocked on {}; waiting {}s before one retry",
                url,
                self.wait.as_secs()
            );
            std::thread::sleep(self.wait);
        }
        self.load_cookie()
    }
}
