//! Best-effort opening of the authorization URL.
//!
//! Openers are tried in order until one succeeds.  Failure of all of them
//! is logged and otherwise ignored: the URL has already been printed for
//! the user to open by hand.  Openers only launch the browser and never
//! wait for it to exit.

use std::io;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

/// Something that can show a URL to the user.
pub trait BrowserOpener: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn open(&self, url: &str) -> io::Result<()>;
}

/// The platform's default handler (`xdg-open`, `open`, `start`, ...).
#[derive(Debug, Default)]
pub struct SystemOpener;

impl BrowserOpener for SystemOpener {
    fn name(&self) -> &str {
        "system default"
    }

    fn open(&self, url: &str) -> io::Result<()> {
        open::that_detached(url)
    }
}

/// Starts `program <url>` in the background.
///
/// Succeeds once the process is spawned; its exit status is not observed.
#[derive(Debug)]
pub struct CommandOpener {
    program: String,
}

impl CommandOpener {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl BrowserOpener for CommandOpener {
    fn name(&self) -> &str {
        &self.program
    }

    fn open(&self, url: &str) -> io::Result<()> {
        Command::new(&self.program)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }
}

/// Openers tried when none are configured: the platform default, then
/// a browser binary for desktops without a registered URL handler.
pub fn default_openers() -> Vec<Box<dyn BrowserOpener>> {
    vec![
        Box::new(SystemOpener),
        Box::new(CommandOpener::new("google-chrome")),
    ]
}

/// Try each opener in turn; `true` if one of them succeeded.
pub fn open_best_effort(openers: &[Box<dyn BrowserOpener>], url: &str) -> bool {
    for opener in openers {
        match opener.open(url) {
            Ok(()) => {
                debug!(opener = opener.name(), "opened authorization URL");
                return true;
            }
            Err(e) => debug!(opener = opener.name(), error = %e, "opener failed"),
        }
    }
    warn!(url, "could not open a browser; visit the authorization URL manually");
    false
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Recording {
        name: &'static str,
        succeed: bool,
        calls: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(name: &'static str, succeed: bool) -> Self {
            Self {
                name,
                succeed,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl BrowserOpener for Arc<Recording> {
        fn name(&self) -> &str {
            self.name
        }

        fn open(&self, url: &str) -> io::Result<()> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.succeed {
                Ok(())
            } else {
                Err(io::Error::other("nope"))
            }
        }
    }

    #[test]
    fn stops_at_first_success() {
        let failing = Arc::new(Recording::new("failing", false));
        let working = Arc::new(Recording::new("working", true));
        let unused = Arc::new(Recording::new("unused", true));
        let openers: Vec<Box<dyn BrowserOpener>> = vec![
            Box::new(Arc::clone(&failing)),
            Box::new(Arc::clone(&working)),
            Box::new(Arc::clone(&unused)),
        ];

        assert!(open_best_effort(&openers, "http://example.test/auth"));
        assert_eq!(failing.calls.lock().unwrap().len(), 1);
        assert_eq!(working.calls.lock().unwrap().as_slice(), ["http://example.test/auth"]);
        assert!(unused.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn all_failing_is_not_fatal() {
        let a = Arc::new(Recording::new("a", false));
        let b = Arc::new(Recording::new("b", false));
        let openers: Vec<Box<dyn BrowserOpener>> =
            vec![Box::new(Arc::clone(&a)), Box::new(Arc::clone(&b))];

        assert!(!open_best_effort(&openers, "http://example.test/auth"));
        assert_eq!(b.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_program_is_an_error() {
        let opener = CommandOpener::new("gsupload-no-such-browser-binary");
        assert!(opener.open("http://example.test").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_opener_does_not_wait_for_the_browser() {
        let opener = CommandOpener::new("sleep");
        let started = std::time::Instant::now();
        opener.open("5").unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn default_list_starts_with_system_opener() {
        let openers = default_openers();
        assert_eq!(openers[0].name(), "system default");
        assert!(openers.len() > 1);
    }
}
