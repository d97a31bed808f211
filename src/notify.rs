//! Final-notification delivery.
//!
//! The consolidated report goes out through the system `mail` command when an
//! address is configured. No address, or no working transport, degrades to
//! printing the report on stdout - the run never fails just because the
//! messenger is missing.

use std::io::Write;
use std::process::{Command, Stdio};

use log::{info, warn};

use crate::error::Result;
use crate::process_guard::{ChildRegistry, CommandProcessGroup};

/// Notification seam; the coordinator only ever talks to this trait.
pub trait Notify {
    fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// `mail(1)` transport with stdout fallback.
pub struct MailNotifier {
    mail_to: Option<String>,
}

impl MailNotifier {
    pub fn new(mail_to: Option<String>) -> Self {
        Self { mail_to }
    }

    fn print_fallback(subject: &str, body: &str) {
        println!("{}", subject);
        println!("{}", "=".repeat(subject.len()));
        println!("{}", body);
    }
}

impl Notify for MailNotifier {
    fn send(&self, subject: &str, body: &str) -> Result<()> {
        let Some(addr) = &self.mail_to else {
            info!("No notification address configured, printing report");
            Self::print_fallback(subject, body);
            return Ok(());
        };

        let mut cmd = Command::new("mail");
        cmd.arg("-s")
            .arg(subject)
            .arg(addr)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .in_new_process_group();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Mail transport unavailable ({}), printing report", e);
                Self::print_fallback(subject, body);
                return Ok(());
            }
        };
        let pid = child.id();
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        // Body goes to mail's stdin; dropping the handle closes the pipe
        let write_result = child
            .stdin
            .take()
            .map(|mut stdin| stdin.write_all(body.as_bytes()));
        let status = child.wait();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let delivered = matches!(write_result, Some(Ok(()))) && matches!(&status, Ok(s) if s.success());
        if delivered {
            info!("Notification sent to {}", addr);
        } else {
            warn!("Mail delivery to {} failed, printing report", addr);
            Self::print_fallback(subject, body);
        }
        Ok(())
    }
}
