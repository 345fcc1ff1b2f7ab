//! Dispatch of host lifecycle events onto the synchronizer.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::CacheStorage;
use crate::control::WorkerControl;
use crate::error::Result;
use crate::net::Fetcher;
use crate::request::Request;
use crate::stats::PrefetchStats;
use crate::sync::{ActivationOutcome, FetchOutcome, Synchronizer};

/// Out-of-band commands a controlled page can post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Activate a waiting worker immediately.
    SkipWaiting,
    /// Fetch every managed resource not yet cached.
    DownloadOffline,
}

impl Command {
    /// Parses a message payload. Unknown payloads yield `None`.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "skipWaiting" => Some(Self::SkipWaiting),
            "downloadOffline" => Some(Self::DownloadOffline),
            _ => None,
        }
    }

    /// Returns the wire form of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SkipWaiting => "skipWaiting",
            Self::DownloadOffline => "downloadOffline",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered by the host.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A new worker version was installed.
    Install,
    /// The worker was chosen to control pages.
    Activate,
    /// A controlled page issued a request.
    Fetch(Request),
    /// A controlled page posted a message.
    Message(String),
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
    /// Shell files staged by install.
    Installed(usize),
    /// Result of activation.
    Activated(ActivationOutcome),
    /// How to answer the intercepted request.
    Fetched(FetchOutcome),
    /// A command was accepted; background work, if any, is attached.
    Commanded(Command, Option<JoinHandle<Result<PrefetchStats>>>),
    /// The message payload was not a known command.
    Ignored,
}

/// Routes `event` to the matching synchronizer entry point.
///
/// # Errors
///
/// Returns errors from install and fetch handling. Activation never fails;
/// its failures are reported through [`ActivationOutcome::Reset`].
pub async fn dispatch<S, F, C>(
    sync: &Arc<Synchronizer<S, F, C>>,
    event: WorkerEvent,
) -> Result<EventOutcome>
where
    S: CacheStorage + 'static,
    F: Fetcher + 'static,
    C: WorkerControl + 'static,
{
    match event {
        WorkerEvent::Install => sync.install().await.map(EventOutcome::Installed),
        WorkerEvent::Activate => Ok(EventOutcome::Activated(sync.activate().await)),
        WorkerEvent::Fetch(request) => sync.fetch(&request).await.map(EventOutcome::Fetched),
        WorkerEvent::Message(data) => Ok(Command::parse(&data).map_or_else(
            || {
                log::debug!("Ignoring unknown message {data:?}");
                EventOutcome::Ignored
            },
            |command| EventOutcome::Commanded(command, sync.message(command)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_commands() {
        assert_eq!(Command::parse("skipWaiting"), Some(Command::SkipWaiting));
        assert_eq!(Command::parse("downloadOffline"), Some(Command::DownloadOffline));
        assert_eq!(Command::parse("SKIPWAITING"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn display_matches_wire_form() {
        for command in [Command::SkipWaiting, Command::DownloadOffline] {
            assert_eq!(Command::parse(&command.to_string()), Some(command));
        }
    }
}
