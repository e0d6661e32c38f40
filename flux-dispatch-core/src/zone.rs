//! Scheduling zones: where dispatch callbacks run
//!
//! The host framework decides what "tracked" means (change detection,
//! instrumentation, a UI thread hop). The dispatcher only picks a domain and
//! asks the zone to run a callback in it.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Runs callbacks inside or outside the host's tracked domain.
///
/// Implementations must invoke `f` exactly once before returning.
pub trait Zone: Send + Sync + 'static {
    /// Run `f` inside the tracked domain.
    fn run(&self, f: &mut dyn FnMut());

    /// Run `f` outside the tracked domain.
    fn run_outside(&self, f: &mut dyn FnMut());
}

/// A zone with no tracking: both domains run the callback inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopZone;

impl Zone for NoopZone {
    fn run(&self, f: &mut dyn FnMut()) {
        f()
    }

    fn run_outside(&self, f: &mut dyn FnMut()) {
        f()
    }
}

/// Platform the dispatcher is hosted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Client,
    Server,
}

impl Platform {
    pub fn is_server(self) -> bool {
        matches!(self, Platform::Server)
    }
}

/// Execution domain a dispatch runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Tracked,
    Untracked,
}

impl Domain {
    /// Pick the domain for a dispatch.
    ///
    /// The server always runs tracked. On the client `outside_zone` of
    /// `None` or `Some(true)` runs untracked and `Some(false)` runs tracked.
    pub fn select(platform: Platform, outside_zone: Option<bool>) -> Self {
        if platform.is_server() {
            return Domain::Tracked;
        }
        match outside_zone {
            Some(false) => Domain::Tracked,
            None | Some(true) => Domain::Untracked,
        }
    }
}

/// Run `f` in `domain` through `zone` and return its result.
pub fn enter<R>(zone: &dyn Zone, domain: Domain, f: impl FnOnce() -> R) -> R {
    let mut f = Some(f);
    let mut out = None;
    {
        let mut call = || {
            if let Some(f) = f.take() {
                out = Some(f());
            }
        };
        match domain {
            Domain::Tracked => zone.run(&mut call),
            Domain::Untracked => zone.run_outside(&mut call),
        }
    }

    match (out, f) {
        (Some(out), _) => out,
        (None, Some(f)) => {
            warn!(?domain, "Zone returned without running callback, running inline");
            f()
        }
        (None, None) => unreachable!("zone callback consumed without producing a value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DroppingZone;

    impl Zone for DroppingZone {
        fn run(&self, _f: &mut dyn FnMut()) {}
        fn run_outside(&self, _f: &mut dyn FnMut()) {}
    }

    #[test]
    fn test_server_always_tracked() {
        for outside_zone in [None, Some(true), Some(false)] {
            assert_eq!(
                Domain::select(Platform::Server, outside_zone),
                Domain::Tracked
            );
        }
    }

    #[test]
    fn test_client_selection() {
        assert_eq!(Domain::select(Platform::Client, None), Domain::Untracked);
        assert_eq!(
            Domain::select(Platform::Client, Some(true)),
            Domain::Untracked
        );
        assert_eq!(
            Domain::select(Platform::Client, Some(false)),
            Domain::Tracked
        );
    }

    #[test]
    fn test_enter_returns_value() {
        assert_eq!(enter(&NoopZone, Domain::Tracked, || 42), 42);
        assert_eq!(enter(&NoopZone, Domain::Untracked, || "out"), "out");
    }

    #[test]
    fn test_enter_falls_back_when_zone_drops_callback() {
        assert_eq!(enter(&DroppingZone, Domain::Tracked, || 7), 7);
    }

    #[test]
    fn test_platform_serde() {
        let platform: Platform = serde_json::from_str("\"server\"").unwrap();
        assert!(platform.is_server());
        assert_eq!(Platform::default(), Platform::Client);
    }
}
