//! # Optional Capabilities
//!
//! Every optional facility (raw-socket sweeping, reverse DNS, SNMP, remote LLDP
//! sessions, traceroute binaries) is wrapped in a [`Capability`]. Callers ask it
//! whether it can run and always get back an [`Outcome`], which is either the
//! collector's result or an explicit "unavailable" record.

use std::env;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Answer of an availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Result of invoking a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Unavailable {
        capability: &'static str,
        reason: String,
    },
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Unavailable { .. } => None,
        }
    }
}

pub trait Capability {
    /// Short name used in warnings, e.g. `"snmp"`.
    fn name(&self) -> &'static str;

    fn availability(&self) -> Availability;
}

/// Runs `work` only when `capability` is available.
pub async fn invoke<C, F, Fut, T>(capability: &C, work: F) -> Outcome<T>
where
    C: Capability + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    match capability.availability() {
        Availability::Available => Outcome::Completed(work().await),
        Availability::Unavailable(reason) => Outcome::Unavailable {
            capability: capability.name(),
            reason,
        },
    }
}

/// Looks `binary` up in `PATH`.
pub fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Availability);

    impl Capability for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn availability(&self) -> Availability {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn invoke_should_run_available_capability() {
        let capability = Fixed(Availability::Available);
        let outcome: Outcome<u32> = invoke(&capability, || async { 7 }).await;
        assert_eq!(outcome, Outcome::Completed(7));
    }

    #[tokio::test]
    async fn invoke_should_skip_unavailable_capability() {
        let capability = Fixed(Availability::Unavailable("missing".into()));
        let outcome: Outcome<u32> = invoke(&capability, || async { 0 }).await;
        assert_eq!(
            outcome,
            Outcome::Unavailable {
                capability: "fixed",
                reason: "missing".into()
            }
        );
    }

    #[test]
    fn find_in_path_should_miss_nonexistent_binary() {
        assert!(find_in_path("definitely-not-a-real-binary-4f2a").is_none());
    }
}
