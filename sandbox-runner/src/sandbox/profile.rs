//! Isolation profile builder
//!
//! Translates the fixed security policy plus per-call options into the ordered
//! list of constraints a launcher applies to the untrusted process.

use std::fmt;

use serde::Deserialize;

use super::options::SandboxOptions;

/// A single declarative restriction passed to the process launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// No network interfaces besides loopback
    NoNetwork,
    /// Root filesystem mounted read-only
    ReadOnlyRoot,
    /// Drop every Linux capability
    DropAllCapabilities,
    /// Forbid privilege re-acquisition (setuid binaries, file caps)
    NoNewPrivileges,
    /// Maximum number of concurrent processes/threads
    PidsLimit(u32),
    /// Memory cap in MiB
    Memory(u32),
    /// Memory + swap cap in MiB
    MemorySwap(u32),
    /// CPU share in thousandths of one core
    Cpus(u32),
    /// Private, empty IPC namespace
    NoIpc,
    /// Run as this non-root identity
    User { uid: u32, gid: u32 },
    /// Writable scratch mount with noexec, nosuid, nodev
    ScratchTmpfs { path: String, size_mib: u32 },
    /// Caller supplied argument passed through verbatim
    Extra(String),
}

impl Constraint {
    /// Whether this constraint belongs to the non-overridable set.
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, Constraint::Extra(_))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::NoNetwork => write!(f, "no-network"),
            Constraint::ReadOnlyRoot => write!(f, "read-only-root"),
            Constraint::DropAllCapabilities => write!(f, "cap-drop=ALL"),
            Constraint::NoNewPrivileges => write!(f, "no-new-privileges"),
            Constraint::PidsLimit(n) => write!(f, "pids-limit={}", n),
            Constraint::Memory(mib) => write!(f, "memory={}m", mib),
            Constraint::MemorySwap(mib) => write!(f, "memory-swap={}m", mib),
            Constraint::Cpus(millis) => write!(f, "cpus={}", format_cpus(*millis)),
            Constraint::NoIpc => write!(f, "ipc=none"),
            Constraint::User { uid, gid } => write!(f, "user={}:{}", uid, gid),
            Constraint::ScratchTmpfs { path, size_mib } => {
                write!(f, "tmpfs={}:rw,noexec,nosuid,nodev,size={}m", path, size_mib)
            }
            Constraint::Extra(arg) => write!(f, "extra={}", arg),
        }
    }
}

/// Render a CPU share given in thousandths of a core ("500" -> "0.5").
pub fn format_cpus(millis: u32) -> String {
    let whole = millis / 1000;
    let frac = millis % 1000;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:03}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Numeric caps behind the mandatory constraint set.
///
/// Operators may tune these through configuration; callers never can.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IsolationPolicy {
    /// Maximum number of processes/threads (default: 128)
    pub pids_limit: u32,
    /// Memory cap in MiB, also used for memory+swap (default: 256)
    pub memory_mib: u32,
    /// CPU share in thousandths of a core (default: 500 = 0.5 core)
    pub cpu_millis: u32,
    /// Non-root user id (default: 65532, nobody)
    pub uid: u32,
    /// Non-root group id (default: 65532, nogroup)
    pub gid: u32,
    /// Scratch mount point (default: /tmp)
    pub scratch_path: String,
    /// Scratch size in MiB (default: 64)
    pub scratch_mib: u32,
}

impl Default for IsolationPolicy {
    fn default() -> Self {
        Self {
            pids_limit: 128,
            memory_mib: 256,
            cpu_millis: 500,
            uid: 65532,
            gid: 65532,
            scratch_path: "/tmp".to_string(),
            scratch_mib: 64,
        }
    }
}

/// Ordered constraint list for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationProfile {
    constraints: Vec<Constraint>,
}

impl IsolationProfile {
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The mandatory prefix of the profile.
    pub fn mandatory(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().take_while(|c| c.is_mandatory())
    }

    /// Caller supplied constraints, in the order they were given.
    pub fn extras(&self) -> impl Iterator<Item = &str> {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::Extra(arg) => Some(arg.as_str()),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// Builds isolation profiles from a fixed policy.
#[derive(Debug, Clone, Default)]
pub struct IsolationProfileBuilder {
    policy: IsolationPolicy,
}

impl IsolationProfileBuilder {
    pub fn new(policy: IsolationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &IsolationPolicy {
        &self.policy
    }

    /// The mandatory constraints, in their fixed order.
    pub fn mandatory_constraints(&self) -> Vec<Constraint> {
        let p = &self.policy;
        vec![
            Constraint::NoNetwork,
            Constraint::ReadOnlyRoot,
            Constraint::DropAllCapabilities,
            Constraint::NoNewPrivileges,
            Constraint::PidsLimit(p.pids_limit),
            Constraint::Memory(p.memory_mib),
            // Same value as memory: no swap escape valve
            Constraint::MemorySwap(p.memory_mib),
            Constraint::Cpus(p.cpu_millis),
            Constraint::NoIpc,
            Constraint::User {
                uid: p.uid,
                gid: p.gid,
            },
            Constraint::ScratchTmpfs {
                path: p.scratch_path.clone(),
                size_mib: p.scratch_mib,
            },
        ]
    }

    /// Produce the full profile: mandatory set first, then the caller's extras.
    ///
    /// Extras are not checked for conflicts with the mandatory set; a malformed
    /// extra is rejected by the launcher at spawn time.
    pub fn build(&self, options: &SandboxOptions) -> IsolationProfile {
        let mut constraints = self.mandatory_constraints();
        constraints.extend(
            options
                .extra_constraints
                .iter()
                .cloned()
                .map(Constraint::Extra),
        );
        IsolationProfile { constraints }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_with_extras(extras: &[&str]) -> SandboxOptions {
        SandboxOptions {
            extra_constraints: extras.iter().map(|s| s.to_string()).collect(),
            ..SandboxOptions::default()
        }
    }

    #[test]
    fn test_mandatory_constraints_come_first_in_fixed_order() {
        let builder = IsolationProfileBuilder::default();
        let profile = builder.build(&SandboxOptions::default());

        assert_eq!(
            profile.constraints(),
            &[
                Constraint::NoNetwork,
                Constraint::ReadOnlyRoot,
                Constraint::DropAllCapabilities,
                Constraint::NoNewPrivileges,
                Constraint::PidsLimit(128),
                Constraint::Memory(256),
                Constraint::MemorySwap(256),
                Constraint::Cpus(500),
                Constraint::NoIpc,
                Constraint::User {
                    uid: 65532,
                    gid: 65532
                },
                Constraint::ScratchTmpfs {
                    path: "/tmp".to_string(),
                    size_mib: 64
                },
            ]
        );
        assert_eq!(profile.extras().count(), 0);
    }

    #[test]
    fn test_extras_are_appended_after_mandatory_set() {
        let builder = IsolationProfileBuilder::default();
        let profile = builder.build(&options_with_extras(&["--network=host", "--privileged"]));
        let mandatory = builder.mandatory_constraints();

        assert_eq!(profile.len(), mandatory.len() + 2);
        assert_eq!(&profile.constraints()[..mandatory.len()], mandatory.as_slice());
        assert_eq!(
            profile.extras().collect::<Vec<_>>(),
            vec!["--network=host", "--privileged"]
        );
        assert_eq!(profile.mandatory().count(), mandatory.len());
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = IsolationProfileBuilder::default();
        let options = options_with_extras(&["--cpus", "1"]);

        let first = builder.build(&options);
        for _ in 0..10 {
            assert_eq!(builder.build(&options), first);
        }
    }

    #[test]
    fn test_policy_values_flow_into_constraints() {
        let builder = IsolationProfileBuilder::new(IsolationPolicy {
            pids_limit: 32,
            memory_mib: 512,
            cpu_millis: 1250,
            uid: 1000,
            gid: 1001,
            scratch_path: "/scratch".to_string(),
            scratch_mib: 16,
        });
        let mandatory = builder.mandatory_constraints();

        assert!(mandatory.contains(&Constraint::PidsLimit(32)));
        assert!(mandatory.contains(&Constraint::MemorySwap(512)));
        assert!(mandatory.contains(&Constraint::User {
            uid: 1000,
            gid: 1001
        }));
        assert_eq!(
            mandatory.last().map(|c| c.to_string()),
            Some("tmpfs=/scratch:rw,noexec,nosuid,nodev,size=16m".to_string())
        );
    }

    #[test]
    fn test_format_cpus() {
        assert_eq!(format_cpus(500), "0.5");
        assert_eq!(format_cpus(1000), "1");
        assert_eq!(format_cpus(1250), "1.25");
        assert_eq!(format_cpus(5), "0.005");
    }
}
