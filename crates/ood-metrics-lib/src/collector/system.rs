//! Process table inspection backed by sysinfo
//!
//! sysinfo supplies the process list, command lines, owners, memory and CPU
//! percent (measured since the previous refresh of the same `System`). It only
//! exposes a combined CPU time, so on Linux the user/system split is taken
//! from `/proc/<pid>/stat`.

use super::users::{NssUserResolver, OwnerCache, UserResolver};
use super::ProcessSource;
use crate::models::ProcessSample;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind, UpdateKind};
use tracing::debug;

/// USER_HZ; fixed at 100 on all mainstream Linux architectures
pub const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// One process as read from the table, before owner resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub uid: Option<u32>,
    pub cmdline: Vec<String>,
    pub cpu_time_user: f64,
    pub cpu_time_system: f64,
    pub cpu_percent: f64,
    pub rss_bytes: u64,
    pub vms_bytes: u64,
}

/// Process source over a long-lived sysinfo `System`
pub struct SystemProcessSource {
    system: Arc<Mutex<System>>,
    users: Arc<dyn UserResolver>,
    proc_path: PathBuf,
}

impl Default for SystemProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessSource {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(NssUserResolver), "/proc")
    }

    /// Create a source with a custom user resolver and proc root
    pub fn with_resolver(users: Arc<dyn UserResolver>, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            users,
            proc_path: proc_path.into(),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_user(UpdateKind::OnlyIfNotSet)
    }

    /// Refresh the table and read every process; blocking
    fn scan(system: &Mutex<System>, proc_path: &Path) -> (Vec<ProcessInfo>, u64) {
        let mut system = match system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_memory();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());

        let infos = system
            .processes()
            .iter()
            // Threads show up as tasks on Linux; only whole processes count
            .filter(|(_, process)| !matches!(process.thread_kind(), Some(ThreadKind::Userland)))
            .map(|(pid, process)| {
                let pid = pid.as_u32();
                let (cpu_time_user, cpu_time_system) = read_cpu_split(proc_path, pid)
                    .unwrap_or_else(|| (process.accumulated_cpu_time() as f64 / 1000.0, 0.0));

                ProcessInfo {
                    pid,
                    uid: process.user_id().map(|uid| **uid),
                    cmdline: process
                        .cmd()
                        .iter()
                        .map(|arg| arg.to_string_lossy().into_owned())
                        .collect(),
                    cpu_time_user,
                    cpu_time_system,
                    cpu_percent: process.cpu_usage() as f64,
                    rss_bytes: process.memory(),
                    vms_bytes: process.virtual_memory(),
                }
            })
            .collect();

        (infos, system.total_memory())
    }
}

/// Resolve owners and derive memory percent
///
/// Processes without a known uid cannot belong to a PUN owner and are left
/// out. Each uid is resolved once per call.
pub fn to_samples(infos: Vec<ProcessInfo>, users: &dyn UserResolver, total_memory: u64) -> Vec<ProcessSample> {
    let mut owners = OwnerCache::new(users);

    infos
        .into_iter()
        .filter_map(|info| {
            let Some(uid) = info.uid else {
                debug!(pid = info.pid, "Skipping process without owner");
                return None;
            };

            let memory_percent = if total_memory > 0 {
                info.rss_bytes as f64 / total_memory as f64 * 100.0
            } else {
                0.0
            };

            Some(ProcessSample {
                pid: info.pid,
                owner: owners.owner(uid),
                cmdline: info.cmdline,
                cpu_time_user: info.cpu_time_user,
                cpu_time_system: info.cpu_time_system,
                cpu_percent: info.cpu_percent,
                memory_rss: info.rss_bytes as f64,
                memory_vms: info.vms_bytes as f64,
                memory_percent,
            })
        })
        .collect()
}

/// User and system CPU seconds of a pid, if its stat file is readable
pub fn read_cpu_split(proc_path: &Path, pid: u32) -> Option<(f64, f64)> {
    let content = std::fs::read_to_string(proc_path.join(pid.to_string()).join("stat")).ok()?;
    let (utime, stime) = parse_stat_times(&content).ok()?;
    Some((utime as f64 / CLOCK_TICKS_PER_SEC, stime as f64 / CLOCK_TICKS_PER_SEC))
}

/// utime and stime, in clock ticks, from /proc/<pid>/stat contents
pub fn parse_stat_times(content: &str) -> Result<(u64, u64)> {
    // comm may contain spaces and parentheses; fields resume after the last ')'
    let close = content
        .rfind(')')
        .context("Malformed stat: missing command terminator")?;
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();

    // fields[0] is state (field 3); utime and stime are fields 14 and 15
    let utime = fields
        .get(11)
        .context("Malformed stat: missing utime")?
        .parse()
        .context("Failed to parse utime")?;
    let stime = fields
        .get(12)
        .context("Malformed stat: missing stime")?
        .parse()
        .context("Failed to parse stime")?;

    Ok((utime, stime))
}

#[async_trait]
impl ProcessSource for SystemProcessSource {
    async fn snapshot(&self) -> Result<Vec<ProcessSample>> {
        let system = self.system.clone();
        let users = self.users.clone();
        let proc_path = self.proc_path.clone();

        tokio::task::spawn_blocking(move || {
            let (infos, total_memory) = Self::scan(&system, &proc_path);
            to_samples(infos, users.as_ref(), total_memory)
        })
        .await
        .context("Process scan task failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_times() {
        let content = "4242 (nginx: worker) S 1 4242 4242 0 -1 4194624 120 0 0 0 250 75 0 0 20 0 1 0 100 1000000 250 18446744073709551615";
        let (utime, stime) = parse_stat_times(content).unwrap();
        assert_eq!(utime, 250);
        assert_eq!(stime, 75);
    }

    #[test]
    fn test_parse_stat_times_comm_with_parens() {
        let content = "7 (weird) name)) R 1 7 7 0 -1 0 0 0 0 0 3 4 0 0 20 0 1 0 1 1 1";
        assert_eq!(parse_stat_times(content).unwrap(), (3, 4));
    }

    #[test]
    fn test_parse_stat_times_truncated() {
        assert!(parse_stat_times("1 (init) S 0").is_err());
        assert!(parse_stat_times("garbage").is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_snapshot_includes_current_process() {
        let source = SystemProcessSource::new();
        let pid = std::process::id();

        let first = source.snapshot().await.unwrap();
        let me = first.iter().find(|s| s.pid == pid).expect("own process listed");
        assert!(!me.owner.is_empty());
        assert!(!me.cmdline.is_empty());
        assert!(me.memory_rss > 0.0);
        assert!(me.memory_percent > 0.0);

        // A second scan reuses the same table
        let second = source.snapshot().await.unwrap();
        assert!(second.iter().any(|s| s.pid == pid));
    }
}
