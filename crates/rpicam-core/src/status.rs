use chrono::{DateTime, Utc};

/// Source of the `/status` numbers.
pub trait StatusProvider: Send + Sync {
    fn uptime(&self) -> String;
    fn memory_usage(&self) -> String;
}

/// Reports on the running process: time since launch and resident memory.
#[derive(Clone, Debug)]
pub struct ProcessStatus {
    launched: DateTime<Utc>,
}

impl ProcessStatus {
    pub fn new() -> Self {
        Self::since(Utc::now())
    }

    pub fn since(launched: DateTime<Utc>) -> Self {
        Self { launched }
    }
}

impl Default for ProcessStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusProvider for ProcessStatus {
    fn uptime(&self) -> String {
        let secs = Utc::now()
            .signed_duration_since(self.launched)
            .num_seconds();
        format_uptime(secs)
    }

    fn memory_usage(&self) -> String {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(txt) => format_memory(&txt).unwrap_or_else(|| "unavailable".to_string()),
            Err(e) => {
                tracing::debug!("cannot read /proc/self/status: {e}");
                "unavailable".to_string()
            }
        }
    }
}

pub fn format_uptime(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        return format!("{days}d {hours}h {mins}m {secs}s");
    }
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

/// Render `VmRSS` (and `VmHWM` when present) from a `/proc/<pid>/status` dump.
fn format_memory(proc_status: &str) -> Option<String> {
    let rss = proc_kb(proc_status, "VmRSS:")?;
    let mb = |kb: u64| kb as f64 / 1024.0;
    Some(match proc_kb(proc_status, "VmHWM:") {
        Some(peak) => format!("RSS {:.1} MB (peak {:.1} MB)", mb(rss), mb(peak)),
        None => format!("RSS {:.1} MB", mb(rss)),
    })
}

fn proc_kb(proc_status: &str, key: &str) -> Option<u64> {
    proc_status
        .lines()
        .find_map(|l| l.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse::<u64>().ok())
}
