//! Parsing of the `get_system_info` report

use serde::{Deserialize, Serialize};

pub const CPU_MARKER: &str = "---CPU_USAGE---";
pub const MEMORY_MARKER: &str = "----MEMORY----";
pub const DISK_MARKER: &str = "----DISK----";
pub const UPTIME_MARKER: &str = "----UPTIME----";
pub const END_MARKER: &str = "----END----";

const UNAVAILABLE: &str = "N/A";

/// Collects the four sections between fixed markers
pub const SYSTEM_INFO_SCRIPT: &str = r#"
for cmd in top free df uptime; do
    if ! command -v "$cmd" > /dev/null 2>&1; then
        echo "Required command '$cmd' not found" >&2
        exit 1
    fi
done
echo "---CPU_USAGE---"
LC_ALL=C top -bn1 | grep 'Cpu(s)' | sed -E 's/.*, *([0-9.]+) id.*/\1/' | awk '{printf "%.1f%%\n", 100 - $1}'
echo "----MEMORY----"
LC_ALL=C free -h | grep '^Mem:' | awk '{print $3 "/" $2 " (avail: " $7 ")"}'
echo "----DISK----"
LC_ALL=C df -h / | tail -n 1 | awk '{print $3 "/" $2 " (" $5 " used)"}'
echo "----UPTIME----"
uptime -p
echo "----END----"
"#;

/// Vital statistics of a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    pub uptime: String,
}

fn section(output: &str, start: &str, end: &str) -> String {
    output
        .find(start)
        .map(|idx| &output[idx + start.len()..])
        .and_then(|rest| rest.find(end).map(|idx| rest[..idx].trim()))
        .filter(|text| !text.is_empty())
        .unwrap_or(UNAVAILABLE)
        .to_string()
}

/// Extract each section; missing or empty ones become `N/A`
pub fn parse_system_info(output: &str) -> SystemInfo {
    SystemInfo {
        cpu: section(output, CPU_MARKER, MEMORY_MARKER),
        memory: section(output, MEMORY_MARKER, DISK_MARKER),
        disk: section(output, DISK_MARKER, UPTIME_MARKER),
        uptime: section(output, UPTIME_MARKER, END_MARKER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_report() {
        let output = "---CPU_USAGE---\n12.5%\n----MEMORY----\n2.1Gi/7.6Gi (avail: 5.2Gi)\n\
                      ----DISK----\n40G/117G (36% used)\n----UPTIME----\nup 2 hours, 5 minutes\n----END----\n";
        let info = parse_system_info(output);
        assert_eq!(info.cpu, "12.5%");
        assert_eq!(info.memory, "2.1Gi/7.6Gi (avail: 5.2Gi)");
        assert_eq!(info.disk, "40G/117G (36% used)");
        assert_eq!(info.uptime, "up 2 hours, 5 minutes");
    }

    #[test]
    fn test_missing_sections_are_unavailable() {
        let info = parse_system_info("---CPU_USAGE---\n\n----MEMORY----\n1G/2G\n");
        assert_eq!(info.cpu, "N/A");
        assert_eq!(info.memory, "N/A");
        assert_eq!(info.uptime, "N/A");
    }
}
