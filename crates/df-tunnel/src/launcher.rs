//! Building the tunnel child command

use std::borrow::Cow;
use std::process::Stdio;

use tokio::process::Command;

use df_core::config::TunnelConfig;
use df_core::{Credential, HostId};

/// Everything needed to build one tunnel command
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub host: HostId,
    pub credential: Credential,
    pub local_port: u16,
    pub capture_port: u16,
    pub bridge_port: u16,
}

/// Produces the child command for a tunnel
///
/// The orchestrator pipes stdout and stderr itself; launchers only decide
/// the program, arguments and environment.
pub trait TunnelLauncher: Send + Sync {
    fn command(&self, request: &LaunchRequest) -> Command;
}

/// `sshpass -e ssh -L ...` running the capture and relay services remotely
#[derive(Debug, Clone)]
pub struct SshTunnelLauncher {
    ssh_program: String,
    sshpass_program: String,
}

impl SshTunnelLauncher {
    pub fn new(config: &TunnelConfig) -> Self {
        Self {
            ssh_program: config.ssh_program.clone(),
            sshpass_program: config.sshpass_program.clone(),
        }
    }
}

/// Remote side: replace old services, start capture, run the relay in the foreground
///
/// The script runs as `bash -c <script>`, so its own command line contains
/// every service invocation. The stop patterns only match a command line
/// that starts with the service binary, never the shell running them.
pub fn remote_script(capture_port: u16, bridge_port: u16) -> String {
    format!(
        r#"pkill -f '^([^ ]*/)?x11vnc .*-rfbport {capture}( |$)' 2>/dev/null
pkill -f '^([^ ]*/)?(python[0-9.]* [^ ]*/)?websockify {bridge} ' 2>/dev/null
sleep 0.5
export DISPLAY="${{DISPLAY:-:0}}"
x11vnc -display "$DISPLAY" -auth guess -localhost -rfbport {capture} -forever -shared -nopw -bg -quiet || exit 1
exec websockify {bridge} 127.0.0.1:{capture}"#,
        capture = capture_port,
        bridge = bridge_port,
    )
}

/// Remote command line handed to ssh
pub fn remote_command(capture_port: u16, bridge_port: u16) -> String {
    let script = remote_script(capture_port, bridge_port);
    format!(
        "bash -c {}",
        shell_escape::unix::escape(Cow::Borrowed(script.as_str()))
    )
}

impl TunnelLauncher for SshTunnelLauncher {
    fn command(&self, request: &LaunchRequest) -> Command {
        let remote = remote_command(request.capture_port, request.bridge_port);

        let mut command = Command::new(&self.sshpass_program);
        command
            .arg("-e")
            .arg(&self.ssh_program)
            .args(["-o", "ExitOnForwardFailure=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o", "ConnectTimeout=10"])
            .arg("-L")
            .arg(format!(
                "{}:127.0.0.1:{}",
                request.local_port, request.bridge_port
            ))
            .arg(format!("{}@{}", request.credential.username, request.host))
            .arg(remote)
            .env("SSHPASS", &request.credential.secret)
            .stdin(Stdio::null());
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_script_ports() {
        let script = remote_script(5901, 6081);
        assert!(script.contains("-rfbport 5901"));
        assert!(script.contains("exec websockify 6081 127.0.0.1:5901"));
    }

    #[test]
    fn test_stop_patterns_spare_the_running_shell() {
        let script = remote_script(5900, 6080);
        let patterns: Vec<regex::Regex> = script
            .lines()
            .filter_map(|line| line.strip_prefix("pkill -f '"))
            .map(|rest| regex::Regex::new(&rest[..rest.find('\'').unwrap()]).unwrap())
            .collect();
        assert_eq!(patterns.len(), 2);

        let shell = format!("bash -c {}", script);
        let outer = format!("bash -c {}", remote_command(5900, 6080));
        for pattern in &patterns {
            assert!(!pattern.is_match(&shell));
            assert!(!pattern.is_match(&outer));
        }
        assert!(patterns[0].is_match(
            "/usr/bin/x11vnc -display :0 -auth guess -localhost -rfbport 5900 -forever"
        ));
        assert!(!patterns[0].is_match("x11vnc -rfbport 59001"));
        assert!(patterns[1].is_match("/usr/bin/python3 /usr/bin/websockify 6080 127.0.0.1:5900"));
        assert!(patterns[1].is_match("websockify 6080 127.0.0.1:5900"));
    }

    #[cfg(unix)]
    #[test]
    fn test_remote_script_reaches_the_relay() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        for (name, body) in [
            ("x11vnc", "#!/bin/sh\nexit 0\n"),
            ("websockify", "#!/bin/sh\necho 'WebSocket server settings:'\n"),
        ] {
            let path = bin.path().join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let path = format!(
            "{}:{}",
            bin.path().display(),
            std::env::var("PATH").unwrap_or_default()
        );

        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(remote_command(45931, 46131))
            .env("PATH", path)
            .stdin(Stdio::null())
            .output()
            .unwrap();

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(
            output.status.success(),
            "status {:?}, stderr {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
        assert!(stdout.contains("WebSocket server settings:"), "stdout {:?}", stdout);
    }

    #[test]
    fn test_command_forwards_local_port() {
        let launcher = SshTunnelLauncher::new(&TunnelConfig::default());
        let command = launcher.command(&LaunchRequest {
            host: HostId::new("192.168.0.101"),
            credential: Credential::new("admin", "pw"),
            local_port: 41000,
            capture_port: 5900,
            bridge_port: 6080,
        });
        let std = command.as_std();
        assert_eq!(std.get_program(), "sshpass");
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.contains(&"41000:127.0.0.1:6080".to_string()));
        assert!(args.contains(&"admin@192.168.0.101".to_string()));
        assert!(!args.contains(&"pw".to_string()));
        assert!(std
            .get_envs()
            .any(|(key, value)| key == "SSHPASS" && value == Some(std::ffi::OsStr::new("pw"))));
    }
}
