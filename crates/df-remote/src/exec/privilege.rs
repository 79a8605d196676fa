//! Privilege escalation wrapper
//!
//! Every command, whether it targets root or a named account, goes through
//! `sudo -S`, which reads the secret from the first line of stdin.

use std::borrow::Cow;

use shell_escape::unix::escape;

use df_core::Credential;

/// Quote a string for a POSIX shell
pub fn quote(text: &str) -> Cow<'_, str> {
    escape(Cow::Borrowed(text))
}

/// Wrap `script` so it runs under sudo, optionally as `as_user`
///
/// `-k` discards any cached timestamp so sudo always consumes the secret
/// line instead of leaving it for the script.
pub fn wrap(script: &str, as_user: Option<&str>) -> String {
    match as_user {
        Some(user) => format!(
            "sudo -S -k -u {} -- bash -c {}",
            quote(user),
            quote(script)
        ),
        None => format!("sudo -S -k -- bash -c {}", quote(script)),
    }
}

/// Start the file-transfer server as `account`
///
/// Runs the first executable among `candidates`; the secret line is still
/// expected on stdin ahead of the protocol stream.
pub fn file_server_as(account: &str, candidates: &[String]) -> String {
    let paths = candidates
        .iter()
        .map(|path| quote(path))
        .collect::<Vec<_>>()
        .join(" ");
    let script = format!(
        r#"for server in {}; do [ -x "$server" ] && exec "$server"; done; echo 'sftp-server not found' >&2; exit 127"#,
        paths
    );
    wrap(&script, Some(account))
}

/// Detach `script` from the session so it survives the connection closing
pub fn detach(script: &str) -> String {
    format!(
        "nohup bash -c {} > /dev/null 2>&1 < /dev/null & disown",
        quote(script)
    )
}

/// Bytes written to the channel right after invocation
pub fn secret_line(credential: &Credential) -> Vec<u8> {
    let mut line = credential.secret.clone().into_bytes();
    line.push(b'\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_as_root() {
        assert_eq!(wrap("uptime -p", None), "sudo -S -k -- bash -c 'uptime -p'");
    }

    #[test]
    fn test_wrap_as_user_uses_same_mechanism() {
        let wrapped = wrap("xdg-user-dir DESKTOP", Some("ana"));
        assert!(wrapped.starts_with("sudo -S -k -u ana -- bash -c "));
        assert!(wrapped.ends_with("'xdg-user-dir DESKTOP'"));
    }

    #[test]
    fn test_wrap_quotes_embedded_quotes() {
        let wrapped = wrap("echo 'hi'", None);
        assert_eq!(wrapped, r#"sudo -S -k -- bash -c 'echo '\''hi'\'''"#);
    }

    #[test]
    fn test_secret_line() {
        let cred = Credential::new("admin", "s3cret");
        assert_eq!(secret_line(&cred), b"s3cret\n".to_vec());
    }

    #[test]
    fn test_file_server_runs_as_account() {
        let command = file_server_as(
            "ana",
            &["/usr/lib/openssh/sftp-server".to_string(), "/usr/libexec/openssh/sftp-server".to_string()],
        );
        assert!(command.starts_with("sudo -S -k -u ana -- bash -c "));
        assert!(command.contains("/usr/lib/openssh/sftp-server /usr/libexec/openssh/sftp-server"));
        assert!(command.contains("exec "));
    }

    #[test]
    fn test_detach() {
        assert_eq!(
            detach("reboot"),
            "nohup bash -c reboot > /dev/null 2>&1 < /dev/null & disown"
        );
    }
}
