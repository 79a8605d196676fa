//! Launcher backup and restore
//!
//! Disabling moves every launcher file from an account's desktop into
//! `<home>/<root_dir>/<desktop basename>/`. Restoring looks requested names
//! up in that tree, first exactly and then by [`normalized_key`], and moves
//! the real backed-up file back.
//!
//! File access on an account's home runs as that account, through an SFTP
//! server started under sudo.

mod normalize;

pub use normalize::normalized_key;

use std::collections::BTreeMap;

use serde::Serialize;

use df_core::config::BackupConfig;
use df_core::error::{BackupError, ExecError};
use df_core::Credential;

use crate::exec::execute;
use crate::exec::privilege::{file_server_as, quote, secret_line};
use crate::session::RemoteSession;
use crate::transport::{base_name, join_path, RemoteFs};

/// One launcher file found under the backup root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub subdirectory: String,
    pub filename: String,
}

impl BackupEntry {
    /// Matching key; derived on demand, never stored
    pub fn key(&self, extension: &str) -> String {
        normalized_key(&self.filename, extension)
    }
}

/// Result of disabling one account's launchers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisableReport {
    pub moved: usize,
    /// Files that could not be moved, with the reason
    pub failures: Vec<String>,
}

/// Result of restoring launchers for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: usize,
    pub errors: Vec<String>,
    /// Requested names with no backup on this host
    pub warnings: Vec<String>,
}

/// Backup/restore operations bound to one configuration
#[derive(Debug, Clone)]
pub struct LauncherBackup {
    config: BackupConfig,
}

impl LauncherBackup {
    pub fn new(config: BackupConfig) -> Self {
        Self { config }
    }

    fn is_launcher(&self, name: &str) -> bool {
        name.ends_with(&self.config.launcher_extension)
    }

    /// File access with `account`'s own permissions
    pub async fn account_fs(
        &self,
        session: &RemoteSession,
        credential: &Credential,
        account: &str,
    ) -> Result<Box<dyn RemoteFs>, BackupError> {
        let command = file_server_as(account, &self.config.file_server_paths);
        Ok(session
            .file_system_via(&command, &secret_line(credential))
            .await?)
    }

    /// Home directory of `account`
    pub async fn account_home(
        &self,
        session: &RemoteSession,
        credential: &Credential,
        account: &str,
    ) -> Result<String, BackupError> {
        let script = format!("getent passwd {} | cut -d: -f6", quote(account));
        let home = execute(session, &script, credential, None).await?.stdout;
        let home = home.trim();
        if !home.starts_with('/') {
            return Err(BackupError::NoDesktopDirectory {
                account: account.to_string(),
            });
        }
        Ok(home.to_string())
    }

    /// Resolve the desktop directory of `account`
    ///
    /// Asks `xdg-user-dir` first; when that yields nothing usable, falls
    /// back to the configured localized names in order.
    pub async fn desktop_dir(
        &self,
        session: &RemoteSession,
        fs: &dyn RemoteFs,
        credential: &Credential,
        account: &str,
        home: &str,
    ) -> Result<String, BackupError> {
        match execute(session, "xdg-user-dir DESKTOP", credential, Some(account)).await {
            Ok(result) => {
                let reported = result.stdout.trim();
                // xdg-user-dir prints $HOME when DESKTOP is not configured.
                if !reported.is_empty() && reported.trim_end_matches('/') != home {
                    let candidate = join_path(home, reported);
                    if fs.is_dir(&candidate).await? {
                        return Ok(candidate);
                    }
                }
            }
            Err(ExecError::Session(e)) => return Err(e.into()),
            Err(e) => tracing::debug!("xdg-user-dir failed for {}: {}", account, e),
        }

        for name in &self.config.desktop_names {
            let candidate = join_path(home, name);
            if fs.is_dir(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(BackupError::NoDesktopDirectory {
            account: account.to_string(),
        })
    }

    /// Move every launcher from the account's desktop into the backup tree
    ///
    /// Running it again with no launchers left moves nothing and succeeds.
    pub async fn disable(
        &self,
        session: &RemoteSession,
        credential: &Credential,
        account: &str,
    ) -> Result<DisableReport, BackupError> {
        let home = self.account_home(session, credential, account).await?;
        let fs = self.account_fs(session, credential, account).await?;
        let desktop = self
            .desktop_dir(session, fs.as_ref(), credential, account, &home)
            .await?;

        let root = join_path(&home, &self.config.root_dir);
        let target = join_path(&root, base_name(&desktop));
        fs.ensure_dir(&root).await?;
        fs.ensure_dir(&target).await?;

        let mut report = DisableReport::default();
        for entry in fs.list_dir(&desktop).await? {
            if entry.is_dir || !self.is_launcher(&entry.name) {
                continue;
            }
            let source = join_path(&desktop, &entry.name);
            let name = self.free_name(fs.as_ref(), &target, &entry.name).await?;
            match fs.rename(&source, &join_path(&target, &name)).await {
                Ok(()) => report.moved += 1,
                Err(e) => report.failures.push(format!("{}: {}", entry.name, e)),
            }
        }

        tracing::info!(
            "Disabled {} launcher(s) for {} on {}",
            report.moved,
            account,
            session.host()
        );
        Ok(report)
    }

    /// First name in `dir` not yet taken: `name`, then `stem-1.ext`, `stem-2.ext`, ...
    async fn free_name(
        &self,
        fs: &dyn RemoteFs,
        dir: &str,
        name: &str,
    ) -> Result<String, BackupError> {
        if !fs.exists(&join_path(dir, name)).await? {
            return Ok(name.to_string());
        }
        let ext = &self.config.launcher_extension;
        let stem = name.strip_suffix(ext.as_str()).unwrap_or(name);
        let mut n = 1;
        loop {
            let candidate = format!("{}-{}{}", stem, n, ext);
            if !fs.exists(&join_path(dir, &candidate)).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Every launcher under `root`, sorted by subdirectory then filename
    pub async fn index(
        &self,
        fs: &dyn RemoteFs,
        root: &str,
    ) -> Result<Vec<BackupEntry>, BackupError> {
        if !fs.is_dir(root).await? {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for dir in fs.list_dir(root).await? {
            if !dir.is_dir {
                continue;
            }
            for file in fs.list_dir(&join_path(root, &dir.name)).await? {
                if !file.is_dir && self.is_launcher(&file.name) {
                    entries.push(BackupEntry {
                        subdirectory: dir.name.clone(),
                        filename: file.name,
                    });
                }
            }
        }
        entries.sort_by(|a, b| {
            (&a.subdirectory, &a.filename).cmp(&(&b.subdirectory, &b.filename))
        });
        Ok(entries)
    }

    /// Move requested launchers back to the account's desktop
    ///
    /// `requested` holds `subdirectory/filename` paths, as returned by
    /// [`list_backups`](Self::list_backups), possibly from another host.
    /// A path without a subdirectory is looked up under the desktop's own
    /// basename. Misses become warnings.
    pub async fn restore(
        &self,
        session: &RemoteSession,
        credential: &Credential,
        account: &str,
        requested: &[String],
    ) -> Result<RestoreReport, BackupError> {
        let ext = self.config.launcher_extension.as_str();
        let home = self.account_home(session, credential, account).await?;
        let fs = self.account_fs(session, credential, account).await?;
        let desktop = self
            .desktop_dir(session, fs.as_ref(), credential, account, &home)
            .await?;
        let root = join_path(&home, &self.config.root_dir);

        let entries = self.index(fs.as_ref(), &root).await?;
        let mut taken = vec![false; entries.len()];
        let mut report = RestoreReport::default();

        for path in requested {
            let (subdir, file) = match path.rsplit_once('/') {
                Some((dir, file)) => (base_name(dir), file),
                None => (base_name(&desktop), path.as_str()),
            };
            let wanted = normalized_key(file, ext);

            let hit = entries
                .iter()
                .enumerate()
                .position(|(i, e)| !taken[i] && e.subdirectory == subdir && e.filename == file)
                .or_else(|| {
                    entries.iter().enumerate().position(|(i, e)| {
                        !taken[i] && e.subdirectory == subdir && e.key(ext) == wanted
                    })
                });

            let Some(idx) = hit else {
                report
                    .warnings
                    .push(format!("{} not found in this machine's backup", path));
                continue;
            };
            taken[idx] = true;

            let entry = &entries[idx];
            let source = join_path(&join_path(&root, &entry.subdirectory), &entry.filename);
            match fs.rename(&source, &join_path(&desktop, &entry.filename)).await {
                Ok(()) => report.restored += 1,
                Err(e) => report.errors.push(format!("{}: {}", entry.filename, e)),
            }
        }

        tracing::info!(
            "Restored {}/{} launcher(s) for {} on {}",
            report.restored,
            requested.len(),
            account,
            session.host()
        );
        Ok(report)
    }

    /// Launchers backed up under one home, by subdirectory
    ///
    /// Lists `account`'s tree, which is the one [`restore`](Self::restore)
    /// searches for that account; `None` lists the connected account's.
    /// Empty subdirectories are omitted.
    pub async fn list_backups(
        &self,
        session: &RemoteSession,
        credential: &Credential,
        account: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<String>>, BackupError> {
        let (fs, home) = match account {
            Some(account) => {
                let home = self.account_home(session, credential, account).await?;
                (self.account_fs(session, credential, account).await?, home)
            }
            None => {
                let fs = session.file_system().await?;
                let home = fs.home_dir().await?;
                (fs, home)
            }
        };
        let root = join_path(&home, &self.config.root_dir);

        let mut listing: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in self.index(fs.as_ref(), &root).await? {
            listing
                .entry(entry.subdirectory)
                .or_default()
                .push(entry.filename);
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDialer, MockHost, MockPurger};
    use df_core::HostId;
    use std::time::Duration;

    fn cred() -> Credential {
        Credential::new("admin", "pw")
    }

    async fn session_on(host: &MockHost) -> RemoteSession {
        RemoteSession::open(
            HostId::new("192.168.0.105"),
            &cred(),
            &MockDialer::new(host.clone()),
            &MockPurger::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    fn host_with_account(account: &str, desktop: &str) -> MockHost {
        let home = format!("/home/{}", account);
        let host = MockHost::new("/home/admin");
        let getent = format!("getent passwd {}", account);
        let as_user = format!("-u {}", account);
        host.respond_ok(&[getent.as_str()], &format!("{}\n", home));
        host.respond_ok(
            &[as_user.as_str(), "xdg-user-dir"],
            &format!("{}/{}\n", home, desktop),
        );
        host.add_dir(&format!("{}/{}", home, desktop));
        host
    }

    #[tokio::test]
    async fn test_desktop_falls_back_to_localized_names() {
        let host = MockHost::new("/home/admin");
        host.respond_ok(&["-u ana", "xdg-user-dir"], "/home/ana\n");
        host.add_dir("/home/ana/Área de Trabalho");
        let session = session_on(&host).await;
        let fs = session.file_system().await.unwrap();

        let backup = LauncherBackup::new(BackupConfig::default());
        let desktop = backup
            .desktop_dir(&session, fs.as_ref(), &cred(), "ana", "/home/ana")
            .await
            .unwrap();
        assert_eq!(desktop, "/home/ana/Área de Trabalho");
    }

    #[tokio::test]
    async fn test_relative_xdg_answer_is_joined_to_home() {
        let host = MockHost::new("/home/admin");
        host.respond_ok(&["-u ana", "xdg-user-dir"], "Escritorio\n");
        host.add_dir("/home/ana/Escritorio");
        let session = session_on(&host).await;
        let fs = session.file_system().await.unwrap();

        let backup = LauncherBackup::new(BackupConfig::default());
        let desktop = backup
            .desktop_dir(&session, fs.as_ref(), &cred(), "ana", "/home/ana")
            .await
            .unwrap();
        assert_eq!(desktop, "/home/ana/Escritorio");
    }

    #[tokio::test]
    async fn test_no_desktop_is_error() {
        let host = MockHost::new("/home/admin");
        let session = session_on(&host).await;
        let fs = session.file_system().await.unwrap();

        let backup = LauncherBackup::new(BackupConfig::default());
        let err = backup
            .desktop_dir(&session, fs.as_ref(), &cred(), "ana", "/home/ana")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NoDesktopDirectory { .. }));
    }

    #[tokio::test]
    async fn test_disable_moves_only_launchers() {
        let host = host_with_account("ana", "Desktop");
        host.add_file("/home/ana/Desktop/Firefox.desktop");
        host.add_file("/home/ana/Desktop/Writer-2.desktop");
        host.add_file("/home/ana/Desktop/notes.txt");
        let session = session_on(&host).await;

        let backup = LauncherBackup::new(BackupConfig::default());
        let report = backup.disable(&session, &cred(), "ana").await.unwrap();

        assert_eq!(report.moved, 2);
        assert!(report.failures.is_empty());
        assert_eq!(
            host.files_in("/home/ana/Desktop").into_iter().collect::<Vec<_>>(),
            vec!["notes.txt"]
        );
        assert_eq!(host.files_in("/home/ana/disabled_launchers/Desktop").len(), 2);
    }

    #[tokio::test]
    async fn test_disable_is_idempotent_with_no_launchers() {
        let host = host_with_account("ana", "Desktop");
        let session = session_on(&host).await;
        let backup = LauncherBackup::new(BackupConfig::default());

        for _ in 0..2 {
            let report = backup.disable(&session, &cred(), "ana").await.unwrap();
            assert_eq!(report, DisableReport::default());
        }
    }

    #[tokio::test]
    async fn test_disable_avoids_overwriting_existing_backup() {
        let host = host_with_account("ana", "Desktop");
        host.add_file("/home/ana/disabled_launchers/Desktop/App.desktop");
        host.add_file("/home/ana/Desktop/App.desktop");
        let session = session_on(&host).await;

        let backup = LauncherBackup::new(BackupConfig::default());
        let report = backup.disable(&session, &cred(), "ana").await.unwrap();
        assert_eq!(report.moved, 1);
        assert!(host
            .files_in("/home/ana/disabled_launchers/Desktop")
            .contains("App-1.desktop"));
    }

    #[tokio::test]
    async fn test_disable_records_rename_failures() {
        let host = host_with_account("ana", "Desktop");
        host.add_file("/home/ana/Desktop/Locked.desktop");
        host.fail_rename("/home/ana/Desktop/Locked.desktop");
        let session = session_on(&host).await;

        let backup = LauncherBackup::new(BackupConfig::default());
        let report = backup.disable(&session, &cred(), "ana").await.unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_fuzzy_restore_matches_renumbered_backup() {
        let host = host_with_account("ana", "Desktop");
        host.add_file("/home/ana/disabled_launchers/Desktop/App-7.desktop");
        let session = session_on(&host).await;

        let backup = LauncherBackup::new(BackupConfig::default());
        let report = backup
            .restore(&session, &cred(), "ana", &["Desktop/App-999.desktop".to_string()])
            .await
            .unwrap();

        assert_eq!(report.restored, 1);
        assert!(report.warnings.is_empty());
        assert!(host.files_in("/home/ana/Desktop").contains("App-7.desktop"));
    }

    #[tokio::test]
    async fn test_restore_miss_is_warning() {
        let host = host_with_account("ana", "Desktop");
        let session = session_on(&host).await;

        let backup = LauncherBackup::new(BackupConfig::default());
        let report = backup
            .restore(&session, &cred(), "ana", &["Desktop/Ghost.desktop".to_string()])
            .await
            .unwrap();
        assert_eq!(report.restored, 0);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_disable_works_inside_a_private_home() {
        let host = host_with_account("ana", "Desktop");
        host.set_owner("/home/ana", "ana");
        host.add_file("/home/ana/Desktop/Firefox.desktop");
        let session = session_on(&host).await;

        let backup = LauncherBackup::new(BackupConfig::default());
        let report = backup.disable(&session, &cred(), "ana").await.unwrap();

        assert_eq!(report.moved, 1);
        assert!(host
            .files_in("/home/ana/disabled_launchers/Desktop")
            .contains("Firefox.desktop"));
        let server = host
            .commands()
            .into_iter()
            .find(|c| c.command.contains("sftp-server"))
            .unwrap();
        assert!(server.command.contains("-u ana"));
        assert_eq!(server.stdin.as_deref(), Some(&b"pw\n"[..]));
    }

    #[tokio::test]
    async fn test_list_backups_for_account_reads_its_home() {
        let host = host_with_account("ana", "Desktop");
        host.set_owner("/home/ana", "ana");
        host.add_file("/home/ana/disabled_launchers/Desktop/Writer.desktop");
        host.add_file("/home/admin/disabled_launchers/Desktop/Other.desktop");
        let session = session_on(&host).await;

        let backup = LauncherBackup::new(BackupConfig::default());
        let listing = backup
            .list_backups(&session, &cred(), Some("ana"))
            .await
            .unwrap();
        assert_eq!(listing["Desktop"], vec!["Writer.desktop"]);

        let own = backup.list_backups(&session, &cred(), None).await.unwrap();
        assert_eq!(own["Desktop"], vec!["Other.desktop"]);
    }

    #[tokio::test]
    async fn test_list_backups_skips_empty_dirs() {
        let host = MockHost::new("/home/admin");
        host.add_file("/home/admin/disabled_launchers/Desktop/A.desktop");
        host.add_file("/home/admin/disabled_launchers/Desktop/readme.txt");
        host.add_dir("/home/admin/disabled_launchers/Escritorio");
        let session = session_on(&host).await;

        let backup = LauncherBackup::new(BackupConfig::default());
        let listing = backup.list_backups(&session, &cred(), None).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing["Desktop"], vec!["A.desktop"]);
    }
}
