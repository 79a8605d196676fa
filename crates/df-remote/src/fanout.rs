//! Per-account fan-out
//!
//! Applies one operation to every interactive local account of a host.
//! Each account's outcome is independent; a failure never aborts the
//! others.

use std::collections::BTreeMap;
use std::future::Future;

use futures::future::join_all;
use serde::Serialize;

use df_core::error::ExecError;
use df_core::{Credential, FleetError};

use crate::exec::execute;
use crate::session::RemoteSession;

/// Accounts with a home under /home and a login shell
pub const LIST_ACCOUNTS_SCRIPT: &str =
    r"getent passwd | awk -F: '$6 ~ /^\/home\// && $7 !~ /(nologin|false)$/ {print $1}'";

/// Enumerate the interactive local accounts of the session's host
pub async fn list_accounts(
    session: &RemoteSession,
    credential: &Credential,
) -> Result<Vec<String>, ExecError> {
    let result = execute(session, LIST_ACCOUNTS_SCRIPT, credential, None).await?;
    Ok(result
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Outcome of one operation applied to every account
#[derive(Debug)]
pub struct FanOutResult<T> {
    pub entries: BTreeMap<String, Result<T, FleetError>>,
}

impl<T> FanOutResult<T> {
    /// True iff every entry succeeded
    pub fn all_succeeded(&self) -> bool {
        self.entries.values().all(Result::is_ok)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&String, &T)> {
        self.entries
            .iter()
            .filter_map(|(account, r)| r.as_ref().ok().map(|v| (account, v)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&String, &FleetError)> {
        self.entries
            .iter()
            .filter_map(|(account, r)| r.as_ref().err().map(|e| (account, e)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializable per-account view
    pub fn report(&self) -> FanOutReport<'_, T> {
        FanOutReport {
            all_succeeded: self.all_succeeded(),
            accounts: self
                .entries
                .iter()
                .map(|(account, r)| {
                    let entry = match r {
                        Ok(value) => AccountReport {
                            success: true,
                            result: Some(value),
                            error: None,
                            status: 200,
                        },
                        Err(e) => AccountReport {
                            success: false,
                            result: None,
                            error: Some(e.to_string()),
                            status: e.status_code(),
                        },
                    };
                    (account.as_str(), entry)
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport<'a, T> {
    pub all_succeeded: bool,
    pub accounts: BTreeMap<&'a str, AccountReport<'a, T>>,
}

#[derive(Debug, Serialize)]
pub struct AccountReport<'a, T> {
    pub success: bool,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run `op` once per account, concurrently, and aggregate the outcomes
///
/// A host with no interactive accounts is an error, not an empty success.
///
/// Commands issued by the per-account futures still take turns on the
/// session, in the order they were issued.
pub async fn fan_out_per_account<T, F, Fut>(
    session: &RemoteSession,
    credential: &Credential,
    op: F,
) -> Result<FanOutResult<T>, ExecError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, FleetError>>,
{
    let accounts = list_accounts(session, credential).await?;
    if accounts.is_empty() {
        return Err(ExecError::NoAccounts(session.host().to_string()));
    }

    let outcomes = join_all(accounts.iter().cloned().map(&op)).await;

    let result = FanOutResult {
        entries: accounts.into_iter().zip(outcomes).collect(),
    };
    for (account, err) in result.failed() {
        tracing::warn!("Account {} on {} failed: {}", account, session.host(), err);
    }
    Ok(result)
}
