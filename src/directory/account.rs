//! Tenant account lookups.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::rpc::{RpcClient, Transport};
use crate::types::{Account, AccountId};

use super::DirectoryError;

/// Controller error names meaning "no such account".
const ACCOUNT_ABSENT: &[&str] = &["xUnknownAccount"];

#[derive(Serialize)]
struct UsernameParams<'a> {
    username: &'a str,
}

#[derive(Serialize)]
struct AccountIdParams {
    #[serde(rename = "accountID")]
    account_id: AccountId,
}

#[derive(Deserialize)]
struct AccountResult {
    account: Account,
}

#[derive(Deserialize)]
struct AddAccountResult {
    #[serde(rename = "accountID")]
    account_id: AccountId,
}

/// Resolves and creates tenant accounts and their CHAP credentials.
#[derive(Clone, Debug)]
pub struct AccountDirectory<T> {
    rpc: RpcClient<T>,
}

impl<T: Transport> AccountDirectory<T> {
    /// Creates a directory issuing calls through `rpc`.
    #[must_use]
    pub const fn new(rpc: RpcClient<T>) -> Self {
        Self { rpc }
    }

    /// Looks an account up by username.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::AccountNotFound`] when the controller has no
    /// such account, or [`DirectoryError::Rpc`] for any other failure.
    pub async fn get_by_name(&self, username: &str) -> Result<Account, DirectoryError> {
        let result: Result<AccountResult, _> = self
            .rpc
            .call("GetAccountByName", &UsernameParams { username })
            .await;
        match result {
            Ok(found) => Ok(found.account),
            Err(err) if err.is_api_error_named(ACCOUNT_ABSENT) => {
                Err(DirectoryError::AccountNotFound {
                    username: username.to_owned(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetches an account, including its CHAP secrets, by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Rpc`] when the call fails.
    pub async fn get_by_id(&self, account_id: AccountId) -> Result<Account, DirectoryError> {
        let result: AccountResult = self
            .rpc
            .call("GetAccountByID", &AccountIdParams { account_id })
            .await?;
        Ok(result.account)
    }

    /// Creates an account and returns its controller-assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Rpc`] when the call fails.
    pub async fn add(&self, username: &str) -> Result<AccountId, DirectoryError> {
        let result: AddAccountResult = self
            .rpc
            .call("AddAccount", &UsernameParams { username })
            .await?;
        info!(username, account_id = %result.account_id, "created tenant account");
        Ok(result.account_id)
    }

    /// Returns the tenant account, creating it when the controller reports it
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Validation`] for an empty tenant name, and
    /// propagates any lookup failure other than "not found" unchanged.
    pub async fn get_or_create(&self, tenant: &str) -> Result<Account, DirectoryError> {
        let username = tenant.trim();
        if username.is_empty() {
            return Err(DirectoryError::Validation(String::from("tenant_name")));
        }

        match self.get_by_name(username).await {
            Ok(account) => {
                debug!(username, account_id = %account.account_id, "using existing tenant account");
                Ok(account)
            }
            Err(DirectoryError::AccountNotFound { .. }) => {
                let account_id = self.add(username).await?;
                self.get_by_id(account_id).await
            }
            Err(err) => Err(err),
        }
    }
}
