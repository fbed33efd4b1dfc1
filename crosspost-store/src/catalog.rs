use crosspost_common::model::{
    account::{Account, AccountId, Platform},
    post::PostType,
};
use std::{collections::HashSet, io, path::Path};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Reading the account catalog failed: {0}")]
    Io(#[from] io::Error),
    #[error("The account catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Account id {0} appears more than once in the catalog")]
    DuplicateAccount(AccountId),
}

/// The connected accounts, in the order the account provider listed them.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct AccountCatalog {
    accounts: Vec<Account>,
}

impl AccountCatalog {
    pub fn new(accounts: Vec<Account>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(accounts.len());
        if let Some(duplicate) = accounts.iter().find(|account| !seen.insert(&account.id)) {
            return Err(CatalogError::DuplicateAccount(duplicate.id.clone()));
        }

        Ok(Self { accounts })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let catalog = Self::from_json(&std::fs::read_to_string(path)?)?;

        debug!(path = %path.display(), accounts = catalog.accounts.len(), "Loaded account catalog");
        Ok(catalog)
    }

    /// A small set of connected accounts for local development.
    #[must_use]
    pub fn demo() -> Self {
        let account = |id: &str, name: &str, platform| Account {
            id: AccountId::new(id).expect("demo account ids are valid"),
            name: name.to_owned(),
            platform,
            avatar: None,
        };

        Self {
            accounts: vec![
                account("1", "John Doe", Platform::Facebook),
                account("2", "John Professional", Platform::Linkedin),
                account("3", "@johndoe", Platform::Twitter),
                account("4", "@johnthreads", Platform::Threads),
                account("5", "John Creator", Platform::Tiktok),
            ],
        }
    }

    #[must_use]
    pub fn list_accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Accounts whose platform supports `post_type`, in catalog order.
    #[must_use]
    pub fn accounts_for(&self, post_type: PostType) -> Vec<&Account> {
        self.accounts
            .iter()
            .filter(|account| post_type.supports(account.platform))
            .collect()
    }

    #[must_use]
    pub fn get(&self, account_id: &AccountId) -> Option<&Account> {
        self.accounts.iter().find(|account| account.id == *account_id)
    }

    #[must_use]
    pub fn is_compatible(&self, account_id: &AccountId, post_type: PostType) -> bool {
        self.get(account_id)
            .is_some_and(|account| post_type.supports(account.platform))
    }
}
