//! World state: domains, accounts, assets and roles
//!
//! `WorldState` is a plain value. Stateful validation works on a clone (the
//! working copy) and the ledger swaps in a new `Arc<WorldState>` on commit, so
//! readers always hold a complete snapshot. Within the working copy a
//! transaction saves only the entries its commands can touch and restores
//! them if a command fails.
//!
//! # Invariants
//!
//! - Every account's quorum is between 1 and its signatory count
//! - Balances are never negative
//! - Transfers conserve the total supply of an asset
//! - A transaction applies all of its commands or none of them

use crate::command::Command;
use crate::error::StatefulError;
use crate::permission::Permission;
use crate::types::{AccountId, AssetId, DomainId, PublicKey, RoleName, Transaction};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Domain record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    /// Domain id
    pub id: DomainId,

    /// Role given to accounts created in this domain
    pub default_role: RoleName,
}

/// Asset definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDefinition {
    /// Asset id
    pub id: AssetId,

    /// Owning domain
    pub domain_id: DomainId,

    /// Allowed fractional digits
    pub precision: u8,
}

/// Account record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Account id
    pub id: AccountId,

    /// Owning domain
    pub domain_id: DomainId,

    /// Signatures required on this account's transactions
    pub quorum: u32,

    /// Keys allowed to sign for this account
    pub signatories: BTreeSet<PublicKey>,

    /// Roles held
    pub roles: BTreeSet<RoleName>,

    /// Balances by asset
    pub balances: BTreeMap<AssetId, Decimal>,

    /// Key/value details
    pub details: BTreeMap<String, String>,
}

/// How strictly commands are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Signatories and permissions enforced
    Checked,
    /// Genesis bootstrap: no permission or signatory checks
    Genesis,
}

/// Transaction could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFailure {
    /// Failing command, `None` for transaction-level checks
    pub command_index: Option<usize>,

    /// Violation
    pub reason: StatefulError,
}

/// Entries a transaction may change, as they were before it ran
#[derive(Debug, Default)]
struct Journal {
    domains: Vec<(DomainId, Option<Domain>)>,
    accounts: Vec<(AccountId, Option<Account>)>,
    assets: Vec<(AssetId, Option<AssetDefinition>)>,
    roles: Vec<(RoleName, Option<BTreeSet<Permission>>)>,
}

impl Journal {
    fn save_account(&mut self, state: &WorldState, id: &AccountId) {
        if !self.accounts.iter().any(|(saved, _)| saved == id) {
            self.accounts.push((id.clone(), state.accounts.get(id).cloned()));
        }
    }

    fn save(&mut self, state: &WorldState, creator: &AccountId, command: &Command) {
        match command {
            Command::CreateRole { role_name, .. } => {
                if !self.roles.iter().any(|(saved, _)| saved == role_name) {
                    self.roles
                        .push((role_name.clone(), state.roles.get(role_name).cloned()));
                }
            }
            Command::CreateDomain { domain_id, .. } => {
                if !self.domains.iter().any(|(saved, _)| saved == domain_id) {
                    self.domains
                        .push((domain_id.clone(), state.domains.get(domain_id).cloned()));
                }
            }
            Command::CreateAsset {
                asset_name,
                domain_id,
                ..
            } => {
                let asset_id = AssetId::from_parts(asset_name, domain_id);
                if !self.assets.iter().any(|(saved, _)| *saved == asset_id) {
                    let prior = state.assets.get(&asset_id).cloned();
                    self.assets.push((asset_id, prior));
                }
            }
            Command::CreateAccount {
                account_name,
                domain_id,
                ..
            } => {
                self.save_account(state, &AccountId::from_parts(account_name, domain_id));
            }
            Command::AddAssetQuantity { .. } | Command::SubtractAssetQuantity { .. } => {
                self.save_account(state, creator);
            }
            Command::TransferAsset {
                src_account_id,
                dest_account_id,
                ..
            } => {
                self.save_account(state, src_account_id);
                self.save_account(state, dest_account_id);
            }
            Command::AppendRole { account_id, .. }
            | Command::AddSignatory { account_id, .. }
            | Command::RemoveSignatory { account_id, .. }
            | Command::SetQuorum { account_id, .. }
            | Command::SetAccountDetail { account_id, .. } => {
                self.save_account(state, account_id);
            }
        }
    }

    fn restore(self, state: &mut WorldState) {
        fn put<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, prior: Option<V>) {
            match prior {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }

        for (id, prior) in self.domains {
            put(&mut state.domains, id, prior);
        }
        for (id, prior) in self.accounts {
            put(&mut state.accounts, id, prior);
        }
        for (id, prior) in self.assets {
            put(&mut state.assets, id, prior);
        }
        for (name, prior) in self.roles {
            put(&mut state.roles, name, prior);
        }
    }
}

/// Ledger state at some height
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldState {
    height: u64,
    domains: BTreeMap<DomainId, Domain>,
    accounts: BTreeMap<AccountId, Account>,
    assets: BTreeMap<AssetId, AssetDefinition>,
    roles: BTreeMap<RoleName, BTreeSet<Permission>>,
}

impl WorldState {
    /// Empty state before genesis
    pub fn new() -> Self {
        Self::default()
    }

    /// Height of the last block applied to this state
    pub fn height(&self) -> u64 {
        self.height
    }

    pub(crate) fn set_height(&mut self, height: u64) {
        self.height = height;
    }

    /// Look up an account
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Look up a domain
    pub fn domain(&self, id: &DomainId) -> Option<&Domain> {
        self.domains.get(id)
    }

    /// Look up an asset definition
    pub fn asset(&self, id: &AssetId) -> Option<&AssetDefinition> {
        self.assets.get(id)
    }

    /// Permissions of a role
    pub fn role_permissions(&self, role: &RoleName) -> Option<&BTreeSet<Permission>> {
        self.roles.get(role)
    }

    /// All role names
    pub fn roles(&self) -> impl Iterator<Item = &RoleName> {
        self.roles.keys()
    }

    /// Number of accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Union of the permissions of an account's roles
    pub fn permissions_of(&self, account: &AccountId) -> BTreeSet<Permission> {
        self.accounts
            .get(account)
            .map(|acc| {
                acc.roles
                    .iter()
                    .filter_map(|role| self.roles.get(role))
                    .flatten()
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any of the account's roles grants `permission`
    pub fn has_permission(&self, account: &AccountId, permission: Permission) -> bool {
        self.accounts
            .get(account)
            .map(|acc| {
                acc.roles.iter().any(|role| {
                    self.roles
                        .get(role)
                        .map_or(false, |perms| perms.contains(&permission))
                })
            })
            .unwrap_or(false)
    }

    /// Balance of `asset` held by `account` (zero if none)
    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> Decimal {
        self.accounts
            .get(account)
            .and_then(|acc| acc.balances.get(asset))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Sum of all balances of `asset`
    pub fn total_supply(&self, asset: &AssetId) -> Decimal {
        self.accounts
            .values()
            .filter_map(|acc| acc.balances.get(asset))
            .copied()
            .sum()
    }

    /// Transaction-level check: every signer is a signatory of the creator
    /// and enough of them signed to meet the creator's quorum
    pub fn check_signatories(&self, tx: &Transaction) -> Result<(), StatefulError> {
        let creator = tx.creator();
        let account = self
            .accounts
            .get(creator)
            .ok_or_else(|| StatefulError::NoAccount(creator.clone()))?;

        let mut signed = 0usize;
        for signer in tx.signers() {
            if !account.signatories.contains(signer) {
                return Err(StatefulError::NotSignatory {
                    account: creator.clone(),
                    public_key: *signer,
                });
            }
            signed += 1;
        }

        if signed < account.quorum as usize {
            return Err(StatefulError::InsufficientSignatures {
                quorum: account.quorum,
                signed,
            });
        }

        Ok(())
    }

    /// Apply a whole transaction atomically
    ///
    /// On failure `self` is unchanged.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        mode: ExecutionMode,
    ) -> Result<(), TransactionFailure> {
        if mode == ExecutionMode::Checked {
            self.check_signatories(tx).map_err(|reason| TransactionFailure {
                command_index: None,
                reason,
            })?;
        }

        let mut journal = Journal::default();
        for command in tx.commands() {
            journal.save(self, tx.creator(), command);
        }

        for (index, command) in tx.commands().iter().enumerate() {
            if let Err(reason) = self.execute(tx.creator(), command, mode) {
                journal.restore(self);
                return Err(TransactionFailure {
                    command_index: Some(index),
                    reason,
                });
            }
        }

        Ok(())
    }

    fn require(
        &self,
        creator: &AccountId,
        permission: Permission,
        mode: ExecutionMode,
    ) -> Result<(), StatefulError> {
        if mode == ExecutionMode::Genesis || self.has_permission(creator, permission) {
            Ok(())
        } else {
            Err(StatefulError::PermissionDenied {
                account: creator.clone(),
                permission,
            })
        }
    }

    /// Creator may only hand out permissions it holds itself
    fn require_all(
        &self,
        creator: &AccountId,
        permissions: &BTreeSet<Permission>,
        mode: ExecutionMode,
    ) -> Result<(), StatefulError> {
        if mode == ExecutionMode::Genesis {
            return Ok(());
        }
        let held = self.permissions_of(creator);
        match permissions.iter().find(|p| !held.contains(p)) {
            Some(missing) => Err(StatefulError::PermissionDenied {
                account: creator.clone(),
                permission: *missing,
            }),
            None => Ok(()),
        }
    }

    fn account_mut(&mut self, id: &AccountId) -> Result<&mut Account, StatefulError> {
        self.accounts
            .get_mut(id)
            .ok_or_else(|| StatefulError::NoAccount(id.clone()))
    }

    fn checked_asset(&self, id: &AssetId, amount: Decimal) -> Result<(), StatefulError> {
        let asset = self
            .assets
            .get(id)
            .ok_or_else(|| StatefulError::NoAsset(id.clone()))?;
        if amount.scale() > u32::from(asset.precision) {
            return Err(StatefulError::PrecisionMismatch {
                asset: id.clone(),
                precision: asset.precision,
                amount,
            });
        }
        Ok(())
    }

    /// Execute one command on behalf of `creator`
    ///
    /// A failing command may leave partial effects; go through
    /// [`WorldState::apply_transaction`] for atomicity.
    pub fn execute(
        &mut self,
        creator: &AccountId,
        command: &Command,
        mode: ExecutionMode,
    ) -> Result<(), StatefulError> {
        match command {
            Command::CreateRole {
                role_name,
                permissions,
            } => {
                self.require(creator, Permission::CreateRole, mode)?;
                if self.roles.contains_key(role_name) {
                    return Err(StatefulError::RoleExists(role_name.clone()));
                }
                self.require_all(creator, permissions, mode)?;
                self.roles.insert(role_name.clone(), permissions.clone());
            }

            Command::AppendRole {
                account_id,
                role_name,
            } => {
                self.require(creator, Permission::AppendRole, mode)?;
                let permissions = self
                    .roles
                    .get(role_name)
                    .cloned()
                    .ok_or_else(|| StatefulError::NoRole(role_name.clone()))?;
                self.require_all(creator, &permissions, mode)?;
                let account = self.account_mut(account_id)?;
                if !account.roles.insert(role_name.clone()) {
                    return Err(StatefulError::RoleAlreadyAppended {
                        account: account_id.clone(),
                        role: role_name.clone(),
                    });
                }
            }

            Command::CreateDomain {
                domain_id,
                default_role,
            } => {
                self.require(creator, Permission::CreateDomain, mode)?;
                if self.domains.contains_key(domain_id) {
                    return Err(StatefulError::DomainExists(domain_id.clone()));
                }
                if !self.roles.contains_key(default_role) {
                    return Err(StatefulError::NoRole(default_role.clone()));
                }
                self.domains.insert(
                    domain_id.clone(),
                    Domain {
                        id: domain_id.clone(),
                        default_role: default_role.clone(),
                    },
                );
            }

            Command::CreateAccount {
                account_name,
                domain_id,
                public_key,
            } => {
                self.require(creator, Permission::CreateAccount, mode)?;
                let domain = self
                    .domains
                    .get(domain_id)
                    .ok_or_else(|| StatefulError::NoDomain(domain_id.clone()))?;
                let account_id = AccountId::from_parts(account_name, domain_id);
                if self.accounts.contains_key(&account_id) {
                    return Err(StatefulError::AccountExists(account_id));
                }
                let account = Account {
                    id: account_id.clone(),
                    domain_id: domain_id.clone(),
                    quorum: 1,
                    signatories: BTreeSet::from([*public_key]),
                    roles: BTreeSet::from([domain.default_role.clone()]),
                    balances: BTreeMap::new(),
                    details: BTreeMap::new(),
                };
                self.accounts.insert(account_id, account);
            }

            Command::CreateAsset {
                asset_name,
                domain_id,
                precision,
            } => {
                self.require(creator, Permission::CreateAsset, mode)?;
                if !self.domains.contains_key(domain_id) {
                    return Err(StatefulError::NoDomain(domain_id.clone()));
                }
                let asset_id = AssetId::from_parts(asset_name, domain_id);
                if self.assets.contains_key(&asset_id) {
                    return Err(StatefulError::AssetExists(asset_id));
                }
                self.assets.insert(
                    asset_id.clone(),
                    AssetDefinition {
                        id: asset_id,
                        domain_id: domain_id.clone(),
                        precision: *precision,
                    },
                );
            }

            Command::AddAssetQuantity { asset_id, amount } => {
                self.require(creator, Permission::AddAssetQty, mode)?;
                self.checked_asset(asset_id, *amount)?;
                let account = self.account_mut(creator)?;
                let balance = account.balances.entry(asset_id.clone()).or_default();
                *balance = balance
                    .checked_add(*amount)
                    .ok_or_else(|| StatefulError::BalanceOverflow(asset_id.clone()))?;
            }

            Command::SubtractAssetQuantity { asset_id, amount } => {
                self.require(creator, Permission::SubtractAssetQty, mode)?;
                self.checked_asset(asset_id, *amount)?;
                let account = self.account_mut(creator)?;
                let balance = account.balances.entry(asset_id.clone()).or_default();
                if *balance < *amount {
                    return Err(StatefulError::InsufficientBalance {
                        asset: asset_id.clone(),
                        available: *balance,
                        requested: *amount,
                    });
                }
                *balance -= *amount;
            }

            Command::TransferAsset {
                src_account_id,
                dest_account_id,
                asset_id,
                amount,
                ..
            } => {
                self.require(creator, Permission::Transfer, mode)?;
                if mode == ExecutionMode::Checked && src_account_id != creator {
                    return Err(StatefulError::PermissionDenied {
                        account: creator.clone(),
                        permission: Permission::Transfer,
                    });
                }
                if !self.accounts.contains_key(src_account_id) {
                    return Err(StatefulError::NoAccount(src_account_id.clone()));
                }
                if !self.accounts.contains_key(dest_account_id) {
                    return Err(StatefulError::NoAccount(dest_account_id.clone()));
                }
                self.require(dest_account_id, Permission::Receive, mode)?;
                self.checked_asset(asset_id, *amount)?;

                let available = self.balance(src_account_id, asset_id);
                if available < *amount {
                    return Err(StatefulError::InsufficientBalance {
                        asset: asset_id.clone(),
                        available,
                        requested: *amount,
                    });
                }
                // Debit before reading the credit side so self-transfers net to zero
                self.account_mut(src_account_id)?
                    .balances
                    .insert(asset_id.clone(), available - *amount);
                let credited = self
                    .balance(dest_account_id, asset_id)
                    .checked_add(*amount)
                    .ok_or_else(|| StatefulError::BalanceOverflow(asset_id.clone()))?;
                self.account_mut(dest_account_id)?
                    .balances
                    .insert(asset_id.clone(), credited);
            }

            Command::AddSignatory {
                account_id,
                public_key,
            } => {
                self.require(creator, Permission::AddSignatory, mode)?;
                let account = self.account_mut(account_id)?;
                if !account.signatories.insert(*public_key) {
                    return Err(StatefulError::SignatoryExists {
                        account: account_id.clone(),
                        public_key: *public_key,
                    });
                }
            }

            Command::RemoveSignatory {
                account_id,
                public_key,
            } => {
                self.require(creator, Permission::RemoveSignatory, mode)?;
                let account = self.account_mut(account_id)?;
                if !account.signatories.contains(public_key) {
                    return Err(StatefulError::NoSignatory {
                        account: account_id.clone(),
                        public_key: *public_key,
                    });
                }
                let remaining = account.signatories.len() - 1;
                if remaining < account.quorum as usize {
                    return Err(StatefulError::QuorumViolation {
                        quorum: account.quorum,
                        signatories: remaining,
                    });
                }
                account.signatories.remove(public_key);
            }

            Command::SetQuorum { account_id, quorum } => {
                self.require(creator, Permission::SetQuorum, mode)?;
                let account = self.account_mut(account_id)?;
                if *quorum == 0 || *quorum as usize > account.signatories.len() {
                    return Err(StatefulError::QuorumViolation {
                        quorum: *quorum,
                        signatories: account.signatories.len(),
                    });
                }
                account.quorum = *quorum;
            }

            Command::SetAccountDetail {
                account_id,
                key,
                value,
            } => {
                if account_id != creator {
                    self.require(creator, Permission::SetDetail, mode)?;
                }
                let account = self.account_mut(account_id)?;
                account.details.insert(key.clone(), value.clone());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::Transaction;

    fn admin() -> AccountId {
        AccountId::new("admin@test")
    }

    /// State with an admin holding every permission and a plain user
    fn bootstrap(admin_key: &KeyPair, user_key: &KeyPair) -> WorldState {
        let mut state = WorldState::new();
        let commands = vec![
            Command::CreateRole {
                role_name: RoleName::new("admin"),
                permissions: Permission::all(),
            },
            Command::CreateRole {
                role_name: RoleName::new("user"),
                permissions: Permission::user_defaults(),
            },
            Command::CreateDomain {
                domain_id: DomainId::new("test"),
                default_role: RoleName::new("user"),
            },
            Command::CreateAccount {
                account_name: "admin".to_string(),
                domain_id: DomainId::new("test"),
                public_key: admin_key.public_key(),
            },
            Command::AppendRole {
                account_id: admin(),
                role_name: RoleName::new("admin"),
            },
            Command::CreateAccount {
                account_name: "alice".to_string(),
                domain_id: DomainId::new("test"),
                public_key: user_key.public_key(),
            },
            Command::CreateAsset {
                asset_name: "coin".to_string(),
                domain_id: DomainId::new("test"),
                precision: 2,
            },
        ];
        for command in &commands {
            state
                .execute(&admin(), command, ExecutionMode::Genesis)
                .unwrap();
        }
        state
    }

    fn coin() -> AssetId {
        AssetId::new("coin#test")
    }

    fn tx(keypair: &KeyPair, creator: AccountId, commands: Vec<Command>) -> Transaction {
        let mut builder = Transaction::builder(creator);
        for command in commands {
            builder = builder.command(command);
        }
        builder.sign(keypair)
    }

    #[test]
    fn test_create_domain_requires_existing_role() {
        let admin_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &KeyPair::generate());

        let result = state.execute(
            &admin(),
            &Command::CreateDomain {
                domain_id: DomainId::new("other"),
                default_role: RoleName::new("missing"),
            },
            ExecutionMode::Checked,
        );

        assert_eq!(result, Err(StatefulError::NoRole(RoleName::new("missing"))));
        assert!(state.domain(&DomainId::new("other")).is_none());
    }

    #[test]
    fn test_duplicate_domain_rejected() {
        let admin_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &KeyPair::generate());

        let result = state.execute(
            &admin(),
            &Command::CreateDomain {
                domain_id: DomainId::new("test"),
                default_role: RoleName::new("user"),
            },
            ExecutionMode::Checked,
        );
        assert_eq!(result, Err(StatefulError::DomainExists(DomainId::new("test"))));
    }

    #[test]
    fn test_user_cannot_create_domain() {
        let user_key = KeyPair::generate();
        let mut state = bootstrap(&KeyPair::generate(), &user_key);
        let alice = AccountId::new("alice@test");

        let result = state.execute(
            &alice,
            &Command::CreateDomain {
                domain_id: DomainId::new("mine"),
                default_role: RoleName::new("user"),
            },
            ExecutionMode::Checked,
        );

        assert!(matches!(
            result,
            Err(StatefulError::PermissionDenied {
                permission: Permission::CreateDomain,
                ..
            })
        ));
    }

    #[test]
    fn test_transfer_moves_balance() {
        let admin_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &KeyPair::generate());
        let alice = AccountId::new("alice@test");

        let issue_and_send = tx(
            &admin_key,
            admin(),
            vec![
                Command::AddAssetQuantity {
                    asset_id: coin(),
                    amount: Decimal::new(10000, 2),
                },
                Command::TransferAsset {
                    src_account_id: admin(),
                    dest_account_id: alice.clone(),
                    asset_id: coin(),
                    description: "salary".to_string(),
                    amount: Decimal::new(2550, 2),
                },
            ],
        );
        state
            .apply_transaction(&issue_and_send, ExecutionMode::Checked)
            .unwrap();

        assert_eq!(state.balance(&admin(), &coin()), Decimal::new(7450, 2));
        assert_eq!(state.balance(&alice, &coin()), Decimal::new(2550, 2));
        assert_eq!(state.total_supply(&coin()), Decimal::new(10000, 2));
    }

    #[test]
    fn test_failed_command_rolls_back_whole_transaction() {
        let admin_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &KeyPair::generate());
        let before = state.clone();

        let tx = tx(
            &admin_key,
            admin(),
            vec![
                Command::AddAssetQuantity {
                    asset_id: coin(),
                    amount: Decimal::new(100, 2),
                },
                Command::SubtractAssetQuantity {
                    asset_id: coin(),
                    amount: Decimal::new(500, 2),
                },
            ],
        );

        let failure = state
            .apply_transaction(&tx, ExecutionMode::Checked)
            .unwrap_err();
        assert_eq!(failure.command_index, Some(1));
        assert_eq!(failure.reason.code(), "INSUFFICIENT_BALANCE");
        assert_eq!(state, before);
    }

    #[test]
    fn test_rollback_restores_every_touched_entry() {
        let admin_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &KeyPair::generate());
        let alice = AccountId::new("alice@test");
        state
            .execute(
                &admin(),
                &Command::AddAssetQuantity {
                    asset_id: coin(),
                    amount: Decimal::new(1000, 2),
                },
                ExecutionMode::Checked,
            )
            .unwrap();
        let before = state.clone();

        // Creates entries in every map, moves funds, then fails
        let tx = tx(
            &admin_key,
            admin(),
            vec![
                Command::CreateRole {
                    role_name: RoleName::new("auditor"),
                    permissions: BTreeSet::from([Permission::GetAllAccounts]),
                },
                Command::CreateDomain {
                    domain_id: DomainId::new("audit"),
                    default_role: RoleName::new("auditor"),
                },
                Command::CreateAsset {
                    asset_name: "token".to_string(),
                    domain_id: DomainId::new("audit"),
                    precision: 0,
                },
                Command::CreateAccount {
                    account_name: "carol".to_string(),
                    domain_id: DomainId::new("audit"),
                    public_key: KeyPair::generate().public_key(),
                },
                Command::TransferAsset {
                    src_account_id: admin(),
                    dest_account_id: alice.clone(),
                    asset_id: coin(),
                    description: String::new(),
                    amount: Decimal::new(400, 2),
                },
                Command::SetAccountDetail {
                    account_id: alice.clone(),
                    key: "note".to_string(),
                    value: "paid".to_string(),
                },
                Command::SubtractAssetQuantity {
                    asset_id: coin(),
                    amount: Decimal::new(9900, 2),
                },
            ],
        );

        let failure = state
            .apply_transaction(&tx, ExecutionMode::Checked)
            .unwrap_err();
        assert_eq!(failure.command_index, Some(6));
        assert_eq!(state, before);
        assert!(state.role_permissions(&RoleName::new("auditor")).is_none());
        assert!(state.account(&AccountId::new("carol@audit")).is_none());
        assert_eq!(state.balance(&alice, &coin()), Decimal::ZERO);
    }

    #[test]
    fn test_precision_enforced() {
        let admin_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &KeyPair::generate());

        let result = state.execute(
            &admin(),
            &Command::AddAssetQuantity {
                asset_id: coin(),
                amount: Decimal::new(1001, 3),
            },
            ExecutionMode::Checked,
        );
        assert!(matches!(result, Err(StatefulError::PrecisionMismatch { .. })));
    }

    #[test]
    fn test_foreign_signer_rejected() {
        let admin_key = KeyPair::generate();
        let state = bootstrap(&admin_key, &KeyPair::generate());
        let stranger = KeyPair::generate();

        let tx = tx(
            &stranger,
            admin(),
            vec![Command::CreateDomain {
                domain_id: DomainId::new("other"),
                default_role: RoleName::new("user"),
            }],
        );

        assert!(matches!(
            state.check_signatories(&tx),
            Err(StatefulError::NotSignatory { .. })
        ));
    }

    #[test]
    fn test_quorum_enforced_against_account() {
        let admin_key = KeyPair::generate();
        let second_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &KeyPair::generate());

        state
            .execute(
                &admin(),
                &Command::AddSignatory {
                    account_id: admin(),
                    public_key: second_key.public_key(),
                },
                ExecutionMode::Checked,
            )
            .unwrap();
        state
            .execute(
                &admin(),
                &Command::SetQuorum {
                    account_id: admin(),
                    quorum: 2,
                },
                ExecutionMode::Checked,
            )
            .unwrap();

        let single = tx(
            &admin_key,
            admin(),
            vec![Command::SetAccountDetail {
                account_id: admin(),
                key: "k".to_string(),
                value: "v".to_string(),
            }],
        );
        assert_eq!(
            state.check_signatories(&single),
            Err(StatefulError::InsufficientSignatures {
                quorum: 2,
                signed: 1
            })
        );

        let both = single.sign(&second_key);
        assert!(state.check_signatories(&both).is_ok());
    }

    #[test]
    fn test_remove_signatory_keeps_quorum_reachable() {
        let admin_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &KeyPair::generate());

        let result = state.execute(
            &admin(),
            &Command::RemoveSignatory {
                account_id: admin(),
                public_key: admin_key.public_key(),
            },
            ExecutionMode::Checked,
        );
        assert!(matches!(result, Err(StatefulError::QuorumViolation { .. })));
    }

    #[test]
    fn test_create_role_cannot_escalate() {
        let user_key = KeyPair::generate();
        let admin_key = KeyPair::generate();
        let mut state = bootstrap(&admin_key, &user_key);
        let alice = AccountId::new("alice@test");

        // Give alice CreateRole only
        state
            .execute(
                &admin(),
                &Command::CreateRole {
                    role_name: RoleName::new("role_maker"),
                    permissions: BTreeSet::from([Permission::CreateRole]),
                },
                ExecutionMode::Checked,
            )
            .unwrap();
        state
            .execute(
                &admin(),
                &Command::AppendRole {
                    account_id: alice.clone(),
                    role_name: RoleName::new("role_maker"),
                },
                ExecutionMode::Checked,
            )
            .unwrap();

        let result = state.execute(
            &alice,
            &Command::CreateRole {
                role_name: RoleName::new("superuser"),
                permissions: BTreeSet::from([Permission::CreateDomain]),
            },
            ExecutionMode::Checked,
        );
        assert!(matches!(
            result,
            Err(StatefulError::PermissionDenied {
                permission: Permission::CreateDomain,
                ..
            })
        ));
    }

    #[test]
    fn test_own_detail_needs_no_permission() {
        let user_key = KeyPair::generate();
        let mut state = bootstrap(&KeyPair::generate(), &user_key);
        let alice = AccountId::new("alice@test");

        state
            .execute(
                &alice,
                &Command::SetAccountDetail {
                    account_id: alice.clone(),
                    key: "email".to_string(),
                    value: "alice@example.org".to_string(),
                },
                ExecutionMode::Checked,
            )
            .unwrap();

        let result = state.execute(
            &alice,
            &Command::SetAccountDetail {
                account_id: admin(),
                key: "email".to_string(),
                value: "x".to_string(),
            },
            ExecutionMode::Checked,
        );
        assert!(matches!(result, Err(StatefulError::PermissionDenied { .. })));
    }
}
