//! Read queries and their results

use crate::permission::Permission;
use crate::types::{AccountId, AssetId, Block, DomainId, Hash, PublicKey, RoleName, Transaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a query asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryRequest {
    /// Account summary
    GetAccount {
        /// Target account
        account_id: AccountId,
    },

    /// Balances of an account
    GetAccountAssets {
        /// Target account
        account_id: AccountId,
    },

    /// Details of an account, optionally a single key
    GetAccountDetail {
        /// Target account
        account_id: AccountId,
        /// Restrict to one key
        key: Option<String>,
    },

    /// Signatories of an account
    GetSignatories {
        /// Target account
        account_id: AccountId,
    },

    /// Asset definition
    GetAssetInfo {
        /// Target asset
        asset_id: AssetId,
    },

    /// All role names
    GetRoles,

    /// Permissions of a role
    GetRolePermissions {
        /// Target role
        role_name: RoleName,
    },

    /// Committed transactions by hash
    GetTransactions {
        /// Hashes to look up
        hashes: Vec<Hash>,
    },

    /// Committed block by height
    GetBlock {
        /// Block height
        height: u64,
    },
}

/// Successful query answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// Account summary
    Account {
        /// Account id
        account_id: AccountId,
        /// Domain
        domain_id: DomainId,
        /// Signature quorum
        quorum: u32,
        /// Roles held
        roles: Vec<RoleName>,
    },

    /// Balances by asset
    AccountAssets(Vec<(AssetId, Decimal)>),

    /// Key/value details
    AccountDetail(BTreeMap<String, String>),

    /// Signatory keys
    Signatories(Vec<PublicKey>),

    /// Asset definition
    AssetInfo {
        /// Asset id
        asset_id: AssetId,
        /// Domain
        domain_id: DomainId,
        /// Fractional digits
        precision: u8,
    },

    /// Role names
    Roles(Vec<RoleName>),

    /// Role permissions
    RolePermissions(Vec<Permission>),

    /// Transactions, in request order
    Transactions(Vec<Transaction>),

    /// A committed block
    Block(Box<Block>),
}
