//! Role permissions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Permission granted to accounts through roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Permission {
    /// Create roles
    CreateRole = 1,
    /// Append roles to accounts
    AppendRole = 2,
    /// Create domains
    CreateDomain = 3,
    /// Create accounts
    CreateAccount = 4,
    /// Create asset definitions
    CreateAsset = 5,
    /// Issue asset quantity to own account
    AddAssetQty = 6,
    /// Burn asset quantity from own account
    SubtractAssetQty = 7,
    /// Transfer assets from own account
    Transfer = 8,
    /// Receive transfers
    Receive = 9,
    /// Add signatories
    AddSignatory = 10,
    /// Remove signatories
    RemoveSignatory = 11,
    /// Change account quorum
    SetQuorum = 12,
    /// Write details of other accounts
    SetDetail = 13,
    /// Read own account
    GetMyAccount = 20,
    /// Read any account
    GetAllAccounts = 21,
    /// Read own balances
    GetMyAssets = 22,
    /// Read any balances
    GetAllAssets = 23,
    /// Read own signatories
    GetMySignatories = 24,
    /// Read any signatories
    GetAllSignatories = 25,
    /// Read roles and their permissions
    GetRoles = 26,
    /// Read asset definitions
    ReadAssets = 27,
    /// Read own transactions
    GetMyTxs = 28,
    /// Read any transactions
    GetAllTxs = 29,
    /// Read blocks
    GetBlocks = 30,
    /// Read own account details
    GetMyAccDetail = 31,
    /// Read any account details
    GetAllAccDetail = 32,
}

impl Permission {
    /// Every permission
    pub const ALL: [Permission; 26] = [
        Permission::CreateRole,
        Permission::AppendRole,
        Permission::CreateDomain,
        Permission::CreateAccount,
        Permission::CreateAsset,
        Permission::AddAssetQty,
        Permission::SubtractAssetQty,
        Permission::Transfer,
        Permission::Receive,
        Permission::AddSignatory,
        Permission::RemoveSignatory,
        Permission::SetQuorum,
        Permission::SetDetail,
        Permission::GetMyAccount,
        Permission::GetAllAccounts,
        Permission::GetMyAssets,
        Permission::GetAllAssets,
        Permission::GetMySignatories,
        Permission::GetAllSignatories,
        Permission::GetRoles,
        Permission::ReadAssets,
        Permission::GetMyTxs,
        Permission::GetAllTxs,
        Permission::GetBlocks,
        Permission::GetMyAccDetail,
        Permission::GetAllAccDetail,
    ];

    /// Permission set of a full administrator
    pub fn all() -> BTreeSet<Permission> {
        Self::ALL.iter().copied().collect()
    }

    /// Permissions of a regular user: move own assets, read own data
    pub fn user_defaults() -> BTreeSet<Permission> {
        [
            Permission::Transfer,
            Permission::Receive,
            Permission::GetMyAccount,
            Permission::GetMyAssets,
            Permission::GetMyAccDetail,
            Permission::GetMySignatories,
            Permission::GetMyTxs,
            Permission::ReadAssets,
        ]
        .into_iter()
        .collect()
    }
}
