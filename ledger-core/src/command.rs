//! Transaction commands

use crate::permission::Permission;
use crate::types::{AccountId, AssetId, DomainId, PublicKey, RoleName};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// State-changing instruction carried by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Define a role with a permission set
    CreateRole {
        /// New role
        role_name: RoleName,
        /// Permissions granted by the role
        permissions: BTreeSet<Permission>,
    },

    /// Grant an existing role to an account
    AppendRole {
        /// Target account
        account_id: AccountId,
        /// Role to append
        role_name: RoleName,
    },

    /// Create a domain whose new accounts receive `default_role`
    CreateDomain {
        /// New domain
        domain_id: DomainId,
        /// Role given to accounts created in the domain
        default_role: RoleName,
    },

    /// Create an account with one signatory and quorum 1
    CreateAccount {
        /// Name part of the new account id
        account_name: String,
        /// Domain of the account
        domain_id: DomainId,
        /// Initial signatory
        public_key: PublicKey,
    },

    /// Define an asset within a domain
    CreateAsset {
        /// Name part of the new asset id
        asset_name: String,
        /// Domain of the asset
        domain_id: DomainId,
        /// Allowed fractional digits
        precision: u8,
    },

    /// Issue quantity to the creator's balance
    AddAssetQuantity {
        /// Asset
        asset_id: AssetId,
        /// Positive amount
        amount: Decimal,
    },

    /// Burn quantity from the creator's balance
    SubtractAssetQuantity {
        /// Asset
        asset_id: AssetId,
        /// Positive amount
        amount: Decimal,
    },

    /// Move quantity between accounts
    TransferAsset {
        /// Debited account (must be the creator)
        src_account_id: AccountId,
        /// Credited account
        dest_account_id: AccountId,
        /// Asset
        asset_id: AssetId,
        /// Free-form note
        description: String,
        /// Positive amount
        amount: Decimal,
    },

    /// Attach a signatory to an account
    AddSignatory {
        /// Target account
        account_id: AccountId,
        /// New signatory
        public_key: PublicKey,
    },

    /// Detach a signatory from an account
    RemoveSignatory {
        /// Target account
        account_id: AccountId,
        /// Signatory to remove
        public_key: PublicKey,
    },

    /// Change the number of signatures an account's transactions need
    SetQuorum {
        /// Target account
        account_id: AccountId,
        /// New quorum
        quorum: u32,
    },

    /// Set a key/value detail on an account
    SetAccountDetail {
        /// Target account
        account_id: AccountId,
        /// Detail key
        key: String,
        /// Detail value
        value: String,
    },
}

impl Command {
    /// Command name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateRole { .. } => "CreateRole",
            Command::AppendRole { .. } => "AppendRole",
            Command::CreateDomain { .. } => "CreateDomain",
            Command::CreateAccount { .. } => "CreateAccount",
            Command::CreateAsset { .. } => "CreateAsset",
            Command::AddAssetQuantity { .. } => "AddAssetQuantity",
            Command::SubtractAssetQuantity { .. } => "SubtractAssetQuantity",
            Command::TransferAsset { .. } => "TransferAsset",
            Command::AddSignatory { .. } => "AddSignatory",
            Command::RemoveSignatory { .. } => "RemoveSignatory",
            Command::SetQuorum { .. } => "SetQuorum",
            Command::SetAccountDetail { .. } => "SetAccountDetail",
        }
    }
}
