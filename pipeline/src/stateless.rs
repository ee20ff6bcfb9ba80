//! Stateless validation of transactions and queries
//!
//! Every check here depends only on the item itself, the validator's clock
//! and, for queries, the last counter seen from the creator. The first
//! failing check short-circuits.

use crate::config::ValidationConfig;
use crate::error::StatelessError;
use ledger_core::types::{is_valid_name, now_millis, Timestamp};
use ledger_core::{AccountId, Command, Query, QueryRequest, SignatureVerifier, Transaction};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Largest asset precision representable by `Decimal`
pub const MAX_ASSET_PRECISION: u8 = 28;

/// Stateless validator for transactions and queries
#[derive(Debug)]
pub struct StatelessValidator {
    config: ValidationConfig,
    verifier: Arc<dyn SignatureVerifier>,

    /// Highest query counter accepted per creator
    query_counters: RwLock<HashMap<AccountId, u64>>,
}

impl StatelessValidator {
    /// Create a validator
    pub fn new(config: ValidationConfig, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            config,
            verifier,
            query_counters: RwLock::new(HashMap::new()),
        }
    }

    /// Validate a transaction against the current clock
    pub fn validate(&self, tx: &Transaction) -> Result<(), StatelessError> {
        self.validate_at(tx, now_millis())
    }

    /// Validate a transaction as of `now`
    pub fn validate_at(&self, tx: &Transaction, now: Timestamp) -> Result<(), StatelessError> {
        let payload = tx.payload();

        self.check_timestamp(payload.created_at, now)?;
        check_account(&payload.creator)
            .map_err(|_| StatelessError::MalformedCreator(payload.creator.clone()))?;

        if payload.quorum == 0 || payload.quorum > self.config.max_quorum {
            return Err(StatelessError::InvalidQuorum {
                quorum: payload.quorum,
                max: self.config.max_quorum,
            });
        }
        if tx.signatures().len() < payload.quorum as usize {
            return Err(StatelessError::InsufficientSignatures {
                quorum: payload.quorum,
                signatures: tx.signatures().len(),
            });
        }

        let message = payload.canonical_bytes();
        for signature in tx.signatures() {
            if !self.verifier.verify(&message, signature) {
                return Err(StatelessError::BadSignature(*signature.public_key()));
            }
        }

        if payload.commands.is_empty() {
            return Err(StatelessError::EmptyCommands);
        }
        if payload.commands.len() > self.config.max_commands_per_tx {
            return Err(StatelessError::TooManyCommands {
                count: payload.commands.len(),
                max: self.config.max_commands_per_tx,
            });
        }

        for (index, command) in payload.commands.iter().enumerate() {
            self.check_command(command)
                .map_err(|reason| StatelessError::MalformedCommand {
                    index,
                    command: command.name(),
                    reason,
                })?;
        }

        Ok(())
    }

    /// Validate a query against the current clock
    pub fn validate_query(&self, query: &Query) -> Result<(), StatelessError> {
        self.validate_query_at(query, now_millis())
    }

    /// Validate a query as of `now`
    ///
    /// On success the creator's query counter advances to the query's.
    pub fn validate_query_at(&self, query: &Query, now: Timestamp) -> Result<(), StatelessError> {
        let payload = &query.payload;

        self.check_timestamp(payload.created_at, now)?;
        check_account(&payload.creator)
            .map_err(|_| StatelessError::MalformedCreator(payload.creator.clone()))?;

        let signature = query
            .signature
            .as_ref()
            .ok_or(StatelessError::MissingSignature)?;
        if !self.verifier.verify(&payload.canonical_bytes(), signature) {
            return Err(StatelessError::BadSignature(*signature.public_key()));
        }

        check_request(&payload.request).map_err(StatelessError::MalformedQuery)?;

        if let Some(last_seen) = self.query_counters.read().get(&payload.creator) {
            if payload.counter <= *last_seen {
                return Err(StatelessError::StaleQueryCounter {
                    counter: payload.counter,
                    last_seen: *last_seen,
                });
            }
        }

        // Re-check under the write lock; a concurrent query may have advanced it
        let mut counters = self.query_counters.write();
        if let Some(last_seen) = counters.get(&payload.creator) {
            if payload.counter <= *last_seen {
                return Err(StatelessError::StaleQueryCounter {
                    counter: payload.counter,
                    last_seen: *last_seen,
                });
            }
        }
        counters.insert(payload.creator.clone(), payload.counter);

        Ok(())
    }

    fn check_timestamp(&self, created_at: Timestamp, now: Timestamp) -> Result<(), StatelessError> {
        if created_at.saturating_add(self.config.max_past_age_ms) < now {
            return Err(StatelessError::StaleTimestamp {
                created_at,
                now,
                max_age_ms: self.config.max_past_age_ms,
            });
        }
        if created_at > now.saturating_add(self.config.max_future_skew_ms) {
            return Err(StatelessError::FutureTimestamp {
                created_at,
                now,
                max_skew_ms: self.config.max_future_skew_ms,
            });
        }
        Ok(())
    }

    fn check_command(&self, command: &Command) -> Result<(), String> {
        match command {
            Command::CreateRole { role_name, .. } => check_name(role_name.as_str(), "role name"),

            Command::AppendRole {
                account_id,
                role_name,
            } => {
                check_account(account_id)?;
                check_name(role_name.as_str(), "role name")
            }

            Command::CreateDomain {
                domain_id,
                default_role,
            } => {
                if !domain_id.is_well_formed() {
                    return Err(format!("invalid domain id {}", domain_id));
                }
                check_name(default_role.as_str(), "default role")
            }

            Command::CreateAccount {
                account_name,
                domain_id,
                ..
            } => {
                check_name(account_name, "account name")?;
                if !domain_id.is_well_formed() {
                    return Err(format!("invalid domain id {}", domain_id));
                }
                Ok(())
            }

            Command::CreateAsset {
                asset_name,
                domain_id,
                precision,
            } => {
                check_name(asset_name, "asset name")?;
                if !domain_id.is_well_formed() {
                    return Err(format!("invalid domain id {}", domain_id));
                }
                if *precision > MAX_ASSET_PRECISION {
                    return Err(format!(
                        "precision {} exceeds {}",
                        precision, MAX_ASSET_PRECISION
                    ));
                }
                Ok(())
            }

            Command::AddAssetQuantity { asset_id, amount }
            | Command::SubtractAssetQuantity { asset_id, amount } => {
                if !asset_id.is_well_formed() {
                    return Err(format!("invalid asset id {}", asset_id));
                }
                check_amount(*amount)
            }

            Command::TransferAsset {
                src_account_id,
                dest_account_id,
                asset_id,
                description,
                amount,
            } => {
                check_account(src_account_id)?;
                check_account(dest_account_id)?;
                if src_account_id == dest_account_id {
                    return Err("source and destination are the same account".to_string());
                }
                if !asset_id.is_well_formed() {
                    return Err(format!("invalid asset id {}", asset_id));
                }
                if description.len() > self.config.max_description_len {
                    return Err(format!(
                        "description longer than {} bytes",
                        self.config.max_description_len
                    ));
                }
                check_amount(*amount)
            }

            Command::AddSignatory { account_id, .. }
            | Command::RemoveSignatory { account_id, .. } => check_account(account_id),

            Command::SetQuorum { account_id, quorum } => {
                check_account(account_id)?;
                if *quorum == 0 || *quorum > self.config.max_quorum {
                    return Err(format!(
                        "quorum {} outside 1..={}",
                        quorum, self.config.max_quorum
                    ));
                }
                Ok(())
            }

            Command::SetAccountDetail {
                account_id,
                key,
                value,
            } => {
                check_account(account_id)?;
                if key.is_empty()
                    || key.len() > self.config.max_detail_key_len
                    || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
                {
                    return Err(format!("invalid detail key {:?}", key));
                }
                if value.len() > self.config.max_detail_value_len {
                    return Err(format!(
                        "detail value longer than {} bytes",
                        self.config.max_detail_value_len
                    ));
                }
                Ok(())
            }
        }
    }
}

fn check_name(name: &str, what: &str) -> Result<(), String> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(format!("invalid {} {:?}", what, name))
    }
}

fn check_account(account: &AccountId) -> Result<(), String> {
    if account.is_well_formed() {
        Ok(())
    } else {
        Err(format!("invalid account id {}", account))
    }
}

fn check_amount(amount: Decimal) -> Result<(), String> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(format!("amount {} is not positive", amount))
    }
}

fn check_request(request: &QueryRequest) -> Result<(), String> {
    match request {
        QueryRequest::GetAccount { account_id }
        | QueryRequest::GetAccountAssets { account_id }
        | QueryRequest::GetSignatories { account_id } => check_account(account_id),
        QueryRequest::GetAccountDetail { account_id, key } => {
            check_account(account_id)?;
            match key {
                Some(key) if key.is_empty() => Err("empty detail key".to_string()),
                _ => Ok(()),
            }
        }
        QueryRequest::GetAssetInfo { asset_id } => {
            if asset_id.is_well_formed() {
                Ok(())
            } else {
                Err(format!("invalid asset id {}", asset_id))
            }
        }
        QueryRequest::GetRoles => Ok(()),
        QueryRequest::GetRolePermissions { role_name } => check_name(role_name.as_str(), "role name"),
        QueryRequest::GetTransactions { hashes } => {
            if hashes.is_empty() {
                Err("no transaction hashes".to_string())
            } else {
                Ok(())
            }
        }
        QueryRequest::GetBlock { height } => {
            if *height == 0 {
                Err("block heights start at 1".to_string())
            } else {
                Ok(())
            }
        }
    }
}
