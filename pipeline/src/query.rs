//! Query processor: read queries against committed state

use crate::response::{Reason, Response};
use crate::stateless::StatelessValidator;
use ledger_core::{
    AccountId, Ledger, Permission, Query, QueryRequest, QueryResult, StateSnapshot, StatefulError,
    Transaction,
};
use std::sync::Arc;

/// Answers signed queries from the latest committed snapshot
#[derive(Debug, Clone)]
pub struct QueryProcessor {
    validator: Arc<StatelessValidator>,
    ledger: Arc<Ledger>,
}

impl QueryProcessor {
    /// Create a processor
    pub fn new(validator: Arc<StatelessValidator>, ledger: Arc<Ledger>) -> Self {
        Self { validator, ledger }
    }

    /// Validate and answer `query`
    ///
    /// Never reads uncommitted state: the answer reflects one committed
    /// snapshot taken after stateless validation.
    pub fn answer(&self, query: &Query) -> Response {
        let hash = query.hash();

        if let Err(err) = self.validator.validate_query(query) {
            tracing::debug!(query_hash = %hash, reason = err.code(), "Query failed stateless validation");
            return Response::StatelessFailed {
                hash,
                reason: Reason::from(&err),
            };
        }

        let snapshot = self.ledger.snapshot();
        match answer_at(query, &snapshot) {
            Ok(result) => Response::QueryResult {
                query_hash: hash,
                result,
            },
            Err(reason) => {
                tracing::debug!(query_hash = %hash, reason = reason.code, "Query failed stateful validation");
                Response::StatefulFailed { hash, reason }
            }
        }
    }
}

/// Stateful checks and execution against one snapshot
fn answer_at(query: &Query, snapshot: &StateSnapshot) -> Result<QueryResult, Reason> {
    let creator = query.creator();
    let world = snapshot.world();

    let account = world
        .account(creator)
        .ok_or_else(|| StatefulError::NoAccount(creator.clone()))
        .map_err(|e| Reason::from(&e))?;

    // Stateless validation guarantees a signature is present
    if let Some(signature) = &query.signature {
        if !account.signatories.contains(signature.public_key()) {
            return Err(Reason::from(&StatefulError::NotSignatory {
                account: creator.clone(),
                public_key: *signature.public_key(),
            }));
        }
    }

    execute(creator, &query.payload.request, snapshot).map_err(|e| match e {
        QueryFailure::Stateful(err) => Reason::from(&err),
        QueryFailure::Storage(message) => Reason::new("STORAGE_ERROR", message),
    })
}

enum QueryFailure {
    Stateful(StatefulError),
    Storage(String),
}

impl From<StatefulError> for QueryFailure {
    fn from(err: StatefulError) -> Self {
        QueryFailure::Stateful(err)
    }
}

impl From<ledger_core::Error> for QueryFailure {
    fn from(err: ledger_core::Error) -> Self {
        QueryFailure::Storage(err.to_string())
    }
}

/// `own` suffices for the creator's own data, `all` for anyone's
fn require_scoped(
    snapshot: &StateSnapshot,
    creator: &AccountId,
    target: &AccountId,
    own: Permission,
    all: Permission,
) -> Result<(), StatefulError> {
    let world = snapshot.world();
    if world.has_permission(creator, all) || (creator == target && world.has_permission(creator, own))
    {
        Ok(())
    } else {
        Err(StatefulError::PermissionDenied {
            account: creator.clone(),
            permission: if creator == target { own } else { all },
        })
    }
}

fn require(
    snapshot: &StateSnapshot,
    creator: &AccountId,
    permission: Permission,
) -> Result<(), StatefulError> {
    if snapshot.world().has_permission(creator, permission) {
        Ok(())
    } else {
        Err(StatefulError::PermissionDenied {
            account: creator.clone(),
            permission,
        })
    }
}

fn execute(
    creator: &AccountId,
    request: &QueryRequest,
    snapshot: &StateSnapshot,
) -> Result<QueryResult, QueryFailure> {
    let world = snapshot.world();
    let lookup = |account_id: &AccountId| {
        world
            .account(account_id)
            .ok_or_else(|| StatefulError::NoAccount(account_id.clone()))
    };

    let result = match request {
        QueryRequest::GetAccount { account_id } => {
            require_scoped(
                snapshot,
                creator,
                account_id,
                Permission::GetMyAccount,
                Permission::GetAllAccounts,
            )?;
            let account = lookup(account_id)?;
            QueryResult::Account {
                account_id: account.id.clone(),
                domain_id: account.domain_id.clone(),
                quorum: account.quorum,
                roles: account.roles.iter().cloned().collect(),
            }
        }

        QueryRequest::GetAccountAssets { account_id } => {
            require_scoped(
                snapshot,
                creator,
                account_id,
                Permission::GetMyAssets,
                Permission::GetAllAssets,
            )?;
            let account = lookup(account_id)?;
            QueryResult::AccountAssets(
                account
                    .balances
                    .iter()
                    .map(|(asset, amount)| (asset.clone(), *amount))
                    .collect(),
            )
        }

        QueryRequest::GetAccountDetail { account_id, key } => {
            require_scoped(
                snapshot,
                creator,
                account_id,
                Permission::GetMyAccDetail,
                Permission::GetAllAccDetail,
            )?;
            let account = lookup(account_id)?;
            let details = match key {
                Some(key) => account
                    .details
                    .iter()
                    .filter(|(k, _)| *k == key)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                None => account.details.clone(),
            };
            QueryResult::AccountDetail(details)
        }

        QueryRequest::GetSignatories { account_id } => {
            require_scoped(
                snapshot,
                creator,
                account_id,
                Permission::GetMySignatories,
                Permission::GetAllSignatories,
            )?;
            let account = lookup(account_id)?;
            QueryResult::Signatories(account.signatories.iter().copied().collect())
        }

        QueryRequest::GetAssetInfo { asset_id } => {
            require(snapshot, creator, Permission::ReadAssets)?;
            let asset = world
                .asset(asset_id)
                .ok_or_else(|| StatefulError::NoAsset(asset_id.clone()))?;
            QueryResult::AssetInfo {
                asset_id: asset.id.clone(),
                domain_id: asset.domain_id.clone(),
                precision: asset.precision,
            }
        }

        QueryRequest::GetRoles => {
            require(snapshot, creator, Permission::GetRoles)?;
            QueryResult::Roles(world.roles().cloned().collect())
        }

        QueryRequest::GetRolePermissions { role_name } => {
            require(snapshot, creator, Permission::GetRoles)?;
            let permissions = world
                .role_permissions(role_name)
                .ok_or_else(|| StatefulError::NoRole(role_name.clone()))?;
            QueryResult::RolePermissions(permissions.iter().copied().collect())
        }

        QueryRequest::GetTransactions { hashes } => {
            let can_read_all = world.has_permission(creator, Permission::GetAllTxs);
            let mut transactions: Vec<Transaction> = Vec::with_capacity(hashes.len());
            for hash in hashes {
                let tx = snapshot
                    .transaction(hash)?
                    .ok_or(StatefulError::NoTransaction(*hash))?;
                if !can_read_all {
                    require_scoped(
                        snapshot,
                        creator,
                        tx.creator(),
                        Permission::GetMyTxs,
                        Permission::GetAllTxs,
                    )?;
                }
                transactions.push(tx);
            }
            QueryResult::Transactions(transactions)
        }

        QueryRequest::GetBlock { height } => {
            require(snapshot, creator, Permission::GetBlocks)?;
            let block = snapshot
                .block(*height)?
                .ok_or(StatefulError::NoBlock(*height))?;
            QueryResult::Block(Box::new(block))
        }
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use ledger_core::genesis::Genesis;
    use ledger_core::storage::MemoryBlockStorage;
    use ledger_core::{Ed25519Verifier, KeyPair, RoleName};

    struct Fixture {
        admin: KeyPair,
        alice: KeyPair,
        processor: QueryProcessor,
    }

    fn fixture() -> Fixture {
        let admin = KeyPair::generate();
        let alice = KeyPair::generate();
        let genesis = Genesis::new(admin.public_key())
            .with_account("alice", alice.public_key())
            .block(&admin);
        let ledger = Arc::new(Ledger::open(Arc::new(MemoryBlockStorage::new()), &genesis).unwrap());
        let validator = Arc::new(StatelessValidator::new(
            ValidationConfig::default(),
            Arc::new(Ed25519Verifier),
        ));

        Fixture {
            admin,
            alice,
            processor: QueryProcessor::new(validator, ledger),
        }
    }

    fn query(creator: &str, counter: u64, request: QueryRequest, keypair: &KeyPair) -> Query {
        Query::new(AccountId::new(creator), counter, request).sign(keypair)
    }

    fn reason_code(response: &Response) -> Option<&'static str> {
        response.reason().map(|r| r.code)
    }

    #[test]
    fn test_unknown_signer_is_stateful_failure() {
        let f = fixture();
        let stranger = KeyPair::generate();
        let q = query(
            "admin@test",
            1,
            QueryRequest::GetAccount {
                account_id: Genesis::admin_account(),
            },
            &stranger,
        );

        let response = f.processor.answer(&q);
        assert!(matches!(response, Response::StatefulFailed { .. }));
        assert_eq!(reason_code(&response), Some("NOT_SIGNATORY"));
    }

    #[test]
    fn test_missing_account_is_stateful_failure() {
        let f = fixture();
        let q = query(
            "admin@test",
            1,
            QueryRequest::GetAccount {
                account_id: AccountId::new("ghost@test"),
            },
            &f.admin,
        );

        let response = f.processor.answer(&q);
        assert!(matches!(response, Response::StatefulFailed { .. }));
        assert_eq!(reason_code(&response), Some("NO_ACCOUNT"));
    }

    #[test]
    fn test_admin_reads_account() {
        let f = fixture();
        let q = query(
            "admin@test",
            1,
            QueryRequest::GetAccount {
                account_id: AccountId::new("alice@test"),
            },
            &f.admin,
        );

        match f.processor.answer(&q) {
            Response::QueryResult {
                result: QueryResult::Account { quorum, roles, .. },
                ..
            } => {
                assert_eq!(quorum, 1);
                assert_eq!(roles, vec![RoleName::new("user")]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_user_scope_limited_to_own_account() {
        let f = fixture();
        let own = query(
            "alice@test",
            1,
            QueryRequest::GetSignatories {
                account_id: AccountId::new("alice@test"),
            },
            &f.alice,
        );
        assert!(matches!(
            f.processor.answer(&own),
            Response::QueryResult {
                result: QueryResult::Signatories(_),
                ..
            }
        ));

        let other = query(
            "alice@test",
            2,
            QueryRequest::GetSignatories {
                account_id: Genesis::admin_account(),
            },
            &f.alice,
        );
        assert_eq!(
            reason_code(&f.processor.answer(&other)),
            Some("PERMISSION_DENIED")
        );
    }

    #[test]
    fn test_account_detail_scoped_by_detail_permissions() {
        let f = fixture();
        let own = query(
            "alice@test",
            1,
            QueryRequest::GetAccountDetail {
                account_id: AccountId::new("alice@test"),
                key: None,
            },
            &f.alice,
        );
        assert!(matches!(
            f.processor.answer(&own),
            Response::QueryResult {
                result: QueryResult::AccountDetail(_),
                ..
            }
        ));

        let foreign = query(
            "alice@test",
            2,
            QueryRequest::GetAccountDetail {
                account_id: Genesis::admin_account(),
                key: None,
            },
            &f.alice,
        );
        match f.processor.answer(&foreign) {
            Response::StatefulFailed { reason, .. } => {
                assert_eq!(reason.code, "PERMISSION_DENIED");
                assert!(reason.message.contains("GetAllAccDetail"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let admin = query(
            "admin@test",
            1,
            QueryRequest::GetAccountDetail {
                account_id: AccountId::new("alice@test"),
                key: Some("missing".to_string()),
            },
            &f.admin,
        );
        assert!(matches!(
            f.processor.answer(&admin),
            Response::QueryResult {
                result: QueryResult::AccountDetail(_),
                ..
            }
        ));
    }

    #[test]
    fn test_replayed_query_is_stateless_failure() {
        let f = fixture();
        let q = query("admin@test", 1, QueryRequest::GetRoles, &f.admin);

        assert!(matches!(f.processor.answer(&q), Response::QueryResult { .. }));
        let replay = f.processor.answer(&q);
        assert!(matches!(replay, Response::StatelessFailed { .. }));
        assert_eq!(reason_code(&replay), Some("STALE_QUERY_COUNTER"));
    }

    #[test]
    fn test_get_block() {
        let f = fixture();
        let genesis_block = query("admin@test", 1, QueryRequest::GetBlock { height: 1 }, &f.admin);
        assert!(matches!(
            f.processor.answer(&genesis_block),
            Response::QueryResult {
                result: QueryResult::Block(_),
                ..
            }
        ));

        let future = query("admin@test", 2, QueryRequest::GetBlock { height: 9 }, &f.admin);
        assert_eq!(reason_code(&f.processor.answer(&future)), Some("NO_BLOCK"));
    }
}
