//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Asset conservation: transfers never change total supply
//! - Non-negative balances
//! - Deterministic replay: same blocks → same state
//! - Transaction identity independent of signatures

use ledger_core::{
    crypto::merkle_root,
    genesis::Genesis,
    state::{ExecutionMode, WorldState},
    storage::MemoryBlockStorage,
    AccountId, AssetId, Block, Command, Hash, KeyPair, Ledger, Transaction,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

const USERS: [&str; 3] = ["alice", "bob", "carol"];

struct Fixture {
    admin: KeyPair,
    users: Vec<KeyPair>,
    genesis: Block,
}

impl Fixture {
    fn new() -> Self {
        let admin = KeyPair::from_seed(&[1u8; 32]);
        let users: Vec<KeyPair> = (0..USERS.len())
            .map(|i| KeyPair::from_seed(&[10 + i as u8; 32]))
            .collect();

        let mut genesis = Genesis::new(admin.public_key())
            .with_asset("coin", 2)
            .created_at(1_700_000_000_000);
        for (name, key) in USERS.iter().zip(&users) {
            genesis = genesis.with_account(*name, key.public_key());
        }
        let genesis = genesis.block(&admin);

        Self {
            admin,
            users,
            genesis,
        }
    }

    fn coin() -> AssetId {
        AssetId::new("coin#test")
    }

    fn user(index: usize) -> AccountId {
        AccountId::new(format!("{}@test", USERS[index]))
    }

    /// Admin issues `amount` and hands it to every user
    fn funding_tx(&self, amount: Decimal) -> Transaction {
        let mut builder = Transaction::builder(Genesis::admin_account())
            .created_at(1_700_000_000_001)
            .command(Command::AddAssetQuantity {
                asset_id: Self::coin(),
                amount: amount * Decimal::from(USERS.len() as u64),
            });
        for index in 0..USERS.len() {
            builder = builder.command(Command::TransferAsset {
                src_account_id: Genesis::admin_account(),
                dest_account_id: Self::user(index),
                asset_id: Self::coin(),
                description: "funding".to_string(),
                amount,
            });
        }
        builder.sign(&self.admin)
    }

    fn transfer_tx(&self, from: usize, to: usize, cents: i64, nonce: u64) -> Transaction {
        Transaction::builder(Self::user(from))
            .created_at(1_700_000_000_002 + nonce)
            .command(Command::TransferAsset {
                src_account_id: Self::user(from),
                dest_account_id: Self::user(to),
                asset_id: Self::coin(),
                description: String::new(),
                amount: Decimal::new(cents, 2),
            })
            .sign(&self.users[from])
    }

    fn funded_state(&self, amount: Decimal) -> WorldState {
        let mut state = WorldState::new();
        state
            .apply_transaction(&self.genesis.transactions[0], ExecutionMode::Genesis)
            .unwrap();
        state
            .apply_transaction(&self.funding_tx(amount), ExecutionMode::Checked)
            .unwrap();
        state
    }
}

/// Strategy for transfers between the three users: (from, to, cents)
fn transfer_strategy() -> impl Strategy<Value = (usize, usize, i64)> {
    (0..USERS.len(), 0..USERS.len(), 1i64..200_000i64)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: Transfers never change total supply or drive a balance negative
    #[test]
    fn prop_transfers_conserve_supply(
        transfers in prop::collection::vec(transfer_strategy(), 1..30)
    ) {
        let fixture = Fixture::new();
        let initial = Decimal::new(100_000, 2);
        let mut state = fixture.funded_state(initial);
        let supply = state.total_supply(&Fixture::coin());
        prop_assert_eq!(supply, initial * Decimal::from(3u64));

        for (nonce, (from, to, cents)) in transfers.into_iter().enumerate() {
            let tx = fixture.transfer_tx(from, to, cents, nonce as u64);
            // Overdrafts are rejected, the rest applied
            let _ = state.apply_transaction(&tx, ExecutionMode::Checked);

            prop_assert_eq!(state.total_supply(&Fixture::coin()), supply);
            for index in 0..USERS.len() {
                prop_assert!(state.balance(&Fixture::user(index), &Fixture::coin()) >= Decimal::ZERO);
            }
        }
    }

    /// Property: Replaying the same blocks yields the same world state
    #[test]
    fn prop_deterministic_replay(
        transfers in prop::collection::vec(transfer_strategy(), 1..20)
    ) {
        let fixture = Fixture::new();
        let funding = fixture.funding_tx(Decimal::new(50_000, 2));

        // Only transfers that apply cleanly go into blocks
        let mut scratch = fixture.funded_state(Decimal::new(50_000, 2));
        let accepted: Vec<Transaction> = transfers
            .into_iter()
            .enumerate()
            .map(|(nonce, (from, to, cents))| fixture.transfer_tx(from, to, cents, nonce as u64))
            .filter(|tx| scratch.apply_transaction(tx, ExecutionMode::Checked).is_ok())
            .collect();

        let build = || {
            let ledger = Ledger::open(Arc::new(MemoryBlockStorage::new()), &fixture.genesis).unwrap();
            let block = Block::new(2, ledger.head().hash, vec![funding.clone()], vec![], 1);
            ledger.commit(&block, None).unwrap();
            let block = Block::new(3, ledger.head().hash, accepted.clone(), vec![], 2);
            ledger.commit(&block, None).unwrap();
            ledger
        };

        let first = build();
        let second = build();

        prop_assert_eq!(first.head(), second.head());
        let first_snapshot = first.snapshot();
        let second_snapshot = second.snapshot();
        prop_assert_eq!(first_snapshot.world(), second_snapshot.world());
        for index in 0..USERS.len() {
            prop_assert_eq!(
                first.snapshot().world().balance(&Fixture::user(index), &Fixture::coin()),
                scratch.balance(&Fixture::user(index), &Fixture::coin())
            );
        }
    }

    /// Property: Merkle root is a pure function of the leaves
    #[test]
    fn prop_merkle_root_deterministic(seeds in prop::collection::vec(any::<[u8; 32]>(), 1..64)) {
        let leaves: Vec<Hash> = seeds.into_iter().map(Hash::new).collect();
        prop_assert_eq!(merkle_root(&leaves), merkle_root(&leaves.clone()));
        if leaves.len() > 1 {
            prop_assert_ne!(merkle_root(&leaves), merkle_root(&leaves[1..]));
        }
    }

    /// Property: Adding signatures never changes a transaction's hash
    #[test]
    fn prop_hash_independent_of_signatures(signers in 1usize..5, cents in 1i64..1_000_000i64) {
        let fixture = Fixture::new();
        let tx = fixture.transfer_tx(0, 1, cents, 0);
        let hash = tx.hash();

        let mut signed = tx;
        for seed in 0..signers {
            signed = signed.sign(&KeyPair::from_seed(&[100 + seed as u8; 32]));
            prop_assert_eq!(signed.hash(), hash);
        }
        prop_assert_eq!(signed.signatures().len(), signers + 1);
    }
}
