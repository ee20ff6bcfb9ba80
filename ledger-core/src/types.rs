//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode over ordered collections)
//! - Content addressing (SHA-256 of canonical payloads)
//! - Exact arithmetic (Decimal for asset amounts)

use crate::command::Command;
use crate::crypto::{hash_bytes, merkle_root, KeyPair};
use crate::error::StatefulError;
use crate::query::QueryRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

/// SHA-256 digest identifying transactions, queries and blocks
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// All-zero hash, the previous hash of the first block
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Wrap raw digest bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest arbitrary bytes
    pub fn digest(data: &[u8]) -> Self {
        Self(hash_bytes(data))
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", hex::encode(&self.0[..8]))
    }
}

/// Ed25519 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", hex::encode(&self.0[..8]))
    }
}

/// Signature over a canonical payload, tied to one signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signer
    public_key: PublicKey,

    /// Signature bytes (64 bytes for Ed25519)
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
}

impl Signature {
    /// Create from signer and raw bytes
    pub fn new(public_key: PublicKey, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            public_key,
            bytes: bytes.into(),
        }
    }

    /// Signer
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Maximum length of an account, asset or role name
pub const MAX_NAME_LEN: usize = 32;

/// Maximum length of a domain id
pub const MAX_DOMAIN_LEN: usize = 255;

/// Maximum length of a single domain label
const MAX_DOMAIN_LABEL_LEN: usize = 63;

/// Check an account, asset or role name: `[a-z_0-9]{1,32}`
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Check a domain id: dot-separated labels starting with a letter, ending
/// alphanumeric, hyphens allowed inside
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return false;
    }

    domain.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                label.len() <= MAX_DOMAIN_LABEL_LEN
                    && first.is_ascii_alphabetic()
                    && last.is_ascii_alphanumeric()
                    && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
            }
            _ => false,
        }
    })
}

fn split_qualified<'a>(id: &'a str, separator: char) -> Option<(&'a str, &'a str)> {
    let (name, domain) = id.split_once(separator)?;
    if domain.contains(separator) {
        return None;
    }
    Some((name, domain))
}

/// Account identifier (`name@domain`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Compose from name and domain
    pub fn from_parts(name: &str, domain: &DomainId) -> Self {
        Self(format!("{}@{}", name, domain.as_str()))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain part, if the id is qualified
    pub fn domain(&self) -> Option<DomainId> {
        split_qualified(&self.0, '@').map(|(_, domain)| DomainId::new(domain))
    }

    /// Name and domain are both well-formed
    pub fn is_well_formed(&self) -> bool {
        match split_qualified(&self.0, '@') {
            Some((name, domain)) => is_valid_name(name) && is_valid_domain(domain),
            None => false,
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Domain identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainId(String);

impl DomainId {
    /// Create new domain ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Charset and length check
    pub fn is_well_formed(&self) -> bool {
        is_valid_domain(&self.0)
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset identifier (`name#domain`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    /// Create new asset ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Compose from name and domain
    pub fn from_parts(name: &str, domain: &DomainId) -> Self {
        Self(format!("{}#{}", name, domain.as_str()))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain part, if the id is qualified
    pub fn domain(&self) -> Option<DomainId> {
        split_qualified(&self.0, '#').map(|(_, domain)| DomainId::new(domain))
    }

    /// Name and domain are both well-formed
    pub fn is_well_formed(&self) -> bool {
        match split_qualified(&self.0, '#') {
            Some((name, domain)) => is_valid_name(name) && is_valid_domain(domain),
            None => false,
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleName(String);

impl RoleName {
    /// Create new role name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Charset and length check
    pub fn is_well_formed(&self) -> bool {
        is_valid_name(&self.0)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed part of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    /// Creator account
    pub creator: AccountId,

    /// Creation time (ms since epoch)
    pub created_at: Timestamp,

    /// Minimum number of signatures
    pub quorum: u32,

    /// Commands applied in order
    pub commands: Vec<Command>,
}

impl TransactionPayload {
    /// Create canonical bytes for signing
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Deterministic serialization for signature verification
        bincode::serialize(self).expect("serialization cannot fail")
    }

    /// Identity of every transaction carrying this payload
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.canonical_bytes())
    }
}

#[derive(Serialize, Deserialize)]
struct SignedTransaction {
    payload: TransactionPayload,
    signatures: Vec<Signature>,
}

impl From<SignedTransaction> for Transaction {
    fn from(signed: SignedTransaction) -> Self {
        let mut tx = Transaction::new(signed.payload);
        for signature in signed.signatures {
            tx.add_signature(signature);
        }
        tx
    }
}

impl From<Transaction> for SignedTransaction {
    fn from(tx: Transaction) -> Self {
        Self {
            payload: tx.payload,
            signatures: tx.signatures,
        }
    }
}

/// Client transaction: payload plus signatures
///
/// Identity is the payload hash; adding signatures never changes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "SignedTransaction", into = "SignedTransaction")]
pub struct Transaction {
    payload: TransactionPayload,
    signatures: Vec<Signature>,
    hash: Hash,
}

impl Transaction {
    /// Wrap an unsigned payload
    pub fn new(payload: TransactionPayload) -> Self {
        let hash = payload.hash();
        Self {
            payload,
            signatures: Vec::new(),
            hash,
        }
    }

    /// Start building a transaction
    pub fn builder(creator: AccountId) -> TransactionBuilder {
        TransactionBuilder::new(creator)
    }

    /// Identity
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Signed payload
    pub fn payload(&self) -> &TransactionPayload {
        &self.payload
    }

    /// Creator account
    pub fn creator(&self) -> &AccountId {
        &self.payload.creator
    }

    /// Commands
    pub fn commands(&self) -> &[Command] {
        &self.payload.commands
    }

    /// Attached signatures, at most one per signer
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Public keys of all signers
    pub fn signers(&self) -> impl Iterator<Item = &PublicKey> {
        self.signatures.iter().map(Signature::public_key)
    }

    /// Attach a signature, replacing any earlier one from the same signer
    pub fn add_signature(&mut self, signature: Signature) {
        match self
            .signatures
            .iter_mut()
            .find(|s| s.public_key == signature.public_key)
        {
            Some(existing) => *existing = signature,
            None => self.signatures.push(signature),
        }
    }

    /// Sign the canonical payload and attach the signature
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        let signature = keypair.sign(&self.payload.canonical_bytes());
        self.add_signature(signature);
        self
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.signatures == other.signatures
    }
}

impl Eq for Transaction {}

/// Builder for transactions
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    payload: TransactionPayload,
}

impl TransactionBuilder {
    /// New builder stamped with the current time and quorum 1
    pub fn new(creator: AccountId) -> Self {
        Self {
            payload: TransactionPayload {
                creator,
                created_at: now_millis(),
                quorum: 1,
                commands: Vec::new(),
            },
        }
    }

    /// Override creation time
    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.payload.created_at = created_at;
        self
    }

    /// Declared quorum
    pub fn quorum(mut self, quorum: u32) -> Self {
        self.payload.quorum = quorum;
        self
    }

    /// Append a command
    pub fn command(mut self, command: Command) -> Self {
        self.payload.commands.push(command);
        self
    }

    /// Finish without signing
    pub fn build(self) -> Transaction {
        Transaction::new(self.payload)
    }

    /// Finish and sign
    pub fn sign(self, keypair: &KeyPair) -> Transaction {
        self.build().sign(keypair)
    }
}

/// Signed part of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPayload {
    /// Creator account
    pub creator: AccountId,

    /// Creation time (ms since epoch)
    pub created_at: Timestamp,

    /// Per-creator strictly increasing counter (replay protection)
    pub counter: u64,

    /// What is asked
    pub request: QueryRequest,
}

impl QueryPayload {
    /// Create canonical bytes for signing
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("serialization cannot fail")
    }
}

/// Signed read request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Signed payload
    pub payload: QueryPayload,

    /// Creator's signature
    pub signature: Option<Signature>,
}

impl Query {
    /// Build an unsigned query stamped with the current time
    pub fn new(creator: AccountId, counter: u64, request: QueryRequest) -> Self {
        Self {
            payload: QueryPayload {
                creator,
                created_at: now_millis(),
                counter,
                request,
            },
            signature: None,
        }
    }

    /// Override creation time
    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.payload.created_at = created_at;
        self
    }

    /// Sign the canonical payload
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.signature = Some(keypair.sign(&self.payload.canonical_bytes()));
        self
    }

    /// Identity
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.payload.canonical_bytes())
    }

    /// Creator account
    pub fn creator(&self) -> &AccountId {
        &self.payload.creator
    }
}

/// Height and hash of the last committed block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Height of the last committed block (0 before genesis)
    pub height: u64,

    /// Hash of the last committed block (zero before genesis)
    pub hash: Hash,
}

impl ChainHead {
    /// Head of a chain with no blocks
    pub fn empty() -> Self {
        Self {
            height: 0,
            hash: Hash::ZERO,
        }
    }
}

/// Candidate transaction set for one round, before stateful validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Round height
    pub height: u64,

    /// Transactions in arrival order
    pub transactions: Vec<Transaction>,

    /// Creation time (ms since epoch)
    pub created_at: Timestamp,
}

/// Transaction excluded by stateful validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedTransaction {
    /// Transaction identity
    pub hash: Hash,

    /// Index of the failing command, if a command failed
    pub command_index: Option<usize>,

    /// Violation
    pub reason: StatefulError,
}

/// Proposal after stateful validation, partitioned into accepted and rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProposal {
    /// Round height
    pub height: u64,

    /// Accepted transactions, in proposal order
    pub accepted: Vec<Transaction>,

    /// Rejected transactions, in proposal order
    pub rejected: Vec<RejectedTransaction>,
}

impl VerifiedProposal {
    /// Merkle root over accepted transaction hashes
    pub fn transactions_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.accepted.iter().map(Transaction::hash).collect();
        merkle_root(&hashes)
    }

    /// Merkle root over rejected transaction hashes
    pub fn rejected_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.rejected.iter().map(|r| r.hash).collect();
        merkle_root(&hashes)
    }
}

/// Block header, the hashed part of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height (1 for genesis)
    pub height: u64,

    /// Hash of previous block
    pub previous_hash: Hash,

    /// Merkle root of accepted transaction hashes
    pub transactions_root: Hash,

    /// Merkle root of rejected transaction hashes
    pub rejected_root: Hash,

    /// Block creation timestamp (ms since epoch)
    pub created_at: Timestamp,

    /// Number of accepted transactions
    pub transaction_count: u32,
}

impl BlockHeader {
    /// Compute block hash
    pub fn hash(&self) -> Hash {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.transactions_root.as_bytes());
        hasher.update(self.rejected_root.as_bytes());
        hasher.update(self.created_at.to_be_bytes());
        hasher.update(self.transaction_count.to_be_bytes());

        Hash::new(hasher.finalize().into())
    }
}

/// Consensus-agreed, immutable unit of ledger history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Hashed header
    pub header: BlockHeader,

    /// Accepted transactions, in proposal order
    pub transactions: Vec<Transaction>,

    /// Hashes of transactions excluded by stateful validation
    pub rejected_transactions: Vec<Hash>,

    /// Commitment signatures over the block hash
    pub signatures: Vec<Signature>,
}

impl Block {
    /// Assemble an unsigned block
    pub fn new(
        height: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        rejected_transactions: Vec<Hash>,
        created_at: Timestamp,
    ) -> Self {
        let tx_hashes: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
        let header = BlockHeader {
            height,
            previous_hash,
            transactions_root: merkle_root(&tx_hashes),
            rejected_root: merkle_root(&rejected_transactions),
            created_at,
            transaction_count: transactions.len() as u32,
        };

        Self {
            header,
            transactions,
            rejected_transactions,
            signatures: Vec::new(),
        }
    }

    /// Assemble the block for a verified proposal on top of `previous_hash`
    pub fn from_verified(
        proposal: &VerifiedProposal,
        previous_hash: Hash,
        created_at: Timestamp,
    ) -> Self {
        Self::new(
            proposal.height,
            previous_hash,
            proposal.accepted.clone(),
            proposal.rejected.iter().map(|r| r.hash).collect(),
            created_at,
        )
    }

    /// Block identity
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Block height
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Whether `tx_hash` is among the accepted transactions
    pub fn contains_transaction(&self, tx_hash: &Hash) -> bool {
        self.transactions.iter().any(|tx| tx.hash() == *tx_hash)
    }

    /// Whether `tx_hash` was explicitly excluded
    pub fn rejects_transaction(&self, tx_hash: &Hash) -> bool {
        self.rejected_transactions.contains(tx_hash)
    }

    /// Sign the block hash and attach the signature
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        let signature = keypair.sign(self.hash().as_bytes());
        self.signatures
            .retain(|s| s.public_key() != signature.public_key());
        self.signatures.push(signature);
        self
    }

    /// Recompute Merkle roots and compare with the header
    pub fn roots_match(&self) -> bool {
        let tx_hashes: Vec<Hash> = self.transactions.iter().map(Transaction::hash).collect();
        self.header.transactions_root == merkle_root(&tx_hashes)
            && self.header.rejected_root == merkle_root(&self.rejected_transactions)
            && self.header.transaction_count as usize == self.transactions.len()
    }
}
