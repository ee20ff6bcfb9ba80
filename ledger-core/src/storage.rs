//! Block storage
//!
//! Committed blocks are the only durable record; world state is rebuilt by
//! replaying them on open.
//!
//! # Column Families (RocksDB back-end)
//!
//! - `blocks` - Committed blocks (key: height, big-endian)
//! - `meta` - Chain metadata (key: `latest_height`)

use crate::{
    config::{Config, StorageBackend},
    error::{Error, Result},
    types::Block,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Append-only store of committed blocks
pub trait BlockStorage: Send + Sync + std::fmt::Debug {
    /// Persist the block at its height
    fn persist_block(&self, block: &Block) -> Result<()>;

    /// Block at `height`, if stored
    fn block(&self, height: u64) -> Result<Option<Block>>;

    /// Height of the highest stored block (0 if empty)
    fn latest_height(&self) -> Result<u64>;
}

/// In-memory block store
#[derive(Debug, Default)]
pub struct MemoryBlockStorage {
    blocks: RwLock<BTreeMap<u64, Block>>,
}

impl MemoryBlockStorage {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStorage for MemoryBlockStorage {
    fn persist_block(&self, block: &Block) -> Result<()> {
        self.blocks.write().insert(block.height(), block.clone());
        Ok(())
    }

    fn block(&self, height: u64) -> Result<Option<Block>> {
        Ok(self.blocks.read().get(&height).cloned())
    }

    fn latest_height(&self) -> Result<u64> {
        Ok(self.blocks.read().keys().next_back().copied().unwrap_or(0))
    }
}

/// Open the back-end selected in `config`
pub fn open_storage(config: &Config) -> Result<Arc<dyn BlockStorage>> {
    match config.storage {
        StorageBackend::Memory => Ok(Arc::new(MemoryBlockStorage::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => Ok(Arc::new(RocksDbBlockStorage::open(config)?)),
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::RocksDb => Err(Error::Config(
            "RocksDB storage requires the `rocksdb` feature".to_string(),
        )),
    }
}

#[cfg(feature = "rocksdb")]
pub use self::rocks::RocksDbBlockStorage;

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::*;
    use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
    use std::path::PathBuf;

    const CF_BLOCKS: &str = "blocks";
    const CF_META: &str = "meta";
    const KEY_LATEST_HEIGHT: &[u8] = b"latest_height";

    /// RocksDB-backed block store
    pub struct RocksDbBlockStorage {
        db: DB,
        path: PathBuf,
    }

    impl std::fmt::Debug for RocksDbBlockStorage {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RocksDbBlockStorage")
                .field("path", &self.path)
                .finish()
        }
    }

    impl RocksDbBlockStorage {
        /// Open or create database
        pub fn open(config: &Config) -> Result<Self> {
            let path = &config.data_dir;
            std::fs::create_dir_all(path)?;

            let mut db_opts = Options::default();
            db_opts.create_if_missing(true);
            db_opts.create_missing_column_families(true);
            db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
            db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
            db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
            if config.rocksdb.enable_statistics {
                db_opts.enable_statistics();
            }

            let cf_descriptors = vec![
                ColumnFamilyDescriptor::new(CF_BLOCKS, Self::cf_options_blocks()),
                ColumnFamilyDescriptor::new(CF_META, Options::default()),
            ];

            let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
            tracing::info!(path = ?path, "Opened RocksDB block store");

            Ok(Self {
                db,
                path: path.clone(),
            })
        }

        fn cf_options_blocks() -> Options {
            let mut opts = Options::default();
            opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            opts
        }

        fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
            self.db
                .cf_handle(name)
                .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
        }
    }

    impl BlockStorage for RocksDbBlockStorage {
        fn persist_block(&self, block: &Block) -> Result<()> {
            let cf_blocks = self.cf_handle(CF_BLOCKS)?;
            let cf_meta = self.cf_handle(CF_META)?;
            let height = block.height();

            // Block and head pointer land together
            let mut batch = WriteBatch::default();
            batch.put_cf(cf_blocks, height.to_be_bytes(), bincode::serialize(block)?);
            batch.put_cf(cf_meta, KEY_LATEST_HEIGHT, height.to_be_bytes());
            self.db.write(batch)?;

            tracing::debug!(height, block_hash = %block.hash(), "Block persisted");
            Ok(())
        }

        fn block(&self, height: u64) -> Result<Option<Block>> {
            let cf = self.cf_handle(CF_BLOCKS)?;
            match self.db.get_cf(cf, height.to_be_bytes())? {
                Some(value) => Ok(Some(bincode::deserialize(&value)?)),
                None => Ok(None),
            }
        }

        fn latest_height(&self) -> Result<u64> {
            let cf = self.cf_handle(CF_META)?;
            match self.db.get_cf(cf, KEY_LATEST_HEIGHT)? {
                Some(value) => {
                    let bytes: [u8; 8] = value.as_slice().try_into().map_err(|_| {
                        Error::Storage("Corrupt latest_height record".to_string())
                    })?;
                    Ok(u64::from_be_bytes(bytes))
                }
                None => Ok(0),
            }
        }
    }
}
