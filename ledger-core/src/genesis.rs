//! Genesis block
//!
//! Bootstraps an `admin` role with every permission, a `user` role with the
//! regular-user defaults, the `test` domain and the `admin@test` account.

use crate::command::Command;
use crate::crypto::KeyPair;
use crate::permission::Permission;
use crate::types::{
    now_millis, AccountId, Block, DomainId, Hash, PublicKey, RoleName, Timestamp, Transaction,
};

/// Administrator role name
pub const ADMIN_ROLE: &str = "admin";

/// Regular user role name
pub const USER_ROLE: &str = "user";

/// Domain created at genesis
pub const GENESIS_DOMAIN: &str = "test";

/// Administrator account name (within the genesis domain)
pub const ADMIN_NAME: &str = "admin";

/// Genesis contents
#[derive(Debug, Clone)]
pub struct Genesis {
    admin_key: PublicKey,
    accounts: Vec<(String, PublicKey)>,
    assets: Vec<(String, u8)>,
    created_at: Timestamp,
}

impl Genesis {
    /// Genesis with `admin@test` controlled by `admin_key`
    pub fn new(admin_key: PublicKey) -> Self {
        Self {
            admin_key,
            accounts: Vec::new(),
            assets: Vec::new(),
            created_at: now_millis(),
        }
    }

    /// Admin account id
    pub fn admin_account() -> AccountId {
        AccountId::from_parts(ADMIN_NAME, &DomainId::new(GENESIS_DOMAIN))
    }

    /// Also create a regular user account in the genesis domain
    pub fn with_account(mut self, name: impl Into<String>, public_key: PublicKey) -> Self {
        self.accounts.push((name.into(), public_key));
        self
    }

    /// Also define an asset in the genesis domain
    pub fn with_asset(mut self, name: impl Into<String>, precision: u8) -> Self {
        self.assets.push((name.into(), precision));
        self
    }

    /// Override creation time
    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    fn commands(&self) -> Vec<Command> {
        let domain = DomainId::new(GENESIS_DOMAIN);
        let mut commands = vec![
            Command::CreateRole {
                role_name: RoleName::new(ADMIN_ROLE),
                permissions: Permission::all(),
            },
            Command::CreateRole {
                role_name: RoleName::new(USER_ROLE),
                permissions: Permission::user_defaults(),
            },
            Command::CreateDomain {
                domain_id: domain.clone(),
                default_role: RoleName::new(USER_ROLE),
            },
            Command::CreateAccount {
                account_name: ADMIN_NAME.to_string(),
                domain_id: domain.clone(),
                public_key: self.admin_key,
            },
            Command::AppendRole {
                account_id: Self::admin_account(),
                role_name: RoleName::new(ADMIN_ROLE),
            },
        ];

        for (name, public_key) in &self.accounts {
            commands.push(Command::CreateAccount {
                account_name: name.clone(),
                domain_id: domain.clone(),
                public_key: *public_key,
            });
        }

        for (name, precision) in &self.assets {
            commands.push(Command::CreateAsset {
                asset_name: name.clone(),
                domain_id: domain.clone(),
                precision: *precision,
            });
        }

        commands
    }

    /// Build the height-1 block, signed by `signer`
    pub fn block(&self, signer: &KeyPair) -> Block {
        let mut builder = Transaction::builder(Self::admin_account()).created_at(self.created_at);
        for command in self.commands() {
            builder = builder.command(command);
        }
        let tx = builder.sign(signer);

        Block::new(1, Hash::ZERO, vec![tx], vec![], self.created_at).sign(signer)
    }
}
