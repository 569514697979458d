pub mod client_store;
pub mod database;
pub mod pikpak;
pub mod session_store;
pub mod shared_client;

pub use client_store::{spawn_sweeper, ClientStore, MemoryClientStore};
pub use database::Database;
pub use pikpak::{ClientFactory, PikPakApi, PikPakClient, PikPakConnector, UserInfo};
pub use session_store::{spawn_session_pruner, ExpiringMemoryStore};
pub use shared_client::SharedClient;
