mod memory;
mod postgres;
pub mod repo;
pub mod repo_types;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;
pub use repo::{StoreError, UserStore};
pub use repo_types::{NewUser, Role, User};
