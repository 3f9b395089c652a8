//! Database layer
//!
//! SQLite is the default backend; MySQL is selected through
//! `database.driver` in the configuration. Schema creation lives in
//! [`migrations`], data access in [`repositories`].

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
