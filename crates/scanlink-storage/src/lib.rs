//! Employee directory for the scanlink fingerprint lifecycle.
//!
//! The lifecycle manager consumes employees through the narrow
//! [`EmployeeDirectory`] trait: read by id, read by assigned slot, list the
//! assigned slots, and set or clear a slot. Two implementations are provided:
//!
//! - [`SqliteEmployeeDirectory`] - sqlx/SQLite, schema from `migrations/`
//! - [`MemoryEmployeeDirectory`] - in-process map for tests and simulations
//!
//! # Example
//!
//! ```no_run
//! use scanlink_storage::{Database, DatabaseConfig, EmployeeDirectory, SqliteEmployeeDirectory};
//! use scanlink_core::EmployeeId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("scanlink.db")).await?;
//! let directory = SqliteEmployeeDirectory::new(db.pool().clone());
//!
//! if let Some(employee) = directory.find_by_id(EmployeeId::new(7)).await? {
//!     println!("{} enrolled: {}", employee.full_name, employee.has_fingerprint());
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{Employee, NewEmployee};
pub use repositories::{EmployeeDirectory, MemoryEmployeeDirectory, SqliteEmployeeDirectory};
