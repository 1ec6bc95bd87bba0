pub mod employee;
pub mod memory;

pub use employee::{EmployeeDirectory, SqliteEmployeeDirectory};
pub use memory::MemoryEmployeeDirectory;
