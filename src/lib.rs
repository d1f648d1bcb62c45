#[macro_use]
extern crate diesel;

pub mod schema;
pub mod types;
pub mod db;
pub mod user;
pub mod member;
pub mod savings;
pub mod loan;
pub mod master_data;
pub mod koperasi;
pub mod xlsx;
pub mod pdf;

#[cfg(test)]
mod testutil;

pub use koperasi::error::{Error, ErrorKind};
pub use koperasi::service::{KoperasiService, NewKoperasiService, Session};
pub use member::{Member, MemberStatus};
pub use savings::{EntryDirection, SavingsEntry, SavingsType};
pub use types::{Date, Id, Time};
pub use user::{Role, User};
