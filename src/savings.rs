use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::db;
use crate::schema::savings_entries;
use crate::types::{Id, Time};

/// One line of a member's savings ("simpanan") ledger
#[derive(Queryable, Identifiable, Debug)]
#[diesel(table_name = savings_entries)]
pub struct SavingsEntry {
	pub id: Id,
	pub member_id: Id,
	pub savings_type: SavingsType,
	pub direction: EntryDirection,
	pub amount: BigDecimal,
	pub period_month: i16,
	pub period_year: i16,
	pub created_at: Time,
}

impl SavingsEntry {
	/// Deposits count positive, withdrawals negative
	pub fn signed_amount(&self) -> BigDecimal {
		match self.direction {
			EntryDirection::Deposit => self.amount.clone(),
			EntryDirection::Withdrawal => -&self.amount,
		}
	}
}

#[derive(AsExpression, FromSqlRow, Clone, Copy, Eq, PartialEq, Hash, EnumString, EnumIter, Display, Serialize, Debug)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SavingsType {
	/// Simpanan pokok, paid once on joining
	Principal,
	/// Simpanan wajib, paid every period
	Mandatory,
	/// Simpanan sukarela
	Voluntary,
}

#[derive(AsExpression, FromSqlRow, Clone, Copy, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
pub enum EntryDirection {
	Deposit,
	Withdrawal,
}

impl ToSql<Varchar, Pg> for SavingsType {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for SavingsType {
	fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(value.as_bytes())?;
		Ok(SavingsType::from_str(s)?)
	}
}

impl ToSql<Varchar, Pg> for EntryDirection {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for EntryDirection {
	fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(value.as_bytes())?;
		Ok(EntryDirection::from_str(s)?)
	}
}

#[derive(Insertable)]
#[diesel(table_name = savings_entries)]
pub struct NewSavingsEntry<'a> {
	pub member_id: &'a Id,
	pub savings_type: SavingsType,
	pub direction: EntryDirection,
	pub amount: &'a BigDecimal,
	pub period_month: i16,
	pub period_year: i16,
}

/// Net amount per savings type: deposits minus withdrawals
pub fn net_by_type(entries: &[SavingsEntry]) -> HashMap<SavingsType, BigDecimal> {
	let mut nets: HashMap<SavingsType, BigDecimal> = SavingsType::iter()
		.map(|t| (t, BigDecimal::zero()))
		.collect();

	for entry in entries {
		if let Some(net) = nets.get_mut(&entry.savings_type) {
			*net += entry.signed_amount();
		}
	}
	nets
}

/// Net balance across all savings types
pub fn total(entries: &[SavingsEntry]) -> BigDecimal {
	entries.iter().map(|e| e.signed_amount()).sum()
}

/// Data store implementation for operating on savings_entries in the database
pub struct Repo {
	db: db::PgPool,
}

impl Repo {
	pub fn new(db: db::PgPool) -> Self {
		Repo { db }
	}

	pub fn create(&self, new_entry: NewSavingsEntry) -> db::Result<SavingsEntry> {
		let conn = &mut self.db.get()?;
		diesel::insert_into(savings_entries::table)
			.values(&new_entry)
			.get_result::<SavingsEntry>(conn)
			.map_err(Into::into)
	}

	pub fn list_by_member(&self, member_id: &Id) -> db::Result<Vec<SavingsEntry>> {
		let conn = &mut self.db.get()?;
		savings_entries::table
			.filter(savings_entries::member_id.eq(member_id))
			.order(savings_entries::created_at.asc())
			.load::<SavingsEntry>(conn)
			.map_err(Into::into)
	}

	pub fn list_by_member_and_type(&self, member_id: &Id, savings_type: SavingsType) -> db::Result<Vec<SavingsEntry>> {
		let conn = &mut self.db.get()?;
		savings_entries::table
			.filter(
				savings_entries::member_id.eq(member_id)
					.and(savings_entries::savings_type.eq(savings_type)),
			)
			.order(savings_entries::created_at.asc())
			.load::<SavingsEntry>(conn)
			.map_err(Into::into)
	}
}
