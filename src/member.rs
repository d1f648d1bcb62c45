use std::io::Write;
use std::str::FromStr;

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use strum_macros::{Display, EnumString};

use crate::db;
use crate::schema::members;
use crate::types::{Date, Id, Time};
use crate::user::User;

#[derive(Queryable, Identifiable, Associations, Debug)]
#[diesel(table_name = members)]
#[diesel(belongs_to(User))]
pub struct Member {
	pub id: Id,
	pub user_id: Id,
	/// Assigned on activation, e.g. `0001/KOP/08/2026`
	pub member_number: Option<String>,
	/// National identity number
	pub nik: String,
	pub name: String,
	pub birth_place: Option<String>,
	pub birth_date: Option<Date>,
	pub gender: Option<String>,
	pub address: Option<String>,
	pub phone: Option<String>,
	pub company: Option<String>,
	pub work_unit: Option<String>,
	pub work_location: Option<String>,
	pub position: Option<String>,
	pub status: MemberStatus,
	pub photo_url: Option<String>,
	pub signature_url: Option<String>,
	pub join_date: Option<Date>,
	pub created_at: Time,
}

#[derive(AsExpression, FromSqlRow, Clone, Copy, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
pub enum MemberStatus {
	Pending,
	Verified,
	Approved,
	Active,
	Exited,
}

impl Default for MemberStatus {
	fn default() -> Self { MemberStatus::Pending }
}

impl MemberStatus {
	/// Legal status transitions:
	/// pending -> verified -> approved -> active, exited from anywhere
	pub fn can_transition_to(&self, next: MemberStatus) -> bool {
		use MemberStatus::*;
		match (*self, next) {
			(Pending, Verified) => true,
			(Verified, Approved) => true,
			(Approved, Active) => true,
			(from, Exited) => from != Exited,
			_ => false,
		}
	}

	/// A member may only log in once the back office has confirmed them
	pub fn allows_login(&self) -> bool {
		matches!(self, MemberStatus::Active | MemberStatus::Approved)
	}
}

impl ToSql<Varchar, Pg> for MemberStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for MemberStatus {
	fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(value.as_bytes())?;
		Ok(MemberStatus::from_str(s)?)
	}
}

#[derive(Insertable)]
#[diesel(table_name = members)]
pub struct NewMember<'a> {
	pub user_id: Id,
	pub nik: &'a str,
	pub name: &'a str,
	pub birth_place: Option<&'a str>,
	pub birth_date: Option<Date>,
	pub gender: Option<&'a str>,
	pub address: Option<&'a str>,
	pub phone: Option<&'a str>,
	pub company: Option<&'a str>,
	pub work_unit: Option<&'a str>,
	pub work_location: Option<&'a str>,
	pub position: Option<&'a str>,
	pub status: MemberStatus,
}

/// Suffix shared by every member number issued in the same month
pub fn number_suffix(month: u32, year: i32) -> String {
	format!("/KOP/{:02}/{:04}", month, year)
}

/// Next member number for the month: highest existing sequence with a
/// matching suffix plus one, zero-padded to four digits
pub fn next_member_number(existing: &[String], month: u32, year: i32) -> String {
	let suffix = number_suffix(month, year);
	let max_seq = existing.iter()
		.filter(|number| number.ends_with(&suffix))
		.filter_map(|number| number.split('/').next())
		.filter_map(|seq| seq.parse::<u32>().ok())
		.max()
		.unwrap_or(0);

	format!("{:04}{}", max_seq + 1, suffix)
}

/// Advisory-lock key for number assignment within one issuing period.
///
/// FNV-1a over the period suffix; deterministic across processes so every
/// activation for the same month contends on the same lock.
pub fn sequence_lock_key(suffix: &str) -> i64 {
	let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
	for byte in suffix.bytes() {
		hash ^= u64::from(byte);
		hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
	}
	hash as i64
}

/// Data store implementation for operating on members in the database
pub struct Repo {
	db: db::PgPool,
}

impl Repo {
	pub fn new(db: db::PgPool) -> Self {
		Repo { db }
	}

	pub fn create(&self, new_member: NewMember) -> db::Result<Member> {
		let conn = &mut self.db.get()?;
		diesel::insert_into(members::table)
			.values(&new_member)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(&self, id: &Id) -> db::Result<Member> {
		let conn = &mut self.db.get()?;
		members::table
			.find(id)
			.first::<Member>(conn)
			.map_err(Into::into)
	}

	pub fn find_by_nik(&self, nik: &str) -> db::Result<Member> {
		let conn = &mut self.db.get()?;
		members::table
			.filter(members::nik.eq(nik))
			.first::<Member>(conn)
			.map_err(Into::into)
	}

	pub fn find_by_user_id(&self, user_id: &Id) -> db::Result<Member> {
		let conn = &mut self.db.get()?;
		members::table
			.filter(members::user_id.eq(user_id))
			.first::<Member>(conn)
			.map_err(Into::into)
	}

	pub fn list_by_status(&self, status: MemberStatus) -> db::Result<Vec<Member>> {
		let conn = &mut self.db.get()?;
		members::table
			.filter(members::status.eq(status))
			.order(members::created_at.asc())
			.load::<Member>(conn)
			.map_err(Into::into)
	}

	pub fn list_all(&self) -> db::Result<Vec<Member>> {
		let conn = &mut self.db.get()?;
		members::table
			.order(members::created_at.asc())
			.load::<Member>(conn)
			.map_err(Into::into)
	}

	pub fn set_status(&self, id: &Id, status: MemberStatus) -> db::Result<Member> {
		let conn = &mut self.db.get()?;
		diesel::update(members::table.filter(members::id.eq(id)))
			.set(members::status.eq(status))
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn set_verification(&self, id: &Id, photo_url: &str, signature_url: &str) -> db::Result<Member> {
		let conn = &mut self.db.get()?;
		diesel::update(members::table.filter(members::id.eq(id)))
			.set((
				members::photo_url.eq(photo_url),
				members::signature_url.eq(signature_url),
			))
			.get_result(conn)
			.map_err(Into::into)
	}
}
