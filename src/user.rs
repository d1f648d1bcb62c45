use std::io::Write;
use std::str::FromStr;

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::db;
use crate::schema::users;
use crate::types::{Id, Time};

#[derive(Queryable, Identifiable, Debug)]
#[diesel(table_name = users)]
pub struct User {
	pub id: Id,
	/// Employee registration number, used as the login identifier
	pub npp: String,
	pub password_hash: String,
	pub role: Role,
	pub name: String,
	pub created_at: Time,
}

#[derive(AsExpression, FromSqlRow, Clone, Copy, Eq, PartialEq, EnumString, Display, Serialize, Debug)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Admin,
	Member,
}

impl ToSql<Varchar, Pg> for Role {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for Role {
	fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(value.as_bytes())?;
		Ok(Role::from_str(s)?)
	}
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
	pub npp: &'a str,
	pub password_hash: &'a str,
	pub role: Role,
	pub name: &'a str,
}

pub enum UserKey<'a> {
	ID(Id),
	Npp(&'a str),
}

/// Data store implementation for operating on users in the database
pub struct Repo {
	db: db::PgPool,
}

impl Repo {
	pub fn new(db: db::PgPool) -> Self {
		Repo { db }
	}

	pub fn create(&self, new_user: NewUser) -> db::Result<User> {
		let conn = &mut self.db.get()?;
		diesel::insert_into(users::table)
			.values(&new_user)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find(&self, key: UserKey) -> db::Result<User> {
		let conn = &mut self.db.get()?;
		match key {
			UserKey::ID(id) => {
				users::table
					.find(id)
					.first::<User>(conn)
					.map_err(Into::into)
			}
			UserKey::Npp(npp) => {
				users::table
					.filter(users::npp.eq(npp))
					.first::<User>(conn)
					.map_err(Into::into)
			}
		}
	}
}
