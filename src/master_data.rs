use diesel::prelude::*;

use crate::db;
use crate::schema::master_data;
use crate::types::Id;

/// One allowed value of a reference-data category, used to populate
/// form dropdowns (companies, work units, locations)
#[derive(Queryable, Identifiable, Debug)]
#[diesel(table_name = master_data)]
pub struct MasterData {
	pub id: Id,
	pub category: String,
	pub value: String,
}

#[derive(Insertable)]
#[diesel(table_name = master_data)]
pub struct NewMasterData<'a> {
	pub category: &'a str,
	pub value: &'a str,
}

pub struct Repo {
	db: db::PgPool,
}

impl Repo {
	pub fn new(db: db::PgPool) -> Self {
		Repo { db }
	}

	pub fn create(&self, new_value: NewMasterData) -> db::Result<MasterData> {
		let conn = &mut self.db.get()?;
		diesel::insert_into(master_data::table)
			.values(&new_value)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn values_for(&self, category: &str) -> db::Result<Vec<String>> {
		let conn = &mut self.db.get()?;
		master_data::table
			.filter(master_data::category.eq(category))
			.order(master_data::value.asc())
			.select(master_data::value)
			.load::<String>(conn)
			.map_err(Into::into)
	}
}
