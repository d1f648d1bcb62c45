use diesel::PgConnection;
pub use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};

use koperasi_api::{db, loan, master_data, member, savings, user};
use koperasi_api::member::{Member, MemberStatus, NewMember};
use koperasi_api::schema::{members, users};
use koperasi_api::user::{NewUser, Role, User};

pub struct Fixture {
	pub pool: db::PgPool,
	pub user_factory: UserFactory,
	pub member_factory: MemberFactory,
}

impl Fixture {
	pub fn new() -> Self {
		let pool = db::pg_connection();
		let user_factory = UserFactory::new(pool.clone());
		let member_factory = MemberFactory::new(pool.clone());
		Fixture {
			pool,
			user_factory,
			member_factory,
		}
	}

	pub fn conn(&self) -> PooledConnection<ConnectionManager<PgConnection>> {
		self.pool.get().unwrap()
	}

	pub fn teardown(&self) {
		let tables = vec![
			"installments",
			"loans",
			"savings_entries",
			"members",
			"master_data",
			"users",
		];
		for table in tables {
			diesel::sql_query(format!("DELETE FROM {}", table))
				.execute(&mut self.conn())
				.expect("deleting db table");
		}
	}
}

pub struct Suite {
	pub user_repo: user::Repo,
	pub member_repo: member::Repo,
	pub savings_repo: savings::Repo,
	pub loan_repo: loan::Repo,
	pub installment_repo: loan::InstallmentRepo,
	pub master_data_repo: master_data::Repo,
}

impl Suite {
	pub fn setup() -> Self {
		let fixture = Fixture::new();
		fixture.teardown();

		Suite {
			user_repo: user::Repo::new(fixture.pool.clone()),
			member_repo: member::Repo::new(fixture.pool.clone()),
			savings_repo: savings::Repo::new(fixture.pool.clone()),
			loan_repo: loan::Repo::new(fixture.pool.clone()),
			installment_repo: loan::InstallmentRepo::new(fixture.pool.clone()),
			master_data_repo: master_data::Repo::new(fixture.pool.clone()),
		}
	}
}

pub struct UserFactory {
	pool: db::PgPool,
}

impl UserFactory {
	fn new(pool: db::PgPool) -> Self {
		UserFactory { pool }
	}

	pub fn user(&self, new_user: NewUser) -> User {
		let conn = &mut self.pool.get().unwrap();
		diesel::insert_into(users::table)
			.values(new_user)
			.get_result::<User>(conn)
			.unwrap()
	}

	pub fn admin(&self) -> User {
		self.user(NewUser {
			npp: "A0001",
			password_hash: "$2b$04$placeholderplaceholderplaceh",
			role: Role::Admin,
			name: "Admin Utama",
		})
	}
}

pub struct MemberFactory {
	pool: db::PgPool,
}

impl MemberFactory {
	pub fn new(pool: db::PgPool) -> Self {
		MemberFactory { pool }
	}

	pub fn member(&self, new_member: NewMember) -> Member {
		let conn = &mut self.pool.get().unwrap();
		diesel::insert_into(members::table)
			.values(new_member)
			.get_result(conn)
			.unwrap()
	}

	pub fn pending_member(&self, user: &User, nik: &str) -> Member {
		self.member(NewMember {
			user_id: user.id,
			nik,
			name: &user.name,
			birth_place: None,
			birth_date: None,
			gender: None,
			address: None,
			phone: None,
			company: Some("PT Sumber Makmur"),
			work_unit: None,
			work_location: None,
			position: None,
			status: MemberStatus::Pending,
		})
	}

	pub fn active_member(&self, user: &User, nik: &str) -> Member {
		let created = self.pending_member(user, nik);
		let conn = &mut self.pool.get().unwrap();
		diesel::update(members::table.filter(members::id.eq(created.id)))
			.set(members::status.eq(MemberStatus::Active))
			.get_result(conn)
			.unwrap()
	}
}
