use std::io::Write;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use strum_macros::{Display, EnumString};

use crate::db;
use crate::member::Member;
use crate::schema::{installments, loans};
use crate::types::{Date, DateExt, Id, Time};

#[derive(Queryable, Identifiable, Associations, Debug)]
#[diesel(table_name = loans)]
#[diesel(belongs_to(Member))]
pub struct Loan {
	pub id: Id,
	pub member_id: Id,
	pub principal: BigDecimal,
	pub tenor_months: i16,
	pub interest_type: InterestType,
	/// Annual rate in basis points
	pub interest_rate: i16,
	pub status: LoanStatus,
	pub issue_date: Date,
	pub created_at: Time,
}

impl Loan {
	// Converts interest rate (in basis points) to BigDecimal
	pub fn interest_rate(&self) -> BigDecimal {
		BigDecimal::from(self.interest_rate) / BigDecimal::from(10_000)
	}
}

#[derive(AsExpression, FromSqlRow, Clone, Copy, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
pub enum InterestType {
	/// Interest charged on the original principal every period
	Flat,
	/// Interest charged on the remaining balance
	Declining,
}

#[derive(AsExpression, FromSqlRow, Clone, Copy, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
pub enum LoanStatus {
	Pending,
	Active,
	Paid,
	Cancelled,
}

impl Default for LoanStatus {
	fn default() -> Self { LoanStatus::Pending }
}

impl ToSql<Varchar, Pg> for InterestType {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for InterestType {
	fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(value.as_bytes())?;
		Ok(InterestType::from_str(s)?)
	}
}

impl ToSql<Varchar, Pg> for LoanStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for LoanStatus {
	fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(value.as_bytes())?;
		Ok(LoanStatus::from_str(s)?)
	}
}

#[derive(Insertable)]
#[diesel(table_name = loans)]
pub struct NewLoan<'a> {
	pub member_id: &'a Id,
	pub principal: &'a BigDecimal,
	pub tenor_months: i16,
	pub interest_type: InterestType,
	pub interest_rate: i16,
	pub status: LoanStatus,
	pub issue_date: Date,
}

/// One loan installment ("angsuran")
#[derive(Queryable, Identifiable, Associations, Debug)]
#[diesel(table_name = installments)]
#[diesel(belongs_to(Loan))]
pub struct Installment {
	pub id: Id,
	pub loan_id: Id,
	/// 1-based position in the schedule
	pub period_index: i16,
	pub principal_due: BigDecimal,
	pub interest_due: BigDecimal,
	pub due_date: Date,
	pub paid: bool,
	pub paid_at: Option<Time>,
}

impl Installment {
	/// Full amount owed for this period
	pub fn total_due(&self) -> BigDecimal {
		&self.principal_due + &self.interest_due
	}
}

#[derive(Insertable)]
#[diesel(table_name = installments)]
pub struct NewInstallment<'a> {
	pub loan_id: &'a Id,
	pub period_index: i16,
	pub principal_due: &'a BigDecimal,
	pub interest_due: &'a BigDecimal,
	pub due_date: Date,
}

/// An installment before it is persisted
#[derive(Debug, PartialEq)]
pub struct ScheduledInstallment {
	pub period_index: i16,
	pub principal_due: BigDecimal,
	pub interest_due: BigDecimal,
	pub due_date: Date,
}

/// Build the full installment schedule for a loan.
///
/// The principal is split evenly across the tenor, rounded down so no
/// period can exceed its share; the final installment absorbs the rounding
/// residual and the schedule sums exactly to the principal. Flat interest
/// charges the original principal every period, declining interest charges
/// the remaining balance.
pub fn build_schedule(
	principal: &BigDecimal,
	tenor_months: i16,
	interest_type: InterestType,
	interest_rate_bps: i16,
	issue_date: Date,
) -> Vec<ScheduledInstallment> {
	if tenor_months <= 0 {
		return Vec::new();
	}

	// annual basis points -> monthly fraction
	let monthly_rate = BigDecimal::from(interest_rate_bps) / BigDecimal::from(120_000);

	let per_principal = (principal / BigDecimal::from(tenor_months))
		.with_scale_round(2, RoundingMode::Floor);
	let last_principal = principal - &per_principal * BigDecimal::from(tenor_months - 1);

	let mut schedule = Vec::with_capacity(tenor_months as usize);
	let mut remaining = principal.clone();

	for period in 1..=tenor_months {
		let principal_due = if period == tenor_months {
			last_principal.clone()
		} else {
			per_principal.clone()
		};

		let base = match interest_type {
			InterestType::Flat => principal,
			InterestType::Declining => &remaining,
		};
		let interest_due = (base * &monthly_rate).with_scale_round(2, RoundingMode::HalfUp);

		remaining = remaining - &principal_due;

		schedule.push(ScheduledInstallment {
			period_index: period,
			principal_due,
			interest_due,
			due_date: issue_date.add_months(period as u32),
		});
	}

	schedule
}

/// Data store implementation for operating on loans in the database
pub struct Repo {
	db: db::PgPool,
}

impl Repo {
	pub fn new(db: db::PgPool) -> Self {
		Repo { db }
	}

	pub fn create(&self, new_loan: NewLoan) -> db::Result<Loan> {
		let conn = &mut self.db.get()?;
		diesel::insert_into(loans::table)
			.values(&new_loan)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(&self, id: &Id) -> db::Result<Loan> {
		let conn = &mut self.db.get()?;
		loans::table
			.find(id)
			.first::<Loan>(conn)
			.map_err(Into::into)
	}

	pub fn find_by_member(&self, member_id: &Id) -> db::Result<Vec<Loan>> {
		let conn = &mut self.db.get()?;
		loans::table
			.filter(loans::member_id.eq(member_id))
			.order(loans::created_at.asc())
			.load::<Loan>(conn)
			.map_err(Into::into)
	}

	pub fn set_status(&self, id: &Id, status: LoanStatus) -> db::Result<Loan> {
		let conn = &mut self.db.get()?;
		diesel::update(loans::table.filter(loans::id.eq(id)))
			.set(loans::status.eq(status))
			.get_result(conn)
			.map_err(Into::into)
	}
}

/// Data store implementation for operating on installments in the database
pub struct InstallmentRepo {
	db: db::PgPool,
}

impl InstallmentRepo {
	pub fn new(db: db::PgPool) -> Self {
		InstallmentRepo { db }
	}

	pub fn create(&self, new_installment: NewInstallment) -> db::Result<Installment> {
		let conn = &mut self.db.get()?;
		diesel::insert_into(installments::table)
			.values(&new_installment)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(&self, id: &Id) -> db::Result<Installment> {
		let conn = &mut self.db.get()?;
		installments::table
			.find(id)
			.first::<Installment>(conn)
			.map_err(Into::into)
	}

	pub fn list_by_loan(&self, loan_id: &Id) -> db::Result<Vec<Installment>> {
		let conn = &mut self.db.get()?;
		installments::table
			.filter(installments::loan_id.eq(loan_id))
			.order(installments::period_index.asc())
			.load::<Installment>(conn)
			.map_err(Into::into)
	}

	pub fn unpaid_by_loan(&self, loan_id: &Id) -> db::Result<Vec<Installment>> {
		let conn = &mut self.db.get()?;
		installments::table
			.filter(
				installments::loan_id.eq(loan_id)
					.and(installments::paid.eq(false)),
			)
			.order(installments::period_index.asc())
			.load::<Installment>(conn)
			.map_err(Into::into)
	}

	pub fn mark_paid(&self, id: &Id, paid_at: Time) -> db::Result<Installment> {
		let conn = &mut self.db.get()?;
		diesel::update(installments::table.filter(installments::id.eq(id)))
			.set((
				installments::paid.eq(true),
				installments::paid_at.eq(paid_at),
			))
			.get_result(conn)
			.map_err(Into::into)
	}
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;

	use super::*;

	fn issue_date() -> Date {
		NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
	}

	#[test]
	fn schedule_principal_sums_exactly() {
		// 1_000_000 over 12 months does not divide evenly to two decimals
		let principal = BigDecimal::from(1_000_000);
		let schedule = build_schedule(&principal, 12, InterestType::Flat, 1200, issue_date());

		assert_eq!(schedule.len(), 12);
		let sum: BigDecimal = schedule.iter().map(|s| s.principal_due.clone()).sum();
		assert_eq!(sum, principal.with_scale(2));
	}

	#[test]
	fn flat_interest_is_constant() {
		let principal = BigDecimal::from(1_200_000);
		// 12% annually -> 1% per month -> 12_000 per period
		let schedule = build_schedule(&principal, 6, InterestType::Flat, 1200, issue_date());

		for installment in &schedule {
			assert_eq!(installment.interest_due, BigDecimal::from(12_000).with_scale(2));
		}
	}

	#[test]
	fn declining_interest_shrinks_with_balance() {
		let principal = BigDecimal::from(1_200_000);
		let schedule = build_schedule(&principal, 12, InterestType::Declining, 1200, issue_date());

		// 1% of the full balance in the first period
		assert_eq!(schedule[0].interest_due, BigDecimal::from(12_000).with_scale(2));
		// one period of principal left by the last installment
		assert_eq!(schedule[11].interest_due, BigDecimal::from(1_000).with_scale(2));

		for pair in schedule.windows(2) {
			assert!(pair[1].interest_due < pair[0].interest_due);
		}
	}

	#[test]
	fn due_dates_step_one_month_from_issue() {
		let principal = BigDecimal::from(500_000);
		let schedule = build_schedule(&principal, 3, InterestType::Flat, 1000, issue_date());

		assert_eq!(schedule[0].due_date, NaiveDate::from_ymd_opt(2026, 2, 10).unwrap());
		assert_eq!(schedule[2].due_date, NaiveDate::from_ymd_opt(2026, 4, 10).unwrap());
	}

	#[test]
	fn tiny_principal_over_long_tenor_never_goes_negative() {
		use bigdecimal::Signed;

		// rounding the even split up would overdraw the final installment
		let principal = BigDecimal::from_str("1.00").unwrap();
		let schedule = build_schedule(&principal, 150, InterestType::Flat, 1200, issue_date());

		assert!(schedule.iter().all(|s| !s.principal_due.is_negative()));
		let sum: BigDecimal = schedule.iter().map(|s| s.principal_due.clone()).sum();
		assert_eq!(sum, principal);
	}

	#[test]
	fn zero_tenor_yields_no_schedule() {
		let principal = BigDecimal::from(500_000);
		assert!(build_schedule(&principal, 0, InterestType::Flat, 1000, issue_date()).is_empty());
	}
}
