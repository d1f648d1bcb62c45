use std::collections::HashMap;

use bigdecimal::{BigDecimal, Signed};
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use log::warn;
use serde::Serialize;

use crate::{db, loan, master_data, member, savings, user, xlsx};
use crate::loan::{Installment, InterestType, Loan, LoanStatus, NewInstallment, NewLoan};
use crate::member::{Member, MemberStatus, NewMember};
use crate::pdf;
use crate::savings::{EntryDirection, NewSavingsEntry, SavingsEntry, SavingsType};
use crate::schema::{installments, loans, members, savings_entries};
use crate::types::{Date, Id};
use crate::user::{NewUser, Role, User, UserKey};

use super::error::{Error, ErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

/// Deducted from the payout when a member leaves the cooperative
pub const EXIT_ADMIN_FEE: i64 = 25_000;

/// Service for performing cooperative member-management operations
pub struct KoperasiService<'a> {
	db: db::PgPool,
	user_repo: &'a user::Repo,
	member_repo: &'a member::Repo,
	savings_repo: &'a savings::Repo,
	loan_repo: &'a loan::Repo,
	installment_repo: &'a loan::InstallmentRepo,
	master_data_repo: &'a master_data::Repo,
}

/// Parameter object for creating a new KoperasiService
pub struct NewKoperasiService<'a> {
	pub db: db::PgPool,
	pub user_repo: &'a user::Repo,
	pub member_repo: &'a member::Repo,
	pub savings_repo: &'a savings::Repo,
	pub loan_repo: &'a loan::Repo,
	pub installment_repo: &'a loan::InstallmentRepo,
	pub master_data_repo: &'a master_data::Repo,
}

/// Payload handed to the client after a successful login
#[derive(Serialize, Debug)]
pub struct Session {
	pub user_id: Id,
	pub member_id: Option<Id>,
	pub role: Role,
	pub name: String,
}

/// Everything needed to open a user account with its member record
pub struct NewRegistration<'a> {
	pub npp: &'a str,
	pub password: &'a str,
	pub name: &'a str,
	pub nik: &'a str,
	pub birth_place: Option<&'a str>,
	pub birth_date: Option<Date>,
	pub gender: Option<&'a str>,
	pub address: Option<&'a str>,
	pub phone: Option<&'a str>,
	pub company: Option<&'a str>,
	pub work_unit: Option<&'a str>,
	pub work_location: Option<&'a str>,
	pub position: Option<&'a str>,
}

/// Financial snapshot computed when a member leaves the cooperative
#[derive(Serialize, Debug)]
pub struct ExitRealization {
	pub member_id: Id,
	pub savings: HashMap<SavingsType, BigDecimal>,
	pub total_savings: BigDecimal,
	pub outstanding_principal: BigDecimal,
	pub outstanding_interest: BigDecimal,
	pub admin_fee: BigDecimal,
	pub net_payout: BigDecimal,
}

/// Per-row outcome counts of a bulk spreadsheet import
#[derive(Serialize, Debug, Default, PartialEq)]
pub struct ImportSummary {
	pub matched: usize,
	pub unmatched: usize,
	pub failed: usize,
	pub entries_created: usize,
}

/// Outcome counts of a bulk activation
#[derive(Serialize, Debug, Default, PartialEq)]
pub struct BulkSummary {
	pub succeeded: usize,
	pub failed: usize,
}

impl<'a> KoperasiService<'a> {
	pub fn new(v: NewKoperasiService<'a>) -> Self {
		KoperasiService {
			db: v.db,
			user_repo: v.user_repo,
			member_repo: v.member_repo,
			savings_repo: v.savings_repo,
			loan_repo: v.loan_repo,
			installment_repo: v.installment_repo,
			master_data_repo: v.master_data_repo,
		}
	}

	/// Open a user account and its member record, pending verification
	pub fn register_member(&self, registration: NewRegistration) -> Result<(User, Member)> {
		let password_hash = bcrypt::hash(registration.password, bcrypt::DEFAULT_COST)?;

		let user = self.user_repo.create(NewUser {
			npp: registration.npp,
			password_hash: &password_hash,
			role: Role::Member,
			name: registration.name,
		})?;

		let member = self.member_repo.create(NewMember {
			user_id: user.id,
			nik: registration.nik,
			name: registration.name,
			birth_place: registration.birth_place,
			birth_date: registration.birth_date,
			gender: registration.gender,
			address: registration.address,
			phone: registration.phone,
			company: registration.company,
			work_unit: registration.work_unit,
			work_location: registration.work_location,
			position: registration.position,
			status: MemberStatus::Pending,
		})?;

		Ok((user, member))
	}

	/// Verify NPP and password; member accounts additionally need a
	/// confirmed membership status
	pub fn login(&self, npp: &str, password: &str) -> Result<Session> {
		let user = match self.user_repo.find(UserKey::Npp(npp)) {
			Ok(user) => user,
			Err(db::Error::RecordNotFound) => {
				return Err(Error::new(ErrorKind::InvalidCredentials));
			}
			Err(e) => return Err(e.into()),
		};

		if !bcrypt::verify(password, &user.password_hash)? {
			return Err(Error::new(ErrorKind::InvalidCredentials));
		}

		let member_id = match user.role {
			Role::Admin => None,
			Role::Member => {
				let member = self.member_repo.find_by_user_id(&user.id)?;
				if !member.status.allows_login() {
					return Err(Error::new(ErrorKind::MembershipInactive(member.status)));
				}
				Some(member.id)
			}
		};

		Ok(Session {
			user_id: user.id,
			member_id,
			role: user.role,
			name: user.name,
		})
	}

	/// Record the captured photo and signature and move the member to
	/// `verified`
	pub fn submit_verification(&self, member_id: &Id, photo_url: &str, signature_url: &str) -> Result<Member> {
		let member = self.member_repo.find_by_id(member_id)?;
		self.check_transition(&member, MemberStatus::Verified)?;

		self.member_repo.set_verification(member_id, photo_url, signature_url)?;
		self.member_repo.set_status(member_id, MemberStatus::Verified).map_err(Into::into)
	}

	/// Back-office confirmation of a verified member
	pub fn approve_member(&self, member_id: &Id) -> Result<Member> {
		let member = self.member_repo.find_by_id(member_id)?;
		self.check_transition(&member, MemberStatus::Approved)?;
		self.member_repo.set_status(member_id, MemberStatus::Approved).map_err(Into::into)
	}

	/// Activate an approved member, assigning the member number for the
	/// target month.
	///
	/// The transaction takes a per-period advisory lock before scanning for
	/// the highest sequence, so concurrent activations serialize and cannot
	/// issue the same number; the unique index on `members.member_number`
	/// remains as the backstop.
	pub fn activate_member(&self, member_id: &Id, month: u32, year: i32) -> Result<Member> {
		let member = self.member_repo.find_by_id(member_id)?;
		self.check_transition(&member, MemberStatus::Active)?;

		let conn = &mut self.db.get()?;
		conn.transaction::<Member, Error, _>(|conn| {
			let suffix = member::number_suffix(month, year);
			diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
				.bind::<BigInt, _>(member::sequence_lock_key(&suffix))
				.execute(conn)?;

			let existing: Vec<Option<String>> = members::table
				.filter(members::member_number.is_not_null())
				.select(members::member_number)
				.load(conn)?;
			let existing: Vec<String> = existing.into_iter().flatten().collect();

			let number = member::next_member_number(&existing, month, year);

			diesel::update(members::table.filter(members::id.eq(member_id)))
				.set((
					members::member_number.eq(&number),
					members::status.eq(MemberStatus::Active),
					members::join_date.eq(Utc::now().date_naive()),
				))
				.get_result(conn)
				.map_err(Into::into)
		})
	}

	/// Activate a batch of approved members, counting per-member outcomes
	pub fn bulk_confirm(&self, member_ids: &[Id], month: u32, year: i32) -> BulkSummary {
		let mut summary = BulkSummary::default();
		for member_id in member_ids {
			match self.activate_member(member_id, month, year) {
				Ok(_) => summary.succeeded += 1,
				Err(e) => {
					warn!("bulk confirm: member {}: {}", member_id, e);
					summary.failed += 1;
				}
			}
		}
		summary
	}

	/// Record a savings deposit for an active member
	pub fn record_deposit(
		&self,
		member_id: &Id,
		savings_type: SavingsType,
		amount: &BigDecimal,
		month: u32,
		year: i32,
	) -> Result<SavingsEntry> {
		let member = self.member_repo.find_by_id(member_id)?;
		if member.status != MemberStatus::Active {
			return Err(Error::new(ErrorKind::MembershipInactive(member.status)));
		}

		self.savings_repo.create(NewSavingsEntry {
			member_id,
			savings_type,
			direction: EntryDirection::Deposit,
			amount,
			period_month: month as i16,
			period_year: year as i16,
		}).map_err(Into::into)
	}

	/// Record a savings withdrawal, rejecting it when the type's net
	/// balance cannot cover the amount
	pub fn record_withdrawal(
		&self,
		member_id: &Id,
		savings_type: SavingsType,
		amount: &BigDecimal,
		month: u32,
		year: i32,
	) -> Result<SavingsEntry> {
		let entries = self.savings_repo.list_by_member_and_type(member_id, savings_type)?;
		let net: BigDecimal = entries.iter().map(|e| e.signed_amount()).sum();
		if net.lt(amount) {
			return Err(Error::new(ErrorKind::InadequateSavings(savings_type)));
		}

		self.savings_repo.create(NewSavingsEntry {
			member_id,
			savings_type,
			direction: EntryDirection::Withdrawal,
			amount,
			period_month: month as i16,
			period_year: year as i16,
		}).map_err(Into::into)
	}

	/// Net savings per type for a member
	pub fn savings_balance(&self, member_id: &Id) -> Result<HashMap<SavingsType, BigDecimal>> {
		let entries = self.savings_repo.list_by_member(member_id)?;
		Ok(savings::net_by_type(&entries))
	}

	/// Create a loan and its full installment schedule
	pub fn create_loan(
		&self,
		member_id: &Id,
		principal: &BigDecimal,
		tenor_months: i16,
		interest_type: InterestType,
		interest_rate_bps: i16,
		issue_date: Date,
	) -> Result<(Loan, Vec<Installment>)> {
		let member = self.member_repo.find_by_id(member_id)?;
		if member.status != MemberStatus::Active {
			return Err(Error::new(ErrorKind::MembershipInactive(member.status)));
		}

		let new_loan = self.loan_repo.create(NewLoan {
			member_id,
			principal,
			tenor_months,
			interest_type,
			interest_rate: interest_rate_bps,
			status: LoanStatus::Pending,
			issue_date,
		})?;

		let schedule = loan::build_schedule(principal, tenor_months, interest_type, interest_rate_bps, issue_date);
		let mut created = Vec::with_capacity(schedule.len());
		for scheduled in &schedule {
			let installment = self.installment_repo.create(NewInstallment {
				loan_id: &new_loan.id,
				period_index: scheduled.period_index,
				principal_due: &scheduled.principal_due,
				interest_due: &scheduled.interest_due,
				due_date: scheduled.due_date,
			})?;
			created.push(installment);
		}

		Ok((new_loan, created))
	}

	pub fn approve_loan(&self, loan_id: &Id) -> Result<Loan> {
		let open_loan = self.loan_repo.find_by_id(loan_id)?;
		if open_loan.status != LoanStatus::Pending {
			return Err(Error::new(ErrorKind::LoanNotOpen));
		}
		self.loan_repo.set_status(loan_id, LoanStatus::Active).map_err(Into::into)
	}

	pub fn cancel_loan(&self, loan_id: &Id) -> Result<Loan> {
		let open_loan = self.loan_repo.find_by_id(loan_id)?;
		if open_loan.status != LoanStatus::Pending {
			return Err(Error::new(ErrorKind::LoanNotOpen));
		}
		self.loan_repo.set_status(loan_id, LoanStatus::Cancelled).map_err(Into::into)
	}

	/// Pay one installment; the loan is marked paid once no unpaid
	/// installments remain
	pub fn pay_installment(&self, installment_id: &Id) -> Result<Installment> {
		let installment = self.installment_repo.find_by_id(installment_id)?;
		if installment.paid {
			return Err(Error::new(ErrorKind::InstallmentAlreadyPaid));
		}

		let open_loan = self.loan_repo.find_by_id(&installment.loan_id)?;
		if open_loan.status != LoanStatus::Active {
			return Err(Error::new(ErrorKind::LoanNotOpen));
		}

		let paid = self.installment_repo.mark_paid(installment_id, Utc::now())?;

		if self.installment_repo.unpaid_by_loan(&open_loan.id)?.is_empty() {
			self.loan_repo.set_status(&open_loan.id, LoanStatus::Paid)?;
		}

		Ok(paid)
	}

	/// Compute what a leaving member takes home: total savings minus the
	/// outstanding dues on open loans minus the administrative fee
	pub fn exit_realization(&self, member_id: &Id) -> Result<ExitRealization> {
		let entries = self.savings_repo.list_by_member(member_id)?;
		let nets = savings::net_by_type(&entries);
		let total_savings = savings::total(&entries);

		let mut outstanding_principal = BigDecimal::from(0);
		let mut outstanding_interest = BigDecimal::from(0);
		for open_loan in self.loan_repo.find_by_member(member_id)? {
			if open_loan.status != LoanStatus::Active {
				continue;
			}
			for unpaid in self.installment_repo.unpaid_by_loan(&open_loan.id)? {
				outstanding_principal += unpaid.principal_due;
				outstanding_interest += unpaid.interest_due;
			}
		}

		let admin_fee = BigDecimal::from(EXIT_ADMIN_FEE);
		let net_payout = net_payout(&total_savings, &outstanding_principal, &outstanding_interest, &admin_fee);

		Ok(ExitRealization {
			member_id: *member_id,
			savings: nets,
			total_savings,
			outstanding_principal,
			outstanding_interest,
			admin_fee,
			net_payout,
		})
	}

	/// Realize the exit: zero out each savings type with a withdrawal,
	/// settle open loans, and mark the member exited, in one transaction
	pub fn confirm_exit(&self, member_id: &Id, month: u32, year: i32) -> Result<ExitRealization> {
		let member = self.member_repo.find_by_id(member_id)?;
		self.check_transition(&member, MemberStatus::Exited)?;

		let realization = self.exit_realization(member_id)?;
		let member_loans = self.loan_repo.find_by_member(member_id)?;
		let now = Utc::now();

		let conn = &mut self.db.get()?;
		conn.transaction::<(), Error, _>(|conn| {
			for (savings_type, net) in &realization.savings {
				if !net.is_positive() {
					continue;
				}
				diesel::insert_into(savings_entries::table)
					.values(&NewSavingsEntry {
						member_id,
						savings_type: *savings_type,
						direction: EntryDirection::Withdrawal,
						amount: net,
						period_month: month as i16,
						period_year: year as i16,
					})
					.execute(conn)?;
			}

			for member_loan in &member_loans {
				match member_loan.status {
					LoanStatus::Active => {
						// dues are covered by the payout
						diesel::update(
							installments::table.filter(
								installments::loan_id.eq(member_loan.id)
									.and(installments::paid.eq(false)),
							),
						)
						.set((
							installments::paid.eq(true),
							installments::paid_at.eq(now),
						))
						.execute(conn)?;

						diesel::update(loans::table.filter(loans::id.eq(member_loan.id)))
							.set(loans::status.eq(LoanStatus::Paid))
							.execute(conn)?;
					}
					LoanStatus::Pending => {
						diesel::update(loans::table.filter(loans::id.eq(member_loan.id)))
							.set(loans::status.eq(LoanStatus::Cancelled))
							.execute(conn)?;
					}
					LoanStatus::Paid | LoanStatus::Cancelled => {}
				}
			}

			diesel::update(members::table.filter(members::id.eq(member_id)))
				.set(members::status.eq(MemberStatus::Exited))
				.execute(conn)?;

			Ok(())
		})?;

		Ok(realization)
	}

	/// Apply parsed spreadsheet rows: match each row to a member by NIK and
	/// insert the derived ledger records, one remote write per record.
	///
	/// There is no batch atomicity; the summary of per-row outcomes is the
	/// contract.
	pub fn apply_import(&self, rows: &[xlsx::ImportRow]) -> Result<ImportSummary> {
		let mut summary = ImportSummary::default();

		for row in rows {
			let member = match self.member_repo.find_by_nik(&row.nik) {
				Ok(member) => member,
				Err(db::Error::RecordNotFound) => {
					summary.unmatched += 1;
					continue;
				}
				Err(e) => return Err(e.into()),
			};
			summary.matched += 1;

			// the bulk path honors the same gate as record_deposit
			if member.status != MemberStatus::Active {
				warn!(
					"import: NIK {}: membership status '{}' does not permit ledger writes",
					row.nik, member.status,
				);
				summary.failed += 1;
				continue;
			}

			let mut row_failed = false;
			for (savings_type, amount) in row.deposits() {
				let created = self.savings_repo.create(NewSavingsEntry {
					member_id: &member.id,
					savings_type,
					direction: EntryDirection::Deposit,
					amount,
					period_month: row.month,
					period_year: row.year,
				});
				match created {
					Ok(_) => summary.entries_created += 1,
					Err(e) => {
						warn!("import: NIK {}: {}", row.nik, e);
						row_failed = true;
					}
				}
			}

			if row.installment.is_positive() {
				match self.pay_next_installment(&member.id, &row.installment) {
					Ok(Some(_)) => summary.entries_created += 1,
					Ok(None) => {
						warn!("import: NIK {}: no unpaid installment", row.nik);
						row_failed = true;
					}
					Err(e) => {
						warn!("import: NIK {}: {}", row.nik, e);
						row_failed = true;
					}
				}
			}

			if row_failed {
				summary.failed += 1;
			}
		}

		Ok(summary)
	}

	/// Savings report workbook: one row per member with net amounts per type
	pub fn savings_report(&self) -> Result<Vec<u8>> {
		let all_members = self.member_repo.list_all()?;
		let mut rows = Vec::with_capacity(all_members.len());

		for member in &all_members {
			let entries = self.savings_repo.list_by_member(&member.id)?;
			let nets = savings::net_by_type(&entries);
			rows.push(xlsx::ReportRow {
				member_number: member.member_number.clone().unwrap_or_default(),
				nik: member.nik.clone(),
				name: member.name.clone(),
				principal: nets[&SavingsType::Principal].clone(),
				mandatory: nets[&SavingsType::Mandatory].clone(),
				voluntary: nets[&SavingsType::Voluntary].clone(),
				total: savings::total(&entries),
			});
		}

		xlsx::write_savings_report(&rows)
	}

	/// Fixed-layout membership form for printing, with the stored photo
	/// and signature embedded when the caller supplies their bytes
	pub fn membership_form(
		&self,
		member_id: &Id,
		photo: Option<&[u8]>,
		signature: Option<&[u8]>,
	) -> Result<Vec<u8>> {
		let member = self.member_repo.find_by_id(member_id)?;
		pdf::membership_form(&member, photo, signature)
	}

	/// Allowed values for a reference-data category
	pub fn dropdown_values(&self, category: &str) -> Result<Vec<String>> {
		self.master_data_repo.values_for(category).map_err(Into::into)
	}

	fn check_transition(&self, member: &Member, to: MemberStatus) -> Result<()> {
		if !member.status.can_transition_to(to) {
			return Err(Error::new(ErrorKind::InvalidTransition { from: member.status, to }));
		}
		Ok(())
	}

	/// First unpaid installment on the member's first active loan, marked
	/// paid when `amount` settles it exactly; `None` when the member has
	/// nothing outstanding
	fn pay_next_installment(&self, member_id: &Id, amount: &BigDecimal) -> Result<Option<Installment>> {
		for member_loan in self.loan_repo.find_by_member(member_id)? {
			if member_loan.status != LoanStatus::Active {
				continue;
			}
			if let Some(unpaid) = self.installment_repo.unpaid_by_loan(&member_loan.id)?.into_iter().next() {
				let due = unpaid.total_due();
				if *amount != due {
					return Err(Error::new(ErrorKind::InstallmentAmountMismatch {
						due,
						supplied: amount.clone(),
					}));
				}
				return self.pay_installment(&unpaid.id).map(Some);
			}
		}
		Ok(None)
	}
}

/// What the member takes home: savings minus outstanding dues minus the fee
pub fn net_payout(
	total_savings: &BigDecimal,
	outstanding_principal: &BigDecimal,
	outstanding_interest: &BigDecimal,
	admin_fee: &BigDecimal,
) -> BigDecimal {
	total_savings - outstanding_principal - outstanding_interest - admin_fee
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn payout_deducts_dues_and_fee() {
		let payout = net_payout(
			&BigDecimal::from(2_025_000),
			&BigDecimal::from(1_000_000),
			&BigDecimal::from(120_000),
			&BigDecimal::from(EXIT_ADMIN_FEE),
		);
		assert_eq!(payout, BigDecimal::from(880_000));
	}

	#[test]
	fn payout_can_go_negative_when_dues_exceed_savings() {
		let payout = net_payout(
			&BigDecimal::from(50_000),
			&BigDecimal::from(100_000),
			&BigDecimal::from(0),
			&BigDecimal::from(EXIT_ADMIN_FEE),
		);
		assert_eq!(payout, BigDecimal::from(-75_000));
	}
}
