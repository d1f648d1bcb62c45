use std::fmt;

use bigdecimal::BigDecimal;
use diesel::r2d2::PoolError;

use crate::db;
use crate::member::MemberStatus;
use crate::savings::SavingsType;

/// An error that can occur when performing a cooperative operation
#[derive(Debug)]
pub struct Error {
	kind: ErrorKind,
}

impl Error {
	pub fn new(kind: ErrorKind) -> Error {
		Error { kind }
	}

	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}
}

/// The kind of an error that can occur.
#[derive(Debug)]
pub enum ErrorKind {
	Database(db::Error),
	/// Unknown NPP or wrong password
	InvalidCredentials,
	/// The member's status does not permit the operation
	MembershipInactive(MemberStatus),
	InvalidTransition { from: MemberStatus, to: MemberStatus },
	/// A withdrawal would drive the savings type negative
	InadequateSavings(SavingsType),
	/// The loan's status does not permit the operation
	LoanNotOpen,
	InstallmentAlreadyPaid,
	/// A payment does not settle the installment's due exactly
	InstallmentAmountMismatch { due: BigDecimal, supplied: BigDecimal },
	Workbook(String),
	Pdf(String),
	Password(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.kind {
			ErrorKind::Database(e) => write!(f, "db error: {}", e),
			ErrorKind::InvalidCredentials => write!(f, "invalid NPP or password"),
			ErrorKind::MembershipInactive(status) => {
				write!(f, "membership status '{}' does not permit this operation", status)
			}
			ErrorKind::InvalidTransition { from, to } => {
				write!(f, "illegal status transition: {} -> {}", from, to)
			}
			ErrorKind::InadequateSavings(savings_type) => {
				write!(f, "not enough {} savings for the withdrawal", savings_type)
			}
			ErrorKind::LoanNotOpen => write!(f, "loan status does not permit this operation"),
			ErrorKind::InstallmentAlreadyPaid => write!(f, "installment has already been paid"),
			ErrorKind::InstallmentAmountMismatch { due, supplied } => {
				write!(f, "payment of {} does not settle the installment due of {}", supplied, due)
			}
			ErrorKind::Workbook(msg) => write!(f, "workbook error: {}", msg),
			ErrorKind::Pdf(msg) => write!(f, "pdf error: {}", msg),
			ErrorKind::Password(msg) => write!(f, "password error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<db::Error> for Error {
	fn from(e: db::Error) -> Self {
		Error::new(ErrorKind::Database(e))
	}
}

impl From<PoolError> for Error {
	fn from(e: PoolError) -> Self {
		Error::new(ErrorKind::Database(db::Error::from(e)))
	}
}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		Error::new(ErrorKind::Database(db::Error::from(e)))
	}
}

impl From<bcrypt::BcryptError> for Error {
	fn from(e: bcrypt::BcryptError) -> Self {
		Error::new(ErrorKind::Password(e.to_string()))
	}
}
