use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;

use bigdecimal::{BigDecimal, FromPrimitive, Signed, ToPrimitive, Zero};
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;

use crate::koperasi::error::{Error, ErrorKind};
use crate::savings::SavingsType;

/// Canonical header row of the bulk-import template.
///
/// Column order is the contract: importers fill the template, exporters
/// and the parser agree on these positions.
pub const TEMPLATE_HEADERS: [&str; 8] = [
	"NIK",
	"Nama",
	"Simpanan Pokok",
	"Simpanan Wajib",
	"Simpanan Sukarela",
	"Angsuran",
	"Bulan",
	"Tahun",
];

/// One data row of an uploaded workbook, mapped by column position
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
	pub nik: String,
	pub name: String,
	pub principal: BigDecimal,
	pub mandatory: BigDecimal,
	pub voluntary: BigDecimal,
	pub installment: BigDecimal,
	pub month: i16,
	pub year: i16,
}

impl ImportRow {
	/// The non-empty savings amounts this row deposits
	pub fn deposits(&self) -> Vec<(SavingsType, &BigDecimal)> {
		[
			(SavingsType::Principal, &self.principal),
			(SavingsType::Mandatory, &self.mandatory),
			(SavingsType::Voluntary, &self.voluntary),
		]
		.into_iter()
		.filter(|(_, amount)| amount.is_positive())
		.collect()
	}
}

/// Rows split by whether their NIK matches a known member
#[derive(Debug, Default)]
pub struct ImportPlan<'a> {
	pub matched: Vec<&'a ImportRow>,
	pub unmatched: Vec<&'a ImportRow>,
}

/// Match rows against the set of known NIKs by string equality
pub fn reconcile<'a>(rows: &'a [ImportRow], known_niks: &HashSet<String>) -> ImportPlan<'a> {
	let mut plan = ImportPlan::default();
	for row in rows {
		if known_niks.contains(&row.nik) {
			plan.matched.push(row);
		} else {
			plan.unmatched.push(row);
		}
	}
	plan
}

/// Parse the first worksheet of an uploaded `.xlsx` buffer into rows.
///
/// The first row is assumed to be the header and skipped; rows with an
/// empty NIK cell are dropped.
pub fn parse_workbook(bytes: &[u8]) -> Result<Vec<ImportRow>, Error> {
	let mut workbook = Xlsx::new(Cursor::new(bytes)).map_err(workbook_err)?;
	let range = workbook
		.worksheet_range_at(0)
		.ok_or_else(|| workbook_err("workbook has no worksheets"))?
		.map_err(workbook_err)?;

	let mut rows = Vec::new();
	for row in range.rows().skip(1) {
		let cell = |idx: usize| row.get(idx).unwrap_or(&Data::Empty);

		let nik = cell_string(cell(0));
		if nik.is_empty() {
			continue;
		}

		rows.push(ImportRow {
			nik,
			name: cell_string(cell(1)),
			principal: cell_decimal(cell(2)),
			mandatory: cell_decimal(cell(3)),
			voluntary: cell_decimal(cell(4)),
			installment: cell_decimal(cell(5)),
			month: cell_int(cell(6)),
			year: cell_int(cell(7)),
		});
	}

	Ok(rows)
}

/// Empty import template with the canonical header row
pub fn write_template() -> Result<Vec<u8>, Error> {
	let mut workbook = Workbook::new();
	let worksheet = workbook.add_worksheet();
	worksheet.set_name("Simpanan").map_err(workbook_err)?;

	for (col, header) in TEMPLATE_HEADERS.iter().enumerate() {
		worksheet
			.write_string(0, col as u16, *header)
			.map_err(workbook_err)?;
	}

	workbook.save_to_buffer().map_err(workbook_err)
}

/// One row of the savings report workbook
#[derive(Debug)]
pub struct ReportRow {
	pub member_number: String,
	pub nik: String,
	pub name: String,
	pub principal: BigDecimal,
	pub mandatory: BigDecimal,
	pub voluntary: BigDecimal,
	pub total: BigDecimal,
}

/// Savings report: one row per member with net amounts per type
pub fn write_savings_report(rows: &[ReportRow]) -> Result<Vec<u8>, Error> {
	let mut workbook = Workbook::new();
	let worksheet = workbook.add_worksheet();
	worksheet.set_name("Laporan Simpanan").map_err(workbook_err)?;

	let headers = [
		"No. Anggota",
		"NIK",
		"Nama",
		"Simpanan Pokok",
		"Simpanan Wajib",
		"Simpanan Sukarela",
		"Total",
	];
	for (col, header) in headers.iter().enumerate() {
		worksheet
			.write_string(0, col as u16, *header)
			.map_err(workbook_err)?;
	}

	for (idx, report_row) in rows.iter().enumerate() {
		let row = (idx + 1) as u32;
		worksheet.write_string(row, 0, &report_row.member_number).map_err(workbook_err)?;
		worksheet.write_string(row, 1, &report_row.nik).map_err(workbook_err)?;
		worksheet.write_string(row, 2, &report_row.name).map_err(workbook_err)?;
		worksheet.write_number(row, 3, decimal_cell(&report_row.principal)).map_err(workbook_err)?;
		worksheet.write_number(row, 4, decimal_cell(&report_row.mandatory)).map_err(workbook_err)?;
		worksheet.write_number(row, 5, decimal_cell(&report_row.voluntary)).map_err(workbook_err)?;
		worksheet.write_number(row, 6, decimal_cell(&report_row.total)).map_err(workbook_err)?;
	}

	workbook.save_to_buffer().map_err(workbook_err)
}

fn workbook_err<E: fmt::Display>(e: E) -> Error {
	Error::new(ErrorKind::Workbook(e.to_string()))
}

fn decimal_cell(amount: &BigDecimal) -> f64 {
	amount.to_f64().unwrap_or(0.0)
}

fn cell_string(cell: &Data) -> String {
	match cell {
		Data::String(s) => s.trim().to_string(),
		// identity numbers come back as floats when Excel types the column
		Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
		Data::Float(f) => f.to_string(),
		Data::Int(i) => i.to_string(),
		_ => String::new(),
	}
}

fn cell_decimal(cell: &Data) -> BigDecimal {
	match cell {
		Data::Float(f) => BigDecimal::from_f64(*f).unwrap_or_else(BigDecimal::zero),
		Data::Int(i) => BigDecimal::from(*i),
		Data::String(s) => s.trim().parse().unwrap_or_else(|_| BigDecimal::zero()),
		_ => BigDecimal::zero(),
	}
}

fn cell_int(cell: &Data) -> i16 {
	match cell {
		Data::Float(f) => *f as i16,
		Data::Int(i) => *i as i16,
		Data::String(s) => s.trim().parse().unwrap_or(0),
		_ => 0,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn filled_template() -> Vec<u8> {
		let mut workbook = Workbook::new();
		let worksheet = workbook.add_worksheet();
		for (col, header) in TEMPLATE_HEADERS.iter().enumerate() {
			worksheet.write_string(0, col as u16, *header).unwrap();
		}

		worksheet.write_string(1, 0, "3201234567890001").unwrap();
		worksheet.write_string(1, 1, "Budi Santoso").unwrap();
		worksheet.write_number(1, 2, 25_000.0).unwrap();
		worksheet.write_number(1, 3, 100_000.0).unwrap();
		worksheet.write_number(1, 4, 0.0).unwrap();
		worksheet.write_number(1, 5, 150_000.0).unwrap();
		worksheet.write_number(1, 6, 8.0).unwrap();
		worksheet.write_number(1, 7, 2026.0).unwrap();

		// second row with an empty NIK is dropped by the parser
		worksheet.write_string(2, 1, "Tanpa NIK").unwrap();

		workbook.save_to_buffer().unwrap()
	}

	#[test]
	fn round_trip_maps_every_filled_cell() {
		let rows = parse_workbook(&filled_template()).unwrap();

		assert_eq!(rows.len(), 1);
		let row = &rows[0];
		assert_eq!(row.nik, "3201234567890001");
		assert_eq!(row.name, "Budi Santoso");
		assert_eq!(row.principal, BigDecimal::from(25_000));
		assert_eq!(row.mandatory, BigDecimal::from(100_000));
		assert_eq!(row.voluntary, BigDecimal::zero());
		assert_eq!(row.installment, BigDecimal::from(150_000));
		assert_eq!(row.month, 8);
		assert_eq!(row.year, 2026);
	}

	#[test]
	fn template_parses_back_empty() {
		let template = write_template().unwrap();
		let rows = parse_workbook(&template).unwrap();
		assert!(rows.is_empty());
	}

	#[test]
	fn reconcile_splits_on_nik_equality() {
		let rows = parse_workbook(&filled_template()).unwrap();
		let mut known = HashSet::new();
		known.insert("3201234567890001".to_string());

		let plan = reconcile(&rows, &known);
		assert_eq!(plan.matched.len(), 1);
		assert!(plan.unmatched.is_empty());

		let plan = reconcile(&rows, &HashSet::new());
		assert!(plan.matched.is_empty());
		assert_eq!(plan.unmatched.len(), 1);
	}

	#[test]
	fn deposits_skips_empty_amounts() {
		let rows = parse_workbook(&filled_template()).unwrap();
		let deposits = rows[0].deposits();

		let types: Vec<SavingsType> = deposits.iter().map(|(t, _)| *t).collect();
		assert_eq!(types, vec![SavingsType::Principal, SavingsType::Mandatory]);
	}

	#[test]
	fn numeric_nik_cells_become_strings() {
		assert_eq!(cell_string(&Data::Float(1234.0)), "1234");
		assert_eq!(cell_string(&Data::String(" 99 ".to_string())), "99");
		assert_eq!(cell_string(&Data::Empty), "");
	}

	#[test]
	fn garbage_bytes_are_a_workbook_error() {
		let err = parse_workbook(b"not a zip archive").unwrap_err();
		assert!(matches!(err.kind(), ErrorKind::Workbook(_)));
	}
}
