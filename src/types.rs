use chrono::{DateTime, Datelike, NaiveDate, Utc};

pub type Id = uuid::Uuid;
pub type Time = DateTime<Utc>;
pub type Date = NaiveDate;

pub trait DateExt {
	fn add_months(&self, num_months: u32) -> Date;
}

impl DateExt for Date {
	fn add_months(&self, num_months: u32) -> Date {
		let zero_based = self.month0() + num_months;
		let year = self.year() + (zero_based / 12) as i32;
		let month = zero_based % 12 + 1;

		// clamp the day to the length of the target month
		NaiveDate::from_ymd_opt(year, month, self.day())
			.or_else(|| {
				(28..self.day())
					.rev()
					.find_map(|day| NaiveDate::from_ymd_opt(year, month, day))
			})
			.unwrap_or(*self)
	}
}
