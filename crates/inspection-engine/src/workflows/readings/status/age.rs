use chrono::NaiveDate;

const DAYS_PER_YEAR: i64 = 365;

/// Whole elapsed years between the date code and the evaluation date.
///
/// Uses `floor(days / 365)` rather than calendar years; a date code in the future yields zero.
pub fn age_in_years(date_code: NaiveDate, evaluated_on: NaiveDate) -> u32 {
    let days = evaluated_on.signed_duration_since(date_code).num_days();
    if days <= 0 {
        return 0;
    }
    u32::try_from(days / DAYS_PER_YEAR).unwrap_or(u32::MAX)
}
