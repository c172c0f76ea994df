use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};

use interchange_model::{
    Calendar, CalendarDate, ExceptionType, GtfsDate, ServiceAvailability,
};

use crate::bank_holidays::{resolve_holiday_dates, Region};
use crate::error::ConvertError;
use crate::notice::{Notice, NoticeContainer};
use crate::txc::OperatingProfile;

/// Expand one operating profile into a calendar row plus dated exceptions
/// over the service window.
///
/// Profiles that cannot be expressed as weekday flags (holidays-only,
/// periodic weeks of the month) produce an all-false calendar and enumerate
/// their running days as type-1 exceptions instead.
pub(crate) fn expand_profile(
    service_id: &str,
    profile: &OperatingProfile,
    window: (NaiveDate, NaiveDate),
    region: Region,
    warnings: &mut NoticeContainer,
) -> Result<(Calendar, Vec<CalendarDate>), ConvertError> {
    let (start, end) = window;
    if start > end {
        return Err(ConvertError::Calendar {
            service_id: service_id.to_string(),
            reason: format!("window starts after it ends ({start} > {end})"),
        });
    }

    let enumerated = profile.holidays_only || !profile.periodic_weeks.is_empty();
    let weekday_flags = if enumerated {
        [false; 7]
    } else {
        profile.weekdays
    };

    let calendar = Calendar {
        service_id: service_id.to_string(),
        monday: ServiceAvailability::from_bool(weekday_flags[0]),
        tuesday: ServiceAvailability::from_bool(weekday_flags[1]),
        wednesday: ServiceAvailability::from_bool(weekday_flags[2]),
        thursday: ServiceAvailability::from_bool(weekday_flags[3]),
        friday: ServiceAvailability::from_bool(weekday_flags[4]),
        saturday: ServiceAvailability::from_bool(weekday_flags[5]),
        sunday: ServiceAvailability::from_bool(weekday_flags[6]),
        start_date: GtfsDate::from_naive_date(start),
        end_date: GtfsDate::from_naive_date(end),
    };

    // Later writers override earlier ones, so ordering encodes precedence:
    // additions first, removals last.
    let mut exceptions: BTreeMap<NaiveDate, ExceptionType> = BTreeMap::new();

    if !profile.periodic_weeks.is_empty() {
        for date in days_in_window(start, end) {
            let weekday_index = date.weekday().num_days_from_monday() as usize;
            if profile.weekdays[weekday_index]
                && profile.periodic_weeks.contains(&week_of_month(date))
            {
                exceptions.insert(date, ExceptionType::Added);
            }
        }
    }

    if profile.holidays_only && profile.bank_holiday_operation.is_empty() {
        if let Some(dates) = resolve_holiday_dates(region, "AllBankHolidays", start, end) {
            for date in dates {
                exceptions.insert(date, ExceptionType::Added);
            }
        }
    }

    for name in &profile.bank_holiday_operation {
        match resolve_holiday_dates(region, name, start, end) {
            Some(dates) => {
                for date in dates {
                    exceptions.insert(date, ExceptionType::Added);
                }
            }
            None => push_unknown_holiday(warnings, service_id, name),
        }
    }

    for range in &profile.special_operation {
        for date in days_in_window(range.start.max(start), range.end.min(end)) {
            exceptions.insert(date, ExceptionType::Added);
        }
    }

    for name in &profile.bank_holiday_non_operation {
        match resolve_holiday_dates(region, name, start, end) {
            Some(dates) => {
                for date in dates {
                    exceptions.insert(date, ExceptionType::Removed);
                }
            }
            None => push_unknown_holiday(warnings, service_id, name),
        }
    }

    for range in &profile.special_non_operation {
        for date in days_in_window(range.start.max(start), range.end.min(end)) {
            exceptions.insert(date, ExceptionType::Removed);
        }
    }

    // Only emit exceptions that change the base state.
    let calendar_dates = exceptions
        .into_iter()
        .filter(|(date, exception)| {
            let base_active = !enumerated
                && profile.weekdays[date.weekday().num_days_from_monday() as usize];
            match exception {
                ExceptionType::Added => !base_active,
                ExceptionType::Removed => base_active,
                ExceptionType::Other => false,
            }
        })
        .map(|(date, exception)| CalendarDate {
            service_id: service_id.to_string(),
            date: GtfsDate::from_naive_date(date),
            exception_type: exception,
        })
        .collect();

    Ok((calendar, calendar_dates))
}

fn push_unknown_holiday(warnings: &mut NoticeContainer, service_id: &str, name: &str) {
    warnings.push(
        Notice::warning("txc_unknown_bank_holiday", "unrecognized bank holiday name")
            .with_context_field("serviceId", service_id)
            .with_context_field("holiday", name),
    );
}

fn days_in_window(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let mut current = Some(start);
    std::iter::from_fn(move || {
        let date = current?;
        if date > end {
            return None;
        }
        current = date.checked_add_days(Days::new(1));
        Some(date)
    })
}

/// 1-based week-of-month: days 1-7 are week 1.
fn week_of_month(date: NaiveDate) -> u8 {
    ((date.day() - 1) / 7 + 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txc::DateRange;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn window() -> (NaiveDate, NaiveDate) {
        (date(2025, 1, 1), date(2025, 12, 31))
    }

    fn weekday_profile() -> OperatingProfile {
        OperatingProfile {
            weekdays: [true, true, true, true, true, false, false],
            ..Default::default()
        }
    }

    #[test]
    fn weekday_profile_sets_flags_and_window() {
        let mut warnings = NoticeContainer::new();
        let (calendar, dates) = expand_profile(
            "svc_1",
            &weekday_profile(),
            window(),
            Region::England,
            &mut warnings,
        )
        .unwrap();

        assert!(calendar.monday.is_available());
        assert!(!calendar.saturday.is_available());
        assert_eq!(calendar.start_date.to_string(), "20250101");
        assert_eq!(calendar.end_date.to_string(), "20251231");
        assert!(dates.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn bank_holiday_non_operation_removes_weekday_holidays() {
        let mut profile = weekday_profile();
        profile.bank_holiday_non_operation =
            vec!["GoodFriday".into(), "ChristmasDay".into()];
        let mut warnings = NoticeContainer::new();
        let (_, dates) = expand_profile(
            "svc_1",
            &profile,
            window(),
            Region::England,
            &mut warnings,
        )
        .unwrap();

        // Good Friday 2025-04-18 and Christmas Day 2025-12-25 are weekdays,
        // so both are removed.
        assert_eq!(dates.len(), 2);
        assert!(dates
            .iter()
            .all(|d| d.exception_type == ExceptionType::Removed));
        assert_eq!(dates[0].date.to_string(), "20250418");
        assert_eq!(dates[1].date.to_string(), "20251225");
    }

    #[test]
    fn bank_holiday_operation_adds_only_base_inactive_days() {
        let mut profile = weekday_profile();
        // Easter Monday is already a Monday; adding it is a no-op.
        profile.bank_holiday_operation = vec!["EasterMonday".into()];
        let mut warnings = NoticeContainer::new();
        let (_, dates) = expand_profile(
            "svc_1",
            &profile,
            window(),
            Region::England,
            &mut warnings,
        )
        .unwrap();
        assert!(dates.is_empty());
    }

    #[test]
    fn unknown_holiday_name_warns() {
        let mut profile = weekday_profile();
        profile.bank_holiday_operation = vec!["FeastOfMaximumOccupancy".into()];
        let mut warnings = NoticeContainer::new();
        let (_, dates) = expand_profile(
            "svc_1",
            &profile,
            window(),
            Region::England,
            &mut warnings,
        )
        .unwrap();
        assert!(dates.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings.iter().next().unwrap().code,
            "txc_unknown_bank_holiday"
        );
    }

    #[test]
    fn special_days_clip_to_the_window() {
        let mut profile = weekday_profile();
        profile.special_non_operation = vec![DateRange {
            start: date(2024, 12, 29),
            end: date(2025, 1, 3),
        }];
        let mut warnings = NoticeContainer::new();
        let (_, dates) = expand_profile(
            "svc_1",
            &profile,
            window(),
            Region::England,
            &mut warnings,
        )
        .unwrap();

        // 2025-01-01 Wed, 01-02 Thu, 01-03 Fri are in-window weekdays.
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[0].date.to_string(), "20250101");
        assert_eq!(dates[2].date.to_string(), "20250103");
    }

    #[test]
    fn periodic_weeks_enumerate_exceptions() {
        let profile = OperatingProfile {
            weekdays: [false, false, false, false, false, true, false],
            periodic_weeks: vec![1],
            ..Default::default()
        };
        let mut warnings = NoticeContainer::new();
        let (calendar, dates) = expand_profile(
            "svc_1",
            &profile,
            (date(2025, 7, 1), date(2025, 8, 31)),
            Region::England,
            &mut warnings,
        )
        .unwrap();

        // First-Saturday-of-month service: all-false flags, dated additions.
        assert!(!calendar.saturday.is_available());
        let added: Vec<String> = dates.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(added, vec!["20250705", "20250802"]);
    }

    #[test]
    fn inverted_window_is_a_calendar_error() {
        let mut warnings = NoticeContainer::new();
        let result = expand_profile(
            "svc_1",
            &weekday_profile(),
            (date(2025, 6, 1), date(2025, 1, 1)),
            Region::England,
            &mut warnings,
        );
        assert!(matches!(result, Err(ConvertError::Calendar { .. })));
    }
}
