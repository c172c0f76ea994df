use std::sync::{Arc, OnceLock};

use chrono::{Datelike, Days, NaiveDate, Weekday};
use dashmap::DashMap;

/// UK nation whose holiday table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Region {
    #[default]
    England,
    Scotland,
    Wales,
    NorthernIreland,
}

/// Named holidays, matching the symbolic element names TransXChange uses in
/// BankHolidayOperation. The `*Holiday` variants are the displaced observance
/// days and are only emitted in years where displacement happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankHoliday {
    NewYearsDay,
    Jan2ndScotland,
    StPatricksDay,
    GoodFriday,
    EasterMonday,
    MayDay,
    SpringBank,
    BattleOfTheBoyne,
    AugustBankHolidayScotland,
    LateSummerBankHolidayNotScotland,
    StAndrewsDay,
    ChristmasEve,
    ChristmasDay,
    BoxingDay,
    NewYearsEve,
    NewYearsDayHoliday,
    Jan2ndScotlandHoliday,
    StAndrewsDayHoliday,
    ChristmasDayHoliday,
    BoxingDayHoliday,
}

impl BankHoliday {
    fn is_displacement(self) -> bool {
        matches!(
            self,
            BankHoliday::NewYearsDayHoliday
                | BankHoliday::Jan2ndScotlandHoliday
                | BankHoliday::StAndrewsDayHoliday
                | BankHoliday::ChristmasDayHoliday
                | BankHoliday::BoxingDayHoliday
        )
    }

    fn is_christmas_period(self) -> bool {
        matches!(
            self,
            BankHoliday::ChristmasEve
                | BankHoliday::ChristmasDay
                | BankHoliday::BoxingDay
                | BankHoliday::ChristmasDayHoliday
                | BankHoliday::BoxingDayHoliday
                | BankHoliday::NewYearsEve
        )
    }

    fn is_operational_day(self) -> bool {
        // Not statutory holidays; TXC names them for early-run-off timetables.
        matches!(self, BankHoliday::ChristmasEve | BankHoliday::NewYearsEve)
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn next_free(start: NaiveDate, blocked: &[NaiveDate]) -> NaiveDate {
    let mut date = start;
    while is_weekend(date) || blocked.contains(&date) {
        date = date + Days::new(1);
    }
    date
}

/// Anonymous Gregorian (Meeus) Easter computation.
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

fn weekday_of_month(year: i32, month: u32, weekday: Weekday, from_end: bool) -> Option<NaiveDate> {
    if from_end {
        let last = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?.pred_opt()?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()?
        };
        let mut date = last;
        while date.weekday() != weekday {
            date = date.pred_opt()?;
        }
        Some(date)
    } else {
        let mut date = NaiveDate::from_ymd_opt(year, month, 1)?;
        while date.weekday() != weekday {
            date = date.succ_opt()?;
        }
        Some(date)
    }
}

fn compute_year(region: Region, year: i32) -> Vec<(BankHoliday, NaiveDate)> {
    let mut holidays: Vec<(BankHoliday, NaiveDate)> = Vec::new();
    let mut push = |holiday: BankHoliday, date: Option<NaiveDate>| {
        if let Some(date) = date {
            holidays.push((holiday, date));
        }
    };

    let jan_1 = NaiveDate::from_ymd_opt(year, 1, 1);
    let jan_2 = NaiveDate::from_ymd_opt(year, 1, 2);
    push(BankHoliday::NewYearsDay, jan_1);
    if region == Region::Scotland {
        push(BankHoliday::Jan2ndScotland, jan_2);
        if let (Some(first), Some(second)) = (jan_1, jan_2) {
            let observed_first = next_free(first, &[second]);
            let observed_second = next_free(second, &[first, observed_first]);
            if observed_first != first {
                push(BankHoliday::NewYearsDayHoliday, Some(observed_first));
            }
            if observed_second != second {
                push(BankHoliday::Jan2ndScotlandHoliday, Some(observed_second));
            }
        }
    } else if let Some(first) = jan_1 {
        let observed = next_free(first, &[]);
        if observed != first {
            push(BankHoliday::NewYearsDayHoliday, Some(observed));
        }
    }

    if region == Region::NorthernIreland {
        push(BankHoliday::StPatricksDay, NaiveDate::from_ymd_opt(year, 3, 17));
    }

    if let Some(easter) = easter_sunday(year) {
        push(BankHoliday::GoodFriday, easter.checked_sub_days(Days::new(2)));
        if region != Region::Scotland {
            push(BankHoliday::EasterMonday, easter.checked_add_days(Days::new(1)));
        }
    }

    push(
        BankHoliday::MayDay,
        weekday_of_month(year, 5, Weekday::Mon, false),
    );
    push(
        BankHoliday::SpringBank,
        weekday_of_month(year, 5, Weekday::Mon, true),
    );

    if region == Region::NorthernIreland {
        push(BankHoliday::BattleOfTheBoyne, NaiveDate::from_ymd_opt(year, 7, 12));
    }

    if region == Region::Scotland {
        push(
            BankHoliday::AugustBankHolidayScotland,
            weekday_of_month(year, 8, Weekday::Mon, false),
        );
        let st_andrews = NaiveDate::from_ymd_opt(year, 11, 30);
        push(BankHoliday::StAndrewsDay, st_andrews);
        if let Some(date) = st_andrews {
            let observed = next_free(date, &[]);
            if observed != date {
                push(BankHoliday::StAndrewsDayHoliday, Some(observed));
            }
        }
    } else {
        push(
            BankHoliday::LateSummerBankHolidayNotScotland,
            weekday_of_month(year, 8, Weekday::Mon, true),
        );
    }

    push(BankHoliday::ChristmasEve, NaiveDate::from_ymd_opt(year, 12, 24));
    let christmas = NaiveDate::from_ymd_opt(year, 12, 25);
    let boxing = NaiveDate::from_ymd_opt(year, 12, 26);
    push(BankHoliday::ChristmasDay, christmas);
    push(BankHoliday::BoxingDay, boxing);
    if let (Some(first), Some(second)) = (christmas, boxing) {
        let observed_first = next_free(first, &[second]);
        let observed_second = next_free(second, &[first, observed_first]);
        if observed_first != first {
            push(BankHoliday::ChristmasDayHoliday, Some(observed_first));
        }
        if observed_second != second {
            push(BankHoliday::BoxingDayHoliday, Some(observed_second));
        }
    }
    push(BankHoliday::NewYearsEve, NaiveDate::from_ymd_opt(year, 12, 31));

    holidays
}

type HolidayCache = DashMap<(Region, i32), Arc<Vec<(BankHoliday, NaiveDate)>>>;

static CACHE: OnceLock<HolidayCache> = OnceLock::new();

/// The holiday table for one region-year, computed once per process.
pub fn holidays_for_year(region: Region, year: i32) -> Arc<Vec<(BankHoliday, NaiveDate)>> {
    let cache = CACHE.get_or_init(DashMap::new);
    if let Some(hit) = cache.get(&(region, year)) {
        return hit.clone();
    }
    let computed = Arc::new(compute_year(region, year));
    cache.insert((region, year), computed.clone());
    computed
}

enum Selector {
    One(BankHoliday),
    Group(fn(BankHoliday) -> bool),
}

fn selector_for(name: &str) -> Option<Selector> {
    let holiday = match name {
        "NewYearsDay" => Some(BankHoliday::NewYearsDay),
        "Jan2ndScotland" => Some(BankHoliday::Jan2ndScotland),
        "StPatricksDay" => Some(BankHoliday::StPatricksDay),
        "GoodFriday" => Some(BankHoliday::GoodFriday),
        "EasterMonday" => Some(BankHoliday::EasterMonday),
        "MayDay" => Some(BankHoliday::MayDay),
        "SpringBank" => Some(BankHoliday::SpringBank),
        "BattleOfTheBoyne" => Some(BankHoliday::BattleOfTheBoyne),
        "AugustBankHolidayScotland" => Some(BankHoliday::AugustBankHolidayScotland),
        "LateSummerBankHolidayNotScotland" => {
            Some(BankHoliday::LateSummerBankHolidayNotScotland)
        }
        "StAndrewsDay" => Some(BankHoliday::StAndrewsDay),
        "ChristmasEve" => Some(BankHoliday::ChristmasEve),
        "ChristmasDay" => Some(BankHoliday::ChristmasDay),
        "BoxingDay" => Some(BankHoliday::BoxingDay),
        "NewYearsEve" => Some(BankHoliday::NewYearsEve),
        "NewYearsDayHoliday" => Some(BankHoliday::NewYearsDayHoliday),
        "Jan2ndScotlandHoliday" => Some(BankHoliday::Jan2ndScotlandHoliday),
        "StAndrewsDayHoliday" => Some(BankHoliday::StAndrewsDayHoliday),
        "ChristmasDayHoliday" => Some(BankHoliday::ChristmasDayHoliday),
        "BoxingDayHoliday" => Some(BankHoliday::BoxingDayHoliday),
        _ => None,
    };
    if let Some(holiday) = holiday {
        return Some(Selector::One(holiday));
    }
    match name {
        "AllBankHolidays" => Some(Selector::Group(|h| !h.is_operational_day())),
        "AllHolidaysExceptChristmas" => {
            Some(Selector::Group(|h| !h.is_christmas_period()))
        }
        "Christmas" => Some(Selector::Group(|h| {
            matches!(h, BankHoliday::ChristmasDay | BankHoliday::BoxingDay)
        })),
        "DisplacementHolidays" => Some(Selector::Group(BankHoliday::is_displacement)),
        "HolidayMondays" => Some(Selector::Group(|h| {
            matches!(
                h,
                BankHoliday::EasterMonday
                    | BankHoliday::MayDay
                    | BankHoliday::SpringBank
                    | BankHoliday::AugustBankHolidayScotland
                    | BankHoliday::LateSummerBankHolidayNotScotland
            )
        })),
        "EarlyRunOff" => Some(Selector::Group(BankHoliday::is_operational_day)),
        _ => None,
    }
}

/// Concrete dates for a symbolic TXC holiday name within a window.
/// `None` means the name is unknown.
pub fn resolve_holiday_dates(
    region: Region,
    name: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<Vec<NaiveDate>> {
    let selector = selector_for(name)?;
    let mut dates = Vec::new();
    for year in start.year()..=end.year() {
        for &(holiday, date) in holidays_for_year(region, year).iter() {
            let keep = match &selector {
                Selector::One(wanted) => holiday == *wanted,
                Selector::Group(predicate) => predicate(holiday),
            };
            if keep && date >= start && date <= end {
                dates.push(date);
            }
        }
    }
    dates.sort_unstable();
    dates.dedup();
    Some(dates)
}
