//! Date constructor and Date.prototype
//!
//! Times are milliseconds since the epoch. The engine has no time zone
//! database, so local time is UTC and the local and UTC getters agree.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::builtins::RealmBuilder;
use crate::runtime::{ClassId, ErrorKind, JSObject, JSValue, JsResult, NativeCall, NativeFn, ObjectData};
use crate::vm::{Hint, Interpreter};

const MS_PER_DAY: f64 = 86_400_000.0;
const MAX_TIME: f64 = 8.64e15;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.date_prototype;
    let ctor = b.constructor("Date", 7, date_constructor, proto);
    b.method(ctor, "now", 0, date_now);
    b.method(ctor, "UTC", 7, date_utc);
    b.method(ctor, "parse", 1, date_parse);

    b.method(proto, "getTime", 0, date_get_time);
    b.method(proto, "valueOf", 0, date_get_time);
    b.method(proto, "getTimezoneOffset", 0, date_get_timezone_offset);
    for (name, func) in [
        ("FullYear", date_get_full_year as NativeFn),
        ("Month", date_get_month),
        ("Date", date_get_date),
        ("Day", date_get_day),
        ("Hours", date_get_hours),
        ("Minutes", date_get_minutes),
        ("Seconds", date_get_seconds),
        ("Milliseconds", date_get_milliseconds),
    ] {
        b.method(proto, &format!("get{}", name), 0, func);
        b.method(proto, &format!("getUTC{}", name), 0, func);
    }
    b.method(proto, "setTime", 1, date_set_time);
    b.method(proto, "toISOString", 0, date_to_iso_string);
    b.method(proto, "toString", 0, date_to_string);
    b.method(proto, "toUTCString", 0, date_to_utc_string);
    b.method(proto, "toJSON", 1, date_to_json);
}

// =============================================================================
// Calendar arithmetic
// =============================================================================

/// Days since 1970-01-01 for a proleptic Gregorian date (month 1-12)
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`]
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Broken-down UTC time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fields {
    year: i64,
    /// Zero-based, as scripts see it
    month: i64,
    day: i64,
    weekday: i64,
    hours: i64,
    minutes: i64,
    seconds: i64,
    millis: i64,
}

fn fields(t: f64) -> Fields {
    let t = t as i64;
    let days = t.div_euclid(MS_PER_DAY as i64);
    let ms_in_day = t.rem_euclid(MS_PER_DAY as i64);
    let (year, month, day) = civil_from_days(days);
    Fields {
        year,
        month: month - 1,
        day,
        weekday: (days + 4).rem_euclid(7),
        hours: ms_in_day / 3_600_000,
        minutes: ms_in_day / 60_000 % 60,
        seconds: ms_in_day / 1000 % 60,
        millis: ms_in_day % 1000,
    }
}

/// Time value from components; month is zero-based and may overflow
fn make_time(year: f64, month: f64, day: f64, hours: f64, minutes: f64, seconds: f64, millis: f64) -> f64 {
    let parts = [year, month, day, hours, minutes, seconds, millis];
    if parts.iter().any(|p| !p.is_finite()) {
        return f64::NAN;
    }
    let year = year.trunc() + (month.trunc() / 12.0).floor();
    let month = month.trunc().rem_euclid(12.0);
    if year.abs() > 400_000.0 {
        return f64::NAN;
    }
    let days = days_from_civil(year as i64, month as i64 + 1, 1) as f64 + day.trunc() - 1.0;
    let time = hours.trunc() * 3_600_000.0 + minutes.trunc() * 60_000.0 + seconds.trunc() * 1000.0 + millis.trunc();
    time_clip(days * MS_PER_DAY + time)
}

fn time_clip(t: f64) -> f64 {
    if !t.is_finite() || t.abs() > MAX_TIME {
        return f64::NAN;
    }
    t.trunc() + 0.0
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_millis() as f64)
}

// =============================================================================
// Parsing and formatting
// =============================================================================

/// Parse the ISO 8601 subset `Date.prototype.toISOString` produces
fn parse_iso(s: &str) -> f64 {
    fn number(s: &str, len: usize) -> Option<(f64, &str)> {
        let digits = s.get(..len)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((digits.parse().ok()?, &s[len..]))
    }

    let parse = || -> Option<f64> {
        let s = s.trim();
        let (sign, rest) = match s.as_bytes().first()? {
            b'+' => (1.0, &s[1..]),
            b'-' => (-1.0, &s[1..]),
            _ => (1.0, s),
        };
        let year_len = if sign == 1.0 && !s.starts_with('+') { 4 } else { 6 };
        let (year, mut rest) = number(rest, year_len)?;
        let year = sign * year;
        let mut month = 1.0;
        let mut day = 1.0;
        if let Some(r) = rest.strip_prefix('-') {
            (month, rest) = number(r, 2)?;
            if let Some(r) = rest.strip_prefix('-') {
                (day, rest) = number(r, 2)?;
            }
        }
        let (mut hours, mut minutes, mut seconds, mut millis) = (0.0, 0.0, 0.0, 0.0);
        let mut offset = 0.0;
        if let Some(r) = rest.strip_prefix('T') {
            (hours, rest) = number(r, 2)?;
            (minutes, rest) = number(rest.strip_prefix(':')?, 2)?;
            if let Some(r) = rest.strip_prefix(':') {
                (seconds, rest) = number(r, 2)?;
                if let Some(r) = rest.strip_prefix('.') {
                    let digits = r.bytes().take_while(u8::is_ascii_digit).count();
                    if digits == 0 {
                        return None;
                    }
                    let frac: f64 = format!("0.{}", &r[..digits]).parse().ok()?;
                    millis = (frac * 1000.0).floor();
                    rest = &r[digits..];
                }
            }
            if let Some(r) = rest.strip_prefix('Z') {
                rest = r;
            } else if let Some(tz_sign) = rest.chars().next().filter(|c| *c == '+' || *c == '-') {
                let (h, r) = number(&rest[1..], 2)?;
                let (m, r) = number(r.strip_prefix(':')?, 2)?;
                offset = (h * 60.0 + m) * 60_000.0 * if tz_sign == '+' { 1.0 } else { -1.0 };
                rest = r;
            }
        }
        if !rest.is_empty() || !(1.0..=12.0).contains(&month) || !(1.0..=31.0).contains(&day) {
            return None;
        }
        if hours > 24.0 || minutes > 59.0 || seconds > 59.0 {
            return None;
        }
        Some(make_time(year, month - 1.0, day, hours, minutes, seconds, millis) - offset)
    };
    parse().unwrap_or(f64::NAN)
}

fn year_string(year: i64) -> String {
    if (0..=9999).contains(&year) {
        format!("{:04}", year)
    } else {
        format!("{}{:06}", if year < 0 { '-' } else { '+' }, year.abs())
    }
}

fn iso_string(t: f64) -> String {
    let f = fields(t);
    format!(
        "{}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year_string(f.year),
        f.month + 1,
        f.day,
        f.hours,
        f.minutes,
        f.seconds,
        f.millis
    )
}

fn display_string(t: f64) -> String {
    if t.is_nan() {
        return "Invalid Date".to_string();
    }
    let f = fields(t);
    format!(
        "{} {} {:02} {} {:02}:{:02}:{:02} GMT+0000 (Coordinated Universal Time)",
        WEEKDAYS[f.weekday as usize],
        MONTHS[f.month as usize],
        f.day,
        year_string(f.year),
        f.hours,
        f.minutes,
        f.seconds
    )
}

// =============================================================================
// Natives
// =============================================================================

fn this_time(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<f64> {
    let time = call.this.as_object().and_then(|id| match interp.runtime().heap().object(id).data {
        ObjectData::Date(t) => Some(t),
        _ => None,
    });
    match time {
        Some(t) => Ok(t),
        None => interp.throw(ErrorKind::TypeError, "this is not a Date object."),
    }
}

/// Collect up to seven numeric components, filling in defaults
fn components(interp: &mut Interpreter<'_>, args: &[JSValue]) -> JsResult<f64> {
    let mut parts = [f64::NAN, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    for (slot, arg) in parts.iter_mut().zip(args) {
        *slot = interp.to_number(arg)?;
    }
    let year = parts[0];
    if year.is_finite() && (0.0..=99.0).contains(&year.trunc()) {
        parts[0] = 1900.0 + year.trunc();
    }
    Ok(make_time(parts[0], parts[1], parts[2], parts[3], parts[4], parts[5], parts[6]))
}

fn date_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    if !call.construct {
        return Ok(JSValue::string(display_string(now())));
    }
    let time = match call.args {
        [] => now(),
        [value] => {
            let existing = value.as_object().and_then(|id| match interp.runtime().heap().object(id).data {
                ObjectData::Date(t) => Some(t),
                _ => None,
            });
            match existing {
                Some(t) => t,
                None => match interp.to_primitive(value, Hint::Default)? {
                    JSValue::String(s) => parse_iso(&s),
                    other => time_clip(interp.to_number(&other)?),
                },
            }
        }
        args => components(interp, args)?,
    };
    let proto = interp.intrinsics().date_prototype;
    let obj = JSObject::with_data(ClassId::Date, Some(proto), ObjectData::Date(time));
    Ok(JSValue::Object(interp.alloc(obj)))
}

fn date_now(_: &mut Interpreter<'_>, _: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Number(now()))
}

fn date_utc(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    components(interp, call.args).map(JSValue::Number)
}

fn date_parse(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = interp.to_string(&call.arg(0))?;
    Ok(JSValue::Number(parse_iso(&s)))
}

fn date_get_time(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    this_time(interp, call).map(JSValue::Number)
}

fn date_get_timezone_offset(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let t = this_time(interp, call)?;
    Ok(JSValue::Number(if t.is_nan() { f64::NAN } else { 0.0 }))
}

macro_rules! field_getters {
    ($($name:ident => $field:ident;)*) => {
        $(
            fn $name(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
                let t = this_time(interp, call)?;
                if t.is_nan() {
                    return Ok(JSValue::Number(f64::NAN));
                }
                Ok(JSValue::Number(fields(t).$field as f64))
            }
        )*
    };
}

field_getters! {
    date_get_full_year => year;
    date_get_month => month;
    date_get_date => day;
    date_get_day => weekday;
    date_get_hours => hours;
    date_get_minutes => minutes;
    date_get_seconds => seconds;
    date_get_milliseconds => millis;
}

fn date_set_time(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    this_time(interp, call)?;
    let t = time_clip(interp.to_number(&call.arg(0))?);
    if let Some(id) = call.this.as_object() {
        interp.runtime().heap_mut().object_mut(id).data = ObjectData::Date(t);
    }
    Ok(JSValue::Number(t))
}

fn date_to_iso_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let t = this_time(interp, call)?;
    if t.is_nan() {
        return interp.throw(ErrorKind::RangeError, "Invalid time value");
    }
    Ok(JSValue::string(iso_string(t)))
}

fn date_to_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let t = this_time(interp, call)?;
    Ok(JSValue::string(display_string(t)))
}

fn date_to_utc_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let t = this_time(interp, call)?;
    if t.is_nan() {
        return Ok(JSValue::string("Invalid Date"));
    }
    let f = fields(t);
    Ok(JSValue::string(format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[f.weekday as usize],
        f.day,
        MONTHS[f.month as usize],
        year_string(f.year),
        f.hours,
        f.minutes,
        f.seconds
    )))
}

fn date_to_json(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let t = this_time(interp, call)?;
    if t.is_nan() {
        return Ok(JSValue::Null);
    }
    Ok(JSValue::string(iso_string(t)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_civil_round_trip() {
        for days in [-719_468, -1, 0, 1, 10_957, 19_000, 2_932_896] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m, d), days);
        }
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(days_from_civil(2000, 3, 1), 11_017);
    }

    #[test]
    fn test_parse_iso() {
        assert_eq!(parse_iso("1970-01-01T00:00:00.000Z"), 0.0);
        assert_eq!(parse_iso("2000-01-01"), 946_684_800_000.0);
        assert_eq!(parse_iso("2000-01-01T01:00+01:00"), 946_684_800_000.0);
        assert_eq!(parse_iso("+002000-01-01T00:00:00Z"), 946_684_800_000.0);
        assert!(parse_iso("yesterday").is_nan());
        assert!(parse_iso("2000-13-01").is_nan());
    }

    #[test]
    fn test_constructor() {
        assert_eq!(eval_ok("new Date(0).getTime()"), "0");
        assert_eq!(eval_ok("new Date('2020-02-29T12:30:00Z').toISOString()"), "2020-02-29T12:30:00.000Z");
        assert_eq!(eval_ok("new Date(2020, 0, 31, 1, 2, 3, 4).toISOString()"), "2020-01-31T01:02:03.004Z");
        assert_eq!(eval_ok("new Date(2020, 12, 1).getFullYear()"), "2021");
        assert_eq!(eval_ok("Date.UTC(1970, 0, 2)"), "86400000");
        assert_eq!(eval_ok("typeof Date()"), "string");
        assert_eq!(eval_ok("Date.now() > 1600000000000"), "true");
    }

    #[test]
    fn test_getters() {
        let code = "var d = new Date(Date.UTC(2024, 6, 14, 9, 8, 7, 6)); \
                    [d.getFullYear(), d.getMonth(), d.getDate(), d.getDay(), d.getHours(), \
                     d.getMinutes(), d.getSeconds(), d.getMilliseconds(), d.getUTCDate()].join()";
        assert_eq!(eval_ok(code), "2024,6,14,0,9,8,7,6,14");
    }

    #[test]
    fn test_formatting() {
        assert_eq!(eval_ok("String(new Date(0))"), "Thu Jan 01 1970 00:00:00 GMT+0000 (Coordinated Universal Time)");
        assert_eq!(eval_ok("new Date(0).toUTCString()"), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(eval_ok("String(new Date(NaN))"), "Invalid Date");
        assert_eq!(eval("new Date(NaN).toISOString()").unwrap_err(), "RangeError: Invalid time value");
        assert_eq!(eval_ok("new Date(5) - new Date(2)"), "3");
        assert_eq!(eval_ok("JSON.stringify({ d: new Date(NaN) })"), "{\"d\":null}");
    }
}
