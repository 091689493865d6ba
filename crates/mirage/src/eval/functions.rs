//! Built-in scalar functions.
//!
//! Arguments arrive already evaluated; AND/OR/CASE short-circuiting lives
//! in the evaluator proper.

use chrono::{Datelike, NaiveDateTime, Timelike};

use mirage_core::coerce::{coerce_timestamp, now_timestamp, today_date};
use mirage_core::{EngineError, Result, Value};

/// Dispatches a scalar function call. `name` is already uppercased by the
/// lowering step.
pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        // -- Strings ---------------------------------------------------------
        "CONCAT" => {
            if args.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            Ok(Value::Text(args.iter().map(Value::to_string).collect()))
        }
        "SUBSTRING" | "SUBSTR" => substring(name, args),
        "LENGTH" => unary_text(name, args, |s| Value::Integer(s.len() as i64)),
        "UPPER" => unary_text(name, args, |s| Value::Text(s.to_uppercase())),
        "LOWER" => unary_text(name, args, |s| Value::Text(s.to_lowercase())),
        "TRIM" => unary_text(name, args, |s| Value::Text(s.trim().to_string())),

        // -- Datetime --------------------------------------------------------
        "NOW" | "CURRENT_TIMESTAMP" => {
            expect_args(name, args, 0)?;
            Ok(Value::Text(now_timestamp()))
        }
        "CURDATE" | "CURRENT_DATE" => {
            expect_args(name, args, 0)?;
            Ok(Value::Text(today_date()))
        }
        "YEAR" => date_part(name, args, |d| d.year() as i64),
        "MONTH" => date_part(name, args, |d| d.month() as i64),
        "DAY" | "DAYOFMONTH" => date_part(name, args, |d| d.day() as i64),
        "DATE_FORMAT" => date_format(args),

        // -- Math ------------------------------------------------------------
        "ABS" => {
            expect_args(name, args, 1)?;
            Ok(match &args[0] {
                Value::Null => Value::Null,
                Value::Integer(i) => Value::Integer(i.abs()),
                other => match other.as_number() {
                    Some(n) => Value::Float(n.abs()),
                    None => Value::Null,
                },
            })
        }
        "ROUND" => round(args),
        "CEILING" | "CEIL" => numeric_unary(name, args, |n| Value::Integer(n.ceil() as i64)),
        "FLOOR" => numeric_unary(name, args, |n| Value::Integer(n.floor() as i64)),
        "MOD" => {
            expect_args(name, args, 2)?;
            match (args[0].as_number(), args[1].as_number()) {
                (Some(_), Some(d)) if d == 0.0 => Ok(Value::Null),
                (Some(a), Some(d)) => Ok(Value::Float(a % d)),
                _ => Ok(Value::Null),
            }
        }
        "POWER" | "POW" => {
            expect_args(name, args, 2)?;
            match (args[0].as_number(), args[1].as_number()) {
                (Some(base), Some(exp)) => Ok(Value::Float(base.powf(exp))),
                _ => Ok(Value::Null),
            }
        }

        // -- Conditional -----------------------------------------------------
        "IF" => {
            expect_args(name, args, 3)?;
            Ok(if args[0].is_truthy() {
                args[1].clone()
            } else {
                args[2].clone()
            })
        }
        "COALESCE" => Ok(args
            .iter()
            .find(|a| !a.is_null())
            .cloned()
            .unwrap_or(Value::Null)),
        "IFNULL" => {
            expect_args(name, args, 2)?;
            Ok(if args[0].is_null() {
                args[1].clone()
            } else {
                args[0].clone()
            })
        }
        "NULLIF" => {
            expect_args(name, args, 2)?;
            if !args[0].is_null() && !args[1].is_null() && args[0].same_as(&args[1]) {
                Ok(Value::Null)
            } else {
                Ok(args[0].clone())
            }
        }

        other => Err(EngineError::unsupported(format!("function {other}"))),
    }
}

fn expect_args(name: &str, args: &[Value], count: usize) -> Result<()> {
    if args.len() != count {
        return Err(EngineError::query(format!(
            "{name} expects {count} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn unary_text(name: &str, args: &[Value], f: impl Fn(&str) -> Value) -> Result<Value> {
    expect_args(name, args, 1)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(f(&args[0].to_string()))
}

fn numeric_unary(name: &str, args: &[Value], f: impl Fn(f64) -> Value) -> Result<Value> {
    expect_args(name, args, 1)?;
    Ok(args[0].as_number().map(&f).unwrap_or(Value::Null))
}

/// SUBSTRING(s, start[, len]) with 1-based indexing; a negative start
/// counts from the end of the string.
fn substring(name: &str, args: &[Value]) -> Result<Value> {
    if args.len() != 2 && args.len() != 3 {
        return Err(EngineError::query(format!(
            "{name} expects 2 or 3 arguments, got {}",
            args.len()
        )));
    }
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::Null);
    }
    let text: Vec<char> = args[0].to_string().chars().collect();
    let Some(start) = args[1].as_integer() else {
        return Ok(Value::Null);
    };

    let begin = if start > 0 {
        (start - 1) as usize
    } else if start < 0 && text.len() as i64 + start >= 0 {
        (text.len() as i64 + start) as usize
    } else {
        // MySQL: SUBSTRING(s, 0) is the empty string.
        return Ok(Value::Text(String::new()));
    };
    if begin >= text.len() {
        return Ok(Value::Text(String::new()));
    }

    let len = match args.get(2) {
        Some(v) if v.is_null() => return Ok(Value::Null),
        Some(v) => match v.as_integer() {
            Some(l) if l > 0 => l as usize,
            _ => return Ok(Value::Text(String::new())),
        },
        None => text.len() - begin,
    };
    let end = (begin + len).min(text.len());
    Ok(Value::Text(text[begin..end].iter().collect()))
}

fn round(args: &[Value]) -> Result<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(EngineError::query(format!(
            "ROUND expects 1 or 2 arguments, got {}",
            args.len()
        )));
    }
    let Some(n) = args[0].as_number() else {
        return Ok(Value::Null);
    };
    match args.get(1) {
        None => Ok(match &args[0] {
            Value::Integer(i) => Value::Integer(*i),
            _ => Value::Float(n.round()),
        }),
        Some(places) => {
            let Some(places) = places.as_integer() else {
                return Ok(Value::Null);
            };
            let factor = 10f64.powi(places as i32);
            Ok(Value::Float((n * factor).round() / factor))
        }
    }
}

fn parse_datetime(value: &Value) -> Option<NaiveDateTime> {
    let canonical = coerce_timestamp(&value.to_string())?;
    NaiveDateTime::parse_from_str(&canonical, "%Y-%m-%d %H:%M:%S").ok()
}

fn date_part(name: &str, args: &[Value], part: impl Fn(&NaiveDateTime) -> i64) -> Result<Value> {
    expect_args(name, args, 1)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(parse_datetime(&args[0])
        .map(|d| Value::Integer(part(&d)))
        .unwrap_or(Value::Null))
}

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// DATE_FORMAT(d, fmt) with the MySQL specifier subset
/// `%Y %y %m %d %H %i %s %M %b %W %a`.
fn date_format(args: &[Value]) -> Result<Value> {
    expect_args("DATE_FORMAT", args, 2)?;
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::Null);
    }
    let Some(dt) = parse_datetime(&args[0]) else {
        return Ok(Value::Null);
    };

    let format = args[1].to_string();
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&format!("{:04}", dt.year())),
            Some('y') => out.push_str(&format!("{:02}", dt.year() % 100)),
            Some('m') => out.push_str(&format!("{:02}", dt.month())),
            Some('d') => out.push_str(&format!("{:02}", dt.day())),
            Some('H') => out.push_str(&format!("{:02}", dt.hour())),
            Some('i') => out.push_str(&format!("{:02}", dt.minute())),
            Some('s') => out.push_str(&format!("{:02}", dt.second())),
            Some('M') => out.push_str(MONTHS[dt.month0() as usize]),
            Some('b') => out.push_str(&MONTHS[dt.month0() as usize][..3]),
            Some('W') => out.push_str(WEEKDAYS[dt.weekday().num_days_from_monday() as usize]),
            Some('a') => {
                out.push_str(&WEEKDAYS[dt.weekday().num_days_from_monday() as usize][..3])
            }
            Some(other) => out.push(other),
            None => out.push('%'),
        }
    }
    Ok(Value::Text(out))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn concat_propagates_null() {
        assert_eq!(
            call("CONCAT", &[text("a"), Value::Integer(1)]).unwrap(),
            text("a1")
        );
        assert_eq!(call("CONCAT", &[text("a"), Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn substring_is_one_based() {
        assert_eq!(
            call("SUBSTRING", &[text("hello"), Value::Integer(2)]).unwrap(),
            text("ello")
        );
        assert_eq!(
            call("SUBSTRING", &[text("hello"), Value::Integer(2), Value::Integer(3)]).unwrap(),
            text("ell")
        );
        assert_eq!(
            call("SUBSTRING", &[text("hello"), Value::Integer(-3)]).unwrap(),
            text("llo")
        );
        assert_eq!(
            call("SUBSTRING", &[text("hello"), Value::Integer(0)]).unwrap(),
            text("")
        );
    }

    #[test]
    fn length_counts_bytes() {
        assert_eq!(call("LENGTH", &[text("héllo")]).unwrap(), Value::Integer(6));
    }

    #[test]
    fn mod_and_power() {
        assert_eq!(
            call("MOD", &[Value::Integer(7), Value::Integer(3)]).unwrap(),
            Value::Float(1.0)
        );
        assert_eq!(
            call("MOD", &[Value::Integer(7), Value::Integer(0)]).unwrap(),
            Value::Null
        );
        assert_eq!(
            call("POWER", &[Value::Integer(2), Value::Integer(10)]).unwrap(),
            Value::Float(1024.0)
        );
    }

    #[test]
    fn round_variants() {
        assert_eq!(call("ROUND", &[Value::Float(2.567)]).unwrap(), Value::Float(3.0));
        assert_eq!(
            call("ROUND", &[Value::Float(2.567), Value::Integer(2)]).unwrap(),
            Value::Float(2.57)
        );
        assert_eq!(call("ROUND", &[Value::Integer(5)]).unwrap(), Value::Integer(5));
    }

    #[test]
    fn date_parts_and_format() {
        let d = text("2024-03-05 10:20:30");
        assert_eq!(call("YEAR", &[d.clone()]).unwrap(), Value::Integer(2024));
        assert_eq!(call("MONTH", &[d.clone()]).unwrap(), Value::Integer(3));
        assert_eq!(call("DAY", &[d.clone()]).unwrap(), Value::Integer(5));
        assert_eq!(
            call("DATE_FORMAT", &[d.clone(), text("%Y-%m-%d %H:%i:%s")]).unwrap(),
            text("2024-03-05 10:20:30")
        );
        assert_eq!(
            call("DATE_FORMAT", &[d.clone(), text("%W, %b %d '%y")]).unwrap(),
            text("Tuesday, Mar 05 '24")
        );
        assert_eq!(call("YEAR", &[text("not a date")]).unwrap(), Value::Null);
    }

    #[test]
    fn conditionals() {
        assert_eq!(
            call("IF", &[Value::Bool(true), text("a"), text("b")]).unwrap(),
            text("a")
        );
        assert_eq!(
            call("COALESCE", &[Value::Null, Value::Null, text("x")]).unwrap(),
            text("x")
        );
        assert_eq!(call("IFNULL", &[Value::Null, text("d")]).unwrap(), text("d"));
        assert_eq!(
            call("NULLIF", &[Value::Integer(1), Value::Integer(1)]).unwrap(),
            Value::Null
        );
        assert_eq!(
            call("NULLIF", &[Value::Integer(1), Value::Integer(2)]).unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn unknown_function_is_unsupported() {
        assert!(call("FROBNICATE", &[]).is_err());
    }
}
