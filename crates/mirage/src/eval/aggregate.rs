//! Aggregate computation over a group of per-row values.

use std::collections::HashSet;

use mirage_core::{EngineError, Result, Value};

/// Computes one aggregate over the evaluated argument values of a group.
/// `star` marks COUNT(*), which counts rows rather than non-NULL values.
pub fn compute(name: &str, distinct: bool, star: bool, values: &[Value]) -> Result<Value> {
    match name {
        "COUNT" => {
            if star {
                return Ok(Value::Integer(values.len() as i64));
            }
            let non_null = values.iter().filter(|v| !v.is_null());
            if distinct {
                let keys: HashSet<String> = non_null.map(Value::canonical_key).collect();
                Ok(Value::Integer(keys.len() as i64))
            } else {
                Ok(Value::Integer(non_null.count() as i64))
            }
        }

        "SUM" => {
            let mut sum = 0.0;
            let mut integral = true;
            let mut saw_value = false;
            for v in values.iter().filter(|v| !v.is_null()) {
                saw_value = true;
                integral &= matches!(v, Value::Integer(_) | Value::Bool(_));
                sum += v.as_number().unwrap_or(0.0);
            }
            // SUM over no rows is NULL, not 0.
            if !saw_value {
                return Ok(Value::Null);
            }
            if integral {
                Ok(Value::Integer(sum as i64))
            } else {
                Ok(Value::Float(sum))
            }
        }

        "AVG" => {
            let numbers: Vec<f64> = values
                .iter()
                .filter(|v| !v.is_null())
                .filter_map(Value::as_number)
                .collect();
            if numbers.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64))
        }

        "MIN" => Ok(fold_extreme(values, |a, b| a.compare(b).is_le())),
        "MAX" => Ok(fold_extreme(values, |a, b| a.compare(b).is_ge())),

        other => Err(EngineError::query(format!("unknown aggregate {other}"))),
    }
}

fn fold_extreme(values: &[Value], keep_left: impl Fn(&Value, &Value) -> bool) -> Value {
    let mut best: Option<&Value> = None;
    for v in values.iter().filter(|v| !v.is_null()) {
        best = match best {
            None => Some(v),
            Some(current) if keep_left(current, v) => Some(current),
            _ => Some(v),
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn count_star_counts_nulls_too() {
        let values = [Value::Integer(1), Value::Null, Value::Integer(2)];
        assert_eq!(compute("COUNT", false, true, &values).unwrap(), Value::Integer(3));
        assert_eq!(compute("COUNT", false, false, &values).unwrap(), Value::Integer(2));
    }

    #[test]
    fn count_distinct_uses_canonical_keys() {
        let values = [
            Value::Integer(1),
            Value::Float(1.0),
            Value::Integer(2),
            Value::Null,
        ];
        assert_eq!(compute("COUNT", true, false, &values).unwrap(), Value::Integer(2));
    }

    #[test]
    fn sum_is_null_on_empty_and_integral_when_possible() {
        assert_eq!(compute("SUM", false, false, &[]).unwrap(), Value::Null);
        assert_eq!(compute("SUM", false, false, &[Value::Null]).unwrap(), Value::Null);
        assert_eq!(
            compute("SUM", false, false, &[Value::Integer(1), Value::Integer(2)]).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            compute("SUM", false, false, &[Value::Integer(1), Value::Float(0.5)]).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn avg_skips_nulls() {
        let values = [Value::Integer(2), Value::Null, Value::Integer(4)];
        assert_eq!(compute("AVG", false, false, &values).unwrap(), Value::Float(3.0));
        assert_eq!(compute("AVG", false, false, &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn min_max_use_value_ordering() {
        let values = [Value::Integer(3), Value::Integer(1), Value::Null];
        assert_eq!(compute("MIN", false, false, &values).unwrap(), Value::Integer(1));
        assert_eq!(compute("MAX", false, false, &values).unwrap(), Value::Integer(3));
        assert_eq!(compute("MIN", false, false, &[Value::Null]).unwrap(), Value::Null);
    }
}
