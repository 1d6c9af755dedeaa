//! Filter evaluation for the in-memory store.
//!
//! Supports field equality (arrays match when any element is equal), dotted
//! paths, the comparison operators `$eq $ne $gt $gte $lt $lte $in $nin
//! $exists` and top-level `$and` / `$or`.

use crate::core::{Bson, Document, Result, StoreError};
use std::cmp::Ordering;

/// Evaluate `filter` against `document`. An empty filter matches everything.
pub fn matches(document: &Document, filter: &Document) -> Result<bool> {
    for (key, criterion) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, criterion)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, criterion)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(StoreError::Query(format!("unknown top-level operator '{}'", op)));
            }
            path => matches_field(lookup(document, path), criterion)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolve a dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(map) => map.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether a criterion is an operator expression (`{"$gt": 1}`) rather than a
/// literal value.
pub fn is_operator_expression(criterion: &Bson) -> bool {
    match criterion {
        Bson::Document(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn clauses<'a>(op: &str, criterion: &'a Bson) -> Result<Vec<&'a Document>> {
    let expected = || StoreError::Query(format!("'{}' expects an array of filters", op));
    let items = criterion.as_array().ok_or_else(expected)?;
    items
        .iter()
        .map(|item| item.as_document().ok_or_else(expected))
        .collect()
}

fn matches_field(value: Option<&Bson>, criterion: &Bson) -> Result<bool> {
    let operators = match criterion {
        Bson::Document(map) if is_operator_expression(criterion) => map,
        _ => return Ok(equals(value, criterion)),
    };

    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(op, value, operand)?,
            "$nin" => !in_list(op, value, operand)?,
            "$exists" => match operand {
                Bson::Boolean(expected) => value.is_some() == *expected,
                other => {
                    return Err(StoreError::Query(format!(
                        "'$exists' expects a boolean, got {:?}",
                        other.element_type()
                    )));
                }
            },
            unknown => {
                return Err(StoreError::Query(format!("unknown operator '{}'", unknown)));
            }
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => *expected == Bson::Null,
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| scalar_equals(item, expected))
        }
        Some(actual) => scalar_equals(actual, expected),
    }
}

fn scalar_equals(actual: &Bson, expected: &Bson) -> bool {
    match (number(actual), number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

/// Numeric value of any of the numeric element types.
fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare(item, operand).is_some_and(&accept)),
        Some(actual) => compare(actual, operand).is_some_and(accept),
        None => false,
    }
}

fn compare(actual: &Bson, operand: &Bson) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (number(actual), number(operand)) {
        return a.partial_cmp(&b);
    }
    match (actual, operand) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.bytes().cmp(&b.bytes())),
        (Bson::DateTime(a), Bson::DateTime(b)) => {
            Some(a.timestamp_millis().cmp(&b.timestamp_millis()))
        }
        _ => None,
    }
}

fn in_list(op: &str, value: Option<&Bson>, operand: &Bson) -> Result<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| StoreError::Query(format!("'{}' expects an array", op)))?;
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}
