//! List construction and the destructive list operations.
//!
//! Destructive operations mutate cells in place; callers holding other
//! references to the same cells observe the change.

use crate::{raise_exn, value::Value, LispResult};

pub fn list(values: &[Value]) -> Value {
    list_star(values, Value::Nil)
}

/// `values` consed onto `tail`.
pub fn list_star(values: &[Value], tail: Value) -> Value {
    let mut result = tail;
    for value in values.iter().rev() {
        result = Value::cons(value.clone(), result);
    }
    result
}

/// Collects a proper list. Signals a type error on an improper tail.
pub fn list_to_vec(list: &Value) -> LispResult<Vec<Value>> {
    let mut iter = list.iter();
    let values: Vec<Value> = iter.by_ref().collect();
    if !iter.tail().is_nil() {
        return raise_exn!(TypeMismatch, @list.clone(), "not a proper list: {}", list);
    }
    Ok(values)
}

/// Length of a proper list. `limit` guards against circular structure.
pub fn length(list: &Value, limit: usize) -> LispResult<usize> {
    let mut n = 0;
    let mut cursor = list.clone();
    loop {
        match cursor {
            Value::Nil => return Ok(n),
            Value::Cons(cell) => {
                n += 1;
                if n > limit {
                    return raise_exn!(LimitExceeded, "list longer than {} elements", limit);
                }
                cursor = cell.cdr();
            }
            _ => return raise_exn!(TypeMismatch, @list.clone(), "not a proper list: {}", list),
        }
    }
}

pub fn nthcdr(n: usize, list: &Value) -> LispResult<Value> {
    let mut cursor = list.clone();
    for _ in 0..n {
        cursor = cursor.cdr()?;
    }
    Ok(cursor)
}

pub fn nth(n: usize, list: &Value) -> LispResult<Value> {
    nthcdr(n, list)?.car()
}

/// Copies every list but the last; the last one is shared.
pub fn append(lists: &[Value]) -> LispResult<Value> {
    let Some((last, init)) = lists.split_last() else {
        return Ok(Value::Nil);
    };
    let mut items = Vec::new();
    for list in init {
        items.extend(list_to_vec(list)?);
    }
    Ok(list_star(&items, last.clone()))
}

pub fn reverse(list: &Value) -> LispResult<Value> {
    let mut result = Value::Nil;
    for value in list_to_vec(list)? {
        result = Value::cons(value, result);
    }
    Ok(result)
}

/// Reverses in place by relinking cdrs. Returns the new head.
pub fn nreverse(list: &Value) -> LispResult<Value> {
    let mut prev = Value::Nil;
    let mut cursor = list.clone();
    loop {
        match cursor {
            Value::Nil => return Ok(prev),
            Value::Cons(cell) => {
                let next = cell.cdr();
                cell.set_cdr(prev);
                prev = Value::Cons(cell);
                cursor = next;
            }
            _ => return raise_exn!(TypeMismatch, @list.clone(), "not a proper list: {}", list),
        }
    }
}

/// Destructively concatenates by setting the last cdr of each non-empty list.
pub fn nconc(lists: &[Value]) -> LispResult<Value> {
    let mut result = Value::Nil;
    let mut last_cell = None;
    for list in lists {
        match list {
            Value::Nil => continue,
            Value::Cons(cell) => {
                match &last_cell {
                    Some(prev) => {
                        rplacd(prev, list.clone())?;
                    }
                    None => result = list.clone(),
                }
                let mut tail = cell.clone();
                while let Value::Cons(next) = tail.cdr() {
                    tail = next;
                }
                last_cell = Some(Value::Cons(tail));
            }
            atom => {
                match &last_cell {
                    Some(prev) => {
                        rplacd(prev, atom.clone())?;
                    }
                    None => result = atom.clone(),
                }
                break;
            }
        }
    }
    Ok(result)
}

pub fn rplaca(cell: &Value, value: Value) -> LispResult<Value> {
    cell.expect_cons("rplaca")?.set_car(value);
    Ok(cell.clone())
}

pub fn rplacd(cell: &Value, value: Value) -> LispResult<Value> {
    cell.expect_cons("rplacd")?.set_cdr(value);
    Ok(cell.clone())
}

/// Iterator over list elements. After exhaustion, [`ListIter::tail`] is the
/// terminating atom (`Nil` for a proper list).
pub struct ListIter {
    cursor: Value,
}

impl ListIter {
    pub fn new(list: Value) -> Self {
        Self { cursor: list }
    }

    pub fn tail(&self) -> &Value {
        &self.cursor
    }
}

impl Iterator for ListIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match &self.cursor {
            Value::Cons(cell) => {
                let item = cell.car();
                self.cursor = cell.cdr();
                Some(item)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{eq, equal};

    fn ints(values: &[i64]) -> Value {
        list(&values.iter().map(|&n| Value::Integer(n)).collect::<Vec<_>>())
    }

    #[test]
    fn length_checks_tail_and_limit() {
        assert_eq!(length(&ints(&[1, 2, 3]), 100).unwrap(), 3);
        assert!(length(&ints(&[1, 2, 3]), 2).is_err());
        assert!(length(&Value::cons(Value::Integer(1), Value::Integer(2)), 10).is_err());
    }

    #[test]
    fn circular_list_hits_the_length_guard() {
        let l = ints(&[1, 2]);
        let last = nthcdr(1, &l).unwrap();
        rplacd(&last, l.clone()).unwrap();
        assert!(length(&l, 1000).is_err());
        // break the cycle so the cells are released
        rplacd(&last, Value::Nil).unwrap();
    }

    #[test]
    fn append_shares_the_last_list() {
        let a = ints(&[1, 2]);
        let b = ints(&[3]);
        let joined = append(&[a, b.clone()]).unwrap();
        assert!(equal(&joined, &ints(&[1, 2, 3])));
        assert!(eq(&nthcdr(2, &joined).unwrap(), &b));
    }

    #[test]
    fn nreverse_relinks_cells() {
        let l = ints(&[1, 2, 3]);
        let first = l.clone();
        let r = nreverse(&l).unwrap();
        assert!(equal(&r, &ints(&[3, 2, 1])));
        // the old head is now the last cell
        assert!(first.cdr().unwrap().is_nil());
    }

    #[test]
    fn nconc_mutates_the_first_list() {
        let a = ints(&[1]);
        let b = ints(&[2, 3]);
        let joined = nconc(&[Value::Nil, a.clone(), b]).unwrap();
        assert!(eq(&joined, &a));
        assert!(equal(&a, &ints(&[1, 2, 3])));
    }

    #[test]
    fn iter_exposes_improper_tail() {
        let l = list_star(&[Value::Integer(1)], Value::Integer(2));
        let mut iter = l.iter();
        assert_eq!(iter.by_ref().count(), 1);
        assert!(matches!(iter.tail(), Value::Integer(2)));
        assert!(list_to_vec(&l).is_err());
    }
}
