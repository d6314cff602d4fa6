//! Transform engine
//!
//! Pure functions over [`Operation`]s. Nothing here holds state; the binder
//! drives these against its history.

use crate::error::{Error, Result};
use crate::operation::{push_action, Action, Operation};

/// Rewrite `a` so it applies cleanly after `b`.
///
/// Both operations must have been computed against the same content.
/// Concurrent inserts at the same position are ordered by
/// [`Operation::precedence`], so every replica picks the same order.
pub fn transform(a: &Operation, b: &Operation) -> Result<Operation> {
    transform_pair(a, b).map(|(a_prime, _)| a_prime)
}

/// Transform two concurrent operations against each other.
///
/// Returns `(a', b')` such that `apply(apply(s, a), b') == apply(apply(s, b), a')`.
pub fn transform_pair(a: &Operation, b: &Operation) -> Result<(Operation, Operation)> {
    if a.base_len() != b.base_len() {
        return Err(Error::malformed(format!(
            "concurrent operations disagree on base length ({} vs {})",
            a.base_len(),
            b.base_len()
        )));
    }

    let a_first = a.precedence() <= b.precedence();
    let mut a_prime = Vec::new();
    let mut b_prime = Vec::new();

    let mut a_iter = a.actions().iter().cloned();
    let mut b_iter = b.actions().iter().cloned();
    let mut a_cur = a_iter.next();
    let mut b_cur = b_iter.next();

    loop {
        match (a_cur.take(), b_cur.take()) {
            (None, None) => break,

            (Some(Action::Insert(ta)), Some(Action::Insert(tb))) => {
                if a_first {
                    push_action(&mut b_prime, Action::Retain(ta.chars().count()));
                    push_action(&mut a_prime, Action::Insert(ta));
                    a_cur = a_iter.next();
                    b_cur = Some(Action::Insert(tb));
                } else {
                    push_action(&mut a_prime, Action::Retain(tb.chars().count()));
                    push_action(&mut b_prime, Action::Insert(tb));
                    a_cur = Some(Action::Insert(ta));
                    b_cur = b_iter.next();
                }
            }
            (Some(Action::Insert(text)), other) => {
                push_action(&mut b_prime, Action::Retain(text.chars().count()));
                push_action(&mut a_prime, Action::Insert(text));
                a_cur = a_iter.next();
                b_cur = other;
            }
            (other, Some(Action::Insert(text))) => {
                push_action(&mut a_prime, Action::Retain(text.chars().count()));
                push_action(&mut b_prime, Action::Insert(text));
                a_cur = other;
                b_cur = b_iter.next();
            }

            (None, Some(_)) | (Some(_), None) => {
                return Err(Error::malformed("operations ended at different offsets"));
            }

            (Some(Action::Retain(x)), Some(Action::Retain(y))) => {
                let n = x.min(y);
                push_action(&mut a_prime, Action::Retain(n));
                push_action(&mut b_prime, Action::Retain(n));
                a_cur = remainder(Action::Retain(x), n, &mut a_iter);
                b_cur = remainder(Action::Retain(y), n, &mut b_iter);
            }
            (Some(Action::Delete(x)), Some(Action::Delete(y))) => {
                // both removed the same range; nothing left to do
                let n = x.min(y);
                a_cur = remainder(Action::Delete(x), n, &mut a_iter);
                b_cur = remainder(Action::Delete(y), n, &mut b_iter);
            }
            (Some(Action::Delete(x)), Some(Action::Retain(y))) => {
                let n = x.min(y);
                push_action(&mut a_prime, Action::Delete(n));
                a_cur = remainder(Action::Delete(x), n, &mut a_iter);
                b_cur = remainder(Action::Retain(y), n, &mut b_iter);
            }
            (Some(Action::Retain(x)), Some(Action::Delete(y))) => {
                let n = x.min(y);
                push_action(&mut b_prime, Action::Delete(n));
                a_cur = remainder(Action::Retain(x), n, &mut a_iter);
                b_cur = remainder(Action::Delete(y), n, &mut b_iter);
            }
        }
    }

    Ok((
        a.with_actions(b.base_version + 1, a_prime),
        b.with_actions(a.base_version + 1, b_prime),
    ))
}

/// Apply an operation to content, producing new content.
pub fn apply(content: &str, op: &Operation) -> Result<String> {
    let len = content.chars().count();
    if op.base_len() != len {
        return Err(Error::malformed(format!(
            "operation spans {} characters but content has {}",
            op.base_len(),
            len
        )));
    }

    let mut chars = content.chars();
    let mut out = String::with_capacity(content.len());
    for action in op.actions() {
        match action {
            Action::Retain(n) => out.extend(chars.by_ref().take(*n)),
            Action::Insert(text) => out.push_str(text),
            Action::Delete(n) => {
                for _ in chars.by_ref().take(*n) {}
            }
        }
    }

    Ok(out)
}

/// Combine `a` followed by `b` into a single operation.
///
/// Both must come from the same author and `b` must have been computed
/// against the output of `a`.
pub fn compose(a: &Operation, b: &Operation) -> Result<Operation> {
    if a.author != b.author {
        return Err(Error::malformed(format!(
            "cannot compose operations from {} and {}",
            a.author, b.author
        )));
    }
    if a.target_len() != b.base_len() {
        return Err(Error::malformed(format!(
            "second operation spans {} characters, first produces {}",
            b.base_len(),
            a.target_len()
        )));
    }

    let mut composed = Vec::new();
    let mut a_iter = a.actions().iter().cloned();
    let mut b_iter = b.actions().iter().cloned();
    let mut a_cur = a_iter.next();
    let mut b_cur = b_iter.next();

    loop {
        match (a_cur.take(), b_cur.take()) {
            (None, None) => break,

            (Some(Action::Delete(n)), other) => {
                push_action(&mut composed, Action::Delete(n));
                a_cur = a_iter.next();
                b_cur = other;
            }
            (other, Some(Action::Insert(text))) => {
                push_action(&mut composed, Action::Insert(text));
                a_cur = other;
                b_cur = b_iter.next();
            }

            (None, Some(_)) | (Some(_), None) => {
                return Err(Error::malformed("operations ended at different offsets"));
            }

            (Some(Action::Retain(x)), Some(Action::Retain(y))) => {
                let n = x.min(y);
                push_action(&mut composed, Action::Retain(n));
                a_cur = remainder(Action::Retain(x), n, &mut a_iter);
                b_cur = remainder(Action::Retain(y), n, &mut b_iter);
            }
            (Some(Action::Retain(x)), Some(Action::Delete(y))) => {
                let n = x.min(y);
                push_action(&mut composed, Action::Delete(n));
                a_cur = remainder(Action::Retain(x), n, &mut a_iter);
                b_cur = remainder(Action::Delete(y), n, &mut b_iter);
            }
            (Some(Action::Insert(text)), Some(Action::Retain(y))) => {
                let len = text.chars().count();
                let n = len.min(y);
                let (kept, rest) = split_chars(&text, n);
                push_action(&mut composed, Action::Insert(kept.to_string()));
                a_cur = if rest.is_empty() {
                    a_iter.next()
                } else {
                    Some(Action::Insert(rest.to_string()))
                };
                b_cur = remainder(Action::Retain(y), n, &mut b_iter);
            }
            (Some(Action::Insert(text)), Some(Action::Delete(y))) => {
                // text inserted by `a` and removed by `b` never existed
                let len = text.chars().count();
                let n = len.min(y);
                let (_, rest) = split_chars(&text, n);
                a_cur = if rest.is_empty() {
                    a_iter.next()
                } else {
                    Some(Action::Insert(rest.to_string()))
                };
                b_cur = remainder(Action::Delete(y), n, &mut b_iter);
            }
        }
    }

    Ok(a.with_actions(a.base_version, composed))
}

/// What is left of `action` after `consumed` characters, or the next action.
fn remainder(
    action: Action,
    consumed: usize,
    rest: &mut impl Iterator<Item = Action>,
) -> Option<Action> {
    match action {
        Action::Retain(n) if n > consumed => Some(Action::Retain(n - consumed)),
        Action::Delete(n) if n > consumed => Some(Action::Delete(n - consumed)),
        _ => rest.next(),
    }
}

fn split_chars(text: &str, n: usize) -> (&str, &str) {
    let idx = text
        .char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text.split_at(idx)
}
