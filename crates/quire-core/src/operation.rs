//! Edit operations over flat text
//!
//! An [`Operation`] walks the whole document it was computed against: every
//! character is either retained or deleted, and inserted text is spliced in
//! between. Lengths count `char`s, not bytes.

use serde::{Deserialize, Serialize};

/// One step of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Keep the next `n` characters
    Retain(usize),
    /// Insert text at the current position
    Insert(String),
    /// Remove the next `n` characters
    Delete(usize),
}

impl Action {
    /// Characters of the input this action consumes
    pub fn input_len(&self) -> usize {
        match self {
            Action::Retain(n) | Action::Delete(n) => *n,
            Action::Insert(_) => 0,
        }
    }

    /// Characters this action produces in the output
    pub fn output_len(&self) -> usize {
        match self {
            Action::Retain(n) => *n,
            Action::Insert(text) => text.chars().count(),
            Action::Delete(_) => 0,
        }
    }
}

/// An immutable edit submitted against a known document version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OperationRepr")]
pub struct Operation {
    /// Client-assigned id, unique per author
    pub id: u64,
    pub author: String,
    /// Version of the document the actions were computed against
    pub base_version: u64,
    actions: Vec<Action>,
}

#[derive(Deserialize)]
struct OperationRepr {
    id: u64,
    author: String,
    base_version: u64,
    #[serde(default)]
    actions: Vec<Action>,
}

impl TryFrom<OperationRepr> for Operation {
    type Error = crate::Error;

    fn try_from(repr: OperationRepr) -> Result<Self, Self::Error> {
        // raw lengths must fit before merging can be trusted
        let mut input = 0usize;
        let mut output = 0usize;
        for action in &repr.actions {
            input = input
                .checked_add(action.input_len())
                .ok_or_else(|| crate::Error::malformed("base length overflows"))?;
            output = output
                .checked_add(action.output_len())
                .ok_or_else(|| crate::Error::malformed("target length overflows"))?;
        }
        Ok(Operation::from_actions(repr.id, repr.author, repr.base_version, repr.actions))
    }
}

impl Operation {
    /// Start building an operation
    pub fn builder(author: impl Into<String>, id: u64, base_version: u64) -> OperationBuilder {
        OperationBuilder {
            id,
            author: author.into(),
            base_version,
            actions: Vec::new(),
        }
    }

    /// Build an operation from raw actions, normalizing them
    pub fn from_actions(
        id: u64,
        author: impl Into<String>,
        base_version: u64,
        actions: impl IntoIterator<Item = Action>,
    ) -> Self {
        let mut normalized = Vec::new();
        for action in actions {
            push_action(&mut normalized, action);
        }
        Self {
            id,
            author: author.into(),
            base_version,
            actions: normalized,
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Length of the content this operation applies to
    pub fn base_len(&self) -> usize {
        self.actions
            .iter()
            .fold(0, |len: usize, a| len.saturating_add(a.input_len()))
    }

    /// Length of the content after applying this operation
    pub fn target_len(&self) -> usize {
        self.actions
            .iter()
            .fold(0, |len: usize, a| len.saturating_add(a.output_len()))
    }

    /// Total order used to break ties between concurrent inserts
    pub fn precedence(&self) -> (&str, u64) {
        (self.author.as_str(), self.id)
    }

    /// Same edit, rebased onto another version
    pub fn rebased(&self, base_version: u64) -> Self {
        Self {
            base_version,
            ..self.clone()
        }
    }

    pub(crate) fn with_actions(&self, base_version: u64, actions: Vec<Action>) -> Self {
        Self {
            id: self.id,
            author: self.author.clone(),
            base_version,
            actions,
        }
    }

    /// Short human readable summary, e.g. `+3 -1 =12`
    pub fn summary(&self) -> String {
        let (mut inserted, mut deleted, mut retained) = (0usize, 0usize, 0usize);
        for action in &self.actions {
            match action {
                Action::Retain(n) => retained = n.saturating_add(retained),
                Action::Insert(text) => inserted += text.chars().count(),
                Action::Delete(n) => deleted = n.saturating_add(deleted),
            }
        }
        format!("+{} -{} ={}", inserted, deleted, retained)
    }
}

/// Builder for [`Operation`]
#[derive(Debug)]
pub struct OperationBuilder {
    id: u64,
    author: String,
    base_version: u64,
    actions: Vec<Action>,
}

impl OperationBuilder {
    pub fn retain(mut self, n: usize) -> Self {
        push_action(&mut self.actions, Action::Retain(n));
        self
    }

    pub fn insert(mut self, text: impl Into<String>) -> Self {
        push_action(&mut self.actions, Action::Insert(text.into()));
        self
    }

    pub fn delete(mut self, n: usize) -> Self {
        push_action(&mut self.actions, Action::Delete(n));
        self
    }

    pub fn build(self) -> Operation {
        Operation {
            id: self.id,
            author: self.author,
            base_version: self.base_version,
            actions: self.actions,
        }
    }

    /// Insert `text` at `pos` in a document of `len` characters
    pub fn insert_at(self, len: usize, pos: usize, text: impl Into<String>) -> Operation {
        self.retain(pos).insert(text).retain(len.saturating_sub(pos)).build()
    }

    /// Delete `count` characters at `pos` in a document of `len` characters
    pub fn delete_at(self, len: usize, pos: usize, count: usize) -> Operation {
        self.retain(pos)
            .delete(count)
            .retain(len.saturating_sub(pos.saturating_add(count)))
            .build()
    }
}

/// Append an action, dropping empties and merging with the previous one.
///
/// Inserts are kept ahead of an adjacent delete so equal edits always have
/// the same shape.
pub(crate) fn push_action(actions: &mut Vec<Action>, action: Action) {
    match action {
        Action::Retain(0) | Action::Delete(0) => {}
        Action::Insert(ref text) if text.is_empty() => {}
        Action::Retain(n) => match actions.last_mut() {
            Some(Action::Retain(last)) => *last = last.saturating_add(n),
            _ => actions.push(Action::Retain(n)),
        },
        Action::Delete(n) => match actions.last_mut() {
            Some(Action::Delete(last)) => *last = last.saturating_add(n),
            _ => actions.push(Action::Delete(n)),
        },
        Action::Insert(text) => {
            if let Some(Action::Insert(last)) = actions.last_mut() {
                last.push_str(&text);
                return;
            }
            if !matches!(actions.last(), Some(Action::Delete(_))) {
                actions.push(Action::Insert(text));
                return;
            }
            // keep insert before delete
            let len = actions.len();
            if len >= 2 {
                if let Action::Insert(prev) = &mut actions[len - 2] {
                    prev.push_str(&text);
                    return;
                }
            }
            actions.insert(len - 1, Action::Insert(text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_normalizes() {
        let op = Operation::builder("ann", 1, 0)
            .retain(2)
            .retain(0)
            .retain(3)
            .insert("")
            .insert("ab")
            .insert("c")
            .build();
        assert_eq!(op.actions(), &[Action::Retain(5), Action::Insert("abc".into())]);
        assert_eq!(op.base_len(), 5);
        assert_eq!(op.target_len(), 8);
    }

    #[test]
    fn test_insert_kept_before_delete() {
        let op = Operation::builder("ann", 1, 0)
            .delete(2)
            .insert("x")
            .build();
        assert_eq!(op.actions(), &[Action::Insert("x".into()), Action::Delete(2)]);

        let op = Operation::builder("ann", 1, 0)
            .insert("a")
            .delete(1)
            .insert("b")
            .build();
        assert_eq!(op.actions(), &[Action::Insert("ab".into()), Action::Delete(1)]);
    }

    #[test]
    fn test_positional_helpers() {
        let op = Operation::builder("ann", 1, 4).insert_at(3, 1, "X");
        assert_eq!(op.base_version, 4);
        assert_eq!(
            op.actions(),
            &[Action::Retain(1), Action::Insert("X".into()), Action::Retain(2)]
        );

        let op = Operation::builder("ann", 2, 4).delete_at(5, 3, 2);
        assert_eq!(op.actions(), &[Action::Retain(3), Action::Delete(2)]);
        assert_eq!(op.summary(), "+0 -2 =3");
    }

    #[test]
    fn test_json_shape() {
        let op = Operation::builder("ann", 7, 2).insert_at(2, 2, "!");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "author": "ann",
                "base_version": 2,
                "actions": [{"retain": 2}, {"insert": "!"}]
            })
        );

        let raw = r#"{"id":1,"author":"bo","base_version":0,
            "actions":[{"retain":1},{"retain":1},{"delete":0},{"insert":"z"}]}"#;
        let parsed: Operation = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.actions(), &[Action::Retain(2), Action::Insert("z".into())]);
    }

    #[test]
    fn test_overflowing_lengths_rejected() {
        let raw = format!(
            r#"{{"id":1,"author":"bo","base_version":0,"actions":[{{"retain":{}}},{{"retain":5}}]}}"#,
            usize::MAX
        );
        let err = serde_json::from_str::<Operation>(&raw).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{}", err);

        let raw = format!(
            r#"{{"id":1,"author":"bo","base_version":0,"actions":[{{"delete":{}}},{{"insert":"x"}},{{"delete":1}}]}}"#,
            usize::MAX
        );
        assert!(serde_json::from_str::<Operation>(&raw).is_err());
    }

    #[test]
    fn test_delete_at_saturates() {
        let op = Operation::builder("ann", 1, 0).delete_at(3, 1, usize::MAX);
        assert_eq!(op.actions(), &[Action::Retain(1), Action::Delete(usize::MAX)]);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let op = Operation::builder("ann", 1, 0).retain(2).insert("héllo").build();
        assert_eq!(op.target_len(), 7);
    }
}
