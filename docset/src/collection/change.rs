use super::document::Document;

/// The kind of structural delta a [ChangeRecord] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// An item was appended or inserted.
    Add,
    /// An item was removed.
    Remove,
    /// An item was replaced in place; `old` carries the outgoing item, or is
    /// absent when the item was mutated without relocation.
    Replace,
}

/// One structural delta. Records accumulate in a collection's batch between
/// `begin()`/`end()` and are handed first to every index, then to the
/// `change` listeners, then discarded.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub action: ChangeAction,
    pub item: Document,
    pub old: Option<Document>,
}

impl ChangeRecord {
    pub fn added(item: Document) -> Self {
        ChangeRecord {
            action: ChangeAction::Add,
            item,
            old: None,
        }
    }

    pub fn removed(item: Document) -> Self {
        ChangeRecord {
            action: ChangeAction::Remove,
            item,
            old: None,
        }
    }

    pub fn replaced(item: Document, old: Option<Document>) -> Self {
        ChangeRecord {
            action: ChangeAction::Replace,
            item,
            old,
        }
    }
}
