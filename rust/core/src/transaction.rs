// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Undo journal for [`EntityGraph`] transactions.
//!
//! Transactions nest: each `begin` pushes a mark into the journal, `commit`
//! pops it (keeping the entries for an enclosing transaction) and `rollback`
//! undoes every entry recorded since the mark.

use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use crate::graph::EntityGraph;
use crate::schema::SchemaVersion;

#[derive(Debug, Clone)]
pub(crate) enum UndoOp {
    Inserted(EntityId),
    Removed(Entity),
    Replaced(Entity),
    Pinned(EntityId),
    Unpinned(EntityId),
    Schema(SchemaVersion),
}

impl EntityGraph {
    pub fn begin(&mut self) {
        self.marks.push(self.journal.len());
    }

    pub fn in_transaction(&self) -> bool {
        !self.marks.is_empty()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.marks
            .pop()
            .ok_or_else(|| Error::structural("commit without an open transaction"))?;
        if self.marks.is_empty() {
            self.journal.clear();
        }
        Ok(())
    }

    /// Undo every mutation since the matching `begin`
    pub fn rollback(&mut self) -> Result<()> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| Error::structural("rollback without an open transaction"))?;
        while self.journal.len() > mark {
            let Some(op) = self.journal.pop() else {
                break;
            };
            self.undo(op);
        }
        Ok(())
    }

    /// Run `f` in a transaction: commit on `Ok`, roll back on `Err`
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin();
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback()?;
                Err(err)
            }
        }
    }

    fn undo(&mut self, op: UndoOp) {
        match op {
            UndoOp::Inserted(id) => {
                if let Some(entity) = self.entities.remove(&id) {
                    self.unindex(&entity);
                }
            }
            UndoOp::Removed(entity) => {
                self.index(&entity);
                self.entities.insert(entity.id, entity);
            }
            UndoOp::Replaced(previous) => {
                if let Some(current) = self.entities.remove(&previous.id) {
                    self.unindex(&current);
                }
                self.index(&previous);
                self.entities.insert(previous.id, previous);
            }
            UndoOp::Pinned(id) => {
                self.pinned.remove(&id);
            }
            UndoOp::Unpinned(id) => {
                self.pinned.insert(id);
            }
            UndoOp::Schema(previous) => {
                self.schema = previous;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute::AttributeValue;
    use crate::error::Error;
    use crate::schema::{IfcType, SchemaVersion};
    use crate::parser::parse_model;

    const MODEL: &str = r#"
#1=IFCPROJECT('p',$,'Project',$,$,$,$,$,$);
#2=IFCBUILDING('b',$,'Main',$,$,$,$,$,$,$,$,$);
#3=IFCRELAGGREGATES('r',$,$,$,#1,(#2));
"#;

    #[test]
    fn rollback_restores_graph_and_index() {
        let mut g = parse_model(MODEL).unwrap();
        g.begin();
        g.force_remove(2).unwrap();
        g.set_attribute(1, 2, AttributeValue::Null).unwrap();
        g.add(IfcType::IfcBuildingStorey, vec![AttributeValue::String("s".into())])
            .unwrap();
        g.set_schema(SchemaVersion::Ifc2x3);
        g.rollback().unwrap();

        assert_eq!(g.len(), 3);
        assert_eq!(g.get(1).unwrap().get_string(2), Some("Project"));
        assert_eq!(g.referrer_ids(2), vec![3]);
        assert_eq!(g.schema(), SchemaVersion::Ifc4);
        assert!(!g.in_transaction());
    }

    #[test]
    fn closure_transaction_rolls_back_on_error() {
        let mut g = parse_model(MODEL).unwrap();
        let result: crate::Result<()> = g.transaction(|g| {
            g.set_attribute(2, 2, AttributeValue::Null)?;
            Err(Error::structural("boom"))
        });
        assert!(result.is_err());
        assert_eq!(g.get(2).unwrap().get_string(2), Some("Main"));
    }

    #[test]
    fn nested_commit_is_undone_by_outer_rollback() {
        let mut g = parse_model(MODEL).unwrap();
        g.begin();
        g.transaction(|g| g.set_attribute(2, 2, AttributeValue::Null))
            .unwrap();
        assert!(g.get(2).unwrap().get(2).unwrap().is_null());
        g.rollback().unwrap();
        assert_eq!(g.get(2).unwrap().get_string(2), Some("Main"));
    }

    #[test]
    fn unbalanced_commit_fails() {
        let mut g = parse_model(MODEL).unwrap();
        assert!(g.commit().is_err());
        assert!(g.rollback().is_err());
    }
}
