use crate::{SourceRef, UiGraph};
use std::collections::HashMap;

/// Edge id -> origin index over a UI graph's link list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkTable {
    origins: HashMap<i64, SourceRef>,
}

impl LinkTable {
    pub fn from_graph(graph: &UiGraph) -> Self {
        let origins = graph
            .links
            .iter()
            .map(|link| {
                (
                    link.id,
                    SourceRef::new(link.origin_id.clone(), link.origin_slot),
                )
            })
            .collect();
        Self { origins }
    }

    pub fn source_of(&self, edge_id: i64) -> Option<&SourceRef> {
        self.origins.get(&edge_id)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}
