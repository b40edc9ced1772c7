use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::models::EpaLink;

/// Lookup from an EPA to every sub-competency it informs.
#[derive(Debug, Clone, Default)]
pub struct EpaSubCompetencyMap {
    by_epa: HashMap<Uuid, BTreeSet<Uuid>>,
}

impl EpaSubCompetencyMap {
    pub fn from_links(links: &[EpaLink]) -> Self {
        let mut by_epa: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();

        for link in links {
            by_epa
                .entry(link.epa_id)
                .or_default()
                .insert(link.sub_competency_id);
        }

        Self { by_epa }
    }

    pub fn sub_competencies_for(&self, epa_id: &Uuid) -> Option<&BTreeSet<Uuid>> {
        self.by_epa.get(epa_id)
    }

    pub fn epa_count(&self) -> usize {
        self.by_epa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_epa.is_empty()
    }
}
