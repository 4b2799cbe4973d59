use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::{SmolStr, format_smolstr};

use crate::tree::{NodeId, Tree};

/// Row names of the emitted questions.
///
/// The first occurrence of a question keeps its identifier and later ones are
/// suffixed `_2`, `_3`, ... in pre-order. Numbered questions such as the
/// segment rows always carry a suffix. Collapsed nodes share the name of
/// their representative.
#[derive(Debug, Clone, Default)]
pub struct RowNames {
    rows: FxHashMap<NodeId, SmolStr>,
    calculations: FxHashMap<(NodeId, usize), SmolStr>,
    strata: SmolStr,
}

impl RowNames {
    /// Assigns names avoiding `reserved`, the names of rows emitted around the tree.
    pub fn assign(tree: &Tree, strata: &str, reserved: &[&str]) -> Self {
        let mut used: FxHashSet<SmolStr> = reserved.iter().map(|name| SmolStr::new(name)).collect();
        used.insert(SmolStr::new(strata));
        let mut counters: FxHashMap<SmolStr, usize> = FxHashMap::default();
        let mut rows = FxHashMap::default();
        let mut calculations = FxHashMap::default();

        for id in tree.preorder() {
            let Some(binding) = tree.node(id).question.as_ref() else {
                continue;
            };
            if binding.collapsed_into.is_some() {
                continue;
            }

            let counter = counters.entry(binding.question.clone()).or_insert(0);
            let name = loop {
                *counter += 1;
                let candidate = if binding.numbered || *counter > 1 {
                    format_smolstr!("{}_{}", binding.question, counter)
                } else {
                    binding.question.clone()
                };
                if used.insert(candidate.clone()) {
                    break candidate;
                }
            };

            let suffix = name.strip_prefix(binding.question.as_str()).unwrap_or_default().to_string();
            for (i, calculation) in binding.calculations.iter().enumerate() {
                let mut candidate = format_smolstr!("{}{}", calculation.name, suffix);
                let mut n = 1;
                while !used.insert(candidate.clone()) {
                    n += 1;
                    candidate = format_smolstr!("{}{}_{}", calculation.name, suffix, n);
                }
                calculations.insert((id, i), candidate);
            }

            rows.insert(id, name);
        }

        for id in tree.preorder() {
            if let Some(into) = tree.node(id).question.as_ref().and_then(|b| b.collapsed_into)
                && let Some(name) = rows.get(&into).cloned()
            {
                rows.insert(id, name);
            }
        }

        Self {
            rows,
            calculations,
            strata: SmolStr::new(strata),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&SmolStr> {
        self.rows.get(&id)
    }

    pub fn calculation(&self, id: NodeId, index: usize) -> Option<&SmolStr> {
        self.calculations.get(&(id, index))
    }

    /// Row read by an atom, falling back to the variable name for nodes that
    /// emit no row.
    pub fn field<'a>(&'a self, id: NodeId, variable: &'a SmolStr) -> &'a SmolStr {
        self.rows.get(&id).unwrap_or(variable)
    }

    pub fn strata(&self) -> &SmolStr {
        &self.strata
    }
}
