use smol_str::SmolStr;

use super::bound_or_missing;
use crate::error::{Error, Result};
use crate::tree::{BranchKind, Tree};

/// Stops offering `choices` of `src_question`. The logic behind them stays in
/// place; choice branches are only marked hidden.
pub(super) fn hide(mut tree: Tree, src_question: &SmolStr, choices: &[SmolStr]) -> Result<Tree> {
    for id in bound_or_missing(&tree, src_question, "hide")? {
        let node = tree.node_mut(id);
        let Some(binding) = node.question.as_mut() else {
            continue;
        };

        for choice in choices {
            if !binding.has_choice(choice) {
                return Err(Error::missing(
                    "choice",
                    choice.clone(),
                    format!("option `hide` on `{}`", src_question),
                ));
            }
            if !binding.hidden.contains(choice) {
                binding.hidden.push(choice.clone());
            }
        }

        for branch in node.branches.iter_mut() {
            if let BranchKind::Choice(value) = &branch.kind
                && choices.contains(value)
            {
                branch.hidden = true;
            }
        }
    }

    Ok(tree)
}
