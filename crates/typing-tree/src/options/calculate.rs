use smol_str::SmolStr;

use super::bound_or_missing;
use crate::error::Result;
use crate::question::Calculation;
use crate::tree::Tree;

/// Attaches a calculation to every node asking `src_question`.
pub(super) fn calculate(mut tree: Tree, src_question: &SmolStr, name: &SmolStr, expression: &str) -> Result<Tree> {
    let calculation = Calculation {
        name: name.clone(),
        expression: expression.to_string(),
    };

    for id in bound_or_missing(&tree, src_question, "calculate")? {
        if let Some(binding) = tree.node_mut(id).question.as_mut()
            && !binding.calculations.contains(&calculation)
        {
            binding.calculations.push(calculation.clone());
        }
    }

    Ok(tree)
}
