use itertools::Itertools;

use super::names::RowNames;
use crate::expr::{Atom, Expr};
use crate::stratum::Stratum;
use crate::tree::{NodeId, Tree};

/// Relevance of the row emitted for `id`: the simplified node relevance, with
/// the question's stratum guard when it applies to only some strata.
pub fn row_relevance(tree: &Tree, id: NodeId, universe: &[Stratum]) -> Expr {
    let node = tree.node(id);
    let relevance = match node.question.as_ref().and_then(|binding| binding.guard.as_ref()) {
        Some(strata) => node.relevance.conjoin(Expr::Atom(Atom::Stratum {
            strata: strata.clone(),
        })),
        None => node.relevance.clone(),
    };
    relevance.simplify(universe)
}

/// Renders an expression in XLSForm syntax. `true` renders as an empty cell.
pub fn render(expr: &Expr, names: &RowNames) -> String {
    match expr {
        Expr::Const(true) => String::new(),
        _ => render_expr(expr, names, false),
    }
}

fn render_expr(expr: &Expr, names: &RowNames, nested: bool) -> String {
    match expr {
        Expr::Const(true) => "true()".to_string(),
        Expr::Const(false) => "false()".to_string(),
        Expr::Atom(atom) => render_atom(atom, names),
        Expr::And(items) => {
            let rendered = items.iter().map(|item| render_expr(item, names, true)).join(" and ");
            if nested && items.len() > 1 {
                format!("({})", rendered)
            } else {
                rendered
            }
        }
        Expr::Or(items) => {
            let rendered = items.iter().map(|item| render_expr(item, names, true)).join(" or ");
            if nested && items.len() > 1 {
                format!("({})", rendered)
            } else {
                rendered
            }
        }
    }
}

fn render_atom(atom: &Atom, names: &RowNames) -> String {
    match atom {
        Atom::Compare {
            source,
            variable,
            comparator,
            value,
        } => format!("${{{}}} {} {}", names.field(*source, variable), comparator, value),
        Atom::Member {
            source,
            variable,
            values,
        } => any_selected(names.field(*source, variable), values.iter().map(|v| v.as_str())),
        Atom::Selected {
            source,
            variable,
            value,
        } => selected(names.field(*source, variable), value),
        Atom::Stratum { strata } => any_selected(names.strata(), strata.iter().map(|s| s.as_str())),
    }
}

fn selected(field: &str, value: &str) -> String {
    format!("selected(${{{}}}, '{}')", field, value)
}

fn any_selected<'a>(field: &str, values: impl Iterator<Item = &'a str>) -> String {
    let values = values.collect::<Vec<_>>();
    match values.as_slice() {
        [] => "false()".to_string(),
        [value] => selected(field, value),
        values => format!(
            "({})",
            values.iter().map(|value| selected(field, value)).join(" or ")
        ),
    }
}
