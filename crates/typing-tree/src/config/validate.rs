use super::Config;
use crate::error::{Error, Result};
use crate::rpart::{CartModel, parse_rpart};
use crate::stratum::Stratum;

/// Checks that the configuration covers every model: each split variable is a
/// configured question, each categorical level one of its choices and each
/// predicted class a segment.
pub fn validate_against_models(config: &Config, models: &[(Stratum, CartModel)]) -> Result<()> {
    for (stratum, model) in models {
        let parsed = parse_rpart(model)?;

        for (id, rule) in &parsed.rules {
            let context = format!("{} node {}", stratum, id);
            let question = config
                .question(rule.variable())
                .ok_or_else(|| Error::missing("question", rule.variable().clone(), context.clone()))?;

            if rule.is_categorical() {
                let choices = config.choices_of(question);
                if let Some(level) = rule
                    .levels()
                    .into_iter()
                    .find(|level| !choices.iter().any(|choice| &choice.name == *level))
                {
                    return Err(Error::missing("choice", level.clone(), context));
                }
            }
        }

        for (id, distribution) in &parsed.distributions {
            if parsed.rules.contains_key(id) {
                continue;
            }
            if !config.segments.contains_key(&distribution.class) {
                return Err(Error::missing(
                    "segment",
                    distribution.class.clone(),
                    format!("{} node {}", stratum, id),
                ));
            }
        }

        tracing::debug!(
            stratum = %stratum,
            splits = parsed.rules.len(),
            "configuration covers model"
        );
    }

    Ok(())
}
