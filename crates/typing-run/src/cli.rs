use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::IntoDiagnostic;
use std::io::{self, Write};
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;
use typing_tree::{
    CartModel, Config, ConfigTemplate, DiagramOptions, EdgeLabels, FormOptions, OptionEngine, Stratum,
    build_merged_tree, cart_diagram, compile_form, diagram, validate_against_models,
};

const DEFAULT_VERSION: &str = "typing_tool";

#[derive(Parser, Debug)]
#[command(name = "typing")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To compile the typing tool form:\n\
    typing xlsform --config config/ --rural rural.json --urban urban.json --output form/\n\n\
    ## To draw the merged trees:\n\
    typing diagram --rural rural.json --urban urban.json --add-node-id\n\n\
    ## To start a configuration from the models:\n\
    typing template --rural rural.json --urban urban.json --output config/")]
#[command(
    about = "typing compiles rpart classification trees fitted per stratum into an XLSForm typing tool.",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Commands,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Debug, clap::Args)]
struct ModelArgs {
    /// CART model fitted on the rural stratum, as JSON
    #[arg(long, value_name = "FILE")]
    rural: PathBuf,

    /// CART model fitted on the urban stratum, as JSON
    #[arg(long, value_name = "FILE")]
    urban: PathBuf,
}

impl ModelArgs {
    fn load(&self) -> miette::Result<Vec<(Stratum, CartModel)>> {
        Ok(vec![
            (Stratum::rural(), CartModel::from_path(&self.rural)?),
            (Stratum::urban(), CartModel::from_path(&self.urban)?),
        ])
    }
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum EdgeLabelStyle {
    #[default]
    Condition,
    YesNo,
    ChoiceLabels,
}

impl From<EdgeLabelStyle> for EdgeLabels {
    fn from(style: EdgeLabelStyle) -> Self {
        match style {
            EdgeLabelStyle::Condition => EdgeLabels::Condition,
            EdgeLabelStyle::YesNo => EdgeLabels::YesNo,
            EdgeLabelStyle::ChoiceLabels => EdgeLabels::ChoiceLabels,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compile the models and the configuration into survey, choices and settings sheets
    Xlsform {
        /// Directory holding the configuration tables
        #[arg(short, long, value_name = "DIR")]
        config: PathBuf,
        #[clap(flatten)]
        models: ModelArgs,
        /// Directory to write the sheets and the diagram into
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
        /// Name of the diagram file, defaults to the `version` setting
        #[arg(long, value_name = "NAME")]
        version: Option<String>,
        /// Keep one row per occurrence of a question
        #[arg(long, default_value_t = false)]
        no_merge_duplicates: bool,
        /// Offer only the choices that can still lead somewhere
        #[arg(long, default_value_t = false)]
        skip_unavailable_choices: bool,
        /// Prepend the configured screening questions
        #[arg(long, default_value_t = false)]
        screening: bool,
        /// Write into a timestamped subdirectory of the output directory
        #[arg(long, default_value_t = false)]
        timestamp: bool,
    },
    /// Draw the merged trees as a Mermaid flowchart
    Diagram {
        #[clap(flatten)]
        models: ModelArgs,
        /// Configuration used to label questions and choices
        #[arg(short, long, value_name = "DIR")]
        config: Option<PathBuf>,
        /// File to write the diagram into instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Prefix every node with its position in the source models
        #[arg(long, default_value_t = false)]
        add_node_id: bool,
        /// Set the edge label style
        #[arg(long, value_enum, default_value_t)]
        edge_labels: EdgeLabelStyle,
    },
    /// Check that the configuration covers every variable, level and class of the models
    Validate {
        /// Directory holding the configuration tables
        #[arg(short, long, value_name = "DIR")]
        config: PathBuf,
        #[clap(flatten)]
        models: ModelArgs,
    },
    /// Write skeleton configuration tables for the models
    Template {
        #[clap(flatten)]
        models: ModelArgs,
        /// Directory to write the tables into
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        self.init_tracing();

        match &self.commands {
            Commands::Xlsform {
                config,
                models,
                output,
                version,
                no_merge_duplicates,
                skip_unavailable_choices,
                screening,
                timestamp,
            } => {
                let config = Config::from_dir(config)?;
                let models = models.load()?;
                let form = compile_form(
                    &models,
                    &config,
                    &FormOptions {
                        merge_duplicate_questions: !no_merge_duplicates,
                        skip_unavailable_choices: *skip_unavailable_choices,
                        enable_screening: *screening,
                    },
                )?;

                let dir = if *timestamp {
                    output.join(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
                } else {
                    output.clone()
                };
                fs::create_dir_all(&dir).into_diagnostic()?;

                let version = version
                    .as_deref()
                    .or_else(|| config.settings.get("version"))
                    .filter(|version| !version.is_empty())
                    .unwrap_or(DEFAULT_VERSION);
                form.save(&dir, version)?;

                Self::report(&format!(
                    "Wrote {} survey rows and {} choices to {}",
                    form.survey.len(),
                    form.choices.len(),
                    dir.display()
                ))
            }
            Commands::Diagram {
                models,
                config,
                output,
                add_node_id,
                edge_labels,
            } => {
                let models = models.load()?;
                let options = DiagramOptions {
                    add_node_id: *add_node_id,
                    edge_labels: (*edge_labels).into(),
                    ..Default::default()
                };
                let text = match config {
                    Some(config) => {
                        let config = Config::from_dir(config)?;
                        validate_against_models(&config, &models)?;
                        let tree = OptionEngine::new(&config).run(build_merged_tree(&models)?, &[])?;
                        diagram(&tree, Some(&config), &options)
                    }
                    None => cart_diagram(&models, &options)?,
                };

                match output {
                    Some(path) => {
                        fs::write(path, &text).into_diagnostic()?;
                        tracing::info!(path = %path.display(), "wrote diagram");
                        Ok(())
                    }
                    None => {
                        let mut stdout = io::stdout().lock();
                        stdout.write_all(text.as_bytes()).into_diagnostic()?;
                        stdout.flush().into_diagnostic()
                    }
                }
            }
            Commands::Validate { config, models } => {
                let config = Config::from_dir(config)?;
                validate_against_models(&config, &models.load()?)?;
                Self::report("The configuration covers both models")
            }
            Commands::Template { models, output } => {
                let template = ConfigTemplate::from_models(&models.load()?)?;
                fs::create_dir_all(output).into_diagnostic()?;
                template.save(output)?;
                Self::report(&format!("Wrote configuration template to {}", output.display()))
            }
        }
    }

    fn init_tracing(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("typing_tree={level},typing_run={level}")));

        // a subscriber may already be installed when run in-process
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    }

    fn report(message: &str) -> miette::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{} {}", "✓".green().bold(), message).into_diagnostic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case::condition(EdgeLabelStyle::Condition, EdgeLabels::Condition)]
    #[case::yes_no(EdgeLabelStyle::YesNo, EdgeLabels::YesNo)]
    #[case::choice_labels(EdgeLabelStyle::ChoiceLabels, EdgeLabels::ChoiceLabels)]
    fn test_edge_label_style(#[case] style: EdgeLabelStyle, #[case] expected: EdgeLabels) {
        assert_eq!(EdgeLabels::from(style), expected);
    }

    #[rstest]
    #[case::quiet(vec!["typing", "validate", "-c", "cfg", "--rural", "r.json", "--urban", "u.json"], 0)]
    #[case::verbose(vec!["typing", "-vv", "validate", "-c", "cfg", "--rural", "r.json", "--urban", "u.json"], 2)]
    #[case::after_subcommand(vec!["typing", "template", "--rural", "r.json", "--urban", "u.json", "-o", "out", "-v"], 1)]
    fn test_verbosity(#[case] args: Vec<&str>, #[case] expected: u8) {
        assert_eq!(Cli::parse_from(args).verbose, expected);
    }

    #[test]
    fn test_xlsform_flags() {
        let cli = Cli::parse_from([
            "typing",
            "xlsform",
            "--config",
            "cfg",
            "--rural",
            "r.json",
            "--urban",
            "u.json",
            "--output",
            "out",
            "--version",
            "v2",
            "--no-merge-duplicates",
            "--screening",
        ]);
        let Commands::Xlsform {
            version,
            no_merge_duplicates,
            skip_unavailable_choices,
            screening,
            timestamp,
            ..
        } = cli.commands
        else {
            panic!("expected the xlsform command");
        };
        assert_eq!(version.as_deref(), Some("v2"));
        assert!(no_merge_duplicates);
        assert!(!skip_unavailable_choices);
        assert!(screening);
        assert!(!timestamp);
    }
}
