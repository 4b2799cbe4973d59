use clap::Parser;

fn main() -> miette::Result<()> {
    typing_run::Cli::parse().run()
}
