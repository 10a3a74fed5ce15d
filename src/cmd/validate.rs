use crate::cmd::run::DEFAULT_TARGET;
use crate::reports;
use clap::Args;
use shakespeare::config::Config;
use shakespeare::error::EvResult;
use shakespeare::genome::{Genome, Target};
use shakespeare::optimizer::GeneticOperators;

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: Config,

    /// Candidate text to score
    #[arg(short, long)]
    pub candidate: String,

    #[arg(short, long, default_value = DEFAULT_TARGET)]
    pub target: String,
}

pub fn run(args: ValidateArgs, config: Config) -> EvResult<()> {
    let operators = GeneticOperators::from_params(&config.genetics)?;
    let target = Target::new(&args.target);
    let genome = Genome::from_text(&args.candidate, &target)?;

    println!("\n🔎 === CANDIDATE AUDIT === 🔎");
    reports::print_alignment(&genome, &operators.alphabet);
    Ok(())
}
