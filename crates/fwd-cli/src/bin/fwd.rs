use anyhow::Result;
use clap::Parser;
use fwd_cli::{
    cli::{FwdArgs, RunConfig},
    init_tracing,
    run::run,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = FwdArgs::parse();
    init_tracing(args.verbosity());
    let config = RunConfig::try_from(args)?;
    run(config).await
}
