use clap::Parser;
use deploy_scripts::{cli::Cli, commands, errors::ScriptError};

#[tokio::main]
async fn main() -> Result<(), ScriptError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().pretty().init();

    commands::run(cli).await
}
