use clap::Parser;
use form_autofill::cli::commands::{cmd_classify, cmd_run};
use form_autofill::cli::config::{Cli, Commands, load_config};
use form_autofill::cli::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Classify { fields, url } => {
            println!("{}", cmd_classify(&fields, url.as_deref(), &config)?);
        }
        Commands::Run {
            scenario,
            format,
            output,
            trace,
        } => {
            let all_passed = cmd_run(
                &scenario,
                &format,
                output.as_deref(),
                trace.as_deref(),
                &config,
                cli.verbose,
            )
            .await?;
            if !all_passed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
