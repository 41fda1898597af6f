use clap::Parser;
use std::process::ExitCode;

use bellhop::cli::args::{Cli, Commands};
use bellhop::cli::{ask, config, daemon, questions, send, sessions};
use bellhop::error::exit_codes;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli).await;

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> bellhop::Result<()> {
    let format = cli.output_format();

    match cli.command {
        Commands::Ask {
            title,
            body,
            context,
            timeout_minutes,
            project_root,
        } => {
            ask::ask(&title, body, context, timeout_minutes, project_root).await?;
        }

        Commands::Answer {
            question_id,
            answer,
        } => {
            questions::answer(&question_id, &answer).await?;
        }

        Commands::Cancel {
            question_id,
            reason,
        } => {
            questions::cancel(&question_id, reason.as_deref()).await?;
        }

        Commands::Sessions => {
            sessions::list(format).await?;
        }

        Commands::Questions { session } => {
            questions::list(session.as_deref(), format).await?;
        }

        Commands::Show { question_id } => {
            questions::show(&question_id, format).await?;
        }

        Commands::Send { text, thread } => {
            send::send(&text, thread.as_deref()).await?;
        }

        Commands::Topic { name } => {
            send::topic(&name).await?;
        }

        Commands::Daemon { command } => {
            daemon::daemon(command).await?;
        }

        Commands::Config { action } => {
            config::config(action).await?;
        }
    }

    Ok(())
}
