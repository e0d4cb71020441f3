use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "culprit",
    version,
    about = "Commit graph metrics and bug-introducing commit tracing"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Map an error to the process exit code.
///
///   0  success
///   1  general/unknown error
///   2  configuration error
///   3  repository not found or unreadable
///   4  database error
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}");
    let lower = msg.to_lowercase();

    if lower.contains("cannot resolve path")
        || lower.contains("cannot open repository")
        || lower.contains("repository error")
    {
        3
    } else if lower.contains("config") {
        2
    } else if lower.contains("database")
        || lower.contains("sqlite")
        || lower.contains("store error")
    {
        4
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_cannot_resolve() {
        let err = anyhow::anyhow!("Cannot resolve path: /nonexistent");
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_not_a_repository() {
        let err = anyhow::anyhow!("Cannot open repository: /tmp/empty")
            .context("Failed to open /tmp/empty");
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_config() {
        let err = anyhow::anyhow!("Cannot load config: culprit.toml");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_database() {
        let err = anyhow::anyhow!("Cannot open database: /foo/.culprit/culprit.db");
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Fixing commit deadbeef not found");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
