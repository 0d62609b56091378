use clap::Parser;
use miette::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dilute::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Terminate quietly on a closed pipe (`dilute ... | head`)
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    let level = if global.verbose {
        Level::DEBUG
    } else if global.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: could not install log subscriber: {e}");
    }

    match cli.command {
        Commands::Curve(cmd) => dilute::cli::commands::curve::run(cmd, &global),
        Commands::Produce(args) => dilute::cli::commands::produce::run(args, &global),
        Commands::Validate(args) => dilute::cli::commands::validate::run(args),
        Commands::Config(cmd) => dilute::cli::commands::config::run(cmd, &global),
        Commands::Completions(args) => dilute::cli::commands::completions::run(args),
    }
}
