use clap::Parser;
use miette::Result;
use placeload::cli::{Cli, Commands, GlobalOpts};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log filter variable; falls back to `warn`, or `debug` with `--verbose`
const LOG_ENV: &str = "PLACELOAD_LOG";

fn init_logging(global: &GlobalOpts) {
    let default = if global.verbose { "placeload=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() -> Result<()> {
    // Reset SIGPIPE so piping to `head` terminates quietly instead of panicking
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
    init_logging(&global);

    match cli.command {
        Commands::Init(args) => placeload::cli::commands::init::run(args),
        Commands::Import(args) => placeload::cli::commands::import::run(args, &global),
        Commands::Edit(args) => placeload::cli::commands::edit::run(args, &global),
        Commands::Undo(args) => placeload::cli::commands::undo::run(args, &global),
        Commands::List(args) => placeload::cli::commands::list::run(args, &global),
        Commands::Template(args) => placeload::cli::commands::template::run(args),
    }
}
