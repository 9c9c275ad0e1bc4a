use catalog_ingest::cli::commands;
use catalog_ingest::cli::{Cli, Commands};
use clap::Parser;
use miette::Result;

fn main() -> Result<()> {
    // Terminate quietly when the reader of a pipe goes away
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
    catalog_ingest::logging::init(global.verbose, global.quiet);

    match cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Seed(args) => commands::seed::run(args, &global),
        Commands::Import(args) => commands::import::run(args, &global),
        Commands::Archive(args) => commands::archive::run(args, &global),
        Commands::Slugs(args) => commands::slugs::run(args, &global),
        Commands::Extract(args) => commands::extract::run(args, &global),
        Commands::Config(cmd) => commands::config::run(cmd, &global),
        Commands::Completions(args) => commands::completions::run(args),
    }
}
