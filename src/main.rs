fn main() {
    use clap::Parser;
    let args = folio::cli::Args::parse();
    folio::logging::init(folio::logging::level_for(args.quiet, args.verbose));

    let cancel = folio::CancellationToken::new();
    if let Err(e) = folio::cancel::install_interrupt_handler(cancel.clone()) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    match folio::cli::run(&args, &cancel) {
        Ok(folio::cli::Completion::Done) => {}
        Ok(folio::cli::Completion::Cancelled) => std::process::exit(folio::cancel::EXIT_CANCELLED),
        Err(e) => {
            eprintln!("{}", e);
            if args.verbose {
                for cause in folio::cli::distinct_causes(&e) {
                    eprintln!("  cause: {}", cause);
                }
            }
            std::process::exit(e.exit_code());
        }
    }
}
