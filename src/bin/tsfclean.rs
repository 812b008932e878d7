use clap::Parser;
use tsfclean::cleaner::FileCleaner;
use tsfclean::cli::Cli;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .init();

    let outputs = match cli.resolve_outputs() {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("tsfclean: {e}");
            std::process::exit(2);
        }
    };

    let cleaner = FileCleaner::new();
    let mut any_failed = false;
    for (input, output) in cli.inputs.iter().zip(outputs.iter()) {
        match cleaner.clean_file(input, output) {
            Ok(true) => log::info!("{} -> {}", input.display(), output.display()),
            Ok(false) => {
                log::error!("{}: structural conflict, skipped", input.display());
                any_failed = true;
            }
            Err(e) => {
                log::error!("{}: {e}", input.display());
                any_failed = true;
            }
        }
    }

    std::process::exit(if any_failed { 1 } else { 0 });
}
