fn main() {
    env_logger::init();
    if let Err(e) = trustkit::cli::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
