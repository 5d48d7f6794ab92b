use tracing_subscriber::EnvFilter;

fn main() {
    if handle_cli_flags() {
        return;
    }

    init_logging();

    if let Err(err) = trwl_status::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("trwl-status {}", trwl_status::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!("{}", trwl_status::app::USAGE);
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
