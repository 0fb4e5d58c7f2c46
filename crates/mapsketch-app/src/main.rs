//! Replay entry point (native).

#[cfg(feature = "native")]
fn main() {
    use std::io::Read;

    env_logger::init();

    let path = std::env::args().nth(1);
    let mut json = String::new();
    let read = match path.as_deref() {
        None | Some("-") => std::io::stdin().read_to_string(&mut json).map(|_| ()),
        Some(path) => std::fs::read_to_string(path).map(|s| json = s),
    };
    if let Err(e) = read {
        log::error!("Failed to read scenario: {}", e);
        std::process::exit(1);
    }

    match mapsketch_app::run(&json, std::io::stdout().lock()) {
        Ok(count) => log::info!("Wrote {} line(s)", count),
        Err(e) => {
            log::error!("Replay failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "native"))]
fn main() {
    panic!("Native feature not enabled. Use `cargo run --features native`");
}
