use std::env;

#[tokio::main]
async fn main() {
    env_logger::init();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = retiresim::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Some("run") => {
            if let Err(e) = retiresim::api::run_cli(&raw_args[2..]) {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Usage: retiresim serve [port]");
            eprintln!(
                "       retiresim run [--params file.json] [--trials N] [--seed S] \
                 [--deterministic] [--output summary|json]"
            );
            std::process::exit(1);
        }
    }
}
