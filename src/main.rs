use std::path::Path;
use std::process;

use mio::Poll;

use webserv::config::Config;
use webserv::error::Result;
use webserv::server::Server;

const DEFAULT_CONFIG_PATH: &str = "config/default.conf";

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 {
        eprintln!("Error: Too many arguments. Usage: webserv [config_file]");
        process::exit(1);
    }
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);

    if let Err(e) = run(config_path) {
        eprintln!("webserv: {}", e);
        process::exit(1);
    }
}

fn run(config_path: &str) -> Result<()> {
    let config = Config::load(Path::new(config_path))?;

    let poll = Poll::new()?;
    let mut server = Server::new(config, &poll)?;
    server.run(poll)
}
