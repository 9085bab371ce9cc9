use colored::Colorize;
use oradba::{cli::start, console};
use std::process;

#[tokio::main]
async fn main() {
    if let Err(err) = start::start().await {
        match err.downcast_ref::<oradba::Error>() {
            Some(inner) => eprintln!("{}", console::error_report(inner)),
            None => eprintln!("{}", console::failure(&err.to_string())),
        }
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", "caused by:".red());
        }
        process::exit(1);
    }
}
