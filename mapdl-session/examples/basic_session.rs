//! Basic example: start an engine, build two nodes, read values back
//!
//! # Prerequisites
//!
//! - A MAPDL installation whose start command is on `PATH`
//!   (or the crate's `mock_mapdl` binary, see below)
//! - For `--remote`: SSH access to a host sharing this filesystem
//!
//! # Usage
//!
//! ```bash
//! cargo run --example basic_session -- --command ansys150
//!
//! # Against the bundled fake engine
//! cargo build --bin mock_mapdl
//! cargo run --example basic_session -- --command target/debug/mock_mapdl
//!
//! # On another machine
//! cargo run --example basic_session -- --remote analyst@cluster01 --key ~/.ssh/id_ed25519
//! ```

use std::env;
use std::path::PathBuf;

use mapdl_session::{RemoteHost, SendOptions, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut builder = Session::builder().cleanup(!args.keep);
    if let Some(command) = &args.command {
        builder = builder.start_command(command);
    }
    if let Some(folder) = &args.folder {
        builder = builder.start_folder(folder);
    }
    if let Some(remote) = &args.remote {
        let mut remote: RemoteHost = remote.parse()?;
        if let Some(key) = &args.key {
            remote = remote.private_key(key);
        }
        builder = builder.remote(remote);
    }

    let mut session = builder.build().await?;
    println!(
        "Started '{}' in {}",
        session.start_command(),
        session.working_dir().display()
    );

    // Echo engine output while the model is built
    let mut verbose = SendOptions::verbose();
    session
        .send_with("/prep7\nn,1,0,0,0\nn,2,1,0,0\net,1,beam188\ne,1,2", &mut verbose)
        .await?;

    let nodes = session.get(("node", "", "count")).await?;
    let elements = session.get(("elem", "", "count")).await?;
    println!("\nModel has {nodes} nodes and {elements} elements");
    println!("Engine release: {}", session.version().await?);

    match session.send("not_a_command").await {
        Ok(_) => println!("Unexpectedly accepted"),
        Err(e) => println!("Engine rejected the command:\n{e}"),
    }

    if let Some(image) = session.plot(Some("eplot")).await? {
        println!("Element plot written to {}", image.display());
    }

    session.close().await?;
    println!("Done!");
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    command: Option<String>,
    folder: Option<PathBuf>,
    remote: Option<String>,
    key: Option<PathBuf>,
    keep: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            command: None,
            folder: None,
            remote: None,
            key: None,
            keep: false,
        };

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--command" | "-c" => {
                    parsed.command = value;
                    i += 1;
                }
                "--folder" | "-f" => {
                    parsed.folder = value.map(PathBuf::from);
                    i += 1;
                }
                "--remote" | "-r" => {
                    parsed.remote = value;
                    i += 1;
                }
                "--key" | "-k" => {
                    parsed.key = value.map(PathBuf::from);
                    i += 1;
                }
                "--keep" => parsed.keep = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                other => eprintln!("Unknown argument: {other}"),
            }
            i += 1;
        }
        parsed
    }

    fn print_help() {
        println!(
            r#"mapdl-session basic_session example

USAGE:
    cargo run --example basic_session -- [OPTIONS]

OPTIONS:
    -c, --command <CMD>      Engine start command [default: $MAPDL_START_COMMAND or ansys150]
    -f, --folder <DIR>       Run in an existing directory
    -r, --remote <USER@HOST> Start the engine over SSH
    -k, --key <PATH>         Private key for --remote [default: ~/.ssh/id_*]
        --keep               Keep the generated working directory
        --help               Print this help message
"#
        );
    }
}
