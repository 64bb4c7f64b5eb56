//! Queue example: generate a large mesh in one round trip, then list it
//!
//! Every `send` waits for a prompt. Queued commands are written to a scratch
//! input file instead and run with a single `/input`, which is much faster
//! for procedurally generated models.
//!
//! # Usage
//!
//! ```bash
//! cargo build --bin mock_mapdl
//! cargo run --example queue_mesh -- target/debug/mock_mapdl 500
//! ```

use std::time::Instant;

use mapdl_session::{ListOptions, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let command = args.next();
    let count: usize = args.next().and_then(|n| n.parse().ok()).unwrap_or(200);

    let mut builder = Session::builder().cleanup(true);
    if let Some(command) = command {
        builder = builder.start_command(command);
    }
    let mut session = builder.build().await?;
    session.send("/prep7\net,1,beam188").await?;

    let start = Instant::now();
    for node in 1..=count {
        session
            .queue(&format!("n,{node},{},0,0", node as f64 * 0.1))
            .await?;
    }
    for element in 1..count {
        session.queue(&format!("e,{element},{}", element + 1)).await?;
    }
    println!("Queued {} lines", session.queued().await?.len());
    session.run_queue().await?;
    println!("Ran the queue in {:?}", start.elapsed());

    let nodes = session.get_list("nlist", &ListOptions::new()).await?;
    println!(
        "Listed {} nodes with columns {:?}",
        nodes.len(),
        nodes.columns().collect::<Vec<_>>()
    );

    let preview: Vec<_> = (0..nodes.len().min(3)).filter_map(|i| nodes.row(i)).collect();
    println!("First rows: {}", serde_json::to_string(&preview)?);

    session.close().await?;
    Ok(())
}
