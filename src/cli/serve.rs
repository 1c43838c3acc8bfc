use super::config::FragnetConfig;
use fragnet::dht::MemoryDht;
use fragnet::Node;
use std::path::PathBuf;
use std::sync::Arc;

/// Run a node that stores the given files and serves their fragments.
///
/// The node uses a process-local DHT, so other processes cannot look its
/// files up by name. They fetch fragments directly from the printed address
/// with `fragnet fetch`, using the printed hashes.
pub async fn execute(
    config: &FragnetConfig,
    files: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let node = Node::start(config.node_config(None)?, Arc::new(MemoryDht::new())).await?;

    println!("Node:    {}", node.node_id());
    println!("Address: {}", node.address());
    println!();

    for path in &files {
        let manifest = node.store_file(path).await?;
        println!(
            "Serving {} ({} bytes, {} fragments)",
            manifest.filename, manifest.file_size, manifest.total_fragments
        );
        for hash in &manifest.fragment_hashes {
            println!("  {}", hash);
        }
    }

    println!();
    println!(
        "Fetch a file with: fragnet fetch --peer {} --output <FILE> <HASH>...",
        node.address()
    );
    println!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    node.shutdown();
    let stats = node.get_stats();
    println!(
        "Stopped: {} file(s), {} fragment(s)",
        stats.stored_files, stats.stored_fragments
    );
    Ok(())
}
