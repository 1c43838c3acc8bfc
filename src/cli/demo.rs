use super::config::FragnetConfig;
use fragnet::dht::MemoryDht;
use fragnet::{Node, NodeStats};
use rand::RngCore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

/// Run an in-process network.
///
/// A bootstrap node and `nodes` storage nodes share one DHT and serve
/// fragments over TCP on loopback. The first storage node ingests the file,
/// the last one searches for it, downloads it and checks the bytes.
pub async fn execute(
    config: &FragnetConfig,
    file: Option<PathBuf>,
    nodes: usize,
    size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if nodes < 2 {
        return Err("demo needs at least 2 storage nodes".into());
    }

    let workdir = TempDir::new()?;
    let source = match file {
        Some(path) => path,
        None => {
            let path = workdir.path().join("demo.bin");
            let mut data = vec![0u8; size];
            rand::thread_rng().fill_bytes(&mut data);
            tokio::fs::write(&path, &data).await?;
            println!("Generated {} random bytes at {}", size, path.display());
            path
        }
    };

    let dht = Arc::new(MemoryDht::new());
    let mut network = Vec::with_capacity(nodes + 1);
    let names =
        std::iter::once("bootstrap".to_string()).chain((1..=nodes).map(|i| format!("node{i}")));
    for name in names {
        let mut node_config = config.node_config(Some(name.as_str()))?;
        node_config.listen_address = "127.0.0.1:0".to_string();
        let node = Node::start(node_config, dht.clone()).await?;
        println!("Started {} at {}", node.node_id(), node.address());
        network.push(node);
    }

    let storer = &network[1];
    let downloader = &network[nodes];

    println!();
    println!("== {} stores {}", storer.node_id(), source.display());
    let manifest = storer.store_file(&source).await?;
    println!(
        "Stored {} ({} bytes) as {} fragment(s)",
        manifest.filename, manifest.file_size, manifest.total_fragments
    );

    println!();
    println!("== {} searches for {}", downloader.node_id(), manifest.filename);
    let found = downloader
        .search_file(&manifest.filename)
        .await?
        .ok_or("manifest not visible to the downloading node")?;
    println!(
        "Found manifest: {} fragment(s), owner {}",
        found.total_fragments, found.owner_node_id
    );

    println!();
    println!("== {} downloads {}", downloader.node_id(), manifest.filename);
    let output = workdir.path().join(format!("downloaded-{}", manifest.filename));
    let started = Instant::now();
    let report = downloader.download_file(&manifest.filename, &output).await?;
    println!(
        "Downloaded {} bytes in {:.2?} ({:.2} MiB/s, {} remote, {} local)",
        report.bytes,
        started.elapsed(),
        report.throughput_bytes_per_sec() / (1024.0 * 1024.0),
        report.remote_fetches,
        report.local_hits
    );

    let original = tokio::fs::read(&source).await?;
    let downloaded = tokio::fs::read(&output).await?;
    if original != downloaded {
        return Err("downloaded bytes differ from the original".into());
    }
    println!("Verified: downloaded file is identical to the original");

    println!();
    println!("== Stats");
    for node in &network {
        print_stats(&node.get_stats());
        node.shutdown();
    }

    Ok(())
}

fn print_stats(stats: &NodeStats) {
    println!(
        "{:<10} {:<22} fragments={:<4} files={:<3} bytes={:<9} active={}",
        stats.node_id,
        stats.address,
        stats.stored_fragments,
        stats.stored_files,
        stats.stored_bytes,
        stats.active_retrievals
    );
}
