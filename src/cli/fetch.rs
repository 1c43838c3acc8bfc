use super::config::FragnetConfig;
use fragnet::fragment::{assemble, ContentHash, Fragment};
use fragnet::retrieval::PeerFetcher;
use fragnet::transport::TcpPeerFetcher;
use std::path::PathBuf;

/// Fetch fragments by hash from one peer and write them to `output`.
///
/// Pairs with `serve`, which prints each stored file's fragment hashes in
/// file order. The fragments are joined in the order given, and nothing is
/// written unless every one of them verifies against its hash.
pub async fn execute(
    config: &FragnetConfig,
    peer: String,
    hashes: Vec<String>,
    output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetch_timeout = config.node_config(None)?.retrieval.fetch_timeout;
    let hashes = hashes
        .iter()
        .map(|hash| hash.parse::<ContentHash>())
        .collect::<Result<Vec<_>, _>>()?;
    let total = u32::try_from(hashes.len())?;
    let filename = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fetched".to_string());

    let fetcher = TcpPeerFetcher::new();
    let mut fragments = Vec::with_capacity(hashes.len());
    for (index, hash) in (0u32..).zip(&hashes) {
        let data = fetcher.fetch(hash, &peer, fetch_timeout).await?;
        println!("Fetched {} ({} bytes)", hash.short(), data.len());
        fragments.push(Fragment {
            content_hash: *hash,
            size: data.len(),
            index,
            total_fragments: total,
            filename: filename.clone(),
            data: Some(data),
        });
    }

    let report = assemble(&fragments, &output)?;
    println!(
        "Wrote {} bytes from {} fragment(s) to {}",
        report.bytes,
        report.fragments,
        output.display()
    );
    Ok(())
}
