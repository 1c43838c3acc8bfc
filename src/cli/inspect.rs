use super::config::FragnetConfig;
use fragnet::fragment::{Fragment, Fragmenter};
use fragnet::registry::FileManifest;
use std::path::PathBuf;

/// Owner recorded in manifests built offline
const OFFLINE_OWNER: &str = "offline";

/// Fragment a file without touching the network and print its manifest.
pub async fn execute(
    config: &FragnetConfig,
    path: PathBuf,
    fragment_size: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let fragmenter = Fragmenter::new(fragment_size.unwrap_or(config.fragments.fragment_size))?;
    let (filename, fragments) = fragmenter.fragment_file(&path).await?;
    let manifest = FileManifest::from_fragments(&filename, &fragments, OFFLINE_OWNER);

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        print!("{}", render(&manifest, &fragments, fragmenter.fragment_size()));
    }
    Ok(())
}

fn render(manifest: &FileManifest, fragments: &[Fragment], fragment_size: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("File:          {}\n", manifest.filename));
    out.push_str(&format!("Size:          {} bytes\n", manifest.file_size));
    out.push_str(&format!("Fragment size: {} bytes\n", fragment_size));
    out.push_str(&format!("Fragments:     {}\n", manifest.total_fragments));
    out.push('\n');
    out.push_str(&format!("{:>6}  {:>8}  {}\n", "index", "size", "sha256"));
    for fragment in fragments {
        out.push_str(&format!(
            "{:>6}  {:>8}  {}\n",
            fragment.index, fragment.size, fragment.content_hash
        ));
    }
    out
}
