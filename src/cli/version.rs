use fragnet::fragment::DEFAULT_FRAGMENT_SIZE;
use fragnet::transport::PROTOCOL_ID;

/// Display version information
pub fn execute() {
    println!("fragnet {}", env!("CARGO_PKG_VERSION"));
    println!("Content-addressed file fragmentation over a DHT");
    println!("Transfer protocol: {}", PROTOCOL_ID);
    println!("Default fragment size: {} bytes", DEFAULT_FRAGMENT_SIZE);
}
