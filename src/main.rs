//! # Gossip Key Rotator
//!
//! Sidecar entrypoint. Configuration comes from the environment; see
//! [`gossip_key_rotator::config`].
//!
//! ## Usage
//!
//! ```bash
//! GOSSIP_ENCRYPTION_FILE=/consul/gossip/key \
//! POD_IP=10.0.0.5 \
//! CONSUL_HTTP_ADDR=http://127.0.0.1:8500 \
//! gossip-key-rotator
//! ```

use anyhow::Result;
use gossip_key_rotator::runtime::initialize;

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = initialize().await?;
    runtime.run().await
}
