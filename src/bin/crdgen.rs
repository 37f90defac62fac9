//! Prints the custom resource definitions as a multi-document YAML stream.
//!
//! ```sh
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use gateway_config_controller::crd::{Gateway, Repository, StateStore};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    for crd in [Gateway::crd(), Repository::crd(), StateStore::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
