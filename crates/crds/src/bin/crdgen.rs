//! Prints the CRD manifests as a multi-document YAML stream.

use crds::{Lease, Network, Pool};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in [Lease::crd(), Pool::crd(), Network::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
