//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions the controller works with as one YAML stream.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/environment-controller.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use environment_controller::crd::render_crds;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", render_crds()?);
    Ok(())
}
