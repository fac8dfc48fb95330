//! Ready-made node types.

pub mod echo;
pub mod hole;
pub mod port;
pub mod relay;

use crate::error::{NgError, NgResult};
use crate::graph::Graph;

/// Register `echo`, `hole`, `relay` and `port`. Types already present are kept.
pub fn register_all(graph: &Graph) -> NgResult<()> {
    let results = [
        graph.register_type(echo::EchoType),
        graph.register_type(hole::HoleType),
        graph.register_type(relay::RelayType),
        graph.register_type(port::PortType),
    ];
    for res in results {
        match res {
            Ok(()) | Err(NgError::Exists) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
