pub mod reachability;

pub use reachability::{
    BatchResult, Connector, ProbeOutcome, ProbeReport, Prober, TcpConnector, WriteFailure,
};
