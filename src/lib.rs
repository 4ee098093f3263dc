// Library for tests to access modules

pub mod config;
pub mod correlator;
pub mod exporter;
pub mod gate;
pub mod models;
pub mod probe;
pub mod rates;
pub mod registry;
pub mod routes;
pub mod sampler;
pub mod snapshot;
pub mod transport;
pub mod version;
pub mod worker;
