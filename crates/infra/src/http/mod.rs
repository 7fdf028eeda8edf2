//! HTTP-backed port implementations

pub mod probe;

pub use probe::ReqwestProxyProbe;
