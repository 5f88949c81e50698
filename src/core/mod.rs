// Core module - collaborator traits the scanner is built around
pub mod prober;

pub use prober::{Prober, TcpConnectProber};
