pub mod binance;
pub mod lifecycle;
pub mod poller;

pub use binance::BinanceClient;
pub use lifecycle::{Engine, EngineHandle};
pub use poller::{CycleReport, Poller, SymbolFailure};
