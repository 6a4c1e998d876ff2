pub mod address;
pub mod block;
pub mod cache;
pub mod config;
pub mod error;
pub mod explorer;
pub mod input;
pub mod metrics;
pub mod node;
pub mod opcodes;
pub mod output;
pub mod render;
pub mod script;
pub mod segwit;
pub mod stats;
pub mod telemetry;
pub mod tx;
pub mod value_reader;
