//! Instantaneous CPU and memory readings from procfs.

pub mod cpu;
pub mod memory;

pub use cpu::CpuCollector;
pub use memory::MemoryCollector;
