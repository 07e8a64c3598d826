//! 记忆层：有界的自适应记忆（用于 Provider 预热与统计）

pub mod adaptive;

pub use adaptive::{AdaptiveMemory, MemoryAnalysis, MemoryEntry};
