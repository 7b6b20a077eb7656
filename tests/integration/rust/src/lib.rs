//! Integration test suite for the bytecode engine
//!
//! Tests here cross component boundaries: serialized units run by the
//! engine, the engine's use of the managed heap, and installed native
//! code backed by the executable allocator.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use exec_allocator;
    pub use interpreter;
    pub use memory_manager;
}
