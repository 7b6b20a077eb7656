//! Unit test entry point for bytecode_system

mod test_encoding;
mod test_unit;
