//! Jinx Compiler: source text → bytecode (spec §4.1/§4.2).
//!
//! `compile` is the single public entry point a host (`jinx-runtime`'s
//! `Library::compile`) calls: tokenize, then parse straight into bytecode,
//! registering any function/property declarations the script contains
//! against the shared `SymbolTable` as it goes.

pub mod lexer;
pub mod parser;

use jinx_core::error::JinxError;
use jinx_core::registry::SymbolTable;

pub use lexer::{Literal, Token, TokenKind};
pub use parser::{parse_native_signature, CompiledScript, Parser};

/// Compile `source` (a complete script) into bytecode against `registry`.
pub fn compile(source: &str, script_name: &str, registry: &SymbolTable) -> Result<CompiledScript, JinxError> {
    compile_with_imports(source, script_name, registry, &[])
}

/// `compile`, plus a host-supplied list of libraries to import as if each
/// had its own leading `import <name>` line — the host-side half of spec
/// §6's `Runtime.compile(text, name, imports)`, for hosts that want a
/// script to see a library without editing its source.
pub fn compile_with_imports(
    source: &str,
    script_name: &str,
    registry: &SymbolTable,
    imports: &[String],
) -> Result<CompiledScript, JinxError> {
    let keywords = lexer::keyword_table();
    let tokens = lexer::tokenize(source, script_name, &keywords)?;
    for lib in imports {
        registry.get_or_create_library(lib);
    }
    parser::parse_with_imports(tokens, registry, script_name, imports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_trivial_assignment() {
        let registry = SymbolTable::new();
        let compiled = compile("set a to 1\nset b to a\n", "test", &registry).unwrap();
        assert!(!compiled.buffer.is_empty());
    }

    #[test]
    fn rejects_unknown_identifier_reference() {
        let registry = SymbolTable::new();
        let err = compile("set a to unknownthing\n", "test", &registry).unwrap_err();
        assert!(matches!(err, JinxError::Syntax { .. }));
    }

    #[test]
    fn compiles_a_public_property_then_references_it() {
        let registry = SymbolTable::new();
        let compiled = compile(
            "library demo\nset public count to 0\nset count to count + 1\n",
            "test",
            &registry,
        )
        .unwrap();
        assert!(!compiled.buffer.is_empty());
        assert_eq!(registry.properties_in_library("demo").len(), 1);
    }

    #[test]
    fn compiles_a_readonly_property_declaration() {
        let registry = SymbolTable::new();
        let compiled = compile("library demo\nset public readonly limit to 10\n", "test", &registry).unwrap();
        assert!(!compiled.buffer.is_empty());
        let props = registry.properties_in_library("demo");
        assert_eq!(props.len(), 1);
        assert!(props[0].read_only);
    }

    #[test]
    fn compiles_a_bare_readonly_property_declaration() {
        let registry = SymbolTable::new();
        let compiled = compile("library demo\nset readonly limit to 10\n", "test", &registry).unwrap();
        assert!(!compiled.buffer.is_empty());
        let props = registry.properties_in_library("demo");
        assert_eq!(props.len(), 1);
        assert!(props[0].read_only);
        assert!(matches!(props[0].visibility, jinx_core::signature::Visibility::Public));
    }

    #[test]
    fn compiles_counter_and_iterator_loops() {
        let registry = SymbolTable::new();
        let compiled = compile(
            "set total to 0\nloop i from 1 to 3\n  set total to total + i\nend\n\
             set c to [1, \"a\", 2, \"b\"]\nset out to \"\"\nloop over c\nend\n",
            "test",
            &registry,
        )
        .unwrap();
        assert!(!compiled.buffer.is_empty());
    }

    #[test]
    fn compiles_a_function_definition_and_call() {
        let registry = SymbolTable::new();
        let compiled = compile(
            "library math\n\
             function add {a} to {b}\n  return a + b\nend\n\
             set result to add 1 to 2\n",
            "test",
            &registry,
        )
        .unwrap();
        assert!(!compiled.buffer.is_empty());
        assert_eq!(registry.functions_in_library("math").len(), 1);
    }
}
