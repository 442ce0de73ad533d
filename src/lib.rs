//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and composable so they can be evolved independently:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `codegen` lowers the AST straight into a 16-bit DOS `.COM` image.
//! - `ty` describes the storage types a declaration can name.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod codegen;
pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod ty;

#[cfg(test)]
mod machine;

pub use codegen::CompileOptions;
pub use error::{CompileError, CompileResult};

/// Compile a source string into a `.COM` image with the default layout.
pub fn generate_image(source: &str) -> CompileResult<Vec<u8>> {
  generate_image_with(source, &CompileOptions::default())
}

/// Compile a source string into an image laid out as `options` says.
pub fn generate_image_with(source: &str, options: &CompileOptions) -> CompileResult<Vec<u8>> {
  let tokens = tokenizer::tokenize(source)?;
  let program = parser::parse(tokens, source)?;
  codegen::compile(&program, options)
}
