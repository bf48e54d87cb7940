pub mod environment;
pub mod instruction;
pub mod lexer;
pub mod parser;
pub mod run;
pub mod value;
pub mod vm;
pub mod writer;

mod builtins;
