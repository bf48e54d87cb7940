use anyhow::{Context, Result};

use crate::{environment::Environment, parser::Reader, value::consify, vm::VmError};

/// A single source file unit description
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct SourceFile {
    pub path: Option<String>,
    pub content: String,
}

/// Parse one buffer of top level expressions, already in instruction
/// form, and execute them as a single stream.  The whole buffer has to be
/// consumed for the load to count as successful.
pub fn load_source(env: &mut Environment, source: &str) -> Result<(), VmError> {
    let mut reader = Reader::new(source, env);
    let forms = reader.parse_all()?;
    reader.expect_eof()?;

    env.run_body(consify(forms))?;
    Ok(())
}

/// Start a machine and run a sequence of compiled sources against it in
/// order, returning it with every global binding they made
pub fn boot(sources: Vec<SourceFile>) -> Result<Environment> {
    let mut env = Environment::new();

    for source in &sources {
        load_source(&mut env, &source.content).with_context(|| match &source.path {
            Some(path) => format!("while loading {}", path),
            None => String::from("while loading input"),
        })?;
    }

    Ok(env)
}
