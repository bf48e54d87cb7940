use std::{
    fmt::{self, Display},
    fs,
    io::{self, Read},
    rc::Rc,
};

use anyhow::Result;
use clap::{clap_app, crate_authors, crate_description, crate_version};
use rustyline::{error::ReadlineError, DefaultEditor};
use thiserror::Error;

use vm::{
    environment::Environment,
    parser::{ParseError, Reader},
    run::{boot, SourceFile},
    value::{consify, Value},
    vm::VmError,
    writer::{write_value, ValuePrinter},
};


/// Errors encountered while interpreting the input arguments
#[derive(Debug, Error)]
enum InputError {
    #[error("Encountered errors while reading files:\n{files}")]
    FileError { files: IoErrorVec },
}

/// New type wrapper to provide display impl
#[derive(Debug)]
struct IoErrorVec(Vec<io::Error>);

impl Display for IoErrorVec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "{}", err)?;
        }

        Ok(())
    }
}

fn main() {
    if let Err(e) = run() {
        println!("Error:\n{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = clap_app!(sprig =>
        (version: crate_version!())
        (author: crate_authors!())
        (about: crate_description!())
        (@arg input: +multiple "Compiled instruction files to load in order.  \"-\" reads from stdin.")
        (@arg eval: -e --eval +takes_value "Evaluate one expression after loading, print its value and exit")
        (@arg instructions: -i --instructions "Run entered input directly as instruction streams instead of compiling it with compile-exp")
    )
    .get_matches();

    let mut sources = vec![];

    if let Some(file_names) = matches.values_of("input") {
        // any file read errors
        let mut errors = vec![];

        for file in file_names {
            // file name "-" == read from stdin
            if file == "-" {
                match get_stdin() {
                    Ok(input) => sources.push(input),
                    Err(err) => errors.push(err),
                }
            } else {
                match fs::read_to_string(file) {
                    Ok(input) => sources.push(SourceFile {
                        path: Some(file.to_string()),
                        content: input,
                    }),
                    Err(err) => errors.push(err),
                }
            }
        }

        if !errors.is_empty() {
            return Err(InputError::FileError {
                files: IoErrorVec(errors),
            }
            .into());
        }
    }

    let mut env = boot(sources)?;
    register_file_natives(&mut env);

    let raw_instructions = matches.is_present("instructions");

    if let Some(exp) = matches.value_of("eval") {
        let value = eval_line(&mut env, exp, raw_instructions)?;
        println!("{}", ValuePrinter::new(&value, &env));
        return Ok(());
    }

    repl(&mut env, raw_instructions)
}

/// Parse one complete entry, as a whole instruction stream in
/// instruction mode or as a single expression for the compiler.  Errors
/// out of here are about the entry text itself, so the incomplete kind
/// means the entry continues on the next line.
fn read_entry(env: &mut Environment, text: &str, raw_instructions: bool) -> Result<Value, ParseError> {
    let mut reader = Reader::new(text, env);

    if raw_instructions {
        let forms = reader.parse_all()?;
        reader.expect_eof()?;
        return Ok(consify(forms));
    }

    let exp = reader.parse_exp()?;
    reader.expect_eof()?;
    Ok(exp)
}

/// Run one parsed entry.  Any error from here on is a machine error,
/// even a parse error raised by something the entry did while running.
fn eval_entry(env: &mut Environment, entry: Value, raw_instructions: bool) -> Result<Value, VmError> {
    if raw_instructions {
        return env.run_expr(entry);
    }

    // the compiler is itself a loaded program, reached through the same
    // calling convention as anything else
    let code = env.call_global("compile-exp", vec![entry])?;
    env.run_expr(code)
}

/// Parse one entry and run it, for the --eval path
fn eval_line(env: &mut Environment, line: &str, raw_instructions: bool) -> Result<Value, VmError> {
    let entry = read_entry(env, line, raw_instructions)?;
    eval_entry(env, entry, raw_instructions)
}

/// Read entries from the terminal and run them until end of input.
/// Reading and running are separate phases: only an entry whose text
/// stops mid-expression keeps accumulating lines, every error raised
/// while the entry runs is reported.  The machine keeps all of its state
/// across reported errors.
fn repl(env: &mut Environment, raw_instructions: bool) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "sprig> " } else { "...... " };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };

        pending.push_str(&line);
        pending.push('\n');

        if pending.trim().is_empty() {
            pending.clear();
            continue;
        }

        let entry = match read_entry(env, &pending, raw_instructions) {
            Ok(entry) => entry,
            Err(err) if err.is_incomplete() => {
                // the expression continues on the next line
                continue;
            }
            Err(err) => {
                editor.add_history_entry(pending.trim_end())?;
                eprintln!("{}", err);
                pending.clear();
                continue;
            }
        };

        editor.add_history_entry(pending.trim_end())?;
        pending.clear();

        match eval_entry(env, entry, raw_instructions) {
            Ok(value) => println!("{}", ValuePrinter::new(&value, env)),
            Err(err) => {
                eprintln!("{}", err);
                if let VmError::UnboundGlobal { name } = &err {
                    if let Some(hint) = nearest_global(env, name) {
                        eprintln!("perhaps you meant `{}`", hint);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Find the bound global whose name is most similar to an unbound one,
/// if any is close enough to be worth suggesting
fn nearest_global(env: &Environment, name: &str) -> Option<String> {
    let best = env
        .global_names()
        .map(|candidate| {
            (
                candidate,
                strsim::normalized_damerau_levenshtein(candidate, name),
            )
        })
        .fold(None, |best: Option<(&str, f64)>, next| match best {
            Some((_, sim)) if sim >= next.1 => best,
            _ => Some(next),
        });

    match best {
        Some((candidate, sim)) if sim >= 0.5 => Some(candidate.to_string()),
        _ => None,
    }
}

/// Register the two file extension points: a reader producing the list of
/// forms in a file and a writer emitting one form per line.  Programs
/// reach them as ordinary globals.
fn register_file_natives(env: &mut Environment) {
    env.register_native("read-file", read_file_native);
    env.register_native("write-file", write_file_native);
}

/// (read-file "path") -> list of the forms in the file
fn read_file_native(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    let path = string_arg(args, env)?;
    let content = fs::read_to_string(&*path)?;

    let mut reader = Reader::new(&content, env);
    let forms = reader.parse_all()?;
    reader.expect_eof()?;
    Ok(consify(forms))
}

/// (write-file "path" forms) -> (), writes one serialized form per line
fn write_file_native(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    let (path, forms) = match args {
        [Value::String(path), forms] => (path.clone(), forms.clone()),
        [other, _] => {
            return Err(VmError::NotAString {
                found: ValuePrinter::new(other, env).to_string(),
            })
        }
        _ => return Err(wrong_count(args.len(), 2)),
    };

    let mut out = String::new();
    for form in forms.iter_list() {
        out.push_str(&write_value(form?, env)?);
        out.push('\n');
    }

    fs::write(&*path, out)?;
    Ok(Value::Nil)
}

/// A single string argument, for the path taking natives
fn string_arg(args: &[Value], env: &Environment) -> Result<Rc<str>, VmError> {
    match args {
        [Value::String(path)] => Ok(path.clone()),
        [other] => Err(VmError::NotAString {
            found: ValuePrinter::new(other, env).to_string(),
        }),
        _ => Err(wrong_count(args.len(), 1)),
    }
}

fn wrong_count(got: usize, expected: usize) -> VmError {
    if got < expected {
        VmError::TooFewArguments { expected, got }
    } else {
        VmError::TooManyArguments { expected, got }
    }
}

/// read source code from stdin
fn get_stdin() -> Result<SourceFile, io::Error> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    Ok(SourceFile {
        path: Some("stdin".to_string()),
        content: input,
    })
}
