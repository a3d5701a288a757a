use std::{fs, path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as _, ValueEnum};

use crate::frontend::{SourceFile, SourceFileOrigin, lexer::Span};

mod backend;
mod frontend;
mod index;
mod middle;

/// Compiler for the Ye Olde Dragon language
#[derive(Debug, clap::Parser)]
#[command(version, about)]
struct Args {
    /// Source file to compile
    source_file: PathBuf,

    /// Compilation stage whose output is printed
    #[arg(long, value_enum, default_value_t = Emit::Js)]
    emit: Emit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// The parse tree
    Parsed,
    /// The checked and typed program
    Analyzed,
    /// The checked program after optimization
    Optimized,
    /// Generated JavaScript
    Js,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let contents = match fs::read_to_string(&args.source_file) {
        Ok(contents) => contents,
        Err(error) => Args::command()
            .error(
                clap::error::ErrorKind::Io,
                format!("failed to read `{}`: {error}", args.source_file.display()),
            )
            .exit(),
    };

    let source = SourceFile {
        contents,
        origin: SourceFileOrigin::File(args.source_file),
    };

    let program = match frontend::parser::Parser::parse_program(&source) {
        Ok(program) => program,
        Err(error) => return report(&source, error.span, &error.to_string()),
    };

    if args.emit == Emit::Parsed {
        println!("{program:#?}");
        return ExitCode::SUCCESS;
    }

    let program = match middle::analyze::analyze(&source, &program) {
        Ok(program) => program,
        Err(error) => return report(&source, error.span, &error.to_string()),
    };

    if args.emit == Emit::Analyzed {
        println!("{program:#?}");
        return ExitCode::SUCCESS;
    }

    let program = middle::optimize::optimize(program);

    if args.emit == Emit::Optimized {
        println!("{program:#?}");
        return ExitCode::SUCCESS;
    }

    println!("{}", backend::js::generate(&program));
    ExitCode::SUCCESS
}

fn report(source: &SourceFile, span: Span, error: &str) -> ExitCode {
    eprintln!("{}: {error}", source.origin);
    source.highlight_span(span);
    ExitCode::FAILURE
}
