use std::path::PathBuf;

use crate::utils::env::{read_uint_from_env, read_uint_from_str};

pub const DEFAULT_MAX_DUMP_DEPTH: usize = 256 * 1024;
pub const DEFAULT_MAX_LIST_LENGTH: usize = 16 * 1024 * 1024;
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 512;

/// Policy limits and diagnostics of a [`crate::vm::Machine`].
#[derive(Clone, Debug)]
pub struct MachineOptions {
    /// Bound on the **D** register. Exceeding it is a `LimitExceeded` error
    /// instead of unbounded growth.
    pub max_dump_depth: usize,
    /// Bound on list walks (argument lists, `LENGTH`, ...).
    pub max_list_length: usize,
    /// Log every executed instruction at `trace` level.
    pub trace: bool,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            max_dump_depth: DEFAULT_MAX_DUMP_DEPTH,
            max_list_length: DEFAULT_MAX_LIST_LENGTH,
            trace: false,
        }
    }
}

impl MachineOptions {
    /// Defaults, overridden by `SECD_MAX_DUMP_DEPTH` and `SECD_MAX_LIST_LENGTH`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(depth) = read_uint_from_env("SECD_MAX_DUMP_DEPTH") {
            options.max_dump_depth = depth;
        }
        if let Some(length) = read_uint_from_env("SECD_MAX_LIST_LENGTH") {
            options.max_list_length = length;
        }
        options
    }
}

#[derive(Clone, Debug)]
pub struct CompilerOptions {
    /// Calls to unknown functions are compile-time errors. When off they are
    /// warnings and the lookup happens at run time.
    pub strict_functions: bool,
    pub max_expansion_depth: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            strict_functions: true,
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
        }
    }
}

/// Command line configuration of the `secd` binary.
#[derive(Clone, Debug, Default)]
pub struct Options {
    pub machine: MachineOptions,
    pub compiler: CompilerOptions,
    pub files: Vec<PathBuf>,
    pub eval: Vec<String>,
    /// Print the compiled code of every top-level form.
    pub disassemble: bool,
    /// Enter the REPL after loading files and evaluating `-e` expressions.
    pub interactive: bool,
}

impl Options {
    pub fn new() -> Self {
        Options {
            machine: MachineOptions::from_env(),
            ..Default::default()
        }
    }

    pub fn parse() -> Result<Self, String> {
        parse(pico_args::Arguments::from_env())
    }
}

fn size_option(args: &mut pico_args::Arguments, key: &'static str, default: usize) -> Result<usize, String> {
    match args.opt_value_from_str::<_, String>(key) {
        Ok(Some(size)) => read_uint_from_str(&size).ok_or_else(|| format!("invalid size for {}: {}", key, size)),
        Ok(None) => Ok(default),
        Err(e) => Err(e.to_string()),
    }
}

pub fn parse(mut args: pico_args::Arguments) -> Result<Options, String> {
    let mut options = Options::new();

    if args.contains(["-h", "--help"]) {
        println!("Usage: secd [options] [files...]");
        println!("Options:");
        println!("  -h, --help: Print this help message");
        println!("  -e, --eval <expr>: Evaluate an expression and print the result (repeatable)");
        println!("  -i, --interactive: Start the REPL after loading files");
        println!("  --disassemble: Print compiled code of each top-level form");
        println!("  --trace: Trace executed instructions (use RUST_LOG=secd::vm=trace)");
        println!("  --lenient: Accept calls to functions defined later");
        println!("  --max-dump-depth <size>: Bound the dump register (default: 256k)");
        println!("  --max-list-length <size>: Bound list walks (default: 16m)");
        println!("  --max-expansion-depth <n>: Bound nested macro expansion (default: 512)");
        std::process::exit(0);
    }

    options.machine.max_dump_depth =
        size_option(&mut args, "--max-dump-depth", options.machine.max_dump_depth)?;
    options.machine.max_list_length =
        size_option(&mut args, "--max-list-length", options.machine.max_list_length)?;
    options.compiler.max_expansion_depth = size_option(
        &mut args,
        "--max-expansion-depth",
        options.compiler.max_expansion_depth,
    )?;

    options.machine.trace = args.contains("--trace");
    options.compiler.strict_functions = !args.contains("--lenient");
    options.disassemble = args.contains("--disassemble");
    options.interactive = args.contains(["-i", "--interactive"]);

    loop {
        match args.opt_value_from_str::<_, String>(["-e", "--eval"]) {
            Ok(Some(expr)) => options.eval.push(expr),
            Ok(None) => break,
            Err(e) => return Err(e.to_string()),
        }
    }

    for file in args.finish() {
        let file = PathBuf::from(file);
        if file.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", file.display()));
        }
        options.files.push(file);
    }

    if options.files.is_empty() && options.eval.is_empty() {
        options.interactive = true;
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn parse_args(args: &[&str]) -> Result<Options, String> {
        parse(pico_args::Arguments::from_vec(
            args.iter().map(OsString::from).collect(),
        ))
    }

    #[test]
    fn flags_and_files() {
        let options = parse_args(&[
            "--trace",
            "--lenient",
            "--max-dump-depth",
            "4k",
            "-e",
            "(+ 1 2)",
            "-e",
            "(car '(1))",
            "a.lisp",
            "b.lisp",
        ])
        .unwrap();
        assert!(options.machine.trace);
        assert!(!options.compiler.strict_functions);
        assert_eq!(options.machine.max_dump_depth, 4096);
        assert_eq!(options.eval, vec!["(+ 1 2)", "(car '(1))"]);
        assert_eq!(options.files.len(), 2);
        assert!(!options.interactive);
    }

    #[test]
    fn no_input_means_interactive() {
        let options = parse_args(&[]).unwrap();
        assert!(options.interactive);
        assert!(options.compiler.strict_functions);
    }

    #[test]
    fn bad_sizes_and_unknown_flags_are_rejected() {
        assert!(parse_args(&["--max-dump-depth", "deep"]).is_err());
        assert!(parse_args(&["--frobnicate"]).is_err());
    }
}
