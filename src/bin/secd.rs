use secd::{prelude::*, repl};

fn main() {
    env_logger::init();

    let options = match Options::parse() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("secd: {}", err);
            std::process::exit(2);
        }
    };

    let mut runtime = Runtime::with_options(&options);

    for file in &options.files {
        if let Err(err) = repl::load_file(&mut runtime, file) {
            eprintln!("secd: while loading {}:", file.display());
            repl::report(&err);
            std::process::exit(1);
        }
    }

    for expr in &options.eval {
        match runtime.eval_str(expr) {
            Ok(value) => println!("{}", value),
            Err(err) => {
                repl::report(&err);
                std::process::exit(1);
            }
        }
    }

    if options.interactive {
        if let Err(err) = repl::run(&mut runtime) {
            eprintln!("secd: {}", err);
            std::process::exit(1);
        }
    }
}
