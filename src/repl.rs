//! Read-eval-print loop and file loader.

use std::{
    io::{self, BufRead, Write},
    path::Path,
};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::{
    error::{Exception, LispError},
    print::pretty_print,
    reader::Reader,
    runtime::Runtime,
    LispResult,
};

const WIDTH: usize = 80;

/// Loads a source file into `runtime`, returning the number of forms.
pub fn load_file(runtime: &mut Runtime, path: impl AsRef<Path>) -> LispResult<usize> {
    runtime.load(path.as_ref())
}

pub fn report(err: &LispError) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {}", err);
}

/// Whole forms in `buffer`, or `None` if the last one is incomplete.
fn complete_forms(buffer: &str) -> LispResult<Option<Vec<crate::value::Value>>> {
    match Reader::new(buffer).read_all() {
        Ok(forms) => Ok(Some(forms)),
        Err(err) if err.kind == Exception::Eof => Ok(None),
        Err(err) => Err(err),
    }
}

/// Reads forms from stdin until end of input. A form may span lines; errors
/// are reported and the loop continues with a clean machine.
pub fn run(runtime: &mut Runtime) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let mut buffer = String::new();

    loop {
        write!(stdout, "{}", if buffer.is_empty() { "* " } else { "  " })?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            writeln!(stdout)?;
            return Ok(());
        }
        buffer.push_str(&line);

        let forms = match complete_forms(&buffer) {
            Ok(Some(forms)) => forms,
            Ok(None) => continue,
            Err(err) => {
                report(&err);
                buffer.clear();
                continue;
            }
        };
        buffer.clear();

        for form in forms {
            match runtime.eval(&form) {
                Ok(value) => {
                    pretty_print(&value, WIDTH, &mut stdout)?;
                    writeln!(stdout)?;
                }
                Err(err) => {
                    report(&err);
                    break;
                }
            }
        }
    }
}
