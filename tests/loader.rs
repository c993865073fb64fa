use std::io::Write;

use secd::{prelude::*, repl};

#[test]
fn load_file_evaluates_every_form() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "; library
(defvar *load-total* 0)
(defun load-add (n) (setq *load-total* (+ *load-total* n)))
(load-add 5)
(load-add 7)"
    )
    .unwrap();

    let mut rt = Runtime::new();
    assert_eq!(repl::load_file(&mut rt, file.path()).unwrap(), 4);
    assert!(matches!(rt.eval_str("*load-total*").unwrap(), Value::Integer(12)));
}

#[test]
fn load_stops_at_the_first_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "(defvar *load-seen* 1)\n(car 5)\n(setq *load-seen* 2)").unwrap();

    let mut rt = Runtime::new();
    let err = repl::load_file(&mut rt, file.path()).unwrap_err();
    assert_eq!(err.kind, Exception::TypeMismatch);
    assert!(matches!(rt.eval_str("*load-seen*").unwrap(), Value::Integer(1)));
}

#[test]
fn missing_and_truncated_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut rt = Runtime::new();
    let err = repl::load_file(&mut rt, dir.path().join("absent.lisp")).unwrap_err();
    assert_eq!(err.kind, Exception::Io);

    let truncated = dir.path().join("truncated.lisp");
    std::fs::write(&truncated, "(defun load-broken (x)").unwrap();
    let err = repl::load_file(&mut rt, &truncated).unwrap_err();
    assert_eq!(err.kind, Exception::Eof);
}
