use num::BigInt;
use secd::{
    prelude::*,
    reader::read_str,
    value::{eql, equal},
};

fn eval(runtime: &mut Runtime, src: &str) -> Value {
    match runtime.eval_str(src) {
        Ok(value) => value,
        Err(err) => panic!("{} failed: {}", src, err),
    }
}

fn read(src: &str) -> Value {
    read_str(src).unwrap()
}

#[test]
fn integer_overflow_promotes_to_bignum() {
    let mut rt = Runtime::new();
    eval(&mut rt, "(defun prop-add (a b) (+ a b))");
    let sum = eval(&mut rt, "(prop-add 9223372036854775807 1)");
    match &sum {
        Value::Bignum(n) => assert_eq!(**n, BigInt::from(i64::MAX) + 1),
        other => panic!("expected a bignum, got {}", other),
    }
    assert!(eql(&sum, &read("9223372036854775808")));

    let back = eval(&mut rt, "(prop-add 9223372036854775808 -1)");
    assert!(matches!(back, Value::Integer(i64::MAX)));
}

#[test]
fn reals_are_contagious() {
    let mut rt = Runtime::new();
    eval(&mut rt, "(defun prop-mix (a b c) (list (+ a b c) (* a b c) (- a b c)))");
    let result = eval(&mut rt, "(prop-mix 3 0.5 2)");
    let expected = [5.5, 3.0, 0.5];
    for (value, want) in result.iter().zip(expected) {
        match value {
            Value::Real(x) => assert!((x - want).abs() < 1e-12, "{} != {}", x, want),
            other => panic!("expected a real, got {}", other),
        }
    }
}

#[test]
fn arguments_are_evaluated_left_to_right() {
    let mut rt = Runtime::new();
    eval(&mut rt, "(defvar *prop-order* nil)");
    eval(
        &mut rt,
        "(defun prop-note (n) (setq *prop-order* (cons n *prop-order*)) n)",
    );
    let values = eval(&mut rt, "(list (prop-note 1) (prop-note 2) (prop-note 3))");
    assert!(equal(&values, &read("(1 2 3)")));
    let order = eval(&mut rt, "(reverse *prop-order*)");
    assert!(equal(&order, &read("(1 2 3)")));
}

#[test]
fn tail_calls_run_in_constant_dump_space() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "(defun prop-count (n acc) (if (= n 0) acc (prop-count (- n 1) (+ acc 1))))",
    );
    let result = eval(&mut rt, "(prop-count 1000000 0)");
    assert!(matches!(result, Value::Integer(1_000_000)));
    assert!(rt.machine().stats().max_dump_depth <= 2);
}

#[test]
fn letrec_functions_see_each_other() {
    let mut rt = Runtime::new();
    let result = eval(
        &mut rt,
        "(letrec ((ev (lambda (n) (if (= n 0) t (od (- n 1)))))
                  (od (lambda (n) (if (= n 0) nil (ev (- n 1))))))
           (list (ev 10) (od 7) (ev 7) (ev 100000)))",
    );
    assert!(equal(&result, &read("(t t nil t)")));
}

#[test]
fn special_bindings_restore_on_return_and_non_local_exit() {
    let mut rt = Runtime::new();
    eval(&mut rt, "(defvar *prop-depth* 0)");
    eval(&mut rt, "(defun prop-peek () *prop-depth*)");

    let nested = eval(
        &mut rt,
        "(let ((*prop-depth* 1))
           (list (let ((*prop-depth* 2)) (prop-peek)) (prop-peek)))",
    );
    assert!(equal(&nested, &read("(2 1)")));
    assert!(matches!(eval(&mut rt, "*prop-depth*"), Value::Integer(0)));

    let escaped = eval(
        &mut rt,
        "(list (block prop-out
                 (let ((*prop-depth* 1))
                   (let ((*prop-depth* 2))
                     (return-from prop-out (prop-peek)))))
               (prop-peek))",
    );
    assert!(equal(&escaped, &read("(2 0)")));
}

#[test]
fn rplaca_is_visible_through_every_reference() {
    let mut rt = Runtime::new();
    let result = eval(
        &mut rt,
        "(let* ((a (list 1 2)) (b a))
           (rplaca b 10)
           (rplacd (cdr a) '(3))
           (list (car a) b))",
    );
    assert!(equal(&result, &read("(10 (10 2 3))")));
}

#[test]
fn literals_round_trip() {
    let mut rt = Runtime::new();
    for src in ["42", "-1.5", "\"text\"", "#\\a", ":keyword", "99999999999999999999999"] {
        let literal = read(src);
        let code = rt.compile(&literal).unwrap();
        let value = rt.execute(code).unwrap();
        assert!(eql(&value, &literal), "{}", src);
    }

    let quoted = read("'(1 (2 \"x\") (a . 3))");
    let code = rt.compile(&quoted).unwrap();
    let value = rt.execute(code).unwrap();
    assert!(equal(&value, &quoted.cadr().unwrap()));
}

#[test]
fn letrec_frames_are_freed_with_their_last_closure() {
    let mut rt = Runtime::new();
    let closure = eval(&mut rt, "(labels ((prop-f () 1)) #'prop-f)");
    let Value::Function(func) = &closure else {
        panic!("expected a function, got {}", closure);
    };
    let Value::Cons(frame) = func.env().unwrap() else {
        panic!("labels closure has no frame");
    };
    let func_handle = std::sync::Arc::downgrade(func);
    let frame_handle = frame.downgrade();
    drop(frame);
    drop(closure);
    assert!(func_handle.upgrade().is_none());
    assert!(frame_handle.upgrade().is_none());
}

#[test]
fn escaped_letrec_closures_keep_their_frame() {
    let mut rt = Runtime::new();
    eval(
        &mut rt,
        "(defvar *prop-fact*
           (labels ((fact (n) (if (= n 0) 1 (* n (fact (- n 1))))))
             #'fact))",
    );
    assert!(equal(&eval(&mut rt, "(funcall *prop-fact* 5)"), &read("120")));
    eval(
        &mut rt,
        "(defvar *prop-parity*
           (letrec ((ev (lambda (n) (if (= n 0) t (od (- n 1)))))
                    (od (lambda (n) (if (= n 0) nil (ev (- n 1))))))
             (list ev od)))",
    );
    assert!(equal(&eval(&mut rt, "(funcall (car *prop-parity*) 10)"), &Value::True));
    assert!(equal(&eval(&mut rt, "(funcall (car (cdr *prop-parity*)) 10)"), &Value::Nil));
}

#[test]
fn applied_argument_lists_respect_the_list_limit() {
    let mut options = Options::default();
    options.machine.max_list_length = 10;
    let mut rt = Runtime::with_options(&options);
    let long: Vec<String> = (0..100).map(|i| i.to_string()).collect();
    let long = long.join(" ");

    for src in [
        format!("(apply #'+ '({}))", long),
        format!("(apply #'list '({}))", long),
        format!("(apply (lambda (&rest xs) xs) '({}))", long),
    ] {
        match rt.eval_str(&src) {
            Err(err) => assert_eq!(err.kind, Exception::LimitExceeded, "{}", src),
            Ok(value) => panic!("{} returned {}", src, value),
        }
    }

    eval(&mut rt, "(defvar *prop-ring* (list 1 2 3))");
    eval(&mut rt, "(rplacd (cdr (cdr *prop-ring*)) *prop-ring*)");
    let err = rt.eval_str("(apply #'+ *prop-ring*)").unwrap_err();
    assert_eq!(err.kind, Exception::LimitExceeded);

    assert!(equal(&eval(&mut rt, "(apply #'+ '(1 2 3 4 5))"), &read("15")));
}
