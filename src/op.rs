//! The SECD instruction vocabulary.
//!
//! Opcodes are ordinary values ([`crate::value::Value::Opcode`]) placed in
//! instruction lists next to their operands.

macro_rules! op {
    ($($op: ident $name: literal),* $(,)?) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum Opcode {
            $($op,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$op,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$op => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Opcode> {
                match name {
                    $($name => Some(Opcode::$op),)*
                    _ => None,
                }
            }
        }
    };
}

op! {
    Nil "NIL",
    T "T",
    // LDC x
    Ldc "LDC",
    // LD (i . j)
    Ld "LD",
    // LDR (i . j): the &REST tail of a frame
    Ldr "LDR",
    // LDG sym
    Ldg "LDG",
    // LDFN sym
    Ldfn "LDFN",
    // LDF arity code
    Ldf "LDF",
    Cons "CONS",
    // LIS n
    Lis "LIS",
    Ap "AP",
    Tap "TAP",
    Dum "DUM",
    Rap "RAP",
    Rtn "RTN",
    // SEL then else
    Sel "SEL",
    Join "JOIN",
    // TEST then; the else branch is the rest of C
    Test "TEST",
    // SP_BIND sym
    SpBind "SP_BIND",
    // SP_UNBIND sym
    SpUnbind "SP_UNBIND",
    // BLK tag body
    Blk "BLK",
    Unblk "UNBLK",
    // RTN_FROM tag
    RtnFrom "RTN_FROM",
    Pop "POP",
    // ST (i . j)
    St "ST",
    // STG sym
    Stg "STG",
    // DEFUN sym
    Defun "DEFUN",
    // DEFMACRO sym
    Defmacro "DEFMACRO",
    Stop "STOP",
}
