//! Infix pattern to postfix token conversion.
//!
//! The pattern language is deliberately small: literal bytes, `.`, the
//! anchors `^` / `$`, the two-endpoint class shorthand `[x-y]`, grouping,
//! alternation and the postfix repetitions `*`, `+`, `?`.  A backslash
//! turns the following byte into a literal.
//!
//! Conversion is a shunting-yard pass over an operator stack.  Bindings,
//! lowest to highest:
//!
//! ```text
//! (  group-open      0
//! |  alternation     1
//! ·  concatenation   2   (implicit, inserted between adjacent operands)
//! * + ?  repetition  3
//! ```
//!
//! Repetitions are unary postfix operators with the highest binding, so
//! they are written to the output as soon as they are read.

use std::fmt;

use crate::Error;
use crate::nfa::AssertKind;

/// A postfix instruction consumed by [`Builder`](crate::nfa::Builder).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    /// A single literal byte.
    Byte(u8),
    /// Any byte in `lo..=hi`, produced by the `[lo-hi]` shorthand.
    Range { lo: u8, hi: u8 },
    /// `.`: any byte.
    Any,
    /// `^` or `$`.
    Assert(AssertKind),
    /// Implicit concatenation of the two preceding operands.
    Catenate,
    /// `|`
    Alternate,
    /// `?`
    RepeatZeroOne,
    /// `*`
    RepeatZeroPlus,
    /// `+`
    RepeatOnePlus,
}

/// Bytes that have an operator meaning and must be escaped to be read
/// as literals.
const META: &[u8] = b"|*+?().^$[\\";

fn write_byte(f: &mut fmt::Formatter<'_>, byte: u8) -> fmt::Result {
    if META.contains(&byte) {
        write!(f, "\\{}", byte as char)
    } else if byte.is_ascii_graphic() || byte == b' ' {
        write!(f, "{}", byte as char)
    } else {
        write!(f, "\\x{:02x}", byte)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Token::Byte(byte) => write_byte(f, byte),
            Token::Range { lo, hi } => {
                write!(f, "[")?;
                write_byte(f, lo)?;
                write!(f, "-")?;
                write_byte(f, hi)?;
                write!(f, "]")
            }
            Token::Any => write!(f, "."),
            Token::Assert(kind) => write!(f, "{}", kind.label()),
            Token::Catenate => write!(f, "·"),
            Token::Alternate => write!(f, "|"),
            Token::RepeatZeroOne => write!(f, "?"),
            Token::RepeatZeroPlus => write!(f, "*"),
            Token::RepeatOnePlus => write!(f, "+"),
        }
    }
}

/// Render a postfix sequence as text, using `·` for concatenation.
pub fn render(postfix: &[Token]) -> String {
    postfix.iter().map(ToString::to_string).collect()
}

/// How tightly an operator holds its operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Binding {
    Group = 0,
    Alternate = 1,
    Catenate = 2,
}

/// An entry on the operator stack.  Repetitions never reach the stack.
#[derive(Clone, Copy, Debug)]
enum Op {
    /// `(` and the offset it was read at, for diagnostics.
    Open(usize),
    Alternate,
    Catenate,
}

impl Op {
    fn binding(self) -> Binding {
        match self {
            Op::Open(_) => Binding::Group,
            Op::Alternate => Binding::Alternate,
            Op::Catenate => Binding::Catenate,
        }
    }
}

#[derive(Debug, Default)]
struct Compiler {
    output: Vec<Token>,
    ops: Vec<Op>,
    /// `false` at the start of the pattern, right after `(` and right
    /// after `|`; an operand read in those positions is not concatenated
    /// to anything.
    concat_next: bool,
}

impl Compiler {
    /// Pop and emit every stacked operator binding at least as tightly as
    /// `binding`.
    fn pop_while_binds(&mut self, binding: Binding) {
        while let Some(&op) = self.ops.last() {
            if op.binding() < binding {
                break;
            }
            self.ops.pop();
            self.emit_op(op);
        }
    }

    fn emit_op(&mut self, op: Op) {
        match op {
            Op::Alternate => self.output.push(Token::Alternate),
            Op::Catenate => self.output.push(Token::Catenate),
            Op::Open(_) => unreachable!("group-open is never emitted"),
        }
    }

    /// Emit an operand, inserting an implicit concatenation first when the
    /// previous token left an operand behind.
    fn operand(&mut self, token: Token) {
        if self.concat_next {
            self.pop_while_binds(Binding::Catenate);
            self.ops.push(Op::Catenate);
        }
        self.output.push(token);
        self.concat_next = true;
    }

    /// Parse the `[lo-hi]` shorthand starting at `pattern[at] == b'['`.
    /// Returns the token and the offset of the closing `]`.
    fn class(pattern: &[u8], at: usize) -> Result<(Token, usize), Error> {
        match pattern.get(at..at + 5) {
            Some(&[b'[', lo, b'-', hi, b']']) => Ok((Token::Range { lo, hi }, at + 4)),
            _ => Err(Error::MalformedClass { offset: at }),
        }
    }

    fn run(mut self, pattern: &[u8]) -> Result<Vec<Token>, Error> {
        let mut i = 0;
        while i < pattern.len() {
            match pattern[i] {
                b'|' => {
                    self.pop_while_binds(Binding::Alternate);
                    self.ops.push(Op::Alternate);
                    self.concat_next = false;
                }
                b'*' | b'+' | b'?' => {
                    self.output.push(match pattern[i] {
                        b'*' => Token::RepeatZeroPlus,
                        b'+' => Token::RepeatOnePlus,
                        _ => Token::RepeatZeroOne,
                    });
                    self.concat_next = true;
                }
                b'(' => {
                    if self.concat_next {
                        self.pop_while_binds(Binding::Catenate);
                        self.ops.push(Op::Catenate);
                    }
                    self.ops.push(Op::Open(i));
                    self.concat_next = false;
                }
                b')' => {
                    loop {
                        match self.ops.pop() {
                            Some(Op::Open(_)) => break,
                            Some(op) => self.emit_op(op),
                            None => return Err(Error::UnopenedGroup { offset: i }),
                        }
                    }
                    self.concat_next = true;
                }
                b'[' => {
                    let (token, end) = Self::class(pattern, i)?;
                    self.operand(token);
                    i = end;
                }
                b'\\' => {
                    let &byte = pattern.get(i + 1).ok_or(Error::DanglingEscape)?;
                    self.operand(Token::Byte(byte));
                    i += 1;
                }
                b'.' => self.operand(Token::Any),
                b'^' => self.operand(Token::Assert(AssertKind::Start)),
                b'$' => self.operand(Token::Assert(AssertKind::End)),
                byte => self.operand(Token::Byte(byte)),
            }
            i += 1;
        }

        while let Some(op) = self.ops.pop() {
            if let Op::Open(offset) = op {
                return Err(Error::UnclosedGroup { offset });
            }
            self.emit_op(op);
        }

        Ok(self.output)
    }
}

/// Convert an infix `pattern` into postfix tokens.
///
/// Only lexical problems are reported here (unbalanced parentheses,
/// a malformed `[x-y]`, a trailing `\`).  Operator/operand mismatches such
/// as `a|` or `*a` produce a token stream that the builder rejects.
pub fn compile(pattern: &[u8]) -> Result<Vec<Token>, Error> {
    Compiler::default().run(pattern)
}
