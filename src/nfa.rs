//! Thompson construction: postfix tokens to an arena-backed NFA.
//!
//! States live in a single `Vec` owned by the [`Automaton`]; edges are
//! [`StateId`] indices into it.  Shared successors (both branches of `|`
//! converging) and the back-edges introduced by `*` / `+` are just
//! repeated indices, so the graph needs no reference counting.
//!
//! While building, a [`Fragment`] carries the list of edges that are not
//! wired yet.  Each entry names a state and which of its edges is
//! dangling; [`Builder::patch`] points them all at a successor once it
//! is known.

use std::fmt;
use std::io::{self, Write};
use std::ops::Index;

use crate::Error;
use crate::postfix::Token;

// ---------------------------------------------------------------------------
// State identifiers
// ---------------------------------------------------------------------------

/// Index into the automaton's state arena.
///
/// [`StateId::NONE`] marks an edge that has not been patched yet.  No edge
/// of a finished [`Automaton`] holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u32);

impl StateId {
    /// Sentinel for unpatched edges during construction.
    pub const NONE: Self = Self(u32::MAX);

    #[inline]
    pub(crate) const fn new(idx: u32) -> Self {
        Self(idx)
    }

    /// Return the raw index as `usize`.  Panics on `NONE` in debug builds.
    #[inline]
    pub fn idx(self) -> usize {
        debug_assert!(self != Self::NONE, "StateId::NONE used as index");
        self.0 as usize
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Zero-width assertions
// ---------------------------------------------------------------------------

/// A positional condition that consumes no input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssertKind {
    /// `^`: holds only before the first byte.
    Start,
    /// `$`: holds only once end-of-input has been signalled.
    End,
}

impl AssertKind {
    /// Evaluate at `position` (bytes consumed so far).
    #[inline]
    pub fn holds(self, position: usize, at_end: bool) -> bool {
        match self {
            AssertKind::Start => position == 0,
            AssertKind::End => at_end,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssertKind::Start => "^",
            AssertKind::End => "$",
        }
    }
}

// ---------------------------------------------------------------------------
// NFA states
// ---------------------------------------------------------------------------

/// A single NFA state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Consume one byte in `lo..=hi`, then follow `out`.  Literals are
    /// `lo == hi`; `.` is `0x00..=0xff`.
    Range { lo: u8, hi: u8, out: StateId },
    /// Zero-width positional check, then follow `out`.
    Assert { kind: AssertKind, out: StateId },
    /// Epsilon fork: follow both `out1` and `out2`.
    Split { out1: StateId, out2: StateId },
    /// Accepting state.
    Match,
}

/// Which successor edge of a state a [`Slot`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// `out` of `Range` / `Assert`, `out1` of `Split`.
    Out,
    /// `out2` of `Split`.
    Out2,
}

/// A dangling edge: `state`'s `edge` still has to be pointed somewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub state: StateId,
    pub edge: Edge,
}

impl Slot {
    fn out(state: StateId) -> Self {
        Self {
            state,
            edge: Edge::Out,
        }
    }

    fn out2(state: StateId) -> Self {
        Self {
            state,
            edge: Edge::Out2,
        }
    }
}

/// A partially-built NFA: an entry state plus every edge still dangling.
#[derive(Debug)]
struct Fragment {
    start: StateId,
    outs: Vec<Slot>,
}

impl Fragment {
    fn new(start: StateId, outs: Vec<Slot>) -> Self {
        Self { start, outs }
    }
}

// ---------------------------------------------------------------------------
// Compiled automaton
// ---------------------------------------------------------------------------

/// A finished NFA with one entry state and one shared `Match` state.
///
/// Immutable once built; matching keeps its per-run marks elsewhere (see
/// [`MatcherMemory`](crate::MatcherMemory)).
#[derive(Debug, Clone)]
pub struct Automaton {
    states: Box<[State]>,
    start: StateId,
    accept: StateId,
}

impl Automaton {
    /// Assemble an automaton from raw parts without any validation.
    #[cfg(test)]
    pub(crate) fn from_parts(states: Vec<State>, start: StateId, accept: StateId) -> Self {
        Self {
            states: states.into_boxed_slice(),
            start,
            accept,
        }
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    /// The single `Match` state.
    pub fn accept(&self) -> StateId {
        self.accept
    }

    /// Number of states, the `Match` state included.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Emit a Graphviz DOT representation of the NFA.
    ///
    /// `Split` states are drawn as small points with unlabelled edges;
    /// the entry state is boxed and the `Match` state double-circled.
    pub fn to_dot(&self, mut buffer: impl Write) -> io::Result<()> {
        let mut visited = vec![false; self.states.len()];
        writeln!(buffer, "digraph nfa {{")?;
        writeln!(buffer, "\trankdir=LR;")?;
        writeln!(buffer, "\t{} [shape=box];", self.start)?;
        let mut stack = vec![self.start];
        while let Some(s) = stack.pop() {
            if s.is_none() || visited[s.idx()] {
                continue;
            }
            visited[s.idx()] = true;
            self.write_dot_state(s, &mut buffer, &mut stack)?;
        }
        writeln!(buffer, "}}")
    }

    fn write_dot_state(
        &self,
        idx: StateId,
        buffer: &mut impl Write,
        stack: &mut Vec<StateId>,
    ) -> io::Result<()> {
        match self[idx] {
            State::Range { lo, hi, out } => {
                stack.push(out);
                let label = match (lo, hi) {
                    (0x00, 0xff) => ".".to_string(),
                    _ if lo == hi => Token::Byte(lo).to_string(),
                    _ => Token::Range { lo, hi }.to_string(),
                };
                writeln!(
                    buffer,
                    "\t{} -> {} [label=\"{}\"];",
                    idx,
                    out,
                    label.escape_default()
                )
            }
            State::Assert { kind, out } => {
                stack.push(out);
                writeln!(buffer, "\t{} -> {} [label=\"{}\"];", idx, out, kind.label())
            }
            State::Split { out1, out2 } => {
                stack.push(out2);
                stack.push(out1);
                writeln!(buffer, "\t{} [shape=point];", idx)?;
                writeln!(buffer, "\t{} -> {};", idx, out1)?;
                writeln!(buffer, "\t{} -> {} [style=dashed];", idx, out2)
            }
            State::Match => writeln!(buffer, "\t{} [peripheries=2];", idx),
        }
    }
}

/// `automaton[state_id]`: typed access to the state arena.
impl Index<StateId> for Automaton {
    type Output = State;

    #[inline]
    fn index(&self, idx: StateId) -> &State {
        &self.states[idx.idx()]
    }
}

// ---------------------------------------------------------------------------
// NFA builder (postfix -> NFA)
// ---------------------------------------------------------------------------

/// Builds an [`Automaton`] from a postfix token stream.
///
/// Keeps its scratch vectors between calls, so one builder can compile
/// many patterns.
#[derive(Debug, Default)]
pub struct Builder {
    states: Vec<State>,
    frags: Vec<Fragment>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new NFA state and return its index.
    fn state(&mut self, state: State) -> StateId {
        let idx = u32::try_from(self.states.len()).map_or(StateId::NONE, StateId::new);
        debug_assert!(!idx.is_none(), "state arena is full");
        self.states.push(state);
        idx
    }

    /// Point every dangling edge in `outs` at `target`.
    fn patch(&mut self, outs: &[Slot], target: StateId) {
        for slot in outs {
            match (&mut self.states[slot.state.idx()], slot.edge) {
                (State::Range { out, .. }, Edge::Out)
                | (State::Assert { out, .. }, Edge::Out)
                | (State::Split { out1: out, .. }, Edge::Out)
                | (State::Split { out2: out, .. }, Edge::Out2) => *out = target,
                (state, edge) => panic!("patch: {:?} has no {:?} edge", state, edge),
            }
        }
    }

    /// Pop the operand for `op`, failing if the stack is empty.
    fn pop(&mut self, op: Token) -> Result<Fragment, Error> {
        self.frags.pop().ok_or(Error::MissingOperand { op })
    }

    /// Create a leaf state with its single `out` edge dangling.
    fn leaf(&mut self, state: State) -> Fragment {
        let s = self.state(state);
        Fragment::new(s, vec![Slot::out(s)])
    }

    /// Consume one postfix token and return the resulting fragment.
    fn next_fragment(&mut self, token: Token) -> Result<Fragment, Error> {
        let frag = match token {
            Token::Byte(byte) => self.leaf(State::Range {
                lo: byte,
                hi: byte,
                out: StateId::NONE,
            }),
            Token::Range { lo, hi } => {
                if lo > hi {
                    return Err(Error::ReversedRange { lo, hi });
                }
                self.leaf(State::Range {
                    lo,
                    hi,
                    out: StateId::NONE,
                })
            }
            Token::Any => self.leaf(State::Range {
                lo: u8::MIN,
                hi: u8::MAX,
                out: StateId::NONE,
            }),
            Token::Assert(kind) => self.leaf(State::Assert {
                kind,
                out: StateId::NONE,
            }),
            Token::Catenate => {
                let e2 = self.pop(token)?;
                let e1 = self.pop(token)?;
                self.patch(&e1.outs, e2.start);
                Fragment::new(e1.start, e2.outs)
            }
            Token::Alternate => {
                let e2 = self.pop(token)?;
                let mut e1 = self.pop(token)?;
                let s = self.state(State::Split {
                    out1: e1.start,
                    out2: e2.start,
                });
                e1.outs.extend(e2.outs);
                Fragment::new(s, e1.outs)
            }
            Token::RepeatZeroOne => {
                let mut e = self.pop(token)?;
                let s = self.state(State::Split {
                    out1: e.start,
                    out2: StateId::NONE,
                });
                e.outs.push(Slot::out2(s));
                Fragment::new(s, e.outs)
            }
            Token::RepeatZeroPlus => {
                let e = self.pop(token)?;
                let s = self.state(State::Split {
                    out1: e.start,
                    out2: StateId::NONE,
                });
                self.patch(&e.outs, s);
                Fragment::new(s, vec![Slot::out2(s)])
            }
            Token::RepeatOnePlus => {
                let e = self.pop(token)?;
                let s = self.state(State::Split {
                    out1: e.start,
                    out2: StateId::NONE,
                });
                self.patch(&e.outs, s);
                Fragment::new(e.start, vec![Slot::out2(s)])
            }
        };
        Ok(frag)
    }

    /// Compile a postfix token stream into a ready-to-match [`Automaton`].
    ///
    /// Exactly one fragment must be left once the stream is exhausted;
    /// anything else means operators and operands did not balance.
    pub fn build(&mut self, postfix: &[Token]) -> Result<Automaton, Error> {
        self.states.clear();
        self.frags.clear();

        for &token in postfix {
            let frag = self.next_fragment(token)?;
            self.frags.push(frag);
        }

        let fragments = self.frags.len();
        let e = match self.frags.pop() {
            Some(e) if fragments == 1 => e,
            _ => return Err(Error::Malformed { fragments }),
        };

        let accept = self.state(State::Match);
        self.patch(&e.outs, accept);

        Ok(Automaton {
            states: std::mem::take(&mut self.states).into_boxed_slice(),
            start: e.start,
            accept,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
