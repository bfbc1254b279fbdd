//! Multi-state NFA simulation.
//!
//! All live automaton positions advance together, one input byte at a
//! time.  Two [`StateSet`]s are kept, `clist` (current) and `nlist`
//! (next), and swapped after every step.  Epsilon closures are computed
//! by [`Matcher::addstate`], which stamps every visited state with the
//! current generation; a state already stamped is skipped.  That single
//! check both terminates closures over the cycles introduced by `*` / `+`
//! and keeps each state from being expanded twice in one step, so a match
//! costs O(len(subject) × states).
//!
//! Closures are walked with an explicit stack rather than recursion, since
//! a chain of `Split`s can be as long as the pattern.

use log::trace;

use crate::MatchOutcome;
use crate::nfa::{AssertKind, Automaton, State, StateId};

// ---------------------------------------------------------------------------
// State sets
// ---------------------------------------------------------------------------

/// The automaton positions alive after some prefix of the input, in the
/// order the epsilon closure reached them.
///
/// Deduplication is done by the generation stamps in [`Matcher`], so the
/// set itself is a plain list.
#[derive(Clone, Debug, Default)]
pub struct StateSet {
    ids: Vec<StateId>,
    generation: usize,
}

impl StateSet {
    /// Empty the set and tag it with the generation about to fill it.
    fn reset(&mut self, generation: usize) {
        self.ids.clear();
        self.generation = generation;
    }

    #[inline]
    fn insert(&mut self, id: StateId) {
        self.ids.push(id);
    }

    fn append(&mut self, other: &mut StateSet) {
        self.ids.append(&mut other.ids);
    }

    /// The generation whose closure produced this set.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = StateId> + '_ {
        self.ids.iter().copied()
    }
}

// ---------------------------------------------------------------------------
// Matcher (NFA simulation)
// ---------------------------------------------------------------------------

/// Reusable memory for [`Matcher`].  Create once, call
/// [`matcher`](Self::matcher) for each run.
#[derive(Debug, Default)]
pub struct MatcherMemory {
    /// Per-state: the generation when the state was last visited.
    marks: Vec<usize>,
    /// Current and next state sets (swapped each step).
    clist: StateSet,
    nlist: StateSet,
    /// Bytes that advanced at least one thread.
    captured: Vec<u8>,
    /// Worklist for [`Matcher::addstate`].
    stack: Vec<StateId>,
}

impl MatcherMemory {
    /// Start a run of `automaton`.  Everything left over from a previous
    /// run is discarded, so runs never observe each other.
    pub fn matcher<'a>(&'a mut self, automaton: &'a Automaton) -> Matcher<'a> {
        self.marks.clear();
        self.marks.resize(automaton.num_states(), usize::MAX);
        self.clist.reset(0);
        self.nlist.reset(0);
        self.captured.clear();
        self.stack.clear();

        let mut m = Matcher {
            automaton,
            marks: &mut self.marks,
            generation: 0,
            clist: &mut self.clist,
            nlist: &mut self.nlist,
            captured: &mut self.captured,
            stack: &mut self.stack,
            position: 0,
            at_end: false,
            visits: 0,
        };

        m.startlist();
        m
    }
}

/// One run of an [`Automaton`] over a subject fed byte by byte.
#[derive(Debug)]
pub struct Matcher<'a> {
    automaton: &'a Automaton,
    /// Per-state visit stamp (compared against `generation`).
    marks: &'a mut [usize],
    /// Incremented once per closure pass.
    generation: usize,
    /// Current live states.
    clist: &'a mut StateSet,
    /// Next live states (built during a step).
    nlist: &'a mut StateSet,
    captured: &'a mut Vec<u8>,
    stack: &'a mut Vec<StateId>,
    /// Bytes consumed so far.
    position: usize,
    /// Set by [`finish`](Self::finish).
    at_end: bool,
    /// Total states visited by closures; the unit of the fuel limit.
    visits: usize,
}

impl<'a> Matcher<'a> {
    /// Compute the initial set: the closure of the entry state before any
    /// input is consumed.
    fn startlist(&mut self) {
        self.nlist.reset(self.generation);
        let start = self.automaton.start();
        self.addstate(start);
        std::mem::swap(self.clist, self.nlist);
        self.generation += 1;
    }

    /// Follow epsilon transitions from `idx`, adding every reachable
    /// non-`Split` state to `nlist`.
    ///
    /// `Assert` states are always recorded; their successor is followed
    /// only when the condition already holds.  A `$` that cannot be
    /// decided yet stays parked in the set until [`finish`](Self::finish).
    fn addstate(&mut self, idx: StateId) {
        self.stack.push(idx);
        while let Some(idx) = self.stack.pop() {
            if idx.is_none() {
                continue;
            }
            let i = idx.idx();
            if self.marks[i] == self.generation {
                continue;
            }
            self.marks[i] = self.generation;
            self.visits += 1;

            match self.automaton[idx] {
                State::Split { out1, out2 } => {
                    // `out1` is popped first.
                    self.stack.push(out2);
                    self.stack.push(out1);
                    continue;
                }
                State::Assert { kind, out } => {
                    if kind.holds(self.position, self.at_end) {
                        self.stack.push(out);
                    }
                }
                State::Range { .. } | State::Match => {}
            }

            self.nlist.insert(idx);
        }
    }

    /// Advance every live state by one input byte.
    ///
    /// # Panics
    ///
    /// On a `Range` state with `lo > hi`.  The builder never produces one,
    /// so it can only come from a corrupted automaton.
    pub fn step(&mut self, b: u8) {
        self.generation += 1;
        self.position += 1;
        self.nlist.reset(self.generation);
        let clist = std::mem::take(self.clist);
        let automaton = self.automaton;

        let mut advanced = false;
        for idx in clist.iter() {
            if let State::Range { lo, hi, out } = automaton[idx] {
                if lo > hi {
                    panic!(
                        "corrupt automaton: state {} has empty range {:#04x}..={:#04x}",
                        idx, lo, hi
                    );
                }
                if (lo..=hi).contains(&b) {
                    advanced = true;
                    self.addstate(out);
                }
            }
        }
        if advanced {
            self.captured.push(b);
        }

        trace!(
            "step {} byte {:#04x}: {} -> {} live states",
            self.position,
            b,
            clist.len(),
            self.nlist.len()
        );

        *self.clist = std::mem::replace(self.nlist, clist);
    }

    /// Feed a byte slice, stopping early once no thread is alive.
    pub fn chunk(&mut self, input: &[u8]) {
        for &b in input {
            if self.is_dead() {
                break;
            }
            self.step(b);
        }
    }

    /// `true` when no automaton position is alive, so no further input
    /// can lead to a match.
    pub fn is_dead(&self) -> bool {
        self.clist.is_empty()
    }

    /// The current live set.
    pub fn current(&self) -> &StateSet {
        self.clist
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total closure visits so far.
    pub fn visits(&self) -> usize {
        self.visits
    }

    /// Signal end-of-input and report whether the `Match` state is live.
    ///
    /// Only parked `$` assertions are re-expanded; every other state in
    /// `clist` was fully closed when it was added.
    ///
    /// The captured bytes are those that advanced at least one thread.
    /// When threads diverge this is not the span of any single path.
    pub fn finish(mut self) -> MatchOutcome {
        self.at_end = true;
        self.generation += 1;
        self.nlist.reset(self.generation);
        let automaton = self.automaton;

        // States already live are not added a second time.
        for idx in self.clist.iter() {
            self.marks[idx.idx()] = self.generation;
        }

        // `addstate` only writes to `nlist`, so `clist` can be walked by
        // index.
        for i in 0..self.clist.len() {
            let idx = self.clist.ids[i];
            if let State::Assert {
                kind: AssertKind::End,
                out,
            } = automaton[idx]
            {
                self.addstate(out);
            }
        }
        self.clist.append(self.nlist);

        MatchOutcome {
            accepted: self.clist.contains(self.automaton.accept()),
            captured: std::mem::take(self.captured),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
