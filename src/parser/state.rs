use std::fmt::Write;
use indexmap::{IndexMap, IndexSet};
use log::debug;
use crate::bnf::*;
use crate::config::Config;
use super::bitset::{self, BitSet};
use super::sets::{self, Sets};

pub(crate) struct States {
  pub(crate) states: Vec<State>,
  /// number of empty-rule items spliced in by closure
  pub(crate) n_looks: usize,
}

/// A rule with a dot before `rhs[dot]`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub(crate) struct Lr0Item {
  pub(crate) prod: u32,
  pub(crate) dot: u16,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Lr1Item {
  pub(crate) core: Lr0Item,
  /// nonterminal whose closure brought the item in, `None` for kernel
  /// items
  pub(crate) left: Option<SymbolId>,
  /// slot in the state's lookahead table
  pub(crate) look: usize,
}

impl Lr1Item {
  /// Symbols after the dot.
  pub(crate) fn rest<'a>(&self, bnf: &'a Bnf) -> &'a [SymbolId] {
    &bnf.prods[self.core.prod as usize].rhs[self.core.dot as usize..]
  }

  pub(crate) fn is_tail_item(&self, bnf: &Bnf) -> bool {
    self.rest(bnf).is_empty()
  }
}

#[derive(Default)]
pub(crate) struct State {
  /// kernel items first
  pub(crate) items: Vec<Lr1Item>,
  pub(crate) kernel_len: u16,
  /// lookahead sets, shared by closure items with the same `left`
  pub(crate) looks: Vec<BitSet>,
  /// symbol followed from the predecessor, `None` for the initial state
  pub(crate) through: Option<SymbolId>,
  /// symbol -> index of target state
  pub(crate) transitions: IndexMap<SymbolId, u32>,
  key: StateKey,
}

impl State {
  pub(crate) fn kernel(&self) -> &[Lr1Item] {
    &self.items[..self.kernel_len as usize]
  }

  pub(crate) fn lookahead(&self, item: &Lr1Item) -> &BitSet {
    &self.looks[item.look]
  }
}

/// LALR(1) kernel cores, sorted
type StateKey = Vec<Lr0Item>;

type Kernel = Vec<(Lr0Item, BitSet)>;

pub(super) fn gen_states(
  bnf: &Bnf,
  sets: &Sets,
  config: &Config,
) -> States {
  let mut builder = Builder {
    bnf,
    sets,
    states: vec![],
    states_through: vec![vec![]; bnf.ctx.n_symbols()],
    visited: vec![],
    expanded: 0,
    n_looks: 0,
  };
  builder.compute_kernels();

  let states = States {
    states: builder.states,
    n_looks: builder.n_looks,
  };
  if config.debug {
    debug!("{} states, {} empty items", states.states.len(), states.n_looks);
    for line in dump_states(bnf, &states).lines() {
      debug!("{}", line);
    }
  }
  states
}

struct Builder<'a> {
  bnf: &'a Bnf,
  sets: &'a Sets,
  states: Vec<State>,
  /// symbol -> states entered through it
  states_through: Vec<Vec<u32>>,
  visited: Vec<bool>,
  /// states whose successors have been computed
  expanded: usize,
  n_looks: usize,
}

impl<'a> Builder<'a> {
  /// Breadth-first construction of the automaton. States whose kernel
  /// lookaheads grow after their expansion are queued in `dirty` and
  /// pushed to their successors again.
  fn compute_kernels(&mut self) {
    let seed = vec![(
      Lr0Item { prod: 0, dot: 0 },
      BitSet::new(self.bnf.ctx.n_symbols()),
    )];
    let initial = self.make_state(None, seed);
    self.states.push(initial);

    let mut dirty = IndexSet::new();
    loop {
      if self.expanded < self.states.len() {
        let p = self.expanded as u32;
        self.expanded += 1;
        self.expand(p, &mut dirty);
      } else if let Some(p) = dirty.pop() {
        self.propagate(p, &mut dirty);
      } else {
        break;
      }
    }
  }

  fn expand(
    &mut self,
    p: u32,
    dirty: &mut IndexSet<u32>,
  ) {
    for (g, kernel) in self.successors(p) {
      let target = match self.find_state(g, &kernel) {
        Some(t) => {
          self.merge(t, kernel, dirty);
          t
        }
        None => {
          let t = self.states.len() as u32;
          let state = self.make_state(Some(g), kernel);
          self.states.push(state);
          self.link_state(t, g);
          t
        }
      };
      self.states[p as usize].transitions.insert(g, target);
    }
  }

  fn propagate(
    &mut self,
    p: u32,
    dirty: &mut IndexSet<u32>,
  ) {
    for (g, kernel) in self.successors(p) {
      if let Some(&t) = self.states[p as usize].transitions.get(&g) {
        self.merge(t, kernel, dirty);
      }
    }
  }

  /// Kernels reached from state `p`, grouped by the symbol crossed.
  fn successors(&self, p: u32) -> IndexMap<SymbolId, Kernel> {
    let state = &self.states[p as usize];
    let mut out: IndexMap<SymbolId, Kernel> = IndexMap::new();
    for item in &state.items {
      let g = match item.rest(self.bnf).first() {
        Some(&g) => g,
        None => continue,
      };
      let core = Lr0Item {
        prod: item.core.prod,
        dot: item.core.dot + 1,
      };
      out.entry(g).or_insert_with(Vec::new)
        .push((core, state.lookahead(item).clone()));
    }
    out
  }

  fn find_state(
    &self,
    g: SymbolId,
    kernel: &Kernel,
  ) -> Option<u32> {
    let key = state_key(kernel);
    self.states_through[g.index()].iter()
      .copied()
      .find(|&t| self.states[t as usize].key == key)
  }

  fn link_state(
    &mut self,
    t: u32,
    g: SymbolId,
  ) {
    self.states_through[g.index()].push(t);
  }

  /// Unions `kernel`'s lookaheads into the same-core state `t`.
  fn merge(
    &mut self,
    t: u32,
    kernel: Kernel,
    dirty: &mut IndexSet<u32>,
  ) {
    let state = &mut self.states[t as usize];
    let mut changed = false;
    for (core, look) in kernel {
      let item = state.kernel().iter().find(|item| item.core == core).copied();
      if let Some(item) = item {
        changed |= state.looks[item.look].union_with(&look);
      }
    }

    if changed {
      let mut state = std::mem::take(&mut self.states[t as usize]);
      self.close(&mut state);
      self.states[t as usize] = state;
      if (t as usize) < self.expanded {
        dirty.insert(t);
      }
    }
  }

  fn make_state(
    &mut self,
    through: Option<SymbolId>,
    kernel: Kernel,
  ) -> State {
    let mut state = State {
      kernel_len: kernel.len() as u16,
      through,
      key: state_key(&kernel),
      ..State::default()
    };
    for (core, look) in kernel {
      state.items.push(Lr1Item {
        core,
        left: None,
        look: state.looks.len(),
      });
      state.looks.push(look);
    }
    self.close(&mut state);
    state
  }

  /// Rebuilds the closure items of `state` from its kernel, then runs the
  /// lookahead sets to a fixed point.
  fn close(&mut self, state: &mut State) {
    let bnf = self.bnf;
    let n = bnf.ctx.n_symbols();
    let kernel_len = state.kernel_len as usize;
    state.items.truncate(kernel_len);
    state.looks.truncate(kernel_len);

    let mut groups: Vec<Option<usize>> = vec![None; n];
    let mut added = vec![false; n];
    self.visited.clear();
    self.visited.resize(n, false);

    let mut i = 0;
    while i < state.items.len() {
      let item = state.items[i];
      i += 1;
      let g = match item.rest(bnf).first() {
        Some(&g) if !bnf.ctx.is_terminal(g) => g,
        _ => continue,
      };

      let look = group(state, &mut groups, g);
      if !added[g.index()] {
        added[g.index()] = true;
        for prod in bnf.productions_of(g).filter(|p| !p.rhs.is_empty()) {
          state.items.push(Lr1Item {
            core: Lr0Item {
              prod: prod.number as u32,
              dot: 0,
            },
            left: Some(g),
            look,
          });
        }
      }
      self.find_empty(state, &mut groups, g);
    }

    // (dst, src): everything in `src` flows into `dst`
    let mut edges = vec![];
    for item in &state.items {
      let (g, beta) = match item.rest(bnf).split_first() {
        Some((&g, beta)) if !bnf.ctx.is_terminal(g) => (g, beta),
        _ => continue,
      };
      if let Some(dst) = groups[g.index()] {
        let mut first = BitSet::new(n);
        if sets::compute_first_for_symbols(&mut first, bnf, self.sets, beta) {
          edges.push((dst, item.look));
        }
        state.looks[dst].union_with(&first);
      }
    }
    loop {
      let mut changed = false;
      for &(dst, src) in &edges {
        changed |= bitset::union_at(&mut state.looks, dst, src);
      }
      if !changed {
        break;
      }
    }
  }

  /// Splices in the empty-rule items of `x`, and of the EMPTY
  /// nonterminals its rules start with.
  fn find_empty(
    &mut self,
    state: &mut State,
    groups: &mut [Option<usize>],
    x: SymbolId,
  ) {
    if self.visited[x.index()] || !self.bnf.ctx[x].is_empty() {
      return;
    }
    self.visited[x.index()] = true;

    let bnf = self.bnf;
    for prod in bnf.productions_of(x) {
      match prod.rhs.first() {
        None => {
          let look = group(state, groups, x);
          state.items.push(Lr1Item {
            core: Lr0Item {
              prod: prod.number as u32,
              dot: 0,
            },
            left: Some(x),
            look,
          });
          self.n_looks += 1;
        }
        Some(&g) if !bnf.ctx.is_terminal(g) => {
          self.find_empty(state, groups, g);
        }
        Some(_) => {}
      }
    }
  }
}

/// Lookahead slot shared by the closure items of `g`; the first use
/// allocates it.
fn group(
  state: &mut State,
  groups: &mut [Option<usize>],
  g: SymbolId,
) -> usize {
  if let Some(look) = groups[g.index()] {
    return look;
  }
  let look = state.looks.len();
  state.looks.push(BitSet::new(groups.len()));
  groups[g.index()] = Some(look);
  look
}

fn state_key(kernel: &Kernel) -> StateKey {
  let mut key = kernel.iter().map(|(core, _)| *core).collect::<Vec<_>>();
  key.sort();
  key
}

pub(crate) fn item_string(
  bnf: &Bnf,
  item: &Lr1Item,
) -> String {
  let prod = &bnf.prods[item.core.prod as usize];
  let mut s = format!("{} :", bnf.ctx.name(prod.lhs));
  for (i, &sym) in prod.rhs.iter().enumerate() {
    if i == item.core.dot as usize {
      s.push_str(" .");
    }
    s.push(' ');
    s.push_str(bnf.ctx.name(sym));
  }
  if item.is_tail_item(bnf) {
    s.push_str(" .");
  }
  s
}

pub(crate) fn dump_states(
  bnf: &Bnf,
  states: &States,
) -> String {
  let mut s = String::new();
  for (i, state) in states.states.iter().enumerate() {
    let _ = match state.through {
      Some(g) => writeln!(s, "state {} via {}", i, bnf.ctx.name(g)),
      None => writeln!(s, "state {}", i),
    };
    for item in &state.items {
      let _ = write!(s, "  {}  [ ", item_string(bnf, item));
      for t in state.lookahead(item).iter() {
        let _ = write!(s, "{} ", bnf.ctx.name(SymbolId(t as u32)));
      }
      s.push(']');
      if let Some(left) = item.left {
        let _ = write!(s, "  < {}", bnf.ctx.name(left));
      }
      s.push('\n');
    }
    for (&g, &t) in &state.transitions {
      let _ = writeln!(s, "  {} -> {}", bnf.ctx.name(g), t);
    }
  }
  s
}
