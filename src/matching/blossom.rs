//! Maximum-weight matching in a general graph.
//!
//! Edmonds' blossom algorithm with primal-dual updates (the O(n³) variant due to
//! Gabow/Galil). Vertices are `0..n`, edges are undirected and weighted with
//! integers, and every computation stays in integer arithmetic: with integer weights
//! the dual variables stay integral and the slack on an edge between two S-blossoms
//! is always even.
//!
//! Internally each edge `k` has two endpoints, `2k` (its `u` side) and `2k + 1`
//! (its `v` side), so `p ^ 1` is the opposite endpoint of `p`. `mate[v]` holds the
//! remote endpoint of the matched edge at `v`. Non-trivial blossoms are numbered
//! `n..2n`.
//!
//! The search runs stage by stage; the matching held between two augmentations is
//! always valid, so an interrupted search still yields a usable (if suboptimal)
//! matching.

/// Sentinel for "no vertex / endpoint / edge / blossom"
const NONE: usize = usize::MAX;

const FREE: u8 = 0;
const S_LABEL: u8 = 1;
const T_LABEL: u8 = 2;
/// Marks blossoms visited by `scan_blossom`
const BREADCRUMB: u8 = 4;

/// How a round of tree growing ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Growth {
    Augmented,
    /// Queue empty; the duals must move before the trees can grow again
    Stalled,
    OutOfBlossoms,
}

/// Undirected weighted edge between two vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightedEdge {
    pub u: usize,
    pub v: usize,
    pub weight: i64,
}

impl WeightedEdge {
    #[must_use]
    pub fn new(u: usize, v: usize, weight: i64) -> Self {
        Self { u, v, weight }
    }
}

/// Mates found by the search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlossomResult {
    /// `mates[v]` is the vertex matched to `v`, if any
    pub mates: Vec<Option<usize>>,
    /// False when the search was stopped before it could prove optimality
    pub complete: bool,
}

/// Compute a maximum-weight matching over `n` vertices.
///
/// `should_stop` is polled between search steps; once it returns true the search
/// ends and the current matching is returned with `complete == false`.
///
/// Edges must connect distinct vertices below `n` and appear at most once.
pub fn max_weight_matching<F>(n: usize, edges: &[WeightedEdge], should_stop: F) -> BlossomResult
where
    F: Fn() -> bool,
{
    if n == 0 || edges.is_empty() {
        return BlossomResult {
            mates: vec![None; n],
            complete: true,
        };
    }

    let mut search = Search::new(n, edges);
    let complete = search.run(&should_stop);
    BlossomResult {
        mates: search.mates(),
        complete,
    }
}

struct Search<'a> {
    n: usize,
    edges: &'a [WeightedEdge],
    /// endpoint[p] is the vertex at endpoint p
    endpoint: Vec<usize>,
    /// neighbend[v] lists the remote endpoints of edges incident to v
    neighbend: Vec<Vec<usize>>,
    mate: Vec<usize>,
    /// Per vertex and per top-level blossom: FREE, S or T
    label: Vec<u8>,
    /// Endpoint through which a labeled vertex/blossom got its label
    labelend: Vec<usize>,
    /// Top-level blossom containing each vertex
    inblossom: Vec<usize>,
    blossomparent: Vec<usize>,
    /// Sub-blossoms of a blossom, starting at its base and going round the cycle
    blossomchilds: Vec<Vec<usize>>,
    blossombase: Vec<usize>,
    /// blossomendps[b][i] is the endpoint joining child i to child i + 1
    blossomendps: Vec<Vec<usize>>,
    /// Least-slack edge to a different S-blossom (or for free vertices, to any S vertex)
    bestedge: Vec<usize>,
    /// Least-slack edges from a non-trivial S-blossom to each neighbouring S-blossom
    blossombestedges: Vec<Option<Vec<usize>>>,
    unused_blossoms: Vec<usize>,
    /// Vertex duals (times two) followed by blossom duals
    dualvar: Vec<i64>,
    allowedge: Vec<bool>,
    queue: Vec<usize>,
}

impl<'a> Search<'a> {
    fn new(n: usize, edges: &'a [WeightedEdge]) -> Self {
        let max_weight = edges.iter().map(|e| e.weight).max().unwrap_or(0).max(0);

        let mut endpoint = Vec::with_capacity(2 * edges.len());
        let mut neighbend = vec![Vec::new(); n];
        for (k, edge) in edges.iter().enumerate() {
            endpoint.push(edge.u);
            endpoint.push(edge.v);
            neighbend[edge.u].push(2 * k + 1);
            neighbend[edge.v].push(2 * k);
        }

        let mut blossombase: Vec<usize> = (0..n).collect();
        blossombase.resize(2 * n, NONE);

        let mut dualvar = vec![max_weight; n];
        dualvar.resize(2 * n, 0);

        Self {
            n,
            edges,
            endpoint,
            neighbend,
            mate: vec![NONE; n],
            label: vec![FREE; 2 * n],
            labelend: vec![NONE; 2 * n],
            inblossom: (0..n).collect(),
            blossomparent: vec![NONE; 2 * n],
            blossomchilds: vec![Vec::new(); 2 * n],
            blossombase,
            blossomendps: vec![Vec::new(); 2 * n],
            bestedge: vec![NONE; 2 * n],
            blossombestedges: vec![None; 2 * n],
            unused_blossoms: (n..2 * n).collect(),
            dualvar,
            allowedge: vec![false; edges.len()],
            queue: Vec::new(),
        }
    }

    fn mates(&self) -> Vec<Option<usize>> {
        self.mate
            .iter()
            .map(|&p| (p != NONE).then(|| self.endpoint[p]))
            .collect()
    }

    fn slack(&self, k: usize) -> i64 {
        let edge = &self.edges[k];
        self.dualvar[edge.u] + self.dualvar[edge.v] - 2 * edge.weight
    }

    /// All vertices contained in (sub-)blossom `b`
    fn blossom_leaves(&self, b: usize) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = vec![b];
        while let Some(top) = stack.pop() {
            if top < self.n {
                leaves.push(top);
            } else {
                stack.extend(self.blossomchilds[top].iter().rev());
            }
        }
        leaves
    }

    /// Label the top-level blossom of `w` with `t`, reached through endpoint `p`
    fn assign_label(&mut self, w: usize, t: u8, p: usize) {
        let b = self.inblossom[w];
        self.label[w] = t;
        self.label[b] = t;
        self.labelend[w] = p;
        self.labelend[b] = p;
        self.bestedge[w] = NONE;
        self.bestedge[b] = NONE;

        if t == S_LABEL {
            let leaves = self.blossom_leaves(b);
            self.queue.extend(leaves);
        } else if t == T_LABEL {
            // The mate of a T-blossom's base becomes an S-vertex
            let base = self.blossombase[b];
            let mate = self.mate[base];
            self.assign_label(self.endpoint[mate], S_LABEL, mate ^ 1);
        }
    }

    /// Trace back from `v` and `w` to find either a new blossom (returns its base)
    /// or an augmenting path (returns `NONE`)
    fn scan_blossom(&mut self, v: usize, w: usize) -> usize {
        let mut path = Vec::new();
        let mut base = NONE;
        let (mut v, mut w) = (v, w);

        while v != NONE || w != NONE {
            let mut b = self.inblossom[v];
            if self.label[b] & BREADCRUMB != 0 {
                base = self.blossombase[b];
                break;
            }
            path.push(b);
            self.label[b] = S_LABEL | BREADCRUMB;

            if self.labelend[b] == NONE {
                // Reached the root of the alternating tree
                v = NONE;
            } else {
                v = self.endpoint[self.labelend[b]];
                b = self.inblossom[v];
                v = self.endpoint[self.labelend[b]];
            }
            if w != NONE {
                std::mem::swap(&mut v, &mut w);
            }
        }

        for b in path {
            self.label[b] = S_LABEL;
        }
        base
    }

    /// Shrink the odd cycle closed by edge `k` into a new S-blossom with the given base.
    ///
    /// Returns false, changing nothing, if no blossom number is free. At most n/2
    /// non-trivial blossoms exist at a time, so `n..2n` never runs out.
    fn add_blossom(&mut self, base: usize, k: usize) -> bool {
        let Some(b) = self.unused_blossoms.pop() else {
            return false;
        };

        let edge = self.edges[k];
        let bb = self.inblossom[base];
        let mut bv = self.inblossom[edge.u];
        let mut bw = self.inblossom[edge.v];

        self.blossombase[b] = base;
        self.blossomparent[b] = NONE;
        self.blossomparent[bb] = b;

        let mut path = Vec::new();
        let mut endps = Vec::new();
        while bv != bb {
            self.blossomparent[bv] = b;
            path.push(bv);
            endps.push(self.labelend[bv]);
            let v = self.endpoint[self.labelend[bv]];
            bv = self.inblossom[v];
        }
        path.push(bb);
        path.reverse();
        endps.reverse();
        endps.push(2 * k);
        while bw != bb {
            self.blossomparent[bw] = b;
            path.push(bw);
            endps.push(self.labelend[bw] ^ 1);
            let w = self.endpoint[self.labelend[bw]];
            bw = self.inblossom[w];
        }

        self.label[b] = S_LABEL;
        self.labelend[b] = self.labelend[bb];
        self.dualvar[b] = 0;
        self.blossomchilds[b] = path.clone();
        self.blossomendps[b] = endps;

        for v in self.blossom_leaves(b) {
            if self.label[self.inblossom[v]] == T_LABEL {
                // T-vertices inside the new blossom become S-vertices
                self.queue.push(v);
            }
            self.inblossom[v] = b;
        }

        // Least-slack edges from the new blossom to each neighbouring S-blossom
        let mut bestedgeto = vec![NONE; 2 * self.n];
        for &sub in &path {
            let nblists: Vec<Vec<usize>> = match self.blossombestedges[sub].take() {
                Some(list) => vec![list],
                None => self
                    .blossom_leaves(sub)
                    .into_iter()
                    .map(|v| self.neighbend[v].iter().map(|p| p / 2).collect())
                    .collect(),
            };
            for nblist in nblists {
                for k in nblist {
                    let e = self.edges[k];
                    let j = if self.inblossom[e.v] == b { e.u } else { e.v };
                    let bj = self.inblossom[j];
                    if bj != b
                        && self.label[bj] == S_LABEL
                        && (bestedgeto[bj] == NONE || self.slack(k) < self.slack(bestedgeto[bj]))
                    {
                        bestedgeto[bj] = k;
                    }
                }
            }
            self.bestedge[sub] = NONE;
        }

        let best: Vec<usize> = bestedgeto.into_iter().filter(|&k| k != NONE).collect();
        self.bestedge[b] = NONE;
        for &k in &best {
            if self.bestedge[b] == NONE || self.slack(k) < self.slack(self.bestedge[b]) {
                self.bestedge[b] = k;
            }
        }
        self.blossombestedges[b] = Some(best);
        true
    }

    /// Dissolve blossom `b` into its sub-blossoms
    fn expand_blossom(&mut self, b: usize, end_of_stage: bool) {
        let children = self.blossomchilds[b].clone();
        for &s in &children {
            self.blossomparent[s] = NONE;
            if s < self.n {
                self.inblossom[s] = s;
            } else if end_of_stage && self.dualvar[s] == 0 {
                // Nested blossoms with zero dual are expanded recursively
                self.expand_blossom(s, end_of_stage);
            } else {
                for v in self.blossom_leaves(s) {
                    self.inblossom[v] = s;
                }
            }
        }

        // Mid-stage expansion of a T-blossom: relabel the sub-blossoms on the even
        // path from the entry child to the base
        if !end_of_stage && self.label[b] == T_LABEL {
            let endps = self.blossomendps[b].clone();
            let len = children.len() as isize;
            let at = |idx: isize| idx.rem_euclid(len) as usize;

            let entrychild = self.inblossom[self.endpoint[self.labelend[b] ^ 1]];
            let mut j = children
                .iter()
                .position(|&c| c == entrychild)
                .map_or(0, |pos| pos as isize);
            let (jstep, endptrick): (isize, usize) = if j & 1 != 0 {
                j -= len;
                (1, 0)
            } else {
                (-1, 1)
            };
            let trick = endptrick as isize;

            let mut p = self.labelend[b];
            while j != 0 {
                self.label[self.endpoint[p ^ 1]] = FREE;
                let q = endps[at(j - trick)] ^ endptrick ^ 1;
                self.label[self.endpoint[q]] = FREE;
                self.assign_label(self.endpoint[p ^ 1], T_LABEL, p);
                self.allowedge[endps[at(j - trick)] / 2] = true;
                j += jstep;
                p = endps[at(j - trick)] ^ endptrick;
                self.allowedge[p / 2] = true;
                j += jstep;
            }

            // The base sub-blossom becomes the new T-blossom
            let bv = children[at(j)];
            let entry = self.endpoint[p ^ 1];
            self.label[entry] = T_LABEL;
            self.label[bv] = T_LABEL;
            self.labelend[entry] = p;
            self.labelend[bv] = p;
            self.bestedge[bv] = NONE;

            // Sub-blossoms on the odd path may have been reached from outside
            j += jstep;
            while children[at(j)] != entrychild {
                let bv = children[at(j)];
                if self.label[bv] == S_LABEL {
                    j += jstep;
                    continue;
                }
                let reached = self
                    .blossom_leaves(bv)
                    .into_iter()
                    .find(|&v| self.label[v] != FREE);
                if let Some(v) = reached {
                    self.label[v] = FREE;
                    let base_mate = self.mate[self.blossombase[bv]];
                    self.label[self.endpoint[base_mate]] = FREE;
                    let via = self.labelend[v];
                    self.assign_label(v, T_LABEL, via);
                }
                j += jstep;
            }
        }

        self.label[b] = FREE;
        self.labelend[b] = NONE;
        self.blossomchilds[b].clear();
        self.blossomendps[b].clear();
        self.blossombase[b] = NONE;
        self.blossombestedges[b] = None;
        self.bestedge[b] = NONE;
        self.unused_blossoms.push(b);
    }

    /// Swap matched/unmatched edges along the even path from vertex `v` to the base of blossom `b`
    fn augment_blossom(&mut self, b: usize, v: usize) {
        let mut t = v;
        while self.blossomparent[t] != b {
            t = self.blossomparent[t];
        }
        if t >= self.n {
            self.augment_blossom(t, v);
        }

        let len = self.blossomchilds[b].len() as isize;
        let at = |idx: isize| idx.rem_euclid(len) as usize;
        let i = self.blossomchilds[b]
            .iter()
            .position(|&c| c == t)
            .unwrap_or(0);
        let mut j = i as isize;
        let (jstep, endptrick): (isize, usize) = if i & 1 != 0 {
            j -= len;
            (1, 0)
        } else {
            (-1, 1)
        };
        let trick = endptrick as isize;

        while j != 0 {
            j += jstep;
            let t = self.blossomchilds[b][at(j)];
            let p = self.blossomendps[b][at(j - trick)] ^ endptrick;
            if t >= self.n {
                self.augment_blossom(t, self.endpoint[p]);
            }
            j += jstep;
            let t = self.blossomchilds[b][at(j)];
            if t >= self.n {
                self.augment_blossom(t, self.endpoint[p ^ 1]);
            }
            self.mate[self.endpoint[p]] = p ^ 1;
            self.mate[self.endpoint[p ^ 1]] = p;
        }

        // Rotate so that the new base comes first
        self.blossomchilds[b].rotate_left(i);
        self.blossomendps[b].rotate_left(i);
        self.blossombase[b] = self.blossombase[self.blossomchilds[b][0]];
    }

    /// Augment the matching along the path through edge `k` between two S-vertices
    fn augment_matching(&mut self, k: usize) {
        let edge = self.edges[k];
        for (start, first) in [(edge.u, 2 * k + 1), (edge.v, 2 * k)] {
            let (mut s, mut p) = (start, first);
            loop {
                let bs = self.inblossom[s];
                if bs >= self.n {
                    self.augment_blossom(bs, s);
                }
                self.mate[s] = p;
                if self.labelend[bs] == NONE {
                    // Reached a single vertex root
                    break;
                }
                let t = self.endpoint[self.labelend[bs]];
                let bt = self.inblossom[t];
                s = self.endpoint[self.labelend[bt]];
                let j = self.endpoint[self.labelend[bt] ^ 1];
                if bt >= self.n {
                    self.augment_blossom(bt, j);
                }
                self.mate[j] = self.labelend[bt];
                p = self.labelend[bt] ^ 1;
            }
        }
    }

    /// Run stages until no augmenting path improves the weight. Returns false when interrupted.
    fn run(&mut self, should_stop: &dyn Fn() -> bool) -> bool {
        let n = self.n;

        for _stage in 0..n {
            if should_stop() {
                return false;
            }

            self.label.fill(FREE);
            self.bestedge.fill(NONE);
            for b in n..2 * n {
                self.blossombestedges[b] = None;
            }
            self.allowedge.fill(false);
            self.queue.clear();

            for v in 0..n {
                if self.mate[v] == NONE && self.label[self.inblossom[v]] == FREE {
                    self.assign_label(v, S_LABEL, NONE);
                }
            }

            let augmented = loop {
                match self.grow_trees() {
                    Growth::Augmented => break true,
                    Growth::Stalled => {}
                    // Leave the last valid matching as if interrupted
                    Growth::OutOfBlossoms => return false,
                }
                if !self.adjust_duals() {
                    break false;
                }
                if should_stop() {
                    return false;
                }
            };

            if !augmented {
                break;
            }

            // Expand S-blossoms whose dual dropped to zero
            for b in n..2 * n {
                if self.blossomparent[b] == NONE
                    && self.blossombase[b] != NONE
                    && self.label[b] == S_LABEL
                    && self.dualvar[b] == 0
                {
                    self.expand_blossom(b, true);
                }
            }
        }

        true
    }

    /// Process queued S-vertices along tight edges until an augmentation or an empty queue
    fn grow_trees(&mut self) -> Growth {
        while let Some(v) = self.queue.pop() {
            for idx in 0..self.neighbend[v].len() {
                let p = self.neighbend[v][idx];
                let k = p / 2;
                let w = self.endpoint[p];
                if self.inblossom[v] == self.inblossom[w] {
                    continue;
                }

                let mut kslack = 0;
                if !self.allowedge[k] {
                    kslack = self.slack(k);
                    if kslack <= 0 {
                        self.allowedge[k] = true;
                    }
                }

                if self.allowedge[k] {
                    if self.label[self.inblossom[w]] == FREE {
                        self.assign_label(w, T_LABEL, p ^ 1);
                    } else if self.label[self.inblossom[w]] == S_LABEL {
                        let base = self.scan_blossom(v, w);
                        if base == NONE {
                            self.augment_matching(k);
                            return Growth::Augmented;
                        }
                        if !self.add_blossom(base, k) {
                            return Growth::OutOfBlossoms;
                        }
                    } else if self.label[w] == FREE {
                        // w is inside a T-blossom but not yet reached itself
                        self.label[w] = T_LABEL;
                        self.labelend[w] = p ^ 1;
                    }
                } else if self.label[self.inblossom[w]] == S_LABEL {
                    let b = self.inblossom[v];
                    if self.bestedge[b] == NONE || kslack < self.slack(self.bestedge[b]) {
                        self.bestedge[b] = k;
                    }
                } else if self.label[w] == FREE
                    && (self.bestedge[w] == NONE || kslack < self.slack(self.bestedge[w]))
                {
                    self.bestedge[w] = k;
                }
            }
        }
        Growth::Stalled
    }

    /// Apply the smallest dual change that keeps every dual feasible.
    /// Returns false when the optimum has been reached.
    fn adjust_duals(&mut self) -> bool {
        let n = self.n;

        #[derive(Clone, Copy)]
        enum Step {
            Optimum,
            TightenFree(usize),
            TightenBetweenS(usize),
            ExpandT(usize),
        }

        // Vertex duals may not go negative
        let mut delta = self.dualvar[..n].iter().copied().min().unwrap_or(0);
        let mut step = Step::Optimum;

        for v in 0..n {
            if self.label[self.inblossom[v]] == FREE && self.bestedge[v] != NONE {
                let d = self.slack(self.bestedge[v]);
                if d < delta {
                    delta = d;
                    step = Step::TightenFree(self.bestedge[v]);
                }
            }
        }

        for b in 0..2 * n {
            if self.blossomparent[b] == NONE && self.label[b] == S_LABEL && self.bestedge[b] != NONE
            {
                let kslack = self.slack(self.bestedge[b]);
                debug_assert_eq!(kslack % 2, 0, "slack between S-blossoms must be even");
                let d = kslack / 2;
                if d < delta {
                    delta = d;
                    step = Step::TightenBetweenS(self.bestedge[b]);
                }
            }
        }

        for b in n..2 * n {
            if self.blossombase[b] != NONE
                && self.blossomparent[b] == NONE
                && self.label[b] == T_LABEL
                && self.dualvar[b] < delta
            {
                delta = self.dualvar[b];
                step = Step::ExpandT(b);
            }
        }

        for v in 0..n {
            match self.label[self.inblossom[v]] {
                S_LABEL => self.dualvar[v] -= delta,
                T_LABEL => self.dualvar[v] += delta,
                _ => {}
            }
        }
        for b in n..2 * n {
            if self.blossombase[b] != NONE && self.blossomparent[b] == NONE {
                match self.label[b] {
                    S_LABEL => self.dualvar[b] += delta,
                    T_LABEL => self.dualvar[b] -= delta,
                    _ => {}
                }
            }
        }

        match step {
            Step::Optimum => false,
            Step::TightenFree(k) => {
                self.allowedge[k] = true;
                let edge = self.edges[k];
                let s_side = if self.label[self.inblossom[edge.u]] == FREE {
                    edge.v
                } else {
                    edge.u
                };
                self.queue.push(s_side);
                true
            }
            Step::TightenBetweenS(k) => {
                self.allowedge[k] = true;
                self.queue.push(self.edges[k].u);
                true
            }
            Step::ExpandT(b) => {
                self.expand_blossom(b, false);
                true
            }
        }
    }
}
