//! Recovering pairwise identity-by-descent segments from the final ancestry
//! partition of the sampled chromosomes.
//!
//! The copies are swept left to right as merged, position-sorted event
//! streams. For every pair of copies that currently trace to the same
//! ancestor the sweep keeps the position where the sharing began; when the
//! sharing ends the interval is handed to the reporting policy, which
//! stitches same-pair intervals across short gaps and drops whatever stays
//! shorter than `minlen`. Chromosome boundaries close every interval.
use indexmap::IndexMap;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::io::Write;

use crate::ancestry::AncestorId;
use crate::error::{PedigreeError, Result};
use crate::genome::{GenomeMap, Position};
use crate::population::ChromosomeCopy;

/// Header row of the IBD table.
pub const IBD_HEADER: &str = "id1 id2 start end";

/// One reported interval `[start, end)` shared by samples `id1 < id2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IbdSegment {
    pub id1: usize,
    pub id2: usize,
    pub start: Position,
    pub end: Position,
}

impl IbdSegment {
    pub fn len(&self) -> Position {
        self.end - self.start
    }
}

/// Reporting thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IbdPolicy {
    /// Shortest interval reported.
    pub minlen: Position,
    /// Widest gap bridged between two intervals of the same pair.
    pub gaplen: Position,
}

impl Default for IbdPolicy {
    fn default() -> Self {
        Self {
            minlen: 0.01,
            gaplen: 5.0,
        }
    }
}

impl IbdPolicy {
    pub fn new(minlen: Position, gaplen: Position) -> Result<Self> {
        for (name, value) in [("minlen", minlen), ("gaplen", gaplen)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(PedigreeError::InvalidPolicy(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(Self { minlen, gaplen })
    }

    /// Whether `next` may be merged onto `previous` (which ends first).
    ///
    /// The gap must be no wider than `gaplen` and narrower than the longer
    /// of the two intervals.
    fn bridges(&self, previous: &Interval, next: &Interval) -> bool {
        let gap = next.start - previous.end;
        gap <= self.gaplen && gap < previous.len().max(next.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Interval {
    start: Position,
    end: Position,
}

impl Interval {
    fn len(&self) -> Position {
        self.end - self.start
    }
}

type Pair = (usize, usize);

fn pair(i: usize, j: usize) -> Pair {
    if i < j {
        (i, j)
    } else {
        (j, i)
    }
}

/// Next breakpoint of one copy.
#[derive(Debug, Clone, Copy)]
struct Event {
    position: Position,
    copy: usize,
    index: usize,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .total_cmp(&other.position)
            .then(self.copy.cmp(&other.copy))
    }
}

/// Pairwise interval bookkeeping: open intervals and closed ones held back
/// in case a later interval of the same pair can be stitched on.
struct PairLedger<F> {
    policy: IbdPolicy,
    open: IndexMap<Pair, Position>,
    pending: IndexMap<Pair, Interval>,
    /// Pending intervals by end position, oldest first; entries go stale when
    /// the pending interval is merged or flushed.
    expiring: VecDeque<(Position, Pair)>,
    emit: F,
}

impl<F> PairLedger<F>
where
    F: FnMut(IbdSegment) -> Result<()>,
{
    fn is_open(&self, key: Pair) -> bool {
        self.open.contains_key(&key)
    }

    fn open(&mut self, key: Pair, position: Position) -> Result<()> {
        if let Some(previous) = self.pending.get(&key) {
            if position - previous.end > self.policy.gaplen {
                self.flush(key)?;
            }
        }
        self.open.insert(key, position);
        Ok(())
    }

    fn close(&mut self, key: Pair, position: Position) -> Result<()> {
        let Some(start) = self.open.swap_remove(&key) else {
            return Ok(());
        };
        self.settle(key, Interval { start, end: position })
    }

    fn settle(&mut self, key: Pair, interval: Interval) -> Result<()> {
        let policy = self.policy;
        let merged = match self.pending.get_mut(&key) {
            Some(previous) if policy.bridges(previous, &interval) => {
                previous.end = interval.end;
                true
            }
            _ => false,
        };
        if !merged {
            self.flush(key)?;
            self.pending.insert(key, interval);
        }
        self.expiring.push_back((interval.end, key));
        Ok(())
    }

    /// Report the pending interval of `key` if it is long enough.
    fn flush(&mut self, key: Pair) -> Result<()> {
        if let Some(interval) = self.pending.swap_remove(&key) {
            if interval.len() >= self.policy.minlen {
                (self.emit)(IbdSegment {
                    id1: key.0,
                    id2: key.1,
                    start: interval.start,
                    end: interval.end,
                })?;
            }
        }
        Ok(())
    }

    /// Flush pending intervals that no interval starting at `position` or
    /// later could be stitched to.
    fn expire(&mut self, position: Position) -> Result<()> {
        while let Some(&(end, key)) = self.expiring.front() {
            if !(position - end > self.policy.gaplen) {
                break;
            }
            self.expiring.pop_front();
            let current = self.pending.get(&key).map(|p| p.end);
            if current == Some(end) && !self.is_open(key) {
                self.flush(key)?;
            }
        }
        Ok(())
    }

    /// Close every open interval at `position` and report everything pending.
    fn close_all(&mut self, position: Position) -> Result<()> {
        let open: Vec<Pair> = self.open.keys().copied().collect();
        for key in open {
            self.close(key, position)?;
        }
        let pending: Vec<Pair> = self.pending.keys().copied().collect();
        for key in pending {
            self.flush(key)?;
        }
        self.expiring.clear();
        Ok(())
    }
}

/// Streams IBD segments out of a set of chromosome copies.
#[derive(Debug, Clone)]
pub struct IbdExtractor<'a> {
    genome: &'a GenomeMap,
    policy: IbdPolicy,
}

impl<'a> IbdExtractor<'a> {
    pub fn new(genome: &'a GenomeMap, policy: IbdPolicy) -> Self {
        Self { genome, policy }
    }

    /// Sweep `copies`, whose sample ids are their positions in the slice,
    /// calling `emit` once per reported segment.
    pub fn extract<F>(&self, copies: &[&ChromosomeCopy], emit: F) -> Result<()>
    where
        F: FnMut(IbdSegment) -> Result<()>,
    {
        let mut sweep = Sweep {
            copies,
            current: vec![None; copies.len()],
            carriers: IndexMap::new(),
            ledger: PairLedger {
                policy: self.policy,
                open: IndexMap::new(),
                pending: IndexMap::new(),
                expiring: VecDeque::new(),
                emit,
            },
        };
        sweep.run(self.genome)
    }

    /// Collect every reported segment.
    pub fn segments(&self, copies: &[&ChromosomeCopy]) -> Result<Vec<IbdSegment>> {
        let mut segments = Vec::new();
        self.extract(copies, |segment| {
            segments.push(segment);
            Ok(())
        })?;
        Ok(segments)
    }
}

struct Sweep<'c, F> {
    copies: &'c [&'c ChromosomeCopy],
    current: Vec<Option<AncestorId>>,
    /// Copies currently tracing to each ancestor.
    carriers: IndexMap<AncestorId, Vec<usize>>,
    ledger: PairLedger<F>,
}

impl<'c, F> Sweep<'c, F>
where
    F: FnMut(IbdSegment) -> Result<()>,
{
    fn run(&mut self, genome: &GenomeMap) -> Result<()> {
        let mut events: BinaryHeap<Reverse<Event>> = self
            .copies
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(copy, c)| {
                Reverse(Event {
                    position: c.positions()[0],
                    copy,
                    index: 0,
                })
            })
            .collect();
        let boundaries = genome.boundaries();
        let mut next_boundary = 0;
        let mut batch: Vec<(usize, AncestorId)> = Vec::new();

        loop {
            let event_position = events.peek().map(|Reverse(e)| e.position);
            let boundary = boundaries.get(next_boundary).copied();
            let position = match (event_position, boundary) {
                (None, None) => break,
                (Some(p), None) => p,
                (None, Some(b)) => b,
                (Some(p), Some(b)) => p.min(b),
            };
            let at_boundary = boundary == Some(position);
            if at_boundary {
                next_boundary += 1;
            }

            batch.clear();
            while let Some(Reverse(event)) = events.peek().copied() {
                if event.position != position {
                    break;
                }
                events.pop();
                let copy = self.copies[event.copy];
                batch.push((event.copy, copy.ancestors()[event.index]));
                if let Some(&next) = copy.positions().get(event.index + 1) {
                    events.push(Reverse(Event {
                        position: next,
                        copy: event.copy,
                        index: event.index + 1,
                    }));
                }
            }

            self.ledger.expire(position)?;
            if at_boundary {
                self.cross_boundary(position, &batch)?;
            } else {
                self.apply(position, &batch)?;
            }
        }
        self.ledger.close_all(genome.total_length())
    }

    fn detach(&mut self, copy: usize, ancestor: AncestorId) {
        if let Some(members) = self.carriers.get_mut(&ancestor) {
            members.retain(|&m| m != copy);
            if members.is_empty() {
                self.carriers.swap_remove(&ancestor);
            }
        }
    }

    /// Apply the ancestor changes of one position.
    fn apply(&mut self, position: Position, batch: &[(usize, AncestorId)]) -> Result<()> {
        let moves: Vec<(usize, Option<AncestorId>, AncestorId)> = batch
            .iter()
            .filter(|&&(copy, new)| self.current[copy] != Some(new))
            .map(|&(copy, new)| (copy, self.current[copy], new))
            .collect();
        if moves.is_empty() {
            return Ok(());
        }
        let incoming: HashMap<usize, AncestorId> =
            moves.iter().map(|&(copy, _, new)| (copy, new)).collect();

        for &(copy, old, new) in &moves {
            let Some(old) = old else { continue };
            self.detach(copy, old);
            let Self {
                carriers, ledger, ..
            } = self;
            if let Some(members) = carriers.get(&old) {
                for &other in members {
                    // a partner moving to the same ancestor keeps sharing
                    if incoming.get(&other) != Some(&new) {
                        ledger.close(pair(copy, other), position)?;
                    }
                }
            }
        }

        for &(copy, _, new) in &moves {
            let Self {
                carriers, ledger, ..
            } = self;
            let members = carriers.entry(new).or_default();
            for &other in members.iter() {
                let key = pair(copy, other);
                if !ledger.is_open(key) {
                    ledger.open(key, position)?;
                }
            }
            members.push(copy);
            self.current[copy] = Some(new);
        }
        Ok(())
    }

    /// Apply the changes at a chromosome boundary, where every shared
    /// interval ends and restarts.
    fn cross_boundary(&mut self, position: Position, batch: &[(usize, AncestorId)]) -> Result<()> {
        for &(copy, new) in batch {
            if let Some(old) = self.current[copy] {
                if old == new {
                    continue;
                }
                self.detach(copy, old);
            }
            self.carriers.entry(new).or_default().push(copy);
            self.current[copy] = Some(new);
        }

        self.ledger.close_all(position)?;
        let Self {
            carriers, ledger, ..
        } = self;
        for members in carriers.values() {
            for (k, &i) in members.iter().enumerate() {
                for &j in &members[k + 1..] {
                    ledger.open(pair(i, j), position)?;
                }
            }
        }
        Ok(())
    }
}

/// Writes the whitespace-delimited IBD table.
pub struct IbdWriter<W: Write> {
    writer: W,
    rows: usize,
}

impl<W: Write> IbdWriter<W> {
    /// Wrap `writer`, writing the header row immediately.
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{}", IBD_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write(&mut self, segment: &IbdSegment) -> Result<()> {
        writeln!(
            self.writer,
            "{} {} {} {}",
            segment.id1, segment.id2, segment.start, segment.end
        )?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and return the number of rows written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const L: Position = 1.0;

    fn copy(positions: &[Position], ids: &[u64]) -> ChromosomeCopy {
        ChromosomeCopy::from_parts(
            positions.to_vec(),
            ids.iter().map(|&i| AncestorId(i)).collect(),
            L,
        )
        .unwrap()
    }

    fn extract(copies: &[ChromosomeCopy], policy: IbdPolicy) -> Vec<IbdSegment> {
        let genome = GenomeMap::from_lengths(&[L]).unwrap();
        extract_on(&genome, copies, policy)
    }

    fn extract_on(
        genome: &GenomeMap,
        copies: &[ChromosomeCopy],
        policy: IbdPolicy,
    ) -> Vec<IbdSegment> {
        let refs: Vec<&ChromosomeCopy> = copies.iter().collect();
        let mut segments = IbdExtractor::new(genome, policy).segments(&refs).unwrap();
        segments.sort_by(|a, b| {
            (a.id1, a.id2)
                .cmp(&(b.id1, b.id2))
                .then(a.start.total_cmp(&b.start))
        });
        segments
    }

    fn no_filter() -> IbdPolicy {
        IbdPolicy::new(0.0, 0.0).unwrap()
    }

    fn seg(id1: usize, id2: usize, start: Position, end: Position) -> IbdSegment {
        IbdSegment {
            id1,
            id2,
            start,
            end,
        }
    }

    #[test]
    fn test_whole_genome_sharing() {
        let copies = vec![copy(&[0.0], &[7]), copy(&[0.0], &[7]), copy(&[0.0], &[8])];
        assert_eq!(extract(&copies, no_filter()), vec![seg(0, 1, 0.0, 1.0)]);
    }

    #[test]
    fn test_partial_sharing() {
        let copies = vec![
            copy(&[0.0, 0.3, 0.6], &[1, 2, 3]),
            copy(&[0.0, 0.3, 0.8], &[4, 2, 5]),
            copy(&[0.0, 0.5], &[2, 3]),
        ];
        assert_eq!(
            extract(&copies, no_filter()),
            vec![
                seg(0, 1, 0.3, 0.6),
                seg(0, 2, 0.3, 0.5),
                seg(0, 2, 0.6, 1.0),
                seg(1, 2, 0.3, 0.5),
            ]
        );
    }

    #[test]
    fn test_simultaneous_switch_to_same_ancestor_stays_open() {
        // both copies follow one recombining ancestor: one maximal interval
        let copies = vec![copy(&[0.0, 0.4], &[1, 2]), copy(&[0.0, 0.4], &[1, 2])];
        assert_eq!(extract(&copies, no_filter()), vec![seg(0, 1, 0.0, 1.0)]);
    }

    #[test]
    fn test_coalesced_and_uncoalesced_input_agree() {
        let coalesced = vec![copy(&[0.0, 0.5], &[1, 2]), copy(&[0.0], &[1])];
        let split = vec![copy(&[0.0, 0.2, 0.5], &[1, 1, 2]), copy(&[0.0, 0.7], &[1, 1])];
        let expected = vec![seg(0, 1, 0.0, 0.5)];
        assert_eq!(extract(&coalesced, no_filter()), expected);
        assert_eq!(extract(&split, no_filter()), expected);
    }

    #[test]
    fn test_no_self_pairs_and_ordered_ids() {
        let copies = vec![
            copy(&[0.0, 0.5], &[3, 1]),
            copy(&[0.0], &[3]),
            copy(&[0.0, 0.25], &[1, 3]),
        ];
        let segments = extract(&copies, no_filter());
        assert!(!segments.is_empty());
        assert!(segments.iter().all(|s| s.id1 < s.id2));
    }

    #[test]
    fn test_gap_merge() {
        // [0, 0.15) and [0.2, 0.4) with a 0.05 gap merge into [0, 0.4)
        let copies = vec![
            copy(&[0.0, 0.15, 0.2, 0.4], &[1, 2, 1, 3]),
            copy(&[0.0, 0.15, 0.2, 0.4], &[1, 4, 1, 5]),
        ];
        let policy = IbdPolicy::new(0.2, 0.1).unwrap();
        assert_eq!(extract(&copies, policy), vec![seg(0, 1, 0.0, 0.4)]);
    }

    #[test]
    fn test_gap_wider_than_gaplen_not_merged() {
        let copies = vec![
            copy(&[0.0, 0.3, 0.5], &[1, 2, 1]),
            copy(&[0.0, 0.3, 0.5], &[1, 4, 1]),
        ];
        let policy = IbdPolicy::new(0.0, 0.1).unwrap();
        assert_eq!(
            extract(&copies, policy),
            vec![seg(0, 1, 0.0, 0.3), seg(0, 1, 0.5, 1.0)]
        );
    }

    #[test]
    fn test_gap_wider_than_both_intervals_not_merged() {
        // gap 0.2 <= gaplen, but both neighbours are shorter than the gap
        let copies = vec![
            copy(&[0.0, 0.1, 0.3, 0.45], &[1, 2, 1, 3]),
            copy(&[0.0, 0.1, 0.3, 0.45], &[1, 4, 1, 5]),
        ];
        let policy = IbdPolicy::new(0.0, 0.5).unwrap();
        assert_eq!(
            extract(&copies, policy),
            vec![seg(0, 1, 0.0, 0.1), seg(0, 1, 0.3, 0.45)]
        );
    }

    #[test]
    fn test_chain_of_merges() {
        let copies = vec![
            copy(&[0.0, 0.2, 0.25, 0.5, 0.55], &[1, 2, 1, 3, 1]),
            copy(&[0.0, 0.2, 0.25, 0.5, 0.55], &[1, 4, 1, 5, 1]),
        ];
        let policy = IbdPolicy::new(0.0, 0.1).unwrap();
        assert_eq!(extract(&copies, policy), vec![seg(0, 1, 0.0, 1.0)]);
    }

    #[test]
    fn test_minlen_drops_isolated_short_interval() {
        let copies = vec![
            copy(&[0.0, 0.1, 0.15], &[1, 2, 3]),
            copy(&[0.0, 0.1, 0.15], &[4, 2, 5]),
        ];
        let policy = IbdPolicy::new(0.2, 0.1).unwrap();
        assert!(extract(&copies, policy).is_empty());
        assert_eq!(
            extract(&copies, no_filter()),
            vec![seg(0, 1, 0.1, 0.15)]
        );
    }

    #[test]
    fn test_boundary_splits_and_blocks_merging() {
        let genome = GenomeMap::from_lengths(&[0.5, 0.5]).unwrap();
        let copies = vec![
            ChromosomeCopy::whole(AncestorId(1)),
            ChromosomeCopy::whole(AncestorId(1)),
        ];
        let policy = IbdPolicy::new(0.0, 1.0).unwrap();
        assert_eq!(
            extract_on(&genome, &copies, policy),
            vec![seg(0, 1, 0.0, 0.5), seg(0, 1, 0.5, 1.0)]
        );
    }

    #[test]
    fn test_boundary_with_breakpoints() {
        let genome = GenomeMap::from_lengths(&[0.5, 0.5]).unwrap();
        let copies = vec![copy(&[0.0, 0.5], &[1, 2]), copy(&[0.0, 0.5], &[1, 2])];
        assert_eq!(
            extract_on(&genome, &copies, no_filter()),
            vec![seg(0, 1, 0.0, 0.5), seg(0, 1, 0.5, 1.0)]
        );
    }

    #[test]
    fn test_small_inputs() {
        assert!(extract(&[], no_filter()).is_empty());
        assert!(extract(&[copy(&[0.0], &[1])], no_filter()).is_empty());
    }

    #[test]
    fn test_many_carriers() {
        let copies: Vec<_> = (0..5).map(|_| copy(&[0.0, 0.5], &[1, 2])).collect();
        let segments = extract(&copies, no_filter());
        assert_eq!(segments.len(), 10);
        assert!(segments.iter().all(|s| s.start == 0.0 && s.end == 1.0));
    }

    #[test]
    fn test_policy_validation() {
        assert!(IbdPolicy::new(-0.1, 0.0).is_err());
        assert!(IbdPolicy::new(0.0, f64::NAN).is_err());
        assert!(IbdPolicy::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_writer() {
        let mut buffer = Vec::new();
        {
            let mut writer = IbdWriter::new(&mut buffer).unwrap();
            writer.write(&seg(0, 3, 0.0, 1.5)).unwrap();
            assert_eq!(writer.finish().unwrap(), 1);
        }
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "id1 id2 start end\n0 3 0 1.5\n");
    }

    #[test]
    fn test_writer_header_only() {
        let mut buffer = Vec::new();
        IbdWriter::new(&mut buffer).unwrap().finish().unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "id1 id2 start end\n");
    }
}
