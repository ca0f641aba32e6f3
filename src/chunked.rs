//! Segmented append-only storage for co-indexed data streams.
//!
//! A [`ChunkedData<A, B>`] stores pairs `(A, B)` as two parallel vectors per
//! chunk, so a replay loop can read e.g. all target identifiers of a chunk
//! as one contiguous slice. One-column streams use `B = ()`, which costs
//! nothing.
//!
//! Chunks are never split by a reservation: after `reserve(n)` the next `n`
//! pushes land in one chunk. The replay engine relies on this to hand out
//! variable-length contiguous runs (a statement's Jacobian entries, a
//! low-level block's bytes) with a [`Cursor`].

use log::trace;

/// Cut point in one stream: chunk number and offset within that chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkPosition {
    pub chunk: usize,
    pub data: usize,
}

impl ChunkPosition {
    pub const ZERO: ChunkPosition = ChunkPosition { chunk: 0, data: 0 };

    #[inline]
    pub fn new(chunk: usize, data: usize) -> Self {
        ChunkPosition { chunk, data }
    }
}

#[derive(Clone, Debug)]
struct Chunk<A, B> {
    first: Vec<A>,
    second: Vec<B>,
    limit: usize,
}

impl<A, B> Chunk<A, B> {
    fn with_limit(limit: usize) -> Self {
        Chunk {
            first: Vec::with_capacity(limit),
            second: Vec::with_capacity(limit),
            limit,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.first.len()
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.limit - self.len()
    }
}

/// Segmented buffer of co-indexed `(A, B)` items.
#[derive(Clone, Debug)]
pub struct ChunkedData<A, B = ()> {
    chunks: Vec<Chunk<A, B>>,
    chunk_size: usize,
}

impl<A: Copy, B: Copy> ChunkedData<A, B> {
    /// Create a store whose chunks hold `chunk_size` items.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        ChunkedData {
            chunks: vec![Chunk::with_limit(chunk_size)],
            chunk_size,
        }
    }

    /// Make sure the next `n` items fit contiguously in the current chunk.
    #[inline]
    pub fn reserve(&mut self, n: usize) {
        if self.current().remaining() < n {
            self.new_chunk(n);
        }
    }

    #[inline(never)]
    fn new_chunk(&mut self, n: usize) {
        let limit = self.chunk_size.max(n);
        trace!(
            "allocating chunk {} with room for {limit} items",
            self.chunks.len()
        );
        self.chunks.push(Chunk::with_limit(limit));
    }

    #[inline]
    fn current(&self) -> &Chunk<A, B> {
        // There is always at least one chunk.
        &self.chunks[self.chunks.len() - 1]
    }

    #[inline]
    fn current_mut(&mut self) -> &mut Chunk<A, B> {
        let last = self.chunks.len() - 1;
        &mut self.chunks[last]
    }

    /// Append one item. Must be preceded by a [`reserve`](Self::reserve)
    /// covering it.
    #[inline]
    pub fn push_data(&mut self, a: A, b: B) {
        let chunk = self.current_mut();
        debug_assert!(chunk.remaining() > 0, "push without reserve");
        chunk.first.push(a);
        chunk.second.push(b);
    }

    /// Current end of the stream.
    #[inline]
    pub fn position(&self) -> ChunkPosition {
        ChunkPosition::new(self.chunks.len() - 1, self.current().len())
    }

    #[inline]
    pub fn zero_position(&self) -> ChunkPosition {
        ChunkPosition::ZERO
    }

    /// Whether `position` lies within the recorded data.
    pub fn contains(&self, position: ChunkPosition) -> bool {
        self.chunks
            .get(position.chunk)
            .is_some_and(|c| position.data <= c.len())
    }

    /// Truncate the stream back to `position`. Chunks after it are dropped.
    pub fn reset_to(&mut self, position: ChunkPosition) {
        assert!(
            self.contains(position),
            "cannot reset to {position:?}; stream ends at {:?}",
            self.position()
        );
        self.chunks.truncate(position.chunk + 1);
        let chunk = self.current_mut();
        chunk.first.truncate(position.data);
        chunk.second.truncate(position.data);
    }

    /// Drop everything, keeping only the first chunk's allocation.
    pub fn reset(&mut self) {
        self.reset_to(ChunkPosition::ZERO);
    }

    /// Total number of items in all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.position() == ChunkPosition::ZERO
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of items between two positions of this stream.
    pub fn distance(&self, start: ChunkPosition, end: ChunkPosition) -> usize {
        if end <= start {
            return 0;
        }
        if start.chunk == end.chunk {
            return end.data - start.data;
        }
        let mut total = self.chunks[start.chunk].len() - start.data;
        for chunk in &self.chunks[start.chunk + 1..end.chunk] {
            total += chunk.len();
        }
        total + end.data
    }

    /// Bytes allocated by all chunks.
    pub fn allocated_bytes(&self) -> usize {
        let item = std::mem::size_of::<A>() + std::mem::size_of::<B>();
        self.chunks.iter().map(|c| c.limit * item).sum()
    }

    /// Bytes holding recorded items.
    pub fn used_bytes(&self) -> usize {
        (std::mem::size_of::<A>() + std::mem::size_of::<B>()) * self.len()
    }

    /// Call `handler` for every chunk touched by `[start, end)`, in recording
    /// order.
    ///
    /// The handler receives the chunk's full column slices, a cursor
    /// initialized to the first item in range and the exclusive bound within
    /// that chunk. It must advance the cursor up to the bound; items may be
    /// consumed in variable-sized steps.
    pub fn evaluate_forward<H>(&self, start: ChunkPosition, end: ChunkPosition, mut handler: H)
    where
        H: FnMut(&[A], &[B], &mut usize, usize),
    {
        assert!(start <= end, "forward range {start:?}..{end:?} is reversed");
        for index in start.chunk..=end.chunk {
            let chunk = &self.chunks[index];
            let mut cursor = if index == start.chunk { start.data } else { 0 };
            let bound = if index == end.chunk { end.data } else { chunk.len() };
            handler(&chunk.first, &chunk.second, &mut cursor, bound);
            assert_eq!(
                cursor, bound,
                "forward handler stopped at {cursor} instead of {bound} in chunk {index}"
            );
        }
    }

    /// Call `handler` for every chunk touched by the range from `start` down
    /// to `end` (`end <= start`), in reverse recording order.
    ///
    /// The cursor starts one past the last item in range and the handler
    /// must decrement it down to the bound.
    pub fn evaluate_reverse<H>(&self, start: ChunkPosition, end: ChunkPosition, mut handler: H)
    where
        H: FnMut(&[A], &[B], &mut usize, usize),
    {
        assert!(end <= start, "reverse range {start:?}..{end:?} is reversed");
        for index in (end.chunk..=start.chunk).rev() {
            let chunk = &self.chunks[index];
            let mut cursor = if index == start.chunk {
                start.data
            } else {
                chunk.len()
            };
            let bound = if index == end.chunk { end.data } else { 0 };
            handler(&chunk.first, &chunk.second, &mut cursor, bound);
            assert_eq!(
                cursor, bound,
                "reverse handler stopped at {cursor} instead of {bound} in chunk {index}"
            );
        }
    }

    /// A cursor for lockstep traversal starting at `position`.
    pub fn cursor(&self, position: ChunkPosition) -> Cursor<'_, A, B> {
        Cursor {
            data: self,
            position,
        }
    }

    /// Two positions denote the same cut when one sits at the end of a chunk
    /// and the other at the start of the following one.
    pub fn same_cut(&self, a: ChunkPosition, b: ChunkPosition) -> bool {
        self.normalize(a) == self.normalize(b)
    }

    fn normalize(&self, mut position: ChunkPosition) -> ChunkPosition {
        while position.chunk + 1 < self.chunks.len()
            && position.data == self.chunks[position.chunk].len()
        {
            position = ChunkPosition::new(position.chunk + 1, 0);
        }
        position
    }
}

impl<A: Copy> ChunkedData<A, ()> {
    /// Append one item to a one-column stream.
    #[inline]
    pub fn push(&mut self, a: A) {
        self.push_data(a, ());
    }
}

impl<A: Copy + Default> ChunkedData<A, ()> {
    /// Reserve `n` contiguous items, fill them with `A::default()` and return
    /// them for writing.
    pub fn push_zeroed(&mut self, n: usize) -> &mut [A] {
        self.reserve(n);
        let chunk = self.current_mut();
        let start = chunk.len();
        chunk.first.resize(start + n, A::default());
        chunk.second.resize(start + n, ());
        &mut chunk.first[start..]
    }
}

/// Lockstep reader over a dependent stream.
///
/// The statement stream drives replay; every other stream is consumed
/// through a cursor in runs whose lengths are only known while walking
/// (argument counts, block sizes).
pub struct Cursor<'a, A, B> {
    data: &'a ChunkedData<A, B>,
    position: ChunkPosition,
}

impl<'a, A: Copy, B: Copy> Cursor<'a, A, B> {
    #[inline]
    pub fn position(&self) -> ChunkPosition {
        self.position
    }

    /// Take the next `n` items in recording order.
    #[inline]
    pub fn take_forward(&mut self, n: usize) -> (&'a [A], &'a [B]) {
        if n == 0 {
            return (&[], &[]);
        }
        let chunks = &self.data.chunks;
        while self.position.data + n > chunks[self.position.chunk].len() {
            assert!(
                self.position.chunk + 1 < chunks.len(),
                "stream exhausted: {n} items requested at {:?}",
                self.position
            );
            self.position = ChunkPosition::new(self.position.chunk + 1, 0);
        }
        let chunk = &chunks[self.position.chunk];
        let range = self.position.data..self.position.data + n;
        self.position.data += n;
        (&chunk.first[range.clone()], &chunk.second[range])
    }

    /// Take the `n` items preceding the cursor; slices are in recording order.
    #[inline]
    pub fn take_reverse(&mut self, n: usize) -> (&'a [A], &'a [B]) {
        if n == 0 {
            return (&[], &[]);
        }
        let chunks = &self.data.chunks;
        while self.position.data < n {
            assert!(
                self.position.chunk > 0,
                "stream exhausted: {n} items requested before {:?}",
                self.position
            );
            let previous = self.position.chunk - 1;
            self.position = ChunkPosition::new(previous, chunks[previous].len());
        }
        let chunk = &chunks[self.position.chunk];
        let range = self.position.data - n..self.position.data;
        self.position.data -= n;
        (&chunk.first[range.clone()], &chunk.second[range])
    }

    /// Assert that the cursor consumed exactly up to `expected`.
    #[inline]
    pub fn finish(&self, expected: ChunkPosition, stream: &str) {
        assert!(
            self.data.same_cut(self.position, expected),
            "{stream} stream out of step with statements: cursor at {:?}, expected {:?}",
            self.position,
            expected
        );
    }
}
