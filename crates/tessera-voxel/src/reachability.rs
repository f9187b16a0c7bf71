//! Per-chunk face-to-face reachability.
//!
//! For each of the 15 unordered pairs of chunk faces, records whether a
//! connected region of non-opaque cells touches both faces. The streaming
//! planner uses this to avoid expanding visibility through solid rock.

use std::collections::VecDeque;

use crate::block::BlockRecord;
use crate::chunk::{CHUNK_SIDE, CHUNK_VOLUME};
use crate::coords::Face;
use crate::registry::MaterialRegistry;

/// Number of unordered face pairs (6 choose 2).
pub const FACE_PAIRS: usize = 15;

/// Index of the unordered pair `{a, b}` in `0..15`. `a` and `b` must differ.
pub fn pair_index(a: Face, b: Face) -> usize {
    debug_assert_ne!(a, b);
    let (lo, hi) = if a < b { (a.index(), b.index()) } else { (b.index(), a.index()) };
    lo * (11 - lo) / 2 + (hi - lo - 1)
}

/// Which pairs of faces are connected through non-opaque space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reachability([bool; FACE_PAIRS]);

impl Reachability {
    /// Every face pair is connected (e.g. an all-air chunk).
    pub const fn all_open() -> Self {
        Self([true; FACE_PAIRS])
    }

    /// No face pair is connected (e.g. a solid chunk).
    pub const fn all_closed() -> Self {
        Self([false; FACE_PAIRS])
    }

    /// Can a path enter through `from` and leave through `to`?
    ///
    /// Leaving through the entry face is always possible.
    pub fn can_cross(&self, from: Face, to: Face) -> bool {
        from == to || self.0[pair_index(from, to)]
    }

    pub fn set(&mut self, a: Face, b: Face, connected: bool) {
        self.0[pair_index(a, b)] = connected;
    }

    /// Persisted form: one byte (0 or 1) per pair.
    pub fn to_bytes(&self) -> [u8; FACE_PAIRS] {
        self.0.map(u8::from)
    }

    /// Inverse of [`to_bytes`](Self::to_bytes); any non-zero byte is `true`.
    pub fn from_bytes(bytes: &[u8; FACE_PAIRS]) -> Self {
        Self(bytes.map(|b| b != 0))
    }

    /// Computes reachability for a full chunk block array.
    pub fn compute(blocks: &[BlockRecord], registry: &MaterialRegistry) -> Self {
        debug_assert_eq!(blocks.len(), CHUNK_VOLUME);

        let opaque: Vec<bool> = blocks
            .iter()
            .map(|b| registry.is_opaque(b.material()))
            .collect();
        if opaque.iter().all(|o| !o) {
            return Self::all_open();
        }
        if opaque.iter().all(|o| *o) {
            return Self::all_closed();
        }

        let mut result = Self::all_closed();
        let mut visited = vec![false; CHUNK_VOLUME];
        let mut queue = VecDeque::new();

        for start in 0..CHUNK_VOLUME {
            if opaque[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            queue.push_back(start);
            let mut touched = 0u8;

            while let Some(index) = queue.pop_front() {
                let (x, y, z) = unflatten(index);
                touched |= faces_touched(x, y, z);

                for face in Face::ALL {
                    let Some(next) = step(x, y, z, face) else {
                        continue;
                    };
                    if !opaque[next] && !visited[next] {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }

            for a in Face::ALL {
                for b in Face::ALL {
                    if a < b && touched & (1 << a.index()) != 0 && touched & (1 << b.index()) != 0
                    {
                        result.set(a, b, true);
                    }
                }
            }
        }

        result
    }
}

impl Default for Reachability {
    fn default() -> Self {
        Self::all_open()
    }
}

fn unflatten(index: usize) -> (usize, usize, usize) {
    (
        index % CHUNK_SIDE,
        (index / CHUNK_SIDE) % CHUNK_SIDE,
        index / (CHUNK_SIDE * CHUNK_SIDE),
    )
}

fn faces_touched(x: usize, y: usize, z: usize) -> u8 {
    let last = CHUNK_SIDE - 1;
    let mut mask = 0u8;
    if x == 0 {
        mask |= 1 << Face::NegX.index();
    }
    if x == last {
        mask |= 1 << Face::PosX.index();
    }
    if y == 0 {
        mask |= 1 << Face::NegY.index();
    }
    if y == last {
        mask |= 1 << Face::PosY.index();
    }
    if z == 0 {
        mask |= 1 << Face::NegZ.index();
    }
    if z == last {
        mask |= 1 << Face::PosZ.index();
    }
    mask
}

fn step(x: usize, y: usize, z: usize, face: Face) -> Option<usize> {
    let (dx, dy, dz) = face.offset();
    let nx = x.checked_add_signed(dx as isize)?;
    let ny = y.checked_add_signed(dy as isize)?;
    let nz = z.checked_add_signed(dz as isize)?;
    if nx >= CHUNK_SIDE || ny >= CHUNK_SIDE || nz >= CHUNK_SIDE {
        return None;
    }
    Some(nx + ny * CHUNK_SIDE + nz * CHUNK_SIDE * CHUNK_SIDE)
}
