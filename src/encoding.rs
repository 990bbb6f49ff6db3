//! Per-face feature buffers and the face adjacency table.
//!
//! The relative encoding stores, for each face, one rotation vector per
//! adjacency slot followed by six shape scalars:
//!
//! ```text
//! | slot 0 (3) | slot 1 (3) | slot 2 (3) | shape (6) |   = RELATIVE_STRIDE
//! ```
//!
//! The absolute encoding replaces the three slot rotations with a single
//! rotation vector and keeps the shape scalars unchanged. See [`OutputLayout`]
//! for the two supported record layouts.

use nalgebra::Vector3;
use serde::Serialize;

use crate::error::{DecodeError, Result};

/// Number of adjacency slots per face.
pub const NUM_SLOTS: usize = 3;

/// Number of passthrough shape scalars per face.
pub const SHAPE_LEN: usize = 6;

/// Values per face in the relative encoding.
pub const RELATIVE_STRIDE: usize = 3 * NUM_SLOTS + SHAPE_LEN;

/// Offset of the shape scalars within a relative record.
const RELATIVE_SHAPE_OFFSET: usize = 3 * NUM_SLOTS;

/// Read-only view over a relative rotation encoding.
#[derive(Debug, Clone, Copy)]
pub struct RelativeEncoding<'a> {
    data: &'a [f64],
}

impl<'a> RelativeEncoding<'a> {
    /// Wrap a flat feature buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::EmptyInput`] for an empty buffer,
    /// [`DecodeError::MalformedFeatures`] if the length is not a multiple of
    /// [`RELATIVE_STRIDE`], and [`DecodeError::NonFiniteInput`] if any value is
    /// NaN or infinite.
    pub fn new(data: &'a [f64]) -> Result<Self> {
        if data.is_empty() {
            return Err(DecodeError::EmptyInput);
        }
        if data.len() % RELATIVE_STRIDE != 0 {
            return Err(DecodeError::MalformedFeatures {
                len: data.len(),
                stride: RELATIVE_STRIDE,
            });
        }
        if let Some(index) = data.iter().position(|x| !x.is_finite()) {
            return Err(DecodeError::NonFiniteInput { index });
        }
        Ok(Self { data })
    }

    /// Number of faces in the buffer.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.data.len() / RELATIVE_STRIDE
    }

    /// Relative rotation vector stored for `face` in adjacency `slot`.
    #[inline]
    pub fn relative_rotation(&self, face: usize, slot: usize) -> Vector3<f64> {
        debug_assert!(slot < NUM_SLOTS);
        let base = face * RELATIVE_STRIDE + 3 * slot;
        Vector3::new(self.data[base], self.data[base + 1], self.data[base + 2])
    }

    /// Shape scalars of `face`.
    #[inline]
    pub fn shape(&self, face: usize) -> &'a [f64] {
        let base = face * RELATIVE_STRIDE + RELATIVE_SHAPE_OFFSET;
        &self.data[base..base + SHAPE_LEN]
    }

    /// The underlying flat buffer.
    #[inline]
    pub fn as_slice(&self) -> &'a [f64] {
        self.data
    }
}

/// Face adjacency table: up to three neighbour faces per face.
///
/// A slot without a neighbour is `None`. Neighbour indices are not checked on
/// construction; the decoder rejects out-of-range indices when it assembles
/// the constraint system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjacency {
    neighbours: Vec<[Option<usize>; NUM_SLOTS]>,
}

impl Adjacency {
    /// Create a table from explicit slots.
    pub fn new(neighbours: Vec<[Option<usize>; NUM_SLOTS]>) -> Self {
        Self { neighbours }
    }

    /// Create a table from signed indices, where any negative value marks an
    /// empty slot.
    ///
    /// # Example
    ///
    /// ```
    /// use deltarot::encoding::Adjacency;
    ///
    /// let adj = Adjacency::from_signed(&[[1, -1, -1], [0, -1, -1]]);
    /// assert_eq!(adj.neighbours(0), [Some(1), None, None]);
    /// ```
    pub fn from_signed(rows: &[[i64; NUM_SLOTS]]) -> Self {
        let neighbours = rows
            .iter()
            .map(|row| row.map(|n| usize::try_from(n).ok()))
            .collect();
        Self { neighbours }
    }

    /// Number of faces (rows).
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.neighbours.len()
    }

    /// Whether the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }

    /// Neighbour slots of `face`.
    #[inline]
    pub fn neighbours(&self, face: usize) -> [Option<usize>; NUM_SLOTS] {
        self.neighbours[face]
    }

    /// Iterate over all rows in face order.
    pub fn rows(&self) -> impl Iterator<Item = &[Option<usize>; NUM_SLOTS]> + '_ {
        self.neighbours.iter()
    }

    /// Slots of `face` that carry a constraint: present neighbours with a
    /// larger index, so each undirected edge is visited exactly once.
    pub fn forward_slots(&self, face: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.neighbours[face]
            .iter()
            .enumerate()
            .filter_map(move |(slot, n)| match *n {
                Some(n) if n > face => Some((slot, n)),
                _ => None,
            })
    }

    /// Number of undirected edges that produce constraint rows.
    pub fn num_forward_edges(&self) -> usize {
        (0..self.num_faces())
            .map(|f| self.forward_slots(f).count())
            .sum()
    }

    /// Check that every present neighbour index is a valid face.
    pub fn validate(&self) -> Result<()> {
        let num_faces = self.num_faces();
        for (face, row) in self.neighbours.iter().enumerate() {
            for (slot, n) in row.iter().enumerate() {
                if let Some(n) = *n {
                    if n >= num_faces {
                        return Err(DecodeError::InvalidNeighbour {
                            face,
                            slot,
                            neighbour: n,
                            num_faces,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Label every face with the index of its connected component.
    ///
    /// Only references that produce constraint rows (see
    /// [`forward_slots`](Self::forward_slots)) link faces, so a neighbour listed
    /// by the higher-indexed face alone does not connect anything. Out-of-range
    /// indices are ignored. Returns the per-face labels and the number of
    /// components.
    pub fn connected_components(&self) -> (Vec<usize>, usize) {
        let n = self.num_faces();
        let mut parent: Vec<usize> = (0..n).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for face in 0..n {
            for (_, nb) in self.forward_slots(face) {
                if nb < n {
                    let a = find(&mut parent, face);
                    let b = find(&mut parent, nb);
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
            }
        }

        let mut labels = vec![usize::MAX; n];
        let mut root_label = vec![usize::MAX; n];
        let mut count = 0;
        for face in 0..n {
            let root = find(&mut parent, face);
            if root_label[root] == usize::MAX {
                root_label[root] = count;
                count += 1;
            }
            labels[face] = root_label[root];
        }
        (labels, count)
    }

    /// First face that is not connected to face 0, if any.
    ///
    /// The decode anchors face 0 only, so every such face leaves the
    /// constraint system singular.
    pub fn first_unanchored_face(&self) -> Option<usize> {
        let (labels, _) = self.connected_components();
        let root = *labels.first()?;
        labels.iter().position(|&l| l != root)
    }
}

/// Record layout of the decoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// 9 values per face: rotation vector, then shape scalars.
    #[default]
    Compact,
    /// 10 values per face: rotation vector, one zero, then shape scalars.
    ///
    /// Matches the record layout of the legacy decoder's output.
    Padded,
}

impl OutputLayout {
    /// Values per face.
    #[inline]
    pub fn stride(self) -> usize {
        match self {
            OutputLayout::Compact => 3 + SHAPE_LEN,
            OutputLayout::Padded => 4 + SHAPE_LEN,
        }
    }

    /// Offset of the shape scalars within a record.
    #[inline]
    pub fn shape_offset(self) -> usize {
        self.stride() - SHAPE_LEN
    }

    /// Write one record into `out` (which must have length [`Self::stride`]).
    pub(crate) fn write_record(self, out: &mut [f64], rotation: &Vector3<f64>, shape: &[f64]) {
        out[..3].copy_from_slice(rotation.as_slice());
        if self == OutputLayout::Padded {
            out[3] = 0.0;
        }
        let offset = self.shape_offset();
        out[offset..offset + SHAPE_LEN].copy_from_slice(shape);
    }
}

/// Summary of a decode call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodeReport {
    /// Number of faces decoded.
    pub num_faces: usize,
    /// Undirected edges that contributed constraint rows.
    pub used_edges: usize,
    /// Rows of the constraint matrix (`3 * used_edges + 3`).
    pub constraint_rows: usize,
    /// Nonzeros of the constraint matrix.
    pub constraint_nnz: usize,
    /// Nonzeros of the factor `L` (zero for the iterative solver).
    pub factor_nnz: usize,
    /// Frobenius norm of the least-squares residual `A·X - B`.
    pub residual: f64,
    /// Faces whose projection was a reflection and was corrected.
    pub reflections_corrected: usize,
    /// Faces whose projection was a reflection and was left uncorrected; see
    /// [`AbsoluteEncoding::reflected_faces`].
    pub reflections_kept: usize,
}

/// Decoded absolute rotation encoding.
#[derive(Debug, Clone)]
pub struct AbsoluteEncoding {
    data: Vec<f64>,
    layout: OutputLayout,
    report: DecodeReport,
    reflected: Vec<usize>,
}

impl AbsoluteEncoding {
    pub(crate) fn new(
        data: Vec<f64>,
        layout: OutputLayout,
        report: DecodeReport,
        reflected: Vec<usize>,
    ) -> Self {
        debug_assert_eq!(data.len() % layout.stride(), 0);
        Self {
            data,
            layout,
            report,
            reflected,
        }
    }

    /// Number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.data.len() / self.layout.stride()
    }

    /// Record layout.
    #[inline]
    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    /// Absolute rotation vector of `face`.
    #[inline]
    pub fn rotation(&self, face: usize) -> Vector3<f64> {
        let base = face * self.layout.stride();
        Vector3::new(self.data[base], self.data[base + 1], self.data[base + 2])
    }

    /// Shape scalars of `face`.
    #[inline]
    pub fn shape(&self, face: usize) -> &[f64] {
        let base = face * self.layout.stride() + self.layout.shape_offset();
        &self.data[base..base + SHAPE_LEN]
    }

    /// The flat buffer.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Consume and return the flat buffer.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Statistics gathered while decoding.
    #[inline]
    pub fn report(&self) -> &DecodeReport {
        &self.report
    }

    /// Faces, in increasing order, whose closest orthogonal matrix was a
    /// reflection left uncorrected.
    ///
    /// A reflection has no rotation vector. For these faces
    /// [`rotation`](Self::rotation) holds the rotation `-M`, where `M` is the
    /// reflection (`det M = -1`), so `M` is recovered as
    /// `-vector_to_rotation(rotation(face))`. Always empty with
    /// [`Orthogonalization::Proper`](crate::algo::decode::Orthogonalization::Proper).
    #[inline]
    pub fn reflected_faces(&self) -> &[usize] {
        &self.reflected
    }
}
