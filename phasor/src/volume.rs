//! Dense three-dimensional grid storage.
//!
//! Voxels are stored row-major with the last axis fastest:
//! `index = (i0 * d1 + i1) * d2 + i2`.

use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::slice;

use rayon::prelude::*;

/// Extents of a volume along its three axes.
pub type Dims = [usize; 3];

/// Number of voxels in a grid of the given extents.
#[inline]
pub fn voxel_count(dims: Dims) -> usize {
    dims[0] * dims[1] * dims[2]
}

#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    data: Vec<T>,
    dims: Dims,
}

impl<T> Volume<T> {
    pub fn new(dims: Dims, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            voxel_count(dims),
            "data length must equal the product of dims"
        );
        Self { data, dims }
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index_of(&self, i0: usize, i1: usize, i2: usize) -> usize {
        debug_assert!(i0 < self.dims[0] && i1 < self.dims[1] && i2 < self.dims[2]);
        (i0 * self.dims[1] + i1) * self.dims[2] + i2
    }

    /// Inverse of [`Volume::index_of`].
    #[inline]
    pub fn coords_of(&self, index: usize) -> [usize; 3] {
        let i2 = index % self.dims[2];
        let rest = index / self.dims[2];
        [rest / self.dims[1], rest % self.dims[1], i2]
    }

    #[inline]
    pub fn get(&self, i0: usize, i1: usize, i2: usize) -> &T {
        &self.data[self.index_of(i0, i1, i2)]
    }

    #[inline]
    pub fn get_mut(&mut self, i0: usize, i1: usize, i2: usize) -> &mut T {
        let idx = self.index_of(i0, i1, i2);
        &mut self.data[idx]
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.data.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.data.iter_mut()
    }

    /// Same-shape check used before elementwise combination.
    #[inline]
    pub fn same_dims<U>(&self, other: &Volume<U>) -> bool {
        self.dims == other.dims
    }
}

impl<T: Sync> Volume<T> {
    /// Elementwise map into a new volume of the same shape.
    pub fn map<U, F>(&self, f: F) -> Volume<U>
    where
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        Volume {
            data: self.data.par_iter().map(f).collect(),
            dims: self.dims,
        }
    }

    /// Elementwise combination of two same-shaped volumes.
    pub fn zip_map<V, U, F>(&self, other: &Volume<V>, f: F) -> Volume<U>
    where
        V: Sync,
        U: Send,
        F: Fn(&T, &V) -> U + Sync + Send,
    {
        assert_eq!(self.dims, other.dims, "volume dims mismatch");
        Volume {
            data: self
                .data
                .par_iter()
                .zip(other.data.par_iter())
                .map(|(a, b)| f(a, b))
                .collect(),
            dims: self.dims,
        }
    }
}

impl<T: Clone> Volume<T> {
    pub fn new_filled(dims: Dims, value: T) -> Self {
        Self {
            data: vec![value; voxel_count(dims)],
            dims,
        }
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Centered sub-volume of extents `roi`. Each extent must not exceed the volume's.
    pub fn crop_center(&self, roi: Dims) -> Self {
        for axis in 0..3 {
            assert!(
                roi[axis] <= self.dims[axis],
                "crop extent {:?} exceeds volume dims {:?}",
                roi,
                self.dims
            );
        }
        let start = centered_offset(self.dims, roi);
        let mut data = Vec::with_capacity(voxel_count(roi));
        for i0 in 0..roi[0] {
            for i1 in 0..roi[1] {
                let row = self.index_of(i0 + start[0], i1 + start[1], start[2]);
                data.extend_from_slice(&self.data[row..row + roi[2]]);
            }
        }
        Self { data, dims: roi }
    }

    /// Places this volume in the center of a larger grid filled with `pad`.
    pub fn pad_around(&self, new_dims: Dims, pad: T) -> Self {
        for axis in 0..3 {
            assert!(
                self.dims[axis] <= new_dims[axis],
                "pad target {:?} smaller than volume dims {:?}",
                new_dims,
                self.dims
            );
        }
        let start = centered_offset(new_dims, self.dims);
        let mut out = Self::new_filled(new_dims, pad);
        for i0 in 0..self.dims[0] {
            for i1 in 0..self.dims[1] {
                let src = self.index_of(i0, i1, 0);
                let dst = out.index_of(i0 + start[0], i1 + start[1], start[2]);
                out.data[dst..dst + self.dims[2]]
                    .clone_from_slice(&self.data[src..src + self.dims[2]]);
            }
        }
        out
    }

    /// Places this volume at the origin corner of a larger grid filled with `pad`.
    pub fn pad_corner(&self, new_dims: Dims, pad: T) -> Self {
        let mut out = Self::new_filled(new_dims, pad);
        for i0 in 0..self.dims[0] {
            for i1 in 0..self.dims[1] {
                let src = self.index_of(i0, i1, 0);
                let dst = out.index_of(i0, i1, 0);
                out.data[dst..dst + self.dims[2]]
                    .clone_from_slice(&self.data[src..src + self.dims[2]]);
            }
        }
        out
    }

    /// Sub-volume of extents `extent` starting at `start`.
    pub fn window(&self, start: [usize; 3], extent: Dims) -> Self {
        for axis in 0..3 {
            assert!(
                start[axis] + extent[axis] <= self.dims[axis],
                "window {:?}+{:?} exceeds volume dims {:?}",
                start,
                extent,
                self.dims
            );
        }
        let mut data = Vec::with_capacity(voxel_count(extent));
        for i0 in 0..extent[0] {
            for i1 in 0..extent[1] {
                let row = self.index_of(i0 + start[0], i1 + start[1], start[2]);
                data.extend_from_slice(&self.data[row..row + extent[2]]);
            }
        }
        Self { data, dims: extent }
    }

    /// Circular shift: the voxel at `i` moves to `(i + shift) mod dims` on every axis.
    pub fn roll(&self, shift: [usize; 3]) -> Self {
        let [d0, d1, d2] = self.dims;
        let mut data = self.data.clone();
        for i0 in 0..d0 {
            let o0 = (i0 + shift[0]) % d0;
            for i1 in 0..d1 {
                let o1 = (i1 + shift[1]) % d1;
                let src = self.index_of(i0, i1, 0);
                let dst = (o0 * d1 + o1) * d2;
                for i2 in 0..d2 {
                    data[dst + (i2 + shift[2]) % d2] = self.data[src + i2].clone();
                }
            }
        }
        Self {
            data,
            dims: self.dims,
        }
    }

    /// Moves the zero-frequency voxel to the center of the grid.
    pub fn fftshift(&self) -> Self {
        let [d0, d1, d2] = self.dims;
        self.roll([d0 / 2, d1 / 2, d2 / 2])
    }

    /// Inverse of [`Volume::fftshift`], also for odd extents.
    pub fn ifftshift(&self) -> Self {
        let [d0, d1, d2] = self.dims;
        self.roll([d0 - d0 / 2, d1 - d1 / 2, d2 - d2 / 2])
    }

    /// Reverses the voxel order along every axis.
    pub fn mirrored(&self) -> Self {
        let [d0, d1, d2] = self.dims;
        let mut data = Vec::with_capacity(self.data.len());
        for i0 in (0..d0).rev() {
            for i1 in (0..d1).rev() {
                let row = self.index_of(i0, i1, 0);
                data.extend(self.data[row..row + d2].iter().rev().cloned());
            }
        }
        Self {
            data,
            dims: self.dims,
        }
    }
}

/// Offset that centers an `inner` grid within an `outer` grid.
#[inline]
pub fn centered_offset(outer: Dims, inner: Dims) -> [usize; 3] {
    [
        (outer[0] - inner[0]) / 2,
        (outer[1] - inner[1]) / 2,
        (outer[2] - inner[2]) / 2,
    ]
}

impl<T> Index<(usize, usize, usize)> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i0, i1, i2): (usize, usize, usize)) -> &Self::Output {
        &self.data[(i0 * self.dims[1] + i1) * self.dims[2] + i2]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, (i0, i1, i2): (usize, usize, usize)) -> &mut Self::Output {
        &mut self.data[(i0 * self.dims[1] + i1) * self.dims[2] + i2]
    }
}

impl<T> Index<usize> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        &self.data[idx]
    }
}

impl<T> IndexMut<usize> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut Self::Output {
        &mut self.data[idx]
    }
}

impl<T> Deref for Volume<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T> DerefMut for Volume<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<'a, T> IntoIterator for &'a Volume<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl<T> From<Volume<T>> for Vec<T> {
    #[inline]
    fn from(volume: Volume<T>) -> Self {
        volume.data
    }
}
