//! Exact Euclidean distance transform over a binary occupancy grid.
//!
//! Felzenszwalb & Huttenlocher, "Distance Transforms of Sampled Functions":
//! a 1D lower-envelope-of-parabolas pass along every row, then along every
//! column of the row result.

use rayon::prelude::*;

/// Stand-in for "no occupied cell seen yet". Finite so that envelope
/// intersections never compute `inf - inf`.
const FAR: f32 = f32::MAX / 2.0;

struct Scratch {
    v: Vec<usize>,
    z: Vec<f32>,
    out: Vec<f32>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Scratch {
            v: vec![0; n],
            z: vec![0.0; n + 1],
            out: vec![0.0; n],
        }
    }
}

/// In-place 1D squared distance transform of `row`.
fn dt_1d(row: &mut [f32], s: &mut Scratch) {
    let f: &[f32] = row;
    let n = f.len();
    if n == 0 {
        return;
    }
    let sq = |x: f32| x * x;
    let intersect = |f: &[f32], q: usize, p: usize| {
        ((f[q] + sq(q as f32)) - (f[p] + sq(p as f32))) / (2.0 * q as f32 - 2.0 * p as f32)
    };

    let mut k = 0usize;
    s.v[0] = 0;
    s.z[0] = f32::NEG_INFINITY;
    s.z[1] = f32::INFINITY;
    for q in 1..n {
        let mut x = intersect(f, q, s.v[k]);
        while x <= s.z[k] {
            // z[0] is -inf, so this never underflows
            k -= 1;
            x = intersect(f, q, s.v[k]);
        }
        k += 1;
        s.v[k] = q;
        s.z[k] = x;
        s.z[k + 1] = f32::INFINITY;
    }

    k = 0;
    for q in 0..n {
        while s.z[k + 1] < q as f32 {
            k += 1;
        }
        let p = s.v[k];
        s.out[q] = sq(q as f32 - p as f32) + f[p];
    }
    row.copy_from_slice(&s.out[..n]);
}

fn transform_rows(data: &mut [f32], width: usize) {
    data.par_chunks_mut(width)
        .for_each_init(|| Scratch::new(width), |scratch, row| dt_1d(row, scratch));
}

fn transpose(src: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut dst = vec![0.0; src.len()];
    for y in 0..height {
        for x in 0..width {
            dst[x * height + y] = src[y * width + x];
        }
    }
    dst
}

/// Distance, in cells, from every cell to the nearest occupied cell.
///
/// `occupied` is row-major with `rows * cols` entries. Occupied cells get `0`;
/// every cell is `f32::INFINITY` when nothing is occupied.
pub fn distance_transform(occupied: &[bool], rows: usize, cols: usize) -> Vec<f32> {
    assert_eq!(occupied.len(), rows * cols);
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let mut data: Vec<f32> = occupied
        .iter()
        .map(|&o| if o { 0.0 } else { FAR })
        .collect();

    transform_rows(&mut data, cols);
    let mut columns = transpose(&data, cols, rows);
    transform_rows(&mut columns, rows);
    let data = transpose(&columns, rows, cols);

    data.into_par_iter()
        .map(|d2| if d2 >= FAR { f32::INFINITY } else { d2.sqrt() })
        .collect()
}
