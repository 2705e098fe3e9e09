// SPDX-License-Identifier: GPL-3.0-only

//! Frame processors: NV21 in, RGBA out
//!
//! [`FrameProcessor`] is the boundary to the processing routine. It receives
//! the interleaved frame plus its dimensions and must return exactly
//! `width * height * 4` bytes, or an error. Plain closures implement it too.

use crate::constants::processing;
use crate::errors::{ProcessError, ProcessResult};
use crate::media::{chroma_dimensions, converted_len, rgba_len};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// External processing function invoked once per frame
pub trait FrameProcessor: Send + Sync + 'static {
    fn process(&self, nv21: &[u8], width: u32, height: u32) -> ProcessResult<Vec<u8>>;

    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> FrameProcessor for F
where
    F: Fn(&[u8], u32, u32) -> ProcessResult<Vec<u8>> + Send + Sync + 'static,
{
    fn process(&self, nv21: &[u8], width: u32, height: u32) -> ProcessResult<Vec<u8>> {
        self(nv21, width, height)
    }
}

/// Built-in processors selectable from config and the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorKind {
    /// White edges on black
    #[default]
    Edges,
    /// Plain colour conversion
    Color,
}

impl ProcessorKind {
    pub fn create(self, low_threshold: u16, high_threshold: u16) -> Arc<dyn FrameProcessor> {
        match self {
            ProcessorKind::Edges => Arc::new(EdgeDetector::new(low_threshold, high_threshold)),
            ProcessorKind::Color => Arc::new(ColorConverter),
        }
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorKind::Edges => write!(f, "edges"),
            ProcessorKind::Color => write!(f, "color"),
        }
    }
}

fn check_input(nv21: &[u8], width: u32, height: u32) -> ProcessResult<usize> {
    let expected = converted_len(width, height);
    if nv21.len() < expected {
        return Err(ProcessError::InvalidInput {
            expected,
            actual: nv21.len(),
        });
    }
    rgba_len(width, height).ok_or_else(|| ProcessError::Failed("frame too large".into()))
}

/// Two-threshold edge detector on the luma plane
///
/// Sobel gradient (L1 magnitude), non-maximum suppression along the gradient
/// direction, then hysteresis: pixels above `high` seed edges, which grow
/// through 8-connected pixels above `low`. Edges are opaque white, the rest
/// opaque black.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeDetector {
    low: u16,
    high: u16,
}

impl EdgeDetector {
    pub fn new(low: u16, high: u16) -> Self {
        Self {
            low: low.min(high),
            high: high.max(low),
        }
    }

    /// Edge map with one byte per pixel (255 = edge)
    pub fn edge_map(&self, luma: &[u8], width: usize, height: usize) -> Vec<u8> {
        let (magnitude, direction) = sobel(luma, width, height);
        let thinned = suppress_non_maxima(&magnitude, &direction, width, height);
        hysteresis(&thinned, width, height, self.low as i32, self.high as i32)
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new(
            processing::EDGE_LOW_THRESHOLD,
            processing::EDGE_HIGH_THRESHOLD,
        )
    }
}

impl FrameProcessor for EdgeDetector {
    fn process(&self, nv21: &[u8], width: u32, height: u32) -> ProcessResult<Vec<u8>> {
        let out_len = check_input(nv21, width, height)?;
        let (w, h) = (width as usize, height as usize);

        let edges = self.edge_map(&nv21[..w * h], w, h);
        let mut rgba = Vec::with_capacity(out_len);
        for value in edges {
            rgba.extend_from_slice(&[value, value, value, 255]);
        }
        Ok(rgba)
    }

    fn name(&self) -> &str {
        "edges"
    }
}

/// Gradient direction quantised to the neighbour pair NMS compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Horizontal,
    Vertical,
    /// Gradient towards bottom-right / top-left
    Falling,
    /// Gradient towards top-right / bottom-left
    Rising,
}

fn sobel(luma: &[u8], width: usize, height: usize) -> (Vec<i32>, Vec<Direction>) {
    let at = |x: isize, y: isize| -> i32 {
        let x = x.clamp(0, width as isize - 1) as usize;
        let y = y.clamp(0, height as isize - 1) as usize;
        luma[y * width + x] as i32
    };

    let mut magnitude = vec![0i32; width * height];
    let mut direction = vec![Direction::Horizontal; width * height];

    for y in 0..height as isize {
        for x in 0..width as isize {
            let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));

            let idx = y as usize * width + x as usize;
            let (ax, ay) = (gx.abs(), gy.abs());
            magnitude[idx] = ax + ay;

            // tan(22.5°) ≈ 0.414, tan(67.5°) ≈ 2.414
            direction[idx] = if ay * 1000 < ax * 414 {
                Direction::Horizontal
            } else if ay * 1000 > ax * 2414 {
                Direction::Vertical
            } else if (gx > 0) == (gy > 0) {
                Direction::Falling
            } else {
                Direction::Rising
            };
        }
    }

    (magnitude, direction)
}

fn suppress_non_maxima(
    magnitude: &[i32],
    direction: &[Direction],
    width: usize,
    height: usize,
) -> Vec<i32> {
    let at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };

    let mut thinned = vec![0i32; magnitude.len()];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let idx = y as usize * width + x as usize;
            let m = magnitude[idx];
            if m == 0 {
                continue;
            }
            let (before, after) = match direction[idx] {
                Direction::Horizontal => (at(x - 1, y), at(x + 1, y)),
                Direction::Vertical => (at(x, y - 1), at(x, y + 1)),
                Direction::Falling => (at(x - 1, y - 1), at(x + 1, y + 1)),
                Direction::Rising => (at(x - 1, y + 1), at(x + 1, y - 1)),
            };
            // Ties go to the first pixel of a plateau so lines stay one pixel wide
            if m > before && m >= after {
                thinned[idx] = m;
            }
        }
    }
    thinned
}

fn hysteresis(thinned: &[i32], width: usize, height: usize, low: i32, high: i32) -> Vec<u8> {
    let mut edges = vec![0u8; thinned.len()];
    let mut stack: Vec<usize> = thinned
        .iter()
        .enumerate()
        .filter(|&(_, &m)| m > high)
        .map(|(idx, _)| idx)
        .collect();
    for &idx in &stack {
        edges[idx] = 255;
    }

    while let Some(idx) = stack.pop() {
        let (x, y) = ((idx % width) as isize, (idx / width) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if edges[n] == 0 && thinned[n] > low {
                    edges[n] = 255;
                    stack.push(n);
                }
            }
        }
    }
    edges
}

/// BT.601 limited-range NV21 to RGBA conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorConverter;

impl FrameProcessor for ColorConverter {
    fn process(&self, nv21: &[u8], width: u32, height: u32) -> ProcessResult<Vec<u8>> {
        let out_len = check_input(nv21, width, height)?;
        let (w, h) = (width as usize, height as usize);
        let (cw, _) = chroma_dimensions(width, height);
        let (y_plane, vu_plane) = nv21.split_at(w * h);

        let mut rgba = vec![0u8; out_len];
        for (row, out_row) in rgba.chunks_exact_mut(w * 4).enumerate() {
            let y_row = &y_plane[row * w..(row + 1) * w];
            let vu_row = &vu_plane[(row / 2) * cw * 2..];

            for (col, px) in out_row.chunks_exact_mut(4).enumerate() {
                let pair = (col / 2) * 2;
                let v = vu_row[pair] as i32 - 128;
                let u = vu_row[pair + 1] as i32 - 128;

                let luma = ((y_row[col] as i32 - 16) * 149) >> 7;
                px[0] = (luma + ((179 * v) >> 7)).clamp(0, 255) as u8;
                px[1] = (luma - ((44 * u) >> 7) - ((91 * v) >> 7)).clamp(0, 255) as u8;
                px[2] = (luma + ((227 * u) >> 7)).clamp(0, 255) as u8;
                px[3] = 255;
            }
        }
        Ok(rgba)
    }

    fn name(&self) -> &str {
        "color"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// NV21 frame with the given luma and neutral chroma
    fn nv21_with_luma(luma: Vec<u8>, width: u32, height: u32) -> Vec<u8> {
        let mut frame = luma;
        frame.resize(converted_len(width, height), 128);
        frame
    }

    #[test]
    fn flat_image_has_no_edges() {
        let frame = nv21_with_luma(vec![90; 16 * 12], 16, 12);
        let rgba = EdgeDetector::default().process(&frame, 16, 12).unwrap();
        assert_eq!(rgba.len(), 16 * 12 * 4);
        assert!(rgba.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn vertical_step_gives_one_pixel_line() {
        let (w, h) = (16u32, 8u32);
        let luma: Vec<u8> = (0..w * h)
            .map(|i| if i % w < 8 { 0 } else { 255 })
            .collect();
        let rgba = EdgeDetector::default()
            .process(&nv21_with_luma(luma, w, h), w, h)
            .unwrap();

        for row in 0..h as usize {
            for col in 0..w as usize {
                let px = &rgba[(row * w as usize + col) * 4..][..4];
                let expected = if col == 7 { 255 } else { 0 };
                assert_eq!(px, [expected, expected, expected, 255], "row {row} col {col}");
            }
        }
    }

    #[test]
    fn weak_gradient_below_high_threshold_is_not_an_edge() {
        let (w, h) = (16u32, 8u32);
        // Step of 20 gives a Sobel magnitude of 80: weak but never strong
        let luma: Vec<u8> = (0..w * h)
            .map(|i| if i % w < 8 { 100 } else { 120 })
            .collect();
        let rgba = EdgeDetector::default()
            .process(&nv21_with_luma(luma, w, h), w, h)
            .unwrap();
        assert!(rgba.chunks_exact(4).all(|px| px[0] == 0));
    }

    #[test]
    fn short_input_is_rejected() {
        let err = EdgeDetector::default().process(&[0; 10], 4, 4).unwrap_err();
        assert_eq!(
            err,
            ProcessError::InvalidInput {
                expected: 24,
                actual: 10
            }
        );
    }

    #[test]
    fn color_converter_maps_grey_to_grey() {
        let (w, h) = (3u32, 3u32);
        let frame = nv21_with_luma(vec![128; 9], w, h);
        let rgba = ColorConverter.process(&frame, w, h).unwrap();
        assert_eq!(rgba.len(), 36);
        for px in rgba.chunks_exact(4) {
            assert_eq!(px[3], 255);
            assert!(px[0] == px[1] && px[1] == px[2]);
        }
    }

    #[test]
    fn color_converter_reads_v_before_u() {
        // Strong V (red difference), neutral U
        let mut frame = vec![128u8; 4];
        frame.extend_from_slice(&[240, 128]);
        let rgba = ColorConverter.process(&frame, 2, 2).unwrap();
        assert!(rgba[0] > rgba[2], "red should dominate blue: {:?}", &rgba[..4]);
    }

    #[test]
    fn closures_are_processors() {
        let solid = |_: &[u8], w: u32, h: u32| -> ProcessResult<Vec<u8>> {
            Ok(vec![255; (w * h * 4) as usize])
        };
        let out = solid.process(&[0; 6], 2, 2).unwrap();
        assert_eq!(out.len(), 16);
        assert_eq!(solid.name(), "custom");
    }
}
