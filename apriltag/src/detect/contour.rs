use super::image::ImageU8;
use super::quad::{quad_area, validate_quad, Quad, QuadThreshParams};

/// Find quads by tracing the outer boundary of thresholded regions directly,
/// instead of clustering gradient edge pixels (see `cluster::gradient_clusters`).
///
/// Each connected region of `target` pixels is flood-filled once, its
/// boundary walked with Moore-neighbor tracing, and the resulting polyline
/// reduced to 4 corners by farthest-point search over its convex hull. The
/// result feeds the same validation used by the gradient-clustering path.
pub fn find_quads(threshed: &ImageU8, params: &QuadThreshParams, reversed_border: bool) -> Vec<Quad> {
    let w = threshed.width;
    let h = threshed.height;
    let target: u8 = if reversed_border { 255 } else { 0 };
    let mut visited = vec![false; (w * h) as usize];
    let mut quads = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if visited[idx] || threshed.get(x, y) != target {
                continue;
            }

            let region = flood_fill(threshed, x, y, target, &mut visited);
            if region.len() < (params.min_cluster_pixels.max(1) as usize) {
                continue;
            }

            let boundary = trace_boundary(threshed, (x as i32, y as i32), target);
            if boundary.len() < 8 {
                continue;
            }

            if let Some(corners) = simplify_to_quad(&boundary) {
                if validate_quad(&corners, params).is_some() {
                    let goodness = (1.0 / (1.0 + mean_boundary_residual(&boundary, &corners))) as f32;
                    quads.push(Quad { corners, reversed_border, goodness });
                }
            }
        }
    }

    quads
}

/// 4-connected flood fill, marking every visited pixel so each region is
/// only ever traced once regardless of which pixel the outer scan hits first.
fn flood_fill(img: &ImageU8, sx: u32, sy: u32, target: u8, visited: &mut [bool]) -> Vec<(u32, u32)> {
    let w = img.width;
    let h = img.height;
    let mut stack = vec![(sx, sy)];
    let mut region = Vec::new();
    visited[(sy * w + sx) as usize] = true;

    while let Some((x, y)) = stack.pop() {
        region.push((x, y));
        let candidates = [
            (x.checked_sub(1), Some(y)),
            (Some(x + 1).filter(|&v| v < w), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), Some(y + 1).filter(|&v| v < h)),
        ];
        for (nx, ny) in candidates {
            if let (Some(nx), Some(ny)) = (nx, ny) {
                let idx = (ny * w + nx) as usize;
                if !visited[idx] && img.get(nx, ny) == target {
                    visited[idx] = true;
                    stack.push((nx, ny));
                }
            }
        }
    }

    region
}

/// 8-connected offsets in clockwise order, starting at north.
const NEIGHBORS_CW: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

fn neighbor_index(dx: i32, dy: i32) -> usize {
    NEIGHBORS_CW.iter().position(|&(ox, oy)| ox == dx && oy == dy).unwrap()
}

/// Moore-neighbor boundary tracing starting from a region's topmost-leftmost
/// pixel. The pixel to its west is guaranteed background (the outer scan
/// would have visited it first otherwise), giving a well-defined backtrack.
fn trace_boundary(img: &ImageU8, start: (i32, i32), target: u8) -> Vec<(i32, i32)> {
    let w = img.width as i32;
    let h = img.height as i32;
    let is_target = |x: i32, y: i32| x >= 0 && y >= 0 && x < w && y < h && img.get(x as u32, y as u32) == target;

    let max_len = 2 * (w + h) as usize * 4;
    let mut boundary = vec![start];
    let mut backtrack = (start.0 - 1, start.1);
    let mut current = start;

    loop {
        let bdx = backtrack.0 - current.0;
        let bdy = backtrack.1 - current.1;
        let start_idx = (neighbor_index(bdx, bdy) + 1) % 8;

        let mut found = None;
        for k in 0..8 {
            let idx = (start_idx + k) % 8;
            let (dx, dy) = NEIGHBORS_CW[idx];
            let (nx, ny) = (current.0 + dx, current.1 + dy);
            if is_target(nx, ny) {
                found = Some((nx, ny, idx));
                break;
            }
        }

        let (nx, ny, idx) = match found {
            Some(v) => v,
            None => break,
        };

        let prev_idx = (idx + 7) % 8;
        let (pdx, pdy) = NEIGHBORS_CW[prev_idx];
        backtrack = (current.0 + pdx, current.1 + pdy);
        current = (nx, ny);

        if current == start {
            break;
        }
        boundary.push(current);

        if boundary.len() > max_len {
            break;
        }
    }

    boundary
}

fn convex_hull(points: &[(i32, i32)]) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (x as f64, y as f64)).collect();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0);

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn dist2(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (a.0 - b.0, a.1 - b.1);
    dx * dx + dy * dy
}

fn perp_dist(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-9 {
        return 0.0;
    }
    ((p.0 - a.0) * dy - (p.1 - a.1) * dx).abs() / len
}

fn shoelace(c: &[[f64; 2]; 4]) -> f64 {
    let mut area = 0.0;
    for i in 0..4 {
        let j = (i + 1) % 4;
        area += c[i][0] * c[j][1] - c[j][0] * c[i][1];
    }
    area / 2.0
}

/// Reduce a boundary polyline to 4 corners: the two points farthest apart,
/// plus the points farthest from that line on each side.
fn simplify_to_quad(boundary: &[(i32, i32)]) -> Option<[[f64; 2]; 4]> {
    let hull = convex_hull(boundary);
    if hull.len() < 4 {
        return None;
    }

    let cx = hull.iter().map(|p| p.0).sum::<f64>() / hull.len() as f64;
    let cy = hull.iter().map(|p| p.1).sum::<f64>() / hull.len() as f64;
    let centroid = (cx, cy);

    let p0 = *hull
        .iter()
        .max_by(|a, b| dist2(**a, centroid).partial_cmp(&dist2(**b, centroid)).unwrap())?;
    let p1 = *hull
        .iter()
        .max_by(|a, b| dist2(**a, p0).partial_cmp(&dist2(**b, p0)).unwrap())?;

    let side = |p: (f64, f64)| {
        let (dx, dy) = (p1.0 - p0.0, p1.1 - p0.1);
        (p.0 - p0.0) * dy - (p.1 - p0.1) * dx
    };

    let mut best_pos: Option<(f64, f64)> = None;
    let mut best_pos_d = 0.0f64;
    let mut best_neg: Option<(f64, f64)> = None;
    let mut best_neg_d = 0.0f64;
    for &p in &hull {
        let s = side(p);
        let d = perp_dist(p, p0, p1);
        if s >= 0.0 && d > best_pos_d {
            best_pos_d = d;
            best_pos = Some(p);
        } else if s < 0.0 && d > best_neg_d {
            best_neg_d = d;
            best_neg = Some(p);
        }
    }

    let p2 = best_pos?;
    let p3 = best_neg?;

    let mut corners = [[p0.0, p0.1], [p2.0, p2.1], [p1.0, p1.1], [p3.0, p3.1]];
    if shoelace(&corners) < 0.0 {
        corners.reverse();
    }

    Some(corners)
}

/// Mean perpendicular distance of every boundary point to its nearest of the
/// quad's 4 edges — the contour variant's analogue of the gradient-clustering
/// path's total line-fit MSE, used only as a `goodness` ranking signal.
fn mean_boundary_residual(boundary: &[(i32, i32)], corners: &[[f64; 2]; 4]) -> f64 {
    let mut total = 0.0;
    for &(bx, by) in boundary {
        let p = (bx as f64, by as f64);
        let mut best = f64::MAX;
        for i in 0..4 {
            let a = (corners[i][0], corners[i][1]);
            let b = (corners[(i + 1) % 4][0], corners[(i + 1) % 4][1]);
            best = best.min(perp_dist(p, a, b));
        }
        total += best;
    }
    total / boundary.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_image(size: u32, margin: u32, val: u8) -> ImageU8 {
        let mut img = ImageU8::new(size, size);
        for y in 0..size {
            for x in 0..size {
                img.set(x, y, 255 - val);
            }
        }
        for y in margin..(size - margin) {
            for x in margin..(size - margin) {
                img.set(x, y, val);
            }
        }
        img
    }

    #[test]
    fn flood_fill_finds_filled_square() {
        let img = square_image(40, 10, 0);
        let mut visited = vec![false; (40 * 40) as usize];
        let region = flood_fill(&img, 20, 20, 0, &mut visited);
        // 20x20 interior square
        assert_eq!(region.len(), 20 * 20);
    }

    #[test]
    fn trace_boundary_closes_on_square() {
        let img = square_image(40, 10, 0);
        let boundary = trace_boundary(&img, (10, 10), 0);
        assert!(boundary.len() >= 4 * 20 - 4);
        // Every boundary point should be on the dark region.
        for &(x, y) in &boundary {
            assert_eq!(img.get(x as u32, y as u32), 0);
        }
    }

    #[test]
    fn simplify_to_quad_recovers_square_corners() {
        let img = square_image(40, 10, 0);
        let boundary = trace_boundary(&img, (10, 10), 0);
        let corners = simplify_to_quad(&boundary).unwrap();
        assert!(quad_area(&corners) > 0.0);

        // Corners should be near (10,10)-(29,29) axis-aligned square.
        for c in &corners {
            assert!(c[0] >= 9.0 && c[0] <= 30.0);
            assert!(c[1] >= 9.0 && c[1] <= 30.0);
        }
    }

    #[test]
    fn find_quads_detects_single_dark_square() {
        let img = square_image(80, 20, 0);
        let params = QuadThreshParams::default();
        let quads = find_quads(&img, &params, false);
        assert!(!quads.is_empty(), "expected at least one quad");
    }

    #[test]
    fn find_quads_empty_on_uniform_image() {
        let img = ImageU8::new(40, 40);
        let params = QuadThreshParams::default();
        let quads = find_quads(&img, &params, false);
        assert!(quads.is_empty());
    }

    #[test]
    fn find_quads_reversed_border_targets_white() {
        // Uniform black image with no white region: nothing to find in reversed mode.
        let img = square_image(80, 20, 255);
        let params = QuadThreshParams::default();
        let quads = find_quads(&img, &params, true);
        assert!(!quads.is_empty());
    }
}
